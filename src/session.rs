//! The browser session: one headless Chrome instance driving login and
//! tweet collection.
//!
//! Owns the driver for the whole run. The scheduler releases the current
//! tab after each batch (and skips that when interrupted); the browser
//! process itself lives until the session is dropped, so a released tab is
//! simply reopened on the next scrape.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use headless_chrome::{Browser, LaunchOptions, Tab};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{LoginFlow, LoginState, STEP_TIMEOUT};
use crate::config::{Config, SortOrder, Target};
use crate::error::CrawlerError;
use crate::scheduler::{ScrapeJob, TweetSink};
use crate::storage::JsonStore;

const LOGIN_URL: &str = "https://x.com/i/flow/login";
const BOOKMARKS_URL: &str = "https://x.com/i/bookmarks";
/// How long to wait for the first tweet card after navigating to results.
const RESULTS_TIMEOUT: Duration = Duration::from_secs(15);
/// Give up scrolling after this many rounds without a new tweet.
const STALE_SCROLL_LIMIT: u32 = 3;

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    ]
});

static TWEET_CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article[data-testid='tweet']").unwrap());
static TWEET_TEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[data-testid='tweetText']").unwrap());
static USER_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[data-testid='User-Name'] a[href]").unwrap());
static TIME_EL: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static AVATAR_IMG: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[data-testid='Tweet-User-Avatar'] img").unwrap());
static REPLY_BTN: Lazy<Selector> =
    Lazy::new(|| Selector::parse("button[data-testid='reply']").unwrap());
static RETWEET_BTN: Lazy<Selector> =
    Lazy::new(|| Selector::parse("button[data-testid='retweet']").unwrap());
static LIKE_BTN: Lazy<Selector> =
    Lazy::new(|| Selector::parse("button[data-testid='like']").unwrap());
static COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d,]+)").unwrap());

/// One collected tweet.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Tweet {
    pub handle: String,
    pub name: String,
    pub text: String,
    pub timestamp: Option<String>,
    pub replies: u64,
    pub reposts: u64,
    pub likes: u64,
    pub query: String,
    pub scraped_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

/// What page family the session scrapes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrapeMode {
    Search(SortOrder),
    Bookmarks,
}

pub struct Session {
    browser: Browser,
    tab: Option<Arc<Tab>>,
    interrupted: Arc<AtomicBool>,
    mode: ScrapeMode,
    tweets: Vec<Tweet>,
    seen: HashSet<(String, String)>,
    store: JsonStore,
}

impl Session {
    /// Launch the browser and arm the Ctrl-C watcher. Must run inside a
    /// tokio runtime.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        info!(user_agent, headless = config.headless, "launching browser");

        let ua_arg = format!("--user-agent={user_agent}");
        let args: Vec<&OsStr> = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--window-position=0,0"),
            OsStr::new("--ignore-certificate-errors"),
            OsStr::new(&ua_arg),
        ];

        let browser = Browser::new(LaunchOptions {
            headless: config.headless,
            window_size: Some((1920, 1080)),
            args,
            ..Default::default()
        })?;

        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nScript interrupted by user. Finishing current batch...");
                flag.store(true, Ordering::SeqCst);
            }
        });

        let mode = match &config.target {
            Target::Bookmarks => ScrapeMode::Bookmarks,
            _ => ScrapeMode::Search(config.sort_order),
        };

        Ok(Session {
            browser,
            tab: None,
            interrupted,
            mode,
            tweets: Vec::new(),
            seen: HashSet::new(),
            store: JsonStore::new("tweets"),
        })
    }

    /// Current tab, reopening one if the last batch released it.
    fn tab(&mut self) -> Result<Arc<Tab>, CrawlerError> {
        if let Some(tab) = &self.tab {
            return Ok(tab.clone());
        }
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| CrawlerError::scrape(format!("failed to open tab: {e}")))?;
        self.tab = Some(tab.clone());
        Ok(tab)
    }

    fn login_step(
        &mut self,
        state: LoginState,
        op: impl FnOnce(&Tab) -> anyhow::Result<()>,
    ) -> Result<(), CrawlerError> {
        let tab = self.tab().map_err(|e| CrawlerError::Login {
            state: state.as_str(),
            detail: e.to_string(),
        })?;
        op(&tab).map_err(|e| CrawlerError::Login {
            state: state.as_str(),
            detail: e.to_string(),
        })
    }

    fn results_url(&self, query: &str) -> String {
        match self.mode {
            ScrapeMode::Bookmarks => BOOKMARKS_URL.to_string(),
            ScrapeMode::Search(order) => {
                let sort = match order {
                    SortOrder::Latest => "&f=live",
                    SortOrder::Top => "&f=top",
                    SortOrder::Default => "",
                };
                format!("https://x.com/search?q={}{}", urlencoding::encode(query), sort)
            }
        }
    }

    /// Pull every tweet card currently in the DOM and keep the new ones.
    fn collect_visible(&mut self, html: &str, job: &ScrapeJob) -> usize {
        let mut fresh = 0;
        for tweet in parse_tweets(html, &job.query, &job.additional_fields) {
            let key = (tweet.handle.clone(), tweet.text.clone());
            if self.seen.insert(key) {
                self.tweets.push(tweet);
                fresh += 1;
            }
        }
        fresh
    }
}

impl LoginFlow for Session {
    fn navigate_to_login(&mut self) -> Result<(), CrawlerError> {
        self.login_step(LoginState::Navigating, |tab| {
            tab.navigate_to(LOGIN_URL)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
    }

    fn enter_username(&mut self, username: &str) -> Result<(), CrawlerError> {
        self.login_step(LoginState::UsernameEntry, |tab| {
            let field =
                tab.wait_for_xpath_with_custom_timeout("//input[@name='text']", STEP_TIMEOUT)?;
            field.type_into(username)?;
            Ok(())
        })
    }

    fn advance(&mut self) -> Result<(), CrawlerError> {
        self.login_step(LoginState::Advancing, |tab| {
            let button =
                tab.wait_for_xpath_with_custom_timeout("//span[text()='Next']", STEP_TIMEOUT)?;
            button.click()?;
            Ok(())
        })
    }

    fn enter_password(&mut self, password: &str) -> Result<(), CrawlerError> {
        self.login_step(LoginState::PasswordEntry, |tab| {
            let field = tab
                .wait_for_xpath_with_custom_timeout("//input[@name='password']", STEP_TIMEOUT)?;
            field.type_into(password)?;
            Ok(())
        })
    }

    fn submit(&mut self) -> Result<(), CrawlerError> {
        self.login_step(LoginState::Submitting, |tab| {
            let button =
                tab.wait_for_xpath_with_custom_timeout("//span[text()='Log in']", STEP_TIMEOUT)?;
            button.click()?;
            Ok(())
        })
    }

    fn confirm_login(&mut self) -> Result<(), CrawlerError> {
        self.login_step(LoginState::Verifying, |tab| {
            tab.wait_for_xpath_with_custom_timeout("//a[@href='/home']", STEP_TIMEOUT)?;
            Ok(())
        })
    }
}

impl TweetSink for Session {
    fn scrape(&mut self, job: &ScrapeJob) -> Result<usize, CrawlerError> {
        let url = self.results_url(&job.query);
        let tab = self.tab()?;

        tab.navigate_to(&url).map_err(CrawlerError::scrape)?;
        tab.wait_until_navigated().map_err(CrawlerError::scrape)?;

        // The feed renders asynchronously; an empty result set is not an
        // error, so a timeout here just means zero cards.
        if let Err(e) =
            tab.wait_for_element_with_custom_timeout("article[data-testid='tweet']", RESULTS_TIMEOUT)
        {
            debug!(error = %e, "no tweet cards appeared before the timeout");
        }

        let mut stale_rounds = 0;
        let mut collected_for_query = 0;

        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                warn!("interrupt flag set, stopping collection");
                break;
            }

            let html = tab.get_content().map_err(CrawlerError::scrape)?;
            let fresh = self.collect_visible(&html, job);
            collected_for_query += fresh;
            debug!(fresh, collected_for_query, "scanned visible cards");

            if fresh == 0 {
                stale_rounds += 1;
                if stale_rounds >= STALE_SCROLL_LIMIT {
                    break;
                }
            } else {
                stale_rounds = 0;
            }

            if !job.no_limit && collected_for_query >= job.max_tweets {
                break;
            }

            tab.evaluate("window.scrollBy(0, window.innerHeight);", false)
                .map_err(CrawlerError::scrape)?;
            // Let the feed settle before rescanning.
            std::thread::sleep(Duration::from_millis(1500));
        }

        info!(
            query = %job.query,
            collected = collected_for_query,
            total = self.tweets.len(),
            "query finished"
        );
        Ok(self.tweets.len())
    }

    fn persist(&mut self) -> Result<(), CrawlerError> {
        self.store.save(&self.tweets).map_err(CrawlerError::storage)
    }

    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn release(&mut self) -> Result<(), CrawlerError> {
        if let Some(tab) = self.tab.take() {
            tab.close(true).map_err(CrawlerError::scrape)?;
            debug!("tab released");
        }
        Ok(())
    }
}

fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn parse_count(card: scraper::ElementRef<'_>, selector: &Selector) -> u64 {
    card.select(selector)
        .next()
        .and_then(|btn| btn.value().attr("aria-label").map(str::to_string))
        .and_then(|label| {
            COUNT_RE
                .captures(&label)
                .and_then(|c| c.get(1).map(|m| m.as_str().replace(',', "")))
        })
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

/// Extract tweet records from a rendered results page. Pure so it can be
/// tested against canned HTML.
pub fn parse_tweets(html: &str, query: &str, additional_fields: &[String]) -> Vec<Tweet> {
    let document = Html::parse_document(html);
    let want_pfp = additional_fields.iter().any(|f| f == "pfp");
    let scraped_at = Local::now().to_rfc3339();

    document
        .select(&TWEET_CARD)
        .filter_map(|card| {
            let text = card.select(&TWEET_TEXT).next().map(element_text)?;

            let handle = card
                .select(&USER_LINK)
                .filter_map(|a| a.value().attr("href"))
                .find(|href| href.starts_with('/') && !href.contains("/status/"))
                .map(|href| href.trim_start_matches('/').to_string())?;

            let name = card
                .select(&USER_LINK)
                .next()
                .map(element_text)
                .unwrap_or_default();

            let timestamp = card
                .select(&TIME_EL)
                .next()
                .and_then(|t| t.value().attr("datetime").map(str::to_string));

            let profile_image = if want_pfp {
                card.select(&AVATAR_IMG)
                    .next()
                    .and_then(|img| img.value().attr("src").map(str::to_string))
            } else {
                None
            };

            Some(Tweet {
                handle,
                name,
                text,
                timestamp,
                replies: parse_count(card, &REPLY_BTN),
                reposts: parse_count(card, &RETWEET_BTN),
                likes: parse_count(card, &LIKE_BTN),
                query: query.to_string(),
                scraped_at: scraped_at.clone(),
                profile_image,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(handle: &str, name: &str, text: &str, likes: &str) -> String {
        format!(
            r#"<article data-testid="tweet">
                 <div data-testid="Tweet-User-Avatar"><img src="https://img.example/{handle}.jpg"></div>
                 <div data-testid="User-Name"><a href="/{handle}"><span>{name}</span></a></div>
                 <time datetime="2024-03-01T12:00:00.000Z">Mar 1</time>
                 <div data-testid="tweetText">{text}</div>
                 <button data-testid="reply" aria-label="4 Replies"></button>
                 <button data-testid="retweet" aria-label="12 reposts"></button>
                 <button data-testid="like" aria-label="{likes} Likes"></button>
               </article>"#
        )
    }

    #[test]
    fn parses_handle_text_and_counts() {
        let html = format!("<html><body>{}</body></html>", card("alice", "Alice", "gm btc", "1,234"));
        let tweets = parse_tweets(&html, "bitcoin OR btc", &[]);
        assert_eq!(tweets.len(), 1);
        let t = &tweets[0];
        assert_eq!(t.handle, "alice");
        assert_eq!(t.name, "Alice");
        assert_eq!(t.text, "gm btc");
        assert_eq!(t.replies, 4);
        assert_eq!(t.reposts, 12);
        assert_eq!(t.likes, 1234);
        assert_eq!(t.query, "bitcoin OR btc");
        assert_eq!(t.timestamp.as_deref(), Some("2024-03-01T12:00:00.000Z"));
        assert_eq!(t.profile_image, None);
    }

    #[test]
    fn pfp_field_is_only_extracted_when_requested() {
        let html = card("bob", "Bob", "eth szn", "9");
        let plain = parse_tweets(&html, "q", &[]);
        assert_eq!(plain[0].profile_image, None);

        let with_pfp = parse_tweets(&html, "q", &["pfp".to_string()]);
        assert_eq!(
            with_pfp[0].profile_image.as_deref(),
            Some("https://img.example/bob.jpg")
        );
    }

    #[test]
    fn cards_without_text_are_skipped() {
        let html = r#"<article data-testid="tweet">
                        <div data-testid="User-Name"><a href="/ghost">Ghost</a></div>
                      </article>"#;
        assert!(parse_tweets(html, "q", &[]).is_empty());
    }

    #[test]
    fn multiple_cards_parse_in_document_order() {
        let html = format!("{}{}", card("a", "A", "first", "1"), card("b", "B", "second", "2"));
        let tweets = parse_tweets(&html, "q", &[]);
        assert_eq!(tweets.len(), 2);
        assert_eq!(tweets[0].text, "first");
        assert_eq!(tweets[1].text, "second");
    }

    #[test]
    fn missing_count_labels_default_to_zero() {
        let html = r#"<article data-testid="tweet">
                        <div data-testid="User-Name"><a href="/carol">Carol</a></div>
                        <div data-testid="tweetText">no buttons here</div>
                      </article>"#;
        let tweets = parse_tweets(html, "q", &[]);
        assert_eq!(tweets[0].likes, 0);
        assert_eq!(tweets[0].replies, 0);
    }
}
