use std::env;

use crate::error::CrawlerError;

/// Login credentials for the account driving the session. Supplied once at
/// startup, immutable for the process lifetime, never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub mail: Option<String>,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("mail", &self.mail)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// What to scrape. At most one explicit target may be selected; with none,
/// the built-in keyword universe is batched instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Profile(String),
    Hashtag(String),
    List(String),
    Query(String),
    Bookmarks,
    /// Default mode: batch the keyword universe into disjunctive queries.
    KeywordBatches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Latest,
    Top,
    #[default]
    Default,
}

/// Everything the authenticator and scheduler need, resolved once from CLI
/// flags and the environment. Nothing downstream reads `std::env`.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub headless: bool,
    pub target: Target,
    /// Explicitly requested per-query cap. None means the caller asked for
    /// no bound, or never gave one; either way collection is unbounded.
    pub tweet_limit: Option<usize>,
    pub sort_order: SortOrder,
    /// Extra fields the collaborator should include in saved records.
    /// Opaque here, forwarded verbatim.
    pub additional_fields: Vec<String>,
}

/// Raw selector flags as parsed, before conflict validation.
#[derive(Debug, Default)]
pub struct TargetFlags {
    pub profile: Option<String>,
    pub hashtag: Option<String>,
    pub list: Option<String>,
    pub query: Option<String>,
    pub bookmarks: bool,
}

impl Config {
    /// Merge CLI values with the environment and validate. CLI flags win
    /// over env vars; validation failures surface before any browser work.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        mail: Option<String>,
        user: Option<String>,
        password: Option<String>,
        headless: Option<String>,
        flags: TargetFlags,
        tweets: Option<usize>,
        no_tweets_limit: bool,
        latest: bool,
        top: bool,
        additional: &str,
    ) -> Result<Self, CrawlerError> {
        let mail = mail.or_else(|| env::var("TWITTER_MAIL").ok());
        let username = user.or_else(|| env::var("TWITTER_USERNAME").ok());
        let password = password.or_else(|| env::var("TWITTER_PASSWORD").ok());
        let headless = headless.or_else(|| env::var("HEADLESS").ok());

        let username = username.ok_or_else(|| {
            CrawlerError::Environment(
                "missing Twitter username (set TWITTER_USERNAME or pass --user)".into(),
            )
        })?;
        let password = password.ok_or_else(|| {
            CrawlerError::Environment(
                "missing Twitter password (set TWITTER_PASSWORD or pass --password)".into(),
            )
        })?;

        let target = flags.validate()?;

        let sort_order = match (latest, top) {
            (true, true) => {
                return Err(CrawlerError::Environment(
                    "specify either --latest or --top, not both".into(),
                ))
            }
            (true, false) => SortOrder::Latest,
            (false, true) => SortOrder::Top,
            (false, false) => SortOrder::Default,
        };

        let additional_fields = additional
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Config {
            credentials: Credentials {
                mail,
                username,
                password,
            },
            headless: parse_headless(headless.as_deref()),
            target,
            tweet_limit: if no_tweets_limit { None } else { tweets },
            sort_order,
            additional_fields,
        })
    }
}

impl TargetFlags {
    /// At most one explicit selector; none at all means keyword-batch mode.
    pub fn validate(self) -> Result<Target, CrawlerError> {
        let mut targets = Vec::new();
        if let Some(p) = self.profile {
            targets.push(Target::Profile(p));
        }
        if let Some(h) = self.hashtag {
            targets.push(Target::Hashtag(h));
        }
        if let Some(l) = self.list {
            targets.push(Target::List(l));
        }
        if let Some(q) = self.query {
            targets.push(Target::Query(q));
        }
        if self.bookmarks {
            targets.push(Target::Bookmarks);
        }

        match targets.len() {
            0 => Ok(Target::KeywordBatches),
            1 => Ok(targets.pop().unwrap()),
            _ => Err(CrawlerError::Environment(
                "specify only one of --username, --hashtag, --list, --bookmarks, or --query"
                    .into(),
            )),
        }
    }
}

fn parse_headless(value: Option<&str>) -> bool {
    match value {
        Some(v) => matches!(v.trim().to_lowercase().as_str(), "yes" | "y" | "true" | "1"),
        // No preference given: run headless, the only mode that works in CI.
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> TargetFlags {
        TargetFlags::default()
    }

    #[test]
    fn missing_password_is_an_environment_error() {
        let err = Config::resolve(
            None,
            Some("alice".into()),
            None,
            Some("yes".into()),
            flags(),
            Some(50),
            false,
            false,
            false,
            "",
        )
        .unwrap_err();
        assert!(matches!(err, CrawlerError::Environment(_)));
    }

    #[test]
    fn no_selector_defaults_to_keyword_batches() {
        let cfg = Config::resolve(
            None,
            Some("alice".into()),
            Some("hunter2".into()),
            Some("yes".into()),
            flags(),
            Some(50),
            false,
            false,
            false,
            "",
        )
        .unwrap();
        assert_eq!(cfg.target, Target::KeywordBatches);
        assert!(cfg.headless);
    }

    #[test]
    fn two_selectors_conflict() {
        let err = TargetFlags {
            profile: Some("alice".into()),
            hashtag: Some("btc".into()),
            ..TargetFlags::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, CrawlerError::Environment(_)));
    }

    #[test]
    fn bookmarks_plus_query_conflict() {
        let err = TargetFlags {
            query: Some("bitcoin".into()),
            bookmarks: true,
            ..TargetFlags::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, CrawlerError::Environment(_)));
    }

    #[test]
    fn latest_and_top_conflict() {
        let err = Config::resolve(
            None,
            Some("alice".into()),
            Some("hunter2".into()),
            None,
            flags(),
            Some(50),
            false,
            true,
            true,
            "",
        )
        .unwrap_err();
        assert!(matches!(err, CrawlerError::Environment(_)));
    }

    #[test]
    fn additional_fields_are_split_and_trimmed() {
        let cfg = Config::resolve(
            None,
            Some("alice".into()),
            Some("hunter2".into()),
            None,
            flags(),
            Some(50),
            false,
            false,
            false,
            "pfp, views,",
        )
        .unwrap();
        assert_eq!(cfg.additional_fields, vec!["pfp", "views"]);
    }

    #[test]
    fn no_tweets_limit_wins_over_an_explicit_cap() {
        let cfg = Config::resolve(
            None,
            Some("alice".into()),
            Some("hunter2".into()),
            None,
            flags(),
            Some(100),
            true,
            false,
            false,
            "",
        )
        .unwrap();
        assert_eq!(cfg.tweet_limit, None);
    }

    #[test]
    fn headless_parsing_accepts_yes_no() {
        assert!(parse_headless(Some("Yes")));
        assert!(parse_headless(Some("true")));
        assert!(!parse_headless(Some("no")));
        assert!(parse_headless(None));
    }
}
