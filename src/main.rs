mod auth;
mod batch;
mod config;
mod error;
mod scheduler;
mod session;
mod storage;

use clap::Parser;
use dotenv::dotenv;
use tracing::error;

use crate::auth::{Authenticator, RetryPolicy};
use crate::batch::{KeywordUniverse, BATCH_SIZE};
use crate::config::{Config, Target, TargetFlags};
use crate::error::CrawlerError;
use crate::scheduler::{BatchScheduler, UniformPacing};
use crate::session::Session;

/// Scrape tweets from X/Twitter without the API: log in with a real browser
/// session and collect posts for a profile, hashtag, list, query, your
/// bookmarks, or (by default) rotating batches of crypto topic queries.
#[derive(Parser, Debug)]
#[command(name = "tweet-crawler", version)]
struct Cli {
    /// Account mail (default: TWITTER_MAIL)
    #[arg(long)]
    mail: Option<String>,

    /// Account username (default: TWITTER_USERNAME)
    #[arg(long)]
    user: Option<String>,

    /// Account password (default: TWITTER_PASSWORD)
    #[arg(long)]
    password: Option<String>,

    /// Headless mode? [yes/no] (default: HEADLESS)
    #[arg(long)]
    headless: Option<String>,

    /// Number of tweets to scrape per query
    #[arg(short = 't', long)]
    tweets: Option<usize>,

    /// Scrape tweets from a user's profile
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Scrape tweets from a hashtag
    #[arg(long)]
    hashtag: Option<String>,

    /// Scrape tweets from a list ID
    #[arg(short = 'l', long)]
    list: Option<String>,

    /// Scrape tweets from a search query
    #[arg(short = 'q', long)]
    query: Option<String>,

    /// Scrape tweets from your bookmarks
    #[arg(long)]
    bookmarks: bool,

    /// Keep scraping until no more tweets are available
    #[arg(long)]
    no_tweets_limit: bool,

    /// Additional fields to include in saved records, comma separated
    #[arg(short = 'a', long, default_value = "")]
    add: String,

    /// Scrape latest tweets
    #[arg(long)]
    latest: bool,

    /// Scrape top tweets
    #[arg(long)]
    top: bool,
}

#[tokio::main]
async fn main() {
    match dotenv() {
        Ok(_) => println!("Loaded .env file\n"),
        Err(dotenv::Error::Io(_)) => {} // no .env file is fine
        Err(e) => {
            eprintln!("Error loading .env file: {e}");
            std::process::exit(1);
        }
    }
    tracing_subscriber::fmt::init();

    if let Err(e) = run(Cli::parse()).await {
        match e {
            CrawlerError::Interrupted => eprintln!("\nScript interrupted by user. Exiting..."),
            _ => {
                error!(error = %e, "run failed");
                eprintln!("Error: {e}");
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CrawlerError> {
    let config = Config::resolve(
        cli.mail,
        cli.user,
        cli.password,
        cli.headless,
        TargetFlags {
            profile: cli.username,
            hashtag: cli.hashtag,
            list: cli.list,
            query: cli.query,
            bookmarks: cli.bookmarks,
        },
        cli.tweets,
        cli.no_tweets_limit,
        cli.latest,
        cli.top,
        &cli.add,
    )?;

    let mut session = Session::new(&config)
        .map_err(|e| CrawlerError::Scrape(format!("failed to launch browser: {e}")))?;

    let report = Authenticator::new(RetryPolicy::default())
        .login(&mut session, &config.credentials)
        .await?;
    tracing::info!(
        attempts = report.attempts,
        backoffs = report.backoffs,
        "authenticated"
    );

    let universe = match &config.target {
        Target::KeywordBatches => KeywordUniverse::crypto(),
        Target::Profile(user) => KeywordUniverse::new(vec![format!("from:{user}")]),
        Target::Hashtag(tag) => KeywordUniverse::new(vec![format!("#{tag}")]),
        Target::List(id) => KeywordUniverse::new(vec![format!("list:{id}")]),
        Target::Query(q) => KeywordUniverse::new(vec![q.clone()]),
        // The session scrapes the bookmarks page directly; the single
        // pseudo-query only labels the saved records.
        Target::Bookmarks => KeywordUniverse::new(vec!["bookmarks".to_string()]),
    };

    BatchScheduler::new(BATCH_SIZE, config.tweet_limit, config.additional_fields.clone())
        .run(&universe, &mut session, &mut UniformPacing::default())
        .await?;

    println!("✅ All batches complete.");
    Ok(())
}
