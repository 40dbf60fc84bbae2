//! Batched query loop.
//!
//! Partitions the keyword universe into query batches and runs the scraping
//! collaborator once per batch: pace, scrape, persist, then release the
//! driver unless the run was interrupted. Strictly sequential, one browser
//! session, one batch at a time.

use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::batch::KeywordUniverse;
use crate::error::CrawlerError;

/// One unit of work handed to the collaborator. `additional_fields` is
/// opaque here and forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeJob {
    pub query: String,
    pub max_tweets: usize,
    pub no_limit: bool,
    pub additional_fields: Vec<String>,
}

/// The scraping collaborator as seen by the scheduler. The real
/// implementation lives in [`crate::session`]; tests use scripted fakes.
pub trait TweetSink {
    /// Run one query, accumulating results internally. Returns how many
    /// records are accumulated so far.
    fn scrape(&mut self, job: &ScrapeJob) -> Result<usize, CrawlerError>;
    /// Write the accumulated results to durable storage. Called after every
    /// batch so an aborted run still leaves readable partial output.
    fn persist(&mut self) -> Result<(), CrawlerError>;
    /// Whether the run was cancelled mid-batch.
    fn interrupted(&self) -> bool;
    /// Release the underlying driver. Must be idempotent.
    fn release(&mut self) -> Result<(), CrawlerError>;
}

/// Source of the pause before each query. Injectable so tests don't sleep.
pub trait Pacing {
    fn next_delay(&mut self) -> Duration;
}

/// Uniform random delay in [min, max].
pub struct UniformPacing {
    min: Duration,
    max: Duration,
}

impl UniformPacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        assert!(min <= max);
        UniformPacing { min, max }
    }
}

impl Default for UniformPacing {
    fn default() -> Self {
        UniformPacing::new(Duration::from_secs(2), Duration::from_secs(5))
    }
}

impl Pacing for UniformPacing {
    fn next_delay(&mut self) -> Duration {
        let secs = rand::thread_rng().gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

pub struct BatchScheduler {
    batch_size: usize,
    max_tweets: usize,
    no_limit: bool,
    additional_fields: Vec<String>,
}

impl BatchScheduler {
    /// `limit` is the explicitly requested tweet cap, if any. With no
    /// explicit cap the run is unbounded for every batch.
    pub fn new(batch_size: usize, limit: Option<usize>, additional_fields: Vec<String>) -> Self {
        BatchScheduler {
            batch_size,
            max_tweets: limit.unwrap_or(50),
            no_limit: limit.is_none(),
            additional_fields,
        }
    }

    /// Process every batch in universe order. A collaborator error aborts
    /// the remaining batches; an interruption skips the release for that
    /// iteration and ends the run with a distinct error.
    pub async fn run<S, P>(
        &self,
        universe: &KeywordUniverse,
        sink: &mut S,
        pacing: &mut P,
    ) -> Result<(), CrawlerError>
    where
        S: TweetSink,
        P: Pacing,
    {
        let batches = universe.batches(self.batch_size);
        let total = batches.len();
        info!(keywords = universe.len(), batches = total, "starting batch run");

        for (index, batch) in batches.iter().enumerate() {
            let job = ScrapeJob {
                query: batch.query(),
                max_tweets: self.max_tweets,
                no_limit: self.no_limit,
                additional_fields: self.additional_fields.clone(),
            };

            println!("Scraping tweets for query: {}", job.query);
            info!(batch = index + 1, total, query = %job.query, "running batch");

            tokio::time::sleep(pacing.next_delay()).await;

            let accumulated = sink.scrape(&job)?;
            sink.persist()?;
            info!(batch = index + 1, accumulated, "batch persisted");

            if sink.interrupted() {
                warn!("run interrupted; leaving driver cleanup to the caller");
                return Err(CrawlerError::Interrupted);
            }
            sink.release()?;
        }

        Ok(())
    }
}
