use thiserror::Error;

/// Failure classes for a crawl run. Environment problems are never retried,
/// login step failures are retried by the authenticator up to its attempt
/// ceiling, everything else aborts the run.
#[derive(Debug, Error)]
pub enum CrawlerError {
    /// Missing or contradictory configuration. Reported before any browser
    /// session is created.
    #[error("configuration error: {0}")]
    Environment(String),

    /// A single login step failed (wait timeout, stale element, navigation
    /// error). Retryable within the attempt budget.
    #[error("login step failed during {state}: {detail}")]
    Login { state: &'static str, detail: String },

    /// All login attempts were spent. Fatal.
    #[error("all {attempts} login attempts failed")]
    LoginExhausted { attempts: u32 },

    /// The scraping collaborator failed mid-batch. Not retried here;
    /// remaining batches are abandoned.
    #[error("scrape failed: {0}")]
    Scrape(String),

    /// Persisting accumulated results failed. Kept distinct from Scrape so
    /// a bad disk doesn't read like a bad selector.
    #[error("failed to persist results: {0}")]
    Storage(String),

    /// The user interrupted the run. Collaborator cleanup is skipped.
    #[error("interrupted by user")]
    Interrupted,
}

impl CrawlerError {
    pub fn scrape(err: impl std::fmt::Display) -> Self {
        CrawlerError::Scrape(err.to_string())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        CrawlerError::Storage(err.to_string())
    }
}
