use thiserror::Error;

/// Failures of a remote platform call.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{call} returned {status}: {message}")]
    Api {
        call: String,
        status: u16,
        message: String,
    },

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("participant listing incomplete: got {got} of {total}")]
    IncompleteSnapshot { got: usize, total: usize },
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Deployment config missing or unusable. Nothing has run.
    #[error("configuration error: {0}")]
    Config(String),

    /// Channel or bot could not be found at startup.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// A remote call failed mid-cycle. The cycle is rolled back.
    #[error("remote call failed: {0}")]
    Remote(#[from] PlatformError),

    /// The ledger transaction failed. The cycle is rolled back.
    #[error("persistence failed: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl SyncError {
    /// Startup errors end the process; cycle errors are retried next interval.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Resolution(_))
    }
}
