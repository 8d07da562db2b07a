//! Error taxonomy for the scraper library.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by the session, fetch, parse and persistence stages.
#[derive(Debug, Error, Clone)]
pub enum ScrapeError {
    /// No session token in the cookie jar or in the final URL.
    #[error("session token `{cookie}` not found in cookies or redirect URL")]
    SessionUnavailable { cookie: String },

    /// The server replaced the session cookie after the run started.
    #[error("session cookie `{cookie}` changed mid-run")]
    SessionChanged { cookie: String },

    #[error("unexpected HTTP status {status} during `{stage}`")]
    Fetch { stage: &'static str, status: u16 },

    #[error("request error during `{stage}`: {source}")]
    Request {
        stage: &'static str,
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("page {page}: {message}")]
    ParseAnomaly { page: u32, message: String },

    #[error("failed to write `{}`: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("failed to encode `{}`: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: Arc<serde_json::Error>,
    },

    #[error("failed to write CSV `{}`: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: Arc<csv::Error>,
    },

    #[error("flush sink error: {0}")]
    Sink(Arc<rusqlite::Error>),

    #[error("invalid URL `{0}`")]
    InvalidUrl(String),

    #[error("invalid selector `{0}`")]
    Selector(String),

    #[error("delay of {0} seconds is not a usable duration")]
    InvalidDelay(f64),
}

impl ScrapeError {
    pub fn request(stage: &'static str, error: reqwest::Error) -> Self {
        Self::Request {
            stage,
            source: Arc::new(error),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source: Arc::new(error),
        }
    }

    pub fn encode(path: impl Into<PathBuf>, error: serde_json::Error) -> Self {
        Self::Encode {
            path: path.into(),
            source: Arc::new(error),
        }
    }

    pub fn csv(path: impl Into<PathBuf>, error: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source: Arc::new(error),
        }
    }

    /// Network failures and 5xx/429 responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::Fetch { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for ScrapeError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sink(Arc::new(value))
    }
}
