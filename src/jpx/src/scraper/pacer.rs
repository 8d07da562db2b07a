//! Fixed pause between page requests.

use tokio::time::{Duration, Instant};

use crate::error::ScrapeError;

/// Convert a configured delay in seconds.
///
/// Negative, NaN, infinite and out-of-range values are rejected.
pub fn delay_from_secs(secs: f64) -> Result<Duration, ScrapeError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ScrapeError::InvalidDelay(secs))
}

/// Keeps at least `delay` between consecutive pages.
///
/// Time spent fetching and parsing counts toward the pause, so a slow page
/// is not followed by the full delay again.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last_page: Option<Instant>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_page: None,
        }
    }

    /// Time still to wait before the next page may be requested
    fn remaining(&self, now: Instant) -> Duration {
        match self.last_page {
            Some(last) => self.delay.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Wait out the remaining pause, then mark the start of a new page
    pub async fn wait(&mut self) {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
        self.last_page = Some(Instant::now());
    }
}
