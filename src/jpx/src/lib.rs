//! JPX listed company search scraper
//!
//! Opens a search session, walks the paginated result list and collects
//! one record per listed company.

pub mod cli;
pub mod config;
pub mod error;
pub mod retry;
pub mod scraper;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::ScrapeError;
pub use scraper::{RunOutcome, Runner};
