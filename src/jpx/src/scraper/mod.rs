//! Scraper for the JPX listed company search
//!
//! Session priming, form POSTs, result parsing and the pagination loop.

pub mod client;
pub mod continuation;
pub mod form;
pub mod pacer;
pub mod parsers;
pub mod runner;
pub mod session;

pub use client::{Endpoint, JpxClient, PageResponse};
pub use continuation::{decide, Continuation, NextRequest, PageDecision, StopReason};
pub use form::{build_form, FormFields, SearchFilters};
pub use pacer::Pacer;
pub use parsers::{ListingParser, PaginationParser, PaginationState};
pub use runner::{advance, PageAnalysis, RunEnd, RunOutcome, RunSettings, RunState, Runner};
pub use session::{Session, SessionToken, TokenSource};

/// Default host of the listed company search
pub const BASE_URL: &str = "https://www2.jpx.co.jp";
