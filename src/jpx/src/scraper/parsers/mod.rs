//! HTML parsers for JPX listing result pages.

pub mod listing;
pub mod pagination;

pub use listing::{HiddenRecord, ListingParser};
pub use pagination::{PaginationParser, PaginationState};
