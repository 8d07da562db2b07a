//! Stop/continue decision after each page and assembly of the next request.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use super::client::Endpoint;
use super::form::{build_form, set_field, FormFields, SearchFilters};
use super::parsers::PaginationState;
use crate::config::FallbackMode;

/// Why a run ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The page had no active "next" control
    NoNext,
    /// The configured page cap was reached
    PageLimit,
    /// The page added no new records
    EmptyPage,
    /// The page counter reached the total from the summary
    LastByCount,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::NoNext => "no next page",
            StopReason::PageLimit => "page limit reached",
            StopReason::EmptyPage => "page without new records",
            StopReason::LastByCount => "last page by item count",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDecision {
    Continue,
    Stop(StopReason),
}

/// Evaluate the stop conditions for `page` in a fixed order.
///
/// `page` is the client-side counter, not the page the server claims to
/// have rendered; `new_records` counts records not seen on earlier pages.
pub fn decide(
    page: u32,
    pagination: &PaginationState,
    new_records: usize,
    max_pages: Option<u32>,
) -> PageDecision {
    if !pagination.has_next {
        return PageDecision::Stop(StopReason::NoNext);
    }
    if max_pages.is_some_and(|cap| page >= cap) {
        return PageDecision::Stop(StopReason::PageLimit);
    }
    if new_records == 0 {
        return PageDecision::Stop(StopReason::EmptyPage);
    }
    if pagination.total_items.is_some() && page >= pagination.total_pages {
        return PageDecision::Stop(StopReason::LastByCount);
    }
    PageDecision::Continue
}

/// A form POST ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct NextRequest {
    pub endpoint: Endpoint,
    pub form: FormFields,
    pub page: u32,
    /// Rebuilt from the search filters because the results form was missing
    pub degraded: bool,
}

/// Builds the request for each page of a run
#[derive(Debug, Clone)]
pub struct Continuation {
    filters: SearchFilters,
    search_hidden: Option<FormFields>,
    fallback: FallbackMode,
}

impl Continuation {
    pub fn new(
        filters: SearchFilters,
        search_hidden: Option<FormFields>,
        fallback: FallbackMode,
    ) -> Self {
        Self {
            filters,
            search_hidden,
            fallback,
        }
    }

    /// Search form submission for page 1
    pub fn first_request(&self) -> NextRequest {
        NextRequest {
            endpoint: Endpoint::Search,
            form: build_form(&self.filters, self.search_hidden.as_deref()),
            page: 1,
            degraded: false,
        }
    }

    /// Request for `next_page`, from the results form of the current page.
    ///
    /// Returns `None` when the form is missing and the fallback mode is
    /// [`FallbackMode::Stop`].
    pub fn next_request(&self, results_form: Option<&FormFields>, next_page: u32) -> Option<NextRequest> {
        match results_form {
            Some(hidden) => {
                let mut form = hidden.clone();
                set_field(&mut form, "Transition", "Transition");
                set_field(&mut form, "pageNo", next_page.to_string());
                set_field(&mut form, "currentPage", next_page.to_string());
                Some(NextRequest {
                    endpoint: Endpoint::Results,
                    form,
                    page: next_page,
                    degraded: false,
                })
            }
            None => match self.fallback {
                FallbackMode::Stop => None,
                FallbackMode::Resubmit => {
                    // The server may treat this as a fresh search and
                    // render page 1 again
                    warn!(
                        page = next_page,
                        "results form missing, resubmitting the search form"
                    );
                    let mut form = build_form(&self.filters, self.search_hidden.as_deref());
                    set_field(&mut form, "pageNo", next_page.to_string());
                    set_field(&mut form, "currentPage", next_page.to_string());
                    Some(NextRequest {
                        endpoint: Endpoint::Search,
                        form,
                        page: next_page,
                        degraded: true,
                    })
                }
            },
        }
    }
}
