//! Pagination summary parser for the listing results page.
//!
//! The page carries no paging API; the only source of truth is a block like
//!
//! ```html
//! <div class="pagingmenu">
//!   <div class="left">Display of 1-10 items/1622</div>
//!   <b class="current">1</b>
//!   <div class="next_e"><a href="javascript:setPage(2)">Next</a></div>
//! </div>
//! ```

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::error::ScrapeError;

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*[-–〜~]\s*(\d+)\s*items?\s*/\s*(\d+)").expect("summary regex")
});

/// Paging position derived from one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub current_page: u32,
    pub items_per_page: u32,
    pub total_items: Option<u32>,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            current_page: 1,
            items_per_page: 10,
            total_items: None,
            total_pages: 1,
            has_next: false,
            has_prev: false,
        }
    }
}

impl PaginationState {
    /// Apply a "start-end items/total" summary.
    ///
    /// Returns `false` and leaves `self` untouched when the text has no
    /// usable triple.
    fn apply_summary(&mut self, text: &str) -> bool {
        let Some(caps) = SUMMARY_RE.captures(text) else {
            return false;
        };
        let (Ok(start), Ok(end), Ok(total)) = (
            caps[1].parse::<u32>(),
            caps[2].parse::<u32>(),
            caps[3].parse::<u32>(),
        ) else {
            return false;
        };
        if start == 0 || end < start {
            return false;
        }

        let per_page = end - start + 1;
        self.items_per_page = per_page;
        self.total_items = Some(total);
        self.current_page = (start - 1) / per_page + 1;
        self.total_pages = total.div_ceil(per_page);
        true
    }

    /// Items the summary says exist past the pages already seen
    pub fn items_remaining_after(&self, page: u32) -> Option<u32> {
        self.total_items
            .map(|total| total.saturating_sub(page.saturating_mul(self.items_per_page)))
    }
}

/// Parser for the `pagingmenu` block
pub struct PaginationParser {
    menu: Selector,
    summary: Selector,
    current: Selector,
    next: Selector,
    link: Selector,
}

impl PaginationParser {
    pub fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            menu: selector("div.pagingmenu")?,
            summary: selector("div.left")?,
            current: selector("b.current")?,
            next: selector("div.next_e")?,
            link: selector("a")?,
        })
    }

    /// Pagination state of `document`, defaulted when no paging block exists
    pub fn parse(&self, document: &Html) -> PaginationState {
        let mut state = PaginationState::default();

        let Some(menu) = document.select(&self.menu).next() else {
            return state;
        };

        if let Some(summary) = menu.select(&self.summary).next() {
            state.apply_summary(&summary.text().collect::<String>());
        }

        // An explicit marker beats the derived page number
        if let Some(current) = menu.select(&self.current).next() {
            if let Ok(page) = current.text().collect::<String>().trim().parse::<u32>() {
                if page > 0 {
                    state.current_page = page;
                }
            }
        }

        state.has_next = menu
            .select(&self.next)
            .next()
            .is_some_and(|next| self.has_active_link(next));
        state.has_prev = state.current_page > 1;

        state
    }

    /// A rendered-but-disabled "next" control has no usable anchor
    fn has_active_link(&self, control: ElementRef<'_>) -> bool {
        control.select(&self.link).any(|anchor| {
            let el = anchor.value();
            let disabled = el.attr("aria-disabled") == Some("true")
                || el.attr("disabled").is_some()
                || el.classes().any(|class| class == "disabled");
            !disabled && el.attr("href").is_some_and(|href| !href.trim().is_empty())
        })
    }
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|_| ScrapeError::Selector(css.to_string()))
}
