//! Company listing parser for search result pages.
//!
//! A results page describes each company twice: once as a visible table row
//! and once as a block of indexed hidden inputs such as
//! `ccJjCrpSelKekkLst_st[3].eqMgrCd`. Both are read and merged by code.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::ScrapeError;
use crate::types::{CompanyCode, CompanyLinks, CompanyRecord, RecordSource};

/// Hidden fields of one pseudo-array element, keyed by field name
pub type HiddenRecord = BTreeMap<String, String>;

const CODE_FIELD: &str = "eqMgrCd";
const NAME_FIELD: &str = "eqMgrNm";
const SEGMENT_FIELD: &str = "szkbuNm";
const INDUSTRY_FIELD: &str = "gyshDspNm";
const FISCAL_FIELD: &str = "dspYuKssnKi";

// Column order of a results table row
const CODE_COL: usize = 0;
const NAME_COL: usize = 1;
const SEGMENT_COL: usize = 2;
const INDUSTRY_COL: usize = 3;
const FISCAL_COL: usize = 4;
const ALERTS_COL: usize = 5;

/// Smallest row that can hold code, name, segment and industry
const MIN_CELLS: usize = INDUSTRY_COL + 1;

/// Parser for listing pages
pub struct ListingParser {
    indexed_name: Regex,
    prefix: String,
    detail_marker: String,
    hidden_input: Selector,
    row: Selector,
    anchor: Selector,
}

/// Visible fields of one table row, before merging
#[derive(Debug, Clone, PartialEq)]
struct TableRow {
    code: CompanyCode,
    name: String,
    market_segment: String,
    industry: String,
    fiscal_year_end: String,
    alerts: Option<String>,
    links: CompanyLinks,
}

impl ListingParser {
    pub fn new(prefix: &str, detail_marker: &str) -> Result<Self, ScrapeError> {
        Ok(Self {
            indexed_name: Regex::new(r"^(.+)\[(\d+)\]\.(.+)$")
                .map_err(|_| ScrapeError::Selector("indexed field pattern".to_string()))?,
            prefix: prefix.to_string(),
            detail_marker: detail_marker.to_string(),
            hidden_input: selector("input[type=\"hidden\"]")?,
            row: selector("tr")?,
            anchor: selector("a")?,
        })
    }

    /// Records of one page, empty when nothing matches.
    pub fn parse(
        &self,
        document: &Html,
        page: u32,
        extracted_at: DateTime<Utc>,
    ) -> Vec<CompanyRecord> {
        let hidden = self.parse_hidden(document);
        let rows = self.parse_table(document);

        if rows.is_empty() {
            return hidden_only_records(&hidden, page, extracted_at);
        }

        rows.into_iter()
            .map(|row| {
                let supplement = hidden
                    .values()
                    .find(|record| {
                        record
                            .get(CODE_FIELD)
                            .is_some_and(|code| code.trim() == row.code.as_str())
                    })
                    .cloned();

                CompanyRecord {
                    code: row.code,
                    name: row.name,
                    market_segment: row.market_segment,
                    industry: row.industry,
                    fiscal_year_end: row.fiscal_year_end,
                    alerts: row.alerts,
                    links: (!row.links.is_empty()).then_some(row.links),
                    hidden_fields: supplement,
                    index: None,
                    source: RecordSource::Table,
                    page,
                    extracted_at,
                }
            })
            .collect()
    }

    /// Group `prefix[N].field` hidden inputs by index
    pub fn parse_hidden(&self, document: &Html) -> BTreeMap<usize, HiddenRecord> {
        let mut records: BTreeMap<usize, HiddenRecord> = BTreeMap::new();

        for input in document.select(&self.hidden_input) {
            let Some(name) = input.value().attr("name") else {
                continue;
            };
            let Some(caps) = self.indexed_name.captures(name) else {
                continue;
            };
            if &caps[1] != self.prefix {
                continue;
            }
            let Ok(index) = caps[2].parse::<usize>() else {
                continue;
            };

            let value = input.value().attr("value").unwrap_or_default();
            records
                .entry(index)
                .or_default()
                .insert(caps[3].to_string(), value.to_string());
        }

        records
    }

    fn parse_table(&self, document: &Html) -> Vec<TableRow> {
        let mut seen = HashSet::new();
        let mut rows = Vec::new();

        for row in document.select(&self.row) {
            let cells = row_cells(row);
            if cells.len() < MIN_CELLS {
                continue;
            }
            // Header rows and layout rows fail the code check
            let Some(code) = CompanyCode::from_cell(&cell_text(cells[CODE_COL])) else {
                continue;
            };
            if !seen.insert(code.clone()) {
                continue;
            }

            let text_at = |i: usize| cells.get(i).map(|cell| cell_text(*cell)).unwrap_or_default();
            let alerts = text_at(ALERTS_COL);

            rows.push(TableRow {
                code,
                name: text_at(NAME_COL),
                market_segment: text_at(SEGMENT_COL),
                industry: text_at(INDUSTRY_COL),
                fiscal_year_end: text_at(FISCAL_COL),
                alerts: (!alerts.is_empty()).then_some(alerts),
                links: self.row_links(&cells),
            });
        }

        rows
    }

    fn row_links(&self, cells: &[ElementRef<'_>]) -> CompanyLinks {
        let mut links = CompanyLinks::default();

        for (i, cell) in cells.iter().enumerate() {
            let Some(href) = cell
                .select(&self.anchor)
                .next()
                .and_then(|anchor| anchor.value().attr("href"))
                .map(str::trim)
                .filter(|href| !href.is_empty())
            else {
                continue;
            };

            if href.contains(self.detail_marker.as_str()) {
                links.stock_prices_url = Some(href.to_string());
            } else if !href.starts_with("javascript:") {
                links.other.insert(format!("link_{i}"), href.to_string());
            }
        }

        links
    }
}

/// One record per hidden index that carries a code
fn hidden_only_records(
    hidden: &BTreeMap<usize, HiddenRecord>,
    page: u32,
    extracted_at: DateTime<Utc>,
) -> Vec<CompanyRecord> {
    hidden
        .iter()
        .filter_map(|(index, fields)| {
            let code = CompanyCode::from_hidden(fields.get(CODE_FIELD)?)?;
            let get = |key: &str| fields.get(key).map(|v| v.trim().to_string()).unwrap_or_default();

            Some(CompanyRecord {
                code,
                name: get(NAME_FIELD),
                market_segment: get(SEGMENT_FIELD),
                industry: get(INDUSTRY_FIELD),
                fiscal_year_end: get(FISCAL_FIELD),
                alerts: None,
                links: None,
                hidden_fields: Some(fields.clone()),
                index: Some(*index),
                source: RecordSource::HiddenFields,
                page,
                extracted_at,
            })
        })
        .collect()
}

/// Direct `td`/`th` children, so nested tables do not shift the columns
fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .collect()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|_| ScrapeError::Selector(css.to_string()))
}
