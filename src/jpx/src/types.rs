//! Scraped records and the per-run accumulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Securities code of a listed company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyCode(String);

impl CompanyCode {
    /// Strict form used for visible table cells: exactly five ASCII digits.
    pub fn from_cell(text: &str) -> Option<Self> {
        let text = text.trim();
        (text.len() == 5 && text.bytes().all(|b| b.is_ascii_digit())).then(|| Self(text.to_string()))
    }

    /// Lenient form used for hidden fields: any non-blank value.
    pub fn from_hidden(value: &str) -> Option<Self> {
        let value = value.trim();
        (!value.is_empty()).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which extraction pass produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Table,
    HiddenFields,
}

/// Links found in a company's table row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_prices_url: Option<String>,
    /// Other hrefs keyed `link_<cell index>`
    #[serde(flatten)]
    pub other: BTreeMap<String, String>,
}

impl CompanyLinks {
    pub fn is_empty(&self) -> bool {
        self.stock_prices_url.is_none() && self.other.is_empty()
    }
}

/// One listed company scraped from a results page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub code: CompanyCode,
    pub name: String,
    pub market_segment: String,
    pub industry: String,
    pub fiscal_year_end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<CompanyLinks>,
    /// Indexed hidden fields of the same company, keyed by field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_fields: Option<BTreeMap<String, String>>,
    /// Position in the hidden-field pseudo-array, when built from it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub source: RecordSource,
    pub page: u32,
    pub extracted_at: DateTime<Utc>,
}

impl CompanyRecord {
    pub fn stock_prices_url(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|links| links.stock_prices_url.as_deref())
    }
}

/// Running tallies by market segment and industry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub segments: BTreeMap<String, usize>,
    pub industries: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn record(&mut self, company: &CompanyRecord) {
        *self
            .segments
            .entry(label_or_unknown(&company.market_segment))
            .or_default() += 1;
        *self
            .industries
            .entry(label_or_unknown(&company.industry))
            .or_default() += 1;
    }

    /// Industries by descending count, ties broken by name
    pub fn top_industries(&self, n: usize) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self
            .industries
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(n);
        ranked
    }
}

fn label_or_unknown(label: &str) -> String {
    if label.trim().is_empty() {
        "Unknown".to_string()
    } else {
        label.to_string()
    }
}

/// Records collected so far plus their statistics.
///
/// Owned by the run loop and threaded through each page step.
#[derive(Debug, Clone, Default)]
pub struct RunAccumulator {
    records: Vec<CompanyRecord>,
    seen: HashSet<CompanyCode>,
    statistics: Statistics,
    flushed: usize,
}

impl RunAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one page of records, dropping codes already collected.
    ///
    /// Returns the number of records actually added.
    pub fn absorb(&mut self, page_records: Vec<CompanyRecord>) -> usize {
        let before = self.records.len();
        for record in page_records {
            if self.seen.insert(record.code.clone()) {
                self.statistics.record(&record);
                self.records.push(record);
            }
        }
        self.records.len() - before
    }

    pub fn records(&self) -> &[CompanyRecord] {
        &self.records
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records not yet handed to the intermediate sink
    pub fn unflushed(&self) -> &[CompanyRecord] {
        &self.records[self.flushed..]
    }

    pub fn mark_flushed(&mut self) {
        self.flushed = self.records.len();
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::company;
    use super::*;

    #[test]
    fn test_code_from_cell() {
        assert!(CompanyCode::from_cell("13010").is_some());
        assert!(CompanyCode::from_cell(" 13010 ").is_some());
        assert!(CompanyCode::from_cell("1301").is_none());
        assert!(CompanyCode::from_cell("130A0").is_none());
        assert!(CompanyCode::from_cell("コード").is_none());
    }

    #[test]
    fn test_code_from_hidden() {
        assert_eq!(CompanyCode::from_hidden("130A0").unwrap().as_str(), "130A0");
        assert!(CompanyCode::from_hidden("  ").is_none());
    }

    #[test]
    fn test_absorb_deduplicates_by_code() {
        let mut acc = RunAccumulator::new();
        let added = acc.absorb(vec![
            company("13010", "Prime", "Fishery", 1),
            company("13050", "Prime", "Fishery", 1),
        ]);
        assert_eq!(added, 2);

        let added = acc.absorb(vec![
            company("13010", "Prime", "Fishery", 2),
            company("13060", "Standard", "Foods", 2),
        ]);
        assert_eq!(added, 1);
        assert_eq!(acc.len(), 3);
        assert_eq!(acc.statistics().segments["Prime"], 2);
        assert_eq!(acc.statistics().segments["Standard"], 1);
    }

    #[test]
    fn test_blank_labels_count_as_unknown() {
        let mut acc = RunAccumulator::new();
        acc.absorb(vec![company("13010", "", "", 1)]);
        assert_eq!(acc.statistics().segments["Unknown"], 1);
        assert_eq!(acc.statistics().industries["Unknown"], 1);
    }

    #[test]
    fn test_unflushed_window() {
        let mut acc = RunAccumulator::new();
        acc.absorb(vec![company("13010", "Prime", "Foods", 1)]);
        assert_eq!(acc.unflushed().len(), 1);
        acc.mark_flushed();
        assert!(acc.unflushed().is_empty());
        acc.absorb(vec![company("13020", "Prime", "Foods", 2)]);
        assert_eq!(acc.unflushed().len(), 1);
        assert_eq!(acc.unflushed()[0].code.as_str(), "13020");
    }

    #[test]
    fn test_top_industries_ordering() {
        let mut stats = Statistics::default();
        for (code, industry) in [
            ("10000", "Foods"),
            ("10001", "Banks"),
            ("10002", "Banks"),
            ("10003", "Chemicals"),
        ] {
            stats.record(&company(code, "Prime", industry, 1));
        }
        let top = stats.top_industries(2);
        assert_eq!(top, vec![("Banks", 2), ("Chemicals", 1)]);
    }

    #[test]
    fn test_links_serialize_flat() {
        let mut links = CompanyLinks {
            stock_prices_url: Some("/stock_detail?code=13010".to_string()),
            ..Default::default()
        };
        links.other.insert("link_1".to_string(), "/profile".to_string());

        let json = serde_json::to_value(&links).unwrap();
        assert_eq!(json["stock_prices_url"], "/stock_detail?code=13010");
        assert_eq!(json["link_1"], "/profile");
    }
}
