//! Final artifacts: the full record set as JSON, plus a flat projection of it
//! as JSON and CSV.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::OutputConfig;
use crate::error::ScrapeError;
use crate::scraper::{RunOutcome, StopReason};
use crate::types::{CompanyRecord, Statistics};

const METHOD: &str = "jpx_pagination_scraping";

/// Column order of [`SimpleCompany`]
const CSV_HEADER: [&str; 7] = [
    "code",
    "name",
    "market_segment",
    "industry",
    "fiscal_year_end",
    "page",
    "stock_prices_url",
];

/// Full artifact, records with hidden-field supplements and statistics
#[derive(Debug, Serialize)]
pub struct FullReport<'a> {
    pub success: bool,
    pub method: &'static str,
    pub pages_processed: u32,
    pub total_companies: usize,
    pub expected_total_items: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub statistics: &'a Statistics,
    pub companies: &'a [CompanyRecord],
}

impl<'a> FullReport<'a> {
    pub fn from_outcome(outcome: &'a RunOutcome) -> Self {
        let records = outcome.accumulator.records();
        Self {
            success: outcome.is_success(),
            method: METHOD,
            pages_processed: outcome.pages_processed,
            total_companies: records.len(),
            expected_total_items: outcome.expected_total,
            stop_reason: outcome.stop_reason(),
            partial: !outcome.is_success(),
            error: outcome.error().map(ToString::to_string),
            statistics: outcome.accumulator.statistics(),
            companies: records,
        }
    }
}

/// One company in the simplified artifact, also one row of the CSV table
#[derive(Debug, Serialize)]
pub struct SimpleCompany<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub market_segment: &'a str,
    pub industry: &'a str,
    pub fiscal_year_end: &'a str,
    pub page: u32,
    pub stock_prices_url: &'a str,
}

impl<'a> From<&'a CompanyRecord> for SimpleCompany<'a> {
    fn from(record: &'a CompanyRecord) -> Self {
        Self {
            code: record.code.as_str(),
            name: &record.name,
            market_segment: &record.market_segment,
            industry: &record.industry,
            fiscal_year_end: &record.fiscal_year_end,
            page: record.page,
            stock_prices_url: record.stock_prices_url().unwrap_or_default(),
        }
    }
}

/// Simplified artifact, a fixed field subset per company
#[derive(Debug, Serialize)]
pub struct SimpleReport<'a> {
    pub total_companies: usize,
    pub expected_total: Option<u32>,
    pub pages_processed: u32,
    pub companies: Vec<SimpleCompany<'a>>,
}

impl<'a> SimpleReport<'a> {
    pub fn from_outcome(outcome: &'a RunOutcome) -> Self {
        let records = outcome.accumulator.records();
        Self {
            total_companies: records.len(),
            expected_total: outcome.expected_total,
            pages_processed: outcome.pages_processed,
            companies: records.iter().map(SimpleCompany::from).collect(),
        }
    }
}

/// Where the artifacts of a run were written
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub full: PathBuf,
    pub simple: PathBuf,
    pub csv: Option<PathBuf>,
}

/// Write every artifact for `outcome`, partial runs included
pub fn save_reports(outcome: &RunOutcome, output: &OutputConfig) -> Result<ArtifactPaths, ScrapeError> {
    let paths = ArtifactPaths {
        full: output.full_path(),
        simple: output.simple_path(),
        csv: output.csv_path(),
    };

    let simple = SimpleReport::from_outcome(outcome);
    write_json(&paths.full, &FullReport::from_outcome(outcome))?;
    write_json(&paths.simple, &simple)?;
    if let Some(path) = &paths.csv {
        write_csv(path, &simple.companies)?;
    }

    Ok(paths)
}

fn ensure_parent(path: &Path) -> Result<(), ScrapeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| ScrapeError::persistence(parent, err))?;
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ScrapeError> {
    ensure_parent(path)?;
    let content = serde_json::to_string_pretty(value).map_err(|err| ScrapeError::encode(path, err))?;
    std::fs::write(path, content).map_err(|err| ScrapeError::persistence(path, err))?;
    Ok(())
}

/// Header row plus one row per company, even when there are none
fn write_csv(path: &Path, companies: &[SimpleCompany<'_>]) -> Result<(), ScrapeError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|err| ScrapeError::csv(path, err))?;
    if companies.is_empty() {
        writer
            .write_record(CSV_HEADER)
            .map_err(|err| ScrapeError::csv(path, err))?;
    }
    for company in companies {
        writer
            .serialize(company)
            .map_err(|err| ScrapeError::csv(path, err))?;
    }
    writer
        .flush()
        .map_err(|err| ScrapeError::persistence(path, err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::RunEnd;
    use crate::types::fixtures::company;
    use crate::types::{CompanyLinks, RunAccumulator};

    fn outcome(end: RunEnd) -> RunOutcome {
        let mut accumulator = RunAccumulator::new();
        let mut linked = company("13010", "Prime", "Fishery", 1);
        linked.links = Some(CompanyLinks {
            stock_prices_url: Some("https://quote.jpx.co.jp/stock_detail?code=1301".to_string()),
            ..Default::default()
        });
        accumulator.absorb(vec![linked, company("13050", "Standard", "Foods", 2)]);

        RunOutcome {
            accumulator,
            pages_processed: 2,
            expected_total: Some(1622),
            flushes: 0,
            end,
        }
    }

    #[test]
    fn test_full_report_fields() {
        let outcome = outcome(RunEnd::Stopped(StopReason::PageLimit));
        let json = serde_json::to_value(FullReport::from_outcome(&outcome)).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["method"], METHOD);
        assert_eq!(json["pages_processed"], 2);
        assert_eq!(json["total_companies"], 2);
        assert_eq!(json["expected_total_items"], 1622);
        assert_eq!(json["stop_reason"], "page_limit");
        assert_eq!(json["statistics"]["segments"]["Prime"], 1);
        assert!(json.get("partial").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_partial_report_carries_error() {
        let outcome = outcome(RunEnd::Failed(ScrapeError::Fetch {
            stage: "data",
            status: 503,
        }));
        let json = serde_json::to_value(FullReport::from_outcome(&outcome)).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["partial"], true);
        assert!(json["error"].as_str().unwrap().contains("503"));
        assert_eq!(json["companies"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_simple_projection() {
        let outcome = outcome(RunEnd::Stopped(StopReason::NoNext));
        let json = serde_json::to_value(SimpleReport::from_outcome(&outcome)).unwrap();

        assert_eq!(json["expected_total"], 1622);
        let companies = json["companies"].as_array().unwrap();
        assert_eq!(
            companies[0]["stock_prices_url"],
            "https://quote.jpx.co.jp/stock_detail?code=1301"
        );
        assert_eq!(companies[1]["stock_prices_url"], "");
        assert_eq!(companies[1]["page"], 2);

        let keys: Vec<&str> = companies[0].as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 7);
    }

    #[test]
    fn test_save_reports_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            dir: dir.path().join("out"),
            ..Default::default()
        };

        let paths = save_reports(&outcome(RunEnd::Stopped(StopReason::NoNext)), &output).unwrap();
        assert!(paths.full.exists());
        assert!(paths.simple.exists());
        assert!(paths.simple.ends_with("jpx_all_companies_simple.json"));
        assert!(paths.csv.unwrap().exists());
    }

    #[test]
    fn test_csv_table_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let paths = save_reports(&outcome(RunEnd::Stopped(StopReason::NoNext)), &output).unwrap();
        let mut reader = csv::Reader::from_path(paths.csv.unwrap()).unwrap();

        let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(header, CSV_HEADER);

        let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "13010");
        assert_eq!(&rows[0][6], "https://quote.jpx.co.jp/stock_detail?code=1301");
        assert_eq!(&rows[1][2], "Standard");
        assert_eq!(&rows[1][5], "2");
        assert_eq!(&rows[1][6], "");
    }

    #[test]
    fn test_csv_header_without_companies() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let empty = RunOutcome {
            accumulator: RunAccumulator::new(),
            pages_processed: 1,
            expected_total: None,
            flushes: 0,
            end: RunEnd::Stopped(StopReason::EmptyPage),
        };

        let paths = save_reports(&empty, &output).unwrap();
        let mut reader = csv::Reader::from_path(paths.csv.unwrap()).unwrap();
        assert_eq!(reader.headers().unwrap().len(), 7);
        assert_eq!(reader.records().count(), 0);
    }

    #[test]
    fn test_csv_disabled_by_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            dir: dir.path().to_path_buf(),
            csv_file: String::new(),
            ..Default::default()
        };

        let paths = save_reports(&outcome(RunEnd::Stopped(StopReason::NoNext)), &output).unwrap();
        assert!(paths.csv.is_none());
        assert!(!dir.path().join("jpx_all_companies.csv").exists());
    }
}
