//! Configuration for the JPX scraper.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::scraper::pacer::delay_from_secs;

/// Page sizes the search form accepts.
pub const PAGE_SIZES: [u32; 4] = [10, 50, 100, 200];

/// What to do when a results page carries no pagination form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Resubmit the search form with the page number injected.
    #[default]
    Resubmit,
    /// Treat the missing form as the end of the listing.
    Stop,
}

/// Remote site and run-loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    #[serde(default = "default_results_path")]
    pub results_path: String,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    /// Append `;jsessionid=<token>` to every POST target
    #[serde(default = "default_true")]
    pub session_in_url: bool,
    #[serde(default = "default_search_form_name")]
    pub search_form_name: String,
    #[serde(default = "default_results_form_name")]
    pub results_form_name: String,
    /// Prefix of the indexed hidden fields, e.g. `prefix[3].eqMgrCd`
    #[serde(default = "default_listing_prefix")]
    pub listing_prefix: String,
    #[serde(default = "default_detail_link_marker")]
    pub detail_link_marker: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
    #[serde(default)]
    pub max_pages: Option<u32>,
    /// Send the search form once before the data request on page 1
    #[serde(default = "default_true")]
    pub prime_request: bool,
    #[serde(default)]
    pub fallback: FallbackMode,
}

fn default_base_url() -> String {
    crate::scraper::BASE_URL.to_string()
}

fn default_search_path() -> String {
    "/tseHpFront/JJK020010Action.do".to_string()
}

fn default_results_path() -> String {
    "/tseHpFront/JJK020030Action.do".to_string()
}

fn default_session_cookie() -> String {
    "JSESSIONID".to_string()
}

fn default_search_form_name() -> String {
    "JJK020010Form".to_string()
}

fn default_results_form_name() -> String {
    "JJK020030Form".to_string()
}

fn default_listing_prefix() -> String {
    "ccJjCrpSelKekkLst_st".to_string()
}

fn default_detail_link_marker() -> String {
    "stock_detail".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_delay_secs() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            search_path: default_search_path(),
            results_path: default_results_path(),
            session_cookie: default_session_cookie(),
            session_in_url: true,
            search_form_name: default_search_form_name(),
            results_form_name: default_results_form_name(),
            listing_prefix: default_listing_prefix(),
            detail_link_marker: default_detail_link_marker(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            delay_secs: default_delay_secs(),
            max_pages: None,
            prime_request: true,
            fallback: FallbackMode::default(),
        }
    }
}

/// Fetch retry policy (fixed backoff)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    2000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryConfig {
        RetryConfig::fixed(self.max_retries, Duration::from_millis(self.backoff_ms))
    }
}

/// Search filters sent with the listing form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Market segment codes: 011 Prime, 012 Standard, 013 Growth, ...
    #[serde(default = "default_segments")]
    pub segments: Vec<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub company_code: String,
    #[serde(default)]
    pub include_delisted: bool,
}

fn default_page_size() -> u32 {
    100
}

fn default_segments() -> Vec<String> {
    vec!["011".to_string()]
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            segments: default_segments(),
            industry: None,
            location: None,
            company_name: String::new(),
            company_code: String::new(),
            include_delisted: false,
        }
    }
}

/// Artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_full_file")]
    pub full_file: String,
    #[serde(default = "default_simple_file")]
    pub simple_file: String,
    /// Flat company table; empty disables the CSV export
    #[serde(default = "default_csv_file")]
    pub csv_file: String,
    #[serde(default = "default_true")]
    pub snapshots: bool,
    /// Pages between intermediate flushes; 0 disables them
    #[serde(default = "default_flush_every")]
    pub flush_every: u32,
    #[serde(default = "default_sink_file")]
    pub sink_file: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_full_file() -> String {
    "jpx_all_companies.json".to_string()
}

fn default_simple_file() -> String {
    "jpx_all_companies_simple.json".to_string()
}

fn default_csv_file() -> String {
    "jpx_all_companies.csv".to_string()
}

fn default_flush_every() -> u32 {
    5
}

fn default_sink_file() -> String {
    "jpx_flush.sqlite3".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            full_file: default_full_file(),
            simple_file: default_simple_file(),
            csv_file: default_csv_file(),
            snapshots: true,
            flush_every: default_flush_every(),
            sink_file: default_sink_file(),
        }
    }
}

impl OutputConfig {
    pub fn full_path(&self) -> PathBuf {
        self.dir.join(&self.full_file)
    }

    pub fn simple_path(&self) -> PathBuf {
        self.dir.join(&self.simple_file)
    }

    pub fn csv_path(&self) -> Option<PathBuf> {
        (!self.csv_file.is_empty()).then(|| self.dir.join(&self.csv_file))
    }

    pub fn sink_path(&self) -> PathBuf {
        self.dir.join(&self.sink_file)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.dir.join("pages")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "jpx_scrape=info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// Load configuration from defaults, then `path` (or `jpx.*` when absent),
    /// then `JPX_` environment variables
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name("jpx").required(false),
        };

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(file)
            // JPX_SCRAPER__DELAY_SECS, JPX_FILTERS__PAGE_SIZE, ...
            .add_source(
                config::Environment::with_prefix("JPX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to assemble configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject settings the remote form or the run loop cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if !PAGE_SIZES.contains(&self.filters.page_size) {
            bail!(
                "page_size {} is not one of {:?}",
                self.filters.page_size,
                PAGE_SIZES
            );
        }
        if self.scraper.max_pages == Some(0) {
            bail!("max_pages must be at least 1");
        }
        delay_from_secs(self.scraper.delay_secs)
            .context("delay_secs must be a finite, non-negative number")?;
        url::Url::parse(&self.scraper.base_url)
            .with_context(|| format!("invalid base_url `{}`", self.scraper.base_url))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filters.page_size, 100);
        assert_eq!(config.scraper.fallback, FallbackMode::Resubmit);
        assert_eq!(config.output.flush_every, 5);
    }

    #[test]
    fn test_rejects_unknown_page_size() {
        let mut config = AppConfig::default();
        config.filters.page_size = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_page_cap() {
        let mut config = AppConfig::default();
        config.scraper.max_pages = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unusable_delay() {
        let mut config = AppConfig::default();
        for secs in [-0.5, f64::NAN, f64::INFINITY, 1e20] {
            config.scraper.delay_secs = secs;
            assert!(config.validate().is_err(), "{secs} accepted");
        }

        config.scraper.delay_secs = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[scraper]\nmax_pages = 3\nfallback = \"stop\"\n\n[filters]\npage_size = 50\nsegments = [\"011\", \"012\"]"
        )
        .unwrap();

        let config = AppConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.scraper.max_pages, Some(3));
        assert_eq!(config.scraper.fallback, FallbackMode::Stop);
        assert_eq!(config.filters.page_size, 50);
        assert_eq!(config.filters.segments, vec!["011", "012"]);
        // untouched sections keep their defaults
        assert_eq!(config.output.full_file, "jpx_all_companies.json");
    }

    #[test]
    fn test_output_paths() {
        let output = OutputConfig {
            dir: PathBuf::from("/tmp/run"),
            ..Default::default()
        };
        assert_eq!(
            output.full_path(),
            PathBuf::from("/tmp/run/jpx_all_companies.json")
        );
        assert_eq!(output.snapshot_dir(), PathBuf::from("/tmp/run/pages"));
        assert_eq!(
            output.csv_path(),
            Some(PathBuf::from("/tmp/run/jpx_all_companies.csv"))
        );

        let no_csv = OutputConfig {
            csv_file: String::new(),
            ..Default::default()
        };
        assert_eq!(no_csv.csv_path(), None);
    }
}
