//! Run loop for one paginated listing scrape.
//!
//! Each page goes through the same steps: fetch, parse into an owned
//! [`PageAnalysis`], fold into [`RunState`] with [`advance`], then either
//! stop or build the next request from the page just parsed.

use std::time::Duration;

use chrono::Utc;
use scraper::Html;
use tracing::{error, info, warn};

use super::client::{JpxClient, PageResponse};
use super::continuation::{decide, Continuation, NextRequest, PageDecision, StopReason};
use super::form::{hidden_fields, FormFields, SearchFilters};
use super::pacer::{delay_from_secs, Pacer};
use super::parsers::{ListingParser, PaginationParser, PaginationState};
use super::session::SessionToken;
use crate::config::{AppConfig, FallbackMode};
use crate::error::ScrapeError;
use crate::storage::{FlushRepository, SnapshotWriter};
use crate::types::{CompanyRecord, RunAccumulator};

/// Knobs for one run, resolved from [`AppConfig`] and CLI overrides
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub filters: SearchFilters,
    pub max_pages: Option<u32>,
    pub delay: Duration,
    pub prime_request: bool,
    pub fallback: FallbackMode,
    pub results_form_name: String,
    pub listing_prefix: String,
    pub detail_link_marker: String,
    /// Pages between sink flushes, 0 disables
    pub flush_every: u32,
    pub sink: Option<std::path::PathBuf>,
    pub snapshots: Option<SnapshotWriter>,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ScrapeError> {
        let output = &config.output;
        Ok(Self {
            filters: SearchFilters::from(&config.filters),
            max_pages: config.scraper.max_pages,
            delay: delay_from_secs(config.scraper.delay_secs)?,
            prime_request: config.scraper.prime_request,
            fallback: config.scraper.fallback,
            results_form_name: config.scraper.results_form_name.clone(),
            listing_prefix: config.scraper.listing_prefix.clone(),
            detail_link_marker: config.scraper.detail_link_marker.clone(),
            flush_every: output.flush_every,
            sink: (output.flush_every > 0).then(|| output.sink_path()),
            snapshots: output
                .snapshots
                .then(|| SnapshotWriter::new(output.snapshot_dir())),
        })
    }
}

/// Everything the run needs from one response, with the DOM already dropped
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub records: Vec<CompanyRecord>,
    pub pagination: PaginationState,
    /// Hidden fields of the results pagination form, if the page has one
    pub results_form: Option<FormFields>,
}

/// State threaded through the loop
#[derive(Debug, Clone)]
pub struct RunState {
    pub accumulator: RunAccumulator,
    /// Page being fetched, starting at 1
    pub page: u32,
    pub pages_processed: u32,
    /// Total items announced by the last pagination summary
    pub expected_total: Option<u32>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            accumulator: RunAccumulator::new(),
            page: 1,
            pages_processed: 0,
            expected_total: None,
        }
    }
}

/// Fold one page into the run state and decide what comes next.
///
/// On [`PageDecision::Continue`] the returned state already points at the
/// following page.
pub fn advance(
    mut state: RunState,
    records: Vec<CompanyRecord>,
    pagination: &PaginationState,
    max_pages: Option<u32>,
) -> (RunState, PageDecision) {
    let added = state.accumulator.absorb(records);
    state.pages_processed = state.page;
    if pagination.total_items.is_some() {
        state.expected_total = pagination.total_items;
    }

    let decision = decide(state.page, pagination, added, max_pages);
    if decision == PageDecision::Continue {
        state.page += 1;
    }
    (state, decision)
}

/// Zero records on a page the summary says should have some
pub fn parse_anomaly(page: u32, records: usize, pagination: &PaginationState) -> Option<ScrapeError> {
    if records > 0 {
        return None;
    }
    let remaining = pagination.items_remaining_after(page.saturating_sub(1))?;
    (remaining > 0).then(|| ScrapeError::ParseAnomaly {
        page,
        message: format!("no records extracted but {remaining} items remain"),
    })
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunEnd {
    Stopped(StopReason),
    Failed(ScrapeError),
}

/// Result of a run, complete or partial
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub accumulator: RunAccumulator,
    pub pages_processed: u32,
    pub expected_total: Option<u32>,
    pub flushes: u32,
    pub end: RunEnd,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.end, RunEnd::Stopped(_))
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match &self.end {
            RunEnd::Stopped(reason) => Some(*reason),
            RunEnd::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ScrapeError> {
        match &self.end {
            RunEnd::Failed(err) => Some(err),
            RunEnd::Stopped(_) => None,
        }
    }
}

/// Drives a run against the live site
pub struct Runner {
    client: JpxClient,
    listing: ListingParser,
    pagination: PaginationParser,
    settings: RunSettings,
}

impl Runner {
    pub fn new(client: JpxClient, settings: RunSettings) -> Result<Self, ScrapeError> {
        Ok(Self {
            listing: ListingParser::new(&settings.listing_prefix, &settings.detail_link_marker)?,
            pagination: PaginationParser::new()?,
            client,
            settings,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ScrapeError> {
        let client = JpxClient::new(&config.scraper, config.retry.policy())?;
        Self::new(client, RunSettings::from_config(config)?)
    }

    /// Parse one response body. The DOM does not outlive this call.
    pub fn analyze(&self, body: &str, page: u32) -> Result<PageAnalysis, ScrapeError> {
        let document = Html::parse_document(body);
        Ok(PageAnalysis {
            records: self.listing.parse(&document, page, Utc::now()),
            pagination: self.pagination.parse(&document),
            results_form: hidden_fields(&document, &self.settings.results_form_name)?,
        })
    }

    /// Scrape until a stop condition or an unrecoverable error.
    ///
    /// Only a missing session is returned as `Err`. Later failures end the
    /// run with [`RunEnd::Failed`] and keep the records gathered so far.
    pub async fn run(&self) -> Result<RunOutcome, ScrapeError> {
        let session = self.client.open_session().await?;
        if let Some(snapshots) = &self.settings.snapshots {
            if let Err(err) = snapshots.write_session(&session.html) {
                warn!(error = %err, "failed to save session page snapshot");
            }
        }

        let continuation = Continuation::new(
            self.settings.filters.clone(),
            session.search_form.clone(),
            self.settings.fallback,
        );
        let run_id = Utc::now().to_rfc3339();
        let mut pacer = Pacer::new(self.settings.delay);
        let mut sink: Option<FlushRepository> = None;
        let mut flushes = 0u32;
        let mut state = RunState::default();
        let mut request = continuation.first_request();

        let end = loop {
            pacer.wait().await;

            let response = match self.fetch(&session.token, &request).await {
                Ok(response) => response,
                Err(err) => {
                    error!(page = request.page, error = %err, "page fetch failed");
                    break RunEnd::Failed(err);
                }
            };

            if let Some(snapshots) = &self.settings.snapshots {
                if let Err(err) = snapshots.write_page(request.page, &response.body) {
                    warn!(page = request.page, error = %err, "failed to save page snapshot");
                }
            }

            let analysis = match self.analyze(&response.body, request.page) {
                Ok(analysis) => analysis,
                Err(err) => break RunEnd::Failed(err),
            };
            if let Some(anomaly) = parse_anomaly(request.page, analysis.records.len(), &analysis.pagination) {
                warn!(error = %anomaly, "parse anomaly");
            }

            let PageAnalysis {
                records,
                pagination,
                results_form,
            } = analysis;
            let extracted = records.len();
            let before = state.accumulator.len();
            let (next, decision) = advance(state, records, &pagination, self.settings.max_pages);
            state = next;

            info!(
                page = state.pages_processed,
                records = extracted,
                added = state.accumulator.len() - before,
                total = state.accumulator.len(),
                total_pages = pagination.total_pages,
                has_next = pagination.has_next,
                "page processed"
            );

            if self.flush_due(state.pages_processed) {
                match self.flush(&mut sink, &run_id, flushes + 1, &mut state.accumulator) {
                    Ok(()) => flushes += 1,
                    Err(err) => {
                        error!(error = %err, "intermediate flush failed");
                        break RunEnd::Failed(err);
                    }
                }
            }

            match decision {
                PageDecision::Stop(reason) => {
                    info!(%reason, pages = state.pages_processed, "stopping");
                    break RunEnd::Stopped(reason);
                }
                PageDecision::Continue => {
                    match continuation.next_request(results_form.as_ref(), state.page) {
                        Some(next_request) => request = next_request,
                        None => {
                            info!(page = state.page, "no results form, stopping");
                            break RunEnd::Stopped(StopReason::NoNext);
                        }
                    }
                }
            }
        };

        Ok(RunOutcome {
            pages_processed: state.pages_processed,
            expected_total: state.expected_total,
            accumulator: state.accumulator,
            flushes,
            end,
        })
    }

    /// POST the page request, preceded by a priming POST for page 1
    async fn fetch(
        &self,
        token: &SessionToken,
        request: &NextRequest,
    ) -> Result<PageResponse, ScrapeError> {
        if request.page == 1 && self.settings.prime_request {
            self.client
                .post_form(request.endpoint, token, &request.form, "prime")
                .await?;
        }
        self.client
            .post_form(request.endpoint, token, &request.form, "data")
            .await
    }

    fn flush_due(&self, pages_processed: u32) -> bool {
        self.settings.sink.is_some()
            && self.settings.flush_every > 0
            && pages_processed % self.settings.flush_every == 0
    }

    fn flush(
        &self,
        sink: &mut Option<FlushRepository>,
        run_id: &str,
        seq: u32,
        accumulator: &mut RunAccumulator,
    ) -> Result<(), ScrapeError> {
        let Some(path) = &self.settings.sink else {
            return Ok(());
        };
        if sink.is_none() {
            *sink = Some(FlushRepository::open(path)?);
        }
        let Some(repo) = sink.as_mut() else {
            return Ok(());
        };

        let written = repo.append(run_id, seq, accumulator.unflushed())?;
        accumulator.mark_flushed();
        info!(seq, written, "flushed records");
        Ok(())
    }
}
