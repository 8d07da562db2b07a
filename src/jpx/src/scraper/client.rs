//! HTTP client for the listing search: session priming and form POSTs.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{header, Client, StatusCode};
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use super::form::{hidden_fields, FormFields};
use super::session::{resolve_token, token_from_cookie_header, Session, SessionToken, TokenSource};
use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::retry::{retry_if, RetryConfig};

/// The two POST targets of the search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Search form submission (also the session init page)
    Search,
    /// Results pagination form submission
    Results,
}

/// Raw page as returned by the server
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub url: Url,
    pub body: String,
}

/// Cookie-bearing client bound to one JPX host
#[derive(Debug, Clone)]
pub struct JpxClient {
    http: Client,
    jar: Arc<Jar>,
    search_url: Url,
    results_url: Url,
    origin: String,
    session_cookie: String,
    session_in_url: bool,
    search_form_name: String,
    retry: RetryConfig,
}

impl JpxClient {
    pub fn new(config: &ScraperConfig, retry: RetryConfig) -> Result<Self, ScrapeError> {
        let base = Url::parse(&config.base_url)
            .map_err(|_| ScrapeError::InvalidUrl(config.base_url.clone()))?;
        let search_url = base
            .join(&config.search_path)
            .map_err(|_| ScrapeError::InvalidUrl(config.search_path.clone()))?;
        let results_url = base
            .join(&config.results_path)
            .map_err(|_| ScrapeError::InvalidUrl(config.results_path.clone()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .cookie_provider(jar.clone())
            .default_headers(headers)
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| ScrapeError::request("build_client", err))?;

        Ok(Self {
            http,
            jar,
            origin: base.origin().ascii_serialization(),
            search_url,
            results_url,
            session_cookie: config.session_cookie.clone(),
            session_in_url: config.session_in_url,
            search_form_name: config.search_form_name.clone(),
            retry,
        })
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> &Url {
        match endpoint {
            Endpoint::Search => &self.search_url,
            Endpoint::Results => &self.results_url,
        }
    }

    /// Load the search page and obtain the session token.
    ///
    /// Fails with [`ScrapeError::SessionUnavailable`] when neither the cookie
    /// jar nor the final URL carries a token.
    pub async fn open_session(&self) -> Result<Session, ScrapeError> {
        let stage = "session_init";
        let response = retry_if(
            &self.retry,
            stage,
            || self.get_once(&self.search_url, stage),
            ScrapeError::is_retryable,
        )
        .await?;

        let cookie_header = self.cookie_header();
        let token = resolve_token(cookie_header.as_deref(), &self.session_cookie, &response.url)
            .ok_or_else(|| ScrapeError::SessionUnavailable {
                cookie: self.session_cookie.clone(),
            })?;

        let search_form = {
            let document = Html::parse_document(&response.body);
            hidden_fields(&document, &self.search_form_name)?
        };

        info!(
            token = %token.redacted(),
            source = ?token.source(),
            hidden_fields = search_form.as_ref().map_or(0, Vec::len),
            "session established"
        );

        Ok(Session {
            token,
            search_form,
            html: response.body,
        })
    }

    /// POST a form body to `endpoint`, retrying transient failures.
    ///
    /// Fails with [`ScrapeError::SessionChanged`] when the server has set a
    /// different session cookie since `token` was obtained.
    pub async fn post_form(
        &self,
        endpoint: Endpoint,
        token: &SessionToken,
        form: &FormFields,
        stage: &'static str,
    ) -> Result<PageResponse, ScrapeError> {
        self.check_jar_token(token)?;

        let url = self.target_url(endpoint, token);
        let referer = self.target_url(Endpoint::Search, token);

        retry_if(
            &self.retry,
            stage,
            || self.post_once(&url, &referer, form, stage),
            ScrapeError::is_retryable,
        )
        .await
    }

    fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.search_url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    /// The jar must hold no session cookie or the one the run started with
    fn check_jar_token(&self, token: &SessionToken) -> Result<(), ScrapeError> {
        let jar_token = self
            .cookie_header()
            .and_then(|header| token_from_cookie_header(&header, &self.session_cookie));
        match jar_token {
            Some(value) if value != token.value() => {
                warn!(
                    expected = %token.redacted(),
                    "session cookie rotated by the server"
                );
                Err(ScrapeError::SessionChanged {
                    cookie: self.session_cookie.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn target_url(&self, endpoint: Endpoint, token: &SessionToken) -> Url {
        let url = self.endpoint_url(endpoint);
        // A token recovered from the URL is not in the cookie jar
        if self.session_in_url || token.source() == TokenSource::Url {
            token.embed_in(url)
        } else {
            url.clone()
        }
    }

    async fn get_once(&self, url: &Url, stage: &'static str) -> Result<PageResponse, ScrapeError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ScrapeError::request(stage, err))?;
        read_page(response, stage).await
    }

    async fn post_once(
        &self,
        url: &Url,
        referer: &Url,
        form: &FormFields,
        stage: &'static str,
    ) -> Result<PageResponse, ScrapeError> {
        debug!(stage, url = %url, fields = form.len(), "POST");
        let response = self
            .http
            .post(url.clone())
            .header(header::ORIGIN, self.origin.as_str())
            .header(header::REFERER, referer.as_str())
            .form(form)
            .send()
            .await
            .map_err(|err| ScrapeError::request(stage, err))?;
        read_page(response, stage).await
    }
}

async fn read_page(
    response: reqwest::Response,
    stage: &'static str,
) -> Result<PageResponse, ScrapeError> {
    let status = response.status();
    if !status.is_success() {
        return Err(fetch_error(stage, status));
    }

    let url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|err| ScrapeError::request(stage, err))?;

    Ok(PageResponse {
        url,
        body,
    })
}

fn fetch_error(stage: &'static str, status: StatusCode) -> ScrapeError {
    ScrapeError::Fetch {
        stage,
        status: status.as_u16(),
    }
}
