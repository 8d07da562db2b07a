//! Server-side session token for the listing search.
//!
//! The search keeps its result set in the servlet session, so every request
//! of a run has to carry the same `JSESSIONID`, either as a cookie or as the
//! `;jsessionid=` path parameter.

use url::Url;

use super::form::FormFields;

const URL_TOKEN_MARKER: &str = ";jsessionid=";

/// Where the token was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    Url,
}

/// Opaque session identifier, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
    source: TokenSource,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, source: TokenSource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> TokenSource {
        self.source
    }

    /// `url` with its path suffixed by `;jsessionid=<token>`, replacing any
    /// token already present.
    pub fn embed_in(&self, url: &Url) -> Url {
        let mut embedded = url.clone();
        let base_path = strip_url_token(url.path()).to_string();
        embedded.set_path(&format!("{base_path}{URL_TOKEN_MARKER}{}", self.value));
        embedded
    }

    /// Short prefix for log lines
    pub fn redacted(&self) -> String {
        let shown: String = self.value.chars().take(8).collect();
        format!("{shown}...")
    }
}

/// Everything the initial request to the search page yields
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    /// Hidden fields of the search form, merged into the first request
    pub search_form: Option<FormFields>,
    pub html: String,
}

/// Pick the session cookie out of a `Cookie` header value (`a=1; b=2`).
pub fn token_from_cookie_header(header: &str, cookie_name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Extract the token from a `...;jsessionid=<token>` URL.
pub fn token_from_url(url: &Url) -> Option<String> {
    let path = url.path();
    let start = path.find(URL_TOKEN_MARKER)? + URL_TOKEN_MARKER.len();
    let token: String = path[start..]
        .chars()
        .take_while(|c| !matches!(c, ';' | '/' | '?' | '#'))
        .collect();
    (!token.is_empty()).then_some(token)
}

/// Resolve the token from the cookie jar first, then from the final URL.
pub fn resolve_token(
    cookie_header: Option<&str>,
    cookie_name: &str,
    final_url: &Url,
) -> Option<SessionToken> {
    cookie_header
        .and_then(|header| token_from_cookie_header(header, cookie_name))
        .map(|value| SessionToken::new(value, TokenSource::Cookie))
        .or_else(|| token_from_url(final_url).map(|value| SessionToken::new(value, TokenSource::Url)))
}

fn strip_url_token(path: &str) -> &str {
    match path.find(URL_TOKEN_MARKER) {
        Some(idx) => &path[..idx],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_token_from_cookie_header() {
        let header = "lang=en; JSESSIONID=ABC123; other=1";
        assert_eq!(
            token_from_cookie_header(header, "JSESSIONID").as_deref(),
            Some("ABC123")
        );
        assert!(token_from_cookie_header("lang=en", "JSESSIONID").is_none());
        assert!(token_from_cookie_header("JSESSIONID=", "JSESSIONID").is_none());
    }

    #[test]
    fn test_token_from_url() {
        let with_token =
            url("https://www2.jpx.co.jp/tseHpFront/JJK020010Action.do;jsessionid=00B11CD0?x=1");
        assert_eq!(token_from_url(&with_token).as_deref(), Some("00B11CD0"));

        let without = url("https://www2.jpx.co.jp/tseHpFront/JJK020010Action.do");
        assert!(token_from_url(&without).is_none());
    }

    #[test]
    fn test_cookie_preferred_over_url() {
        let final_url = url("https://example.test/a.do;jsessionid=FROMURL");
        let token = resolve_token(Some("JSESSIONID=FROMCOOKIE"), "JSESSIONID", &final_url).unwrap();
        assert_eq!(token.value(), "FROMCOOKIE");
        assert_eq!(token.source(), TokenSource::Cookie);

        let token = resolve_token(None, "JSESSIONID", &final_url).unwrap();
        assert_eq!(token.value(), "FROMURL");
        assert_eq!(token.source(), TokenSource::Url);
    }

    #[test]
    fn test_no_token_anywhere() {
        let final_url = url("https://example.test/a.do");
        assert!(resolve_token(Some("lang=en"), "JSESSIONID", &final_url).is_none());
    }

    #[test]
    fn test_embed_replaces_existing_token() {
        let token = SessionToken::new("NEW", TokenSource::Cookie);
        let target = url("https://example.test/tseHpFront/JJK020030Action.do;jsessionid=OLD");
        assert_eq!(
            token.embed_in(&target).as_str(),
            "https://example.test/tseHpFront/JJK020030Action.do;jsessionid=NEW"
        );
    }

    #[test]
    fn test_redacted_is_short() {
        let token = SessionToken::new("00B11CD09F0EE52A255F89C8F3D3F8A21", TokenSource::Cookie);
        assert_eq!(token.redacted(), "00B11CD0...");
    }
}
