//! Target URL canonicalization and request parameter checks.

use std::sync::LazyLock;

use regex::Regex;
use wbdiff_core::Error;
use wbdiff_core::query::is_valid_year;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("invalid email pattern")
});

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string into a parsed http(s) URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Check that `url` can name archived captures.
///
/// Rejects empty input, e-mail addresses and anything without a dotted host.
/// The caller keeps using the URL as given; canonicalization only gates it.
pub fn validate_target(url: &str) -> Result<(), Error> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("url param is required".into()));
    }
    if EMAIL.is_match(trimmed) {
        return Err(Error::InvalidInput("invalid url format".into()));
    }

    let parsed = canonicalize(trimmed).map_err(|e| Error::InvalidInput(format!("invalid url format: {e}")))?;
    match parsed.host_str() {
        Some(host) if host.contains('.') && !host.starts_with('.') && !host.ends_with('.') => Ok(()),
        _ => Err(Error::InvalidInput("invalid url format".into())),
    }
}

/// Check that `year` is four ASCII digits.
pub fn validate_year(year: &str) -> Result<(), Error> {
    if is_valid_year(year) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid year {year:?}")))
    }
}
