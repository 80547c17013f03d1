use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::UrlError;

static SCHEME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z][a-z0-9+.\-]*://").expect("static regex"));

/// Normalize a user supplied target into an absolute `https://` URL.
///
/// Any scheme the caller typed is discarded; the domain part (everything
/// before the first `/`, `?` or `#`) must contain a dot and no whitespace.
pub fn normalize_target(raw: &str) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    let without_scheme = SCHEME_PREFIX.replace(trimmed, "");
    let without_scheme = without_scheme.as_ref();

    if without_scheme.is_empty() {
        return Err(UrlError::Empty);
    }

    let domain_end = without_scheme
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(without_scheme.len());
    let domain = &without_scheme[..domain_end];

    if domain.is_empty() {
        return Err(UrlError::Empty);
    }
    if domain.chars().any(char::is_whitespace) {
        return Err(UrlError::Whitespace(domain.to_string()));
    }
    if !domain.contains('.') {
        return Err(UrlError::MissingDot(domain.to_string()));
    }

    let candidate = format!("https://{}", without_scheme);
    Url::parse(&candidate).map_err(|e| UrlError::Unparsable {
        url: candidate.clone(),
        reason: e.to_string(),
    })
}

/// Lowercased host of a URL, empty when the URL has none
pub fn domain_of(url: &Url) -> String {
    url.host_str().map(|h| h.to_lowercase()).unwrap_or_default()
}

/// Lowercased host of a URL string, empty when it does not parse
pub fn domain_of_str(url: &str) -> String {
    Url::parse(url).map(|u| domain_of(&u)).unwrap_or_default()
}
