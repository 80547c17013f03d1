use thiserror::Error;

/// Rejections produced while normalizing a target URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("URL is empty")]
    Empty,

    #[error("domain '{0}' contains whitespace")]
    Whitespace(String),

    #[error("domain '{0}' has no dot")]
    MissingDot(String),

    #[error("invalid URL '{url}': {reason}")]
    Unparsable { url: String, reason: String },
}

/// Failures of a single fetch strategy
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("fetch strategy unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(crate::fetch::http::REQUEST_TIMEOUT.as_secs())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<chromiumoxide::error::CdpError> for FetchError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        FetchError::Browser(err.to_string())
    }
}

/// Failure of a whole scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid target: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("scan failed: {0}")]
    Fetch(#[from] FetchError),
}
