use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::safety::SafetyAssessment;

/// Strategy that produced a fetch result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMethod {
    /// Headless browser session
    Browser,
    /// Direct HTTP GET
    Fallback,
}

impl ScanMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMethod::Browser => "browser",
            ScanMethod::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ScanMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing and transfer metrics for a fetched page.
///
/// Every field is always present. Fetch paths that cannot observe a value
/// report it as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    /// DOMContentLoaded relative to navigation start (ms)
    pub dom_content_loaded: f64,

    /// Load event end relative to navigation start (ms)
    pub load_complete: f64,

    /// First paint (ms)
    pub first_paint: f64,

    /// First contentful paint (ms)
    pub first_contentful_paint: f64,

    /// Number of subresource requests
    pub total_requests: u64,

    /// Bytes transferred for the document
    pub transfer_size_bytes: u64,

    /// Encoded body size of the document
    pub encoded_body_size_bytes: u64,
}

/// Element counts found in the final markup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCounts {
    pub images: u64,
    pub scripts: u64,
    pub stylesheets: u64,
    pub iframes: u64,
    pub forms: u64,
    pub inputs: u64,
}

/// Everything a single fetch produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    /// URL after redirects
    pub url: String,

    /// URL that was requested
    pub original_url: String,

    /// HTTP status code (0 when unknown)
    pub status_code: u16,

    /// Page title
    pub title: String,

    /// Wall-clock load time in milliseconds
    pub load_time_ms: f64,

    /// Size of the full response body in bytes
    pub content_length: usize,

    /// Markup, possibly truncated
    pub html: String,

    /// Response headers (lowercased names)
    pub headers: HashMap<String, String>,

    /// Strategy that produced this result
    pub scan_method: ScanMethod,

    pub metrics: PageMetrics,

    pub element_counts: ElementCounts,

    /// Number of `<a href>` elements
    pub links_found: u64,
}

/// Trust evaluation outcome.
///
/// `is_safe` is false exactly when `reasons` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustVerdict {
    pub is_safe: bool,
    pub reasons: Vec<String>,
}

impl TrustVerdict {
    /// Build a verdict from the collected reasons
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            is_safe: reasons.is_empty(),
            reasons,
        }
    }

    /// Status label used in responses
    pub fn status(&self) -> &'static str {
        if self.is_safe {
            "safe"
        } else {
            "unsafe"
        }
    }
}

/// Merged output of one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub url: String,
    pub original_url: String,
    pub status: u16,
    pub load_time_ms: f64,
    pub title: String,
    pub content_length: usize,
    pub bugs: Vec<String>,
    pub is_safe: bool,
    pub safety_status: String,
    pub safety_reasons: Vec<String>,
    pub performance_score: f64,
    pub grade: String,
    pub scan_method: ScanMethod,
    pub metrics: PageMetrics,
    pub element_counts: ElementCounts,
    pub links_found: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kids_safety: Option<SafetyAssessment>,
}
