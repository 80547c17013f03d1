use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url::Url;

use super::{inspect_markup, truncate_markup, Fetcher, BROWSER_USER_AGENT, NO_TITLE};
use crate::error::FetchError;
use crate::models::{FetchResult, PageMetrics, ScanMethod};

/// Upper bound for the single direct request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_REDIRECTS: usize = 10;

/// Headers a desktop Chrome sends on a top-level navigation
const BROWSER_HEADERS: &[(&str, &str)] = &[
    ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    ("accept-language", "en-US,en;q=0.9"),
    ("upgrade-insecure-requests", "1"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
    ("cache-control", "max-age=0"),
];

/// Direct single-request fetcher used when no browser session is available
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with browser-like headers and certificate checks disabled
    pub fn new() -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        for &(name, value) in BROWSER_HEADERS {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .gzip(true)
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError> {
        info!("Fetching {} with direct GET", url);
        let start = Instant::now();

        let response = self.client.get(url.as_str()).send().await?;
        let final_url = response.url().to_string();
        let status_code = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await?;

        let load_time_ms = round2(start.elapsed().as_secs_f64() * 1000.0);
        debug!("Received {} bytes from {} in {} ms", body.len(), final_url, load_time_ms);

        let html = String::from_utf8_lossy(&body);
        Ok(build_result(
            url,
            final_url,
            status_code,
            headers,
            &html,
            body.len(),
            load_time_ms,
        ))
    }

    fn method(&self) -> ScanMethod {
        ScanMethod::Fallback
    }
}

/// Assemble a fallback result. Paint and DOM timings cannot be observed
/// without rendering, so they stay zero.
fn build_result(
    requested: &Url,
    final_url: String,
    status_code: u16,
    headers: HashMap<String, String>,
    html: &str,
    body_len: usize,
    load_time_ms: f64,
) -> FetchResult {
    let stats = inspect_markup(html);

    FetchResult {
        url: final_url,
        original_url: requested.to_string(),
        status_code,
        title: stats.title.unwrap_or_else(|| NO_TITLE.to_string()),
        load_time_ms,
        content_length: body_len,
        html: truncate_markup(html),
        headers,
        scan_method: ScanMethod::Fallback,
        metrics: PageMetrics {
            load_complete: load_time_ms,
            transfer_size_bytes: body_len as u64,
            encoded_body_size_bytes: body_len as u64,
            ..PageMetrics::default()
        },
        element_counts: stats.element_counts,
        links_found: stats.links_found,
    }
}

fn collect_headers(map: &HeaderMap) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for (name, value) in map {
        if let Ok(v) = value.to_str() {
            headers
                .entry(name.as_str().to_lowercase())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(v);
                })
                .or_insert_with(|| v.to_string());
        }
    }
    headers
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
