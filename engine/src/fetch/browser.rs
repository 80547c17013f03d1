use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventResponseReceived, LoaderId, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, FrameId, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use url::Url;

use super::{truncate_markup, Fetcher, BROWSER_USER_AGENT, NO_TITLE};
use super::http::round2;
use crate::error::FetchError;
use crate::models::{ElementCounts, FetchResult, PageMetrics, ScanMethod};

/// Hard bound on navigation plus the wait for network quiescence
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Time given to deferred scripts after navigation
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Subresources aborted to bound scan time
const BLOCKED_RESOURCES: [ResourceType; 3] =
    [ResourceType::Image, ResourceType::Media, ResourceType::Font];

/// Reads navigation and paint timing plus element counts in one round trip
const PAGE_METRICS_SCRIPT: &str = r#"(() => {
    const perf = performance.timing;
    const nav = performance.getEntriesByType('navigation')[0];
    const paint = (name) => {
        const entry = performance.getEntriesByType('paint').find(p => p.name === name);
        return entry ? entry.startTime : 0;
    };
    const since = (t) => t > 0 ? Math.max(0, t - perf.navigationStart) : 0;
    return {
        domContentLoaded: since(perf.domContentLoadedEventEnd),
        loadComplete: since(perf.loadEventEnd),
        firstPaint: paint('first-paint'),
        firstContentfulPaint: paint('first-contentful-paint'),
        totalRequests: performance.getEntriesByType('resource').length,
        transferSize: nav ? nav.transferSize : 0,
        encodedBodySize: nav ? nav.encodedBodySize : 0,
        responseStatus: nav && nav.responseStatus ? nav.responseStatus : 0,
        images: document.images.length,
        scripts: document.scripts.length,
        stylesheets: document.styleSheets.length,
        iframes: document.querySelectorAll('iframe').length,
        forms: document.querySelectorAll('form').length,
        inputs: document.querySelectorAll('input').length,
        links: document.querySelectorAll('a[href]').length,
    };
})()"#;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PageSnapshot {
    dom_content_loaded: f64,
    load_complete: f64,
    first_paint: f64,
    first_contentful_paint: f64,
    total_requests: f64,
    transfer_size: f64,
    encoded_body_size: f64,
    response_status: f64,
    images: f64,
    scripts: f64,
    stylesheets: f64,
    iframes: f64,
    forms: f64,
    inputs: f64,
    links: f64,
}

/// Status and headers of the main-frame document response
#[derive(Debug, Clone)]
struct DocumentResponse {
    status: u16,
    headers: HashMap<String, String>,
}

/// Aborts helper tasks when a session ends on any path
struct SessionTasks(Vec<JoinHandle<()>>);

impl Drop for SessionTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Headless Chrome fetcher. Every fetch launches its own incognito browser
/// and tears it down before returning.
#[derive(Clone)]
pub struct BrowserFetcher {
    config: BrowserConfig,
}

impl BrowserFetcher {
    /// Build the launch configuration, failing when no Chrome executable is found
    pub fn probe() -> Result<Self, FetchError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .incognito()
            .request_timeout(NAVIGATION_TIMEOUT)
            .window_size(1920, 1080)
            .args(vec![
                "--disable-extensions",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-setuid-sandbox",
                "--disable-accelerated-2d-canvas",
                "--no-first-run",
                "--no-zygote",
            ])
            .arg(format!("--user-agent={}", BROWSER_USER_AGENT))
            .build()
            .map_err(FetchError::Unavailable)?;

        Ok(Self { config })
    }

    async fn run_session(&self, browser: &Browser, url: &Url) -> Result<FetchResult, FetchError> {
        let page = browser.new_page("about:blank").await?;

        let mut tasks = SessionTasks(Vec::with_capacity(2));
        tasks.0.push(block_heavy_resources(&page).await?);
        let (document, watcher) = watch_document_response(&page).await?;
        tasks.0.push(watcher);

        page.execute(SetLifecycleEventsEnabledParams::new(true))
            .await?;
        let mut lifecycle = page.event_listener::<EventLifecycleEvent>().await?;
        let idle = NetworkIdle::new(page.mainframe().await?);

        debug!("Navigating to {}", url);
        let started = Instant::now();
        let navigation = async {
            page.goto(url.as_str()).await?;
            let loaded = started.elapsed();
            idle.wait(&mut lifecycle).await;
            Ok::<_, FetchError>(loaded)
        };
        let loaded = match timeout(NAVIGATION_TIMEOUT, navigation).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Navigation to {} exceeded {:?}", url, NAVIGATION_TIMEOUT);
                return Err(FetchError::Timeout(NAVIGATION_TIMEOUT.as_secs()));
            }
        };
        let load_time_ms = round2(loaded.as_secs_f64() * 1000.0);

        tokio::time::sleep(SETTLE_DELAY).await;

        let params = EvaluateParams::builder()
            .expression(PAGE_METRICS_SCRIPT)
            .return_by_value(true)
            .build()
            .map_err(FetchError::Browser)?;
        let snapshot: PageSnapshot = page
            .evaluate_expression(params)
            .await?
            .into_value()
            .map_err(|e| FetchError::Browser(format!("unreadable page metrics: {}", e)))?;

        let content = page.content().await?;
        let title = page
            .get_title()
            .await?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_TITLE.to_string());
        let final_url = page.url().await?.unwrap_or_else(|| url.to_string());

        let response = document.lock().ok().and_then(|slot| slot.clone());
        drop(tasks);
        if let Err(e) = page.close().await {
            debug!("Error closing page: {}", e);
        }

        let (status_code, headers) = match response {
            Some(doc) => (doc.status, doc.headers),
            None => (snapshot.response_status as u16, HashMap::new()),
        };

        Ok(FetchResult {
            url: final_url,
            original_url: url.to_string(),
            status_code,
            title,
            load_time_ms,
            content_length: content.len(),
            html: truncate_markup(&content),
            headers,
            scan_method: ScanMethod::Browser,
            metrics: PageMetrics {
                dom_content_loaded: round2(snapshot.dom_content_loaded),
                load_complete: round2(snapshot.load_complete),
                first_paint: round2(snapshot.first_paint),
                first_contentful_paint: round2(snapshot.first_contentful_paint),
                total_requests: snapshot.total_requests as u64,
                transfer_size_bytes: snapshot.transfer_size as u64,
                encoded_body_size_bytes: snapshot.encoded_body_size as u64,
            },
            element_counts: ElementCounts {
                images: snapshot.images as u64,
                scripts: snapshot.scripts as u64,
                stylesheets: snapshot.stylesheets as u64,
                iframes: snapshot.iframes as u64,
                forms: snapshot.forms as u64,
                inputs: snapshot.inputs as u64,
            },
            links_found: snapshot.links as u64,
        })
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError> {
        info!("Starting headless Chrome session for {}", url);

        let (mut browser, mut handler) = Browser::launch(self.config.clone()).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        let outcome = self.run_session(&browser, url).await;

        // Teardown runs on success and failure alike
        if let Err(e) = browser.close().await {
            warn!("Error closing browser: {}", e);
        }
        if let Err(e) = browser.wait().await {
            debug!("Error waiting for browser exit: {}", e);
        }
        handler_task.abort();
        info!("Headless Chrome session for {} closed", url);

        outcome
    }

    fn method(&self) -> ScanMethod {
        ScanMethod::Browser
    }
}

/// Matches the `networkIdle` lifecycle event of the navigation under way.
/// Only events from a loader that started after subscribing count, so the
/// idle signal of the initial blank page is ignored.
struct NetworkIdle {
    frame: Option<FrameId>,
    loader: Option<LoaderId>,
}

impl NetworkIdle {
    fn new(frame: Option<FrameId>) -> Self {
        Self {
            frame,
            loader: None,
        }
    }

    /// Feed one lifecycle event; true once the network has gone quiet
    fn observe(&mut self, frame_id: &FrameId, loader_id: &LoaderId, name: &str) -> bool {
        if self.frame.as_ref().is_some_and(|main| main != frame_id) {
            return false;
        }
        match name {
            "init" => {
                self.loader = Some(loader_id.clone());
                false
            }
            "networkIdle" => self.loader.as_ref() == Some(loader_id),
            _ => false,
        }
    }

    async fn wait(mut self, events: &mut EventStream<EventLifecycleEvent>) {
        while let Some(event) = events.next().await {
            if self.observe(&event.frame_id, &event.loader_id, &event.name) {
                debug!("Network idle after navigation");
                return;
            }
        }
    }
}

/// Fail image, media and font requests before they hit the network
async fn block_heavy_resources(page: &Page) -> Result<JoinHandle<()>, FetchError> {
    let mut paused = page.event_listener::<EventRequestPaused>().await?;
    let intercept_page = page.clone();

    let task = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let outcome = if BLOCKED_RESOURCES.contains(&event.resource_type) {
                intercept_page
                    .execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
            } else {
                intercept_page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = outcome {
                debug!("Failed to resolve intercepted request: {}", e);
            }
        }
    });

    let patterns: Vec<RequestPattern> = BLOCKED_RESOURCES
        .iter()
        .map(|kind| RequestPattern::builder().resource_type(kind.clone()).build())
        .collect();
    page.execute(EnableParams::builder().patterns(patterns).build())
        .await?;

    Ok(task)
}

/// Record the first main-frame document response seen during navigation
async fn watch_document_response(
    page: &Page,
) -> Result<(Arc<Mutex<Option<DocumentResponse>>>, JoinHandle<()>), FetchError> {
    let mut responses = page.event_listener::<EventResponseReceived>().await?;
    let main_frame = page.mainframe().await?;
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);

    let task = tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            if event.r#type != ResourceType::Document {
                continue;
            }
            if main_frame.is_some() && event.frame_id != main_frame {
                continue;
            }
            if let Ok(mut guard) = sink.lock() {
                if guard.is_none() {
                    *guard = Some(DocumentResponse {
                        status: u16::try_from(event.response.status).unwrap_or(0),
                        headers: header_map(event.response.headers.inner()),
                    });
                }
            }
        }
    });

    Ok((slot, task))
}

fn header_map(raw: &serde_json::Value) -> HashMap<String, String> {
    raw.as_object()
        .map(|object| {
            object
                .iter()
                .map(|(name, value)| {
                    let value = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (name.to_lowercase(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_names_are_lowercased() {
        let headers = header_map(&json!({
            "Content-Type": "text/html",
            "X-Count": 3
        }));
        assert_eq!(headers.get("content-type").map(String::as_str), Some("text/html"));
        assert_eq!(headers.get("x-count").map(String::as_str), Some("3"));
    }

    #[test]
    fn network_idle_waits_for_the_new_loader() {
        let main = FrameId::new("main");
        let blank = LoaderId::new("blank");
        let nav = LoaderId::new("nav");
        let mut idle = NetworkIdle::new(Some(main.clone()));

        assert!(!idle.observe(&main, &blank, "networkIdle"));
        assert!(!idle.observe(&main, &nav, "init"));
        assert!(!idle.observe(&main, &nav, "load"));
        assert!(!idle.observe(&FrameId::new("ad"), &nav, "networkIdle"));
        assert!(idle.observe(&main, &nav, "networkIdle"));
    }

    #[test]
    fn network_idle_without_known_frame() {
        let mut idle = NetworkIdle::new(None);
        let frame = FrameId::new("any");
        let loader = LoaderId::new("l1");
        assert!(!idle.observe(&frame, &loader, "init"));
        assert!(idle.observe(&frame, &loader, "networkIdle"));
    }

    #[test]
    fn non_object_headers_are_empty() {
        assert!(header_map(&json!(null)).is_empty());
    }

    #[test]
    fn snapshot_tolerates_missing_fields() {
        let snapshot: PageSnapshot =
            serde_json::from_value(json!({ "firstContentfulPaint": 812.4, "links": 7 })).unwrap();
        assert_eq!(snapshot.first_contentful_paint, 812.4);
        assert_eq!(snapshot.links, 7.0);
        assert_eq!(snapshot.load_complete, 0.0);
    }
}
