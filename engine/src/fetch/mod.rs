pub mod browser;
pub mod http;

use async_trait::async_trait;
use log::{info, warn};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use crate::error::FetchError;
use crate::models::{ElementCounts, FetchResult, ScanMethod};

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;

/// Title reported when a page has none
pub const NO_TITLE: &str = "No Title Found";

/// Maximum number of characters of markup kept on a fetch result
pub const MAX_MARKUP_CHARS: usize = 50_000;

/// Chrome user agent presented by both strategies
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A way of retrieving a page together with its timing data
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch an absolute, normalized URL
    async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError>;

    /// Tag recorded on results from this strategy
    fn method(&self) -> ScanMethod;
}

/// Browser first, direct GET when the browser is missing or fails.
///
/// A failure is only surfaced when the fallback fails too.
pub struct StrategyFetcher {
    primary: Option<Box<dyn Fetcher>>,
    fallback: Box<dyn Fetcher>,
}

impl StrategyFetcher {
    pub fn new(primary: Option<Box<dyn Fetcher>>, fallback: Box<dyn Fetcher>) -> Self {
        Self { primary, fallback }
    }

    /// Standard pairing: headless Chrome when enabled and installed, reqwest otherwise
    pub fn standard(browser_enabled: bool) -> Result<Self, FetchError> {
        let fallback = Box::new(HttpFetcher::new()?);

        let primary: Option<Box<dyn Fetcher>> = if !browser_enabled {
            info!("Browser strategy disabled by configuration");
            None
        } else {
            match BrowserFetcher::probe() {
                Ok(browser) => Some(Box::new(browser)),
                Err(e) => {
                    warn!("Browser strategy unavailable ({}), using direct fetch only", e);
                    None
                }
            }
        };

        Ok(Self::new(primary, fallback))
    }

    /// Whether a browser strategy is configured
    pub fn has_browser(&self) -> bool {
        self.primary.is_some()
    }
}

#[async_trait]
impl Fetcher for StrategyFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError> {
        if let Some(primary) = &self.primary {
            match primary.fetch(url).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("{} scan failed for {}: {}. Falling back", primary.method(), url, e);
                }
            }
        }

        self.fallback.fetch(url).await
    }

    fn method(&self) -> ScanMethod {
        self.primary
            .as_ref()
            .map(|p| p.method())
            .unwrap_or_else(|| self.fallback.method())
    }
}

/// Title and element statistics pulled out of markup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupStats {
    pub title: Option<String>,
    pub element_counts: ElementCounts,
    pub links_found: u64,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css}: {e:?}"))
}

static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static IMG: Lazy<Selector> = Lazy::new(|| selector("img"));
static SCRIPT: Lazy<Selector> = Lazy::new(|| selector("script"));
static STYLESHEET: Lazy<Selector> = Lazy::new(|| selector("link[rel~=stylesheet]"));
static IFRAME: Lazy<Selector> = Lazy::new(|| selector("iframe"));
static FORM: Lazy<Selector> = Lazy::new(|| selector("form"));
static INPUT: Lazy<Selector> = Lazy::new(|| selector("input"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));

/// Parse markup tolerantly and count the elements a scan reports
pub fn inspect_markup(html: &str) -> MarkupStats {
    let document = Html::parse_document(html);
    let count = |s: &Selector| document.select(s).count() as u64;

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    MarkupStats {
        title,
        element_counts: ElementCounts {
            images: count(&IMG),
            scripts: count(&SCRIPT),
            stylesheets: count(&STYLESHEET),
            iframes: count(&IFRAME),
            forms: count(&FORM),
            inputs: count(&INPUT),
        },
        links_found: count(&LINK),
    }
}

/// Cut markup to `MAX_MARKUP_CHARS` characters without splitting a code point
pub fn truncate_markup(html: &str) -> String {
    match html.char_indices().nth(MAX_MARKUP_CHARS) {
        Some((idx, _)) => html[..idx].to_string(),
        None => html.to_string(),
    }
}
