//! Website scan engine: fetch a page, then grade its speed, list structural
//! problems, judge whether it looks trustworthy and rate it for children.

pub mod error;
pub mod fetch;
pub mod grading;
pub mod issues;
pub mod models;
pub mod safety;
pub mod scan;
pub mod trust;
pub mod url;

pub use error::{FetchError, ScanError, UrlError};
pub use fetch::{BrowserFetcher, Fetcher, HttpFetcher, StrategyFetcher};
pub use grading::{grade_performance, Grade, Grading};
pub use models::{ElementCounts, FetchResult, PageMetrics, ScanMethod, ScanReport, TrustVerdict};
pub use safety::{
    Confidence, KidsSafetyScorer, ReputationCheck, ReputationOutcome, SafeBrowsingClient,
    SafetyAssessment, SafetyRating, SafetySource,
};
pub use scan::Scanner;
