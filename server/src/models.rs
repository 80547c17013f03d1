use serde::{Deserialize, Serialize};
use sitescan_engine::{SafetyAssessment, ScanMethod, ScanReport};

/// Kids-safety columns of a stored scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KidsSafetySummary {
    pub rating: String,
    pub score: u8,
    pub confidence: String,
    pub sources: Vec<String>,
    pub warnings: Vec<String>,
}

impl KidsSafetySummary {
    pub fn from_assessment(assessment: &SafetyAssessment) -> Self {
        Self {
            rating: assessment.rating.as_str().to_string(),
            score: assessment.score,
            confidence: assessment.confidence.as_str().to_string(),
            sources: assessment
                .sources
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            warnings: assessment.warnings.clone(),
        }
    }
}

/// A persisted scan row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: i64,
    /// Resolved URL
    pub url: String,
    /// Host of the requested URL
    pub domain: String,
    pub title: String,
    pub performance_score: f64,
    pub grade: String,
    /// Load time in milliseconds
    pub load_time: f64,
    pub status_code: u16,
    pub scan_method: String,
    pub is_safe: bool,
    pub kids_safety: Option<KidsSafetySummary>,
    /// Human rating (1-5) set by a linked feedback submission
    pub user_rating: Option<u8>,
    pub comment: Option<String>,
    pub name: Option<String>,
    /// Unix seconds
    pub timestamp: i64,
}

/// Fields of a scan about to be stored
#[derive(Debug, Clone)]
pub struct NewScan {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub performance_score: f64,
    pub grade: String,
    pub load_time: f64,
    pub status_code: u16,
    pub scan_method: ScanMethod,
    pub is_safe: bool,
    pub kids_safety: Option<KidsSafetySummary>,
}

impl NewScan {
    pub fn from_report(report: &ScanReport) -> Self {
        Self {
            url: report.url.clone(),
            domain: sitescan_engine::url::domain_of_str(&report.original_url),
            title: report.title.clone(),
            performance_score: report.performance_score,
            grade: report.grade.clone(),
            load_time: report.load_time_ms,
            status_code: report.status,
            scan_method: report.scan_method,
            is_safe: report.is_safe,
            kids_safety: report
                .kids_safety
                .as_ref()
                .map(KidsSafetySummary::from_assessment),
        }
    }
}

/// A persisted feedback row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub rating: u8,
    pub comment: Option<String>,
    pub name: String,
    pub scan_id: Option<i64>,
    pub timestamp: i64,
}

/// Feedback about to be stored
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub rating: u8,
    pub comment: Option<String>,
    pub name: String,
    pub scan_id: Option<i64>,
}

/// Aggregate numbers for the stats endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub live_visitors: usize,
    pub total_scans: i64,
    pub total_feedback: i64,
    /// `None` until someone has left feedback
    pub average_rating: Option<f64>,
}

/// Rows removed by a bulk clear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cleared {
    pub scans: usize,
    pub feedback: usize,
}

/// Which kids ratings a search returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchFilter {
    #[default]
    All,
    /// SAFE_FOR_ALL and PARENTAL_GUIDANCE
    Safe,
    /// MATURE and BLOCKED
    Unsafe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    #[default]
    Recent,
    Score,
    Name,
}

/// Search parameters as they arrive on the query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub q: String,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub filter: SearchFilter,
    pub sort: SearchSort,
}

impl SearchQuery {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    /// One-based page number
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }
}

/// One page of search results
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub results: Vec<ScanRecord>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
