use log::info;
use std::sync::Arc;

use crate::error::ScanError;
use crate::fetch::http::round2;
use crate::fetch::Fetcher;
use crate::grading::grade_performance;
use crate::issues::analyze_issues;
use crate::models::ScanReport;
use crate::safety::KidsSafetyScorer;
use crate::trust::evaluate_trust;
use crate::url::normalize_target;

/// Runs one fetch-and-analyze cycle per call
#[derive(Clone)]
pub struct Scanner {
    fetcher: Arc<dyn Fetcher>,
    safety: KidsSafetyScorer,
}

impl Scanner {
    pub fn new(fetcher: Arc<dyn Fetcher>, safety: KidsSafetyScorer) -> Self {
        Self { fetcher, safety }
    }

    /// Normalize, fetch and analyze a user-supplied URL.
    ///
    /// Fails only on an invalid target or when every fetch strategy failed.
    pub async fn scan(&self, raw_url: &str) -> Result<ScanReport, ScanError> {
        let target = normalize_target(raw_url)?;
        info!("Scanning {} with {} strategy", target, self.fetcher.method());

        let page = self.fetcher.fetch(&target).await?;

        let bugs = analyze_issues(&page.html, page.status_code, &page.metrics);
        let trust = evaluate_trust(&page.url, page.status_code);
        let kids_safety = self
            .safety
            .assess(&page.url, Some(&page.html), Some(&page.headers))
            .await;
        let grading = grade_performance(&page.metrics, page.load_time_ms);

        info!(
            "Scanned {} via {}: status {}, grade {}, {} findings, {}",
            page.url,
            page.scan_method,
            page.status_code,
            grading.grade,
            bugs.len(),
            trust.status()
        );

        Ok(ScanReport {
            safety_status: trust.status().to_string(),
            is_safe: trust.is_safe,
            safety_reasons: trust.reasons,
            performance_score: round2(grading.score),
            grade: grading.grade.to_string(),
            url: page.url,
            original_url: page.original_url,
            status: page.status_code,
            load_time_ms: page.load_time_ms,
            title: page.title,
            content_length: page.content_length,
            bugs,
            scan_method: page.scan_method,
            metrics: page.metrics,
            element_counts: page.element_counts,
            links_found: page.links_found,
            kids_safety: Some(kids_safety),
        })
    }
}
