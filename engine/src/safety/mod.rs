//! Kids-safety rating built from several weak signals.
//!
//! Signals run in a fixed order and each yields a [`SignalOutcome`]; the
//! [`SafetyReducer`] folds them into one [`SafetyAssessment`]. A threat hit
//! from the reputation service short-circuits everything else.

pub mod display;
pub mod reputation;
pub mod signals;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use display::RatingDisplay;
pub use reputation::{ReputationCheck, ReputationOutcome, SafeBrowsingClient};
pub use signals::{RatingEffect, ScoreEffect, SignalOutcome};

/// Running score every assessment starts from
pub const BASE_SCORE: i32 = 50;

/// Categorical rating, ordered from least to most restrictive.
/// `Unknown` means no signal produced a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyRating {
    SafeForAll,
    ParentalGuidance,
    Teen,
    Mature,
    Blocked,
    Unknown,
}

impl SafetyRating {
    /// Position in the restriction order; `None` for `Unknown`
    pub fn severity(&self) -> Option<u8> {
        match self {
            SafetyRating::SafeForAll => Some(0),
            SafetyRating::ParentalGuidance => Some(1),
            SafetyRating::Teen => Some(2),
            SafetyRating::Mature => Some(3),
            SafetyRating::Blocked => Some(4),
            SafetyRating::Unknown => None,
        }
    }

    /// Whether `self` restricts more than `other`. Any rating is stricter than `Unknown`.
    pub fn is_stricter_than(&self, other: SafetyRating) -> bool {
        match (self.severity(), other.severity()) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Score a self-declared rating resets the running score to
    pub fn tier_score(&self) -> i32 {
        match self {
            SafetyRating::SafeForAll => 95,
            SafetyRating::ParentalGuidance => 75,
            SafetyRating::Teen => 50,
            SafetyRating::Mature => 20,
            SafetyRating::Blocked => 0,
            SafetyRating::Unknown => BASE_SCORE,
        }
    }

    /// Rating derived from a final score when no signal set one
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 90 => SafetyRating::SafeForAll,
            s if s >= 70 => SafetyRating::ParentalGuidance,
            s if s >= 40 => SafetyRating::Teen,
            s if s >= 10 => SafetyRating::Mature,
            _ => SafetyRating::Blocked,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyRating::SafeForAll => "SAFE_FOR_ALL",
            SafetyRating::ParentalGuidance => "PARENTAL_GUIDANCE",
            SafetyRating::Teen => "TEEN",
            SafetyRating::Mature => "MATURE",
            SafetyRating::Blocked => "BLOCKED",
            SafetyRating::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SafetyRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many independent signals backed the rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_source_count(count: usize) -> Self {
        match count {
            n if n >= 3 => Confidence::High,
            2 => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// Signal that contributed to an assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetySource {
    GoogleSafeBrowsing,
    DomainAnalysis,
    MetaTags,
    RtaLabel,
    ContentAnalysis,
}

impl SafetySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetySource::GoogleSafeBrowsing => "google_safe_browsing",
            SafetySource::DomainAnalysis => "domain_analysis",
            SafetySource::MetaTags => "meta_tags",
            SafetySource::RtaLabel => "rta_label",
            SafetySource::ContentAnalysis => "content_analysis",
        }
    }
}

/// Per-signal diagnostics kept alongside the verdict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyDetails {
    pub reputation: Option<ReputationOutcome>,
    pub domain_keywords: Vec<String>,
    pub meta_rating: Option<SafetyRating>,
    pub rta_label: bool,
    pub adult_keyword_count: Option<usize>,
    pub suspicious_keyword_count: Option<usize>,
}

/// Final kids-safety verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub rating: SafetyRating,
    /// Always within 0..=100
    pub score: u8,
    pub confidence: Confidence,
    pub sources: Vec<SafetySource>,
    pub warnings: Vec<String>,
    pub display: RatingDisplay,
    pub details: SafetyDetails,
}

/// Folds signal outcomes into an assessment
#[derive(Debug, Clone)]
pub struct SafetyReducer {
    rating: SafetyRating,
    score: i32,
    sources: Vec<SafetySource>,
    warnings: Vec<String>,
}

impl Default for SafetyReducer {
    fn default() -> Self {
        Self {
            rating: SafetyRating::Unknown,
            score: BASE_SCORE,
            sources: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl SafetyReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one signal outcome.
    ///
    /// `Override` replaces the rating outright; `Escalate` only replaces it
    /// with something stricter, so inferred signals never loosen a rating.
    pub fn apply(&mut self, outcome: SignalOutcome) {
        match outcome.rating {
            RatingEffect::Keep => {}
            RatingEffect::Override(rating) => self.rating = rating,
            RatingEffect::Escalate(rating) => {
                if rating.is_stricter_than(self.rating) {
                    self.rating = rating;
                } else if rating != self.rating {
                    debug!(
                        "Keeping stricter rating {} over {} from {:?}",
                        self.rating, rating, outcome.source
                    );
                }
            }
        }

        self.score = match outcome.score {
            ScoreEffect::Add(delta) => self.score + delta,
            ScoreEffect::Set(value) => value,
            ScoreEffect::CapAt(max) => self.score.min(max),
        };

        if !self.sources.contains(&outcome.source) {
            self.sources.push(outcome.source);
        }
        self.warnings.extend(outcome.warnings);
    }

    /// Derive a missing rating from the score, compute confidence and clamp
    pub fn finish(self, details: SafetyDetails) -> SafetyAssessment {
        let rating = if self.rating == SafetyRating::Unknown {
            SafetyRating::from_score(self.score)
        } else {
            self.rating
        };

        SafetyAssessment {
            rating,
            score: self.score.clamp(0, 100) as u8,
            confidence: Confidence::from_source_count(self.sources.len()),
            sources: self.sources,
            warnings: self.warnings,
            display: rating.display(),
            details,
        }
    }
}

/// Scores a site for child safety
#[derive(Clone)]
pub struct KidsSafetyScorer {
    reputation: Arc<dyn ReputationCheck>,
}

impl KidsSafetyScorer {
    pub fn new(reputation: Arc<dyn ReputationCheck>) -> Self {
        Self { reputation }
    }

    /// Assess a URL with optional markup and response headers
    pub async fn assess(
        &self,
        url: &str,
        html: Option<&str>,
        headers: Option<&HashMap<String, String>>,
    ) -> SafetyAssessment {
        let mut details = SafetyDetails::default();

        let reputation = self.reputation.check(url).await;
        details.reputation = Some(reputation.clone());
        if let ReputationOutcome::Threats { threats } = &reputation {
            info!("Reputation service flagged {}: {:?}", url, threats);
            return blocked_by_reputation(threats, details);
        }

        let mut reducer = SafetyReducer::new();
        if let Some(outcome) = signals::reputation_signal(&reputation) {
            reducer.apply(outcome);
        }

        let domain = crate::url::domain_of_str(url);
        let (domain_outcome, domain_keywords) = signals::domain_signal(&domain);
        details.domain_keywords = domain_keywords;
        if let Some(outcome) = domain_outcome {
            reducer.apply(outcome);
        }

        if let Some(html) = html.filter(|h| !h.is_empty()) {
            let page = signals::PageSignals::extract(html, headers);
            details.meta_rating = page.meta_rating;
            details.rta_label = page.rta_label;
            details.adult_keyword_count = Some(page.adult_keyword_count);
            details.suspicious_keyword_count = Some(page.suspicious_keyword_count);

            for outcome in page.outcomes() {
                reducer.apply(outcome);
            }
        }

        let assessment = reducer.finish(details);
        debug!(
            "Kids safety for {}: {} ({}), confidence {}",
            url,
            assessment.rating,
            assessment.score,
            assessment.confidence.as_str()
        );
        assessment
    }
}

fn blocked_by_reputation(threats: &[String], details: SafetyDetails) -> SafetyAssessment {
    SafetyAssessment {
        rating: SafetyRating::Blocked,
        score: 0,
        confidence: Confidence::High,
        sources: vec![SafetySource::GoogleSafeBrowsing],
        warnings: threats.to_vec(),
        display: SafetyRating::Blocked.display(),
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::reputation::MockReputationCheck;
    use super::*;

    const KIDS_PAGE: &str = r#"<html><head><meta name="rating" content="Safe for Kids">
        <title>Fun</title></head><body><h1>Games for children</h1></body></html>"#;

    fn scorer(outcome: ReputationOutcome) -> KidsSafetyScorer {
        let mut mock = MockReputationCheck::new();
        mock.expect_check().returning(move |_| outcome.clone());
        KidsSafetyScorer::new(Arc::new(mock))
    }

    fn not_checked() -> ReputationOutcome {
        ReputationOutcome::NotChecked {
            reason: "No API key configured".to_string(),
        }
    }

    #[tokio::test]
    async fn threat_hit_blocks_regardless_of_other_signals() {
        let scorer = scorer(ReputationOutcome::Threats {
            threats: vec!["MALWARE".to_string(), "SOCIAL_ENGINEERING".to_string()],
        });
        let result = scorer
            .assess("https://kids.example.com/", Some(KIDS_PAGE), None)
            .await;

        assert_eq!(result.rating, SafetyRating::Blocked);
        assert_eq!(result.score, 0);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.sources, vec![SafetySource::GoogleSafeBrowsing]);
        assert_eq!(result.warnings, vec!["MALWARE", "SOCIAL_ENGINEERING"]);
        assert_eq!(result.details.meta_rating, None);
    }

    #[tokio::test]
    async fn clean_reputation_adds_bonus() {
        let result = scorer(ReputationOutcome::Clean)
            .assess("https://example.com/", None, None)
            .await;
        assert_eq!(result.score, 70);
        assert_eq!(result.rating, SafetyRating::ParentalGuidance);
        assert_eq!(result.sources, vec![SafetySource::GoogleSafeBrowsing]);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn unchecked_reputation_contributes_nothing() {
        let result = scorer(not_checked())
            .assess("https://example.com/", None, None)
            .await;
        assert_eq!(result.score, 50);
        assert_eq!(result.rating, SafetyRating::Teen);
        assert!(result.sources.is_empty());
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn meta_rating_resets_score_to_tier() {
        let result = scorer(ReputationOutcome::Clean)
            .assess("https://example.com/", Some(KIDS_PAGE), None)
            .await;
        assert_eq!(result.rating, SafetyRating::SafeForAll);
        assert_eq!(result.score, 95);
        assert_eq!(
            result.sources,
            vec![SafetySource::GoogleSafeBrowsing, SafetySource::MetaTags]
        );
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn adult_domain_is_mature() {
        let result = scorer(not_checked())
            .assess("https://xxx-videos.example/", None, None)
            .await;
        assert_eq!(result.rating, SafetyRating::Mature);
        assert_eq!(result.score, 20);
        assert_eq!(result.sources, vec![SafetySource::DomainAnalysis]);
        assert_eq!(result.warnings, vec!["Adult keywords in domain: xxx"]);
    }

    #[tokio::test]
    async fn score_is_clamped_when_penalties_stack() {
        let html = format!(
            "<html><head><meta name=\"rating\" content=\"RTA-5042-1996-1400-1577-RTA\"></head><body>{}</body></html>",
            "porn nude xxx sex ".repeat(3)
        );
        let result = scorer(not_checked())
            .assess("https://adultsite.example/", Some(&html), None)
            .await;

        assert_eq!(result.rating, SafetyRating::Mature);
        assert_eq!(result.score, 0);
        assert!(result.sources.contains(&SafetySource::RtaLabel));
        assert!(result.sources.contains(&SafetySource::ContentAnalysis));
        assert_eq!(result.confidence, Confidence::High);

        let xxx = "<meta name=\"rating\" content=\"xxx\"><p>porn porn porn porn</p>";
        let result = scorer(not_checked())
            .assess("https://example.com/", Some(xxx), None)
            .await;
        assert_eq!(result.rating, SafetyRating::Blocked);
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn suspicious_content_does_not_loosen_a_stricter_rating() {
        let html = "<meta name=\"rating\" content=\"mature\"><p>casino poker betting lottery gambling casino</p>";
        let result = scorer(not_checked())
            .assess("https://example.com/", Some(html), None)
            .await;
        assert_eq!(result.rating, SafetyRating::Mature);
        assert_eq!(result.score, 10);
        assert!(result
            .warnings
            .contains(&"Potentially inappropriate content detected".to_string()));
    }

    #[tokio::test]
    async fn suspicious_content_raises_unknown_to_teen() {
        let html = "<p>casino poker betting lottery gambling casino</p>";
        let result = scorer(ReputationOutcome::Clean)
            .assess("https://example.com/", Some(html), None)
            .await;
        assert_eq!(result.rating, SafetyRating::Teen);
        assert_eq!(result.score, 60);
    }

    #[tokio::test]
    async fn rta_header_counts_as_label() {
        let mut headers = HashMap::new();
        headers.insert(
            "rating".to_string(),
            "RTA-5042-1996-1400-1577-RTA".to_string(),
        );
        let result = scorer(not_checked())
            .assess("https://example.com/", Some("<p>hello</p>"), Some(&headers))
            .await;
        assert_eq!(result.rating, SafetyRating::Mature);
        assert_eq!(result.score, 25);
        assert!(result.details.rta_label);
    }

    #[test]
    fn ordering_and_thresholds() {
        assert!(SafetyRating::Blocked.is_stricter_than(SafetyRating::Mature));
        assert!(SafetyRating::SafeForAll.is_stricter_than(SafetyRating::Unknown));
        assert!(!SafetyRating::Unknown.is_stricter_than(SafetyRating::SafeForAll));
        assert_eq!(SafetyRating::from_score(90), SafetyRating::SafeForAll);
        assert_eq!(SafetyRating::from_score(89), SafetyRating::ParentalGuidance);
        assert_eq!(SafetyRating::from_score(40), SafetyRating::Teen);
        assert_eq!(SafetyRating::from_score(10), SafetyRating::Mature);
        assert_eq!(SafetyRating::from_score(9), SafetyRating::Blocked);
    }

    #[test]
    fn confidence_from_sources() {
        assert_eq!(Confidence::from_source_count(0), Confidence::Low);
        assert_eq!(Confidence::from_source_count(1), Confidence::Low);
        assert_eq!(Confidence::from_source_count(2), Confidence::Medium);
        assert_eq!(Confidence::from_source_count(5), Confidence::High);
    }
}
