use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;

use super::reputation::ReputationOutcome;
use super::{SafetyRating, SafetySource};

/// Terms associated with adult content, matched in domains and page text
pub const ADULT_CONTENT_KEYWORDS: &[&str] = &[
    "adult", "porn", "xxx", "sex", "mature", "18+", "nsfw", "nude", "naked",
    "escort", "hookup", "cam", "live cam", "webcam", "dating site",
    "sugar daddy", "sugar baby", "onlyfans", "fansly",
];

/// Gambling, substances, violence, hate and weapons
pub const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "gambling", "casino", "betting", "poker", "lottery",
    "drugs", "cannabis", "marijuana", "cbd oil",
    "alcohol", "tobacco", "vape", "e-cigarette",
    "violence", "gore", "horror", "terror",
    "hate", "racist", "extremist",
    "weapon", "gun", "firearm",
];

/// Self-declared `<meta name="rating">` values and the rating they map to
pub const META_RATINGS: &[(&str, SafetyRating)] = &[
    ("safe for kids", SafetyRating::SafeForAll),
    ("general", SafetyRating::SafeForAll),
    ("safe for all", SafetyRating::SafeForAll),
    ("everyone", SafetyRating::SafeForAll),
    ("pg", SafetyRating::ParentalGuidance),
    ("parental guidance", SafetyRating::ParentalGuidance),
    ("pg-13", SafetyRating::Teen),
    ("teen", SafetyRating::Teen),
    ("mature", SafetyRating::Mature),
    ("adult", SafetyRating::Mature),
    ("restricted", SafetyRating::Mature),
    ("r", SafetyRating::Mature),
    ("nc-17", SafetyRating::Mature),
    ("xxx", SafetyRating::Blocked),
    ("rtn", SafetyRating::Blocked),
    ("blocked", SafetyRating::Blocked),
];

/// Bonus for a clean reputation lookup
const REPUTATION_BONUS: i32 = 20;
const DOMAIN_PENALTY: i32 = -30;
const ADULT_CONTENT_PENALTY: i32 = -20;
const SUSPICIOUS_CONTENT_PENALTY: i32 = -10;
/// Score ceiling once an RTA label is seen
const RTA_SCORE_CAP: i32 = 25;

const ADULT_HIT_LIMIT: usize = 3;
const SUSPICIOUS_HIT_LIMIT: usize = 5;

static RTA_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)rta-\d{4}-\d{4}-\d{4}-\d{4}-rta").expect("static regex"));

static ADULT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| word_patterns(ADULT_CONTENT_KEYWORDS));
static SUSPICIOUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| word_patterns(SUSPICIOUS_KEYWORDS));

static META: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta").expect("static selector"));

fn word_patterns(words: &[&str]) -> Vec<Regex> {
    words
        .iter()
        .map(|w| Regex::new(&format!(r"\b{}\b", regex::escape(w))).expect("static regex"))
        .collect()
}

/// Effect of a signal on the running rating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingEffect {
    Keep,
    /// Replace whatever rating is current
    Override(SafetyRating),
    /// Replace the current rating only with a stricter one
    Escalate(SafetyRating),
}

/// Effect of a signal on the running score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreEffect {
    Add(i32),
    Set(i32),
    CapAt(i32),
}

/// What one signal contributes to an assessment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalOutcome {
    pub rating: RatingEffect,
    pub score: ScoreEffect,
    pub source: SafetySource,
    pub warnings: Vec<String>,
}

/// A clean lookup is a contributing source with a bonus; anything else is silent
pub fn reputation_signal(outcome: &ReputationOutcome) -> Option<SignalOutcome> {
    match outcome {
        ReputationOutcome::Clean => Some(SignalOutcome {
            rating: RatingEffect::Keep,
            score: ScoreEffect::Add(REPUTATION_BONUS),
            source: SafetySource::GoogleSafeBrowsing,
            warnings: Vec::new(),
        }),
        _ => None,
    }
}

/// Adult keywords appearing anywhere in the domain
pub fn domain_signal(domain: &str) -> (Option<SignalOutcome>, Vec<String>) {
    let domain = domain.to_lowercase();
    let found: Vec<String> = ADULT_CONTENT_KEYWORDS
        .iter()
        .filter(|k| domain.contains(*k))
        .map(|k| k.to_string())
        .collect();

    if found.is_empty() {
        return (None, found);
    }

    let outcome = SignalOutcome {
        rating: RatingEffect::Escalate(SafetyRating::Mature),
        score: ScoreEffect::Add(DOMAIN_PENALTY),
        source: SafetySource::DomainAnalysis,
        warnings: vec![format!("Adult keywords in domain: {}", found.join(", "))],
    };
    (Some(outcome), found)
}

/// Look up a meta rating value, case-insensitively
pub fn meta_rating_for(value: &str) -> Option<SafetyRating> {
    let value = value.trim().to_lowercase();
    META_RATINGS
        .iter()
        .find(|(label, _)| *label == value)
        .map(|(_, rating)| *rating)
}

/// Signals read from the page itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSignals {
    pub meta_rating: Option<SafetyRating>,
    pub rta_label: bool,
    pub adult_keyword_count: usize,
    pub suspicious_keyword_count: usize,
}

impl PageSignals {
    /// Read meta tags, the `rating` response header and visible text
    pub fn extract(html: &str, headers: Option<&HashMap<String, String>>) -> Self {
        let document = Html::parse_document(html);

        let mut meta_rating = None;
        let mut rta_label = false;
        let mut seen_rating_tag = false;
        for meta in document.select(&META) {
            let element = meta.value();
            let content = element.attr("content").unwrap_or_default();

            let is_rating = element
                .attr("name")
                .map(|n| n.eq_ignore_ascii_case("rating"))
                .unwrap_or(false);
            if is_rating && !seen_rating_tag {
                seen_rating_tag = true;
                meta_rating = meta_rating_for(content);
            }

            if RTA_LABEL.is_match(content) {
                rta_label = true;
            }
        }

        if let Some(value) = headers.and_then(|h| h.get("rating")) {
            rta_label |= RTA_LABEL.is_match(value);
        }

        let text = visible_text(&document);
        Self {
            meta_rating,
            rta_label,
            adult_keyword_count: count_hits(&ADULT_PATTERNS, &text),
            suspicious_keyword_count: count_hits(&SUSPICIOUS_PATTERNS, &text),
        }
    }

    /// Outcomes in pipeline order: meta rating, RTA label, content keywords
    pub fn outcomes(&self) -> Vec<SignalOutcome> {
        let mut outcomes = Vec::new();

        if let Some(rating) = self.meta_rating {
            outcomes.push(SignalOutcome {
                rating: RatingEffect::Override(rating),
                score: ScoreEffect::Set(rating.tier_score()),
                source: SafetySource::MetaTags,
                warnings: Vec::new(),
            });
        }

        if self.rta_label {
            outcomes.push(SignalOutcome {
                rating: RatingEffect::Escalate(SafetyRating::Mature),
                score: ScoreEffect::CapAt(RTA_SCORE_CAP),
                source: SafetySource::RtaLabel,
                warnings: vec!["RTA (Restricted to Adults) label detected".to_string()],
            });
        }

        if self.adult_keyword_count > ADULT_HIT_LIMIT {
            outcomes.push(SignalOutcome {
                rating: RatingEffect::Escalate(SafetyRating::Mature),
                score: ScoreEffect::Add(ADULT_CONTENT_PENALTY),
                source: SafetySource::ContentAnalysis,
                warnings: vec!["Adult content keywords detected in page".to_string()],
            });
        } else if self.suspicious_keyword_count > SUSPICIOUS_HIT_LIMIT {
            outcomes.push(SignalOutcome {
                rating: RatingEffect::Escalate(SafetyRating::Teen),
                score: ScoreEffect::Add(SUSPICIOUS_CONTENT_PENALTY),
                source: SafetySource::ContentAnalysis,
                warnings: vec!["Potentially inappropriate content detected".to_string()],
            });
        }

        outcomes
    }
}

/// Lowercased text outside script, style, noscript and template elements
fn visible_text(document: &Html) -> String {
    let mut text = String::new();
    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .map(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"))
            .unwrap_or(false);
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    text.to_lowercase()
}

fn count_hits(patterns: &[Regex], text: &str) -> usize {
    patterns.iter().map(|p| p.find_iter(text).count()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_lookup_is_case_insensitive() {
        assert_eq!(meta_rating_for("PG-13"), Some(SafetyRating::Teen));
        assert_eq!(meta_rating_for(" Safe For Kids "), Some(SafetyRating::SafeForAll));
        assert_eq!(meta_rating_for("XXX"), Some(SafetyRating::Blocked));
        assert_eq!(meta_rating_for("general audiences"), None);
    }

    #[test]
    fn domain_keywords_are_reported() {
        let (outcome, found) = domain_signal("Live-Webcam.example");
        assert_eq!(found, vec!["cam", "webcam"]);
        let outcome = outcome.unwrap();
        assert_eq!(outcome.rating, RatingEffect::Escalate(SafetyRating::Mature));
        assert_eq!(outcome.score, ScoreEffect::Add(-30));
        assert_eq!(outcome.warnings, vec!["Adult keywords in domain: cam, webcam"]);

        let (outcome, found) = domain_signal("library.example.org");
        assert!(outcome.is_none());
        assert!(found.is_empty());
    }

    #[test]
    fn every_keyword_has_a_pattern() {
        assert_eq!(ADULT_PATTERNS.len(), ADULT_CONTENT_KEYWORDS.len());
        assert_eq!(SUSPICIOUS_PATTERNS.len(), SUSPICIOUS_KEYWORDS.len());
    }

    #[test]
    fn script_text_is_not_counted() {
        let html = "<script>var casino='casino casino casino casino casino casino';</script><p>hello</p>";
        let signals = PageSignals::extract(html, None);
        assert_eq!(signals.suspicious_keyword_count, 0);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let html = "<p>Sextant gunnery scampi. A gun, a GUN and a casino.</p>";
        let signals = PageSignals::extract(html, None);
        assert_eq!(signals.adult_keyword_count, 0);
        assert_eq!(signals.suspicious_keyword_count, 3);
    }

    #[test]
    fn rta_label_in_any_meta() {
        let html = r#"<meta name="classification" content="RTA-5042-1996-1400-1577-RTA">"#;
        assert!(PageSignals::extract(html, None).rta_label);
        assert!(!PageSignals::extract(r#"<meta content="rta-12-34">"#, None).rta_label);
    }

    #[test]
    fn first_rating_tag_wins() {
        let html = r#"<meta name="RATING" content="general"><meta name="rating" content="adult">"#;
        let signals = PageSignals::extract(html, None);
        assert_eq!(signals.meta_rating, Some(SafetyRating::SafeForAll));
    }

    #[test]
    fn adult_hits_take_precedence_over_suspicious() {
        let signals = PageSignals {
            adult_keyword_count: 4,
            suspicious_keyword_count: 10,
            ..PageSignals::default()
        };
        let outcomes = signals.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].rating, RatingEffect::Escalate(SafetyRating::Mature));

        let below = PageSignals {
            adult_keyword_count: 3,
            suspicious_keyword_count: 5,
            ..PageSignals::default()
        };
        assert!(below.outcomes().is_empty());
    }

    #[test]
    fn only_clean_reputation_contributes() {
        assert!(reputation_signal(&ReputationOutcome::Clean).is_some());
        assert!(reputation_signal(&ReputationOutcome::NotChecked {
            reason: "timeout".into()
        })
        .is_none());
    }
}
