use serde::{Deserialize, Serialize};

use super::SafetyRating;

/// Presentation data for a rating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDisplay {
    pub label: String,
    pub emoji: String,
    pub color: String,
    pub description: String,
}

impl RatingDisplay {
    fn new(label: &str, emoji: &str, color: &str, description: &str) -> Self {
        Self {
            label: label.to_string(),
            emoji: emoji.to_string(),
            color: color.to_string(),
            description: description.to_string(),
        }
    }
}

impl SafetyRating {
    pub fn display(&self) -> RatingDisplay {
        match self {
            SafetyRating::SafeForAll => RatingDisplay::new(
                "Safe for All Ages",
                "👶",
                "#22c55e",
                "Appropriate for all ages",
            ),
            SafetyRating::ParentalGuidance => RatingDisplay::new(
                "Parental Guidance",
                "👪",
                "#84cc16",
                "Recommended with supervision",
            ),
            SafetyRating::Teen => {
                RatingDisplay::new("Teen (13+)", "🧑", "#eab308", "Suitable for teenagers")
            }
            SafetyRating::Mature => RatingDisplay::new(
                "Mature (17+)",
                "🔞",
                "#f97316",
                "Adult content, not for children",
            ),
            SafetyRating::Blocked => {
                RatingDisplay::new("Blocked", "🚫", "#ef4444", "Known harmful/illegal content")
            }
            SafetyRating::Unknown => {
                RatingDisplay::new("Unknown", "❓", "#6b7280", "Safety rating unavailable")
            }
        }
    }
}
