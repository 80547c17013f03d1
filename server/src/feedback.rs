use log::info;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::db::{Database, LinkError};
use crate::models::{FeedbackRecord, NewFeedback};
use crate::names::generate_display_name;
use crate::visitors::{CaptchaError, RatingRejection, VisitorStore};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

/// Body of a rating submission
#[derive(Debug, Clone, Deserialize)]
pub struct RatingSubmission {
    pub captcha_id: String,
    pub captcha_answer: i64,
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scan_id: Option<i64>,
    #[serde(default)]
    pub pin: Option<String>,
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),

    #[error(transparent)]
    Captcha(#[from] CaptchaError),

    #[error(transparent)]
    Rejected(#[from] RatingRejection),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("failed to store feedback: {0}")]
    Storage(anyhow::Error),
}

/// Accepts human ratings behind the CAPTCHA and the rating gate
#[derive(Clone)]
pub struct FeedbackService {
    db: Database,
    visitors: Arc<dyn VisitorStore>,
}

impl FeedbackService {
    pub fn new(db: Database, visitors: Arc<dyn VisitorStore>) -> Self {
        Self { db, visitors }
    }

    /// Validate, gate and persist one rating from `addr`
    pub fn submit_rating(
        &self,
        addr: &str,
        submission: RatingSubmission,
        now: Instant,
    ) -> Result<FeedbackRecord, FeedbackError> {
        if !(MIN_RATING..=MAX_RATING).contains(&submission.rating) {
            return Err(FeedbackError::InvalidRating(submission.rating));
        }

        self.visitors
            .verify_captcha(&submission.captcha_id, submission.captcha_answer, now)?;
        self.visitors
            .claim_rating(addr, submission.pin.as_deref())?;

        let feedback = NewFeedback {
            rating: submission.rating as u8,
            comment: non_blank(submission.comment),
            name: non_blank(submission.name).unwrap_or_else(generate_display_name),
            scan_id: submission.scan_id,
        };

        let record = match self.db.insert_feedback(&feedback) {
            Ok(record) => record,
            Err(e) => {
                self.visitors.release_rating(addr);
                return Err(match e.downcast::<LinkError>() {
                    Ok(link) => FeedbackError::Link(link),
                    Err(e) => FeedbackError::Storage(e),
                });
            }
        };

        info!(
            "Stored rating {} from {} as {:?}",
            record.rating, record.name, record.scan_id
        );
        Ok(record)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
