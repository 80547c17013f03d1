//! Per-process visitor bookkeeping: live visitor estimate, CAPTCHA
//! challenges and the rating gate with its admin PIN escalation.

use log::{debug, warn};
use rand::Rng;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Wrong PINs allowed before an address is locked for good
pub const MAX_PIN_FAILURES: u32 = 3;

/// Minimum gap between idle-visitor sweeps in `touch`
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// A CAPTCHA question handed to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Challenge {
    pub id: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptchaError {
    #[error("unknown CAPTCHA id")]
    Unknown,

    #[error("CAPTCHA expired")]
    Expired,

    #[error("wrong CAPTCHA answer")]
    WrongAnswer,
}

/// Why a rating submission was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatingRejection {
    #[error("this address has already submitted a rating; the admin PIN is required")]
    PinRequired { remaining_attempts: u32 },

    #[error("invalid admin PIN")]
    InvalidPin { remaining_attempts: u32 },

    #[error("rating submissions are locked for this address")]
    Locked,
}

impl RatingRejection {
    pub fn remaining_attempts(&self) -> u32 {
        match self {
            RatingRejection::PinRequired { remaining_attempts }
            | RatingRejection::InvalidPin { remaining_attempts } => *remaining_attempts,
            RatingRejection::Locked => 0,
        }
    }

    /// Short machine-readable tag
    pub fn reason(&self) -> &'static str {
        match self {
            RatingRejection::PinRequired { .. } => "pin_required",
            RatingRejection::InvalidPin { .. } => "invalid_pin",
            RatingRejection::Locked => "locked",
        }
    }
}

/// Stateful visitor service shared by all request handlers
pub trait VisitorStore: Send + Sync {
    /// Mark an address as seen
    fn touch(&self, addr: &str, now: Instant);

    /// Addresses seen within the idle window; older entries are pruned
    fn active_count(&self, now: Instant) -> usize;

    fn issue_captcha(&self, now: Instant) -> Challenge;

    /// Check an answer. The challenge is consumed whatever the outcome.
    fn verify_captcha(&self, id: &str, answer: i64, now: Instant) -> Result<(), CaptchaError>;

    /// Check the rating gate for `addr` and, if it passes, count the
    /// submission in the same step.
    fn claim_rating(&self, addr: &str, pin: Option<&str>) -> Result<(), RatingRejection>;

    /// Give back a claimed slot whose rating was never stored
    fn release_rating(&self, addr: &str);
}

#[derive(Debug)]
struct PendingCaptcha {
    answer: i64,
    issued_at: Instant,
}

#[derive(Debug, Default)]
struct RatingAttempts {
    submissions: u32,
    pin_failures: u32,
    locked: bool,
}

#[derive(Debug, Default)]
struct VisitorState {
    last_seen: HashMap<String, Instant>,
    captchas: HashMap<String, PendingCaptcha>,
    ratings: HashMap<String, RatingAttempts>,
    last_pruned: Option<Instant>,
}

impl VisitorState {
    fn prune_idle(&mut self, now: Instant, idle_after: Duration) {
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) <= idle_after);
        self.last_pruned = Some(now);
    }
}

/// All three maps behind one lock
pub struct InMemoryVisitorStore {
    state: Mutex<VisitorState>,
    captcha_ttl: Duration,
    idle_after: Duration,
    admin_pin: Option<String>,
}

impl InMemoryVisitorStore {
    pub fn new(captcha_ttl: Duration, idle_after: Duration, admin_pin: Option<String>) -> Self {
        Self {
            state: Mutex::new(VisitorState::default()),
            captcha_ttl,
            idle_after,
            admin_pin: admin_pin.filter(|p| !p.is_empty()),
        }
    }

    fn state(&self) -> MutexGuard<'_, VisitorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl VisitorStore for InMemoryVisitorStore {
    fn touch(&self, addr: &str, now: Instant) {
        let mut state = self.state();
        state.last_seen.insert(addr.to_string(), now);

        let due = state
            .last_pruned
            .map_or(true, |at| now.saturating_duration_since(at) >= PRUNE_INTERVAL);
        if due {
            state.prune_idle(now, self.idle_after);
        }
    }

    fn active_count(&self, now: Instant) -> usize {
        let mut state = self.state();
        state.prune_idle(now, self.idle_after);
        state.last_seen.len()
    }

    fn issue_captcha(&self, now: Instant) -> Challenge {
        let mut rng = rand::thread_rng();
        let a: i64 = rng.gen_range(1..=10);
        let b: i64 = rng.gen_range(1..=10);
        let id = Uuid::new_v4().to_string();

        let mut state = self.state();
        // Drop stale challenges so unanswered ones do not pile up
        let ttl = self.captcha_ttl;
        state
            .captchas
            .retain(|_, c| now.saturating_duration_since(c.issued_at) <= ttl);
        state.captchas.insert(
            id.clone(),
            PendingCaptcha {
                answer: a + b,
                issued_at: now,
            },
        );

        Challenge {
            id,
            question: format!("What is {} + {}?", a, b),
        }
    }

    fn verify_captcha(&self, id: &str, answer: i64, now: Instant) -> Result<(), CaptchaError> {
        let pending = self
            .state()
            .captchas
            .remove(id)
            .ok_or(CaptchaError::Unknown)?;

        if now.saturating_duration_since(pending.issued_at) > self.captcha_ttl {
            return Err(CaptchaError::Expired);
        }
        if pending.answer != answer {
            return Err(CaptchaError::WrongAnswer);
        }
        Ok(())
    }

    fn claim_rating(&self, addr: &str, pin: Option<&str>) -> Result<(), RatingRejection> {
        let mut state = self.state();
        let attempts = match state.ratings.entry(addr.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(RatingAttempts {
                    submissions: 1,
                    ..RatingAttempts::default()
                });
                return Ok(());
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if attempts.locked {
            return Err(RatingRejection::Locked);
        }
        if attempts.submissions == 0 {
            attempts.submissions = 1;
            return Ok(());
        }

        let remaining = MAX_PIN_FAILURES - attempts.pin_failures;
        let Some(pin) = pin else {
            return Err(RatingRejection::PinRequired {
                remaining_attempts: remaining,
            });
        };

        if self.admin_pin.as_deref() == Some(pin) {
            attempts.pin_failures = 0;
            attempts.submissions += 1;
            return Ok(());
        }

        attempts.pin_failures += 1;
        if attempts.pin_failures >= MAX_PIN_FAILURES {
            attempts.locked = true;
            warn!("Locking rating submissions from {}", addr);
            return Err(RatingRejection::Locked);
        }

        debug!(
            "Wrong admin PIN from {} ({} failures)",
            addr, attempts.pin_failures
        );
        Err(RatingRejection::InvalidPin {
            remaining_attempts: MAX_PIN_FAILURES - attempts.pin_failures,
        })
    }

    fn release_rating(&self, addr: &str) {
        let mut state = self.state();
        let Some(attempts) = state.ratings.get_mut(addr) else {
            return;
        };
        attempts.submissions = attempts.submissions.saturating_sub(1);
        if attempts.submissions == 0 && attempts.pin_failures == 0 && !attempts.locked {
            state.ratings.remove(addr);
        }
    }
}
