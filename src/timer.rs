//! Feedback phase countdown
//!
//! The timer only counts; it never sleeps. The caller decides how a tick maps
//! to wall-clock time and polls `is_expired()`.

use serde::{Deserialize, Serialize};

/// Default length of one feedback window in seconds
pub const DEFAULT_FEEDBACK_SECONDS: u32 = 30;

/// Fixed-duration countdown decremented one second per tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackTimer {
    duration_seconds: u32,
    remaining_seconds: u32,
}

impl Default for FeedbackTimer {
    fn default() -> Self {
        Self::new(DEFAULT_FEEDBACK_SECONDS)
    }
}

impl FeedbackTimer {
    pub fn new(duration_seconds: u32) -> Self {
        Self {
            duration_seconds,
            remaining_seconds: duration_seconds,
        }
    }

    /// Advance by one second and return the seconds left
    pub fn tick(&mut self) -> u32 {
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        self.remaining_seconds
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.duration_seconds.saturating_sub(self.remaining_seconds)
    }

    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_seconds == 0
    }
}
