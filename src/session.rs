//! Session ownership
//!
//! A [`Session`] owns everything one monitoring session mutates: the live loop
//! state, the session log and the running feedback timer. Only the loop
//! controller changes it. Resetting swaps in a completely fresh session.

use crate::session_log::SessionLog;
use crate::timer::FeedbackTimer;
use crate::types::{LoopState, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    pub(crate) state: LoopState,
    pub(crate) log: SessionLog,
    pub(crate) timer: Option<FeedbackTimer>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a fresh session awaiting its first measurement
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: LoopState::default(),
            log: SessionLog::new(),
            timer: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn loop_number(&self) -> u32 {
        self.state.loop_number
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// The running feedback timer, present only while feedback is active
    pub fn timer(&self) -> Option<&FeedbackTimer> {
        self.timer.as_ref()
    }

    /// Replace every field at once with a fresh session
    pub(crate) fn reset(&mut self) {
        *self = Session::new();
    }
}
