//! Core types for the NeuroVas feedback loop
//!
//! This module defines the data structures that flow through each step of the
//! loop: raw operator input, validated signal samples, assessments, loop state
//! and session log entries.

use crate::error::ClassifierError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// EMG muscle activation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmgLevel {
    Normal,
    Overactive,
    Underactive,
}

impl EmgLevel {
    pub const ALL: [EmgLevel; 3] = [EmgLevel::Normal, EmgLevel::Overactive, EmgLevel::Underactive];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmgLevel::Normal => "normal",
            EmgLevel::Overactive => "overactive",
            EmgLevel::Underactive => "underactive",
        }
    }
}

impl FromStr for EmgLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|level| level.as_str() == s).ok_or(())
    }
}

impl fmt::Display for EmgLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Posture category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    Aligned,
    LeanLeft,
    LeanRight,
    Slouched,
}

impl Posture {
    pub const ALL: [Posture; 4] = [
        Posture::Aligned,
        Posture::LeanLeft,
        Posture::LeanRight,
        Posture::Slouched,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Posture::Aligned => "aligned",
            Posture::LeanLeft => "lean_left",
            Posture::LeanRight => "lean_right",
            Posture::Slouched => "slouched",
        }
    }
}

impl FromStr for Posture {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|posture| posture.as_str() == s).ok_or(())
    }
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated measurement as entered by the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignalInput {
    /// Heart rate variability (ms)
    pub hrv: f64,
    /// EMG level category name
    pub emg_level: String,
    /// Posture category name
    pub posture: String,
}

impl RawSignalInput {
    pub fn new(hrv: f64, emg_level: impl Into<String>, posture: impl Into<String>) -> Self {
        Self {
            hrv,
            emg_level: emg_level.into(),
            posture: posture.into(),
        }
    }
}

/// A validated measurement. Only the validator produces these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalSample {
    pub(crate) hrv: f64,
    pub(crate) emg_level: EmgLevel,
    pub(crate) posture: Posture,
}

impl SignalSample {
    pub fn hrv(&self) -> f64 {
        self.hrv
    }

    pub fn emg_level(&self) -> EmgLevel {
        self.emg_level
    }

    pub fn posture(&self) -> Posture {
        self.posture
    }

    /// Convert back to the raw operator form
    pub fn to_raw(&self) -> RawSignalInput {
        RawSignalInput::new(self.hrv, self.emg_level.as_str(), self.posture.as_str())
    }
}

/// Condition severity predicted by the classifier (0-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Stage(u8);

impl Stage {
    pub const MAX: u8 = 3;
    pub const HEALTHY: Stage = Stage(0);

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Stage(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Stage {
    type Error = ClassifierError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Stage::new)
            .ok_or(ClassifierError::StageOutOfRange(value))
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.0
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Risk Prediction Index, 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u8")]
pub struct Rpi(u8);

impl Rpi {
    pub const MAX: u8 = 100;

    /// Build an index from an additive score, capping at 100
    pub fn saturating(score: u32) -> Self {
        Rpi(score.min(u32::from(Self::MAX)) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for Rpi {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value <= u32::from(Self::MAX) {
            Ok(Rpi(value as u8))
        } else {
            Err(format!("RPI {value} exceeds 100"))
        }
    }
}

impl From<Rpi> for u8 {
    fn from(rpi: Rpi) -> Self {
        rpi.0
    }
}

impl fmt::Display for Rpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stage and risk index computed for one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub stage: Stage,
    pub rpi: Rpi,
}

impl Assessment {
    /// Stage 0 with a relaxed risk index needs no feedback at all
    pub fn is_healthy(&self) -> bool {
        self.stage == Stage::HEALTHY && self.rpi.value() < crate::scorer::ALERT_THRESHOLD
    }
}

/// Loop phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingInitialInput,
    FeedbackActive,
    AwaitingUpdatedInput,
    Improving,
    Terminated,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::AwaitingInitialInput => "awaiting_initial_input",
            Phase::FeedbackActive => "feedback_active",
            Phase::AwaitingUpdatedInput => "awaiting_updated_input",
            Phase::Improving => "improving",
            Phase::Terminated => "terminated",
        }
    }

    /// No automatic transition leaves this phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Improving | Phase::Terminated)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single live state of a session.
///
/// `stage_before` and `rpi_before` are set whenever the phase is past
/// `AwaitingInitialInput`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopState {
    pub(crate) loop_number: u32,
    pub(crate) before: Option<Assessment>,
    pub(crate) phase: Phase,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            loop_number: 1,
            before: None,
            phase: Phase::AwaitingInitialInput,
        }
    }
}

impl LoopState {
    pub fn loop_number(&self) -> u32 {
        self.loop_number
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stage_before(&self) -> Option<Stage> {
        self.before.map(|a| a.stage)
    }

    pub fn rpi_before(&self) -> Option<Rpi> {
        self.before.map(|a| a.rpi)
    }

    /// The assessment the next measurement is compared against
    pub fn before(&self) -> Option<Assessment> {
        self.before
    }
}

/// Outcome of comparing a re-measurement against the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Improved,
    NoChange,
    Worsened,
}

impl ComparisonStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ComparisonStatus::Improved => "Improved",
            ComparisonStatus::NoChange => "No Change",
            ComparisonStatus::Worsened => "Worsened",
        }
    }
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One completed comparison in the session log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "loop")]
    pub loop_number: u32,
    pub stage_before: Stage,
    pub rpi_before: Rpi,
    pub stage_after: Stage,
    pub rpi_after: Rpi,
    pub status: ComparisonStatus,
    pub recorded_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        loop_number: u32,
        before: Assessment,
        after: Assessment,
        status: ComparisonStatus,
    ) -> Self {
        Self {
            loop_number,
            stage_before: before.stage,
            rpi_before: before.rpi,
            stage_after: after.stage,
            rpi_after: after.rpi,
            status,
            recorded_at: Utc::now(),
        }
    }
}
