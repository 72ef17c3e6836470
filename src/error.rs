//! Error types for the NeuroVas feedback loop

use crate::types::Phase;
use thiserror::Error;

/// Signal quality failures raised before any scoring happens.
///
/// These are recoverable: the operator fixes the input and resubmits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("Poor HRV signal: {0} is outside 20-120 ms")]
    PoorHRVSignal(String),

    #[error("Unrecognized EMG input: {0:?}")]
    UnrecognizedEMG(String),

    #[error("Posture not valid: {0:?}")]
    InvalidPosture(String),
}

/// Errors raised at the stage classifier boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("Feature schema has no columns")]
    EmptySchema,

    #[error("Unreadable feature column header: {0}")]
    InvalidHeader(String),

    #[error("Duplicate feature column: {0}")]
    DuplicateColumn(String),

    #[error("Model references unknown feature column: {0}")]
    UnknownColumn(String),

    #[error("Feature vector is missing column: {0}")]
    MissingFeature(String),

    #[error("Classifier returned stage {0}, expected 0-3")]
    StageOutOfRange(i64),

    #[error("Model error: {0}")]
    Model(String),
}

/// Errors raised by the loop controller
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error("Classification failed: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Event {event} is not accepted while {phase}")]
    InvalidTransition { phase: Phase, event: &'static str },

    #[error("Feedback still running: {remaining_seconds}s remaining")]
    FeedbackInProgress { remaining_seconds: u32 },
}

impl LoopError {
    /// Whether the operator can correct the input and retry
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LoopError::Classifier(_))
    }
}

/// Errors loading configuration, models and feature schemas
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// A line of a scripted event stream that could not be parsed
#[derive(Debug, Error)]
#[error("Invalid event on line {line}: {source}")]
pub struct EventParseError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}
