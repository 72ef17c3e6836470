//! NeuroVas Loop - biofeedback monitoring loop engine
//!
//! NeuroVas scores a subject's physiological signals into a clinical stage and a
//! Risk Prediction Index, runs a timed feedback window, and re-measures to decide
//! whether feedback repeats or the session stops:
//! validation → classification → scoring → feedback → re-measurement → comparison.
//!
//! ## Modules
//!
//! - **Scoring**: signal validation, feature construction, stage classification and RPI scoring
//! - **Loop**: the session state machine, its feedback timer and the session log

pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod scorer;
pub mod session;
pub mod session_log;
pub mod timer;
pub mod types;
pub mod validator;

pub use classifier::{LinearStageModel, StageClassifier};
pub use config::LoopConfig;
pub use controller::{LoopController, LoopEvent, Transition};
pub use error::{ClassifierError, ConfigError, EventParseError, LoopError, SignalError};
pub use features::{FeatureSchema, FeatureVector};
pub use pipeline::{parse_events_ndjson, replay, run_feedback};
pub use scorer::{RiskBand, RiskScorer};
pub use session::Session;
pub use session_log::SessionLog;
pub use timer::FeedbackTimer;
pub use types::{Assessment, ComparisonStatus, LogEntry, Phase, RawSignalInput, Rpi, Stage};
pub use validator::SignalValidator;

/// NeuroVas version
pub const NEUROVAS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by tooling
pub const PRODUCER_NAME: &str = "neurovas-loop";
