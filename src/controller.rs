//! Feedback loop orchestration
//!
//! This module provides the loop state machine. Each measurement goes through:
//! 1. SignalValidator - Check HRV range and categories
//! 2. FeatureBuilder - Build the classifier feature vector
//! 3. StageClassifier - Predict the stage
//! 4. RiskScorer - Compute the RPI
//!
//! and the controller then compares it against the previous measurement to
//! decide whether feedback repeats or the session stops.
//!
//! Transitions are driven by discrete [`LoopEvent`]s. An event that does not
//! apply to the current phase is rejected without touching the session, and
//! every fallible step runs before the first mutation.

use crate::classifier::{predict_stage, StageClassifier};
use crate::config::LoopConfig;
use crate::error::LoopError;
use crate::features::{FeatureBuilder, FeatureSchema};
use crate::scorer::RiskScorer;
use crate::session::Session;
use crate::timer::FeedbackTimer;
use crate::types::{
    Assessment, ComparisonStatus, LogEntry, Phase, RawSignalInput, SignalSample,
};
use crate::validator::SignalValidator;
use serde::{Deserialize, Serialize};

/// Events accepted by the loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    /// First measurement of a session
    SubmitInitial(RawSignalInput),
    /// The feedback window ran out
    FeedbackComplete,
    /// Re-measurement after feedback
    SubmitUpdated(RawSignalInput),
    /// Discard everything and start over
    StartNewSession,
}

impl LoopEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LoopEvent::SubmitInitial(_) => "submit_initial",
            LoopEvent::FeedbackComplete => "feedback_complete",
            LoopEvent::SubmitUpdated(_) => "submit_updated",
            LoopEvent::StartNewSession => "start_new_session",
        }
    }
}

/// Result of applying an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Initial measurement needs no healing; the session is finished
    Healthy { assessment: Assessment },
    /// A feedback window started
    FeedbackStarted {
        loop_number: u32,
        assessment: Assessment,
    },
    /// Feedback finished; waiting for the re-measurement
    AwaitingUpdate,
    /// A re-measurement was compared and logged
    Compared {
        entry: LogEntry,
        assessment: Assessment,
        next_phase: Phase,
    },
    /// All state cleared
    SessionReset,
}

/// Stateless driver of a [`Session`].
///
/// Holds the classifier, the feature schema and the timing configuration; all
/// per-session state lives in the session passed to each call.
pub struct LoopController {
    classifier: Box<dyn StageClassifier>,
    schema: FeatureSchema,
    config: LoopConfig,
}

impl LoopController {
    /// Create a controller with default timing
    pub fn new(classifier: Box<dyn StageClassifier>, schema: FeatureSchema) -> Self {
        Self::with_config(classifier, schema, LoopConfig::default())
    }

    pub fn with_config(
        classifier: Box<dyn StageClassifier>,
        schema: FeatureSchema,
        config: LoopConfig,
    ) -> Self {
        Self {
            classifier,
            schema,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Validate, classify and score one measurement without touching any session
    pub fn assess(&self, raw: &RawSignalInput) -> Result<(SignalSample, Assessment), LoopError> {
        let sample = SignalValidator::validate(raw)?;
        let features = FeatureBuilder::build(&self.schema, &sample);
        let stage = predict_stage(self.classifier.as_ref(), &features)?;
        let assessment = RiskScorer::assess(stage, &sample);

        log::debug!(
            "assessed hrv={} emg={} posture={}: stage {} rpi {}",
            sample.hrv(),
            sample.emg_level(),
            sample.posture(),
            assessment.stage,
            assessment.rpi
        );

        Ok((sample, assessment))
    }

    /// Apply an event to the session
    pub fn handle(&self, session: &mut Session, event: LoopEvent) -> Result<Transition, LoopError> {
        let result = match (session.phase(), event) {
            (_, LoopEvent::StartNewSession) => Ok(self.start_new_session(session)),
            (Phase::AwaitingInitialInput, LoopEvent::SubmitInitial(raw)) => {
                self.submit_initial(session, &raw)
            }
            (Phase::FeedbackActive, LoopEvent::FeedbackComplete) => self.complete_feedback(session),
            (Phase::AwaitingUpdatedInput, LoopEvent::SubmitUpdated(raw)) => {
                self.submit_updated(session, &raw)
            }
            (phase, event) => Err(LoopError::InvalidTransition {
                phase,
                event: event.name(),
            }),
        };

        if let Err(e) = &result {
            log::warn!("session {}: {}", session.id(), e);
        }
        result
    }

    /// Advance the feedback countdown by one second.
    ///
    /// Returns the seconds left, or `None` when no feedback window is running.
    pub fn tick(&self, session: &mut Session) -> Option<u32> {
        if session.phase() != Phase::FeedbackActive {
            return None;
        }
        session.timer.as_mut().map(FeedbackTimer::tick)
    }

    fn submit_initial(
        &self,
        session: &mut Session,
        raw: &RawSignalInput,
    ) -> Result<Transition, LoopError> {
        let (_, assessment) = self.assess(raw)?;

        session.state.before = Some(assessment);

        if assessment.is_healthy() {
            session.state.phase = Phase::Terminated;
            log::info!(
                "session {}: healthy at first measurement (stage {}, rpi {})",
                session.id(),
                assessment.stage,
                assessment.rpi
            );
            return Ok(Transition::Healthy { assessment });
        }

        self.begin_feedback(session);
        log::info!(
            "session {} loop {}: feedback started (stage {}, rpi {}, {})",
            session.id(),
            session.loop_number(),
            assessment.stage,
            assessment.rpi,
            assessment.band().label()
        );

        Ok(Transition::FeedbackStarted {
            loop_number: session.loop_number(),
            assessment,
        })
    }

    fn complete_feedback(&self, session: &mut Session) -> Result<Transition, LoopError> {
        if let Some(timer) = session.timer() {
            if !timer.is_expired() {
                return Err(LoopError::FeedbackInProgress {
                    remaining_seconds: timer.remaining_seconds(),
                });
            }
        }

        session.timer = None;
        session.state.phase = Phase::AwaitingUpdatedInput;
        log::info!(
            "session {} loop {}: feedback complete",
            session.id(),
            session.loop_number()
        );

        Ok(Transition::AwaitingUpdate)
    }

    fn submit_updated(
        &self,
        session: &mut Session,
        raw: &RawSignalInput,
    ) -> Result<Transition, LoopError> {
        let before = session.state.before.ok_or(LoopError::InvalidTransition {
            phase: session.phase(),
            event: "submit_updated",
        })?;
        let (_, after) = self.assess(raw)?;

        let status = compare(before, after);
        let entry = LogEntry::new(session.loop_number(), before, after, status);
        session.log.append(entry.clone());

        log::info!(
            "session {} loop {}: {} (stage {} -> {}, rpi {} -> {})",
            session.id(),
            session.loop_number(),
            status,
            before.stage,
            after.stage,
            before.rpi,
            after.rpi
        );

        match status {
            ComparisonStatus::Improved => {
                session.state.phase = Phase::Improving;
            }
            ComparisonStatus::NoChange | ComparisonStatus::Worsened => {
                session.state.before = Some(after);
                session.state.loop_number += 1;
                self.begin_feedback(session);
            }
        }

        Ok(Transition::Compared {
            entry,
            assessment: after,
            next_phase: session.phase(),
        })
    }

    fn start_new_session(&self, session: &mut Session) -> Transition {
        let previous = session.id();
        session.reset();
        log::info!("session {previous} discarded, new session {}", session.id());
        Transition::SessionReset
    }

    fn begin_feedback(&self, session: &mut Session) {
        session.timer = Some(FeedbackTimer::new(self.config.feedback_seconds));
        session.state.phase = Phase::FeedbackActive;
    }
}

/// Compare a re-measurement against the previous one.
///
/// An improvement in either stage or RPI counts as improved, even when the
/// other metric got worse. Equal in both is no change; anything else worsened.
pub fn compare(before: Assessment, after: Assessment) -> ComparisonStatus {
    if after.rpi < before.rpi || after.stage < before.stage {
        ComparisonStatus::Improved
    } else if after == before {
        ComparisonStatus::NoChange
    } else {
        ComparisonStatus::Worsened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassifierError, SignalError};
    use crate::features::FeatureVector;
    use crate::types::{Rpi, Stage};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Returns queued stages in order, one per prediction
    struct Scripted(RefCell<VecDeque<i64>>);

    impl Scripted {
        fn boxed(stages: &[i64]) -> Box<dyn StageClassifier> {
            Box::new(Scripted(RefCell::new(stages.iter().copied().collect())))
        }
    }

    impl StageClassifier for Scripted {
        fn predict(&self, _features: &FeatureVector) -> Result<i64, ClassifierError> {
            self.0
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| ClassifierError::Model("script exhausted".to_string()))
        }
    }

    fn controller(stages: &[i64]) -> LoopController {
        let config = LoopConfig {
            feedback_seconds: 3,
            ..LoopConfig::default()
        };
        LoopController::with_config(Scripted::boxed(stages), FeatureSchema::standard(), config)
    }

    fn input(hrv: f64, emg: &str) -> RawSignalInput {
        RawSignalInput::new(hrv, emg, "aligned")
    }

    fn assessment(stage: u8, rpi: u32) -> Assessment {
        Assessment {
            stage: Stage::new(stage).unwrap(),
            rpi: Rpi::saturating(rpi),
        }
    }

    fn finish_feedback(controller: &LoopController, session: &mut Session) {
        while controller.tick(session).is_some_and(|left| left > 0) {}
        assert_eq!(
            controller.handle(session, LoopEvent::FeedbackComplete).unwrap(),
            Transition::AwaitingUpdate
        );
    }

    #[test]
    fn test_compare_precedence() {
        assert_eq!(compare(assessment(2, 76), assessment(1, 43)), ComparisonStatus::Improved);
        assert_eq!(compare(assessment(2, 76), assessment(2, 76)), ComparisonStatus::NoChange);
        assert_eq!(compare(assessment(1, 43), assessment(2, 76)), ComparisonStatus::Worsened);
        // Lower RPI wins even though the stage went up
        assert_eq!(compare(assessment(1, 48), assessment(2, 40)), ComparisonStatus::Improved);
        // Lower stage wins even though the RPI went up
        assert_eq!(compare(assessment(2, 66), assessment(1, 70)), ComparisonStatus::Improved);
    }

    #[test]
    fn test_healthy_initial_measurement() {
        let controller = controller(&[0]);
        let mut session = Session::new();

        let transition = controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(80.0, "normal")))
            .unwrap();

        assert_eq!(
            transition,
            Transition::Healthy {
                assessment: assessment(0, 0)
            }
        );
        assert_eq!(session.phase(), Phase::Terminated);
        assert_eq!(session.loop_number(), 1);
        assert!(session.log().is_empty());
        assert!(session.timer().is_none());
    }

    #[test]
    fn test_healthy_depends_on_stage() {
        // Stage 0 with every penalty is 0 + 10 + 5 = 15, still relaxed
        let zero = controller(&[0]);
        let mut session = Session::new();
        let transition = zero
            .handle(&mut session, LoopEvent::SubmitInitial(input(40.0, "overactive")))
            .unwrap();
        assert_eq!(
            transition,
            Transition::Healthy {
                assessment: assessment(0, 15)
            }
        );

        // Stage 1 is never healthy
        let one = controller(&[1]);
        let mut session = Session::new();
        let transition = one
            .handle(&mut session, LoopEvent::SubmitInitial(input(80.0, "normal")))
            .unwrap();
        assert_eq!(
            transition,
            Transition::FeedbackStarted {
                loop_number: 1,
                assessment: assessment(1, 33)
            }
        );
        assert_eq!(session.phase(), Phase::FeedbackActive);
        assert_eq!(session.state().rpi_before(), Some(Rpi::saturating(33)));
    }

    #[test]
    fn test_no_change_loops_back_to_feedback() {
        let controller = controller(&[2, 2]);
        let mut session = Session::new();

        controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(40.0, "overactive")))
            .unwrap();
        finish_feedback(&controller, &mut session);

        let transition = controller
            .handle(&mut session, LoopEvent::SubmitUpdated(input(45.0, "overactive")))
            .unwrap();

        match transition {
            Transition::Compared { entry, next_phase, .. } => {
                assert_eq!(entry.status, ComparisonStatus::NoChange);
                assert_eq!(entry.loop_number, 1);
                assert_eq!(next_phase, Phase::FeedbackActive);
            }
            other => panic!("unexpected transition {other:?}"),
        }
        assert_eq!(session.loop_number(), 2);
        assert_eq!(session.timer().map(|t| t.remaining_seconds()), Some(3));
    }

    #[test]
    fn test_worsened_updates_baseline() {
        let controller = controller(&[1, 2]);
        let mut session = Session::new();

        controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(60.0, "underactive")))
            .unwrap();
        finish_feedback(&controller, &mut session);
        controller
            .handle(&mut session, LoopEvent::SubmitUpdated(input(40.0, "overactive")))
            .unwrap();

        assert_eq!(session.log().last().unwrap().status, ComparisonStatus::Worsened);
        assert_eq!(session.state().before(), Some(assessment(2, 81)));
        assert_eq!(session.loop_number(), 2);
        assert_eq!(session.phase(), Phase::FeedbackActive);
    }

    #[test]
    fn test_improved_stops_the_loop() {
        let controller = controller(&[2, 1]);
        let mut session = Session::new();

        controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(40.0, "overactive")))
            .unwrap();
        finish_feedback(&controller, &mut session);
        controller
            .handle(&mut session, LoopEvent::SubmitUpdated(input(70.0, "normal")))
            .unwrap();

        assert_eq!(session.phase(), Phase::Improving);
        assert_eq!(session.loop_number(), 1);
        assert!(session.timer().is_none());
        assert_eq!(controller.tick(&mut session), None);

        let err = controller
            .handle(&mut session, LoopEvent::FeedbackComplete)
            .unwrap_err();
        assert!(matches!(
            err,
            LoopError::InvalidTransition {
                phase: Phase::Improving,
                event: "feedback_complete"
            }
        ));
    }

    #[test]
    fn test_feedback_cannot_complete_early() {
        let controller = controller(&[2]);
        let mut session = Session::new();
        controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(40.0, "normal")))
            .unwrap();

        assert_eq!(controller.tick(&mut session), Some(2));
        let err = controller
            .handle(&mut session, LoopEvent::FeedbackComplete)
            .unwrap_err();
        assert!(matches!(
            err,
            LoopError::FeedbackInProgress {
                remaining_seconds: 2
            }
        ));
        assert_eq!(session.phase(), Phase::FeedbackActive);

        // No input accepted while feedback runs
        let err = controller
            .handle(&mut session, LoopEvent::SubmitUpdated(input(60.0, "normal")))
            .unwrap_err();
        assert!(matches!(err, LoopError::InvalidTransition { .. }));
    }

    #[test]
    fn test_invalid_signal_leaves_session_untouched() {
        let controller = controller(&[2]);
        let mut session = Session::new();
        let before = session.state().clone();

        let err = controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(10.0, "normal")))
            .unwrap_err();

        assert!(matches!(err, LoopError::Signal(SignalError::PoorHRVSignal(_))));
        assert!(err.is_recoverable());
        assert_eq!(session.state(), &before);

        // The scripted stage was not consumed, so a corrected input still works
        controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(40.0, "normal")))
            .unwrap();
        assert_eq!(session.phase(), Phase::FeedbackActive);
    }

    #[test]
    fn test_classifier_failure_propagates() {
        let controller = controller(&[9]);
        let mut session = Session::new();

        let err = controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(60.0, "normal")))
            .unwrap_err();

        assert!(matches!(
            err,
            LoopError::Classifier(ClassifierError::StageOutOfRange(9))
        ));
        assert!(!err.is_recoverable());
        assert_eq!(session.phase(), Phase::AwaitingInitialInput);
        assert!(session.state().before().is_none());
    }

    #[test]
    fn test_repeated_initial_submission_rejected() {
        let controller = controller(&[2, 2]);
        let mut session = Session::new();
        controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(40.0, "normal")))
            .unwrap();

        let err = controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(40.0, "normal")))
            .unwrap_err();
        assert!(matches!(
            err,
            LoopError::InvalidTransition {
                phase: Phase::FeedbackActive,
                event: "submit_initial"
            }
        ));
    }

    #[test]
    fn test_start_new_session_from_any_phase() {
        let controller = controller(&[2]);
        let mut session = Session::new();
        controller
            .handle(&mut session, LoopEvent::SubmitInitial(input(40.0, "normal")))
            .unwrap();

        let transition = controller
            .handle(&mut session, LoopEvent::StartNewSession)
            .unwrap();

        assert_eq!(transition, Transition::SessionReset);
        assert_eq!(session.phase(), Phase::AwaitingInitialInput);
        assert_eq!(session.loop_number(), 1);
        assert!(session.timer().is_none());
    }

    #[test]
    fn test_event_json_shape() {
        let event: LoopEvent = serde_json::from_str(
            r#"{"event":"submit_updated","hrv":55,"emg_level":"normal","posture":"slouched"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            LoopEvent::SubmitUpdated(RawSignalInput::new(55.0, "normal", "slouched"))
        );

        let event: LoopEvent = serde_json::from_str(r#"{"event":"start_new_session"}"#).unwrap();
        assert_eq!(event, LoopEvent::StartNewSession);
    }
}
