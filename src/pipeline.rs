//! Session drivers
//!
//! This module runs sessions end to end on top of [`LoopController`]:
//! - blocking feedback windows paced in wall-clock time
//! - scripted event streams (NDJSON), with the feedback window inserted
//!   automatically wherever the loop enters it

use crate::controller::{LoopController, LoopEvent, Transition};
use crate::error::{EventParseError, LoopError};
use crate::session::Session;
use crate::types::Phase;
use std::thread;
use std::time::Duration;

/// Run the current feedback window to completion.
///
/// Calls `on_tick` with the seconds left before each one-second step and
/// sleeps `pace` between steps. A zero pace runs the countdown instantly.
pub fn run_feedback<F>(
    controller: &LoopController,
    session: &mut Session,
    pace: Duration,
    mut on_tick: F,
) -> Result<Transition, LoopError>
where
    F: FnMut(u32),
{
    while let Some(remaining) = session.timer().map(|t| t.remaining_seconds()) {
        if remaining == 0 {
            break;
        }
        on_tick(remaining);
        if !pace.is_zero() {
            thread::sleep(pace);
        }
        controller.tick(session);
    }

    controller.handle(session, LoopEvent::FeedbackComplete)
}

/// Parse newline-delimited JSON events. Blank lines are skipped.
pub fn parse_events_ndjson(input: &str) -> Result<Vec<LoopEvent>, EventParseError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line.trim()).map_err(|source| EventParseError {
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Outcome of one scripted event
#[derive(Debug)]
pub struct ReplayStep {
    /// Position of the event in the script (1-based)
    pub index: usize,
    pub event: &'static str,
    pub outcome: Result<Transition, LoopError>,
}

/// Everything a scripted run produced
#[derive(Debug)]
pub struct ReplayReport {
    pub session: Session,
    pub steps: Vec<ReplayStep>,
}

impl ReplayReport {
    /// Number of events the loop rejected
    pub fn rejected(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_err()).count()
    }
}

/// Feed a script of events through a fresh session.
///
/// Whenever the loop is in its feedback phase and the next event is not a
/// feedback or reset event, the feedback window is run first. Rejected input is
/// recorded and the script continues; classifier failures abort the run.
pub fn replay<I>(
    controller: &LoopController,
    events: I,
    pace: Duration,
) -> Result<ReplayReport, LoopError>
where
    I: IntoIterator<Item = LoopEvent>,
{
    let mut session = Session::new();
    let mut steps = Vec::new();

    for (index, event) in events.into_iter().enumerate() {
        let needs_feedback = session.phase() == Phase::FeedbackActive
            && !matches!(event, LoopEvent::FeedbackComplete | LoopEvent::StartNewSession);
        if needs_feedback {
            run_feedback(controller, &mut session, pace, |_| {})?;
        }

        let name = event.name();
        let outcome = match controller.handle(&mut session, event) {
            Err(e) if !e.is_recoverable() => return Err(e),
            other => other,
        };

        steps.push(ReplayStep {
            index: index + 1,
            event: name,
            outcome,
        });
    }

    Ok(ReplayReport { session, steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LinearStageModel;
    use crate::config::LoopConfig;
    use crate::features::FeatureSchema;
    use crate::types::{ComparisonStatus, RawSignalInput};

    const MODEL_JSON: &str = r#"{
        "weights": {
            "hrv": -0.04,
            "emg_level_overactive": 0.8,
            "emg_level_underactive": 0.4,
            "posture_slouched": 0.9
        },
        "intercept": 3.2,
        "cutpoints": [0.5, 1.5, 2.5]
    }"#;

    fn controller() -> LoopController {
        let model = LinearStageModel::from_json(MODEL_JSON).unwrap();
        let config = LoopConfig {
            feedback_seconds: 5,
            ..LoopConfig::default()
        };
        LoopController::with_config(Box::new(model), FeatureSchema::standard(), config)
    }

    #[test]
    fn test_run_feedback_counts_down() {
        let controller = controller();
        let mut session = Session::new();
        controller
            .handle(
                &mut session,
                LoopEvent::SubmitInitial(RawSignalInput::new(40.0, "overactive", "slouched")),
            )
            .unwrap();

        let mut seen = Vec::new();
        let transition =
            run_feedback(&controller, &mut session, Duration::ZERO, |s| seen.push(s)).unwrap();

        assert_eq!(seen, vec![5, 4, 3, 2, 1]);
        assert_eq!(transition, Transition::AwaitingUpdate);
        assert_eq!(session.phase(), Phase::AwaitingUpdatedInput);
    }

    #[test]
    fn test_parse_events_ndjson() {
        let script = r#"
{"event":"submit_initial","hrv":40,"emg_level":"overactive","posture":"slouched"}

{"event":"start_new_session"}
"#;
        let events = parse_events_ndjson(script).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], LoopEvent::StartNewSession);

        let err = parse_events_ndjson("{\"event\":\"submit_initial\"}\nnope").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_replay_inserts_feedback_and_continues_past_bad_input() {
        let script = r#"
{"event":"submit_initial","hrv":40,"emg_level":"overactive","posture":"slouched"}
{"event":"submit_updated","hrv":40,"emg_level":"overactive","posture":"slouched"}
{"event":"submit_updated","hrv":150,"emg_level":"normal","posture":"aligned"}
{"event":"submit_updated","hrv":80,"emg_level":"normal","posture":"aligned"}
"#;
        let events = parse_events_ndjson(script).unwrap();
        let report = replay(&controller(), events, Duration::ZERO).unwrap();

        assert_eq!(report.steps.len(), 4);
        assert_eq!(report.rejected(), 1);
        assert!(matches!(report.steps[2].outcome, Err(LoopError::Signal(_))));

        let log = report.session.log();
        assert_eq!(log.len(), 2);
        assert_eq!(log.all()[0].status, ComparisonStatus::NoChange);
        assert_eq!(log.all()[1].status, ComparisonStatus::Improved);
        assert_eq!(log.all()[1].loop_number, 2);
        assert_eq!(report.session.phase(), Phase::Improving);
    }
}
