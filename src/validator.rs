//! Signal quality validation
//!
//! This module checks raw operator input before anything is scored.
//! Checks run in a fixed order and stop at the first failure:
//! - HRV within the usable 20-120 ms range
//! - EMG level is a recognized category
//! - Posture is a recognized category

use crate::error::SignalError;
use crate::types::{EmgLevel, Posture, RawSignalInput, SignalSample};

/// Lowest HRV reading considered a usable signal (ms)
pub const HRV_MIN_MS: f64 = 20.0;

/// Highest HRV reading considered a usable signal (ms)
pub const HRV_MAX_MS: f64 = 120.0;

/// Validator turning raw input into typed signal samples
pub struct SignalValidator;

impl SignalValidator {
    /// Validate raw input and produce a typed sample
    pub fn validate(raw: &RawSignalInput) -> Result<SignalSample, SignalError> {
        check_hrv(raw.hrv)?;

        let emg_level = raw
            .emg_level
            .parse::<EmgLevel>()
            .map_err(|_| SignalError::UnrecognizedEMG(raw.emg_level.clone()))?;

        let posture = raw
            .posture
            .parse::<Posture>()
            .map_err(|_| SignalError::InvalidPosture(raw.posture.clone()))?;

        Ok(SignalSample {
            hrv: raw.hrv,
            emg_level,
            posture,
        })
    }

    /// Re-check an already typed sample. Categories are valid by construction.
    pub fn validate_sample(sample: &SignalSample) -> Result<(), SignalError> {
        check_hrv(sample.hrv)
    }
}

fn check_hrv(hrv: f64) -> Result<(), SignalError> {
    // NaN fails both comparisons and lands here too
    if (HRV_MIN_MS..=HRV_MAX_MS).contains(&hrv) {
        Ok(())
    } else {
        Err(SignalError::PoorHRVSignal(hrv.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(hrv: f64, emg: &str, posture: &str) -> RawSignalInput {
        RawSignalInput::new(hrv, emg, posture)
    }

    #[test]
    fn test_accepts_all_recognized_categories() {
        for emg in EmgLevel::ALL {
            for posture in Posture::ALL {
                let sample = SignalValidator::validate(&raw(60.0, emg.as_str(), posture.as_str()))
                    .unwrap();
                assert_eq!(sample.emg_level(), emg);
                assert_eq!(sample.posture(), posture);
            }
        }
    }

    #[test]
    fn test_hrv_bounds_are_inclusive() {
        assert!(SignalValidator::validate(&raw(20.0, "normal", "aligned")).is_ok());
        assert!(SignalValidator::validate(&raw(120.0, "normal", "aligned")).is_ok());
        assert_eq!(
            SignalValidator::validate(&raw(19.9, "normal", "aligned")),
            Err(SignalError::PoorHRVSignal("19.9".to_string()))
        );
        assert!(matches!(
            SignalValidator::validate(&raw(125.0, "normal", "aligned")),
            Err(SignalError::PoorHRVSignal(_))
        ));
        assert!(matches!(
            SignalValidator::validate(&raw(f64::NAN, "normal", "aligned")),
            Err(SignalError::PoorHRVSignal(_))
        ));
    }

    #[test]
    fn test_first_failing_check_wins() {
        // Everything wrong: HRV reported
        assert!(matches!(
            SignalValidator::validate(&raw(5.0, "tense", "upside_down")),
            Err(SignalError::PoorHRVSignal(_))
        ));

        // EMG and posture wrong: EMG reported
        assert_eq!(
            SignalValidator::validate(&raw(60.0, "tense", "upside_down")),
            Err(SignalError::UnrecognizedEMG("tense".to_string()))
        );

        // Only posture wrong
        assert_eq!(
            SignalValidator::validate(&raw(60.0, "normal", "upside_down")),
            Err(SignalError::InvalidPosture("upside_down".to_string()))
        );
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let sample = SignalValidator::validate(&raw(45.0, "underactive", "lean_left")).unwrap();
        assert!(SignalValidator::validate_sample(&sample).is_ok());
        assert_eq!(SignalValidator::validate(&sample.to_raw()), Ok(sample));
    }
}
