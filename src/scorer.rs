//! Risk Prediction Index scoring
//!
//! The RPI is an additive score, not a probability:
//! - 33 points per predicted stage
//! - +10 when HRV is below 50 ms
//! - +5 for overactive EMG, +3 for underactive EMG
//!
//! capped at 100.

use crate::types::{Assessment, EmgLevel, Rpi, SignalSample, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Points contributed by each stage step
pub const STAGE_WEIGHT: u32 = 33;

/// HRV below this adds the low-HRV penalty (ms)
pub const LOW_HRV_MS: f64 = 50.0;

pub const LOW_HRV_PENALTY: u32 = 10;
pub const OVERACTIVE_EMG_PENALTY: u32 = 5;
pub const UNDERACTIVE_EMG_PENALTY: u32 = 3;

/// Lowest RPI in the Alert band
pub const ALERT_THRESHOLD: u8 = 35;

/// Lowest RPI in the Urgent band
pub const URGENT_THRESHOLD: u8 = 70;

/// Scorer computing the composite risk index
pub struct RiskScorer;

impl RiskScorer {
    /// Compute the RPI for a predicted stage and the sample it came from
    pub fn score(stage: Stage, sample: &SignalSample) -> Rpi {
        let mut score = u32::from(stage.value()) * STAGE_WEIGHT;

        if sample.hrv() < LOW_HRV_MS {
            score += LOW_HRV_PENALTY;
        }

        score += match sample.emg_level() {
            EmgLevel::Normal => 0,
            EmgLevel::Overactive => OVERACTIVE_EMG_PENALTY,
            EmgLevel::Underactive => UNDERACTIVE_EMG_PENALTY,
        };

        Rpi::saturating(score)
    }

    /// Score and bundle into an assessment
    pub fn assess(stage: Stage, sample: &SignalSample) -> Assessment {
        Assessment {
            stage,
            rpi: Self::score(stage, sample),
        }
    }
}

/// Interpretation band of an RPI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Relaxed,
    Alert,
    Urgent,
}

impl RiskBand {
    pub fn from_rpi(rpi: Rpi) -> Self {
        match rpi.value() {
            v if v < ALERT_THRESHOLD => RiskBand::Relaxed,
            v if v < URGENT_THRESHOLD => RiskBand::Alert,
            _ => RiskBand::Urgent,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskBand::Relaxed => "Relaxed",
            RiskBand::Alert => "Alert",
            RiskBand::Urgent => "Urgent",
        }
    }

    /// Recommended action for the operator
    pub fn action(&self) -> &'static str {
        match self {
            RiskBand::Relaxed => "No immediate action needed.",
            RiskBand::Alert => "Begin feedback session.",
            RiskBand::Urgent => "Trigger full feedback loop.",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.label(), self.action())
    }
}

impl Assessment {
    pub fn band(&self) -> RiskBand {
        RiskBand::from_rpi(self.rpi)
    }
}
