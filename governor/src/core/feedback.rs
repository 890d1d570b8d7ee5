//! FeedbackTensor: normalized failure/confidence/repair-hypothesis record.

use serde::{Deserialize, Serialize};

use crate::core::decision::RepairDecision;

/// Calibration band for a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationBand {
    Low,
    Medium,
    High,
}

/// Confidence score in `[0, 1]` with its calibration band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub score: f64,
    pub calibration_band: CalibrationBand,
}

impl Confidence {
    pub fn new(score: f64, calibration_band: CalibrationBand) -> Self {
        Self {
            score,
            calibration_band,
        }
    }
}

/// Provenance of a feedback record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackProvenance {
    pub run_id: String,
    pub stage: String,
    /// Contract schema versions in effect, keyed by family.
    pub contract_versions: Vec<(String, String)>,
}

/// Normalized failure/confidence/repair-hypothesis record.
///
/// All fields are optional so the continuation gate can observe which
/// contract-required fields are actually present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeedbackTensor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_repair_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<FeedbackProvenance>,
}

impl FeedbackTensor {
    /// True if the named field carries a value.
    ///
    /// Unknown field names report `false` so that a contract declaring a
    /// field this record cannot carry blocks continuation (fail-closed).
    pub fn has_field(&self, name: &str) -> bool {
        match name {
            "confidence" => self.confidence.is_some(),
            "failure_signal" => self.failure_signal.is_some(),
            "alternatives" => self.alternatives.is_some(),
            "proposed_repair_action" => self.proposed_repair_action.is_some(),
            "provenance" => self.provenance.is_some(),
            _ => false,
        }
    }
}

/// Outcome category used to derive default confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// The governed operation failed schema/contract validation.
    SchemaContractFailure,
    /// The governed operation failed at runtime for any other reason.
    RuntimeFailure,
    /// The repair loop produced a repaired excerpt.
    Repaired,
    /// The decision was to escalate.
    Escalated,
    /// The decision was to stop.
    Stopped,
}

impl From<RepairDecision> for FeedbackOutcome {
    fn from(decision: RepairDecision) -> Self {
        match decision {
            RepairDecision::Repaired => FeedbackOutcome::Repaired,
            RepairDecision::Escalate => FeedbackOutcome::Escalated,
            RepairDecision::Stop => FeedbackOutcome::Stopped,
        }
    }
}

/// Default confidence per outcome category.
pub fn default_confidence(outcome: FeedbackOutcome) -> Confidence {
    match outcome {
        FeedbackOutcome::SchemaContractFailure => Confidence::new(0.9, CalibrationBand::High),
        FeedbackOutcome::RuntimeFailure => Confidence::new(0.7, CalibrationBand::Medium),
        FeedbackOutcome::Repaired => Confidence::new(0.9, CalibrationBand::High),
        FeedbackOutcome::Escalated => Confidence::new(0.45, CalibrationBand::Medium),
        FeedbackOutcome::Stopped => Confidence::new(0.2, CalibrationBand::Low),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_field_reports_present_fields() {
        let tensor = FeedbackTensor {
            failure_signal: Some("timeout".to_string()),
            ..FeedbackTensor::default()
        };
        assert!(tensor.has_field("failure_signal"));
        assert!(!tensor.has_field("provenance"));
    }

    #[test]
    fn has_field_is_false_for_unknown_names() {
        let tensor = FeedbackTensor::default();
        assert!(!tensor.has_field("nonexistent_field"));
    }

    #[test]
    fn default_confidence_matches_outcome_table() {
        let repaired = default_confidence(FeedbackOutcome::Repaired);
        assert_eq!(repaired.score, 0.9);
        assert_eq!(repaired.calibration_band, CalibrationBand::High);

        let stopped = default_confidence(FeedbackOutcome::Stopped);
        assert_eq!(stopped.score, 0.2);
        assert_eq!(stopped.calibration_band, CalibrationBand::Low);

        let escalated = default_confidence(FeedbackOutcome::Escalated);
        assert_eq!(escalated.score, 0.45);
        assert_eq!(escalated.calibration_band, CalibrationBand::Medium);
    }
}
