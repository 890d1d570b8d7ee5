//! Shared decision protocol for governance components.
//!
//! Every decision-making stage resolves to one of three terminal states and a
//! stable reason code. Decisions are values, not errors: callers branch on
//! them explicitly and the compiler enforces exhaustive handling.

use serde::{Deserialize, Serialize};

/// Terminal state of a governance decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Execution may proceed.
    Continue,
    /// A human or higher authority must review before proceeding.
    Escalate,
    /// Execution must not proceed.
    Stop,
}

impl Decision {
    /// True only for [`Decision::Continue`].
    pub fn allows_continuation(self) -> bool {
        matches!(self, Decision::Continue)
    }
}

/// Terminal state of the repair loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairDecision {
    /// A rule produced a usable repaired excerpt.
    Repaired,
    /// No safe deterministic repair exists; a human must decide.
    Escalate,
    /// A terminal condition or exhausted budget forbids continuation.
    Stop,
}

impl RepairDecision {
    pub fn allows_continuation(self) -> bool {
        matches!(self, RepairDecision::Repaired)
    }
}

/// Outcome of a single repair loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// The rule consumed an attempt and the loop continues.
    Retry,
    /// The rule produced a repaired excerpt.
    Repaired,
}

/// Stable machine-readable reason codes.
///
/// Gate and repair codes are SCREAMING_SNAKE; pipeline stage codes are lower
/// snake. Codes are part of the artifact wire format and must never change
/// meaning.
pub mod reason {
    // Repair loop.
    pub const DETERMINISTIC_REPAIR_APPLIED: &str = "DETERMINISTIC_REPAIR_APPLIED";
    pub const RETRY_RECOVERY_PENDING: &str = "RETRY_RECOVERY_PENDING";
    pub const RETRY_RECOVERY_SUCCEEDED: &str = "RETRY_RECOVERY_SUCCEEDED";
    pub const POLICY_DENY_TERMINAL: &str = "POLICY_DENY_TERMINAL";
    pub const NO_SAFE_DETERMINISTIC_REPAIR: &str = "NO_SAFE_DETERMINISTIC_REPAIR";
    pub const MAX_ATTEMPTS_EXCEEDED: &str = "MAX_ATTEMPTS_EXCEEDED";

    // Continuation gate.
    pub const POLICY_PROFILE_REQUIRED: &str = "POLICY_PROFILE_REQUIRED";
    pub const VERIFICATION_REQUIRED_FEEDBACK_MISSING: &str =
        "VERIFICATION_REQUIRED_FEEDBACK_MISSING";
    pub const VERIFICATION_POLICY_ASSERTION_FAILED: &str = "VERIFICATION_POLICY_ASSERTION_FAILED";
    pub const VERIFICATION_REQUIRED_CHECKS_BELOW_THRESHOLD: &str =
        "VERIFICATION_REQUIRED_CHECKS_BELOW_THRESHOLD";
    pub const VERIFICATION_GATE_PASSED: &str = "VERIFICATION_GATE_PASSED";

    // Contract validator.
    pub const INVALID_INPUT: &str = "INVALID_INPUT";
    pub const SCHEMA_VALIDATION_FAILED: &str = "SCHEMA_VALIDATION_FAILED";
    pub const VERSION_INCOMPATIBLE: &str = "VERSION_INCOMPATIBLE";

    // Pipeline stages.
    pub const OK: &str = "ok";
    pub const MAPPING_AMBIGUOUS: &str = "mapping_ambiguous";
    pub const MAPPING_LOW_CONFIDENCE: &str = "mapping_low_confidence";
    pub const UNSUPPORTED_INPUT: &str = "unsupported_input";
    pub const BOUNDS_EXCEEDED: &str = "bounds_exceeded";
    pub const FORBIDDEN_PATH_TOUCHED: &str = "forbidden_path_touched";
    pub const ESCALATION_PATH_TOUCHED: &str = "escalation_path_touched";
    pub const VERIFICATION_INCOMPLETE: &str = "verification_incomplete";
    pub const VERIFICATION_FAILED: &str = "verification_failed";
    pub const POLICY_BLOCKED: &str = "policy_blocked";
    pub const ROLLBACK_UNAVAILABLE: &str = "rollback_unavailable";
    pub const BUNDLE_INCOMPLETE: &str = "bundle_incomplete";
}

/// Decision block shared by decision-making pipeline payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionBlock {
    pub decision: Decision,
    pub reason_code: String,
    pub reason_detail: String,
}

impl DecisionBlock {
    pub fn new(decision: Decision, reason_code: &str, reason_detail: impl Into<String>) -> Self {
        Self {
            decision,
            reason_code: reason_code.to_string(),
            reason_detail: reason_detail.into(),
        }
    }
}
