//! Fail-closed continuation gate.
//!
//! Combines verification-check results, policy assertions, and required
//! feedback evidence into one `continue | escalate | stop` decision. Every
//! branch returns `stop` or `escalate` unless the explicit success conditions
//! are met. The gate is a pure function; the governed caller is responsible
//! for propagating non-`continue` outcomes.

use serde::{Deserialize, Serialize};

use crate::contracts::types::{OnFailure, PolicyProfile, VerificationContract};
use crate::core::decision::{Decision, reason};
use crate::core::feedback::FeedbackTensor;

/// Result status of one verification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    NotRun,
}

/// One reported verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    pub status: CheckStatus,
}

/// Reported verification state for a governed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VerificationStatus {
    pub checks: Vec<CheckResult>,
}

impl VerificationStatus {
    pub fn status_of(&self, check_id: &str) -> Option<CheckStatus> {
        self.checks
            .iter()
            .find(|check| check.id == check_id)
            .map(|check| check.status)
    }
}

/// Input to one gate evaluation.
#[derive(Debug, Clone)]
pub struct GateInput<'a> {
    pub verification_contract: &'a VerificationContract,
    pub policy_profile: Option<&'a PolicyProfile>,
    pub verification_status: Option<&'a VerificationStatus>,
    pub feedback: Option<&'a FeedbackTensor>,
}

/// Continuation decision. Produced fresh per evaluation, never mutated after
/// return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationDecision {
    pub decision: Decision,
    pub reason_code: String,
    pub continuation_allowed: bool,
    pub failed_policy_assertion_ids: Vec<String>,
    pub missing_feedback_fields: Vec<String>,
}

impl ContinuationDecision {
    fn new(decision: Decision, reason_code: &str) -> Self {
        Self {
            decision,
            reason_code: reason_code.to_string(),
            continuation_allowed: decision.allows_continuation(),
            failed_policy_assertion_ids: Vec::new(),
            missing_feedback_fields: Vec::new(),
        }
    }
}

/// Evaluate the continuation gate. First matching rule wins:
///
/// 1. policy profile required but absent → stop
/// 2. required feedback fields missing → stop
/// 3. mandatory policy assertion failed → escalate
/// 4. checks missing/incomplete/below threshold → per contract `on_failure`
/// 5. otherwise → continue
pub fn evaluate(input: &GateInput<'_>) -> ContinuationDecision {
    let contract = input.verification_contract;

    if contract.continuation.require_policy_profile && input.policy_profile.is_none() {
        return ContinuationDecision::new(Decision::Stop, reason::POLICY_PROFILE_REQUIRED);
    }

    let missing_fields = missing_feedback_fields(contract, input.feedback);
    if !missing_fields.is_empty() {
        let mut decision = ContinuationDecision::new(
            Decision::Stop,
            reason::VERIFICATION_REQUIRED_FEEDBACK_MISSING,
        );
        decision.missing_feedback_fields = missing_fields;
        return decision;
    }

    if let Some(profile) = input.policy_profile {
        let failed: Vec<String> = profile
            .mandatory_assertions
            .iter()
            .filter(|assertion| !assertion.holds(profile))
            .map(|assertion| assertion.id().to_string())
            .collect();
        if !failed.is_empty() {
            let mut decision = ContinuationDecision::new(
                Decision::Escalate,
                reason::VERIFICATION_POLICY_ASSERTION_FAILED,
            );
            decision.failed_policy_assertion_ids = failed;
            return decision;
        }
    }

    if !checks_meet_threshold(contract, input.verification_status) {
        let decision = match contract.on_failure {
            OnFailure::Stop => Decision::Stop,
            OnFailure::Escalate => Decision::Escalate,
        };
        return ContinuationDecision::new(
            decision,
            reason::VERIFICATION_REQUIRED_CHECKS_BELOW_THRESHOLD,
        );
    }

    ContinuationDecision::new(Decision::Continue, reason::VERIFICATION_GATE_PASSED)
}

fn missing_feedback_fields(
    contract: &VerificationContract,
    feedback: Option<&FeedbackTensor>,
) -> Vec<String> {
    let required = &contract.continuation.required_feedback_tensor_fields;
    if required.is_empty() {
        return Vec::new();
    }
    match feedback {
        Some(tensor) => required
            .iter()
            .filter(|field| !tensor.has_field(field))
            .cloned()
            .collect(),
        // No tensor at all: every required field is missing.
        None => required.clone(),
    }
}

fn checks_meet_threshold(
    contract: &VerificationContract,
    status: Option<&VerificationStatus>,
) -> bool {
    let Some(status) = status else {
        return false;
    };
    let required = &contract.required_checks;
    if required.is_empty() {
        return true;
    }
    let passed = required
        .iter()
        .filter(|check| status.status_of(check) == Some(CheckStatus::Pass))
        .count();
    let fraction = passed as f64 / required.len() as f64;
    fraction >= contract.pass_threshold
}
