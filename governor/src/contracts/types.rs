//! Versioned contract value types.
//!
//! These are immutable values once loaded. They are constructed only by the
//! validator in [`crate::contracts`]; rejected payloads never escape as
//! contracts.

use serde::{Deserialize, Serialize};

/// Behavior when a required condition fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    Stop,
    Escalate,
}

/// Canonical framework-agnostic execution graph artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticIr {
    pub schema_version: String,
    pub ir_id: String,
    pub goal: String,
    pub nodes: Vec<IrNode>,
}

/// One operation node of the execution graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrNode {
    pub id: String,
    pub op: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub on_failure: OnFailure,
}

/// Allowed capabilities, escalation rules, and mandatory assertions for an
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyProfile {
    pub schema_version: String,
    pub profile_id: String,
    pub environment: String,
    pub allowed_capabilities: Vec<String>,
    pub mandatory_assertions: Vec<PolicyAssertion>,
    pub escalation: EscalationRules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRules {
    pub on_denied_capability: OnFailure,
}

/// A mandatory assertion evaluated against the profile itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyAssertion {
    /// The named capability must be in `allowed_capabilities`.
    CapabilityAllowed { id: String, capability: String },
    /// The named capability must not be in `allowed_capabilities`.
    CapabilityForbidden { id: String, capability: String },
    /// The profile environment must equal the given value.
    EnvironmentIs { id: String, environment: String },
}

impl PolicyAssertion {
    pub fn id(&self) -> &str {
        match self {
            PolicyAssertion::CapabilityAllowed { id, .. }
            | PolicyAssertion::CapabilityForbidden { id, .. }
            | PolicyAssertion::EnvironmentIs { id, .. } => id,
        }
    }

    /// Evaluate the assertion against a profile.
    pub fn holds(&self, profile: &PolicyProfile) -> bool {
        match self {
            PolicyAssertion::CapabilityAllowed { capability, .. } => profile
                .allowed_capabilities
                .iter()
                .any(|allowed| allowed == capability),
            PolicyAssertion::CapabilityForbidden { capability, .. } => !profile
                .allowed_capabilities
                .iter()
                .any(|allowed| allowed == capability),
            PolicyAssertion::EnvironmentIs { environment, .. } => {
                profile.environment == *environment
            }
        }
    }
}

/// Required checks, pass thresholds, and on-failure behavior for continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationContract {
    pub schema_version: String,
    pub contract_id: String,
    pub required_checks: Vec<String>,
    pub pass_threshold: f64,
    pub on_failure: OnFailure,
    #[serde(default)]
    pub continuation: ContinuationRequirements,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContinuationRequirements {
    #[serde(default)]
    pub require_policy_profile: bool,
    #[serde(default)]
    pub required_feedback_tensor_fields: Vec<String>,
}
