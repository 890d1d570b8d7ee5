//! Rule-first deterministic repair loop.
//!
//! Rules live in one globally ordered table ([`RULES`]) and are tried in that
//! fixed sequence: the first rule whose class and excerpt predicate both match
//! is applied. The loop never guesses — when no rule matches it escalates
//! without consuming the attempt budget.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::decision::{AttemptOutcome, RepairDecision, reason};
use crate::core::failure::FailureClass;

/// Upper bound on the attempt budget.
pub const MAX_ATTEMPTS_CEILING: u32 = 10;

/// Input to a repair invocation.
#[derive(Debug, Clone)]
pub struct RepairRequest<'a> {
    pub failure_class: FailureClass,
    /// Pipeline stage where the failure occurred.
    pub stage: &'a str,
    /// Artifact family the failing operation was producing.
    pub artifact_kind: &'a str,
    /// Failure excerpt: either a `key=value; key=value` list or raw source.
    pub excerpt: &'a str,
}

/// Validated repair loop options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairOptions {
    max_attempts: u32,
}

impl RepairOptions {
    /// Build options with an explicit attempt budget (`1..=10`).
    pub fn new(max_attempts: u32) -> Result<Self> {
        if max_attempts < 1 {
            bail!("maxAttempts must be an integer greater than or equal to 1");
        }
        if max_attempts > MAX_ATTEMPTS_CEILING {
            bail!("maxAttempts must be an integer less than or equal to {MAX_ATTEMPTS_CEILING}");
        }
        Ok(Self { max_attempts })
    }

    pub fn max_attempts(self) -> u32 {
        self.max_attempts
    }
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

/// One entry of the attempt history, appended per loop iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub rule_id: String,
    pub outcome: AttemptOutcome,
    pub reason_code: String,
    pub excerpt: String,
}

/// Terminal result of a repair invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub decision: RepairDecision,
    pub reason_code: String,
    pub continuation_allowed: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repaired_excerpt: Option<String>,
    pub history: Vec<AttemptRecord>,
}

/// What a matched rule does.
enum RuleAction {
    /// Transform the excerpt and return `repaired` immediately.
    Repair(fn(&str) -> String),
    /// Consume attempts until the recovery condition holds.
    RetryRecover { recovered: fn(&str, u32) -> bool },
    /// Known non-recoverable condition: stop on the first attempt.
    TerminalStop { reason_code: &'static str },
}

/// A plain data-plus-function rule, testable in isolation.
struct RepairRule {
    id: &'static str,
    class: FailureClass,
    matches: fn(&str) -> bool,
    action: RuleAction,
}

/// Global rule table in fixed priority order: parse first, then
/// schema_contract, policy_gate, capability_denied, deterministic_runtime,
/// stochastic_extraction_uncertainty.
static RULES: &[RepairRule] = &[
    RepairRule {
        id: "close_unterminated_goal_quote",
        class: FailureClass::Parse,
        matches: has_unterminated_goal_quote,
        action: RuleAction::Repair(close_goal_quote),
    },
    RepairRule {
        id: "insert_missing_schema_version",
        class: FailureClass::SchemaContract,
        matches: |excerpt| pair(excerpt, "missing_field") == Some("schema_version"),
        action: RuleAction::Repair(|excerpt| format!("{excerpt}; schema_version=1.0.0")),
    },
    RepairRule {
        id: "policy_deny_production_terminal",
        class: FailureClass::PolicyGate,
        matches: |excerpt| {
            pair(excerpt, "rule") == Some("deny") && pair(excerpt, "environment") == Some("production")
        },
        action: RuleAction::TerminalStop {
            reason_code: reason::POLICY_DENY_TERMINAL,
        },
    },
    RepairRule {
        id: "acknowledge_policy_warning",
        class: FailureClass::PolicyGate,
        matches: |excerpt| pair(excerpt, "rule") == Some("warn"),
        action: RuleAction::Repair(|excerpt| format!("{excerpt}; acknowledged=true")),
    },
    RepairRule {
        id: "substitute_fallback_capability",
        class: FailureClass::CapabilityDenied,
        matches: |excerpt| pair(excerpt, "capability").is_some() && pair(excerpt, "fallback").is_some(),
        action: RuleAction::Repair(substitute_fallback),
    },
    RepairRule {
        id: "retry_retryable_timeout",
        class: FailureClass::DeterministicRuntime,
        matches: |excerpt| {
            pair(excerpt, "error") == Some("timeout") && pair(excerpt, "retryable") == Some("true")
        },
        action: RuleAction::RetryRecover {
            recovered: |_, attempt| attempt >= 2,
        },
    },
    RepairRule {
        id: "flag_low_confidence_extraction",
        class: FailureClass::StochasticExtractionUncertainty,
        matches: confidence_below_threshold,
        action: RuleAction::Repair(flag_for_review),
    },
];

/// Run the deterministic repair loop.
///
/// Pure given its inputs: same request and options always yield the same
/// outcome. The history is append-only within one invocation and returned to
/// the caller; it is not persisted here.
pub fn repair(request: &RepairRequest<'_>, options: &RepairOptions) -> RepairOutcome {
    let matched = RULES
        .iter()
        .find(|rule| rule.class == request.failure_class && (rule.matches)(request.excerpt));

    let Some(rule) = matched else {
        // No safe deterministic repair: refuse to guess, budget untouched.
        return RepairOutcome {
            decision: RepairDecision::Escalate,
            reason_code: reason::NO_SAFE_DETERMINISTIC_REPAIR.to_string(),
            continuation_allowed: false,
            attempts: 1,
            applied_rule_id: None,
            repaired_excerpt: None,
            history: Vec::new(),
        };
    };

    match &rule.action {
        RuleAction::TerminalStop { reason_code } => RepairOutcome {
            decision: RepairDecision::Stop,
            reason_code: (*reason_code).to_string(),
            continuation_allowed: false,
            attempts: 1,
            applied_rule_id: Some(rule.id.to_string()),
            repaired_excerpt: None,
            history: Vec::new(),
        },
        RuleAction::Repair(apply) => {
            let repaired = apply(request.excerpt);
            let history = vec![AttemptRecord {
                rule_id: rule.id.to_string(),
                outcome: AttemptOutcome::Repaired,
                reason_code: reason::DETERMINISTIC_REPAIR_APPLIED.to_string(),
                excerpt: repaired.clone(),
            }];
            RepairOutcome {
                decision: RepairDecision::Repaired,
                reason_code: reason::DETERMINISTIC_REPAIR_APPLIED.to_string(),
                continuation_allowed: true,
                attempts: 1,
                applied_rule_id: Some(rule.id.to_string()),
                repaired_excerpt: Some(repaired),
                history,
            }
        }
        RuleAction::RetryRecover { recovered } => {
            let mut history = Vec::new();
            for attempt in 1..=options.max_attempts() {
                if recovered(request.excerpt, attempt) {
                    history.push(AttemptRecord {
                        rule_id: rule.id.to_string(),
                        outcome: AttemptOutcome::Repaired,
                        reason_code: reason::RETRY_RECOVERY_SUCCEEDED.to_string(),
                        excerpt: request.excerpt.to_string(),
                    });
                    return RepairOutcome {
                        decision: RepairDecision::Repaired,
                        reason_code: reason::RETRY_RECOVERY_SUCCEEDED.to_string(),
                        continuation_allowed: true,
                        attempts: attempt,
                        applied_rule_id: Some(rule.id.to_string()),
                        repaired_excerpt: Some(request.excerpt.to_string()),
                        history,
                    };
                }
                history.push(AttemptRecord {
                    rule_id: rule.id.to_string(),
                    outcome: AttemptOutcome::Retry,
                    reason_code: reason::RETRY_RECOVERY_PENDING.to_string(),
                    excerpt: request.excerpt.to_string(),
                });
            }
            RepairOutcome {
                decision: RepairDecision::Stop,
                reason_code: reason::MAX_ATTEMPTS_EXCEEDED.to_string(),
                continuation_allowed: false,
                attempts: options.max_attempts(),
                applied_rule_id: Some(rule.id.to_string()),
                repaired_excerpt: None,
                history,
            }
        }
    }
}

/// Look up `key` in a `key=value; key=value` excerpt.
///
/// Returns the raw value slice, so callers can splice original text without
/// re-formatting (numeric precision is preserved by construction).
fn pair<'a>(excerpt: &'a str, key: &str) -> Option<&'a str> {
    excerpt.split(';').find_map(|entry| {
        let (k, v) = entry.split_once('=')?;
        (k.trim() == key).then(|| v.trim())
    })
}

fn has_unterminated_goal_quote(excerpt: &str) -> bool {
    let Some(idx) = excerpt.find("goal \"") else {
        return false;
    };
    let quotes = excerpt[idx..].matches('"').count();
    quotes % 2 == 1
}

fn close_goal_quote(excerpt: &str) -> String {
    format!("{excerpt}\"")
}

fn substitute_fallback(excerpt: &str) -> String {
    let capability = pair(excerpt, "capability").unwrap_or_default();
    let fallback = pair(excerpt, "fallback").unwrap_or_default();
    excerpt
        .split(';')
        .map(str::trim)
        .filter(|entry| pair(entry, "fallback").is_none())
        .map(|entry| {
            if pair(entry, "capability") == Some(capability) {
                format!("capability={fallback}")
            } else {
                entry.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn confidence_below_threshold(excerpt: &str) -> bool {
    let (Some(confidence), Some(threshold)) = (pair(excerpt, "confidence"), pair(excerpt, "threshold"))
    else {
        return false;
    };
    match (confidence.parse::<f64>(), threshold.parse::<f64>()) {
        (Ok(c), Ok(t)) => c < t,
        _ => false,
    }
}

/// Mark a low-confidence extraction for review, splicing the original value
/// text so no precision is lost.
fn flag_for_review(excerpt: &str) -> String {
    let threshold = pair(excerpt, "threshold").unwrap_or_default();
    format!("{excerpt}; review_threshold={threshold}; needs_review=true")
}
