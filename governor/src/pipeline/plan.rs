//! Safe diff plan stage: bounded edit list with path screening.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::decision::{Decision, DecisionBlock, reason};
use crate::pipeline::envelope::{Envelope, StageContext, family};
use crate::pipeline::mapping::MappingPayload;

/// Kind of a planned edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Modify,
    Create,
    Delete,
}

/// One planned edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedEdit {
    pub path: String,
    pub kind: EditKind,
    pub hunks: u32,
    pub summary: String,
}

/// Hard bounds and path screens for a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanLimits {
    pub max_files: usize,
    pub max_hunks: u32,
    /// Hard-blocked paths (secrets, keys). Any touch is a blocking violation.
    pub forbidden_paths: Vec<String>,
    /// CI/policy/security config. Any touch forces escalation even within
    /// bounds.
    pub escalation_paths: Vec<String>,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_hunks: 40,
            forbidden_paths: vec![
                "**/*.pem".to_string(),
                "**/*.key".to_string(),
                "**/secrets/**".to_string(),
                "**/.env".to_string(),
                "**/.env.*".to_string(),
            ],
            escalation_paths: vec![
                ".github/**".to_string(),
                ".gitlab-ci.yml".to_string(),
                "policy/**".to_string(),
                "security/**".to_string(),
            ],
        }
    }
}

/// Severity of a safety check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSeverity {
    /// Failing this check blocks the plan outright.
    Blocking,
    /// Failing this check forces escalation.
    Escalation,
}

/// Result of one safety check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub check_id: String,
    pub severity: CheckSeverity,
    pub passed: bool,
    pub detail: String,
}

/// Safe diff plan payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPayload {
    pub decision: DecisionBlock,
    pub edits: Vec<PlannedEdit>,
    pub safety_checks: Vec<SafetyCheck>,
    /// Escalation-class paths the plan touches; consumed by the patch run.
    pub escalation_paths_touched: Vec<String>,
    pub limits: PlanLimits,
}

/// Check a bounded edit list against the limits and path screens.
pub fn plan_edits(
    mapping: &Envelope<MappingPayload>,
    edits: &[PlannedEdit],
    limits: &PlanLimits,
    ctx: &StageContext,
) -> Result<Envelope<PlanPayload>> {
    let forbidden = build_globset(&limits.forbidden_paths).context("compile forbidden_paths")?;
    let escalation = build_globset(&limits.escalation_paths).context("compile escalation_paths")?;

    let total_hunks: u32 = edits.iter().map(|edit| edit.hunks).sum();
    let forbidden_touched: Vec<&str> = edits
        .iter()
        .filter(|edit| forbidden.is_match(&edit.path))
        .map(|edit| edit.path.as_str())
        .collect();
    let escalation_touched: Vec<String> = edits
        .iter()
        .filter(|edit| escalation.is_match(&edit.path))
        .map(|edit| edit.path.clone())
        .collect();

    let safety_checks = vec![
        SafetyCheck {
            check_id: "max_files".to_string(),
            severity: CheckSeverity::Blocking,
            passed: edits.len() <= limits.max_files,
            detail: format!("{} file(s) changed, limit {}", edits.len(), limits.max_files),
        },
        SafetyCheck {
            check_id: "max_hunks".to_string(),
            severity: CheckSeverity::Blocking,
            passed: total_hunks <= limits.max_hunks,
            detail: format!("{total_hunks} hunk(s) planned, limit {}", limits.max_hunks),
        },
        SafetyCheck {
            check_id: "forbidden_paths".to_string(),
            severity: CheckSeverity::Blocking,
            passed: forbidden_touched.is_empty(),
            detail: if forbidden_touched.is_empty() {
                "no forbidden path touched".to_string()
            } else {
                format!("forbidden path(s): {}", forbidden_touched.join(", "))
            },
        },
        SafetyCheck {
            check_id: "escalation_paths".to_string(),
            severity: CheckSeverity::Escalation,
            passed: escalation_touched.is_empty(),
            detail: if escalation_touched.is_empty() {
                "no escalation-class path touched".to_string()
            } else {
                format!("escalation-class path(s): {}", escalation_touched.join(", "))
            },
        },
    ];

    let decision = decide(&safety_checks);
    let payload = PlanPayload {
        decision,
        edits: edits.to_vec(),
        safety_checks,
        escalation_paths_touched: escalation_touched,
        limits: limits.clone(),
    };
    Ok(ctx.envelope(
        family::SAFE_DIFF_PLAN,
        vec![mapping.reference()],
        json!({
            "stage": "safe_diff_plan",
            "mapping_selected": mapping.payload.selected_target_id,
        }),
        payload,
    ))
}

fn decide(checks: &[SafetyCheck]) -> DecisionBlock {
    // First failing blocking check wins; escalation checks apply only when
    // every hard bound holds.
    for check in checks {
        if check.severity == CheckSeverity::Blocking && !check.passed {
            let reason_code = if check.check_id == "forbidden_paths" {
                reason::FORBIDDEN_PATH_TOUCHED
            } else {
                reason::BOUNDS_EXCEEDED
            };
            return DecisionBlock::new(Decision::Stop, reason_code, check.detail.clone());
        }
    }
    for check in checks {
        if check.severity == CheckSeverity::Escalation && !check.passed {
            return DecisionBlock::new(
                Decision::Escalate,
                reason::ESCALATION_PATH_TOUCHED,
                check.detail.clone(),
            );
        }
    }
    DecisionBlock::new(Decision::Continue, reason::OK, "plan within bounds")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob '{pattern}'"))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hooks;
    use crate::pipeline::envelope::StageContext;
    use crate::test_support::mapping_envelope;

    fn edit(path: &str, hunks: u32) -> PlannedEdit {
        PlannedEdit {
            path: path.to_string(),
            kind: EditKind::Modify,
            hunks,
            summary: format!("touch {path}"),
        }
    }

    fn ctx() -> StageContext {
        StageContext::new("run-1", Hooks::real())
    }

    #[test]
    fn in_bounds_plan_continues() {
        let ctx = ctx();
        let mapping = mapping_envelope(&ctx);
        let plan = plan_edits(
            &mapping,
            &[edit("src/release.ls", 2), edit("src/lib.rs", 3)],
            &PlanLimits::default(),
            &ctx,
        )
        .expect("plan");
        assert_eq!(plan.payload.decision.decision, Decision::Continue);
        assert_eq!(plan.payload.decision.reason_code, reason::OK);
        assert_eq!(plan.inputs[0].artifact_id, mapping.artifact_id);
    }

    #[test]
    fn too_many_files_stops_with_bounds_exceeded() {
        let ctx = ctx();
        let mapping = mapping_envelope(&ctx);
        let limits = PlanLimits {
            max_files: 1,
            ..PlanLimits::default()
        };
        let plan = plan_edits(
            &mapping,
            &[edit("a.rs", 1), edit("b.rs", 1)],
            &limits,
            &ctx,
        )
        .expect("plan");
        assert_eq!(plan.payload.decision.decision, Decision::Stop);
        assert_eq!(plan.payload.decision.reason_code, reason::BOUNDS_EXCEEDED);
    }

    #[test]
    fn too_many_hunks_stops() {
        let ctx = ctx();
        let mapping = mapping_envelope(&ctx);
        let limits = PlanLimits {
            max_hunks: 4,
            ..PlanLimits::default()
        };
        let plan = plan_edits(&mapping, &[edit("a.rs", 5)], &limits, &ctx).expect("plan");
        assert_eq!(plan.payload.decision.decision, Decision::Stop);
        assert_eq!(plan.payload.decision.reason_code, reason::BOUNDS_EXCEEDED);
    }

    #[test]
    fn forbidden_path_stops_even_within_bounds() {
        let ctx = ctx();
        let mapping = mapping_envelope(&ctx);
        let plan = plan_edits(
            &mapping,
            &[edit("deploy/secrets/api.pem", 1)],
            &PlanLimits::default(),
            &ctx,
        )
        .expect("plan");
        assert_eq!(plan.payload.decision.decision, Decision::Stop);
        assert_eq!(
            plan.payload.decision.reason_code,
            reason::FORBIDDEN_PATH_TOUCHED
        );
    }

    #[test]
    fn escalation_path_escalates_even_within_bounds() {
        let ctx = ctx();
        let mapping = mapping_envelope(&ctx);
        let plan = plan_edits(
            &mapping,
            &[edit(".github/workflows/ci.yml", 1)],
            &PlanLimits::default(),
            &ctx,
        )
        .expect("plan");
        assert_eq!(plan.payload.decision.decision, Decision::Escalate);
        assert_eq!(
            plan.payload.decision.reason_code,
            reason::ESCALATION_PATH_TOUCHED
        );
        assert_eq!(
            plan.payload.escalation_paths_touched,
            vec![".github/workflows/ci.yml"]
        );
    }

    #[test]
    fn blocking_violation_outranks_escalation() {
        let ctx = ctx();
        let mapping = mapping_envelope(&ctx);
        let limits = PlanLimits {
            max_files: 1,
            ..PlanLimits::default()
        };
        let plan = plan_edits(
            &mapping,
            &[edit(".github/workflows/ci.yml", 1), edit("src/lib.rs", 1)],
            &limits,
            &ctx,
        )
        .expect("plan");
        assert_eq!(plan.payload.decision.decision, Decision::Stop);
        assert_eq!(plan.payload.decision.reason_code, reason::BOUNDS_EXCEEDED);
    }
}
