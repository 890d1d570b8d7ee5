//! Patch run stage: verification-gated patch record.
//!
//! Artifact-only by design: the stage records the patch and its verification
//! evidence but never applies anything to the repository.

use serde::{Deserialize, Serialize};
use serde_json::json;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::decision::{Decision, DecisionBlock, reason};
use crate::core::gate::CheckStatus;
use crate::pipeline::envelope::{Envelope, StageContext, family};
use crate::pipeline::plan::PlanPayload;

/// Result of one verification check with its evidence reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub check: String,
    pub status: CheckStatus,
    /// Reference to the evidence artifact/log for this check.
    pub evidence_ref: String,
}

/// Patch run payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRunPayload {
    pub decision: DecisionBlock,
    pub verification: Vec<VerificationResult>,
    pub required_checks: Vec<String>,
    pub all_required_passed: bool,
    pub patch_digest: String,
    pub diff: String,
    /// Always false: M2 stages are artifact-only.
    pub applied: bool,
}

/// Default required verification checks when no contract declares equivalents.
pub fn default_required_checks() -> Vec<String> {
    vec![
        "lint".to_string(),
        "typecheck".to_string(),
        "test".to_string(),
    ]
}

/// Gate a patch on a complete set of verification results.
pub fn run_patch(
    plan: &Envelope<PlanPayload>,
    diff: &str,
    results: &[VerificationResult],
    required_checks: &[String],
    ctx: &StageContext,
) -> Envelope<PatchRunPayload> {
    let decision = decide(plan, results, required_checks);
    let all_required_passed = required_checks.iter().all(|check| {
        results
            .iter()
            .any(|result| result.check == *check && result.status == CheckStatus::Pass)
    });

    let payload = PatchRunPayload {
        decision,
        verification: results.to_vec(),
        required_checks: required_checks.to_vec(),
        all_required_passed,
        patch_digest: format!("{:016x}", xxh3_64(diff.as_bytes())),
        diff: diff.to_string(),
        applied: false,
    };
    ctx.envelope(
        family::PATCH_RUN,
        vec![plan.reference()],
        json!({
            "stage": "patch_run",
            "plan_decision": plan.payload.decision.reason_code,
        }),
        payload,
    )
}

fn decide(
    plan: &Envelope<PlanPayload>,
    results: &[VerificationResult],
    required_checks: &[String],
) -> DecisionBlock {
    let mut incomplete = Vec::new();
    for check in required_checks {
        match results.iter().find(|result| result.check == *check) {
            None => incomplete.push(format!("{check} (no result)")),
            Some(result) if result.status == CheckStatus::NotRun => {
                incomplete.push(format!("{check} (not run)"));
            }
            Some(result) if result.evidence_ref.trim().is_empty() => {
                incomplete.push(format!("{check} (no evidence)"));
            }
            Some(_) => {}
        }
    }
    if !incomplete.is_empty() {
        return DecisionBlock::new(
            Decision::Stop,
            reason::VERIFICATION_INCOMPLETE,
            format!("incomplete verification: {}", incomplete.join(", ")),
        );
    }

    let failed: Vec<&str> = required_checks
        .iter()
        .filter(|check| {
            results
                .iter()
                .any(|result| result.check == **check && result.status == CheckStatus::Fail)
        })
        .map(String::as_str)
        .collect();
    if !failed.is_empty() {
        return DecisionBlock::new(
            Decision::Stop,
            reason::VERIFICATION_FAILED,
            format!("failing required check(s): {}", failed.join(", ")),
        );
    }

    if !plan.payload.escalation_paths_touched.is_empty() {
        return DecisionBlock::new(
            Decision::Escalate,
            reason::POLICY_BLOCKED,
            format!(
                "plan touches escalation-class path(s): {}",
                plan.payload.escalation_paths_touched.join(", ")
            ),
        );
    }

    DecisionBlock::new(Decision::Continue, reason::OK, "all required checks passed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hooks;
    use crate::test_support::{mapping_envelope, plan_envelope_with_escalation, verification_results};
    use crate::pipeline::plan::{PlanLimits, PlannedEdit, EditKind, plan_edits};

    fn ctx() -> StageContext {
        StageContext::new("run-1", Hooks::real())
    }

    fn clean_plan(ctx: &StageContext) -> Envelope<PlanPayload> {
        let mapping = mapping_envelope(ctx);
        plan_edits(
            &mapping,
            &[PlannedEdit {
                path: "src/release.ls".to_string(),
                kind: EditKind::Modify,
                hunks: 1,
                summary: "adjust goal".to_string(),
            }],
            &PlanLimits::default(),
            ctx,
        )
        .expect("plan")
    }

    #[test]
    fn passing_checks_continue() {
        let ctx = ctx();
        let plan = clean_plan(&ctx);
        let results = verification_results(&[("lint", CheckStatus::Pass), ("typecheck", CheckStatus::Pass), ("test", CheckStatus::Pass)]);
        let patch = run_patch(&plan, "--- a\n+++ b\n", &results, &default_required_checks(), &ctx);
        assert_eq!(patch.payload.decision.decision, Decision::Continue);
        assert!(patch.payload.all_required_passed);
        assert!(!patch.payload.applied);
    }

    #[test]
    fn missing_result_is_incomplete() {
        let ctx = ctx();
        let plan = clean_plan(&ctx);
        let results = verification_results(&[("lint", CheckStatus::Pass), ("test", CheckStatus::Pass)]);
        let patch = run_patch(&plan, "diff", &results, &default_required_checks(), &ctx);
        assert_eq!(patch.payload.decision.decision, Decision::Stop);
        assert_eq!(
            patch.payload.decision.reason_code,
            reason::VERIFICATION_INCOMPLETE
        );
        assert!(patch.payload.decision.reason_detail.contains("typecheck"));
    }

    #[test]
    fn not_run_check_is_incomplete() {
        let ctx = ctx();
        let plan = clean_plan(&ctx);
        let results = verification_results(&[("lint", CheckStatus::Pass), ("typecheck", CheckStatus::NotRun), ("test", CheckStatus::Pass)]);
        let patch = run_patch(&plan, "diff", &results, &default_required_checks(), &ctx);
        assert_eq!(
            patch.payload.decision.reason_code,
            reason::VERIFICATION_INCOMPLETE
        );
    }

    #[test]
    fn empty_evidence_is_incomplete() {
        let ctx = ctx();
        let plan = clean_plan(&ctx);
        let mut results = verification_results(&[("lint", CheckStatus::Pass), ("typecheck", CheckStatus::Pass), ("test", CheckStatus::Pass)]);
        results[2].evidence_ref = String::new();
        let patch = run_patch(&plan, "diff", &results, &default_required_checks(), &ctx);
        assert_eq!(
            patch.payload.decision.reason_code,
            reason::VERIFICATION_INCOMPLETE
        );
    }

    #[test]
    fn failing_check_stops() {
        let ctx = ctx();
        let plan = clean_plan(&ctx);
        let results = verification_results(&[("lint", CheckStatus::Pass), ("typecheck", CheckStatus::Pass), ("test", CheckStatus::Fail)]);
        let patch = run_patch(&plan, "diff", &results, &default_required_checks(), &ctx);
        assert_eq!(patch.payload.decision.decision, Decision::Stop);
        assert_eq!(
            patch.payload.decision.reason_code,
            reason::VERIFICATION_FAILED
        );
        assert!(!patch.payload.all_required_passed);
    }

    #[test]
    fn escalation_path_blocks_even_when_checks_pass() {
        let ctx = ctx();
        let plan = plan_envelope_with_escalation(&ctx);
        let results = verification_results(&[("lint", CheckStatus::Pass), ("typecheck", CheckStatus::Pass), ("test", CheckStatus::Pass)]);
        let patch = run_patch(&plan, "diff", &results, &default_required_checks(), &ctx);
        assert_eq!(patch.payload.decision.decision, Decision::Escalate);
        assert_eq!(patch.payload.decision.reason_code, reason::POLICY_BLOCKED);
        assert!(patch.payload.all_required_passed);
    }

    #[test]
    fn patch_digest_is_stable() {
        let ctx = ctx();
        let plan = clean_plan(&ctx);
        let results = verification_results(&[("lint", CheckStatus::Pass), ("typecheck", CheckStatus::Pass), ("test", CheckStatus::Pass)]);
        let first = run_patch(&plan, "same diff", &results, &default_required_checks(), &ctx);
        let second = run_patch(&plan, "same diff", &results, &default_required_checks(), &ctx);
        assert_eq!(first.payload.patch_digest, second.payload.patch_digest);
    }
}
