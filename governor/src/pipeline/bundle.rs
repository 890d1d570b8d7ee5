//! PR bundle stage: review-ready package with full lineage.
//!
//! The bundle is the terminal artifact of a pipeline run. Its readiness block
//! is fail-closed: it mirrors any non-continue upstream patch decision and
//! refuses readiness when a required section is missing.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::decision::{Decision, DecisionBlock, reason};
use crate::pipeline::envelope::{ArtifactRef, ArtifactStore, Envelope, StageContext, family};
use crate::pipeline::mapping::MappingPayload;
use crate::pipeline::patch::PatchRunPayload;
use crate::pipeline::plan::PlanPayload;
use crate::pipeline::snapshot::SnapshotPayload;

/// Rollback material for the reviewed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPackage {
    /// Patch that undoes the change when applied forward.
    pub reverse_patch: String,
    pub instructions: String,
}

/// Verification summary carried by the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleVerification {
    pub all_required_passed: bool,
    pub evidence_refs: Vec<String>,
}

/// Readiness verdict plus the sections that kept it from readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub decision: DecisionBlock,
    pub missing_sections: Vec<String>,
}

/// PR bundle payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlePayload {
    pub summary: String,
    pub patch_digest: String,
    pub patch_content: String,
    pub risk_notes: Vec<String>,
    pub rollback: Option<RollbackPackage>,
    pub verification: BundleVerification,
    /// Ordered references to every upstream stage artifact.
    pub lineage: Vec<ArtifactRef>,
    pub readiness: Readiness,
}

/// Assemble the review bundle from the four upstream stage artifacts.
///
/// `store` is the run's artifact arena; lineage is only complete when every
/// upstream artifact is actually held there.
#[allow(clippy::too_many_arguments)]
pub fn assemble_bundle(
    snapshot: &Envelope<SnapshotPayload>,
    mapping: &Envelope<MappingPayload>,
    plan: &Envelope<PlanPayload>,
    patch: &Envelope<PatchRunPayload>,
    store: &ArtifactStore,
    summary: &str,
    risk_notes: &[String],
    ctx: &StageContext,
) -> Envelope<BundlePayload> {
    let lineage = vec![
        snapshot.reference(),
        mapping.reference(),
        plan.reference(),
        patch.reference(),
    ];
    let evidence_refs: Vec<String> = patch
        .payload
        .verification
        .iter()
        .map(|result| result.evidence_ref.clone())
        .filter(|evidence| !evidence.trim().is_empty())
        .collect();

    let rollback = if patch.payload.decision.decision.allows_continuation() {
        build_rollback(&patch.payload.diff)
    } else {
        None
    };

    let readiness = decide(patch, store, &lineage, rollback.as_ref(), &evidence_refs);
    let payload = BundlePayload {
        summary: summary.to_string(),
        patch_digest: patch.payload.patch_digest.clone(),
        patch_content: patch.payload.diff.clone(),
        risk_notes: risk_notes.to_vec(),
        rollback,
        verification: BundleVerification {
            all_required_passed: patch.payload.all_required_passed,
            evidence_refs,
        },
        lineage: lineage.clone(),
        readiness,
    };
    ctx.envelope(
        family::PR_BUNDLE,
        lineage,
        json!({
            "stage": "pr_bundle",
            "patch_decision": patch.payload.decision.reason_code,
        }),
        payload,
    )
}

fn decide(
    patch: &Envelope<PatchRunPayload>,
    store: &ArtifactStore,
    lineage: &[ArtifactRef],
    rollback: Option<&RollbackPackage>,
    evidence_refs: &[String],
) -> Readiness {
    // A non-continue patch run verdict propagates unchanged; completeness
    // checks only apply to a bundle that could otherwise ship.
    let upstream = &patch.payload.decision;
    if !upstream.decision.allows_continuation() {
        return Readiness {
            decision: DecisionBlock::new(
                upstream.decision,
                &upstream.reason_code,
                format!("patch run verdict: {}", upstream.reason_detail),
            ),
            missing_sections: Vec::new(),
        };
    }

    let mut missing = Vec::new();
    let unstored = store.missing_ids(lineage.iter().map(|r| r.artifact_id.as_str()));
    if !unstored.is_empty() {
        missing.push("lineage".to_string());
    }
    match rollback {
        None => missing.push("rollback_package".to_string()),
        Some(package) if package.instructions.trim().is_empty() => {
            missing.push("rollback_instructions".to_string());
        }
        Some(_) => {}
    }
    if evidence_refs.is_empty() {
        missing.push("verification_evidence".to_string());
    }

    if missing.iter().any(|section| section.starts_with("rollback")) {
        return Readiness {
            decision: DecisionBlock::new(
                Decision::Stop,
                reason::ROLLBACK_UNAVAILABLE,
                "no rollback package could be materialized",
            ),
            missing_sections: missing,
        };
    }
    if !missing.is_empty() {
        let detail = if unstored.is_empty() {
            format!("missing section(s): {}", missing.join(", "))
        } else {
            format!(
                "missing section(s): {}; artifact(s) not stored: {}",
                missing.join(", "),
                unstored.join(", ")
            )
        };
        return Readiness {
            decision: DecisionBlock::new(Decision::Stop, reason::BUNDLE_INCOMPLETE, detail),
            missing_sections: missing,
        };
    }

    Readiness {
        decision: DecisionBlock::new(Decision::Continue, reason::OK, "bundle ready for review"),
        missing_sections: Vec::new(),
    }
}

/// Derive a reverse patch from a unified diff by flipping added and removed
/// lines. File headers (`---`/`+++`) are swapped as a pair.
fn build_rollback(diff: &str) -> Option<RollbackPackage> {
    if diff.trim().is_empty() {
        return None;
    }
    let mut reversed = String::with_capacity(diff.len());
    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("--- ") {
            reversed.push_str("+++ ");
            reversed.push_str(rest);
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            reversed.push_str("--- ");
            reversed.push_str(rest);
        } else if let Some(rest) = line.strip_prefix('+') {
            reversed.push('-');
            reversed.push_str(rest);
        } else if let Some(rest) = line.strip_prefix('-') {
            reversed.push('+');
            reversed.push_str(rest);
        } else {
            reversed.push_str(line);
        }
        reversed.push('\n');
    }
    Some(RollbackPackage {
        reverse_patch: reversed,
        instructions: "Apply the reverse patch with `git apply` from the repository root, \
                       then re-run the required verification checks."
            .to_string(),
    })
}
