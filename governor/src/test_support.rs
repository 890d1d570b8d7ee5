//! Test-only helpers: a git-backed fixture repository, canned pipeline
//! artifacts, scripted sinks, and contract/corpus builders.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

use crate::contracts::types::{
    ContinuationRequirements, EscalationRules, OnFailure, PolicyProfile, VerificationContract,
};
use crate::core::decision::{Decision, reason};
use crate::core::gate::CheckStatus;
use crate::io::emitter::TraceRecord;
use crate::io::sink::TraceSink;
use crate::pipeline::envelope::{Envelope, StageContext, family};
use crate::pipeline::mapping::{MappingOptions, MappingPayload, map_intent};
use crate::pipeline::patch::VerificationResult;
use crate::pipeline::plan::{EditKind, PlanLimits, PlanPayload, PlannedEdit, plan_edits};
use crate::pipeline::snapshot::{
    Declaration, DeclarationKind, FileRecord, HeadState, LineSpan, SnapshotPayload,
};

const RELEASE_LS: &str = "goal \"Ship release\"\npolicy deny_production_writes\ncapability fs_read\n";

/// A throwaway git repository seeded with one `.ls` source file.
pub struct TestRepo {
    // Held for its Drop: deletes the directory when the repo goes away.
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let root = dir.path().to_path_buf();

        run_git(&root, &["init", "-q"])?;
        run_git(&root, &["config", "user.email", "fixture@example.com"])?;
        run_git(&root, &["config", "user.name", "Fixture"])?;

        let src = root.join("src");
        fs::create_dir_all(&src).context("create src dir")?;
        fs::write(src.join("release.ls"), RELEASE_LS).context("write release.ls")?;
        run_git(&root, &["add", "-A"])?;
        run_git(&root, &["commit", "-q", "-m", "seed fixture"])?;

        Ok(Self { _dir: dir, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a file relative to the repo root without committing it.
    pub fn write_file(&self, rel_path: &str, contents: &str) -> Result<()> {
        let path = self.root.join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Stage and commit everything currently in the worktree.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        run_git(&self.root, &["add", "-A"])?;
        run_git(&self.root, &["commit", "-q", "-m", message])
    }
}

fn run_git(root: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Canned snapshot artifact matching the `TestRepo` source file, with no git
/// involved.
pub fn snapshot_envelope(ctx: &StageContext) -> Envelope<SnapshotPayload> {
    let payload = SnapshotPayload {
        head: HeadState {
            branch: "main".to_string(),
            commit: "0123456789abcdef0123456789abcdef01234567".to_string(),
            dirty: false,
        },
        files: vec![FileRecord {
            path: "src/release.ls".to_string(),
            size_bytes: RELEASE_LS.len() as u64,
            content_hash: "deadbeefdeadbeef".to_string(),
        }],
        inventory_hash: "cafebabecafebabe".to_string(),
        declarations: vec![
            Declaration {
                name: "Ship release".to_string(),
                kind: DeclarationKind::Goal,
                path: "src/release.ls".to_string(),
                span: LineSpan {
                    start_line: 1,
                    end_line: 1,
                },
            },
            Declaration {
                name: "deny_production_writes".to_string(),
                kind: DeclarationKind::Policy,
                path: "src/release.ls".to_string(),
                span: LineSpan {
                    start_line: 2,
                    end_line: 2,
                },
            },
        ],
    };
    ctx.envelope(
        family::WORKSPACE_SNAPSHOT,
        Vec::new(),
        json!({ "stage": "workspace_snapshot" }),
        payload,
    )
}

/// Canned mapping artifact: the "Ship release" goal resolved unambiguously.
pub fn mapping_envelope(ctx: &StageContext) -> Envelope<MappingPayload> {
    let snapshot = snapshot_envelope(ctx);
    map_intent(
        &snapshot,
        "Reword the Ship release goal",
        &MappingOptions::default(),
        ctx,
    )
}

/// Plan artifact that escalates because it touches CI config.
pub fn plan_envelope_with_escalation(ctx: &StageContext) -> Envelope<PlanPayload> {
    let mapping = mapping_envelope(ctx);
    let plan = plan_edits(
        &mapping,
        &[PlannedEdit {
            path: ".github/workflows/ci.yml".to_string(),
            kind: EditKind::Modify,
            hunks: 1,
            summary: "tighten CI".to_string(),
        }],
        &PlanLimits::default(),
        ctx,
    )
    .expect("plan fixture");
    assert_eq!(plan.payload.decision.decision, Decision::Escalate);
    assert_eq!(
        plan.payload.decision.reason_code,
        reason::ESCALATION_PATH_TOUCHED
    );
    plan
}

/// Verification results with one evidence log per check.
pub fn verification_results(statuses: &[(&str, CheckStatus)]) -> Vec<VerificationResult> {
    statuses
        .iter()
        .map(|(check, status)| VerificationResult {
            check: (*check).to_string(),
            status: *status,
            evidence_ref: format!("logs/{check}.log"),
        })
        .collect()
}

/// Sink that records every appended trace record in memory.
pub struct MemorySink {
    records: Arc<Mutex<Vec<TraceRecord>>>,
}

impl MemorySink {
    /// Build a sink plus a shared handle to its records.
    pub fn shared() -> (Self, Arc<Mutex<Vec<TraceRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                records: Arc::clone(&records),
            },
            records,
        )
    }
}

impl TraceSink for MemorySink {
    fn append(&mut self, record: &TraceRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("records mutex poisoned"))?
            .push(record.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Sink whose every append fails.
pub struct FailingSink;

impl TraceSink for FailingSink {
    fn append(&mut self, _record: &TraceRecord) -> Result<()> {
        bail!("sink unavailable")
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

/// Verification contract requiring the standard three checks.
pub fn verification_contract() -> VerificationContract {
    VerificationContract {
        schema_version: "1.0.0".to_string(),
        contract_id: "contract-release".to_string(),
        required_checks: vec![
            "lint".to_string(),
            "typecheck".to_string(),
            "test".to_string(),
        ],
        pass_threshold: 1.0,
        on_failure: OnFailure::Stop,
        continuation: ContinuationRequirements {
            require_policy_profile: true,
            required_feedback_tensor_fields: vec![
                "confidence".to_string(),
                "provenance".to_string(),
            ],
        },
    }
}

/// Staging policy profile with read-only capabilities.
pub fn policy_profile() -> PolicyProfile {
    PolicyProfile {
        schema_version: "1.0.0".to_string(),
        profile_id: "profile-staging".to_string(),
        environment: "staging".to_string(),
        allowed_capabilities: vec!["fs_read".to_string(), "fs_write_scoped".to_string()],
        mandatory_assertions: Vec::new(),
        escalation: EscalationRules {
            on_denied_capability: OnFailure::Escalate,
        },
    }
}

/// Complete valid contract payload envelope for the validator.
pub fn valid_contracts_payload() -> Value {
    json!({
        "semantic_ir": {
            "schema_version": "1.0.0",
            "ir_id": "ir-release",
            "goal": "Ship release",
            "nodes": [
                {"id": "n1", "op": "resolve_manifest", "inputs": [], "on_failure": "stop"},
                {"id": "n2", "op": "apply_patch", "inputs": ["n1"], "on_failure": "escalate"}
            ]
        },
        "policy_profile": {
            "schema_version": "1.0.0",
            "profile_id": "profile-staging",
            "environment": "staging",
            "allowed_capabilities": ["fs_read", "fs_write_scoped"],
            "mandatory_assertions": [
                {"kind": "capability_allowed", "id": "a1", "capability": "fs_read"},
                {"kind": "environment_is", "id": "a2", "environment": "staging"}
            ],
            "escalation": {"on_denied_capability": "escalate"}
        },
        "verification_contract": {
            "schema_version": "1.0.0",
            "contract_id": "contract-release",
            "required_checks": ["lint", "typecheck", "test"],
            "pass_threshold": 1.0,
            "on_failure": "stop",
            "continuation": {
                "require_policy_profile": true,
                "required_feedback_tensor_fields": ["confidence", "provenance"]
            }
        }
    })
}

/// Corpus document covering both recoverability values for every failure
/// class, with expectations matching the shipped rule table.
pub fn full_coverage_corpus_json() -> String {
    json!({
        "schema_version": "1.0.0",
        "corpus_id": "m2-reliability",
        "fixtures": [
            fixture("parse", "recoverable", "compile", "semantic_ir",
                    "goal \"Ship release", true),
            fixture("parse", "non_recoverable", "compile", "semantic_ir",
                    "goal Ship release", false),
            fixture("schema_contract", "recoverable", "validate", "semantic_ir",
                    "artifact=semantic_ir; missing_field=schema_version", true),
            fixture("schema_contract", "non_recoverable", "validate", "semantic_ir",
                    "artifact=semantic_ir; missing_field=ir_id", false),
            fixture("policy_gate", "recoverable", "execute", "policy_profile",
                    "action=write_config; rule=warn", true),
            fixture("policy_gate", "non_recoverable", "execute", "policy_profile",
                    "action=delete_resource; environment=production; rule=deny", false),
            fixture("capability_denied", "recoverable", "execute", "policy_profile",
                    "capability=net_write; fallback=net_read", true),
            fixture("capability_denied", "non_recoverable", "execute", "policy_profile",
                    "capability=net_write", false),
            fixture("deterministic_runtime", "recoverable", "execute", "patch_run",
                    "step=resolve_manifest; error=timeout; retryable=true", true),
            fixture("deterministic_runtime", "non_recoverable", "execute", "patch_run",
                    "step=resolve_manifest; error=timeout; retryable=false", false),
            fixture("stochastic_extraction_uncertainty", "recoverable", "extract", "intent_mapping",
                    "field=goal_name; confidence=0.62; threshold=0.75", true),
            fixture("stochastic_extraction_uncertainty", "non_recoverable", "extract", "intent_mapping",
                    "field=goal_name; confidence=0.91; threshold=0.75", false),
        ]
    })
    .to_string()
}

fn fixture(
    class: &str,
    recoverability: &str,
    stage: &str,
    artifact: &str,
    excerpt: &str,
    continuation_allowed: bool,
) -> Value {
    json!({
        "failure_class": class,
        "recoverability": recoverability,
        "input": {"stage": stage, "artifact": artifact, "excerpt": excerpt},
        "expected": {"classification": class, "continuation_allowed": continuation_allowed}
    })
}
