//! Governance CLI: contract validation, repair, gate, and the artifact
//! pipeline, driven from files so each stage can be run and inspected in
//! isolation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use governor::contracts;
use governor::core::decision::Decision;
use governor::core::failure::FailureClass;
use governor::core::gate::{self, CheckResult, CheckStatus, GateInput, VerificationStatus};
use governor::core::feedback::FeedbackTensor;
use governor::core::repair::{RepairOptions, RepairRequest, repair};
use governor::exit_codes;
use governor::hooks::Hooks;
use governor::io::artifact_files::{RunPaths, read_artifact, write_artifact};
use governor::io::config::{GovernorConfig, load_config};
use governor::io::corpus::{load_corpus, load_thresholds, score_corpus};
use governor::io::emitter::{RecordDraft, RepairSummary, TraceEmitter};
use governor::io::sink::FileSink;
use governor::logging;
use governor::pipeline::bundle::assemble_bundle;
use governor::pipeline::envelope::{ArtifactStore, StageContext};
use governor::pipeline::mapping::{MappingOptions, map_intent};
use governor::pipeline::patch::{PatchRunPayload, VerificationResult, run_patch};
use governor::pipeline::plan::{PlanPayload, PlannedEdit, plan_edits};
use governor::pipeline::snapshot::{SnapshotPayload, take_snapshot};

#[derive(Parser)]
#[command(
    name = "governor",
    version,
    about = "Reliability-and-continuation governance for agent-authored changes"
)]
struct Cli {
    /// Governance config file.
    #[arg(long, default_value = "governor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a contract payload (SemanticIR + PolicyProfile + VerificationContract).
    ValidateContracts {
        /// JSON file with payloads keyed by contract family.
        payload: PathBuf,
    },
    /// Run the deterministic repair loop on one failure excerpt.
    Repair {
        /// Failure class (e.g. `parse`, `policy_gate`).
        class: String,
        /// Failure excerpt (`key=value; ...` list or raw source).
        excerpt: String,
        #[arg(long, default_value = "cli")]
        stage: String,
        #[arg(long, default_value = "excerpt")]
        artifact: String,
        /// Attempt budget override (1..=10).
        #[arg(long)]
        max_attempts: Option<u32>,
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Evaluate the continuation gate against a contract payload.
    Gate {
        /// JSON file with payloads keyed by contract family.
        payload: PathBuf,
        /// Verification results as `check=pass|fail|not_run` (repeatable).
        #[arg(long = "check")]
        checks: Vec<String>,
        /// JSON file with a feedback tensor.
        #[arg(long)]
        feedback: Option<PathBuf>,
        /// Evaluate without the policy profile (fail-closed exercise).
        #[arg(long)]
        no_profile: bool,
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Capture a workspace snapshot artifact.
    Snapshot {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long, default_value = ".governor/artifacts")]
        out: PathBuf,
    },
    /// Map a free-text intent onto the snapshot's targets.
    Map {
        /// Free-text change intent.
        intent: String,
        #[arg(long)]
        run_id: String,
        #[arg(long, default_value = ".governor/artifacts")]
        out: PathBuf,
    },
    /// Check a bounded edit list into a safe diff plan.
    Plan {
        /// JSON file with the planned edit list.
        edits: PathBuf,
        #[arg(long)]
        run_id: String,
        #[arg(long, default_value = ".governor/artifacts")]
        out: PathBuf,
    },
    /// Gate a patch on verification results.
    Patch {
        /// Unified diff file.
        diff: PathBuf,
        /// JSON file with verification results.
        results: PathBuf,
        #[arg(long)]
        run_id: String,
        #[arg(long, default_value = ".governor/artifacts")]
        out: PathBuf,
    },
    /// Assemble the review bundle from the run's artifacts.
    Bundle {
        /// One-line change summary.
        summary: String,
        /// Risk/tradeoff note (repeatable).
        #[arg(long = "risk-note")]
        risk_notes: Vec<String>,
        #[arg(long)]
        run_id: String,
        #[arg(long, default_value = ".governor/artifacts")]
        out: PathBuf,
    },
    /// Score a reliability corpus, optionally against gate thresholds.
    CorpusCheck {
        corpus: PathBuf,
        #[arg(long)]
        thresholds: Option<PathBuf>,
        #[arg(long)]
        max_attempts: Option<u32>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::ValidateContracts { payload } => cmd_validate_contracts(&payload),
        Command::Repair {
            class,
            excerpt,
            stage,
            artifact,
            max_attempts,
            run_id,
        } => cmd_repair(&config, &class, &excerpt, &stage, &artifact, max_attempts, run_id),
        Command::Gate {
            payload,
            checks,
            feedback,
            no_profile,
            run_id,
        } => cmd_gate(&config, &payload, &checks, feedback.as_deref(), no_profile, run_id),
        Command::Snapshot { root, run_id, out } => cmd_snapshot(&root, run_id, &out),
        Command::Map { intent, run_id, out } => cmd_map(&config, &intent, &run_id, &out),
        Command::Plan { edits, run_id, out } => cmd_plan(&config, &edits, &run_id, &out),
        Command::Patch {
            diff,
            results,
            run_id,
            out,
        } => cmd_patch(&config, &diff, &results, &run_id, &out),
        Command::Bundle {
            summary,
            risk_notes,
            run_id,
            out,
        } => cmd_bundle(&summary, &risk_notes, &run_id, &out),
        Command::CorpusCheck {
            corpus,
            thresholds,
            max_attempts,
        } => cmd_corpus_check(&config, &corpus, thresholds.as_deref(), max_attempts),
    }
}

fn cmd_validate_contracts(payload_path: &Path) -> Result<i32> {
    let raw = fs::read_to_string(payload_path)
        .with_context(|| format!("read {}", payload_path.display()))?;
    let payload = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", payload_path.display()))?;
    let loaded = contracts::load(&payload)?;
    for (family, version) in loaded.versions() {
        println!("{family}@{version}");
    }
    Ok(exit_codes::OK)
}

fn cmd_repair(
    config: &GovernorConfig,
    class: &str,
    excerpt: &str,
    stage: &str,
    artifact: &str,
    max_attempts: Option<u32>,
    run_id: Option<String>,
) -> Result<i32> {
    let failure_class: FailureClass = class.parse()?;
    let options = RepairOptions::new(max_attempts.unwrap_or(config.max_attempts_default))?;
    let outcome = repair(
        &RepairRequest {
            failure_class,
            stage,
            artifact_kind: artifact,
            excerpt,
        },
        &options,
    );
    print_json(&outcome)?;

    let hooks = Hooks::real();
    let run_id = run_id.unwrap_or_else(|| hooks.new_id());
    let mut emitter =
        TraceEmitter::new(hooks).with_sink(Box::new(FileSink::new(&config.trace_path)));
    emitter.emit(RecordDraft {
        run_id,
        stage: stage.to_string(),
        artifact_kind: artifact.to_string(),
        repair: Some(RepairSummary::from(&outcome)),
        ..RecordDraft::default()
    });

    Ok(if outcome.continuation_allowed {
        exit_codes::OK
    } else {
        match outcome.decision {
            governor::core::decision::RepairDecision::Stop => exit_codes::STOP,
            _ => exit_codes::ESCALATE,
        }
    })
}

fn cmd_gate(
    config: &GovernorConfig,
    payload_path: &Path,
    checks: &[String],
    feedback_path: Option<&Path>,
    no_profile: bool,
    run_id: Option<String>,
) -> Result<i32> {
    let raw = fs::read_to_string(payload_path)
        .with_context(|| format!("read {}", payload_path.display()))?;
    let payload = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", payload_path.display()))?;
    let loaded = contracts::load(&payload)?;

    let status = parse_checks(checks)?;
    let feedback: Option<FeedbackTensor> = match feedback_path {
        Some(path) => {
            let raw =
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            Some(serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?)
        }
        None => None,
    };

    let decision = gate::evaluate(&GateInput {
        verification_contract: &loaded.verification_contract,
        policy_profile: (!no_profile).then_some(&loaded.policy_profile),
        verification_status: status.as_ref(),
        feedback: feedback.as_ref(),
    });
    print_json(&decision)?;

    let hooks = Hooks::real();
    let run_id = run_id.unwrap_or_else(|| hooks.new_id());
    let mut emitter =
        TraceEmitter::new(hooks).with_sink(Box::new(FileSink::new(&config.trace_path)));
    emitter.emit(RecordDraft {
        run_id,
        stage: "continuation_gate".to_string(),
        artifact_kind: "verification_contract".to_string(),
        gate: Some(decision.clone()),
        feedback,
        ..RecordDraft::default()
    });

    Ok(decision_exit_code(decision.decision))
}

fn cmd_snapshot(root: &Path, run_id: Option<String>, out: &Path) -> Result<i32> {
    let hooks = Hooks::real();
    let run_id = run_id.unwrap_or_else(|| hooks.new_id());
    let ctx = StageContext::new(run_id, hooks);
    let snapshot = take_snapshot(root, &ctx)?;
    let paths = RunPaths::new(out, &ctx.run_id);
    write_artifact(&paths.snapshot_path, &snapshot)?;
    println!("{}", paths.snapshot_path.display());
    Ok(exit_codes::OK)
}

fn cmd_map(config: &GovernorConfig, intent: &str, run_id: &str, out: &Path) -> Result<i32> {
    let paths = RunPaths::new(out, run_id);
    let snapshot = read_artifact::<SnapshotPayload>(&paths.snapshot_path)?;
    let ctx = StageContext::new(run_id, Hooks::real());
    let options = MappingOptions {
        min_confidence: config.min_confidence,
        ambiguity_gap: config.ambiguity_gap,
    };
    let mapping = map_intent(&snapshot, intent, &options, &ctx);
    write_artifact(&paths.mapping_path, &mapping)?;
    print_json(&mapping.payload.decision)?;
    Ok(decision_exit_code(mapping.payload.decision.decision))
}

fn cmd_plan(config: &GovernorConfig, edits_path: &Path, run_id: &str, out: &Path) -> Result<i32> {
    let raw = fs::read_to_string(edits_path)
        .with_context(|| format!("read {}", edits_path.display()))?;
    let edits: Vec<PlannedEdit> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", edits_path.display()))?;

    let paths = RunPaths::new(out, run_id);
    let mapping = read_artifact(&paths.mapping_path)?;
    let ctx = StageContext::new(run_id, Hooks::real());
    let plan = plan_edits(&mapping, &edits, &config.plan, &ctx)?;
    write_artifact(&paths.plan_path, &plan)?;
    print_json(&plan.payload.decision)?;
    Ok(decision_exit_code(plan.payload.decision.decision))
}

fn cmd_patch(
    config: &GovernorConfig,
    diff_path: &Path,
    results_path: &Path,
    run_id: &str,
    out: &Path,
) -> Result<i32> {
    let diff =
        fs::read_to_string(diff_path).with_context(|| format!("read {}", diff_path.display()))?;
    let raw = fs::read_to_string(results_path)
        .with_context(|| format!("read {}", results_path.display()))?;
    let results: Vec<VerificationResult> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", results_path.display()))?;

    let paths = RunPaths::new(out, run_id);
    let plan = read_artifact::<PlanPayload>(&paths.plan_path)?;
    let ctx = StageContext::new(run_id, Hooks::real());
    let patch = run_patch(&plan, &diff, &results, &config.required_checks, &ctx);
    write_artifact(&paths.patch_path, &patch)?;
    print_json(&patch.payload.decision)?;
    Ok(decision_exit_code(patch.payload.decision.decision))
}

fn cmd_bundle(summary: &str, risk_notes: &[String], run_id: &str, out: &Path) -> Result<i32> {
    let paths = RunPaths::new(out, run_id);
    let snapshot = read_artifact::<SnapshotPayload>(&paths.snapshot_path)?;
    let mapping = read_artifact(&paths.mapping_path)?;
    let plan = read_artifact(&paths.plan_path)?;
    let patch = read_artifact::<PatchRunPayload>(&paths.patch_path)?;

    let mut store = ArtifactStore::new();
    store.insert(&snapshot)?;
    store.insert(&mapping)?;
    store.insert(&plan)?;
    store.insert(&patch)?;

    let ctx = StageContext::new(run_id, Hooks::real());
    let bundle = assemble_bundle(
        &snapshot, &mapping, &plan, &patch, &store, summary, risk_notes, &ctx,
    );
    write_artifact(&paths.bundle_path, &bundle)?;
    print_json(&bundle.payload.readiness)?;
    Ok(decision_exit_code(bundle.payload.readiness.decision.decision))
}

fn cmd_corpus_check(
    config: &GovernorConfig,
    corpus_path: &Path,
    thresholds_path: Option<&Path>,
    max_attempts: Option<u32>,
) -> Result<i32> {
    let corpus = load_corpus(corpus_path)?;
    let options = RepairOptions::new(max_attempts.unwrap_or(config.max_attempts_default))?;
    let report = score_corpus(&corpus, &options);
    print_json(&report)?;

    if let Some(path) = thresholds_path {
        let thresholds = load_thresholds(path, &corpus)?;
        let shortfalls = report.shortfalls(&thresholds);
        if !shortfalls.is_empty() {
            eprintln!("thresholds not met: {}", shortfalls.join(", "));
            return Ok(exit_codes::STOP);
        }
    }
    Ok(exit_codes::OK)
}

fn decision_exit_code(decision: Decision) -> i32 {
    match decision {
        Decision::Continue => exit_codes::OK,
        Decision::Escalate => exit_codes::ESCALATE,
        Decision::Stop => exit_codes::STOP,
    }
}

/// Parse `check=pass|fail|not_run` pairs into a verification status.
fn parse_checks(pairs: &[String]) -> Result<Option<VerificationStatus>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut checks = Vec::new();
    for pair in pairs {
        let Some((id, status)) = pair.split_once('=') else {
            bail!("check '{pair}' must have the form name=pass|fail|not_run");
        };
        let status = match status {
            "pass" => CheckStatus::Pass,
            "fail" => CheckStatus::Fail,
            "not_run" => CheckStatus::NotRun,
            other => bail!("unknown check status '{other}'"),
        };
        checks.push(CheckResult {
            id: id.to_string(),
            status,
        });
    }
    Ok(Some(VerificationStatus { checks }))
}

/// Serialize `value` to pretty-printed JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serialize json")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repair_command() {
        let cli = Cli::parse_from([
            "governor",
            "repair",
            "parse",
            "goal \"Ship release",
            "--max-attempts",
            "3",
        ]);
        match cli.command {
            Command::Repair {
                class,
                excerpt,
                max_attempts,
                ..
            } => {
                assert_eq!(class, "parse");
                assert_eq!(excerpt, "goal \"Ship release");
                assert_eq!(max_attempts, Some(3));
            }
            _ => panic!("expected repair command"),
        }
    }

    #[test]
    fn parse_gate_command_with_checks() {
        let cli = Cli::parse_from([
            "governor",
            "gate",
            "contracts.json",
            "--check",
            "lint=pass",
            "--check",
            "test=fail",
        ]);
        match cli.command {
            Command::Gate { checks, .. } => assert_eq!(checks, vec!["lint=pass", "test=fail"]),
            _ => panic!("expected gate command"),
        }
    }

    #[test]
    fn parse_checks_builds_status() {
        let status = parse_checks(&["lint=pass".to_string(), "test=not_run".to_string()])
            .expect("parse")
            .expect("status");
        assert_eq!(status.checks.len(), 2);
        assert_eq!(status.status_of("test"), Some(CheckStatus::NotRun));
    }

    #[test]
    fn parse_checks_rejects_malformed_pair() {
        let err = parse_checks(&["lint".to_string()]).expect_err("should fail");
        assert!(err.to_string().contains("name=pass|fail|not_run"));
    }

    #[test]
    fn decision_exit_codes_are_stable() {
        assert_eq!(decision_exit_code(Decision::Continue), 0);
        assert_eq!(decision_exit_code(Decision::Stop), 2);
        assert_eq!(decision_exit_code(Decision::Escalate), 3);
    }
}
