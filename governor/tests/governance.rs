//! End-to-end governance flow: contract validation, gate evaluation, governed
//! invocation with trace emission, and corpus scoring.

use std::fs;

use anyhow::anyhow;

use governor::contracts;
use governor::core::decision::{Decision, RepairDecision, reason};
use governor::core::failure::FailureClass;
use governor::core::feedback::{
    CalibrationBand, Confidence, FeedbackProvenance, FeedbackTensor,
};
use governor::core::gate::{self, CheckResult, CheckStatus, GateInput, VerificationStatus};
use governor::core::repair::RepairOptions;
use governor::govern::{Invocation, govern};
use governor::hooks::Hooks;
use governor::io::corpus::{parse_corpus, score_corpus};
use governor::io::emitter::TraceEmitter;
use governor::io::sink::FileSink;
use governor::test_support::{full_coverage_corpus_json, valid_contracts_payload};

fn all_pass() -> VerificationStatus {
    VerificationStatus {
        checks: ["lint", "typecheck", "test"]
            .into_iter()
            .map(|id| CheckResult {
                id: id.to_string(),
                status: CheckStatus::Pass,
            })
            .collect(),
    }
}

fn complete_feedback(run_id: &str) -> FeedbackTensor {
    FeedbackTensor {
        confidence: Some(Confidence::new(0.9, CalibrationBand::High)),
        provenance: Some(FeedbackProvenance {
            run_id: run_id.to_string(),
            stage: "continuation_gate".to_string(),
            contract_versions: Vec::new(),
        }),
        ..FeedbackTensor::default()
    }
}

#[test]
fn validated_contracts_pass_the_gate_with_complete_evidence() {
    let contracts = contracts::load(&valid_contracts_payload()).expect("contracts");
    let status = all_pass();
    let feedback = complete_feedback("run-1");

    let decision = gate::evaluate(&GateInput {
        verification_contract: &contracts.verification_contract,
        policy_profile: Some(&contracts.policy_profile),
        verification_status: Some(&status),
        feedback: Some(&feedback),
    });

    assert_eq!(decision.decision, Decision::Continue);
    assert_eq!(decision.reason_code, reason::VERIFICATION_GATE_PASSED);
    assert!(decision.continuation_allowed);
}

#[test]
fn missing_feedback_field_blocks_continuation() {
    let contracts = contracts::load(&valid_contracts_payload()).expect("contracts");
    let status = all_pass();
    // Confidence present, provenance withheld.
    let feedback = FeedbackTensor {
        confidence: Some(Confidence::new(0.9, CalibrationBand::High)),
        ..FeedbackTensor::default()
    };

    let decision = gate::evaluate(&GateInput {
        verification_contract: &contracts.verification_contract,
        policy_profile: Some(&contracts.policy_profile),
        verification_status: Some(&status),
        feedback: Some(&feedback),
    });

    assert_eq!(decision.decision, Decision::Stop);
    assert_eq!(
        decision.reason_code,
        reason::VERIFICATION_REQUIRED_FEEDBACK_MISSING
    );
    assert_eq!(decision.missing_feedback_fields, vec!["provenance"]);
}

#[test]
fn omitted_policy_profile_stops_when_required() {
    let contracts = contracts::load(&valid_contracts_payload()).expect("contracts");
    let status = all_pass();
    let feedback = complete_feedback("run-1");

    let decision = gate::evaluate(&GateInput {
        verification_contract: &contracts.verification_contract,
        policy_profile: None,
        verification_status: Some(&status),
        feedback: Some(&feedback),
    });

    assert_eq!(decision.decision, Decision::Stop);
    assert_eq!(decision.reason_code, reason::POLICY_PROFILE_REQUIRED);
}

#[test]
fn failed_policy_assertion_escalates_with_its_id() {
    let mut payload = valid_contracts_payload();
    payload["policy_profile"]["mandatory_assertions"] = serde_json::json!([
        {"kind": "environment_is", "id": "must-be-production", "environment": "production"}
    ]);
    let contracts = contracts::load(&payload).expect("contracts");
    let status = all_pass();
    let feedback = complete_feedback("run-1");

    let decision = gate::evaluate(&GateInput {
        verification_contract: &contracts.verification_contract,
        policy_profile: Some(&contracts.policy_profile),
        verification_status: Some(&status),
        feedback: Some(&feedback),
    });

    assert_eq!(decision.decision, Decision::Escalate);
    assert_eq!(
        decision.reason_code,
        reason::VERIFICATION_POLICY_ASSERTION_FAILED
    );
    assert_eq!(
        decision.failed_policy_assertion_ids,
        vec!["must-be-production"]
    );
}

#[test]
fn governed_failure_appends_one_ledger_line_and_rethrows() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ledger = temp.path().join("trace.ndjson");
    let mut emitter =
        TraceEmitter::new(Hooks::real()).with_sink(Box::new(FileSink::new(&ledger)));

    let contracts = contracts::load(&valid_contracts_payload()).expect("contracts");
    let invocation = Invocation {
        run_id: "run-ledger",
        stage: "execute",
        artifact_kind: "semantic_ir",
        contract_versions: contracts.versions(),
    };

    let err = govern::<()>(
        &invocation,
        &mut emitter,
        &RepairOptions::default(),
        |_| FailureClass::Parse,
        || Err(anyhow!("goal \"Ship release")),
    )
    .expect_err("op fails");
    assert_eq!(err.to_string(), "goal \"Ship release");

    let contents = fs::read_to_string(&ledger).expect("ledger");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);

    let record: serde_json::Value = serde_json::from_str(lines[0]).expect("record");
    assert_eq!(record["run_id"], "run-ledger");
    assert_eq!(record["status"], "failure");
    assert_eq!(record["repair"]["decision"], "repaired");
    assert_eq!(
        record["repair"]["applied_rule_id"],
        "close_unterminated_goal_quote"
    );
    assert_eq!(record["feedback"]["confidence"]["score"], 0.9);
    assert_eq!(
        record["feedback"]["provenance"]["contract_versions"]
            .as_array()
            .expect("versions")
            .len(),
        3
    );
}

#[test]
fn governed_success_appends_a_success_line() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ledger = temp.path().join("trace.ndjson");
    let mut emitter =
        TraceEmitter::new(Hooks::real()).with_sink(Box::new(FileSink::new(&ledger)));

    let invocation = Invocation {
        run_id: "run-ledger",
        stage: "execute",
        artifact_kind: "semantic_ir",
        contract_versions: Vec::new(),
    };
    let value = govern(
        &invocation,
        &mut emitter,
        &RepairOptions::default(),
        |_| FailureClass::DeterministicRuntime,
        || Ok("done"),
    )
    .expect("op");
    assert_eq!(value, "done");

    let contents = fs::read_to_string(&ledger).expect("ledger");
    let record: serde_json::Value =
        serde_json::from_str(contents.lines().next().expect("line")).expect("record");
    assert_eq!(record["status"], "success");
    assert!(record.get("error").is_none());
    assert!(record.get("repair").is_none());
}

#[test]
fn corpus_scoring_matches_expected_terminal_behavior() {
    let corpus = parse_corpus(&full_coverage_corpus_json()).expect("corpus");
    let report = score_corpus(&corpus, &RepairOptions::default());

    assert_eq!(report.overall.fixtures, 12);
    assert_eq!(report.overall.recovery_rate, 1.0);
    assert_eq!(report.overall.safe_block_rate, 1.0);
    assert_eq!(report.overall.safe_allow_rate, 1.0);
}

#[test]
fn budget_of_one_stops_the_retryable_timeout_fixture() {
    let corpus = parse_corpus(&full_coverage_corpus_json()).expect("corpus");
    let options = RepairOptions::new(1).expect("options");
    let report = score_corpus(&corpus, &options);

    // The deterministic_runtime recoverable fixture needs two attempts, so a
    // budget of one turns it into a stop and the recovery rate drops.
    let runtime = &report.per_class["deterministic_runtime"];
    assert_eq!(runtime.recovery_rate, 0.0);
    assert!(report.overall.recovery_rate < 1.0);

    let outcome = governor::core::repair::repair(
        &governor::core::repair::RepairRequest {
            failure_class: FailureClass::DeterministicRuntime,
            stage: "execute",
            artifact_kind: "patch_run",
            excerpt: "step=resolve_manifest; error=timeout; retryable=true",
        },
        &options,
    );
    assert_eq!(outcome.decision, RepairDecision::Stop);
    assert_eq!(outcome.reason_code, reason::MAX_ATTEMPTS_EXCEEDED);
}
