//! Governed invocation: run an operation, correlate its outcome with the
//! repair loop, and emit one trace record.
//!
//! Decision outcomes are values; a failing operation's error is rethrown to
//! the caller unchanged after the record is emitted.

use anyhow::Result;

use crate::contracts::ContractValidationError;
use crate::core::failure::FailureClass;
use crate::core::feedback::{
    FeedbackProvenance, FeedbackTensor, default_confidence,
};
use crate::core::repair::{RepairOptions, RepairRequest, repair};
use crate::io::emitter::{ErrorInfo, RecordDraft, RepairSummary, TraceEmitter};

/// Identity of one governed invocation.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub run_id: &'a str,
    pub stage: &'a str,
    pub artifact_kind: &'a str,
    /// Contract schema versions in effect, keyed by family.
    pub contract_versions: Vec<(String, String)>,
}

/// Run `op` under governance.
///
/// On success, emits a success record and returns the value. On failure,
/// classifies the error, runs the repair loop on its rendered message, emits
/// one correlated failure record with a feedback tensor, and returns the
/// original error unchanged.
pub fn govern<T>(
    invocation: &Invocation<'_>,
    emitter: &mut TraceEmitter,
    options: &RepairOptions,
    classify: impl FnOnce(&anyhow::Error) -> FailureClass,
    op: impl FnOnce() -> Result<T>,
) -> Result<T> {
    match op() {
        Ok(value) => {
            emitter.emit(RecordDraft {
                run_id: invocation.run_id.to_string(),
                stage: invocation.stage.to_string(),
                artifact_kind: invocation.artifact_kind.to_string(),
                ..RecordDraft::default()
            });
            Ok(value)
        }
        Err(err) => {
            let error = ErrorInfo::normalized(error_name(&err), &err.to_string());
            let class = classify(&err);
            let outcome = repair(
                &RepairRequest {
                    failure_class: class,
                    stage: invocation.stage,
                    artifact_kind: invocation.artifact_kind,
                    excerpt: &error.message,
                },
                options,
            );

            let feedback = FeedbackTensor {
                confidence: Some(default_confidence(outcome.decision.into())),
                failure_signal: Some(format!("{}: {}", error.name, error.message)),
                alternatives: None,
                proposed_repair_action: outcome
                    .applied_rule_id
                    .clone()
                    .or_else(|| Some("manual_review".to_string())),
                provenance: Some(FeedbackProvenance {
                    run_id: invocation.run_id.to_string(),
                    stage: invocation.stage.to_string(),
                    contract_versions: invocation.contract_versions.clone(),
                }),
            };
            emitter.emit(RecordDraft {
                run_id: invocation.run_id.to_string(),
                stage: invocation.stage.to_string(),
                artifact_kind: invocation.artifact_kind.to_string(),
                error: Some(error),
                repair: Some(RepairSummary::from(&outcome)),
                feedback: Some(feedback),
                ..RecordDraft::default()
            });
            Err(err)
        }
    }
}

/// Stable error name for the trace record.
fn error_name(err: &anyhow::Error) -> &'static str {
    if err.downcast_ref::<ContractValidationError>().is_some() {
        "ContractValidationError"
    } else {
        "Error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use crate::core::decision::RepairDecision;
    use crate::hooks::Hooks;
    use crate::io::emitter::InvocationStatus;
    use crate::test_support::{FailingSink, MemorySink};

    fn invocation() -> Invocation<'static> {
        Invocation {
            run_id: "run-1",
            stage: "execute",
            artifact_kind: "semantic_ir",
            contract_versions: vec![("semantic_ir".to_string(), "1.0.0".to_string())],
        }
    }

    #[test]
    fn success_returns_value_and_emits_success_record() {
        let (sink, records) = MemorySink::shared();
        let mut emitter = TraceEmitter::new(Hooks::real()).with_sink(Box::new(sink));

        let value = govern(
            &invocation(),
            &mut emitter,
            &RepairOptions::default(),
            |_| FailureClass::DeterministicRuntime,
            || Ok(42),
        )
        .expect("governed op");

        assert_eq!(value, 42);
        let records = records.lock().expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, InvocationStatus::Success);
        assert!(records[0].error.is_none());
    }

    #[test]
    fn failure_is_rethrown_unchanged_with_one_correlated_record() {
        let (sink, records) = MemorySink::shared();
        let mut emitter = TraceEmitter::new(Hooks::real()).with_sink(Box::new(sink));

        let err = govern::<()>(
            &invocation(),
            &mut emitter,
            &RepairOptions::default(),
            |_| FailureClass::DeterministicRuntime,
            || Err(anyhow!("step=resolve_manifest; error=timeout; retryable=true")),
        )
        .expect_err("op fails");
        assert_eq!(
            err.to_string(),
            "step=resolve_manifest; error=timeout; retryable=true"
        );

        let records = records.lock().expect("records");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.status, InvocationStatus::Failure);
        assert_eq!(record.error.as_ref().expect("error").name, "Error");

        let repair = record.repair.as_ref().expect("repair summary");
        assert_eq!(repair.decision, RepairDecision::Repaired);
        assert_eq!(repair.attempts, 2);

        let feedback = record.feedback.as_ref().expect("feedback");
        assert_eq!(feedback.confidence.as_ref().expect("confidence").score, 0.9);
        let provenance = feedback.provenance.as_ref().expect("provenance");
        assert_eq!(provenance.run_id, "run-1");
        assert_eq!(provenance.contract_versions.len(), 1);
    }

    #[test]
    fn stopped_repair_yields_low_confidence_feedback() {
        let (sink, records) = MemorySink::shared();
        let mut emitter = TraceEmitter::new(Hooks::real()).with_sink(Box::new(sink));

        let _ = govern::<()>(
            &invocation(),
            &mut emitter,
            &RepairOptions::default(),
            |_| FailureClass::PolicyGate,
            || Err(anyhow!("action=delete_resource; environment=production; rule=deny")),
        );

        let records = records.lock().expect("records");
        let feedback = records[0].feedback.as_ref().expect("feedback");
        assert_eq!(feedback.confidence.as_ref().expect("confidence").score, 0.2);
    }

    #[test]
    fn sink_failure_never_alters_the_result() {
        let mut emitter = TraceEmitter::new(Hooks::real()).with_sink(Box::new(FailingSink));

        let value = govern(
            &invocation(),
            &mut emitter,
            &RepairOptions::default(),
            |_| FailureClass::DeterministicRuntime,
            || Ok("fine"),
        )
        .expect("governed op");

        assert_eq!(value, "fine");
        assert_eq!(emitter.dropped(), 1);
    }
}
