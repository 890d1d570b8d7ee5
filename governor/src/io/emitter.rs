//! Best-effort trace/feedback emission.
//!
//! One record is appended per governed invocation. Emission never alters the
//! governed operation's result: every sink failure is caught here, logged at
//! `warn`, and discarded. Clock and id hooks are evaluated only when at least
//! one sink is configured, and fall back to real time / generated ids when
//! they fail.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::feedback::FeedbackTensor;
use crate::core::gate::ContinuationDecision;
use crate::core::repair::RepairOutcome;
use crate::hooks::Hooks;
use crate::io::sink::TraceSink;

/// Whether the governed operation returned a value or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Success,
    Failure,
}

/// Normalized error info for a failed governed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
}

impl ErrorInfo {
    /// Normalize an error name/message pair: a blank or whitespace name
    /// becomes `Error`; an unrenderable message becomes the synthetic
    /// `NonErrorThrown` / `[unstringifiable thrown value]` pair.
    pub fn normalized(name: &str, message: &str) -> Self {
        if message.trim().is_empty() {
            return Self {
                name: "NonErrorThrown".to_string(),
                message: "[unstringifiable thrown value]".to_string(),
            };
        }
        let name = if name.trim().is_empty() {
            "Error".to_string()
        } else {
            name.trim().to_string()
        };
        Self {
            name,
            message: message.to_string(),
        }
    }
}

/// Compact repair loop summary carried by the trace record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub decision: crate::core::decision::RepairDecision,
    pub reason_code: String,
    pub continuation_allowed: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_rule_id: Option<String>,
}

impl From<&RepairOutcome> for RepairSummary {
    fn from(outcome: &RepairOutcome) -> Self {
        Self {
            decision: outcome.decision,
            reason_code: outcome.reason_code.clone(),
            continuation_allowed: outcome.continuation_allowed,
            attempts: outcome.attempts,
            applied_rule_id: outcome.applied_rule_id.clone(),
        }
    }
}

/// One ledger record correlating an invocation with its repair, gate, and
/// feedback outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub recorded_at_utc: String,
    pub run_id: String,
    pub stage: String,
    pub artifact_kind: String,
    pub status: InvocationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<ContinuationDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackTensor>,
}

/// Record content supplied by the caller; identity and timestamp are filled
/// in by the emitter.
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    pub run_id: String,
    pub stage: String,
    pub artifact_kind: String,
    pub error: Option<ErrorInfo>,
    pub repair: Option<RepairSummary>,
    pub gate: Option<ContinuationDecision>,
    pub feedback: Option<FeedbackTensor>,
}

/// Emits trace records to zero or more sinks.
pub struct TraceEmitter {
    sinks: Vec<Box<dyn TraceSink>>,
    hooks: Hooks,
    dropped: u64,
}

impl TraceEmitter {
    pub fn new(hooks: Hooks) -> Self {
        Self {
            sinks: Vec::new(),
            hooks,
            dropped: 0,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn has_sinks(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Records discarded because a sink write failed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Append one record to every sink, best-effort.
    ///
    /// With no sinks configured this is a no-op and the clock/id hooks are
    /// never evaluated.
    pub fn emit(&mut self, draft: RecordDraft) {
        if self.sinks.is_empty() {
            return;
        }
        let status = if draft.error.is_some() {
            InvocationStatus::Failure
        } else {
            InvocationStatus::Success
        };
        let record = TraceRecord {
            trace_id: self.hooks.new_id(),
            recorded_at_utc: self.hooks.now_rfc3339(),
            run_id: draft.run_id,
            stage: draft.stage,
            artifact_kind: draft.artifact_kind,
            status,
            error: draft.error,
            repair: draft.repair,
            gate: draft.gate,
            feedback: draft.feedback,
        };
        for sink in &mut self.sinks {
            if let Err(err) = sink.append(&record) {
                self.dropped += 1;
                warn!(sink = %sink.describe(), error = %err, "trace sink write failed; record dropped");
            }
        }
    }
}
