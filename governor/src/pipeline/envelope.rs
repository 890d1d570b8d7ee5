//! Shared artifact envelope and append-only artifact store.
//!
//! Every pipeline output is an [`Envelope`] whose `inputs` list references
//! every upstream artifact that influenced the decision; an omission there is
//! a lineage defect. Artifacts are immutable values identified by opaque ids;
//! consumers hold [`ArtifactRef`]s, never live object pointers.

use anyhow::{Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hooks::Hooks;

/// Artifact family identifiers.
pub mod family {
    pub const WORKSPACE_SNAPSHOT: &str = "ls.m2.workspace_snapshot";
    pub const INTENT_MAPPING: &str = "ls.m2.intent_mapping";
    pub const SAFE_DIFF_PLAN: &str = "ls.m2.safe_diff_plan";
    pub const PATCH_RUN: &str = "ls.m2.patch_run";
    pub const PR_BUNDLE: &str = "ls.m2.pr_bundle";
}

/// Initial version shared by every artifact family.
pub const ARTIFACT_SCHEMA_VERSION: &str = "1.0.0";

/// Reference to an upstream artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub artifact_id: String,
    pub artifact_type: String,
    pub schema_version: String,
}

/// Versioned envelope wrapping a family-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub artifact_type: String,
    pub schema_version: String,
    pub artifact_id: String,
    pub run_id: String,
    pub produced_at_utc: String,
    pub tool_version: String,
    pub inputs: Vec<ArtifactRef>,
    /// Stage-specific provenance.
    pub trace: Value,
    pub payload: P,
}

impl<P> Envelope<P> {
    /// Reference to this artifact for downstream lineage.
    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef {
            artifact_id: self.artifact_id.clone(),
            artifact_type: self.artifact_type.clone(),
            schema_version: self.schema_version.clone(),
        }
    }
}

/// Per-run context shared by all stage producers.
#[derive(Debug)]
pub struct StageContext {
    pub run_id: String,
    pub tool_version: String,
    hooks: Hooks,
}

impl StageContext {
    pub fn new(run_id: impl Into<String>, hooks: Hooks) -> Self {
        Self {
            run_id: run_id.into(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            hooks,
        }
    }

    /// Wrap a payload in a fresh envelope for this run.
    pub fn envelope<P>(
        &self,
        artifact_type: &str,
        inputs: Vec<ArtifactRef>,
        trace: Value,
        payload: P,
    ) -> Envelope<P> {
        Envelope {
            artifact_type: artifact_type.to_string(),
            schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
            artifact_id: self.hooks.new_id(),
            run_id: self.run_id.clone(),
            produced_at_utc: self.hooks.now_rfc3339(),
            tool_version: self.tool_version.clone(),
            inputs,
            trace,
            payload,
        }
    }
}

/// One artifact held by the store, serialized once at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub artifact_id: String,
    pub artifact_type: String,
    pub schema_version: String,
    pub value: Value,
}

/// Append-only arena of immutable artifacts, keyed by artifact id.
///
/// Lineage between stages is expressed as ordered id references into this
/// store; stages never share live mutable state.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    records: Vec<StoredArtifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an artifact. Duplicate ids are rejected; the store never
    /// replaces a record.
    pub fn insert<P: Serialize>(&mut self, envelope: &Envelope<P>) -> Result<()> {
        if self.contains(&envelope.artifact_id) {
            bail!("artifact id '{}' already stored", envelope.artifact_id);
        }
        self.records.push(StoredArtifact {
            artifact_id: envelope.artifact_id.clone(),
            artifact_type: envelope.artifact_type.clone(),
            schema_version: envelope.schema_version.clone(),
            value: serde_json::to_value(envelope)?,
        });
        Ok(())
    }

    pub fn get(&self, artifact_id: &str) -> Option<&StoredArtifact> {
        self.records
            .iter()
            .find(|record| record.artifact_id == artifact_id)
    }

    /// Deserialize a stored artifact back into a typed envelope.
    pub fn get_envelope<P: DeserializeOwned>(&self, artifact_id: &str) -> Option<Envelope<P>> {
        let record = self.get(artifact_id)?;
        serde_json::from_value(record.value.clone()).ok()
    }

    pub fn contains(&self, artifact_id: &str) -> bool {
        self.get(artifact_id).is_some()
    }

    /// Ids from `required` that the store does not hold, in input order.
    pub fn missing_ids<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        required
            .into_iter()
            .filter(|id| !self.contains(id))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed_context() -> StageContext {
        let counter = std::sync::atomic::AtomicU64::new(0);
        let hooks = Hooks::real()
            .with_clock(Box::new(|| {
                Ok("2026-03-01T00:00:00Z".parse().expect("timestamp"))
            }))
            .with_id_gen(Box::new(move || {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(format!("artifact-{n:04}"))
            }));
        StageContext::new("run-1", hooks)
    }

    #[test]
    fn envelope_carries_run_identity_and_inputs() {
        let ctx = fixed_context();
        let upstream = ctx.envelope(family::WORKSPACE_SNAPSHOT, Vec::new(), json!({}), json!({}));
        let downstream = ctx.envelope(
            family::INTENT_MAPPING,
            vec![upstream.reference()],
            json!({}),
            json!({}),
        );

        assert_eq!(downstream.run_id, "run-1");
        assert_eq!(downstream.schema_version, ARTIFACT_SCHEMA_VERSION);
        assert_eq!(downstream.inputs.len(), 1);
        assert_eq!(downstream.inputs[0].artifact_id, upstream.artifact_id);
        assert_ne!(upstream.artifact_id, downstream.artifact_id);
    }

    #[test]
    fn store_rejects_duplicate_ids() {
        let ctx = fixed_context();
        let artifact = ctx.envelope(family::WORKSPACE_SNAPSHOT, Vec::new(), json!({}), json!({}));
        let mut store = ArtifactStore::new();
        store.insert(&artifact).expect("first insert");
        let err = store.insert(&artifact).expect_err("duplicate should fail");
        assert!(err.to_string().contains("already stored"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_ids_preserve_input_order() {
        let ctx = fixed_context();
        let artifact = ctx.envelope(family::WORKSPACE_SNAPSHOT, Vec::new(), json!({}), json!({}));
        let mut store = ArtifactStore::new();
        store.insert(&artifact).expect("insert");

        let missing = store.missing_ids(["zzz", artifact.artifact_id.as_str(), "aaa"]);
        assert_eq!(missing, vec!["zzz", "aaa"]);
    }

    #[test]
    fn stored_envelope_round_trips() {
        let ctx = fixed_context();
        let artifact = ctx.envelope(
            family::WORKSPACE_SNAPSHOT,
            Vec::new(),
            json!({"stage": "snapshot"}),
            json!({"files": []}),
        );
        let mut store = ArtifactStore::new();
        store.insert(&artifact).expect("insert");

        let loaded: Envelope<Value> = store
            .get_envelope(&artifact.artifact_id)
            .expect("stored envelope");
        assert_eq!(loaded.payload, json!({"files": []}));
        assert_eq!(loaded.produced_at_utc, "2026-03-01T00:00:00.000Z");
    }
}
