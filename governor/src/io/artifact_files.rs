//! On-disk artifact layout for a pipeline run.
//!
//! Each run gets its own directory with one pretty-JSON file per stage.
//! Files are written atomically (temp file + rename) so a crashed run never
//! leaves a half-written artifact behind.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::pipeline::envelope::Envelope;

/// File layout of one run's artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub mapping_path: PathBuf,
    pub plan_path: PathBuf,
    pub patch_path: PathBuf,
    pub bundle_path: PathBuf,
}

impl RunPaths {
    pub fn new(out_dir: &Path, run_id: &str) -> Self {
        let dir = out_dir.join(run_id);
        Self {
            dir: dir.clone(),
            snapshot_path: dir.join("workspace_snapshot.json"),
            mapping_path: dir.join("intent_mapping.json"),
            plan_path: dir.join("safe_diff_plan.json"),
            patch_path: dir.join("patch_run.json"),
            bundle_path: dir.join("pr_bundle.json"),
        }
    }
}

/// Write one artifact envelope as pretty JSON with a trailing newline.
pub fn write_artifact<P: Serialize>(path: &Path, envelope: &Envelope<P>) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(envelope).context("serialize artifact")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Read an artifact envelope back from disk.
pub fn read_artifact<P: DeserializeOwned>(path: &Path) -> Result<Envelope<P>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read artifact {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse artifact {}", path.display()))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp artifact {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace artifact {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hooks;
    use crate::pipeline::envelope::{StageContext, family};
    use serde_json::{Value, json};

    #[test]
    fn run_paths_are_stable() {
        let paths = RunPaths::new(Path::new(".governor/artifacts"), "run-7");
        assert!(paths.dir.ends_with(Path::new(".governor/artifacts/run-7")));
        assert!(paths.snapshot_path.ends_with("workspace_snapshot.json"));
        assert!(paths.bundle_path.ends_with("pr_bundle.json"));
    }

    #[test]
    fn write_then_read_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = RunPaths::new(temp.path(), "run-1");
        let ctx = StageContext::new("run-1", Hooks::real());
        let artifact = ctx.envelope(
            family::WORKSPACE_SNAPSHOT,
            Vec::new(),
            json!({"stage": "workspace_snapshot"}),
            json!({"files": []}),
        );

        write_artifact(&paths.snapshot_path, &artifact).expect("write");
        let loaded: Envelope<Value> = read_artifact(&paths.snapshot_path).expect("read");
        assert_eq!(loaded.artifact_id, artifact.artifact_id);
        assert_eq!(loaded.payload, json!({"files": []}));

        let raw = fs::read_to_string(&paths.snapshot_path).expect("raw");
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn read_missing_artifact_fails_with_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = read_artifact::<Value>(&temp.path().join("absent.json")).expect_err("missing");
        assert!(err.to_string().contains("absent.json"));
    }
}
