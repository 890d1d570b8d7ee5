//! Governance configuration stored in `governor.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::pipeline::plan::PlanLimits;

/// Governance configuration (TOML).
///
/// Edited by humans; must stay stable and automatable. Missing fields default
/// to the shipped thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GovernorConfig {
    /// Default repair loop attempt budget.
    pub max_attempts_default: u32,

    /// Minimum mapping candidate confidence for `continue`.
    pub min_confidence: f64,

    /// Minimum confidence gap between the top two mapping candidates.
    pub ambiguity_gap: f64,

    /// Required verification checks for a patch run.
    pub required_checks: Vec<String>,

    /// NDJSON trace ledger path, relative to the workspace root.
    pub trace_path: String,

    pub plan: PlanLimits,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_attempts_default: 2,
            min_confidence: 0.75,
            ambiguity_gap: 0.05,
            required_checks: vec![
                "lint".to_string(),
                "typecheck".to_string(),
                "test".to_string(),
            ],
            trace_path: ".governor/trace.ndjson".to_string(),
            plan: PlanLimits::default(),
        }
    }
}

impl GovernorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts_default == 0 {
            return Err(anyhow!("max_attempts_default must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(anyhow!("min_confidence must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.ambiguity_gap) {
            return Err(anyhow!("ambiguity_gap must be within [0, 1]"));
        }
        if self.required_checks.is_empty()
            || self.required_checks.iter().any(|check| check.trim().is_empty())
        {
            return Err(anyhow!("required_checks must be a non-empty array"));
        }
        if self.trace_path.trim().is_empty() {
            return Err(anyhow!("trace_path must not be empty"));
        }
        if self.plan.max_files == 0 {
            return Err(anyhow!("plan.max_files must be > 0"));
        }
        if self.plan.max_hunks == 0 {
            return Err(anyhow!("plan.max_hunks must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GovernorConfig::default()`.
pub fn load_config(path: &Path) -> Result<GovernorConfig> {
    if !path.exists() {
        let cfg = GovernorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GovernorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GovernorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
