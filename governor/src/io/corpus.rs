//! Reliability fixture corpus and benchmark gate thresholds.
//!
//! The corpus is the scoring seam for the repair loop: every fixture declares
//! a failure input plus the expected terminal behavior, and the corpus is
//! rejected unless it covers both recoverability values for every failure
//! class. Benchmark aggregation CLIs live elsewhere; this module is the
//! library seam they call.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::decision::RepairDecision;
use crate::core::failure::{FailureClass, Recoverability};
use crate::core::repair::{RepairOptions, RepairRequest, repair};

const CORPUS_SCHEMA: &str = include_str!("../../schemas/reliability_corpus.v1.schema.json");
const THRESHOLDS_SCHEMA: &str = include_str!("../../schemas/gate_thresholds.v1.schema.json");

/// Supported corpus schema version.
pub const CORPUS_SCHEMA_VERSION: &str = "1.0.0";

/// Failure input of one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureInput {
    pub stage: String,
    pub artifact: String,
    pub excerpt: String,
}

/// Expected terminal behavior of one fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureExpectation {
    pub classification: String,
    pub continuation_allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_confidence: Option<f64>,
}

/// One reliability fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub failure_class: FailureClass,
    pub recoverability: Recoverability,
    pub input: FixtureInput,
    pub expected: FixtureExpectation,
}

/// A validated reliability corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityCorpus {
    pub schema_version: String,
    pub corpus_id: String,
    pub fixtures: Vec<Fixture>,
}

/// Benchmark gate metric thresholds, each in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdMetrics {
    pub recovery_rate: f64,
    pub safe_block_rate: f64,
    pub safe_allow_rate: f64,
}

/// Benchmark gate thresholds tied to a corpus schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    pub schema_version: String,
    pub threshold_id: String,
    pub corpus_schema_version: String,
    pub metrics: ThresholdMetrics,
}

/// Load and validate a corpus document from disk.
pub fn load_corpus(path: &Path) -> Result<ReliabilityCorpus> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read corpus {}", path.display()))?;
    parse_corpus(&contents).with_context(|| format!("invalid corpus {}", path.display()))
}

/// Parse and validate a corpus document: schema conformance, then coverage.
pub fn parse_corpus(contents: &str) -> Result<ReliabilityCorpus> {
    let instance: Value = serde_json::from_str(contents).context("parse corpus json")?;
    validate_schema(&instance, CORPUS_SCHEMA, "corpus")?;
    let corpus: ReliabilityCorpus =
        serde_json::from_value(instance).context("parse corpus as v1 struct")?;
    check_coverage(&corpus)?;
    debug!(corpus_id = %corpus.corpus_id, fixtures = corpus.fixtures.len(), "corpus loaded");
    Ok(corpus)
}

/// Load gate thresholds and check them against the loaded corpus.
pub fn load_thresholds(path: &Path, corpus: &ReliabilityCorpus) -> Result<GateThresholds> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read thresholds {}", path.display()))?;
    parse_thresholds(&contents, corpus)
        .with_context(|| format!("invalid thresholds {}", path.display()))
}

/// Parse gate thresholds; a `corpus_schema_version` mismatch is a hard error.
pub fn parse_thresholds(contents: &str, corpus: &ReliabilityCorpus) -> Result<GateThresholds> {
    let instance: Value = serde_json::from_str(contents).context("parse thresholds json")?;
    validate_schema(&instance, THRESHOLDS_SCHEMA, "thresholds")?;
    let thresholds: GateThresholds =
        serde_json::from_value(instance).context("parse thresholds as v1 struct")?;
    if thresholds.corpus_schema_version != corpus.schema_version {
        bail!(
            "thresholds expect corpus schema version '{}' but corpus declares '{}'",
            thresholds.corpus_schema_version,
            corpus.schema_version
        );
    }
    Ok(thresholds)
}

/// A corpus must cover both recoverability values for every failure class.
fn check_coverage(corpus: &ReliabilityCorpus) -> Result<()> {
    let mut gaps = Vec::new();
    for class in FailureClass::ALL {
        for recoverability in [Recoverability::Recoverable, Recoverability::NonRecoverable] {
            let covered = corpus.fixtures.iter().any(|fixture| {
                fixture.failure_class == class && fixture.recoverability == recoverability
            });
            if !covered {
                gaps.push(format!("{class}/{recoverability:?}"));
            }
        }
    }
    if !gaps.is_empty() {
        bail!("corpus coverage gaps:\n- {}", gaps.join("\n- "));
    }
    Ok(())
}

/// Validate a JSON instance against an embedded schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema_raw: &str, what: &str) -> Result<()> {
    let schema: Value = serde_json::from_str(schema_raw).context("parse embedded schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile embedded schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| format!("{}: {err}", err.instance_path()))
        .collect();
    if !messages.is_empty() {
        bail!("{what} schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Scored rates for one failure class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassScore {
    pub fixtures: usize,
    /// Repaired fraction of the class's recoverable fixtures.
    pub recovery_rate: f64,
    /// Blocked (non-continuation) fraction of the non-recoverable fixtures.
    pub safe_block_rate: f64,
    /// Fraction whose continuation verdict matched the expectation.
    pub safe_allow_rate: f64,
}

/// Full corpus score report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusReport {
    pub corpus_id: String,
    pub per_class: BTreeMap<String, ClassScore>,
    pub overall: ClassScore,
}

impl CorpusReport {
    /// Metric names from `thresholds` that the overall score fails to meet.
    pub fn shortfalls(&self, thresholds: &GateThresholds) -> Vec<String> {
        let mut failed = Vec::new();
        if self.overall.recovery_rate < thresholds.metrics.recovery_rate {
            failed.push("recovery_rate".to_string());
        }
        if self.overall.safe_block_rate < thresholds.metrics.safe_block_rate {
            failed.push("safe_block_rate".to_string());
        }
        if self.overall.safe_allow_rate < thresholds.metrics.safe_allow_rate {
            failed.push("safe_allow_rate".to_string());
        }
        failed
    }
}

/// Run every fixture through the repair loop and aggregate rates per class.
pub fn score_corpus(corpus: &ReliabilityCorpus, options: &RepairOptions) -> CorpusReport {
    let mut per_class = BTreeMap::new();
    for class in FailureClass::ALL {
        let fixtures: Vec<&Fixture> = corpus
            .fixtures
            .iter()
            .filter(|fixture| fixture.failure_class == class)
            .collect();
        if fixtures.is_empty() {
            continue;
        }
        per_class.insert(class.as_str().to_string(), score_fixtures(&fixtures, options));
    }
    let all: Vec<&Fixture> = corpus.fixtures.iter().collect();
    CorpusReport {
        corpus_id: corpus.corpus_id.clone(),
        per_class,
        overall: score_fixtures(&all, options),
    }
}

fn score_fixtures(fixtures: &[&Fixture], options: &RepairOptions) -> ClassScore {
    let mut recoverable = 0usize;
    let mut recovered = 0usize;
    let mut non_recoverable = 0usize;
    let mut blocked = 0usize;
    let mut matched = 0usize;

    for fixture in fixtures {
        let outcome = repair(
            &RepairRequest {
                failure_class: fixture.failure_class,
                stage: &fixture.input.stage,
                artifact_kind: &fixture.input.artifact,
                excerpt: &fixture.input.excerpt,
            },
            options,
        );
        match fixture.recoverability {
            Recoverability::Recoverable => {
                recoverable += 1;
                if outcome.decision == RepairDecision::Repaired {
                    recovered += 1;
                }
            }
            Recoverability::NonRecoverable => {
                non_recoverable += 1;
                if !outcome.continuation_allowed {
                    blocked += 1;
                }
            }
        }
        if outcome.continuation_allowed == fixture.expected.continuation_allowed {
            matched += 1;
        }
    }

    ClassScore {
        fixtures: fixtures.len(),
        recovery_rate: rate(recovered, recoverable),
        safe_block_rate: rate(blocked, non_recoverable),
        safe_allow_rate: rate(matched, fixtures.len()),
    }
}

fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        1.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::full_coverage_corpus_json;

    #[test]
    fn full_coverage_corpus_parses() {
        let corpus = parse_corpus(&full_coverage_corpus_json()).expect("corpus");
        assert_eq!(corpus.schema_version, CORPUS_SCHEMA_VERSION);
        assert_eq!(corpus.fixtures.len(), 12);
    }

    #[test]
    fn coverage_gap_is_rejected() {
        let mut doc: Value =
            serde_json::from_str(&full_coverage_corpus_json()).expect("parse");
        let fixtures = doc["fixtures"].as_array_mut().expect("fixtures");
        fixtures.retain(|fixture| fixture["failure_class"] != "parse");
        let err = parse_corpus(&doc.to_string()).expect_err("gap should fail");
        assert!(err.to_string().contains("coverage gaps"));
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn schema_violation_is_rejected() {
        let err = parse_corpus(r#"{"schema_version": "1.0.0"}"#).expect_err("invalid");
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn thresholds_reject_corpus_version_mismatch() {
        let corpus = parse_corpus(&full_coverage_corpus_json()).expect("corpus");
        let raw = r#"{
            "schema_version": "1.0.0",
            "threshold_id": "m2-gate",
            "corpus_schema_version": "2.0.0",
            "metrics": {"recovery_rate": 0.5, "safe_block_rate": 0.9, "safe_allow_rate": 0.8}
        }"#;
        let err = parse_thresholds(raw, &corpus).expect_err("mismatch");
        assert!(err.to_string().contains("corpus schema version"));
    }

    #[test]
    fn scoring_reports_per_class_and_overall_rates() {
        let corpus = parse_corpus(&full_coverage_corpus_json()).expect("corpus");
        let report = score_corpus(&corpus, &RepairOptions::default());

        assert_eq!(report.per_class.len(), 6);
        let parse_score = &report.per_class["parse"];
        assert_eq!(parse_score.fixtures, 2);
        // The recoverable parse fixture repairs; the non-recoverable one
        // escalates, which still blocks continuation.
        assert_eq!(parse_score.recovery_rate, 1.0);
        assert_eq!(parse_score.safe_block_rate, 1.0);
        assert_eq!(report.overall.fixtures, 12);
        assert_eq!(report.overall.safe_allow_rate, 1.0);
    }

    #[test]
    fn shortfalls_name_unmet_metrics() {
        let corpus = parse_corpus(&full_coverage_corpus_json()).expect("corpus");
        let report = score_corpus(&corpus, &RepairOptions::default());
        let thresholds = GateThresholds {
            schema_version: "1.0.0".to_string(),
            threshold_id: "m2-gate".to_string(),
            corpus_schema_version: CORPUS_SCHEMA_VERSION.to_string(),
            metrics: ThresholdMetrics {
                recovery_rate: 1.0,
                safe_block_rate: 1.0,
                safe_allow_rate: 1.0,
            },
        };
        // Every metric at 1.0 passes only if the rule table handles the whole
        // corpus; this corpus is built so that it does.
        assert!(report.shortfalls(&thresholds).is_empty());
    }
}
