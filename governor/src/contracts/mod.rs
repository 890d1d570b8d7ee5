//! Versioned contract validation.
//!
//! [`load`] is the only constructor for runtime contracts: it checks the
//! envelope shape, each family against its JSON Schema (Draft 2020-12), the
//! exact `schema_version` literal per family, and semantic invariants the
//! schema cannot express. It is a pure function of its input plus the
//! statically embedded schemas.

pub mod types;

use jsonschema::validator_for;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::contracts::types::{PolicyProfile, SemanticIr, VerificationContract};
use crate::core::decision::reason;

const SEMANTIC_IR_SCHEMA: &str = include_str!("../../schemas/semantic_ir.v1.schema.json");
const POLICY_PROFILE_SCHEMA: &str = include_str!("../../schemas/policy_profile.v1.schema.json");
const VERIFICATION_CONTRACT_SCHEMA: &str =
    include_str!("../../schemas/verification_contract.v1.schema.json");

/// The single supported `schema_version` per family. Compared by exact string
/// match, never a semver range.
pub const SEMANTIC_IR_VERSION: &str = "1.0.0";
pub const POLICY_PROFILE_VERSION: &str = "1.0.0";
pub const VERIFICATION_CONTRACT_VERSION: &str = "1.0.0";

/// One structural or semantic violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub instance_path: String,
    pub keyword: String,
    pub message: String,
}

/// Contract validation failure. Always carries the contract name; schema and
/// version failures additionally carry a structured issue list, never a bare
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractValidationError {
    #[error("{contract}: input must be a JSON object")]
    InvalidInput { contract: String },
    #[error("{contract}: schema validation failed ({count} issue(s))", count = issues.len())]
    SchemaValidationFailed {
        contract: String,
        issues: Vec<ValidationIssue>,
    },
    #[error("{contract}: incompatible schema_version")]
    VersionIncompatible {
        contract: String,
        issues: Vec<ValidationIssue>,
    },
}

impl ContractValidationError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ContractValidationError::InvalidInput { .. } => reason::INVALID_INPUT,
            ContractValidationError::SchemaValidationFailed { .. } => {
                reason::SCHEMA_VALIDATION_FAILED
            }
            ContractValidationError::VersionIncompatible { .. } => reason::VERSION_INCOMPATIBLE,
        }
    }

    pub fn contract(&self) -> &str {
        match self {
            ContractValidationError::InvalidInput { contract }
            | ContractValidationError::SchemaValidationFailed { contract, .. }
            | ContractValidationError::VersionIncompatible { contract, .. } => contract,
        }
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ContractValidationError::InvalidInput { .. } => &[],
            ContractValidationError::SchemaValidationFailed { issues, .. }
            | ContractValidationError::VersionIncompatible { issues, .. } => issues,
        }
    }
}

/// Validated contracts for one governed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeContracts {
    pub semantic_ir: SemanticIr,
    pub policy_profile: PolicyProfile,
    pub verification_contract: VerificationContract,
}

impl RuntimeContracts {
    /// Contract schema versions in effect, keyed by family, for provenance.
    pub fn versions(&self) -> Vec<(String, String)> {
        vec![
            (
                "semantic_ir".to_string(),
                self.semantic_ir.schema_version.clone(),
            ),
            (
                "policy_profile".to_string(),
                self.policy_profile.schema_version.clone(),
            ),
            (
                "verification_contract".to_string(),
                self.verification_contract.schema_version.clone(),
            ),
        ]
    }
}

/// Validate and normalize a contract payload envelope.
///
/// The envelope is an object with one member per family:
/// `semantic_ir`, `policy_profile`, `verification_contract`.
pub fn load(payload_by_family: &Value) -> Result<RuntimeContracts, ContractValidationError> {
    let Some(families) = payload_by_family.as_object() else {
        return Err(ContractValidationError::InvalidInput {
            contract: "RuntimeContracts".to_string(),
        });
    };

    let semantic_ir = validate_family(
        families.get("semantic_ir"),
        "SemanticIR",
        SEMANTIC_IR_SCHEMA,
        SEMANTIC_IR_VERSION,
    )?;
    let policy_profile = validate_family(
        families.get("policy_profile"),
        "PolicyProfile",
        POLICY_PROFILE_SCHEMA,
        POLICY_PROFILE_VERSION,
    )?;
    let verification_contract = validate_family(
        families.get("verification_contract"),
        "VerificationContract",
        VERIFICATION_CONTRACT_SCHEMA,
        VERIFICATION_CONTRACT_VERSION,
    )?;

    let semantic_ir: SemanticIr = deserialize_checked(&semantic_ir, "SemanticIR")?;
    let policy_profile: PolicyProfile = deserialize_checked(&policy_profile, "PolicyProfile")?;
    let verification_contract: VerificationContract =
        deserialize_checked(&verification_contract, "VerificationContract")?;

    check_invariants(&semantic_ir, &policy_profile, &verification_contract)?;

    Ok(RuntimeContracts {
        semantic_ir,
        policy_profile,
        verification_contract,
    })
}

fn validate_family(
    payload: Option<&Value>,
    contract: &str,
    schema_raw: &str,
    expected_version: &str,
) -> Result<Value, ContractValidationError> {
    let Some(payload) = payload else {
        return Err(ContractValidationError::InvalidInput {
            contract: contract.to_string(),
        });
    };
    if !payload.is_object() {
        return Err(ContractValidationError::InvalidInput {
            contract: contract.to_string(),
        });
    }

    let schema: Value = serde_json::from_str(schema_raw).expect("embedded schema is valid JSON");
    let compiled = validator_for(&schema).expect("embedded schema compiles");
    let issues: Vec<ValidationIssue> = compiled
        .iter_errors(payload)
        .map(|err| ValidationIssue {
            instance_path: err.instance_path().to_string(),
            keyword: keyword_of(&err.schema_path().to_string()),
            message: err.to_string(),
        })
        .collect();
    if !issues.is_empty() {
        return Err(ContractValidationError::SchemaValidationFailed {
            contract: contract.to_string(),
            issues,
        });
    }

    let actual = payload
        .get("schema_version")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if actual != expected_version {
        return Err(ContractValidationError::VersionIncompatible {
            contract: contract.to_string(),
            issues: vec![ValidationIssue {
                instance_path: "/schema_version".to_string(),
                keyword: "const".to_string(),
                message: format!(
                    "schema_version must be exactly '{expected_version}', got '{actual}'"
                ),
            }],
        });
    }

    Ok(payload.clone())
}

fn deserialize_checked<T: serde::de::DeserializeOwned>(
    payload: &Value,
    contract: &str,
) -> Result<T, ContractValidationError> {
    serde_json::from_value(payload.clone()).map_err(|err| {
        ContractValidationError::SchemaValidationFailed {
            contract: contract.to_string(),
            issues: vec![ValidationIssue {
                instance_path: String::new(),
                keyword: "deserialize".to_string(),
                message: err.to_string(),
            }],
        }
    })
}

/// Semantic invariants not expressible via JSON Schema.
fn check_invariants(
    semantic_ir: &SemanticIr,
    policy_profile: &PolicyProfile,
    verification_contract: &VerificationContract,
) -> Result<(), ContractValidationError> {
    let node_issues = duplicate_id_issues(
        semantic_ir.nodes.iter().map(|node| node.id.as_str()),
        "/nodes",
    );
    if !node_issues.is_empty() {
        return Err(ContractValidationError::SchemaValidationFailed {
            contract: "SemanticIR".to_string(),
            issues: node_issues,
        });
    }

    let assertion_issues = duplicate_id_issues(
        policy_profile
            .mandatory_assertions
            .iter()
            .map(|assertion| assertion.id()),
        "/mandatory_assertions",
    );
    if !assertion_issues.is_empty() {
        return Err(ContractValidationError::SchemaValidationFailed {
            contract: "PolicyProfile".to_string(),
            issues: assertion_issues,
        });
    }

    let check_issues = duplicate_id_issues(
        verification_contract
            .required_checks
            .iter()
            .map(String::as_str),
        "/required_checks",
    );
    if !check_issues.is_empty() {
        return Err(ContractValidationError::SchemaValidationFailed {
            contract: "VerificationContract".to_string(),
            issues: check_issues,
        });
    }

    Ok(())
}

fn duplicate_id_issues<'a>(
    ids: impl Iterator<Item = &'a str>,
    instance_path: &str,
) -> Vec<ValidationIssue> {
    let mut seen = std::collections::HashSet::new();
    let mut issues = Vec::new();
    for id in ids {
        if !seen.insert(id) {
            issues.push(ValidationIssue {
                instance_path: instance_path.to_string(),
                keyword: "invariant".to_string(),
                message: format!("duplicate id '{id}'"),
            });
        }
    }
    issues
}

/// Extract the violated keyword from a JSON Schema evaluation path.
fn keyword_of(schema_path: &str) -> String {
    schema_path
        .rsplit('/')
        .find(|segment| !segment.is_empty() && segment.parse::<usize>().is_err())
        .unwrap_or("schema")
        .to_string()
}
