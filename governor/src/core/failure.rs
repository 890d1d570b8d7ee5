//! Failure classification for governed operations.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// Closed set of failure classes a governed operation can report.
///
/// Declared in repair-rule priority order: rules for earlier classes are
/// always tried before rules for later classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Parse,
    SchemaContract,
    PolicyGate,
    CapabilityDenied,
    DeterministicRuntime,
    StochasticExtractionUncertainty,
}

impl FailureClass {
    pub const ALL: [FailureClass; 6] = [
        FailureClass::Parse,
        FailureClass::SchemaContract,
        FailureClass::PolicyGate,
        FailureClass::CapabilityDenied,
        FailureClass::DeterministicRuntime,
        FailureClass::StochasticExtractionUncertainty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Parse => "parse",
            FailureClass::SchemaContract => "schema_contract",
            FailureClass::PolicyGate => "policy_gate",
            FailureClass::CapabilityDenied => "capability_denied",
            FailureClass::DeterministicRuntime => "deterministic_runtime",
            FailureClass::StochasticExtractionUncertainty => "stochastic_extraction_uncertainty",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureClass::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| anyhow!("unknown failure class '{s}'"))
    }
}

/// A-priori recoverability label carried by fixtures.
///
/// Used only for corpus scoring. The repair loop never consults it; the loop
/// derives its own outcome from rule matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recoverability {
    Recoverable,
    NonRecoverable,
}
