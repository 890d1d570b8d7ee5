//! Artifact pipeline: snapshot, mapping, plan, patch run, PR bundle.
//!
//! Stages communicate only through versioned artifact envelopes; each stage
//! consumes upstream artifacts by reference and appends its own output to the
//! run's artifact store.

pub mod bundle;
pub mod envelope;
pub mod mapping;
pub mod patch;
pub mod plan;
pub mod snapshot;
