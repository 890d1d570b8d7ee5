//! Side-effecting adapters: git inspection, config, sinks, artifact files.

pub mod artifact_files;
pub mod config;
pub mod corpus;
pub mod emitter;
pub mod sink;
pub mod workspace;
