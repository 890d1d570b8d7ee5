//! Reliability-and-continuation governance for agent-authored code changes.
//!
//! The crate governs a pipeline of artifact-producing stages (workspace
//! snapshot → intent mapping → safe diff plan → patch run → PR bundle) plus
//! the decision machinery around them: contract validation, a rule-first
//! repair loop, a fail-closed continuation gate, and best-effort trace
//! emission. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic decision logic (repair, gate,
//!   feedback). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (git inspection, sinks, config,
//!   artifact files). Isolated to enable fakes in tests.
//!
//! [`contracts`] validates the versioned runtime contracts, [`pipeline`]
//! implements the artifact stages, and [`govern`] correlates a governed
//! invocation with repair and trace emission.

pub mod contracts;
pub mod core;
pub mod exit_codes;
pub mod govern;
pub mod hooks;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
