//! Pure, deterministic governance logic.
//!
//! No I/O lives here: decisions are functions of their inputs, fully testable
//! in isolation. Side effects (trace emission, workspace inspection, artifact
//! files) live in [`crate::io`].

pub mod decision;
pub mod failure;
pub mod feedback;
pub mod gate;
pub mod repair;
