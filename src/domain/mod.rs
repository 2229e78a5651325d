//! Domain layer types and invariants.

pub mod snippet;
pub mod tools;
