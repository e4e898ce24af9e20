//! CLI command implementations.

pub mod common;
pub mod patterns;
pub mod sync;
