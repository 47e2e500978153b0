//! Core shared library for the ACD passcode engine.
//!
//! This crate exposes the primitives the engine and the CLI depend on:
//! the wall-clock `Timestamp`, the `FormulaVariant` tag, common errors,
//! configuration loading and logging setup.

pub mod config;
pub mod errors;
pub mod logging;
pub mod serde_utils;
pub mod timestamp;
pub mod variant;

pub use config::{CoreConfig, Environment};
pub use errors::{AcdError, Result as CoreResult};
pub use timestamp::Timestamp;
pub use variant::FormulaVariant;
