//! Configuration module
//!
//! Handles loading and validating settings from YAML files and environment
//! variables. Settings are passed explicitly to the services that need them.

mod settings;

pub use settings::*;
