//! # migshift-core
//!
//! Layered configuration for the migshift tool: defaults, a YAML file, the
//! environment and command line overrides, each recorded with its source.

pub mod config;

// Re-export key types for convenience
pub use config::{
    ConfigError, ConfigFile, ConfigSource, ConfigValidator, Environment, LedgerBackend,
    MigrateConfig, MigrateConfigTrait,
};

