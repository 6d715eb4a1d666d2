//! Configuration module for gifmerge
//!
//! Provides types and parsing for `gifmerge.toml`: the output policy of a
//! merge run and logging settings.

pub mod loader;
pub mod schema;

pub use loader::{apply_overrides, find_config, find_config_from, load_config, ConfigError, PolicyOverrides};
pub use schema::*;
