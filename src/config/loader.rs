//! Configuration loading and discovery for `gifmerge.toml`
//!
//! Provides functions to find, load, and override configuration.

use super::schema::{GifmergeConfig, LoopCount};
use crate::merge::BackgroundSpec;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`find_config`].
pub const CONFIG_FILE_NAME: &str = "gifmerge.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse gifmerge.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// Per-invocation values that take precedence over the config file
#[derive(Debug, Default, Clone)]
pub struct PolicyOverrides {
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub background: Option<BackgroundSpec>,
    pub loop_count: Option<LoopCount>,
    pub colormap_size: Option<u16>,
    pub dither: Option<bool>,
    pub conserve_memory: Option<bool>,
    /// Override the log filter
    pub log_level: Option<String>,
}

/// Find gifmerge.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for gifmerge.toml
/// 2. Check XDG_CONFIG_HOME/gifmerge/gifmerge.toml (or ~/.config/gifmerge/gifmerge.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find gifmerge.toml in the XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("gifmerge").join(CONFIG_FILE_NAME);
    config_path.exists().then_some(config_path)
}

/// Find gifmerge.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a gifmerge.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns the default
/// configuration.
///
/// # Example
/// ```ignore
/// let config = load_config(None)?;
/// let config = load_config(Some(Path::new("anim/gifmerge.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<GifmergeConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<GifmergeConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: GifmergeConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    tracing::debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// The configuration used when no gifmerge.toml is found.
pub fn default_config() -> GifmergeConfig {
    GifmergeConfig::default()
}

/// Apply per-invocation overrides to a configuration.
pub fn apply_overrides(config: &mut GifmergeConfig, overrides: &PolicyOverrides) {
    let output = &mut config.output;
    if overrides.screen_width.is_some() {
        output.screen_width = overrides.screen_width;
    }
    if overrides.screen_height.is_some() {
        output.screen_height = overrides.screen_height;
    }
    if overrides.background.is_some() {
        output.background = overrides.background;
    }
    if overrides.loop_count.is_some() {
        output.loop_count = overrides.loop_count;
    }
    if overrides.colormap_size.is_some() {
        output.colormap_size = overrides.colormap_size;
    }
    if let Some(dither) = overrides.dither {
        output.dither = dither;
    }
    if let Some(conserve) = overrides.conserve_memory {
        output.conserve_memory = conserve;
    }
    if let Some(ref level) = overrides.log_level {
        config.logging.level = level.clone();
    }
}
