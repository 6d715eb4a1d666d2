//! Configuration schema types for `gifmerge.toml`
//!
//! Defines the output policy applied to merge runs plus logging settings,
//! and the validation rules for both.

use serde::{Deserialize, Serialize};

use crate::color::Colormap;
use crate::merge::BackgroundSpec;
use crate::transforms::{ColorChange, Scaling};

/// Loop-count override for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopCount {
    /// Write no looping extension
    NoLoop,
    /// Loop forever
    Forever,
    /// Loop this many times
    Count(u16),
}

impl LoopCount {
    /// The value stored in [`Stream::loop_count`](crate::models::Stream::loop_count).
    pub fn as_stream_value(self) -> Option<u16> {
        match self {
            LoopCount::NoLoop => None,
            LoopCount::Forever => Some(0),
            LoopCount::Count(n) => Some(n),
        }
    }
}

/// Algorithm used to pick colors when reducing the output palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ColormapAlgorithm {
    /// Spread picks over the color space, favoring frequent colors
    #[default]
    Diversity,
    /// Like `Diversity`, but blend each pick with its nearest neighbours
    BlendDiversity,
    /// Recursive median-cut boxes
    MedianCut,
}

/// Output policy for a merge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPolicy {
    /// Force the logical screen width
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,
    /// Force the logical screen height
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,
    /// Background index or color; chosen from the frames when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<BackgroundSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<LoopCount>,
    /// Reduce the output palette to at most this many colors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colormap_size: Option<u16>,
    pub colormap_algorithm: ColormapAlgorithm,
    /// Remap the output onto exactly this palette; takes precedence over
    /// `colormap_size`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colormap_fixed: Option<Colormap>,
    /// Palette substitutions applied to the merged stream
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub color_changes: Vec<ColorChange>,
    /// Dither when remapping to a reduced palette
    pub dither: bool,
    pub scaling: Scaling,
    /// Keep merged frames compressed instead of raw
    pub conserve_memory: bool,
    /// Copy compressed data unchanged when a frame's colors map to themselves.
    /// Implied by any stage that later rewrites every pixel.
    pub reuse_compressed: bool,
}

impl Default for OutputPolicy {
    fn default() -> Self {
        Self {
            screen_width: None,
            screen_height: None,
            background: None,
            loop_count: None,
            colormap_size: None,
            colormap_algorithm: ColormapAlgorithm::default(),
            colormap_fixed: None,
            color_changes: Vec::new(),
            dither: false,
            scaling: Scaling::None,
            conserve_memory: false,
            reuse_compressed: false,
        }
    }
}

impl OutputPolicy {
    /// Whether a post-merge stage will read every pixel.
    pub fn needs_pixel_pass(&self) -> bool {
        self.colormap_size.is_some() || self.colormap_fixed.is_some() || self.scaling.is_active()
    }

    /// Whether merged frames may keep their source's compressed bytes.
    ///
    /// A later pixel pass re-encodes every frame from scratch anyway.
    pub fn allows_compressed_reuse(&self) -> bool {
        self.reuse_compressed || self.needs_pixel_pass()
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "gifmerge=debug,warn")
    pub level: String,
    /// Emit structured JSON logs
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Root configuration structure for `gifmerge.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GifmergeConfig {
    #[serde(default)]
    pub output: OutputPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "output.colormap_size")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gifmerge.toml: '{}' {}", self.field, self.message)
    }
}

impl GifmergeConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: &str| {
            errors.push(ConfigValidationError { field: field.to_string(), message: message.to_string() });
        };
        let output = &self.output;

        if let Some(size) = output.colormap_size {
            if !(2..=256).contains(&size) {
                push("output.colormap_size", "must be between 2 and 256");
            }
        }
        if output.colormap_fixed.as_ref().is_some_and(Colormap::is_empty) {
            push("output.colormap_fixed", "must contain at least one color");
        }
        if output.screen_width == Some(0) {
            push("output.screen_width", "must be a positive integer");
        }
        if output.screen_height == Some(0) {
            push("output.screen_height", "must be a positive integer");
        }
        match output.scaling {
            Scaling::Scale { x, y } if !(x.is_finite() && x > 0.0 && y.is_finite() && y > 0.0) => {
                push("output.scaling", "scale factors must be positive numbers");
            }
            Scaling::Resize { width: 0, height: 0 } | Scaling::ResizeFit { width: 0, height: 0 } => {
                push("output.scaling", "width and height cannot both be zero");
            }
            _ => {}
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            push("logging.level", "is not a valid log filter");
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
