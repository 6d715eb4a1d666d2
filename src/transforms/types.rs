//! Core transform types and error definitions

use serde::{Deserialize, Serialize};

use crate::codec::CodecError;

/// Errors that can occur while configuring or applying a transform
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransformError {
    /// Invalid rotation degrees (must be 0, 90, 180, or 270)
    #[error("invalid rotation degrees: {0} (must be 0, 90, 180, or 270)")]
    InvalidRotation(u16),

    /// Scale factor that is not a positive finite number
    #[error("invalid scale factor: {0}")]
    InvalidScale(f64),

    /// Resize target of zero in both dimensions
    #[error("invalid resize target {0}x{1}")]
    InvalidResize(u32, u32),

    /// An image could not be decoded for a pixel transform
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Mirror axis for [`flip_image`](super::flip_image).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Mirror left to right
    Horizontal,
    /// Mirror top to bottom
    Vertical,
}

/// Clockwise rotation applied to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn from_degrees(degrees: u16) -> Result<Self, TransformError> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Rotate90),
            180 => Ok(Rotation::Rotate180),
            270 => Ok(Rotation::Rotate270),
            _ => Err(TransformError::InvalidRotation(degrees)),
        }
    }

    /// Whether the rotation exchanges width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

/// Post-merge resizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Scaling {
    #[default]
    None,
    /// Resize the screen to exactly `width`x`height`; a zero dimension
    /// keeps the aspect ratio
    Resize { width: u32, height: u32 },
    /// Shrink to fit inside `width`x`height`, keeping the aspect ratio
    ResizeFit { width: u32, height: u32 },
    /// Multiply dimensions by the given factors
    Scale { x: f64, y: f64 },
}

impl Scaling {
    pub fn is_active(&self) -> bool {
        !matches!(self, Scaling::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(90).unwrap(), Rotation::Rotate90);
        assert_eq!(Rotation::from_degrees(0).unwrap(), Rotation::None);
        assert!(matches!(Rotation::from_degrees(45), Err(TransformError::InvalidRotation(45))));
    }

    #[test]
    fn test_swaps_dimensions() {
        assert!(Rotation::Rotate90.swaps_dimensions());
        assert!(Rotation::Rotate270.swaps_dimensions());
        assert!(!Rotation::Rotate180.swaps_dimensions());
        assert!(!Rotation::None.swaps_dimensions());
    }

    #[test]
    fn test_scaling_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            scaling: Scaling,
        }
        let w: Wrapper = toml::from_str("scaling = { mode = \"resize-fit\", width = 64, height = 32 }").unwrap();
        assert_eq!(w.scaling, Scaling::ResizeFit { width: 64, height: 32 });
        let w: Wrapper = toml::from_str("scaling = { mode = \"scale\", x = 2.0, y = 0.5 }").unwrap();
        assert_eq!(w.scaling, Scaling::Scale { x: 2.0, y: 0.5 });
    }
}
