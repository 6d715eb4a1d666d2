//! Geometric transforms for merged frames
//!
//! # Module Structure
//!
//! - [`types`] - Rotation, axis and scaling types plus `TransformError`
//! - [`apply`] - Flips and rotations of index matrices within a screen
//! - [`color`] - Palette color substitution
//! - [`scale`] - Nearest-neighbour scaling and resizing of whole streams

pub mod apply;
pub mod color;
pub mod scale;
pub mod types;

pub use apply::{flip_image, rotate_image};
pub use color::{apply_color_changes, change_colormap, ColorChange};
pub use scale::{apply_scaling, resize_nearest, resize_stream, scale_image, scale_stream};
pub use types::{Axis, Rotation, Scaling, TransformError};

/// Result type alias for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;
