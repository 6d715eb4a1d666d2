//! Data model for decoded GIF streams
//!
//! Images and streams are shared between frame descriptors and their
//! decoded source through `Rc<RefCell<_>>` handles, so the strong count of a
//! handle is the number of owners.

mod image;
mod stream;

pub use self::image::{CompressedData, Disposal, Image, ImageRef};
pub use self::stream::{Extension, Stream, StreamRef};
