//! A GIF stream: logical screen, global colormap and an ordered image list

use std::cell::RefCell;
use std::rc::Rc;

use super::image::{Image, ImageRef};
use crate::color::Colormap;

/// Shared, reference-counted handle to a [`Stream`].
pub type StreamRef = Rc<RefCell<Stream>>;

/// An extension block carried through a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Extension label (e.g. `0xFF` for application extensions)
    pub kind: u8,
    /// Application identifier for application extensions
    pub application: Option<String>,
    pub data: Vec<u8>,
    /// Index of the image this extension precedes
    pub position: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Stream {
    pub global: Option<Rc<Colormap>>,
    pub images: Vec<ImageRef>,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Background palette index
    pub background: u8,
    /// `None` writes no looping extension; `Some(0)` loops forever
    pub loop_count: Option<u16>,
    pub extensions: Vec<Extension>,
    pub comments: Vec<String>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(global: Colormap) -> Self {
        Self { global: Some(Rc::new(global)), ..Default::default() }
    }

    pub fn into_ref(self) -> StreamRef {
        Rc::new(RefCell::new(self))
    }

    /// Append an image, returning the shared handle the stream now owns.
    pub fn add_image(&mut self, image: Image) -> ImageRef {
        let image = image.into_ref();
        self.images.push(Rc::clone(&image));
        image
    }

    /// Position of `image` within this stream, compared by identity.
    pub fn position_of(&self, image: &ImageRef) -> Option<usize> {
        self.images.iter().position(|i| Rc::ptr_eq(i, image))
    }

    /// The colormap `image` is drawn with: its local map, else the global one.
    pub fn colormap_for(&self, image: &Image) -> Option<Rc<Colormap>> {
        image.local.clone().or_else(|| self.global.clone())
    }

    /// Grow the logical screen to cover every image.
    ///
    /// With `force`, the screen is set to exactly the covering size.
    pub fn calculate_screen_size(&mut self, force: bool) {
        let mut width = 0;
        let mut height = 0;
        for image in &self.images {
            let image = image.borrow();
            width = width.max(image.right());
            height = height.max(image.bottom());
        }
        if force || self.screen_width < width {
            self.screen_width = width;
        }
        if force || self.screen_height < height {
            self.screen_height = height;
        }
    }
}
