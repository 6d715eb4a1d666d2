//! Choosing the output background index

use super::palette::DestPalette;
use crate::color::Color;
use crate::diagnostics::{DiagnosticKind, Diagnostics, MergeContext};
use crate::models::{Disposal, Stream};

/// What a frame's source stream implies about the background it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundHint {
    /// No opinion
    #[default]
    None,
    /// The source's first image is transparent
    Transparent,
    /// The source's global colormap has this color at its background index
    Color(Color),
}

/// Explicit background requested by the output policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum BackgroundSpec {
    /// Raw palette index, used as is
    Index(u8),
    /// Color searched for in the final palette
    Color(Color),
}

/// Set `stream.background`.
///
/// `hints` holds one entry per output image. Only frames that dispose to
/// the background, plus a first frame that leaves part of the screen
/// uncovered, express a requirement. When their requirements disagree the
/// first color wins and a conflict warning is recorded.
///
/// A background color missing from `palette` is appended when there is
/// room; otherwise an error is recorded and index 0 is used.
pub fn resolve_background(
    stream: &mut Stream,
    palette: &mut DestPalette,
    hints: &[BackgroundHint],
    requested: Option<BackgroundSpec>,
    diagnostics: &mut Diagnostics,
    ctx: &MergeContext,
) {
    let first_transparent =
        stream.images.first().is_some_and(|image| image.borrow().transparent.is_some());

    let color = match requested {
        Some(BackgroundSpec::Index(index)) => {
            stream.background = index;
            return;
        }
        Some(BackgroundSpec::Color(color)) => {
            if first_transparent {
                diagnostics.warn(
                    ctx,
                    DiagnosticKind::IrrelevantBackground,
                    "background color ignored because the first frame is transparent",
                );
            }
            color
        }
        None => match required_background(stream, hints, diagnostics, ctx) {
            Some(color) => color,
            None => {
                stream.background = 0;
                return;
            }
        },
    };

    stream.background = match palette.find(color).or_else(|| palette.push(color)) {
        Some(index) => index,
        None => {
            diagnostics.error(
                ctx,
                DiagnosticKind::ColorNotInColormap,
                format!("background color {} not in colormap", color),
            );
            0
        }
    };
}

/// The background color implied by frames that reveal the background.
fn required_background(
    stream: &Stream,
    hints: &[BackgroundHint],
    diagnostics: &mut Diagnostics,
    ctx: &MergeContext,
) -> Option<Color> {
    let mut background = None;
    let mut want_transparent = false;
    let mut conflict = false;

    for (j, (image, hint)) in stream.images.iter().zip(hints).enumerate() {
        let image = image.borrow();
        let reveals = image.disposal == Disposal::Background
            || (j == 0 && !image.covers_screen(stream.screen_width, stream.screen_height));
        if !reveals {
            continue;
        }
        match *hint {
            BackgroundHint::Transparent => {
                if background.is_some() {
                    conflict = true;
                }
                want_transparent = true;
            }
            _ if want_transparent => conflict = true,
            BackgroundHint::Color(color) => match background {
                Some(existing) if existing != color => conflict = true,
                Some(_) => {}
                None => background = Some(color),
            },
            BackgroundHint::None => {}
        }
    }

    let first_opaque = stream.images.first().is_some_and(|image| image.borrow().transparent.is_none());
    if conflict || (want_transparent && first_opaque) {
        diagnostics.warn(
            ctx,
            DiagnosticKind::BackgroundConflict,
            "input images have conflicting background colors\n  (This means some animation frames may appear incorrect.)",
        );
    }
    background
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Image;

    const RED: Color = Color::new(255, 0, 0);
    const BLUE: Color = Color::new(0, 0, 255);

    fn stream(images: Vec<Image>, sw: u32, sh: u32) -> Stream {
        let mut stream = Stream::new();
        for image in images {
            stream.add_image(image);
        }
        stream.screen_width = sw;
        stream.screen_height = sh;
        stream
    }

    fn disposing(w: u32, h: u32) -> Image {
        let mut img = Image::filled(w, h, 0);
        img.disposal = Disposal::Background;
        img
    }

    fn resolve(stream: &mut Stream, palette: &mut DestPalette, hints: &[BackgroundHint], requested: Option<BackgroundSpec>) -> Diagnostics {
        let mut diags = Diagnostics::new();
        resolve_background(stream, palette, hints, requested, &mut diags, &MergeContext::default());
        diags
    }

    #[test]
    fn test_no_requirement_defaults_to_zero() {
        let mut s = stream(vec![Image::filled(4, 4, 0)], 4, 4);
        s.background = 9;
        let mut palette = DestPalette::from_colormap(&crate::color::Colormap::from_colors([BLUE]));
        let diags = resolve(&mut s, &mut palette, &[BackgroundHint::Color(RED)], None);
        assert_eq!(s.background, 0);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_partial_first_frame_uses_source_background() {
        let mut s = stream(vec![disposing(2, 2)], 4, 4);
        let mut palette = DestPalette::from_colormap(&crate::color::Colormap::from_colors([BLUE, RED]));
        let diags = resolve(&mut s, &mut palette, &[BackgroundHint::Color(RED)], None);
        assert_eq!(s.background, 1);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_missing_background_color_is_appended() {
        let mut s = stream(vec![disposing(2, 2)], 4, 4);
        let mut palette = DestPalette::from_colormap(&crate::color::Colormap::from_colors([BLUE]));
        resolve(&mut s, &mut palette, &[BackgroundHint::Color(RED)], None);
        assert_eq!(s.background, 1);
        assert_eq!(palette.get(1), Some(RED));
    }

    #[test]
    fn test_conflicting_colors_keep_first() {
        let mut s = stream(vec![disposing(4, 4), disposing(4, 4)], 4, 4);
        let mut palette = DestPalette::from_colormap(&crate::color::Colormap::from_colors([RED, BLUE]));
        let diags = resolve(&mut s, &mut palette, &[BackgroundHint::Color(BLUE), BackgroundHint::Color(RED)], None);
        assert_eq!(s.background, 1);
        assert_eq!(diags.count(DiagnosticKind::BackgroundConflict), 1);
    }

    #[test]
    fn test_transparent_then_color_conflicts() {
        let mut first = disposing(4, 4);
        first.transparent = Some(0);
        let mut s = stream(vec![first, disposing(4, 4)], 4, 4);
        let mut palette = DestPalette::new();
        let diags = resolve(&mut s, &mut palette, &[BackgroundHint::Transparent, BackgroundHint::Color(RED)], None);
        assert!(diags.has(DiagnosticKind::BackgroundConflict));
        assert_eq!(s.background, 0);
    }

    #[test]
    fn test_want_transparent_with_opaque_first_frame_warns() {
        let mut s = stream(vec![Image::filled(4, 4, 0), disposing(4, 4)], 4, 4);
        let mut palette = DestPalette::new();
        let diags = resolve(&mut s, &mut palette, &[BackgroundHint::None, BackgroundHint::Transparent], None);
        assert!(diags.has(DiagnosticKind::BackgroundConflict));
    }

    #[test]
    fn test_requested_index_wins() {
        let mut s = stream(vec![disposing(2, 2)], 4, 4);
        let mut palette = DestPalette::new();
        let diags = resolve(&mut s, &mut palette, &[BackgroundHint::Color(RED)], Some(BackgroundSpec::Index(7)));
        assert_eq!(s.background, 7);
        assert!(diags.is_empty());
        assert!(palette.is_empty());
    }

    #[test]
    fn test_requested_color_on_transparent_first_frame_warns() {
        let mut first = Image::filled(4, 4, 0);
        first.transparent = Some(0);
        let mut s = stream(vec![first], 4, 4);
        let mut palette = DestPalette::from_colormap(&crate::color::Colormap::from_colors([BLUE, RED]));
        let diags = resolve(&mut s, &mut palette, &[BackgroundHint::None], Some(BackgroundSpec::Color(RED)));
        assert!(diags.has(DiagnosticKind::IrrelevantBackground));
        assert_eq!(s.background, 1);
    }

    #[test]
    fn test_full_palette_without_color_errors() {
        let mut s = stream(vec![disposing(2, 2)], 4, 4);
        let mut palette = DestPalette::from_colormap(&crate::color::Colormap::from_colors(
            (0..=255u8).map(|i| Color::new(i, i, 0)),
        ));
        let diags = resolve(&mut s, &mut palette, &[BackgroundHint::Color(RED)], None);
        assert_eq!(s.background, 0);
        assert!(diags.has(DiagnosticKind::ColorNotInColormap));
    }

    #[test]
    fn test_background_spec_deserializes() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            background: BackgroundSpec,
        }
        let w: Wrapper = toml::from_str("background = 3").unwrap();
        assert_eq!(w.background, BackgroundSpec::Index(3));
        let w: Wrapper = toml::from_str("background = \"#ff0000\"").unwrap();
        assert_eq!(w.background, BackgroundSpec::Color(RED));
    }
}
