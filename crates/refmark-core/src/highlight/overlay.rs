//! Translucent rectangles over OCR tokens, composited onto the page bitmap.

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use tracing::trace;

use super::HighlightStyle;
use crate::models::document::{BoundingBox, Highlight, HighlightKind};
use crate::ocr::Token;
use crate::pattern::PatternMatcher;

/// Highlight every token whose comparison fragment occurs in one of `codes`.
///
/// Returns the composited page and one highlight per marked token.
pub fn highlight_tokens(
    image: &DynamicImage,
    tokens: &[Token],
    codes: &[String],
    matcher: &PatternMatcher,
    style: &HighlightStyle,
) -> (DynamicImage, Vec<Highlight>) {
    let (width, height) = image.dimensions();
    let mut layer = RgbaImage::new(width, height);
    let mut highlights = Vec::new();

    for token in tokens {
        let fragment = matcher.token_fragment(&token.text);
        if fragment.is_empty() || !codes.iter().any(|code| code.contains(&fragment)) {
            continue;
        }
        let Some(bbox) = clamp(&token.bbox, width, height) else {
            continue;
        };

        draw_box(&mut layer, &bbox, style);
        trace!("Overlay on token {:?} at {:?}", token.text, bbox);
        highlights.push(Highlight {
            page_index: token.page_index,
            bbox,
            kind: HighlightKind::Overlay,
            style: style.clone(),
        });
    }

    if highlights.is_empty() {
        return (image.clone(), highlights);
    }

    let mut base = image.to_rgba8();
    image::imageops::overlay(&mut base, &layer, 0, 0);
    (DynamicImage::ImageRgba8(base), highlights)
}

/// Integer pixel box inside the image, or `None` if nothing is left.
fn clamp(bbox: &BoundingBox, width: u32, height: u32) -> Option<BoundingBox> {
    let x0 = bbox.x.floor().max(0.0);
    let y0 = bbox.y.floor().max(0.0);
    let x1 = bbox.right().ceil().min(width as f32);
    let y1 = bbox.bottom().ceil().min(height as f32);
    let clamped = BoundingBox::from_corners(x0, y0, x1.max(x0), y1.max(y0));
    (!clamped.is_empty()).then_some(clamped)
}

fn draw_box(layer: &mut RgbaImage, bbox: &BoundingBox, style: &HighlightStyle) {
    let (x, y) = (bbox.x as i32, bbox.y as i32);
    let (w, h) = (bbox.width as u32, bbox.height as u32);

    draw_filled_rect_mut(layer, Rect::at(x, y).of_size(w, h), Rgba(style.fill));

    for t in 0..style.outline_width {
        let inner_w = w.saturating_sub(2 * t);
        let inner_h = h.saturating_sub(2 * t);
        if inner_w > 0 && inner_h > 0 {
            let rect = Rect::at(x + t as i32, y + t as i32).of_size(inner_w, inner_h);
            draw_hollow_rect_mut(layer, rect, Rgba(style.outline));
        }
    }
}
