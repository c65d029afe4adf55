//! Recover the scanned bitmap embedded in each page.

use tracing::debug;

use super::{PageRasterizer, PageRender};
use crate::error::RenderError;
use crate::pdf::PdfExtractor;

/// Pure-Rust rasterizer for scanned PDFs: each page's largest image XObject.
///
/// Vector content and text are not drawn, and the DPI argument is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedImageRasterizer;

impl PageRasterizer for EmbeddedImageRasterizer {
    fn name(&self) -> &'static str {
        "embedded-image"
    }

    fn render_pages(&self, pdf: &[u8], _dpi: u32, max_pages: usize) -> Result<Vec<PageRender>, RenderError> {
        let pdf = PdfExtractor::load(pdf).map_err(|e| RenderError::Open(e.to_string()))?;
        let count = (pdf.page_count() as usize).min(max_pages);

        let pages = (1..=count as u32)
            .map(|page| {
                let images = pdf.extract_images(page).map_err(|e| RenderError::Page {
                    page,
                    reason: e.to_string(),
                })?;
                images
                    .into_iter()
                    .next()
                    .map(|img| img.image)
                    .ok_or_else(|| RenderError::Page {
                        page,
                        reason: "no embedded image".to_string(),
                    })
            })
            .collect::<Vec<_>>();

        debug!(
            "Recovered {} of {} page image(s)",
            pages.iter().filter(|p| p.is_ok()).count(),
            pages.len()
        );
        Ok(pages)
    }
}
