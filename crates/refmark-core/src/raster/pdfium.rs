//! Page rendering through the PDFium library.

use pdfium_render::prelude::*;
use tracing::{debug, trace};

use super::{PageRasterizer, PageRender};
use crate::error::RenderError;

/// Renders pages with `pdfium-render`, binding the library on each call.
///
/// Looks for the platform library in the working directory first, then in
/// the system library path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer;

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self
    }

    fn bind() -> Result<Pdfium, RenderError> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| RenderError::Unavailable(format!("pdfium: {}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

fn render_page(page: &PdfPage, dpi: u32) -> Result<image::DynamicImage, PdfiumError> {
    let scale = dpi as f32 / 72.0;
    let pixel_width = (page.width().value * scale) as i32;
    let pixel_height = (page.height().value * scale) as i32;

    let bitmap = page.render_with_config(
        &PdfRenderConfig::new()
            .set_target_width(pixel_width)
            .set_target_height(pixel_height)
            .render_form_data(true)
            .render_annotations(true),
    )?;
    Ok(bitmap.as_image())
}

impl PageRasterizer for PdfiumRasterizer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn render_pages(&self, pdf: &[u8], dpi: u32, max_pages: usize) -> Result<Vec<PageRender>, RenderError> {
        let pdfium = Self::bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| RenderError::Open(e.to_string()))?;

        let total = document.pages().len() as usize;
        debug!("Rendering {} of {} page(s) at {} dpi", total.min(max_pages), total, dpi);

        let mut pages = Vec::with_capacity(total.min(max_pages));
        for (index, page) in document.pages().iter().enumerate().take(max_pages) {
            let number = index as u32 + 1;
            let rendered = render_page(&page, dpi).map_err(|e| RenderError::Page {
                page: number,
                reason: e.to_string(),
            });
            trace!("Page {} rendered: {}", number, rendered.is_ok());
            pages.push(rendered);
        }
        Ok(pages)
    }
}
