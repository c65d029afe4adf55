//! Page rasterization for the OCR path.

mod embedded;
#[cfg(feature = "pdfium")]
mod pdfium;

pub use embedded::EmbeddedImageRasterizer;
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use crate::error::RenderError;

/// One rendered page, or why it could not be rendered.
pub type PageRender = std::result::Result<DynamicImage, RenderError>;

/// Turns PDF pages into bitmaps.
pub trait PageRasterizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render up to `max_pages` pages in page order.
    ///
    /// The outer error means the document could not be rendered at all.
    fn render_pages(&self, pdf: &[u8], dpi: u32, max_pages: usize) -> Result<Vec<PageRender>, RenderError>;
}

/// Tries each rasterizer in turn until one renders at least one page.
pub struct ChainRasterizer {
    rasterizers: Vec<Box<dyn PageRasterizer>>,
}

impl ChainRasterizer {
    pub fn new(rasterizers: Vec<Box<dyn PageRasterizer>>) -> Self {
        Self { rasterizers }
    }
}

impl PageRasterizer for ChainRasterizer {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn render_pages(&self, pdf: &[u8], dpi: u32, max_pages: usize) -> Result<Vec<PageRender>, RenderError> {
        let mut last = Err(RenderError::Unavailable("no rasterizer configured".to_string()));
        for rasterizer in &self.rasterizers {
            match rasterizer.render_pages(pdf, dpi, max_pages) {
                Ok(pages) if pages.iter().any(|p| p.is_ok()) => {
                    debug!("Rendered with {}", rasterizer.name());
                    return Ok(pages);
                }
                Ok(pages) => {
                    debug!("{} rendered no page", rasterizer.name());
                    last = Ok(pages);
                }
                Err(e) => {
                    warn!("{} unavailable: {}", rasterizer.name(), e);
                    last = Err(e);
                }
            }
        }
        last
    }
}

/// The best rasterizer this build offers.
pub fn default_rasterizer() -> Box<dyn PageRasterizer> {
    #[cfg(feature = "pdfium")]
    {
        Box::new(ChainRasterizer::new(vec![
            Box::new(PdfiumRasterizer::new()),
            Box::new(EmbeddedImageRasterizer),
        ]))
    }
    #[cfg(not(feature = "pdfium"))]
    {
        Box::new(EmbeddedImageRasterizer)
    }
}

/// Downscale so the longer side is at most `max_dimension` (0 = unbounded).
pub fn bound_dimensions(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if max_dimension == 0 || width.max(height) <= max_dimension {
        return image;
    }
    debug!("Downscaling {}x{} to fit {}", width, height, max_dimension);
    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}
