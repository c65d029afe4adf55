//! PDF processing: text layer geometry, highlight annotations and page analysis.

pub mod annotate;
mod extractor;
mod fonts;
mod text_layer;
mod text_pass;

#[cfg(test)]
pub(crate) mod fixtures;

pub use extractor::{ExtractedImage, PdfExtractor};
pub use text_layer::{Glyph, TextLayer};
pub use text_pass::{TextAttempt, TextLayerPass};

use crate::error::PdfError;

/// Type of PDF content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfType {
    /// Contains extractable text.
    Text,
    /// Contains only images (scanned document).
    Image,
    /// Contains both text and images.
    Hybrid,
    /// Empty or unreadable.
    Empty,
}

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;
