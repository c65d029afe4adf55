//! Request-scoped document types: input classification, geometry, codes and highlights.

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::highlight::HighlightStyle;

/// Raster formats accepted as direct input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
}

/// What kind of document a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// A PDF, digital or scanned.
    Pdf,
    /// A single raster image.
    Image(ImageKind),
}

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct InputDocument {
    /// Original file name, if known.
    pub name: Option<String>,
    /// Raw file content.
    pub data: Vec<u8>,
    /// Detected kind.
    pub kind: InputKind,
}

impl InputDocument {
    /// Classify raw bytes. Content sniffing wins over the file extension.
    pub fn from_bytes(name: Option<&str>, data: Vec<u8>) -> Result<Self, InputError> {
        if data.is_empty() {
            return Err(InputError::Empty);
        }

        let kind = sniff_kind(&data)
            .or_else(|| name.and_then(kind_from_extension))
            .ok_or_else(|| {
                let ext = name
                    .and_then(extension_of)
                    .unwrap_or_else(|| "unknown".to_string());
                InputError::UnsupportedType(ext)
            })?;

        Ok(Self {
            name: name.map(str::to_string),
            data,
            kind,
        })
    }

    /// Read a file from disk and classify it.
    pub fn open(path: &std::path::Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(InputError::MissingFile.into());
        }
        let data = std::fs::read(path)?;
        let name = path.file_name().and_then(|n| n.to_str());
        Ok(Self::from_bytes(name, data)?)
    }
}

fn sniff_kind(data: &[u8]) -> Option<InputKind> {
    // Some producers emit junk before the header; readers accept it within the first KiB.
    let head = &data[..data.len().min(1024)];
    if head.windows(5).any(|w| w == b"%PDF-") {
        return Some(InputKind::Pdf);
    }
    match image::guess_format(data).ok()? {
        image::ImageFormat::Png => Some(InputKind::Image(ImageKind::Png)),
        image::ImageFormat::Jpeg => Some(InputKind::Image(ImageKind::Jpeg)),
        _ => None,
    }
}

fn extension_of(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn kind_from_extension(name: &str) -> Option<InputKind> {
    match extension_of(name)?.as_str() {
        "pdf" => Some(InputKind::Pdf),
        "png" => Some(InputKind::Image(ImageKind::Png)),
        "jpg" | "jpeg" => Some(InputKind::Image(ImageKind::Jpeg)),
        _ => None,
    }
}

/// Axis-aligned rectangle.
///
/// Text-layer boxes are in PDF points with a bottom-left origin, OCR boxes in
/// image pixels with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from two corners in any order.
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// An extracted code with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    /// Normalized value (no whitespace).
    pub value: String,
    /// Zero-based page index the code was found on.
    pub page_index: usize,
    /// Where the code was located on the page; empty if it could not be placed.
    pub boxes: Vec<BoundingBox>,
}

impl Code {
    pub fn new(value: impl Into<String>, page_index: usize) -> Self {
        Self {
            value: value.into(),
            page_index,
            boxes: Vec::new(),
        }
    }
}

/// How a highlight was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightKind {
    /// Native PDF `/Highlight` annotation.
    Annotation,
    /// Rectangle drawn onto a page bitmap.
    Overlay,
}

/// A visual marking of a located code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub page_index: usize,
    pub bbox: BoundingBox,
    pub kind: HighlightKind,
    pub style: HighlightStyle,
}

/// How a page ended up in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    /// Highlighted through its embedded text.
    TextLayer,
    /// Recognized and overlaid.
    Ocr,
    /// Rasterized but left unmodified (no match or page failure).
    Passthrough,
    /// Not present in the output.
    Skipped,
}

/// Per-page outcome summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub index: usize,
    pub source: PageSource,
    pub codes: usize,
    pub highlights: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_pdf_overrides_extension() {
        let doc = InputDocument::from_bytes(Some("scan.png"), b"%PDF-1.7\n...".to_vec()).unwrap();
        assert_eq!(doc.kind, InputKind::Pdf);
    }

    #[test]
    fn test_sniff_png() {
        let mut data = Vec::new();
        image::DynamicImage::new_rgb8(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        let doc = InputDocument::from_bytes(None, data).unwrap();
        assert_eq!(doc.kind, InputKind::Image(ImageKind::Png));
    }

    #[test]
    fn test_unknown_content_falls_back_to_extension() {
        let doc = InputDocument::from_bytes(Some("Broken.PDF"), b"garbage".to_vec()).unwrap();
        assert_eq!(doc.kind, InputKind::Pdf);
    }

    #[test]
    fn test_unsupported_type() {
        let err = InputDocument::from_bytes(Some("notes.txt"), b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, InputError::UnsupportedType(ref ext) if ext == "txt"));
    }

    #[test]
    fn test_empty_input() {
        let err = InputDocument::from_bytes(Some("a.pdf"), Vec::new()).unwrap_err();
        assert!(matches!(err, InputError::Empty));
    }

    #[test]
    fn test_bbox_union() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 5.0);
        let b = BoundingBox::new(8.0, 2.0, 4.0, 10.0);
        assert_eq!(a.union(&b), BoundingBox::new(0.0, 0.0, 12.0, 12.0));
    }
}
