//! Core library for highlighting labelled reference codes in documents.
//!
//! This crate provides:
//! - Code extraction from running text and OCR token streams
//! - Text-layer location of codes in PDFs with native highlight annotations
//! - Page rasterization and OCR (PaddleOCR ONNX models or Tesseract)
//! - Overlay highlighting of OCR tokens and reassembly into a single PDF

pub mod assemble;
pub mod error;
pub mod highlight;
pub mod models;
pub mod ocr;
pub mod pattern;
pub mod pdf;
pub mod pipeline;
pub mod raster;

pub use error::{RefmarkError, Result};
pub use highlight::HighlightStyle;
pub use models::config::RefmarkConfig;
pub use models::document::{BoundingBox, Code, Highlight, InputDocument, InputKind};
pub use ocr::{OcrBackend, OcrPage, Token};
pub use pattern::{PatternConfig, PatternMatcher};
pub use pipeline::{HighlightReport, Outcome, PathTaken, Pipeline};
pub use raster::{EmbeddedImageRasterizer, PageRasterizer};

#[cfg(feature = "native")]
pub use ocr::PureOcrBackend;
#[cfg(feature = "tesseract")]
pub use ocr::TesseractBackend;
#[cfg(feature = "pdfium")]
pub use raster::PdfiumRasterizer;
