//! Error types for the refmark-core library.

use thiserror::Error;

/// Main error type for the refmark library.
#[derive(Error, Debug)]
pub enum RefmarkError {
    /// The request itself is unusable (missing or unsupported input).
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Page rasterization error.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Temporary artifact could not be created or removed.
    #[error("scratch error: {0}")]
    Scratch(#[from] ScratchError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised before the pipeline runs.
#[derive(Error, Debug)]
pub enum InputError {
    /// No file was supplied.
    #[error("no input file supplied")]
    MissingFile,

    /// The supplied file has no content.
    #[error("input file is empty")]
    Empty,

    /// The file is neither a PDF nor a supported raster image.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to interpret a page's content stream.
    #[error("failed to read text layer on page {page}: {reason}")]
    TextLayer { page: u32, reason: String },

    /// Failed to add an annotation.
    #[error("failed to annotate page {page}: {reason}")]
    Annotate { page: u32, reason: String },

    /// Failed to write the PDF.
    #[error("failed to save PDF: {0}")]
    Save(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models or initialize the engine.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The input needs OCR but no backend is available.
    #[error("OCR unavailable: {0}")]
    Unavailable(String),

    /// Recognition did not finish within the page budget.
    #[error("recognition timed out after {0}s")]
    Timeout(u64),
}

/// Errors related to page rasterization.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The rendering library could not be loaded.
    #[error("renderer unavailable: {0}")]
    Unavailable(String),

    /// The document could not be opened for rendering.
    #[error("failed to open document: {0}")]
    Open(String),

    /// A page could not be turned into a bitmap.
    #[error("failed to render page {page}: {reason}")]
    Page { page: u32, reason: String },
}

/// Errors related to temporary artifacts.
#[derive(Error, Debug)]
pub enum ScratchError {
    /// Creating the scratch directory or a file in it failed.
    #[error("failed to create scratch artifact: {0}")]
    Create(std::io::Error),

    /// Writing an artifact failed.
    #[error("failed to write scratch artifact {path}: {reason}")]
    Write { path: String, reason: String },

    /// Reading an artifact back failed.
    #[error("failed to read scratch artifact {path}: {reason}")]
    Read { path: String, reason: String },

    /// Removing the scratch directory failed.
    #[error("failed to remove scratch directory: {0}")]
    Remove(std::io::Error),
}

/// Result type for the refmark library.
pub type Result<T> = std::result::Result<T, RefmarkError>;
