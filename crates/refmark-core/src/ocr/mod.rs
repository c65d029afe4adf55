//! OCR backends producing text plus word-level token geometry.

#[cfg(feature = "native")]
mod pure_engine;
#[cfg(feature = "tesseract")]
mod tesseract;

#[cfg(feature = "native")]
pub use pure_engine::PureOcrBackend;
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractBackend;

use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{OcrError, RefmarkError};
#[cfg(any(feature = "native", feature = "tesseract"))]
use crate::models::config::OcrBackendKind;
use crate::models::config::RefmarkConfig;
use crate::models::document::BoundingBox;

/// Height of a reading-order row in pixels.
pub const ROW_HEIGHT: f32 = 20.0;

/// A recognized word with its box in image pixels (top-left origin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub bbox: BoundingBox,
    pub page_index: usize,
    /// Recognition confidence in `0.0..=1.0`.
    pub confidence: f32,
}

impl Token {
    pub fn new(text: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            text: text.into(),
            bbox,
            page_index: 0,
            confidence: 1.0,
        }
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Recognition result for one image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrPage {
    /// Tokens joined by spaces within a row and newlines between rows.
    pub text: String,
    /// Tokens in reading order.
    pub tokens: Vec<Token>,
    /// (width, height) of the recognized image.
    pub image_size: (u32, u32),
}

impl OcrPage {
    /// Sort tokens into reading order and derive the page text from them.
    pub fn from_tokens(mut tokens: Vec<Token>, image_size: (u32, u32)) -> Self {
        sort_reading_order(&mut tokens);

        let mut text = String::new();
        let mut last_row = None;
        for token in &tokens {
            let row = row_of(token);
            match last_row {
                Some(r) if r == row => text.push(' '),
                Some(_) => text.push('\n'),
                None => {}
            }
            text.push_str(&token.text);
            last_row = Some(row);
        }

        Self {
            text,
            tokens,
            image_size,
        }
    }

    pub fn with_page_index(mut self, page_index: usize) -> Self {
        for token in &mut self.tokens {
            token.page_index = page_index;
        }
        self
    }
}

fn row_of(token: &Token) -> i32 {
    (token.bbox.y / ROW_HEIGHT) as i32
}

/// Stable sort by 20 px rows, then left to right.
pub fn sort_reading_order(tokens: &mut [Token]) {
    tokens.sort_by(|a, b| {
        row_of(a)
            .cmp(&row_of(b))
            .then(a.bbox.x.partial_cmp(&b.bbox.x).unwrap_or(std::cmp::Ordering::Equal))
    });
}

/// Recognizes text and word boxes on a raster page.
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn recognize(&self, image: &DynamicImage) -> Result<OcrPage, OcrError>;
}

/// Split a recognized line into word tokens, sharing the line width by character count.
pub fn split_line(text: &str, line: BoundingBox, confidence: f32) -> Vec<Token> {
    let total = text.chars().count();
    if total == 0 {
        return Vec::new();
    }
    let char_width = line.width / total as f32;

    let mut tokens = Vec::new();
    let mut offset = 0usize;
    for word in text.split(' ') {
        let len = word.chars().count();
        if !word.trim().is_empty() {
            let bbox = BoundingBox::new(
                line.x + offset as f32 * char_width,
                line.y,
                len as f32 * char_width,
                line.height,
            );
            tokens.push(Token {
                confidence,
                ..Token::new(word.trim(), bbox)
            });
        }
        offset += len + 1;
    }
    tokens
}

/// Build the backend selected by the configuration.
pub fn backend_from_config(config: &RefmarkConfig) -> crate::Result<Arc<dyn OcrBackend>> {
    match config.ocr.backend {
        #[cfg(feature = "native")]
        OcrBackendKind::Pure => Ok(Arc::new(PureOcrBackend::from_config(
            &config.models,
            config.ocr.keep_unk,
        )?)),
        #[cfg(feature = "tesseract")]
        OcrBackendKind::Tesseract => Ok(Arc::new(TesseractBackend::new(&config.ocr.language)?)),
        #[allow(unreachable_patterns)]
        other => Err(RefmarkError::Config(format!(
            "OCR backend {:?} is not compiled into this build",
            other
        ))),
    }
}
