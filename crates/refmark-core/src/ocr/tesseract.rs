//! Tesseract word boxes through `leptess`.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView};
use leptess::{LepTess, Variable};
use tracing::{debug, trace};

use super::{OcrBackend, OcrPage, Token};
use crate::error::OcrError;
use crate::models::document::BoundingBox;

/// Fully automatic page segmentation.
const PSM_AUTO: &str = "3";

/// Tesseract handles are not thread-safe, so one is created per page.
pub struct TesseractBackend {
    language: String,
}

impl TesseractBackend {
    /// Check that the language data loads, then keep only its name.
    pub fn new(language: &str) -> Result<Self, OcrError> {
        LepTess::new(None, language)
            .map_err(|e| OcrError::ModelLoad(format!("tesseract ({}): {}", language, e)))?;
        Ok(Self {
            language: language.to_string(),
        })
    }
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<OcrPage, OcrError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidImage(format!("{}x{}", width, height)));
        }

        let mut lt = LepTess::new(None, &self.language)
            .map_err(|e| OcrError::ModelLoad(format!("tesseract: {}", e)))?;
        lt.set_variable(Variable::TesseditPagesegMode, PSM_AUTO)
            .map_err(|e| OcrError::ModelLoad(format!("tesseract PSM: {}", e)))?;

        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;
        lt.set_image_from_mem(png.get_ref())
            .map_err(|e| OcrError::Recognition(format!("tesseract image: {}", e)))?;

        let Some(boxes) = lt.get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_WORD, true) else {
            debug!("tesseract found no words");
            return Ok(OcrPage::from_tokens(Vec::new(), (width, height)));
        };

        let mut tokens = Vec::new();
        for word in &boxes {
            let geom = word.get_geometry();
            lt.set_rectangle(geom.x, geom.y, geom.w, geom.h);

            let text = lt.get_utf8_text().unwrap_or_default().trim().to_string();
            if text.is_empty() {
                continue;
            }
            let confidence = lt.mean_text_conf() as f32 / 100.0;
            trace!("word {:?} at {},{} ({:.2})", text, geom.x, geom.y, confidence);

            tokens.push(Token {
                confidence,
                ..Token::new(
                    text,
                    BoundingBox::new(geom.x as f32, geom.y as f32, geom.w as f32, geom.h as f32),
                )
            });
        }

        debug!("tesseract returned {} words", tokens.len());
        Ok(OcrPage::from_tokens(tokens, (width, height)))
    }
}
