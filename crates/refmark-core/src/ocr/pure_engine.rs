//! PaddleOCR ONNX models through `pure-onnx-ocr` (pure Rust, no external runtime).

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use super::{split_line, OcrBackend, OcrPage};
use crate::error::OcrError;
use crate::models::config::ModelConfig;
use crate::models::document::BoundingBox;

pub struct PureOcrBackend {
    engine: Mutex<pure_onnx_ocr::engine::OcrEngine>,
    keep_unk: bool,
}

impl PureOcrBackend {
    /// Load detection, recognition and dictionary files named by `models`.
    pub fn from_config(models: &ModelConfig, keep_unk: bool) -> Result<Self, OcrError> {
        Self::from_dir(&models.model_dir, models, keep_unk)
    }

    pub fn from_dir(model_dir: &Path, models: &ModelConfig, keep_unk: bool) -> Result<Self, OcrError> {
        let det_path = model_dir.join(&models.detection_model);
        let rec_path = model_dir.join(&models.recognition_model);
        let dict_path = model_dir.join(&models.dictionary);

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "missing model file {} (run `refmark models download`)",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());

        Ok(Self {
            engine: Mutex::new(engine),
            keep_unk,
        })
    }
}

impl OcrBackend for PureOcrBackend {
    fn name(&self) -> &'static str {
        "pure-onnx-ocr"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<OcrPage, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidImage(format!("{}x{}", width, height)));
        }

        let results = {
            let engine = self
                .engine
                .lock()
                .map_err(|_| OcrError::Recognition("engine lock poisoned".to_string()))?;
            engine
                .run_from_image(image)
                .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?
        };

        debug!("pure-onnx-ocr returned {} text regions", results.len());

        let tokens = results
            .iter()
            .flat_map(|r| {
                let text = if self.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                };
                split_line(&text, polygon_to_bbox(&r.bounding_box), r.confidence)
            })
            .collect();

        let page = OcrPage::from_tokens(tokens, (width, height));
        info!(
            "OCR complete: {} tokens in {}ms",
            page.tokens.len(),
            start.elapsed().as_millis()
        );
        Ok(page)
    }
}

/// Axis-aligned hull of a detection polygon.
fn polygon_to_bbox(polygon: &pure_onnx_ocr::Polygon<f64>) -> BoundingBox {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for coord in polygon.exterior().coords() {
        min_x = min_x.min(coord.x);
        min_y = min_y.min(coord.y);
        max_x = max_x.max(coord.x);
        max_y = max_y.max(coord.y);
    }
    if !min_x.is_finite() {
        return BoundingBox::default();
    }
    BoundingBox::from_corners(min_x as f32, min_y as f32, max_x as f32, max_y as f32)
}
