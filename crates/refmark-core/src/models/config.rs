//! Configuration structures for the highlighting pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::highlight::HighlightStyle;
use crate::pattern::PatternConfig;

/// Main configuration for the refmark pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefmarkConfig {
    /// Code extraction rule.
    pub pattern: PatternConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Visual style of highlights.
    pub highlight: HighlightStyle,

    /// Model configuration.
    pub models: ModelConfig,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for rendering PDF pages to images.
    pub render_dpi: u32,

    /// Maximum pages to rasterize on the OCR path.
    pub max_pages: usize,

    /// Longest allowed side of a page bitmap; larger bitmaps are downscaled.
    pub max_image_dimension: u32,

    /// Try the embedded text layer before falling back to OCR.
    pub prefer_text_layer: bool,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 200,
            max_pages: 50,
            max_image_dimension: 4000,
            prefer_text_layer: true,
        }
    }
}

/// OCR backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendKind {
    /// PaddleOCR ONNX models via `pure-onnx-ocr`.
    Pure,
    /// Tesseract via `leptess`.
    Tesseract,
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Which engine recognizes rasterized pages.
    pub backend: OcrBackendKind,

    /// Tesseract language code.
    pub language: String,

    /// Seconds allowed for recognizing a single page (0 = unlimited).
    pub page_timeout_secs: u64,

    /// Keep `[UNK]` markers emitted by the recognizer.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::Pure,
            language: "eng".to_string(),
            page_timeout_secs: 60,
            keep_unk: false,
        }
    }
}

/// Model file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
        }
    }
}

impl RefmarkConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Get full path to a model file.
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.models.model_dir.join(model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RefmarkConfig =
            serde_json::from_str(r#"{"pattern": {"marker": "Code:"}, "pdf": {"render_dpi": 300}}"#)
                .unwrap();
        assert_eq!(config.pattern.marker, "Code:");
        assert_eq!(config.pattern.terminator, "/");
        assert_eq!(config.pdf.render_dpi, 300);
        assert_eq!(config.pdf.max_pages, 50);
        assert_eq!(config.ocr.backend, OcrBackendKind::Pure);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = RefmarkConfig::default();
        config.ocr.backend = OcrBackendKind::Tesseract;
        config.save(&path).unwrap();

        let loaded = RefmarkConfig::from_file(&path).unwrap();
        assert_eq!(loaded.ocr.backend, OcrBackendKind::Tesseract);
        assert_eq!(loaded.models.detection_model, "det.onnx");
    }

    #[test]
    fn test_model_path() {
        let config = RefmarkConfig::default();
        assert_eq!(
            config.model_path("det.onnx"),
            PathBuf::from("models").join("det.onnx")
        );
    }
}
