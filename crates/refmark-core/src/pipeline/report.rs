use std::fmt;

use serde::Serialize;

use crate::models::document::{Code, Highlight, PageReport};

/// States the pipeline moves through; each transition is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ClassifyInput,
    TextAttempt,
    OcrAttempt,
    RasterFallback,
    Aggregate,
    Done,
    NotFound,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::ClassifyInput => "classify-input",
            Stage::TextAttempt => "text-attempt",
            Stage::OcrAttempt => "ocr-attempt",
            Stage::RasterFallback => "raster-fallback",
            Stage::Aggregate => "aggregate",
            Stage::Done => "done",
            Stage::NotFound => "not-found",
        };
        f.write_str(name)
    }
}

/// Which path produced the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathTaken {
    TextLayer,
    Ocr,
}

/// A successful run.
#[derive(Debug, Clone, Serialize)]
pub struct HighlightReport {
    /// The output PDF.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    pub path: PathTaken,
    pub codes: Vec<Code>,
    pub highlights: Vec<Highlight>,
    pub pages: Vec<PageReport>,
    pub elapsed_ms: u64,
}

impl HighlightReport {
    /// Distinct code values in first-seen order.
    pub fn code_values(&self) -> Vec<&str> {
        let mut values: Vec<&str> = Vec::new();
        for code in &self.codes {
            if !values.contains(&code.value.as_str()) {
                values.push(&code.value);
            }
        }
        values
    }
}

/// Result of [`Pipeline::run`](super::Pipeline::run).
#[derive(Debug, Clone)]
pub enum Outcome {
    Highlighted(HighlightReport),
    /// Nothing matched; no document is produced.
    NotFound { message: String },
}
