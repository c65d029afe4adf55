//! Orchestration: text layer first, OCR over rendered pages as the fallback.

mod report;

pub use report::{HighlightReport, Outcome, PathTaken, Stage};

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::assemble::ScratchSpace;
use crate::error::{OcrError, RefmarkError};
use crate::highlight::highlight_tokens;
use crate::models::config::RefmarkConfig;
use crate::models::document::{Code, Highlight, InputDocument, InputKind, PageReport, PageSource};
use crate::ocr::{backend_from_config, OcrBackend, OcrPage};
use crate::pattern::{merge_codes, PatternMatcher};
use crate::pdf::{PdfExtractor, PdfType, TextLayerPass};
use crate::raster::{bound_dimensions, default_rasterizer, PageRasterizer, PageRender};
use crate::Result;

const NOT_FOUND_MESSAGE: &str = "no codes matching the pattern were found";

/// Highlighting pipeline for one request.
pub struct Pipeline {
    config: RefmarkConfig,
    matcher: PatternMatcher,
    rasterizer: Box<dyn PageRasterizer>,
    ocr: Option<Arc<dyn OcrBackend>>,
    /// Set when OCR was wanted but its backend failed to load.
    ocr_unavailable: Option<String>,
}

impl Pipeline {
    /// A text-layer-only pipeline with the default rasterizer and no OCR backend.
    pub fn new(config: RefmarkConfig) -> Result<Self> {
        let matcher = PatternMatcher::new(config.pattern.clone())?;
        Ok(Self {
            config,
            matcher,
            rasterizer: default_rasterizer(),
            ocr: None,
            ocr_unavailable: None,
        })
    }

    /// A full pipeline with the OCR backend the configuration selects.
    pub fn from_config(config: RefmarkConfig) -> Result<Self> {
        let backend = backend_from_config(&config)?;
        Ok(Self::new(config)?.with_ocr(backend))
    }

    pub fn with_rasterizer(mut self, rasterizer: Box<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_ocr(mut self, backend: Arc<dyn OcrBackend>) -> Self {
        self.ocr = Some(backend);
        self
    }

    /// Keep searching text layers, but fail any input that needs OCR.
    pub fn with_ocr_unavailable(mut self, reason: impl Into<String>) -> Self {
        self.ocr_unavailable = Some(reason.into());
        self
    }

    pub fn config(&self) -> &RefmarkConfig {
        &self.config
    }

    /// Run the pipeline on one document.
    pub fn run(&self, input: &InputDocument) -> Result<Outcome> {
        let start = Instant::now();
        enter(Stage::Start);
        enter(Stage::ClassifyInput);
        info!(
            "Processing {} ({:?}, {} bytes)",
            input.name.as_deref().unwrap_or("<unnamed>"),
            input.kind,
            input.data.len()
        );

        let outcome = match input.kind {
            InputKind::Pdf => self.run_pdf(&input.data)?,
            InputKind::Image(_) => {
                if self.ocr.is_none() {
                    return Err(self.ocr_required("image input can only be searched with OCR"));
                }
                let image = image::load_from_memory(&input.data)?;
                enter(Stage::OcrAttempt);
                self.run_ocr(vec![Ok(image)], 1)?
            }
        };

        Ok(match outcome {
            Outcome::Highlighted(mut report) => {
                report.elapsed_ms = start.elapsed().as_millis() as u64;
                enter(Stage::Done);
                info!(
                    "Highlighted {} code(s) with {} mark(s) via {:?} in {}ms",
                    report.codes.len(),
                    report.highlights.len(),
                    report.path,
                    report.elapsed_ms
                );
                Outcome::Highlighted(report)
            }
            not_found => {
                enter(Stage::NotFound);
                not_found
            }
        })
    }

    fn run_pdf(&self, data: &[u8]) -> Result<Outcome> {
        let mut searched = false;
        let loaded = PdfExtractor::load(data).ok();
        let content = loaded.as_ref().map(PdfExtractor::analyze);
        let page_total = loaded.as_ref().map(|pdf| pdf.page_count() as usize);
        drop(loaded);
        debug!("PDF content: {:?}", content);

        if self.config.pdf.prefer_text_layer {
            enter(Stage::TextAttempt);
            if matches!(content, Some(PdfType::Image)) {
                info!("PDF pages carry no text layer");
            } else {
                let attempt = TextLayerPass::new(&self.matcher, &self.config.highlight).run(data);
                searched = true;
                if let (true, Some(pdf)) = (attempt.succeeded, attempt.document) {
                    return Ok(Outcome::Highlighted(HighlightReport {
                        pdf,
                        path: PathTaken::TextLayer,
                        codes: attempt.codes,
                        highlights: attempt.highlights,
                        pages: attempt.pages,
                        elapsed_ms: 0,
                    }));
                }
            }
            info!("Text layer yielded no highlights, falling back to OCR");
        }

        if self.ocr.is_none() {
            if !searched {
                return Err(self.ocr_required("the PDF has no text layer to search"));
            }
            if self.ocr_unavailable.is_some() {
                return Err(self.ocr_required("the text layer held no codes"));
            }
            return Ok(Outcome::NotFound {
                message: format!("{} (OCR disabled)", NOT_FOUND_MESSAGE),
            });
        }

        enter(Stage::RasterFallback);
        let pdf_config = &self.config.pdf;
        let pages = self
            .rasterizer
            .render_pages(data, pdf_config.render_dpi, pdf_config.max_pages)?;
        let total = page_total.unwrap_or(pages.len()).max(pages.len());
        if total > pages.len() {
            warn!(
                "Only the first {} of {} page(s) are processed",
                pages.len(),
                total
            );
        }

        enter(Stage::OcrAttempt);
        self.run_ocr(pages, total)
    }

    fn run_ocr(&self, pages: Vec<PageRender>, total: usize) -> Result<Outcome> {
        let Some(backend) = self.ocr.as_ref() else {
            return Err(self.ocr_required("pages need OCR"));
        };
        debug!("OCR backend: {}", backend.name());

        let mut scratch = ScratchSpace::new()?;
        let mut codes = Vec::new();
        let mut highlights = Vec::new();
        let mut reports = Vec::with_capacity(total);

        for (index, render) in pages.into_iter().enumerate() {
            let image = match render {
                Ok(image) => bound_dimensions(image, self.config.pdf.max_image_dimension),
                Err(e) => {
                    warn!("Page {}: {}; skipped", index + 1, e);
                    reports.push(PageReport {
                        index,
                        source: PageSource::Skipped,
                        codes: 0,
                        highlights: 0,
                    });
                    continue;
                }
            };

            let (page_image, page_codes, page_highlights) = match self.recognize(backend, &image) {
                Ok(page) => self.mark_page(&image, page.with_page_index(index), index),
                Err(e) => {
                    warn!("Page {}: {}; passed through unmodified", index + 1, e);
                    (image, Vec::new(), Vec::new())
                }
            };

            scratch.persist_page(index, &page_image)?;
            reports.push(PageReport {
                index,
                source: if page_highlights.is_empty() {
                    PageSource::Passthrough
                } else {
                    PageSource::Ocr
                },
                codes: page_codes.len(),
                highlights: page_highlights.len(),
            });
            codes.extend(page_codes);
            highlights.extend(page_highlights);
        }

        for index in reports.len()..total {
            reports.push(PageReport {
                index,
                source: PageSource::Skipped,
                codes: 0,
                highlights: 0,
            });
        }

        enter(Stage::Aggregate);
        if highlights.is_empty() {
            scratch.close_quietly();
            return Ok(Outcome::NotFound {
                message: NOT_FOUND_MESSAGE.to_string(),
            });
        }

        let pdf = scratch.assemble(self.config.pdf.render_dpi)?;
        scratch.close_quietly();

        Ok(Outcome::Highlighted(HighlightReport {
            pdf,
            path: PathTaken::Ocr,
            codes,
            highlights,
            pages: reports,
            elapsed_ms: 0,
        }))
    }

    fn ocr_required(&self, context: &str) -> RefmarkError {
        let reason = self.ocr_unavailable.as_deref().unwrap_or("OCR disabled");
        OcrError::Unavailable(format!("{}; {}", context, reason)).into()
    }

    /// Extract codes from a recognized page and draw the overlay.
    fn mark_page(&self, image: &DynamicImage, page: OcrPage, index: usize) -> (DynamicImage, Vec<Code>, Vec<Highlight>) {
        let values = merge_codes([
            self.matcher.extract_from_tokens(&page.tokens),
            self.matcher.extract_from_text(&page.text),
        ]);
        debug!("Page {}: {} token(s), codes {:?}", index + 1, page.tokens.len(), values);
        if values.is_empty() {
            return (image.clone(), Vec::new(), Vec::new());
        }

        let (marked, highlights) =
            highlight_tokens(image, &page.tokens, &values, &self.matcher, &self.config.highlight);

        let codes = values
            .into_iter()
            .map(|value| {
                let mut code = Code::new(value, index);
                code.boxes = page
                    .tokens
                    .iter()
                    .filter(|t| {
                        let fragment = self.matcher.token_fragment(&t.text);
                        !fragment.is_empty() && code.value.contains(&fragment)
                    })
                    .map(|t| t.bbox)
                    .collect();
                code
            })
            .collect();

        (marked, codes, highlights)
    }

    /// Recognize on a worker thread, giving up after the page timeout.
    fn recognize(&self, backend: &Arc<dyn OcrBackend>, image: &DynamicImage) -> std::result::Result<OcrPage, OcrError> {
        let secs = self.config.ocr.page_timeout_secs;
        if secs == 0 {
            return backend.recognize(image);
        }

        let (tx, rx) = mpsc::channel();
        let worker_backend = Arc::clone(backend);
        let worker_image = image.clone();
        thread::Builder::new()
            .name("refmark-ocr".to_string())
            .spawn(move || {
                let _ = tx.send(worker_backend.recognize(&worker_image));
            })
            .map_err(|e| OcrError::Recognition(format!("failed to start OCR worker: {}", e)))?;

        match rx.recv_timeout(Duration::from_secs(secs)) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(OcrError::Timeout(secs)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(OcrError::Recognition("OCR worker exited without a result".to_string()))
            }
        }
    }
}

fn enter(stage: Stage) {
    match stage {
        Stage::OcrAttempt | Stage::ClassifyInput => debug!("stage: {}", stage),
        _ => info!("stage: {}", stage),
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("rasterizer", &self.rasterizer.name())
            .field("ocr", &self.ocr.as_ref().map(|b| b.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests;
