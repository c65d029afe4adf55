use std::io::Cursor;
use std::sync::Mutex;

use image::{ImageFormat, RgbImage};
use pretty_assertions::assert_eq;

use super::*;
use crate::error::RenderError;
use crate::models::document::{BoundingBox, HighlightKind};
use crate::ocr::Token;
use crate::pdf::annotate::highlight_annotations;
use crate::pdf::fixtures::{text_pdf, to_bytes};

/// Returns the same words for every page and records the image sizes it saw.
struct FakeOcr {
    words: Vec<(&'static str, f32)>,
    delay: Option<Duration>,
    seen: Mutex<Vec<(u32, u32)>>,
}

impl FakeOcr {
    fn new(words: &[&'static str]) -> Self {
        Self {
            words: words.iter().enumerate().map(|(i, w)| (*w, i as f32 * 30.0)).collect(),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl OcrBackend for FakeOcr {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn recognize(&self, image: &DynamicImage) -> std::result::Result<OcrPage, OcrError> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.seen.lock().unwrap().push((image.width(), image.height()));
        let tokens = self
            .words
            .iter()
            .map(|(text, x)| Token::new(*text, BoundingBox::new(*x, 5.0, 25.0, 10.0)))
            .collect();
        Ok(OcrPage::from_tokens(tokens, (image.width(), image.height())))
    }
}

/// Renders a white page per entry; `None` entries fail.
struct FakeRaster(Vec<Option<u32>>);

impl PageRasterizer for FakeRaster {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn render_pages(&self, _pdf: &[u8], _dpi: u32, max_pages: usize) -> std::result::Result<Vec<PageRender>, RenderError> {
        Ok(self
            .0
            .iter()
            .take(max_pages)
            .enumerate()
            .map(|(i, width)| match width {
                Some(w) => Ok(white(*w, 20)),
                None => Err(RenderError::Page {
                    page: i as u32 + 1,
                    reason: "broken".to_string(),
                }),
            })
            .collect())
    }
}

fn white(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])))
}

fn png_input(width: u32, height: u32) -> InputDocument {
    let mut data = Vec::new();
    white(width, height)
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .unwrap();
    InputDocument::from_bytes(Some("scan.png"), data).unwrap()
}

fn pdf_input(lines: &[&str]) -> InputDocument {
    InputDocument::from_bytes(Some("doc.pdf"), to_bytes(text_pdf(lines))).unwrap()
}

fn pipeline(ocr: FakeOcr, raster: FakeRaster) -> Pipeline {
    Pipeline::new(RefmarkConfig::default())
        .unwrap()
        .with_rasterizer(Box::new(raster))
        .with_ocr(Arc::new(ocr))
}

fn report(outcome: Outcome) -> HighlightReport {
    match outcome {
        Outcome::Highlighted(report) => report,
        Outcome::NotFound { message } => panic!("expected highlights, got not-found: {}", message),
    }
}

#[test]
fn test_text_layer_success_skips_ocr() {
    let ocr = Arc::new(FakeOcr::new(&["Ref:", "X12", "99/"]));
    let pipeline = Pipeline::new(RefmarkConfig::default())
        .unwrap()
        .with_rasterizer(Box::new(FakeRaster(vec![Some(100)])))
        .with_ocr(ocr.clone());

    let report = report(pipeline.run(&pdf_input(&["Invoice Ref: Z-900-1 / continue"])).unwrap());
    assert_eq!(report.path, PathTaken::TextLayer);
    assert_eq!(report.code_values(), vec!["Z-900-1"]);
    assert_eq!(report.highlights.len(), 1);
    assert_eq!(report.highlights[0].kind, HighlightKind::Annotation);
    assert!(ocr.seen.lock().unwrap().is_empty());

    let out = PdfExtractor::load(&report.pdf).unwrap();
    let page_id = out.page_id(1).unwrap();
    assert_eq!(highlight_annotations(out.document(), page_id).len(), 1);
}

#[test]
fn test_zero_text_highlights_fall_back_to_ocr() {
    let pipeline = pipeline(
        FakeOcr::new(&["Ref:", "X12", "99/", "more"]),
        FakeRaster(vec![Some(150)]),
    );

    let report = report(pipeline.run(&pdf_input(&["no marker on this page 42"])).unwrap());
    assert_eq!(report.path, PathTaken::Ocr);
    assert_eq!(report.code_values(), vec!["X1299"]);
    assert_eq!(report.highlights.len(), 2);
    assert!(report.highlights.iter().all(|h| h.kind == HighlightKind::Overlay));
    assert_eq!(report.pages[0].source, PageSource::Ocr);
    assert_eq!(PdfExtractor::load(&report.pdf).unwrap().page_count(), 1);
}

#[test]
fn test_image_without_marker_is_not_found() {
    let pipeline = pipeline(FakeOcr::new(&["Total", "123,45"]), FakeRaster(vec![]));
    let outcome = pipeline.run(&png_input(120, 40)).unwrap();
    assert!(matches!(outcome, Outcome::NotFound { .. }));
}

#[test]
fn test_image_with_marker_is_highlighted() {
    let pipeline = pipeline(FakeOcr::new(&["Ref:", "AB-77", "/"]), FakeRaster(vec![]));
    let report = report(pipeline.run(&png_input(120, 40)).unwrap());
    assert_eq!(report.path, PathTaken::Ocr);
    assert_eq!(report.code_values(), vec!["AB-77"]);
    assert_eq!(report.codes[0].boxes.len(), 1);
}

#[test]
fn test_failed_pages_are_skipped_and_order_kept() {
    let pipeline = pipeline(
        FakeOcr::new(&["Ref:", "Q123", "/"]),
        FakeRaster(vec![Some(100), None, Some(110)]),
    );
    let report = report(pipeline.run(&pdf_input(&["nothing here"])).unwrap());

    let sources: Vec<_> = report.pages.iter().map(|p| p.source).collect();
    assert_eq!(sources, vec![PageSource::Ocr, PageSource::Skipped, PageSource::Ocr]);
    assert_eq!(report.code_values(), vec!["Q123"]);
    assert_eq!(report.codes.len(), 2);
    assert_eq!(report.codes[1].page_index, 2);
    assert_eq!(PdfExtractor::load(&report.pdf).unwrap().page_count(), 2);
}

#[test]
fn test_large_pages_are_downscaled() {
    let ocr = Arc::new(FakeOcr::new(&["nothing"]));
    let mut config = RefmarkConfig::default();
    config.pdf.max_image_dimension = 100;
    let pipeline = Pipeline::new(config).unwrap().with_ocr(ocr.clone());

    pipeline.run(&png_input(400, 40)).unwrap();
    assert_eq!(ocr.seen.lock().unwrap()[0], (100, 10));
}

#[test]
fn test_slow_page_times_out_and_passes_through() {
    let mut ocr = FakeOcr::new(&["Ref:", "AB-77", "/"]);
    ocr.delay = Some(Duration::from_millis(2500));
    let mut config = RefmarkConfig::default();
    config.ocr.page_timeout_secs = 1;
    let pipeline = Pipeline::new(config).unwrap().with_ocr(Arc::new(ocr));

    let outcome = pipeline.run(&png_input(50, 20)).unwrap();
    assert!(matches!(outcome, Outcome::NotFound { .. }));
}

#[test]
fn test_text_only_pipeline_reports_not_found() {
    let pipeline = Pipeline::new(RefmarkConfig::default()).unwrap();
    let outcome = pipeline.run(&pdf_input(&["no marker"])).unwrap();
    match outcome {
        Outcome::NotFound { message } => assert!(message.contains("OCR disabled")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_image_without_ocr_is_an_error() {
    let pipeline = Pipeline::new(RefmarkConfig::default()).unwrap();
    let err = pipeline.run(&png_input(50, 20)).unwrap_err();
    assert!(matches!(err, RefmarkError::Ocr(OcrError::Unavailable(_))));
}

#[test]
fn test_unloaded_ocr_after_empty_text_layer_is_an_error() {
    let pipeline = Pipeline::new(RefmarkConfig::default())
        .unwrap()
        .with_ocr_unavailable("missing model file det.onnx");

    match pipeline.run(&pdf_input(&["no marker"])) {
        Err(RefmarkError::Ocr(OcrError::Unavailable(message))) => {
            assert!(message.contains("det.onnx"));
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }

    let report = report(pipeline.run(&pdf_input(&["Ref: Z-900-1 /"])).unwrap());
    assert_eq!(report.path, PathTaken::TextLayer);
}

#[test]
fn test_text_only_pipeline_without_text_attempt_is_an_error() {
    let mut config = RefmarkConfig::default();
    config.pdf.prefer_text_layer = false;
    let pipeline = Pipeline::new(config).unwrap();
    assert!(matches!(
        pipeline.run(&pdf_input(&["Ref: Z-900-1 /"])),
        Err(RefmarkError::Ocr(OcrError::Unavailable(_)))
    ));
}

#[test]
fn test_text_layer_can_be_bypassed() {
    let mut config = RefmarkConfig::default();
    config.pdf.prefer_text_layer = false;
    let pipeline = Pipeline::new(config)
        .unwrap()
        .with_rasterizer(Box::new(FakeRaster(vec![Some(100)])))
        .with_ocr(Arc::new(FakeOcr::new(&["Ref:", "X12", "99/"])));

    let report = report(pipeline.run(&pdf_input(&["Ref: Z-900-1 /"])).unwrap());
    assert_eq!(report.path, PathTaken::Ocr);
}

#[test]
fn test_invalid_pattern_is_config_error() {
    let mut config = RefmarkConfig::default();
    config.pattern.marker = String::new();
    assert!(matches!(Pipeline::new(config), Err(RefmarkError::Config(_))));
}

#[test]
fn test_scanned_pdf_goes_straight_to_ocr() {
    let scan = crate::pdf::fixtures::image_pdf(&[white(40, 20)]);
    let input = InputDocument::from_bytes(Some("scan.pdf"), to_bytes(scan)).unwrap();
    let pipeline = pipeline(FakeOcr::new(&["Ref:", "AB-77", "/"]), FakeRaster(vec![Some(100)]));

    let report = report(pipeline.run(&input).unwrap());
    assert_eq!(report.path, PathTaken::Ocr);
    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].source, PageSource::Ocr);
}
