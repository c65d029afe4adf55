//! Digital-text path: locate codes in each page's text layer and annotate them.

use lopdf::{Document, ObjectId};
use tracing::{debug, info};

use super::annotate::add_highlight;
use super::extractor::PdfExtractor;
use super::text_layer::TextLayer;
use super::Result;
use crate::error::PdfError;
use crate::highlight::HighlightStyle;
use crate::models::document::{BoundingBox, Code, Highlight, HighlightKind, PageReport, PageSource};
use crate::pattern::PatternMatcher;

/// Result of one pass over a PDF's text layer.
#[derive(Debug, Clone, Default)]
pub struct TextAttempt {
    /// At least one rectangle was located and annotated.
    pub succeeded: bool,
    pub codes: Vec<Code>,
    pub highlights: Vec<Highlight>,
    pub pages: Vec<PageReport>,
    /// Annotated PDF, present only when the attempt succeeded.
    pub document: Option<Vec<u8>>,
}

/// Runs the text-layer locator and annotator over a whole document.
pub struct TextLayerPass<'a> {
    matcher: &'a PatternMatcher,
    style: &'a HighlightStyle,
}

impl<'a> TextLayerPass<'a> {
    pub fn new(matcher: &'a PatternMatcher, style: &'a HighlightStyle) -> Self {
        Self { matcher, style }
    }

    /// Process every page. Failures never propagate; they count as zero highlights.
    pub fn run(&self, bytes: &[u8]) -> TextAttempt {
        match self.try_run(bytes) {
            Ok(attempt) => attempt,
            Err(e) => {
                debug!("Text layer pass failed: {}", e);
                TextAttempt::default()
            }
        }
    }

    fn try_run(&self, bytes: &[u8]) -> Result<TextAttempt> {
        let mut pdf = PdfExtractor::load(bytes)?;
        let mut attempt = TextAttempt::default();

        for page_number in 1..=pdf.page_count() {
            let index = (page_number - 1) as usize;
            let (codes, highlights) = match self.annotate_page(&mut pdf, page_number) {
                Ok(found) => found,
                Err(e) => {
                    debug!("Page {}: text layer unusable: {}", page_number, e);
                    (Vec::new(), Vec::new())
                }
            };

            attempt.pages.push(PageReport {
                index,
                source: if highlights.is_empty() {
                    PageSource::Passthrough
                } else {
                    PageSource::TextLayer
                },
                codes: codes.len(),
                highlights: highlights.len(),
            });
            attempt.codes.extend(codes);
            attempt.highlights.extend(highlights);
        }

        attempt.succeeded = !attempt.highlights.is_empty();
        if attempt.succeeded {
            let mut out = Vec::new();
            pdf.document_mut()
                .save_to(&mut out)
                .map_err(|e| PdfError::Save(e.to_string()))?;
            attempt.document = Some(out);
        }

        info!(
            "Text layer pass: {} code(s), {} highlight(s) over {} page(s)",
            attempt.codes.len(),
            attempt.highlights.len(),
            attempt.pages.len()
        );
        Ok(attempt)
    }

    fn annotate_page(&self, pdf: &mut PdfExtractor, page_number: u32) -> Result<(Vec<Code>, Vec<Highlight>)> {
        let index = (page_number - 1) as usize;
        let page_id = pdf.page_id(page_number)?;
        let layer = TextLayer::from_page(pdf.document(), page_number)?;
        if !layer.has_text() {
            debug!("Page {}: no text layer", page_number);
            return Ok((Vec::new(), Vec::new()));
        }

        let mut codes = Vec::new();
        let mut highlights = Vec::new();
        for value in self.matcher.extract_from_text(&layer.text()) {
            let mut code = Code::new(value, index);
            code.boxes = layer.search(&code.value);
            if code.boxes.is_empty() {
                debug!("Page {}: code {:?} not found literally, skipped", page_number, code.value);
            }

            code.boxes = annotate_boxes(pdf.document_mut(), page_id, page_number, &code.boxes, self.style);
            highlights.extend(code.boxes.iter().map(|bbox| Highlight {
                page_index: index,
                bbox: *bbox,
                kind: HighlightKind::Annotation,
                style: self.style.clone(),
            }));
            codes.push(code);
        }

        debug!(
            "Page {}: {} code(s), {} highlight(s)",
            page_number,
            codes.len(),
            highlights.len()
        );
        Ok((codes, highlights))
    }
}

/// Annotate each box, returning only those that were attached to the page.
fn annotate_boxes(
    doc: &mut Document,
    page_id: ObjectId,
    page_number: u32,
    boxes: &[BoundingBox],
    style: &HighlightStyle,
) -> Vec<BoundingBox> {
    boxes
        .iter()
        .filter(|bbox| match add_highlight(doc, page_id, page_number, bbox, style) {
            Ok(_) => true,
            Err(e) => {
                debug!("Page {}: {}; box skipped", page_number, e);
                false
            }
        })
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::annotate::highlight_annotations;
    use crate::pdf::fixtures::{text_pdf, text_pdf_pages, to_bytes};
    use pretty_assertions::assert_eq;

    fn run(bytes: &[u8]) -> TextAttempt {
        let matcher = PatternMatcher::default();
        let style = HighlightStyle::default();
        TextLayerPass::new(&matcher, &style).run(bytes)
    }

    #[test]
    fn test_single_code_is_annotated() {
        let attempt = run(&to_bytes(text_pdf(&["Invoice Ref: Z-900-1 / continue"])));
        assert!(attempt.succeeded);
        assert_eq!(attempt.codes.len(), 1);
        assert_eq!(attempt.codes[0].value, "Z-900-1");
        assert_eq!(attempt.highlights.len(), 1);
        assert_eq!(attempt.highlights[0].kind, HighlightKind::Annotation);

        let out = PdfExtractor::load(attempt.document.as_deref().unwrap()).unwrap();
        let page_id = out.page_id(1).unwrap();
        assert_eq!(highlight_annotations(out.document(), page_id).len(), 1);
    }

    #[test]
    fn test_no_marker_is_zero_highlights() {
        let attempt = run(&to_bytes(text_pdf(&["Nothing to see here 12345"])));
        assert!(!attempt.succeeded);
        assert!(attempt.document.is_none());
        assert_eq!(attempt.pages.len(), 1);
        assert_eq!(attempt.pages[0].source, PageSource::Passthrough);
    }

    #[test]
    fn test_unparseable_input_is_zero_highlights() {
        let attempt = run(b"%PDF-1.7 truncated");
        assert!(!attempt.succeeded);
        assert!(attempt.pages.is_empty());
    }

    #[test]
    fn test_pages_are_reported_in_order() {
        let doc = text_pdf_pages(&[&["blank"], &["Ref: QX-77 / and Ref: QX-78 /"]]);
        let attempt = run(&to_bytes(doc));
        assert!(attempt.succeeded);
        let values: Vec<_> = attempt.codes.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["QX-77", "QX-78"]);
        assert!(attempt.codes.iter().all(|c| c.page_index == 1));
        assert_eq!(attempt.pages[0].highlights, 0);
        assert_eq!(attempt.pages[1].source, PageSource::TextLayer);
        assert_eq!(attempt.pages[1].highlights, 2);
    }

    #[test]
    fn test_failed_box_is_not_counted() {
        let mut doc = text_pdf(&["Ref: AB-12 /"]);
        let page_id = doc.get_pages()[&1];
        let good = BoundingBox::new(100.0, 700.0, 50.0, 12.0);
        let boxes = [good, BoundingBox::default()];

        let attached = annotate_boxes(&mut doc, page_id, 1, &boxes, &HighlightStyle::default());
        assert_eq!(attached, vec![good]);
        assert_eq!(highlight_annotations(&doc, page_id).len(), 1);
    }
}
