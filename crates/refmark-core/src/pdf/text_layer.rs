//! Positioned text from a page content stream.
//!
//! Interprets the text-showing operators of one page and records a box per
//! character, so that a literal search over the page text maps back to
//! rectangles in PDF user space.

use std::collections::{HashMap, HashSet};

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::fonts::{number, resolve, FontInfo};
use super::Result;
use crate::error::PdfError;
use crate::models::document::BoundingBox;

/// Fraction of the font size below the baseline covered by a glyph box.
const DESCENT: f32 = 0.22;
/// Fraction of the font size above the baseline covered by a glyph box.
const ASCENT: f32 = 0.78;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

fn translation(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

/// One placed character.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    pub bbox: BoundingBox,
    /// Baseline origin in user space.
    pub origin: (f32, f32),
    /// Effective font size in user space.
    pub size: f32,
}

/// Text and glyph geometry of one page.
#[derive(Debug, Clone, Default)]
pub struct TextLayer {
    /// 1-based page number.
    pub page_number: u32,
    glyphs: Vec<Glyph>,
    text: Vec<char>,
    /// For every char of `text`, the glyph it came from (`None` for inserted spaces).
    sources: Vec<Option<usize>>,
}

#[derive(Clone)]
struct TextState {
    char_spacing: f32,
    word_spacing: f32,
    scale: f32,
    leading: f32,
    rise: f32,
    font: Option<Vec<u8>>,
    size: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            char_spacing: 0.0,
            word_spacing: 0.0,
            scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            font: None,
            size: 0.0,
        }
    }
}

struct Interpreter<'a> {
    doc: &'a Document,
    resources: Option<Dictionary>,
    fonts: HashMap<Vec<u8>, FontInfo>,
    fallback_font: FontInfo,
    ctm: Matrix,
    stack: Vec<(Matrix, TextState)>,
    tm: Matrix,
    tlm: Matrix,
    state: TextState,
    glyphs: Vec<Glyph>,
}

impl<'a> Interpreter<'a> {
    fn font(&mut self) -> &FontInfo {
        let Some(name) = self.state.font.clone() else {
            return &self.fallback_font;
        };
        if !self.fonts.contains_key(&name) {
            let info = self
                .resources
                .as_ref()
                .and_then(|res| res.get(b"Font").ok())
                .map(|f| resolve(self.doc, f))
                .and_then(|f| f.as_dict().ok())
                .and_then(|fonts| fonts.get(&name).ok())
                .map(|f| resolve(self.doc, f))
                .and_then(|f| f.as_dict().ok())
                .map(|dict| FontInfo::from_dict(self.doc, dict))
                .unwrap_or_default();
            self.fonts.insert(name.clone(), info);
        }
        self.fonts.get(&name).unwrap_or(&self.fallback_font)
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.tlm = multiply(&translation(tx, ty), &self.tlm);
        self.tm = self.tlm;
    }

    fn show(&mut self, bytes: &[u8]) {
        let font = self.font().clone();
        let state = self.state.clone();
        if state.size == 0.0 {
            return;
        }

        for (code, text) in font.decode(bytes) {
            let w0 = font.width(code, &text) / 1000.0;
            let params = [
                state.size * state.scale,
                0.0,
                0.0,
                state.size,
                0.0,
                state.rise,
            ];
            let trm = multiply(&multiply(&params, &self.tm), &self.ctm);

            let corners = [
                apply(&trm, 0.0, -DESCENT),
                apply(&trm, w0, -DESCENT),
                apply(&trm, 0.0, ASCENT),
                apply(&trm, w0, ASCENT),
            ];
            let (min_x, max_x) = corners
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (x, _)| (lo.min(*x), hi.max(*x)));
            let (min_y, max_y) = corners
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (_, y)| (lo.min(*y), hi.max(*y)));
            let origin = apply(&trm, 0.0, 0.0);
            let (ux, uy) = apply(&trm, 0.0, 1.0);
            let size = ((ux - origin.0).powi(2) + (uy - origin.1).powi(2)).sqrt();

            if !text.is_empty() {
                self.glyphs.push(Glyph {
                    text,
                    bbox: BoundingBox::from_corners(min_x, min_y, max_x, max_y),
                    origin,
                    size,
                });
            }

            let spacing = if font.is_word_space(code) {
                state.word_spacing
            } else {
                0.0
            };
            let tx = (w0 * state.size + state.char_spacing + spacing) * state.scale;
            self.tm = multiply(&translation(tx, 0.0), &self.tm);
        }
    }

    fn adjust(&mut self, thousandths: f32) {
        let tx = -thousandths / 1000.0 * self.state.size * self.state.scale;
        self.tm = multiply(&translation(tx, 0.0), &self.tm);
    }

    fn run(&mut self, content: &Content) {
        for op in &content.operations {
            let nums: Vec<f32> = op.operands.iter().filter_map(number).collect();
            match op.operator.as_str() {
                "q" => self.stack.push((self.ctm, self.state.clone())),
                "Q" => {
                    if let Some((ctm, state)) = self.stack.pop() {
                        self.ctm = ctm;
                        self.state = state;
                    }
                }
                "cm" if nums.len() == 6 => {
                    let m = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                    self.ctm = multiply(&m, &self.ctm);
                }
                "BT" => {
                    self.tm = IDENTITY;
                    self.tlm = IDENTITY;
                }
                "Tf" => {
                    self.state.font = op
                        .operands
                        .first()
                        .and_then(|o| o.as_name().ok())
                        .map(|n| n.to_vec());
                    self.state.size = op.operands.get(1).and_then(number).unwrap_or(0.0);
                }
                "Tc" if !nums.is_empty() => self.state.char_spacing = nums[0],
                "Tw" if !nums.is_empty() => self.state.word_spacing = nums[0],
                "Tz" if !nums.is_empty() => self.state.scale = nums[0] / 100.0,
                "TL" if !nums.is_empty() => self.state.leading = nums[0],
                "Ts" if !nums.is_empty() => self.state.rise = nums[0],
                "Td" if nums.len() == 2 => self.next_line(nums[0], nums[1]),
                "TD" if nums.len() == 2 => {
                    self.state.leading = -nums[1];
                    self.next_line(nums[0], nums[1]);
                }
                "Tm" if nums.len() == 6 => {
                    self.tlm = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                    self.tm = self.tlm;
                }
                "T*" => self.next_line(0.0, -self.state.leading),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes);
                    }
                }
                "'" => {
                    self.next_line(0.0, -self.state.leading);
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes);
                    }
                }
                "\"" => {
                    if let (Some(aw), Some(ac)) = (
                        op.operands.first().and_then(number),
                        op.operands.get(1).and_then(number),
                    ) {
                        self.state.word_spacing = aw;
                        self.state.char_spacing = ac;
                    }
                    self.next_line(0.0, -self.state.leading);
                    if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                        self.show(bytes);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show(bytes),
                                other => {
                                    if let Some(n) = number(other) {
                                        self.adjust(n);
                                    }
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Look up a page attribute that may be inherited from the page tree.
///
/// Stops at the first node seen twice, so a cyclic `/Parent` chain yields `None`.
pub(crate) fn inherited<'a>(doc: &'a Document, node_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut visited = HashSet::new();
    let mut current = node_id;
    loop {
        if !visited.insert(current) {
            debug!("Page tree cycle at {:?}", current);
            return None;
        }
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return None,
        }
    }
}

/// Resources dictionary of a page, following `/Parent` inheritance.
pub(crate) fn page_resources(doc: &Document, node_id: ObjectId) -> Option<Dictionary> {
    inherited(doc, node_id, b"Resources").and_then(|res| resolve(doc, res).as_dict().ok().cloned())
}

impl TextLayer {
    /// Interpret the content stream of a 1-based page.
    pub fn from_page(doc: &Document, page_number: u32) -> Result<Self> {
        let page_id = *doc
            .get_pages()
            .get(&page_number)
            .ok_or(PdfError::InvalidPage(page_number))?;

        let data = doc.get_page_content(page_id).map_err(|e| PdfError::TextLayer {
            page: page_number,
            reason: e.to_string(),
        })?;
        let content = Content::decode(&data).map_err(|e| PdfError::TextLayer {
            page: page_number,
            reason: e.to_string(),
        })?;

        let mut interpreter = Interpreter {
            doc,
            resources: page_resources(doc, page_id),
            fonts: HashMap::new(),
            fallback_font: FontInfo::default(),
            ctm: IDENTITY,
            stack: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            state: TextState::default(),
            glyphs: Vec::new(),
        };
        interpreter.run(&content);

        let layer = Self::from_glyphs(page_number, interpreter.glyphs);
        debug!(
            "Page {}: {} glyphs, {} chars of text",
            page_number,
            layer.glyphs.len(),
            layer.text.len()
        );
        Ok(layer)
    }

    /// Build the page text, inserting a space at line breaks and wide gaps.
    pub fn from_glyphs(page_number: u32, glyphs: Vec<Glyph>) -> Self {
        let mut text = Vec::new();
        let mut sources = Vec::new();
        let mut prev: Option<&Glyph> = None;

        for (index, glyph) in glyphs.iter().enumerate() {
            let last_is_space = text.last().map(|c: &char| c.is_whitespace()).unwrap_or(true);

            if let Some(p) = prev {
                let tolerance = p.size.max(glyph.size).max(1.0);
                let new_line = (glyph.origin.1 - p.origin.1).abs() > tolerance * 0.5;
                let gap = glyph.bbox.x - p.bbox.right();
                let wide_gap = gap > tolerance * 0.25 || gap < -tolerance;
                if (new_line || wide_gap) && !last_is_space {
                    text.push(' ');
                    sources.push(None);
                }
            }

            for c in glyph.text.chars() {
                let c = if c.is_whitespace() { ' ' } else { c };
                if c == ' ' && text.last() == Some(&' ') {
                    continue;
                }
                text.push(c);
                sources.push(Some(index));
            }
            prev = Some(glyph);
        }

        Self {
            page_number,
            glyphs,
            text,
            sources,
        }
    }

    /// Page text with single spaces between words and lines.
    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    pub fn has_text(&self) -> bool {
        self.text.iter().any(|c| !c.is_whitespace())
    }

    /// Literal search; one rectangle per visual line of every hit.
    pub fn search(&self, needle: &str) -> Vec<BoundingBox> {
        let needle: Vec<char> = needle.chars().collect();
        if needle.is_empty() || needle.len() > self.text.len() {
            return Vec::new();
        }

        let mut rects = Vec::new();
        let mut i = 0;
        while i + needle.len() <= self.text.len() {
            if self.text[i..i + needle.len()] == needle[..] {
                rects.extend(self.line_boxes(i, i + needle.len()));
                i += needle.len();
            } else {
                i += 1;
            }
        }

        trace!("search {:?} on page {}: {} rect(s)", needle, self.page_number, rects.len());
        rects
    }

    fn line_boxes(&self, start: usize, end: usize) -> Vec<BoundingBox> {
        let mut boxes: Vec<(f32, f32, BoundingBox)> = Vec::new();
        let mut last_glyph = None;

        for source in self.sources[start..end].iter().flatten() {
            if last_glyph == Some(*source) {
                continue;
            }
            last_glyph = Some(*source);
            let glyph = &self.glyphs[*source];
            if glyph.text.trim().is_empty() {
                continue;
            }
            match boxes.last_mut() {
                Some((baseline, size, bbox)) if (glyph.origin.1 - *baseline).abs() <= size.max(1.0) * 0.5 => {
                    *bbox = bbox.union(&glyph.bbox);
                }
                _ => boxes.push((glyph.origin.1, glyph.size, glyph.bbox)),
            }
        }

        boxes.into_iter().map(|(_, _, bbox)| bbox).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::text_pdf;

    #[test]
    fn test_text_and_inherited_fonts() {
        let doc = text_pdf(&["Invoice Ref: Z-900-1 / continue"]);
        let layer = TextLayer::from_page(&doc, 1).unwrap();
        assert_eq!(layer.text(), "Invoice Ref: Z-900-1 / continue");
        assert!(layer.has_text());
    }

    #[test]
    fn test_search_single_line() {
        let doc = text_pdf(&["Invoice Ref: Z-900-1 / continue"]);
        let layer = TextLayer::from_page(&doc, 1).unwrap();
        let rects = layer.search("Z-900-1");
        assert_eq!(rects.len(), 1);

        let r = rects[0];
        assert!(r.x > 72.0 && r.right() < 300.0);
        assert!(r.y < 720.0 && r.bottom() > 720.0);
        // "Invoice Ref: " precedes the code
        let prefix: f32 = "Invoice Ref: "
            .chars()
            .map(|c| FontInfo::default().width(c as u32, &c.to_string()) * 12.0 / 1000.0)
            .sum();
        assert!((r.x - (72.0 + prefix)).abs() < 0.01);
    }

    #[test]
    fn test_line_break_becomes_space() {
        let doc = text_pdf(&["Ref: AB", "12 / tail"]);
        let layer = TextLayer::from_page(&doc, 1).unwrap();
        assert_eq!(layer.text(), "Ref: AB 12 / tail");
    }

    #[test]
    fn test_search_across_lines_yields_box_per_line() {
        let doc = text_pdf(&["head AB", "CD tail"]);
        let layer = TextLayer::from_page(&doc, 1).unwrap();
        let rects = layer.search("AB CD");
        assert_eq!(rects.len(), 2);
        assert!(rects[0].y > rects[1].y);
    }

    #[test]
    fn test_search_miss_and_repeats() {
        let doc = text_pdf(&["X1 X1 X1"]);
        let layer = TextLayer::from_page(&doc, 1).unwrap();
        assert_eq!(layer.search("X1").len(), 3);
        assert!(layer.search("Y2").is_empty());
        assert!(layer.search("").is_empty());
    }

    #[test]
    fn test_invalid_page() {
        let doc = text_pdf(&["x"]);
        assert!(matches!(
            TextLayer::from_page(&doc, 2),
            Err(PdfError::InvalidPage(2))
        ));
    }

    #[test]
    fn test_kerning_gap_inserts_space() {
        let glyph = |text: &str, x: f32| Glyph {
            text: text.to_string(),
            bbox: BoundingBox::new(x, 0.0, 5.0, 10.0),
            origin: (x, 2.0),
            size: 10.0,
        };
        let layer = TextLayer::from_glyphs(1, vec![glyph("A", 0.0), glyph("B", 5.0), glyph("C", 20.0)]);
        assert_eq!(layer.text(), "AB C");
    }

    #[test]
    fn test_parent_cycle_ends_resource_lookup() {
        let mut doc = text_pdf(&["Ref: AB-12 /"]);
        let page_id = doc.get_pages()[&1];
        let pages_id = match doc.get_dictionary(page_id).unwrap().get(b"Parent").unwrap() {
            Object::Reference(id) => *id,
            other => panic!("unexpected parent {:?}", other),
        };
        let pages = doc.get_dictionary_mut(pages_id).unwrap();
        pages.remove(b"Resources");
        pages.set("Parent", Object::Reference(page_id));

        assert!(page_resources(&doc, page_id).is_none());
        assert!(inherited(&doc, page_id, b"MediaBox").is_some());
        assert!(inherited(&doc, page_id, b"Rotate").is_none());

        let layer = TextLayer::from_page(&doc, 1).unwrap();
        assert_eq!(layer.text(), "Ref: AB-12 /");
    }
}
