//! Just enough font handling to place glyphs: code decoding and advance widths.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};
use tracing::trace;

/// Decoding and metrics for one page font resource.
#[derive(Debug, Clone, Default)]
pub(crate) struct FontInfo {
    /// Composite (Type0) fonts use two-byte codes.
    two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: Option<f32>,
    monospace: bool,
    to_unicode: HashMap<u32, String>,
}

impl FontInfo {
    /// Read a font dictionary. Missing pieces fall back to approximations.
    pub(crate) fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let mut font = FontInfo::default();

        let subtype = dict.get(b"Subtype").ok().and_then(|o| o.as_name().ok());
        let base_font = dict
            .get(b"BaseFont")
            .ok()
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_default();
        font.monospace = base_font.contains("Courier");

        if subtype == Some(b"Type0".as_slice()) {
            font.two_byte = true;
            if let Some(descendant) = dict
                .get(b"DescendantFonts")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| arr.first())
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_dict().ok())
            {
                font.default_width = descendant.get(b"DW").ok().and_then(number).or(Some(1000.0));
                if let Ok(w) = descendant.get(b"W") {
                    if let Ok(w) = resolve(doc, w).as_array() {
                        font.cid_widths = parse_cid_widths(doc, w);
                    }
                }
            }
        } else {
            font.first_char = dict
                .get(b"FirstChar")
                .ok()
                .and_then(number)
                .map(|n| n.max(0.0) as u32)
                .unwrap_or(0);
            if let Ok(widths) = dict.get(b"Widths") {
                if let Ok(arr) = resolve(doc, widths).as_array() {
                    font.widths = arr
                        .iter()
                        .map(|o| number(resolve(doc, o)).unwrap_or(0.0))
                        .collect();
                }
            }
        }

        if let Ok(obj) = dict.get(b"ToUnicode") {
            if let Object::Stream(stream) = resolve(doc, obj) {
                let data = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                font.to_unicode = parse_cmap(&String::from_utf8_lossy(&data));
                trace!("font {} has {} ToUnicode entries", base_font, font.to_unicode.len());
            }
        }

        font
    }

    /// Split a shown string into character codes with their Unicode text.
    pub(crate) fn decode(&self, bytes: &[u8]) -> Vec<(u32, String)> {
        let codes: Vec<u32> = if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| c.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
                .collect()
        } else {
            bytes.iter().map(|b| *b as u32).collect()
        };

        codes
            .into_iter()
            .map(|code| {
                let text = match self.to_unicode.get(&code) {
                    Some(s) => s.clone(),
                    None if self.two_byte => char::from_u32(code)
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                    // Latin-1 is close enough to WinAnsi for the characters codes use.
                    None => (code as u8 as char).to_string(),
                };
                (code, text)
            })
            .collect()
    }

    /// Whether the code is the single-byte space that word spacing applies to.
    pub(crate) fn is_word_space(&self, code: u32) -> bool {
        !self.two_byte && code == 32
    }

    /// Advance width in thousandths of text space.
    pub(crate) fn width(&self, code: u32, text: &str) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .or(self.default_width)
                .unwrap_or(1000.0);
        }
        if let Some(w) = code
            .checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
        {
            if *w > 0.0 {
                return *w;
            }
        }
        if self.monospace {
            return 600.0;
        }
        approx_width(text.chars().next().unwrap_or(' '))
    }
}

/// Rough Helvetica advance widths for fonts without a `/Widths` array.
fn approx_width(ch: char) -> f32 {
    match ch {
        ' ' | '.' | ',' | ':' | ';' | '!' | '/' | 'I' | '\'' | '|' => 278.0,
        'i' | 'j' | 'l' => 222.0,
        'f' | 't' => 278.0,
        'r' | '-' | '(' | ')' => 333.0,
        'M' => 833.0,
        'W' => 944.0,
        'm' => 833.0,
        'w' => 722.0,
        '0'..='9' => 556.0,
        'A'..='Z' => 667.0,
        'a'..='z' => 556.0,
        _ => 556.0,
    }
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    doc.dereference(obj).map(|(_, o)| o).unwrap_or(obj)
}

pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Parse a CIDFont `/W` array: `c [w1 w2 ...]` or `c_first c_last w`.
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;

    while i < w.len() {
        let Some(first) = number(resolve(doc, &w[i])).map(|n| n as u32) else {
            break;
        };
        match w.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (k, v) in list.iter().enumerate() {
                    let Some(code) = first.checked_add(k as u32) else {
                        break;
                    };
                    if let Some(n) = number(resolve(doc, v)) {
                        widths.insert(code, n);
                    }
                }
                i += 2;
            }
            Some(other) => {
                let last = number(other).map(|n| n as u32).unwrap_or(first);
                if let Some(n) = w.get(i + 2).and_then(|o| number(resolve(doc, o))) {
                    for code in first..=last.min(first.saturating_add(0xFFFF)) {
                        widths.insert(code, n);
                    }
                }
                i += 3;
            }
            None => break,
        }
    }

    widths
}

#[derive(Debug, PartialEq)]
enum CmapToken {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

fn tokenize_cmap(text: &str) -> Vec<CmapToken> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' if chars.peek() == Some(&'<') => {
                chars.next();
                tokens.push(CmapToken::Word("<<".into()));
            }
            '<' => {
                let mut hex = String::new();
                for h in chars.by_ref() {
                    if h == '>' {
                        break;
                    }
                    if h.is_ascii_hexdigit() {
                        hex.push(h);
                    }
                }
                if hex.len() % 2 == 1 {
                    hex.push('0');
                }
                let bytes = (0..hex.len())
                    .step_by(2)
                    .filter_map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
                    .collect();
                tokens.push(CmapToken::Hex(bytes));
            }
            '[' => tokens.push(CmapToken::Open),
            ']' => tokens.push(CmapToken::Close),
            c if c.is_whitespace() => {}
            c => {
                let mut word = c.to_string();
                while let Some(&n) = chars.peek() {
                    if n.is_whitespace() || matches!(n, '<' | '[' | ']') {
                        break;
                    }
                    word.push(n);
                    chars.next();
                }
                tokens.push(CmapToken::Word(word));
            }
        }
    }

    tokens
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|c| if c.len() == 2 { u16::from_be_bytes([c[0], c[1]]) } else { c[0] as u16 })
        .collect()
}

/// Parse the `bfchar`/`bfrange` sections of a ToUnicode CMap.
pub(crate) fn parse_cmap(text: &str) -> HashMap<u32, String> {
    #[derive(PartialEq)]
    enum Mode {
        None,
        Char,
        Range,
    }

    let tokens = tokenize_cmap(text);
    let mut map = HashMap::new();
    let mut mode = Mode::None;
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            CmapToken::Word(w) => match w.as_str() {
                "beginbfchar" => mode = Mode::Char,
                "beginbfrange" => mode = Mode::Range,
                "endbfchar" | "endbfrange" => mode = Mode::None,
                _ => {}
            },
            CmapToken::Hex(src) if mode == Mode::Char => {
                if let Some(CmapToken::Hex(dst)) = tokens.get(i + 1) {
                    map.insert(code_of(src), String::from_utf16_lossy(&utf16_units(dst)));
                    i += 1;
                }
            }
            CmapToken::Hex(lo) if mode == Mode::Range => {
                let lo = code_of(lo);
                match (tokens.get(i + 1), tokens.get(i + 2)) {
                    (Some(CmapToken::Hex(hi)), Some(CmapToken::Hex(dst))) => {
                        let hi = code_of(hi).min(lo.saturating_add(0xFFFF));
                        let base = utf16_units(dst);
                        for offset in 0..=hi.saturating_sub(lo) {
                            let mut units = base.clone();
                            if let Some(last) = units.last_mut() {
                                *last = last.wrapping_add(offset as u16);
                            }
                            map.insert(lo + offset, String::from_utf16_lossy(&units));
                        }
                        i += 2;
                    }
                    (Some(CmapToken::Hex(_)), Some(CmapToken::Open)) => {
                        let mut j = i + 3;
                        let mut code = lo;
                        while let Some(CmapToken::Hex(dst)) = tokens.get(j) {
                            map.insert(code, String::from_utf16_lossy(&utf16_units(dst)));
                            code += 1;
                            j += 1;
                        }
                        i = j;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        i += 1;
    }

    map
}
