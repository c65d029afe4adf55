//! Code extraction: a labelled span between a marker and a terminator.
//!
//! The same rule runs over continuous text (digital text layers, OCR full
//! text) and over spatial token streams (OCR words), so codes broken across
//! lines or split into several OCR tokens are still recovered.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::RefmarkError;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Extraction rule: `marker`, then characters from `charset`, up to `terminator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Literal label preceding a code.
    pub marker: String,

    /// Regex character-class body of allowed code characters (without brackets).
    pub charset: String,

    /// Literal string ending a code span.
    pub terminator: String,

    /// Codes must be strictly longer than this.
    pub min_len: usize,

    /// Codes must be strictly shorter than this.
    pub max_len: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            marker: "Ref:".to_string(),
            charset: r"A-Za-z0-9:.\-\s".to_string(),
            terminator: "/".to_string(),
            min_len: 3,
            max_len: 20,
        }
    }
}

impl PatternConfig {
    /// Replace whichever of the three rule parts are given.
    pub fn with_overrides(
        mut self,
        marker: Option<&str>,
        charset: Option<&str>,
        terminator: Option<&str>,
    ) -> Self {
        if let Some(marker) = marker {
            self.marker = marker.to_string();
        }
        if let Some(charset) = charset {
            self.charset = charset.to_string();
        }
        if let Some(terminator) = terminator {
            self.terminator = terminator.to_string();
        }
        self
    }
}

/// Compiled extraction rule. Stateless; every call is independent.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    config: PatternConfig,
    span: Regex,
    allowed: Regex,
}

impl PatternMatcher {
    /// Compile a rule, rejecting empty markers/terminators and bad character classes.
    pub fn new(config: PatternConfig) -> Result<Self, RefmarkError> {
        if config.marker.trim().is_empty() {
            return Err(RefmarkError::Config("pattern marker must not be empty".into()));
        }
        if config.terminator.is_empty() {
            return Err(RefmarkError::Config("pattern terminator must not be empty".into()));
        }
        if config.min_len >= config.max_len {
            return Err(RefmarkError::Config(format!(
                "pattern length bounds are empty: {} < len < {}",
                config.min_len, config.max_len
            )));
        }

        let class = class_body(&config.charset)?;
        let span = Regex::new(&format!(
            r"{}\s*([{}]+?){}",
            regex::escape(config.marker.trim()),
            class,
            regex::escape(&config.terminator)
        ))
        .map_err(|e| RefmarkError::Config(format!("invalid pattern charset: {}", e)))?;
        let allowed = Regex::new(&format!("^[{}]+$", class))
            .map_err(|e| RefmarkError::Config(format!("invalid pattern charset: {}", e)))?;

        Ok(Self {
            config,
            span,
            allowed,
        })
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    fn marker(&self) -> &str {
        self.config.marker.trim()
    }

    /// Extract codes from running text.
    pub fn extract_from_text(&self, text: &str) -> Vec<String> {
        let cleaned = WHITESPACE.replace_all(text, " ");
        let mut codes = CodeSet::default();
        let mut spans = 0;

        for caps in self.span.captures_iter(&cleaned) {
            spans += 1;
            if let Some(code) = self.normalize(&caps[1]) {
                codes.push(code);
            }
        }

        let markers = cleaned.matches(self.marker()).count();
        if markers > spans {
            trace!(
                "{} marker occurrence(s) without a terminated span",
                markers - spans
            );
        }

        codes.into_vec()
    }

    /// Extract codes from an ordered token stream.
    ///
    /// After a marker token, following tokens are concatenated until one
    /// contains the terminator; its prefix before the terminator closes the code.
    pub fn extract_from_tokens<T: AsRef<str>>(&self, tokens: &[T]) -> Vec<String> {
        let marker = self.marker();
        let terminator = self.config.terminator.as_str();
        let mut codes = CodeSet::default();
        let mut pending: Option<String> = None;

        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }

            if let Some(rest) = token.strip_prefix(marker) {
                if pending.is_some() {
                    trace!("marker restarted an unterminated code");
                }
                match rest.find(terminator) {
                    Some(pos) => {
                        pending = None;
                        self.accept_joined(&rest[..pos], &mut codes);
                    }
                    None => pending = Some(rest.to_string()),
                }
                continue;
            }

            if let Some(mut acc) = pending.take() {
                match token.find(terminator) {
                    Some(pos) => {
                        acc.push_str(&token[..pos]);
                        self.accept_joined(&acc, &mut codes);
                    }
                    None => {
                        acc.push_str(token);
                        pending = Some(acc);
                    }
                }
            }
        }

        if let Some(acc) = pending {
            trace!("token stream ended inside an unterminated code: {:?}", acc);
        }

        codes.into_vec()
    }

    /// Comparison form of an OCR token: no whitespace, marker prefix and
    /// anything from the terminator on removed.
    pub fn token_fragment(&self, token: &str) -> String {
        let mut s = token.trim();
        if let Some(rest) = s.strip_prefix(self.marker()) {
            s = rest;
        }
        if let Some(pos) = s.find(self.config.terminator.as_str()) {
            s = &s[..pos];
        }
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn accept_joined(&self, candidate: &str, codes: &mut CodeSet) {
        if let Some(code) = self.normalize(candidate) {
            if self.allowed.is_match(&code) {
                codes.push(code);
            } else {
                trace!("token code {:?} has characters outside the charset", code);
            }
        }
    }

    /// Strip whitespace and apply length and digit rules.
    fn normalize(&self, candidate: &str) -> Option<String> {
        let code: String = candidate.chars().filter(|c| !c.is_whitespace()).collect();
        let len = code.chars().count();

        if len <= self.config.min_len || len >= self.config.max_len {
            trace!("rejected {:?}: length {} out of bounds", code, len);
            return None;
        }
        if !code.chars().any(|c| c.is_ascii_digit()) {
            trace!("rejected {:?}: no digit", code);
            return None;
        }
        Some(code)
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(PatternConfig::default()).expect("default pattern compiles")
    }
}

/// Order-preserving set of codes.
#[derive(Default)]
struct CodeSet {
    seen: HashSet<String>,
    codes: Vec<String>,
}

impl CodeSet {
    fn push(&mut self, code: String) {
        if self.seen.insert(code.clone()) {
            self.codes.push(code);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.codes
    }
}

/// Accept `A-Z0-9` or `[A-Z0-9]`.
fn class_body(charset: &str) -> Result<&str, RefmarkError> {
    let body = charset
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(charset);
    if body.is_empty() {
        return Err(RefmarkError::Config("pattern charset must not be empty".into()));
    }
    Ok(body)
}

/// Merge code lists, keeping first-seen order.
pub fn merge_codes<I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut codes = CodeSet::default();
    for list in lists {
        for code in list {
            codes.push(code);
        }
    }
    codes.into_vec()
}
