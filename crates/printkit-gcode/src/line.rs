//! Line-level G-code parsing.
//!
//! A [`GCodeLine`] is the raw word table for one source line: which
//! code letters appeared and with what values. A letter that appears
//! with no digits is recorded with value zero; that is distinct from a
//! letter that never appeared, and both cases matter to the
//! interpreter.

use printkit_core::{GcodeError, Result};
use std::collections::HashMap;

/// Code letters the dialect recognizes, everything else is ignored.
const CODE_LETTERS: [char; 20] = [
    'A', 'B', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'P', 'Q', 'R', 'S', 'T', 'X', 'Y',
    'Z',
];

/// One parsed source line.
#[derive(Debug, Clone)]
pub struct GCodeLine {
    line_number: usize,
    values: HashMap<char, f64>,
    comment: String,
}

impl GCodeLine {
    /// Parse one line. `line_number` is 1-based and only used for
    /// error reporting.
    pub fn parse(text: &str, line_number: usize) -> Result<GCodeLine> {
        let (stripped, comment) = split_comment(text);
        let mut values = HashMap::new();
        let upper = stripped.to_ascii_uppercase();
        let bytes = upper.as_bytes();

        let mut i = 0;
        while i < bytes.len() {
            let letter = bytes[i] as char;
            if !CODE_LETTERS.contains(&letter) {
                i += 1;
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && matches!(bytes[end], b'0'..=b'9' | b'.' | b'+' | b'-') {
                end += 1;
            }
            if end == start {
                // A bare letter still counts as seen.
                values.entry(letter).or_insert(0.0);
                i += 1;
                continue;
            }
            let token = &upper[start..end];
            let value: f64 = token.parse().map_err(|_| GcodeError::InvalidValue {
                line_number,
                letter,
                text: token.to_string(),
            })?;
            // A letter repeated on one line keeps its last value.
            values.insert(letter, value);
            i = end;
        }

        Ok(GCodeLine {
            line_number,
            values,
            comment,
        })
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Whether the letter appeared on the line at all.
    pub fn has(&self, letter: char) -> bool {
        self.values.contains_key(&letter)
    }

    /// The letter's value if it appeared.
    pub fn value(&self, letter: char) -> Option<f64> {
        self.values.get(&letter).copied()
    }

    /// The letter's value, or zero when absent. Callers that need the
    /// seen/unseen distinction use [`has`](GCodeLine::has).
    pub fn value_or_zero(&self, letter: char) -> f64 {
        self.value(letter).unwrap_or(0.0)
    }

    /// The comment text, with `|` already turned into line breaks.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// True when the line carries no codes: blank, or comment only.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Strip the comment from a line. One comment per line: the first
/// `(...)` group, or everything after `;`.
fn split_comment(text: &str) -> (String, String) {
    let mut comment = String::new();
    let mut stripped = text.to_string();

    if let Some(open) = stripped.find('(') {
        let close = stripped[open + 1..]
            .find(')')
            .map(|c| open + 1 + c)
            .unwrap_or(stripped.len());
        comment = stripped[open + 1..close].to_string();
        let tail = if close < stripped.len() {
            stripped[close + 1..].to_string()
        } else {
            String::new()
        };
        stripped.truncate(open);
        stripped.push_str(&tail);
    }

    if let Some(semi) = stripped.find(';') {
        comment = stripped[semi + 1..].to_string();
        stripped.truncate(semi);
    }

    (stripped, comment.trim().replace('|', "\n"))
}
