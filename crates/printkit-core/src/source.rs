//! G-code sources.
//!
//! A build streams lines from a [`GCodeSource`]. Sources are fully
//! materialized so the interpreter can rewind to line one (M30) without
//! re-opening anything.

use crate::error::Result;
use std::fs;
use std::path::Path;

/// A restartable stream of G-code lines.
pub trait GCodeSource: Send {
    /// Total number of lines, for progress reporting.
    fn line_count(&self) -> usize;

    /// Iterate the lines from the beginning. May be called repeatedly;
    /// every call starts over at line one.
    fn lines(&self) -> Box<dyn Iterator<Item = &str> + '_>;
}

/// A source backed by lines already in memory.
#[derive(Debug, Clone, Default)]
pub struct StringVecSource {
    lines: Vec<String>,
}

impl StringVecSource {
    pub fn new(lines: Vec<String>) -> Self {
        StringVecSource { lines }
    }

    /// Split a G-code document into lines.
    pub fn from_text(text: &str) -> Self {
        StringVecSource {
            lines: text.lines().map(|l| l.to_string()).collect(),
        }
    }
}

impl GCodeSource for StringVecSource {
    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn lines(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.lines.iter().map(|s| s.as_str()))
    }
}

/// A source read from a file on disk at construction time.
#[derive(Debug)]
pub struct GCodeFileSource {
    inner: StringVecSource,
}

impl GCodeFileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(GCodeFileSource {
            inner: StringVecSource::from_text(&text),
        })
    }
}

impl GCodeSource for GCodeFileSource {
    fn line_count(&self) -> usize {
        self.inner.line_count()
    }

    fn lines(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        self.inner.lines()
    }
}
