//! Source location utilities
//!
//! Line/column tracking shared by the lexers, the error types and the tree
//! metadata. Offsets are byte offsets into the input; lines and columns are
//! 1-based and columns count characters, not bytes.

use std::fmt;

/// A position in source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourcePosition {
    /// Byte offset from start of input
    pub offset: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, counts characters)
    pub column: usize,
}

impl SourcePosition {
    /// Create a new source position
    #[inline]
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Position of the first character of the input
    #[inline]
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }

    /// Calculate position from a byte offset in the input
    pub fn from_offset(input: &[u8], offset: usize) -> Self {
        let offset = offset.min(input.len());
        let mut counter = LineCounter::new();
        counter.feed(&input[..offset], true);
        counter.position()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Incremental line/column counter
///
/// The lexers feed every matched slice through a counter so that each token
/// can be stamped with its start and end coordinates without rescanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCounter {
    /// Byte offset of the next unread byte
    pub char_pos: usize,
    /// Current line (1-based)
    pub line: usize,
    /// Current column (1-based)
    pub column: usize,
    /// Byte offset where the current line starts
    pub line_start_pos: usize,
}

impl LineCounter {
    /// Counter positioned at the start of the input
    pub fn new() -> Self {
        Self {
            char_pos: 0,
            line: 1,
            column: 1,
            line_start_pos: 0,
        }
    }

    /// Advance over `chunk`
    ///
    /// When `test_newline` is false the chunk is assumed to contain no newline,
    /// which lets the lexer skip the scan for terminals that cannot match one.
    pub fn feed(&mut self, chunk: &[u8], test_newline: bool) {
        if test_newline {
            if let Some(last) = memchr::memrchr(b'\n', chunk) {
                self.line += memchr::memchr_iter(b'\n', chunk).count();
                self.line_start_pos = self.char_pos + last + 1;
                self.char_pos += chunk.len();
                self.column = char_count(&chunk[last + 1..]) + 1;
                return;
            }
        }
        self.char_pos += chunk.len();
        self.column += char_count(chunk);
    }

    /// Current position
    #[inline]
    pub fn position(&self) -> SourcePosition {
        SourcePosition::new(self.char_pos, self.line, self.column)
    }
}

impl Default for LineCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of characters in a UTF-8 byte slice (bytes that start a character)
#[inline]
pub fn char_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| (b & 0xC0) != 0x80).count()
}

/// Render the line around `pos` with a caret under it
///
/// At most `span` bytes are shown on each side of the position and the window
/// never crosses a newline.
pub fn context_window(text: &[u8], pos: usize, span: usize) -> String {
    let pos = pos.min(text.len());
    let start = floor_boundary(text, pos.saturating_sub(span));
    let end = ceil_boundary(text, (pos + span).min(text.len()));

    let before = &text[start..pos];
    let before = match memchr::memrchr(b'\n', before) {
        Some(nl) => &before[nl + 1..],
        None => before,
    };
    let after = &text[pos..end];
    let after = match memchr::memchr(b'\n', after) {
        Some(nl) => &after[..nl],
        None => after,
    };

    let before = String::from_utf8_lossy(before);
    let after = String::from_utf8_lossy(after);
    let indent = display_width(&before);
    format!("{}{}\n{}^\n", before, after, " ".repeat(indent))
}

/// Width of a line prefix with tabs expanded to 8-column stops
fn display_width(s: &str) -> usize {
    let mut width = 0;
    for ch in s.chars() {
        if ch == '\t' {
            width += 8 - (width % 8);
        } else {
            width += 1;
        }
    }
    width
}

fn floor_boundary(text: &[u8], mut pos: usize) -> usize {
    while pos > 0 && pos < text.len() && (text[pos] & 0xC0) == 0x80 {
        pos -= 1;
    }
    pos
}

fn ceil_boundary(text: &[u8], mut pos: usize) -> usize {
    while pos < text.len() && (text[pos] & 0xC0) == 0x80 {
        pos += 1;
    }
    pos
}
