//! Source positions inside formula text

use std::fmt;

/// A location inside the formula text.
///
/// `offset` is a byte offset; `line` and `column` are 1-based, with the
/// column counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Position {
    /// Create a position from its parts
    pub fn new(offset: usize, line: u32, column: u32) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Position of the first character of any text
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }

    /// Resolve a byte offset into a full position within `text`.
    ///
    /// Offsets past the end clamp to the end of the text; offsets that fall
    /// inside a multi-byte character resolve to that character's column.
    pub fn locate(text: &str, offset: usize) -> Self {
        let offset = offset.min(text.len());
        let mut line = 1;
        let mut column = 1;

        for (idx, c) in text.char_indices() {
            if idx >= offset {
                break;
            }
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }

        Self::new(offset, line, column)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Incremental offset -> position resolver for a single text.
///
/// The parser asks for positions in mostly increasing order, so the
/// locator keeps the last resolved point and scans forward from it.
#[derive(Debug, Clone)]
pub(crate) struct Locator<'a> {
    text: &'a str,
    last: Position,
}

impl<'a> Locator<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            text,
            last: Position::start(),
        }
    }

    pub(crate) fn locate(&mut self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        if offset < self.last.offset {
            self.last = Position::locate(self.text, offset);
            return self.last;
        }

        let mut line = self.last.line;
        let mut column = self.last.column;
        for c in self.text[self.last.offset..offset].chars() {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }

        self.last = Position::new(offset, line, column);
        self.last
    }
}
