//! In-memory text document with a single selection.
//!
//! Positions are 0-based `(line, character)` pairs; offsets are 0-based
//! character offsets into the full text where each line break counts as one
//! character.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// A location in a document
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Position {
    /// 0-based line
    pub line: usize,
    /// 0-based character within the line
    pub character: usize,
}

impl Position {
    /// Create a position
    #[must_use]
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// A selection: the anchor stays put, the active end is the cursor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Where the selection started
    pub anchor: Position,
    /// Where the cursor is
    pub active: Position,
}

impl Selection {
    /// An empty selection at `pos`
    #[must_use]
    pub fn caret(pos: Position) -> Self {
        Self {
            anchor: pos,
            active: pos,
        }
    }

    /// Earlier of the two ends
    #[must_use]
    pub fn start(&self) -> Position {
        self.anchor.min(self.active)
    }

    /// Later of the two ends
    #[must_use]
    pub fn end(&self) -> Position {
        self.anchor.max(self.active)
    }

    /// Whether nothing is selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchor == self.active
    }
}

/// An open document
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    path: PathBuf,
    lines: Vec<String>,
    selection: Selection,
}

impl Document {
    /// Create a document from its text
    pub fn new(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: text.split('\n').map(str::to_string).collect(),
            selection: Selection::default(),
        }
    }

    /// Document path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full text
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Number of lines (an empty document has one empty line)
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Text of a 0-based line
    #[must_use]
    pub fn line(&self, line: usize) -> Option<&str> {
        self.lines.get(line).map(String::as_str)
    }

    /// Number of characters in a 0-based line
    #[must_use]
    pub fn line_len(&self, line: usize) -> usize {
        self.lines.get(line).map_or(0, |l| l.chars().count())
    }

    /// Total number of characters, counting line breaks
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.lines.iter().map(|l| l.chars().count()).sum::<usize>() + self.lines.len() - 1
    }

    /// Current selection
    #[must_use]
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Replace the selection, clamping both ends into the document
    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = Selection {
            anchor: self.clamp(selection.anchor),
            active: self.clamp(selection.active),
        };
    }

    /// Clamp a position into the document
    #[must_use]
    pub fn clamp(&self, pos: Position) -> Position {
        let line = pos.line.min(self.lines.len() - 1);
        Position::new(line, pos.character.min(self.line_len(line)))
    }

    /// Offset of a position
    #[must_use]
    pub fn offset_at(&self, pos: Position) -> usize {
        let pos = self.clamp(pos);
        let before: usize = self.lines[..pos.line]
            .iter()
            .map(|l| l.chars().count() + 1)
            .sum();
        before + pos.character
    }

    /// Position of an offset, clamped to the end of the document
    #[must_use]
    pub fn position_at(&self, offset: usize) -> Position {
        let mut remaining = offset;
        for (line, text) in self.lines.iter().enumerate() {
            let len = text.chars().count();
            if remaining <= len {
                return Position::new(line, remaining);
            }
            remaining -= len + 1;
        }
        let last = self.lines.len() - 1;
        Position::new(last, self.line_len(last))
    }

    /// Text between two positions
    #[must_use]
    pub fn text_between(&self, start: Position, end: Position) -> String {
        let (start, end) = (self.offset_at(start.min(end)), self.offset_at(start.max(end)));
        self.text().chars().skip(start).take(end - start).collect()
    }

    /// Selected text
    #[must_use]
    pub fn selected_text(&self) -> String {
        self.text_between(self.selection.start(), self.selection.end())
    }

    /// Replace the text between two positions, returning the position after
    /// the inserted text
    pub fn replace(&mut self, start: Position, end: Position, insert: &str) -> Position {
        let (start, end) = (self.offset_at(start.min(end)), self.offset_at(start.max(end)));
        let text = self.text();
        let head: String = text.chars().take(start).collect();
        let tail: String = text.chars().skip(end).collect();

        let inserted = insert.chars().count();
        self.lines = format!("{head}{insert}{tail}")
            .split('\n')
            .map(str::to_string)
            .collect();
        self.position_at(start + inserted)
    }

    /// Insert lines before the 0-based `index` (which may equal `line_count`)
    pub fn insert_lines(&mut self, index: usize, lines: &[String]) {
        let index = index.min(self.lines.len());
        self.lines.splice(index..index, lines.iter().cloned());
    }
}
