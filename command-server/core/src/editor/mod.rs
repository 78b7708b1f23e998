//! Editor Operations
//!
//! The catalog of editor commands a voice or scripting client drives through
//! the protocol. They operate on the active [`Document`] of a shared
//! [`Workspace`] and are registered under the `editor.` namespace with
//! [`register_editor_commands`].
//!
//! Line arguments are 1-based; offsets are 0-based character offsets. Every
//! operation fails with [`CommandError::NoActiveEditor`] when no document is
//! open.
//!
//! | id | args |
//! |----|------|
//! | `editor.jumpToLine` | line |
//! | `editor.selectLine` | line |
//! | `editor.selectLineRange` | from, to |
//! | `editor.extendSelectionToLine` | line |
//! | `editor.copyLinesToCursor` | from, to |
//! | `editor.setSelection` | start, end |
//! | `editor.getEditorContext` | |
//! | `editor.getFileName` | |
//! | `editor.getSelectedText` | |
//! | `editor.insertLineAbove` | |
//! | `editor.insertLineBelow` | |
//! | `editor.insertSnippet` | snippet |

mod document;
pub mod snippet;

pub use document::{Document, Position, Selection};

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::executor::{CommandArgs, CommandError, CommandRegistry};

/// Holder of the active document, shared between the host and the commands
#[derive(Clone, Debug, Default)]
pub struct Workspace {
    active: Arc<RwLock<Option<Document>>>,
}

impl Workspace {
    /// Create a workspace with no open document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `document` the active one
    pub fn open(&self, document: Document) {
        tracing::debug!(path = ?document.path(), "Document opened");
        *self.active.write() = Some(document);
    }

    /// Close the active document, returning it
    pub fn close(&self) -> Option<Document> {
        self.active.write().take()
    }

    /// Copy of the active document
    #[must_use]
    pub fn snapshot(&self) -> Option<Document> {
        self.active.read().clone()
    }

    /// Run `f` against the active document
    pub fn with_active<R>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<R, CommandError>,
    ) -> Result<R, CommandError> {
        let mut guard = self.active.write();
        let document = guard.as_mut().ok_or(CommandError::NoActiveEditor)?;
        f(document)
    }
}

type EditorOp = fn(&mut Document, &CommandArgs) -> Result<Value, CommandError>;

/// The catalog: identifier and implementation of every editor command
const EDITOR_COMMANDS: &[(&str, EditorOp)] = &[
    ("editor.jumpToLine", jump_to_line),
    ("editor.selectLine", select_line),
    ("editor.selectLineRange", select_line_range),
    ("editor.extendSelectionToLine", extend_selection_to_line),
    ("editor.copyLinesToCursor", copy_lines_to_cursor),
    ("editor.setSelection", set_selection),
    ("editor.getEditorContext", get_editor_context),
    ("editor.getFileName", get_file_name),
    ("editor.getSelectedText", get_selected_text),
    ("editor.insertLineAbove", insert_line_above),
    ("editor.insertLineBelow", insert_line_below),
    ("editor.insertSnippet", insert_snippet),
];

/// Register the editor catalog against `workspace`
pub fn register_editor_commands(registry: &CommandRegistry, workspace: &Workspace) {
    for &(id, op) in EDITOR_COMMANDS {
        let workspace = workspace.clone();
        registry.register_sync(id, move |args: CommandArgs| {
            workspace.with_active(|document| op(document, &args))
        });
    }
}

/// Identifiers of the editor catalog
#[must_use]
pub fn editor_command_ids() -> Vec<&'static str> {
    EDITOR_COMMANDS.iter().map(|&(id, _)| id).collect()
}

/// Read a 1-based line argument and convert it to a 0-based index
fn line_arg(document: &Document, args: &CommandArgs, index: usize, name: &str) -> Result<usize, CommandError> {
    let line: usize = args.required(index, name)?;
    if line == 0 || line > document.line_count() {
        return Err(args.invalid(format!(
            "{name} {line} is out of range (1-{})",
            document.line_count()
        )));
    }
    Ok(line - 1)
}

fn offset_arg(document: &Document, args: &CommandArgs, index: usize, name: &str) -> Result<usize, CommandError> {
    let offset: usize = args.required(index, name)?;
    if offset > document.char_count() {
        return Err(args.invalid(format!(
            "{name} {offset} is past the end of the document ({})",
            document.char_count()
        )));
    }
    Ok(offset)
}

fn line_start(line: usize) -> Position {
    Position::new(line, 0)
}

fn line_end(document: &Document, line: usize) -> Position {
    Position::new(line, document.line_len(line))
}

fn jump_to_line(document: &mut Document, args: &CommandArgs) -> Result<Value, CommandError> {
    let line = line_arg(document, args, 0, "line")?;
    document.set_selection(Selection::caret(line_start(line)));
    Ok(Value::Null)
}

fn select_line(document: &mut Document, args: &CommandArgs) -> Result<Value, CommandError> {
    let line = line_arg(document, args, 0, "line")?;
    document.set_selection(Selection {
        anchor: line_start(line),
        active: line_end(document, line),
    });
    Ok(Value::Null)
}

fn select_line_range(document: &mut Document, args: &CommandArgs) -> Result<Value, CommandError> {
    let from = line_arg(document, args, 0, "from")?;
    let to = line_arg(document, args, 1, "to")?;
    let (first, last) = (from.min(to), from.max(to));
    document.set_selection(Selection {
        anchor: line_start(first),
        active: line_end(document, last),
    });
    Ok(Value::Null)
}

fn extend_selection_to_line(
    document: &mut Document,
    args: &CommandArgs,
) -> Result<Value, CommandError> {
    let line = line_arg(document, args, 0, "line")?;
    let anchor = document.selection().anchor;
    let active = if line >= anchor.line {
        line_end(document, line)
    } else {
        line_start(line)
    };
    document.set_selection(Selection { anchor, active });
    Ok(Value::Null)
}

fn copy_lines_to_cursor(document: &mut Document, args: &CommandArgs) -> Result<Value, CommandError> {
    let from = line_arg(document, args, 0, "from")?;
    let to = line_arg(document, args, 1, "to")?;
    let (first, last) = (from.min(to), from.max(to));
    let text = document.text_between(line_start(first), line_end(document, last));

    let cursor = document.selection().active;
    let after = document.replace(cursor, cursor, &text);
    document.set_selection(Selection::caret(after));
    Ok(Value::Null)
}

fn set_selection(document: &mut Document, args: &CommandArgs) -> Result<Value, CommandError> {
    let start = offset_arg(document, args, 0, "start")?;
    let end = offset_arg(document, args, 1, "end")?;
    let selection = Selection {
        anchor: document.position_at(start),
        active: document.position_at(end),
    };
    document.set_selection(selection);
    Ok(Value::Null)
}

fn get_editor_context(document: &mut Document, _args: &CommandArgs) -> Result<Value, CommandError> {
    let selection = document.selection();
    Ok(json!({
        "fileName": document.path().to_string_lossy(),
        "lineCount": document.line_count(),
        "cursor": selection.active,
        "selection": {
            "start": document.offset_at(selection.start()),
            "end": document.offset_at(selection.end()),
        },
        "selectedText": document.selected_text(),
    }))
}

fn get_file_name(document: &mut Document, _args: &CommandArgs) -> Result<Value, CommandError> {
    Ok(json!(document.path().to_string_lossy()))
}

fn get_selected_text(document: &mut Document, _args: &CommandArgs) -> Result<Value, CommandError> {
    Ok(json!(document.selected_text()))
}

fn insert_line_above(document: &mut Document, _args: &CommandArgs) -> Result<Value, CommandError> {
    let line = document.selection().active.line;
    document.insert_lines(line, &[String::new()]);
    document.set_selection(Selection::caret(line_start(line)));
    Ok(Value::Null)
}

fn insert_line_below(document: &mut Document, _args: &CommandArgs) -> Result<Value, CommandError> {
    let line = document.selection().active.line + 1;
    document.insert_lines(line, &[String::new()]);
    document.set_selection(Selection::caret(line_start(line)));
    Ok(Value::Null)
}

fn insert_snippet(document: &mut Document, args: &CommandArgs) -> Result<Value, CommandError> {
    let body: String = args.required(0, "snippet")?;
    let expanded = snippet::expand(&body);

    let selection = document.selection();
    let base = document.offset_at(selection.start());
    let after = document.replace(selection.start(), selection.end(), &expanded.text);

    let selection = match expanded.cursor {
        Some((start, end)) => Selection {
            anchor: document.position_at(base + start),
            active: document.position_at(base + end),
        },
        None => Selection::caret(after),
    };
    document.set_selection(selection);
    Ok(Value::Null)
}
