//! Small ambient utilities shared by the scanner and the tree builder:
//! source position tracking and a debug-only trace facility.

mod code;
mod logger;
mod position;
use once_cell::unsync::OnceCell;

/// A 1-based line/column pair identifying a byte offset in the input.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// The optional diagnostics handle described in spec.md §6: current line,
/// column, and cumulative byte offset, as of the point the scanner last
/// reached -- the end of the document on success, or the failure point on
/// error (where the error variant's own `Position` already carries the
/// same line/column).
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Diagnostics {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

impl Diagnostics {
    pub fn new(position: Position, byte_offset: usize) -> Self {
        Self {
            line: position.line,
            column: position.column,
            byte_offset,
        }
    }
}

/// A thin wrapper around the input byte slice that lazily builds a table of
/// newline offsets, used to turn a cursor position into a [`Position`] only
/// when a diagnostic actually needs one.
pub struct Code<'c> {
    pub value: &'c [u8],
    line_breaks: OnceCell<Vec<usize>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Ordered debug-trace levels for the scanner and tree builder.
///
/// Consulted only under `#[cfg(debug_assertions)]`; in release builds the
/// checks compile away entirely. Set once per `Scanner`/`TreeBuilder` via
/// `set_log`.
pub enum Log<T> {
    None,
    Default(T),
    Success(T),
    Result(T),
    Verbose(T),
}
