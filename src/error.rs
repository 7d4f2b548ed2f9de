//! The flat error taxonomy returned by [`crate::parse`].

use crate::util::Position;
use std::fmt::{Display, Formatter};

/// Every way a parse can fail, each carrying the [`Position`] at which the
/// scanner or tree builder detected the problem.
///
/// This is intentionally flat (one kind per failure) rather than a nested
/// error tree: the core has exactly one caller-facing decision point (did
/// the parse succeed) and the variant plus position is enough for a caller
/// to format a message.
#[derive(Debug, Clone, PartialEq)]
pub enum TomlError {
    /// Any lexical or structural violation not covered by a more specific
    /// variant below.
    SyntaxError { at: Position, message: String },
    /// The input was well-formed so far but ended mid-token or mid-statement.
    UnexpectedEndOfInput { at: Position },
    /// The token sequence was grammatically wrong at a structural decision
    /// point (e.g. a value token where a key was expected).
    UnexpectedToken { at: Position, message: String },
    /// The declaration registry forbids the new entry (re-assignment of an
    /// existing key, re-declaration of an explicit table, etc).
    DuplicateKey { at: Position, key: String },
    /// `max_value_len` was exceeded while coalescing a fragmented token.
    ValueTooLong { at: Position, limit: usize },
    /// A numeric or datetime lexeme failed its type-specific decoding.
    InvalidCharacter { at: Position, message: String },
    /// An integer literal did not fit in a signed 64-bit integer.
    Overflow { at: Position, literal: String },
    /// A `\uXXXX`/`\UXXXXXXXX` escape named a codepoint above `U+10FFFF`.
    CodepointTooLarge { at: Position, codepoint: u32 },
    /// A `\uXXXX`/`\UXXXXXXXX` escape named a UTF-16 surrogate half, which
    /// cannot be re-encoded as a standalone UTF-8 sequence.
    CannotEncodeSurrogateHalf { at: Position, codepoint: u32 },
}

impl TomlError {
    /// The position at which the failure was detected.
    pub fn position(&self) -> Position {
        match self {
            TomlError::SyntaxError { at, .. }
            | TomlError::UnexpectedEndOfInput { at }
            | TomlError::UnexpectedToken { at, .. }
            | TomlError::DuplicateKey { at, .. }
            | TomlError::ValueTooLong { at, .. }
            | TomlError::InvalidCharacter { at, .. }
            | TomlError::Overflow { at, .. }
            | TomlError::CodepointTooLarge { at, .. }
            | TomlError::CannotEncodeSurrogateHalf { at, .. } => *at,
        }
    }
}

impl Display for TomlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TomlError::SyntaxError { at, message } => {
                write!(f, "SyntaxError: {} at {}", message, at)
            }
            TomlError::UnexpectedEndOfInput { at } => {
                write!(f, "UnexpectedEndOfInput: truncated input at {}", at)
            }
            TomlError::UnexpectedToken { at, message } => {
                write!(f, "UnexpectedToken: {} at {}", message, at)
            }
            TomlError::DuplicateKey { at, key } => {
                write!(f, "DuplicateKey: `{}` at {}", key, at)
            }
            TomlError::ValueTooLong { at, limit } => {
                write!(f, "ValueTooLong: exceeds max_value_len ({}) at {}", limit, at)
            }
            TomlError::InvalidCharacter { at, message } => {
                write!(f, "InvalidCharacter: {} at {}", message, at)
            }
            TomlError::Overflow { at, literal } => {
                write!(f, "Overflow: `{}` does not fit in i64 at {}", literal, at)
            }
            TomlError::CodepointTooLarge { at, codepoint } => {
                write!(f, "CodepointTooLarge: U+{:X} at {}", codepoint, at)
            }
            TomlError::CannotEncodeSurrogateHalf { at, codepoint } => {
                write!(f, "CannotEncodeSurrogateHalf: U+{:X} at {}", codepoint, at)
            }
        }
    }
}

impl std::error::Error for TomlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let err = TomlError::DuplicateKey {
            at: Position::new(3, 5),
            key: "a.b".to_string(),
        };
        let message = format!("{}", err);
        assert!(message.contains("a.b"));
        assert!(message.contains("line 3"));
    }
}
