//! The token vocabulary emitted by the [`crate::scanner::Scanner`].
//!
//! Tokens come in three flavors: purely structural tokens that
//! carry no content, contentful tokens that borrow a slice of the input,
//! and fragmentary tokens used to stream a string/key whose raw bytes are
//! not contiguous (because an escape interrupted them). The tree builder
//! (or the scanner's own coalescing accessor, see `next_coalesced`) stitches
//! fragments back together.

/// A raw token produced by one step of the scanner state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    // --- structural, no payload ---
    KeyBegin,
    TableKeyBegin,
    ArrayTableKeyBegin,
    TableBegin,
    ValueBegin,
    ArrayBegin,
    ArrayEnd,
    InlineTableBegin,
    InlineTableEnd,
    True,
    False,
    EndOfDocument,

    // --- contentful, borrowed slice of the input ---
    Key(&'a str),
    Str(&'a str),
    Int(&'a str),
    Float(&'a str),
    Datetime(&'a str),

    // --- contentful, fragmentary: a chunk of raw bytes from the current
    // string/key, with more fragments (or a final Key/Str) still to come ---
    PartialKey(&'a str),
    PartialString(&'a str),
    // a single byte decoded from a `\b \t \n \f \r \" \\` escape, or the
    // low byte of a re-encoded `\u`/`\U` escape
    PartialKeyEscaped(u8),
    PartialStringEscaped(u8),
}

impl<'a> Token<'a> {
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            Token::Key(_)
                | Token::Str(_)
                | Token::Int(_)
                | Token::Float(_)
                | Token::Datetime(_)
                | Token::PartialKey(_)
                | Token::PartialString(_)
                | Token::PartialKeyEscaped(_)
                | Token::PartialStringEscaped(_)
        )
    }
}

/// The fully coalesced form of a scanner token, returned by the higher-level
/// accessor once fragments (if any) have been stitched into one borrowed or
/// owned string.
#[derive(Debug, Clone, PartialEq)]
pub enum CoalescedToken<'a> {
    KeyBegin,
    TableKeyBegin,
    ArrayTableKeyBegin,
    TableBegin,
    ValueBegin,
    ArrayBegin,
    ArrayEnd,
    InlineTableBegin,
    InlineTableEnd,
    True,
    False,
    EndOfDocument,
    Key(std::borrow::Cow<'a, str>),
    Str(std::borrow::Cow<'a, str>),
    Int(&'a str),
    Float(&'a str),
    Datetime(&'a str),
}
