//! The lexical scanner: a single-pass state machine over a complete UTF-8
//! byte buffer.
//!
//! [`Scanner::next_raw`] is the low-level pull interface: it returns one
//! [`Token`] per call, including `Partial*` fragments when a string's raw
//! bytes are interrupted by an escape. [`Scanner::next_coalesced`] is the
//! higher-level allocating accessor that drives `next_raw` in a loop and
//! stitches fragments into a single `Cow<str>` -- borrowed when the string
//! was one contiguous span with no escapes, owned otherwise.
//!
//! The scanner never consults the declaration registry and the tree
//! builder never re-examines bytes.

mod number;
mod utf8;

use crate::error::TomlError;
use crate::token::Token;
use crate::util::{Code, Log, Position};
use once_cell::unsync::OnceCell;
use std::borrow::Cow;
use std::collections::VecDeque;

/// A container the mode stack is currently nested inside. Whitespace,
/// newline, comma, and closing-delimiter legality all key off this.
/// `Key`/`Value`/`Comma`/`LineFeed` transient markers are folded into the
/// explicit `ScanState` variants below instead of separate stack frames;
/// see DESIGN.md for why that's an observably equivalent simplification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Array,
    InlineTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyContext {
    Assignment,
    TableHeader,
    ArrayTableHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringFlavor {
    Basic,
    Literal,
    MultiLineBasic,
    MultiLineLiteral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StringCtx {
    flavor: StringFlavor,
    in_key: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    LineStart,
    ExpectKeySegment(KeyContext),
    AfterKeySegment(KeyContext),
    BeforeValue,
    InlineTableOpen,
    InlineTableNextKey,
    PostValue,
    Done,
}

/// The byte-oriented TOML scanner.
pub struct Scanner<'a> {
    input: &'a [u8],
    cursor: usize,
    code: Code<'a>,
    state: ScanState,
    mode_stack: Vec<Container>,
    string_ctx: Option<StringCtx>,
    pending_key_ctx: Option<KeyContext>,
    escape_queue: VecDeque<u8>,
    log: OnceCell<Log<&'static str>>,
}

impl<'a> Scanner<'a> {
    /// Construct a scanner over a complete input slice. Rejects a leading
    /// byte-order mark; callers are expected to strip one upstream if
    /// their source may carry it.
    pub fn new(input: &'a [u8]) -> Result<Self, TomlError> {
        if input.starts_with(&[0xef, 0xbb, 0xbf]) {
            return Err(TomlError::SyntaxError {
                at: Position::new(1, 1),
                message: "input begins with a byte-order mark".to_string(),
            });
        }
        Ok(Self {
            input,
            cursor: 0,
            code: Code::from(input),
            state: ScanState::LineStart,
            mode_stack: Vec::new(),
            string_ctx: None,
            pending_key_ctx: None,
            escape_queue: VecDeque::new(),
            log: OnceCell::new(),
        })
    }

    pub fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.log
            .set(log)
            .map_err(|err| format!("Log label {} is already assigned.", err))
    }

    /// Current line/column, recomputed lazily from the cached newline
    /// table on the underlying [`Code`]. Doubles as the public diagnostics
    /// handle: callers read it after an error to format a message, or at
    /// any point mid-parse for progress reporting.
    pub fn position(&self) -> Position {
        self.code.obtain_position(self.cursor)
    }

    pub fn byte_offset(&self) -> usize {
        self.cursor
    }

    const VERBOSE_ORDER: u8 = 4;

    fn trace(&self, message: impl Fn() -> String) {
        #[cfg(debug_assertions)]
        if let Some(log) = self.log.get() {
            if log.order() >= Self::VERBOSE_ORDER {
                println!("[scanner @ {}] {}", self.position(), message());
            }
        }
        #[cfg(not(debug_assertions))]
        let _ = message;
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.cursor).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.cursor + offset).copied()
    }

    fn starts_with(&self, needle: &[u8]) -> bool {
        self.input[self.cursor..].starts_with(needle)
    }

    fn syntax_error(&self, message: &str) -> TomlError {
        TomlError::SyntaxError {
            at: self.position(),
            message: message.to_string(),
        }
    }

    fn eof_error(&self) -> TomlError {
        TomlError::UnexpectedEndOfInput { at: self.position() }
    }

    fn skip_blank(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.cursor += 1;
        }
    }

    fn consume_newline(&mut self) {
        if self.peek() == Some(b'\r') && self.peek_at(1) == Some(b'\n') {
            self.cursor += 2;
        } else {
            self.cursor += 1;
        }
    }

    fn slice_str(&self, start: usize, end: usize) -> Result<&'a str, TomlError> {
        std::str::from_utf8(&self.input[start..end]).map_err(|_| self.syntax_error("invalid UTF-8"))
    }

    fn is_at_word_boundary(&self, after: usize) -> bool {
        match self.input.get(after) {
            None => true,
            Some(b) => !is_bare_key_char(*b),
        }
    }

    /// Top-level entry point: one raw token per call.
    pub fn next_raw(&mut self) -> Result<Token<'a>, TomlError> {
        if let Some(byte) = self.escape_queue.pop_front() {
            let ctx = self.string_ctx.expect("escape queue only fills mid-string");
            return Ok(wrap_escape(ctx, byte));
        }
        if let Some(ctx) = self.string_ctx {
            return self.continue_string(ctx);
        }
        match self.state {
            ScanState::LineStart => self.scan_line_start(),
            ScanState::ExpectKeySegment(ctx) => self.scan_key_segment(ctx),
            ScanState::AfterKeySegment(ctx) => self.scan_after_key_segment(ctx),
            ScanState::BeforeValue => self.scan_before_value(),
            ScanState::InlineTableOpen => self.scan_inline_key_or_close(true),
            ScanState::InlineTableNextKey => self.scan_inline_key_or_close(false),
            ScanState::PostValue => self.scan_post_value(),
            ScanState::Done => Ok(Token::EndOfDocument),
        }
    }

    /// The higher-level allocating accessor: drives `next_raw` until a
    /// fragmented key/string finishes, coalescing into a borrowed slice
    /// (the common case) or an owned buffer (when escapes were present or
    /// `always_allocate` forces a copy).
    pub fn next_coalesced(
        &mut self,
        max_value_len: usize,
        always_allocate: bool,
    ) -> Result<crate::token::CoalescedToken<'a>, TomlError> {
        use crate::token::CoalescedToken as CT;
        let first = self.next_raw()?;
        let result = match first {
            Token::KeyBegin => CT::KeyBegin,
            Token::TableKeyBegin => CT::TableKeyBegin,
            Token::ArrayTableKeyBegin => CT::ArrayTableKeyBegin,
            Token::TableBegin => CT::TableBegin,
            Token::ValueBegin => CT::ValueBegin,
            Token::ArrayBegin => CT::ArrayBegin,
            Token::ArrayEnd => CT::ArrayEnd,
            Token::InlineTableBegin => CT::InlineTableBegin,
            Token::InlineTableEnd => CT::InlineTableEnd,
            Token::True => CT::True,
            Token::False => CT::False,
            Token::EndOfDocument => CT::EndOfDocument,
            Token::Int(s) => CT::Int(s),
            Token::Float(s) => CT::Float(s),
            Token::Datetime(s) => CT::Datetime(s),
            Token::Key(s) => {
                let value = if always_allocate {
                    Cow::Owned(s.to_string())
                } else {
                    Cow::Borrowed(s)
                };
                CT::Key(value)
            }
            Token::Str(s) => {
                let value = if always_allocate {
                    Cow::Owned(s.to_string())
                } else {
                    Cow::Borrowed(s)
                };
                CT::Str(value)
            }
            Token::PartialKey(s) => CT::Key(self.coalesce(Frag::Raw(s), true, max_value_len)?),
            Token::PartialString(s) => CT::Str(self.coalesce(Frag::Raw(s), false, max_value_len)?),
            Token::PartialKeyEscaped(b) => {
                CT::Key(self.coalesce(Frag::Escaped(b), true, max_value_len)?)
            }
            Token::PartialStringEscaped(b) => {
                CT::Str(self.coalesce(Frag::Escaped(b), false, max_value_len)?)
            }
        };
        Ok(result)
    }

    fn coalesce(
        &mut self,
        first: Frag<'a>,
        in_key: bool,
        max_value_len: usize,
    ) -> Result<Cow<'a, str>, TomlError> {
        let mut buffer = String::new();
        push_frag(&mut buffer, first);
        loop {
            if buffer.len() > max_value_len {
                return Err(TomlError::ValueTooLong {
                    at: self.position(),
                    limit: max_value_len,
                });
            }
            let next = self.next_raw()?;
            match classify(next, in_key) {
                Frag::Final(s) => {
                    buffer.push_str(s);
                    break;
                }
                other => push_frag(&mut buffer, other),
            }
        }
        if buffer.len() > max_value_len {
            return Err(TomlError::ValueTooLong {
                at: self.position(),
                limit: max_value_len,
            });
        }
        Ok(Cow::Owned(buffer))
    }

    // ---- structural dispatch ----

    fn scan_line_start(&mut self) -> Result<Token<'a>, TomlError> {
        loop {
            self.skip_blank();
            match self.peek() {
                None => {
                    self.state = ScanState::Done;
                    return Ok(Token::EndOfDocument);
                }
                Some(b'\n') => {
                    self.consume_newline();
                    continue;
                }
                Some(b'\r') if self.peek_at(1) == Some(b'\n') => {
                    self.consume_newline();
                    continue;
                }
                Some(b'#') => {
                    self.scan_comment()?;
                    continue;
                }
                Some(b'[') => {
                    if self.peek_at(1) == Some(b'[') {
                        self.cursor += 2;
                        self.state = ScanState::ExpectKeySegment(KeyContext::ArrayTableHeader);
                        return Ok(Token::ArrayTableKeyBegin);
                    }
                    self.cursor += 1;
                    self.state = ScanState::ExpectKeySegment(KeyContext::TableHeader);
                    return Ok(Token::TableKeyBegin);
                }
                Some(b) if is_key_start(b) => {
                    self.state = ScanState::ExpectKeySegment(KeyContext::Assignment);
                    return Ok(Token::KeyBegin);
                }
                Some(_) => return Err(self.syntax_error("expected a key or a table header")),
            }
        }
    }

    fn scan_key_segment(&mut self, ctx: KeyContext) -> Result<Token<'a>, TomlError> {
        self.skip_blank();
        match self.peek() {
            Some(b'"') => {
                self.cursor += 1;
                self.pending_key_ctx = Some(ctx);
                self.begin_string(StringFlavor::Basic, true)
            }
            Some(b'\'') => {
                self.cursor += 1;
                self.pending_key_ctx = Some(ctx);
                self.begin_string(StringFlavor::Literal, true)
            }
            Some(b) if is_bare_key_char(b) => {
                let start = self.cursor;
                while self.peek().map_or(false, is_bare_key_char) {
                    self.cursor += 1;
                }
                let slice = self.slice_str(start, self.cursor)?;
                self.state = ScanState::AfterKeySegment(ctx);
                Ok(Token::Key(slice))
            }
            None => Err(self.eof_error()),
            Some(_) => Err(self.syntax_error("expected a key")),
        }
    }

    fn scan_after_key_segment(&mut self, ctx: KeyContext) -> Result<Token<'a>, TomlError> {
        self.skip_blank();
        match (ctx, self.peek()) {
            (_, Some(b'.')) => {
                self.cursor += 1;
                self.state = ScanState::ExpectKeySegment(ctx);
                Ok(Token::KeyBegin)
            }
            (KeyContext::Assignment, Some(b'=')) => {
                self.cursor += 1;
                self.state = ScanState::BeforeValue;
                Ok(Token::ValueBegin)
            }
            (KeyContext::TableHeader, Some(b']')) => {
                self.cursor += 1;
                self.state = ScanState::PostValue;
                Ok(Token::TableBegin)
            }
            (KeyContext::ArrayTableHeader, Some(b']')) => {
                self.cursor += 1;
                self.skip_blank();
                if self.peek() != Some(b']') {
                    return Err(self.syntax_error("expected closing ']]'"));
                }
                self.cursor += 1;
                self.state = ScanState::PostValue;
                Ok(Token::TableBegin)
            }
            (_, None) => Err(self.eof_error()),
            _ => Err(self.syntax_error("expected '.', '=', or ']'")),
        }
    }

    fn scan_inline_key_or_close(&mut self, allow_close: bool) -> Result<Token<'a>, TomlError> {
        self.skip_blank();
        match self.peek() {
            Some(b'}') if allow_close => {
                self.cursor += 1;
                self.mode_stack.pop();
                self.state = ScanState::PostValue;
                Ok(Token::InlineTableEnd)
            }
            Some(b'}') => Err(self.syntax_error("trailing comma is not allowed in an inline table")),
            Some(b'\n') | Some(b'\r') => {
                Err(self.syntax_error("newline is not allowed inside an inline table"))
            }
            Some(b) if is_key_start(b) => {
                self.state = ScanState::ExpectKeySegment(KeyContext::Assignment);
                Ok(Token::KeyBegin)
            }
            None => Err(self.eof_error()),
            Some(_) => Err(self.syntax_error("expected a key or '}'")),
        }
    }

    fn scan_before_value(&mut self) -> Result<Token<'a>, TomlError> {
        loop {
            self.skip_blank();
            let top = self.mode_stack.last().copied();
            match self.peek() {
                None => return Err(self.eof_error()),
                Some(b'\n') | Some(b'\r') if top == Some(Container::Array) => {
                    if self.peek() == Some(b'\r') && self.peek_at(1) != Some(b'\n') {
                        return Err(self.syntax_error("bare carriage return must be followed by a line feed"));
                    }
                    self.consume_newline();
                    continue;
                }
                Some(b'\n') | Some(b'\r') => {
                    return Err(self.syntax_error("newline is not allowed here"));
                }
                Some(b'#') => {
                    if top == Some(Container::InlineTable) {
                        return Err(self.syntax_error("comment is not allowed inside an inline table"));
                    }
                    self.scan_comment()?;
                    continue;
                }
                Some(b']') if top == Some(Container::Array) => {
                    self.cursor += 1;
                    self.mode_stack.pop();
                    self.state = ScanState::PostValue;
                    return Ok(Token::ArrayEnd);
                }
                Some(b'[') => {
                    self.cursor += 1;
                    self.mode_stack.push(Container::Array);
                    self.state = ScanState::BeforeValue;
                    return Ok(Token::ArrayBegin);
                }
                Some(b'{') => {
                    self.cursor += 1;
                    self.mode_stack.push(Container::InlineTable);
                    self.state = ScanState::InlineTableOpen;
                    return Ok(Token::InlineTableBegin);
                }
                Some(b'"') | Some(b'\'') => return self.begin_value_string(),
                Some(b't') if self.starts_with(b"true") && self.is_at_word_boundary(self.cursor + 4) => {
                    self.cursor += 4;
                    self.state = ScanState::PostValue;
                    return Ok(Token::True);
                }
                Some(b'f')
                    if self.starts_with(b"false") && self.is_at_word_boundary(self.cursor + 5) =>
                {
                    self.cursor += 5;
                    self.state = ScanState::PostValue;
                    return Ok(Token::False);
                }
                Some(b) if is_number_start(b) => {
                    let (class, end) = number::scan(self.input, self.cursor, self.position())?;
                    let slice = self.slice_str(self.cursor, end)?;
                    self.cursor = end;
                    self.state = ScanState::PostValue;
                    return Ok(match class {
                        number::Classification::Integer => Token::Int(slice),
                        number::Classification::Float => Token::Float(slice),
                        number::Classification::Datetime => Token::Datetime(slice),
                    });
                }
                Some(_) => return Err(self.syntax_error("expected a value")),
            }
        }
    }

    fn scan_post_value(&mut self) -> Result<Token<'a>, TomlError> {
        loop {
            self.skip_blank();
            let top = self.mode_stack.last().copied();
            match self.peek() {
                None => {
                    if self.mode_stack.is_empty() {
                        self.state = ScanState::Done;
                        return Ok(Token::EndOfDocument);
                    }
                    return Err(self.eof_error());
                }
                Some(b'#') => {
                    if top == Some(Container::InlineTable) {
                        return Err(self.syntax_error("comment is not allowed inside an inline table"));
                    }
                    self.scan_comment()?;
                    continue;
                }
                Some(b'\n') | Some(b'\r') => {
                    if top == Some(Container::InlineTable) {
                        return Err(self.syntax_error("newline is not allowed inside an inline table"));
                    }
                    if self.peek() == Some(b'\r') && self.peek_at(1) != Some(b'\n') {
                        return Err(self.syntax_error("bare carriage return must be followed by a line feed"));
                    }
                    self.consume_newline();
                    if self.mode_stack.is_empty() {
                        return self.scan_line_start();
                    }
                    continue;
                }
                Some(b',') => match top {
                    Some(Container::Array) => {
                        self.cursor += 1;
                        self.state = ScanState::BeforeValue;
                        return self.scan_before_value();
                    }
                    Some(Container::InlineTable) => {
                        self.cursor += 1;
                        self.state = ScanState::InlineTableNextKey;
                        return self.scan_inline_key_or_close(false);
                    }
                    None => return Err(self.syntax_error("unexpected ','")),
                },
                Some(b']') => {
                    if top == Some(Container::Array) {
                        self.cursor += 1;
                        self.mode_stack.pop();
                        self.state = ScanState::PostValue;
                        return Ok(Token::ArrayEnd);
                    }
                    return Err(self.syntax_error("unexpected ']'"));
                }
                Some(b'}') => {
                    if top == Some(Container::InlineTable) {
                        self.cursor += 1;
                        self.mode_stack.pop();
                        self.state = ScanState::PostValue;
                        return Ok(Token::InlineTableEnd);
                    }
                    return Err(self.syntax_error("unexpected '}'"));
                }
                Some(_) => {
                    return if self.mode_stack.is_empty() {
                        Err(self.syntax_error("expected a newline after a value"))
                    } else {
                        Err(self.syntax_error("expected ',' or a closing delimiter"))
                    };
                }
            }
        }
    }

    fn scan_comment(&mut self) -> Result<(), TomlError> {
        self.cursor += 1; // '#'
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            let (_, len) = utf8::decode_one(self.input, self.cursor, utf8::Forbidden::COMMENT, self.position())?;
            self.cursor += len;
        }
        Ok(())
    }

    // ---- strings ----

    fn begin_value_string(&mut self) -> Result<Token<'a>, TomlError> {
        if self.starts_with(b"\"\"\"") {
            self.cursor += 3;
            self.trim_leading_newline();
            self.begin_string(StringFlavor::MultiLineBasic, false)
        } else if self.peek() == Some(b'"') {
            self.cursor += 1;
            self.begin_string(StringFlavor::Basic, false)
        } else if self.starts_with(b"'''") {
            self.cursor += 3;
            self.trim_leading_newline();
            self.begin_string(StringFlavor::MultiLineLiteral, false)
        } else {
            self.cursor += 1;
            self.begin_string(StringFlavor::Literal, false)
        }
    }

    fn trim_leading_newline(&mut self) {
        if self.peek() == Some(b'\r') && self.peek_at(1) == Some(b'\n') {
            self.cursor += 2;
        } else if self.peek() == Some(b'\n') {
            self.cursor += 1;
        }
    }

    fn begin_string(&mut self, flavor: StringFlavor, in_key: bool) -> Result<Token<'a>, TomlError> {
        let ctx = StringCtx { flavor, in_key };
        self.string_ctx = Some(ctx);
        self.continue_string(ctx)
    }

    fn continue_string(&mut self, ctx: StringCtx) -> Result<Token<'a>, TomlError> {
        let raw_start = self.cursor;
        let forbidden = match ctx.flavor {
            StringFlavor::Basic | StringFlavor::Literal => utf8::Forbidden::SINGLE_LINE,
            StringFlavor::MultiLineBasic | StringFlavor::MultiLineLiteral => utf8::Forbidden::MULTI_LINE,
        };
        loop {
            let b = match self.peek() {
                Some(b) => b,
                None => return Err(self.eof_error()),
            };
            match (ctx.flavor, b) {
                (StringFlavor::Basic, b'\\') | (StringFlavor::MultiLineBasic, b'\\') => {
                    if self.cursor > raw_start {
                        let slice = self.slice_str(raw_start, self.cursor)?;
                        return Ok(wrap_partial(ctx, slice));
                    }
                    return self.handle_escape(ctx);
                }
                (StringFlavor::Basic, b'"') => {
                    let slice = self.slice_str(raw_start, self.cursor)?;
                    self.cursor += 1;
                    return Ok(self.finish_string(ctx, slice));
                }
                (StringFlavor::Literal, b'\'') => {
                    let slice = self.slice_str(raw_start, self.cursor)?;
                    self.cursor += 1;
                    return Ok(self.finish_string(ctx, slice));
                }
                (StringFlavor::MultiLineBasic, b'"') => {
                    let run = self.count_quote_run(b'"');
                    if run >= 3 {
                        if run > 5 {
                            return Err(self.syntax_error("too many consecutive '\"' while closing a multi-line string"));
                        }
                        let extra = run - 3;
                        let content_end = self.cursor + extra;
                        let slice = self.slice_str(raw_start, content_end)?;
                        self.cursor = content_end + 3;
                        return Ok(self.finish_string(ctx, slice));
                    }
                    self.cursor += run;
                }
                (StringFlavor::MultiLineLiteral, b'\'') => {
                    let run = self.count_quote_run(b'\'');
                    if run >= 3 {
                        if run > 5 {
                            return Err(self.syntax_error("too many consecutive '\\'' while closing a multi-line string"));
                        }
                        let extra = run - 3;
                        let content_end = self.cursor + extra;
                        let slice = self.slice_str(raw_start, content_end)?;
                        self.cursor = content_end + 3;
                        return Ok(self.finish_string(ctx, slice));
                    }
                    self.cursor += run;
                }
                (StringFlavor::MultiLineLiteral, b'\r') => {
                    // Resolved open question (spec.md §9): accept \r only
                    // when immediately followed by \n; a bare \r errors.
                    if self.peek_at(1) == Some(b'\n') {
                        self.cursor += 2;
                    } else {
                        return Err(self.syntax_error("bare carriage return must be followed by a line feed"));
                    }
                }
                _ => {
                    let (_, len) = utf8::decode_one(self.input, self.cursor, forbidden, self.position())?;
                    self.cursor += len;
                }
            }
        }
    }

    fn count_quote_run(&self, quote: u8) -> usize {
        let mut n = 0;
        while self.peek_at(n) == Some(quote) {
            n += 1;
        }
        n
    }

    fn finish_string(&mut self, ctx: StringCtx, slice: &'a str) -> Token<'a> {
        self.string_ctx = None;
        if ctx.in_key {
            let key_ctx = self.pending_key_ctx.take().expect("key context set on entry");
            self.state = ScanState::AfterKeySegment(key_ctx);
            Token::Key(slice)
        } else {
            self.state = ScanState::PostValue;
            Token::Str(slice)
        }
    }

    fn handle_escape(&mut self, ctx: StringCtx) -> Result<Token<'a>, TomlError> {
        let next = self.peek_at(1).ok_or_else(|| self.eof_error())?;
        if let Some(byte) = single_char_escape(next) {
            self.cursor += 2;
            return Ok(wrap_escape(ctx, byte));
        }
        match next {
            b'u' => {
                let codepoint = self.read_hex_escape(4)?;
                self.queue_codepoint(ctx, codepoint)
            }
            b'U' => {
                let codepoint = self.read_hex_escape(8)?;
                self.queue_codepoint(ctx, codepoint)
            }
            b' ' | b'\t' | b'\r' | b'\n' if ctx.flavor == StringFlavor::MultiLineBasic => {
                self.trim_line_continuation()?;
                self.continue_string(ctx)
            }
            _ => Err(self.syntax_error("unknown escape sequence")),
        }
    }

    fn read_hex_escape(&mut self, digits: usize) -> Result<u32, TomlError> {
        let start = self.cursor + 2;
        let end = start + digits;
        if self.input.len() < end {
            return Err(self.eof_error());
        }
        let text = self
            .slice_str(start, end)
            .map_err(|_| self.syntax_error("non-ASCII digits in unicode escape"))?;
        let value =
            u32::from_str_radix(text, 16).map_err(|_| self.syntax_error("invalid unicode escape digits"))?;
        self.cursor = end;
        Ok(value)
    }

    fn queue_codepoint(&mut self, ctx: StringCtx, codepoint: u32) -> Result<Token<'a>, TomlError> {
        let mut buf = Vec::with_capacity(4);
        utf8::encode_checked(codepoint, self.position(), &mut buf)?;
        let mut iter = buf.into_iter();
        let first = iter.next().expect("encode_checked always writes >=1 byte");
        self.escape_queue.extend(iter);
        Ok(wrap_escape(ctx, first))
    }

    fn trim_line_continuation(&mut self) -> Result<(), TomlError> {
        self.cursor += 1; // backslash
        let mut saw_newline = false;
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') => self.cursor += 1,
                Some(b'\r') if self.peek_at(1) == Some(b'\n') => {
                    self.cursor += 2;
                    saw_newline = true;
                }
                Some(b'\n') => {
                    self.cursor += 1;
                    saw_newline = true;
                }
                _ => break,
            }
        }
        if !saw_newline {
            return Err(self.syntax_error("expected a line ending after a line-continuation backslash"));
        }
        Ok(())
    }
}

fn single_char_escape(b: u8) -> Option<u8> {
    match b {
        b'b' => Some(0x08),
        b't' => Some(0x09),
        b'n' => Some(0x0a),
        b'f' => Some(0x0c),
        b'r' => Some(0x0d),
        b'"' => Some(0x22),
        b'\\' => Some(0x5c),
        _ => None,
    }
}

fn wrap_partial(ctx: StringCtx, slice: &str) -> Token<'_> {
    if ctx.in_key {
        Token::PartialKey(slice)
    } else {
        Token::PartialString(slice)
    }
}

fn wrap_escape<'a>(ctx: StringCtx, byte: u8) -> Token<'a> {
    if ctx.in_key {
        Token::PartialKeyEscaped(byte)
    } else {
        Token::PartialStringEscaped(byte)
    }
}

fn is_bare_key_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn is_key_start(b: u8) -> bool {
    is_bare_key_char(b) || b == b'"' || b == b'\''
}

fn is_number_start(b: u8) -> bool {
    b.is_ascii_digit() || b == b'+' || b == b'-' || b == b'i' || b == b'n'
}

/// An intermediate fragment classification used only by the coalescing
/// helper; never surfaced to callers.
enum Frag<'a> {
    Raw(&'a str),
    Escaped(u8),
    Final(&'a str),
}

fn classify(token: Token<'_>, in_key: bool) -> Frag<'_> {
    match (token, in_key) {
        (Token::PartialKey(s), true) | (Token::PartialString(s), false) => Frag::Raw(s),
        (Token::PartialKeyEscaped(b), true) | (Token::PartialStringEscaped(b), false) => {
            Frag::Escaped(b)
        }
        (Token::Key(s), true) | (Token::Str(s), false) => Frag::Final(s),
        _ => panic!("scanner protocol violation: unexpected token while coalescing a string"),
    }
}

fn push_frag(buffer: &mut String, frag: Frag<'_>) {
    match frag {
        Frag::Raw(s) | Frag::Final(s) => buffer.push_str(s),
        Frag::Escaped(b) => {
            // Escaped bytes are always part of a valid UTF-8 sequence
            // queued whole by `queue_codepoint`/`handle_escape`, so pushing
            // byte-by-byte through a 1-byte-at-a-time UTF-8 decode step
            // would be wrong for multi-byte codepoints; instead each byte
            // is guaranteed to be either a lone ASCII escape (`\t`, `\n`,
            // ...) or one byte of a pre-validated multi-byte sequence
            // queued contiguously, so accumulating raw bytes and decoding
            // once at flush time is unnecessary: push the byte as a
            // `char` when it's ASCII, otherwise stage it through a small
            // side buffer.
            push_escaped_byte(buffer, b);
        }
    }
}

thread_local! {
    static ESCAPE_STAGE: std::cell::RefCell<Vec<u8>> = std::cell::RefCell::new(Vec::new());
}

fn push_escaped_byte(buffer: &mut String, byte: u8) {
    if byte < 0x80 {
        buffer.push(byte as char);
        return;
    }
    ESCAPE_STAGE.with(|stage| {
        let mut stage = stage.borrow_mut();
        stage.push(byte);
        if let Ok(s) = std::str::from_utf8(&stage) {
            buffer.push_str(s);
            stage.clear();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        let mut scanner = Scanner::new(input.as_bytes()).unwrap();
        let mut out = Vec::new();
        loop {
            let tok = scanner.next_raw().unwrap();
            let done = tok == Token::EndOfDocument;
            out.push(tok);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn simple_assignment() {
        let toks = tokens("x = 1\n");
        assert_eq!(
            toks,
            vec![
                Token::KeyBegin,
                Token::Key("x"),
                Token::ValueBegin,
                Token::Int("1"),
                Token::EndOfDocument,
            ]
        );
    }

    #[test]
    fn dotted_key() {
        let toks = tokens("a.b.c = \"hi\"\n");
        assert_eq!(
            toks,
            vec![
                Token::KeyBegin,
                Token::Key("a"),
                Token::KeyBegin,
                Token::Key("b"),
                Token::KeyBegin,
                Token::Key("c"),
                Token::ValueBegin,
                Token::Str("hi"),
                Token::EndOfDocument,
            ]
        );
    }

    #[test]
    fn table_header() {
        let toks = tokens("[a.b]\n");
        assert_eq!(
            toks,
            vec![
                Token::TableKeyBegin,
                Token::Key("a"),
                Token::KeyBegin,
                Token::Key("b"),
                Token::TableBegin,
                Token::EndOfDocument,
            ]
        );
    }

    #[test]
    fn array_table_header() {
        let toks = tokens("[[a]]\n");
        assert_eq!(
            toks,
            vec![
                Token::ArrayTableKeyBegin,
                Token::Key("a"),
                Token::TableBegin,
                Token::EndOfDocument,
            ]
        );
    }

    #[test]
    fn inline_table_and_array() {
        let toks = tokens("x = {a = 1, b = [2, 3]}\n");
        assert_eq!(
            toks,
            vec![
                Token::KeyBegin,
                Token::Key("x"),
                Token::ValueBegin,
                Token::InlineTableBegin,
                Token::KeyBegin,
                Token::Key("a"),
                Token::ValueBegin,
                Token::Int("1"),
                Token::KeyBegin,
                Token::Key("b"),
                Token::ValueBegin,
                Token::ArrayBegin,
                Token::Int("2"),
                Token::Int("3"),
                Token::ArrayEnd,
                Token::InlineTableEnd,
                Token::EndOfDocument,
            ]
        );
    }

    #[test]
    fn escape_sequence_fragments() {
        let toks = tokens("s = \"a\\tb\"\n");
        assert_eq!(
            toks,
            vec![
                Token::KeyBegin,
                Token::Key("s"),
                Token::ValueBegin,
                Token::PartialString("a"),
                Token::PartialStringEscaped(0x09),
                Token::Str("b"),
                Token::EndOfDocument,
            ]
        );
    }

    #[test]
    fn coalesced_string_with_unicode_escape() {
        let mut scanner = Scanner::new(b"s = \"a\\u00e9b\"\n").unwrap();
        // KeyBegin, Key, ValueBegin
        for _ in 0..3 {
            scanner.next_raw().unwrap();
        }
        let result = scanner.next_coalesced(usize::MAX, false).unwrap();
        match result {
            crate::token::CoalescedToken::Str(s) => assert_eq!(s, "aéb"),
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn multiline_basic_trims_leading_newline() {
        let toks = tokens("s = \"\"\"\nhello\"\"\"\n");
        assert_eq!(
            toks,
            vec![
                Token::KeyBegin,
                Token::Key("s"),
                Token::ValueBegin,
                Token::Str("hello"),
                Token::EndOfDocument,
            ]
        );
    }

    #[test]
    fn multiline_basic_four_closing_quotes() {
        // Content is `a"`, closed by the remaining three quotes.
        let toks = tokens("s = \"\"\"a\"\"\"\"\n");
        assert_eq!(
            toks,
            vec![
                Token::KeyBegin,
                Token::Key("s"),
                Token::ValueBegin,
                Token::Str("a\""),
                Token::EndOfDocument,
            ]
        );
    }

    #[test]
    fn leading_zero_with_digit_is_syntax_error() {
        let mut scanner = Scanner::new(b"x = 007\n").unwrap();
        for _ in 0..3 {
            scanner.next_raw().unwrap();
        }
        assert!(scanner.next_raw().is_err());
    }

    #[test]
    fn trailing_comma_in_inline_table_errors() {
        let mut scanner = Scanner::new(b"x = {a = 1,}\n").unwrap();
        loop {
            match scanner.next_raw() {
                Ok(Token::EndOfDocument) => panic!("expected an error before end of document"),
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }

    #[test]
    fn rejects_byte_order_mark() {
        assert!(Scanner::new(b"\xef\xbb\xbfx = 1\n").is_err());
    }

    #[test]
    fn crlf_line_ending_after_a_value() {
        let toks = tokens("x = 1\r\ny = 2\r\n");
        assert_eq!(
            toks,
            vec![
                Token::KeyBegin,
                Token::Key("x"),
                Token::ValueBegin,
                Token::Int("1"),
                Token::KeyBegin,
                Token::Key("y"),
                Token::ValueBegin,
                Token::Int("2"),
                Token::EndOfDocument,
            ]
        );
    }

    #[test]
    fn bare_carriage_return_after_a_value_is_a_syntax_error() {
        let mut scanner = Scanner::new(b"x = 1\ry = 2\n").unwrap();
        loop {
            match scanner.next_raw() {
                Ok(Token::EndOfDocument) => panic!("expected an error before end of document"),
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }

    #[test]
    fn verbose_trace_can_be_enabled_without_affecting_tokens() {
        let mut scanner = Scanner::new(b"x = 1\n").unwrap();
        scanner.set_log(crate::util::Log::Verbose("scanner")).unwrap();
        assert_eq!(scanner.next_raw().unwrap(), Token::KeyBegin);
    }
}
