//! The tree builder: drives the [`Scanner`](crate::scanner::Scanner),
//! resolves dotted key paths, enforces the structural rules of TOML via the
//! [`registry`], and assembles the root [`Value::Table`] (spec.md §4.2).
//!
//! The scanner never consults the registry and this module never
//! re-examines raw bytes; it only ever sees already-coalesced tokens
//! (spec.md §9, "Separation of concerns").

mod registry;

use crate::error::TomlError;
use crate::options::{AllocationMode, ParserOptions};
use crate::scanner::Scanner;
use crate::token::CoalescedToken;
use crate::util::{Diagnostics, Log, Position};
use crate::value::{Document, Table, Value};
use once_cell::unsync::OnceCell;
use registry::RegEntry;
use std::borrow::Cow;

/// Parse a complete TOML document.
pub fn parse<'a>(bytes: &'a [u8], options: ParserOptions) -> Result<Document<'a>, TomlError> {
    TreeBuilder::new(bytes, options)?.build()
}

struct TreeBuilder<'a> {
    scanner: Scanner<'a>,
    max_value_len: usize,
    always_allocate: bool,
    log: OnceCell<Log<&'static str>>,
}

impl<'a> TreeBuilder<'a> {
    fn new(bytes: &'a [u8], options: ParserOptions) -> Result<Self, TomlError> {
        let scanner = Scanner::new(bytes)?;
        let max_value_len = options.effective_max_value_len(bytes.len());
        Ok(Self {
            scanner,
            max_value_len,
            always_allocate: options.allocate == AllocationMode::Always,
            log: OnceCell::new(),
        })
    }

    fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.log
            .set(log)
            .map_err(|err| format!("Log label {} is already assigned.", err))
    }

    const VERBOSE_ORDER: u8 = 4;

    fn trace(&self, message: impl Fn() -> String) {
        #[cfg(debug_assertions)]
        if let Some(log) = self.log.get() {
            if log.order() >= Self::VERBOSE_ORDER {
                println!("[builder @ {}] {}", self.position(), message());
            }
        }
        #[cfg(not(debug_assertions))]
        let _ = message;
    }

    fn next(&mut self) -> Result<CoalescedToken<'a>, TomlError> {
        self.scanner.next_coalesced(self.max_value_len, self.always_allocate)
    }

    fn position(&self) -> Position {
        self.scanner.position()
    }

    /// The top-level core loop (spec.md §4.2 "Core loop"): dispatch on the
    /// opening structural token of each statement. `current_path` is the
    /// dotted-key path of the table that bare assignments land in, updated
    /// by `[x]`/`[[x]]` headers.
    fn build(mut self) -> Result<Document<'a>, TomlError> {
        let mut root = Table::new();
        let mut registry = RegEntry::new_root();
        let mut current_path: Vec<Cow<'a, str>> = Vec::new();

        loop {
            match self.next()? {
                CoalescedToken::EndOfDocument => break,
                CoalescedToken::KeyBegin => {
                    let segments = self.read_key_path()?;
                    self.trace(|| format!("assign {}", segments.join(".")));
                    self.assign(&mut root, &mut registry, &current_path, segments)?;
                }
                CoalescedToken::TableKeyBegin => {
                    let segments = self.read_key_path()?;
                    self.trace(|| format!("open table [{}]", segments.join(".")));
                    current_path = self.open_table(&mut root, &mut registry, segments)?;
                }
                CoalescedToken::ArrayTableKeyBegin => {
                    let segments = self.read_key_path()?;
                    self.trace(|| format!("open array-of-tables [[{}]]", segments.join(".")));
                    current_path = self.open_array_table(&mut root, &mut registry, segments)?;
                }
                other => {
                    return Err(TomlError::UnexpectedToken {
                        at: self.position(),
                        message: format!("expected a key or table header, found {:?}", other),
                    });
                }
            }
        }
        let diagnostics = Diagnostics::new(self.position(), self.scanner.byte_offset());
        Ok(Document::new(Value::Table(root), diagnostics))
    }

    /// Read key segments until the key list is closed (spec.md §4.2 "Key
    /// path resolution"). The opening `key_begin`/`table_key_begin`/
    /// `array_table_key_begin` has already been consumed by the caller;
    /// this reads the `key` tokens and the `key_begin` continuations
    /// between dotted segments, stopping at `value_begin`/`table_begin`.
    fn read_key_path(&mut self) -> Result<Vec<Cow<'a, str>>, TomlError> {
        let mut segments = Vec::new();
        loop {
            match self.next()? {
                CoalescedToken::Key(s) => segments.push(s),
                CoalescedToken::KeyBegin => continue,
                CoalescedToken::ValueBegin | CoalescedToken::TableBegin => return Ok(segments),
                other => {
                    return Err(TomlError::UnexpectedToken {
                        at: self.position(),
                        message: format!("expected a key segment, found {:?}", other),
                    });
                }
            }
        }
    }

    /// Assignment (spec.md §4.2 "Assignment"): walk/create intermediate
    /// implicit super-tables, decode the value, register the full path,
    /// and insert the leaf under the last segment.
    fn assign(
        &mut self,
        root: &mut Table<'a>,
        registry: &mut RegEntry,
        base: &[Cow<'a, str>],
        segments: Vec<Cow<'a, str>>,
    ) -> Result<(), TomlError> {
        let at = self.position();
        let mut path_parts: Vec<&str> = Vec::new();
        let mut table = root;
        let mut reg = registry;
        // Re-enter the table the most recent `[header]`/`[[header]]` already
        // opened (`base` is that header's own full path, already walked and
        // registered once when the header itself was processed) before
        // resolving this statement's own dotted-key segments relative to it.
        for seg in base {
            path_parts.push(seg.as_ref());
            let path = path_parts.join(".");
            reg = reg.step_implicit(seg.as_ref(), &path, at)?;
            table = navigate_create(table, seg);
        }
        for seg in &segments[..segments.len() - 1] {
            path_parts.push(seg.as_ref());
            let path = path_parts.join(".");
            reg = reg.step_dotted_key_intermediate(seg.as_ref(), &path, at)?;
            table = navigate_create(table, seg);
        }
        let last = segments.last().expect("a key path always has >=1 segment").clone();
        path_parts.push(last.as_ref());
        let full_path = path_parts.join(".");

        let value = self.parse_value()?;
        reg.step_leaf(last.as_ref(), &full_path, at)?;
        table.insert(last, value);
        Ok(())
    }

    /// `parseValue` (spec.md §4.2 "Assignment"): consume the token after
    /// `value_begin` (or an array element position) and produce a leaf or
    /// container `Value`.
    fn parse_value(&mut self) -> Result<Value<'a>, TomlError> {
        let tok = self.next()?;
        self.parse_value_from(tok)
    }

    fn parse_value_from(&mut self, tok: CoalescedToken<'a>) -> Result<Value<'a>, TomlError> {
        let at = self.position();
        match tok {
            CoalescedToken::Str(s) => Ok(Value::String(s)),
            CoalescedToken::Int(lexeme) => Ok(Value::Integer(decode_integer(lexeme, at)?)),
            CoalescedToken::Float(lexeme) => Ok(Value::Float(decode_float(lexeme, at)?)),
            CoalescedToken::Datetime(lexeme) => {
                Ok(Value::Datetime(crate::datetime::decode(lexeme, at)?))
            }
            CoalescedToken::True => Ok(Value::Bool(true)),
            CoalescedToken::False => Ok(Value::Bool(false)),
            CoalescedToken::ArrayBegin => self.parse_array(),
            CoalescedToken::InlineTableBegin => self.parse_inline_table(),
            other => Err(TomlError::UnexpectedToken {
                at,
                message: format!("expected a value, found {:?}", other),
            }),
        }
    }

    /// Inline array (spec.md §4.2 "Assignment", `array_begin`). Comma
    /// handling and the legality of a trailing comma are entirely the
    /// scanner's responsibility; this loop only distinguishes `array_end`
    /// from another element.
    fn parse_array(&mut self) -> Result<Value<'a>, TomlError> {
        let mut items = Vec::new();
        loop {
            let tok = self.next()?;
            if matches!(tok, CoalescedToken::ArrayEnd) {
                break;
            }
            items.push(self.parse_value_from(tok)?);
        }
        Ok(Value::Array(items))
    }

    /// Inline table (spec.md §4.2 "Inline tables"): a fresh, isolated
    /// registry sealed at `inline_table_end`. The result becomes a plain
    /// leaf in the parent's registry -- it can never be reused or extended
    /// by a later dotted key or header.
    fn parse_inline_table(&mut self) -> Result<Value<'a>, TomlError> {
        let mut table = Table::new();
        let mut registry = RegEntry::new_root();
        loop {
            match self.next()? {
                CoalescedToken::InlineTableEnd => break,
                CoalescedToken::KeyBegin => {
                    let segments = self.read_key_path()?;
                    self.assign(&mut table, &mut registry, &[], segments)?;
                }
                other => {
                    return Err(TomlError::UnexpectedToken {
                        at: self.position(),
                        message: format!("expected a key or '}}', found {:?}", other),
                    });
                }
            }
        }
        Ok(Value::Table(table))
    }

    /// `[a.b.c]` table header (spec.md §4.2 "Table headers").
    fn open_table(
        &mut self,
        root: &mut Table<'a>,
        registry: &mut RegEntry,
        segments: Vec<Cow<'a, str>>,
    ) -> Result<Vec<Cow<'a, str>>, TomlError> {
        let at = self.position();
        let mut path_parts: Vec<&str> = Vec::new();
        let mut table = root;
        let mut reg = registry;
        for seg in &segments[..segments.len() - 1] {
            path_parts.push(seg.as_ref());
            let path = path_parts.join(".");
            reg = reg.step_implicit(seg.as_ref(), &path, at)?;
            table = navigate_create(table, seg);
        }
        let last = segments.last().expect("a table header always has >=1 segment");
        path_parts.push(last.as_ref());
        let full_path = path_parts.join(".");
        reg.step_table(last.as_ref(), &full_path, at)?;
        if !table.contains_key(last) {
            table.insert(last.clone(), Value::Table(Table::new()));
        }
        Ok(segments)
    }

    /// `[[a.b.c]]` array-of-tables header (spec.md §4.2 "Array-of-tables
    /// headers"). `step_array_table` appends a fresh element node to the
    /// registry's array-of-tables entry; every later statement re-walks
    /// from the document root and, on reaching this array, always lands on
    /// its *last* element (mirroring how `navigate_create` does the same on
    /// the `Value` side). That's what keeps a sibling element declared by a
    /// later `[[x]]` from colliding on a shared key name (spec.md §4.2, step
    /// 3: "a fresh, isolated declaration registry").
    fn open_array_table(
        &mut self,
        root: &mut Table<'a>,
        registry: &mut RegEntry,
        segments: Vec<Cow<'a, str>>,
    ) -> Result<Vec<Cow<'a, str>>, TomlError> {
        let at = self.position();
        let mut path_parts: Vec<&str> = Vec::new();
        let mut table = root;
        let mut reg = registry;
        for seg in &segments[..segments.len() - 1] {
            path_parts.push(seg.as_ref());
            let path = path_parts.join(".");
            reg = reg.step_implicit(seg.as_ref(), &path, at)?;
            table = navigate_create(table, seg);
        }
        let last = segments.last().expect("an array-table header always has >=1 segment");
        path_parts.push(last.as_ref());
        let full_path = path_parts.join(".");
        reg.step_array_table(last.as_ref(), &full_path, at)?;

        match table.get_mut(last) {
            None => {
                table.insert(last.clone(), Value::Array(vec![Value::Table(Table::new())]));
            }
            Some(Value::Array(items)) => {
                items.push(Value::Table(Table::new()));
            }
            Some(Value::Table(existing)) => {
                // A dotted key touched this exact path before any `[[x]]`
                // header was seen, so the registry held `ImplicitTable` and
                // just promoted to `ArrayTable` above. The lone implicit
                // table becomes the array's first element.
                let promoted = std::mem::take(existing);
                table.insert(
                    last.clone(),
                    Value::Array(vec![Value::Table(promoted), Value::Table(Table::new())]),
                );
            }
            Some(_) => {
                return Err(TomlError::DuplicateKey { at, key: full_path });
            }
        }
        Ok(segments)
    }
}

/// Walk one segment into `table`, creating a fresh plain table if the key
/// is absent, or descending into the last element when the existing value
/// is an array-of-tables (spec.md §4.2: the "current context" of an
/// `[[x]]` header is always its most recently appended element).
fn navigate_create<'t, 'a>(table: &'t mut Table<'a>, seg: &Cow<'a, str>) -> &'t mut Table<'a> {
    if !table.contains_key(seg) {
        table.insert(seg.clone(), Value::Table(Table::new()));
    }
    match table.get_mut(seg).expect("just ensured presence") {
        Value::Table(t) => t,
        Value::Array(items) => match items.last_mut().expect("array-of-tables is never empty") {
            Value::Table(t) => t,
            _ => unreachable!("array-of-tables elements are always tables"),
        },
        _ => unreachable!("registry rejects navigating through a leaf value before this point"),
    }
}

/// Decode an integer lexeme already classified by the scanner (spec.md
/// §4.1 "Number and datetime discrimination", last line: "numeric
/// conversion ... is performed by the Tree Builder's value-decoding step").
fn decode_integer(lexeme: &str, at: Position) -> Result<i64, TomlError> {
    let cleaned: String = lexeme.chars().filter(|&c| c != '_').collect();
    let (sign, rest): (i128, &str) = if let Some(r) = cleaned.strip_prefix('-') {
        (-1, r)
    } else if let Some(r) = cleaned.strip_prefix('+') {
        (1, r)
    } else {
        (1, cleaned.as_str())
    };

    let invalid = || TomlError::InvalidCharacter {
        at,
        message: "malformed integer literal".to_string(),
    };

    let magnitude: i128 = if let Some(digits) = rest.strip_prefix("0x") {
        i128::from_str_radix(digits, 16).map_err(|_| invalid())?
    } else if let Some(digits) = rest.strip_prefix("0o") {
        i128::from_str_radix(digits, 8).map_err(|_| invalid())?
    } else if let Some(digits) = rest.strip_prefix("0b") {
        i128::from_str_radix(digits, 2).map_err(|_| invalid())?
    } else {
        rest.parse::<i128>().map_err(|_| invalid())?
    };

    i64::try_from(magnitude * sign).map_err(|_| TomlError::Overflow {
        at,
        literal: lexeme.to_string(),
    })
}

/// Decode a float lexeme, recognizing the `inf`/`nan` special forms in
/// every sign combination (spec.md §9, resolved open question) before
/// falling back to ordinary IEEE 754 parsing.
fn decode_float(lexeme: &str, at: Position) -> Result<f64, TomlError> {
    let cleaned: String = lexeme.chars().filter(|&c| c != '_').collect();
    match cleaned.as_str() {
        "inf" | "+inf" => return Ok(f64::INFINITY),
        "-inf" => return Ok(f64::NEG_INFINITY),
        "nan" | "+nan" | "-nan" => return Ok(f64::NAN),
        _ => {}
    }
    cleaned.parse::<f64>().map_err(|_| TomlError::InvalidCharacter {
        at,
        message: "malformed float literal".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ParserOptions;

    fn parse_ok(input: &str) -> Document<'_> {
        parse(input.as_bytes(), ParserOptions::default()).expect("expected a successful parse")
    }

    #[test]
    fn verbose_trace_can_be_enabled_without_affecting_the_result() {
        let mut builder = TreeBuilder::new(b"x = 1\n", ParserOptions::default()).unwrap();
        builder.set_log(crate::util::Log::Verbose("builder")).unwrap();
        let doc = builder.build().unwrap();
        assert_eq!(doc.as_table().get("x"), Some(&Value::Integer(1)));
    }

    #[test]
    fn simple_integer_assignment() {
        let doc = parse_ok("x = 1\n");
        assert_eq!(doc.as_table().get("x"), Some(&Value::Integer(1)));
    }

    #[test]
    fn dotted_key_builds_nested_tables() {
        let doc = parse_ok("a.b.c = \"hi\"\n");
        let a = doc.as_table().get("a").unwrap().as_table().unwrap();
        let b = a.get("b").unwrap().as_table().unwrap();
        assert_eq!(b.get("c").unwrap().as_str(), Some("hi"));
    }

    #[test]
    fn array_of_tables_appends_elements() {
        let doc = parse_ok("[a]\nx = 1\n[[a.b]]\ny = 2\n[[a.b]]\ny = 3\n");
        let a = doc.as_table().get("a").unwrap().as_table().unwrap();
        assert_eq!(a.get("x"), Some(&Value::Integer(1)));
        let b = a.get("b").unwrap().as_array().unwrap();
        assert_eq!(b.len(), 2);
        assert_eq!(
            b[0].as_table().unwrap().get("y"),
            Some(&Value::Integer(2))
        );
        assert_eq!(
            b[1].as_table().unwrap().get("y"),
            Some(&Value::Integer(3))
        );
    }

    #[test]
    fn unicode_escape_decodes_to_utf8() {
        let doc = parse_ok("s = \"a\\u00e9b\"\n");
        assert_eq!(doc.as_table().get("s").unwrap().as_str(), Some("aéb"));
    }

    #[test]
    fn leap_year_datetime_succeeds_and_non_leap_fails() {
        let doc = parse_ok("t = 2024-02-29T12:00:00Z\n");
        assert!(matches!(doc.as_table().get("t"), Some(Value::Datetime(_))));
        assert!(parse(b"t = 2023-02-29T12:00:00Z\n", ParserOptions::default()).is_err());
    }

    #[test]
    fn duplicate_key_errors() {
        let err = parse(b"a = 1\na = 2\n", ParserOptions::default()).unwrap_err();
        assert!(matches!(err, TomlError::DuplicateKey { .. }));
    }

    #[test]
    fn dotted_key_then_matching_header_promotes() {
        let doc = parse_ok("a.b = 1\n[a]\nc = 2\n");
        let a = doc.as_table().get("a").unwrap().as_table().unwrap();
        assert_eq!(a.get("b"), Some(&Value::Integer(1)));
        assert_eq!(a.get("c"), Some(&Value::Integer(2)));
    }

    #[test]
    fn explicit_header_then_dotted_key_errors() {
        let err = parse(b"[a]\nx = 1\n[a]\n", ParserOptions::default()).unwrap_err();
        assert!(matches!(err, TomlError::DuplicateKey { .. }));
    }

    #[test]
    fn sealed_inline_table_rejects_later_header() {
        let err = parse(
            b"name = {a = 1}\n[name.a]\nb = 2\n",
            ParserOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TomlError::DuplicateKey { .. }));
    }

    #[test]
    fn heterogeneous_array_is_allowed() {
        let doc = parse_ok("x = [1, \"two\", true]\n");
        let arr = doc.as_table().get("x").unwrap().as_array().unwrap();
        assert_eq!(arr.len(), 3);
    }

    #[test]
    fn sibling_array_of_tables_elements_do_not_collide_on_leaf_names() {
        // Regression test: a flat path-string registry would see "a.y"
        // declared twice here and reject the second element. Each element
        // gets its own registry scope, so this must succeed.
        let doc = parse_ok("[[a]]\ny = 1\n[[a]]\ny = 2\n[[a]]\ny = 3\n");
        let a = doc.as_table().get("a").unwrap().as_array().unwrap();
        assert_eq!(a.len(), 3);
        for (i, elem) in a.iter().enumerate() {
            assert_eq!(elem.as_table().unwrap().get("y"), Some(&Value::Integer(i as i64 + 1)));
        }
    }

    #[test]
    fn nested_explicit_table_inside_each_array_of_tables_element() {
        let doc = parse_ok(
            "[[fruits]]\nname = \"apple\"\n\n[fruits.physical]\ncolor = \"red\"\n\n\
             [[fruits]]\nname = \"banana\"\n\n[fruits.physical]\ncolor = \"yellow\"\n",
        );
        let fruits = doc.as_table().get("fruits").unwrap().as_array().unwrap();
        assert_eq!(fruits.len(), 2);
        let apple_color = fruits[0]
            .as_table()
            .unwrap()
            .get("physical")
            .unwrap()
            .as_table()
            .unwrap()
            .get("color")
            .unwrap()
            .as_str();
        let banana_color = fruits[1]
            .as_table()
            .unwrap()
            .get("physical")
            .unwrap()
            .as_table()
            .unwrap()
            .get("color")
            .unwrap()
            .as_str();
        assert_eq!(apple_color, Some("red"));
        assert_eq!(banana_color, Some("yellow"));
    }

    #[test]
    fn nested_array_of_tables_extends_independently_per_parent_element() {
        let doc = parse_ok(
            "[[fruits]]\nname = \"apple\"\n[[fruits.variety]]\nname = \"red delicious\"\n\
             [[fruits]]\nname = \"banana\"\n[[fruits.variety]]\nname = \"plantain\"\n",
        );
        let fruits = doc.as_table().get("fruits").unwrap().as_array().unwrap();
        let apple_variety = fruits[0].as_table().unwrap().get("variety").unwrap().as_array().unwrap();
        let banana_variety = fruits[1].as_table().unwrap().get("variety").unwrap().as_array().unwrap();
        assert_eq!(apple_variety.len(), 1);
        assert_eq!(banana_variety.len(), 1);
    }

    #[test]
    fn inline_tables_in_an_array_isolate_their_own_registries() {
        let doc = parse_ok("x = [{a = 1}, {a = 2}]\n");
        let arr = doc.as_table().get("x").unwrap().as_array().unwrap();
        assert_eq!(arr[0].as_table().unwrap().get("a"), Some(&Value::Integer(1)));
        assert_eq!(arr[1].as_table().unwrap().get("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn based_integers_decode_correctly() {
        let doc = parse_ok("x = 0xFF\ny = 0o17\nz = 0b101\n");
        assert_eq!(doc.as_table().get("x"), Some(&Value::Integer(255)));
        assert_eq!(doc.as_table().get("y"), Some(&Value::Integer(15)));
        assert_eq!(doc.as_table().get("z"), Some(&Value::Integer(5)));
    }
}
