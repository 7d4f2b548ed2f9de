//! The parsed value tree.

use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};

/// A parsed TOML value.
///
/// Tables preserve source insertion order: iterating `Table::iter()` visits
/// keys in the order they were first assigned, as required by spec.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    String(Cow<'a, str>),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Datetime(Datetime),
    Array(Vec<Value<'a>>),
    Table(Table<'a>),
}

/// An insertion-ordered string-keyed map.
///
/// A plain `HashMap` cannot preserve insertion order, so this keeps a
/// parallel `Vec` of keys alongside the map, the same trade-off the TOML
/// data model requires (spec: "Key insertion order within each table is
/// preserved").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table<'a> {
    keys: Vec<Cow<'a, str>>,
    entries: std::collections::HashMap<Cow<'a, str>, Value<'a>>,
}

impl<'a> Table<'a> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            entries: std::collections::HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value<'a>> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value<'a>> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a freshly-declared key. Callers are expected to have already
    /// checked the declaration registry; this never overwrites silently
    /// but is an internal invariant, not a public re-assignment guard.
    pub fn insert(&mut self, key: Cow<'a, str>, value: Value<'a>) {
        if !self.entries.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.entries.insert(key, value);
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value<'a>)> {
        self.keys.iter().map(move |k| {
            let v = self.entries.get(k).expect("key list and map stay in sync");
            (k.as_ref(), v)
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.as_ref())
    }
}

/// A parsed RFC 3339-ish datetime lexeme.
///
/// Fields are `Option` because the four TOML forms (offset-datetime,
/// local-datetime, local-date, local-time) each populate a different
/// subset: a bare local-time has no date components, a local-date has no
/// time components, and only offset-datetime populates `offset_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Datetime {
    pub year: Option<u16>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    pub nanosecond: Option<u32>,
    pub offset_sign: Option<Sign>,
    pub offset_hour: Option<u8>,
    pub offset_minute: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

impl Datetime {
    pub fn has_date(&self) -> bool {
        self.year.is_some()
    }

    pub fn has_time(&self) -> bool {
        self.hour.is_some()
    }

    /// `true` for an offset-datetime, i.e. `Z`/`z` or an explicit `±HH:MM`
    /// was present in the lexeme.
    pub fn has_offset(&self) -> bool {
        self.offset_sign.is_some()
    }
}

impl Display for Datetime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let (Some(y), Some(mo), Some(d)) = (self.year, self.month, self.day) {
            write!(f, "{:04}-{:02}-{:02}", y, mo, d)?;
        }
        if self.has_date() && self.has_time() {
            write!(f, "T")?;
        }
        if let (Some(h), Some(mi), Some(s)) = (self.hour, self.minute, self.second) {
            write!(f, "{:02}:{:02}:{:02}", h, mi, s)?;
            if let Some(ns) = self.nanosecond {
                if ns > 0 {
                    write!(f, ".{:09}", ns)?;
                }
            }
        }
        match (self.offset_sign, self.offset_hour, self.offset_minute) {
            (Some(Sign::Positive), Some(0), Some(0)) => write!(f, "Z")?,
            (Some(sign), Some(h), Some(m)) => {
                let c = if sign == Sign::Positive { '+' } else { '-' };
                write!(f, "{}{:02}:{:02}", c, h, m)?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl<'a> Value<'a> {
    pub fn as_table(&self) -> Option<&Table<'a>> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut Table<'a>> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value<'a>>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value<'a>>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert every borrowed slice in the tree into an owned copy.
    ///
    /// Per the borrow-transparency law, the result must be structurally
    /// equal to `self`.
    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::String(s) => Value::String(Cow::Owned(s.into_owned())),
            Value::Integer(i) => Value::Integer(i),
            Value::Float(f) => Value::Float(f),
            Value::Bool(b) => Value::Bool(b),
            Value::Datetime(d) => Value::Datetime(d),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::into_owned).collect())
            }
            Value::Table(table) => {
                let mut owned = Table::new();
                for key in table.keys.clone() {
                    let value = table.entries.get(&key).unwrap().clone();
                    owned.insert(Cow::Owned(key.into_owned()), value.into_owned());
                }
                Value::Table(owned)
            }
        }
    }
}

/// Pretty-prints the value tree for debugging, mirroring how the teacher
/// crate makes its AST inspectable via `ptree`.
struct TreeView<'v, 'a> {
    label: String,
    value: &'v Value<'a>,
}

impl<'v, 'a> ptree::TreeItem for TreeView<'v, 'a> {
    type Child = TreeView<'v, 'a>;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        match self.value {
            Value::Table(_) | Value::Array(_) => write!(f, "{}", self.label),
            other => write!(f, "{} = {:?}", self.label, other),
        }
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        let children: Vec<TreeView<'v, 'a>> = match self.value {
            Value::Table(table) => table
                .iter()
                .map(|(k, v)| TreeView {
                    label: k.to_string(),
                    value: v,
                })
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| TreeView {
                    label: format!("[{}]", i),
                    value: v,
                })
                .collect(),
            _ => Vec::new(),
        };
        std::borrow::Cow::Owned(children)
    }
}

impl<'a> Value<'a> {
    /// Print the value tree to stdout for debugging.
    pub fn print(&self) -> std::io::Result<()> {
        ptree::print_tree(&TreeView {
            label: "root".to_string(),
            value: self,
        })
    }
}

/// The result of a successful [`crate::parse`] call: the root table plus
/// enough bookkeeping to answer "did everything borrow the input".
#[derive(Debug, Clone, PartialEq)]
pub struct Document<'a> {
    pub root: Value<'a>,
    diagnostics: crate::util::Diagnostics,
}

impl<'a> Document<'a> {
    pub fn new(root: Value<'a>, diagnostics: crate::util::Diagnostics) -> Self {
        Self { root, diagnostics }
    }

    pub fn as_table(&self) -> &Table<'a> {
        self.root.as_table().expect("root value is always a table")
    }

    /// Line, column, and byte offset at the end of the document (spec.md
    /// §6, "Diagnostics").
    pub fn diagnostics(&self) -> crate::util::Diagnostics {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_preserves_insertion_order() {
        let mut table = Table::new();
        table.insert(Cow::Borrowed("b"), Value::Integer(1));
        table.insert(Cow::Borrowed("a"), Value::Integer(2));
        let keys: Vec<&str> = table.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn into_owned_is_structurally_equal() {
        let mut table = Table::new();
        table.insert(Cow::Borrowed("x"), Value::String(Cow::Borrowed("hi")));
        let borrowed = Value::Table(table);
        let owned = borrowed.clone().into_owned();
        assert_eq!(borrowed, owned);
    }
}
