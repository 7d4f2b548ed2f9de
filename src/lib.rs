//! A TOML 1.0 document parser built around a byte-oriented streaming
//! scanner and a small tree builder, rather than a grammar-driven
//! production pipeline.
//!
//! # Overview
//!
//! TOML's grammar is small but textured: keys can be bare, quoted, or
//! dotted; strings come in four flavors with their own escaping and
//! whitespace-trimming rules; a bare integer literal can turn out, several
//! characters in, to actually be a date. Rather than layering productions
//! over a generic tokenizer, this crate reads the input once as a stream of
//! bytes through an explicit scanner state machine
//! ([`scanner::Scanner`]), and resolves dotted key paths and table/array-of-
//! tables declarations through a small declaration registry as it builds
//! the value tree.
//!
//! # Example
//!
//! ```
//! use toml_core::{parse, ParserOptions, Value};
//!
//! let input = br#"
//! title = "example"
//!
//! [package]
//! name = "demo"
//! version = "0.1.0"
//!
//! [[package.authors]]
//! name = "a"
//! "#;
//!
//! let document = parse(input, ParserOptions::default()).unwrap();
//! let package = document.as_table().get("package").unwrap().as_table().unwrap();
//! assert_eq!(package.get("name"), Some(&Value::String("demo".into())));
//! ```

mod builder;
mod datetime;
mod error;
mod options;
pub mod scanner;
mod token;
mod util;
mod value;

pub use builder::parse;
pub use error::TomlError;
pub use options::{AllocationMode, ParserOptions};
pub use token::{CoalescedToken, Token};
pub use util::{Diagnostics, Position};
pub use value::{Datetime, Document, Sign, Table, Value};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_small_document_end_to_end() {
        let input = b"a = 1\nb.c = \"x\"\n[[t]]\nk = 1\n[[t]]\nk = 2\n";
        let document = parse(input, ParserOptions::default()).expect("valid document");
        let root = document.as_table();
        assert_eq!(root.get("a"), Some(&Value::Integer(1)));
        let t = root.get("t").unwrap().as_array().unwrap();
        assert_eq!(t.len(), 2);
    }
}
