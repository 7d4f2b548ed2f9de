//! The declaration registry (spec.md §3 "Declaration registry", §4.2).
//!
//! Mirrors the shape of the `Value` tree being built rather than keying on
//! flattened dotted-path strings: each registry node sits beside exactly the
//! table (or array-of-tables element) it governs, so that two sibling
//! elements of the same `[[array]]` naturally get their own independent set
//! of declared keys -- which is what makes each element's body "a fresh,
//! isolated declaration registry" (spec.md §4.2 "Array-of-tables headers",
//! step 3) without any special-casing: it falls out of walking the tree the
//! same way the `Value` side does.
//!
//! A flat `HashMap<String, DeclKind>` keyed by joined dotted path was tried
//! first and is wrong: it makes a leaf key declared inside one `[[array]]`
//! element collide with the same key declared inside a later element of the
//! same array, since both share the literal path `array.key`. Walking a
//! parallel tree instead of a flat map is what the teacher's own
//! `field_tree`-style tree-shaped bookkeeping already does elsewhere in this
//! crate; applying that habit here is what fixes it.

use crate::error::TomlError;
use crate::util::Position;
use std::collections::HashMap;

/// One node of the registry tree. Lives at the same position in the tree as
/// the `Value` it governs.
pub enum RegEntry {
    /// A string/int/float/bool/datetime/array-of-plain-values, or a sealed
    /// inline table. All of these share one property that matters here:
    /// once declared, nothing may navigate through them again.
    Leaf,
    /// A table reachable by dotted keys and/or a `[x]` header. `explicit`
    /// distinguishes a super-table materialized only as a side effect
    /// (promotable exactly once) from one declared by its own header.
    Table {
        explicit: bool,
        children: HashMap<String, RegEntry>,
    },
    /// The elements of a `[[x]]` array-of-tables, in declaration order. Each
    /// element is always a `Table`; only the last one is ever the "current"
    /// element for subsequent statements, mirroring how the `Value` side
    /// always descends into `items.last_mut()`.
    ArrayOfTables { elements: Vec<RegEntry> },
}

impl RegEntry {
    /// The registry node for a fresh table scope: the document root, or the
    /// isolated scope of an inline table.
    pub fn new_root() -> Self {
        RegEntry::Table {
            explicit: true,
            children: HashMap::new(),
        }
    }

    fn duplicate(key: &str, at: Position) -> TomlError {
        TomlError::DuplicateKey {
            at,
            key: key.to_string(),
        }
    }

    fn children_mut(&mut self) -> &mut HashMap<String, RegEntry> {
        match self {
            RegEntry::Table { children, .. } => children,
            _ => unreachable!("registry navigation never descends into a non-table node"),
        }
    }

    /// Walk (creating if absent) an intermediate super-table segment while
    /// resolving a dotted key or header path. Returns the node to continue
    /// walking from: the table itself, or an array-of-tables' last element.
    pub fn step_implicit(&mut self, seg: &str, full_path: &str, at: Position) -> Result<&mut RegEntry, TomlError> {
        let slot = self
            .children_mut()
            .entry(seg.to_string())
            .or_insert_with(|| RegEntry::Table {
                explicit: false,
                children: HashMap::new(),
            });
        match slot {
            RegEntry::Table { .. } => Ok(slot),
            RegEntry::ArrayOfTables { elements } => {
                Ok(elements.last_mut().expect("array-of-tables is never empty"))
            }
            RegEntry::Leaf => Err(Self::duplicate(full_path, at)),
        }
    }

    /// Walk an intermediate segment of a dotted *key statement's own* path
    /// (as opposed to a table-header path, or the prefix re-entering the
    /// table the current header already opened -- both of those stay
    /// lenient via [`Self::step_implicit`]). Creates a fresh implicit table
    /// when the segment is unseen, continues through an existing implicit
    /// one, but rejects stepping through a table already declared explicit
    /// by its own `[header]`: reaching back into an explicitly-declared
    /// table via a dotted key is not allowed, only that table's own header
    /// body may add to it (spec.md §8 boundary case, "Header `[a]`
    /// declared, then key `a.b`: error").
    pub fn step_dotted_key_intermediate(
        &mut self,
        seg: &str,
        full_path: &str,
        at: Position,
    ) -> Result<&mut RegEntry, TomlError> {
        let slot = self
            .children_mut()
            .entry(seg.to_string())
            .or_insert_with(|| RegEntry::Table {
                explicit: false,
                children: HashMap::new(),
            });
        match slot {
            RegEntry::Table { explicit: true, .. } => Err(Self::duplicate(full_path, at)),
            RegEntry::Table { .. } => Ok(slot),
            RegEntry::ArrayOfTables { elements } => {
                Ok(elements.last_mut().expect("array-of-tables is never empty"))
            }
            RegEntry::Leaf => Err(Self::duplicate(full_path, at)),
        }
    }

    /// Declare the final segment of an explicit `[a.b.c]` header: promotes a
    /// prior implicit table exactly once, or creates a fresh explicit one.
    /// Any other existing kind is a duplicate-key error.
    pub fn step_table(&mut self, seg: &str, full_path: &str, at: Position) -> Result<&mut RegEntry, TomlError> {
        let slot = self
            .children_mut()
            .entry(seg.to_string())
            .or_insert_with(|| RegEntry::Table {
                explicit: false,
                children: HashMap::new(),
            });
        match slot {
            RegEntry::Table { explicit, .. } if !*explicit => {
                *explicit = true;
                Ok(slot)
            }
            _ => Err(Self::duplicate(full_path, at)),
        }
    }

    /// Declare the final segment of an `[[a.b.c]]` header: extends an
    /// existing array of tables, promotes a prior implicit table into the
    /// array's first element, or creates a fresh one. Returns the freshly
    /// appended (now current) element.
    pub fn step_array_table(&mut self, seg: &str, full_path: &str, at: Position) -> Result<&mut RegEntry, TomlError> {
        let children = self.children_mut();
        match children.get_mut(seg) {
            None => {
                children.insert(
                    seg.to_string(),
                    RegEntry::ArrayOfTables {
                        elements: vec![RegEntry::Table {
                            explicit: true,
                            children: HashMap::new(),
                        }],
                    },
                );
            }
            Some(RegEntry::ArrayOfTables { elements }) => {
                elements.push(RegEntry::Table {
                    explicit: true,
                    children: HashMap::new(),
                });
            }
            Some(RegEntry::Table { explicit: false, .. }) => {
                let promoted = children.remove(seg).expect("just matched Some");
                children.insert(
                    seg.to_string(),
                    RegEntry::ArrayOfTables {
                        elements: vec![
                            promoted,
                            RegEntry::Table {
                                explicit: true,
                                children: HashMap::new(),
                            },
                        ],
                    },
                );
            }
            Some(_) => return Err(Self::duplicate(full_path, at)),
        }
        match children.get_mut(seg) {
            Some(RegEntry::ArrayOfTables { elements }) => Ok(elements
                .last_mut()
                .expect("just pushed or created an element")),
            _ => unreachable!("the branch above always leaves an ArrayOfTables in place"),
        }
    }

    /// Declare a leaf value (any scalar, an array of plain values, or a
    /// sealed inline table). Always an error if the segment already exists,
    /// in any kind: a leaf position can be filled exactly once.
    pub fn step_leaf(&mut self, seg: &str, full_path: &str, at: Position) -> Result<(), TomlError> {
        let children = self.children_mut();
        if children.contains_key(seg) {
            return Err(Self::duplicate(full_path, at));
        }
        children.insert(seg.to_string(), RegEntry::Leaf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::new(1, 1)
    }

    #[test]
    fn implicit_then_explicit_table_promotes() {
        let mut root = RegEntry::new_root();
        root.step_implicit("a", "a", pos()).unwrap();
        root.step_table("a", "a", pos()).unwrap();
        assert!(root.step_table("a", "a", pos()).is_err());
    }

    #[test]
    fn explicit_table_then_dotted_key_errors() {
        let mut root = RegEntry::new_root();
        root.step_table("a", "a", pos()).unwrap();
        assert!(root.step_implicit("a", "a", pos()).is_err());
    }

    #[test]
    fn array_table_extends_on_repeat() {
        let mut root = RegEntry::new_root();
        root.step_array_table("a", "a", pos()).unwrap();
        root.step_array_table("a", "a", pos()).unwrap();
        match root.children_mut().get("a").unwrap() {
            RegEntry::ArrayOfTables { elements } => assert_eq!(elements.len(), 2),
            _ => panic!("expected ArrayOfTables"),
        }
    }

    #[test]
    fn duplicate_leaf_errors() {
        let mut root = RegEntry::new_root();
        root.step_leaf("a", "a", pos()).unwrap();
        assert!(root.step_leaf("a", "a", pos()).is_err());
    }

    #[test]
    fn sealed_leaf_blocks_further_nesting() {
        let mut root = RegEntry::new_root();
        root.step_leaf("name", "name", pos()).unwrap();
        assert!(root.step_implicit("name", "name", pos()).is_err());
    }

    #[test]
    fn dotted_key_cannot_reopen_an_explicit_table() {
        let mut root = RegEntry::new_root();
        root.step_table("a", "a", pos()).unwrap();
        assert!(root
            .step_dotted_key_intermediate("a", "a", pos())
            .is_err());
    }

    #[test]
    fn dotted_key_through_implicit_table_still_works() {
        let mut root = RegEntry::new_root();
        root.step_implicit("a", "a", pos()).unwrap();
        assert!(root
            .step_dotted_key_intermediate("a", "a", pos())
            .is_ok());
    }

    #[test]
    fn sibling_array_elements_isolate_leaf_declarations() {
        // The whole point of a tree-shaped registry: `[[a]]` twice, each
        // with its own `y = ...`, must not collide.
        let mut root = RegEntry::new_root();
        let first = root.step_array_table("a", "a", pos()).unwrap();
        first.step_leaf("y", "a.y", pos()).unwrap();
        let second = root.step_array_table("a", "a", pos()).unwrap();
        second.step_leaf("y", "a.y", pos()).unwrap();
    }
}
