//! Static field-descriptor tables.
//!
//! Every entity type declares its persistable fields in a `const`
//! table, resolved at compile time. The reserved bookkeeping leaves
//! `hash` and `updated_at` are written alongside the fields but never
//! appear in a table and never participate in the content hash.

/// How a field is encoded in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain string leaf.
    Scalar,
    /// JSON-encoded list of strings in a single leaf.
    List,
    /// Arbitrary JSON document in a single leaf.
    Json,
    /// One logical field fanned out into `<path>/<field>/<subkey>`
    /// child leaves, merged back into a map on load.
    Dir,
}

/// Descriptor for one persistable field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Leaves reserved for persistence bookkeeping.
pub const RESERVED_LEAVES: [&str; 2] = ["hash", "updated_at"];

/// Descriptor for an entity type.
#[derive(Debug, Clone, Copy)]
pub struct EntityDef {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

impl EntityDef {
    pub const fn new(name: &'static str, fields: &'static [FieldDef]) -> Self {
        Self { name, fields }
    }

    /// Look up a field descriptor by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check the table against the reserved-leaf rule.
    pub fn is_well_formed(&self) -> bool {
        self.fields
            .iter()
            .all(|f| !RESERVED_LEAVES.contains(&f.name) && !f.name.starts_with('_'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEF: EntityDef = EntityDef::new(
        "Sample",
        &[
            FieldDef::new("name", FieldKind::Scalar),
            FieldDef::new("tags", FieldKind::List),
        ],
    );

    #[test]
    fn test_field_lookup() {
        assert_eq!(DEF.field("name").unwrap().kind, FieldKind::Scalar);
        assert_eq!(DEF.field("tags").unwrap().kind, FieldKind::List);
        assert!(DEF.field("hash").is_none());
    }

    #[test]
    fn test_well_formed() {
        assert!(DEF.is_well_formed());

        const BAD: EntityDef = EntityDef::new(
            "Bad",
            &[FieldDef::new("updated_at", FieldKind::Scalar)],
        );
        assert!(!BAD.is_well_formed());
    }
}
