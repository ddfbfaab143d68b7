//! Catalog-derived type information, cached per [`crate::PgConnection`] by
//! OID (spec.md §9 "Composite / enum decoding").

/// What a non-built-in OID turned out to be, after one `pg_type`/`pg_attribute`
/// round-trip.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Enum,
    Composite { fields: Vec<(String, u32)> },
    /// Domain or otherwise-uninteresting type; decoded using its base OID's
    /// built-in path.
    Base { base_oid: u32 },
}

#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub oid: u32,
    pub name: String,
    pub kind: TypeKind,
}
