//! Canonical type descriptors.
//!
//! A [`CanonicalType`] is what the resolver hands to code generators: the
//! identity of a catalog type, its true array depth and, depending on its
//! kind, the labels, attributes or underlying types it is built from.
//!
//! Nested types are reached through [`TypeSlot`]s. A slot is a shared cell
//! written exactly once, when the [`TypeResolver`](crate::TypeResolver) call
//! that created it completes. Every clone of a slot observes the same value,
//! which is how a composite referenced from a hundred columns is resolved and
//! stored once.

use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, OnceLock};

use serde::{Serialize, Serializer};

/// A fully resolved type reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalType {
    /// The request text, verbatim.
    pub original_type: String,
    /// `schema.name` of the element type, after unwrapping catalog arrays.
    pub canonical_name: String,
    pub schema: String,
    pub name: String,
    /// Explicit brackets plus catalog-internal array layers.
    pub dimensions: usize,
    /// Contents of the type modifier group, e.g. `10,2` for `numeric(10,2)`.
    pub modifiers: Option<String>,
    #[serde(flatten)]
    pub kind: TypeKind,
}

/// Kind of a [`CanonicalType`], with its kind-specific payload.
///
/// Payloads are reference counted: two descriptors with the same canonical
/// name that came out of the same resolver session share them.
///
/// See <https://www.postgresql.org/docs/current/catalog-pg-type.html>.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    /// `b` in `pg_type.typtype`.
    Base,
    /// `p` in `pg_type.typtype`.
    Pseudo,
    /// `e` in `pg_type.typtype`.
    ///
    /// Labels in `enumsortorder`.
    Enum {
        #[serde(rename = "enum_values")]
        values: Arc<[String]>,
    },
    /// `c` in `pg_type.typtype`.
    ///
    /// Non-dropped attributes in declaration order.
    Composite {
        attributes: Arc<[CompositeAttribute]>,
    },
    /// `d` in `pg_type.typtype`.
    ///
    /// The first non-domain ancestor, never an intermediate domain.
    Domain {
        #[serde(rename = "domain_base_type")]
        base_type: TypeSlot,
    },
    /// `r` in `pg_type.typtype`.
    Range {
        #[serde(rename = "range_subtype")]
        subtype: TypeSlot,
    },
}

/// One attribute of a composite type (or a column of the relation backing it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeAttribute {
    pub name: String,
    /// `pg_attribute.attnum`, starting at 1.
    pub ordinal_index: usize,
    #[serde(rename = "type")]
    pub ty: TypeSlot,
    pub comment: Option<String>,
    /// The default expression as SQL text.
    pub default_value: Option<String>,
    pub is_nullable: bool,
    pub is_identity: bool,
    pub generated: Generated,
}

/// How the value of an attribute is produced when not supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Generated {
    /// `GENERATED ALWAYS AS IDENTITY` or `GENERATED ALWAYS AS (...) STORED`.
    Always,
    /// `GENERATED BY DEFAULT AS IDENTITY`.
    ByDefault,
    Never,
}

impl Generated {
    /// Classify from `pg_attribute.attidentity` and `pg_attribute.attgenerated`.
    ///
    /// Identity takes priority over generated columns.
    pub(crate) fn from_catalog(identity: u8, generated: u8) -> Self {
        match (identity, generated) {
            (b'a', _) => Generated::Always,
            (b'd', _) => Generated::ByDefault,
            (_, b's') => Generated::Always,
            _ => Generated::Never,
        }
    }
}

impl CanonicalType {
    /// `true` if this describes an array (of any depth) of the named type.
    pub fn is_array(&self) -> bool {
        self.dimensions > 0
    }

    /// Enum labels, in catalog sort order.
    pub fn enum_values(&self) -> Option<&[String]> {
        match &self.kind {
            TypeKind::Enum { values } => Some(&values[..]),
            _ => None,
        }
    }

    /// Attributes of a composite type.
    pub fn attributes(&self) -> Option<&[CompositeAttribute]> {
        match &self.kind {
            TypeKind::Composite { attributes } => Some(&attributes[..]),
            _ => None,
        }
    }

    /// Fully dealiased base of a domain, once resolved.
    pub fn domain_base_type(&self) -> Option<&CanonicalType> {
        match &self.kind {
            TypeKind::Domain { base_type } => base_type.get(),
            _ => None,
        }
    }

    /// Element type of a range, once resolved.
    pub fn range_subtype(&self) -> Option<&CanonicalType> {
        match &self.kind {
            TypeKind::Range { subtype } => subtype.get(),
            _ => None,
        }
    }
}

/// A shared, write-once cell holding a [`CanonicalType`].
///
/// Returned by [`TypeResolver::enqueue`](crate::TypeResolver::enqueue) before
/// anything is known about the type. Reading it yields `None` until the
/// resolver call that drains it succeeds.
#[derive(Clone, Default)]
pub struct TypeSlot(Arc<OnceLock<CanonicalType>>);

impl TypeSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The resolved type, if the slot was filled.
    pub fn get(&self) -> Option<&CanonicalType> {
        self.0.get()
    }

    pub fn is_filled(&self) -> bool {
        self.0.get().is_some()
    }

    /// `true` if both handles point at the same cell.
    pub fn ptr_eq(&self, other: &TypeSlot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn fill(&self, ty: CanonicalType) {
        // a slot is only ever queued once, so the cell must still be empty
        let filled = self.0.set(ty).is_ok();
        debug_assert!(filled, "(bug) type slot filled twice");
    }
}

impl Debug for TypeSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(ty) => f.debug_tuple("TypeSlot").field(ty).finish(),
            None => f.write_str("TypeSlot(<pending>)"),
        }
    }
}

impl PartialEq for TypeSlot {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.get() == other.get()
    }
}

impl Eq for TypeSlot {}

impl Serialize for TypeSlot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.get().serialize(serializer)
    }
}
