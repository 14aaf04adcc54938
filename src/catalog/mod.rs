//! Access to the system catalog.
//!
//! [`TypeCatalog`] is the seam between the resolver and the database: one
//! method per kind of batched lookup, each answered in a single round trip.
//! Implementations return raw rows tagged with the position of the request
//! they answer; validation and interpretation happen in the resolver.
//!
//! [`PgCatalog`] is the implementation over a live PostgreSQL connection pool.

use futures_core::future::BoxFuture;

use crate::error::Result;

pub use sqlx::postgres::types::Oid;

mod postgres;


pub use postgres::PgCatalog;

/// Batched, read-only lookups against `pg_catalog`.
///
/// Every method receives a batch of requests and must issue at most one
/// query for it. Rows carry the zero-based `index` of the request they
/// answer.
pub trait TypeCatalog: Send + Sync {
    /// Resolve type names (as accepted by `to_regtype`) to the element type
    /// reached by unwrapping catalog-internal array types.
    ///
    /// Exactly one row per name, in request order.
    fn fetch_basic_info<'c>(&'c self, names: &'c [String]) -> BoxFuture<'c, Result<Vec<BasicInfoRow>>>;

    /// Labels of enum types, ordered by request then `enumsortorder`.
    fn fetch_enum_labels<'c>(&'c self, type_ids: &'c [Oid]) -> BoxFuture<'c, Result<Vec<EnumLabelRow>>>;

    /// Attributes of the relations backing composite types, ordered by
    /// request then `attnum`.
    ///
    /// At least one row per request; a relation without attributes yields a
    /// single row with `attribute: None`.
    fn fetch_composite_attributes<'c>(
        &'c self,
        relation_ids: &'c [Oid],
    ) -> BoxFuture<'c, Result<Vec<CompositeRow>>>;

    /// First non-domain ancestor of domain types. Exactly one row per request.
    fn fetch_domain_bases<'c>(&'c self, type_ids: &'c [Oid]) -> BoxFuture<'c, Result<Vec<TypeNameRow>>>;

    /// Subtypes of range types. Exactly one row per request.
    fn fetch_range_subtypes<'c>(&'c self, type_ids: &'c [Oid]) -> BoxFuture<'c, Result<Vec<TypeNameRow>>>;
}

/// Answer to one name in [`TypeCatalog::fetch_basic_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicInfoRow {
    pub index: usize,
    /// `None` if the name does not denote a type.
    pub ty: Option<CatalogType>,
}

/// A `pg_type` row, reached after unwrapping `array_layers` array types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogType {
    pub oid: Oid,
    pub schema: String,
    pub name: String,
    /// `pg_type.typtype`.
    pub typtype: u8,
    pub array_layers: usize,
    /// `pg_type.typrelid`, `0` unless composite.
    pub relation_id: Oid,
    /// `pg_type.typbasetype`, `0` unless a domain.
    pub base_type_id: Oid,
    /// `pg_range.rngsubtype`, for ranges.
    pub range_subtype_id: Option<Oid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumLabelRow {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeRow {
    pub index: usize,
    /// Number of non-dropped attributes the relation declares, `None` if the
    /// relation does not exist.
    pub declared_attributes: Option<usize>,
    pub attribute: Option<AttributeRow>,
}

/// A `pg_attribute` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub name: String,
    /// `attnum`
    pub ordinal: usize,
    /// `format_type(atttypid, atttypmod)`
    pub type_text: String,
    pub comment: Option<String>,
    pub default_value: Option<String>,
    pub not_null: bool,
    /// `attidentity`, `0` when not an identity column.
    pub identity: u8,
    /// `attgenerated`, `0` when not a generated column.
    pub generated: u8,
}

/// The name of a type that another type is defined over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNameRow {
    pub index: usize,
    pub type_id: Option<Oid>,
    /// `format_type(...)` of `type_id`, resolvable with `to_regtype`.
    pub type_text: Option<String>,
}

/// Describes the type of the `pg_type.typtype` column
///
/// See <https://www.postgresql.org/docs/current/catalog-pg-type.html>
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypType {
    Base,
    Composite,
    Domain,
    Enum,
    Pseudo,
    Range,
}

impl TryFrom<u8> for TypType {
    type Error = ();

    fn try_from(t: u8) -> std::result::Result<Self, Self::Error> {
        let t = match t {
            b'b' => Self::Base,
            b'c' => Self::Composite,
            b'd' => Self::Domain,
            b'e' => Self::Enum,
            b'p' => Self::Pseudo,
            b'r' => Self::Range,
            _ => return Err(()),
        };
        Ok(t)
    }
}
