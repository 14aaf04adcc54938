//! Batched lookups on top of a [`TypeCatalog`], with the validation that
//! turns raw catalog rows into resolver input.
//!
//! Each function here maps to exactly one catalog round trip (none for an
//! empty batch) and returns one result per request, in request order.
//!
//! [`TypeCatalog`]: crate::catalog::TypeCatalog

use crate::catalog::{Oid, TypType};
use crate::error::Error;

pub(crate) mod basic;
pub(crate) mod detail;

/// What the catalog knows about a plain type name, before looking at its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBasicInfo {
    /// The name as sent to the catalog, e.g. `_text` or `character varying`.
    pub plain_name: String,
    /// OID of the element type, after unwrapping catalog arrays.
    pub oid: Oid,
    pub schema: String,
    pub name: String,
    /// `schema.name`
    pub canonical_name: String,
    pub kind: TypType,
    /// Number of catalog array types unwrapped to reach `oid`.
    pub internal_dimensions: usize,
    pub composite_relation_id: Option<Oid>,
    pub domain_base_type_id: Option<Oid>,
    pub range_subtype_id: Option<Oid>,
}

/// One entry of a kind-detail batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DetailRequest {
    /// The relation for composites, the type itself for other kinds.
    pub(crate) catalog_id: Oid,
    pub(crate) canonical_name: String,
}

/// The catalog answered with rows that cannot be matched to the requests.
pub(crate) fn misaligned(lookup: &str, expected: usize, actual: usize) -> Error {
    Error::Database(sqlx::Error::Protocol(format!(
        "{lookup} lookup returned rows out of step with its requests: expected {expected}, got {actual}"
    )))
}
