//! Canonicalization of PostgreSQL type references.
//!
//! Code generators that walk a schema collect type text from many places
//! (`numeric(10,2)[]`, `_text`, `public.address`, `character varying(10)`)
//! and need each of them as one canonical, fully expanded descriptor. This
//! crate turns that text into [`CanonicalType`] trees using as few catalog
//! round trips as possible:
//!
//! - [`TypeResolver::enqueue`] hands out a [`TypeSlot`] immediately.
//! - [`TypeResolver::resolve_all`] resolves everything queued, breadth-first,
//!   with one batched query per lookup kind and depth.
//! - Results are cached per session, so every canonical type is looked up
//!   once no matter how often it is referenced.
//!
//! The catalog is reached through the [`TypeCatalog`] trait; [`PgCatalog`]
//! implements it on top of an `sqlx` connection pool.
#![forbid(unsafe_code)]

pub mod catalog;
pub mod error;
pub mod type_info;
pub mod type_text;

mod cache;
mod logger;
mod options;
mod resolve;
mod resolver;

pub use catalog::{
    AttributeRow, BasicInfoRow, CatalogType, CompositeRow, EnumLabelRow, Oid, PgCatalog,
    TypType, TypeCatalog, TypeNameRow,
};
pub use error::{Error, Result};
pub use options::{LogSettings, ResolverOptions};
pub use resolve::ResolvedBasicInfo;
pub use resolver::{ResolverStats, TypeQueue, TypeResolver};
pub use type_info::{CanonicalType, CompositeAttribute, Generated, TypeKind, TypeSlot};
pub use type_text::ParsedType;
