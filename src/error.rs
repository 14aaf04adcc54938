//! Types for working with errors produced by the type resolver.

use std::result::Result as StdResult;

/// A specialized `Result` type for type resolution.
pub type Result<T> = StdResult<T, Error>;

/// Represents all the ways a call to [`TypeResolver::resolve_all`] can fail.
///
/// None of these are recoverable for the batch in flight: the resolver never
/// retries, never substitutes a fallback type and never skips a request.
///
/// [`TypeResolver::resolve_all`]: crate::TypeResolver::resolve_all
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error returned while querying the catalog.
    #[error("error returned from catalog query: {0}")]
    Database(#[from] sqlx::Error),

    /// A requested type does not exist in the catalog, or its text could not
    /// be split into a type name.
    #[error("type `{type_text}` does not exist in the catalog")]
    UnresolvableName {
        /// The request text, verbatim as it was enqueued.
        type_text: String,
    },

    /// A type exists but its `pg_type.typtype` is not one of the supported kinds.
    #[error("type `{canonical_name}` has unsupported kind `{typtype}`")]
    UnsupportedKind {
        canonical_name: String,
        /// Raw `pg_type.typtype` code.
        typtype: char,
    },

    /// The catalog returned data that contradicts its own declarations.
    #[error("catalog entry for `{canonical_name}` (oid {oid}) is corrupt: {reason}")]
    Corrupt {
        canonical_name: String,
        oid: u32,
        reason: String,
    },

    /// Missing or invalid configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    #[inline]
    pub(crate) fn unresolvable(type_text: impl Into<String>) -> Self {
        Error::UnresolvableName {
            type_text: type_text.into(),
        }
    }

    #[inline]
    pub(crate) fn corrupt(canonical_name: &str, oid: u32, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            canonical_name: canonical_name.to_owned(),
            oid,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the catalog itself could not be queried, as opposed to
    /// the catalog answering with something unusable.
    pub fn is_database(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}
