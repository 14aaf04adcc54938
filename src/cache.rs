//! Session-scoped resolution cache.
//!
//! Two maps: plain type name to basic info, and canonical name to the kind
//! payload. Both are keyed by values that only mean something within one
//! database, so the cache lives and dies with one [`TypeResolver`] session and
//! must be cleared before the resolver talks to another database.
//!
//! A [`TypeResolver::resolve_all`] call never writes to the cache directly.
//! It stages its insertions in a [`CacheTxn`] layered over the committed
//! state and commits them only once every depth succeeded.
//!
//! [`TypeResolver`]: crate::TypeResolver
//! [`TypeResolver::resolve_all`]: crate::TypeResolver::resolve_all

use std::collections::HashMap;
use std::sync::Arc;

use crate::resolve::ResolvedBasicInfo;
use crate::type_info::TypeKind;

#[derive(Debug, Default)]
pub(crate) struct TypeCache {
    basic: HashMap<String, Arc<ResolvedBasicInfo>>,
    detail: HashMap<String, TypeKind>,
}

/// Entries staged by one resolver call.
#[derive(Debug, Default)]
pub(crate) struct StagedEntries {
    basic: HashMap<String, Arc<ResolvedBasicInfo>>,
    detail: HashMap<String, TypeKind>,
}

/// A read-through overlay of uncommitted entries on top of a [`TypeCache`].
#[derive(Debug)]
pub(crate) struct CacheTxn<'c> {
    committed: &'c TypeCache,
    staged: StagedEntries,
}

impl TypeCache {
    pub(crate) fn begin(&self) -> CacheTxn<'_> {
        CacheTxn {
            committed: self,
            staged: StagedEntries::default(),
        }
    }

    pub(crate) fn commit(&mut self, staged: StagedEntries) {
        self.basic.extend(staged.basic);
        self.detail.extend(staged.detail);
    }

    pub(crate) fn clear(&mut self) {
        self.basic.clear();
        self.detail.clear();
    }

    /// Number of distinct canonical types with a resolved payload.
    pub(crate) fn resolved_types(&self) -> usize {
        self.detail.len()
    }
}

impl CacheTxn<'_> {
    pub(crate) fn basic(&self, plain_name: &str) -> Option<&Arc<ResolvedBasicInfo>> {
        self.staged
            .basic
            .get(plain_name)
            .or_else(|| self.committed.basic.get(plain_name))
    }

    pub(crate) fn insert_basic(&mut self, info: ResolvedBasicInfo) {
        self.staged
            .basic
            .insert(info.plain_name.clone(), Arc::new(info));
    }

    pub(crate) fn detail(&self, canonical_name: &str) -> Option<&TypeKind> {
        self.staged
            .detail
            .get(canonical_name)
            .or_else(|| self.committed.detail.get(canonical_name))
    }

    pub(crate) fn has_detail(&self, canonical_name: &str) -> bool {
        self.detail(canonical_name).is_some()
    }

    pub(crate) fn insert_detail(&mut self, canonical_name: String, kind: TypeKind) {
        debug_assert!(
            !self.has_detail(&canonical_name),
            "(bug) detail for {canonical_name} resolved twice"
        );

        self.staged.detail.insert(canonical_name, kind);
    }

    pub(crate) fn into_staged(self) -> StagedEntries {
        self.staged
    }
}
