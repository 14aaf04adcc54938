//! The queue/placeholder scheduler.
//!
//! Callers [`enqueue`](TypeResolver::enqueue) raw type text as they discover
//! it and keep the returned [`TypeSlot`]. A single
//! [`resolve_all`](TypeResolver::resolve_all) then drains the queue
//! breadth-first: every depth issues at most one basic-info round trip and
//! one round trip per kind, and the nested references found at depth N
//! (attribute types, domain bases, range subtypes) form the batch of depth
//! N + 1.

use std::collections::HashSet;
use std::future::Future;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::try_join4;

use crate::cache::{CacheTxn, TypeCache};
use crate::catalog::{PgCatalog, TypType, TypeCatalog};
use crate::error::{Error, Result};
use crate::options::{LogSettings, ResolverOptions};
use crate::resolve::basic::resolve_basic;
use crate::resolve::detail::{resolve_composites, resolve_domains, resolve_enums, resolve_ranges};
use crate::resolve::{DetailRequest, ResolvedBasicInfo};
use crate::type_info::{CanonicalType, CompositeAttribute, Generated, TypeKind, TypeSlot};
use crate::type_text::ParsedType;

const TARGET: &str = "pg_typegraph::resolver";

/// Resolves raw PostgreSQL type text into [`CanonicalType`] trees.
///
/// A resolver is one session against one database: its caches hold catalog
/// identifiers, so it must be [cleared](Self::clear) or
/// [pointed at a new catalog](Self::with_catalog) before it is used with
/// another database.
///
/// ```rust,no_run
/// # async fn example() -> pg_typegraph::Result<()> {
/// use pg_typegraph::{PgCatalog, TypeResolver};
///
/// let mut resolver = TypeResolver::new(PgCatalog::from_env().await?);
///
/// let column = resolver.enqueue("public.address[]");
/// let id = resolver.enqueue("uuid");
///
/// resolver.resolve_all().await?;
///
/// let column = column.get().expect("filled by resolve_all");
/// assert_eq!(column.dimensions, 1);
/// assert!(column.attributes().is_some());
/// # let _ = id;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TypeResolver<C = PgCatalog> {
    catalog: C,
    cache: TypeCache,
    queue: TypeQueue,
    options: ResolverOptions,
    stats: ResolverStats,
}

/// Counters accumulated over one resolver session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Catalog round trips issued, including those of failed calls.
    pub round_trips: usize,
    /// Resolution depths run, summed over all calls.
    pub depths: usize,
    /// Distinct canonical types currently cached.
    pub resolved_types: usize,
}

/// A cloneable handle for registering type text from several tasks at once.
///
/// Requests are held until the owning [`TypeResolver`] next runs
/// [`resolve_all`](TypeResolver::resolve_all).
#[derive(Debug, Clone, Default)]
pub struct TypeQueue(Arc<Mutex<Vec<QueueMember>>>);

#[derive(Debug)]
pub(crate) struct QueueMember {
    request_text: String,
    out: TypeSlot,
}

impl TypeQueue {
    /// Queue `type_text` and return the slot it will be resolved into.
    pub fn enqueue(&self, type_text: impl Into<String>) -> TypeSlot {
        let out = TypeSlot::new();

        self.lock().push(QueueMember {
            request_text: type_text.into(),
            out: out.clone(),
        });

        out
    }

    /// Number of requests waiting for the next resolution.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn drain(&self) -> Vec<QueueMember> {
        mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<QueueMember>> {
        // a panic while holding the lock cannot leave the vec half-written
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: TypeCatalog> TypeResolver<C> {
    pub fn new(catalog: C) -> Self {
        Self::with_options(catalog, ResolverOptions::default())
    }

    pub fn with_options(catalog: C, options: ResolverOptions) -> Self {
        TypeResolver {
            catalog,
            cache: TypeCache::default(),
            queue: TypeQueue::default(),
            options,
            stats: ResolverStats::default(),
        }
    }

    /// Queue `type_text` for the next [`resolve_all`](Self::resolve_all).
    ///
    /// Never touches the catalog. The returned slot stays empty until that
    /// call succeeds.
    pub fn enqueue(&self, type_text: impl Into<String>) -> TypeSlot {
        self.queue.enqueue(type_text)
    }

    /// A handle to the pending queue that can be shared with other tasks.
    pub fn queue(&self) -> TypeQueue {
        self.queue.clone()
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Forget every cached type, pending request and counter.
    ///
    /// Slots handed out before the call keep whatever they were filled with;
    /// slots of dropped pending requests are never filled.
    pub fn clear(&mut self) {
        self.cache.clear();
        drop(self.queue.drain());
        self.stats = ResolverStats::default();
    }

    /// Start a new session against another catalog, keeping the options.
    ///
    /// Pending requests are dropped and outstanding [`TypeQueue`] handles
    /// are detached from the new resolver.
    pub fn with_catalog<D: TypeCatalog>(self, catalog: D) -> TypeResolver<D> {
        TypeResolver::with_options(catalog, self.options)
    }

    /// Resolve every request queued since the last call.
    ///
    /// On success, every drained slot (and every slot nested inside the
    /// resolved types) is filled. On error nothing is filled, the caches are
    /// left as they were, and the drained requests are dropped.
    pub async fn resolve_all(&mut self) -> Result<()> {
        let pending = self.queue.drain();

        if pending.is_empty() {
            return Ok(());
        }

        let requested = pending.len();
        let mut progress = Progress::default();
        let mut txn = self.cache.begin();

        let result = resolve_depths(
            &self.catalog,
            &mut txn,
            &self.options.log_settings,
            pending,
            &mut progress,
        )
        .await;

        let staged = txn.into_staged();

        self.stats.round_trips += progress.round_trips;
        self.stats.depths += progress.depths;

        let fills = match result {
            Ok(fills) => fills,
            Err(error) => {
                tracing::debug!(
                    target: TARGET,
                    requested,
                    depths = progress.depths,
                    round_trips = progress.round_trips,
                    %error,
                    "type resolution failed"
                );

                return Err(error);
            }
        };

        self.cache.commit(staged);
        self.stats.resolved_types = self.cache.resolved_types();

        let filled = fills.len();

        for (slot, ty) in fills {
            slot.fill(ty);
        }

        tracing::debug!(
            target: TARGET,
            requested,
            filled,
            depths = progress.depths,
            round_trips = progress.round_trips,
            resolved_types = self.stats.resolved_types,
            "type resolution finished"
        );

        Ok(())
    }

    /// Queue `type_text`, run [`resolve_all`](Self::resolve_all) and return the result.
    ///
    /// Anything else already queued is resolved in the same call.
    pub async fn resolve_one(&mut self, type_text: impl Into<String>) -> Result<CanonicalType> {
        let type_text = type_text.into();
        let slot = self.enqueue(type_text.clone());

        self.resolve_all().await?;

        slot.get().cloned().ok_or_else(|| Error::unresolvable(type_text))
    }
}

#[derive(Debug, Default)]
struct Progress {
    depths: usize,
    round_trips: usize,
}

/// Requests of one depth grouped by kind, for canonical names not seen yet.
#[derive(Debug, Default)]
struct DetailBatch {
    enums: Vec<DetailRequest>,
    composites: Vec<DetailRequest>,
    domains: Vec<DetailRequest>,
    ranges: Vec<DetailRequest>,
}

async fn resolve_depths<C: TypeCatalog>(
    catalog: &C,
    txn: &mut CacheTxn<'_>,
    settings: &LogSettings,
    mut requests: Vec<QueueMember>,
    progress: &mut Progress,
) -> Result<Vec<(TypeSlot, CanonicalType)>> {
    let mut fills = Vec::new();

    while !requests.is_empty() {
        progress.depths += 1;

        let parsed = requests
            .iter()
            .map(|member| -> Result<ParsedType> {
                let parsed = ParsedType::parse(&member.request_text);

                if !parsed.is_well_formed() {
                    return Err(Error::unresolvable(member.request_text.as_str()));
                }

                Ok(parsed)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut seen_names = HashSet::new();

        let missing: Vec<String> = parsed
            .iter()
            .map(|parsed| parsed.plain.as_str())
            .filter(|plain| txn.basic(plain).is_none() && seen_names.insert(*plain))
            .map(str::to_owned)
            .collect();

        progress.round_trips += usize::from(!missing.is_empty());

        let infos = resolve_basic(catalog, &missing, settings)
            .await
            .map_err(|e| with_request_text(e, &parsed))?;

        for info in infos {
            txn.insert_basic(info);
        }

        let basics = parsed
            .iter()
            .map(|parsed| {
                txn.basic(&parsed.plain)
                    .cloned()
                    .ok_or_else(|| Error::unresolvable(parsed.original.as_str()))
            })
            .collect::<Result<Vec<Arc<ResolvedBasicInfo>>>>()?;

        let batch = plan_details(txn, &basics)?;

        tracing::debug!(
            target: TARGET,
            depth = progress.depths,
            requests = requests.len(),
            new_names = missing.len(),
            enums = batch.enums.len(),
            composites = batch.composites.len(),
            domains = batch.domains.len(),
            ranges = batch.ranges.len(),
            "resolving types"
        );

        // `try_join4` stops polling the other lookups once one fails, so
        // only count the ones that were actually started
        let issued = AtomicUsize::new(0);

        let joined = try_join4(
            counted(&issued, &batch.enums, resolve_enums(catalog, &batch.enums, settings)),
            counted(
                &issued,
                &batch.composites,
                resolve_composites(catalog, &batch.composites, settings),
            ),
            counted(&issued, &batch.domains, resolve_domains(catalog, &batch.domains, settings)),
            counted(&issued, &batch.ranges, resolve_ranges(catalog, &batch.ranges, settings)),
        )
        .await;

        progress.round_trips += issued.into_inner();

        let (labels, attributes, domain_bases, range_subtypes) = joined?;

        let mut follow_ups = Vec::new();

        for (req, values) in batch.enums.into_iter().zip(labels) {
            txn.insert_detail(req.canonical_name, TypeKind::Enum { values });
        }

        for (req, rows) in batch.composites.into_iter().zip(attributes) {
            let attributes = rows
                .into_iter()
                .map(|row| {
                    let ty = follow_up(&mut follow_ups, row.type_text);

                    CompositeAttribute {
                        name: row.name,
                        ordinal_index: row.ordinal,
                        ty,
                        comment: row.comment,
                        default_value: row.default_value,
                        is_nullable: !row.not_null,
                        is_identity: matches!(row.identity, b'a' | b'd'),
                        generated: Generated::from_catalog(row.identity, row.generated),
                    }
                })
                .collect();

            txn.insert_detail(req.canonical_name, TypeKind::Composite { attributes });
        }

        for (req, base) in batch.domains.into_iter().zip(domain_bases) {
            let base_type = follow_up(&mut follow_ups, base);
            txn.insert_detail(req.canonical_name, TypeKind::Domain { base_type });
        }

        for (req, subtype) in batch.ranges.into_iter().zip(range_subtypes) {
            let subtype = follow_up(&mut follow_ups, subtype);
            txn.insert_detail(req.canonical_name, TypeKind::Range { subtype });
        }

        for ((member, parsed), info) in requests.into_iter().zip(parsed).zip(basics) {
            let kind = txn.detail(&info.canonical_name).cloned().ok_or_else(|| {
                Error::corrupt(&info.canonical_name, info.oid.0, "kind details were not resolved")
            })?;

            fills.push((
                member.out,
                CanonicalType {
                    original_type: parsed.original,
                    canonical_name: info.canonical_name.clone(),
                    schema: info.schema.clone(),
                    name: info.name.clone(),
                    dimensions: parsed.explicit_dimensions + info.internal_dimensions,
                    modifiers: parsed.modifiers,
                    kind,
                },
            ));
        }

        requests = follow_ups;
    }

    Ok(fills)
}

/// Settle kinds without payload and group the rest by the lookup they need.
fn plan_details(txn: &mut CacheTxn<'_>, basics: &[Arc<ResolvedBasicInfo>]) -> Result<DetailBatch> {
    let mut batch = DetailBatch::default();
    let mut seen = HashSet::new();

    for info in basics {
        if txn.has_detail(&info.canonical_name) || !seen.insert(info.canonical_name.as_str()) {
            continue;
        }

        let request = |catalog_id| DetailRequest {
            catalog_id,
            canonical_name: info.canonical_name.clone(),
        };

        match info.kind {
            TypType::Base => txn.insert_detail(info.canonical_name.clone(), TypeKind::Base),
            TypType::Pseudo => txn.insert_detail(info.canonical_name.clone(), TypeKind::Pseudo),
            TypType::Enum => batch.enums.push(request(info.oid)),
            TypType::Domain => batch.domains.push(request(info.oid)),
            TypType::Range => batch.ranges.push(request(info.oid)),
            TypType::Composite => {
                let relation_id = info.composite_relation_id.ok_or_else(|| {
                    Error::corrupt(
                        &info.canonical_name,
                        info.oid.0,
                        "composite type has no backing relation",
                    )
                })?;

                batch.composites.push(request(relation_id));
            }
        }
    }

    Ok(batch)
}

/// Count a detail lookup as issued once it is first polled.
async fn counted<T>(
    issued: &AtomicUsize,
    requests: &[DetailRequest],
    lookup: impl Future<Output = Result<T>>,
) -> Result<T> {
    if !requests.is_empty() {
        issued.fetch_add(1, Ordering::Relaxed);
    }

    lookup.await
}

fn follow_up(follow_ups: &mut Vec<QueueMember>, request_text: String) -> TypeSlot {
    let out = TypeSlot::new();

    follow_ups.push(QueueMember {
        request_text,
        out: out.clone(),
    });

    out
}

/// Report an unknown name with the text it was requested as.
fn with_request_text(error: Error, parsed: &[ParsedType]) -> Error {
    match error {
        Error::UnresolvableName { type_text } => {
            let original = parsed
                .iter()
                .find(|parsed| parsed.plain == type_text)
                .map_or(type_text, |parsed| parsed.original.clone());

            Error::unresolvable(original)
        }
        error => error,
    }
}
