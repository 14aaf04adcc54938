use std::env;

use futures_core::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::query_as;

use crate::catalog::{
    AttributeRow, BasicInfoRow, CatalogType, CompositeRow, EnumLabelRow, Oid, TypeCatalog,
    TypeNameRow,
};
use crate::error::{Error, Result};

/// One connection per kind of detail lookup, so the batches of one depth can
/// run side by side.
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// [`TypeCatalog`] backed by a PostgreSQL connection pool.
///
/// Catalog identifiers are only meaningful within one database: a pool
/// should not be swapped for one pointing at another database without
/// clearing the resolver that uses it.
///
/// To pin every lookup to a single connection, build the pool with
/// `max_connections(1)`; the detail lookups of one depth then run one after
/// the other.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn connect_with(options: PgConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// Connect to `DATABASE_URL`, loading a `.env` file first if there is one.
    pub async fn from_env() -> Result<Self> {
        // a missing `.env` file is not an error
        let _ = dotenvy::dotenv();

        let url = env::var("DATABASE_URL")
            .map_err(|e| Error::Configuration(format!("DATABASE_URL: {e}")))?;

        Self::connect(&url).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<PgPool> for PgCatalog {
    fn from(pool: PgPool) -> Self {
        Self::new(pool)
    }
}

impl TypeCatalog for PgCatalog {
    fn fetch_basic_info<'c>(&'c self, names: &'c [String]) -> BoxFuture<'c, Result<Vec<BasicInfoRow>>> {
        Box::pin(async move {
            #[allow(clippy::type_complexity)]
            let rows: Vec<(
                i64,
                Option<Oid>,
                Option<String>,
                Option<String>,
                Option<i8>,
                Option<i32>,
                Option<Oid>,
                Option<Oid>,
                Option<Oid>,
            )> = query_as(
                // `to_regtype` yields NULL instead of failing for unknown names.
                // The walk follows `typelem` only while the element type names
                // the current type as its array type, which is exactly the set of
                // types the server generates for arrays.
                r#"
WITH RECURSIVE input AS (
    SELECT i.ord, pg_catalog.to_regtype(i.name)::oid AS start_oid
    FROM unnest($1::text[]) WITH ORDINALITY AS i(name, ord)
),
walk AS (
    SELECT input.ord, input.start_oid AS oid, 0 AS layers
    FROM input
    WHERE input.start_oid IS NOT NULL
  UNION ALL
    SELECT w.ord, e.oid, w.layers + 1
    FROM walk w
    JOIN pg_catalog.pg_type t ON t.oid = w.oid
    JOIN pg_catalog.pg_type e ON e.oid = t.typelem AND e.typarray = t.oid
)
SELECT i.ord, f.oid, n.nspname::text, ty.typname::text, ty.typtype, f.layers,
       ty.typrelid, ty.typbasetype, r.rngsubtype
FROM input i
LEFT JOIN LATERAL (
    SELECT w.oid, w.layers
    FROM walk w
    WHERE w.ord = i.ord
    ORDER BY w.layers DESC
    LIMIT 1
) f ON true
LEFT JOIN pg_catalog.pg_type ty ON ty.oid = f.oid
LEFT JOIN pg_catalog.pg_namespace n ON n.oid = ty.typnamespace
LEFT JOIN pg_catalog.pg_range r ON r.rngtypid = ty.oid
ORDER BY i.ord
                "#,
            )
            .bind(names)
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(
                    |(ord, oid, schema, name, typtype, layers, relation_id, base_type_id, range_subtype_id)| -> Result<BasicInfoRow> {
                        let index = row_index(ord)?;

                        let ty = match (oid, schema, name, typtype, layers) {
                            (Some(oid), Some(schema), Some(name), Some(typtype), Some(layers)) => {
                                Some(CatalogType {
                                    oid,
                                    schema,
                                    name,
                                    typtype: char_code(typtype),
                                    array_layers: usize::try_from(layers).map_err(|_| {
                                        protocol(format!("negative array depth {layers} for oid {}", oid.0))
                                    })?,
                                    relation_id: relation_id.unwrap_or(Oid(0)),
                                    base_type_id: base_type_id.unwrap_or(Oid(0)),
                                    range_subtype_id,
                                })
                            }
                            _ => None,
                        };

                        Ok(BasicInfoRow { index, ty })
                    },
                )
                .collect::<Result<Vec<_>>>()
        })
    }

    fn fetch_enum_labels<'c>(&'c self, type_ids: &'c [Oid]) -> BoxFuture<'c, Result<Vec<EnumLabelRow>>> {
        Box::pin(async move {
            let rows: Vec<(i64, String)> = query_as(
                r#"
SELECT r.ord, e.enumlabel::text
FROM unnest($1::oid[]) WITH ORDINALITY AS r(type_id, ord)
JOIN pg_catalog.pg_enum e ON e.enumtypid = r.type_id
ORDER BY r.ord, e.enumsortorder
                "#,
            )
            .bind(type_ids)
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(|(ord, label)| -> Result<EnumLabelRow> {
                    Ok(EnumLabelRow {
                        index: row_index(ord)?,
                        label,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
    }

    fn fetch_composite_attributes<'c>(
        &'c self,
        relation_ids: &'c [Oid],
    ) -> BoxFuture<'c, Result<Vec<CompositeRow>>> {
        Box::pin(async move {
            #[allow(clippy::type_complexity)]
            let rows: Vec<(
                i64,
                Option<i64>,
                Option<String>,
                Option<i16>,
                Option<String>,
                Option<String>,
                Option<String>,
                Option<bool>,
                Option<i8>,
                Option<i8>,
            )> = query_as(
                r#"
SELECT r.ord,
       CASE WHEN c.oid IS NULL THEN NULL ELSE c.relnatts - (
           SELECT count(*)
           FROM pg_catalog.pg_attribute x
           WHERE x.attrelid = c.oid AND x.attnum > 0 AND x.attisdropped
       ) END,
       a.attname::text,
       a.attnum,
       pg_catalog.format_type(a.atttypid, a.atttypmod),
       pg_catalog.col_description(a.attrelid, a.attnum),
       pg_catalog.pg_get_expr(d.adbin, d.adrelid),
       a.attnotnull,
       a.attidentity,
       a.attgenerated
FROM unnest($1::oid[]) WITH ORDINALITY AS r(relation_id, ord)
LEFT JOIN pg_catalog.pg_class c ON c.oid = r.relation_id
LEFT JOIN pg_catalog.pg_attribute a
       ON a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
ORDER BY r.ord, a.attnum
                "#,
            )
            .bind(relation_ids)
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(
                    |(ord, declared, name, attnum, type_text, comment, default_value, not_null, identity, generated)| -> Result<CompositeRow> {
                        let declared_attributes = declared
                            .map(|n| {
                                usize::try_from(n)
                                    .map_err(|_| protocol(format!("negative attribute count {n}")))
                            })
                            .transpose()?;

                        let attribute = match (name, attnum, type_text) {
                            (Some(name), Some(attnum), Some(type_text)) => Some(AttributeRow {
                                name,
                                ordinal: usize::try_from(attnum)
                                    .map_err(|_| protocol(format!("negative attnum {attnum}")))?,
                                type_text,
                                comment,
                                default_value,
                                not_null: not_null.unwrap_or(false),
                                identity: identity.map_or(0, char_code),
                                generated: generated.map_or(0, char_code),
                            }),
                            _ => None,
                        };

                        Ok(CompositeRow {
                            index: row_index(ord)?,
                            declared_attributes,
                            attribute,
                        })
                    },
                )
                .collect::<Result<Vec<_>>>()
        })
    }

    fn fetch_domain_bases<'c>(&'c self, type_ids: &'c [Oid]) -> BoxFuture<'c, Result<Vec<TypeNameRow>>> {
        Box::pin(async move {
            let rows: Vec<(i64, Option<Oid>, Option<String>)> = query_as(
                // The modifier of the domain sitting directly on the base type
                // is the one that applies, e.g. `varchar(255)`.
                r#"
WITH RECURSIVE chain AS (
    SELECT r.ord, t.typbasetype AS base_id, t.typtypmod AS typmod
    FROM unnest($1::oid[]) WITH ORDINALITY AS r(type_id, ord)
    JOIN pg_catalog.pg_type t ON t.oid = r.type_id AND t.typtype = 'd'
  UNION ALL
    SELECT c.ord, t.typbasetype, t.typtypmod
    FROM chain c
    JOIN pg_catalog.pg_type t ON t.oid = c.base_id AND t.typtype = 'd'
)
SELECT r.ord, b.oid, pg_catalog.format_type(b.oid, NULLIF(c.typmod, -1))
FROM unnest($1::oid[]) WITH ORDINALITY AS r(type_id, ord)
LEFT JOIN chain c
       ON c.ord = r.ord
      AND NOT EXISTS (
          SELECT 1 FROM pg_catalog.pg_type x WHERE x.oid = c.base_id AND x.typtype = 'd'
      )
LEFT JOIN pg_catalog.pg_type b ON b.oid = c.base_id
ORDER BY r.ord
                "#,
            )
            .bind(type_ids)
            .fetch_all(&self.pool)
            .await?;

            type_name_rows(rows)
        })
    }

    fn fetch_range_subtypes<'c>(&'c self, type_ids: &'c [Oid]) -> BoxFuture<'c, Result<Vec<TypeNameRow>>> {
        Box::pin(async move {
            let rows: Vec<(i64, Option<Oid>, Option<String>)> = query_as(
                r#"
SELECT r.ord, g.rngsubtype, pg_catalog.format_type(g.rngsubtype, NULL)
FROM unnest($1::oid[]) WITH ORDINALITY AS r(type_id, ord)
LEFT JOIN pg_catalog.pg_range g ON g.rngtypid = r.type_id
ORDER BY r.ord
                "#,
            )
            .bind(type_ids)
            .fetch_all(&self.pool)
            .await?;

            type_name_rows(rows)
        })
    }
}

fn type_name_rows(rows: Vec<(i64, Option<Oid>, Option<String>)>) -> Result<Vec<TypeNameRow>> {
    rows.into_iter()
        .map(|(ord, type_id, type_text)| -> Result<TypeNameRow> {
            Ok(TypeNameRow {
                index: row_index(ord)?,
                type_id,
                type_text,
            })
        })
        .collect()
}

/// `WITH ORDINALITY` counts from 1.
fn row_index(ord: i64) -> Result<usize> {
    ord.checked_sub(1)
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| protocol(format!("invalid row ordinal {ord}")))
}

/// Reinterpret a `"char"` column as the ASCII code it stores.
fn char_code(c: i8) -> u8 {
    u8::from_ne_bytes(c.to_ne_bytes())
}

fn protocol(message: String) -> Error {
    Error::Database(sqlx::Error::Protocol(message))
}
