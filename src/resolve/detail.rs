use std::sync::Arc;

use crate::catalog::{AttributeRow, Oid, TypeCatalog, TypeNameRow};
use crate::error::{Error, Result};
use crate::logger::RoundTripLogger;
use crate::options::LogSettings;
use crate::resolve::{misaligned, DetailRequest};

fn catalog_ids(requests: &[DetailRequest]) -> Vec<Oid> {
    requests.iter().map(|req| req.catalog_id).collect()
}

fn corrupt(req: &DetailRequest, reason: impl Into<String>) -> Error {
    Error::corrupt(&req.canonical_name, req.catalog_id.0, reason)
}

/// Labels of each enum, in `enumsortorder`.
pub(crate) async fn resolve_enums<C>(
    catalog: &C,
    requests: &[DetailRequest],
    settings: &LogSettings,
) -> Result<Vec<Arc<[String]>>>
where
    C: TypeCatalog + ?Sized,
{
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let ids = catalog_ids(requests);

    let mut logger = RoundTripLogger::new("enum labels", requests.len(), settings);
    let rows = catalog.fetch_enum_labels(&ids).await?;
    logger.set_rows_returned(rows.len());

    let mut labels = vec![Vec::new(); requests.len()];

    for row in rows {
        labels
            .get_mut(row.index)
            .ok_or_else(|| misaligned("enum labels", requests.len(), row.index))?
            .push(row.label);
    }

    requests
        .iter()
        .zip(labels)
        .map(|(req, labels)| -> Result<Arc<[String]>> {
            if labels.is_empty() {
                Err(corrupt(req, "enum has no labels"))
            } else {
                Ok(Arc::from(labels))
            }
        })
        .collect()
}

/// Attributes of each composite, in `attnum` order.
///
/// Attribute types are returned as text; resolving them is up to the caller.
pub(crate) async fn resolve_composites<C>(
    catalog: &C,
    requests: &[DetailRequest],
    settings: &LogSettings,
) -> Result<Vec<Vec<AttributeRow>>>
where
    C: TypeCatalog + ?Sized,
{
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let ids = catalog_ids(requests);

    let mut logger = RoundTripLogger::new("composite attributes", requests.len(), settings);
    let rows = catalog.fetch_composite_attributes(&ids).await?;
    logger.set_rows_returned(rows.len());

    #[derive(Default, Clone)]
    struct Group {
        answered: bool,
        declared: Option<usize>,
        attributes: Vec<AttributeRow>,
    }

    let mut groups = vec![Group::default(); requests.len()];

    for row in rows {
        let group = groups
            .get_mut(row.index)
            .ok_or_else(|| misaligned("composite attributes", requests.len(), row.index))?;

        group.answered = true;
        group.declared = group.declared.or(row.declared_attributes);
        group.attributes.extend(row.attribute);
    }

    requests
        .iter()
        .zip(groups)
        .map(|(req, group)| -> Result<Vec<AttributeRow>> {
            if !group.answered {
                return Err(corrupt(req, "no rows returned for composite type"));
            }

            let declared = group
                .declared
                .ok_or_else(|| corrupt(req, "backing relation does not exist"))?;

            if declared != group.attributes.len() {
                return Err(corrupt(
                    req,
                    format!(
                        "relation declares {declared} attributes but {} were returned",
                        group.attributes.len()
                    ),
                ));
            }

            Ok(group.attributes)
        })
        .collect()
}

/// Type text of the first non-domain ancestor of each domain.
pub(crate) async fn resolve_domains<C>(
    catalog: &C,
    requests: &[DetailRequest],
    settings: &LogSettings,
) -> Result<Vec<String>>
where
    C: TypeCatalog + ?Sized,
{
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let ids = catalog_ids(requests);

    let mut logger = RoundTripLogger::new("domain bases", requests.len(), settings);
    let rows = catalog.fetch_domain_bases(&ids).await?;
    logger.set_rows_returned(rows.len());

    name_rows("domain bases", "base type", requests, rows)
}

/// Type text of the subtype of each range.
pub(crate) async fn resolve_ranges<C>(
    catalog: &C,
    requests: &[DetailRequest],
    settings: &LogSettings,
) -> Result<Vec<String>>
where
    C: TypeCatalog + ?Sized,
{
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let ids = catalog_ids(requests);

    let mut logger = RoundTripLogger::new("range subtypes", requests.len(), settings);
    let rows = catalog.fetch_range_subtypes(&ids).await?;
    logger.set_rows_returned(rows.len());

    name_rows("range subtypes", "subtype", requests, rows)
}

fn name_rows(
    lookup: &str,
    what: &str,
    requests: &[DetailRequest],
    rows: Vec<TypeNameRow>,
) -> Result<Vec<String>> {
    if rows.len() != requests.len() {
        return Err(misaligned(lookup, requests.len(), rows.len()));
    }

    requests
        .iter()
        .zip(rows)
        .enumerate()
        .map(|(index, (req, row))| -> Result<String> {
            if row.index != index {
                return Err(misaligned(lookup, index, row.index));
            }

            match (row.type_text, row.type_id) {
                (Some(text), _) if !text.trim().is_empty() => Ok(text),
                (_, Some(type_id)) => Err(corrupt(
                    req,
                    format!("{what} (oid {}) cannot be named", type_id.0),
                )),
                (_, None) => Err(corrupt(req, format!("{what} cannot be found"))),
            }
        })
        .collect()
}
