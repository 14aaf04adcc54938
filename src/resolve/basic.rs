use crate::catalog::{Oid, TypType, TypeCatalog};
use crate::error::{Error, Result};
use crate::logger::RoundTripLogger;
use crate::options::LogSettings;
use crate::resolve::{misaligned, ResolvedBasicInfo};

/// Resolve plain type names to their element types in one round trip.
///
/// Fails on the first name that does not exist or resolves to an unsupported
/// kind; nothing is returned for the rest of the batch, since callers align
/// results to requests by position.
pub(crate) async fn resolve_basic<C>(
    catalog: &C,
    plain_names: &[String],
    settings: &LogSettings,
) -> Result<Vec<ResolvedBasicInfo>>
where
    C: TypeCatalog + ?Sized,
{
    if plain_names.is_empty() {
        return Ok(Vec::new());
    }

    let mut logger = RoundTripLogger::new("basic info", plain_names.len(), settings);
    let rows = catalog.fetch_basic_info(plain_names).await?;
    logger.set_rows_returned(rows.len());

    if rows.len() != plain_names.len() {
        return Err(misaligned("basic info", plain_names.len(), rows.len()));
    }

    plain_names
        .iter()
        .zip(rows)
        .enumerate()
        .map(|(index, (plain_name, row))| -> Result<ResolvedBasicInfo> {
            if row.index != index {
                return Err(misaligned("basic info", index, row.index));
            }

            let ty = row
                .ty
                .ok_or_else(|| Error::unresolvable(plain_name.as_str()))?;

            let canonical_name = format!("{}.{}", ty.schema, ty.name);

            let kind = TypType::try_from(ty.typtype).map_err(|()| Error::UnsupportedKind {
                canonical_name: canonical_name.clone(),
                typtype: char::from(ty.typtype),
            })?;

            let composite_relation_id = non_zero(ty.relation_id);
            let domain_base_type_id = non_zero(ty.base_type_id);
            let range_subtype_id = ty.range_subtype_id.and_then(non_zero);

            let missing = match kind {
                TypType::Composite if composite_relation_id.is_none() => {
                    Some("composite type has no backing relation")
                }
                TypType::Domain if domain_base_type_id.is_none() => Some("domain has no base type"),
                TypType::Range if range_subtype_id.is_none() => Some("range has no subtype"),
                _ => None,
            };

            if let Some(reason) = missing {
                return Err(Error::corrupt(&canonical_name, ty.oid.0, reason));
            }

            Ok(ResolvedBasicInfo {
                plain_name: plain_name.clone(),
                oid: ty.oid,
                schema: ty.schema,
                name: ty.name,
                canonical_name,
                kind,
                internal_dimensions: ty.array_layers,
                composite_relation_id,
                domain_base_type_id,
                range_subtype_id,
            })
        })
        .collect()
}

fn non_zero(oid: Oid) -> Option<Oid> {
    (oid.0 != 0).then_some(oid)
}
