//! Foreign references, tags and typed features of an incoming listing.
//!
//! Everything here is best effort: a name the reference tables do not know
//! is left unset and reported as a warning, never as a failure.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use super::report::ReferenceResolutionWarning;
use crate::errors::Result;
use crate::models::{FeatureValue, ForeignRef, IncomingListing, ReferenceKind};
use crate::store::reference;

/// Foreign references of a listing after lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedReferences {
    pub city: ForeignRef,
    pub neighborhood: ForeignRef,
    pub property_type: ForeignRef,
    pub usage_type: ForeignRef,
    pub status: ForeignRef,
    pub consignment_type: ForeignRef,
    pub advisor: ForeignRef,
}

fn clean(name: &Option<String>) -> Option<String> {
    name.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn warning(reference: i64, field: &str, value: &str) -> ReferenceResolutionWarning {
    warn!(reference, field, value, "Unresolved reference, leaving it unset");
    ReferenceResolutionWarning {
        reference,
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn resolve_one(
    conn: &Connection,
    reference: i64,
    kind: ReferenceKind,
    name: &Option<String>,
    city_id: Option<i64>,
    warnings: &mut Vec<ReferenceResolutionWarning>,
) -> Result<ForeignRef> {
    let Some(name) = clean(name) else {
        return Ok(ForeignRef::default());
    };
    match reference::resolve(conn, kind, &name, city_id)? {
        Some(id) => Ok(ForeignRef {
            id: Some(id),
            name: Some(name),
        }),
        None => {
            warnings.push(warning(reference, kind.field(), &name));
            Ok(ForeignRef::unresolved(Some(name)))
        }
    }
}

pub fn resolve_references(
    conn: &Connection,
    reference: i64,
    incoming: &IncomingListing,
    warnings: &mut Vec<ReferenceResolutionWarning>,
) -> Result<ResolvedReferences> {
    let city = resolve_one(conn, reference, ReferenceKind::City, &incoming.city, None, warnings)?;
    let neighborhood = resolve_one(
        conn,
        reference,
        ReferenceKind::Neighborhood,
        &incoming.neighborhood,
        city.id,
        warnings,
    )?;

    Ok(ResolvedReferences {
        city,
        neighborhood,
        property_type: resolve_one(conn, reference, ReferenceKind::PropertyType, &incoming.property_type, None, warnings)?,
        usage_type: resolve_one(conn, reference, ReferenceKind::UsageType, &incoming.usage_type, None, warnings)?,
        status: resolve_one(conn, reference, ReferenceKind::Status, &incoming.status, None, warnings)?,
        consignment_type: resolve_one(
            conn,
            reference,
            ReferenceKind::ConsignmentType,
            &incoming.consignment_type,
            None,
            warnings,
        )?,
        advisor: resolve_one(conn, reference, ReferenceKind::Advisor, &incoming.advisor, None, warnings)?,
    })
}

/// Replace the listing's tags with the ones the feed names
pub fn reconcile_tags(
    conn: &Connection,
    reference: i64,
    listing_id: i64,
    incoming: &IncomingListing,
    now: DateTime<Utc>,
    warnings: &mut Vec<ReferenceResolutionWarning>,
) -> Result<()> {
    let mut tag_ids = Vec::new();
    for name in incoming.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        match reference::tag_id(conn, name)? {
            Some(id) if !tag_ids.contains(&id) => tag_ids.push(id),
            Some(_) => {}
            None => warnings.push(warning(reference, "tag", name)),
        }
    }
    reference::replace_tags(conn, listing_id, &tag_ids, now)
}

/// Replace the listing's features with the typed values the feed provides.
/// Values that do not fit the declared kind are skipped with a warning.
pub fn reconcile_features(
    conn: &Connection,
    reference: i64,
    listing_id: i64,
    incoming: &IncomingListing,
    now: DateTime<Utc>,
    warnings: &mut Vec<ReferenceResolutionWarning>,
) -> Result<()> {
    let mut kept = Vec::new();
    for (name, raw) in &incoming.features {
        if raw.is_null() {
            continue;
        }
        let Some(definition) = reference::feature_definition(conn, name)? else {
            warnings.push(warning(reference, "feature", name));
            continue;
        };
        let Some(value) = FeatureValue::coerce(definition.kind, raw) else {
            warnings.push(warning(
                reference,
                &format!("feature:{}", definition.name),
                &raw.to_string(),
            ));
            continue;
        };
        reference::upsert_feature(conn, listing_id, &definition, &value, now)?;
        kept.push(definition.id);
    }
    reference::retain_features(conn, listing_id, &kept)
}
