//! Reference tables, tags and typed features

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Params, Row};

use crate::errors::{Result, SyncError};
use crate::models::{FeatureDefinition, FeatureKind, FeatureValue, ListingFeature, ReferenceKind, Tag};

/// Comparison key for names typed by people: trimmed, Unicode lowercase
fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn named_rows<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn find_named(rows: Vec<(i64, String)>, name: &str) -> Option<i64> {
    let wanted = name_key(name);
    rows.into_iter()
        .find(|(_, candidate)| name_key(candidate) == wanted)
        .map(|(id, _)| id)
}

/// Look a reference row up by name, ignoring case (accented letters
/// included) and surrounding spaces. Neighborhoods are matched inside
/// `city_id` when it is known.
pub fn resolve(
    conn: &Connection,
    kind: ReferenceKind,
    name: &str,
    city_id: Option<i64>,
) -> Result<Option<i64>> {
    if name.trim().is_empty() {
        return Ok(None);
    }

    let rows = match (kind, city_id) {
        (ReferenceKind::Neighborhood, Some(city_id)) => named_rows(
            conn,
            "SELECT id, name FROM neighborhoods WHERE city_id = ?1 ORDER BY id",
            params![city_id],
        )?,
        _ => {
            let sql = format!("SELECT id, name FROM {} ORDER BY id", kind.table());
            named_rows(conn, &sql, [])?
        }
    };
    Ok(find_named(rows, name))
}

pub fn insert_reference(conn: &Connection, kind: ReferenceKind, name: &str) -> Result<i64> {
    let sql = format!("INSERT INTO {} (name) VALUES (?1)", kind.table());
    conn.execute(&sql, params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_neighborhood(conn: &Connection, name: &str, city_id: Option<i64>) -> Result<i64> {
    conn.execute(
        "INSERT INTO neighborhoods (name, city_id) VALUES (?1, ?2)",
        params![name, city_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_advisor(conn: &Connection, name: &str, phone: Option<&str>, email: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO advisors (name, phone, email) VALUES (?1, ?2, ?3)",
        params![name, phone, email],
    )?;
    Ok(conn.last_insert_rowid())
}

// Tags

pub fn insert_tag(conn: &Connection, name: &str, color: Option<&str>, description: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO tags (name, color, description) VALUES (?1, ?2, ?3)",
        params![name, color, description],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn tag_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let rows = named_rows(conn, "SELECT id, name FROM tags ORDER BY id", [])?;
    Ok(find_named(rows, name))
}

pub fn tags_for_listing(conn: &Connection, listing_id: i64) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT tags.id, tags.name, tags.color, tags.description
        FROM listing_tags JOIN tags ON tags.id = listing_tags.tag_id
        WHERE listing_tags.listing_id = ?1
        ORDER BY tags.name
        "#,
    )?;
    let tags = stmt
        .query_map(params![listing_id], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
                description: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

/// Make the listing's tag set exactly `tag_ids`
pub fn replace_tags(conn: &Connection, listing_id: i64, tag_ids: &[i64], now: DateTime<Utc>) -> Result<()> {
    let current: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT tag_id FROM listing_tags WHERE listing_id = ?1")?;
        let ids = stmt
            .query_map(params![listing_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };

    for stale in current.iter().filter(|id| !tag_ids.contains(id)) {
        conn.execute(
            "DELETE FROM listing_tags WHERE listing_id = ?1 AND tag_id = ?2",
            params![listing_id, stale],
        )?;
    }
    for tag_id in tag_ids {
        conn.execute(
            "INSERT OR IGNORE INTO listing_tags (listing_id, tag_id, created_at) VALUES (?1, ?2, ?3)",
            params![listing_id, tag_id, now],
        )?;
    }
    Ok(())
}

// Features

fn definition_from_row(row: &Row<'_>) -> rusqlite::Result<FeatureDefinition> {
    let kind: String = row.get(2)?;
    let kind = kind.parse::<FeatureKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(FeatureDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        kind,
        unit: row.get(3)?,
        description: row.get(4)?,
    })
}

pub fn insert_feature_definition(
    conn: &Connection,
    name: &str,
    kind: FeatureKind,
    unit: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO feature_definitions (name, kind, unit) VALUES (?1, ?2, ?3)",
        params![name, kind.as_str(), unit],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn feature_definition(conn: &Connection, name: &str) -> Result<Option<FeatureDefinition>> {
    let wanted = name_key(name);
    let mut stmt = conn.prepare("SELECT id, name, kind, unit, description FROM feature_definitions ORDER BY id")?;
    let definitions = stmt
        .query_map([], definition_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(definitions
        .into_iter()
        .find(|definition| name_key(&definition.name) == wanted))
}

pub fn features_for_listing(conn: &Connection, listing_id: i64) -> Result<Vec<ListingFeature>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT d.id, d.name, d.kind, d.unit, d.description,
               f.value_text, f.value_numeric, f.value_boolean
        FROM listing_features f JOIN feature_definitions d ON d.id = f.feature_id
        WHERE f.listing_id = ?1
        ORDER BY d.name
        "#,
    )?;
    let rows = stmt
        .query_map(params![listing_id], |row| {
            let definition = definition_from_row(row)?;
            let text: Option<String> = row.get(5)?;
            let numeric: Option<String> = row.get(6)?;
            let boolean: Option<bool> = row.get(7)?;
            Ok((definition, text, numeric, boolean))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(definition, text, numeric, boolean)| {
            FeatureValue::from_columns(definition.kind, text, numeric, boolean)
                .map(|value| ListingFeature { definition, value })
        })
        .collect())
}

/// Store `value` for the feature, clearing the other slots
pub fn upsert_feature(
    conn: &Connection,
    listing_id: i64,
    definition: &FeatureDefinition,
    value: &FeatureValue,
    now: DateTime<Utc>,
) -> Result<()> {
    if value.kind() != definition.kind {
        return Err(SyncError::Validation(format!(
            "feature '{}' is {} but got a {} value",
            definition.name,
            definition.kind.as_str(),
            value.kind().as_str()
        )));
    }
    let (text, numeric, boolean) = value.columns();
    conn.execute(
        r#"
        INSERT INTO listing_features (listing_id, feature_id, value_text, value_numeric, value_boolean, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        ON CONFLICT(listing_id, feature_id) DO UPDATE SET
            value_text = excluded.value_text,
            value_numeric = excluded.value_numeric,
            value_boolean = excluded.value_boolean,
            updated_at = excluded.updated_at
        "#,
        params![listing_id, definition.id, text, numeric, boolean, now],
    )?;
    Ok(())
}

/// Drop every feature of the listing not in `keep`
pub fn retain_features(conn: &Connection, listing_id: i64, keep: &[i64]) -> Result<()> {
    let current: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT feature_id FROM listing_features WHERE listing_id = ?1")?;
        let ids = stmt
            .query_map(params![listing_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };
    for stale in current.iter().filter(|id| !keep.contains(id)) {
        conn.execute(
            "DELETE FROM listing_features WHERE listing_id = ?1 AND feature_id = ?2",
            params![listing_id, stale],
        )?;
    }
    Ok(())
}
