//! Preserved moderation state.
//!
//! The flags an administrator sets live in their own table keyed by the
//! listing reference, so a sync rewriting the listing payload can never
//! clobber them. Any failure here is reported as `StateUnavailable`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{Result, SyncError};
use crate::models::{ListingFlags, ListingState};

pub fn load_state(conn: &Connection, reference: i64) -> Result<Option<ListingState>> {
    conn.query_row(
        r#"
        SELECT listing_ref, sync_code, active, featured, hot, modified_at
        FROM listing_states WHERE listing_ref = ?1
        "#,
        params![reference],
        |row| {
            Ok(ListingState {
                reference: row.get(0)?,
                sync_code: row.get(1)?,
                flags: ListingFlags {
                    active: row.get(2)?,
                    featured: row.get(3)?,
                    hot: row.get(4)?,
                },
                modified_at: row.get(5)?,
            })
        },
    )
    .optional()
    .map_err(|e| SyncError::state_unavailable(reference, e))
}

/// Flags to apply to `reference`: the preserved ones, or the new-listing default
pub fn load_or_default(conn: &Connection, reference: i64) -> Result<ListingFlags> {
    Ok(load_state(conn, reference)?
        .map(|state| state.flags)
        .unwrap_or_default())
}

pub fn save_state(
    conn: &Connection,
    reference: i64,
    sync_code: Option<&str>,
    flags: ListingFlags,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO listing_states (listing_ref, sync_code, active, featured, hot, modified_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6)
        ON CONFLICT(listing_ref) DO UPDATE SET
            sync_code = excluded.sync_code,
            active = excluded.active,
            featured = excluded.featured,
            hot = excluded.hot,
            modified_at = excluded.modified_at,
            updated_at = excluded.updated_at
        "#,
        params![
            reference,
            sync_code.unwrap_or_default(),
            flags.active,
            flags.featured,
            flags.hot,
            now
        ],
    )
    .map_err(|e| SyncError::state_unavailable(reference, e))?;
    Ok(())
}
