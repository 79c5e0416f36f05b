//! Image rows and the download queue

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::errors::Result;
use crate::models::{Image, PendingImage};

const IMAGE_COLUMNS: &str =
    "images.id, images.listing_id, images.url, images.local_path, images.display_order, \
     images.downloaded, images.created_at, images.updated_at";

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        url: row.get(2)?,
        local_path: row.get(3)?,
        display_order: row.get(4)?,
        downloaded: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Images of a listing in display order
pub fn for_listing(conn: &Connection, listing_id: i64) -> Result<Vec<Image>> {
    let sql = format!(
        "SELECT {} FROM images WHERE listing_id = ?1 ORDER BY display_order, created_at, id",
        IMAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let images = stmt
        .query_map(params![listing_id], image_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(images)
}

pub fn insert(conn: &Connection, listing_id: i64, url: &str, order: i32, now: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO images (listing_id, url, local_path, display_order, downloaded, created_at, updated_at)
        VALUES (?1, ?2, NULL, ?3, 0, ?4, ?4)
        "#,
        params![listing_id, url, order, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_order(conn: &Connection, image_id: i64, order: i32, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE images SET display_order = ?1, updated_at = ?2 WHERE id = ?3",
        params![order, now, image_id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, image_id: i64) -> Result<()> {
    conn.execute("DELETE FROM images WHERE id = ?1", params![image_id])?;
    Ok(())
}

/// Images not yet fetched, oldest first
pub fn pending(conn: &Connection, limit: usize) -> Result<Vec<PendingImage>> {
    let sql = format!(
        "SELECT {}, listings.ref FROM images \
         JOIN listings ON listings.id = images.listing_id \
         WHERE images.downloaded = 0 \
         ORDER BY images.created_at, images.id LIMIT ?1",
        IMAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let pending = stmt
        .query_map(params![limit as i64], |row| {
            Ok(PendingImage {
                image: image_from_row(row)?,
                reference: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(pending)
}

pub fn mark_downloaded(conn: &Connection, image_id: i64, local_path: &str, now: DateTime<Utc>) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE images SET downloaded = 1, local_path = ?1, updated_at = ?2 WHERE id = ?3",
        params![local_path, now, image_id],
    )?;
    Ok(changed)
}
