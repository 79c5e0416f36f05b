//! Image queue tracking

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::errors::Result;
use crate::models::{Image, IncomingImage};
use crate::store::images;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub added: usize,
    pub removed: usize,
    pub retained: usize,
}

impl ImageReport {
    pub fn merge(&mut self, other: ImageReport) {
        self.added += other.added;
        self.removed += other.removed;
        self.retained += other.retained;
    }
}

/// Make the stored image set of `listing_id` match `incoming`.
///
/// Images are matched by URL. Matched images keep their download state and
/// local path; new ones are queued with `downloaded = false`; images the
/// feed no longer lists are deleted.
pub fn reconcile(
    conn: &Connection,
    listing_id: i64,
    incoming: &[IncomingImage],
    now: DateTime<Utc>,
) -> Result<ImageReport> {
    let existing = images::for_listing(conn, listing_id)?;
    let by_url: HashMap<&str, &Image> = existing.iter().map(|img| (img.url.as_str(), img)).collect();

    let mut report = ImageReport::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for (position, img) in incoming.iter().enumerate() {
        let url = img.url.trim();
        if url.is_empty() || !seen.insert(url) {
            continue;
        }
        let order = img.order.unwrap_or(position as i32);

        match by_url.get(url) {
            Some(current) => {
                if current.display_order != order {
                    images::update_order(conn, current.id, order, now)?;
                }
                report.retained += 1;
            }
            None => {
                images::insert(conn, listing_id, url, order, now)?;
                report.added += 1;
            }
        }
    }

    for stale in existing.iter().filter(|img| !seen.contains(img.url.as_str())) {
        debug!(image_id = stale.id, url = %stale.url, "Removing image dropped by the feed");
        images::delete(conn, stale.id)?;
        report.removed += 1;
    }

    Ok(report)
}

/// The image to lead with: order 0 if present, else the lowest order,
/// ties going to the earliest created.
pub fn primary_image(images: &[Image]) -> Option<&Image> {
    images
        .iter()
        .min_by_key(|img| (img.display_order != 0, img.display_order, img.created_at, img.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn image(id: i64, url: &str, order: i32, created_at: DateTime<Utc>) -> Image {
        Image {
            id,
            listing_id: 1,
            url: url.to_string(),
            local_path: None,
            display_order: order,
            downloaded: false,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_primary_prefers_order_zero() {
        let now = Utc::now();
        let images = vec![image(1, "a", 1, now), image(2, "b", 0, now), image(3, "c", 5, now)];
        assert_eq!(primary_image(&images).unwrap().url, "b");
    }

    #[test]
    fn test_primary_tie_breaks_on_creation() {
        let now = Utc::now();
        let images = vec![
            image(1, "a", 3, now),
            image(2, "b", 3, now - Duration::seconds(30)),
        ];
        assert_eq!(primary_image(&images).unwrap().url, "b");
    }

    #[test]
    fn test_primary_among_several_order_zero() {
        let now = Utc::now();
        let images = vec![
            image(1, "late", 0, now),
            image(2, "early", 0, now - Duration::seconds(100)),
            image(3, "negative", -1, now - Duration::seconds(200)),
        ];
        assert_eq!(primary_image(&images).unwrap().url, "early");
    }

    #[test]
    fn test_primary_of_nothing() {
        assert!(primary_image(&[]).is_none());
    }
}
