//! SQLite-backed listing store
//!
//! Every operation checks a connection out of an r2d2 pool and runs on the
//! blocking thread pool, so the async reconciler never stalls the runtime.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use tokio::task;
use tracing::{debug, info};

use crate::errors::{Result, SyncError};
use crate::models::{
    FeatureKind, Image, Listing, ListingFeature, ListingFlags, ListingState, PendingImage,
    ReferenceKind, Tag,
};
use crate::sync::{images::primary_image, state};

pub mod images;
pub mod listings;
pub mod reference;
pub mod schema;

use schema::{SCHEMA, SCHEMA_VERSION};

/// Connection settings for the store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to the listing database; cheap to clone
#[derive(Clone)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
}

impl Store {
    /// Open or create a database with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let busy_timeout = options.busy_timeout;
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder()
            .max_size(options.max_connections.max(1))
            .connection_timeout(Duration::from_secs(30))
            .build(manager)?;

        let conn = pool.get()?;
        let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("SQLite journal mode: {}", journal_mode);
        initialize(&conn)?;
        drop(conn);

        info!("Opened listing store at {}", path.as_ref().display());
        Ok(Self { pool })
    }

    /// Run `f` on a pooled connection in the blocking thread pool
    pub(crate) async fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.pool.clone();

        task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
    }

    /// Run `f` inside an IMMEDIATE transaction; committed only if `f` succeeds
    pub(crate) async fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.pool.clone();

        task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
    }

    pub async fn listing(&self, reference: i64) -> Result<Option<Listing>> {
        self.execute(move |conn| listings::find_by_ref(conn, reference)).await
    }

    pub async fn listings(&self) -> Result<Vec<Listing>> {
        self.execute(listings::all).await
    }

    pub async fn listing_state(&self, reference: i64) -> Result<Option<ListingState>> {
        self.execute(move |conn| state::load_state(conn, reference)).await
    }

    /// Admin toggle of the locally-owned flags. Writes the listing row and
    /// the state side table together so the change survives the next sync.
    pub async fn set_flags(&self, reference: i64, flags: ListingFlags) -> Result<()> {
        self.transaction(move |tx| {
            let listing = listings::find_by_ref(tx, reference)?.ok_or(SyncError::NotFound(reference))?;
            let now = Utc::now();
            listings::set_flags(tx, reference, flags, now)?;
            state::save_state(tx, reference, listing.sync_code.as_deref(), flags, now)?;
            Ok(())
        })
        .await?;
        info!(reference, ?flags, "Listing flags updated");
        Ok(())
    }

    /// Delete a listing with its images, features and tags. The flag side
    /// table is kept so a re-synced listing gets its moderation state back.
    pub async fn delete_listing(&self, reference: i64) -> Result<bool> {
        let deleted = self
            .transaction(move |tx| listings::delete(tx, reference))
            .await?;
        Ok(deleted > 0)
    }

    pub async fn images(&self, reference: i64) -> Result<Vec<Image>> {
        self.execute(move |conn| match listings::find_by_ref(conn, reference)? {
            Some(listing) => images::for_listing(conn, listing.id),
            None => Ok(Vec::new()),
        })
        .await
    }

    pub async fn primary_image(&self, reference: i64) -> Result<Option<Image>> {
        let images = self.images(reference).await?;
        Ok(primary_image(&images).cloned())
    }

    pub async fn tags(&self, reference: i64) -> Result<Vec<Tag>> {
        self.execute(move |conn| match listings::find_by_ref(conn, reference)? {
            Some(listing) => reference::tags_for_listing(conn, listing.id),
            None => Ok(Vec::new()),
        })
        .await
    }

    pub async fn features(&self, reference: i64) -> Result<Vec<ListingFeature>> {
        self.execute(move |conn| match listings::find_by_ref(conn, reference)? {
            Some(listing) => reference::features_for_listing(conn, listing.id),
            None => Ok(Vec::new()),
        })
        .await
    }

    pub async fn pending_images(&self, limit: usize) -> Result<Vec<PendingImage>> {
        self.execute(move |conn| images::pending(conn, limit)).await
    }

    pub async fn mark_downloaded(&self, image_id: i64, local_path: String) -> Result<bool> {
        let changed = self
            .execute(move |conn| images::mark_downloaded(conn, image_id, &local_path, Utc::now()))
            .await?;
        Ok(changed > 0)
    }

    pub async fn insert_reference(&self, kind: ReferenceKind, name: &str) -> Result<i64> {
        let name = name.to_string();
        self.execute(move |conn| reference::insert_reference(conn, kind, &name)).await
    }

    pub async fn insert_neighborhood(&self, name: &str, city_id: Option<i64>) -> Result<i64> {
        let name = name.to_string();
        self.execute(move |conn| reference::insert_neighborhood(conn, &name, city_id)).await
    }

    pub async fn insert_advisor(&self, name: &str, phone: Option<&str>, email: Option<&str>) -> Result<i64> {
        let name = name.to_string();
        let phone = phone.map(str::to_string);
        let email = email.map(str::to_string);
        self.execute(move |conn| {
            reference::insert_advisor(conn, &name, phone.as_deref(), email.as_deref())
        })
        .await
    }

    pub async fn insert_tag(&self, name: &str, color: Option<&str>) -> Result<i64> {
        let name = name.to_string();
        let color = color.map(str::to_string);
        self.execute(move |conn| reference::insert_tag(conn, &name, color.as_deref(), None))
            .await
    }

    pub async fn insert_feature_definition(
        &self,
        name: &str,
        kind: FeatureKind,
        unit: Option<&str>,
    ) -> Result<i64> {
        let name = name.to_string();
        let unit = unit.map(str::to_string);
        self.execute(move |conn| {
            reference::insert_feature_definition(conn, &name, kind, unit.as_deref())
        })
        .await
    }
}

fn initialize(conn: &Connection) -> Result<()> {
    let version: Option<u32> = match conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
    {
        Ok(version) => version,
        // Fresh database
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.starts_with("no such table") => None,
        Err(e) => return Err(e.into()),
    };

    match version {
        Some(v) if v >= SCHEMA_VERSION => {
            debug!("Listing store schema at version {}", v);
        }
        _ => {
            info!("Initializing listing store schema");
            conn.execute_batch(SCHEMA)?;
            conn.execute(
                "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }
    }
    Ok(())
}

/// Decimals are stored as TEXT to keep their exact scale
pub(crate) fn decimal_param(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

pub(crate) fn decimal_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| {
        Decimal::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}
