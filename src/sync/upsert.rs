//! Listing upsert engine.
//!
//! Each incoming record is reconciled in its own transaction: look the
//! listing up, skip it if the fingerprint is unchanged, otherwise merge the
//! feed's descriptive data with the preserved moderation flags, write it,
//! reconcile images, tags and features, and persist the flags again.
//! Records are spread over a bounded worker pool; a per-reference lock
//! keeps two units of work for the same listing from interleaving.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::extensions::{self, ResolvedReferences};
use super::fingerprint::{self, Digest};
use super::images::{self, ImageReport};
use super::locks::RefLocks;
use super::report::{OutcomeKind, RecordOutcome, UpsertReport};
use super::state;
use crate::display::slugify;
use crate::errors::{Result, SyncError};
use crate::models::{IncomingImage, IncomingListing, Listing, ListingFlags};
use crate::store::{listings, Store};

/// Reconciles feed batches into the store
#[derive(Clone)]
pub struct UpsertEngine {
    store: Store,
    locks: RefLocks,
    workers: usize,
}

impl UpsertEngine {
    pub fn new(store: Store, workers: usize) -> Self {
        Self {
            store,
            locks: RefLocks::new(),
            workers: workers.max(1),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Decode and reconcile raw feed records. A record that does not decode
    /// counts as a validation failure of that record only.
    pub async fn upsert_raw(&self, batch: Vec<Value>) -> UpsertReport {
        let mut report = UpsertReport::default();
        let mut decoded = Vec::with_capacity(batch.len());

        for (position, raw) in batch.into_iter().enumerate() {
            let reference = raw.get("ref").and_then(Value::as_i64);
            match IncomingListing::from_value(raw) {
                Ok(record) => decoded.push((position, record)),
                Err(e) => {
                    warn!(position, ?reference, error = %e, "Skipping malformed feed record");
                    report.record_failure(position, reference, &e);
                }
            }
        }

        self.run(decoded, report).await
    }

    pub async fn upsert(&self, batch: Vec<IncomingListing>) -> UpsertReport {
        let positioned = batch.into_iter().enumerate().collect();
        self.run(positioned, UpsertReport::default()).await
    }

    /// Reconcile the image list of a single stored listing.
    ///
    /// The stored fingerprint is cleared so the next sync re-applies the
    /// feed's own image list.
    pub async fn reconcile_images(&self, reference: i64, incoming: Vec<IncomingImage>) -> Result<ImageReport> {
        let _guard = self.locks.lock(reference).await;
        self.store
            .transaction(move |tx| {
                let listing = listings::find_by_ref(tx, reference)?.ok_or(SyncError::NotFound(reference))?;
                let report = images::reconcile(tx, listing.id, &incoming, Utc::now())?;
                listings::clear_hash(tx, listing.id)?;
                Ok(report)
            })
            .await
            .map_err(|e| e.into_conflict(reference))
    }

    async fn run(&self, batch: Vec<(usize, IncomingListing)>, mut report: UpsertReport) -> UpsertReport {
        let total = batch.len();
        let planned = plan(batch, &mut report);
        info!(records = total, planned = planned.len(), workers = self.workers, "Reconciling listing batch");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for (position, reference, record) in planned {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Worker pool closed: {}", e);
                    break;
                }
            };
            let store = self.store.clone();
            let locks = self.locks.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let outcome = reconcile_record(&store, &locks, reference, record).await;
                (position, reference, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, reference, Ok(outcome))) => {
                    debug!(reference, kind = ?outcome.kind, "Listing reconciled");
                    report.record_success(outcome);
                }
                Ok((position, reference, Err(e))) => {
                    warn!(reference, error = %e, "Listing reconciliation failed");
                    report.record_failure(position, Some(reference), &e);
                }
                Err(e) => {
                    error!("Reconciliation task aborted: {}", e);
                    report.record_failure(total, None, &SyncError::Task(e.to_string()));
                }
            }
        }

        report.sort();
        info!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            conflicts = report.conflicts.len(),
            warnings = report.warnings.len(),
            "Batch reconciled"
        );
        report
    }
}

/// Validate records and collapse duplicate references, keeping the last
fn plan(batch: Vec<(usize, IncomingListing)>, report: &mut UpsertReport) -> Vec<(usize, i64, IncomingListing)> {
    let mut slots: HashMap<i64, usize> = HashMap::new();
    let mut planned: Vec<Option<(usize, i64, IncomingListing)>> = Vec::with_capacity(batch.len());

    for (position, record) in batch {
        let reference = match record.validate() {
            Ok(reference) => reference,
            Err(e) => {
                warn!(position, reference = ?record.reference, error = %e, "Rejecting invalid listing");
                report.record_failure(position, record.reference, &e);
                continue;
            }
        };

        if let Some(previous) = slots.insert(reference, planned.len()) {
            warn!(reference, "Duplicate ref in batch, the later record wins");
            planned[previous] = None;
            report.record_conflict(reference);
        }
        planned.push(Some((position, reference, record)));
    }

    planned.into_iter().flatten().collect()
}

/// One serialized unit of work, retried once on a write conflict
async fn reconcile_record(
    store: &Store,
    locks: &RefLocks,
    reference: i64,
    record: IncomingListing,
) -> Result<RecordOutcome> {
    let _guard = locks.lock(reference).await;
    let record = Arc::new(record);

    let mut retried = false;
    loop {
        let incoming = record.clone();
        let result = store
            .transaction(move |tx| apply_record(tx, reference, &incoming, Utc::now()))
            .await
            .map_err(|e| e.into_conflict(reference));

        match result {
            Err(SyncError::StorageConflict(_)) if !retried => {
                warn!(reference, "Write conflict, retrying with a fresh read");
                retried = true;
            }
            other => return other,
        }
    }
}

fn apply_record(
    conn: &Connection,
    reference: i64,
    incoming: &IncomingListing,
    now: DateTime<Utc>,
) -> Result<RecordOutcome> {
    let existing = listings::find_by_ref(conn, reference)?;
    let digest = fingerprint::compute_hash(incoming);

    if let Some(stored) = &existing {
        if !fingerprint::has_changed(stored.data_hash.as_deref(), &digest) {
            return Ok(RecordOutcome::unchanged());
        }
    }

    // Preserved flags are read before any incoming data is applied
    let flags = state::load_or_default(conn, reference)?;
    if incoming.carries_flags() {
        debug!(reference, "Ignoring moderation flags supplied by the feed");
    }

    let mut warnings = Vec::new();
    let resolved = extensions::resolve_references(conn, reference, incoming, &mut warnings)?;
    let listing = merge(existing.as_ref(), reference, incoming, resolved, flags, digest, now);

    let (listing_id, kind) = match &existing {
        None => (listings::insert(conn, &listing)?, OutcomeKind::Inserted),
        Some(stored) => {
            if listings::update(conn, &listing, stored.synced_at)? == 0 {
                return Err(SyncError::StorageConflict(reference));
            }
            (stored.id, OutcomeKind::Updated)
        }
    };

    let images = images::reconcile(conn, listing_id, &incoming.images, now)?;
    extensions::reconcile_tags(conn, reference, listing_id, incoming, now, &mut warnings)?;
    extensions::reconcile_features(conn, reference, listing_id, incoming, now, &mut warnings)?;

    state::save_state(conn, reference, listing.sync_code.as_deref(), flags, now)?;

    Ok(RecordOutcome { kind, images, warnings })
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Descriptive fields from the feed, flags from preserved state
fn merge(
    existing: Option<&Listing>,
    reference: i64,
    incoming: &IncomingListing,
    resolved: ResolvedReferences,
    flags: ListingFlags,
    digest: Digest,
    now: DateTime<Utc>,
) -> Listing {
    let title = trimmed(&incoming.title);
    let slug = trimmed(&incoming.slug).unwrap_or_else(|| slugify(title.as_deref(), reference));
    let created_at = existing
        .map(|l| l.created_at)
        .or(incoming.created_at)
        .unwrap_or(now);

    Listing {
        id: existing.map(|l| l.id).unwrap_or_default(),
        reference,
        sync_code: trimmed(&incoming.sync_code),
        title,
        description: trimmed(&incoming.description),
        short_description: trimmed(&incoming.short_description),
        city: resolved.city,
        neighborhood: resolved.neighborhood,
        property_type: resolved.property_type,
        usage_type: resolved.usage_type,
        status: resolved.status,
        consignment_type: resolved.consignment_type,
        advisor: resolved.advisor,
        built_area: incoming.built_area,
        private_area: incoming.private_area,
        land_area: incoming.land_area,
        area: incoming.area,
        rooms: incoming.rooms,
        bathrooms: incoming.bathrooms,
        garages: incoming.garages,
        stratum: incoming.stratum,
        sale_price: incoming.sale_price,
        rent_price: incoming.rent_price,
        admin_fee: incoming.admin_fee,
        total_price: incoming.total_price,
        address: trimmed(&incoming.address),
        latitude: trimmed(&incoming.latitude),
        longitude: trimmed(&incoming.longitude),
        slug: Some(slug),
        flags,
        created_at,
        updated_at: now,
        synced_at: now,
        data_hash: Some(digest.into_string()),
    }
}
