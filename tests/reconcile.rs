use inmobiliaria_sync::models::{FeatureKind, FeatureValue, IncomingImage, IncomingListing, ListingFlags, ReferenceKind};
use inmobiliaria_sync::{FailureReason, Store, StoreOptions, SyncError, UpsertEngine};
use rust_decimal::Decimal;
use serde_json::json;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

fn open_store() -> (TempDir, Store) {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("listings.db")).unwrap();
    (dir, store)
}

/// Take the database write lock from another connection for `hold`.
/// Returns once the lock is held.
fn hold_write_lock(path: PathBuf, hold: Duration) -> thread::JoinHandle<()> {
    let (locked_tx, locked_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("BEGIN IMMEDIATE;").unwrap();
        locked_tx.send(()).unwrap();
        thread::sleep(hold);
        conn.execute_batch("COMMIT;").unwrap();
    });
    locked_rx.recv().unwrap();
    handle
}

fn listing(reference: i64, title: &str) -> IncomingListing {
    let mut record = IncomingListing::new(reference);
    record.title = Some(title.to_string());
    record.sync_code = Some(format!("SC-{}", reference));
    record.sale_price = Some(Decimal::new(450_000_000, 0));
    record.rooms = Some(3);
    record
}

#[tokio::test]
async fn test_second_run_is_unchanged() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 4);

    let mut first = listing(1001, "Apartamento en Laureles");
    first.images = vec![
        IncomingImage::new("https://cdn.example.com/1001/a.jpg", 0),
        IncomingImage::new("https://cdn.example.com/1001/b.jpg", 1),
    ];
    let batch = vec![first, listing(1002, "Casa en Envigado")];

    let report = engine.upsert(batch.clone()).await;
    assert_eq!(report.inserted, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.images.added, 2);

    let before = store.listing(1001).await.unwrap().unwrap();

    let report = engine.upsert(batch).await;
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.inserted + report.updated, 0);
    assert_eq!(report.images.added, 0);

    let after = store.listing(1001).await.unwrap().unwrap();
    assert_eq!(before.synced_at, after.synced_at);
    assert_eq!(before.data_hash, after.data_hash);
}

#[tokio::test]
async fn test_changed_record_is_updated() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 2);

    engine.upsert(vec![listing(7, "Lote campestre")]).await;
    let created = store.listing(7).await.unwrap().unwrap();

    let mut changed = listing(7, "Lote campestre en Rionegro");
    changed.sale_price = Some(Decimal::new(380_000_000, 0));
    let report = engine.upsert(vec![changed]).await;
    assert_eq!(report.updated, 1);

    let updated = store.listing(7).await.unwrap().unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.title.as_deref(), Some("Lote campestre en Rionegro"));
    assert_eq!(updated.sale_price, Some(Decimal::new(380_000_000, 0)));
    assert_ne!(updated.data_hash, created.data_hash);
}

#[tokio::test]
async fn test_new_listing_gets_default_flags() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 1);

    engine.upsert(vec![listing(55, "Oficina")]).await;

    let stored = store.listing(55).await.unwrap().unwrap();
    assert_eq!(stored.flags, ListingFlags::default());
    assert!(stored.flags.active);

    let state = store.listing_state(55).await.unwrap().unwrap();
    assert_eq!(state.flags, ListingFlags::default());
    assert_eq!(state.sync_code, "SC-55");
}

#[tokio::test]
async fn test_admin_flags_survive_resync() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 2);

    engine.upsert(vec![listing(300, "Penthouse")]).await;

    let moderated = ListingFlags {
        active: false,
        featured: true,
        hot: true,
    };
    store.set_flags(300, moderated).await.unwrap();

    // The feed tries to switch the flags back and changes descriptive data
    let mut resync = listing(300, "Penthouse con terraza");
    resync.active = Some(json!(true));
    resync.featured = Some(json!(false));
    resync.hot = Some(json!(0));
    let report = engine.upsert(vec![resync]).await;
    assert_eq!(report.updated, 1);

    let stored = store.listing(300).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("Penthouse con terraza"));
    assert_eq!(stored.flags, moderated);
    assert_eq!(store.listing_state(300).await.unwrap().unwrap().flags, moderated);
}

#[tokio::test]
async fn test_batch_continues_past_invalid_record() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 2);

    let mut missing_ref = listing(1, "Sin referencia");
    missing_ref.reference = None;
    let report = engine
        .upsert(vec![listing(10, "Uno"), missing_ref, listing(12, "Tres")])
        .await;

    assert_eq!(report.inserted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].position, 1);
    assert_eq!(report.failures[0].reference, None);
    assert_eq!(report.failures[0].reason, FailureReason::Validation);
    assert!(store.listing(10).await.unwrap().is_some());
    assert!(store.listing(12).await.unwrap().is_some());
}

#[tokio::test]
async fn test_raw_records_decode_per_record() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 2);

    let report = engine
        .upsert_raw(vec![
            json!({
                "ref": 4101,
                "titulo": "Apartaestudio",
                "precio_canon": "1850000",
                "habitaciones": 1,
                "imagenes": [{"url": "https://cdn.example.com/4101/1.jpg", "orden": 0}],
            }),
            json!({"ref": 4102, "habitaciones": "muchas"}),
            json!({"ref": -3, "titulo": "Negativo"}),
        ])
        .await;

    assert_eq!(report.inserted, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.failures[0].reference, Some(4102));
    assert_eq!(report.failures[1].reference, Some(-3));
    assert!(report.failures.iter().all(|f| f.reason == FailureReason::Validation));

    let stored = store.listing(4101).await.unwrap().unwrap();
    assert_eq!(stored.rent_price, Some(Decimal::new(1_850_000, 0)));
    assert_eq!(store.images(4101).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_image_reconciliation_keeps_downloads() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 1);

    let a = "https://cdn.example.com/900/a.jpg";
    let b = "https://cdn.example.com/900/b.jpg";
    let c = "https://cdn.example.com/900/c.jpg";

    let mut record = listing(900, "Finca");
    record.images = vec![IncomingImage::new(a, 0), IncomingImage::new(b, 1)];
    engine.upsert(vec![record]).await;

    let stored = store.images(900).await.unwrap();
    let image_a = stored.iter().find(|img| img.url == a).unwrap();
    assert!(!image_a.downloaded);
    assert!(store
        .mark_downloaded(image_a.id, "media/inmuebles/900/a.jpg".into())
        .await
        .unwrap());

    let mut record = listing(900, "Finca");
    record.images = vec![IncomingImage::new(a, 0), IncomingImage::new(c, 1)];
    let report = engine.upsert(vec![record]).await;
    assert_eq!(report.updated, 1);
    assert_eq!(report.images.added, 1);
    assert_eq!(report.images.removed, 1);
    assert_eq!(report.images.retained, 1);

    let stored = store.images(900).await.unwrap();
    let urls: Vec<&str> = stored.iter().map(|img| img.url.as_str()).collect();
    assert_eq!(urls, vec![a, c]);

    let kept = &stored[0];
    assert!(kept.downloaded);
    assert_eq!(kept.local_path.as_deref(), Some("media/inmuebles/900/a.jpg"));
    assert!(!stored[1].downloaded);

    let pending = store.pending_images(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].image.url, c);
    assert_eq!(pending[0].reference, 900);
}

#[tokio::test]
async fn test_primary_image_from_store() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 1);

    let mut record = listing(31, "Bodega");
    record.images = vec![
        IncomingImage::new("https://cdn.example.com/31/lateral.jpg", 3),
        IncomingImage::new("https://cdn.example.com/31/plano.jpg", 2),
    ];
    engine.upsert(vec![record]).await;

    let primary = store.primary_image(31).await.unwrap().unwrap();
    assert_eq!(primary.url, "https://cdn.example.com/31/plano.jpg");

    assert!(store.primary_image(32).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_refs_last_record_wins() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 4);

    let report = engine
        .upsert(vec![
            listing(88, "Primera version"),
            listing(89, "Otra"),
            listing(88, "Segunda version"),
        ])
        .await;

    assert_eq!(report.inserted, 2);
    assert_eq!(report.conflicts, vec![88]);
    let stored = store.listing(88).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("Segunda version"));
}

#[tokio::test]
async fn test_references_tags_and_features() {
    let (_dir, store) = open_store();
    let medellin = store.insert_reference(ReferenceKind::City, "Medellín").await.unwrap();
    let poblado = store.insert_neighborhood("El Poblado", Some(medellin)).await.unwrap();
    let apartamento = store
        .insert_reference(ReferenceKind::PropertyType, "Apartamento")
        .await
        .unwrap();
    store.insert_tag("Oportunidad", Some("#ff0000")).await.unwrap();
    store
        .insert_feature_definition("Piscina", FeatureKind::Boolean, None)
        .await
        .unwrap();
    store
        .insert_feature_definition("Area balcon", FeatureKind::Numeric, Some("m2"))
        .await
        .unwrap();

    let engine = UpsertEngine::new(store.clone(), 2);
    let record = json!({
        "ref": 5000,
        "titulo": "Apartamento con vista",
        "ciudad": "medellín",
        "barrio": "El Poblado",
        "tipo_inmueble": "Apartamento",
        "estado_inmueble": "Disponible",
        "etiquetas": ["oportunidad", "Exclusivo"],
        "caracteristicas": {
            "Piscina": "sí",
            "Area balcon": "12,5",
            "Chimenea": true
        }
    });
    let report = engine.upsert_raw(vec![record]).await;
    assert_eq!(report.inserted, 1);

    let stored = store.listing(5000).await.unwrap().unwrap();
    assert_eq!(stored.city.id, Some(medellin));
    assert_eq!(stored.neighborhood.id, Some(poblado));
    assert_eq!(stored.property_type.id, Some(apartamento));
    assert_eq!(stored.status.id, None);
    assert_eq!(stored.status.name.as_deref(), Some("Disponible"));

    let fields: Vec<&str> = report.warnings.iter().map(|w| w.field.as_str()).collect();
    assert!(fields.contains(&"status"));
    assert!(fields.contains(&"tag"));
    assert!(fields.contains(&"feature"));

    let tags = store.tags(5000).await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "Oportunidad");

    let features = store.features(5000).await.unwrap();
    assert_eq!(features.len(), 2);
    let pool = features.iter().find(|f| f.definition.name == "Piscina").unwrap();
    assert_eq!(pool.value, FeatureValue::Boolean(true));
    let balcony = features.iter().find(|f| f.definition.name == "Area balcon").unwrap();
    assert_eq!(balcony.value, FeatureValue::Numeric(Decimal::new(125, 1)));
}

#[tokio::test]
async fn test_feature_of_wrong_kind_is_skipped() {
    let (_dir, store) = open_store();
    store
        .insert_feature_definition("Parqueaderos", FeatureKind::Numeric, None)
        .await
        .unwrap();

    let engine = UpsertEngine::new(store.clone(), 1);
    let report = engine
        .upsert_raw(vec![json!({
            "ref": 61,
            "caracteristicas": {"Parqueaderos": "dos"}
        })])
        .await;

    assert_eq!(report.inserted, 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].field, "feature:Parqueaderos");
    assert!(store.features(61).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleted_listing_gets_flags_back() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 1);

    let mut record = listing(700, "Casa de campo");
    record.images = vec![IncomingImage::new("https://cdn.example.com/700/1.jpg", 0)];
    engine.upsert(vec![record.clone()]).await;

    let hidden = ListingFlags {
        active: false,
        featured: false,
        hot: true,
    };
    store.set_flags(700, hidden).await.unwrap();

    assert!(store.delete_listing(700).await.unwrap());
    assert!(!store.delete_listing(700).await.unwrap());
    assert!(store.listing(700).await.unwrap().is_none());
    assert!(store.images(700).await.unwrap().is_empty());
    assert!(store.pending_images(10).await.unwrap().is_empty());

    let report = engine.upsert(vec![record]).await;
    assert_eq!(report.inserted, 1);
    assert_eq!(store.listing(700).await.unwrap().unwrap().flags, hidden);
}

#[tokio::test]
async fn test_state_table_missing_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("listings.db");
    let store = Store::open(&path).unwrap();
    let engine = UpsertEngine::new(store.clone(), 1);

    engine.upsert(vec![listing(1, "Antes")]).await;

    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute_batch("DROP TABLE listing_states;").unwrap();
    drop(raw);

    let report = engine.upsert(vec![listing(2, "Despues")]).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].reference, Some(2));
    assert_eq!(report.failures[0].reason, FailureReason::StateUnavailable);
    assert!(store.listing(2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_state_write_failure_rolls_back_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("listings.db");
    let store = Store::open(&path).unwrap();
    let engine = UpsertEngine::new(store.clone(), 1);

    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute_batch(
        "CREATE TRIGGER reject_state BEFORE INSERT ON listing_states \
         BEGIN SELECT RAISE(ABORT, 'state table offline'); END;",
    )
    .unwrap();

    let mut record = listing(2, "Casa con patio");
    record.images = vec![
        IncomingImage::new("https://cdn.example.com/2/a.jpg", 0),
        IncomingImage::new("https://cdn.example.com/2/b.jpg", 1),
    ];
    let report = engine.upsert(vec![record.clone()]).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].reason, FailureReason::StateUnavailable);

    // The listing insert and its images went out with the failed state write
    assert!(store.listing(2).await.unwrap().is_none());
    let (listings, images): (i64, i64) = raw
        .query_row(
            "SELECT (SELECT COUNT(*) FROM listings), (SELECT COUNT(*) FROM images)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((listings, images), (0, 0));

    // The next run picks the record up again
    raw.execute_batch("DROP TRIGGER reject_state;").unwrap();
    let report = engine.upsert(vec![record]).await;
    assert_eq!(report.inserted, 1);
    assert_eq!(store.images(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_flags_edited_on_listing_row_survive_resync() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("listings.db");
    let store = Store::open(&path).unwrap();
    let engine = UpsertEngine::new(store.clone(), 1);

    engine.upsert(vec![listing(5, "Apartamento")]).await;

    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute("UPDATE listings SET featured = 1 WHERE ref = 5", [])
        .unwrap();

    let report = engine.upsert(vec![listing(5, "Apartamento remodelado")]).await;
    assert_eq!(report.updated, 1);

    let stored = store.listing(5).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("Apartamento remodelado"));
    assert!(stored.flags.featured);
    assert!(stored.flags.active);
    assert!(store.listing_state(5).await.unwrap().unwrap().flags.featured);
}

#[tokio::test]
async fn test_write_conflict_is_retried() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("listings.db");
    let options = StoreOptions {
        max_connections: 2,
        busy_timeout: Duration::from_millis(250),
    };
    let store = Store::open_with(&path, options).unwrap();
    let engine = UpsertEngine::new(store.clone(), 1);

    // Outlasts the first attempt, released during the second
    let writer = hold_write_lock(path.clone(), Duration::from_millis(400));
    let report = engine.upsert(vec![listing(8, "Casa esquinera")]).await;
    writer.join().unwrap();

    assert_eq!(report.failed, 0);
    assert_eq!(report.inserted, 1);
    assert!(store.listing(8).await.unwrap().is_some());
}

#[tokio::test]
async fn test_second_conflict_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("listings.db");
    let options = StoreOptions {
        max_connections: 2,
        busy_timeout: Duration::from_millis(100),
    };
    let store = Store::open_with(&path, options).unwrap();
    let engine = UpsertEngine::new(store.clone(), 1);

    let writer = hold_write_lock(path.clone(), Duration::from_millis(1500));
    let report = engine.upsert(vec![listing(9, "Bodega")]).await;
    writer.join().unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].reference, Some(9));
    assert_eq!(report.failures[0].reason, FailureReason::StorageConflict);
    assert!(store.listing(9).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reconcile_images_for_single_listing() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 1);

    let mut record = listing(42, "Local comercial");
    record.images = vec![IncomingImage::new("https://cdn.example.com/42/a.jpg", 0)];
    engine.upsert(vec![record.clone()]).await;

    let report = engine
        .reconcile_images(
            42,
            vec![
                IncomingImage::new("https://cdn.example.com/42/a.jpg", 1),
                IncomingImage::new("https://cdn.example.com/42/b.jpg", 0),
            ],
        )
        .await
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.retained, 1);
    assert_eq!(
        store.primary_image(42).await.unwrap().unwrap().url,
        "https://cdn.example.com/42/b.jpg"
    );
    assert!(store.listing(42).await.unwrap().unwrap().data_hash.is_none());

    // The next sync puts the feed's own images back
    let report = engine.upsert(vec![record]).await;
    assert_eq!(report.updated, 1);
    assert_eq!(store.images(42).await.unwrap().len(), 1);

    let err = engine.reconcile_images(43, Vec::new()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(43)));
}

#[tokio::test]
async fn test_many_listings_in_parallel() {
    let (_dir, store) = open_store();
    let engine = UpsertEngine::new(store.clone(), 8);

    let batch: Vec<IncomingListing> = (1..=60)
        .map(|reference| {
            let mut record = listing(reference, &format!("Inmueble {}", reference));
            record.images = vec![IncomingImage::new(
                format!("https://cdn.example.com/{}/1.jpg", reference),
                0,
            )];
            record
        })
        .collect();

    let report = engine.upsert(batch.clone()).await;
    assert_eq!(report.inserted, 60);
    assert_eq!(report.failed, 0);
    assert_eq!(store.listings().await.unwrap().len(), 60);

    let report = engine.upsert(batch).await;
    assert_eq!(report.unchanged, 60);
}
