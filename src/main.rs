use anyhow::Context;
use inmobiliaria_sync::media::ImageDownloader;
use inmobiliaria_sync::{feed, Config, Store, UpsertEngine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    // A feed given on the command line wins over the config file
    if let Some(source) = std::env::args().nth(1) {
        config.feed.source = Some(source);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Inmobiliaria listing sync");
    info!("Database: {}", config.database_path.display());

    let store = Store::open_with(&config.database_path, config.store_options())
        .with_context(|| format!("Failed to open store at {}", config.database_path.display()))?;

    let source = feed::from_config(&config.feed)?;
    info!("Fetching listings from {} feed...", source.source_name());
    let records = source.fetch().await?;

    let engine = UpsertEngine::new(store.clone(), config.workers);
    let report = engine.upsert_raw(records).await;

    // Display results
    println!(
        "{} inserted, {} updated, {} unchanged, {} failed",
        report.inserted, report.updated, report.unchanged, report.failed
    );
    println!(
        "Images: {} queued, {} retained, {} removed",
        report.images.added, report.images.retained, report.images.removed
    );
    for failure in &report.failures {
        let reference = failure
            .reference
            .map(|r| r.to_string())
            .unwrap_or_else(|| format!("#{}", failure.position));
        println!("   {} [{:?}] {}", reference, failure.reason, failure.message);
    }
    if !report.conflicts.is_empty() {
        warn!("Duplicate refs in feed: {:?}", report.conflicts);
    }

    // Save the run report next to the database
    let json = serde_json::to_string_pretty(&report)?;
    let report_path = config.database_path.with_extension("last-sync.json");
    tokio::fs::write(&report_path, json).await?;
    info!("Saved sync report to {}", report_path.display());

    if config.media.download {
        let downloader = ImageDownloader::new(store, config.media.clone())?;
        let downloads = downloader.run().await?;
        println!("Images downloaded: {}, failed: {}", downloads.downloaded, downloads.failed);
    }

    Ok(())
}
