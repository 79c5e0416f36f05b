use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::models::PendingImage;
use crate::store::Store;

/// Where downloaded images go and how many are fetched at once
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MediaConfig {
    pub directory: PathBuf,
    /// Run the download pass after each sync
    pub download: bool,
    pub concurrency: usize,
    /// Maximum images fetched per pass
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("media/inmuebles"),
            download: false,
            concurrency: 4,
            batch_size: 200,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub failed: usize,
}

/// `<media>/<ref>/<image id>.<ext>`, extension taken from the URL when sane
pub fn local_path_for(media_dir: &Path, reference: i64, image_id: i64, url: &str) -> PathBuf {
    let file_name = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or_default();
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string());

    media_dir
        .join(reference.to_string())
        .join(format!("{}.{}", image_id, extension))
}

/// Fetches pending images and marks them downloaded
pub struct ImageDownloader {
    client: Client,
    store: Store,
    config: MediaConfig,
}

impl ImageDownloader {
    pub fn new(store: Store, config: MediaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, store, config })
    }

    /// Download one batch of pending images. A failing image is logged and
    /// left pending; it does not stop the rest of the batch.
    pub async fn run(&self) -> Result<DownloadReport> {
        let pending = self
            .store
            .pending_images(self.config.batch_size)
            .await
            .context("Failed to load pending images")?;

        info!("{} images pending download", pending.len());

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for item in pending {
            let permit = semaphore.clone().acquire_owned().await?;
            let client = self.client.clone();
            let store = self.store.clone();
            let media_dir = self.config.directory.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let image_id = item.image.id;
                (image_id, fetch_one(&client, &store, &media_dir, item).await)
            });
        }

        let mut report = DownloadReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.downloaded += 1,
                Ok((image_id, Err(e))) => {
                    warn!(image_id, "Image download failed: {:#}", e);
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("Download task aborted: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            downloaded = report.downloaded,
            failed = report.failed,
            "Image download pass finished"
        );
        Ok(report)
    }
}

async fn fetch_one(client: &Client, store: &Store, media_dir: &Path, item: PendingImage) -> Result<()> {
    let target = local_path_for(media_dir, item.reference, item.image.id, &item.image.url);
    debug!("Fetching {} -> {}", item.image.url, target.display());

    let response = client
        .get(&item.image.url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", item.image.url))?;

    if !response.status().is_success() {
        anyhow::bail!("Image server returned {} for {}", response.status(), item.image.url);
    }

    let bytes = response.bytes().await.context("Failed to read image body")?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    store
        .mark_downloaded(item.image.id, target.to_string_lossy().into_owned())
        .await
        .context("Failed to mark image downloaded")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_path_for() {
        let media = Path::new("/srv/media");
        assert_eq!(
            local_path_for(media, 1001, 7, "https://cdn.example.com/fotos/fachada.PNG?w=800"),
            PathBuf::from("/srv/media/1001/7.png")
        );
        assert_eq!(
            local_path_for(media, 1001, 8, "https://cdn.example.com/fotos/render"),
            PathBuf::from("/srv/media/1001/8.jpg")
        );
        assert_eq!(
            local_path_for(media, 5, 9, "https://cdn.example.com/a.b/photo.weird-ext"),
            PathBuf::from("/srv/media/5/9.jpg")
        );
    }
}
