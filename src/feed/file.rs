use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::feed::traits::FeedSource;
use crate::feed::types::parse_payload;

/// Feed exported to a JSON file on disk
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FeedSource for FileFeed {
    async fn fetch(&self) -> Result<Vec<Value>> {
        info!("Reading listing feed from {}", self.path.display());

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read feed file: {}", self.path.display()))?;

        debug!("Read {} bytes of feed data", content.len());

        let document: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse feed file: {}", self.path.display()))?;
        let records = parse_payload(document)?;

        info!("Feed contains {} records", records.len());
        Ok(records)
    }

    fn source_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reads_wrapped_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, r#"{"listings": [{"ref": 1}, {"titulo": "sin ref"}]}"#).unwrap();

        let records = FileFeed::new(&path).fetch().await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = FileFeed::new(dir.path().join("absent.json")).fetch().await.unwrap_err();
        assert!(err.to_string().contains("Failed to read feed file"));
    }
}
