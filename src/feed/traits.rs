use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Common trait for all listing feeds
/// New transports (SFTP drops, partner APIs) only need to yield raw records
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current batch of raw listing records
    async fn fetch(&self) -> Result<Vec<Value>>;

    /// Get the name of the feed source
    fn source_name(&self) -> &'static str;
}
