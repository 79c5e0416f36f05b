use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::feed::traits::FeedSource;
use crate::feed::types::{parse_payload, FeedConfig};

/// Feed served over HTTP as a JSON document
pub struct HttpFeed {
    client: Client,
    url: String,
}

impl HttpFeed {
    /// Create a new HTTP feed with default client settings
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_config(url, &FeedConfig::default())
    }

    /// Create a new HTTP feed with custom timeout and user agent
    pub fn with_config(url: impl Into<String>, config: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<Vec<Value>> {
        info!("Fetching listing feed");
        debug!("Fetching URL: {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to fetch listing feed")?;

        if !response.status().is_success() {
            warn!("Feed returned status: {}", response.status());
            anyhow::bail!("Failed to fetch listing feed: {}", response.status());
        }

        let document: Value = response
            .json()
            .await
            .context("Failed to decode feed response")?;
        let records = parse_payload(document)?;

        info!("Feed contains {} records", records.len());
        Ok(records)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}
