pub mod file;
pub mod http;
pub mod traits;
pub mod types;

pub use file::FileFeed;
pub use http::HttpFeed;
pub use traits::FeedSource;
pub use types::{parse_payload, FeedConfig};

use anyhow::{Context, Result};

/// Pick the feed implementation for the configured source
pub fn from_config(config: &FeedConfig) -> Result<Box<dyn FeedSource>> {
    let source = config
        .source
        .as_deref()
        .context("No feed source configured")?;

    if source.starts_with("http://") || source.starts_with("https://") {
        Ok(Box::new(HttpFeed::with_config(source, config)?))
    } else {
        Ok(Box::new(FileFeed::new(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_picks_transport() {
        let mut config = FeedConfig::default();
        assert!(from_config(&config).is_err());

        config.source = Some("exports/inmuebles.json".into());
        assert_eq!(from_config(&config).unwrap().source_name(), "file");

        config.source = Some("https://crm.example.com/api/inmuebles".into());
        assert_eq!(from_config(&config).unwrap().source_name(), "http");
    }
}
