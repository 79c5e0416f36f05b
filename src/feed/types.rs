use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where and how to fetch the listing feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    /// Local JSON file path or http(s) URL
    pub source: Option<String>,
    /// Request timeout for HTTP feeds (seconds)
    pub timeout_secs: u64,
    /// User agent sent to HTTP feeds
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: None,
            timeout_secs: 30,
            user_agent: format!("inmobiliaria-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Split a feed document into raw records.
///
/// Accepts a top-level array or an object holding a `listings`
/// (or `inmuebles`) array.
pub fn parse_payload(document: Value) -> Result<Vec<Value>> {
    match document {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("listings").or_else(|| map.remove("inmuebles")) {
            Some(Value::Array(records)) => Ok(records),
            Some(_) => bail!("feed 'listings' field is not an array"),
            None => bail!("feed document has no 'listings' array"),
        },
        _ => bail!("feed document must be an array or an object"),
    }
}
