//! Content fingerprints for incoming listings.
//!
//! Records are normalized before hashing so that formatting drift in the
//! feed (key order, padding, trailing decimal zeros, image list order)
//! does not show up as a change.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::IncomingListing;

/// blake3 digest of a normalized record, as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn compute_hash(record: &IncomingListing) -> Digest {
    let canonical = normalize(record);
    Digest(blake3::hash(canonical.to_string().as_bytes()).to_hex().to_string())
}

/// A record with no stored digest always counts as changed
pub fn has_changed(stored: Option<&str>, new: &Digest) -> bool {
    stored != Some(new.as_str())
}

fn text(value: &Option<String>) -> Value {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Value::String(s.to_string()),
        _ => Value::Null,
    }
}

fn decimal(value: Option<Decimal>) -> Value {
    value
        .map(|d| Value::String(d.normalize().to_string()))
        .unwrap_or(Value::Null)
}

/// Rebuild nested objects with sorted keys
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map.iter().map(|(k, v)| (k, canonical(v))).collect();
            json!(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other.clone(),
    }
}

/// Canonical JSON form of a record. Flags are left out.
pub fn normalize(record: &IncomingListing) -> Value {
    let mut images: Vec<(i32, String)> = record
        .images
        .iter()
        .enumerate()
        .map(|(position, img)| {
            (
                img.order.unwrap_or(position as i32),
                img.url.trim().to_string(),
            )
        })
        .collect();
    images.sort();
    let images: Vec<Value> = images
        .into_iter()
        .map(|(order, url)| json!({ "order": order, "url": url }))
        .collect();

    let mut tags: Vec<String> = record
        .tags
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();

    let features: BTreeMap<String, Value> = record
        .features
        .iter()
        .map(|(name, value)| (name.trim().to_string(), canonical(value)))
        .collect();

    let mut fields: BTreeMap<&'static str, Value> = BTreeMap::new();
    fields.insert("ref", json!(record.reference));
    fields.insert("sync_code", text(&record.sync_code));
    fields.insert("title", text(&record.title));
    fields.insert("description", text(&record.description));
    fields.insert("short_description", text(&record.short_description));
    fields.insert("city", text(&record.city));
    fields.insert("neighborhood", text(&record.neighborhood));
    fields.insert("property_type", text(&record.property_type));
    fields.insert("usage_type", text(&record.usage_type));
    fields.insert("status", text(&record.status));
    fields.insert("consignment_type", text(&record.consignment_type));
    fields.insert("advisor", text(&record.advisor));
    fields.insert("built_area", decimal(record.built_area));
    fields.insert("private_area", decimal(record.private_area));
    fields.insert("land_area", decimal(record.land_area));
    fields.insert("area", decimal(record.area));
    fields.insert("rooms", json!(record.rooms));
    fields.insert("bathrooms", json!(record.bathrooms));
    fields.insert("garages", json!(record.garages));
    fields.insert("stratum", json!(record.stratum));
    fields.insert("sale_price", decimal(record.sale_price));
    fields.insert("rent_price", decimal(record.rent_price));
    fields.insert("admin_fee", decimal(record.admin_fee));
    fields.insert("total_price", decimal(record.total_price));
    fields.insert("address", text(&record.address));
    fields.insert("latitude", text(&record.latitude));
    fields.insert("longitude", text(&record.longitude));
    fields.insert("slug", text(&record.slug));
    fields.insert("created_at", json!(record.created_at.map(|t| t.timestamp_micros())));
    fields.insert("images", Value::Array(images));
    fields.insert("tags", json!(tags));
    fields.insert("features", json!(features));

    json!(fields)
}
