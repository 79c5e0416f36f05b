use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod features;
pub mod incoming;

pub use features::{FeatureDefinition, FeatureKind, FeatureValue, ListingFeature};
pub use incoming::{IncomingImage, IncomingListing};

/// Locally-owned moderation flags, controlled by administrators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingFlags {
    pub active: bool,
    pub featured: bool,
    pub hot: bool,
}

impl Default for ListingFlags {
    /// A brand-new listing is published but not promoted
    fn default() -> Self {
        Self {
            active: true,
            featured: false,
            hot: false,
        }
    }
}

/// Side-table row holding the flags that must survive re-syncs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingState {
    pub reference: i64,
    pub sync_code: String,
    pub flags: ListingFlags,
    pub modified_at: DateTime<Utc>,
}

/// A resolved foreign reference plus the name the feed used for it
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ForeignRef {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl ForeignRef {
    pub fn unresolved(name: Option<String>) -> Self {
        Self { id: None, name }
    }
}

/// Canonical stored listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: i64,
    pub reference: i64,
    pub sync_code: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub city: ForeignRef,
    pub neighborhood: ForeignRef,
    pub property_type: ForeignRef,
    pub usage_type: ForeignRef,
    pub status: ForeignRef,
    pub consignment_type: ForeignRef,
    pub advisor: ForeignRef,
    pub built_area: Option<Decimal>,
    pub private_area: Option<Decimal>,
    pub land_area: Option<Decimal>,
    pub area: Option<Decimal>,
    pub rooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub garages: Option<i32>,
    pub stratum: Option<i32>,
    pub sale_price: Option<Decimal>,
    pub rent_price: Option<Decimal>,
    pub admin_fee: Option<Decimal>,
    pub total_price: Option<Decimal>,
    pub address: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub slug: Option<String>,
    pub flags: ListingFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced_at: DateTime<Utc>,
    pub data_hash: Option<String>,
}

impl Listing {
    /// Human readable label used by list screens
    pub fn display_name(&self) -> String {
        let title = self
            .title
            .clone()
            .unwrap_or_else(|| format!("Inmueble #{}", self.reference));
        let city = self.city.name.as_deref().unwrap_or("Sin ciudad");
        let neighborhood = self.neighborhood.name.as_deref().unwrap_or("Sin barrio");
        format!("{} - {} - {}", title, city, neighborhood)
    }
}

/// Image attached to a listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub id: i64,
    pub listing_id: i64,
    pub url: String,
    pub local_path: Option<String>,
    pub display_order: i32,
    pub downloaded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Image still waiting for the download pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingImage {
    pub image: Image,
    pub reference: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
}

/// Lookup tables owned by the surrounding admin system
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    City,
    Neighborhood,
    PropertyType,
    UsageType,
    Status,
    ConsignmentType,
    Advisor,
}

impl ReferenceKind {
    pub fn table(self) -> &'static str {
        match self {
            ReferenceKind::City => "cities",
            ReferenceKind::Neighborhood => "neighborhoods",
            ReferenceKind::PropertyType => "property_types",
            ReferenceKind::UsageType => "usage_types",
            ReferenceKind::Status => "listing_statuses",
            ReferenceKind::ConsignmentType => "consignment_types",
            ReferenceKind::Advisor => "advisors",
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            ReferenceKind::City => "city",
            ReferenceKind::Neighborhood => "neighborhood",
            ReferenceKind::PropertyType => "property_type",
            ReferenceKind::UsageType => "usage_type",
            ReferenceKind::Status => "status",
            ReferenceKind::ConsignmentType => "consignment_type",
            ReferenceKind::Advisor => "advisor",
        }
    }
}
