use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::{Result, SyncError};

/// Image entry as delivered by the feed
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IncomingImage {
    pub url: String,
    /// Display order; when absent the position in the list is used
    #[serde(default, alias = "orden")]
    pub order: Option<i32>,
}

impl IncomingImage {
    pub fn new(url: impl Into<String>, order: i32) -> Self {
        Self {
            url: url.into(),
            order: Some(order),
        }
    }
}

/// Listing record as delivered by the external feed.
///
/// Field names follow the source system; English names are accepted as
/// aliases. The moderation flag columns are read so they can be reported,
/// but they are never applied: the feed is not authoritative for them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IncomingListing {
    #[serde(rename = "ref", default)]
    pub reference: Option<i64>,
    #[serde(rename = "codigo_sincronizacion", alias = "sync_code", default)]
    pub sync_code: Option<String>,
    #[serde(rename = "titulo", alias = "title", default)]
    pub title: Option<String>,
    #[serde(rename = "descripcion", alias = "description", default)]
    pub description: Option<String>,
    #[serde(rename = "descripcion_corta", alias = "short_description", default)]
    pub short_description: Option<String>,

    #[serde(rename = "ciudad", alias = "city", default)]
    pub city: Option<String>,
    #[serde(rename = "barrio", alias = "neighborhood", default)]
    pub neighborhood: Option<String>,
    #[serde(rename = "tipo_inmueble", alias = "property_type", default)]
    pub property_type: Option<String>,
    #[serde(rename = "uso_inmueble", alias = "usage_type", default)]
    pub usage_type: Option<String>,
    #[serde(rename = "estado_inmueble", alias = "status", default)]
    pub status: Option<String>,
    #[serde(rename = "tipo_consignacion", alias = "consignment_type", default)]
    pub consignment_type: Option<String>,
    #[serde(rename = "asesor", alias = "advisor", default)]
    pub advisor: Option<String>,

    #[serde(rename = "area_construida", alias = "built_area", default)]
    pub built_area: Option<Decimal>,
    #[serde(rename = "area_privada", alias = "private_area", default)]
    pub private_area: Option<Decimal>,
    #[serde(rename = "area_terreno", alias = "land_area", default)]
    pub land_area: Option<Decimal>,
    #[serde(default)]
    pub area: Option<Decimal>,

    #[serde(rename = "habitaciones", alias = "rooms", default)]
    pub rooms: Option<i32>,
    #[serde(rename = "banos", alias = "bathrooms", default)]
    pub bathrooms: Option<i32>,
    #[serde(rename = "garajes", alias = "garages", default)]
    pub garages: Option<i32>,
    #[serde(rename = "estrato", alias = "stratum", default)]
    pub stratum: Option<i32>,

    #[serde(rename = "precio_venta", alias = "sale_price", default)]
    pub sale_price: Option<Decimal>,
    #[serde(rename = "precio_canon", alias = "rent_price", default)]
    pub rent_price: Option<Decimal>,
    #[serde(rename = "precio_administracion", alias = "admin_fee", default)]
    pub admin_fee: Option<Decimal>,
    #[serde(rename = "precio_total", alias = "total_price", default)]
    pub total_price: Option<Decimal>,

    #[serde(rename = "direccion", alias = "address", default)]
    pub address: Option<String>,
    #[serde(rename = "latitud", alias = "latitude", default)]
    pub latitude: Option<String>,
    #[serde(rename = "longitud", alias = "longitude", default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(rename = "fecha_creacion", alias = "created_at", default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(rename = "imagenes", alias = "images", default)]
    pub images: Vec<IncomingImage>,
    #[serde(rename = "etiquetas", alias = "tags", default)]
    pub tags: Vec<String>,
    #[serde(rename = "caracteristicas", alias = "features", default)]
    pub features: BTreeMap<String, Value>,

    #[serde(rename = "activo", alias = "active", default, skip_serializing_if = "Option::is_none")]
    pub active: Option<Value>,
    #[serde(rename = "destacado", alias = "featured", default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<Value>,
    #[serde(rename = "en_caliente", alias = "hot", default, skip_serializing_if = "Option::is_none")]
    pub hot: Option<Value>,
}

impl IncomingListing {
    pub fn new(reference: i64) -> Self {
        Self {
            reference: Some(reference),
            ..Default::default()
        }
    }

    /// Decode a single raw feed record
    pub fn from_value(raw: Value) -> Result<Self> {
        serde_json::from_value(raw).map_err(|e| SyncError::Validation(e.to_string()))
    }

    /// Whether the feed tried to set any moderation flag
    pub fn carries_flags(&self) -> bool {
        self.active.is_some() || self.featured.is_some() || self.hot.is_some()
    }

    /// Check the record can be reconciled and return its reference
    pub fn validate(&self) -> Result<i64> {
        let reference = self
            .reference
            .ok_or_else(|| SyncError::Validation("missing ref".to_string()))?;
        if reference <= 0 {
            return Err(SyncError::Validation(format!(
                "ref must be positive, got {}",
                reference
            )));
        }

        let decimals = [
            ("area_construida", self.built_area),
            ("area_privada", self.private_area),
            ("area_terreno", self.land_area),
            ("area", self.area),
            ("precio_venta", self.sale_price),
            ("precio_canon", self.rent_price),
            ("precio_administracion", self.admin_fee),
            ("precio_total", self.total_price),
        ];
        for (field, value) in decimals {
            if matches!(value, Some(v) if v.is_sign_negative() && !v.is_zero()) {
                return Err(SyncError::Validation(format!(
                    "{} must not be negative for ref {}",
                    field, reference
                )));
            }
        }

        let counts = [
            ("habitaciones", self.rooms),
            ("banos", self.bathrooms),
            ("garajes", self.garages),
            ("estrato", self.stratum),
        ];
        for (field, value) in counts {
            if matches!(value, Some(v) if v < 0) {
                return Err(SyncError::Validation(format!(
                    "{} must not be negative for ref {}",
                    field, reference
                )));
            }
        }

        if self.images.iter().any(|img| img.url.trim().is_empty()) {
            return Err(SyncError::Validation(format!(
                "image with empty url for ref {}",
                reference
            )));
        }

        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_decode_source_field_names() {
        let record = IncomingListing::from_value(json!({
            "ref": 1001,
            "codigo_sincronizacion": "SYN-1001",
            "titulo": "Casa campestre",
            "ciudad": "Rionegro",
            "habitaciones": 4,
            "precio_venta": "850000000.00",
            "area": 320.5,
            "imagenes": [{"url": "https://cdn.example.com/a.jpg", "orden": 0}],
            "etiquetas": ["Oportunidad"],
            "destacado": 0
        }))
        .unwrap();

        assert_eq!(record.reference, Some(1001));
        assert_eq!(record.sync_code.as_deref(), Some("SYN-1001"));
        assert_eq!(record.rooms, Some(4));
        assert_eq!(record.sale_price, Some(Decimal::from(850_000_000)));
        assert_eq!(record.area, Some(Decimal::from_str("320.5").unwrap()));
        assert_eq!(record.images[0].order, Some(0));
        assert!(record.carries_flags());
    }

    #[test]
    fn test_decode_english_aliases() {
        let record = IncomingListing::from_value(json!({
            "ref": 7,
            "title": "Loft",
            "rooms": 1,
            "images": [{"url": "https://cdn.example.com/x.jpg"}]
        }))
        .unwrap();
        assert_eq!(record.title.as_deref(), Some("Loft"));
        assert_eq!(record.images[0].order, None);
        assert!(!record.carries_flags());
    }

    #[test]
    fn test_malformed_numeric_is_validation_error() {
        let err = IncomingListing::from_value(json!({"ref": 3, "habitaciones": "tres"})).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let err = IncomingListing::from_value(json!({"ref": 3, "fecha_creacion": "ayer"})).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            IncomingListing::default().validate(),
            Err(SyncError::Validation(_))
        ));
        assert!(IncomingListing::new(0).validate().is_err());
        assert_eq!(IncomingListing::new(12).validate().unwrap(), 12);

        let mut negative = IncomingListing::new(12);
        negative.rent_price = Some(Decimal::from(-1));
        assert!(negative.validate().is_err());

        let mut blank_image = IncomingListing::new(12);
        blank_image.images.push(IncomingImage::new("  ", 0));
        assert!(blank_image.validate().is_err());
    }
}
