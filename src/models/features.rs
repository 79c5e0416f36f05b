use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Declared type of a feature definition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    #[serde(alias = "texto")]
    Text,
    #[serde(alias = "numerico")]
    Numeric,
    #[serde(alias = "booleano")]
    Boolean,
}

impl FeatureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureKind::Text => "text",
            FeatureKind::Numeric => "numeric",
            FeatureKind::Boolean => "boolean",
        }
    }
}

impl FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "texto" => Ok(FeatureKind::Text),
            "numeric" | "numerico" => Ok(FeatureKind::Numeric),
            "boolean" | "booleano" => Ok(FeatureKind::Boolean),
            other => Err(format!("unknown feature kind '{}'", other)),
        }
    }
}

/// Typed value of a listing feature. Only the variant matching the
/// definition's kind is ever constructed for that definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FeatureValue {
    Text(String),
    Numeric(Decimal),
    Boolean(bool),
}

impl FeatureValue {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureValue::Text(_) => FeatureKind::Text,
            FeatureValue::Numeric(_) => FeatureKind::Numeric,
            FeatureValue::Boolean(_) => FeatureKind::Boolean,
        }
    }

    /// Coerce a raw feed value into the slot the definition declares.
    /// Returns `None` when the value cannot represent that kind.
    pub fn coerce(kind: FeatureKind, raw: &Value) -> Option<Self> {
        match kind {
            FeatureKind::Text => match raw {
                Value::String(s) if !s.trim().is_empty() => Some(FeatureValue::Text(s.trim().to_string())),
                Value::Number(n) => Some(FeatureValue::Text(n.to_string())),
                Value::Bool(b) => Some(FeatureValue::Text(b.to_string())),
                _ => None,
            },
            FeatureKind::Numeric => match raw {
                Value::Number(n) => Decimal::from_str(&n.to_string())
                    .or_else(|_| Decimal::from_scientific(&n.to_string()))
                    .ok()
                    .map(|d| FeatureValue::Numeric(d.normalize())),
                Value::String(s) => Decimal::from_str(s.trim().replace(',', ".").as_str())
                    .ok()
                    .map(|d| FeatureValue::Numeric(d.normalize())),
                _ => None,
            },
            FeatureKind::Boolean => match raw {
                Value::Bool(b) => Some(FeatureValue::Boolean(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(FeatureValue::Boolean(false)),
                    Some(1) => Some(FeatureValue::Boolean(true)),
                    _ => None,
                },
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "1" | "true" | "si" | "sí" | "yes" => Some(FeatureValue::Boolean(true)),
                    "0" | "false" | "no" => Some(FeatureValue::Boolean(false)),
                    _ => None,
                },
                _ => None,
            },
        }
    }

    /// Split into the (text, numeric, boolean) storage columns
    pub fn columns(&self) -> (Option<String>, Option<String>, Option<bool>) {
        match self {
            FeatureValue::Text(s) => (Some(s.clone()), None, None),
            FeatureValue::Numeric(d) => (None, Some(d.to_string()), None),
            FeatureValue::Boolean(b) => (None, None, Some(*b)),
        }
    }

    /// Rebuild from storage columns, reading only the declared slot
    pub fn from_columns(
        kind: FeatureKind,
        text: Option<String>,
        numeric: Option<String>,
        boolean: Option<bool>,
    ) -> Option<Self> {
        match kind {
            FeatureKind::Text => text.map(FeatureValue::Text),
            FeatureKind::Numeric => numeric
                .and_then(|n| Decimal::from_str(&n).ok())
                .map(FeatureValue::Numeric),
            FeatureKind::Boolean => boolean.map(FeatureValue::Boolean),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Text(s) => write!(f, "{}", s),
            FeatureValue::Numeric(d) => write!(f, "{}", d),
            FeatureValue::Boolean(true) => write!(f, "Sí"),
            FeatureValue::Boolean(false) => write!(f, "No"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureDefinition {
    pub id: i64,
    pub name: String,
    pub kind: FeatureKind,
    pub unit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingFeature {
    pub definition: FeatureDefinition,
    pub value: FeatureValue,
}

impl fmt::Display for ListingFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.definition.name, self.value)
    }
}
