//! Normalized external record type
//!
//! Every vendor feed adapter produces records in this single shape, so the
//! reconciliation engine never deals with vendor-specific payloads.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Geometry;

/// Stable identity of an external record
///
/// Two records represent the same entity iff their ExternalIds are equal;
/// value-equality of other fields never matters for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExternalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExternalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One item from the upstream feed for one poll tick
///
/// Constructed fresh on every poll by the record source; the engine only
/// retains records inside the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    /// Stable identity, the reconciliation key
    pub external_id: ExternalId,

    /// Human-readable title
    pub title: String,

    /// Point or polygon location
    pub geometry: Geometry,

    /// Category reported by the feed (e.g. "Bush Fire", "Earthquake")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// When the upstream event was published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<DateTime<Utc>>,

    /// Source-specific fields (status, magnitude, size, fire, ...)
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl ExternalRecord {
    pub fn new(external_id: impl Into<ExternalId>, title: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            geometry,
            category: None,
            publication_date: None,
            properties: HashMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_publication_date(mut self, date: DateTime<Utc>) -> Self {
        self.publication_date = Some(date);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Uniform string access to a field by name
    ///
    /// Resolves the well-known fields first, then the property bag. Used by
    /// regex-driven attribute extraction and custom filters, which operate
    /// on field names from configuration.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "external_id" => Some(self.external_id.to_string()),
            "title" => Some(self.title.clone()),
            "category" => self.category.clone(),
            "publication_date" => self.publication_date.map(|d| d.to_rfc3339()),
            _ => self.properties.get(name).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LatLon;
    use serde_json::json;

    fn record() -> ExternalRecord {
        ExternalRecord::new("1234", "Bush Fire A", Geometry::Point(LatLon::new(-33.0, 150.0)))
            .with_category("Bush Fire")
            .with_property("status", json!("Under control"))
            .with_property("size", json!(120))
    }

    #[test]
    fn test_field_well_known() {
        let r = record();
        assert_eq!(r.field("external_id").as_deref(), Some("1234"));
        assert_eq!(r.field("title").as_deref(), Some("Bush Fire A"));
        assert_eq!(r.field("category").as_deref(), Some("Bush Fire"));
    }

    #[test]
    fn test_field_publication_date() {
        let date = chrono::DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let r = record().with_publication_date(date);
        assert_eq!(
            r.field("publication_date").as_deref(),
            Some("2024-06-01T12:00:00+00:00")
        );
        // Absent date resolves to no field, not an empty string
        assert_eq!(record().field("publication_date"), None);
    }

    #[test]
    fn test_field_properties() {
        let r = record();
        assert_eq!(r.field("status").as_deref(), Some("Under control"));
        // Non-string properties are rendered as JSON text
        assert_eq!(r.field("size").as_deref(), Some("120"));
        assert_eq!(r.field("missing"), None);
    }

    #[test]
    fn test_identity_is_external_id_only() {
        let a = ExternalRecord::new("x", "Title 1", Geometry::Point(LatLon::new(0.0, 0.0)));
        let b = ExternalRecord::new("x", "Title 2", Geometry::Point(LatLon::new(1.0, 1.0)));
        assert_eq!(a.external_id, b.external_id);
        assert_ne!(a, b);
    }
}
