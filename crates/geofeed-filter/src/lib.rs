//! Distance and attribute filtering for feed records
//!
//! Pure functions computing derived fields from a raw record (distance to
//! home, regex-extracted custom attributes) and the predicate filters that
//! decide whether a record participates in reconciliation at all.

use geofeed_core::{
    CustomAttributeDef, CustomFilterDef, ExternalRecord, FeedConfig, Geometry, LatLon,
};
use tracing::warn;

/// Mean Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Name of the capture group custom attribute regexes must expose
const CAPTURE_GROUP_VALUE: &str = "value";

/// Great-circle distance between two coordinates in kilometers
pub fn haversine(a: LatLon, b: LatLon) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Distance from home to a record's geometry in kilometers
///
/// For a point this is the haversine distance. For a polygon it is the
/// minimum haversine distance from home to any vertex, not the true
/// distance to the polygon boundary. This is a known approximation kept
/// for performance; an empty polygon yields infinity.
pub fn distance_to_geometry(home: LatLon, geometry: &Geometry) -> f64 {
    match geometry {
        Geometry::Point(p) => haversine(home, *p),
        Geometry::Polygon(vertices) => vertices
            .iter()
            .map(|v| haversine(home, *v))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Category allow-list check
///
/// An empty allow-list means no filter is configured and every record
/// passes, whatever its category.
pub fn matches_category(record: &ExternalRecord, allowed_categories: &[String]) -> bool {
    if allowed_categories.is_empty() {
        return true;
    }
    match &record.category {
        Some(category) => allowed_categories.iter().any(|c| c == category),
        None => false,
    }
}

/// Extract a custom attribute value from a record field
///
/// The regex is applied with search semantics, so the pattern may match
/// anywhere in the field. Returns the capture group named `value` if it
/// matched, otherwise an empty string. A missing source field is logged at
/// warning level and yields an empty string; extraction never fails a tick.
pub fn extract_custom_attribute(record: &ExternalRecord, def: &CustomAttributeDef) -> String {
    let Some(value) = record.field(&def.source_field) else {
        warn!(
            external_id = %record.external_id,
            source_field = %def.source_field,
            attribute = %def.name,
            "Record has no such field, custom attribute left empty"
        );
        return String::new();
    };
    def.regex
        .regex()
        .captures(&value)
        .and_then(|caps| caps.name(CAPTURE_GROUP_VALUE))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Apply all configured custom filters to a record
///
/// Each filter regex is anchored at the start of the field value (unlike
/// attribute extraction, which searches anywhere). A record missing the
/// attribute or failing any single filter is rejected; the first failure
/// short-circuits.
pub fn passes_custom_filters(record: &ExternalRecord, filters: &[CustomFilterDef]) -> bool {
    filters.iter().all(|def| {
        record.field(&def.attribute).is_some_and(|value| {
            def.regex
                .regex()
                .find(&value)
                .is_some_and(|m| m.start() == 0)
        })
    })
}

/// Full pre-diff record filter
///
/// A record must be inside the configured radius (when set), carry an
/// allowed category, and pass every custom filter to participate in a
/// reconciliation pass.
pub fn accepts_record(record: &ExternalRecord, config: &FeedConfig) -> bool {
    if let Some(radius) = config.radius_km {
        if distance_to_geometry(config.home, &record.geometry) > radius {
            return false;
        }
    }
    matches_category(record, &config.categories) && passes_custom_filters(record, &config.custom_filters)
}

/// Attributes derived from a record at refresh time
///
/// Recomputed on every proxy refresh from the current snapshot; never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedAttributes {
    /// Distance from home in kilometers
    pub distance_km: f64,
    /// Custom attribute name/value pairs in configuration order
    pub custom: Vec<(String, String)>,
}

impl DerivedAttributes {
    pub fn compute(record: &ExternalRecord, home: LatLon, defs: &[CustomAttributeDef]) -> Self {
        let distance_km = distance_to_geometry(home, &record.geometry);
        let custom = defs
            .iter()
            .map(|def| (def.name.clone(), extract_custom_attribute(record, def)))
            .collect();
        Self { distance_km, custom }
    }
}
