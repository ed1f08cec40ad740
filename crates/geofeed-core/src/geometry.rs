//! Geographic primitives for feed records

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// The geometry attached to an external record
///
/// Most feeds report a single point; fire-perimeter style feeds report a
/// polygon as an ordered list of vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "snake_case")]
pub enum Geometry {
    Point(LatLon),
    Polygon(Vec<LatLon>),
}

impl Geometry {
    /// A representative coordinate for the geometry
    ///
    /// For a polygon this is the centroid of its vertices, which is what
    /// gets reported as the entity's latitude/longitude.
    pub fn representative_point(&self) -> Option<LatLon> {
        match self {
            Geometry::Point(p) => Some(*p),
            Geometry::Polygon(vertices) => {
                if vertices.is_empty() {
                    return None;
                }
                let n = vertices.len() as f64;
                let lat = vertices.iter().map(|v| v.lat).sum::<f64>() / n;
                let lon = vertices.iter().map(|v| v.lon).sum::<f64>() / n;
                Some(LatLon::new(lat, lon))
            }
        }
    }
}
