//! Core types for the geo feed entity manager
//!
//! This crate provides the fundamental types shared by every other crate in
//! the workspace: ExternalId, ExternalRecord, Geometry, EntityId, and the
//! feed configuration surface.

mod config;
mod entity_id;
mod geometry;
mod record;

pub use config::{ConfigError, CustomAttributeDef, CustomFilterDef, FeedConfig, Pattern};
pub use entity_id::EntityId;
pub use geometry::{Geometry, LatLon};
pub use record::{ExternalId, ExternalRecord};

/// Entity domain used for all feed-managed entities
pub const GEO_LOCATION_DOMAIN: &str = "geo_location";

/// Attribute key for the upstream identifier
pub const ATTR_EXTERNAL_ID: &str = "external_id";

/// Attribute key for the record title
pub const ATTR_TITLE: &str = "title";

/// Attribute key for latitude
pub const ATTR_LATITUDE: &str = "latitude";

/// Attribute key for longitude
pub const ATTR_LONGITUDE: &str = "longitude";

/// Attribute key for the record category
pub const ATTR_CATEGORY: &str = "category";

/// Attribute key for the record publication date
pub const ATTR_PUBLICATION_DATE: &str = "publication_date";

/// Attribute key for the distance from home in kilometers
pub const ATTR_DISTANCE: &str = "distance";
