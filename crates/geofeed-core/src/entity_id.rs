//! Entity ID type representing a domain.object_id pair

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ExternalId, GEO_LOCATION_DOMAIN};

/// Identifier of a host-framework entity (e.g. "geo_location.fire_1234")
///
/// The object_id is always a slug: lowercase alphanumeric runs separated by
/// single underscores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Build an entity ID in the geo_location domain from an external id
    pub fn geo_location(external_id: &ExternalId) -> Self {
        Self {
            domain: GEO_LOCATION_DOMAIN.to_string(),
            object_id: slugify(external_id.as_str()),
        }
    }

    /// A variant of this id with a numeric suffix on the object_id
    ///
    /// Used to disambiguate distinct external ids that collapse to the
    /// same slug (e.g. "fire-1" and "fire.1").
    pub fn with_suffix(&self, n: u32) -> Self {
        Self {
            domain: self.domain.clone(),
            object_id: format!("{}_{}", self.object_id, n),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

/// Collapse an arbitrary string into a valid object_id slug
fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut last_was_sep = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        match s.split_once('.') {
            Some((domain, object_id)) => Self {
                domain: domain.to_string(),
                object_id: object_id.to_string(),
            },
            None => Self {
                domain: GEO_LOCATION_DOMAIN.to_string(),
                object_id: slugify(&s),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_location_slug() {
        let id = EntityId::geo_location(&ExternalId::new("NSW Fire #42/a"));
        assert_eq!(id.domain(), "geo_location");
        assert_eq!(id.object_id(), "nsw_fire_42_a");
        assert_eq!(id.to_string(), "geo_location.nsw_fire_42_a");
    }

    #[test]
    fn test_slug_collapses_runs() {
        assert_eq!(slugify("a--b__c  d"), "a_b_c_d");
        assert_eq!(slugify("---"), "unnamed");
        assert_eq!(slugify("Trailing!"), "trailing");
    }

    #[test]
    fn test_with_suffix() {
        let id = EntityId::geo_location(&ExternalId::new("fire-1"));
        assert_eq!(id.with_suffix(2).to_string(), "geo_location.fire_1_2");
        assert_eq!(id.with_suffix(2).domain(), "geo_location");
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = EntityId::geo_location(&ExternalId::new("quake-7"));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"geo_location.quake_7\"");
        let parsed: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
