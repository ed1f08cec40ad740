//! Configuration surface consumed by the feed entity manager

use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::LatLon;

/// Default poll interval (matches the upstream integrations' 5 minutes)
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled regex that deserializes from its string form
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| ConfigError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }
}

impl TryFrom<String> for Pattern {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

/// Definition of a regex-extracted custom attribute
///
/// The regex is applied with search semantics (anywhere in the field) and
/// must expose a capture group named `value`.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomAttributeDef {
    /// Attribute name to publish on the entity
    pub name: String,
    /// Record field the value is extracted from
    pub source_field: String,
    /// Pattern with a named group `value`
    pub regex: Pattern,
}

/// Definition of a custom record filter
///
/// The regex is anchored at the start of the field value; a record missing
/// the attribute or failing the match is rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomFilterDef {
    /// Record field the filter applies to
    pub attribute: String,
    /// Pattern that must match at the start of the field value
    pub regex: Pattern,
}

/// Full configuration for one feed entity manager instance
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Home coordinates distances are computed against
    pub home: LatLon,

    /// Poll interval
    #[serde(default = "default_interval", with = "interval_seconds")]
    pub update_interval: Duration,

    /// Only records within this many kilometers of home are considered
    #[serde(default)]
    pub radius_km: Option<f64>,

    /// Category allow-list; empty means allow all
    #[serde(default)]
    pub categories: Vec<String>,

    /// Regex-extracted custom attributes
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttributeDef>,

    /// Custom record filters (ANDed, all must pass)
    #[serde(default)]
    pub custom_filters: Vec<CustomFilterDef>,

    /// Whether a fetch error clears all managed entities
    ///
    /// Defaults to true: for safety-critical feeds it is better to drop
    /// stale alerts than to keep showing an alert that failed to clear.
    #[serde(default = "default_clear_on_error")]
    pub clear_on_error: bool,
}

impl FeedConfig {
    pub fn new(home: LatLon) -> Self {
        Self {
            home,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            radius_km: None,
            categories: Vec::new(),
            custom_attributes: Vec::new(),
            custom_filters: Vec::new(),
            clear_on_error: true,
        }
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_radius_km(mut self, radius: f64) -> Self {
        self.radius_km = Some(radius);
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_custom_attribute(mut self, def: CustomAttributeDef) -> Self {
        self.custom_attributes.push(def);
        self
    }

    pub fn with_custom_filter(mut self, def: CustomFilterDef) -> Self {
        self.custom_filters.push(def);
        self
    }

    pub fn with_clear_on_error(mut self, clear: bool) -> Self {
        self.clear_on_error = clear;
        self
    }
}

fn default_interval() -> Duration {
    DEFAULT_UPDATE_INTERVAL
}

fn default_clear_on_error() -> bool {
    true
}

/// Serde helper mapping `update_interval` to whole seconds in config files
mod interval_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_rejects_invalid_regex() {
        assert!(matches!(
            Pattern::new("(unclosed"),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
home:
  lat: -33.865
  lon: 151.209
update_interval: 120
radius_km: 25.0
categories: ["Bush Fire"]
custom_attributes:
  - name: alert_level
    source_field: title
    regex: "Alert level: (?P<value>\\w+)"
custom_filters:
  - attribute: status
    regex: "Out of control"
"#;
        let config: FeedConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.update_interval, Duration::from_secs(120));
        assert_eq!(config.radius_km, Some(25.0));
        assert_eq!(config.categories, vec!["Bush Fire".to_string()]);
        assert_eq!(config.custom_attributes.len(), 1);
        assert_eq!(config.custom_filters.len(), 1);
        assert!(config.clear_on_error);
    }

    #[test]
    fn test_defaults() {
        let config = FeedConfig::new(LatLon::new(0.0, 0.0));
        assert_eq!(config.update_interval, DEFAULT_UPDATE_INTERVAL);
        assert!(config.categories.is_empty());
        assert!(config.clear_on_error);
    }
}
