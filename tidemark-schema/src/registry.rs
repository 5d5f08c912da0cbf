//! Custom type mappings and standard extra columns.

use serde::{Deserialize, Serialize};
use tidemark_core::Column;

/// Catalog type for timestamps.
pub const TIMESTAMP_TYPE: &str = "timestamp";

/// Identities of the semantic wrapper types known to the standard registry.
pub mod identities {
    pub const TIMESTAMP_RFC3339: &str = "timestamp.RFC3339";
    pub const TIMESTAMP_ANSIC_WITH_TZ: &str = "timestamp.ANSICWithTZ";
    pub const TIMESTAMP_UNIX_MILLIS: &str = "timestamp.UnixMillisecond";
    pub const TIMESTAMP_FLUENTD: &str = "timestamp.Fluentd";
    pub const TIMESTAMP_UNIX_FLOAT: &str = "timestamp.UnixFloat";
    pub const TIMESTAMP_SURICATA: &str = "timestamp.Suricata";
    pub const ANY_STRING: &str = "values.AnyString";
    pub const RAW_JSON: &str = "json.RawMessage";
    pub const BIG_INTEGER: &str = "numerics.Integer";
    pub const BIG_INT64: &str = "numerics.Int64";
}

/// One identity to catalog-type override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomMapping {
    pub from: String,
    pub to: String,
}

impl CustomMapping {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Ordered overrides consulted before generic kind mapping.
/// The first mapping whose identity matches wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTypeRegistry {
    mappings: Vec<CustomMapping>,
}

impl CustomTypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The mappings for the standard semantic wrapper types: every timestamp
    /// format to `timestamp`, multi-valued strings to `array<string>`, raw
    /// JSON to `string`, and big integers to `bigint`.
    pub fn standard() -> Self {
        use identities::*;

        Self::new()
            .with(TIMESTAMP_RFC3339, TIMESTAMP_TYPE)
            .with(TIMESTAMP_ANSIC_WITH_TZ, TIMESTAMP_TYPE)
            .with(TIMESTAMP_UNIX_MILLIS, TIMESTAMP_TYPE)
            .with(TIMESTAMP_FLUENTD, TIMESTAMP_TYPE)
            .with(TIMESTAMP_UNIX_FLOAT, TIMESTAMP_TYPE)
            .with(TIMESTAMP_SURICATA, TIMESTAMP_TYPE)
            .with(ANY_STRING, "array<string>")
            .with(RAW_JSON, "string")
            .with(BIG_INTEGER, "bigint")
            .with(BIG_INT64, "bigint")
    }

    /// Append a mapping (builder style).
    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.push(CustomMapping::new(from, to));
        self
    }

    pub fn push(&mut self, mapping: CustomMapping) {
        self.mappings.push(mapping);
    }

    /// Catalog type for `identity`, first match wins.
    pub fn lookup(&self, identity: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.from == identity)
            .map(|m| m.to.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomMapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl FromIterator<CustomMapping> for CustomTypeRegistry {
    fn from_iter<I: IntoIterator<Item = CustomMapping>>(iter: I) -> Self {
        Self {
            mappings: iter.into_iter().collect(),
        }
    }
}

/// Columns the rules engine appends to rule-match tables.
pub fn rule_match_columns() -> Vec<Column> {
    vec![
        Column::new("p_rule_id", "string", "Rule id"),
        Column::new("p_alert_id", "string", "Alert id"),
        Column::new(
            "p_alert_creation_time",
            TIMESTAMP_TYPE,
            "The time the alert was initially created (first match)",
        ),
        Column::new(
            "p_alert_update_time",
            TIMESTAMP_TYPE,
            "The time the alert last updated (last match)",
        ),
        Column::new(
            "p_rule_tags",
            "array<string>",
            "The tags of the rule that generated this alert",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let registry = CustomTypeRegistry::new()
            .with("my.Time", "timestamp")
            .with("my.Time", "string");
        assert_eq!(registry.lookup("my.Time"), Some("timestamp"));
        assert_eq!(registry.lookup("other"), None);
    }

    #[test]
    fn test_collect_preserves_order() {
        let registry: CustomTypeRegistry = CustomTypeRegistry::standard()
            .iter()
            .filter(|m| m.to == TIMESTAMP_TYPE)
            .cloned()
            .chain([CustomMapping::new("my.Time", "string")])
            .collect();
        let froms: Vec<_> = registry.iter().map(|m| m.from.as_str()).collect();
        assert_eq!(froms.len(), 7);
        assert_eq!(froms[0], identities::TIMESTAMP_RFC3339);
        assert_eq!(froms[6], "my.Time");
        assert_eq!(registry.lookup(identities::RAW_JSON), None);
    }

    #[test]
    fn test_standard_registry() {
        let registry = CustomTypeRegistry::standard();
        assert_eq!(registry.len(), 10);
        assert_eq!(registry.lookup(identities::TIMESTAMP_SURICATA), Some("timestamp"));
        assert_eq!(registry.lookup(identities::ANY_STRING), Some("array<string>"));
        assert_eq!(registry.lookup(identities::BIG_INT64), Some("bigint"));
    }

    #[test]
    fn test_rule_match_columns_documented() {
        let cols = rule_match_columns();
        assert_eq!(cols.len(), 5);
        assert!(cols.iter().all(|c| !c.comment.is_empty()));
        assert!(cols.iter().all(|c| c.name.starts_with("p_")));
    }
}
