//! Tidemark Core - Shared Types
//!
//! Data types shared by every Tidemark crate: catalog columns, time
//! granularity, partition keys, data categories and the clock seam.
//! This crate contains no catalog I/O.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod config;
pub mod error;

pub use config::{EngineConfig, RetryConfig};
pub use error::{
    CatalogError, CatalogErrorKind, CatalogResult, ConfigError, PartitionKeyParseError,
    SchemaError, SyncError, TableError, TidemarkError, TidemarkResult,
};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Catalog type used for every partition key column.
pub const PARTITION_KEY_TYPE: &str = "int";

/// Suffix appended to comments clipped to the maximum comment length.
pub const COMMENT_ELLIPSIS: &str = "...";

// ============================================================================
// COLUMN
// ============================================================================

/// A catalog column.
///
/// `column_type` is a catalog type expression such as `bigint` or
/// `array<struct<name:string>>`. `required` documents the source field and is
/// never sent to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(skip)]
    pub required: bool,
}

impl Column {
    /// Create an optional column.
    pub fn new(
        name: impl Into<String>,
        column_type: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            comment: comment.into(),
            required: false,
        }
    }

    /// Mark the column as required.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// Trim a column comment and clip it to `max_len` characters.
///
/// Clipped comments keep `max_len` characters in total, the last three being
/// [`COMMENT_ELLIPSIS`].
pub fn clip_comment(comment: &str, max_len: usize) -> String {
    let trimmed = comment.trim();
    if trimmed.chars().count() <= max_len {
        return trimmed.to_string();
    }
    let keep = max_len.saturating_sub(COMMENT_ELLIPSIS.len());
    let mut clipped: String = trimmed.chars().take(keep).collect();
    clipped.push_str(COMMENT_ELLIPSIS);
    clipped
}

// ============================================================================
// GRANULARITY
// ============================================================================

/// Time bucketing unit for table partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Hourly,
    Daily,
}

impl Granularity {
    /// Names of the partition key fields, in location order.
    pub fn key_fields(&self) -> &'static [&'static str] {
        match self {
            Granularity::Hourly => &["year", "month", "day", "hour"],
            Granularity::Daily => &["year", "month", "day"],
        }
    }

    /// Partition key columns declared on catalog tables of this granularity.
    pub fn partition_columns(&self) -> Vec<Column> {
        self.key_fields()
            .iter()
            .map(|field| {
                Column::new(
                    *field,
                    PARTITION_KEY_TYPE,
                    format!("{} of the event time (UTC)", field),
                )
            })
            .collect()
    }

    /// Length of one bucket.
    pub fn bucket_len(&self) -> Duration {
        match self {
            Granularity::Hourly => Duration::hours(1),
            Granularity::Daily => Duration::days(1),
        }
    }

    /// Start of the bucket containing `t`.
    pub fn truncate(&self, t: Timestamp) -> Timestamp {
        let hour = match self {
            Granularity::Hourly => t.hour(),
            Granularity::Daily => 0,
        };
        t.date_naive()
            .and_hms_opt(hour, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(t)
    }

    /// Start of the bucket following the one containing `t`.
    pub fn next(&self, t: Timestamp) -> Timestamp {
        self.truncate(t) + self.bucket_len()
    }

    /// Every bucket start from the bucket holding `start` through the bucket
    /// holding `end`, inclusive. Empty when `start` is after `end`.
    pub fn buckets(&self, start: Timestamp, end: Timestamp) -> Vec<Timestamp> {
        let last = self.truncate(end);
        let mut bucket = self.truncate(start);
        let mut out = Vec::new();
        while bucket <= last {
            out.push(bucket);
            bucket = self.next(bucket);
        }
        out
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            _ => Err(ConfigError::InvalidValue {
                field: "granularity".to_string(),
                value: s.to_string(),
                reason: "expected hourly or daily".to_string(),
            }),
        }
    }
}

// ============================================================================
// PARTITION KEY
// ============================================================================

/// Calendar fields of a partition, truncated to the table's granularity.
///
/// `hour` is present exactly when the key is hourly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: Option<u32>,
}

impl PartitionKey {
    /// Key of the bucket containing `t`.
    pub fn from_time(t: Timestamp, granularity: Granularity) -> Self {
        Self {
            year: t.year(),
            month: t.month(),
            day: t.day(),
            hour: match granularity {
                Granularity::Hourly => Some(t.hour()),
                Granularity::Daily => None,
            },
        }
    }

    pub fn granularity(&self) -> Granularity {
        if self.hour.is_some() {
            Granularity::Hourly
        } else {
            Granularity::Daily
        }
    }

    /// Zero-padded partition values in key order, as stored in the catalog.
    pub fn values(&self) -> Vec<String> {
        let mut values = vec![
            format!("{:04}", self.year),
            format!("{:02}", self.month),
            format!("{:02}", self.day),
        ];
        if let Some(hour) = self.hour {
            values.push(format!("{:02}", hour));
        }
        values
    }

    /// `field=value` path segments in key order.
    pub fn segments(&self) -> Vec<String> {
        self.granularity()
            .key_fields()
            .iter()
            .zip(self.values())
            .map(|(field, value)| format!("{}={}", field, value))
            .collect()
    }

    /// Start time of the bucket this key names.
    pub fn start_time(&self) -> Option<Timestamp> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_opt(self.hour.unwrap_or(0), 0, 0)
            .map(|naive| naive.and_utc())
    }

    /// Parse `year=YYYY/month=MM/day=DD[/hour=HH]` (no leading or trailing
    /// slash) for the given granularity.
    pub fn parse_path(path: &str, granularity: Granularity) -> Result<Self, PartitionKeyParseError> {
        let fields = granularity.key_fields();
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() != fields.len() {
            return Err(PartitionKeyParseError::SegmentCount {
                expected: fields.len(),
                got: segments.len(),
            });
        }

        let mut values = Vec::with_capacity(fields.len());
        for (field, segment) in fields.iter().zip(&segments) {
            let value = segment
                .strip_prefix(field)
                .and_then(|rest| rest.strip_prefix('='))
                .ok_or_else(|| PartitionKeyParseError::UnexpectedSegment {
                    expected: field.to_string(),
                    segment: segment.to_string(),
                })?;
            values.push((*field, value));
        }

        let key = Self {
            year: parse_field(values[0])?,
            month: parse_field(values[1])?,
            day: parse_field(values[2])?,
            hour: values.get(3).copied().map(parse_field).transpose()?,
        };
        if key.start_time().is_none() || key.hour.is_some_and(|h| h > 23) {
            return Err(PartitionKeyParseError::InvalidDate {
                path: path.to_string(),
            });
        }
        Ok(key)
    }
}

/// Parse one `field=value` value into the field's integer type.
fn parse_field<T: FromStr>((field, value): (&str, &str)) -> Result<T, PartitionKeyParseError> {
    value.parse().map_err(|_| PartitionKeyParseError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments().join("/"))
    }
}

// ============================================================================
// DATA CATEGORY
// ============================================================================

/// Kind of data a table holds; decides its storage path segment and default
/// database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataCategory {
    /// Normalized log events
    Logs,
    /// Events that matched a detection rule
    RuleMatches,
}

impl DataCategory {
    /// Path segment under the bucket root.
    pub fn path_segment(&self) -> &'static str {
        match self {
            DataCategory::Logs => "logs",
            DataCategory::RuleMatches => "rules",
        }
    }

    /// Database this category lands in unless a table overrides it.
    pub fn database<'a>(&self, config: &'a EngineConfig) -> &'a str {
        match self {
            DataCategory::Logs => &config.logs_database,
            DataCategory::RuleMatches => &config.rule_matches_database,
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "now" for sync runs.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

// ============================================================================
// TESTS
// ============================================================================
