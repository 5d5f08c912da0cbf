//! Partition location calculation.
//!
//! A partition lives at `prefix/year=YYYY/month=MM/day=DD[/hour=HH]/`. The
//! mapping is pure and exactly invertible through [`parse_location`].

use tidemark_core::{Granularity, PartitionKey, PartitionKeyParseError, Timestamp};

/// Key and storage location of the bucket containing `time`.
pub fn locate(time: Timestamp, granularity: Granularity, prefix: &str) -> (PartitionKey, String) {
    let key = PartitionKey::from_time(time, granularity);
    let location = location_for(prefix, &key);
    (key, location)
}

/// Storage location of `key` under `prefix`, with a trailing slash.
pub fn location_for(prefix: &str, key: &PartitionKey) -> String {
    format!("{}/{}/", normalize_prefix(prefix), key)
}

/// Recover the partition key from a location produced by [`locate`].
pub fn parse_location(
    prefix: &str,
    location: &str,
    granularity: Granularity,
) -> Result<PartitionKey, PartitionKeyParseError> {
    let prefix = normalize_prefix(prefix);
    let rest = location
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| PartitionKeyParseError::PrefixMismatch {
            prefix: prefix.to_string(),
            location: location.to_string(),
        })?;
    let path = rest
        .strip_suffix('/')
        .ok_or_else(|| PartitionKeyParseError::MissingTrailingSlash {
            location: location.to_string(),
        })?;
    PartitionKey::parse_path(path, granularity)
}

/// Prefix without trailing slashes.
pub(crate) fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim_end_matches('/')
}
