//! Tidemark Test Utilities
//!
//! Shared test infrastructure for the Tidemark workspace:
//! - Proptest generators for times, granularities, prefixes and configs
//! - Record-type fixtures and a controllable clock
//! - Assertions over Tidemark results
//! - Tracing setup for tests

// Re-export in-memory backends from their source crate
pub use tidemark_catalog::{FailureInjection, InMemoryCatalog, InMemoryObjectStore};

// Re-export core types for convenience
pub use tidemark_core::{
    CatalogErrorKind, Clock, Column, DataCategory, EngineConfig, Granularity, PartitionKey,
    RetryConfig, Timestamp, TidemarkError, TidemarkResult,
};

use chrono::Utc;

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`. Safe to call from every test; only the first call
/// installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tidemark values.

    use super::*;
    use proptest::prelude::*;

    /// Generate a Timestamp between 1970 and 2100, second precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (0i64..4_102_444_800i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_granularity() -> impl Strategy<Value = Granularity> {
        prop_oneof![Just(Granularity::Hourly), Just(Granularity::Daily)]
    }

    pub fn arb_data_category() -> impl Strategy<Value = DataCategory> {
        prop_oneof![Just(DataCategory::Logs), Just(DataCategory::RuleMatches)]
    }

    /// Generate a storage prefix `s3://<bucket>/<category>/<table>`.
    pub fn arb_prefix() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9-]{2,20}", arb_data_category(), "[A-Za-z][A-Za-z0-9_]{0,30}").prop_map(
            |(bucket, category, table)| format!("s3://{}/{}/{}", bucket, category.path_segment(), table),
        )
    }

    /// Generate a valid RetryConfig.
    pub fn arb_retry_config() -> impl Strategy<Value = RetryConfig> {
        (0u32..10, 1u64..1000, 1000u64..60_000, 1.0f64..5.0, 1u64..600_000).prop_map(
            |(max_retries, initial_backoff_ms, max_backoff_ms, backoff_multiplier, max_elapsed_ms)| {
                RetryConfig {
                    max_retries,
                    initial_backoff_ms,
                    max_backoff_ms,
                    backoff_multiplier,
                    max_elapsed_ms,
                }
            },
        )
    }

    /// Generate a valid EngineConfig.
    pub fn arb_valid_config() -> impl Strategy<Value = EngineConfig> {
        (
            "[a-z][a-z0-9_]{0,20}",
            "[a-z][a-z0-9_]{0,20}",
            prop_oneof![Just(32u32), Just(64u32)],
            4usize..1024,
            arb_retry_config(),
        )
            .prop_map(
                |(logs_database, rule_matches_database, native_int_width, max_comment_length, retry)| {
                    EngineConfig {
                        logs_database,
                        rule_matches_database,
                        native_int_width,
                        max_comment_length,
                        retry,
                    }
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built record types and helpers for common scenarios.

    use super::*;
    use std::sync::Mutex;
    use tidemark_schema::{identities, Field, Primitive, RecordType, TypeDesc};

    /// `{Col1: int32}` with the description "test field".
    pub fn test_event_record() -> RecordType {
        RecordType::new("TestEvent").field(Field::new("Col1", Primitive::Int32).description("test field"))
    }

    /// A record with an embedded header, a nested struct, a sequence, a
    /// mapping and a custom timestamp.
    pub fn nested_event_record() -> RecordType {
        let header = RecordType::new("Header")
            .field(Field::new("EventTime", TypeDesc::named(identities::TIMESTAMP_RFC3339, Primitive::String.into()))
                .rename("eventTime")
                .description("Event time")
                .required())
            .field(Field::new("Source", Primitive::String).description("Event source"));
        let geo = RecordType::new("Geo")
            .field(Field::new("Lat", Primitive::Float64))
            .field(Field::new("Lon", Primitive::Float64));

        RecordType::new("NestedEvent")
            .field(Field::embedded(header))
            .field(Field::new("Geo", geo).description("Location"))
            .field(Field::new("Tags", TypeDesc::sequence(Primitive::String.into())).description("Tags"))
            .field(
                Field::new("Counts", TypeDesc::mapping(Primitive::String, Primitive::Int64.into()))
                    .description("Counters"),
            )
            .field(Field::new("Secret", Primitive::String).unexported())
    }

    /// A record holding a complex number, which has no catalog type.
    pub fn unmappable_record() -> RecordType {
        RecordType::new("BadEvent").field(Field::new("Col1", Primitive::Complex64).description("test field"))
    }

    /// A config with retries disabled.
    pub fn minimal_config() -> EngineConfig {
        EngineConfig {
            retry: RetryConfig::disabled(),
            ..EngineConfig::default()
        }
    }

    /// A clock that only moves when told to.
    #[derive(Debug)]
    pub struct FixedClock {
        now: Mutex<Timestamp>,
    }

    impl FixedClock {
        pub fn new(now: Timestamp) -> Self {
            Self { now: Mutex::new(now) }
        }

        pub fn set(&self, now: Timestamp) {
            if let Ok(mut guard) = self.now.lock() {
                *guard = now;
            }
        }

        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut guard) = self.now.lock() {
                *guard += by;
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            self.now.lock().map(|guard| *guard).unwrap_or_else(|e| *e.into_inner())
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over Tidemark results.

    use super::*;

    /// Assert the error came from the catalog with the given kind.
    pub fn assert_catalog_kind<T: std::fmt::Debug>(result: &TidemarkResult<T>, kind: CatalogErrorKind) {
        match result {
            Err(e) => assert_eq!(e.catalog_kind(), Some(kind), "Wrong catalog error: {:?}", e),
            Ok(v) => panic!("Expected catalog error {:?}, got Ok({:?})", kind, v),
        }
    }

    /// Assert the catalog holds exactly `expected` partition values.
    pub fn assert_partitions(catalog: &InMemoryCatalog, database: &str, table: &str, expected: &[PartitionKey]) {
        let mut wanted: Vec<Vec<String>> = expected.iter().map(PartitionKey::values).collect();
        wanted.sort();
        assert_eq!(catalog.partition_values(database, table), wanted, "Partition set mismatch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use tidemark_schema::{infer_columns, CustomTypeRegistry};

    #[test]
    fn test_fixed_clock_moves_on_demand() {
        let t = Utc.with_ymd_and_hms(2020, 1, 3, 1, 1, 1).unwrap();
        let clock = fixtures::FixedClock::new(t);
        assert_eq!(clock.now(), t);
        clock.advance(chrono::Duration::hours(2));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2020, 1, 3, 3, 1, 1).unwrap());
    }

    #[test]
    fn test_fixture_records_infer() {
        let registry = CustomTypeRegistry::standard();
        let config = fixtures::minimal_config();
        assert_eq!(infer_columns(&fixtures::test_event_record(), &registry, &config).unwrap().len(), 1);
        let nested = infer_columns(&fixtures::nested_event_record(), &registry, &config).unwrap();
        let names: Vec<_> = nested.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["eventTime", "Source", "Geo", "Tags", "Counts"]);
        assert!(infer_columns(&fixtures::unmappable_record(), &registry, &config).is_err());
    }

    proptest! {
        #[test]
        fn prop_generated_configs_validate(config in generators::arb_valid_config()) {
            prop_assert!(config.validate().is_ok());
        }
    }
}
