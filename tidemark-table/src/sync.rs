//! Partition synchronization.
//!
//! Reconciles the catalog's partitions for one table against the data in
//! object storage over a time range. A run first brings the table's column
//! list up to date, then walks every bucket in order:
//!
//! ```text
//! Start -> SchemaReconciled -> { Skipped | Created | AlreadyExists | SchemaHealed } x N -> Done
//!                                          \-> FailedAtBucket(k)
//! ```
//!
//! Buckets before a failure stay committed. Re-running with the same start
//! resumes where the failed run stopped.

use serde::{Deserialize, Serialize};
use tidemark_catalog::{CatalogClient, ObjectStore, OptionalExt, PartitionInput, StorageDescriptor};
use tidemark_core::{CatalogResult, Clock, Column, SyncError, Timestamp, TidemarkResult};
use uuid::Uuid;

use crate::descriptor::{same_columns, CreatedExt, TableDescriptor};
use crate::locate::locate;

/// What a run did with one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketOutcome {
    /// No objects under the bucket's location
    Skipped,
    Created,
    /// Registered with the current columns already
    AlreadyExists,
    /// Registered with stale columns, now updated
    SchemaHealed,
}

/// Per-outcome bucket counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub skipped: usize,
    pub created: usize,
    pub already_exists: usize,
    pub schema_healed: usize,
}

impl SyncCounts {
    fn record(&mut self, outcome: BucketOutcome) {
        match outcome {
            BucketOutcome::Skipped => self.skipped += 1,
            BucketOutcome::Created => self.created += 1,
            BucketOutcome::AlreadyExists => self.already_exists += 1,
            BucketOutcome::SchemaHealed => self.schema_healed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.skipped + self.created + self.already_exists + self.schema_healed
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub database: String,
    pub table: String,
    /// First bucket start considered
    pub start: Timestamp,
    /// Clock time the run synced up to
    pub end: Timestamp,
    pub counts: SyncCounts,
    /// Whether the table's column list was updated
    pub schema_updated: bool,
}

/// One sync run over one table.
pub struct PartitionSyncer<'a> {
    table: &'a TableDescriptor,
    catalog: &'a dyn CatalogClient,
    store: &'a dyn ObjectStore,
    clock: &'a dyn Clock,
}

impl<'a> PartitionSyncer<'a> {
    pub fn new(
        table: &'a TableDescriptor,
        catalog: &'a dyn CatalogClient,
        store: &'a dyn ObjectStore,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            table,
            catalog,
            store,
            clock,
        }
    }

    /// Sync every bucket from `start` through the clock's current time.
    ///
    /// Without a start the table's creation time in the catalog is used.
    pub fn run(&self, start: Option<Timestamp>) -> TidemarkResult<SyncReport> {
        let run_id = Uuid::now_v7();
        let span = tracing::info_span!(
            "sync_partitions",
            run_id = %run_id,
            database = %self.table.database(),
            table = %self.table.name(),
        );
        let _enter = span.enter();

        let columns = self.table.compute_columns()?;
        let record = self
            .catalog
            .get_table(self.table.database(), self.table.name())?;
        let prefix = self.table.prefix_of(&record.definition.storage)?;

        let schema_updated = !same_columns(&record.definition.storage.columns, &columns);
        if schema_updated {
            let input = self.table.table_input(&record.definition.storage.location, columns.clone());
            self.catalog.update_table(self.table.database(), &input)?;
            tracing::info!(
                database = %self.table.database(),
                table = %self.table.name(),
                columns = columns.len(),
                "Updated table columns"
            );
        }
        let template = StorageDescriptor::json(prefix.clone(), columns);

        let start = start.unwrap_or(record.created_at);
        let end = self.clock.now();
        let buckets = self.table.granularity().buckets(start, end);
        tracing::debug!(start = %start, end = %end, buckets = buckets.len(), "Syncing partitions");

        let mut counts = SyncCounts::default();
        for (index, bucket) in buckets.into_iter().enumerate() {
            let outcome = self.sync_bucket(&prefix, bucket, &template).map_err(|source| {
                tracing::warn!(
                    index = index,
                    bucket = %bucket,
                    error = %source,
                    "Partition sync failed"
                );
                SyncError::FailedAtBucket { index, bucket, source }
            })?;
            counts.record(outcome);
        }

        tracing::info!(
            created = counts.created,
            healed = counts.schema_healed,
            existing = counts.already_exists,
            skipped = counts.skipped,
            schema_updated = schema_updated,
            "Partition sync complete"
        );
        Ok(SyncReport {
            run_id,
            database: self.table.database().to_string(),
            table: self.table.name().to_string(),
            start,
            end,
            counts,
            schema_updated,
        })
    }

    fn sync_bucket(
        &self,
        prefix: &str,
        bucket: Timestamp,
        template: &StorageDescriptor,
    ) -> CatalogResult<BucketOutcome> {
        let (key, location) = locate(bucket, self.table.granularity(), prefix);
        if !self.store.has_objects(&location)? {
            tracing::debug!(bucket = %bucket, location = %location, "No data, skipping bucket");
            return Ok(BucketOutcome::Skipped);
        }

        let database = self.table.database();
        let table = self.table.name();
        let values = key.values();
        let outcome = match self.catalog.get_partition(database, table, &values).optional()? {
            None => {
                let input = PartitionInput {
                    values,
                    storage: template.relocated(location.clone()),
                };
                if self.catalog.create_partition(database, table, &input).created()? {
                    BucketOutcome::Created
                } else {
                    BucketOutcome::AlreadyExists
                }
            }
            Some(existing) if stale(&existing.storage.columns, &template.columns) => {
                let input = PartitionInput {
                    values: values.clone(),
                    storage: template.relocated(existing.storage.location),
                };
                self.catalog.update_partition(database, table, &values, &input)?;
                BucketOutcome::SchemaHealed
            }
            Some(_) => BucketOutcome::AlreadyExists,
        };

        tracing::debug!(bucket = %bucket, location = %location, outcome = ?outcome, "Synced bucket");
        Ok(outcome)
    }
}

fn stale(registered: &[Column], current: &[Column]) -> bool {
    !same_columns(registered, current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tidemark_catalog::{ops, FailureInjection, InMemoryCatalog, InMemoryObjectStore};
    use tidemark_core::{CatalogErrorKind, DataCategory, EngineConfig, Granularity, TidemarkError};
    use tidemark_schema::CustomTypeRegistry;
    use tidemark_test_utils::fixtures::{self, FixedClock};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2020, 1, 3, 1, 1, 1).unwrap()
    }

    struct Harness {
        catalog: InMemoryCatalog,
        store: InMemoryObjectStore,
        clock: Arc<FixedClock>,
        table: TableDescriptor,
    }

    impl Harness {
        fn new(granularity: Granularity) -> Self {
            let clock = Arc::new(FixedClock::new(t0()));
            let catalog = InMemoryCatalog::with_clock(clock.clone());
            let spec = crate::TableSpec::new(DataCategory::Logs, "events", "events", granularity);
            let table = TableDescriptor::new(
                spec,
                fixtures::test_event_record(),
                &CustomTypeRegistry::standard(),
                vec![],
                &EngineConfig::default(),
            )
            .unwrap();
            table.create_table(&catalog, "bucket").unwrap();
            Self {
                catalog,
                store: InMemoryObjectStore::new(),
                clock,
                table,
            }
        }

        fn put(&self, time: Timestamp) {
            let prefix = self.table.storage_prefix(&self.catalog).unwrap();
            let (_, location) = locate(time, self.table.granularity(), &prefix);
            self.store.put_object(format!("{}data.json.gz", location));
        }

        fn sync(&self, start: Option<Timestamp>) -> TidemarkResult<SyncReport> {
            self.table
                .sync_partitions(&self.catalog, &self.store, self.clock.as_ref(), start)
        }
    }

    #[test]
    fn test_empty_storage_skips_everything() {
        let h = Harness::new(Granularity::Hourly);
        h.clock.set(t0() + Duration::hours(5));
        let report = h.sync(None).unwrap();
        assert_eq!(report.counts.skipped, 6);
        assert_eq!(report.counts.total(), 6);
        assert!(!report.schema_updated);
        assert!(h.catalog.partition_values("lake_logs", "events").is_empty());
    }

    #[test]
    fn test_start_defaults_to_table_creation() {
        let h = Harness::new(Granularity::Daily);
        h.clock.set(t0() + Duration::days(2));
        let report = h.sync(None).unwrap();
        assert_eq!(report.start, t0());
        assert_eq!(report.counts.total(), 3);
    }

    #[test]
    fn test_start_after_now_is_empty() {
        let h = Harness::new(Granularity::Hourly);
        let report = h.sync(Some(t0() + Duration::hours(3))).unwrap();
        assert_eq!(report.counts.total(), 0);
    }

    #[test]
    fn test_creates_only_buckets_with_data() {
        let h = Harness::new(Granularity::Hourly);
        h.put(t0());
        h.put(t0() + Duration::hours(2));
        h.clock.set(t0() + Duration::hours(3));

        let report = h.sync(None).unwrap();
        assert_eq!(report.counts.created, 2);
        assert_eq!(report.counts.skipped, 2);
        assert_eq!(
            h.catalog.partition_values("lake_logs", "events"),
            vec![
                vec!["2020", "01", "03", "01"],
                vec!["2020", "01", "03", "03"],
            ]
        );

        let again = h.sync(None).unwrap();
        assert_eq!(again.counts.created, 0);
        assert_eq!(again.counts.already_exists, 2);
        assert_ne!(again.run_id, report.run_id);
    }

    #[test]
    fn test_stale_schema_is_healed() {
        let h = Harness::new(Granularity::Hourly);
        h.put(t0());

        // An older table definition without comments on its columns
        let mut record = h.catalog.get_table("lake_logs", "events").unwrap().definition;
        for column in &mut record.storage.columns {
            column.comment.clear();
        }
        h.catalog.update_table("lake_logs", &record).unwrap();
        let prefix = h.table.storage_prefix(&h.catalog).unwrap();
        let (key, location) = locate(t0(), Granularity::Hourly, &prefix);
        h.catalog
            .create_partition(
                "lake_logs",
                "events",
                &PartitionInput {
                    values: key.values(),
                    storage: record.storage.relocated(location.clone()),
                },
            )
            .unwrap();

        let report = h.sync(None).unwrap();
        assert!(report.schema_updated);
        assert_eq!(report.counts.schema_healed, 1);

        let table = h.catalog.get_table("lake_logs", "events").unwrap();
        assert!(same_columns(&table.definition.storage.columns, h.table.columns()));
        let partition = h.catalog.get_partition("lake_logs", "events", &key.values()).unwrap();
        assert!(same_columns(&partition.storage.columns, h.table.columns()));
        assert_eq!(partition.storage.location, location);
    }

    #[test]
    fn test_failure_reports_bucket_index() {
        let h = Harness::new(Granularity::Hourly);
        for hour in 0..4 {
            h.put(t0() + Duration::hours(hour));
        }
        h.clock.set(t0() + Duration::hours(3));
        h.catalog.inject_failure(
            FailureInjection::new(ops::CREATE_PARTITION, CatalogErrorKind::Permanent).after(2),
        );

        let err = h.sync(None).unwrap_err();
        match err {
            TidemarkError::Sync(SyncError::FailedAtBucket { index, bucket, ref source }) => {
                assert_eq!(index, 2);
                assert_eq!(bucket, Granularity::Hourly.truncate(t0() + Duration::hours(2)));
                assert_eq!(source.kind, CatalogErrorKind::Permanent);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.catalog.partition_values("lake_logs", "events").len(), 2);

        let resumed = h.sync(None).unwrap();
        assert_eq!(resumed.counts.already_exists, 2);
        assert_eq!(resumed.counts.created, 2);
    }

    #[test]
    fn test_storage_failure_stops_run() {
        let h = Harness::new(Granularity::Daily);
        h.store
            .inject_failure(FailureInjection::new(ops::LIST_OBJECTS, CatalogErrorKind::Transient));
        let err = h.sync(None).unwrap_err();
        assert!(matches!(err, TidemarkError::Sync(SyncError::FailedAtBucket { index: 0, .. })));
        assert_eq!(err.catalog_kind(), Some(CatalogErrorKind::Transient));
    }

    #[test]
    fn test_missing_table_is_catalog_error() {
        let h = Harness::new(Granularity::Daily);
        h.table.delete_table(&h.catalog).unwrap();
        let err = h.sync(None).unwrap_err();
        assert!(matches!(err, TidemarkError::Catalog(ref e) if e.is_not_found()));
    }
}
