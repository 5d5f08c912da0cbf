//! Table descriptors: one logical time-partitioned table bound to a record
//! type, and the table and partition operations against a catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tidemark_catalog::{
    CatalogClient, DatabaseInput, ObjectStore, OptionalExt, PartitionInput, StorageDescriptor,
    TableInput, EXTERNAL_TABLE,
};
use tidemark_core::{
    CatalogResult, Clock, Column, DataCategory, EngineConfig, Granularity, PartitionKey, SchemaError, TableError,
    Timestamp, TidemarkResult,
};
use tidemark_schema::{ensure_unique_columns, CustomTypeRegistry, RecordType, TypeInspector};

use crate::locate::{locate, normalize_prefix};
use crate::sync::{PartitionSyncer, SyncReport};

/// Table parameter naming the data format.
pub const CLASSIFICATION_PARAM: &str = "classification";

// ============================================================================
// TABLE SPEC
// ============================================================================

/// Identity and layout of a table, independent of its record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub category: DataCategory,
    pub name: String,
    pub description: String,
    pub granularity: Granularity,
    /// Overrides the category's database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl TableSpec {
    pub fn new(
        category: DataCategory,
        name: impl Into<String>,
        description: impl Into<String>,
        granularity: Granularity,
    ) -> Self {
        Self {
            category,
            name: name.into(),
            description: description.into(),
            granularity,
            database: None,
        }
    }

    /// Place the table in `database` instead of the category default.
    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

/// A partition as seen through a table descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub database: String,
    pub table: String,
    pub key: PartitionKey,
    pub location: String,
    pub columns: Vec<Column>,
}

// ============================================================================
// TABLE DESCRIPTOR
// ============================================================================

/// A time-partitioned catalog table derived from a record type.
///
/// Columns are inferred at construction, so an invalid record type fails
/// here and never during a sync. The descriptor holds no catalog state;
/// every operation asks the catalog.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    database: String,
    name: String,
    description: String,
    category: DataCategory,
    granularity: Granularity,
    record: RecordType,
    registry: CustomTypeRegistry,
    extra_columns: Vec<Column>,
    config: EngineConfig,
    columns: Vec<Column>,
}

impl TableDescriptor {
    /// Bind `record` to the table described by `spec`.
    ///
    /// `extra_columns` are appended after the inferred ones, e.g.
    /// [`rule_match_columns`](tidemark_schema::rule_match_columns) for rule
    /// match tables.
    pub fn new(
        spec: TableSpec,
        record: RecordType,
        registry: &CustomTypeRegistry,
        extra_columns: Vec<Column>,
        config: &EngineConfig,
    ) -> Result<Self, SchemaError> {
        let database = spec
            .database
            .unwrap_or_else(|| spec.category.database(config).to_string());
        let mut descriptor = Self {
            database,
            name: spec.name,
            description: spec.description,
            category: spec.category,
            granularity: spec.granularity,
            record,
            registry: registry.clone(),
            extra_columns,
            config: config.clone(),
            columns: Vec::new(),
        };
        descriptor.columns = descriptor.compute_columns()?;
        Ok(descriptor)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> DataCategory {
        self.category
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn record(&self) -> &RecordType {
        &self.record
    }

    /// Columns inferred at construction, extra columns included.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn partition_keys(&self) -> Vec<Column> {
        self.granularity.partition_columns()
    }

    /// Table prefix relative to the bucket root: `<category>/<table>`.
    pub fn relative_prefix(&self) -> String {
        format!("{}/{}", self.category.path_segment(), self.name)
    }

    /// Re-infer the column list from the record type.
    pub fn compute_columns(&self) -> Result<Vec<Column>, SchemaError> {
        let mut columns = TypeInspector::new(&self.registry, &self.config).infer_columns(&self.record)?;
        columns.extend(self.extra_columns.iter().cloned());
        ensure_unique_columns(&self.record.name, &columns)?;
        Ok(columns)
    }

    /// Full table definition at `location` with `columns`.
    pub fn table_input(&self, location: &str, columns: Vec<Column>) -> TableInput {
        TableInput {
            name: self.name.clone(),
            description: self.description.clone(),
            table_type: EXTERNAL_TABLE.to_string(),
            parameters: BTreeMap::from([(CLASSIFICATION_PARAM.to_string(), "json".to_string())]),
            partition_keys: self.partition_keys(),
            storage: StorageDescriptor::json(location, columns),
        }
    }

    // === Table Operations ===

    /// Create the database (if needed) and the table under `s3://<bucket>/`.
    ///
    /// Returns `false` when the table already exists. An existing table whose
    /// columns are a prefix of the current ones gets the new columns appended.
    /// Removed or retyped columns, different partition keys or a different
    /// location are an [`TableError::IncompatibleTable`] error.
    pub fn create_table(&self, catalog: &dyn CatalogClient, bucket: &str) -> TidemarkResult<bool> {
        create_database(catalog, &self.database, "Tidemark data lake tables")?;

        let location = format!("s3://{}/{}", bucket, self.relative_prefix());
        let input = self.table_input(&location, self.columns.clone());
        match catalog.create_table(&self.database, &input) {
            Ok(()) => {
                tracing::info!(
                    database = %self.database,
                    table = %self.name,
                    location = %location,
                    columns = self.columns.len(),
                    "Created table"
                );
                Ok(true)
            }
            Err(e) if e.is_already_exists() => {
                let existing = catalog.get_table(&self.database, &self.name)?;
                if self.check_compatible(&existing.definition, &input)? {
                    let location = existing.definition.storage.location.clone();
                    catalog.update_table(&self.database, &self.table_input(&location, self.columns.clone()))?;
                    tracing::info!(
                        database = %self.database,
                        table = %self.name,
                        added = self.columns.len() - existing.definition.storage.columns.len(),
                        "Added columns to existing table"
                    );
                } else {
                    tracing::debug!(database = %self.database, table = %self.name, "Table already exists");
                }
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the table and its partitions. Returns `false` if it was absent.
    pub fn delete_table(&self, catalog: &dyn CatalogClient) -> TidemarkResult<bool> {
        let deleted = catalog
            .delete_table(&self.database, &self.name)
            .optional()?
            .is_some();
        if deleted {
            tracing::info!(database = %self.database, table = %self.name, "Deleted table");
        }
        Ok(deleted)
    }

    /// Storage prefix registered for the table in the catalog, without a
    /// trailing slash.
    pub fn storage_prefix(&self, catalog: &dyn CatalogClient) -> TidemarkResult<String> {
        let table = catalog.get_table(&self.database, &self.name)?;
        self.prefix_of(&table.definition.storage)
    }

    pub(crate) fn prefix_of(&self, storage: &StorageDescriptor) -> TidemarkResult<String> {
        let prefix = normalize_prefix(&storage.location);
        if prefix.is_empty() {
            return Err(TableError::MissingLocation {
                database: self.database.clone(),
                table: self.name.clone(),
            }
            .into());
        }
        Ok(prefix.to_string())
    }

    /// Ok(true) when `wanted` only appends columns to `existing`.
    fn check_compatible(&self, existing: &TableInput, wanted: &TableInput) -> TidemarkResult<bool> {
        let additive = appends_columns(&existing.storage.columns, &wanted.storage.columns);
        let reason = if !additive && !same_columns(&existing.storage.columns, &wanted.storage.columns) {
            Some("column list differs")
        } else if !same_columns(&existing.partition_keys, &wanted.partition_keys) {
            Some("partition keys differ")
        } else if normalize_prefix(&existing.storage.location) != normalize_prefix(&wanted.storage.location) {
            Some("storage location differs")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(TableError::IncompatibleTable {
                database: self.database.clone(),
                table: self.name.clone(),
                reason: reason.to_string(),
            }
            .into()),
            None => Ok(additive),
        }
    }

    // === Partition Operations ===

    /// The partition holding `time`, or `None` if the catalog has none.
    pub fn get_partition(&self, catalog: &dyn CatalogClient, time: Timestamp) -> TidemarkResult<Option<Partition>> {
        let key = PartitionKey::from_time(time, self.granularity);
        let record = catalog
            .get_partition(&self.database, &self.name, &key.values())
            .optional()?;
        Ok(record.map(|record| Partition {
            database: record.database,
            table: record.table,
            key,
            location: record.storage.location,
            columns: record.storage.columns,
        }))
    }

    /// Register the partition holding `time`. Returns `false` if it already
    /// existed.
    pub fn create_partition(&self, catalog: &dyn CatalogClient, time: Timestamp) -> TidemarkResult<bool> {
        let table = catalog.get_table(&self.database, &self.name)?;
        let prefix = self.prefix_of(&table.definition.storage)?;
        let (key, location) = locate(time, self.granularity, &prefix);
        let input = PartitionInput {
            values: key.values(),
            storage: StorageDescriptor::json(location.clone(), self.columns.clone()),
        };

        let created = catalog
            .create_partition(&self.database, &self.name, &input)
            .created()?;
        if created {
            tracing::info!(
                database = %self.database,
                table = %self.name,
                location = %location,
                "Created partition"
            );
        }
        Ok(created)
    }

    /// Remove the partition holding `time`. Returns `false` if it was absent.
    pub fn delete_partition(&self, catalog: &dyn CatalogClient, time: Timestamp) -> TidemarkResult<bool> {
        let key = PartitionKey::from_time(time, self.granularity);
        let deleted = catalog
            .delete_partition(&self.database, &self.name, &key.values())
            .optional()?
            .is_some();
        if deleted {
            tracing::info!(
                database = %self.database,
                table = %self.name,
                partition = %key,
                "Deleted partition"
            );
        }
        Ok(deleted)
    }

    /// Register every partition with data from `start` (or the table's
    /// creation time) through now. See [`PartitionSyncer`].
    pub fn sync_partitions(
        &self,
        catalog: &dyn CatalogClient,
        store: &dyn ObjectStore,
        clock: &dyn Clock,
        start: Option<Timestamp>,
    ) -> TidemarkResult<SyncReport> {
        PartitionSyncer::new(self, catalog, store, clock).run(start)
    }
}

/// `Ok(true)` on success, `Ok(false)` when the entity already existed.
pub(crate) trait CreatedExt {
    fn created(self) -> CatalogResult<bool>;
}

impl CreatedExt for CatalogResult<()> {
    fn created(self) -> CatalogResult<bool> {
        match self {
            Ok(()) => Ok(true),
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Column lists equal by name, type and comment.
///
/// `required` is not stored by the catalog and is ignored.
pub fn same_columns(a: &[Column], b: &[Column]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.name == y.name && x.column_type == y.column_type && x.comment == y.comment
        })
}

/// Whether `wanted` is `existing` with more columns appended.
pub fn appends_columns(existing: &[Column], wanted: &[Column]) -> bool {
    existing.len() < wanted.len() && same_columns(existing, &wanted[..existing.len()])
}

// ============================================================================
// DATABASES
// ============================================================================

/// Create a database. Returns `false` if it already existed.
pub fn create_database(catalog: &dyn CatalogClient, name: &str, description: &str) -> TidemarkResult<bool> {
    let input = DatabaseInput {
        name: name.to_string(),
        description: description.to_string(),
    };
    let created = catalog.create_database(&input).created()?;
    if created {
        tracing::info!(database = %name, "Created database");
    }
    Ok(created)
}

/// Delete a database and its tables. Returns `false` if it was absent.
pub fn delete_database(catalog: &dyn CatalogClient, name: &str) -> TidemarkResult<bool> {
    let deleted = catalog.delete_database(name).optional()?.is_some();
    if deleted {
        tracing::info!(database = %name, "Deleted database");
    }
    Ok(deleted)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tidemark_catalog::{ops, FailureInjection, InMemoryCatalog};
    use tidemark_core::{CatalogErrorKind, TidemarkError};
    use tidemark_schema::{rule_match_columns, Field, Primitive};
    use tidemark_test_utils::fixtures;

    fn descriptor() -> TableDescriptor {
        let spec = TableSpec::new(DataCategory::RuleMatches, "testTable", "test table", Granularity::Hourly);
        TableDescriptor::new(
            spec,
            fixtures::test_event_record(),
            &CustomTypeRegistry::standard(),
            vec![],
            &EngineConfig::default(),
        )
        .unwrap()
    }

    fn t() -> Timestamp {
        Utc.with_ymd_and_hms(2020, 1, 3, 1, 1, 1).unwrap()
    }

    #[test]
    fn test_database_follows_category_unless_overridden() {
        let config = EngineConfig::default();
        let spec = TableSpec::new(DataCategory::Logs, "aws_alb", "ALB logs", Granularity::Daily);
        let d = TableDescriptor::new(
            spec.clone(),
            fixtures::test_event_record(),
            &CustomTypeRegistry::standard(),
            vec![],
            &config,
        )
        .unwrap();
        assert_eq!(d.database(), "lake_logs");
        assert_eq!(d.relative_prefix(), "logs/aws_alb");

        let d = TableDescriptor::new(
            spec.in_database("other"),
            fixtures::test_event_record(),
            &CustomTypeRegistry::standard(),
            vec![],
            &config,
        )
        .unwrap();
        assert_eq!(d.database(), "other");
    }

    #[test]
    fn test_extra_columns_appended() {
        let spec = TableSpec::new(DataCategory::RuleMatches, "t", "t", Granularity::Hourly);
        let d = TableDescriptor::new(
            spec,
            fixtures::test_event_record(),
            &CustomTypeRegistry::standard(),
            rule_match_columns(),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(d.columns().len(), 6);
        assert_eq!(d.columns()[0].name, "Col1");
        assert_eq!(d.columns()[1].name, "p_rule_id");
    }

    #[test]
    fn test_extra_column_clash_is_schema_error() {
        let record = RecordType::new("Clash")
            .field(Field::new("P_Rule_Id", Primitive::String).description("clashes"));
        let spec = TableSpec::new(DataCategory::RuleMatches, "t", "t", Granularity::Hourly);
        let err = TableDescriptor::new(
            spec,
            record,
            &CustomTypeRegistry::standard(),
            rule_match_columns(),
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_table_input_format() {
        let d = descriptor();
        let input = d.table_input("s3://bucket/rules/testTable", d.columns().to_vec());
        assert_eq!(input.table_type, EXTERNAL_TABLE);
        assert_eq!(input.parameters.get(CLASSIFICATION_PARAM).map(String::as_str), Some("json"));
        assert_eq!(input.partition_keys.len(), 4);
        assert_eq!(input.storage.serde.library, tidemark_catalog::JSON_SERDE_LIBRARY);
    }

    #[test]
    fn test_create_table_idempotent() {
        let catalog = InMemoryCatalog::new();
        let d = descriptor();
        assert!(d.create_table(&catalog, "bucket").unwrap());
        assert!(!d.create_table(&catalog, "bucket").unwrap());
        assert_eq!(d.storage_prefix(&catalog).unwrap(), "s3://bucket/rules/testTable");
    }

    #[test]
    fn test_create_table_incompatible() {
        let catalog = InMemoryCatalog::new();
        descriptor().create_table(&catalog, "bucket").unwrap();

        let err = descriptor().create_table(&catalog, "other-bucket").unwrap_err();
        assert!(matches!(
            err,
            TidemarkError::Table(TableError::IncompatibleTable { ref reason, .. }) if reason.contains("location")
        ));
    }

    fn logs_table(record: RecordType) -> TableDescriptor {
        let spec = TableSpec::new(DataCategory::Logs, "t", "t", Granularity::Daily);
        TableDescriptor::new(spec, record, &CustomTypeRegistry::standard(), vec![], &EngineConfig::default())
            .unwrap()
    }

    #[test]
    fn test_create_table_appends_new_columns() {
        let catalog = InMemoryCatalog::new();
        let v1 = RecordType::new("Event").field(Field::new("a", Primitive::Int32).description("a"));
        let v2 = v1.clone().field(Field::new("b", Primitive::String).description("b"));
        assert!(logs_table(v1).create_table(&catalog, "bucket").unwrap());

        let evolved = logs_table(v2);
        assert!(!evolved.create_table(&catalog, "bucket").unwrap());
        let record = catalog.get_table("lake_logs", "t").unwrap();
        assert!(same_columns(&record.definition.storage.columns, evolved.columns()));
        assert_eq!(record.definition.storage.location, "s3://bucket/logs/t");
        assert_eq!(catalog.call_count(ops::UPDATE_TABLE), 1);

        // Already up to date: no further update
        assert!(!evolved.create_table(&catalog, "bucket").unwrap());
        assert_eq!(catalog.call_count(ops::UPDATE_TABLE), 1);
    }

    #[test]
    fn test_create_table_rejects_removed_or_retyped_columns() {
        let catalog = InMemoryCatalog::new();
        let v1 = RecordType::new("Event")
            .field(Field::new("a", Primitive::Int32).description("a"))
            .field(Field::new("b", Primitive::String).description("b"));
        logs_table(v1).create_table(&catalog, "bucket").unwrap();

        let removed = RecordType::new("Event").field(Field::new("a", Primitive::Int32).description("a"));
        let err = logs_table(removed).create_table(&catalog, "bucket").unwrap_err();
        assert!(matches!(err, TidemarkError::Table(TableError::IncompatibleTable { .. })));

        let retyped = RecordType::new("Event")
            .field(Field::new("a", Primitive::Int64).description("a"))
            .field(Field::new("b", Primitive::String).description("b"))
            .field(Field::new("c", Primitive::String).description("c"));
        let err = logs_table(retyped).create_table(&catalog, "bucket").unwrap_err();
        assert!(matches!(err, TidemarkError::Table(TableError::IncompatibleTable { .. })));
        assert_eq!(catalog.call_count(ops::UPDATE_TABLE), 0);
    }

    #[test]
    fn test_appends_columns() {
        let a = Column::new("a", "int", "a");
        let b = Column::new("b", "string", "b");
        assert!(appends_columns(&[a.clone()], &[a.clone(), b.clone()]));
        assert!(!appends_columns(&[a.clone()], &[a.clone()]));
        assert!(!appends_columns(&[b.clone()], &[a, b]));
    }

    #[test]
    fn test_partition_ops_require_table() {
        let catalog = InMemoryCatalog::new();
        let d = descriptor();
        assert!(d.get_partition(&catalog, t()).unwrap().is_none());
        let err = d.create_partition(&catalog, t()).unwrap_err();
        assert_eq!(err.catalog_kind(), Some(CatalogErrorKind::NotFound));
    }

    #[test]
    fn test_create_partition_race_is_not_created() {
        let catalog = InMemoryCatalog::new();
        let d = descriptor();
        d.create_table(&catalog, "bucket").unwrap();
        catalog.inject_failure(FailureInjection::new(ops::CREATE_PARTITION, CatalogErrorKind::AlreadyExists));
        assert!(!d.create_partition(&catalog, t()).unwrap());
    }

    #[test]
    fn test_get_partition_propagates_failures() {
        let catalog = InMemoryCatalog::new();
        let d = descriptor();
        d.create_table(&catalog, "bucket").unwrap();
        catalog.inject_failure(FailureInjection::new(ops::GET_PARTITION, CatalogErrorKind::Permanent));
        assert!(d.get_partition(&catalog, t()).is_err());
    }

    #[test]
    fn test_database_helpers() {
        let catalog = InMemoryCatalog::new();
        assert!(create_database(&catalog, "db", "test").unwrap());
        assert!(!create_database(&catalog, "db", "test").unwrap());
        assert!(delete_database(&catalog, "db").unwrap());
        assert!(!delete_database(&catalog, "db").unwrap());
    }

    #[test]
    fn test_same_columns_ignores_required() {
        let a = vec![Column::new("a", "int", "x").with_required(true)];
        let b = vec![Column::new("a", "int", "x")];
        assert!(same_columns(&a, &b));
        assert!(!same_columns(&a, &[Column::new("a", "bigint", "x")]));
        assert!(!same_columns(&a, &[]));
    }
}
