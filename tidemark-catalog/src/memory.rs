//! In-memory catalog and object store.
//!
//! Behaves like the external catalog for the operations the engine uses,
//! including `NotFound` / `AlreadyExists` semantics, and supports injecting
//! failures into specific operations.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tidemark_core::{CatalogError, CatalogErrorKind, CatalogResult, Clock, SystemClock};

use crate::{
    ops, CatalogClient, DatabaseInput, DatabaseRecord, ObjectStore, PartitionInput, PartitionRecord,
    TableInput, TableRecord,
};

type TableId = (String, String);
type PartitionId = (String, String, Vec<String>);

// ============================================================================
// FAILURE INJECTION
// ============================================================================

/// Make calls of one operation fail.
///
/// The first `skip` calls succeed, then the next `count` calls fail with
/// `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureInjection {
    pub operation: String,
    pub kind: CatalogErrorKind,
    pub skip: usize,
    pub count: usize,
}

impl FailureInjection {
    /// Fail the next call of `operation`.
    pub fn new(operation: impl Into<String>, kind: CatalogErrorKind) -> Self {
        Self {
            operation: operation.into(),
            kind,
            skip: 0,
            count: 1,
        }
    }

    /// Let `skip` calls through first.
    pub fn after(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Fail `count` calls.
    pub fn times(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

#[derive(Debug, Default)]
struct Injector {
    plans: Mutex<Vec<FailureInjection>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl Injector {
    fn inject(&self, plan: FailureInjection) {
        if let Ok(mut plans) = self.plans.lock() {
            plans.push(plan);
        }
    }

    fn clear(&self) {
        if let Ok(mut plans) = self.plans.lock() {
            plans.clear();
        }
    }

    fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Count the call and fail it if a plan says so.
    fn check(&self, operation: &str) -> CatalogResult<()> {
        let mut calls = self.calls.lock().map_err(|_| poisoned(operation))?;
        *calls.entry(operation.to_string()).or_insert(0) += 1;

        let mut plans = self.plans.lock().map_err(|_| poisoned(operation))?;
        let Some(plan) = plans
            .iter_mut()
            .find(|p| p.operation == operation && p.count > 0)
        else {
            return Ok(());
        };
        if plan.skip > 0 {
            plan.skip -= 1;
            return Ok(());
        }
        plan.count -= 1;
        Err(CatalogError::new(plan.kind, operation, "injected failure"))
    }
}

fn poisoned(operation: &str) -> CatalogError {
    CatalogError::permanent(operation, "catalog lock poisoned")
}

fn read<'a, T>(lock: &'a RwLock<T>, operation: &str) -> CatalogResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| poisoned(operation))
}

fn write<'a, T>(lock: &'a RwLock<T>, operation: &str) -> CatalogResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| poisoned(operation))
}

// ============================================================================
// IN-MEMORY CATALOG
// ============================================================================

/// In-memory catalog for tests and local runs.
pub struct InMemoryCatalog {
    databases: RwLock<BTreeMap<String, DatabaseRecord>>,
    tables: RwLock<BTreeMap<TableId, TableRecord>>,
    partitions: RwLock<BTreeMap<PartitionId, PartitionRecord>>,
    injector: Injector,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl fmt::Debug for InMemoryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCatalog")
            .field("databases", &self.databases)
            .field("tables", &self.tables)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog whose creation/update timestamps come from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            databases: RwLock::default(),
            tables: RwLock::default(),
            partitions: RwLock::default(),
            injector: Injector::default(),
            clock,
        }
    }

    pub fn inject_failure(&self, plan: FailureInjection) {
        self.injector.inject(plan);
    }

    pub fn clear_failures(&self) {
        self.injector.clear();
    }

    /// Number of calls made to `operation`, failed ones included.
    pub fn call_count(&self, operation: &str) -> usize {
        self.injector.call_count(operation)
    }

    /// Partition values of a table, sorted.
    pub fn partition_values(&self, database: &str, table: &str) -> Vec<Vec<String>> {
        self.partitions
            .read()
            .map(|partitions| {
                partitions
                    .keys()
                    .filter(|(db, t, _)| db == database && t == table)
                    .map(|(_, _, values)| values.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn table_count(&self) -> usize {
        self.tables.read().map(|t| t.len()).unwrap_or(0)
    }

    fn require_table(&self, database: &str, table: &str, operation: &str) -> CatalogResult<()> {
        let tables = read(&self.tables, operation)?;
        if tables.contains_key(&(database.to_string(), table.to_string())) {
            Ok(())
        } else {
            Err(CatalogError::not_found(
                operation,
                format!("table {}.{} not found", database, table),
            ))
        }
    }
}

fn partition_id(database: &str, table: &str, values: &[String]) -> PartitionId {
    (database.to_string(), table.to_string(), values.to_vec())
}

fn partition_not_found(operation: &str, database: &str, table: &str, values: &[String]) -> CatalogError {
    CatalogError::not_found(
        operation,
        format!("partition {:?} of {}.{} not found", values, database, table),
    )
}

impl CatalogClient for InMemoryCatalog {
    // === Database Operations ===

    fn create_database(&self, input: &DatabaseInput) -> CatalogResult<()> {
        self.injector.check(ops::CREATE_DATABASE)?;
        let mut databases = write(&self.databases, ops::CREATE_DATABASE)?;
        if databases.contains_key(&input.name) {
            return Err(CatalogError::already_exists(
                ops::CREATE_DATABASE,
                format!("database {} already exists", input.name),
            ));
        }
        databases.insert(
            input.name.clone(),
            DatabaseRecord {
                name: input.name.clone(),
                description: input.description.clone(),
                created_at: self.clock.now(),
            },
        );
        Ok(())
    }

    fn get_database(&self, name: &str) -> CatalogResult<DatabaseRecord> {
        self.injector.check(ops::GET_DATABASE)?;
        read(&self.databases, ops::GET_DATABASE)?
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(ops::GET_DATABASE, format!("database {} not found", name)))
    }

    fn delete_database(&self, name: &str) -> CatalogResult<()> {
        self.injector.check(ops::DELETE_DATABASE)?;
        let mut databases = write(&self.databases, ops::DELETE_DATABASE)?;
        if databases.remove(name).is_none() {
            return Err(CatalogError::not_found(
                ops::DELETE_DATABASE,
                format!("database {} not found", name),
            ));
        }
        write(&self.tables, ops::DELETE_DATABASE)?.retain(|(db, _), _| db != name);
        write(&self.partitions, ops::DELETE_DATABASE)?.retain(|(db, _, _), _| db != name);
        Ok(())
    }

    // === Table Operations ===

    fn create_table(&self, database: &str, input: &TableInput) -> CatalogResult<()> {
        self.injector.check(ops::CREATE_TABLE)?;
        if !read(&self.databases, ops::CREATE_TABLE)?.contains_key(database) {
            return Err(CatalogError::not_found(
                ops::CREATE_TABLE,
                format!("database {} not found", database),
            ));
        }
        let mut tables = write(&self.tables, ops::CREATE_TABLE)?;
        let id = (database.to_string(), input.name.clone());
        if tables.contains_key(&id) {
            return Err(CatalogError::already_exists(
                ops::CREATE_TABLE,
                format!("table {}.{} already exists", database, input.name),
            ));
        }
        let now = self.clock.now();
        tables.insert(
            id,
            TableRecord {
                database: database.to_string(),
                definition: input.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    fn get_table(&self, database: &str, name: &str) -> CatalogResult<TableRecord> {
        self.injector.check(ops::GET_TABLE)?;
        read(&self.tables, ops::GET_TABLE)?
            .get(&(database.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                CatalogError::not_found(ops::GET_TABLE, format!("table {}.{} not found", database, name))
            })
    }

    fn update_table(&self, database: &str, input: &TableInput) -> CatalogResult<()> {
        self.injector.check(ops::UPDATE_TABLE)?;
        let mut tables = write(&self.tables, ops::UPDATE_TABLE)?;
        let record = tables
            .get_mut(&(database.to_string(), input.name.clone()))
            .ok_or_else(|| {
                CatalogError::not_found(
                    ops::UPDATE_TABLE,
                    format!("table {}.{} not found", database, input.name),
                )
            })?;
        record.definition = input.clone();
        record.updated_at = self.clock.now();
        Ok(())
    }

    fn delete_table(&self, database: &str, name: &str) -> CatalogResult<()> {
        self.injector.check(ops::DELETE_TABLE)?;
        let mut tables = write(&self.tables, ops::DELETE_TABLE)?;
        if tables.remove(&(database.to_string(), name.to_string())).is_none() {
            return Err(CatalogError::not_found(
                ops::DELETE_TABLE,
                format!("table {}.{} not found", database, name),
            ));
        }
        write(&self.partitions, ops::DELETE_TABLE)?.retain(|(db, t, _), _| !(db == database && t == name));
        Ok(())
    }

    // === Partition Operations ===

    fn create_partition(&self, database: &str, table: &str, input: &PartitionInput) -> CatalogResult<()> {
        self.injector.check(ops::CREATE_PARTITION)?;
        self.require_table(database, table, ops::CREATE_PARTITION)?;
        let mut partitions = write(&self.partitions, ops::CREATE_PARTITION)?;
        let id = partition_id(database, table, &input.values);
        if partitions.contains_key(&id) {
            return Err(CatalogError::already_exists(
                ops::CREATE_PARTITION,
                format!("partition {:?} of {}.{} already exists", input.values, database, table),
            ));
        }
        partitions.insert(
            id,
            PartitionRecord {
                database: database.to_string(),
                table: table.to_string(),
                values: input.values.clone(),
                storage: input.storage.clone(),
                created_at: self.clock.now(),
            },
        );
        Ok(())
    }

    fn get_partition(&self, database: &str, table: &str, values: &[String]) -> CatalogResult<PartitionRecord> {
        self.injector.check(ops::GET_PARTITION)?;
        self.require_table(database, table, ops::GET_PARTITION)?;
        read(&self.partitions, ops::GET_PARTITION)?
            .get(&partition_id(database, table, values))
            .cloned()
            .ok_or_else(|| partition_not_found(ops::GET_PARTITION, database, table, values))
    }

    fn update_partition(
        &self,
        database: &str,
        table: &str,
        values: &[String],
        input: &PartitionInput,
    ) -> CatalogResult<()> {
        self.injector.check(ops::UPDATE_PARTITION)?;
        let mut partitions = write(&self.partitions, ops::UPDATE_PARTITION)?;
        let record = partitions
            .get_mut(&partition_id(database, table, values))
            .ok_or_else(|| partition_not_found(ops::UPDATE_PARTITION, database, table, values))?;
        record.values = input.values.clone();
        record.storage = input.storage.clone();
        Ok(())
    }

    fn delete_partition(&self, database: &str, table: &str, values: &[String]) -> CatalogResult<()> {
        self.injector.check(ops::DELETE_PARTITION)?;
        write(&self.partitions, ops::DELETE_PARTITION)?
            .remove(&partition_id(database, table, values))
            .map(|_| ())
            .ok_or_else(|| partition_not_found(ops::DELETE_PARTITION, database, table, values))
    }
}

// ============================================================================
// IN-MEMORY OBJECT STORE
// ============================================================================

/// Object store holding only object keys.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeSet<String>>,
    injector: Injector,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an object at the full path `key`.
    pub fn put_object(&self, key: impl Into<String>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(key.into());
        }
    }

    /// Remove every object under `location`.
    pub fn remove_prefix(&self, location: &str) {
        if let Ok(mut objects) = self.objects.write() {
            objects.retain(|key| !key.starts_with(location));
        }
    }

    pub fn inject_failure(&self, plan: FailureInjection) {
        self.injector.inject(plan);
    }

    pub fn call_count(&self) -> usize {
        self.injector.call_count(ops::LIST_OBJECTS)
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn has_objects(&self, location: &str) -> CatalogResult<bool> {
        self.injector.check(ops::LIST_OBJECTS)?;
        let objects = read(&self.objects, ops::LIST_OBJECTS)?;
        Ok(objects
            .range(location.to_string()..)
            .next()
            .is_some_and(|key| key.starts_with(location)))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StorageDescriptor, EXTERNAL_TABLE};
    use tidemark_core::Column;

    fn db_input(name: &str) -> DatabaseInput {
        DatabaseInput {
            name: name.to_string(),
            description: "test".to_string(),
        }
    }

    fn table_input(name: &str) -> TableInput {
        TableInput {
            name: name.to_string(),
            description: "test table".to_string(),
            table_type: EXTERNAL_TABLE.to_string(),
            parameters: BTreeMap::new(),
            partition_keys: vec![Column::new("year", "int", "year")],
            storage: StorageDescriptor::json("s3://b/logs/t", vec![]),
        }
    }

    fn partition_input(values: &[&str]) -> PartitionInput {
        PartitionInput {
            values: values.iter().map(|v| v.to_string()).collect(),
            storage: StorageDescriptor::json("s3://b/logs/t/year=2020/", vec![]),
        }
    }

    fn seeded() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        catalog.create_database(&db_input("db")).unwrap();
        catalog.create_table("db", &table_input("t")).unwrap();
        catalog
    }

    #[test]
    fn test_database_lifecycle() {
        let catalog = InMemoryCatalog::new();
        catalog.create_database(&db_input("db")).unwrap();
        let err = catalog.create_database(&db_input("db")).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(catalog.get_database("db").unwrap().name, "db");
        catalog.delete_database("db").unwrap();
        assert!(catalog.get_database("db").unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_table_requires_database() {
        let catalog = InMemoryCatalog::new();
        let err = catalog.create_table("missing", &table_input("t")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_partition_lifecycle() {
        let catalog = seeded();
        let input = partition_input(&["2020"]);
        catalog.create_partition("db", "t", &input).unwrap();
        assert!(catalog.create_partition("db", "t", &input).unwrap_err().is_already_exists());

        let record = catalog.get_partition("db", "t", &input.values).unwrap();
        assert_eq!(record.storage.location, "s3://b/logs/t/year=2020/");

        catalog.delete_partition("db", "t", &input.values).unwrap();
        assert!(catalog.get_partition("db", "t", &input.values).unwrap_err().is_not_found());
        assert!(catalog.delete_partition("db", "t", &input.values).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_table_drops_partitions() {
        let catalog = seeded();
        catalog.create_partition("db", "t", &partition_input(&["2020"])).unwrap();
        catalog.delete_table("db", "t").unwrap();
        assert!(catalog.partition_values("db", "t").is_empty());
        assert_eq!(catalog.table_count(), 0);
    }

    #[test]
    fn test_update_table_replaces_definition() {
        let catalog = seeded();
        let mut input = table_input("t");
        input.storage.columns.push(Column::new("added", "string", "added"));
        catalog.update_table("db", &input).unwrap();
        assert_eq!(catalog.get_table("db", "t").unwrap().definition, input);
        assert!(catalog.update_table("db", &table_input("other")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_failure_injection_skip_and_count() {
        let catalog = seeded();
        catalog.inject_failure(
            FailureInjection::new(ops::GET_TABLE, CatalogErrorKind::Transient)
                .after(1)
                .times(2),
        );
        assert!(catalog.get_table("db", "t").is_ok());
        assert!(catalog.get_table("db", "t").unwrap_err().is_transient());
        assert!(catalog.get_table("db", "t").unwrap_err().is_transient());
        assert!(catalog.get_table("db", "t").is_ok());
        assert_eq!(catalog.call_count(ops::GET_TABLE), 4);
    }

    #[test]
    fn test_clear_failures_drops_pending_plans() {
        let catalog = seeded();
        catalog.inject_failure(FailureInjection::new(ops::GET_TABLE, CatalogErrorKind::Transient).times(5));
        assert!(catalog.get_table("db", "t").unwrap_err().is_transient());
        catalog.clear_failures();
        assert!(catalog.get_table("db", "t").is_ok());
        assert_eq!(catalog.call_count(ops::GET_TABLE), 2);
    }

    #[test]
    fn test_object_store_prefix_probe() {
        let store = InMemoryObjectStore::new();
        let hour = "s3://b/logs/t/year=2020/month=01/day=03/hour=01/";
        assert!(!store.has_objects(hour).unwrap());

        store.put_object(format!("{}part-0000.json.gz", hour));
        assert!(store.has_objects(hour).unwrap());
        assert!(store.has_objects("s3://b/logs/t/").unwrap());
        assert!(!store.has_objects("s3://b/logs/t/year=2020/month=01/day=03/hour=02/").unwrap());

        store.remove_prefix(hour);
        assert!(!store.has_objects(hour).unwrap());
        assert_eq!(store.call_count(), 5);
    }
}
