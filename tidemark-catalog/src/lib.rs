//! Tidemark Catalog - Catalog Client Traits and Backends
//!
//! Defines the capability surface the engine needs from the external
//! metadata service ([`CatalogClient`]) and from object storage
//! ([`ObjectStore`]), plus the wire model exchanged with them.
//!
//! Backends normalize their own error codes into
//! [`CatalogErrorKind`](tidemark_core::CatalogErrorKind) so callers can tell a
//! legitimate absence from a failure without knowing the backend.
//!
//! - [`InMemoryCatalog`] / [`InMemoryObjectStore`]: in-process backends for
//!   tests and local runs, with failure injection.
//! - [`RetryingClient`]: wraps any backend and retries transient errors with
//!   exponential backoff inside an elapsed-time budget.

pub mod memory;
pub mod retry;

pub use memory::{FailureInjection, InMemoryCatalog, InMemoryObjectStore};
pub use retry::{RetryingClient, Sleeper, ThreadSleeper};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tidemark_core::{CatalogResult, Column, Timestamp};

// ============================================================================
// OPERATION NAMES
// ============================================================================

/// Operation names used in errors, logs and failure injection.
pub mod ops {
    pub const CREATE_DATABASE: &str = "CreateDatabase";
    pub const GET_DATABASE: &str = "GetDatabase";
    pub const DELETE_DATABASE: &str = "DeleteDatabase";
    pub const CREATE_TABLE: &str = "CreateTable";
    pub const GET_TABLE: &str = "GetTable";
    pub const UPDATE_TABLE: &str = "UpdateTable";
    pub const DELETE_TABLE: &str = "DeleteTable";
    pub const CREATE_PARTITION: &str = "CreatePartition";
    pub const GET_PARTITION: &str = "GetPartition";
    pub const UPDATE_PARTITION: &str = "UpdatePartition";
    pub const DELETE_PARTITION: &str = "DeletePartition";
    pub const LIST_OBJECTS: &str = "ListObjects";
}

// ============================================================================
// STORAGE FORMAT
// ============================================================================

/// Table type for tables whose data lives outside the catalog.
pub const EXTERNAL_TABLE: &str = "EXTERNAL_TABLE";

pub const JSON_SERDE_LIBRARY: &str = "org.openx.data.jsonserde.JsonSerDe";
pub const TEXT_INPUT_FORMAT: &str = "org.apache.hadoop.mapred.TextInputFormat";
pub const TEXT_OUTPUT_FORMAT: &str = "org.apache.hadoop.hive.ql.io.HiveIgnoreKeyTextOutputFormat";

/// Serializer/deserializer settings of a storage descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerdeInfo {
    pub library: String,
    pub parameters: BTreeMap<String, String>,
}

impl SerdeInfo {
    /// Line-delimited JSON with case-insensitive keys.
    pub fn json() -> Self {
        let parameters = BTreeMap::from([
            ("serialization.format".to_string(), "1".to_string()),
            ("case.insensitive".to_string(), "TRUE".to_string()),
        ]);
        Self {
            library: JSON_SERDE_LIBRARY.to_string(),
            parameters,
        }
    }
}

/// Where and how a table or partition's data is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescriptor {
    pub location: String,
    pub columns: Vec<Column>,
    pub input_format: String,
    pub output_format: String,
    pub serde: SerdeInfo,
}

impl StorageDescriptor {
    /// JSON text storage at `location`.
    pub fn json(location: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            location: location.into(),
            columns,
            input_format: TEXT_INPUT_FORMAT.to_string(),
            output_format: TEXT_OUTPUT_FORMAT.to_string(),
            serde: SerdeInfo::json(),
        }
    }

    /// Same format and columns at another location.
    pub fn relocated(&self, location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..self.clone()
        }
    }
}

// ============================================================================
// INPUTS AND RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInput {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub name: String,
    pub description: String,
    pub created_at: Timestamp,
}

/// Full table definition, used for both create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInput {
    pub name: String,
    pub description: String,
    pub table_type: String,
    pub parameters: BTreeMap<String, String>,
    pub partition_keys: Vec<Column>,
    pub storage: StorageDescriptor,
}

/// A table as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub database: String,
    pub definition: TableInput,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInput {
    /// Partition values in partition-key order
    pub values: Vec<String>,
    pub storage: StorageDescriptor,
}

/// A partition as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub database: String,
    pub table: String,
    pub values: Vec<String>,
    pub storage: StorageDescriptor,
    pub created_at: Timestamp,
}

// ============================================================================
// CLIENT TRAITS
// ============================================================================

/// Blocking client for the external metadata catalog.
///
/// Implementations map their backend's codes into
/// [`CatalogErrorKind`](tidemark_core::CatalogErrorKind): a missing entity is
/// `NotFound`, a create of an existing one is `AlreadyExists`, throttling is
/// `Transient`.
pub trait CatalogClient: Send + Sync {
    // === Database Operations ===

    fn create_database(&self, input: &DatabaseInput) -> CatalogResult<()>;

    fn get_database(&self, name: &str) -> CatalogResult<DatabaseRecord>;

    /// Delete a database and every table in it.
    fn delete_database(&self, name: &str) -> CatalogResult<()>;

    // === Table Operations ===

    fn create_table(&self, database: &str, input: &TableInput) -> CatalogResult<()>;

    fn get_table(&self, database: &str, name: &str) -> CatalogResult<TableRecord>;

    /// Replace the definition of an existing table.
    fn update_table(&self, database: &str, input: &TableInput) -> CatalogResult<()>;

    /// Delete a table and its partitions.
    fn delete_table(&self, database: &str, name: &str) -> CatalogResult<()>;

    // === Partition Operations ===

    fn create_partition(&self, database: &str, table: &str, input: &PartitionInput) -> CatalogResult<()>;

    fn get_partition(&self, database: &str, table: &str, values: &[String]) -> CatalogResult<PartitionRecord>;

    fn update_partition(
        &self,
        database: &str,
        table: &str,
        values: &[String],
        input: &PartitionInput,
    ) -> CatalogResult<()>;

    fn delete_partition(&self, database: &str, table: &str, values: &[String]) -> CatalogResult<()>;
}

/// Blocking probe of object storage.
pub trait ObjectStore: Send + Sync {
    /// Whether at least one object exists under `location` (a full
    /// `scheme://bucket/prefix/` path).
    fn has_objects(&self, location: &str) -> CatalogResult<bool>;
}

/// Turns a legitimate `NotFound` into `Ok(None)`.
pub trait OptionalExt<T> {
    fn optional(self) -> CatalogResult<Option<T>>;
}

impl<T> OptionalExt<T> for CatalogResult<T> {
    fn optional(self) -> CatalogResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::CatalogError;

    #[test]
    fn test_optional_maps_not_found_only() {
        let found: CatalogResult<u8> = Ok(1);
        assert_eq!(found.optional().unwrap(), Some(1));

        let missing: CatalogResult<u8> = Err(CatalogError::not_found(ops::GET_PARTITION, "gone"));
        assert_eq!(missing.optional().unwrap(), None);

        let failed: CatalogResult<u8> = Err(CatalogError::transient(ops::GET_PARTITION, "slow down"));
        assert!(failed.optional().is_err());
    }

    #[test]
    fn test_relocated_keeps_format() {
        let table = StorageDescriptor::json("s3://b/rules/t", vec![Column::new("a", "int", "a")]);
        let partition = table.relocated("s3://b/rules/t/year=2020/month=01/day=03/");
        assert_eq!(partition.columns, table.columns);
        assert_eq!(partition.serde, SerdeInfo::json());
        assert_eq!(partition.input_format, TEXT_INPUT_FORMAT);
        assert_ne!(partition.location, table.location);
    }
}
