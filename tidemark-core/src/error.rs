//! Error types for Tidemark operations

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Record-type definition errors, raised while inferring columns.
///
/// These are contract violations in the record type itself and surface when
/// a table descriptor is constructed, never during a sync.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Cannot map {type_identity} (field {field} of {record}) to a catalog type")]
    UnmappedKind {
        record: String,
        field: String,
        type_identity: String,
    },

    #[error("Field {field} of {record} does not have the required description")]
    MissingComment { record: String, field: String },

    #[error("Unsupported native integer width: {bits} bits")]
    UnsupportedNativeWidth { bits: u32 },

    #[error("Duplicate column {name} in {record}")]
    DuplicateColumn { record: String, name: String },
}

/// Normalized catalog/storage failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogErrorKind {
    /// The entity does not exist
    NotFound,
    /// The entity already exists
    AlreadyExists,
    /// Throttling or a temporary service fault; safe to retry
    Transient,
    /// Anything else
    Permanent,
}

impl fmt::Display for CatalogErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CatalogErrorKind::NotFound => "not found",
            CatalogErrorKind::AlreadyExists => "already exists",
            CatalogErrorKind::Transient => "transient",
            CatalogErrorKind::Permanent => "permanent",
        };
        f.write_str(s)
    }
}

/// Error returned by a catalog or object-store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Catalog {operation} failed ({kind}): {message}")]
pub struct CatalogError {
    pub kind: CatalogErrorKind,
    pub operation: String,
    pub message: String,
}

impl CatalogError {
    pub fn new(kind: CatalogErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CatalogErrorKind::NotFound, operation, message)
    }

    pub fn already_exists(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CatalogErrorKind::AlreadyExists, operation, message)
    }

    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CatalogErrorKind::Transient, operation, message)
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CatalogErrorKind::Permanent, operation, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == CatalogErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == CatalogErrorKind::AlreadyExists
    }

    pub fn is_transient(&self) -> bool {
        self.kind == CatalogErrorKind::Transient
    }
}

/// Result type for backend calls.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Table-level contract errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("Table {database}.{table} already exists with an incompatible definition: {reason}")]
    IncompatibleTable {
        database: String,
        table: String,
        reason: String,
    },

    #[error("Table {database}.{table} has no storage location")]
    MissingLocation { database: String, table: String },
}

/// Partition sync errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Buckets before `index` were committed and are not rolled back.
    #[error("Partition sync failed at bucket {index} ({bucket}): {source}")]
    FailedAtBucket {
        index: usize,
        bucket: Timestamp,
        source: CatalogError,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Errors parsing a partition path or location back into a key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PartitionKeyParseError {
    #[error("Location {location} is not under prefix {prefix}")]
    PrefixMismatch { prefix: String, location: String },

    #[error("Location {location} does not end with a slash")]
    MissingTrailingSlash { location: String },

    #[error("Expected {expected} path segments, got {got}")]
    SegmentCount { expected: usize, got: usize },

    #[error("Expected {expected}=<value>, got {segment}")]
    UnexpectedSegment { expected: String, segment: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Path {path} does not name a valid calendar bucket")]
    InvalidDate { path: String },
}

/// Master error type for all Tidemark errors.
#[derive(Debug, Clone, Error)]
pub enum TidemarkError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Partition key error: {0}")]
    PartitionKey(#[from] PartitionKeyParseError),
}

impl TidemarkError {
    /// Backend error kind, if this error came from the catalog.
    pub fn catalog_kind(&self) -> Option<CatalogErrorKind> {
        match self {
            TidemarkError::Catalog(e) => Some(e.kind),
            TidemarkError::Sync(SyncError::FailedAtBucket { source, .. }) => Some(source.kind),
            _ => None,
        }
    }
}

/// Result type alias for Tidemark operations.
pub type TidemarkResult<T> = Result<T, TidemarkError>;

// =============================================================================
// TESTS
// =============================================================================
