//! Tidemark Table - Time-Partitioned Catalog Tables
//!
//! [`TableDescriptor`] binds a record type to a catalog table partitioned by
//! hour or day, and manages the table and its partitions through a
//! [`CatalogClient`](tidemark_catalog::CatalogClient). [`PartitionSyncer`]
//! keeps the registered partitions in step with the data in object storage.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use tidemark_catalog::InMemoryCatalog;
//! use tidemark_core::{DataCategory, EngineConfig, Granularity};
//! use tidemark_schema::{CustomTypeRegistry, Field, Primitive, RecordType};
//! use tidemark_table::{TableDescriptor, TableSpec};
//!
//! let record = RecordType::new("TestEvent")
//!     .field(Field::new("Col1", Primitive::Int32).description("test field"));
//! let spec = TableSpec::new(DataCategory::RuleMatches, "testTable", "test table", Granularity::Hourly);
//! let table = TableDescriptor::new(spec, record, &CustomTypeRegistry::standard(), vec![], &EngineConfig::default())
//!     .unwrap();
//!
//! let catalog = InMemoryCatalog::new();
//! table.create_table(&catalog, "bucket").unwrap();
//!
//! let t = Utc.with_ymd_and_hms(2020, 1, 3, 1, 1, 1).unwrap();
//! assert!(table.create_partition(&catalog, t).unwrap());
//! let partition = table.get_partition(&catalog, t).unwrap().unwrap();
//! assert_eq!(partition.location, "s3://bucket/rules/testTable/year=2020/month=01/day=03/hour=01/");
//! ```

pub mod descriptor;
pub mod locate;
pub mod sync;

pub use descriptor::{
    appends_columns, create_database, delete_database, same_columns, Partition, TableDescriptor, TableSpec,
    CLASSIFICATION_PARAM,
};
pub use locate::{locate, location_for, parse_location};
pub use sync::{BucketOutcome, PartitionSyncer, SyncCounts, SyncReport};
