//! Tidemark Schema - Record Types and Column Inference
//!
//! Record types are described declaratively with [`RecordType`], [`Field`]
//! and [`TypeDesc`]. [`TypeInspector`] turns such a description into the
//! ordered catalog column list, consulting a [`CustomTypeRegistry`] for
//! semantic wrapper types before falling back to kind mapping.
//!
//! ```
//! use tidemark_core::EngineConfig;
//! use tidemark_schema::{infer_columns, CustomTypeRegistry, Field, Primitive, RecordType};
//!
//! let record = RecordType::new("TestEvent")
//!     .field(Field::new("Col1", Primitive::Int32).description("test field"));
//! let columns = infer_columns(&record, &CustomTypeRegistry::standard(), &EngineConfig::default())
//!     .unwrap();
//! assert_eq!(columns[0].column_type, "int");
//! ```

pub mod inspector;
pub mod naming;
pub mod record;
pub mod registry;

pub use inspector::{ensure_unique_columns, infer_columns, TypeInspector};
pub use naming::rewrite_field_name;
pub use record::{Field, FieldTags, Primitive, RecordType, TypeDesc};
pub use registry::{identities, rule_match_columns, CustomMapping, CustomTypeRegistry, TIMESTAMP_TYPE};
