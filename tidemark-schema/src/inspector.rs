//! Column inference.
//!
//! Walks a [`RecordType`] in declared order and produces catalog columns for
//! the JSON SerDe. Embedded records are flattened into the enclosing level,
//! nested records become `struct<...>`, sequences `array<...>` and mappings
//! `map<...>`. Custom mappings are consulted by type identity before the
//! generic kind mapping.

use std::collections::HashSet;

use tidemark_core::{clip_comment, Column, EngineConfig, SchemaError};

use crate::naming::rewrite_field_name;
use crate::record::{Field, Primitive, RecordType, TypeDesc};
use crate::registry::CustomTypeRegistry;

/// Derives catalog columns from record types.
#[derive(Debug, Clone)]
pub struct TypeInspector<'a> {
    registry: &'a CustomTypeRegistry,
    native_int_width: u32,
    max_comment_length: usize,
}

/// Names used in error messages for the field being mapped.
struct FieldContext<'r> {
    record: &'r str,
    field: &'r str,
}

impl<'a> TypeInspector<'a> {
    pub fn new(registry: &'a CustomTypeRegistry, config: &EngineConfig) -> Self {
        Self {
            registry,
            native_int_width: config.native_int_width,
            max_comment_length: config.max_comment_length,
        }
    }

    /// Infer the ordered column list of `record`.
    pub fn infer_columns(&self, record: &RecordType) -> Result<Vec<Column>, SchemaError> {
        let mut columns = Vec::new();
        self.collect_columns(record, &mut columns)?;
        ensure_unique_columns(&record.name, &columns)?;
        tracing::debug!(record = %record.name, columns = columns.len(), "Inferred columns");
        Ok(columns)
    }

    /// Catalog type expression for a standalone type.
    pub fn catalog_type(&self, ty: &TypeDesc) -> Result<String, SchemaError> {
        let identity = ty.identity();
        let ctx = FieldContext {
            record: &identity,
            field: "",
        };
        self.type_expr(&ctx, ty)
    }

    fn collect_columns(&self, record: &RecordType, out: &mut Vec<Column>) -> Result<(), SchemaError> {
        for field in &record.fields {
            if field.tags.skip {
                continue;
            }
            if field.embedded {
                match field.ty.as_record() {
                    Some(inner) => {
                        // Members of an embedded record belong to this level,
                        // even when the embedded type itself is unexported.
                        self.collect_columns(inner, out)?;
                        continue;
                    }
                    None if !field.exported => continue,
                    None => {}
                }
            } else if !field.exported {
                continue;
            }

            out.push(self.column_for(record, field)?);
        }
        Ok(())
    }

    fn column_for(&self, record: &RecordType, field: &Field) -> Result<Column, SchemaError> {
        let name = rewrite_field_name(field.serialized_name());
        let ctx = FieldContext {
            record: &record.name,
            field: &name,
        };
        let column_type = self.type_expr(&ctx, &field.ty)?;

        let description = field.tags.description.as_deref().unwrap_or("");
        if description.trim().is_empty() {
            return Err(SchemaError::MissingComment {
                record: record.name.clone(),
                field: name,
            });
        }

        Ok(Column {
            comment: clip_comment(description, self.max_comment_length),
            name,
            column_type,
            required: field.tags.required,
        })
    }

    fn type_expr(&self, ctx: &FieldContext<'_>, ty: &TypeDesc) -> Result<String, SchemaError> {
        let ty = ty.deref_optional();
        if let Some(mapped) = self.registry.lookup(&ty.identity()) {
            return Ok(mapped.to_string());
        }

        match ty {
            TypeDesc::Primitive(p) => self.primitive(ctx, *p).map(str::to_string),
            TypeDesc::Named { underlying, .. } => self.type_expr(ctx, underlying),
            TypeDesc::Sequence(element) => Ok(format!("array<{}>", self.type_expr(ctx, element)?)),
            TypeDesc::Mapping { key, value } => Ok(format!(
                "map<{},{}>",
                self.primitive(ctx, *key)?,
                self.type_expr(ctx, value)?
            )),
            TypeDesc::Record(record) => Ok(format!("struct<{}>", self.struct_members(record)?)),
            TypeDesc::Optional(inner) => self.type_expr(ctx, inner),
        }
    }

    /// Comma-joined `name:type` members of a nested record. Nested members
    /// need no description.
    fn struct_members(&self, record: &RecordType) -> Result<String, SchemaError> {
        let mut members = Vec::new();
        for field in &record.fields {
            if field.tags.skip {
                continue;
            }
            if field.embedded {
                match field.ty.as_record() {
                    Some(inner) => {
                        let flattened = self.struct_members(inner)?;
                        if !flattened.is_empty() {
                            members.push(flattened);
                        }
                        continue;
                    }
                    None if !field.exported => continue,
                    None => {}
                }
            } else if !field.exported {
                continue;
            }

            let name = rewrite_field_name(field.serialized_name());
            let ctx = FieldContext {
                record: &record.name,
                field: &name,
            };
            members.push(format!("{}:{}", name, self.type_expr(&ctx, &field.ty)?));
        }
        Ok(members.join(","))
    }

    fn primitive(&self, ctx: &FieldContext<'_>, p: Primitive) -> Result<&'static str, SchemaError> {
        let catalog_type = match p {
            Primitive::Bool => "boolean",
            Primitive::String => "string",
            Primitive::Int8 => "tinyint",
            Primitive::Int16 => "smallint",
            Primitive::Int => match self.native_int_width {
                32 => "int",
                64 => "bigint",
                bits => return Err(SchemaError::UnsupportedNativeWidth { bits }),
            },
            Primitive::Int32 => "int",
            Primitive::Int64 => "bigint",
            Primitive::Float32 => "float",
            Primitive::Float64 => "double",
            // lossy, but the catalog has no untyped column
            Primitive::Any => "string",
            // no unsigned catalog types; widen to the next signed type
            Primitive::Uint8 => "smallint",
            Primitive::Uint16 => "int",
            Primitive::Uint32 => "bigint",
            Primitive::Uint64 => "bigint",
            Primitive::Uint | Primitive::Complex64 | Primitive::Complex128 => {
                return Err(SchemaError::UnmappedKind {
                    record: ctx.record.to_string(),
                    field: ctx.field.to_string(),
                    type_identity: p.identity().to_string(),
                })
            }
        };
        Ok(catalog_type)
    }
}

/// Reject column lists with two columns of the same (case-insensitive) name.
pub fn ensure_unique_columns(record: &str, columns: &[Column]) -> Result<(), SchemaError> {
    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        if !seen.insert(column.name.to_lowercase()) {
            return Err(SchemaError::DuplicateColumn {
                record: record.to_string(),
                name: column.name.clone(),
            });
        }
    }
    Ok(())
}

/// Infer columns with a one-off inspector.
pub fn infer_columns(
    record: &RecordType,
    registry: &CustomTypeRegistry,
    config: &EngineConfig,
) -> Result<Vec<Column>, SchemaError> {
    TypeInspector::new(registry, config).infer_columns(record)
}

// ============================================================================
// TESTS
// ============================================================================
