//! Declarative record-type descriptions.
//!
//! A [`RecordType`] is the statically built description of an application
//! record: its fields in declared order, each with a [`TypeDesc`] and the
//! tags that drive column inference.

use serde::{Deserialize, Serialize};

// ============================================================================
// PRIMITIVES
// ============================================================================

/// Scalar kinds a field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Bool,
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    /// Platform word-sized signed integer
    Int,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    /// Platform word-sized unsigned integer
    Uint,
    Float32,
    Float64,
    Complex64,
    Complex128,
    /// Untyped value of unknown shape
    Any,
}

impl Primitive {
    /// Type identity used for custom-mapping lookups.
    pub fn identity(&self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::String => "string",
            Primitive::Int8 => "int8",
            Primitive::Int16 => "int16",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::Int => "int",
            Primitive::Uint8 => "uint8",
            Primitive::Uint16 => "uint16",
            Primitive::Uint32 => "uint32",
            Primitive::Uint64 => "uint64",
            Primitive::Uint => "uint",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Complex64 => "complex64",
            Primitive::Complex128 => "complex128",
            Primitive::Any => "any",
        }
    }
}

// ============================================================================
// TYPE DESCRIPTIONS
// ============================================================================

/// Shape of a field's type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeDesc {
    Primitive(Primitive),
    /// A named wrapper around another type, e.g. a timestamp format type
    /// backed by a string. Its identity is `name`.
    Named {
        name: String,
        underlying: Box<TypeDesc>,
    },
    /// Nullable/pointer-like wrapper; transparent to inference.
    Optional(Box<TypeDesc>),
    Sequence(Box<TypeDesc>),
    Mapping {
        key: Primitive,
        value: Box<TypeDesc>,
    },
    Record(RecordType),
}

impl TypeDesc {
    pub fn named(name: impl Into<String>, underlying: TypeDesc) -> Self {
        TypeDesc::Named {
            name: name.into(),
            underlying: Box::new(underlying),
        }
    }

    pub fn optional(inner: TypeDesc) -> Self {
        TypeDesc::Optional(Box::new(inner))
    }

    pub fn sequence(element: TypeDesc) -> Self {
        TypeDesc::Sequence(Box::new(element))
    }

    pub fn mapping(key: Primitive, value: TypeDesc) -> Self {
        TypeDesc::Mapping {
            key,
            value: Box::new(value),
        }
    }

    /// Strip any number of `Optional` wrappers.
    pub fn deref_optional(&self) -> &TypeDesc {
        let mut ty = self;
        while let TypeDesc::Optional(inner) = ty {
            ty = inner;
        }
        ty
    }

    /// The record behind this type, if it is one (after dereferencing).
    pub fn as_record(&self) -> Option<&RecordType> {
        match self.deref_optional() {
            TypeDesc::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Type identity used for custom-mapping lookups.
    pub fn identity(&self) -> String {
        match self {
            TypeDesc::Primitive(p) => p.identity().to_string(),
            TypeDesc::Named { name, .. } => name.clone(),
            TypeDesc::Optional(inner) => format!("*{}", inner.identity()),
            TypeDesc::Sequence(inner) => format!("[]{}", inner.identity()),
            TypeDesc::Mapping { key, value } => {
                format!("map[{}]{}", key.identity(), value.identity())
            }
            TypeDesc::Record(record) => record.name.clone(),
        }
    }
}

impl From<Primitive> for TypeDesc {
    fn from(p: Primitive) -> Self {
        TypeDesc::Primitive(p)
    }
}

impl From<RecordType> for TypeDesc {
    fn from(record: RecordType) -> Self {
        TypeDesc::Record(record)
    }
}

// ============================================================================
// FIELDS
// ============================================================================

/// Tags attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTags {
    /// Serialized name overriding the identifier
    pub rename: Option<String>,
    /// Human description; becomes the column comment
    pub description: Option<String>,
    /// Carries the required validation flag
    pub required: bool,
    /// Excluded from serialization, and therefore from the schema
    pub skip: bool,
}

/// One field of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub ident: String,
    pub ty: TypeDesc,
    pub exported: bool,
    /// Anonymous/embedded field whose members belong to the enclosing record
    pub embedded: bool,
    pub tags: FieldTags,
}

impl Field {
    /// An exported, non-embedded field.
    pub fn new(ident: impl Into<String>, ty: impl Into<TypeDesc>) -> Self {
        Self {
            ident: ident.into(),
            ty: ty.into(),
            exported: true,
            embedded: false,
            tags: FieldTags::default(),
        }
    }

    /// An embedded field; its identifier is the embedded type's identity.
    pub fn embedded(ty: impl Into<TypeDesc>) -> Self {
        let ty = ty.into();
        Self {
            ident: ty.deref_optional().identity(),
            ty,
            exported: true,
            embedded: true,
            tags: FieldTags::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.tags.description = Some(description.into());
        self
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.tags.rename = Some(name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.tags.required = true;
        self
    }

    pub fn skip(mut self) -> Self {
        self.tags.skip = true;
        self
    }

    pub fn unexported(mut self) -> Self {
        self.exported = false;
        self
    }

    /// Serialized name before rewriting.
    pub fn serialized_name(&self) -> &str {
        match self.tags.rename.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.ident,
        }
    }
}

// ============================================================================
// RECORD TYPE
// ============================================================================

/// A record type: a name (its identity) and fields in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<Field>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }
}
