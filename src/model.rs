//! Field accessor tables for queryable models.
//!
//! A model declares its fields once through [`Model::descriptor`] and hands out
//! field values through [`Record::field`]. Property paths in filter and order-by
//! strings are resolved against these tables only.

use std::any::TypeId;
use std::fmt;

use crate::value::Value;

/// Object-safe field access used at evaluation time.
pub trait Record {
    /// Returns the value of `name`, or `None` if the record has no such field.
    ///
    /// `name` is always a field name exactly as declared in the descriptor.
    fn field(&self, name: &str) -> Option<Value<'_>>;
}

/// A record type with a static field table.
pub trait Model: Record + 'static {
    fn descriptor() -> ModelDescriptor;
}

/// Declared type of a field.
#[derive(Clone)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    String,
    DateTime,
    /// A sequence; the element type may be a scalar or a model.
    List(Box<FieldType>),
    /// A nested record.
    Model(fn() -> ModelDescriptor),
}

impl FieldType {
    pub fn list(element: FieldType) -> Self {
        FieldType::List(Box::new(element))
    }

    pub fn model<M: Model>() -> Self {
        FieldType::Model(M::descriptor)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, FieldType::String)
    }

    pub fn element(&self) -> Option<&FieldType> {
        match self {
            FieldType::List(element) => Some(element),
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        match self {
            FieldType::Bool => "bool".to_string(),
            FieldType::Int => "int".to_string(),
            FieldType::Float => "float".to_string(),
            FieldType::String => "string".to_string(),
            FieldType::DateTime => "datetime".to_string(),
            FieldType::List(element) => format!("list<{}>", element.name()),
            FieldType::Model(descriptor) => descriptor().name.to_string(),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl PartialEq for FieldType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldType::List(a), FieldType::List(b)) => a == b,
            (FieldType::Model(a), FieldType::Model(b)) => a().type_id == b().type_id,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub ty: FieldType,
}

/// The accessor table of one model type.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub type_id: TypeId,
    pub name: &'static str,
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    pub fn of<M: Model>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            name,
            fields: Vec::new(),
        }
    }

    /// Declares a field; builder style.
    pub fn field(mut self, name: &'static str, ty: FieldType) -> Self {
        self.fields.push(FieldDescriptor { name, ty });
        self
    }

    /// Case-insensitive field lookup.
    pub fn find(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }
}
