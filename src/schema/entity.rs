//! Entity descriptors.

use std::{fmt, sync::Arc};

use crate::{
    core::{hook::Hook, intercept::Interceptor},
    types::FieldType,
};

use super::{edge::EdgeDescriptor, field::FieldDescriptor};

/// How an entity id is produced when the caller does not set one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdDefault {
    /// Random UUID generated by the pipeline.
    Uuid,
    /// Generator registered on the registry under the id column.
    Provider,
    /// The caller must set the id.
    Manual,
}

/// Table-driven description of one entity type.
#[derive(Clone)]
pub struct EntityDescriptor {
    /// Entity name, also used as the label in error messages.
    pub name: String,
    /// Backing table.
    pub table: String,
    /// Primary key column, `id` unless overridden.
    pub id_column: String,
    /// How ids are produced on create.
    pub id_default: IdDefault,
    /// Declared fields, in column order.
    pub fields: Vec<FieldDescriptor>,
    /// Declared edges.
    pub edges: Vec<EdgeDescriptor>,
    /// Schema-level hooks; they run innermost, after client hooks.
    pub hooks: Vec<Arc<dyn Hook>>,
    /// Schema-level query interceptors; innermost, like schema hooks.
    pub interceptors: Vec<Arc<dyn Interceptor>>,
}

impl EntityDescriptor {
    /// An entity with a UUID `id` column and nothing else.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            id_column: "id".to_string(),
            id_default: IdDefault::Uuid,
            fields: Vec::new(),
            edges: Vec::new(),
            hooks: Vec::new(),
            interceptors: Vec::new(),
        }
    }

    /// Renames the primary key column.
    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Sets how ids are produced.
    pub fn id_default(mut self, id_default: IdDefault) -> Self {
        self.id_default = id_default;
        self
    }

    /// Adds a field.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds an edge.
    pub fn edge(mut self, edge: EdgeDescriptor) -> Self {
        self.edges.push(edge);
        self
    }

    /// Adds a schema hook after those already declared.
    pub fn hook(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Adds a schema query interceptor after those already declared.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Name used in error messages.
    pub fn label(&self) -> &str {
        &self.name
    }

    /// Field descriptor by name.
    pub fn field_desc(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Edge descriptor by name.
    pub fn edge_desc(&self, name: &str) -> Option<&EdgeDescriptor> {
        self.edges.iter().find(|e| e.name == name)
    }

    /// Columns stored on this entity's own table, id first.
    ///
    /// M2O foreign keys are included; O2M keys live on the target table.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = Vec::with_capacity(1 + self.fields.len() + self.edges.len());
        cols.push(self.id_column.clone());
        cols.extend(self.fields.iter().map(|f| f.name.clone()));
        for edge in &self.edges {
            if edge.rel == super::Rel::M2O && !cols.contains(&edge.column) {
                cols.push(edge.column.clone());
            }
        }
        cols
    }

    /// Whether `column` can be selected from this entity's table.
    pub fn valid_column(&self, column: &str) -> bool {
        self.column_type(column).is_some()
    }

    /// Storage type of a column on this entity's table. Ids and foreign keys
    /// are strings.
    pub fn column_type(&self, column: &str) -> Option<FieldType> {
        if column == self.id_column {
            return Some(FieldType::String);
        }
        if let Some(field) = self.field_desc(column) {
            return Some(field.ty);
        }
        self.edges
            .iter()
            .any(|e| e.rel == super::Rel::M2O && e.column == column)
            .then_some(FieldType::String)
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("id_column", &self.id_column)
            .field("id_default", &self.id_default)
            .field("fields", &self.fields)
            .field("edges", &self.edges)
            .field("hooks", &self.hooks.len())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
