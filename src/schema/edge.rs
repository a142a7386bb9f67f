//! Relationship descriptors.

use super::field::FieldDescriptor;

/// Cardinality and storage layout of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rel {
    /// One owner, many targets. The key column lives on the target table.
    O2M,
    /// Many sources, one target. The key column lives on the source table.
    M2O,
    /// Many to many through a join table.
    M2M,
}

/// Join table backing a many-to-many edge.
///
/// Extra fields are defaulted on every insert; providers are looked up under
/// the join table name.
#[derive(Debug, Clone)]
pub struct JoinDescriptor {
    /// Join table name.
    pub table: String,
    /// Column holding the id of the entity that declares the edge.
    pub source_column: String,
    /// Column holding the id of the edge target.
    pub target_column: String,
    /// Extra columns on each join row.
    pub fields: Vec<FieldDescriptor>,
}

impl JoinDescriptor {
    /// A join table with its two key columns.
    pub fn new(
        table: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
            fields: Vec::new(),
        }
    }

    /// Adds an extra join-row column.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }
}

/// One named relationship of an entity.
#[derive(Debug, Clone)]
pub struct EdgeDescriptor {
    /// Edge name used by builders.
    pub name: String,
    /// Name of the target entity.
    pub target: String,
    /// Cardinality.
    pub rel: Rel,
    /// Foreign key column for O2M and M2O edges.
    pub column: String,
    /// Join table, for M2M edges only.
    pub join: Option<JoinDescriptor>,
}

impl EdgeDescriptor {
    /// Owner side; `column` is added to the target's table.
    pub fn o2m(name: impl Into<String>, target: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            rel: Rel::O2M,
            column: column.into(),
            join: None,
        }
    }

    /// Inverse side; `column` lives on this entity's own table.
    pub fn m2o(name: impl Into<String>, target: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            rel: Rel::M2O,
            column: column.into(),
            join: None,
        }
    }

    /// Many-to-many through `join`.
    pub fn m2m(name: impl Into<String>, target: impl Into<String>, join: JoinDescriptor) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            rel: Rel::M2M,
            column: String::new(),
            join: Some(join),
        }
    }
}
