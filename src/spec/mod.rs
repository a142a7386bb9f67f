//! Storage-level write and read specs.
//!
//! The core executor turns a validated [`Mutation`](crate::core::mutation::Mutation)
//! into one of these and hands it to the driver. Specs carry table and column
//! names only; they know nothing about hooks or entity labels.

/// Defaulting, validation, and spec construction.
pub mod build;
/// Row filters.
pub mod predicate;

use crate::{
    schema::Rel,
    types::{EntityId, FieldType, Value},
};

pub use predicate::Predicate;

/// One column assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Column name.
    pub column: String,
    /// Column type.
    pub ty: FieldType,
    /// Assigned value.
    pub value: Value,
}

impl FieldSpec {
    /// An assignment of `value` to `column`.
    pub fn new(column: impl Into<String>, ty: FieldType, value: Value) -> Self {
        Self {
            column: column.into(),
            ty,
            value,
        }
    }
}

/// Relation write for O2M and M2M edges.
///
/// For O2M `table` is the target table and `columns` holds the foreign key.
/// For M2M `table` is the join table and `columns` is `[source, target]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    /// O2M or M2M.
    pub rel: Rel,
    /// Target or join table.
    pub table: String,
    /// Key columns.
    pub columns: Vec<String>,
    /// Id column of the target table, used by O2M writes.
    pub target_id_column: String,
    /// Target ids. Empty in a clear spec means every target.
    pub nodes: Vec<EntityId>,
    /// Extra join-row columns, already defaulted.
    pub fields: Vec<FieldSpec>,
}

/// Resolved conflict handling for an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    /// Conflict target columns; empty means any constraint.
    pub target: Vec<String>,
    /// What happens to a conflicting row.
    pub action: ConflictAction,
}

/// Conflict resolution for an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    /// `DO NOTHING`: skip the row.
    DoNothing,
    /// `DO UPDATE SET` with these clauses.
    Update(Vec<ConflictSet>),
}

/// One `SET` clause of a conflict update.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictSet {
    /// `col = ?`
    Value(String, FieldType, Value),
    /// `col = excluded.col`
    Excluded(String),
    /// `col = NULL`
    Null(String),
    /// `col = col`, keeping the stored value.
    Keep(String),
}

impl ConflictSet {
    /// The column being set.
    pub fn column(&self) -> &str {
        match self {
            Self::Value(col, _, _) | Self::Excluded(col) | Self::Null(col) | Self::Keep(col) => col,
        }
    }
}

/// User-facing conflict options, resolved into an [`OnConflict`] by the
/// builder when the insert spec is made.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictOption {
    /// Conflict target columns.
    Columns(Vec<String>),
    /// Skip the row on conflict.
    DoNothing,
    /// Keep the stored row unchanged, still returning its id.
    Ignore,
    /// Overwrite every inserted column except the id and immutable fields.
    UpdateNewValues,
    /// Set a column to a fixed value on conflict.
    Set(String, Value),
    /// Set a column to the proposed insert value on conflict.
    SetExcluded(String),
    /// Set a column to NULL on conflict.
    SetNull(String),
}

/// Insert of one node, with its relations.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSpec {
    /// Entity table.
    pub table: String,
    /// Id column and value.
    pub id: FieldSpec,
    /// Column values other than the id.
    pub fields: Vec<FieldSpec>,
    /// Relations written after the row.
    pub edges: Vec<EdgeSpec>,
    /// Conflict handling, when the insert is an upsert.
    pub on_conflict: Option<OnConflict>,
}

/// Insert of many nodes in one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCreateSpec {
    /// Rows to insert, sharing one column list.
    pub nodes: Vec<CreateSpec>,
    /// Conflict handling shared by every row.
    pub on_conflict: Option<OnConflict>,
}

/// Update of one node by id, or of every node matching a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    /// Entity table.
    pub table: String,
    /// Primary key column.
    pub id_column: String,
    /// Target id for a single-node update.
    pub node_id: Option<EntityId>,
    /// Extra filter; for a single node it must also hold.
    pub predicate: Option<Predicate>,
    /// Columns assigned a value.
    pub set: Vec<FieldSpec>,
    /// Columns set to NULL.
    pub clear: Vec<String>,
    /// JSON array columns and the elements to append, as a JSON array.
    pub append: Vec<FieldSpec>,
    /// Relations to remove before `edges_add`.
    pub edges_clear: Vec<EdgeSpec>,
    /// Relations to add.
    pub edges_add: Vec<EdgeSpec>,
    /// Columns to read back after a single-node update.
    pub select: Vec<(String, FieldType)>,
}

impl UpdateSpec {
    /// True when the spec touches no column and no edge.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.clear.is_empty()
            && self.append.is_empty()
            && self.edges_clear.is_empty()
            && self.edges_add.is_empty()
    }
}

/// Delete of one node by id, or of every node matching a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSpec {
    /// Entity table.
    pub table: String,
    /// Primary key column.
    pub id_column: String,
    /// Target id for a single-node delete.
    pub node_id: Option<EntityId>,
    /// Filter rows must match.
    pub predicate: Option<Predicate>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// Column to sort on.
    pub column: String,
    /// Direction.
    pub direction: Direction,
}

/// Read of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Entity table.
    pub table: String,
    /// Columns to load, with their types.
    pub columns: Vec<(String, FieldType)>,
    /// Row filter.
    pub predicate: Option<Predicate>,
    /// Sort keys, in precedence order.
    pub order: Vec<OrderBy>,
    /// Row cap.
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: Option<usize>,
}
