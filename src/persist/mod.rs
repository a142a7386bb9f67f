//! Storage driver contract.

/// SQLite driver.
pub mod sqlite;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{
    context::Context,
    spec::{BatchCreateSpec, CreateSpec, DeleteSpec, QuerySpec, UpdateSpec},
    types::{EntityId, Value},
};

/// One row read back from storage, keyed by column name.
pub type Record = BTreeMap<String, Value>;

/// Errors raised by a [`Driver`].
#[derive(Debug, Error)]
pub enum DriverError {
    /// SQLite failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// JSON column encoding failure.
    #[error("json: {0}")]
    Serde(#[from] serde_json::Error),
    /// A relation write found a target already owned elsewhere.
    #[error("constraint: {0}")]
    Constraint(String),
    /// A single-row write matched nothing.
    #[error("no rows matched")]
    NotFound,
    /// The context was canceled.
    #[error("context canceled")]
    Cancelled,
    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// Free-form driver error.
    #[error("{0}")]
    Message(String),
}

/// Result type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// Executes storage specs. One call per spec; multi-statement writes are
/// atomic.
pub trait Driver: Send + Sync {
    /// Inserts one node and its edges. `None` when a do-nothing conflict
    /// skipped the row.
    fn create_node(&self, ctx: &Context, spec: &CreateSpec) -> DriverResult<Option<EntityId>>;

    /// Inserts every node atomically and returns one entry per input node,
    /// in input order: the stored id, or `None` when a do-nothing conflict
    /// skipped the node.
    fn batch_create(&self, ctx: &Context, spec: &BatchCreateSpec) -> DriverResult<Vec<Option<EntityId>>>;

    /// Updates the node named by `spec.node_id` and reads back the selected
    /// columns. [`DriverError::NotFound`] when no row matches.
    fn update_node(&self, ctx: &Context, spec: &UpdateSpec) -> DriverResult<Record>;

    /// Updates every matching node and returns how many matched.
    fn update_nodes(&self, ctx: &Context, spec: &UpdateSpec) -> DriverResult<usize>;

    /// Deletes the node named by `spec.node_id`, or every match, and returns
    /// how many rows went.
    fn delete_nodes(&self, ctx: &Context, spec: &DeleteSpec) -> DriverResult<usize>;

    /// Reads the selected columns of every matching node.
    fn query_nodes(&self, ctx: &Context, spec: &QuerySpec) -> DriverResult<Vec<Record>>;

    /// Counts matching nodes, ignoring limit and offset.
    fn count_nodes(&self, ctx: &Context, spec: &QuerySpec) -> DriverResult<usize>;

    /// True for uniqueness, primary-key, and foreign-key violations.
    fn is_constraint_error(&self, err: &DriverError) -> bool {
        matches!(err, DriverError::Constraint(_))
    }
}

/// Fails fast once the context is cancelled or past its deadline.
pub(crate) fn check_context(ctx: &Context) -> DriverResult<()> {
    match ctx.err() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
