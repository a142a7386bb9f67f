//! Runtime event stream payloads.

use crate::types::EntityId;

/// Events emitted by the writer after a mutation commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// Entities were inserted.
    Created {
        /// Entity type name.
        entity: String,
        /// Stored ids, in insert order.
        ids: Vec<EntityId>,
    },
    /// Entities were updated.
    Updated {
        /// Entity type name.
        entity: String,
        /// Target id for single-entity updates.
        id: Option<EntityId>,
        /// Rows matched.
        affected: usize,
    },
    /// Entities were deleted.
    Deleted {
        /// Entity type name.
        entity: String,
        /// Target id for single-entity deletes.
        id: Option<EntityId>,
        /// Rows removed.
        affected: usize,
    },
}
