//! Mutation operation kinds.

use std::fmt;

bitflags::bitflags! {
    /// Operation performed by a mutation.
    ///
    /// A mutation carries exactly one flag; hook conditions match against a
    /// union such as `Op::CREATE | Op::DELETE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Op: u8 {
        /// Insert one entity.
        const CREATE = 1 << 0;
        /// Update every entity matching the predicates.
        const UPDATE = 1 << 1;
        /// Update one entity by id.
        const UPDATE_ONE = 1 << 2;
        /// Delete every entity matching the predicates.
        const DELETE = 1 << 3;
        /// Delete one entity by id.
        const DELETE_ONE = 1 << 4;
    }
}

impl Op {
    /// Returns true when `self` shares any flag with `other`.
    pub fn is(self, other: Op) -> bool {
        self.intersects(other)
    }

    /// Returns true for operations that target a single entity by id.
    pub fn is_single(self) -> bool {
        self.intersects(Op::UPDATE_ONE | Op::DELETE_ONE)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .iter()
            .map(|flag| match flag {
                Op::CREATE => "Create",
                Op::UPDATE => "Update",
                Op::UPDATE_ONE => "UpdateOne",
                Op::DELETE => "Delete",
                Op::DELETE_ONE => "DeleteOne",
                _ => "Unknown",
            })
            .collect();
        if names.is_empty() {
            f.write_str("Op(empty)")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}
