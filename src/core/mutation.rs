use std::collections::{BTreeMap, BTreeSet};

use crate::{
    op::Op,
    spec::predicate::Predicate,
    types::{EntityId, Value},
};

/// Pending relation changes for one edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeChange {
    /// Targets to connect.
    pub added: Vec<EntityId>,
    /// Targets to disconnect.
    pub removed: Vec<EntityId>,
    /// Whether every existing target is disconnected first.
    pub cleared: bool,
}

/// One pending change to one entity type.
///
/// Mutated in place by builder setters, consumed once by the pipeline's core
/// executor, which marks it done. A done mutation is never executed again.
#[derive(Debug, Clone)]
pub struct Mutation {
    entity: String,
    op: Op,
    id: Option<EntityId>,
    fields: BTreeMap<String, Value>,
    cleared: BTreeSet<String>,
    appended: BTreeMap<String, Vec<serde_json::Value>>,
    predicates: Vec<Predicate>,
    edges: BTreeMap<String, EdgeChange>,
    done: bool,
}

impl Mutation {
    /// An empty mutation of `op` on `entity`.
    pub fn new(entity: impl Into<String>, op: Op) -> Self {
        Self {
            entity: entity.into(),
            op,
            id: None,
            fields: BTreeMap::new(),
            cleared: BTreeSet::new(),
            appended: BTreeMap::new(),
            predicates: Vec::new(),
            edges: BTreeMap::new(),
            done: false,
        }
    }

    /// Name of the entity type this mutation targets.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The operation.
    pub fn op(&self) -> Op {
        self.op
    }

    /// Target id, once known.
    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    /// Sets the target id.
    pub fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    /// Assigns a field, undoing any earlier clear of it.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        self.cleared.remove(&name);
        self.fields.insert(name, value.into());
    }

    /// Value assigned to `name`, if any.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Fields assigned so far, in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Marks a field to be set to NULL, dropping any pending assignment.
    pub fn clear_field(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.fields.remove(&name);
        self.appended.remove(&name);
        self.cleared.insert(name);
    }

    /// True when `name` is set to NULL.
    pub fn field_cleared(&self, name: &str) -> bool {
        self.cleared.contains(name)
    }

    /// Fields set to NULL.
    pub fn cleared_fields(&self) -> impl Iterator<Item = &str> {
        self.cleared.iter().map(String::as_str)
    }

    /// Queues elements to append to a JSON array column.
    pub fn append_field(
        &mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = serde_json::Value>,
    ) {
        self.appended.entry(name.into()).or_default().extend(values);
    }

    /// Values appended to the JSON array `name`.
    pub fn appended(&self, name: &str) -> Option<&[serde_json::Value]> {
        self.appended.get(name).map(Vec::as_slice)
    }

    /// Every append, by field.
    pub fn appended_fields(&self) -> impl Iterator<Item = (&str, &[serde_json::Value])> {
        self.appended.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Drops every pending change to `name`.
    pub fn reset_field(&mut self, name: &str) {
        self.fields.remove(name);
        self.cleared.remove(name);
        self.appended.remove(name);
    }

    /// Connects `ids` over `edge`.
    pub fn add_edge_ids(&mut self, edge: impl Into<String>, ids: impl IntoIterator<Item = EntityId>) {
        let change = self.edges.entry(edge.into()).or_default();
        for id in ids {
            if !change.added.contains(&id) {
                change.added.push(id);
            }
        }
    }

    /// Disconnects `ids` from `edge`.
    pub fn remove_edge_ids(
        &mut self,
        edge: impl Into<String>,
        ids: impl IntoIterator<Item = EntityId>,
    ) {
        let change = self.edges.entry(edge.into()).or_default();
        for id in ids {
            if !change.removed.contains(&id) {
                change.removed.push(id);
            }
        }
    }

    /// Disconnects every target of `edge`.
    pub fn clear_edge(&mut self, edge: impl Into<String>) {
        self.edges.entry(edge.into()).or_default().cleared = true;
    }

    /// Pending changes to `name`.
    pub fn edge(&self, name: &str) -> Option<&EdgeChange> {
        self.edges.get(name)
    }

    /// Every edge with pending changes.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &EdgeChange)> {
        self.edges.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Restricts a predicate update or delete.
    pub fn add_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    /// Filters added with [`add_predicate`](Self::add_predicate).
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// True once the core executor has run the mutation.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn mark_done(&mut self) {
        self.done = true;
    }
}
