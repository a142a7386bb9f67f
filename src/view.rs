//! JSON views of entities and merge-patch input for updates.
//!
//! A view is a flat object: `id` plus one key per loaded column. A patch is an
//! RFC 7386 merge patch against that view; only the keys it names can change.

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};

use crate::{
    client::{EntityClient, MutationBuilder, UpdateOne},
    context::Context,
    entity::Entity,
    error::{Error, Result},
    schema::{EntityDescriptor, Rel},
    types::{EntityId, FieldType, Value},
};

impl Entity {
    /// Flat JSON object with `id` and every loaded column.
    pub fn to_view(&self) -> Json {
        let mut obj = Map::new();
        obj.insert("id".to_string(), Json::String(self.id.0.clone()));
        for (name, value) in &self.fields {
            obj.insert(name.clone(), value.to_json());
        }
        Json::Object(obj)
    }
}

/// Applies `patch` to `target` per RFC 7386.
pub fn merge_patch(target: &mut Json, patch: &Json) {
    let Json::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Json::Object(Map::new());
    }
    if let Json::Object(obj) = target {
        for (key, value) in patch {
            if value.is_null() {
                obj.remove(key);
            } else {
                merge_patch(obj.entry(key.clone()).or_insert(Json::Null), value);
            }
        }
    }
}

/// A merge patch for one entity, as received from a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchInput {
    patch: Json,
}

/// Result of applying a patch: the patched entity and the columns that
/// actually changed.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchedEntity {
    /// The entity with the patch applied.
    pub entity: Entity,
    /// Fields the patch changed, by name.
    pub changes: BTreeMap<String, Value>,
}

impl PatchInput {
    /// Wraps a parsed merge patch.
    pub fn new(patch: Json) -> Self {
        Self { patch }
    }

    /// Parses a merge patch from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let patch = serde_json::from_slice(bytes)
            .map_err(|err| Error::validation("patch", format!("invalid JSON: {err}")))?;
        Ok(Self::new(patch))
    }

    /// The raw patch document.
    pub fn patch(&self) -> &Json {
        &self.patch
    }

    /// Applies the patch to `current` and type-checks every changed column.
    pub fn apply_to(&self, desc: &EntityDescriptor, current: &Entity) -> Result<PatchedEntity> {
        let Json::Object(keys) = &self.patch else {
            return Err(Error::validation("patch", "a patch must be a JSON object"));
        };
        let before = current.to_view();
        let mut after = before.clone();
        merge_patch(&mut after, &self.patch);

        let mut patched = current.clone();
        let mut changes = BTreeMap::new();
        for key in keys.keys() {
            let old = before.get(key).unwrap_or(&Json::Null);
            let new = after.get(key).unwrap_or(&Json::Null);
            if key == "id" || *key == desc.id_column {
                if old != new {
                    return Err(Error::validation(key, format!("field {key} is immutable")));
                }
                continue;
            }
            let Some(ty) = desc.column_type(key) else {
                return Err(Error::validation(
                    key,
                    format!("unknown field \"{}.{key}\"", desc.label()),
                ));
            };
            if old == new {
                continue;
            }
            if desc.field_desc(key).is_some_and(|f| f.immutable) {
                return Err(Error::validation(key, format!("field {key} is immutable")));
            }
            let value = Value::from_json(ty, new).ok_or_else(|| {
                Error::validation(key, format!("expected a {ty} value, got {new}"))
            })?;
            patched.fields.insert(key.clone(), value.clone());
            changes.insert(key.clone(), value);
        }
        Ok(PatchedEntity {
            entity: patched,
            changes,
        })
    }

    /// Builds an update of `current` carrying only the changed columns.
    ///
    /// NULL clears a field or a many-to-one edge.
    pub fn update_one(&self, client: &EntityClient, current: &Entity) -> Result<UpdateOne> {
        let desc = client.descriptor();
        let patched = self.apply_to(desc, current)?;
        let mut update = client.update_one(current);
        for (column, value) in patched.changes {
            let edge = desc
                .edges
                .iter()
                .find(|e| e.rel == Rel::M2O && e.column == column);
            update = match (edge, value) {
                (Some(edge), Value::Null) => update.clear_edge(edge.name.clone()),
                (Some(edge), Value::String(id)) => {
                    update.add_edge_ids(edge.name.clone(), [EntityId(id)])
                }
                (Some(edge), other) => {
                    return Err(Error::validation(
                        &edge.column,
                        format!("expected a {} id, got {other}", FieldType::String),
                    ));
                }
                (None, Value::Null) => update.clear(column),
                (None, value) => update.set(column, value),
            };
        }
        Ok(update)
    }

    /// Loads the entity by id, then builds the update as [`PatchInput::update_one`].
    pub fn update_by_id(
        &self,
        ctx: &Context,
        client: &EntityClient,
        id: impl Into<EntityId>,
    ) -> Result<UpdateOne> {
        let current = client.get(ctx, id)?;
        self.update_one(client, &current)
    }
}
