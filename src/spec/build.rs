//! Turns validated mutations into storage specs.
//!
//! Builders call the `apply_*_defaults` and `check_*` functions before any
//! hook runs; the core executor calls the `check_*` functions again and then
//! the `build_*` functions once the hooks have passed.

use std::collections::BTreeMap;

use crate::{
    core::mutation::Mutation,
    entity::Entity,
    error::{Error, Result},
    op::Op,
    schema::{
        DefaultOn, DefaultValue, EdgeDescriptor, EntityDescriptor, IdDefault, JoinDescriptor,
        Registry, Rel, defaults,
    },
    types::{EntityId, FieldType, Value},
};

use super::{
    ConflictAction, ConflictOption, ConflictSet, CreateSpec, DeleteSpec, EdgeSpec, FieldSpec,
    OnConflict, Predicate, UpdateSpec,
};

/// Fills the id and every unset field that declares a create default.
pub fn apply_create_defaults(
    registry: &Registry,
    desc: &EntityDescriptor,
    m: &mut Mutation,
) -> Result<()> {
    if m.id().is_none() {
        match desc.id_default {
            IdDefault::Uuid => {
                if let Value::String(id) = defaults::new_id() {
                    m.set_id(EntityId(id));
                }
            }
            IdDefault::Provider => {
                match registry.generate(&desc.name, &desc.id_column, DefaultOn::Create)? {
                    Value::String(id) => m.set_id(EntityId(id)),
                    other => {
                        return Err(Error::config(format!(
                            "{}.{} provider returned {other}, expected a string",
                            desc.name, desc.id_column
                        )));
                    }
                }
            }
            IdDefault::Manual => {}
        }
    }

    for field in &desc.fields {
        if m.field(&field.name).is_some() || m.field_cleared(&field.name) {
            continue;
        }
        match &field.default {
            Some(DefaultValue::Static(value)) => m.set_field(field.name.clone(), value.clone()),
            Some(DefaultValue::Provider) => {
                let value = registry.generate(&desc.name, &field.name, DefaultOn::Create)?;
                m.set_field(field.name.clone(), value);
            }
            None => {}
        }
    }
    Ok(())
}

/// Fills every unset field that declares an update default.
pub fn apply_update_defaults(
    registry: &Registry,
    desc: &EntityDescriptor,
    m: &mut Mutation,
) -> Result<()> {
    for field in desc.fields.iter().filter(|f| f.update_default) {
        if m.field(&field.name).is_none() && !m.field_cleared(&field.name) {
            let value = registry.generate(&desc.name, &field.name, DefaultOn::Update)?;
            m.set_field(field.name.clone(), value);
        }
    }
    Ok(())
}

fn check_target(desc: &EntityDescriptor, m: &Mutation, allowed: Op) -> Result<()> {
    if m.entity() != desc.name {
        return Err(Error::config(format!(
            "unexpected mutation for entity {}, expected {}",
            m.entity(),
            desc.name
        )));
    }
    if !m.op().is(allowed) {
        return Err(Error::config(format!(
            "{} mutation cannot run as {allowed}",
            m.op()
        )));
    }
    Ok(())
}

fn unknown_field(desc: &EntityDescriptor, name: &str) -> Error {
    Error::validation(name, format!("unknown field \"{}.{name}\"", desc.label()))
}

fn check_predicates(desc: &EntityDescriptor, preds: &[Predicate]) -> Result<()> {
    for pred in preds {
        if let Some(col) = pred.columns().into_iter().find(|c| !desc.valid_column(c)) {
            return Err(Error::validation(
                col,
                format!("invalid column {col:?} in {} predicate", desc.label()),
            ));
        }
    }
    Ok(())
}

fn check_edges(desc: &EntityDescriptor, m: &Mutation, create: bool) -> Result<()> {
    for (name, change) in m.edges() {
        let edge = desc.edge_desc(name).ok_or_else(|| {
            Error::validation(name, format!("unknown edge \"{}.{name}\"", desc.label()))
        })?;
        if create && (change.cleared || !change.removed.is_empty()) {
            return Err(Error::validation(
                name,
                "edges can only be added on create",
            ));
        }
        if edge.rel == Rel::M2O {
            if change.added.len() > 1 {
                return Err(Error::validation(
                    name,
                    format!("edge \"{}.{name}\" takes at most one target", desc.label()),
                ));
            }
            if !change.removed.is_empty() {
                return Err(Error::validation(
                    name,
                    format!("edge \"{}.{name}\" is unique; clear it instead", desc.label()),
                ));
            }
        }
    }
    Ok(())
}

/// Local checks for a create: required fields, types, validators, edges.
pub fn check_create(desc: &EntityDescriptor, m: &Mutation) -> Result<()> {
    check_target(desc, m, Op::CREATE)?;
    if m.id().is_none() {
        return Err(Error::missing_required(desc.label(), &desc.id_column));
    }
    for (name, value) in m.fields() {
        let field = desc.field_desc(name).ok_or_else(|| unknown_field(desc, name))?;
        field
            .check_value(desc.label(), value)
            .map_err(|cause| Error::validation(name, cause))?;
    }
    for field in &desc.fields {
        if !field.optional && m.field(&field.name).is_none() {
            return Err(Error::missing_required(desc.label(), &field.name));
        }
    }
    if let Some(name) = m.cleared_fields().next() {
        return Err(Error::validation(name, "fields cannot be cleared on create"));
    }
    if let Some((name, _)) = m.appended_fields().next() {
        return Err(Error::validation(name, "fields cannot be appended on create"));
    }
    check_edges(desc, m, true)
}

/// Local checks for an update: mutability, nullability, types, validators.
pub fn check_update(desc: &EntityDescriptor, m: &Mutation) -> Result<()> {
    check_target(desc, m, Op::UPDATE | Op::UPDATE_ONE)?;
    if m.op() == Op::UPDATE_ONE && m.id().is_none() {
        return Err(Error::missing_required(desc.label(), &desc.id_column));
    }
    for (name, value) in m.fields() {
        let field = desc.field_desc(name).ok_or_else(|| unknown_field(desc, name))?;
        if field.immutable {
            return Err(Error::validation(name, format!("field {name} is immutable")));
        }
        field
            .check_value(desc.label(), value)
            .map_err(|cause| Error::validation(name, cause))?;
    }
    for name in m.cleared_fields() {
        let field = desc.field_desc(name).ok_or_else(|| unknown_field(desc, name))?;
        if field.immutable {
            return Err(Error::validation(name, format!("field {name} is immutable")));
        }
        if !field.optional {
            return Err(Error::validation(
                name,
                format!("field \"{}.{name}\" is not optional and cannot be cleared", desc.label()),
            ));
        }
    }
    for (name, _) in m.appended_fields() {
        let field = desc.field_desc(name).ok_or_else(|| unknown_field(desc, name))?;
        if field.immutable {
            return Err(Error::validation(name, format!("field {name} is immutable")));
        }
        if field.ty != FieldType::Json {
            return Err(Error::validation(
                name,
                format!("field \"{}.{name}\" is not a JSON array", desc.label()),
            ));
        }
    }
    check_predicates(desc, m.predicates())?;
    check_edges(desc, m, false)
}

/// Checks a delete mutation names its target.
pub fn check_delete(desc: &EntityDescriptor, m: &Mutation) -> Result<()> {
    check_target(desc, m, Op::DELETE | Op::DELETE_ONE)?;
    if m.op() == Op::DELETE_ONE && m.id().is_none() {
        return Err(Error::missing_required(desc.label(), &desc.id_column));
    }
    check_predicates(desc, m.predicates())
}

fn coerce(ty: FieldType, value: Value) -> Value {
    match (ty, value) {
        (FieldType::Float, Value::Int(v)) => Value::Float(v as f64),
        (_, value) => value,
    }
}

/// Extra join-row columns for a many-to-many insert, with join defaults run.
///
/// Providers are looked up under the join table name.
pub fn join_fields(registry: &Registry, join: &JoinDescriptor) -> Result<Vec<FieldSpec>> {
    let mut out = Vec::with_capacity(join.fields.len());
    for field in &join.fields {
        let value = match &field.default {
            Some(DefaultValue::Static(value)) => value.clone(),
            Some(DefaultValue::Provider) => {
                registry.generate(&join.table, &field.name, DefaultOn::Create)?
            }
            None if field.optional => continue,
            None => return Err(Error::missing_required(&join.table, &field.name)),
        };
        field
            .check_value(&join.table, &value)
            .map_err(|cause| Error::validation(&field.name, cause))?;
        out.push(FieldSpec::new(&field.name, field.ty, coerce(field.ty, value)));
    }
    Ok(out)
}

fn edge_spec(
    registry: &Registry,
    edge: &EdgeDescriptor,
    nodes: Vec<EntityId>,
    with_defaults: bool,
) -> Result<EdgeSpec> {
    let target = registry.entity(&edge.target)?;
    match (edge.rel, &edge.join) {
        (Rel::M2M, Some(join)) => Ok(EdgeSpec {
            rel: Rel::M2M,
            table: join.table.clone(),
            columns: vec![join.source_column.clone(), join.target_column.clone()],
            target_id_column: target.id_column.clone(),
            nodes,
            fields: if with_defaults {
                join_fields(registry, join)?
            } else {
                Vec::new()
            },
        }),
        (Rel::M2M, None) => Err(Error::config(format!(
            "many-to-many edge {} has no join table",
            edge.name
        ))),
        (rel, _) => Ok(EdgeSpec {
            rel,
            table: target.table.clone(),
            columns: vec![edge.column.clone()],
            target_id_column: target.id_column.clone(),
            nodes,
            fields: Vec::new(),
        }),
    }
}

/// Builds the insert spec and the entity it will produce.
///
/// Unset fields appear on the entity as NULL so it matches a later read.
pub fn build_create_spec(
    registry: &Registry,
    desc: &EntityDescriptor,
    m: &Mutation,
    conflict: &[ConflictOption],
) -> Result<(Entity, CreateSpec)> {
    let id = m
        .id()
        .cloned()
        .ok_or_else(|| Error::missing_required(desc.label(), &desc.id_column))?;
    let mut node = Entity {
        entity: desc.name.clone(),
        id: id.clone(),
        fields: BTreeMap::new(),
    };
    let mut spec = CreateSpec {
        table: desc.table.clone(),
        id: FieldSpec::new(&desc.id_column, FieldType::String, id.into()),
        fields: Vec::new(),
        edges: Vec::new(),
        on_conflict: None,
    };

    for field in &desc.fields {
        match m.field(&field.name) {
            Some(value) => {
                let value = coerce(field.ty, value.clone());
                spec.fields
                    .push(FieldSpec::new(&field.name, field.ty, value.clone()));
                node.fields.insert(field.name.clone(), value);
            }
            None => {
                node.fields.insert(field.name.clone(), Value::Null);
            }
        }
    }

    for edge in &desc.edges {
        let added = m.edge(&edge.name).map(|c| c.added.as_slice()).unwrap_or_default();
        match edge.rel {
            Rel::M2O => {
                let value = added.first().cloned().map(Value::from).unwrap_or(Value::Null);
                if !value.is_null() {
                    spec.fields
                        .push(FieldSpec::new(&edge.column, FieldType::String, value.clone()));
                }
                node.fields.insert(edge.column.clone(), value);
            }
            _ if added.is_empty() => {}
            _ => spec.edges.push(edge_spec(registry, edge, added.to_vec(), true)?),
        }
    }

    let inserted: Vec<&str> = std::iter::once(spec.id.column.as_str())
        .chain(spec.fields.iter().map(|f| f.column.as_str()))
        .collect();
    spec.on_conflict = resolve_conflict(desc, conflict, &inserted)?;
    Ok((node, spec))
}

fn upsert_set(sets: &mut Vec<ConflictSet>, set: ConflictSet) {
    match sets.iter().position(|s| s.column() == set.column()) {
        Some(i) => sets[i] = set,
        None => sets.push(set),
    }
}

/// Resolves conflict options against the columns an insert writes.
///
/// Options apply in order; a later option for the same column wins. The id
/// column and immutable fields are never overwritten.
pub fn resolve_conflict(
    desc: &EntityDescriptor,
    options: &[ConflictOption],
    inserted: &[&str],
) -> Result<Option<OnConflict>> {
    if options.is_empty() {
        return Ok(None);
    }
    let protected = |col: &str| {
        col == desc.id_column || desc.field_desc(col).is_some_and(|f| f.immutable)
    };
    let writable = |col: &str| -> Result<()> {
        if !desc.valid_column(col) {
            return Err(Error::validation(
                col,
                format!("unknown column {col:?} for {} upsert", desc.label()),
            ));
        }
        if protected(col) {
            return Err(Error::validation(col, format!("field {col} is immutable")));
        }
        Ok(())
    };

    let mut target = Vec::new();
    let mut do_nothing = false;
    let mut resolved = false;
    let mut sets = Vec::new();
    for option in options {
        match option {
            ConflictOption::Columns(cols) => {
                if let Some(col) = cols.iter().find(|c| !desc.valid_column(c)) {
                    return Err(Error::validation(
                        col,
                        format!("unknown conflict column {col:?} for {}", desc.label()),
                    ));
                }
                target = cols.clone();
            }
            ConflictOption::DoNothing => {
                do_nothing = true;
                resolved = true;
            }
            ConflictOption::Ignore => {
                for col in inserted {
                    upsert_set(&mut sets, ConflictSet::Keep(col.to_string()));
                }
                resolved = true;
            }
            ConflictOption::UpdateNewValues => {
                for col in inserted.iter().filter(|c| !protected(**c)) {
                    upsert_set(&mut sets, ConflictSet::Excluded(col.to_string()));
                }
                resolved = true;
            }
            ConflictOption::Set(col, value) => {
                writable(col.as_str())?;
                let ty = desc.column_type(col).unwrap_or(FieldType::String);
                if let Some(field) = desc.field_desc(col) {
                    field
                        .check_value(desc.label(), value)
                        .map_err(|cause| Error::validation(col, cause))?;
                }
                upsert_set(
                    &mut sets,
                    ConflictSet::Value(col.clone(), ty, coerce(ty, value.clone())),
                );
                resolved = true;
            }
            ConflictOption::SetExcluded(col) => {
                writable(col.as_str())?;
                upsert_set(&mut sets, ConflictSet::Excluded(col.clone()));
                resolved = true;
            }
            ConflictOption::SetNull(col) => {
                writable(col.as_str())?;
                if desc.field_desc(col).is_some_and(|f| !f.optional) {
                    return Err(Error::validation(
                        col,
                        format!("field \"{}.{col}\" is not optional", desc.label()),
                    ));
                }
                upsert_set(&mut sets, ConflictSet::Null(col.clone()));
                resolved = true;
            }
        }
    }

    if !resolved {
        return Err(Error::validation(
            "on_conflict",
            "missing conflict resolution (do_nothing, ignore, update_new_values or set)",
        ));
    }
    let action = if do_nothing {
        ConflictAction::DoNothing
    } else {
        if sets.is_empty() {
            sets.push(ConflictSet::Keep(desc.id_column.clone()));
        }
        ConflictAction::Update(sets)
    };
    Ok(Some(OnConflict { target, action }))
}

/// Column list for reads. Empty `fields` selects every column; the id
/// column is always included, first.
pub fn select_columns(desc: &EntityDescriptor, fields: &[String]) -> Result<Vec<(String, FieldType)>> {
    let names = if fields.is_empty() {
        desc.columns()
    } else {
        let mut names = vec![desc.id_column.clone()];
        for f in fields {
            if !desc.valid_column(f) {
                return Err(Error::validation(
                    f,
                    format!("invalid field {f:?} for {} query", desc.label()),
                ));
            }
            if !names.contains(f) {
                names.push(f.clone());
            }
        }
        names
    };
    Ok(names
        .into_iter()
        .filter_map(|n| desc.column_type(&n).map(|ty| (n, ty)))
        .collect())
}

/// Builds the update spec for a validated update mutation.
pub fn build_update_spec(
    registry: &Registry,
    desc: &EntityDescriptor,
    m: &Mutation,
    select: &[String],
) -> Result<UpdateSpec> {
    let mut spec = UpdateSpec {
        table: desc.table.clone(),
        id_column: desc.id_column.clone(),
        node_id: None,
        predicate: Predicate::all(m.predicates()),
        set: Vec::new(),
        clear: Vec::new(),
        append: Vec::new(),
        edges_clear: Vec::new(),
        edges_add: Vec::new(),
        select: Vec::new(),
    };
    if m.op() == Op::UPDATE_ONE {
        let id = m
            .id()
            .cloned()
            .ok_or_else(|| Error::missing_required(desc.label(), &desc.id_column))?;
        spec.node_id = Some(id);
        spec.select = select_columns(desc, select)?;
    }

    for (name, value) in m.fields() {
        let field = desc.field_desc(name).ok_or_else(|| unknown_field(desc, name))?;
        spec.set
            .push(FieldSpec::new(name, field.ty, coerce(field.ty, value.clone())));
    }
    spec.clear.extend(m.cleared_fields().map(str::to_string));
    for (name, values) in m.appended_fields() {
        spec.append.push(FieldSpec::new(
            name,
            FieldType::Json,
            Value::Json(serde_json::Value::Array(values.to_vec())),
        ));
    }

    for edge in &desc.edges {
        let Some(change) = m.edge(&edge.name) else {
            continue;
        };
        match edge.rel {
            Rel::M2O => {
                if let Some(target) = change.added.first() {
                    spec.set.push(FieldSpec::new(
                        &edge.column,
                        FieldType::String,
                        target.clone().into(),
                    ));
                } else if change.cleared {
                    spec.clear.push(edge.column.clone());
                }
            }
            _ => {
                if change.cleared {
                    spec.edges_clear
                        .push(edge_spec(registry, edge, Vec::new(), false)?);
                } else if !change.removed.is_empty() {
                    spec.edges_clear
                        .push(edge_spec(registry, edge, change.removed.clone(), false)?);
                }
                if !change.added.is_empty() {
                    spec.edges_add
                        .push(edge_spec(registry, edge, change.added.clone(), true)?);
                }
            }
        }
    }
    Ok(spec)
}

/// Builds the delete spec for a delete mutation.
pub fn build_delete_spec(desc: &EntityDescriptor, m: &Mutation) -> Result<DeleteSpec> {
    let node_id = if m.op() == Op::DELETE_ONE {
        Some(
            m.id()
                .cloned()
                .ok_or_else(|| Error::missing_required(desc.label(), &desc.id_column))?,
        )
    } else {
        None
    };
    Ok(DeleteSpec {
        table: desc.table.clone(),
        id_column: desc.id_column.clone(),
        node_id,
        predicate: Predicate::all(m.predicates()),
    })
}
