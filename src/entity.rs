//! Materialized entities and pipeline outcomes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    persist::Record,
    schema::EntityDescriptor,
    types::{EntityId, Value},
};

/// A stored entity as returned by creates, updates, and queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity type name.
    pub entity: String,
    /// Primary key.
    pub id: EntityId,
    /// Column values other than the id, including NULLs.
    pub fields: BTreeMap<String, Value>,
}

impl Entity {
    /// Builds an entity from a driver row keyed by column name.
    pub fn from_record(desc: &EntityDescriptor, mut record: Record) -> Result<Self> {
        let id = match record.remove(&desc.id_column) {
            Some(Value::String(id)) => EntityId(id),
            Some(other) => {
                return Err(Error::config(format!(
                    "{} id column holds {other}, expected a string",
                    desc.name
                )));
            }
            None => {
                return Err(Error::config(format!(
                    "{} row is missing its id column",
                    desc.name
                )));
            }
        };
        Ok(Self {
            entity: desc.name.clone(),
            id,
            fields: record,
        })
    }

    /// Field value, or `None` when the column was not loaded.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String field value.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Time field value in milliseconds.
    pub fn get_time(&self, field: &str) -> Option<u64> {
        self.get(field).and_then(Value::as_time)
    }
}

/// What the core executor produced for one mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Single-entity create or update.
    Entity(Entity),
    /// Every entity created by a bulk insert.
    Entities(Vec<Entity>),
    /// Row count for predicate updates and deletes.
    Affected(usize),
}

impl Outcome {
    /// The single entity, or a config error for any other outcome.
    pub fn into_entity(self) -> Result<Entity> {
        match self {
            Self::Entity(e) => Ok(e),
            other => Err(unexpected("an entity", &other)),
        }
    }

    /// Every entity, treating a single entity as a list of one.
    pub fn into_entities(self) -> Result<Vec<Entity>> {
        match self {
            Self::Entities(es) => Ok(es),
            Self::Entity(e) => Ok(vec![e]),
            other => Err(unexpected("entities", &other)),
        }
    }

    /// The row count, or a config error for any other outcome.
    pub fn affected(&self) -> Result<usize> {
        match self {
            Self::Affected(n) => Ok(*n),
            other => Err(unexpected("a row count", other)),
        }
    }
}

fn unexpected(want: &str, got: &Outcome) -> Error {
    let got = match got {
        Outcome::Entity(_) => "an entity",
        Outcome::Entities(_) => "entities",
        Outcome::Affected(_) => "a row count",
    };
    Error::config(format!("unexpected mutation outcome: wanted {want}, hook returned {got}"))
}
