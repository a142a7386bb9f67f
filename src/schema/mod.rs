//! Schema registry: entity, field, and edge descriptors plus default providers.

/// Built-in default providers.
pub mod defaults;
/// Relationship descriptors.
pub mod edge;
/// Entity descriptors.
pub mod entity;
/// Field descriptors and validators.
pub mod field;
/// Built-in validators.
pub mod validate;

use std::{fmt, sync::Arc};

use hashbrown::{HashMap, HashSet};

use crate::{
    error::{Error, Result},
    types::Value,
};

pub use edge::{EdgeDescriptor, JoinDescriptor, Rel};
pub use entity::{EntityDescriptor, IdDefault};
pub use field::{DefaultValue, FieldDescriptor, Validator};

/// Generator for default values, e.g. the current time.
pub type Provider = Arc<dyn Fn() -> Value + Send + Sync>;

/// Which write a provider serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultOn {
    /// Fill unset fields on create.
    Create,
    /// Fill unset fields on update.
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProviderKey {
    scope: String,
    field: String,
    on: DefaultOn,
}

/// Immutable set of entity descriptors and default providers.
pub struct Registry {
    entities: HashMap<String, Arc<EntityDescriptor>>,
    order: Vec<String>,
    providers: HashMap<ProviderKey, Provider>,
}

impl Registry {
    /// Starts an empty registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up an entity by name.
    pub fn entity(&self, name: &str) -> Result<&Arc<EntityDescriptor>> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown entity {name:?}")))
    }

    /// Entities in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> {
        self.order.iter().filter_map(|name| self.entities.get(name))
    }

    /// Provider registered for `field` under `scope`.
    pub fn provider(&self, scope: &str, field: &str, on: DefaultOn) -> Option<&Provider> {
        self.providers.get(&ProviderKey {
            scope: scope.to_string(),
            field: field.to_string(),
            on,
        })
    }

    /// Runs the provider for `scope.field`, failing when none is registered.
    pub fn generate(&self, scope: &str, field: &str, on: DefaultOn) -> Result<Value> {
        let provider = self.provider(scope, field, on).ok_or_else(|| {
            let kind = match on {
                DefaultOn::Create => "default",
                DefaultOn::Update => "update default",
            };
            Error::config(format!(
                "uninitialized {scope}.{field} {kind} provider (forgotten provider registration?)"
            ))
        })?;
        Ok(provider())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.order)
            .field("providers", &self.providers.len())
            .finish()
    }
}

/// Collects descriptors and providers, then validates them in [`build`](Self::build).
#[derive(Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityDescriptor>,
    providers: HashMap<ProviderKey, Provider>,
}

impl RegistryBuilder {
    /// Adds an entity descriptor.
    pub fn entity(mut self, desc: EntityDescriptor) -> Self {
        self.entities.push(desc);
        self
    }

    /// Registers a create-time provider for `scope.field`. `scope` is an
    /// entity name or a join table name.
    pub fn provider(
        self,
        scope: impl Into<String>,
        field: impl Into<String>,
        provider: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.with_provider(scope.into(), field.into(), DefaultOn::Create, provider)
    }

    /// Registers an update-time provider for `scope.field`.
    pub fn update_provider(
        self,
        scope: impl Into<String>,
        field: impl Into<String>,
        provider: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.with_provider(scope.into(), field.into(), DefaultOn::Update, provider)
    }

    fn with_provider(
        mut self,
        scope: String,
        field: String,
        on: DefaultOn,
        provider: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.providers
            .insert(ProviderKey { scope, field, on }, Arc::new(provider));
        self
    }

    /// Checks names, edges, and keys, then freezes the registry.
    pub fn build(self) -> Result<Registry> {
        let names: HashSet<String> = self.entities.iter().map(|e| e.name.clone()).collect();
        if names.len() != self.entities.len() {
            return Err(Error::config("duplicate entity name in registry"));
        }

        for desc in &self.entities {
            let mut seen = HashSet::new();
            seen.insert(desc.id_column.as_str());
            for field in &desc.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(Error::config(format!(
                        "duplicate column {:?} on entity {}",
                        field.name, desc.name
                    )));
                }
            }

            let mut edge_names = HashSet::new();
            for edge in &desc.edges {
                if !edge_names.insert(edge.name.as_str()) {
                    return Err(Error::config(format!(
                        "duplicate edge {:?} on entity {}",
                        edge.name, desc.name
                    )));
                }
                if !names.contains(edge.target.as_str()) {
                    return Err(Error::config(format!(
                        "edge {}.{} targets unknown entity {:?}",
                        desc.name, edge.name, edge.target
                    )));
                }
                match edge.rel {
                    Rel::M2M if edge.join.is_none() => {
                        return Err(Error::config(format!(
                            "many-to-many edge {}.{} has no join table",
                            desc.name, edge.name
                        )));
                    }
                    Rel::O2M | Rel::M2O if edge.column.is_empty() => {
                        return Err(Error::config(format!(
                            "edge {}.{} has no key column",
                            desc.name, edge.name
                        )));
                    }
                    Rel::M2O if desc.field_desc(&edge.column).is_some() => {
                        return Err(Error::config(format!(
                            "edge {}.{} key column collides with a field",
                            desc.name, edge.name
                        )));
                    }
                    _ => {}
                }
            }
        }

        let order = self.entities.iter().map(|e| e.name.clone()).collect();
        let entities = self
            .entities
            .into_iter()
            .map(|e| (e.name.clone(), Arc::new(e)))
            .collect();

        Ok(Registry {
            entities,
            order,
            providers: self.providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> EntityDescriptor {
        EntityDescriptor::new("Project", "projects")
            .field(FieldDescriptor::string("name"))
            .edge(EdgeDescriptor::o2m("applications", "Application", "project_id"))
    }

    fn child() -> EntityDescriptor {
        EntityDescriptor::new("Application", "applications")
            .edge(EdgeDescriptor::m2o("project", "Project", "project_id"))
    }

    #[test]
    fn build_keeps_declaration_order() {
        let registry = Registry::builder()
            .entity(owner())
            .entity(child())
            .build()
            .expect("registry");

        let names: Vec<&str> = registry.entities().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Project", "Application"]);
        assert_eq!(registry.entity("Application").expect("entity").table, "applications");
    }

    #[test]
    fn build_rejects_duplicates_and_dangling_edges() {
        let err = Registry::builder()
            .entity(owner())
            .entity(child())
            .entity(owner())
            .build()
            .err()
            .expect("duplicate entity");
        assert!(matches!(err, Error::Config(_)));

        let err = Registry::builder().entity(owner()).build().err().expect("dangling edge");
        assert_eq!(
            err.to_string(),
            "entmut: edge Project.applications targets unknown entity \"Application\""
        );
    }
}
