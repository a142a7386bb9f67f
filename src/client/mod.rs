//! Descriptor-driven builders over the mutation pipeline.
//!
//! One family of builders serves every entity in the registry. Builders are
//! single-use values: each consumes itself on `save`/`exec`.

/// Create, bulk create, and upsert builders.
pub mod create;
/// Delete builders.
pub mod delete;
/// Query builder.
pub mod query;
/// Update builders.
pub mod update;

use std::{fmt, sync::Arc};

use hashbrown::HashMap;

use crate::{
    context::Context,
    core::{hook::Hook, intercept::Interceptor, mutation::Mutation},
    entity::{Entity, Outcome},
    error::{Error, Result},
    op::Op,
    persist::{Driver, DriverError},
    schema::{EntityDescriptor, Registry},
    spec::predicate,
    types::{EntityId, Value},
};

pub use create::{Create, CreateBulk, MAX_BULK_ROWS, UpsertBulk, UpsertOne};
pub use delete::{Delete, DeleteOne};
pub use query::Query;
pub use update::{Update, UpdateOne};

type HookList = Arc<[Arc<dyn Hook>]>;
type InterceptorList = Arc<[Arc<dyn Interceptor>]>;

struct Inner {
    registry: Arc<Registry>,
    driver: Arc<dyn Driver>,
    hooks: HashMap<String, HookList>,
    interceptors: HashMap<String, InterceptorList>,
}

/// Entry point: a registry, a driver, and the hooks fixed at build time.
///
/// Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Starts a client over `registry` and `driver` with no client hooks.
    pub fn builder(registry: Arc<Registry>, driver: Arc<dyn Driver>) -> ClientBuilder {
        ClientBuilder {
            registry,
            driver,
            global: Vec::new(),
            per_entity: HashMap::new(),
            global_interceptors: Vec::new(),
            entity_interceptors: HashMap::new(),
        }
    }

    /// The schema this client serves.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The storage driver every builder writes through.
    pub fn driver(&self) -> &dyn Driver {
        self.inner.driver.as_ref()
    }

    /// Builder access for one entity type.
    pub fn entity(&self, name: &str) -> Result<EntityClient> {
        let desc = self.inner.registry.entity(name)?.clone();
        let hooks = self
            .inner
            .hooks
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()));
        let interceptors = self
            .inner
            .interceptors
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()));
        Ok(EntityClient {
            client: self.clone(),
            desc,
            hooks,
            interceptors,
        })
    }

    /// Runs a prebuilt mutation through the builder its operation names.
    pub fn mutate(&self, ctx: &Context, mutation: Mutation) -> Result<Outcome> {
        let entity = self.entity(mutation.entity())?;
        match mutation.op() {
            Op::CREATE => entity.create_from(mutation).run(ctx),
            Op::UPDATE => entity
                .update_from(mutation)
                .save(ctx)
                .map(Outcome::Affected),
            Op::UPDATE_ONE => entity
                .update_one_from(mutation)
                .save(ctx)
                .map(Outcome::Entity),
            Op::DELETE => entity
                .delete_from(mutation)
                .exec(ctx)
                .map(Outcome::Affected),
            Op::DELETE_ONE => entity
                .delete_one_from(mutation)
                .exec(ctx)
                .map(|()| Outcome::Affected(1)),
            op => Err(Error::config(format!("unknown mutation op {op}"))),
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("registry", &self.inner.registry)
            .field("hooked_entities", &self.inner.hooks.len())
            .finish()
    }
}

/// Collects hooks and interceptors before the client is frozen.
pub struct ClientBuilder {
    registry: Arc<Registry>,
    driver: Arc<dyn Driver>,
    global: Vec<Arc<dyn Hook>>,
    per_entity: HashMap<String, Vec<Arc<dyn Hook>>>,
    global_interceptors: Vec<Arc<dyn Interceptor>>,
    entity_interceptors: HashMap<String, Vec<Arc<dyn Interceptor>>>,
}

impl ClientBuilder {
    /// Adds hooks for every entity, after those already added.
    pub fn use_hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn Hook>>) -> Self {
        self.global.extend(hooks);
        self
    }

    /// Adds one hook for every entity.
    pub fn use_hook(mut self, hook: impl Hook + 'static) -> Self {
        self.global.push(Arc::new(hook));
        self
    }

    /// Adds hooks for one entity. They run inside the global hooks.
    pub fn entity_hooks(
        mut self,
        entity: impl Into<String>,
        hooks: impl IntoIterator<Item = Arc<dyn Hook>>,
    ) -> Self {
        self.per_entity.entry(entity.into()).or_default().extend(hooks);
        self
    }

    /// Adds one hook for one entity.
    pub fn entity_hook(self, entity: impl Into<String>, hook: impl Hook + 'static) -> Self {
        let hook: Arc<dyn Hook> = Arc::new(hook);
        self.entity_hooks(entity, [hook])
    }

    /// Adds a query interceptor for every entity, after those already added.
    pub fn use_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.global_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Adds a query interceptor for one entity, inside the global ones.
    pub fn entity_interceptor(
        mut self,
        entity: impl Into<String>,
        interceptor: impl Interceptor + 'static,
    ) -> Self {
        self.entity_interceptors
            .entry(entity.into())
            .or_default()
            .push(Arc::new(interceptor));
        self
    }

    /// Freezes the hook and interceptor lists: global, then per-entity,
    /// then schema-declared.
    pub fn build(self) -> Result<Client> {
        if let Some(name) = self
            .per_entity
            .keys()
            .find(|name| self.registry.entity(name).is_err())
        {
            return Err(Error::config(format!("hooks registered for unknown entity {name:?}")));
        }
        if let Some(name) = self
            .entity_interceptors
            .keys()
            .find(|name| self.registry.entity(name).is_err())
        {
            return Err(Error::config(format!(
                "interceptors registered for unknown entity {name:?}"
            )));
        }

        let mut hooks = HashMap::new();
        for desc in self.registry.entities() {
            let list: Vec<Arc<dyn Hook>> = self
                .global
                .iter()
                .chain(self.per_entity.get(&desc.name).into_iter().flatten())
                .chain(desc.hooks.iter())
                .cloned()
                .collect();
            tracing::debug!(entity = %desc.name, hooks = list.len(), "installed hooks");
            hooks.insert(desc.name.clone(), HookList::from(list));
        }

        let mut interceptors = HashMap::new();
        for desc in self.registry.entities() {
            let list: Vec<Arc<dyn Interceptor>> = self
                .global_interceptors
                .iter()
                .chain(self.entity_interceptors.get(&desc.name).into_iter().flatten())
                .chain(desc.interceptors.iter())
                .cloned()
                .collect();
            interceptors.insert(desc.name.clone(), InterceptorList::from(list));
        }

        Ok(Client {
            inner: Arc::new(Inner {
                registry: self.registry,
                driver: self.driver,
                hooks,
                interceptors,
            }),
        })
    }
}

/// Builders for one entity type.
#[derive(Clone)]
pub struct EntityClient {
    client: Client,
    desc: Arc<EntityDescriptor>,
    hooks: HookList,
    interceptors: InterceptorList,
}

impl EntityClient {
    /// The descriptor this client builds for.
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.desc
    }

    /// The client this was taken from.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Effective hook list, outermost first.
    pub fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.hooks
    }

    /// Effective query interceptor list, outermost first.
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    /// Builder for one new entity.
    pub fn create(&self) -> Create {
        self.create_from(Mutation::new(self.desc.name.clone(), Op::CREATE))
    }

    /// Builder inserting every row of `builders` at once.
    pub fn create_bulk(&self, builders: impl IntoIterator<Item = Create>) -> CreateBulk {
        CreateBulk::new(self.clone(), builders.into_iter().collect())
    }

    /// Builder updating every matching entity.
    pub fn update(&self) -> Update {
        self.update_from(Mutation::new(self.desc.name.clone(), Op::UPDATE))
    }

    /// Builder updating the entity with `id`.
    pub fn update_one_id(&self, id: impl Into<EntityId>) -> UpdateOne {
        let mut m = Mutation::new(self.desc.name.clone(), Op::UPDATE_ONE);
        m.set_id(id.into());
        self.update_one_from(m)
    }

    /// Builder updating `entity`.
    pub fn update_one(&self, entity: &Entity) -> UpdateOne {
        self.update_one_id(entity.id.clone())
    }

    /// Builder deleting every matching entity.
    pub fn delete(&self) -> Delete {
        self.delete_from(Mutation::new(self.desc.name.clone(), Op::DELETE))
    }

    /// Builder deleting the entity with `id`.
    pub fn delete_one_id(&self, id: impl Into<EntityId>) -> DeleteOne {
        let mut m = Mutation::new(self.desc.name.clone(), Op::DELETE_ONE);
        m.set_id(id.into());
        self.delete_one_from(m)
    }

    /// Builder deleting `entity`.
    pub fn delete_one(&self, entity: &Entity) -> DeleteOne {
        self.delete_one_id(entity.id.clone())
    }

    /// Read builder.
    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }

    /// Loads one entity by id.
    pub fn get(&self, ctx: &Context, id: impl Into<EntityId>) -> Result<Entity> {
        let id = id.into();
        self.query()
            .where_(predicate::id_eq(&self.desc.id_column, &id))
            .only(ctx)
    }

    pub(crate) fn create_from(&self, mutation: Mutation) -> Create {
        Create::new(self.clone(), mutation)
    }

    pub(crate) fn update_from(&self, mutation: Mutation) -> Update {
        Update::new(self.clone(), mutation)
    }

    pub(crate) fn update_one_from(&self, mutation: Mutation) -> UpdateOne {
        UpdateOne::new(self.clone(), mutation)
    }

    pub(crate) fn delete_from(&self, mutation: Mutation) -> Delete {
        Delete::new(self.clone(), mutation)
    }

    pub(crate) fn delete_one_from(&self, mutation: Mutation) -> DeleteOne {
        DeleteOne::new(self.clone(), mutation)
    }

    pub(crate) fn registry(&self) -> &Registry {
        self.client.registry()
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.client.driver()
    }

    /// Maps a driver failure onto the error taxonomy for this entity.
    pub(crate) fn classify(&self, err: DriverError) -> Error {
        let is_constraint = self.driver().is_constraint_error(&err);
        let err = Error::classify(err, self.desc.label(), is_constraint);
        tracing::debug!(entity = %self.desc.name, error = %err, "driver call failed");
        err
    }
}

impl fmt::Debug for EntityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityClient")
            .field("entity", &self.desc.name)
            .field("hooks", &self.hooks.len())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// Field and edge setters shared by the create and update builders.
pub trait MutationBuilder: Sized {
    /// The pending mutation.
    fn mutation(&self) -> &Mutation;

    /// Mutable access to the pending mutation.
    fn mutation_mut(&mut self) -> &mut Mutation;

    /// Assigns `value` to `field`.
    fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.mutation_mut().set_field(field, value);
        self
    }

    /// Sets the field when `value` is `Some`.
    fn set_opt<V: Into<Value>>(self, field: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(field, value),
            None => self,
        }
    }

    /// Sets `field` to NULL.
    fn clear(mut self, field: impl Into<String>) -> Self {
        self.mutation_mut().clear_field(field);
        self
    }

    /// Appends to a JSON array field without reading it first.
    fn append(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = serde_json::Value>,
    ) -> Self {
        self.mutation_mut().append_field(field, values);
        self
    }

    /// Connects the targets `ids` over `edge`.
    fn add_edge_ids<I: Into<EntityId>>(
        mut self,
        edge: impl Into<String>,
        ids: impl IntoIterator<Item = I>,
    ) -> Self {
        self.mutation_mut()
            .add_edge_ids(edge, ids.into_iter().map(Into::into));
        self
    }

    /// Disconnects the targets `ids` from `edge`.
    fn remove_edge_ids<I: Into<EntityId>>(
        mut self,
        edge: impl Into<String>,
        ids: impl IntoIterator<Item = I>,
    ) -> Self {
        self.mutation_mut()
            .remove_edge_ids(edge, ids.into_iter().map(Into::into));
        self
    }

    /// Disconnects every target of `edge`.
    fn clear_edge(mut self, edge: impl Into<String>) -> Self {
        self.mutation_mut().clear_edge(edge);
        self
    }
}
