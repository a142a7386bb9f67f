use crate::{
    context::Context,
    core::{hook::execute, mutation::Mutation},
    entity::{Entity, Outcome},
    error::Result,
    spec::{
        Predicate,
        build::{apply_update_defaults, build_update_spec, check_update},
    },
};

use super::{EntityClient, MutationBuilder};

/// Updates every entity matching the predicates.
pub struct Update {
    client: EntityClient,
    mutation: Mutation,
}

impl MutationBuilder for Update {
    fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    fn mutation_mut(&mut self) -> &mut Mutation {
        &mut self.mutation
    }
}

impl Update {
    pub(crate) fn new(client: EntityClient, mutation: Mutation) -> Self {
        Self { client, mutation }
    }

    /// Adds a predicate; several are AND-ed.
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.mutation.add_predicate(predicate);
        self
    }

    /// Returns how many entities matched.
    pub fn save(self, ctx: &Context) -> Result<usize> {
        let Update {
            client,
            mut mutation,
        } = self;
        apply_update_defaults(client.registry(), &client.desc, &mut mutation)?;
        check_update(&client.desc, &mutation)?;
        execute(ctx, &mut mutation, &client.hooks, |ctx, m| {
            check_update(&client.desc, m)?;
            let spec = build_update_spec(client.registry(), &client.desc, m, &[])?;
            let n = client
                .driver()
                .update_nodes(ctx, &spec)
                .map_err(|err| client.classify(err))?;
            Ok(Outcome::Affected(n))
        })?
        .affected()
    }

    /// Runs the update, discarding the count.
    pub fn exec(self, ctx: &Context) -> Result<()> {
        self.save(ctx).map(|_| ())
    }
}

/// Updates one entity by id and returns it as stored.
#[derive(Debug)]
pub struct UpdateOne {
    client: EntityClient,
    mutation: Mutation,
    select: Vec<String>,
}

impl MutationBuilder for UpdateOne {
    fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    fn mutation_mut(&mut self) -> &mut Mutation {
        &mut self.mutation
    }
}

impl UpdateOne {
    pub(crate) fn new(client: EntityClient, mutation: Mutation) -> Self {
        Self {
            client,
            mutation,
            select: Vec::new(),
        }
    }

    /// Extra guard on the row; a row failing it counts as not found.
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.mutation.add_predicate(predicate);
        self
    }

    /// Limits the columns read back. The id is always read.
    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Runs the update and returns the entity as stored afterwards.
    pub fn save(self, ctx: &Context) -> Result<Entity> {
        let UpdateOne {
            client,
            mut mutation,
            select,
        } = self;
        apply_update_defaults(client.registry(), &client.desc, &mut mutation)?;
        check_update(&client.desc, &mutation)?;
        execute(ctx, &mut mutation, &client.hooks, |ctx, m| {
            check_update(&client.desc, m)?;
            let spec = build_update_spec(client.registry(), &client.desc, m, &select)?;
            let record = client
                .driver()
                .update_node(ctx, &spec)
                .map_err(|err| client.classify(err))?;
            Entity::from_record(&client.desc, record).map(Outcome::Entity)
        })?
        .into_entity()
    }

    /// Runs the update, discarding the entity.
    pub fn exec(self, ctx: &Context) -> Result<()> {
        self.save(ctx).map(|_| ())
    }
}
