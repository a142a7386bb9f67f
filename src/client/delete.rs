use crate::{
    context::Context,
    core::{hook::execute, mutation::Mutation},
    entity::Outcome,
    error::{Error, Result},
    spec::{
        Predicate,
        build::{build_delete_spec, check_delete},
    },
};

use super::EntityClient;

/// Deletes every entity matching the predicates.
pub struct Delete {
    client: EntityClient,
    mutation: Mutation,
}

impl Delete {
    pub(crate) fn new(client: EntityClient, mutation: Mutation) -> Self {
        Self { client, mutation }
    }

    /// Adds a filter; every filter must hold.
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.mutation.add_predicate(predicate);
        self
    }

    /// Returns how many entities were deleted.
    pub fn exec(self, ctx: &Context) -> Result<usize> {
        let Delete {
            client,
            mut mutation,
        } = self;
        run(ctx, &client, &mut mutation)?.affected()
    }
}

/// Deletes one entity by id.
pub struct DeleteOne {
    client: EntityClient,
    mutation: Mutation,
}

impl DeleteOne {
    pub(crate) fn new(client: EntityClient, mutation: Mutation) -> Self {
        Self { client, mutation }
    }

    /// Adds a filter the row must also match.
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.mutation.add_predicate(predicate);
        self
    }

    /// Fails with not-found when no row matched.
    pub fn exec(self, ctx: &Context) -> Result<()> {
        let DeleteOne {
            client,
            mut mutation,
        } = self;
        match run(ctx, &client, &mut mutation)?.affected()? {
            0 => Err(Error::not_found(client.desc.label())),
            _ => Ok(()),
        }
    }
}

fn run(ctx: &Context, client: &EntityClient, mutation: &mut Mutation) -> Result<Outcome> {
    check_delete(&client.desc, mutation)?;
    execute(ctx, mutation, &client.hooks, |ctx, m| {
        check_delete(&client.desc, m)?;
        let spec = build_delete_spec(&client.desc, m)?;
        let n = client
            .driver()
            .delete_nodes(ctx, &spec)
            .map_err(|err| client.classify(err))?;
        Ok(Outcome::Affected(n))
    })
}
