use crate::{
    context::Context,
    core::{hook::execute, mutation::Mutation},
    entity::{Entity, Outcome},
    error::{Error, Result},
    spec::{
        BatchCreateSpec, ConflictOption, CreateSpec,
        build::{apply_create_defaults, build_create_spec, check_create, resolve_conflict},
    },
    types::{EntityId, Value},
};

use super::{EntityClient, MutationBuilder};

/// Builder for inserting one entity.
pub struct Create {
    client: EntityClient,
    mutation: Mutation,
    conflict: Vec<ConflictOption>,
}

impl MutationBuilder for Create {
    fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    fn mutation_mut(&mut self) -> &mut Mutation {
        &mut self.mutation
    }
}

impl Create {
    pub(crate) fn new(client: EntityClient, mutation: Mutation) -> Self {
        Self {
            client,
            mutation,
            conflict: Vec::new(),
        }
    }

    /// Uses `id` instead of a generated one.
    pub fn set_id(mut self, id: impl Into<EntityId>) -> Self {
        self.mutation.set_id(id.into());
        self
    }

    /// Turns the insert into an upsert with the given options.
    pub fn on_conflict(self, options: impl IntoIterator<Item = ConflictOption>) -> UpsertOne {
        let mut create = self;
        create.conflict.extend(options);
        UpsertOne { create }
    }

    /// Upsert on a conflict over `columns`; pick a resolution on the result.
    pub fn on_conflict_columns<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> UpsertOne {
        let columns = columns.into_iter().map(Into::into).collect();
        self.on_conflict([ConflictOption::Columns(columns)])
    }

    /// Runs the pipeline and returns the created entity.
    pub fn save(self, ctx: &Context) -> Result<Entity> {
        self.run(ctx)?.into_entity()
    }

    /// Runs the pipeline, discarding the result.
    pub fn exec(self, ctx: &Context) -> Result<()> {
        self.run(ctx).map(|_| ())
    }

    pub(crate) fn run(self, ctx: &Context) -> Result<Outcome> {
        let Create {
            client,
            mut mutation,
            conflict,
        } = self;
        apply_create_defaults(client.registry(), &client.desc, &mut mutation)?;
        check_create(&client.desc, &mutation)?;
        execute(ctx, &mut mutation, &client.hooks, |ctx, m| {
            client.sql_save(ctx, m, &conflict)
        })
    }

    fn has_do_nothing(&self) -> bool {
        self.conflict.contains(&ConflictOption::DoNothing)
    }
}

impl EntityClient {
    fn sql_save(&self, ctx: &Context, m: &mut Mutation, conflict: &[ConflictOption]) -> Result<Outcome> {
        check_create(&self.desc, m)?;
        let (mut node, spec) = build_create_spec(self.registry(), &self.desc, m, conflict)?;
        match self.driver().create_node(ctx, &spec) {
            Ok(Some(id)) => {
                if id != node.id {
                    node.id = id.clone();
                    m.set_id(id);
                }
                Ok(Outcome::Entity(node))
            }
            Ok(None) => Err(Error::not_found(self.desc.label())),
            Err(err) => Err(self.classify(err)),
        }
    }
}

/// Insert of one entity with conflict handling.
pub struct UpsertOne {
    create: Create,
}

impl UpsertOne {
    fn push(mut self, option: ConflictOption) -> Self {
        self.create.conflict.push(option);
        self
    }

    /// Overwrite the stored row with the proposed values, except the id and
    /// immutable fields.
    pub fn update_new_values(self) -> Self {
        self.push(ConflictOption::UpdateNewValues)
    }

    /// Keep the stored row as is and return its id.
    pub fn ignore(self) -> Self {
        self.push(ConflictOption::Ignore)
    }

    /// Skip the row on conflict.
    pub fn do_nothing(self) -> Self {
        self.push(ConflictOption::DoNothing)
    }

    /// On conflict, set `field` to `value`.
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(ConflictOption::Set(field.into(), value.into()))
    }

    /// Take the proposed value for `field`.
    pub fn set_excluded(self, field: impl Into<String>) -> Self {
        self.push(ConflictOption::SetExcluded(field.into()))
    }

    /// On conflict, set `field` to NULL.
    pub fn clear(self, field: impl Into<String>) -> Self {
        self.push(ConflictOption::SetNull(field.into()))
    }

    /// Runs the upsert. A row skipped by `do_nothing` is not an error.
    pub fn exec(self, ctx: &Context) -> Result<()> {
        let skip_ok = self.create.has_do_nothing();
        match self.create.run(ctx) {
            Ok(_) => Ok(()),
            Err(err) if skip_ok && err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Runs the upsert and returns the id of the stored row.
    ///
    /// Fails with not-found when `do_nothing` skipped the row.
    pub fn id(self, ctx: &Context) -> Result<EntityId> {
        Ok(self.create.run(ctx)?.into_entity()?.id)
    }
}

/// Most rows one bulk create accepts. Every row's hooks stay on the stack
/// until the insert returns.
pub const MAX_BULK_ROWS: usize = 10_000;

/// Batches up to this size nest their hooks on the caller's stack.
const INLINE_ROWS: usize = 64;
const BASE_STACK_BYTES: usize = 2 * 1024 * 1024;
/// Worker stack reserved per nested row.
const ROW_STACK_BYTES: usize = 16 * 1024;

/// Builder for inserting many entities with a single statement.
///
/// Every row is defaulted and validated first. Then row 0's hooks wrap row
/// 1's hooks, and so on; the insert runs once the last row's hooks pass.
/// A hook that fails on a later row leaves earlier rows' hooks run with
/// nothing written.
///
/// Batches larger than a few dozen rows run the nested hooks on a scoped
/// worker thread whose stack is sized for the nesting depth. More than
/// [`MAX_BULK_ROWS`] rows fail validation.
pub struct CreateBulk {
    client: EntityClient,
    builders: Vec<Create>,
    conflict: Vec<ConflictOption>,
}

struct BulkState<'a> {
    client: &'a EntityClient,
    conflict: &'a [ConflictOption],
    specs: Vec<(Entity, CreateSpec)>,
    /// One slot per row once flushed; `None` for rows skipped on conflict.
    nodes: Vec<Option<Entity>>,
}

impl CreateBulk {
    pub(crate) fn new(client: EntityClient, builders: Vec<Create>) -> Self {
        Self {
            client,
            builders,
            conflict: Vec::new(),
        }
    }

    /// Turns the insert into an upsert with the given options.
    pub fn on_conflict(mut self, options: impl IntoIterator<Item = ConflictOption>) -> UpsertBulk {
        self.conflict.extend(options);
        UpsertBulk { bulk: self }
    }

    /// Upsert on a conflict over `columns`; pick a resolution on the result.
    pub fn on_conflict_columns<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> UpsertBulk {
        let columns = columns.into_iter().map(Into::into).collect();
        self.on_conflict([ConflictOption::Columns(columns)])
    }

    /// Inserts every row and returns the stored entities in input order.
    ///
    /// Rows skipped by a `do_nothing` conflict are left out.
    pub fn save(self, ctx: &Context) -> Result<Vec<Entity>> {
        let CreateBulk {
            client,
            builders,
            conflict,
        } = self;
        if builders.is_empty() {
            return Ok(Vec::new());
        }
        if builders.len() > MAX_BULK_ROWS {
            return Err(Error::validation(
                "bulk",
                format!(
                    "{} rows exceed the bulk create limit of {MAX_BULK_ROWS}",
                    builders.len()
                ),
            ));
        }

        let mut rows = Vec::with_capacity(builders.len());
        for builder in builders {
            if builder.client.desc.name != client.desc.name {
                return Err(Error::config(format!(
                    "bulk create for {} got a {} builder",
                    client.desc.name, builder.client.desc.name
                )));
            }
            let mut m = builder.mutation;
            apply_create_defaults(client.registry(), &client.desc, &mut m)?;
            check_create(&client.desc, &m)?;
            rows.push(m);
        }

        let mut state = BulkState {
            client: &client,
            conflict: &conflict,
            specs: Vec::with_capacity(rows.len()),
            nodes: Vec::new(),
        };
        nest_rows(ctx, &mut state, &mut rows)?;
        Ok(state.nodes.into_iter().flatten().collect())
    }

    /// Inserts every row, discarding the result.
    pub fn exec(self, ctx: &Context) -> Result<()> {
        self.save(ctx).map(|_| ())
    }
}

/// Runs the nested row hooks, moving to a worker thread with room for the
/// nesting once the batch outgrows the caller's stack.
fn nest_rows(ctx: &Context, state: &mut BulkState<'_>, rows: &mut [Mutation]) -> Result<()> {
    if rows.len() <= INLINE_ROWS {
        return run_row(ctx, state, rows, 0).map(|_| ());
    }

    let stack = BASE_STACK_BYTES + rows.len() * ROW_STACK_BYTES;
    let span = tracing::Span::current();
    tracing::trace!(rows = rows.len(), stack, "nesting bulk hooks on a worker");
    std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name("entmut-bulk".to_string())
            .stack_size(stack)
            .spawn_scoped(scope, move || span.in_scope(|| run_row(ctx, state, rows, 0)))
            .map_err(|err| Error::config(format!("failed to start bulk create worker: {err}")))?;
        match worker.join() {
            Ok(result) => result.map(|_| ()),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    })
}

fn run_row(ctx: &Context, state: &mut BulkState<'_>, rows: &mut [Mutation], index: usize) -> Result<Outcome> {
    let Some((row, rest)) = rows.split_first_mut() else {
        return Ok(Outcome::Entities(Vec::new()));
    };
    let hooks = state.client.hooks.clone();
    execute(ctx, row, &hooks, |ctx, m| {
        check_create(&state.client.desc, m)?;
        let built = build_create_spec(state.client.registry(), &state.client.desc, m, &[])?;
        state.specs.push(built);
        if rest.is_empty() {
            state.flush(ctx)?;
        } else {
            run_row(ctx, state, rest, index + 1)?;
        }
        match state.nodes.get(index) {
            Some(Some(node)) => {
                m.set_id(node.id.clone());
                Ok(Outcome::Entity(node.clone()))
            }
            Some(None) => Ok(Outcome::Affected(0)),
            None => Err(Error::config(format!("bulk create row {index} was not written"))),
        }
    })
}

impl BulkState<'_> {
    /// One insert for every collected row.
    fn flush(&mut self, ctx: &Context) -> Result<()> {
        let client = self.client;
        let desc = &client.desc;
        let (nodes, specs): (Vec<Entity>, Vec<CreateSpec>) =
            std::mem::take(&mut self.specs).into_iter().unzip();

        let on_conflict = {
            let mut inserted: Vec<&str> = vec![desc.id_column.as_str()];
            for spec in &specs {
                for field in &spec.fields {
                    if !inserted.contains(&field.column.as_str()) {
                        inserted.push(&field.column);
                    }
                }
            }
            resolve_conflict(desc, self.conflict, &inserted)?
        };

        let batch = BatchCreateSpec {
            nodes: specs,
            on_conflict,
        };
        let ids = client
            .driver()
            .batch_create(ctx, &batch)
            .map_err(|err| client.classify(err))?;
        if ids.len() != nodes.len() {
            return Err(Error::config(format!(
                "driver returned {} ids for {} {} rows",
                ids.len(),
                nodes.len(),
                desc.name
            )));
        }

        self.nodes = nodes
            .into_iter()
            .zip(ids)
            .map(|(mut node, id)| {
                id.map(|id| {
                    node.id = id;
                    node
                })
            })
            .collect();
        let skipped = self.nodes.iter().filter(|n| n.is_none()).count();
        if skipped > 0 {
            tracing::debug!(
                entity = %desc.name,
                rows = self.nodes.len(),
                skipped,
                "bulk insert skipped conflicting rows"
            );
        }
        Ok(())
    }
}

/// Bulk insert with conflict handling shared by every row.
pub struct UpsertBulk {
    bulk: CreateBulk,
}

impl UpsertBulk {
    fn push(mut self, option: ConflictOption) -> Self {
        self.bulk.conflict.push(option);
        self
    }

    /// Overwrite every proposed column except the id and immutable fields.
    pub fn update_new_values(self) -> Self {
        self.push(ConflictOption::UpdateNewValues)
    }

    /// Keep the stored rows unchanged.
    pub fn ignore(self) -> Self {
        self.push(ConflictOption::Ignore)
    }

    /// Skip conflicting rows.
    pub fn do_nothing(self) -> Self {
        self.push(ConflictOption::DoNothing)
    }

    /// On conflict, set `field` to `value`.
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(ConflictOption::Set(field.into(), value.into()))
    }

    /// On conflict, take the proposed value for `field`.
    pub fn set_excluded(self, field: impl Into<String>) -> Self {
        self.push(ConflictOption::SetExcluded(field.into()))
    }

    /// On conflict, set `field` to NULL.
    pub fn clear(self, field: impl Into<String>) -> Self {
        self.push(ConflictOption::SetNull(field.into()))
    }

    /// Runs the upsert, discarding the result.
    pub fn exec(self, ctx: &Context) -> Result<()> {
        self.bulk.exec(ctx)
    }

    /// Runs the upsert and returns the stored entities in input order.
    ///
    /// Rows skipped by `do_nothing` are left out; rows resolved against an
    /// existing row carry that row's id.
    pub fn save(self, ctx: &Context) -> Result<Vec<Entity>> {
        self.bulk.save(ctx)
    }
}
