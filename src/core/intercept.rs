//! Query interceptors.
//!
//! Interceptors wrap reads the way hooks wrap writes: listed first runs
//! outermost, each may edit the pending read, call [`QueryNext::run`] at most
//! once, and inspect or replace what comes back. Writes never pass through
//! interceptors.

use std::{fmt, sync::Arc};

use crate::{
    context::Context,
    entity::Entity,
    error::{Error, Result},
    spec::{Predicate, QuerySpec},
};

/// Which read is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Rows, as for `all`, `first`, `only`, `ids`, and `get`.
    All,
    /// A row count, as for `count` and `exist`.
    Count,
}

/// A read on its way to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuery {
    entity: String,
    kind: QueryKind,
    spec: QuerySpec,
}

impl PendingQuery {
    /// Wraps a validated spec for `entity`.
    pub fn new(entity: impl Into<String>, kind: QueryKind, spec: QuerySpec) -> Self {
        Self {
            entity: entity.into(),
            kind,
            spec,
        }
    }

    /// Entity type being read.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Whether rows or a count were asked for.
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// The storage read as it stands.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Mutable access for ordering, paging, or column changes.
    pub fn spec_mut(&mut self) -> &mut QuerySpec {
        &mut self.spec
    }

    /// Narrows the read with one more predicate, ANDed with the rest.
    pub fn filter(&mut self, predicate: Predicate) {
        self.spec.predicate = Some(match self.spec.predicate.take() {
            Some(existing) => Predicate::And(vec![existing, predicate]),
            None => predicate,
        });
    }
}

/// What a read produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Rows for [`QueryKind::All`].
    Entities(Vec<Entity>),
    /// Row count for [`QueryKind::Count`].
    Count(usize),
}

impl QueryOutput {
    /// The rows, or a config error when an interceptor returned a count.
    pub fn into_entities(self) -> Result<Vec<Entity>> {
        match self {
            Self::Entities(es) => Ok(es),
            Self::Count(_) => Err(Error::config(
                "unexpected query output: wanted entities, interceptor returned a count",
            )),
        }
    }

    /// The count, or a config error when an interceptor returned rows.
    pub fn count(&self) -> Result<usize> {
        match self {
            Self::Count(n) => Ok(*n),
            Self::Entities(_) => Err(Error::config(
                "unexpected query output: wanted a count, interceptor returned entities",
            )),
        }
    }
}

/// Middleware around query execution.
pub trait Interceptor: Send + Sync {
    /// Runs this interceptor. Skipping `next` short-circuits the driver.
    fn intercept(&self, ctx: &Context, query: &mut PendingQuery, next: QueryNext<'_>) -> Result<QueryOutput>;
}

impl<I: Interceptor + ?Sized> Interceptor for Arc<I> {
    fn intercept(&self, ctx: &Context, query: &mut PendingQuery, next: QueryNext<'_>) -> Result<QueryOutput> {
        (**self).intercept(ctx, query, next)
    }
}

type QueryCore<'a> = dyn FnMut(&Context, &PendingQuery) -> Result<QueryOutput> + 'a;

/// The remainder of the read below the current interceptor.
pub struct QueryNext<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    core: &'a mut QueryCore<'a>,
}

impl QueryNext<'_> {
    /// Runs the next interceptor, or the driver read when none remain.
    pub fn run(self, ctx: &Context, query: &mut PendingQuery) -> Result<QueryOutput> {
        match self.interceptors.split_first() {
            Some((first, rest)) => first.intercept(
                ctx,
                query,
                QueryNext {
                    interceptors: rest,
                    core: self.core,
                },
            ),
            None => (self.core)(ctx, query),
        }
    }
}

impl fmt::Debug for QueryNext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryNext")
            .field("remaining", &self.interceptors.len())
            .finish()
    }
}

/// Adapts a closure into an [`Interceptor`].
pub struct InterceptFn<F>(F);

/// Builds an interceptor from a closure with the
/// [`Interceptor::intercept`] signature.
pub fn intercept_fn<F>(f: F) -> InterceptFn<F>
where
    F: Fn(&Context, &mut PendingQuery, QueryNext<'_>) -> Result<QueryOutput> + Send + Sync,
{
    InterceptFn(f)
}

impl<F> Interceptor for InterceptFn<F>
where
    F: Fn(&Context, &mut PendingQuery, QueryNext<'_>) -> Result<QueryOutput> + Send + Sync,
{
    fn intercept(&self, ctx: &Context, query: &mut PendingQuery, next: QueryNext<'_>) -> Result<QueryOutput> {
        (self.0)(ctx, query, next)
    }
}

/// Runs `query` through `interceptors` and then `core`.
pub fn run_query<F>(
    ctx: &Context,
    query: &mut PendingQuery,
    interceptors: &[Arc<dyn Interceptor>],
    core: F,
) -> Result<QueryOutput>
where
    F: FnMut(&Context, &PendingQuery) -> Result<QueryOutput>,
{
    tracing::trace!(
        entity = query.entity(),
        kind = ?query.kind(),
        interceptors = interceptors.len(),
        "running query"
    );
    let mut core = core;
    QueryNext {
        interceptors,
        core: &mut core,
    }
    .run(ctx, query)
}
