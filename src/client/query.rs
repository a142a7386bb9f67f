use crate::{
    context::Context,
    core::intercept::{PendingQuery, QueryKind, QueryOutput, run_query},
    entity::Entity,
    error::{Error, Result},
    schema::EntityDescriptor,
    spec::{Direction, OrderBy, Predicate, QuerySpec, build::select_columns},
    types::EntityId,
};

use super::EntityClient;

/// Read builder. Reads pass through the entity's interceptors, never its
/// hooks.
pub struct Query {
    client: EntityClient,
    predicates: Vec<Predicate>,
    order: Vec<OrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
    select: Vec<String>,
}

impl Query {
    pub(crate) fn new(client: EntityClient) -> Self {
        Self {
            client,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            select: Vec::new(),
        }
    }

    /// Adds a filter; every filter must hold.
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Sorts by `column`; earlier calls take precedence.
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    /// Returns at most `limit` rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` rows.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Reads only these columns plus the id.
    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    fn spec(&self) -> Result<QuerySpec> {
        let desc = &self.client.desc;
        let spec = QuerySpec {
            table: desc.table.clone(),
            columns: select_columns(desc, &self.select)?,
            predicate: Predicate::all(&self.predicates),
            order: self.order.clone(),
            limit: self.limit,
            offset: self.offset,
        };
        check_columns(desc, &spec)?;
        Ok(spec)
    }

    fn run(self, ctx: &Context, kind: QueryKind) -> Result<QueryOutput> {
        let mut pending = PendingQuery::new(self.client.desc.name.clone(), kind, self.spec()?);
        let client = &self.client;
        run_query(ctx, &mut pending, &client.interceptors, |ctx, q| client.read(ctx, q))
    }

    /// Every match.
    pub fn all(self, ctx: &Context) -> Result<Vec<Entity>> {
        self.run(ctx, QueryKind::All)?.into_entities()
    }

    /// First match, or not-found.
    pub fn first(mut self, ctx: &Context) -> Result<Entity> {
        self.limit = Some(1);
        let label = self.client.desc.label().to_string();
        self.all(ctx)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(label))
    }

    /// The single match; not-found for none, not-singular for several.
    pub fn only(mut self, ctx: &Context) -> Result<Entity> {
        self.limit = Some(2);
        let label = self.client.desc.label().to_string();
        let mut found = self.all(ctx)?;
        match found.len() {
            0 => Err(Error::not_found(label)),
            1 => Ok(found.remove(0)),
            _ => Err(Error::NotSingular { label }),
        }
    }

    /// Ids of every match.
    pub fn ids(mut self, ctx: &Context) -> Result<Vec<EntityId>> {
        self.select = vec![self.client.desc.id_column.clone()];
        Ok(self.all(ctx)?.into_iter().map(|e| e.id).collect())
    }

    /// Number of matches. Limit and offset are ignored.
    pub fn count(self, ctx: &Context) -> Result<usize> {
        self.run(ctx, QueryKind::Count)?.count()
    }

    /// Whether anything matches.
    pub fn exist(self, ctx: &Context) -> Result<bool> {
        Ok(self.limit(1).count(ctx)? > 0)
    }
}

impl EntityClient {
    /// Innermost step of a read, after every interceptor.
    fn read(&self, ctx: &Context, query: &PendingQuery) -> Result<QueryOutput> {
        let spec = query.spec();
        check_columns(&self.desc, spec)?;
        match query.kind() {
            QueryKind::All => {
                let records = self
                    .driver()
                    .query_nodes(ctx, spec)
                    .map_err(|err| self.classify(err))?;
                records
                    .into_iter()
                    .map(|record| Entity::from_record(&self.desc, record))
                    .collect::<Result<Vec<_>>>()
                    .map(QueryOutput::Entities)
            }
            QueryKind::Count => self
                .driver()
                .count_nodes(ctx, spec)
                .map(QueryOutput::Count)
                .map_err(|err| self.classify(err)),
        }
    }
}

/// Rejects predicate and order columns the entity's table does not have.
fn check_columns(desc: &EntityDescriptor, spec: &QuerySpec) -> Result<()> {
    if let Some(pred) = &spec.predicate {
        if let Some(col) = pred.columns().into_iter().find(|c| !desc.valid_column(c)) {
            return Err(Error::validation(
                col,
                format!("invalid column {col:?} in {} predicate", desc.label()),
            ));
        }
    }
    if let Some(order) = spec.order.iter().find(|o| !desc.valid_column(&o.column)) {
        return Err(Error::validation(
            &order.column,
            format!("invalid order column {:?} for {}", order.column, desc.label()),
        ));
    }
    Ok(())
}
