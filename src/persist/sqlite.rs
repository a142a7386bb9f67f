//! SQLite implementation of [`Driver`].

use std::{
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, ffi, params_from_iter,
    types::{ToSql, ToSqlOutput, ValueRef},
};

use crate::{
    config::DriverConfig,
    context::Context,
    schema::{EntityDescriptor, Registry, Rel},
    spec::{
        BatchCreateSpec, ConflictAction, ConflictSet, CreateSpec, DeleteSpec, Direction,
        EdgeSpec, OnConflict, Predicate, QuerySpec, UpdateSpec,
    },
    types::{EntityId, FieldType, Value},
};

use super::{Driver, DriverError, DriverResult, Record, check_context};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Bool(v) => ToSqlOutput::Owned(Sql::Integer(i64::from(*v))),
            Value::Int(v) => ToSqlOutput::Owned(Sql::Integer(*v)),
            Value::Float(v) => ToSqlOutput::Owned(Sql::Real(*v)),
            Value::String(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Time(v) => ToSqlOutput::Owned(Sql::Integer(*v as i64)),
            Value::Json(v) => {
                let text = serde_json::to_string(v)
                    .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
                ToSqlOutput::Owned(Sql::Text(text))
            }
        })
    }
}

/// Statement counters, read with [`SqliteDriver::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Every statement executed, reads included.
    pub statements: u64,
    /// `INSERT` statements that write entity rows. A bulk create counts once
    /// unless it is split to stay under SQLite's bound-parameter limit.
    pub node_inserts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    statements: AtomicU64,
    node_inserts: AtomicU64,
}

/// SQLite's default cap on bound parameters in one statement.
const MAX_BOUND_PARAMS: usize = 32_766;

/// One row of an insert's `RETURNING` clause: the stored id, then the
/// conflict target columns.
struct Returned {
    id: EntityId,
    key: Vec<Value>,
}

/// Driver over a single SQLite connection.
pub struct SqliteDriver {
    conn: Mutex<Connection>,
    counters: Counters,
}

impl SqliteDriver {
    /// Opens or creates a database at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> DriverResult<Self> {
        Self::from_config(&DriverConfig {
            path: Some(path.as_ref().to_path_buf()),
            ..DriverConfig::default()
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> DriverResult<Self> {
        Self::from_config(&DriverConfig::default())
    }

    /// Opens the database named by `config`, in memory when it has no path.
    pub fn from_config(config: &DriverConfig) -> DriverResult<Self> {
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        Self::init_connection(conn, config)
    }

    fn init_connection(conn: Connection, config: &DriverConfig) -> DriverResult<Self> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update(None, "journal_mode", &config.journal_mode)?;
        conn.pragma_update(None, "synchronous", &config.synchronous)?;
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        tracing::debug!(
            path = ?config.path,
            journal_mode = %config.journal_mode,
            foreign_keys = config.foreign_keys,
            "opened sqlite driver"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            counters: Counters::default(),
        })
    }

    /// Creates every entity table and join table the registry describes.
    pub fn create_schema(&self, registry: &Registry) -> DriverResult<()> {
        let ddl = schema_ddl(registry);
        self.conn.lock().execute_batch(&ddl)?;
        Ok(())
    }

    /// Counters since open or the last reset.
    pub fn stats(&self) -> DriverStats {
        DriverStats {
            statements: self.counters.statements.load(Ordering::Relaxed),
            node_inserts: self.counters.node_inserts.load(Ordering::Relaxed),
        }
    }

    /// Zeroes the counters.
    pub fn reset_stats(&self) {
        self.counters.statements.store(0, Ordering::Relaxed);
        self.counters.node_inserts.store(0, Ordering::Relaxed);
    }

    fn exec(&self, ctx: &Context, conn: &Connection, sql: &str, args: &[Value]) -> DriverResult<usize> {
        check_context(ctx)?;
        self.counters.statements.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(sql, args = args.len(), "exec");
        Ok(conn.execute(sql, params_from_iter(args.iter()))?)
    }

    fn select(
        &self,
        ctx: &Context,
        conn: &Connection,
        sql: &str,
        args: &[Value],
        columns: &[(String, FieldType)],
    ) -> DriverResult<Vec<Record>> {
        check_context(ctx)?;
        self.counters.statements.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(sql, args = args.len(), "select");
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            let mut record = Record::new();
            for (idx, (name, ty)) in columns.iter().enumerate() {
                record.insert(name.clone(), read_value(row, idx, *ty)?);
            }
            Ok(record)
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn select_ids(
        &self,
        ctx: &Context,
        conn: &Connection,
        table: &str,
        id_column: &str,
        cond: &str,
        args: &[Value],
    ) -> DriverResult<Vec<EntityId>> {
        let sql = format!("SELECT {} FROM {}{cond}", quote(id_column), quote(table));
        let columns = [(id_column.to_string(), FieldType::String)];
        let rows = self.select(ctx, conn, &sql, args, &columns)?;
        Ok(rows
            .into_iter()
            .filter_map(|mut r| match r.remove(id_column) {
                Some(Value::String(id)) => Some(EntityId(id)),
                _ => None,
            })
            .collect())
    }

    fn insert(
        &self,
        ctx: &Context,
        conn: &Connection,
        sql: &str,
        args: &[Value],
        key_types: &[FieldType],
    ) -> DriverResult<Vec<Returned>> {
        check_context(ctx)?;
        self.counters.statements.fetch_add(1, Ordering::Relaxed);
        self.counters.node_inserts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(sql, args = args.len(), "insert");
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            let id = EntityId(row.get::<_, String>(0)?);
            let mut key = Vec::with_capacity(key_types.len());
            for (idx, ty) in key_types.iter().enumerate() {
                key.push(read_value(row, idx + 1, *ty)?);
            }
            Ok(Returned { id, key })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn add_edge(&self, ctx: &Context, conn: &Connection, owner: &EntityId, edge: &EdgeSpec) -> DriverResult<()> {
        if edge.nodes.is_empty() {
            return Ok(());
        }
        match edge.rel {
            Rel::O2M => {
                let fk = quote(edge_column(edge, 0)?);
                let sql = format!(
                    "UPDATE {} SET {fk} = ? WHERE {} IN ({}) AND {fk} IS NULL",
                    quote(&edge.table),
                    quote(&edge.target_id_column),
                    placeholders(edge.nodes.len())
                );
                let mut args = vec![Value::from(owner.clone())];
                args.extend(edge.nodes.iter().cloned().map(Value::from));
                let affected = self.exec(ctx, conn, &sql, &args)?;
                if affected < edge.nodes.len() {
                    let ids: Vec<&str> = edge.nodes.iter().map(EntityId::as_str).collect();
                    return Err(DriverError::Constraint(format!(
                        "one of {ids:?} is already connected to a different {}",
                        edge_column(edge, 0)?
                    )));
                }
                Ok(())
            }
            Rel::M2M => {
                let mut columns = vec![quote(edge_column(edge, 0)?), quote(edge_column(edge, 1)?)];
                columns.extend(edge.fields.iter().map(|f| quote(&f.column)));
                let row = format!("({})", placeholders(columns.len()));
                let rows = vec![row; edge.nodes.len()].join(", ");
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES {rows} ON CONFLICT DO NOTHING",
                    quote(&edge.table),
                    columns.join(", ")
                );
                let mut args = Vec::with_capacity(columns.len() * edge.nodes.len());
                for node in &edge.nodes {
                    args.push(Value::from(owner.clone()));
                    args.push(Value::from(node.clone()));
                    args.extend(edge.fields.iter().map(|f| f.value.clone()));
                }
                self.exec(ctx, conn, &sql, &args)?;
                Ok(())
            }
            Rel::M2O => Err(DriverError::Message(
                "many-to-one edges are written as columns".to_string(),
            )),
        }
    }

    fn clear_edge(&self, ctx: &Context, conn: &Connection, owner: &EntityId, edge: &EdgeSpec) -> DriverResult<()> {
        let mut args = vec![Value::from(owner.clone())];
        let sql = match edge.rel {
            Rel::O2M => {
                let fk = quote(edge_column(edge, 0)?);
                let mut sql = format!("UPDATE {} SET {fk} = NULL WHERE {fk} = ?", quote(&edge.table));
                if !edge.nodes.is_empty() {
                    sql.push_str(&format!(
                        " AND {} IN ({})",
                        quote(&edge.target_id_column),
                        placeholders(edge.nodes.len())
                    ));
                }
                sql
            }
            Rel::M2M => {
                let mut sql = format!(
                    "DELETE FROM {} WHERE {} = ?",
                    quote(&edge.table),
                    quote(edge_column(edge, 0)?)
                );
                if !edge.nodes.is_empty() {
                    sql.push_str(&format!(
                        " AND {} IN ({})",
                        quote(edge_column(edge, 1)?),
                        placeholders(edge.nodes.len())
                    ));
                }
                sql
            }
            Rel::M2O => {
                return Err(DriverError::Message(
                    "many-to-one edges are written as columns".to_string(),
                ));
            }
        };
        args.extend(edge.nodes.iter().cloned().map(Value::from));
        self.exec(ctx, conn, &sql, &args)?;
        Ok(())
    }

    /// Applies column changes and edge changes to every node in `ids`.
    fn apply_update(&self, ctx: &Context, conn: &Connection, spec: &UpdateSpec, ids: &[EntityId]) -> DriverResult<()> {
        let mut sets = Vec::new();
        let mut args = Vec::new();
        for field in &spec.set {
            sets.push(format!("{} = ?", quote(&field.column)));
            args.push(field.value.clone());
        }
        for column in &spec.clear {
            sets.push(format!("{} = NULL", quote(column)));
        }
        for field in &spec.append {
            let Some(values) = field.value.as_json().and_then(|v| v.as_array()) else {
                continue;
            };
            if values.is_empty() {
                continue;
            }
            let col = quote(&field.column);
            let pairs = vec!["'$[#]', json(?)"; values.len()].join(", ");
            sets.push(format!("{col} = json_insert(COALESCE({col}, '[]'), {pairs})"));
            args.extend(values.iter().cloned().map(Value::Json));
        }

        if !sets.is_empty() {
            let sql = format!(
                "UPDATE {} SET {} WHERE {} IN ({})",
                quote(&spec.table),
                sets.join(", "),
                quote(&spec.id_column),
                placeholders(ids.len())
            );
            args.extend(ids.iter().cloned().map(Value::from));
            self.exec(ctx, conn, &sql, &args)?;
        }

        for owner in ids {
            for edge in &spec.edges_clear {
                self.clear_edge(ctx, conn, owner, edge)?;
            }
            for edge in &spec.edges_add {
                self.add_edge(ctx, conn, owner, edge)?;
            }
        }
        Ok(())
    }
}

impl Driver for SqliteDriver {
    fn create_node(&self, ctx: &Context, spec: &CreateSpec) -> DriverResult<Option<EntityId>> {
        let nodes = std::slice::from_ref(spec);
        let columns = insert_columns(&spec.id.column, nodes);
        let (sql, args) = insert_sql(&spec.table, &columns, nodes, spec.on_conflict.as_ref(), &[]);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let id = self
            .insert(ctx, &tx, &sql, &args, &[])?
            .into_iter()
            .next()
            .map(|row| row.id);
        if let Some(id) = &id {
            for edge in &spec.edges {
                self.add_edge(ctx, &tx, id, edge)?;
            }
        }
        tx.commit()?;
        tracing::debug!(table = %spec.table, skipped = id.is_none(), "created node");
        Ok(id)
    }

    fn batch_create(&self, ctx: &Context, spec: &BatchCreateSpec) -> DriverResult<Vec<Option<EntityId>>> {
        let Some(first) = spec.nodes.first() else {
            return Ok(Vec::new());
        };
        let id_column = first.id.column.as_str();
        let columns = insert_columns(id_column, &spec.nodes);
        let target: &[String] = spec
            .on_conflict
            .as_ref()
            .map(|c| c.target.as_slice())
            .unwrap_or_default();
        let key_types: Vec<FieldType> = target
            .iter()
            .map(|col| column_type(&spec.nodes, id_column, col))
            .collect();
        let budget = MAX_BOUND_PARAMS.saturating_sub(conflict_params(spec.on_conflict.as_ref()));
        let per_statement = (budget / columns.len()).max(1);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut returned = Vec::with_capacity(spec.nodes.len());
        let mut statements = 0usize;
        for chunk in spec.nodes.chunks(per_statement) {
            let (sql, args) = insert_sql(&first.table, &columns, chunk, spec.on_conflict.as_ref(), target);
            returned.extend(self.insert(ctx, &tx, &sql, &args, &key_types)?);
            statements += 1;
        }

        let ids = match_returned(&spec.nodes, target, returned);
        for (node, id) in spec.nodes.iter().zip(&ids) {
            let Some(owner) = id else {
                continue;
            };
            for edge in &node.edges {
                self.add_edge(ctx, &tx, owner, edge)?;
            }
        }
        tx.commit()?;
        tracing::debug!(
            table = %first.table,
            rows = spec.nodes.len(),
            stored = ids.iter().flatten().count(),
            statements,
            "batch insert"
        );
        Ok(ids)
    }

    fn update_node(&self, ctx: &Context, spec: &UpdateSpec) -> DriverResult<Record> {
        let id = spec
            .node_id
            .as_ref()
            .ok_or_else(|| DriverError::Message("single-node update without an id".to_string()))?;
        let mut args = Vec::new();
        let cond = where_clause(&spec.id_column, Some(id), spec.predicate.as_ref(), &mut args);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let found = self.select_ids(ctx, &tx, &spec.table, &spec.id_column, &cond, &args)?;
        if found.is_empty() {
            return Err(DriverError::NotFound);
        }
        self.apply_update(ctx, &tx, spec, &found)?;

        let columns: Vec<String> = spec.select.iter().map(|(c, _)| quote(c)).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            columns.join(", "),
            quote(&spec.table),
            quote(&spec.id_column)
        );
        let record = self
            .select(ctx, &tx, &sql, &[Value::from(id.clone())], &spec.select)?
            .into_iter()
            .next()
            .ok_or(DriverError::NotFound)?;
        tx.commit()?;
        Ok(record)
    }

    fn update_nodes(&self, ctx: &Context, spec: &UpdateSpec) -> DriverResult<usize> {
        let mut args = Vec::new();
        let cond = where_clause(&spec.id_column, None, spec.predicate.as_ref(), &mut args);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let ids = self.select_ids(ctx, &tx, &spec.table, &spec.id_column, &cond, &args)?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.apply_update(ctx, &tx, spec, &ids)?;
        tx.commit()?;
        tracing::debug!(table = %spec.table, rows = ids.len(), "updated nodes");
        Ok(ids.len())
    }

    fn delete_nodes(&self, ctx: &Context, spec: &DeleteSpec) -> DriverResult<usize> {
        let mut args = Vec::new();
        let cond = where_clause(&spec.id_column, spec.node_id.as_ref(), spec.predicate.as_ref(), &mut args);
        let sql = format!("DELETE FROM {}{cond}", quote(&spec.table));
        let conn = self.conn.lock();
        let affected = self.exec(ctx, &conn, &sql, &args)?;
        tracing::debug!(table = %spec.table, rows = affected, "deleted nodes");
        Ok(affected)
    }

    fn query_nodes(&self, ctx: &Context, spec: &QuerySpec) -> DriverResult<Vec<Record>> {
        let mut args = Vec::new();
        let cond = predicate_clause(spec.predicate.as_ref(), &mut args);
        let columns: Vec<String> = spec.columns.iter().map(|(c, _)| quote(c)).collect();
        let mut sql = format!("SELECT {} FROM {}{cond}", columns.join(", "), quote(&spec.table));
        if !spec.order.is_empty() {
            let order: Vec<String> = spec
                .order
                .iter()
                .map(|o| match o.direction {
                    Direction::Asc => format!("{} ASC", quote(&o.column)),
                    Direction::Desc => format!("{} DESC", quote(&o.column)),
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        match (spec.limit, spec.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        let conn = self.conn.lock();
        self.select(ctx, &conn, &sql, &args, &spec.columns)
    }

    fn count_nodes(&self, ctx: &Context, spec: &QuerySpec) -> DriverResult<usize> {
        let mut args = Vec::new();
        let cond = predicate_clause(spec.predicate.as_ref(), &mut args);
        let sql = format!("SELECT COUNT(*) FROM {}{cond}", quote(&spec.table));
        let conn = self.conn.lock();
        check_context(ctx)?;
        self.counters.statements.fetch_add(1, Ordering::Relaxed);
        let count: i64 = conn
            .query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))
            .optional()?
            .unwrap_or(0);
        Ok(count as usize)
    }

    fn is_constraint_error(&self, err: &DriverError) -> bool {
        match err {
            DriverError::Constraint(_) => true,
            DriverError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == ErrorCode::ConstraintViolation
                    && matches!(
                        e.extended_code,
                        ffi::SQLITE_CONSTRAINT_UNIQUE
                            | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                            | ffi::SQLITE_CONSTRAINT_FOREIGNKEY
                    )
            }
            _ => false,
        }
    }
}

fn read_value(row: &rusqlite::Row<'_>, idx: usize, ty: FieldType) -> rusqlite::Result<Value> {
    if matches!(row.get_ref(idx)?, ValueRef::Null) {
        return Ok(Value::Null);
    }
    Ok(match ty {
        FieldType::Bool => Value::Bool(row.get::<_, i64>(idx)? != 0),
        FieldType::Int => Value::Int(row.get(idx)?),
        FieldType::Float => Value::Float(row.get(idx)?),
        FieldType::String => Value::String(row.get(idx)?),
        FieldType::Time => Value::Time(row.get::<_, i64>(idx)? as u64),
        FieldType::Json => {
            let text: String = row.get(idx)?;
            let json = serde_json::from_str(&text).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })?;
            Value::Json(json)
        }
    })
}

fn edge_column(edge: &EdgeSpec, idx: usize) -> DriverResult<&str> {
    edge.columns
        .get(idx)
        .map(String::as_str)
        .ok_or_else(|| DriverError::Message(format!("edge on {} is missing key column {idx}", edge.table)))
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Every column any node assigns, id first.
fn insert_columns<'a>(id_column: &'a str, nodes: &'a [CreateSpec]) -> Vec<&'a str> {
    let mut columns: Vec<&str> = vec![id_column];
    for node in nodes {
        for field in &node.fields {
            if !columns.contains(&field.column.as_str()) {
                columns.push(&field.column);
            }
        }
    }
    columns
}

/// Value a node proposes for `column`, NULL when it leaves it unset.
fn proposed_value(node: &CreateSpec, column: &str) -> Value {
    if column == node.id.column {
        return node.id.value.clone();
    }
    node.fields
        .iter()
        .find(|f| f.column == column)
        .map(|f| f.value.clone())
        .unwrap_or(Value::Null)
}

fn column_type(nodes: &[CreateSpec], id_column: &str, column: &str) -> FieldType {
    if column == id_column {
        return FieldType::String;
    }
    nodes
        .iter()
        .flat_map(|n| n.fields.iter())
        .find(|f| f.column == column)
        .map(|f| f.ty)
        .unwrap_or(FieldType::String)
}

/// Parameters bound by the conflict clause itself.
fn conflict_params(on_conflict: Option<&OnConflict>) -> usize {
    match on_conflict.map(|c| &c.action) {
        Some(ConflictAction::Update(sets)) => sets
            .iter()
            .filter(|set| matches!(set, ConflictSet::Value(..)))
            .count(),
        _ => 0,
    }
}

/// Pairs `RETURNING` rows with the nodes that produced them, in input order.
///
/// A fresh insert returns the id the node proposed. A row updated on
/// conflict returns the stored id instead and is matched on the conflict
/// target columns, falling back to the first unmatched node. Nodes left
/// without a row were skipped by `DO NOTHING`.
fn match_returned(nodes: &[CreateSpec], target: &[String], returned: Vec<Returned>) -> Vec<Option<EntityId>> {
    let mut ids: Vec<Option<EntityId>> = vec![None; nodes.len()];
    let proposed: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .filter_map(|(idx, node)| node.id.value.as_str().map(|id| (id, idx)))
        .collect();

    let mut leftover = Vec::new();
    for row in returned {
        match proposed.get(row.id.as_str()) {
            Some(&idx) if ids[idx].is_none() => ids[idx] = Some(row.id),
            _ => leftover.push(row),
        }
    }

    for row in leftover {
        let same_key = |idx: &usize| {
            !target.is_empty()
                && target
                    .iter()
                    .map(|col| proposed_value(&nodes[*idx], col))
                    .eq(row.key.iter().cloned())
        };
        let open: Vec<usize> = (0..nodes.len()).filter(|idx| ids[*idx].is_none()).collect();
        let slot = open
            .iter()
            .copied()
            .find(same_key)
            .or_else(|| open.first().copied());
        if let Some(idx) = slot {
            ids[idx] = Some(row.id);
        }
    }
    ids
}

fn insert_sql(
    table: &str,
    columns: &[&str],
    nodes: &[CreateSpec],
    on_conflict: Option<&OnConflict>,
    returning: &[String],
) -> (String, Vec<Value>) {
    let mut args = Vec::with_capacity(columns.len() * nodes.len());
    for node in nodes {
        args.extend(columns.iter().map(|col| proposed_value(node, col)));
    }

    let quoted: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    let row = format!("({})", placeholders(columns.len()));
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote(table),
        quoted.join(", "),
        vec![row; nodes.len()].join(", ")
    );

    if let Some(conflict) = on_conflict {
        sql.push_str(" ON CONFLICT");
        if !conflict.target.is_empty() {
            let target: Vec<String> = conflict.target.iter().map(|c| quote(c)).collect();
            sql.push_str(&format!(" ({})", target.join(", ")));
        }
        match &conflict.action {
            ConflictAction::DoNothing => sql.push_str(" DO NOTHING"),
            ConflictAction::Update(sets) => {
                let clauses: Vec<String> = sets
                    .iter()
                    .map(|set| {
                        let col = quote(set.column());
                        match set {
                            ConflictSet::Value(_, _, value) => {
                                args.push(value.clone());
                                format!("{col} = ?")
                            }
                            ConflictSet::Excluded(_) => format!("{col} = excluded.{col}"),
                            ConflictSet::Null(_) => format!("{col} = NULL"),
                            ConflictSet::Keep(_) => format!("{col} = {col}"),
                        }
                    })
                    .collect();
                sql.push_str(&format!(" DO UPDATE SET {}", clauses.join(", ")));
            }
        }
    }

    let returned: Vec<String> = columns
        .first()
        .into_iter()
        .copied()
        .chain(returning.iter().map(String::as_str))
        .map(quote)
        .collect();
    sql.push_str(&format!(" RETURNING {}", returned.join(", ")));
    (sql, args)
}

fn predicate_clause(predicate: Option<&Predicate>, args: &mut Vec<Value>) -> String {
    match predicate {
        Some(p) => {
            let mut sql = String::from(" WHERE ");
            render_predicate(p, &mut sql, args);
            sql
        }
        None => String::new(),
    }
}

fn where_clause(
    id_column: &str,
    node_id: Option<&EntityId>,
    predicate: Option<&Predicate>,
    args: &mut Vec<Value>,
) -> String {
    let mut parts = Vec::new();
    if let Some(id) = node_id {
        parts.push(format!("{} = ?", quote(id_column)));
        args.push(Value::from(id.clone()));
    }
    if let Some(p) = predicate {
        let mut sql = String::new();
        render_predicate(p, &mut sql, args);
        parts.push(sql);
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn compare(sql: &mut String, args: &mut Vec<Value>, col: &str, op: &str, value: &Value) {
    sql.push_str(&format!("{} {op} ?", quote(col)));
    args.push(value.clone());
}

fn render_predicate(p: &Predicate, sql: &mut String, args: &mut Vec<Value>) {
    match p {
        Predicate::Eq(c, v) => compare(sql, args, c, "=", v),
        Predicate::Ne(c, v) => compare(sql, args, c, "<>", v),
        Predicate::Gt(c, v) => compare(sql, args, c, ">", v),
        Predicate::Gte(c, v) => compare(sql, args, c, ">=", v),
        Predicate::Lt(c, v) => compare(sql, args, c, "<", v),
        Predicate::Lte(c, v) => compare(sql, args, c, "<=", v),
        Predicate::In(_, vs) if vs.is_empty() => sql.push_str("1 = 0"),
        Predicate::NotIn(_, vs) if vs.is_empty() => sql.push_str("1 = 1"),
        Predicate::In(c, vs) | Predicate::NotIn(c, vs) => {
            let op = if matches!(p, Predicate::In(..)) { "IN" } else { "NOT IN" };
            sql.push_str(&format!("{} {op} ({})", quote(c), placeholders(vs.len())));
            args.extend(vs.iter().cloned());
        }
        Predicate::IsNull(c) => sql.push_str(&format!("{} IS NULL", quote(c))),
        Predicate::NotNull(c) => sql.push_str(&format!("{} IS NOT NULL", quote(c))),
        Predicate::Contains(c, needle) => {
            sql.push_str(&format!("instr({}, ?) > 0", quote(c)));
            args.push(Value::from(needle.as_str()));
        }
        Predicate::HasPrefix(c, prefix) => {
            sql.push_str(&format!("substr({}, 1, length(?)) = ?", quote(c)));
            args.push(Value::from(prefix.as_str()));
            args.push(Value::from(prefix.as_str()));
        }
        Predicate::And(ps) | Predicate::Or(ps) if ps.is_empty() => {
            sql.push_str(if matches!(p, Predicate::And(_)) { "1 = 1" } else { "1 = 0" });
        }
        Predicate::And(ps) | Predicate::Or(ps) => {
            let joiner = if matches!(p, Predicate::And(_)) { " AND " } else { " OR " };
            sql.push('(');
            for (i, inner) in ps.iter().enumerate() {
                if i > 0 {
                    sql.push_str(joiner);
                }
                render_predicate(inner, sql, args);
            }
            sql.push(')');
        }
        Predicate::Not(inner) => {
            sql.push_str("NOT (");
            render_predicate(inner, sql, args);
            sql.push(')');
        }
    }
}

fn foreign_key(column: &str, owner: &EntityDescriptor) -> String {
    format!(
        "{} TEXT REFERENCES {}({}) ON DELETE SET NULL",
        quote(column),
        quote(&owner.table),
        quote(&owner.id_column)
    )
}

/// `CREATE TABLE IF NOT EXISTS` statements for every entity and join table.
///
/// O2M keys are added to the target table; M2M join rows cascade with
/// either endpoint.
pub fn schema_ddl(registry: &Registry) -> String {
    let mut out = String::new();
    for desc in registry.entities() {
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(&desc.id_column);
        let mut defs = vec![format!("{} TEXT PRIMARY KEY NOT NULL", quote(&desc.id_column))];

        for field in &desc.fields {
            seen.insert(&field.name);
            let mut def = format!("{} {}", quote(&field.name), field.ty.sql_type());
            if !field.optional {
                def.push_str(" NOT NULL");
            }
            if field.unique {
                def.push_str(" UNIQUE");
            }
            defs.push(def);
        }
        for edge in desc.edges.iter().filter(|e| e.rel == Rel::M2O) {
            if let Ok(target) = registry.entity(&edge.target) {
                if seen.insert(&edge.column) {
                    defs.push(foreign_key(&edge.column, target));
                }
            }
        }
        for owner in registry.entities() {
            for edge in &owner.edges {
                if edge.rel == Rel::O2M && edge.target == desc.name && seen.insert(&edge.column) {
                    defs.push(foreign_key(&edge.column, owner));
                }
            }
        }
        out.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);\n",
            quote(&desc.table),
            defs.join(",\n  ")
        ));
    }

    let mut joins: HashSet<&str> = HashSet::new();
    for desc in registry.entities() {
        for edge in &desc.edges {
            let Some(join) = &edge.join else {
                continue;
            };
            let Ok(target) = registry.entity(&edge.target) else {
                continue;
            };
            if !joins.insert(&join.table) {
                continue;
            }
            let mut defs = vec![
                format!(
                    "{} TEXT NOT NULL REFERENCES {}({}) ON DELETE CASCADE",
                    quote(&join.source_column),
                    quote(&desc.table),
                    quote(&desc.id_column)
                ),
                format!(
                    "{} TEXT NOT NULL REFERENCES {}({}) ON DELETE CASCADE",
                    quote(&join.target_column),
                    quote(&target.table),
                    quote(&target.id_column)
                ),
            ];
            for field in &join.fields {
                let mut def = format!("{} {}", quote(&field.name), field.ty.sql_type());
                if !field.optional {
                    def.push_str(" NOT NULL");
                }
                defs.push(def);
            }
            defs.push(format!(
                "PRIMARY KEY ({}, {})",
                quote(&join.source_column),
                quote(&join.target_column)
            ));
            out.push_str(&format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);\n",
                quote(&join.table),
                defs.join(",\n  ")
            ));
        }
    }
    out
}
