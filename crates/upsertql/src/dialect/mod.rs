//! Per-engine upsert compilers.
//!
//! Each supported engine implements [`Dialect`]: identifier quoting,
//! placeholder style, parameter caps and the statement envelope (ON
//! CONFLICT, MERGE or ON DUPLICATE KEY). Compilation is pure: it consumes
//! the schema, a row batch, the match spec and the update spec, and emits
//! one parameterized statement without ever touching a connection.

mod mssql;
mod mysql;
mod postgres;
mod sqlite;

pub use mssql::SqlServer;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use crate::error::{UpsertError, UpsertResult};
use crate::expr::{Expr, UpdateAction, UpdateSpec};
use crate::matchkey::MatchSpec;
use crate::schema::{Column, Row, TableSchema};
use crate::value::Value;

/// Immutable result of compiling one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCommand {
    /// SQL text with dialect placeholders.
    pub sql: String,
    /// Parameter values, in placeholder order.
    pub params: Vec<Value>,
}

/// One database engine's upsert syntax and capability set.
pub trait Dialect: Send + Sync {
    /// Canonical lowercase provider name (registry key).
    fn name(&self) -> &'static str;

    /// Additional provider names this dialect answers to.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Quote an identifier, escaping embedded quote characters.
    fn quote(&self, ident: &str) -> String;

    /// Placeholder for the 1-based parameter index.
    fn placeholder(&self, index: usize) -> String;

    /// Maximum number of parameters in one statement.
    fn max_params(&self) -> usize;

    /// Whether generated column values can be returned from the statement.
    fn supports_returning(&self) -> bool;

    /// Whether the update guard is rendered inline per assignment
    /// (duplicating its parameters) instead of as one statement-level
    /// predicate.
    fn inline_guard(&self) -> bool {
        false
    }

    /// SQL reference to a column of the incoming row being written.
    fn incoming_ref(&self, schema: &dyn TableSchema, column: &str) -> String;

    /// SQL reference to a column of the row already stored.
    fn existing_ref(&self, schema: &dyn TableSchema, column: &str) -> String;

    /// Compile one batched statement for the given rows.
    fn compile(
        &self,
        schema: &dyn TableSchema,
        rows: &[Row],
        keys: &MatchSpec,
        update: &UpdateSpec,
        returning: bool,
    ) -> UpsertResult<CompiledCommand>;
}

static DIALECTS: [&'static dyn Dialect; 4] = [&Postgres, &Sqlite, &MySql, &SqlServer];

/// Look up a dialect by provider name (case-insensitive).
///
/// Recognized names: `postgres`/`postgresql`, `sqlite`/`sqlite3`,
/// `mysql`/`mariadb`, `mssql`/`sqlserver`.
pub fn dialect_for(provider: &str) -> Option<&'static dyn Dialect> {
    let provider = provider.trim().to_ascii_lowercase();
    DIALECTS
        .iter()
        .find(|d| d.name() == provider || d.aliases().contains(&provider.as_str()))
        .copied()
}

/// Statement text under construction plus its parameter sink.
///
/// Every literal passed to [`SqlWriter::bind`] gets its own placeholder;
/// placeholders are never reused even for identical values.
pub(crate) struct SqlWriter<'a> {
    dialect: &'a dyn Dialect,
    sql: String,
    params: Vec<Value>,
}

impl<'a> SqlWriter<'a> {
    pub(crate) fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Bind a literal and append its placeholder.
    pub(crate) fn bind(&mut self, value: Value) {
        let placeholder = self.dialect.placeholder(self.params.len() + 1);
        self.params.push(value);
        self.sql.push_str(&placeholder);
    }

    pub(crate) fn finish(self) -> CompiledCommand {
        CompiledCommand {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Schema-qualified, quoted table reference.
pub(crate) fn qualified_table(dialect: &dyn Dialect, schema: &dyn TableSchema) -> String {
    match schema.schema_name() {
        Some(s) => format!("{}.{}", dialect.quote(s), dialect.quote(schema.name())),
        None => dialect.quote(schema.name()),
    }
}

/// Comma-joined quoted column names.
pub(crate) fn quoted_columns(dialect: &dyn Dialect, columns: &[&Column]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma-joined quoted names.
pub(crate) fn quoted_names(dialect: &dyn Dialect, names: &[String]) -> String {
    names
        .iter()
        .map(|n| dialect.quote(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Database-generated columns, i.e. the returnable set.
pub(crate) fn generated_columns(schema: &dyn TableSchema) -> Vec<&Column> {
    schema.columns().iter().filter(|c| c.generated).collect()
}

/// Extract one row's values for the insert column list.
pub(crate) fn row_values(
    schema: &dyn TableSchema,
    row: &Row,
    index: usize,
) -> UpsertResult<Vec<Value>> {
    // A stray column is a row-shape problem, reported with the row index.
    for name in row.column_names() {
        if schema.column(name).is_none() {
            return Err(UpsertError::SchemaMismatch {
                row: index,
                column: name.to_string(),
            });
        }
    }
    schema
        .insert_columns()
        .iter()
        .map(|c| {
            row.get(&c.name)
                .cloned()
                .ok_or_else(|| UpsertError::SchemaMismatch {
                    row: index,
                    column: c.name.clone(),
                })
        })
        .collect()
}

/// Write `(…), (…), …` value tuples, one per row, binding every literal.
pub(crate) fn write_values_tuples(
    w: &mut SqlWriter<'_>,
    schema: &dyn TableSchema,
    rows: &[Row],
) -> UpsertResult<()> {
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push("(");
        for (j, value) in row_values(schema, row, i)?.into_iter().enumerate() {
            if j > 0 {
                w.push(", ");
            }
            w.bind(value);
        }
        w.push(")");
    }
    Ok(())
}

/// Recursively render an expression tree into the statement.
pub(crate) fn render_expr(w: &mut SqlWriter<'_>, schema: &dyn TableSchema, expr: &Expr) {
    match expr {
        Expr::Value(v) => w.bind(v.clone()),
        Expr::Incoming(col) => {
            let sql = w.dialect.incoming_ref(schema, col);
            w.push(&sql);
        }
        Expr::Existing(col) => {
            let sql = w.dialect.existing_ref(schema, col);
            w.push(&sql);
        }
        Expr::Binary { op, lhs, rhs } => {
            w.push("(");
            render_expr(w, schema, lhs);
            w.push(" ");
            w.push(op.as_sql());
            w.push(" ");
            render_expr(w, schema, rhs);
            w.push(")");
        }
        Expr::IsNull(inner) => {
            w.push("(");
            render_expr(w, schema, inner);
            w.push(" IS NULL)");
        }
        Expr::Case {
            when,
            then,
            otherwise,
        } => {
            w.push("CASE WHEN ");
            render_expr(w, schema, when);
            w.push(" THEN ");
            render_expr(w, schema, then);
            w.push(" ELSE ");
            render_expr(w, schema, otherwise);
            w.push(" END");
        }
    }
}

/// Normalize the update action into an ordered assignment list.
///
/// `AllNonKey` expands to one incoming-value assignment per insert column
/// outside the match key; explicit mappings are resolved against the
/// schema and constant-folded. Assigning to a generated column is
/// rejected: the database owns those values.
pub(crate) fn update_assignments(
    schema: &dyn TableSchema,
    keys: &MatchSpec,
    update: &UpdateSpec,
) -> UpsertResult<Vec<(String, Expr)>> {
    match &update.action {
        UpdateAction::Nothing => Ok(Vec::new()),
        UpdateAction::AllNonKey => Ok(schema
            .insert_columns()
            .iter()
            .filter(|c| !keys.contains(&c.name))
            .map(|c| (c.name.clone(), Expr::Incoming(c.name.clone())))
            .collect()),
        UpdateAction::Set(mappings) => {
            if mappings.is_empty() {
                return Err(UpsertError::invalid_config(
                    "explicit update mapping is empty",
                ));
            }
            let mut assignments = Vec::with_capacity(mappings.len());
            for (name, expr) in mappings {
                let column = schema
                    .column(name)
                    .ok_or_else(|| UpsertError::unknown_column(schema.name(), name.clone()))?;
                if column.generated {
                    return Err(UpsertError::unsupported_expression(format!(
                        "cannot assign to database-generated column '{name}'"
                    )));
                }
                expr.resolve(schema)?;
                assignments.push((column.name.clone(), expr.clone().fold()?));
            }
            Ok(assignments)
        }
    }
}

/// Assignments plus guard, validated together.
///
/// A guard with nothing to guard (no effective assignments, e.g. every
/// insert column is a match column) is rejected rather than silently
/// dropped.
pub(crate) fn update_plan(
    schema: &dyn TableSchema,
    keys: &MatchSpec,
    update: &UpdateSpec,
) -> UpsertResult<(Vec<(String, Expr)>, Option<Expr>)> {
    let assignments = update_assignments(schema, keys, update)?;
    let guard = validated_guard(schema, update)?;
    if guard.is_some() && assignments.is_empty() {
        return Err(UpsertError::invalid_config(
            "an update guard requires at least one update assignment",
        ));
    }
    Ok((assignments, guard))
}

/// Resolve and fold the update guard, if any.
pub(crate) fn validated_guard(
    schema: &dyn TableSchema,
    update: &UpdateSpec,
) -> UpsertResult<Option<Expr>> {
    match &update.guard {
        None => Ok(None),
        Some(guard) => {
            guard.resolve(schema)?;
            Ok(Some(guard.clone().fold()?))
        }
    }
}

/// Shared envelope for the ON CONFLICT family (postgres, sqlite).
pub(crate) fn compile_insert_on_conflict(
    dialect: &dyn Dialect,
    schema: &dyn TableSchema,
    rows: &[Row],
    keys: &MatchSpec,
    update: &UpdateSpec,
    returning: bool,
) -> UpsertResult<CompiledCommand> {
    let (assignments, guard) = update_plan(schema, keys, update)?;

    let mut w = SqlWriter::new(dialect);
    w.push("INSERT INTO ");
    w.push(&qualified_table(dialect, schema));
    w.push(" (");
    w.push(&quoted_columns(dialect, &schema.insert_columns()));
    w.push(") VALUES ");
    write_values_tuples(&mut w, schema, rows)?;

    w.push(" ON CONFLICT (");
    w.push(&quoted_names(dialect, keys.columns()));
    w.push(")");

    if assignments.is_empty() {
        w.push(" DO NOTHING");
    } else {
        w.push(" DO UPDATE SET ");
        for (i, (column, expr)) in assignments.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(&dialect.quote(column));
            w.push(" = ");
            render_expr(&mut w, schema, expr);
        }
        if let Some(guard) = &guard {
            w.push(" WHERE ");
            render_expr(&mut w, schema, guard);
        }
    }

    if returning {
        w.push(" RETURNING ");
        w.push(&quoted_columns(dialect, &generated_columns(schema)));
    }

    Ok(w.finish())
}
