//! Fluent upsert builder and command orchestrator.
//!
//! `upsert(&schema, "postgres")` starts a builder; identity columns,
//! update computations and a guard are collected, then `compile()` turns
//! the batch into one or more [`CompiledCommand`]s and the run methods
//! drive them through an executor, strictly in row order.

use crate::dialect::{
    CompiledCommand, Dialect, dialect_for, generated_columns, row_values, update_plan,
};
use crate::error::{UpsertError, UpsertResult};
use crate::executor::{BlockingExecutor, Executor};
use crate::expr::{Expr, UpdateAction, UpdateSpec};
use crate::matchkey::MatchSpec;
use crate::schema::{Row, TableSchema};
use crate::value::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Start an upsert against the given table for the named provider.
pub fn upsert<'a>(schema: &'a dyn TableSchema, provider: &str) -> UpsertResult<Upsert<'a>> {
    let dialect = dialect_for(provider)
        .ok_or_else(|| UpsertError::UnknownProvider(provider.to_string()))?;
    Ok(Upsert {
        schema,
        dialect,
        rows: Vec::new(),
        on: None,
        action: UpdateAction::AllNonKey,
        guard: None,
        state_error: None,
    })
}

/// Collected upsert intent: rows, identity columns, update behaviour.
///
/// Builder mis-use (repeated or conflicting clauses) is recorded and
/// surfaced from `compile()`, so the fluent chain never panics.
pub struct Upsert<'a> {
    schema: &'a dyn TableSchema,
    dialect: &'static dyn Dialect,
    rows: Vec<Row>,
    on: Option<Vec<String>>,
    action: UpdateAction,
    guard: Option<Expr>,
    state_error: Option<String>,
}

impl<'a> Upsert<'a> {
    /// Append one row to the batch.
    pub fn row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    /// Append rows to the batch, preserving their order.
    pub fn rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Choose the identity columns used for conflict detection.
    ///
    /// Without this call the schema's declared key columns are used.
    pub fn on<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.on.is_some() {
            self.state_error = Some("on() can only be called once".to_string());
            return self;
        }
        self.on = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Update every non-key column with the incoming value (the default).
    pub fn update_all(mut self) -> Self {
        match self.action {
            UpdateAction::Set(_) => {
                self.state_error = Some("update_all() cannot follow set()".to_string());
            }
            _ => self.action = UpdateAction::AllNonKey,
        }
        self
    }

    /// Set one column from an explicit computation on conflict.
    ///
    /// Switches the update action to an explicit mapping; only the listed
    /// columns are written.
    pub fn set(mut self, column: &str, expr: impl Into<Expr>) -> Self {
        match &mut self.action {
            UpdateAction::Set(mappings) => mappings.push((column.to_string(), expr.into())),
            UpdateAction::AllNonKey => {
                self.action = UpdateAction::Set(vec![(column.to_string(), expr.into())]);
            }
            UpdateAction::Nothing => {
                self.state_error = Some("set() cannot follow do_nothing()".to_string());
            }
        }
        self
    }

    /// Insert-only: matched rows are left untouched.
    pub fn do_nothing(mut self) -> Self {
        match self.action {
            UpdateAction::Set(_) => {
                self.state_error = Some("do_nothing() cannot follow set()".to_string());
            }
            _ => self.action = UpdateAction::Nothing,
        }
        self
    }

    /// Guard the update: matched rows are only written when the predicate
    /// holds for that row.
    pub fn when(mut self, guard: Expr) -> Self {
        if self.guard.is_some() {
            self.state_error = Some("when() can only be called once".to_string());
            return self;
        }
        self.guard = Some(guard);
        self
    }

    /// Compile the batch into one statement per dialect-sized chunk.
    ///
    /// Pure and side-effect free; an empty batch compiles to no commands.
    pub fn compile(&self) -> UpsertResult<Vec<CompiledCommand>> {
        self.compile_with(false)
    }

    fn compile_with(&self, returning: bool) -> UpsertResult<Vec<CompiledCommand>> {
        if let Some(message) = &self.state_error {
            return Err(UpsertError::invalid_config(message.clone()));
        }
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }

        let keys = MatchSpec::resolve(self.schema, self.on.as_deref())?;
        let update = UpdateSpec {
            action: self.action.clone(),
            guard: self.guard.clone(),
        };

        if update.guard.is_some() && update.action == UpdateAction::Nothing {
            return Err(UpsertError::invalid_config(
                "an update guard cannot be combined with do_nothing()",
            ));
        }
        if returning {
            if !self.dialect.supports_returning() {
                return Err(UpsertError::unsupported_feature(
                    self.dialect.name(),
                    "returning generated values",
                ));
            }
            if generated_columns(self.schema).is_empty() {
                return Err(UpsertError::invalid_config(format!(
                    "table '{}' has no database-generated columns to return",
                    self.schema.name()
                )));
            }
        }

        // Validate every row up front so mismatch errors carry the global
        // row index rather than a chunk-relative one.
        for (index, row) in self.rows.iter().enumerate() {
            row_values(self.schema, row, index)?;
        }

        let rows_per_statement = self.rows_per_statement(&keys, &update)?;
        self.rows
            .chunks(rows_per_statement)
            .map(|chunk| {
                self.dialect
                    .compile(self.schema, chunk, &keys, &update, returning)
            })
            .collect()
    }

    /// Rows that fit one statement under the dialect's parameter cap.
    fn rows_per_statement(&self, keys: &MatchSpec, update: &UpdateSpec) -> UpsertResult<usize> {
        let per_row = self.schema.insert_columns().len().max(1);
        let (assignments, guard) = update_plan(self.schema, keys, update)?;
        let guard_binds = guard.map(|g| g.bind_count()).unwrap_or(0);
        let guard_sites = if self.dialect.inline_guard() {
            assignments.len().max(1)
        } else {
            1
        };
        let fixed = assignments
            .iter()
            .map(|(_, expr)| expr.bind_count())
            .sum::<usize>()
            + guard_binds * guard_sites;
        let budget = self.dialect.max_params().saturating_sub(fixed);
        Ok((budget / per_row).max(1))
    }

    /// Execute synchronously and return the total affected-row count.
    ///
    /// Statements run strictly in row order; on failure the driver error
    /// is propagated unchanged, tagged with the zero-based batch index.
    /// Earlier batches have already been handed to the executor; commit
    /// and rollback boundaries belong to the caller's transaction.
    pub fn run(&self, executor: &impl BlockingExecutor) -> UpsertResult<u64> {
        let commands = self.compile_with(false)?;
        let mut affected = 0;
        for (batch, command) in commands.iter().enumerate() {
            log_dispatch(batch, command);
            affected += executor
                .execute(&command.sql, &command.params)
                .map_err(|source| UpsertError::Execute { batch, source })?;
        }
        Ok(affected)
    }

    /// Execute asynchronously and return the total affected-row count.
    pub async fn run_async(&self, executor: &impl Executor) -> UpsertResult<u64> {
        let cancel = CancellationToken::new();
        self.run_async_cancellable(executor, &cancel).await
    }

    /// Execute asynchronously with cooperative cancellation.
    ///
    /// A cancellation observed before a statement is dispatched aborts
    /// with [`UpsertError::Cancelled`]; the token is forwarded to the
    /// executor for statements already in flight.
    pub async fn run_async_cancellable(
        &self,
        executor: &impl Executor,
        cancel: &CancellationToken,
    ) -> UpsertResult<u64> {
        let commands = self.compile_with(false)?;
        let mut affected = 0;
        for (batch, command) in commands.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(UpsertError::Cancelled);
            }
            log_dispatch(batch, command);
            affected += executor
                .execute(&command.sql, &command.params, cancel)
                .await
                .map_err(|source| UpsertError::Execute { batch, source })?;
        }
        Ok(affected)
    }

    /// Execute synchronously, returning the database-generated values of
    /// every written row, in input row order.
    pub fn fetch_generated(&self, executor: &impl BlockingExecutor) -> UpsertResult<Vec<Vec<Value>>> {
        let commands = self.compile_with(true)?;
        let mut rows = Vec::with_capacity(self.rows.len());
        for (batch, command) in commands.iter().enumerate() {
            log_dispatch(batch, command);
            rows.extend(
                executor
                    .query(&command.sql, &command.params)
                    .map_err(|source| UpsertError::Execute { batch, source })?,
            );
        }
        Ok(rows)
    }

    /// Async variant of [`Upsert::fetch_generated`].
    pub async fn fetch_generated_async(
        &self,
        executor: &impl Executor,
        cancel: &CancellationToken,
    ) -> UpsertResult<Vec<Vec<Value>>> {
        let commands = self.compile_with(true)?;
        let mut rows = Vec::with_capacity(self.rows.len());
        for (batch, command) in commands.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(UpsertError::Cancelled);
            }
            log_dispatch(batch, command);
            rows.extend(
                executor
                    .query(&command.sql, &command.params, cancel)
                    .await
                    .map_err(|source| UpsertError::Execute { batch, source })?,
            );
        }
        Ok(rows)
    }
}

fn log_dispatch(batch: usize, command: &CompiledCommand) {
    debug!(
        target: "upsertql.sql",
        batch,
        params = command.params.len(),
        sql = %command.sql,
        "executing upsert batch"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Table;

    fn visits() -> Table {
        Table::new("page_visit")
            .key_column("user_id")
            .key_column("date")
            .column("visits")
    }

    fn row(user: i64) -> Row {
        Row::new()
            .set("user_id", user)
            .set("date", "2026-08-29")
            .set("visits", 1)
    }

    #[test]
    fn empty_batch_compiles_to_nothing() {
        let t = visits();
        let commands = upsert(&t, "postgres").unwrap().compile().unwrap();
        assert!(commands.is_empty());
    }

    #[test]
    fn unknown_provider_is_rejected_up_front() {
        let t = visits();
        assert!(matches!(
            upsert(&t, "oracle"),
            Err(UpsertError::UnknownProvider(_))
        ));
    }

    #[test]
    fn sqlite_batches_split_under_the_parameter_cap() {
        let t = visits();
        let rows: Vec<Row> = (0..400).map(row).collect();
        let commands = upsert(&t, "sqlite").unwrap().rows(rows).compile().unwrap();
        // 999 params / 3 columns = 333 rows per statement.
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].params.len(), 333 * 3);
        assert_eq!(commands[1].params.len(), 67 * 3);
    }

    #[test]
    fn guard_parameters_shrink_the_row_budget() {
        let t = visits();
        let builder = upsert(&t, "sqlite")
            .unwrap()
            .rows((0..400).map(row))
            .set("visits", Expr::existing("visits").add(Expr::incoming("visits")))
            .when(Expr::existing("visits").lt(100));
        let commands = builder.compile().unwrap();
        // One guard literal: (999 - 1) / 3 = 332 rows per statement.
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].params.len(), 332 * 3 + 1);
    }

    #[test]
    fn guard_with_do_nothing_is_rejected() {
        let t = visits();
        let err = upsert(&t, "postgres")
            .unwrap()
            .row(row(1))
            .do_nothing()
            .when(Expr::existing("visits").lt(100))
            .compile()
            .unwrap_err();
        assert!(matches!(err, UpsertError::InvalidConfig(_)));
    }

    #[test]
    fn repeated_on_is_rejected() {
        let t = visits();
        let err = upsert(&t, "postgres")
            .unwrap()
            .row(row(1))
            .on(["user_id"])
            .on(["date"])
            .compile()
            .unwrap_err();
        assert!(matches!(err, UpsertError::InvalidConfig(_)));
    }

    #[test]
    fn set_after_do_nothing_is_rejected() {
        let t = visits();
        let err = upsert(&t, "postgres")
            .unwrap()
            .row(row(1))
            .do_nothing()
            .set("visits", Expr::incoming("visits"))
            .compile()
            .unwrap_err();
        assert!(matches!(err, UpsertError::InvalidConfig(_)));
    }

    #[test]
    fn generated_match_column_fails_before_compilation() {
        let t = Table::new("t").generated_key_column("id").column("name");
        let err = upsert(&t, "postgres")
            .unwrap()
            .row(Row::new().set("name", "a"))
            .on(["id"])
            .compile()
            .unwrap_err();
        assert!(matches!(err, UpsertError::InvalidMatchColumns(_)));
    }

    #[test]
    fn mysql_generated_value_return_fails_before_execution() {
        struct NoExecutor;
        impl BlockingExecutor for NoExecutor {
            fn execute(&self, _: &str, _: &[Value]) -> Result<u64, crate::error::BoxDynError> {
                panic!("must not be called");
            }
            fn query(
                &self,
                _: &str,
                _: &[Value],
            ) -> Result<Vec<Vec<Value>>, crate::error::BoxDynError> {
                panic!("must not be called");
            }
        }
        let t = Table::new("t").generated_key_column("id").key_column("name");
        let err = upsert(&t, "mysql")
            .unwrap()
            .row(Row::new().set("name", "a"))
            .on(["name"])
            .fetch_generated(&NoExecutor)
            .unwrap_err();
        assert!(matches!(err, UpsertError::UnsupportedFeature { .. }));
    }
}
