//! PostgreSQL: `INSERT … ON CONFLICT` with `$n` placeholders.

use super::{CompiledCommand, Dialect, compile_insert_on_conflict};
use crate::error::UpsertResult;
use crate::expr::UpdateSpec;
use crate::matchkey::MatchSpec;
use crate::schema::{Row, TableSchema};

pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["postgresql", "pg"]
    }

    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn max_params(&self) -> usize {
        65535
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn incoming_ref(&self, _schema: &dyn TableSchema, column: &str) -> String {
        format!("EXCLUDED.{}", self.quote(column))
    }

    fn existing_ref(&self, schema: &dyn TableSchema, column: &str) -> String {
        // DO UPDATE references the target by bare table name.
        format!("{}.{}", self.quote(schema.name()), self.quote(column))
    }

    fn compile(
        &self,
        schema: &dyn TableSchema,
        rows: &[Row],
        keys: &MatchSpec,
        update: &UpdateSpec,
        returning: bool,
    ) -> UpsertResult<CompiledCommand> {
        compile_insert_on_conflict(self, schema, rows, keys, update, returning)
    }
}
