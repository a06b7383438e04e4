//! SQLite: `INSERT … ON CONFLICT` with `?` placeholders.
//!
//! Same envelope as postgres, but the default host-parameter cap is 999
//! (SQLITE_MAX_VARIABLE_NUMBER), so large batches split aggressively.

use super::{CompiledCommand, Dialect, compile_insert_on_conflict};
use crate::error::UpsertResult;
use crate::expr::UpdateSpec;
use crate::matchkey::MatchSpec;
use crate::schema::{Row, TableSchema};

pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["sqlite3"]
    }

    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn max_params(&self) -> usize {
        999
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn incoming_ref(&self, _schema: &dyn TableSchema, column: &str) -> String {
        format!("excluded.{}", self.quote(column))
    }

    fn existing_ref(&self, schema: &dyn TableSchema, column: &str) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, UpdateAction};
    use crate::schema::Table;

    fn visits() -> Table {
        Table::new("page_visit")
            .key_column("user_id")
            .key_column("date")
            .column("visits")
    }

    #[test]
    fn placeholders_are_anonymous() {
        let t = visits();
        let keys = MatchSpec::resolve(&t, None).unwrap();
        let row = Row::new().set("user_id", 1).set("date", "2026-08-29").set("visits", 1);
        let cmd = Sqlite
            .compile(&t, &[row], &keys, &UpdateSpec::default(), false)
            .unwrap();
        assert_eq!(
            cmd.sql,
            "INSERT INTO \"page_visit\" (\"user_id\", \"date\", \"visits\") \
             VALUES (?, ?, ?) ON CONFLICT (\"user_id\", \"date\") \
             DO UPDATE SET \"visits\" = excluded.\"visits\""
        );
    }

    #[test]
    fn guard_and_expression_render_lowercase_excluded() {
        let t = visits();
        let keys = MatchSpec::resolve(&t, None).unwrap();
        let row = Row::new().set("user_id", 1).set("date", "2026-08-29").set("visits", 1);
        let update = UpdateSpec {
            action: UpdateAction::Set(vec![(
                "visits".into(),
                Expr::existing("visits").add(Expr::incoming("visits")),
            )]),
            guard: Some(Expr::existing("visits").lt(100)),
        };
        let cmd = Sqlite.compile(&t, &[row], &keys, &update, false).unwrap();
        assert!(cmd.sql.ends_with(
            "DO UPDATE SET \"visits\" = (\"page_visit\".\"visits\" + excluded.\"visits\") \
             WHERE (\"page_visit\".\"visits\" < ?)"
        ));
        assert_eq!(cmd.params.len(), 4);
    }
}
