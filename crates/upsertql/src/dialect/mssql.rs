//! SQL Server: `MERGE` with `@pN` placeholders.
//!
//! The only dialect with a native conditional update branch
//! (`WHEN MATCHED AND …`) and the only one that needs the null-safe match
//! predicate spelled out, since the ON clause is an arbitrary join
//! condition rather than a unique-index reference.

use super::{
    CompiledCommand, Dialect, SqlWriter, generated_columns, qualified_table, quoted_columns,
    render_expr, update_plan, write_values_tuples,
};
use crate::error::UpsertResult;
use crate::expr::UpdateSpec;
use crate::matchkey::MatchSpec;
use crate::schema::{Row, TableSchema};

pub struct SqlServer;

impl Dialect for SqlServer {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["sqlserver"]
    }

    fn quote(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{index}")
    }

    fn max_params(&self) -> usize {
        2100
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn incoming_ref(&self, _schema: &dyn TableSchema, column: &str) -> String {
        format!("[src].{}", self.quote(column))
    }

    fn existing_ref(&self, _schema: &dyn TableSchema, column: &str) -> String {
        format!("[t].{}", self.quote(column))
    }

    fn compile(
        &self,
        schema: &dyn TableSchema,
        rows: &[Row],
        keys: &MatchSpec,
        update: &UpdateSpec,
        returning: bool,
    ) -> UpsertResult<CompiledCommand> {
        let (assignments, guard) = update_plan(schema, keys, update)?;
        let insert_columns = schema.insert_columns();

        let mut w = SqlWriter::new(self);
        w.push("MERGE INTO ");
        w.push(&qualified_table(self, schema));
        w.push(" WITH (HOLDLOCK) AS [t] USING (VALUES ");
        write_values_tuples(&mut w, schema, rows)?;
        w.push(") AS [src] (");
        w.push(&quoted_columns(self, &insert_columns));
        w.push(") ON ");
        render_expr(&mut w, schema, &keys.null_safe_predicate());

        if !assignments.is_empty() {
            w.push(" WHEN MATCHED");
            if let Some(guard) = &guard {
                w.push(" AND ");
                render_expr(&mut w, schema, guard);
            }
            w.push(" THEN UPDATE SET ");
            for (i, (column, expr)) in assignments.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push(&self.quote(column));
                w.push(" = ");
                render_expr(&mut w, schema, expr);
            }
        }

        w.push(" WHEN NOT MATCHED THEN INSERT (");
        w.push(&quoted_columns(self, &insert_columns));
        w.push(") VALUES (");
        for (i, column) in insert_columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            let sql = self.incoming_ref(schema, &column.name);
            w.push(&sql);
        }
        w.push(")");

        if returning {
            w.push(" OUTPUT ");
            let outputs = generated_columns(schema)
                .iter()
                .map(|c| format!("INSERTED.{}", self.quote(&c.name)))
                .collect::<Vec<_>>()
                .join(", ");
            w.push(&outputs);
        }

        w.push(";");
        Ok(w.finish())
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
            .column("visits")
    }

    fn keys(t: &Table) -> MatchSpec {
        MatchSpec::resolve(t, None).unwrap()
    }

    fn row() -> Row {
        Row::new().set("user_id", 1).set("visits", 1)
    }

    #[test]
    fn merge_envelope_with_null_safe_match() {
        let t = visits();
        let cmd = SqlServer
            .compile(&t, &[row()], &keys(&t), &UpdateSpec::default(), false)
            .unwrap();
        assert_eq!(
            cmd.sql,
            "MERGE INTO [page_visit] WITH (HOLDLOCK) AS [t] \
             USING (VALUES (@p1, @p2)) AS [src] ([user_id], [visits]) \
             ON (([src].[user_id] = [t].[user_id]) OR (([src].[user_id] IS NULL) AND ([t].[user_id] IS NULL))) \
             WHEN MATCHED THEN UPDATE SET [visits] = [src].[visits] \
             WHEN NOT MATCHED THEN INSERT ([user_id], [visits]) \
             VALUES ([src].[user_id], [src].[visits]);"
        );
    }

    #[test]
    fn visit_count_accumulates_across_conflicts() {
        let t = visits();
        let update = UpdateSpec {
            action: UpdateAction::Set(vec![(
                "visits".to_string(),
                Expr::existing("visits").add(Expr::incoming("visits")),
            )]),
            guard: None,
        };
        let cmd = SqlServer
            .compile(&t, &[row()], &keys(&t), &update, false)
            .unwrap();
        assert!(cmd.sql.contains(
            "WHEN MATCHED THEN UPDATE SET [visits] = ([t].[visits] + [src].[visits])"
        ));
    }

    #[test]
    fn guard_becomes_when_matched_and() {
        let t = visits();
        let update = UpdateSpec {
            action: UpdateAction::AllNonKey,
            guard: Some(Expr::incoming("visits").gt(Expr::existing("visits"))),
        };
        let cmd = SqlServer
            .compile(&t, &[row()], &keys(&t), &update, false)
            .unwrap();
        assert!(cmd.sql.contains(
            "WHEN MATCHED AND ([src].[visits] > [t].[visits]) THEN UPDATE SET"
        ));
    }

    #[test]
    fn insert_only_omits_when_matched() {
        let t = visits();
        let update = UpdateSpec {
            action: UpdateAction::Nothing,
            guard: None,
        };
        let cmd = SqlServer
            .compile(&t, &[row()], &keys(&t), &update, false)
            .unwrap();
        assert!(!cmd.sql.contains("WHEN MATCHED"));
        assert!(cmd.sql.contains("WHEN NOT MATCHED THEN INSERT"));
    }

    #[test]
    fn output_clause_returns_generated_values() {
        let t = Table::new("t").generated_key_column("id").column("name");
        let keys = MatchSpec::resolve(&t, Some(&["name".into()])).unwrap();
        let cmd = SqlServer
            .compile(
                &t,
                &[Row::new().set("name", "a")],
                &keys,
                &UpdateSpec::default(),
                true,
            )
            .unwrap();
        assert!(cmd.sql.ends_with("OUTPUT INSERTED.[id];"));
    }

    #[test]
    fn composite_key_match_is_a_conjunction() {
        let t = Table::new("t").key_column("a").key_column("b").column("v");
        let keys = MatchSpec::resolve(&t, None).unwrap();
        let cmd = SqlServer
            .compile(
                &t,
                &[Row::new().set("a", 1).set("b", 2).set("v", 3)],
                &keys,
                &UpdateSpec::default(),
                false,
            )
            .unwrap();
        assert!(cmd.sql.contains(
            "ON ((([src].[a] = [t].[a]) OR (([src].[a] IS NULL) AND ([t].[a] IS NULL))) \
             AND (([src].[b] = [t].[b]) OR (([src].[b] IS NULL) AND ([t].[b] IS NULL))))"
        ));
    }
}
