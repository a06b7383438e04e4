//! MySQL / MariaDB: `INSERT … ON DUPLICATE KEY UPDATE` with `?` placeholders.
//!
//! This envelope has no conditional update branch, so a guard is rendered
//! inline per column as `col = IF(guard, expr, col)`, a no-op write when
//! the guard is false. Conflict detection uses whatever unique keys the
//! table declares; the match columns are validated but never rendered.

use super::{
    CompiledCommand, Dialect, SqlWriter, qualified_table, quoted_columns, render_expr,
    update_plan, write_values_tuples,
};
use crate::error::{UpsertError, UpsertResult};
use crate::expr::UpdateSpec;
use crate::matchkey::MatchSpec;
use crate::schema::{Row, TableSchema};

pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["mariadb"]
    }

    fn quote(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn max_params(&self) -> usize {
        65535
    }

    fn supports_returning(&self) -> bool {
        false
    }

    fn inline_guard(&self) -> bool {
        true
    }

    fn incoming_ref(&self, _schema: &dyn TableSchema, column: &str) -> String {
        format!("VALUES({})", self.quote(column))
    }

    fn existing_ref(&self, _schema: &dyn TableSchema, column: &str) -> String {
        self.quote(column)
    }

    fn compile(
        &self,
        schema: &dyn TableSchema,
        rows: &[Row],
        keys: &MatchSpec,
        update: &UpdateSpec,
        returning: bool,
    ) -> UpsertResult<CompiledCommand> {
        if returning {
            return Err(UpsertError::unsupported_feature(
                self.name(),
                "returning generated values",
            ));
        }
        let (assignments, guard) = update_plan(schema, keys, update)?;

        let mut w = SqlWriter::new(self);
        w.push("INSERT INTO ");
        w.push(&qualified_table(self, schema));
        w.push(" (");
        w.push(&quoted_columns(self, &schema.insert_columns()));
        w.push(") VALUES ");
        write_values_tuples(&mut w, schema, rows)?;

        w.push(" ON DUPLICATE KEY UPDATE ");
        if assignments.is_empty() {
            // Insert-or-ignore: the clause needs at least one assignment,
            // so write a self-assignment of the first match column.
            let first = self.quote(&keys.columns()[0]);
            w.push(&first);
            w.push(" = ");
            w.push(&first);
        } else {
            for (i, (column, expr)) in assignments.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                let column_sql = self.quote(column);
                w.push(&column_sql);
                w.push(" = ");
                match &guard {
                    Some(guard) => {
                        // Guard parameters repeat for every assignment.
                        w.push("IF(");
                        render_expr(&mut w, schema, guard);
                        w.push(", ");
                        render_expr(&mut w, schema, expr);
                        w.push(", ");
                        w.push(&column_sql);
                        w.push(")");
                    }
                    None => render_expr(&mut w, schema, expr),
                }
            }
        }

        Ok(w.finish())
    }
}
