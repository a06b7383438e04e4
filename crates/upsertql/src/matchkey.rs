//! Match-key planning: which columns identify a conflicting row.

use crate::error::{UpsertError, UpsertResult};
use crate::expr::Expr;
use crate::schema::TableSchema;

/// Validated, ordered set of identity columns used for conflict detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpec {
    columns: Vec<String>,
}

impl MatchSpec {
    /// Resolve the caller's identity columns against the schema.
    ///
    /// With `explicit` columns each name must resolve to a real,
    /// non-generated column and the given order is preserved. Without,
    /// the schema's declared key columns are used; a generated key column
    /// (e.g. a serial id) cannot identify a conflicting row before insert
    /// and is therefore unusable as a default.
    pub fn resolve(schema: &dyn TableSchema, explicit: Option<&[String]>) -> UpsertResult<Self> {
        let columns = match explicit {
            Some(names) => {
                if names.is_empty() {
                    return Err(UpsertError::invalid_match("no match columns given"));
                }
                let mut columns = Vec::with_capacity(names.len());
                for name in names {
                    let column = schema.column(name).ok_or_else(|| {
                        UpsertError::invalid_match(format!(
                            "'{}' is not a column of table '{}'",
                            name,
                            schema.name()
                        ))
                    })?;
                    if column.generated {
                        return Err(UpsertError::invalid_match(format!(
                            "'{}' is database-generated and cannot identify a conflicting row",
                            name
                        )));
                    }
                    columns.push(column.name.clone());
                }
                columns
            }
            None => {
                let keys = schema.key_columns();
                if keys.is_empty() {
                    return Err(UpsertError::invalid_match(format!(
                        "table '{}' declares no key columns; call on() with explicit identity columns",
                        schema.name()
                    )));
                }
                if keys.iter().any(|c| c.generated) {
                    return Err(UpsertError::invalid_match(format!(
                        "the key of table '{}' contains a database-generated column; call on() with explicit identity columns",
                        schema.name()
                    )));
                }
                keys.iter().map(|c| c.name.clone()).collect()
            }
        };

        Ok(Self { columns })
    }

    /// Identity column names, in caller order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the given column is part of the identity key.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// The null-safe equality predicate over all identity columns.
    ///
    /// Plain `=` chains silently exclude rows where a key part is NULL, so
    /// each column compares as
    /// `(incoming = existing OR (incoming IS NULL AND existing IS NULL))`.
    /// Dialects that take an ON predicate (MERGE) render this tree; the
    /// ON CONFLICT / ON DUPLICATE KEY envelopes carry the column list
    /// instead and inherit null handling from the unique index.
    pub fn null_safe_predicate(&self) -> Expr {
        let mut per_column = self.columns.iter().map(|c| {
            Expr::incoming(c).eq(Expr::existing(c)).or(Expr::incoming(c)
                .is_null()
                .and(Expr::existing(c).is_null()))
        });
        // resolve() guarantees at least one column.
        let first = per_column.next().expect("MatchSpec is never empty");
        per_column.fold(first, |acc, p| acc.and(p))
    }
}
