//! Statement executor traits: the seam between compiled commands and a
//! database driver.
//!
//! The core never opens connections or manages transactions; it hands
//! finished SQL text plus parameter values to one of these traits and
//! propagates whatever the driver returns. The `postgres` feature ships a
//! ready-made [`Executor`] adapter over `tokio_postgres`.

use crate::error::BoxDynError;
use crate::value::Value;
use tokio_util::sync::CancellationToken;

/// Synchronous statement executor.
pub trait BlockingExecutor {
    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, BoxDynError>;

    /// Execute a statement and return its result rows as literal values.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>, BoxDynError>;
}

/// Asynchronous statement executor.
///
/// The cancellation token is forwarded with every statement; what
/// cancellation means once a statement is in flight is the executor's
/// contract, not the caller's.
pub trait Executor: Send + Sync {
    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<u64, BoxDynError>> + Send;

    /// Execute a statement and return its result rows as literal values.
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<Vec<Vec<Value>>, BoxDynError>> + Send;
}

#[cfg(feature = "postgres")]
mod pg {
    use super::{BoxDynError, CancellationToken, Executor, Value};
    use tokio_postgres::types::{ToSql, Type};

    /// [`Executor`] adapter over a `tokio_postgres` client.
    pub struct PgExecutor<'a> {
        client: &'a tokio_postgres::Client,
    }

    impl<'a> PgExecutor<'a> {
        /// Wrap a connected client.
        pub fn new(client: &'a tokio_postgres::Client) -> Self {
            Self { client }
        }
    }

    impl Executor for PgExecutor<'_> {
        fn execute(
            &self,
            sql: &str,
            params: &[Value],
            cancel: &CancellationToken,
        ) -> impl std::future::Future<Output = Result<u64, BoxDynError>> + Send {
            async move {
                let refs: Vec<&(dyn ToSql + Sync)> =
                    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
                tokio::select! {
                    _ = cancel.cancelled() => Err("statement cancelled by caller".into()),
                    res = self.client.execute(sql, &refs) => {
                        res.map_err(|e| Box::new(e) as BoxDynError)
                    }
                }
            }
        }

        fn query(
            &self,
            sql: &str,
            params: &[Value],
            cancel: &CancellationToken,
        ) -> impl std::future::Future<Output = Result<Vec<Vec<Value>>, BoxDynError>> + Send {
            async move {
                let refs: Vec<&(dyn ToSql + Sync)> =
                    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
                let rows = tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err("statement cancelled by caller".into());
                    }
                    res = self.client.query(sql, &refs) => {
                        res.map_err(|e| Box::new(e) as BoxDynError)?
                    }
                };
                rows.iter()
                    .map(|row| {
                        (0..row.len())
                            .map(|idx| column_value(row, idx))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect()
            }
        }
    }

    /// Decode one column of a returned row into a [`Value`].
    fn column_value(row: &tokio_postgres::Row, idx: usize) -> Result<Value, BoxDynError> {
        let ty = row.columns()[idx].type_().clone();
        let value = if ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool)
        } else if ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?
                .map(|v| Value::Int(v.into()))
        } else if ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?
                .map(|v| Value::Int(v.into()))
        } else if ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)?.map(Value::Int)
        } else if ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)?
                .map(|v| Value::Float(v.into()))
        } else if ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)?.map(Value::Float)
        } else if ty == Type::TEXT || ty == Type::VARCHAR || ty == Type::BPCHAR || ty == Type::NAME
        {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        } else if ty == Type::BYTEA {
            row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes)
        } else if ty == Type::UUID {
            row.try_get::<_, Option<uuid::Uuid>>(idx)?.map(Value::Uuid)
        } else if ty == Type::NUMERIC {
            row.try_get::<_, Option<rust_decimal::Decimal>>(idx)?
                .map(Value::Decimal)
        } else if ty == Type::DATE {
            row.try_get::<_, Option<chrono::NaiveDate>>(idx)?
                .map(Value::Date)
        } else if ty == Type::TIMESTAMP {
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
                .map(|v| Value::Timestamp(v.and_utc()))
        } else if ty == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
                .map(Value::Timestamp)
        } else if ty == Type::JSON || ty == Type::JSONB {
            row.try_get::<_, Option<serde_json::Value>>(idx)?
                .map(Value::Json)
        } else {
            return Err(format!("unsupported column type '{ty}' in returned row").into());
        };
        Ok(value.unwrap_or(Value::Null))
    }
}

#[cfg(feature = "postgres")]
pub use pg::PgExecutor;
