//! # upsertql
//!
//! Typed insert-or-update (upsert) statement generation for Rust.
//!
//! ## Features
//!
//! - **One intent, four dialects**: postgres / sqlite `ON CONFLICT`,
//!   mysql `ON DUPLICATE KEY UPDATE`, mssql `MERGE`
//! - **Typed update expressions**: mix incoming and existing column values
//!   (`visits = t.visits + excluded.visits`) without writing SQL by hand
//! - **Null-safe matching**: two NULL key values count as a match on every
//!   backend, including `MERGE`
//! - **Guarded updates**: only overwrite a matched row when a predicate holds
//! - **Batching**: large row sets are split under each backend's bind
//!   parameter cap and executed strictly in order
//! - **Pluggable execution**: compile to `(sql, params)` pairs and run them
//!   through your own executor, sync or async, with cooperative cancellation
//!
//! ## Usage
//!
//! ```ignore
//! use upsertql::{upsert, Expr, Row, Table};
//!
//! let visits = Table::new("page_visit")
//!     .key_column("user_id")
//!     .key_column("date")
//!     .column("visits")
//!     .column("first_visit");
//!
//! let affected = upsert(&visits, "postgres")
//!     .row(Row::new()
//!         .set("user_id", 42)
//!         .set("date", "2026-08-29")
//!         .set("visits", 1)
//!         .set("first_visit", now))
//!     .set("visits", Expr::existing("visits").add(Expr::incoming("visits")))
//!     .run(&executor)?;
//! ```

pub mod builder;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod expr;
pub mod matchkey;
pub mod schema;
pub mod value;

pub use builder::{Upsert, upsert};
pub use dialect::{CompiledCommand, Dialect, dialect_for};
pub use dialect::{MySql, Postgres, Sqlite, SqlServer};
pub use error::{BoxDynError, UpsertError, UpsertResult};
pub use executor::{BlockingExecutor, Executor};
pub use expr::{BinOp, Expr, UpdateAction, UpdateSpec};
pub use matchkey::MatchSpec;
pub use schema::{Column, Row, Table, TableSchema};
pub use value::Value;

#[cfg(feature = "postgres")]
pub use executor::PgExecutor;
