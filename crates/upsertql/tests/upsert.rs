use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use upsertql::{
    BlockingExecutor, BoxDynError, Executor, Expr, Row, Table, UpsertError, Value, upsert,
};

/// Records every statement it receives and reports a fixed affected count.
#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<(String, usize)>>,
    fail_on_batch: Option<usize>,
}

impl RecordingExecutor {
    fn failing_on(batch: usize) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on_batch: Some(batch),
        }
    }

    /// 1-based count of statements accepted so far; query results carry it
    /// so tests can assert dispatch order.
    fn statement_count(&self) -> i64 {
        self.calls.lock().unwrap().len() as i64
    }

    fn record(&self, sql: &str, params: &[Value]) -> Result<u64, BoxDynError> {
        let mut calls = self.calls.lock().unwrap();
        if self.fail_on_batch == Some(calls.len()) {
            return Err("connection reset".into());
        }
        calls.push((sql.to_string(), params.len()));
        Ok(1)
    }
}

impl BlockingExecutor for RecordingExecutor {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, BoxDynError> {
        self.record(sql, params)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>, BoxDynError> {
        self.record(sql, params)?;
        Ok(vec![vec![Value::Int(self.statement_count())]])
    }
}

impl Executor for RecordingExecutor {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        _cancel: &CancellationToken,
    ) -> Result<u64, BoxDynError> {
        self.record(sql, params)
    }

    async fn query(
        &self,
        sql: &str,
        params: &[Value],
        _cancel: &CancellationToken,
    ) -> Result<Vec<Vec<Value>>, BoxDynError> {
        self.record(sql, params)?;
        Ok(vec![vec![Value::Int(self.statement_count())]])
    }
}

fn page_visits() -> Table {
    Table::new("page_visit")
        .key_column("user_id")
        .key_column("date")
        .column("visits")
        .column("first_visit")
        .column("last_visit")
}

fn visit_row(user: i64, date: &str) -> Row {
    Row::new()
        .set("user_id", user)
        .set("date", date)
        .set("visits", 1i64)
        .set("first_visit", "12:00")
        .set("last_visit", "12:00")
}

#[test]
fn page_visit_upsert_compiles_and_runs() {
    let table = page_visits();
    let executor = RecordingExecutor::default();
    let affected = upsert(&table, "postgres")
        .unwrap()
        .row(visit_row(42, "2026-08-29"))
        .set("visits", Expr::existing("visits").add(Expr::incoming("visits")))
        .set("last_visit", Expr::incoming("last_visit"))
        .run(&executor)
        .unwrap();

    assert_eq!(affected, 1);
    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].0,
        "INSERT INTO \"page_visit\" (\"user_id\", \"date\", \"visits\", \"first_visit\", \
         \"last_visit\") VALUES ($1, $2, $3, $4, $5) ON CONFLICT (\"user_id\", \"date\") \
         DO UPDATE SET \"visits\" = (\"page_visit\".\"visits\" + EXCLUDED.\"visits\"), \
         \"last_visit\" = EXCLUDED.\"last_visit\""
    );
    assert_eq!(calls[0].1, 5);
}

#[test]
fn large_batches_split_and_run_in_row_order() {
    let table = page_visits();
    let executor = RecordingExecutor::default();
    let rows: Vec<Row> = (0..500).map(|i| visit_row(i, "2026-08-29")).collect();

    // 999 sqlite parameters / 5 insert columns = 199 rows per statement.
    let affected = upsert(&table, "sqlite")
        .unwrap()
        .rows(rows)
        .run(&executor)
        .unwrap();

    assert_eq!(affected, 3);
    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].1, 199 * 5);
    assert_eq!(calls[1].1, 199 * 5);
    assert_eq!(calls[2].1, 102 * 5);
}

#[test]
fn execution_failure_carries_the_batch_index() {
    let table = page_visits();
    let executor = RecordingExecutor::failing_on(1);
    let rows: Vec<Row> = (0..500).map(|i| visit_row(i, "2026-08-29")).collect();

    let err = upsert(&table, "sqlite")
        .unwrap()
        .rows(rows)
        .run(&executor)
        .unwrap_err();

    assert!(matches!(err, UpsertError::Execute { batch: 1, .. }));
    // The first batch already reached the executor.
    assert_eq!(executor.calls.lock().unwrap().len(), 1);
}

#[test]
fn empty_batch_touches_nothing() {
    let table = page_visits();
    let executor = RecordingExecutor::default();
    let affected = upsert(&table, "postgres").unwrap().run(&executor).unwrap();

    assert_eq!(affected, 0);
    assert!(executor.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn async_run_dispatches_every_batch() {
    let table = page_visits();
    let executor = RecordingExecutor::default();
    let rows: Vec<Row> = (0..500).map(|i| visit_row(i, "2026-08-29")).collect();

    let affected = upsert(&table, "sqlite")
        .unwrap()
        .rows(rows)
        .run_async(&executor)
        .await
        .unwrap();

    assert_eq!(affected, 3);
    assert_eq!(executor.calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn cancelled_token_stops_before_the_first_statement() {
    let table = page_visits();
    let executor = RecordingExecutor::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = upsert(&table, "sqlite")
        .unwrap()
        .row(visit_row(1, "2026-08-29"))
        .run_async_cancellable(&executor, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, UpsertError::Cancelled));
    assert!(executor.calls.lock().unwrap().is_empty());
}

#[test]
fn fetch_generated_appends_returning_and_collects_rows() {
    let table = Table::new("account")
        .generated_key_column("id")
        .key_column("email")
        .column("name");
    let executor = RecordingExecutor::default();

    let rows = upsert(&table, "postgres")
        .unwrap()
        .row(Row::new().set("email", "a@example.com").set("name", "a"))
        .on(["email"])
        .fetch_generated(&executor)
        .unwrap();

    assert_eq!(rows, vec![vec![Value::Int(1)]]);
    let calls = executor.calls.lock().unwrap();
    assert!(calls[0].0.ends_with("RETURNING \"id\""), "sql: {}", calls[0].0);
}

#[tokio::test]
async fn fetch_generated_async_concatenates_batches_in_order() {
    let table = Table::new("account")
        .generated_key_column("id")
        .key_column("email")
        .column("name");
    let executor = RecordingExecutor::default();
    let cancel = CancellationToken::new();
    let rows: Vec<Row> = (0..600)
        .map(|i| Row::new().set("email", format!("u{i}@example.com")).set("name", "u"))
        .collect();

    // 999 sqlite parameters / 2 insert columns = 499 rows per statement.
    let generated = upsert(&table, "sqlite")
        .unwrap()
        .rows(rows)
        .on(["email"])
        .fetch_generated_async(&executor, &cancel)
        .await
        .unwrap();

    assert_eq!(executor.calls.lock().unwrap().len(), 2);
    // One result row per statement here; batch results keep dispatch order.
    assert_eq!(generated, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
}

#[tokio::test]
async fn fetch_generated_async_without_generated_columns_is_rejected() {
    let table = page_visits();
    let executor = RecordingExecutor::default();
    let cancel = CancellationToken::new();

    let err = upsert(&table, "postgres")
        .unwrap()
        .row(visit_row(1, "2026-08-29"))
        .fetch_generated_async(&executor, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, UpsertError::InvalidConfig(_)));
    assert!(executor.calls.lock().unwrap().is_empty());
}
