/// # Test Utilities Module
///
/// Scriptable in-memory driver for exercising the connection manager and
/// query executor without a database.
///
/// This module provides:
/// - `ScriptedDriver`, whose rows, metadata and failures are set per test
/// - Call counters for connects, probes, cursor and connection closes
/// - A record of every executed statement and its bind parameters
/// - Sample profile fixtures

use crate::config::{DatabaseProfile, DriverPath, RawProfile};
use crate::core::db::driver::{
    ensure_open, ColumnDescription, ConnectRequest, Cursor, Driver, DriverConnection, Row, Value,
};
use crate::core::{DriverError, DriverResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// What `fetch_all` does after a successful execute.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Rows(Vec<Row>),
    NoResultSet,
    Fail(String),
}

/// A statement as seen by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub query: String,
    pub params: Option<Vec<Value>>,
}

/// Arguments of a connect call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRecord {
    pub driver_class: String,
    pub url: String,
    pub credentials: [String; 2],
    pub artifact_paths: Vec<String>,
}

#[derive(Debug, Clone)]
enum ExecuteFailure {
    Database(String),
    NoResultSet,
}

#[derive(Debug)]
struct Script {
    columns: Vec<ColumnDescription>,
    fetch: FetchOutcome,
    cursor_error: Option<String>,
    execute_error: Option<ExecuteFailure>,
    execute_delay: Option<Duration>,
    last_connect: Option<ConnectRecord>,
    executed: Vec<ExecutedStatement>,
}

#[derive(Debug)]
struct Shared {
    script: Mutex<Script>,
    live: AtomicBool,
    fail_close: AtomicBool,
    fail_cursor_close: AtomicBool,
    pending_connect_failures: AtomicUsize,
    connects: AtomicUsize,
    probes: AtomicUsize,
    connection_closes: AtomicUsize,
    cursor_closes: AtomicUsize,
    active_executions: AtomicUsize,
    max_concurrent_executions: AtomicUsize,
}

impl Shared {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`Driver`] whose behaviour is scripted by the test.
///
/// Clones share state, so a test can keep one clone for assertions and hand
/// another to the manager. By default every query yields columns
/// `col1, col2` and rows `(1, "data1"), (2, "data2")`.
#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    shared: Arc<Shared>,
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDriver {
    pub fn new() -> Self {
        let script = Script {
            columns: vec![ColumnDescription::new("col1"), ColumnDescription::new("col2")],
            fetch: FetchOutcome::Rows(vec![
                vec![Value::Integer(1), Value::from("data1")],
                vec![Value::Integer(2), Value::from("data2")],
            ]),
            cursor_error: None,
            execute_error: None,
            execute_delay: None,
            last_connect: None,
            executed: Vec::new(),
        };
        ScriptedDriver {
            shared: Arc::new(Shared {
                script: Mutex::new(script),
                live: AtomicBool::new(true),
                fail_close: AtomicBool::new(false),
                fail_cursor_close: AtomicBool::new(false),
                pending_connect_failures: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                probes: AtomicUsize::new(0),
                connection_closes: AtomicUsize::new(0),
                cursor_closes: AtomicUsize::new(0),
                active_executions: AtomicUsize::new(0),
                max_concurrent_executions: AtomicUsize::new(0),
            }),
        }
    }

    /// Sets the column metadata reported for result sets.
    pub fn with_columns(self, columns: Vec<ColumnDescription>) -> Self {
        self.shared.script().columns = columns;
        self
    }

    /// Sets the result of `fetch_all`.
    pub fn with_fetch(self, fetch: FetchOutcome) -> Self {
        self.shared.script().fetch = fetch;
        self
    }

    /// Sets column names and rows in one go.
    pub fn with_rows(self, columns: &[&str], rows: Vec<Row>) -> Self {
        self.with_columns(columns.iter().map(|c| ColumnDescription::new(*c)).collect())
            .with_fetch(FetchOutcome::Rows(rows))
    }

    /// Makes every `cursor` call fail with a database error.
    pub fn fail_cursor(self, message: &str) -> Self {
        self.shared.script().cursor_error = Some(message.to_string());
        self
    }

    /// Makes every `execute` fail with a database error.
    pub fn fail_execute(self, message: &str) -> Self {
        self.shared.script().execute_error = Some(ExecuteFailure::Database(message.to_string()));
        self
    }

    /// Makes every `execute` report a missing result set.
    pub fn fail_execute_without_result_set(self) -> Self {
        self.shared.script().execute_error = Some(ExecuteFailure::NoResultSet);
        self
    }

    /// Makes every `execute` block for `delay`.
    pub fn with_execute_delay(self, delay: Duration) -> Self {
        self.shared.script().execute_delay = Some(delay);
        self
    }

    /// Makes the next `count` connect calls fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.shared.pending_connect_failures.store(count, Ordering::SeqCst);
    }

    /// Makes the liveness probe of the current connection fail.
    pub fn sever(&self) {
        self.shared.live.store(false, Ordering::SeqCst);
    }

    /// Makes connection close calls fail (they are still counted).
    pub fn fail_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Makes cursor close calls fail (they are still counted).
    pub fn fail_cursor_close(self, fail: bool) -> Self {
        self.shared.fail_cursor_close.store(fail, Ordering::SeqCst);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.shared.probes.load(Ordering::SeqCst)
    }

    pub fn connection_close_count(&self) -> usize {
        self.shared.connection_closes.load(Ordering::SeqCst)
    }

    pub fn cursor_close_count(&self) -> usize {
        self.shared.cursor_closes.load(Ordering::SeqCst)
    }

    /// Highest number of statements that were executing at the same time.
    pub fn max_concurrent_executions(&self) -> usize {
        self.shared.max_concurrent_executions.load(Ordering::SeqCst)
    }

    pub fn last_connect(&self) -> Option<ConnectRecord> {
        self.shared.script().last_connect.clone()
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.shared.script().executed.clone()
    }
}

impl Driver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn connect(&self, request: &ConnectRequest<'_>) -> DriverResult<Box<dyn DriverConnection>> {
        self.shared.script().last_connect = Some(ConnectRecord {
            driver_class: request.driver_class.to_string(),
            url: request.url.to_string(),
            credentials: request.credentials().map(str::to_string),
            artifact_paths: request.artifact_paths.to_vec(),
        });

        let failures = &self.shared.pending_connect_failures;
        if failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DriverError::Other("connection refused".to_string()));
        }

        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.live.store(true, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ScriptedConnection {
    shared: Arc<Shared>,
}

impl DriverConnection for ScriptedConnection {
    fn cursor(&mut self) -> DriverResult<Box<dyn Cursor + '_>> {
        if let Some(message) = self.shared.script().cursor_error.clone() {
            return Err(DriverError::Database(message));
        }
        Ok(Box::new(ScriptedCursor {
            shared: &self.shared,
            executed: false,
            closed: false,
        }))
    }

    fn is_live(&self) -> bool {
        self.shared.probes.fetch_add(1, Ordering::SeqCst);
        self.shared.live.load(Ordering::SeqCst)
    }

    fn close(self: Box<Self>) -> DriverResult<()> {
        self.shared.connection_closes.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(DriverError::Other("close failed".to_string()));
        }
        Ok(())
    }
}

struct ScriptedCursor<'c> {
    shared: &'c Shared,
    executed: bool,
    closed: bool,
}

impl Cursor for ScriptedCursor<'_> {
    fn execute(&mut self, query: &str, params: Option<&[Value]>) -> DriverResult<()> {
        ensure_open(self.closed)?;
        let active = self.shared.active_executions.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_concurrent_executions.fetch_max(active, Ordering::SeqCst);

        let (delay, error) = {
            let mut script = self.shared.script();
            script.executed.push(ExecutedStatement {
                query: query.to_string(),
                params: params.map(<[Value]>::to_vec),
            });
            (script.execute_delay, script.execute_error.clone())
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        self.shared.active_executions.fetch_sub(1, Ordering::SeqCst);

        match error {
            Some(ExecuteFailure::Database(message)) => Err(DriverError::Database(message)),
            Some(ExecuteFailure::NoResultSet) => Err(DriverError::NoResultSet),
            None => {
                self.executed = true;
                Ok(())
            }
        }
    }

    fn fetch_all(&mut self) -> DriverResult<Vec<Row>> {
        ensure_open(self.closed)?;
        if !self.executed {
            return Err(DriverError::Database("no statement executed".to_string()));
        }
        match &self.shared.script().fetch {
            FetchOutcome::Rows(rows) => Ok(rows.clone()),
            FetchOutcome::NoResultSet => Err(DriverError::NoResultSet),
            FetchOutcome::Fail(message) => Err(DriverError::Database(message.clone())),
        }
    }

    fn description(&self) -> DriverResult<Vec<ColumnDescription>> {
        ensure_open(self.closed)?;
        let script = self.shared.script();
        match script.fetch {
            FetchOutcome::NoResultSet => Err(DriverError::NoResultSet),
            _ => Ok(script.columns.clone()),
        }
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.shared.cursor_closes.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_cursor_close.load(Ordering::SeqCst) {
            return Err(DriverError::Other("cursor close failed".to_string()));
        }
        Ok(())
    }
}

/// The `TestDB` profile used throughout the tests.
pub fn sample_profile() -> DatabaseProfile {
    DatabaseProfile {
        db_type: "TestDB".to_string(),
        driver_class: "test.Driver".to_string(),
        driver_paths: vec!["/path/to/test.jar".to_string()],
        url: "jdbc:test://localhost:1234/db".to_string(),
        user: "user".to_string(),
        password: "pass".to_string(),
    }
}

/// The `TestDB` profile as it appears in a configuration source.
pub fn sample_raw_profile() -> RawProfile {
    RawProfile {
        db_type: Some("TestDB".to_string()),
        driver_class: Some("test.Driver".to_string()),
        driver_path: Some(DriverPath::Single("/path/to/test.jar".to_string())),
        url: Some("jdbc:test://localhost:1234/db".to_string()),
        user: Some("user".to_string()),
        password: Some("pass".to_string()),
    }
}
