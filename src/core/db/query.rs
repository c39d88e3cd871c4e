/// Query Execution Module
///
/// This module drives a cursor through execute, fetch and close against the
/// connection held by a [`ConnectionManager`], in two output modes: raw rows
/// and a [`QueryTable`] with named columns.

use crate::core::db::connection::ConnectionManager;
use crate::core::db::driver::{Cursor, Row, Value};
use crate::core::{BridgeError, DriverError, DriverResult, Result};
use crate::results_grid::QueryTable;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of a query in either output mode
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Raw rows; `None` when the statement had no result set
    Rows(Option<Vec<Row>>),
    /// Named columns plus rows
    Table(QueryTable),
}

/// Closes the wrapped cursor exactly once, when dropped.
struct CursorGuard<'c> {
    cursor: Box<dyn Cursor + 'c>,
    db_type: &'c str,
}

impl<'c> CursorGuard<'c> {
    fn execute(&mut self, query: &str, params: Option<&[Value]>) -> DriverResult<()> {
        // An empty bind list means "no parameters"
        match params.filter(|p| !p.is_empty()) {
            Some(bound) => self.cursor.execute(query, Some(bound)),
            None => self.cursor.execute(query, None),
        }
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.cursor.close() {
            warn!(db_type = self.db_type, error = %e, "Error closing cursor");
        }
    }
}

/// Query execution service that operates on a managed connection
pub struct QueryExecutor<'a> {
    manager: &'a ConnectionManager,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new QueryExecutor for the given manager
    pub fn new(manager: &'a ConnectionManager) -> Self {
        QueryExecutor { manager }
    }

    /// Executes a statement and fetches all of its rows.
    ///
    /// # Arguments
    ///
    /// * `query` - The SQL statement to execute
    /// * `params` - Optional bind parameters, in placeholder order
    ///
    /// # Returns
    ///
    /// `Some(rows)` for statements with a result set, `None` for statements
    /// that have nothing to fetch (DDL, DML).
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Execution` if no connection is held or the
    /// driver fails. The connection itself is left in place.
    pub fn execute_query(&self, query: &str, params: Option<&[Value]>) -> Result<Option<Vec<Row>>> {
        let db_type = self.manager.db_type();
        let kind = StatementKind::from_sql(query);
        let mut slot = self.manager.lock_handle();
        let handle = slot.as_mut().ok_or_else(|| fail(db_type, kind, DriverError::Disconnected))?;

        let fetched = {
            let mut cursor = CursorGuard {
                cursor: handle.cursor().map_err(|e| fail(db_type, kind, e))?,
                db_type,
            };
            cursor.execute(query, params).map_err(|e| fail(db_type, kind, e))?;
            cursor.cursor.fetch_all()
        };

        // Only the fetch may report a missing result set
        match fetched {
            Ok(rows) => {
                info!(db_type, ?kind, rows = rows.len(), "Query executed successfully");
                Ok(Some(rows))
            }
            Err(DriverError::NoResultSet) => {
                info!(db_type, ?kind, "Query executed successfully, no data to fetch");
                Ok(None)
            }
            Err(e) => Err(fail(db_type, kind, e)),
        }
    }

    /// Executes a query that must produce a result set and returns it as a table.
    ///
    /// Column names are read from the cursor metadata before fetching.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Execution` on any execution, metadata or fetch
    /// failure, including a statement without a result set.
    pub fn execute_query_table(&self, query: &str, params: Option<&[Value]>) -> Result<QueryTable> {
        let db_type = self.manager.db_type();
        let kind = StatementKind::from_sql(query);
        let mut slot = self.manager.lock_handle();
        let handle = slot.as_mut().ok_or_else(|| fail(db_type, kind, DriverError::Disconnected))?;

        let outcome = {
            let mut cursor = CursorGuard {
                cursor: handle.cursor().map_err(|e| fail(db_type, kind, e))?,
                db_type,
            };
            cursor.execute(query, params).and_then(|()| {
                let columns: Vec<String> = cursor
                    .cursor
                    .description()?
                    .into_iter()
                    .map(|column| column.name)
                    .collect();
                let rows = cursor.cursor.fetch_all()?;
                Ok((columns, rows))
            })
        };

        let (columns, rows) = outcome.map_err(|e| fail(db_type, kind, e))?;
        let table = QueryTable::new(columns, rows);
        info!(db_type, ?kind, rows = table.row_count(), "Query executed successfully, table created");
        Ok(table)
    }
}

fn fail(db_type: &str, kind: StatementKind, source: DriverError) -> BridgeError {
    error!(db_type, ?kind, error = %source, "Query execution error");
    BridgeError::execution(db_type, source)
}

/// Handle for a query running on a background thread.
///
/// Waiting can time out, but the driver call itself is not cancelled: it
/// keeps the connection until the driver returns.
#[derive(Debug)]
pub struct QueryHandle {
    db_type: String,
    result_receiver: mpsc::Receiver<Result<Option<Vec<Row>>>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl QueryHandle {
    /// Receives the query result with a timeout
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Result<Option<Vec<Row>>>, mpsc::RecvTimeoutError> {
        self.result_receiver.recv_timeout(timeout)
    }

    /// Attempts to receive the query result without blocking
    pub fn try_recv(&self) -> std::result::Result<Result<Option<Vec<Row>>>, mpsc::TryRecvError> {
        self.result_receiver.try_recv()
    }

    /// Blocks until the query finishes.
    pub fn wait(mut self) -> Result<Option<Vec<Row>>> {
        let result = self.result_receiver.recv();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        result.unwrap_or_else(|_| {
            Err(BridgeError::execution(
                &self.db_type,
                DriverError::Other("query worker exited without a result".to_string()),
            ))
        })
    }
}

/// Runs [`QueryExecutor::execute_query`] on a worker thread.
pub fn spawn_query(manager: Arc<ConnectionManager>, query: String, params: Option<Vec<Value>>) -> QueryHandle {
    let db_type = manager.db_type().to_string();
    let (sender, result_receiver) = mpsc::channel();
    let worker = thread::spawn(move || {
        let result = manager.execute_query(&query, params.as_deref());
        // The caller may have stopped waiting
        let _ = sender.send(result);
    });
    QueryHandle {
        db_type,
        result_receiver,
        worker: Some(worker),
    }
}

/// Represents different SQL statement types, used for log context
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    /// BEGIN/COMMIT/ROLLBACK
    Transaction,
    Other,
}

impl StatementKind {
    /// Determines the statement type from its leading keyword
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_end_matches(';')
            .to_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" => StatementKind::Select,
            "INSERT" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "CREATE" => StatementKind::Create,
            "DROP" => StatementKind::Drop,
            "ALTER" => StatementKind::Alter,
            "BEGIN" | "COMMIT" | "ROLLBACK" => StatementKind::Transaction,
            _ => StatementKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_profile, FetchOutcome, ScriptedDriver};

    fn manager_with(driver: &ScriptedDriver) -> ConnectionManager {
        ConnectionManager::new(sample_profile(), Arc::new(driver.clone())).unwrap()
    }

    fn sample_rows() -> Vec<Row> {
        vec![
            vec![Value::Integer(1), Value::from("data1")],
            vec![Value::Integer(2), Value::from("data2")],
        ]
    }

    #[test]
    fn test_execute_query_returns_rows() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        let rows = QueryExecutor::new(&manager).execute_query("SELECT * FROM table", None).unwrap();
        assert_eq!(rows, Some(sample_rows()));

        let executed = driver.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].query, "SELECT * FROM table");
        assert_eq!(executed[0].params, None);
        assert_eq!(driver.cursor_close_count(), 1);
    }

    #[test]
    fn test_parameters_are_bound() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);
        let params = [Value::Integer(7217584739)];

        manager.execute_query("SELECT * FROM doc WHERE id = ?", Some(&params[..])).unwrap();
        manager.execute_query("SELECT 1", Some(&[][..])).unwrap();

        let executed = driver.executed();
        assert_eq!(executed[0].params, Some(params.to_vec()));
        assert_eq!(executed[1].params, None);
    }

    #[test]
    fn test_no_result_set_is_not_an_error() {
        let driver = ScriptedDriver::new().with_fetch(FetchOutcome::NoResultSet);
        let manager = manager_with(&driver);

        let result = manager.execute_query("CREATE TABLE t (id INTEGER)", None).unwrap();
        assert_eq!(result, None);
        assert_eq!(driver.cursor_close_count(), 1);
    }

    #[test]
    fn test_fetch_failure_is_wrapped() {
        let driver = ScriptedDriver::new().with_fetch(FetchOutcome::Fail("fetch exploded".into()));
        let manager = manager_with(&driver);

        match manager.execute_query("SELECT * FROM table", None) {
            Err(BridgeError::Execution { db_type, source }) => {
                assert_eq!(db_type, "TestDB");
                assert!(source.to_string().contains("fetch exploded"));
            }
            other => panic!("Expected Execution error, got {:?}", other),
        }
        assert_eq!(driver.cursor_close_count(), 1);
        // Query errors do not drop the connection
        assert!(manager.is_connected());
    }

    #[test]
    fn test_execute_failure_closes_cursor_once() {
        let driver = ScriptedDriver::new().fail_execute("syntax error");
        let manager = manager_with(&driver);

        assert!(manager.execute_query("SELEC", None).is_err());
        assert!(manager.execute_query_table("SELEC", None).is_err());
        assert_eq!(driver.cursor_close_count(), 2);
    }

    #[test]
    fn test_no_result_set_from_execute_is_an_error() {
        let driver = ScriptedDriver::new().fail_execute_without_result_set();
        let manager = manager_with(&driver);

        match manager.execute_query("SELECT * FROM table", None) {
            Err(BridgeError::Execution { source: DriverError::NoResultSet, .. }) => {}
            other => panic!("Expected Execution error, got {:?}", other),
        }
        assert_eq!(driver.cursor_close_count(), 1);
    }

    #[test]
    fn test_cursor_acquisition_failure_is_wrapped() {
        let driver = ScriptedDriver::new().fail_cursor("too many cursors");
        let manager = manager_with(&driver);

        match manager.execute_query("SELECT * FROM table", None) {
            Err(BridgeError::Execution { db_type, source }) => {
                assert_eq!(db_type, "TestDB");
                assert!(source.to_string().contains("too many cursors"));
            }
            other => panic!("Expected Execution error, got {:?}", other),
        }
        assert!(matches!(
            manager.execute_query_table("SELECT * FROM table", None),
            Err(BridgeError::Execution { .. })
        ));
        assert!(driver.executed().is_empty());
        assert_eq!(driver.cursor_close_count(), 0);
        assert!(manager.is_connected());
    }

    #[test]
    fn test_cursor_close_failure_does_not_mask_result() {
        let driver = ScriptedDriver::new().fail_cursor_close(true);
        let manager = manager_with(&driver);

        let rows = manager.execute_query("SELECT * FROM table", None).unwrap();
        assert_eq!(rows.map(|r| r.len()), Some(2));
        assert_eq!(driver.cursor_close_count(), 1);
    }

    #[test]
    fn test_execute_without_connection_fails() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);
        manager.close();

        match manager.execute_query("SELECT 1", None) {
            Err(BridgeError::Execution { source: DriverError::Disconnected, .. }) => {}
            other => panic!("Expected Disconnected execution error, got {:?}", other),
        }
        assert_eq!(driver.cursor_close_count(), 0);
    }

    #[test]
    fn test_execute_query_table_shape() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        let table = manager.execute_query_table("SELECT * FROM table", None).unwrap();
        assert_eq!(table.columns(), ["col1", "col2"]);
        assert_eq!(table.rows()[0], vec![Value::Integer(1), Value::from("data1")]);
        assert_eq!(table.rows()[1], vec![Value::Integer(2), Value::from("data2")]);
        assert_eq!(table.get(0, "col1"), Some(&Value::Integer(1)));
        assert_eq!(table.get(1, "col2"), Some(&Value::from("data2")));
        assert_eq!(driver.cursor_close_count(), 1);
    }

    #[test]
    fn test_execute_query_table_requires_result_set() {
        let driver = ScriptedDriver::new().with_fetch(FetchOutcome::NoResultSet);
        let manager = manager_with(&driver);

        assert!(matches!(
            manager.execute_query_table("DELETE FROM t", None),
            Err(BridgeError::Execution { .. })
        ));
        assert_eq!(driver.cursor_close_count(), 1);
    }

    #[test]
    fn test_spawned_query_times_out_then_completes() {
        let driver = ScriptedDriver::new().with_execute_delay(Duration::from_millis(200));
        let manager = Arc::new(manager_with(&driver));

        let handle = spawn_query(Arc::clone(&manager), "SELECT * FROM table".to_string(), None);
        assert!(matches!(
            handle.recv_timeout(Duration::from_millis(10)),
            Err(mpsc::RecvTimeoutError::Timeout)
        ));
        assert_eq!(handle.wait().unwrap(), Some(sample_rows()));
    }

    #[test]
    fn test_statement_kind_classification() {
        assert_eq!(StatementKind::from_sql("SELECT * FROM users"), StatementKind::Select);
        assert_eq!(StatementKind::from_sql("  select 1"), StatementKind::Select);
        assert_eq!(StatementKind::from_sql("WITH x AS (SELECT 1) SELECT * FROM x"), StatementKind::Select);
        assert_eq!(StatementKind::from_sql("INSERT INTO users VALUES (1)"), StatementKind::Insert);
        assert_eq!(StatementKind::from_sql("UPDATE users SET name = 'new'"), StatementKind::Update);
        assert_eq!(StatementKind::from_sql("DELETE FROM users"), StatementKind::Delete);
        assert_eq!(StatementKind::from_sql("CREATE TABLE t (id INTEGER)"), StatementKind::Create);
        assert_eq!(StatementKind::from_sql("DROP TABLE t"), StatementKind::Drop);
        assert_eq!(StatementKind::from_sql("COMMIT;"), StatementKind::Transaction);
        assert_eq!(StatementKind::from_sql("PRAGMA foreign_keys = ON"), StatementKind::Other);
        assert_eq!(StatementKind::from_sql(""), StatementKind::Other);
    }
}
