/// SQLite Driver Module
///
/// Built-in [`Driver`] backed by rusqlite. Accepts `jdbc:sqlite:<path>` and
/// `sqlite:<path>` URLs (`:memory:` for an in-memory database).

use crate::core::db::driver::{
    ensure_open, ColumnDescription, ConnectRequest, Cursor, Driver, DriverConnection, Row, Value,
};
use crate::core::{DriverError, DriverResult};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Batch, Connection, Statement};
use tracing::debug;

const URL_PREFIXES: [&str; 2] = ["jdbc:sqlite:", "sqlite:"];

/// Driver for SQLite database files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        SqliteDriver
    }
}

/// Extracts the database path from a SQLite connection URL.
pub fn sqlite_path(url: &str) -> DriverResult<&str> {
    let path = URL_PREFIXES
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))
        .ok_or_else(|| DriverError::Other(format!("Unsupported SQLite URL: '{}'", url)))?;
    if path.is_empty() {
        return Err(DriverError::Other(format!("Missing database path in URL: '{}'", url)));
    }
    Ok(path)
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(&self, request: &ConnectRequest<'_>) -> DriverResult<Box<dyn DriverConnection>> {
        let path = sqlite_path(request.url)?;
        if !request.artifact_paths.is_empty() {
            debug!(artifacts = ?request.artifact_paths, "SQLite driver ignores driver artifacts");
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Box::new(SqliteConnection { conn }))
    }
}

/// Live SQLite connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Connection,
}

impl DriverConnection for SqliteConnection {
    fn cursor(&mut self) -> DriverResult<Box<dyn Cursor + '_>> {
        Ok(Box::new(SqliteCursor {
            conn: &self.conn,
            state: CursorState::Idle,
            closed: false,
        }))
    }

    fn is_live(&self) -> bool {
        self.conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
    }

    fn close(self: Box<Self>) -> DriverResult<()> {
        self.conn.close().map_err(|(_, e)| DriverError::Sqlite(e))
    }
}

#[derive(Debug)]
enum CursorState {
    /// Nothing executed yet
    Idle,
    /// The last statement had no result columns
    NoResultSet,
    /// Buffered result set
    Rows {
        columns: Vec<ColumnDescription>,
        rows: Vec<Row>,
    },
}

/// Cursor over a borrowed SQLite connection.
///
/// Statements run eagerly in `execute`; result rows are buffered so the
/// prepared statement never outlives the call.
struct SqliteCursor<'c> {
    conn: &'c Connection,
    state: CursorState,
    closed: bool,
}

impl Cursor for SqliteCursor<'_> {
    fn execute(&mut self, query: &str, params: Option<&[Value]>) -> DriverResult<()> {
        ensure_open(self.closed)?;
        let bound = params.unwrap_or(&[]);
        let mut stmt = prepare_single(self.conn, query)?;

        let column_count = stmt.column_count();
        if column_count == 0 {
            stmt.execute(params_from_iter(bound.iter()))?;
            self.state = CursorState::NoResultSet;
            return Ok(());
        }

        let columns: Vec<ColumnDescription> = stmt
            .column_names()
            .into_iter()
            .map(ColumnDescription::new)
            .collect();

        let mut rows = Vec::new();
        let mut result = stmt.query(params_from_iter(bound.iter()))?;
        while let Some(row) = result.next()? {
            let values = (0..column_count)
                .map(|i| row.get_ref(i).map(value_from_sql))
                .collect::<rusqlite::Result<Row>>()?;
            rows.push(values);
        }

        self.state = CursorState::Rows { columns, rows };
        Ok(())
    }

    fn fetch_all(&mut self) -> DriverResult<Vec<Row>> {
        ensure_open(self.closed)?;
        match &mut self.state {
            CursorState::Rows { rows, .. } => Ok(std::mem::take(rows)),
            CursorState::NoResultSet => Err(DriverError::NoResultSet),
            CursorState::Idle => Err(DriverError::Database("no statement executed".to_string())),
        }
    }

    fn description(&self) -> DriverResult<Vec<ColumnDescription>> {
        ensure_open(self.closed)?;
        match &self.state {
            CursorState::Rows { columns, .. } => Ok(columns.clone()),
            _ => Err(DriverError::NoResultSet),
        }
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.state = CursorState::Idle;
        Ok(())
    }
}

/// Prepares the only statement in `query`.
///
/// Trailing semicolons, whitespace and comments are accepted. Anything else
/// after the first statement is rejected before the first one runs.
fn prepare_single<'c>(conn: &'c Connection, query: &str) -> DriverResult<Statement<'c>> {
    let mut batch = Batch::new(conn, query);
    let stmt = batch
        .next()?
        .ok_or_else(|| DriverError::Database("no statement to execute".to_string()))?;
    match batch.next() {
        Ok(None) => Ok(stmt),
        _ => Err(DriverError::Database("multiple statements are not supported".to_string())),
    }
}

fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => match std::str::from_utf8(t) {
            Ok(text) => Value::Text(text.to_string()),
            Err(e) => {
                debug!(len = t.len(), error = %e, "TEXT value is not valid UTF-8, returning it as a blob");
                Value::Blob(t.to_vec())
            }
        },
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}
