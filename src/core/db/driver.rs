/// Driver Capability Module
///
/// The connection manager never talks to a database library directly. It goes
/// through the traits in this module, which describe the blocking capability
/// every driver must offer: connect, open a cursor, execute, fetch, describe,
/// probe liveness and close. Any call may fail with a [`DriverError`].

use crate::core::{DriverError, DriverResult};
use serde::Serialize;
use std::fmt;

/// A single value in a result row or a bind parameter list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// A result row, in column order.
pub type Row = Vec<Value>;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(t) => write!(f, "{}", t),
            Value::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    /// Declared type, when the driver reports one
    pub type_name: Option<String>,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnDescription {
            name: name.into(),
            type_name: None,
        }
    }
}

/// Everything a driver needs to open a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    pub driver_class: &'a str,
    pub url: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    pub artifact_paths: &'a [String],
}

impl<'a> ConnectRequest<'a> {
    /// Credentials in the `[user, password]` order drivers expect.
    pub fn credentials(&self) -> [&'a str; 2] {
        [self.user, self.password]
    }
}

/// A database driver: the factory for live connections.
pub trait Driver: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &str;

    /// Opens a new native connection.
    fn connect(&self, request: &ConnectRequest<'_>) -> DriverResult<Box<dyn DriverConnection>>;
}

/// A live native connection.
pub trait DriverConnection: Send {
    /// Opens a cursor borrowing this connection.
    fn cursor(&mut self) -> DriverResult<Box<dyn Cursor + '_>>;

    /// Cheap liveness probe. Any failure means the connection is lost.
    fn is_live(&self) -> bool;

    /// Closes the connection, consuming it.
    fn close(self: Box<Self>) -> DriverResult<()>;
}

/// A statement cursor.
pub trait Cursor {
    /// Executes a statement, binding `params` when given.
    fn execute(&mut self, query: &str, params: Option<&[Value]>) -> DriverResult<()>;

    /// Fetches every remaining row of the current result set.
    ///
    /// Returns [`DriverError::NoResultSet`] when the last statement did not
    /// produce a result set.
    fn fetch_all(&mut self) -> DriverResult<Vec<Row>>;

    /// Column metadata for the current result set.
    fn description(&self) -> DriverResult<Vec<ColumnDescription>>;

    /// Releases the cursor.
    fn close(&mut self) -> DriverResult<()>;
}

impl fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").field("name", &self.name()).finish()
    }
}

/// Helper for drivers that reject calls on a closed cursor.
pub(crate) fn ensure_open(closed: bool) -> DriverResult<()> {
    if closed {
        Err(DriverError::Closed)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Real(1.5).to_string(), "1.5");
        assert_eq!(Value::Text("data1".into()).to_string(), "data1");
        assert_eq!(Value::Blob(b"Hello".to_vec()).to_string(), "<BLOB: 5 bytes>");
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(1), Value::Integer(1));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(true)), Value::Bool(true));
    }

    #[test]
    fn test_value_serializes_untagged() {
        let row: Row = vec![Value::Integer(1), Value::Text("data1".into()), Value::Null];
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"[1,"data1",null]"#);
    }

    #[test]
    fn test_connect_request_credentials() {
        let paths = vec!["/path/to/test.jar".to_string()];
        let request = ConnectRequest {
            driver_class: "test.Driver",
            url: "jdbc:test://localhost:1234/db",
            user: "user",
            password: "pass",
            artifact_paths: &paths,
        };
        assert_eq!(request.credentials(), ["user", "pass"]);
    }
}
