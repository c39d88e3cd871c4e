/// Error Module
///
/// This module defines the error taxonomy for dbbridge. Configuration,
/// connection and execution failures are kept apart so callers can tell a
/// broken profile from a dropped connection from a bad statement.
use thiserror::Error;

/// Boxed error used for configuration source failures (I/O, TOML, JSON).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a driver implementation.
///
/// `NoResultSet` is the distinguished "nothing to fetch" condition: the
/// statement ran but produced no result set (DDL, DML). Executors treat it as
/// a normal outcome rather than a failure.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The executed statement has no result set to fetch
    #[error("no result set to fetch")]
    NoResultSet,

    /// The database reported an error
    #[error("database error: {0}")]
    Database(String),

    /// No live connection is held
    #[error("not connected")]
    Disconnected,

    /// The handle or cursor was already closed
    #[error("handle already closed")]
    Closed,

    /// Errors from the built-in SQLite driver
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Anything else a driver needs to report
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Returns true for the "no result set" condition.
    pub fn is_no_result_set(&self) -> bool {
        matches!(self, DriverError::NoResultSet)
    }
}

/// Type alias for driver-level results.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Error type for the dbbridge client.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The configuration store could not be read or parsed
    #[error("Config source error: {locator}: {source}")]
    ConfigSource {
        locator: String,
        #[source]
        source: BoxError,
    },

    /// A named profile or one of its required fields is missing
    #[error("Configuration error: {0}")]
    Config(String),

    /// The driver connect call failed
    #[error("Connection error [{db_type}]: {source}")]
    Connection {
        db_type: String,
        #[source]
        source: DriverError,
    },

    /// A query failed for a reason other than "no result set"
    #[error("Execution error [{db_type}]: {source}")]
    Execution {
        db_type: String,
        #[source]
        source: DriverError,
    },

    /// Result rendering errors (unsupported export formats)
    #[error("Export error: {0}")]
    Export(String),
}

impl BridgeError {
    pub(crate) fn config_source(locator: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BridgeError::ConfigSource {
            locator: locator.into(),
            source: source.into(),
        }
    }

    pub(crate) fn connection(db_type: &str, source: DriverError) -> Self {
        BridgeError::Connection {
            db_type: db_type.to_string(),
            source,
        }
    }

    pub(crate) fn execution(db_type: &str, source: DriverError) -> Self {
        BridgeError::Execution {
            db_type: db_type.to_string(),
            source,
        }
    }
}

/// Type alias for Result to use BridgeError as the error type.
pub type Result<T> = std::result::Result<T, BridgeError>;
