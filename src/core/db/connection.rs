/// Connection Management Module
///
/// This module owns the single live driver connection for a client and
/// handles liveness probing, reconnects and teardown.

use crate::config::{load_profile, ConfigSource, DatabaseProfile};
use crate::core::db::driver::{ConnectRequest, Driver, DriverConnection, Row, Value};
use crate::core::db::query::{QueryExecutor, QueryOutput};
use crate::core::{BridgeError, Result};
use crate::results_grid::QueryTable;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Observable connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A driver connection is held
    Live,
    /// No connection is held (lost, closed, or a connect attempt failed)
    Absent,
}

pub(crate) type HandleSlot = Option<Box<dyn DriverConnection>>;

/// Connection manager for one database profile.
///
/// Holds at most one driver connection. The slot is guarded by a mutex that
/// `connect`, `close` and every query cycle hold for their whole duration,
/// so the connection is never used by two threads at once.
pub struct ConnectionManager {
    profile: DatabaseProfile,
    driver: Arc<dyn Driver>,
    handle: Mutex<HandleSlot>,
}

impl ConnectionManager {
    /// Creates a manager and opens its first connection.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Connection` if the driver cannot connect; no
    /// manager is produced in that case.
    pub fn new(profile: DatabaseProfile, driver: Arc<dyn Driver>) -> Result<Self> {
        let manager = ConnectionManager {
            profile,
            driver,
            handle: Mutex::new(None),
        };
        manager.connect()?;
        Ok(manager)
    }

    /// Loads profile `name` from `source`, then connects.
    ///
    /// # Errors
    ///
    /// `ConfigSource`/`Config` errors from profile loading, `Connection`
    /// errors from the first connect. Config errors are raised before any
    /// connect attempt.
    pub fn from_config(source: &dyn ConfigSource, name: &str, driver: Arc<dyn Driver>) -> Result<Self> {
        let profile = load_profile(source, name)?;
        Self::new(profile, driver)
    }

    /// Ensures a live connection is held.
    ///
    /// A held connection is probed first and kept when the probe succeeds.
    /// A stale connection is closed (errors ignored) and replaced.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Connection` if the driver connect fails. The
    /// manager is then `Absent` and a later call may retry.
    pub fn connect(&self) -> Result<()> {
        let mut slot = self.lock_handle();
        self.ensure_connected(&mut slot)
    }

    fn ensure_connected(&self, slot: &mut HandleSlot) -> Result<()> {
        let db_type = self.db_type();

        if let Some(handle) = slot.as_ref() {
            if handle.is_live() {
                info!(db_type, "Existing connection is active");
                return Ok(());
            }
            warn!(db_type, "Connection lost, reconnecting");
            if let Some(stale) = slot.take() {
                if let Err(e) = stale.close() {
                    debug!(db_type, error = %e, "Ignoring error while discarding stale connection");
                }
            }
        }

        let request = ConnectRequest {
            driver_class: &self.profile.driver_class,
            url: &self.profile.url,
            user: &self.profile.user,
            password: &self.profile.password,
            artifact_paths: &self.profile.driver_paths,
        };

        match self.driver.connect(&request) {
            Ok(handle) => {
                *slot = Some(handle);
                info!(
                    db_type,
                    driver = self.driver.name(),
                    url = %self.profile.redacted_url(),
                    "Connection established successfully"
                );
                Ok(())
            }
            Err(e) => {
                error!(db_type, url = %self.profile.redacted_url(), error = %e, "Failed to connect");
                Err(BridgeError::connection(db_type, e))
            }
        }
    }

    /// Closes the held connection, if any.
    ///
    /// Close failures are logged and swallowed. The slot is always cleared,
    /// so calling this repeatedly is harmless.
    pub fn close(&self) {
        let mut slot = self.lock_handle();
        if let Some(handle) = slot.take() {
            match handle.close() {
                Ok(()) => info!(db_type = self.db_type(), "Connection closed"),
                Err(e) => error!(db_type = self.db_type(), error = %e, "Error closing connection"),
            }
        }
    }

    /// Current connection state, without probing.
    pub fn state(&self) -> ConnectionState {
        if self.lock_handle().is_some() {
            ConnectionState::Live
        } else {
            ConnectionState::Absent
        }
    }

    /// Checks whether a connection is held.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Live
    }

    /// The resolved profile
    pub fn profile(&self) -> &DatabaseProfile {
        &self.profile
    }

    /// Database kind label used in every log line
    pub fn db_type(&self) -> &str {
        &self.profile.db_type
    }

    /// Executes `query` and fetches all rows. See [`QueryExecutor::execute_query`].
    pub fn execute_query(&self, query: &str, params: Option<&[Value]>) -> Result<Option<Vec<Row>>> {
        QueryExecutor::new(self).execute_query(query, params)
    }

    /// Executes `query` and returns a table. See [`QueryExecutor::execute_query_table`].
    pub fn execute_query_table(&self, query: &str, params: Option<&[Value]>) -> Result<QueryTable> {
        QueryExecutor::new(self).execute_query_table(query, params)
    }

    /// Executes `query` in either output mode.
    pub fn execute(&self, query: &str, params: Option<&[Value]>, tabular: bool) -> Result<QueryOutput> {
        let executor = QueryExecutor::new(self);
        if tabular {
            executor.execute_query_table(query, params).map(QueryOutput::Table)
        } else {
            executor.execute_query(query, params).map(QueryOutput::Rows)
        }
    }

    /// Locks the handle slot, recovering from a poisoned lock.
    pub(crate) fn lock_handle(&self) -> MutexGuard<'_, HandleSlot> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("profile", &self.profile)
            .field("driver", &self.driver)
            // try_lock: formatting must not block behind a running query
            .field("connected", &self.handle.try_lock().ok().map(|slot| slot.is_some()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_profile, ScriptedDriver};

    fn manager_with(driver: &ScriptedDriver) -> ConnectionManager {
        ConnectionManager::new(sample_profile(), Arc::new(driver.clone())).unwrap()
    }

    #[test]
    fn test_construction_connects() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        assert!(manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Live);
        assert_eq!(driver.connect_count(), 1);

        let request = driver.last_connect().unwrap();
        assert_eq!(request.driver_class, "test.Driver");
        assert_eq!(request.url, "jdbc:test://localhost:1234/db");
        assert_eq!(request.credentials, ["user".to_string(), "pass".to_string()]);
        assert_eq!(request.artifact_paths, vec!["/path/to/test.jar"]);
    }

    #[test]
    fn test_connect_keeps_live_connection() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        manager.connect().unwrap();
        manager.connect().unwrap();

        assert_eq!(driver.connect_count(), 1);
        assert_eq!(driver.probe_count(), 2);
        assert_eq!(driver.connection_close_count(), 0);
    }

    #[test]
    fn test_reconnect_on_stale_connection() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        driver.sever();
        manager.connect().unwrap();

        assert!(manager.is_connected());
        assert_eq!(driver.connect_count(), 2);
        assert_eq!(driver.connection_close_count(), 1);
    }

    #[test]
    fn test_stale_close_failure_is_swallowed() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        driver.sever();
        driver.fail_close(true);
        manager.connect().unwrap();

        assert_eq!(driver.connect_count(), 2);
        assert_eq!(driver.connection_close_count(), 1);
    }

    #[test]
    fn test_failed_reconnect_leaves_manager_retryable() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        driver.sever();
        driver.fail_next_connects(1);
        match manager.connect() {
            Err(BridgeError::Connection { db_type, .. }) => assert_eq!(db_type, "TestDB"),
            other => panic!("Expected Connection error, got {:?}", other),
        }
        assert_eq!(manager.state(), ConnectionState::Absent);

        manager.connect().unwrap();
        assert_eq!(manager.state(), ConnectionState::Live);
    }

    #[test]
    fn test_construction_fails_when_driver_cannot_connect() {
        let driver = ScriptedDriver::new();
        driver.fail_next_connects(1);
        let result = ConnectionManager::new(sample_profile(), Arc::new(driver.clone()));
        assert!(matches!(result, Err(BridgeError::Connection { .. })));
    }

    #[test]
    fn test_close_is_idempotent() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        manager.close();
        assert_eq!(manager.state(), ConnectionState::Absent);
        manager.close();
        assert_eq!(manager.state(), ConnectionState::Absent);
        assert_eq!(driver.connection_close_count(), 1);

        // Absent is re-enterable
        manager.connect().unwrap();
        assert!(manager.is_connected());
        assert_eq!(driver.connect_count(), 2);
    }

    #[test]
    fn test_close_failure_still_clears_handle() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        driver.fail_close(true);
        manager.close();
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_execute_dispatches_output_mode() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);

        match manager.execute("SELECT * FROM table", None, true).unwrap() {
            QueryOutput::Table(table) => assert_eq!(table.columns(), ["col1", "col2"]),
            other => panic!("Expected table output, got {:?}", other),
        }
        match manager.execute("SELECT * FROM table", None, false).unwrap() {
            QueryOutput::Rows(Some(rows)) => assert_eq!(rows.len(), 2),
            other => panic!("Expected row output, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_hides_password() {
        let driver = ScriptedDriver::new();
        let manager = manager_with(&driver);
        let debug = format!("{:?}", manager);
        assert!(debug.contains("TestDB"));
        assert!(debug.contains("connected: Some(true)"));
        assert!(!debug.contains("\"pass\""));
    }
}
