// Core infrastructure modules
pub mod core;

// Supporting modules
pub mod config;
pub mod logging;
pub mod results_grid;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::config::{ConfigSource, DatabaseProfile, FileConfigSource};
pub use crate::core::db::{
    open_client, ClientIdentity, ClientRegistry, ConnectionManager, ConnectionState, QueryExecutor, Row,
    SqliteDriver, Value,
};
pub use crate::core::{BridgeError, DriverError, Result};
pub use crate::results_grid::QueryTable;
