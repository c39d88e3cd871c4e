/// Database Module
///
/// This module provides the managed database client, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Driver Capability** (`driver.rs`): Traits every driver implements, plus the `Value`/`Row` model
/// - **SQLite Driver** (`sqlite.rs`): Built-in driver backed by rusqlite
/// - **Connection Management** (`connection.rs`): One live connection per client, liveness probing and reconnects
/// - **Query Execution** (`query.rs`): Execute/fetch/close cycles in raw-row and table form
/// - **Client Registry** (`registry.rs`): One manager per (config, profile) identity, process-wide
///
/// ## Error Handling
///
/// All operations report `BridgeError`; driver failures travel inside it as `DriverError`.
pub mod connection;
pub mod driver;
pub mod query;
pub mod registry;
pub mod sqlite;

pub use connection::*;
pub use driver::*;
pub use query::*;
pub use registry::*;
pub use sqlite::SqliteDriver;
