/// Core Module for dbbridge
///
/// This module contains the connection lifecycle, query execution and
/// client registry, plus the shared error types they report with.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{BridgeError, DriverError, DriverResult, Result};
