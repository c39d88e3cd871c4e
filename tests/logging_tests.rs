//! Log file output. Runs in its own test binary so `init_logging` is the
//! first subscriber installed in the process.

use dbbridge::logging::{init_logging, installed_log_file};
use std::fs;
use tempfile::TempDir;
use tracing::info;

#[test]
fn test_log_file_receives_events() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("app.log");

    assert!(init_logging(Some(&log_path)).unwrap());
    assert_eq!(installed_log_file(), Some(log_path.as_path()));

    info!(db_type = "TestDB", "Connection established successfully");

    let contents = fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("Connection established successfully"));
    assert!(contents.contains("db_type=\"TestDB\""));
    assert!(contents.starts_with('['));
}
