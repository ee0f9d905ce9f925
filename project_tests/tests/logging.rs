use std::fs;
use std::time::Duration;

use lib_rtdb::loggers::setup_logging;
use lib_rtdb::{RtdbServer, ServerOptions};
use project_tests::WireClient;
use serde_json::json;
use tempfile::tempdir;

/// Installs the global logger, so it is the only test in this binary.
#[tokio::test]
async fn session_lifecycle_is_written_to_the_log_file() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    fs::write(temp_dir.path().join("old_run.log"), "stale").unwrap();

    let log_path = setup_logging(temp_dir.path(), "rtdb_test", "debug").expect("logger installs");
    assert!(!temp_dir.path().join("old_run.log").exists());

    let server = RtdbServer::new(ServerOptions::default(), json!({}));
    let client = WireClient::connect_ready(&server).await;
    client.close().await;
    log::logger().flush();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let contents = fs::read_to_string(&log_path).expect("log file readable");
    assert!(contents.contains("Opened"), "log was: {contents}");
    assert!(contents.contains("[INFO]"));

    let log_files: Vec<_> = fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .collect();
    assert_eq!(log_files.len(), 1);
}
