mod common;

use common::{count, read_log, test_config, wait_for_lines};
use fmon_core::config::MonitorConfig;
use fmon_core::control::send_command;
use fmon_core::error::FmonError;
use fmon_core::stats::read_snapshot;
use fmon_core::watcher::service::MonitorService;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(5);

fn overwrite_in_place(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.write_all(bytes)
}

fn append(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(bytes)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn monitor_full_lifecycle() -> Result<(), FmonError> {
    let root_dir = TempDir::new()?;
    let state_dir = TempDir::new()?;
    let mut config = test_config(root_dir.path(), state_dir.path());
    config.checksum_enabled = true;
    config.stats_interval_secs = 1;
    let log_path = config.log_path.clone();
    let stats_path = config.stats_path.clone();
    let socket = config.socket_path.clone();
    let root = fs::canonicalize(root_dir.path())?;

    println!("Starting monitor...");
    let service = MonitorService::create(config)?;
    let ctx = service.context();
    assert_eq!(ctx.registry.len(), 1);
    let handle = tokio::spawn(service.run());

    // Test 1: creation
    let note = root.join("note.txt");
    fs::write(&note, "hello")?;
    let closed = format!("Closed: {}", note.display());
    let modified = format!("Modified: {}", note.display());
    assert!(wait_for_lines(&log_path, &closed, 1, TIMEOUT));

    let log = read_log(&log_path);
    assert_eq!(count(&log, &format!("Created: {}", note.display())), 1);
    let baseline = count(&log, &modified);
    assert!(baseline >= 1);
    println!("✅ File creation test passed");

    // Test 2: real content change
    append(&note, b" world")?;
    assert!(wait_for_lines(&log_path, &closed, 2, TIMEOUT));
    assert_eq!(count(&read_log(&log_path), &modified), baseline + 1);
    println!("✅ File modification test passed");

    // Test 3: identical rewrite is suppressed by the checksum cache
    overwrite_in_place(&note, b"hello world")?;
    assert!(wait_for_lines(&log_path, &closed, 3, TIMEOUT));
    assert_eq!(count(&read_log(&log_path), &modified), baseline + 1);
    println!("✅ Unchanged content test passed");

    // Test 4: new directories are watched
    let sub = root.join("sub");
    fs::create_dir(&sub)?;
    assert!(wait_for_lines(
        &log_path,
        &format!("[WATCH] Added: {}", sub.display()),
        1,
        TIMEOUT
    ));
    let inner = sub.join("inner.txt");
    fs::write(&inner, "x")?;
    assert!(wait_for_lines(
        &log_path,
        &format!("Created: {}", inner.display()),
        1,
        TIMEOUT
    ));
    println!("✅ Subdirectory test passed");

    // Test 5: status over the control socket
    let reply = send_command(&socket, "status").await?;
    assert!(reply.success);
    let data = reply.data.expect("status data");
    assert!(data.running);
    assert_eq!(data.watch_count, 2);

    // Test 6: stop
    let reply = send_command(&socket, "stop").await?;
    assert!(reply.success);
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("monitor stops")
        .expect("monitor task");
    assert!(result.is_ok());

    let log = read_log(&log_path);
    assert!(log.contains("[START] Monitoring started"));
    assert!(log.contains("[STOP] File monitor terminated"));
    assert!(!socket.exists());
    assert!(ctx.registry.is_empty());

    let snapshot = read_snapshot(&stats_path)?;
    assert!(snapshot.total_events >= 6);
    println!("✅ Shutdown test passed");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn checksum_off_reports_every_modify_and_skips_own_log() -> Result<(), FmonError> {
    let root_dir = TempDir::new()?;
    let state_dir = TempDir::new()?;
    let root = fs::canonicalize(root_dir.path())?;
    let mut config = test_config(&root, state_dir.path());
    config.checksum_enabled = false;
    // The log lives inside the watched tree on purpose.
    config.log_path = root.join("fmon.log");
    let log_path = config.log_path.clone();
    let socket = config.socket_path.clone();

    let service = MonitorService::create(config)?;
    let handle = tokio::spawn(service.run());

    let file = root.join("same.txt");
    fs::write(&file, "abc")?;
    let closed = format!("Closed: {}", file.display());
    let modified = format!("Modified: {}", file.display());
    assert!(wait_for_lines(&log_path, &closed, 1, TIMEOUT));
    let baseline = count(&read_log(&log_path), &modified);

    overwrite_in_place(&file, b"abc")?;
    assert!(wait_for_lines(&log_path, &closed, 2, TIMEOUT));
    assert_eq!(count(&read_log(&log_path), &modified), baseline + 1);

    assert!(send_command(&socket, "stop").await?.success);
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("monitor stops")
        .expect("monitor task");
    assert!(result.is_ok());

    let own = format!("Modified: {}", log_path.display());
    assert!(!read_log(&log_path).contains(&own));
    Ok(())
}

#[test]
fn missing_root_is_rejected() {
    let result = MonitorService::create(MonitorConfig::new("/no/such/directory/for/fmon"));
    assert!(matches!(result, Err(FmonError::InvalidRoot(_))));
}

#[test]
fn file_root_is_rejected() -> Result<(), FmonError> {
    let dir = TempDir::new()?;
    let file = dir.path().join("plain.txt");
    fs::write(&file, "not a directory")?;

    let result = MonitorService::create(test_config(&file, dir.path()));
    assert!(matches!(result, Err(FmonError::InvalidRoot(_))));
    Ok(())
}
