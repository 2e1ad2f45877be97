use flate2::read::GzDecoder;
use fmon_core::error::FmonError;
use fmon_core::eventlog::rotation::RotationPolicy;
use fmon_core::eventlog::{EventLog, compressed_path, existing_generations, generation_path};
use regex::Regex;
use std::fs;
use std::io::Read;
use tempfile::TempDir;

#[test]
fn lines_are_timestamped() -> Result<(), FmonError> {
    let dir = TempDir::new()?;
    let path = dir.path().join("fmon.log");
    let log = EventLog::open(&path, RotationPolicy::disabled())?;

    log.append("Created: /data/a.txt (5 bytes)")?;
    log.warn("Cannot open directory: /data/locked");
    log.error("Read from inotify failed");

    let contents = fs::read_to_string(&path)?;
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 3);

    let stamp = Regex::new(r"^\[\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\] ").unwrap();
    assert!(lines.iter().all(|line| stamp.is_match(line)));
    assert!(lines[0].ends_with("] Created: /data/a.txt (5 bytes)"));
    assert!(lines[1].ends_with("] [WARN] Cannot open directory: /data/locked"));
    assert!(lines[2].ends_with("] [ERROR] Read from inotify failed"));

    assert_eq!(log.rotation_state().current_size_bytes, contents.len() as u64);
    Ok(())
}

#[test]
fn reopening_appends() -> Result<(), FmonError> {
    let dir = TempDir::new()?;
    let path = dir.path().join("fmon.log");

    EventLog::open(&path, RotationPolicy::disabled())?.append("first run")?;
    let log = EventLog::open(&path, RotationPolicy::disabled())?;
    log.append("second run")?;

    let contents = fs::read_to_string(&path)?;
    assert!(contents.contains("first run"));
    assert!(contents.contains("second run"));
    assert_eq!(log.rotation_state().current_size_bytes, contents.len() as u64);
    Ok(())
}

#[test]
fn rotation_keeps_bounded_generations() -> Result<(), FmonError> {
    let dir = TempDir::new()?;
    let path = dir.path().join("fmon.log");
    let policy = RotationPolicy {
        max_bytes: Some(100),
        max_generations: 3,
        compress: false,
    };
    let log = EventLog::open(&path, policy)?;

    for i in 0..60 {
        log.append(&format!("line {i:03}"))?;
    }
    log.close()?;

    assert!(log.rotation_state().generation_count > 3);
    assert!(generation_path(&path, 0).exists());
    assert!(generation_path(&path, 2).exists());
    assert!(!generation_path(&path, 3).exists());
    assert_eq!(existing_generations(&path, 3).len(), 3);

    let active = fs::read_to_string(&path)?;
    assert!(active.len() <= 100 + 64);
    assert!(active.contains("line 059") || active.contains("[INFO] Log file rotated"));

    let newest = fs::read_to_string(generation_path(&path, 0))?;
    let older = fs::read_to_string(generation_path(&path, 1))?;
    assert!(last_line_number(&newest) > last_line_number(&older));
    Ok(())
}

#[test]
fn rotated_generation_is_compressed() -> Result<(), FmonError> {
    let dir = TempDir::new()?;
    let path = dir.path().join("fmon.log");
    let policy = RotationPolicy {
        max_bytes: Some(100),
        max_generations: 2,
        compress: true,
    };
    let log = EventLog::open(&path, policy)?;

    for i in 0..10 {
        log.append(&format!("line {i:03}"))?;
    }
    log.close()?;

    let plain = generation_path(&path, 0);
    let gz = compressed_path(&plain);
    assert!(!plain.exists());
    assert!(gz.exists());
    assert!(!generation_path(&path, 2).exists());
    assert!(!compressed_path(&generation_path(&path, 2)).exists());

    let mut text = String::new();
    GzDecoder::new(fs::File::open(&gz)?).read_to_string(&mut text)?;
    assert!(text.contains("line "));
    Ok(())
}

#[test]
fn zero_generations_truncates_in_place() -> Result<(), FmonError> {
    let dir = TempDir::new()?;
    let path = dir.path().join("fmon.log");
    let policy = RotationPolicy {
        max_bytes: Some(100),
        max_generations: 0,
        compress: true,
    };
    let log = EventLog::open(&path, policy)?;

    for i in 0..20 {
        log.append(&format!("line {i:03}"))?;
    }
    log.close()?;

    assert!(!generation_path(&path, 0).exists());
    assert!(!compressed_path(&generation_path(&path, 0)).exists());
    assert!(fs::metadata(&path)?.len() <= 100 + 64);
    Ok(())
}

#[test]
fn failed_rename_keeps_writer_usable() -> Result<(), FmonError> {
    let dir = TempDir::new()?;
    let path = dir.path().join("fmon.log");
    let policy = RotationPolicy {
        max_bytes: Some(100),
        max_generations: 1,
        compress: false,
    };
    // A non-empty directory where generation 0 should go blocks both the
    // removal of the oldest generation and the rename of the active file.
    let blocker = generation_path(&path, 0);
    fs::create_dir(&blocker)?;
    fs::write(blocker.join("keep"), "x")?;

    let log = EventLog::open(&path, policy)?;
    for i in 0..10 {
        log.append(&format!("line {i:03}"))?;
    }
    log.close()?;

    let active = fs::read_to_string(&path)?;
    assert!(active.contains("[WARN] failed to rename"));
    assert!(active.contains("line 000"));
    assert!(active.contains("line 009"));
    assert!(blocker.is_dir());
    assert_eq!(log.rotation_state().generation_count, 0);
    Ok(())
}

fn last_line_number(text: &str) -> u32 {
    text.lines()
        .filter_map(|line| line.rsplit_once("line "))
        .filter_map(|(_, n)| n.trim().parse().ok())
        .next_back()
        .unwrap_or(0)
}
