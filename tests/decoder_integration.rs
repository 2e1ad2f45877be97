mod common;

use common::record;
use fmon_core::watcher::event::{EventMask, HEADER_LEN, WatchDescriptor, decode};
use std::ffi::OsStr;

#[test]
fn decodes_back_to_back_records() {
    let mut batch = record(1, EventMask::CREATE, 0, Some("a.txt"));
    batch.extend(record(2, EventMask::MODIFY, 0, Some("a_much_longer_file_name.log")));
    batch.extend(record(1, EventMask::CREATE | EventMask::ISDIR, 0, Some("sub")));

    let events: Vec<_> = decode(&batch).collect();
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].wd, WatchDescriptor(1));
    assert!(events[0].mask.contains(EventMask::CREATE));
    assert_eq!(events[0].name, Some(OsStr::new("a.txt")));
    assert!(!events[0].is_dir());

    assert_eq!(events[1].wd, WatchDescriptor(2));
    assert_eq!(events[1].name, Some(OsStr::new("a_much_longer_file_name.log")));

    assert!(events[2].is_dir());
    assert_eq!(events[2].name, Some(OsStr::new("sub")));
}

#[test]
fn nameless_record_has_no_name() {
    let batch = record(-1, EventMask::Q_OVERFLOW, 0, None);
    let events: Vec<_> = decode(&batch).collect();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].wd, WatchDescriptor(-1));
    assert!(events[0].mask.contains(EventMask::Q_OVERFLOW));
    assert!(events[0].name.is_none());
}

#[test]
fn move_cookies_are_preserved() {
    let mut batch = record(3, EventMask::MOVED_FROM, 42, Some("old.txt"));
    batch.extend(record(3, EventMask::MOVED_TO, 42, Some("new.txt")));

    let cookies: Vec<u32> = decode(&batch).map(|e| e.cookie).collect();
    assert_eq!(cookies, vec![42, 42]);
}

#[test]
fn truncated_tail_ends_the_batch() {
    let mut batch = record(1, EventMask::CREATE, 0, Some("whole.txt"));
    let partial = record(1, EventMask::DELETE, 0, Some("cut_off.txt"));
    batch.extend_from_slice(&partial[..HEADER_LEN + 3]);

    let events: Vec<_> = decode(&batch).collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, Some(OsStr::new("whole.txt")));

    let header_only = &partial[..HEADER_LEN - 1];
    assert_eq!(decode(header_only).count(), 0);
    assert_eq!(decode(&[]).count(), 0);
}

#[test]
fn mask_helpers() {
    let mask = EventMask::CREATE | EventMask::ISDIR;
    assert!(mask.contains(EventMask::CREATE));
    assert!(mask.contains(EventMask::ISDIR));
    assert!(!mask.contains(EventMask::DELETE));
    assert!(mask.intersects(EventMask::CREATE | EventMask::DELETE));
    assert!(!mask.contains(EventMask(0)));
    assert!(EventMask::WATCHED.contains(EventMask::CLOSE_WRITE));
    assert!(!EventMask::WATCHED.contains(EventMask::ACCESS));
}
