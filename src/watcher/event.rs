//! Typed view over raw inotify records.
//!
//! The kernel packs `struct inotify_event` headers back to back, each
//! followed by `len` bytes of NUL-padded name. [`Events`] walks a batch
//! lazily and stops at the first record that does not fit in what is left,
//! so a truncated tail ends the batch instead of reading out of bounds.

use std::ffi::OsStr;
use std::fmt;
use std::ops::BitOr;
use std::os::unix::ffi::OsStrExt;

/// Size of the fixed record header: wd, mask, cookie, len.
pub const HEADER_LEN: usize = std::mem::size_of::<libc::inotify_event>();

/// Handle the kernel issued for one watched directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchDescriptor(pub i32);

impl fmt::Display for WatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(pub u32);

impl EventMask {
    pub const ACCESS: EventMask = EventMask(libc::IN_ACCESS);
    pub const MODIFY: EventMask = EventMask(libc::IN_MODIFY);
    pub const ATTRIB: EventMask = EventMask(libc::IN_ATTRIB);
    pub const CLOSE_WRITE: EventMask = EventMask(libc::IN_CLOSE_WRITE);
    pub const CLOSE_NOWRITE: EventMask = EventMask(libc::IN_CLOSE_NOWRITE);
    pub const OPEN: EventMask = EventMask(libc::IN_OPEN);
    pub const MOVED_FROM: EventMask = EventMask(libc::IN_MOVED_FROM);
    pub const MOVED_TO: EventMask = EventMask(libc::IN_MOVED_TO);
    pub const CREATE: EventMask = EventMask(libc::IN_CREATE);
    pub const DELETE: EventMask = EventMask(libc::IN_DELETE);
    pub const DELETE_SELF: EventMask = EventMask(libc::IN_DELETE_SELF);
    pub const MOVE_SELF: EventMask = EventMask(libc::IN_MOVE_SELF);
    pub const Q_OVERFLOW: EventMask = EventMask(libc::IN_Q_OVERFLOW);
    pub const IGNORED: EventMask = EventMask(libc::IN_IGNORED);
    pub const ISDIR: EventMask = EventMask(libc::IN_ISDIR);

    /// Event classes every watch subscribes to.
    pub const WATCHED: EventMask = EventMask(
        libc::IN_CREATE
            | libc::IN_DELETE
            | libc::IN_MODIFY
            | libc::IN_MOVED_FROM
            | libc::IN_MOVED_TO
            | libc::IN_ATTRIB
            | libc::IN_OPEN
            | libc::IN_CLOSE_WRITE,
    );

    pub fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn intersects(self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

/// One decoded record. `name` borrows from the batch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent<'a> {
    pub wd: WatchDescriptor,
    pub mask: EventMask,
    pub cookie: u32,
    pub name: Option<&'a OsStr>,
}

impl RawEvent<'_> {
    pub fn is_dir(&self) -> bool {
        self.mask.contains(EventMask::ISDIR)
    }
}

/// Lazy iterator over the records in one read batch.
#[derive(Debug, Clone)]
pub struct Events<'a> {
    buf: &'a [u8],
    offset: usize,
}

pub fn decode(buf: &[u8]) -> Events<'_> {
    Events { buf, offset: 0 }
}

impl<'a> Iterator for Events<'a> {
    type Item = RawEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.buf.get(self.offset..)?;
        if rest.len() < HEADER_LEN {
            return None;
        }

        let wd = i32::from_ne_bytes(rest[0..4].try_into().ok()?);
        let mask = u32::from_ne_bytes(rest[4..8].try_into().ok()?);
        let cookie = u32::from_ne_bytes(rest[8..12].try_into().ok()?);
        let len = u32::from_ne_bytes(rest[12..16].try_into().ok()?) as usize;

        let record_len = HEADER_LEN.checked_add(len)?;
        if rest.len() < record_len {
            // Truncated trailing record: treat as end of batch.
            self.offset = self.buf.len();
            return None;
        }

        let raw_name = &rest[HEADER_LEN..record_len];
        let end = raw_name.iter().position(|b| *b == 0).unwrap_or(raw_name.len());
        let name = (end > 0).then(|| OsStr::from_bytes(&raw_name[..end]));

        self.offset += record_len;

        Some(RawEvent {
            wd: WatchDescriptor(wd),
            mask: EventMask(mask),
            cookie,
            name,
        })
    }
}
