//! Filesystem watching: the inotify wrapper, the record decoder, the watch
//! registry, filtering, the dispatcher loop and the service that runs it.

pub mod dispatcher;
pub mod event;
pub mod filter;
pub mod inotify;
pub mod registry;
pub mod service;
