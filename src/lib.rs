//! # fmon_core
//!
//! A Linux filesystem monitor that turns raw inotify notifications into a
//! filtered, deduplicated, durable event log with live statistics and a small
//! local control channel.
//!
//! ## Features
//!
//! - **Recursive watching**: every directory under the root gets its own watch,
//!   and directories created later are picked up as they appear
//! - **Growing watch registry**: the descriptor table doubles when full instead
//!   of hitting a fixed limit
//! - **Filtering**: ordered include/exclude/alert regex rules plus an extension
//!   allow-list
//! - **Change detection**: SHA-256 content hashes suppress modify events that
//!   did not change a file's bytes
//! - **Durable log**: each line is synced before the call returns; the file
//!   rotates by size and old generations are gzipped
//! - **Statistics**: a periodic JSON snapshot of counters, memory and CPU usage
//! - **Control channel**: `status` and `stop` over a Unix socket
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fmon_core::{MonitorConfig, watcher::service::MonitorService};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = MonitorConfig::new("/srv/data");
//! config.extensions = vec!["txt".into(), "md".into()];
//!
//! let service = MonitorService::create(config)?;
//! service.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[`watcher`]**: inotify wrapper, record decoder, registry, filters,
//!   the dispatcher loop and the service that runs it
//! - **[`checksum`]**: the content-hash change-detection cache
//! - **[`pattern`]**: ordered pattern rules
//! - **[`eventlog`]**: the append-only log and its rotation
//! - **[`stats`]**: counters, snapshots and the periodic aggregator
//! - **[`control`]**: the control socket server and client
//! - **[`context`]**: the state shared between execution contexts
//! - **[`config`]**: configuration and capability presets
//! - **[`error`]**: unified error handling
//!
//! ## Execution Contexts
//!
//! The dispatcher runs on its own thread and handles records strictly in
//! delivery order. The statistics aggregator and the control channel are
//! tokio tasks. All three share one [`context::MonitorContext`]; shutdown is
//! a flag plus a wake-up, acted on by each context in its own control flow.
//!
//! ## Control Channel
//!
//! ```rust,no_run
//! use fmon_core::control::send_command;
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reply = send_command(Path::new("/run/user/1000/fmon.sock"), "status").await?;
//! if let Some(data) = reply.data {
//!     println!("{} watches, {} events", data.watch_count, data.stats.total_events);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`FmonResult<T>`] wrapping [`FmonError`]. Only
//! startup failures and a broken notification stream end the process; a bad
//! record, an unreadable directory or a failed rotation step is logged and
//! processing continues.

pub mod checksum;
pub mod config;
pub mod context;
pub mod control;
pub mod error;
pub mod eventlog;
pub mod pattern;
pub mod stats;
pub mod watcher;

/// Re-exports the most commonly used types for convenience.
pub use config::{MonitorConfig, PatternAction, PatternSpec};
pub use error::{FmonError, FmonResult};
