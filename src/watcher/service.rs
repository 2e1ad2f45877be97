use std::{fs, io, sync::Arc, thread};

use tokio::signal::unix::{SignalKind, signal};

use crate::{
    config::MonitorConfig,
    context::MonitorContext,
    control::ControlServer,
    error::{FmonError, FmonResult},
    stats::{StatsAggregator, StatsSnapshot},
    watcher::{dispatcher::Dispatcher, inotify::Inotify},
};

/// A configured monitor: watches installed, ready to run.
pub struct MonitorService {
    ctx: Arc<MonitorContext>,
    inotify: Arc<Inotify>,
    dispatcher: Dispatcher,
}

impl MonitorService {
    /// Validates the root, opens the event log, initialises inotify and
    /// installs the initial watches.
    ///
    /// # Errors
    /// Every error here is fatal: [`FmonError::InvalidRoot`] for a missing or
    /// non-directory root, I/O errors for an unwritable log or unavailable
    /// inotify, [`FmonError::Pattern`] for a bad rule, and the root's own
    /// install failure.
    pub fn create(mut config: MonitorConfig) -> FmonResult<Self> {
        let root = match fs::metadata(&config.root) {
            Ok(meta) if meta.is_dir() => fs::canonicalize(&config.root)?,
            _ => return Err(FmonError::InvalidRoot(config.root.clone())),
        };
        config.root = root.clone();

        let ctx = Arc::new(MonitorContext::new(config)?);
        ctx.log.append("[START] File monitor starting")?;

        let inotify = Arc::new(Inotify::init()?);
        ctx.shutdown.attach_waker(inotify.waker());
        let dispatcher = Dispatcher::new(ctx.clone(), inotify.clone())?;

        let recursive = ctx.config.recursive;
        let added = ctx
            .registry
            .install_tree(inotify.as_ref(), &ctx.log, &root, recursive)?;

        let caps = ctx.capabilities;
        ctx.log.append(&format!(
            "[START] Monitoring started: {} (recursive: {}, checksum: {}, compression: {}, dynamic growth: {}, watches: {})",
            root.display(),
            yes_no(recursive),
            yes_no(caps.checksum),
            yes_no(caps.compression),
            yes_no(caps.dynamic_growth),
            added
        ))?;
        if !ctx.config.extensions.is_empty() {
            ctx.log.append(&format!(
                "[INFO] Filter extensions: {}",
                ctx.config.extensions.join(", ")
            ))?;
        }
        if !ctx.config.patterns.is_empty() {
            ctx.log.append(&format!(
                "[INFO] Loaded {} pattern rules",
                ctx.config.patterns.len()
            ))?;
        }
        tracing::info!("monitoring {} with {} watches", root.display(), added);

        Ok(Self {
            ctx,
            inotify,
            dispatcher,
        })
    }

    pub fn context(&self) -> Arc<MonitorContext> {
        self.ctx.clone()
    }

    /// Runs the dispatcher thread, the statistics task, the control channel
    /// and signal handling until shutdown, then tears everything down in
    /// order: watches released, tasks stopped, final snapshot written, log
    /// closed.
    ///
    /// Returns the dispatcher's fatal read error, if that is what ended the run.
    pub async fn run(self) -> FmonResult<()> {
        let MonitorService {
            ctx,
            inotify,
            mut dispatcher,
        } = self;

        let thread_ctx = ctx.clone();
        let dispatcher_thread = thread::Builder::new()
            .name("fmon-dispatch".into())
            .spawn(move || {
                // Any exit of this thread, a panic included, stops the monitor.
                let _stop = thread_ctx.shutdown.trigger_on_drop();
                dispatcher.run(&inotify)
            })?;

        let stats_task = tokio::spawn(StatsAggregator::new(ctx.clone()).run());

        let control_task = match ControlServer::bind(ctx.clone()) {
            Ok(server) => Some(tokio::spawn(server.run())),
            Err(e) => {
                ctx.log.warn(&format!("Control channel unavailable: {e}"));
                None
            }
        };

        let signal_task = tokio::spawn(watch_signals(ctx.clone()));

        ctx.shutdown.cancelled().await;
        tracing::info!("shutting down");

        let dispatch_result = match tokio::task::spawn_blocking(move || dispatcher_thread.join())
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FmonError::Other("dispatcher thread panicked".to_string())),
            Err(e) => Err(FmonError::Other(format!("dispatcher join failed: {e}"))),
        };

        let _ = stats_task.await;
        if let Some(task) = control_task {
            let _ = task.await;
        }
        signal_task.abort();

        StatsAggregator::new(ctx.clone()).tick();
        ctx.log.record("[STOP] File monitor terminated");
        ctx.log.close()?;

        dispatch_result
    }
}

/// Turns process signals into shutdown requests. SIGUSR1 logs a statistics
/// summary.
async fn watch_signals(ctx: Arc<MonitorContext>) -> io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = interrupt.recv() => {
                ctx.log.record("[STOP] Received SIGINT");
                ctx.shutdown.trigger();
                break;
            }
            _ = terminate.recv() => {
                ctx.log.record("[STOP] Received SIGTERM");
                ctx.shutdown.trigger();
                break;
            }
            _ = usr1.recv() => {
                let snapshot = StatsSnapshot::collect(&ctx);
                tracing::info!("{}", snapshot.summary());
                ctx.log.record(&format!("[STATS] {}", snapshot.summary()));
            }
            _ = ctx.shutdown.cancelled() => break,
        }
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
