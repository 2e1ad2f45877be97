use clap::{Parser, Subcommand};
use fmon_core::config::{Mode, MonitorConfig};
use fmon_core::control::send_command;
use fmon_core::watcher::service::MonitorService;
use fmon_core::{FmonError, FmonResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fmon", version, about = "Filesystem change monitor")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Watch a directory tree until stopped.
    Watch {
        root: PathBuf,
        /// TOML configuration file.
        #[arg(short, long, env = "FMON_CONFIG")]
        config: Option<PathBuf>,
        /// Capability preset: basic, advanced or enhanced.
        #[arg(short, long)]
        mode: Option<Mode>,
        /// Only watch the root directory itself.
        #[arg(long)]
        no_recursive: bool,
    },
    /// Ask a running monitor for its status.
    Status {
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },
    /// Ask a running monitor to stop.
    Stop {
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Cmd::Watch {
            root,
            config,
            mode,
            no_recursive,
        } => watch(root, config, mode, no_recursive).await,
        Cmd::Status { socket } => control("status", socket).await,
        Cmd::Stop { socket } => control("stop", socket).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("[ERROR] {e}");
            ExitCode::FAILURE
        }
    }
}

async fn watch(
    root: PathBuf,
    config_path: Option<PathBuf>,
    mode: Option<Mode>,
    no_recursive: bool,
) -> FmonResult<()> {
    let mut config = match config_path {
        Some(path) => MonitorConfig::load(&path)?,
        None => MonitorConfig::default(),
    };
    config.root = root;
    if let Some(mode) = mode {
        config.apply_mode(mode);
    }
    if no_recursive {
        config.recursive = false;
    }

    let service = MonitorService::create(config)?;
    service.run().await
}

async fn control(command: &str, socket: Option<PathBuf>) -> FmonResult<()> {
    let socket = socket.unwrap_or_else(fmon_core::config::default_socket_path);
    let response = send_command(&socket, command).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.success {
        Ok(())
    } else {
        Err(FmonError::Control(
            response
                .message
                .unwrap_or_else(|| "request failed".to_string()),
        ))
    }
}
