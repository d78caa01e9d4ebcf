use clap::{Parser, Subcommand};
use nullclaw_core::config::NullclawConfig;
use tracing::error;

mod error;
mod gateway;
mod orchestrator;
mod state;

use orchestrator::DaemonOrchestrator;

#[derive(Parser)]
#[command(name = "nullclaw", version, about = "Long-running agentic daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon: spawns every supervised component and blocks
    /// until a shutdown signal is observed.
    Daemon {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "nullclaw=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = NullclawConfig::load();

    match cli.command {
        Commands::Daemon { host, port } => {
            let gateway_host = host.unwrap_or_else(|| config.gateway_host.clone());
            let gateway_port = port.unwrap_or(config.gateway_port);
            let gateway_addr = format!("{gateway_host}:{gateway_port}");

            if let Err(e) = std::fs::create_dir_all(&config.workspace_dir) {
                let err = error::DaemonError::Startup(e.to_string());
                error!(code = err.code(), "{err}");
                std::process::exit(1);
            }

            let state_path = std::path::Path::new(&config.workspace_dir).join("daemon_state.json");
            let orchestrator = DaemonOrchestrator::start(config, state_path, gateway_addr);

            spawn_ctrl_c_watcher(orchestrator.shutdown_flag());
            orchestrator.run_until_shutdown();
        }
    }
}

/// A dedicated thread running a minimal Tokio runtime purely to await
/// `ctrl_c()`; flips the shared shutdown flag the orchestrator polls once
/// per second. Mirrors the gateway thread's isolated-runtime pattern.
fn spawn_ctrl_c_watcher(shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>) {
    std::thread::Builder::new()
        .name("ctrl-c-watcher".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("failed to build ctrl-c watcher runtime: {e}");
                    return;
                }
            };
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
                }
            });
        })
        .expect("failed to spawn ctrl-c watcher thread");
}
