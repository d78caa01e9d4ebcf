//! Composes every supervised component, owns their threads, and serializes
//! shutdown in reverse spawn order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nullclaw_agent::Router;
use nullclaw_bus::Bus;
use nullclaw_channels::{ChannelRegistry, ChannelSupervisor, OutboundDispatcher};
use nullclaw_core::config::NullclawConfig;
use nullclaw_core::scrubber::sanitize_api_error;
use nullclaw_memory::MemoryStore;
use nullclaw_scheduler::run_supervised as run_scheduler_supervised;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::state::{DaemonState, STATUS_FLUSH_SECONDS};

/// Owns every long-lived thread the daemon spawns and the shared shutdown
/// flag every loop polls between blocking operations.
pub struct DaemonOrchestrator {
    shutdown: Arc<AtomicBool>,
    state: Arc<DaemonState>,
    memory: Arc<MemoryStore>,
    workspace_dir: std::path::PathBuf,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl DaemonOrchestrator {
    /// Builds the component set and spawns every thread in the order the
    /// daemon shuts them down in reverse: gateway, heartbeat, scheduler
    /// supervisor, outbound dispatcher, channel supervisor.
    pub fn start(config: NullclawConfig, state_path: std::path::PathBuf, gateway_addr: String) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let has_channels = false; // no inbound channel is wired up by default in this build
        let mut component_names: Vec<&str> = vec!["gateway", "heartbeat", "scheduler", "outbound_dispatcher"];
        if has_channels {
            component_names.push("channels");
        }
        let state = Arc::new(DaemonState::new(&state_path, &gateway_addr, &component_names));
        if let Err(e) = state.save() {
            warn!(error = %sanitize_api_error(&e.to_string()), "failed to write initial state file");
        }

        let workspace_dir = std::path::PathBuf::from(&config.workspace_dir);
        let memory = Arc::new(open_memory_store(&workspace_dir));
        match memory.should_hydrate(&workspace_dir) {
            Ok(true) => match memory.hydrate_snapshot(&workspace_dir) {
                Ok(n) => info!(entries = n, "hydrated memory store from snapshot"),
                Err(e) => warn!(error = %sanitize_api_error(&e.to_string()), "memory snapshot hydration failed"),
            },
            Ok(false) => {}
            Err(e) => warn!(error = %sanitize_api_error(&e.to_string()), "failed to check memory snapshot hydration"),
        }

        let router = Arc::new(Router::from_config(&config));

        let mut handles = Vec::new();

        handles.push(spawn_gateway(&state, router, gateway_addr, shutdown.clone()));
        handles.push(spawn_heartbeat(&state, shutdown.clone()));
        handles.push(spawn_scheduler(&config, &state, shutdown.clone()));
        handles.push(spawn_outbound_dispatcher(&state, shutdown.clone()));

        Self {
            shutdown,
            state,
            memory,
            workspace_dir,
            handles,
        }
    }

    /// Polls the shutdown flag once per second until requested, then closes
    /// resources and joins every thread in reverse spawn order.
    pub fn run_until_shutdown(mut self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_secs(1));
        }
        self.shutdown_and_join();
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn shutdown_and_join(&mut self) {
        info!("daemon shutdown requested, joining threads");
        self.shutdown.store(true, Ordering::SeqCst);
        match self.memory.export_snapshot(&self.workspace_dir) {
            Ok(n) => info!(entries = n, "exported memory snapshot"),
            Err(e) => warn!(error = %sanitize_api_error(&e.to_string()), "memory snapshot export failed"),
        }
        if let Err(e) = self.state.save_stopped() {
            warn!(error = %sanitize_api_error(&e.to_string()), "failed to write final state file");
        }
        while let Some((name, handle)) = self.handles.pop() {
            if handle.join().is_err() {
                warn!(component = name, "component thread panicked during shutdown");
            } else {
                info!(component = name, "component thread joined");
            }
        }
    }
}

/// Opens (creating if absent) `<workspace>/memory.db`. A connection failure
/// falls back to an in-memory store rather than blocking daemon startup on
/// the memory subsystem.
fn open_memory_store(workspace_dir: &std::path::Path) -> MemoryStore {
    let path = workspace_dir.join("memory.db");
    let conn = match Connection::open(&path) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %sanitize_api_error(&e.to_string()), "failed to open memory database, using in-memory store");
            Connection::open_in_memory().expect("in-memory sqlite connection")
        }
    };
    MemoryStore::new(conn).expect("memory schema initialization")
}

fn spawn_gateway(
    state: &Arc<DaemonState>,
    router: Arc<Router>,
    addr: String,
    shutdown: Arc<AtomicBool>,
) -> (String, JoinHandle<()>) {
    let state = state.clone();
    let handle = std::thread::Builder::new()
        .name("gateway".into())
        .spawn(move || {
            state.mark_running("gateway");
            crate::gateway::run(addr, router, shutdown);
        })
        .expect("failed to spawn gateway thread");
    ("gateway".to_string(), handle)
}

fn spawn_heartbeat(state: &Arc<DaemonState>, shutdown: Arc<AtomicBool>) -> (String, JoinHandle<()>) {
    let state = state.clone();
    let handle = std::thread::Builder::new()
        .name("heartbeat".into())
        .spawn(move || {
            state.mark_running("heartbeat");
            while !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_secs(STATUS_FLUSH_SECONDS));
                if let Err(e) = state.save() {
                    warn!(error = %sanitize_api_error(&e.to_string()), "heartbeat state flush failed");
                }
            }
        })
        .expect("failed to spawn heartbeat thread");
    ("heartbeat".to_string(), handle)
}

fn spawn_scheduler(config: &NullclawConfig, state: &Arc<DaemonState>, shutdown: Arc<AtomicBool>) -> (String, JoinHandle<()>) {
    let state = state.clone();
    let db_path = std::path::Path::new(&config.workspace_dir).join("scheduler.db");
    let poll_secs = config.scheduler_poll_secs;
    let handle = std::thread::Builder::new()
        .name("scheduler".into())
        .spawn(move || {
            state.mark_running("scheduler");
            run_scheduler_supervised(&db_path, poll_secs, None, shutdown);
        })
        .expect("failed to spawn scheduler thread");
    ("scheduler".to_string(), handle)
}

fn spawn_outbound_dispatcher(state: &Arc<DaemonState>, shutdown: Arc<AtomicBool>) -> (String, JoinHandle<()>) {
    let state = state.clone();
    let handle = std::thread::Builder::new()
        .name("outbound_dispatcher".into())
        .spawn(move || {
            state.mark_running("outbound_dispatcher");
            let registry = ChannelRegistry::new();
            let bus = Arc::new(Bus::new());
            let dispatcher = OutboundDispatcher::new(registry, bus.clone());
            // No channels are registered by default; the dispatcher idles
            // until shutdown closes the bus underneath it.
            std::thread::spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(200));
                }
                bus.close();
            });
            dispatcher.run();
        })
        .expect("failed to spawn outbound dispatcher thread");
    ("outbound_dispatcher".to_string(), handle)
}

/// Kept for symmetry with the channel supervisor section of the
/// composition order; wired up once an inbound channel is configured.
#[allow(dead_code)]
fn spawn_channel_supervisor() -> ChannelSupervisor {
    ChannelSupervisor::new()
}
