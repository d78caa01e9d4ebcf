//! Restarts the scheduler engine with exponential backoff whenever its
//! blocking poll loop returns unexpectedly.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nullclaw_core::backoff::compute_backoff_ms;
use nullclaw_core::scrubber::sanitize_api_error;
use rusqlite::Connection;
use tracing::{error, info};

use crate::engine::{OnFire, SchedulerEngine};

const BASE_MS: u64 = 1_000;
const CAP_MS: u64 = 60_000;

/// Opens (or creates) the job database, loads persisted jobs — a missing
/// file simply starts with an empty job set, not an error — and runs the
/// engine's blocking loop, restarting it with doubling backoff on every
/// unexpected return until `shutdown` is observed.
pub fn run_supervised(db_path: &Path, poll_secs: u64, on_fire: Option<OnFire>, shutdown: Arc<AtomicBool>) {
    let mut restarts: u32 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        let conn = match Connection::open(db_path) {
            Ok(c) => c,
            Err(e) => {
                error!(code = "state_io", error = %sanitize_api_error(&e.to_string()), "failed to open scheduler database");
                sleep_backoff(&mut restarts);
                continue;
            }
        };

        let engine = match SchedulerEngine::new(conn, poll_secs, on_fire.clone()) {
            Ok(e) => e,
            Err(e) => {
                error!(code = e.code(), error = %sanitize_api_error(&e.to_string()), "failed to initialize scheduler engine");
                sleep_backoff(&mut restarts);
                continue;
            }
        };

        info!("scheduler supervisor starting engine");
        match engine.run(shutdown.clone()) {
            Ok(()) => {
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                info!("scheduler engine returned cleanly without shutdown request, restarting");
                restarts = 0;
            }
            Err(e) => {
                error!(code = e.code(), error = %sanitize_api_error(&e.to_string()), "scheduler engine exited with error");
                sleep_backoff(&mut restarts);
            }
        }
    }
}

fn sleep_backoff(restarts: &mut u32) {
    let backoff_ms = compute_backoff_ms(BASE_MS, *restarts, CAP_MS);
    *restarts += 1;
    std::thread::sleep(Duration::from_millis(backoff_ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn backoff_doubles_and_caps_across_restarts() {
        let mut restarts = 0;
        let seq: Vec<u64> = (0..9)
            .map(|_| {
                let ms = compute_backoff_ms(BASE_MS, restarts, CAP_MS);
                restarts += 1;
                ms
            })
            .collect();
        assert_eq!(seq, vec![1000, 2000, 4000, 8000, 16000, 32000, 60000, 60000, 60000]);
    }

    #[test]
    fn missing_database_file_starts_with_empty_job_set() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("does-not-exist-yet.db");
        let conn = Connection::open(&db_path).unwrap();
        let engine = SchedulerEngine::new(conn, 1, None).unwrap();
        assert!(engine.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn shutdown_flag_stops_supervisor_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sched.db");
        let shutdown = Arc::new(AtomicBool::new(true));
        let fire_count = Arc::new(AtomicU32::new(0));
        run_supervised(&db_path, 1, None, shutdown);
        assert_eq!(fire_count.load(Ordering::SeqCst), 0);
    }
}
