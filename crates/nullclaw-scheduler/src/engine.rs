use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type OnFire = Arc<dyn Fn(Job) + Send + Sync>;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    schedule::compute_next_run,
    types::{Job, JobStatus, Schedule},
};

/// Shared handle for job management (list/add/remove) from other threads
/// while the engine's own blocking loop runs elsewhere.
pub struct SchedulerHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SchedulerHandle {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn add_job(&self, name: &str, schedule: Schedule, action: &str) -> Result<Job> {
        let conn = self.conn.lock().unwrap();
        insert_job(&conn, name, schedule, action)
    }

    pub fn remove_job(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        delete_job(&conn, id)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        select_jobs(&conn)
    }
}

fn insert_job(conn: &Connection, name: &str, schedule: Schedule, action: &str) -> Result<Job> {
    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let next = compute_next_run(&schedule, now).map(|dt| dt.to_rfc3339());
    let id = Uuid::new_v4().to_string();
    let schedule_json =
        serde_json::to_string(&schedule).map_err(|e| SchedulerError::InvalidSchedule(e.to_string()))?;

    conn.execute(
        "INSERT INTO jobs
         (id, name, schedule, action, status, last_run, next_run,
          run_count, max_runs, created_at, updated_at)
         VALUES (?1,?2,?3,?4,'pending',NULL,?5,0,NULL,?6,?6)",
        rusqlite::params![id, name, schedule_json, action, next, now_str],
    )?;
    info!(job_id = %id, %name, "job added");
    Ok(Job {
        id,
        name: name.to_string(),
        schedule,
        action: action.to_string(),
        status: JobStatus::Pending,
        last_run: None,
        next_run: next,
        run_count: 0,
        max_runs: None,
        created_at: now_str.clone(),
        updated_at: now_str,
    })
}

fn delete_job(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
    if n == 0 {
        return Err(SchedulerError::JobNotFound { id: id.to_string() });
    }
    info!(job_id = %id, "job removed");
    Ok(())
}

fn select_jobs(conn: &Connection) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, schedule, action, status, last_run, next_run,
                run_count, max_runs, created_at, updated_at
         FROM jobs ORDER BY created_at",
    )?;
    let jobs = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, u32>(7)?,
                row.get::<_, Option<u32>>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
            ))
        })?
        .filter_map(|r| {
            let (id, name, sched_json, action, status_str, last_run, next_run, run_count, max_runs, created_at, updated_at) =
                r.ok()?;
            let schedule: Schedule = serde_json::from_str(&sched_json).ok()?;
            let status: JobStatus = status_str.parse().ok()?;
            Some(Job {
                id,
                name,
                schedule,
                action,
                status,
                last_run,
                next_run,
                run_count,
                max_runs,
                created_at,
                updated_at,
            })
        })
        .collect();
    Ok(jobs)
}

/// Core scheduler: persists jobs to SQLite and drives execution on its own
/// blocking poll loop, at the configured `poll_secs` granularity.
pub struct SchedulerEngine {
    conn: Connection,
    poll_secs: u64,
    /// Called for every job whose `next_run` has arrived. Invoked on the
    /// engine's own thread — callers should hand off heavy work elsewhere.
    on_fire: Option<OnFire>,
}

impl SchedulerEngine {
    /// Create a new engine, initialising the DB schema if needed.
    pub fn new(conn: Connection, poll_secs: u64, on_fire: Option<OnFire>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn,
            poll_secs,
            on_fire,
        })
    }

    pub fn add_job(&self, name: &str, schedule: Schedule, action: &str) -> Result<Job> {
        insert_job(&self.conn, name, schedule, action)
    }

    pub fn remove_job(&self, id: &str) -> Result<()> {
        delete_job(&self.conn, id)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        select_jobs(&self.conn)
    }

    /// Blocking poll loop. Returns once `shutdown` is observed set, or
    /// propagates the first unrecoverable tick error to the caller (the
    /// supervisor restarts the whole engine on a returned `Err`).
    pub fn run(mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        info!("scheduler engine started");
        self.mark_missed_on_startup();

        while !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_secs(self.poll_secs));
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.tick()?;
        }
        info!("scheduler engine shutting down");
        Ok(())
    }

    fn mark_missed_on_startup(&mut self) {
        let now = Utc::now().to_rfc3339();
        match self.conn.execute(
            "UPDATE jobs SET status = 'missed', updated_at = ?1
             WHERE status = 'pending' AND next_run IS NOT NULL AND next_run < ?1",
            [&now],
        ) {
            Ok(n) if n > 0 => warn!(count = n, "jobs marked missed on startup"),
            Err(e) => error!(code = "state_io", "missed-on-startup query failed: {e}"),
            _ => {}
        }
    }

    fn tick(&mut self) -> Result<()> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let due: Vec<(String, String, String, String, u32, Option<u32>)> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT id, name, schedule, action, run_count, max_runs FROM jobs
                 WHERE status = 'pending' AND next_run IS NOT NULL AND next_run <= ?1",
            )?;
            stmt.query_map([&now_str], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, Option<u32>>(5)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect()
        };

        for (id, name, sched_json, action, run_count, max_runs) in due {
            let schedule: Schedule = match serde_json::from_str(&sched_json) {
                Ok(s) => s,
                Err(e) => {
                    error!(job_id = %id, code = "malformed", "bad schedule JSON: {e}");
                    continue;
                }
            };

            let new_count = run_count + 1;
            let next = if max_runs.is_some_and(|m| new_count >= m) {
                None
            } else {
                compute_next_run(&schedule, now).map(|dt| dt.to_rfc3339())
            };
            let new_status = if next.is_none() { "completed" } else { "pending" };

            info!(job_id = %id, %name, run = new_count, next_status = %new_status, "executing job");

            self.conn.execute(
                "UPDATE jobs SET status=?1, last_run=?2, next_run=?3,
                  run_count=?4, updated_at=?2
                 WHERE id=?5",
                rusqlite::params![new_status, now_str, next, new_count, id],
            )?;

            if let Some(ref on_fire) = self.on_fire {
                on_fire(Job {
                    id,
                    name,
                    schedule,
                    action,
                    status: JobStatus::Pending,
                    last_run: Some(now_str.clone()),
                    next_run: next,
                    run_count: new_count,
                    max_runs,
                    created_at: String::new(),
                    updated_at: now_str.clone(),
                });
            }
        }
        Ok(())
    }
}
