//! Job scheduler with SQLite persistence, driven by a supervised blocking
//! poll loop rather than cooperative tasks.
//!
//! Jobs are persisted to a SQLite `jobs` table. [`engine::SchedulerEngine`]
//! polls the database on its own thread and executes any job whose
//! `next_run` has arrived, updating state and computing the next scheduled
//! time. [`supervisor::run_supervised`] restarts the engine with exponential
//! backoff if its loop ever returns unexpectedly.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                          |
//! |------------|----------------------------------------------------|
//! | `Once`     | Single fire at an absolute UTC instant             |
//! | `Interval` | Repeat every N seconds                             |
//! | `Daily`    | Fire at HH:MM UTC every day                        |
//! | `Weekly`   | Fire at HH:MM UTC on a specific weekday            |
//! | `Cron`     | Cron expression (parsing planned for a future phase) |

pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod supervisor;
pub mod types;

pub use engine::{OnFire, SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use supervisor::run_supervised;
pub use types::{Job, JobStatus, Schedule};
