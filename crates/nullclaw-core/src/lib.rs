pub mod backoff;
pub mod config;
pub mod error;
pub mod scrubber;
pub mod state;
pub mod types;
pub mod usage;

pub use config::NullclawConfig;
pub use error::{NullclawError, Result};
pub use state::{PersistedLastChannel, StateManager};
