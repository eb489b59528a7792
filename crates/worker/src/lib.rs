//! Roadwatch job orchestrator.
//!
//! Owns the processing-job lifecycle on top of the Job Store: enqueue and
//! cancel ([`orchestrator`]), claiming and running jobs under a hard
//! timeout with retry backoff ([`dispatcher`]), per-type job handlers
//! ([`handlers`]) and the periodic retry/cleanup sweeps ([`maintenance`]).

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod maintenance;
pub mod orchestrator;

pub use config::WorkerConfig;
pub use dispatcher::JobDispatcher;
pub use error::JobError;
pub use handlers::{HandlerOutcome, JobHandlers};
pub use orchestrator::Orchestrator;
