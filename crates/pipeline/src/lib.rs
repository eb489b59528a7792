//! The two stateful halves of the pipeline that sit on top of the database:
//! turning engine output into durable detection rows, and turning reviewed
//! detections into violations.

pub mod error;
pub mod persist;
pub mod review;

pub use error::PipelineError;
pub use persist::{persist_analysis, PersistedAnalysis};
pub use review::{ReviewRequest, ReviewResult, ReviewService};
