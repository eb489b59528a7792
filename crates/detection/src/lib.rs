//! Roadwatch detection engine.
//!
//! Turns a video stream into aggregated detections: unique vehicle counts
//! by track id, deduplicated license plates, violation candidates and
//! per-frame box sets. The neural model is reached through the
//! [`capability::Detector`] / [`capability::PlateReader`] traits; nothing
//! here persists data or knows about jobs.

pub mod capability;
pub mod config;
pub mod counting;
pub mod engine;
pub mod error;
pub mod ffmpeg_source;
pub mod http_backend;
pub mod plates;
pub mod rules;
pub mod source;

pub use config::EngineConfig;
pub use engine::{AnalysisResult, DetectionEngine};
pub use error::EngineError;
pub use source::VideoHandle;
