//! Roadwatch domain core.
//!
//! Pure logic with no database or HTTP dependencies: identifiers, the
//! shared error type, job and review state rules, retry backoff, typed
//! detection payloads and ffprobe parsing.

pub mod detection;
pub mod error;
pub mod events;
pub mod ffmpeg;
pub mod job;
pub mod retry;
pub mod review;
pub mod types;
