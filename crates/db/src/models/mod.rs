//! Row models and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the insert and query DTOs its repository takes.

pub mod detection;
pub mod event;
pub mod job;
pub mod status;
pub mod video;
pub mod violation;
