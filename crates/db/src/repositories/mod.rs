//! Repository layer: zero-sized structs with associated async functions
//! taking `&PgPool` (or an open transaction) and returning `sqlx::Error`.

pub mod detection_repo;
pub mod event_repo;
pub mod job_repo;
pub mod video_repo;
pub mod violation_repo;

pub use detection_repo::DetectionRepo;
pub use event_repo::EventRepo;
pub use job_repo::JobRepo;
pub use video_repo::VideoRepo;
pub use violation_repo::ViolationRepo;
