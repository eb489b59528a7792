pub mod detections;
pub mod jobs;
pub mod videos;
