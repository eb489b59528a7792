/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Offset into a video stream, in seconds from the first frame.
pub type FrameSeconds = f64;

/// Clamp a raw model score into the closed unit interval.
///
/// NaN collapses to `0.0` so a misbehaving backend can never produce a
/// confidence that fails the `[0, 1]` check constraint on insert.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
