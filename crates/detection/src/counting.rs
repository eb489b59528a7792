//! Track-id based vehicle counting.

use std::collections::{BTreeMap, HashSet};

/// Counts each tracked vehicle once, under the class it was first seen as.
///
/// Untracked detections are never counted: without a track id there is no
/// way to tell a new vehicle from the same one in the next sampled frame.
#[derive(Debug, Default)]
pub struct VehicleCounter {
    seen: HashSet<i64>,
    counts: BTreeMap<String, u32>,
}

impl VehicleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. Returns `true` if it was counted.
    pub fn observe(&mut self, track_id: Option<i64>, class_name: &str) -> bool {
        let Some(id) = track_id else {
            return false;
        };
        if !self.seen.insert(id) {
            return false;
        }
        *self.counts.entry(class_name.to_string()).or_insert(0) += 1;
        true
    }

    pub fn into_counts(self) -> BTreeMap<String, u32> {
        self.counts
    }
}
