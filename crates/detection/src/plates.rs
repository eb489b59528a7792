//! License-plate candidate deduplication.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use roadwatch_core::detection::BoundingBox;
use roadwatch_core::types::FrameSeconds;
use serde::Serialize;

static PLATE_NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_]+").expect("valid regex"));

/// Canonical form used as the dedup key: trimmed, inner whitespace removed,
/// uppercased.
pub fn normalize_plate(raw: &str) -> String {
    PLATE_NOISE_RE.replace_all(raw.trim(), "").to_uppercase()
}

/// One plate read attributed to a vehicle box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateCandidate {
    pub plate_number: String,
    pub confidence: f64,
    pub frame_timestamp: FrameSeconds,
    pub vehicle_type: String,
    pub bbox: BoundingBox,
    pub track_id: Option<i64>,
}

/// Best read per plate string, plus best plate per track.
#[derive(Debug, Default)]
pub struct PlateBook {
    by_plate: HashMap<String, PlateCandidate>,
    by_track: HashMap<i64, (String, f64)>,
}

impl PlateBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate. A lower or equal confidence read never replaces
    /// an earlier one for the same plate.
    pub fn offer(&mut self, mut candidate: PlateCandidate) {
        candidate.plate_number = normalize_plate(&candidate.plate_number);
        if candidate.plate_number.is_empty() {
            return;
        }

        if let Some(track) = candidate.track_id {
            let better = self
                .by_track
                .get(&track)
                .map_or(true, |(_, conf)| candidate.confidence > *conf);
            if better {
                self.by_track
                    .insert(track, (candidate.plate_number.clone(), candidate.confidence));
            }
        }

        let better = self
            .by_plate
            .get(&candidate.plate_number)
            .map_or(true, |existing| candidate.confidence > existing.confidence);
        if better {
            self.by_plate.insert(candidate.plate_number.clone(), candidate);
        }
    }

    /// Highest-confidence plate read on the given track.
    pub fn plate_for_track(&self, track_id: i64) -> Option<&str> {
        self.by_track.get(&track_id).map(|(plate, _)| plate.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_plate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_plate.is_empty()
    }

    /// Final result set ordered by timestamp, then plate.
    pub fn into_candidates(self) -> Vec<PlateCandidate> {
        let mut plates: Vec<_> = self.by_plate.into_values().collect();
        plates.sort_by(|a, b| {
            a.frame_timestamp
                .total_cmp(&b.frame_timestamp)
                .then_with(|| a.plate_number.cmp(&b.plate_number))
        });
        plates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(plate: &str, confidence: f64, ts: f64, track: Option<i64>) -> PlateCandidate {
        PlateCandidate {
            plate_number: plate.to_string(),
            confidence,
            frame_timestamp: ts,
            vehicle_type: "car".into(),
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 5.0),
            track_id: track,
        }
    }

    #[test]
    fn keeps_highest_confidence_read() {
        let mut book = PlateBook::new();
        book.offer(read("51A-123.45", 0.62, 0.5, Some(1)));
        book.offer(read("51A-123.45", 0.91, 1.0, Some(1)));
        book.offer(read("51A-123.45", 0.40, 1.5, Some(1)));

        let plates = book.into_candidates();
        assert_eq!(plates.len(), 1);
        assert_eq!(plates[0].plate_number, "51A-123.45");
        assert_eq!(plates[0].confidence, 0.91);
        assert_eq!(plates[0].frame_timestamp, 1.0);
    }

    #[test]
    fn normalization_merges_spacing_variants() {
        let mut book = PlateBook::new();
        book.offer(read("51a 123.45", 0.7, 0.5, None));
        book.offer(read("51A123.45", 0.8, 1.0, None));
        assert_eq!(book.len(), 1);
        assert_eq!(normalize_plate(" 30e_999 99 "), "30E99999");
    }

    #[test]
    fn blank_reads_are_dropped() {
        let mut book = PlateBook::new();
        book.offer(read("   ", 0.99, 0.5, Some(2)));
        assert!(book.is_empty());
        assert_eq!(book.plate_for_track(2), None);
    }

    #[test]
    fn track_keeps_its_best_plate() {
        let mut book = PlateBook::new();
        book.offer(read("29B-111.11", 0.75, 0.5, Some(4)));
        book.offer(read("29B-111.17", 0.88, 1.0, Some(4)));
        book.offer(read("29B-111.11", 0.80, 1.5, Some(4)));
        assert_eq!(book.plate_for_track(4), Some("29B-111.17"));
        assert_eq!(book.len(), 2);
    }
}
