//! Detection kinds and their typed payloads.
//!
//! Detections are persisted with a generic JSONB `detection_data` column.
//! [`DetectionPayload`] is the decoded form: one variant per
//! [`DetectionType`], so consumers never poke at untyped maps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Detection type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionType {
    LicensePlate,
    VehicleCount,
    Violation,
    Frame,
}

impl DetectionType {
    /// Stable text form stored in `detections.detection_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionType::LicensePlate => "LICENSE_PLATE",
            DetectionType::VehicleCount => "VEHICLE_COUNT",
            DetectionType::Violation => "VIOLATION",
            DetectionType::Frame => "FRAME",
        }
    }
}

impl fmt::Display for DetectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LICENSE_PLATE" => Ok(DetectionType::LicensePlate),
            "VEHICLE_COUNT" => Ok(DetectionType::VehicleCount),
            "VIOLATION" => Ok(DetectionType::Violation),
            "FRAME" => Ok(DetectionType::Frame),
            other => Err(CoreError::Validation(format!(
                "Unknown detection type '{other}'. \
                 Must be one of: LICENSE_PLATE, VEHICLE_COUNT, VIOLATION, FRAME"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// A box with zero area or non-finite corners cannot be cropped.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// `LICENSE_PLATE`: the best read of one plate string in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicensePlateData {
    pub plate_number: String,
    pub vehicle_type: String,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub track_id: Option<i64>,
}

/// `VEHICLE_COUNT`: unique tracked vehicles per class for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleCountData {
    pub counts: BTreeMap<String, u32>,
    pub total: u32,
}

/// `VIOLATION`: one rule hit on one vehicle in one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationData {
    pub violation_type: String,
    pub description: String,
    pub bbox: BoundingBox,
    pub vehicle_type: String,
    #[serde(default)]
    pub track_id: Option<i64>,
    #[serde(default)]
    pub license_plate: Option<String>,
}

/// One box inside a `FRAME` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameBox {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    pub class_id: i32,
    pub class_name: String,
    pub confidence: f64,
    #[serde(default)]
    pub track_id: Option<i64>,
    #[serde(default)]
    pub license_plate: Option<String>,
}

/// `FRAME`: the full box set of one sampled frame, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameData {
    pub bounding_boxes: Vec<FrameBox>,
}

/// Decoded `detection_data`, tagged by the row's `detection_type`.
///
/// Serializes as the bare inner payload so the stored JSON carries no
/// redundant tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectionPayload {
    LicensePlate(LicensePlateData),
    VehicleCount(VehicleCountData),
    Violation(ViolationData),
    Frame(FrameData),
}

impl DetectionPayload {
    pub fn kind(&self) -> DetectionType {
        match self {
            DetectionPayload::LicensePlate(_) => DetectionType::LicensePlate,
            DetectionPayload::VehicleCount(_) => DetectionType::VehicleCount,
            DetectionPayload::Violation(_) => DetectionType::Violation,
            DetectionPayload::Frame(_) => DetectionType::Frame,
        }
    }

    /// Decode a stored blob according to its detection type.
    pub fn decode(kind: DetectionType, data: &serde_json::Value) -> Result<Self, CoreError> {
        fn parse<T: for<'de> Deserialize<'de>>(
            kind: DetectionType,
            data: &serde_json::Value,
        ) -> Result<T, CoreError> {
            T::deserialize(data).map_err(|e| {
                CoreError::Validation(format!("Invalid {kind} detection data: {e}"))
            })
        }

        Ok(match kind {
            DetectionType::LicensePlate => DetectionPayload::LicensePlate(parse(kind, data)?),
            DetectionType::VehicleCount => DetectionPayload::VehicleCount(parse(kind, data)?),
            DetectionType::Violation => DetectionPayload::Violation(parse(kind, data)?),
            DetectionType::Frame => DetectionPayload::Frame(parse(kind, data)?),
        })
    }

    pub fn as_violation(&self) -> Option<&ViolationData> {
        match self {
            DetectionPayload::Violation(v) => Some(v),
            _ => None,
        }
    }
}
