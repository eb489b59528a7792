//! The detection capability contract.
//!
//! The neural model is a black box behind [`Detector`]: given a frame it
//! returns boxes with class, confidence and, when tracking is available,
//! a track id that stays stable across the frames of one session.
//! Plate reading is a separate, optional capability.

use std::collections::BTreeMap;

use async_trait::async_trait;
use roadwatch_core::detection::BoundingBox;
use serde::Deserialize;

use crate::error::EngineError;
use crate::source::Frame;

/// One box returned by the capability.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub class_id: i32,
    pub confidence: f64,
    #[serde(default)]
    pub track_id: Option<i64>,
    /// Attribute scores keyed by name (e.g. `no_helmet`).
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

/// Parameters forwarded with every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectRequest {
    /// Tracker session; track ids are only stable within one session.
    pub session: String,
    pub classes: Vec<i32>,
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
}

/// A plate string read from a vehicle crop.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRead {
    pub text: String,
    pub confidence: f64,
}

#[async_trait]
pub trait Detector: Send + Sync {
    /// Readiness check run before every analysis.
    async fn ready(&self) -> Result<(), EngineError>;

    async fn detect(
        &self,
        frame: &Frame,
        request: &DetectRequest,
    ) -> Result<Vec<RawDetection>, EngineError>;
}

#[async_trait]
pub trait PlateReader: Send + Sync {
    /// Read the plate on `vehicle`, or `None` when nothing legible is found.
    async fn read_plate(
        &self,
        frame: &Frame,
        vehicle: &RawDetection,
    ) -> Result<Option<PlateRead>, EngineError>;
}
