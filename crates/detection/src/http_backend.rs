//! HTTP client for a remote inference service.
//!
//! Frames are JPEG-encoded and posted to the service, which runs the
//! detector/tracker and answers with JSON boxes. Tracker state lives on
//! the service side, keyed by the session string of each analysis.
//!
//! | Endpoint        | Method | Body                    | Response                          |
//! |-----------------|--------|-------------------------|-----------------------------------|
//! | `/health`       | GET    |                         | 2xx when weights are loaded       |
//! | `/detect`       | POST   | JPEG frame              | `{ "detections": [RawDetection] }` |
//! | `/plates/read`  | POST   | JPEG crop of a vehicle  | `{ "plate": str?, "confidence": f64? }` |

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use roadwatch_core::detection::BoundingBox;
use serde::Deserialize;

use crate::capability::{DetectRequest, Detector, PlateRead, PlateReader, RawDetection};
use crate::error::EngineError;
use crate::source::Frame;

/// Per-request timeout for inference calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
struct PlateResponse {
    plate: Option<String>,
    confidence: Option<f64>,
}

/// Shared HTTP plumbing for the detector and the plate reader.
#[derive(Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    /// * `base_url` - e.g. `http://inference:8080`, without a trailing slash.
    pub fn new(base_url: impl Into<String>) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post_jpeg<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
        jpeg: Vec<u8>,
    ) -> Result<T, EngineError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .query(query)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineError::InferenceBackend(format!(
                "{path} returned HTTP {}: {body}",
                status.as_u16()
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct HttpDetector {
    inner: InferenceClient,
}

impl HttpDetector {
    pub fn new(inner: InferenceClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn ready(&self) -> Result<(), EngineError> {
        let response = self
            .inner
            .client
            .get(format!("{}/health", self.inner.base_url))
            .send()
            .await
            .map_err(|e| EngineError::ModelNotReady(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::ModelNotReady(format!(
                "health check returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn detect(
        &self,
        frame: &Frame,
        request: &DetectRequest,
    ) -> Result<Vec<RawDetection>, EngineError> {
        let jpeg = encode_region(frame.clone(), None).await?;
        let classes = request
            .classes
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let query = [
            ("session", request.session.clone()),
            ("classes", classes),
            ("conf", request.confidence_threshold.to_string()),
            ("iou", request.iou_threshold.to_string()),
        ];

        let response: DetectResponse = self.inner.post_jpeg("/detect", &query, jpeg).await?;
        Ok(response.detections)
    }
}

// ---------------------------------------------------------------------------
// Plate reader
// ---------------------------------------------------------------------------

pub struct HttpPlateReader {
    inner: InferenceClient,
    confidence_scale: f64,
}

impl HttpPlateReader {
    /// * `confidence_scale` - fraction of the vehicle confidence reported
    ///   for a read that carries no confidence of its own.
    pub fn new(inner: InferenceClient, confidence_scale: f64) -> Self {
        Self {
            inner,
            confidence_scale,
        }
    }
}

impl PlateResponse {
    fn into_read(self, vehicle_confidence: f64, confidence_scale: f64) -> Option<PlateRead> {
        let confidence = self
            .confidence
            .unwrap_or(vehicle_confidence * confidence_scale);
        self.plate
            .filter(|p| !p.trim().is_empty())
            .map(|text| PlateRead { text, confidence })
    }
}

#[async_trait]
impl PlateReader for HttpPlateReader {
    async fn read_plate(
        &self,
        frame: &Frame,
        vehicle: &RawDetection,
    ) -> Result<Option<PlateRead>, EngineError> {
        if vehicle.bbox.is_degenerate() {
            return Ok(None);
        }
        let jpeg = encode_region(frame.clone(), Some(vehicle.bbox)).await?;
        let response: PlateResponse = self.inner.post_jpeg("/plates/read", &[], jpeg).await?;
        Ok(response.into_read(vehicle.confidence, self.confidence_scale))
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// JPEG-encode a frame, or the part of it under `region`, off the runtime.
async fn encode_region(frame: Frame, region: Option<BoundingBox>) -> Result<Vec<u8>, EngineError> {
    tokio::task::spawn_blocking(move || encode_region_blocking(&frame, region))
        .await
        .map_err(|e| EngineError::InferenceBackend(format!("frame encoder panicked: {e}")))?
}

fn encode_region_blocking(frame: &Frame, region: Option<BoundingBox>) -> Result<Vec<u8>, EngineError> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels.as_ref().clone())
        .ok_or_else(|| {
            EngineError::SourceUnreadable(format!(
                "frame {} has {} bytes, expected {}x{}x3",
                frame.index,
                frame.pixels.len(),
                frame.width,
                frame.height
            ))
        })?;

    let image = match region.and_then(|r| crop_rect(&r, frame.width, frame.height)) {
        Some((x, y, w, h)) => image::imageops::crop_imm(&image, x, y, w, h).to_image(),
        None => image,
    };

    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(&image)
        .map_err(|e| EngineError::InferenceBackend(format!("failed to encode frame: {e}")))?;
    Ok(buf.into_inner())
}

/// Clamp a box to the frame and convert it to `(x, y, width, height)`.
fn crop_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x1 = bbox.x1.max(0.0).floor() as u32;
    let y1 = bbox.y1.max(0.0).floor() as u32;
    let x2 = (bbox.x2.max(0.0).ceil() as u32).min(width);
    let y2 = (bbox.y2.max(0.0).ceil() as u32).min(height);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
}
