//! The detection engine.
//!
//! [`DetectionEngine::analyze`] is a pure function of a video handle and
//! the engine configuration: it opens the stream, samples frames, runs the
//! capability on each sample and folds the results into counts, deduped
//! plates, violation candidates and per-frame box sets. It never touches
//! the database or the job queue.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use roadwatch_core::detection::{BoundingBox, FrameBox};
use roadwatch_core::types::{clamp_confidence, FrameSeconds};
use serde::Serialize;
use tokio::sync::watch;

use crate::capability::{DetectRequest, Detector, PlateReader, RawDetection};
use crate::config::EngineConfig;
use crate::counting::VehicleCounter;
use crate::error::EngineError;
use crate::plates::{PlateBook, PlateCandidate};
use crate::source::{Frame, SourceOpener, VideoHandle};

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A rule hit on one vehicle in one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationCandidate {
    pub frame_index: u64,
    pub frame_timestamp: FrameSeconds,
    pub violation_type: String,
    pub description: String,
    /// Rule confidence, independent of the box confidence.
    pub confidence: f64,
    pub vehicle_type: String,
    pub bbox: BoundingBox,
    pub track_id: Option<i64>,
    pub license_plate: Option<String>,
}

/// Full box set of one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    pub frame_index: u64,
    pub frame_timestamp: FrameSeconds,
    pub boxes: Vec<FrameBox>,
}

impl FrameRecord {
    /// Mean box confidence, or 0 for an empty frame.
    pub fn mean_confidence(&self) -> f64 {
        if self.boxes.is_empty() {
            return 0.0;
        }
        self.boxes.iter().map(|b| b.confidence).sum::<f64>() / self.boxes.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisStats {
    pub total_frames: i64,
    pub frames_read: u64,
    pub frames_analyzed: u64,
    pub fps: f64,
    pub processing_time_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub vehicle_counts: BTreeMap<String, u32>,
    pub license_plates: Vec<PlateCandidate>,
    pub violations: Vec<ViolationCandidate>,
    pub frame_detections: Vec<FrameRecord>,
    pub stats: AnalysisStats,
}

impl AnalysisResult {
    pub fn total_vehicles(&self) -> u32 {
        self.vehicle_counts.values().sum()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Detection engine bound to one capability handle.
///
/// Built once per worker process and shared across jobs; the capability is
/// loaded once and checked for readiness at the start of every analysis.
pub struct DetectionEngine {
    opener: Arc<dyn SourceOpener>,
    detector: Arc<dyn Detector>,
    plate_reader: Option<Arc<dyn PlateReader>>,
    config: EngineConfig,
}

impl DetectionEngine {
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        detector: Arc<dyn Detector>,
        plate_reader: Option<Arc<dyn PlateReader>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            opener,
            detector,
            plate_reader,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyze a video within `timeout`.
    pub async fn analyze(
        &self,
        handle: &VideoHandle,
        timeout: Duration,
    ) -> Result<AnalysisResult, EngineError> {
        self.analyze_with_progress(handle, timeout, None).await
    }

    /// Analyze a video within `timeout`, publishing 0-100 progress.
    ///
    /// The budget is only checked at suspension points: stream reads,
    /// capability calls and the periodic yield.
    pub async fn analyze_with_progress(
        &self,
        handle: &VideoHandle,
        timeout: Duration,
        progress: Option<watch::Sender<u8>>,
    ) -> Result<AnalysisResult, EngineError> {
        match tokio::time::timeout(timeout, self.run(handle, progress.as_ref())).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    video_id = handle.video_id,
                    timeout_secs = timeout.as_secs(),
                    "Detection analysis timed out",
                );
                Err(EngineError::Timeout(timeout))
            }
        }
    }

    async fn run(
        &self,
        handle: &VideoHandle,
        progress: Option<&watch::Sender<u8>>,
    ) -> Result<AnalysisResult, EngineError> {
        let started = Instant::now();

        self.detector.ready().await?;
        let mut source = self.opener.open(handle).await?;
        let meta = source.meta().clone();
        if !(meta.fps > 0.0) {
            return Err(EngineError::SourceUnreadable(format!(
                "stream for video {} reports no frame rate",
                handle.video_id
            )));
        }

        let stride = self.config.sampling_stride(meta.fps);
        let yield_every = self.config.yield_every_frames.max(1);
        let request = DetectRequest {
            session: format!("video-{}-{}", handle.video_id, uuid::Uuid::new_v4()),
            classes: self.config.classes.ids(),
            confidence_threshold: self.config.confidence_threshold,
            iou_threshold: self.config.iou_threshold,
        };

        let mut state = RunState::default();
        let mut frames_read: u64 = 0;

        loop {
            let position = frames_read + 1;
            if position % stride == 0 {
                let Some(frame) = source.read_frame().await? else {
                    break;
                };
                let timestamp = position as f64 / meta.fps;
                self.analyze_frame(&frame, position, timestamp, &request, &mut state)
                    .await?;
            } else if !source.skip_frame().await? {
                break;
            }
            frames_read = position;

            if frames_read % yield_every == 0 {
                if let (Some(tx), true) = (progress, meta.total_frames > 0) {
                    let pct = (frames_read as f64 / meta.total_frames as f64 * 100.0).min(99.0);
                    tx.send_replace(pct as u8);
                }
                tokio::task::yield_now().await;
            }
        }

        if let Some(tx) = progress {
            tx.send_replace(100);
        }

        let result = state.finish(AnalysisStats {
            total_frames: meta.total_frames,
            frames_read,
            frames_analyzed: 0,
            fps: meta.fps,
            processing_time_secs: started.elapsed().as_secs_f64(),
        });

        tracing::info!(
            video_id = handle.video_id,
            total_frames = result.stats.total_frames,
            frames_analyzed = result.stats.frames_analyzed,
            fps = result.stats.fps,
            vehicles = result.total_vehicles(),
            plates = result.license_plates.len(),
            violations = result.violations.len(),
            processing_time_secs = result.stats.processing_time_secs,
            "Detection analysis finished",
        );

        Ok(result)
    }

    async fn analyze_frame(
        &self,
        frame: &Frame,
        frame_index: u64,
        timestamp: FrameSeconds,
        request: &DetectRequest,
        state: &mut RunState,
    ) -> Result<(), EngineError> {
        let detections = self.detector.detect(frame, request).await?;
        state.frames_analyzed += 1;

        let mut boxes = Vec::with_capacity(detections.len());
        for det in &detections {
            let Some(class) = self.config.classes.get(det.class_id) else {
                continue;
            };
            if det.confidence < self.config.confidence_threshold {
                continue;
            }

            if class.vehicle {
                state.counter.observe(det.track_id, &class.name);

                if let Some(hit) = self.config.rules.evaluate(&class.name, det) {
                    state.violations.push(ViolationCandidate {
                        frame_index,
                        frame_timestamp: timestamp,
                        violation_type: hit.violation_type,
                        description: hit.description,
                        confidence: hit.confidence,
                        vehicle_type: class.name.clone(),
                        bbox: det.bbox,
                        track_id: det.track_id,
                        license_plate: None,
                    });
                }

                if det.confidence >= self.config.plate_confidence_floor {
                    self.read_plate(frame, det, &class.name, timestamp, state).await;
                }
            }

            boxes.push(FrameBox {
                bbox: det.bbox,
                class_id: det.class_id,
                class_name: class.name.clone(),
                confidence: clamp_confidence(det.confidence),
                track_id: det.track_id,
                license_plate: None,
            });
        }

        if !boxes.is_empty() {
            state.frames.push(FrameRecord {
                frame_index,
                frame_timestamp: timestamp,
                boxes,
            });
        }
        Ok(())
    }

    /// Plate reads are best effort: a failed read is logged and skipped.
    async fn read_plate(
        &self,
        frame: &Frame,
        det: &RawDetection,
        vehicle_type: &str,
        timestamp: FrameSeconds,
        state: &mut RunState,
    ) {
        let Some(reader) = &self.plate_reader else {
            return;
        };
        match reader.read_plate(frame, det).await {
            Ok(Some(read)) => state.plates.offer(PlateCandidate {
                plate_number: read.text,
                confidence: clamp_confidence(read.confidence),
                frame_timestamp: timestamp,
                vehicle_type: vehicle_type.to_string(),
                bbox: det.bbox,
                track_id: det.track_id,
            }),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(frame_index = frame.index, error = %e, "Plate read failed");
            }
        }
    }
}

/// Accumulators for one analysis run.
#[derive(Default)]
struct RunState {
    counter: VehicleCounter,
    plates: PlateBook,
    violations: Vec<ViolationCandidate>,
    frames: Vec<FrameRecord>,
    frames_analyzed: u64,
}

impl RunState {
    /// Attach each track's best plate to its boxes and violation candidates.
    fn finish(mut self, mut stats: AnalysisStats) -> AnalysisResult {
        for frame in &mut self.frames {
            for b in &mut frame.boxes {
                if let Some(track) = b.track_id {
                    b.license_plate = self.plates.plate_for_track(track).map(String::from);
                }
            }
        }
        for v in &mut self.violations {
            if let Some(track) = v.track_id {
                v.license_plate = self.plates.plate_for_track(track).map(String::from);
            }
        }

        stats.frames_analyzed = self.frames_analyzed;
        AnalysisResult {
            vehicle_counts: self.counter.into_counts(),
            license_plates: self.plates.into_candidates(),
            violations: self.violations,
            frame_detections: self.frames,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::capability::PlateRead;
    use crate::source::{FrameSource, StreamMeta};

    // -- Scripted in-memory capability ---------------------------------------

    struct ScriptedSource {
        meta: StreamMeta,
        next: u64,
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        fn meta(&self) -> &StreamMeta {
            &self.meta
        }

        async fn read_frame(&mut self) -> Result<Option<Frame>, EngineError> {
            if self.next > self.meta.total_frames as u64 {
                return Ok(None);
            }
            let frame = Frame {
                index: self.next,
                width: 4,
                height: 4,
                pixels: Arc::new(vec![0; 48]),
            };
            self.next += 1;
            Ok(Some(frame))
        }
    }

    struct ScriptedOpener {
        fps: f64,
        total_frames: i64,
        fail: bool,
    }

    #[async_trait]
    impl SourceOpener for ScriptedOpener {
        async fn open(&self, handle: &VideoHandle) -> Result<Box<dyn FrameSource>, EngineError> {
            if self.fail {
                return Err(EngineError::SourceUnreadable(handle.stream_url.clone()));
            }
            Ok(Box::new(ScriptedSource {
                meta: StreamMeta {
                    fps: self.fps,
                    total_frames: self.total_frames,
                    width: 4,
                    height: 4,
                },
                next: 1,
            }))
        }
    }

    /// Returns the scripted boxes for a native frame index.
    #[derive(Default)]
    struct ScriptedDetector {
        frames: HashMap<u64, Vec<RawDetection>>,
        calls: AtomicUsize,
        not_ready: bool,
        stall: bool,
    }

    #[async_trait]
    impl Detector for ScriptedDetector {
        async fn ready(&self) -> Result<(), EngineError> {
            if self.not_ready {
                return Err(EngineError::ModelNotReady("weights missing".into()));
            }
            Ok(())
        }

        async fn detect(
            &self,
            frame: &Frame,
            _request: &DetectRequest,
        ) -> Result<Vec<RawDetection>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
        }
    }

    struct FixedPlates(HashMap<i64, PlateRead>);

    #[async_trait]
    impl PlateReader for FixedPlates {
        async fn read_plate(
            &self,
            _frame: &Frame,
            vehicle: &RawDetection,
        ) -> Result<Option<PlateRead>, EngineError> {
            Ok(vehicle.track_id.and_then(|t| self.0.get(&t).cloned()))
        }
    }

    fn det(class_id: i32, confidence: f64, track: Option<i64>, attrs: &[(&str, f64)]) -> RawDetection {
        RawDetection {
            bbox: BoundingBox::new(10.0, 10.0, 60.0, 90.0),
            class_id,
            confidence,
            track_id: track,
            attributes: attrs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn engine(detector: ScriptedDetector, plates: Option<FixedPlates>) -> DetectionEngine {
        engine_with(detector, plates, 30.0, 300)
    }

    fn engine_with(
        detector: ScriptedDetector,
        plates: Option<FixedPlates>,
        fps: f64,
        total_frames: i64,
    ) -> DetectionEngine {
        DetectionEngine::new(
            Arc::new(ScriptedOpener {
                fps,
                total_frames,
                fail: false,
            }),
            Arc::new(detector),
            plates.map(|p| Arc::new(p) as Arc<dyn PlateReader>),
            EngineConfig::default(),
        )
    }

    fn handle() -> VideoHandle {
        VideoHandle {
            video_id: 42,
            stream_url: "https://cdn.example/v/42.mp4".into(),
        }
    }

    /// Native index of the n-th sampled frame (1-based) at 30 fps / 2 Hz.
    fn sampled(n: u64) -> u64 {
        n * 15
    }

    // -- Tests ----------------------------------------------------------------

    #[tokio::test]
    async fn samples_two_frames_per_second() {
        let detector = ScriptedDetector::default();
        let engine = engine(detector, None);

        let result = engine.analyze(&handle(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(result.stats.frames_read, 300);
        assert_eq!(result.stats.frames_analyzed, 20);
        assert_eq!(result.stats.total_frames, 300);
        assert_eq!(result.stats.fps, 30.0);
        assert!(result.frame_detections.is_empty());
    }

    #[tokio::test]
    async fn tracked_car_counts_once_across_frames() {
        let mut detector = ScriptedDetector::default();
        for n in [1, 2, 3, 5, 8, 9, 10, 12, 14, 15, 17, 20] {
            detector
                .frames
                .insert(sampled(n), vec![det(2, 0.9, Some(7), &[])]);
        }
        let engine = engine(detector, None);

        let result = engine.analyze(&handle(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(result.vehicle_counts.get("car"), Some(&1));
        assert_eq!(result.total_vehicles(), 1);
        assert_eq!(result.frame_detections.len(), 12);
    }

    #[tokio::test]
    async fn people_and_untracked_vehicles_are_not_counted() {
        let mut detector = ScriptedDetector::default();
        detector.frames.insert(
            sampled(1),
            vec![det(0, 0.95, Some(1), &[]), det(5, 0.8, None, &[])],
        );
        let engine = engine(detector, None);

        let result = engine.analyze(&handle(), Duration::from_secs(5)).await.unwrap();

        assert!(result.vehicle_counts.is_empty());
        assert_eq!(result.frame_detections[0].boxes.len(), 2);
    }

    #[tokio::test]
    async fn low_confidence_and_foreign_classes_are_dropped() {
        let mut detector = ScriptedDetector::default();
        detector.frames.insert(
            sampled(2),
            vec![det(2, 0.2, Some(1), &[]), det(16, 0.99, Some(2), &[])],
        );
        let engine = engine(detector, None);

        let result = engine.analyze(&handle(), Duration::from_secs(5)).await.unwrap();

        assert!(result.frame_detections.is_empty());
        assert!(result.vehicle_counts.is_empty());
    }

    #[tokio::test]
    async fn violation_candidates_are_emitted_per_frame() {
        let mut detector = ScriptedDetector::default();
        for n in [5, 14] {
            detector.frames.insert(
                sampled(n),
                vec![det(3, 0.85, Some(1), &[("no_helmet", 0.8)])],
            );
        }
        let engine = engine(detector, None);

        let result = engine.analyze(&handle(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(result.violations.len(), 2);
        assert_eq!(result.violations[0].frame_timestamp, 2.5);
        assert_eq!(result.violations[1].frame_timestamp, 7.0);
        assert!(result.violations.iter().all(|v| v.confidence == 0.8));
        assert!(result.violations.iter().all(|v| v.vehicle_type == "motorcycle"));
        assert_eq!(result.vehicle_counts.get("motorcycle"), Some(&1));
    }

    #[tokio::test]
    async fn plates_are_deduped_and_attached_to_tracks() {
        let mut detector = ScriptedDetector::default();
        detector.frames.insert(
            sampled(1),
            vec![det(3, 0.9, Some(1), &[("no_helmet", 0.7)])],
        );
        detector
            .frames
            .insert(sampled(2), vec![det(3, 0.9, Some(1), &[])]);
        // Below the plate floor: no read attempted, box still recorded.
        detector
            .frames
            .insert(sampled(3), vec![det(2, 0.6, Some(9), &[])]);

        let plates = FixedPlates(HashMap::from([
            (
                1,
                PlateRead {
                    text: "59x1 234.56".into(),
                    confidence: 0.88,
                },
            ),
            (
                9,
                PlateRead {
                    text: "30A-000.01".into(),
                    confidence: 0.99,
                },
            ),
        ]));
        let engine = engine(detector, Some(plates));

        let result = engine.analyze(&handle(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(result.license_plates.len(), 1);
        assert_eq!(result.license_plates[0].plate_number, "59X1234.56");
        assert_eq!(result.license_plates[0].frame_timestamp, 0.5);
        assert_eq!(
            result.violations[0].license_plate.as_deref(),
            Some("59X1234.56")
        );
        let boxes: Vec<_> = result
            .frame_detections
            .iter()
            .flat_map(|f| f.boxes.iter())
            .collect();
        assert_eq!(boxes[0].license_plate.as_deref(), Some("59X1234.56"));
        assert_eq!(boxes[2].license_plate, None);
    }

    #[tokio::test]
    async fn unreadable_source_fails_fast() {
        let engine = DetectionEngine::new(
            Arc::new(ScriptedOpener {
                fps: 30.0,
                total_frames: 10,
                fail: true,
            }),
            Arc::new(ScriptedDetector::default()),
            None,
            EngineConfig::default(),
        );

        let err = engine
            .analyze(&handle(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_matches!(err, EngineError::SourceUnreadable(_));
    }

    #[tokio::test]
    async fn zero_fps_stream_is_unreadable() {
        let engine = engine_with(ScriptedDetector::default(), None, 0.0, 10);
        let err = engine
            .analyze(&handle(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_matches!(err, EngineError::SourceUnreadable(_));
    }

    #[tokio::test]
    async fn readiness_is_checked_before_opening() {
        let detector = ScriptedDetector {
            not_ready: true,
            ..Default::default()
        };
        let engine = engine(detector, None);
        let err = engine
            .analyze(&handle(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_matches!(err, EngineError::ModelNotReady(_));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_times_out() {
        let detector = ScriptedDetector {
            stall: true,
            ..Default::default()
        };
        let engine = engine(detector, None);
        let err = engine
            .analyze(&handle(), Duration::from_secs(300))
            .await
            .unwrap_err();
        assert_matches!(err, EngineError::Timeout(d) if d == Duration::from_secs(300));
    }

    #[tokio::test]
    async fn progress_reaches_one_hundred() {
        let engine = engine(ScriptedDetector::default(), None);
        let (tx, rx) = watch::channel(0u8);

        engine
            .analyze_with_progress(&handle(), Duration::from_secs(5), Some(tx))
            .await
            .unwrap();

        assert_eq!(*rx.borrow(), 100);
    }

    #[test]
    fn mean_confidence_of_frame() {
        let record = FrameRecord {
            frame_index: 15,
            frame_timestamp: 0.5,
            boxes: vec![
                FrameBox {
                    bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                    class_id: 2,
                    class_name: "car".into(),
                    confidence: 0.8,
                    track_id: None,
                    license_plate: None,
                },
                FrameBox {
                    bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                    class_id: 7,
                    class_name: "truck".into(),
                    confidence: 0.6,
                    track_id: None,
                    license_plate: None,
                },
            ],
        };
        assert!((record.mean_confidence() - 0.7).abs() < 1e-9);
    }
}
