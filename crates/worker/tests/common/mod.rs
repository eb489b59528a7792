//! Scripted engine and fixtures for orchestrator tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roadwatch_core::detection::BoundingBox;
use roadwatch_core::retry::RetryPolicy;
use roadwatch_db::models::video::{CreateVideo, Video};
use roadwatch_db::repositories::VideoRepo;
use roadwatch_detection::capability::{DetectRequest, Detector, RawDetection};
use roadwatch_detection::source::{Frame, FrameSource, SourceOpener, StreamMeta};
use roadwatch_detection::{DetectionEngine, EngineConfig, EngineError, VideoHandle};
use roadwatch_events::{EventBus, Notifier};
use roadwatch_worker::handlers::thumbnail::UrlTemplateStorage;
use roadwatch_worker::{JobDispatcher, JobHandlers, WorkerConfig};
use sqlx::PgPool;

pub const MOTORCYCLE: i32 = 3;

// ---------------------------------------------------------------------------
// Scripted capability
// ---------------------------------------------------------------------------

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

/// Opens a 30 fps stream of `total_frames` blank frames, or fails.
pub struct ScriptedOpener {
    pub total_frames: i64,
    pub unreadable: bool,
}

#[async_trait]
impl SourceOpener for ScriptedOpener {
    async fn open(&self, handle: &VideoHandle) -> Result<Box<dyn FrameSource>, EngineError> {
        if self.unreadable {
            return Err(EngineError::SourceUnreadable(format!(
                "cannot open {}",
                handle.stream_url
            )));
        }
        Ok(Box::new(ScriptedSource {
            meta: StreamMeta {
                fps: 30.0,
                total_frames: self.total_frames,
                width: 4,
                height: 4,
            },
            next: 1,
        }))
    }
}

/// Returns scripted boxes keyed by native frame index.
#[derive(Default)]
pub struct ScriptedDetector {
    pub frames: HashMap<u64, Vec<RawDetection>>,
    pub stall: bool,
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn ready(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn detect(
        &self,
        frame: &Frame,
        _request: &DetectRequest,
    ) -> Result<Vec<RawDetection>, EngineError> {
        if self.stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }
}

/// A motorcycle on track `track` whose rider has no helmet.
pub fn helmetless_rider(track: i64) -> RawDetection {
    RawDetection {
        bbox: BoundingBox::new(100.0, 120.0, 180.0, 260.0),
        class_id: MOTORCYCLE,
        confidence: 0.9,
        track_id: Some(track),
        attributes: [("no_helmet".to_string(), 0.8)].into_iter().collect(),
    }
}

/// Native index of the n-th sampled frame at 30 fps and 2 samples/s.
pub fn sampled(n: u64) -> u64 {
    n * 15
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        concurrency: 1,
        poll_interval: Duration::from_millis(20),
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(120),
            jitter_ratio: 0.0,
        },
        hard_timeout: Duration::from_secs(30),
        analysis_timeout: Duration::from_secs(20),
        ..WorkerConfig::default()
    }
}

pub struct Harness {
    pub dispatcher: JobDispatcher,
    pub bus: Arc<EventBus>,
}

pub fn harness(
    pool: &PgPool,
    opener: ScriptedOpener,
    detector: ScriptedDetector,
    config: &WorkerConfig,
) -> Harness {
    let engine = Arc::new(DetectionEngine::new(
        Arc::new(opener),
        Arc::new(detector),
        None,
        EngineConfig::default(),
    ));
    let handlers = Arc::new(JobHandlers::new(
        engine,
        Arc::new(UrlTemplateStorage::new("https://thumbs.example.test")),
        config.analysis_timeout,
    ));
    let bus = Arc::new(EventBus::default());
    let dispatcher = JobDispatcher::new(
        pool.clone(),
        handlers,
        Notifier::new(Arc::clone(&bus)),
        "test-worker",
        config,
    );
    Harness { dispatcher, bus }
}

/// Ten seconds of 30 fps video with a helmetless rider (track 1) in the
/// 5th and 14th sampled frames.
pub fn helmet_scenario() -> (ScriptedOpener, ScriptedDetector) {
    let mut detector = ScriptedDetector::default();
    detector.frames.insert(sampled(5), vec![helmetless_rider(1)]);
    detector.frames.insert(sampled(14), vec![helmetless_rider(1)]);
    (
        ScriptedOpener {
            total_frames: 300,
            unreadable: false,
        },
        detector,
    )
}

pub async fn seed_video(pool: &PgPool, external_id: &str) -> Video {
    VideoRepo::create(
        pool,
        &CreateVideo {
            external_id: external_id.to_string(),
            camera_id: Some("CAM-07".to_string()),
            location_name: Some("Vo Van Kiet / Nguyen Van Cu".to_string()),
            stream_url: format!("https://cdn.example.test/{external_id}.mp4"),
            duration_secs: Some(10.0),
            format: Some("mp4".to_string()),
            uploaded_by: Some(3),
        },
    )
    .await
    .unwrap()
}
