//! Frame sources.
//!
//! A [`SourceOpener`] turns a [`VideoHandle`] into a sequential
//! [`FrameSource`]. Reads are async I/O; the engine decides which frames
//! are decoded and which are skipped.

use std::sync::Arc;

use async_trait::async_trait;
use roadwatch_core::types::DbId;

use crate::error::EngineError;

/// What the engine needs to locate a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoHandle {
    pub video_id: DbId,
    /// Time-bounded URL from the storage collaborator.
    pub stream_url: String,
}

/// Stream properties known once the source is open.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMeta {
    pub fps: f64,
    pub total_frames: i64,
    pub width: u32,
    pub height: u32,
}

/// One decoded RGB24 frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based position in the native stream.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<Vec<u8>>,
}

#[async_trait]
pub trait FrameSource: Send {
    fn meta(&self) -> &StreamMeta;

    /// Decode the next frame, or `None` at end of stream.
    async fn read_frame(&mut self) -> Result<Option<Frame>, EngineError>;

    /// Advance past the next frame without keeping it.
    ///
    /// Returns `false` at end of stream.
    async fn skip_frame(&mut self) -> Result<bool, EngineError> {
        Ok(self.read_frame().await?.is_some())
    }
}

#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, handle: &VideoHandle) -> Result<Box<dyn FrameSource>, EngineError>;
}
