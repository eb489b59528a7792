//! Frame source backed by an `ffmpeg` child process.
//!
//! The stream is probed with `ffprobe` first, then decoded to raw RGB24 on
//! the child's stdout. Each frame is exactly `width * height * 3` bytes.
//!
//! End of stream is only reported once the child has exited successfully.
//! A truncated frame or a non-zero exit is [`EngineError::SourceUnreadable`]
//! carrying the tail of ffmpeg's stderr.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use roadwatch_core::ffmpeg::{self, FfmpegError};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

use crate::error::EngineError;
use crate::source::{Frame, FrameSource, SourceOpener, StreamMeta, VideoHandle};

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Opens video URLs through `ffprobe` + `ffmpeg`.
#[derive(Debug, Default, Clone)]
pub struct FfmpegSourceOpener;

#[async_trait]
impl SourceOpener for FfmpegSourceOpener {
    async fn open(&self, handle: &VideoHandle) -> Result<Box<dyn FrameSource>, EngineError> {
        let info = ffmpeg::stream_info(&handle.stream_url).await?;

        let child = tokio::process::Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&handle.stream_url)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::SourceUnreadable(format!("failed to spawn ffmpeg: {e}")))?;

        tracing::debug!(
            video_id = handle.video_id,
            fps = info.fps,
            total_frames = info.total_frames,
            width = info.width,
            height = info.height,
            "Opened ffmpeg frame source",
        );

        let source = FfmpegFrameSource::from_child(
            child,
            StreamMeta {
                fps: info.fps,
                total_frames: info.total_frames,
                width: info.width,
                height: info.height,
            },
        )?;
        Ok(Box::new(source))
    }
}

/// Sequential RGB24 reader over an `ffmpeg` child process.
///
/// The child is killed when the source is dropped.
pub struct FfmpegFrameSource {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Option<JoinHandle<String>>,
    meta: StreamMeta,
    frame_len: usize,
    next_index: u64,
    scratch: Vec<u8>,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Wrap a spawned decoder whose stdout and stderr are piped.
    pub fn from_child(mut child: Child, meta: StreamMeta) -> Result<Self, EngineError> {
        let stdout = child.stdout.take().ok_or_else(|| {
            EngineError::SourceUnreadable("ffmpeg stdout was not captured".to_string())
        })?;
        let stderr_tail = child.stderr.take().map(spawn_stderr_tail);
        let frame_len = meta.width as usize * meta.height as usize * 3;

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr_tail,
            meta,
            frame_len,
            next_index: 1,
            scratch: vec![0; frame_len],
            finished: false,
        })
    }

    /// Fill `buf` with one frame. `Ok(false)` means the stream ended on a
    /// frame boundary; the caller still has to check the exit status.
    async fn fill(
        stdout: &mut BufReader<ChildStdout>,
        buf: &mut [u8],
        index: u64,
    ) -> Result<bool, EngineError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = stdout.read(&mut buf[filled..]).await.map_err(|e| {
                EngineError::SourceUnreadable(format!("failed to read frame from ffmpeg: {e}"))
            })?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        match filled {
            0 => Ok(false),
            n if n == buf.len() => Ok(true),
            n => Err(EngineError::SourceUnreadable(format!(
                "ffmpeg output ended inside frame {index} ({n} of {} bytes)",
                buf.len()
            ))),
        }
    }

    /// Reap the child after stdout closed. Fails unless it exited cleanly.
    async fn finish(&mut self) -> Result<(), EngineError> {
        let status = self.child.wait().await.map_err(|e| {
            EngineError::SourceUnreadable(format!("failed to wait for ffmpeg: {e}"))
        })?;
        let stderr = match self.stderr_tail.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        self.finished = true;

        if status.success() {
            return Ok(());
        }
        Err(FfmpegError::ExecutionFailed {
            exit_code: status.code(),
            stderr,
        }
        .into())
    }

    /// Read the next frame into `buf`, or into the scratch buffer when
    /// skipping. `Ok(false)` only once the decoder exited successfully.
    async fn advance(&mut self, buf: Option<&mut [u8]>) -> Result<bool, EngineError> {
        if self.finished {
            return Ok(false);
        }

        let buf = match buf {
            Some(buf) => buf,
            None => &mut self.scratch[..],
        };
        match Self::fill(&mut self.stdout, buf, self.next_index).await {
            Ok(true) => {
                self.next_index += 1;
                Ok(true)
            }
            Ok(false) => {
                self.finish().await?;
                Ok(false)
            }
            Err(e) => {
                // Prefer ffmpeg's own diagnosis when it has already exited.
                if let Ok(Some(_)) = self.child.try_wait() {
                    self.finish().await?;
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>, EngineError> {
        let index = self.next_index;
        let mut pixels = vec![0; self.frame_len];
        if !self.advance(Some(&mut pixels)).await? {
            return Ok(None);
        }
        Ok(Some(Frame {
            index,
            width: self.meta.width,
            height: self.meta.height,
            pixels: Arc::new(pixels),
        }))
    }

    async fn skip_frame(&mut self) -> Result<bool, EngineError> {
        self.advance(None).await
    }
}

/// Collect the last [`STDERR_TAIL_LINES`] lines the child writes to stderr.
fn spawn_stderr_tail(stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while let Ok(Some(line)) = lines.next_line().await {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Vec::from(tail).join("\n")
    })
}
