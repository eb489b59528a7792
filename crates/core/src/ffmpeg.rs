//! FFprobe helpers for video stream sources.
//!
//! Sources are opaque URLs handed out by the storage collaborator (or local
//! paths in development). Only the metadata the detection engine needs is
//! extracted: frame rate, frame count, duration and resolution.

use serde::Deserialize;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("source has no video stream: {0}")]
    NoVideoStream(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub format_name: Option<String>,
}

/// Metadata the engine needs before it starts reading frames.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub fps: f64,
    pub total_frames: i64,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `ffprobe` against a URL or path and return the parsed JSON output.
pub async fn probe_source(source: &str) -> Result<FfprobeOutput, FfmpegError> {
    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(source)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

/// Probe a source and condense the result into a [`StreamInfo`].
pub async fn stream_info(source: &str) -> Result<StreamInfo, FfmpegError> {
    let probe = probe_source(source).await?;
    StreamInfo::from_probe(&probe).ok_or_else(|| FfmpegError::NoVideoStream(source.to_string()))
}

impl StreamInfo {
    /// `None` when the probe has no video stream with a usable resolution.
    pub fn from_probe(probe: &FfprobeOutput) -> Option<Self> {
        probe.video_stream()?;
        let (width, height) = probe.resolution();
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            fps: probe.fps(),
            total_frames: probe.total_frames(),
            duration_secs: probe.duration_secs(),
            width,
            height,
        })
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

impl FfprobeOutput {
    pub fn video_stream(&self) -> Option<&FfprobeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    }

    /// Container duration, falling back to the video stream's own.
    pub fn duration_secs(&self) -> f64 {
        let container = self.format.duration.as_deref();
        let stream = self.video_stream().and_then(|s| s.duration.as_deref());
        [container, stream]
            .into_iter()
            .flatten()
            .find_map(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    /// Prefers `r_frame_rate`; live or variable-rate sources sometimes
    /// report `0/0` there, in which case `avg_frame_rate` is used.
    pub fn fps(&self) -> f64 {
        let Some(stream) = self.video_stream() else {
            return 0.0;
        };
        [stream.r_frame_rate.as_deref(), stream.avg_frame_rate.as_deref()]
            .into_iter()
            .flatten()
            .map(parse_fraction)
            .find(|fps| *fps > 0.0)
            .unwrap_or(0.0)
    }

    /// `nb_frames` when the container reports it, else duration x fps.
    pub fn total_frames(&self) -> i64 {
        let reported = self
            .video_stream()
            .and_then(|s| s.nb_frames.as_deref())
            .and_then(|nb| nb.parse::<i64>().ok());
        reported.unwrap_or_else(|| {
            let estimate = self.duration_secs() * self.fps();
            if estimate > 0.0 {
                estimate.round() as i64
            } else {
                0
            }
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        let dim = |v: Option<i32>| v.unwrap_or(0).max(0) as u32;
        self.video_stream()
            .map(|s| (dim(s.width), dim(s.height)))
            .unwrap_or((0, 0))
    }
}

/// Parse a rate like `"30/1"`, `"24000/1001"` or `"25"`. Unparseable input
/// and zero denominators give 0.
pub fn parse_fraction(s: &str) -> f64 {
    match s.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().unwrap_or(0.0);
            let den = den.parse::<f64>().unwrap_or(0.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => s.parse::<f64>().unwrap_or(0.0),
    }
}
