//! The per-job configuration snapshot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output video encoder choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoEncoder {
    #[default]
    #[serde(rename = "libx264")]
    Libx264,
    #[serde(rename = "libx265")]
    Libx265,
    #[serde(rename = "libvpx-vp9")]
    LibvpxVp9,
}

impl VideoEncoder {
    /// The ffmpeg encoder name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Libx264 => "libx264",
            Self::Libx265 => "libx265",
            Self::LibvpxVp9 => "libvpx-vp9",
        }
    }

    /// Container extension matching the encoder.
    pub fn container_extension(&self) -> &'static str {
        match self {
            Self::Libx264 | Self::Libx265 => "mp4",
            Self::LibvpxVp9 => "webm",
        }
    }
}

impl fmt::Display for VideoEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoEncoder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "libx264" => Ok(Self::Libx264),
            "libx265" => Ok(Self::Libx265),
            "libvpx-vp9" => Ok(Self::LibvpxVp9),
            other => Err(format!(
                "unknown video encoder `{other}` (expected libx264, libx265 or libvpx-vp9)"
            )),
        }
    }
}

/// Immutable configuration value copied into each job at submission time.
///
/// A snapshot is constructed once per job and passed down the call chain;
/// concurrent jobs carry independent snapshots without interference. Field
/// names match the wire format, so the struct doubles as the `config` record
/// of a `PROCESS` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Ordered pipeline stages, e.g. `["face_swapper", "face_enhancer"]`.
    pub frame_processors: Vec<String>,
    pub keep_fps: bool,
    pub keep_audio: bool,
    pub keep_frames: bool,
    pub many_faces: bool,
    pub map_faces: bool,
    pub color_correction: bool,
    pub nsfw_filter: bool,
    pub mouth_mask: bool,
    pub video_encoder: VideoEncoder,
    /// CRF, 0-51.
    pub video_quality: u32,
    pub execution_threads: u32,
    /// Memory ceiling in GB.
    pub max_memory: u32,
    /// 0.0-1.0.
    pub opacity: f64,
    /// >= 0.0.
    pub sharpness: f64,
    /// Optional per-job backend preference, by wire name.
    pub execution_providers: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            frame_processors: vec!["face_swapper".to_string()],
            keep_fps: false,
            keep_audio: true,
            keep_frames: false,
            many_faces: false,
            map_faces: false,
            color_correction: false,
            nsfw_filter: false,
            mouth_mask: false,
            video_encoder: VideoEncoder::default(),
            video_quality: 18,
            execution_threads: 8,
            max_memory: 16,
            opacity: 1.0,
            sharpness: 0.0,
            execution_providers: vec![],
        }
    }
}

impl ProcessingConfig {
    /// Clamp numeric parameters into their documented ranges.
    ///
    /// Out-of-range values received from a peer are clamped rather than
    /// rejected, so a job never fails on a tunable that has a nearest legal
    /// value. Applied once when the job starts; the normalized snapshot is
    /// what the pipeline runs with.
    pub fn normalized(mut self) -> Self {
        self.video_quality = self.video_quality.min(51);
        self.execution_threads = self.execution_threads.max(1);
        self.max_memory = self.max_memory.max(1);
        self.opacity = self.opacity.clamp(0.0, 1.0);
        self.sharpness = self.sharpness.max(0.0);
        self
    }
}
