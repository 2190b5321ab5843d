//! External encoder integration.
//!
//! Frame extraction, video reassembly and audio restore are delegated to an
//! `ffmpeg` binary spawned per operation; fps detection uses `ffprobe`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use offload_proto::{ProcessingConfig, VideoEncoder};

use crate::error::{PipelineError, Result};

/// Frame rate used when the original rate is not kept or cannot be detected.
pub const FALLBACK_FPS: f64 = 30.0;

/// Filename pattern for extracted frames.
const FRAME_PATTERN: &str = "%04d.png";

/// Whether an ffmpeg binary is reachable on this host.
pub fn ffmpeg_available() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

async fn run(operation: &'static str, program: &str, args: &[String]) -> Result<Vec<u8>> {
    debug!(%program, ?args, "spawning external encoder");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| PipelineError::Ffmpeg {
            operation,
            detail: format!("failed to spawn {program}: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Ffmpeg {
            operation,
            detail: format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim().lines().last().unwrap_or("no output")
            ),
        });
    }
    Ok(output.stdout)
}

async fn run_ffmpeg(operation: &'static str, args: &[String]) -> Result<()> {
    let mut full = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];
    full.extend_from_slice(args);
    run(operation, "ffmpeg", &full).await.map(|_| ())
}

/// Detect the frame rate of a video via ffprobe.
pub async fn detect_fps(video: &Path) -> Result<f64> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "v:0".to_string(),
        "-show_entries".to_string(),
        "stream=r_frame_rate".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        video.display().to_string(),
    ];
    let stdout = run("detecting fps", "ffprobe", &args).await?;
    let text = String::from_utf8_lossy(&stdout);
    parse_frame_rate(text.trim()).ok_or_else(|| PipelineError::Ffmpeg {
        operation: "detecting fps",
        detail: format!("unparseable frame rate `{}`", text.trim()),
    })
}

/// Parse an ffprobe `r_frame_rate` value (`30000/1001` or a plain number).
fn parse_frame_rate(value: &str) -> Option<f64> {
    let value = value.lines().next()?.trim();
    if let Some((num, den)) = value.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        Some(num / den)
    } else {
        value.parse().ok()
    }
}

/// Extract every frame of `video` into `frames_dir` as numbered PNGs.
pub async fn extract_frames(video: &Path, frames_dir: &Path) -> Result<()> {
    let args = vec![
        "-i".to_string(),
        video.display().to_string(),
        frames_dir.join(FRAME_PATTERN).display().to_string(),
    ];
    run_ffmpeg("extracting frames", &args).await
}

/// Paths of previously extracted frames, in frame order.
pub async fn frame_paths(frames_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(frames_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "png") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Reassemble processed frames into a video at `output`.
pub async fn assemble_video(
    frames_dir: &Path,
    fps: f64,
    config: &ProcessingConfig,
    output: &Path,
) -> Result<()> {
    let mut args = vec![
        "-framerate".to_string(),
        format!("{fps}"),
        "-i".to_string(),
        frames_dir.join(FRAME_PATTERN).display().to_string(),
        "-c:v".to_string(),
        config.video_encoder.as_str().to_string(),
        "-crf".to_string(),
        config.video_quality.to_string(),
        "-threads".to_string(),
        config.execution_threads.to_string(),
    ];
    if config.video_encoder != VideoEncoder::LibvpxVp9 {
        args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
    } else {
        // libvpx-vp9 interprets -crf only alongside -b:v 0.
        args.extend(["-b:v".to_string(), "0".to_string()]);
    }
    args.push(output.display().to_string());
    run_ffmpeg("assembling video", &args).await
}

/// Mux the original audio track of `original` onto the silent `muxed` video,
/// writing `output`. Videos without an audio stream pass through untouched.
pub async fn restore_audio(original: &Path, muxed: &Path, output: &Path) -> Result<()> {
    let args = vec![
        "-i".to_string(),
        muxed.display().to_string(),
        "-i".to_string(),
        original.display().to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0?".to_string(),
        output.display().to_string(),
    ];
    if let Err(e) = run_ffmpeg("restoring audio", &args).await {
        // The muxed render is still a valid result; keep it rather than fail
        // the whole job over a missing or broken audio track.
        warn!(error = %e, "audio restore failed, keeping silent render");
        move_file(muxed, output).await?;
    }
    Ok(())
}

/// Rename with a copy fallback for cross-device moves.
pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_parsing_handles_rationals_and_plain_numbers() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("30000/1001").map(|f| (f * 1000.0).round()), Some(29970.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("n/a"), None);
    }

    #[tokio::test]
    async fn frame_paths_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0002.png", "0001.png", "notes.txt", "0010.png"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        let paths = frame_paths(dir.path()).await.unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["0001.png", "0002.png", "0010.png"]);
    }

    #[tokio::test]
    async fn move_file_replaces_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.mp4");
        let to = dir.path().join("b.mp4");
        tokio::fs::write(&from, b"video").await.unwrap();

        move_file(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(tokio::fs::read(&to).await.unwrap(), b"video");
    }
}
