//! Local execution of a single media file through the configured stages.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use offload_proto::ProcessingConfig;

use crate::error::{PipelineError, Result};
use crate::ffmpeg;
use crate::filter::{ContentFilter, NoOpFilter};
use crate::media::{MediaKind, kind_for_path};
use crate::processor::{InferenceLock, ProcessorRegistry};

/// Shared, immutable wiring the pipeline runs against: the stage registry,
/// the content filter and the process-wide inference lock.
///
/// Per-job tunables live in the [`ProcessingConfig`] snapshot instead, never
/// here, so concurrent jobs cannot bleed configuration into each other.
#[derive(Clone)]
pub struct PipelineContext {
    pub registry: Arc<ProcessorRegistry>,
    pub filter: Arc<dyn ContentFilter>,
    pub inference: InferenceLock,
}

impl PipelineContext {
    pub fn new(registry: Arc<ProcessorRegistry>) -> Self {
        Self {
            registry,
            filter: Arc::new(NoOpFilter),
            inference: InferenceLock::default(),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn ContentFilter>) -> Self {
        self.filter = filter;
        self
    }
}

/// Run one file through the pipeline, producing `output`.
///
/// Dispatches on the target's media kind. The content filter, when enabled
/// in the snapshot, is consulted before any temp resources are allocated.
pub async fn process_media_file(
    ctx: &PipelineContext,
    config: &ProcessingConfig,
    source: &Path,
    target: &Path,
    output: &Path,
) -> Result<()> {
    if config.nsfw_filter && ctx.filter.is_flagged(target)? {
        return Err(PipelineError::ContentRejected {
            filter: ctx.filter.name().to_string(),
        });
    }

    match kind_for_path(target) {
        Some(MediaKind::Image) => process_image_file(ctx, config, source, target, output).await,
        Some(MediaKind::Video) => process_video_file(ctx, config, source, target, output).await,
        None => Err(PipelineError::UnsupportedMedia(target.display().to_string())),
    }
}

/// Image path: an explicit fold over the configured stages.
///
/// Stage N reads the step-N intermediate and writes step-N+1; the final
/// intermediate is copied to `output`. Keeping one artifact per step avoids
/// aliasing the in-progress file with the destination path.
async fn process_image_file(
    ctx: &PipelineContext,
    config: &ProcessingConfig,
    source: &Path,
    target: &Path,
    output: &Path,
) -> Result<()> {
    let stages = ctx.registry.resolve(&config.frame_processors)?;
    ensure_parent_dir(output).await?;

    let scratch = tempfile::Builder::new().prefix("rswap-image-").tempdir()?;
    let ext = target
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_string();

    let mut current = scratch.path().join(format!("step-0.{ext}"));
    tokio::fs::copy(target, &current).await?;

    for (index, stage) in stages.iter().enumerate() {
        let next = scratch.path().join(format!("step-{}.{ext}", index + 1));
        info!(stage = stage.name(), "running image stage");
        let _serialized = ctx.inference.acquire().await;
        stage.process_image(config, source, &current, &next).await?;
        current = next;
    }

    tokio::fs::copy(&current, output).await?;
    debug!(output = %output.display(), "image processing finished");
    Ok(())
}

/// Video path: extract frames, run each stage across the full frame set,
/// reassemble, then restore audio or move the render into place.
async fn process_video_file(
    ctx: &PipelineContext,
    config: &ProcessingConfig,
    source: &Path,
    target: &Path,
    output: &Path,
) -> Result<()> {
    let stages = ctx.registry.resolve(&config.frame_processors)?;
    ensure_parent_dir(output).await?;

    let scratch = tempfile::Builder::new().prefix("rswap-frames-").tempdir()?;
    info!(target = %target.display(), "extracting frames");
    ffmpeg::extract_frames(target, scratch.path()).await?;
    let frames = ffmpeg::frame_paths(scratch.path()).await?;

    for stage in &stages {
        info!(stage = stage.name(), frames = frames.len(), "running video stage");
        let _serialized = ctx.inference.acquire().await;
        stage.process_video(config, source, &frames).await?;
    }

    let fps = if config.keep_fps {
        match ffmpeg::detect_fps(target).await {
            Ok(fps) => fps,
            Err(e) => {
                warn!(error = %e, "fps detection failed, using fallback rate");
                ffmpeg::FALLBACK_FPS
            }
        }
    } else {
        ffmpeg::FALLBACK_FPS
    };

    let render_ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_else(|| config.video_encoder.container_extension());
    let render = scratch.path().join(format!("render.{render_ext}"));
    info!(fps, encoder = %config.video_encoder, "assembling video");
    ffmpeg::assemble_video(scratch.path(), fps, config, &render).await?;

    if config.keep_audio {
        ffmpeg::restore_audio(target, &render, output).await?;
    } else {
        ffmpeg::move_file(&render, output).await?;
    }

    if config.keep_frames {
        let kept = scratch.keep();
        debug!(path = %kept.display(), "keeping extracted frames");
    }
    Ok(())
}

async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;

    use crate::processor::FrameProcessor;

    use super::*;

    /// Appends its own name to the image contents, making stage order
    /// observable in the output bytes.
    struct StampStage {
        name: String,
    }

    #[async_trait]
    impl FrameProcessor for StampStage {
        fn name(&self) -> &str {
            &self.name
        }

        async fn process_image(
            &self,
            _config: &ProcessingConfig,
            _source: &Path,
            input: &Path,
            output: &Path,
        ) -> Result<()> {
            let mut bytes = tokio::fs::read(input).await?;
            bytes.extend_from_slice(self.name.as_bytes());
            tokio::fs::write(output, bytes).await?;
            Ok(())
        }

        async fn process_video(
            &self,
            _config: &ProcessingConfig,
            _source: &Path,
            _frame_paths: &[PathBuf],
        ) -> Result<()> {
            Ok(())
        }
    }

    struct FlagEverything;

    impl ContentFilter for FlagEverything {
        fn name(&self) -> &str {
            "flag-everything"
        }

        fn is_flagged(&self, _path: &Path) -> Result<bool> {
            Ok(true)
        }
    }

    fn stamping_context() -> PipelineContext {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(StampStage {
            name: "face_swapper".into(),
        }));
        registry.register(Arc::new(StampStage {
            name: "face_enhancer".into(),
        }));
        PipelineContext::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn image_stages_run_in_configured_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("face.jpg");
        let target = dir.path().join("photo.png");
        let output = dir.path().join("out/result.png");
        tokio::fs::write(&source, b"face").await.unwrap();
        tokio::fs::write(&target, b"orig:").await.unwrap();

        let config = ProcessingConfig {
            frame_processors: vec!["face_swapper".into(), "face_enhancer".into()],
            ..Default::default()
        };
        process_media_file(&stamping_context(), &config, &source, &target, &output)
            .await
            .unwrap();

        assert_eq!(
            tokio::fs::read(&output).await.unwrap(),
            b"orig:face_swapperface_enhancer"
        );
        // Original target is untouched.
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"orig:");
    }

    #[tokio::test]
    async fn empty_stage_list_copies_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("face.jpg");
        let target = dir.path().join("photo.png");
        let output = dir.path().join("result.png");
        tokio::fs::write(&source, b"face").await.unwrap();
        tokio::fs::write(&target, b"pixels").await.unwrap();

        let config = ProcessingConfig {
            frame_processors: vec![],
            ..Default::default()
        };
        process_media_file(&stamping_context(), &config, &source, &target, &output)
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"pixels");
    }

    #[tokio::test]
    async fn enabled_filter_rejects_before_processing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("face.jpg");
        let target = dir.path().join("photo.png");
        let output = dir.path().join("result.png");
        tokio::fs::write(&source, b"face").await.unwrap();
        tokio::fs::write(&target, b"pixels").await.unwrap();

        let ctx = stamping_context().with_filter(Arc::new(FlagEverything));
        let config = ProcessingConfig {
            nsfw_filter: true,
            ..Default::default()
        };
        let result = process_media_file(&ctx, &config, &source, &target, &output).await;

        assert!(matches!(
            result,
            Err(PipelineError::ContentRejected { .. })
        ));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn disabled_filter_is_not_consulted() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("face.jpg");
        let target = dir.path().join("photo.png");
        let output = dir.path().join("result.png");
        tokio::fs::write(&source, b"face").await.unwrap();
        tokio::fs::write(&target, b"pixels").await.unwrap();

        let ctx = stamping_context().with_filter(Arc::new(FlagEverything));
        let config = ProcessingConfig {
            frame_processors: vec![],
            nsfw_filter: false,
            ..Default::default()
        };
        process_media_file(&ctx, &config, &source, &target, &output)
            .await
            .unwrap();
        assert!(output.exists());
    }

    #[tokio::test]
    async fn unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("notes.txt");
        tokio::fs::write(&target, b"text").await.unwrap();

        let result = process_media_file(
            &stamping_context(),
            &ProcessingConfig::default(),
            Path::new("face.jpg"),
            &target,
            &dir.path().join("out.txt"),
        )
        .await;

        assert!(matches!(result, Err(PipelineError::UnsupportedMedia(_))));
    }
}
