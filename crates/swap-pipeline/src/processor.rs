//! Frame-processor capability trait and stage registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use offload_proto::ProcessingConfig;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// An external unit of media transformation (face swap, face enhance, ...).
///
/// Implementations own their model state. Stage execution is not assumed
/// reentrant; callers serialize invocations through an [`InferenceLock`].
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    /// Stage name as referenced from `frame_processors` configuration.
    fn name(&self) -> &str;

    /// Validate model availability before the first job.
    async fn pre_start(&self) -> Result<()> {
        Ok(())
    }

    /// Transform a single image: read `input`, write the result to `output`.
    /// `source` is the identity descriptor image.
    async fn process_image(
        &self,
        config: &ProcessingConfig,
        source: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<()>;

    /// Transform an extracted video frame set in place.
    async fn process_video(
        &self,
        config: &ProcessingConfig,
        source: &Path,
        frame_paths: &[PathBuf],
    ) -> Result<()>;
}

/// Identity stage: copies images through untouched and leaves frames alone.
///
/// Stands in where no inference capability is wired up, and anchors tests
/// that only exercise the orchestration around the stages.
pub struct PassthroughProcessor {
    name: String,
}

impl PassthroughProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl FrameProcessor for PassthroughProcessor {
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
        if input != output {
            tokio::fs::copy(input, output).await?;
        }
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

/// Serializes stage execution.
///
/// Whether the underlying inference runtimes tolerate concurrent sessions is
/// unresolved, so every stage invocation across connections and tasks goes
/// through this process-wide lock.
#[derive(Clone, Default)]
pub struct InferenceLock(Arc<Mutex<()>>);

impl InferenceLock {
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

/// Named stages available in this process.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn FrameProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with passthrough stages under the standard
    /// names, for deployments without an inference capability attached.
    pub fn with_passthrough_defaults() -> Self {
        let mut registry = Self::new();
        for name in ["face_swapper", "face_enhancer"] {
            registry.register(Arc::new(PassthroughProcessor::new(name)));
        }
        registry
    }

    /// Register a stage under its own name, replacing any previous binding.
    pub fn register(&mut self, processor: Arc<dyn FrameProcessor>) {
        debug!(processor = processor.name(), "registering frame processor");
        self.processors
            .insert(processor.name().to_string(), processor);
    }

    /// Resolve the configured stage names, in order.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn FrameProcessor>>> {
        names
            .iter()
            .map(|name| {
                self.processors
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PipelineError::UnknownProcessor(name.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_preserves_configured_order() {
        let registry = ProcessorRegistry::with_passthrough_defaults();
        let stages = registry
            .resolve(&["face_enhancer".into(), "face_swapper".into()])
            .unwrap();
        assert_eq!(stages[0].name(), "face_enhancer");
        assert_eq!(stages[1].name(), "face_swapper");
    }

    #[test]
    fn resolve_rejects_unregistered_names() {
        let registry = ProcessorRegistry::with_passthrough_defaults();
        assert!(matches!(
            registry.resolve(&["face_restorer".into()]),
            Err(PipelineError::UnknownProcessor(name)) if name == "face_restorer"
        ));
    }

    #[tokio::test]
    async fn passthrough_copies_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        tokio::fs::write(&input, b"pixels").await.unwrap();

        let stage = PassthroughProcessor::new("face_swapper");
        stage
            .process_image(
                &ProcessingConfig::default(),
                Path::new("src.jpg"),
                &input,
                &output,
            )
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"pixels");
    }
}
