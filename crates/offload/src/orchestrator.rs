//! Offload-or-local decision layer and the batch processing loop.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use offload_proto::ProcessingConfig;
use swap_pipeline::{PipelineContext, is_media_file, process_media_file};

use crate::client::OffloadClient;
use crate::status::StatusSink;

/// Aggregate result of a batch run. Per-item state is not retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
}

/// Decides offload vs. local execution per file and drives the batch loop.
///
/// When an offload client is configured, every file is first attempted
/// remotely; any failure falls back to local execution of the same file
/// unconditionally, producing the same artifact as if offload had been
/// disabled from the start.
pub struct Orchestrator {
    ctx: PipelineContext,
    offload: Option<OffloadClient>,
}

impl Orchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx, offload: None }
    }

    /// Enable remote offload against the given client.
    pub fn with_offload(mut self, client: OffloadClient) -> Self {
        self.offload = Some(client);
        self
    }

    /// Process a single file, returning whether an artifact was produced.
    pub async fn process_file(
        &self,
        config: &ProcessingConfig,
        source: &Path,
        target: &Path,
        output: &Path,
        status: &dyn StatusSink,
    ) -> bool {
        if let Some(client) = &self.offload {
            status.update("Processing remotely on the offload worker...");
            if client
                .process_remote(source, target, output, config, status)
                .await
            {
                return true;
            }
            warn!(
                target = %target.display(),
                "remote processing failed, falling back to local execution"
            );
            status.update("Falling back to local processing...");
        }

        match process_media_file(&self.ctx, &config.clone().normalized(), source, target, output)
            .await
        {
            Ok(()) => {
                status.update("Processing finished");
                true
            }
            Err(e) => {
                warn!(target = %target.display(), error = %e, "processing failed");
                status.update(&format!("Processing failed: {e}"));
                false
            }
        }
    }

    /// Process every valid media file under `folder` (recursive), writing
    /// sequence-numbered outputs into `output_dir`.
    ///
    /// Failures are isolated per file: one file's failure only counts
    /// against the summary, it never aborts the remaining queue.
    pub async fn process_folder(
        &self,
        config: &ProcessingConfig,
        source: &Path,
        folder: &Path,
        output_dir: &Path,
        status: &dyn StatusSink,
    ) -> std::io::Result<BatchSummary> {
        let queue = collect_media_files(folder)?;
        let total = queue.len();
        info!(total, folder = %folder.display(), "processing file queue");
        status.update(&format!("Processing {total} files in queue..."));
        std::fs::create_dir_all(output_dir)?;

        let mut summary = BatchSummary::default();
        for (index, target) in queue.iter().enumerate() {
            let file_id = index + 1;
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            status.update(&format!("Processing file {file_id}/{total}: {name}"));

            let output = numbered_output_path(output_dir, file_id, target);
            if self
                .process_file(config, source, target, &output, status)
                .await
            {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
        }

        status.update(&format!(
            "Queue processing complete! Success: {}, Failed: {}",
            summary.successful, summary.failed
        ));
        Ok(summary)
    }
}

/// Collect the valid media files under `dir`, recursively, in
/// lexicographic path order.
pub fn collect_media_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, out)?;
            } else if is_media_file(&path) {
                out.push(path);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

/// Deterministic, collision-free output name for batch item `index`,
/// keeping the target's extension.
pub fn numbered_output_path(output_dir: &Path, index: usize, target: &Path) -> PathBuf {
    let ext = target
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("out");
    output_dir.join(format!("output-{index:04}.{ext}"))
}
