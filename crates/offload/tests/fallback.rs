//! Orchestrator fallback and batch behavior.

use std::sync::{Arc, Mutex};

use offload::{OffloadClient, Orchestrator, StatusSink};
use offload_proto::ProcessingConfig;
use swap_pipeline::{PipelineContext, ProcessorRegistry};
use tokio::net::TcpListener;

#[derive(Default)]
struct CollectStatus(Mutex<Vec<String>>);

impl CollectStatus {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl StatusSink for CollectStatus {
    fn update(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

fn passthrough_context() -> PipelineContext {
    PipelineContext::new(Arc::new(ProcessorRegistry::with_passthrough_defaults()))
}

/// An address nothing listens on.
async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

#[tokio::test]
async fn unreachable_worker_falls_back_to_local_with_the_same_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("face.jpg");
    let target = dir.path().join("photo.png");
    std::fs::write(&source, b"source-bytes").unwrap();
    std::fs::write(&target, b"target-bytes").unwrap();

    let config = ProcessingConfig::default();

    // Reference run with offload disabled.
    let local_only = Orchestrator::new(passthrough_context());
    let local_output = dir.path().join("local.png");
    let status = CollectStatus::default();
    assert!(
        local_only
            .process_file(&config, &source, &target, &local_output, &status)
            .await
    );

    // Same inputs through a dead worker address.
    let with_offload = Orchestrator::new(passthrough_context())
        .with_offload(OffloadClient::new(&dead_address().await));
    let fallback_output = dir.path().join("fallback.png");
    let status = CollectStatus::default();
    assert!(
        with_offload
            .process_file(&config, &source, &target, &fallback_output, &status)
            .await
    );

    // The caller sees the same artifact either way.
    assert_eq!(
        std::fs::read(&local_output).unwrap(),
        std::fs::read(&fallback_output).unwrap()
    );
    assert!(
        status
            .lines()
            .iter()
            .any(|l| l.contains("Falling back")),
        "statuses: {:?}",
        status.lines()
    );
}

#[tokio::test]
async fn folder_mode_numbers_outputs_and_skips_non_media() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("batch");
    let output_dir = dir.path().join("out");
    std::fs::create_dir(&input).unwrap();

    let source = dir.path().join("face.jpg");
    std::fs::write(&source, b"source-bytes").unwrap();
    for name in ["a.png", "b.jpg", "c.png"] {
        std::fs::write(input.join(name), format!("media-{name}")).unwrap();
    }
    for name in ["notes.txt", "README.md"] {
        std::fs::write(input.join(name), b"not media").unwrap();
    }

    let orchestrator = Orchestrator::new(passthrough_context());
    let status = CollectStatus::default();
    let summary = orchestrator
        .process_folder(
            &ProcessingConfig::default(),
            &source,
            &input,
            &output_dir,
            &status,
        )
        .await
        .unwrap();

    assert_eq!(summary.successful, 3);
    assert_eq!(summary.failed, 0);

    let mut produced: Vec<String> = std::fs::read_dir(&output_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    produced.sort();
    assert_eq!(produced, ["output-0001.png", "output-0002.jpg", "output-0003.png"]);

    // Queue order is deterministic, so numbering maps back to sorted inputs.
    assert_eq!(
        std::fs::read(output_dir.join("output-0002.jpg")).unwrap(),
        b"media-b.jpg"
    );
}

#[tokio::test]
async fn batch_failures_are_isolated_per_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("batch");
    let output_dir = dir.path().join("out");
    std::fs::create_dir(&input).unwrap();

    let source = dir.path().join("face.jpg");
    std::fs::write(&source, b"source-bytes").unwrap();
    std::fs::write(input.join("ok.png"), b"fine").unwrap();

    // Unknown stage name fails every file, but the batch still completes
    // with a summary instead of aborting.
    let config = ProcessingConfig {
        frame_processors: vec!["face_restorer".into()],
        ..Default::default()
    };

    let orchestrator = Orchestrator::new(passthrough_context());
    let status = CollectStatus::default();
    let summary = orchestrator
        .process_folder(&config, &source, &input, &output_dir, &status)
        .await
        .unwrap();

    assert_eq!(summary.successful, 0);
    assert_eq!(summary.failed, 1);
}
