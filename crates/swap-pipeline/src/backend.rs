//! Acceleration backend probing and selection.
//!
//! The worker probes available backends once at startup and prefers
//! GPU-class execution when present; the selection is process-wide and
//! applied to every job on that instance. A per-job `execution_providers`
//! preference may narrow the choice but cannot enable a backend the probe
//! did not find.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

/// An acceleration execution target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionBackend {
    TensorRt,
    Cuda,
    Rocm,
    CoreMl,
    DirectMl,
    Cpu,
}

/// Preference order: GPU-class backends first, CPU last.
const PREFERENCE: &[ExecutionBackend] = &[
    ExecutionBackend::TensorRt,
    ExecutionBackend::Cuda,
    ExecutionBackend::Rocm,
    ExecutionBackend::CoreMl,
    ExecutionBackend::DirectMl,
    ExecutionBackend::Cpu,
];

impl ExecutionBackend {
    /// Wire/CLI name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TensorRt => "tensorrt",
            Self::Cuda => "cuda",
            Self::Rocm => "rocm",
            Self::CoreMl => "coreml",
            Self::DirectMl => "dml",
            Self::Cpu => "cpu",
        }
    }

    /// Whether this is a GPU-class backend.
    pub fn is_gpu(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl fmt::Display for ExecutionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tensorrt" => Ok(Self::TensorRt),
            "cuda" => Ok(Self::Cuda),
            "rocm" => Ok(Self::Rocm),
            "coreml" => Ok(Self::CoreMl),
            "dml" | "directml" => Ok(Self::DirectMl),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!("unknown execution backend `{other}`")),
        }
    }
}

/// Probe backends available on this host.
///
/// CPU execution is always available. NVIDIA GPU-class backends are detected
/// through `nvidia-smi`; the `RSWAP_BACKENDS` environment variable (a comma
/// separated list of backend names) overrides the probe entirely, which is
/// how deployments with other accelerators declare them.
pub fn probe_backends() -> Vec<ExecutionBackend> {
    if let Ok(forced) = std::env::var("RSWAP_BACKENDS") {
        let parsed: Vec<ExecutionBackend> = forced
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        if !parsed.is_empty() {
            debug!(backends = %forced, "backend probe overridden by RSWAP_BACKENDS");
            return parsed;
        }
    }

    let mut available = Vec::new();
    if nvidia_gpu_present() {
        available.push(ExecutionBackend::Cuda);
    }
    available.push(ExecutionBackend::Cpu);
    available
}

/// Pick the active backend out of the probed set, honoring an optional
/// preference list (first preferred backend that is actually available
/// wins).
pub fn select_backend(
    available: &[ExecutionBackend],
    preferred: &[ExecutionBackend],
) -> ExecutionBackend {
    for candidate in preferred {
        if available.contains(candidate) {
            return *candidate;
        }
    }
    for candidate in PREFERENCE {
        if available.contains(candidate) {
            info!(backend = %candidate, "selected execution backend");
            return *candidate;
        }
    }
    ExecutionBackend::Cpu
}

fn nvidia_gpu_present() -> bool {
    std::process::Command::new("nvidia-smi")
        .arg("-L")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
