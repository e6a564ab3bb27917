use ort::{GraphOptimizationLevel, Session};
use std::path::Path;

/// Session settings for the detector. Intra-op threads default to the
/// number of available cores.
pub(crate) struct SessionOptions {
    pub intra_threads: usize,
    pub optimization_level: GraphOptimizationLevel,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            intra_threads: std::thread::available_parallelism()
                .map(|v| v.get())
                .unwrap_or(4),
            optimization_level: GraphOptimizationLevel::Level3,
        }
    }
}

pub(crate) fn load_session(
    model_path: impl AsRef<Path>,
    options: SessionOptions,
) -> anyhow::Result<Session> {
    let model_path = model_path.as_ref();
    if !model_path.is_file() {
        anyhow::bail!("onnx model not found: {}", model_path.display());
    }
    tracing::debug!(
        threads = options.intra_threads,
        "loading onnx session from {}",
        model_path.display()
    );

    let session = Session::builder()?
        .with_intra_threads(options.intra_threads)?
        .with_optimization_level(options.optimization_level)?
        .commit_from_file(model_path)?;

    Ok(session)
}
