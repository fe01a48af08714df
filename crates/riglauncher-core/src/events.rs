use std::path::PathBuf;

/// Status and progress callbacks for the presentation layer.
///
/// Calls interleave on the orchestrator's own thread, between download
/// chunks and between pipeline stages; implementations must return quickly.
pub trait ProgressSink {
    /// A human-readable phase description ("Creating virtual environment ...").
    fn status(&mut self, _message: &str) {}

    /// Download progress after each chunk; `total_size` is always known
    /// because downloads without a content length are rejected.
    fn download_progress(&mut self, _bytes_so_far: u64, _total_size: u64) {}
}

/// Yes/no decision points and the install-path prompt, bound by a UI or CLI.
///
/// These are the only cancellation points the pipeline honors: declining a
/// prompt abandons the operation at a stage boundary.
pub trait DecisionSink {
    fn confirm(&mut self, prompt: &str) -> bool;

    /// Asks for an installation directory; `None` cancels.
    fn choose_install_path(&mut self, prompt: &str) -> Option<PathBuf>;
}

/// Progress sink that drops everything; used by tests and quiet callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {}
