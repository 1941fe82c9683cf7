//! Job-level error taxonomy.
//!
//! Every variant is terminal for the current job. Nothing here is
//! retried internally; the invoking platform decides whether to retry
//! the whole job. The worker converts these into a structured error
//! payload instead of crashing.

use std::path::PathBuf;
use std::time::Duration;

/// Terminal failure modes of a single generation job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The generation server never became healthy.
    #[error("server startup failed: {0}")]
    Startup(String),

    /// A required model file is absent. Checked before any server
    /// interaction so the job fails fast.
    #[error("required model file missing: {}", .0.display())]
    MissingModel(PathBuf),

    /// The enqueue endpoint rejected the workflow.
    #[error("workflow submission rejected: {0}")]
    Submission(String),

    /// The server reported a node-level execution failure.
    #[error("workflow execution failed: {0}")]
    Execution(String),

    /// The server reported completion but no artifact could be located.
    #[error("generation finished but no artifact was found under {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// Wall-clock budget exceeded without resolution.
    #[error("generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The server's health endpoint stopped responding mid-poll.
    #[error("connection to the generation server was lost")]
    ConnectionLost,

    /// The job vanished from both live queues without producing output
    /// or an error for longer than the configured grace period.
    #[error("generation stalled: absent from queue for {}s with no output", .0.as_secs())]
    Stalled(Duration),

    /// A workflow graph failed validation (dangling link or cycle).
    #[error("invalid workflow graph: {0}")]
    InvalidGraph(String),

    /// The input image payload could not be decoded or staged.
    #[error("invalid input image: {0}")]
    InvalidImage(String),

    /// Filesystem failure while staging inputs or reading the artifact.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
