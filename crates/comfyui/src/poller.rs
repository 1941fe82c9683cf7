//! Completion polling.
//!
//! The server offers no push notification and only coarse status: a
//! job is either present in history (finished, successfully or not) or
//! absent. The poller synthesizes the remaining signals itself: one
//! consolidated read per tick (health, history, live queues) collapsed
//! into an explicit [`JobState`], with "stalled" defined by a single
//! idle-duration threshold and "connection lost" by the health probe
//! failing mid-poll.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use i2v_core::error::JobError;

use crate::api::ComfyUIApi;
use crate::artifact::ArtifactLocator;
use crate::history;

/// Polling cadence and patience knobs. All of these are deployment
/// configuration, not contracts.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wall-clock budget for the whole wait.
    pub max_wait: Duration,
    /// Sleep between ticks.
    pub poll_interval: Duration,
    /// How long a job may be absent from both live queues, with no
    /// history entry, before it is declared stalled.
    pub stuck_grace: Duration,
    /// Extra ticks allowed for the artifact to appear on disk after
    /// history reports completion.
    pub artifact_settle_attempts: u32,
    /// Probe the health endpoint each tick and fail fast when the
    /// server stops answering.
    pub check_health: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(600),
            poll_interval: Duration::from_secs(3),
            stuck_grace: Duration::from_secs(60),
            artifact_settle_attempts: 2,
            check_health: true,
        }
    }
}

/// Job state as assessed by one poll tick.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    /// Waiting in the server's pending queue.
    Queued,
    /// Actively executing.
    Running,
    /// Not in history, not in either queue, still within grace.
    Waiting,
    /// History reports completion; artifact not on disk yet.
    Finishing,
    /// Artifact located.
    Succeeded(PathBuf),
    /// Server reported an execution error.
    Failed(String),
    /// Completed per history, but no artifact after all settle ticks.
    ArtifactMissing,
    /// Absent everywhere for longer than the grace period.
    Stalled,
}

/// Poll until the job resolves or the wall clock runs out.
pub async fn await_result(
    api: &ComfyUIApi,
    prompt_id: &str,
    locator: &ArtifactLocator,
    config: &PollConfig,
) -> Result<PathBuf, JobError> {
    let started = Instant::now();
    let mut last_active = Instant::now();
    let mut settle_used = 0u32;
    let mut previous: Option<JobState> = None;

    loop {
        if started.elapsed() >= config.max_wait {
            tracing::error!(
                prompt_id,
                waited_secs = started.elapsed().as_secs(),
                "Job did not resolve in time",
            );
            return Err(JobError::Timeout(config.max_wait));
        }

        let state = poll_once(api, prompt_id, locator, &mut last_active, &mut settle_used, config)
            .await?;

        if previous.as_ref() != Some(&state) {
            tracing::debug!(prompt_id, ?state, "Job state");
        }

        match state {
            JobState::Succeeded(path) => {
                tracing::info!(
                    prompt_id,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Job completed",
                );
                return Ok(path);
            }
            JobState::Failed(reason) => {
                tracing::error!(prompt_id, %reason, "Job failed on the server");
                return Err(JobError::Execution(reason));
            }
            JobState::ArtifactMissing => {
                return Err(JobError::ArtifactMissing(locator.output_dir().to_path_buf()));
            }
            JobState::Stalled => {
                tracing::error!(
                    prompt_id,
                    idle_secs = config.stuck_grace.as_secs(),
                    "Job vanished from the queue without output",
                );
                return Err(JobError::Stalled(config.stuck_grace));
            }
            JobState::Queued | JobState::Running | JobState::Waiting | JobState::Finishing => {}
        }

        previous = Some(state);
        tokio::time::sleep(config.poll_interval).await;
    }
}

/// One consolidated status read.
async fn poll_once(
    api: &ComfyUIApi,
    prompt_id: &str,
    locator: &ArtifactLocator,
    last_active: &mut Instant,
    settle_used: &mut u32,
    config: &PollConfig,
) -> Result<JobState, JobError> {
    if config.check_health && api.system_stats().await.is_err() {
        tracing::error!(prompt_id, "Health probe failed mid-poll");
        return Err(JobError::ConnectionLost);
    }

    // History first: presence means the server is done with the job,
    // one way or the other.
    match api.get_history(prompt_id).await {
        Ok(raw) => {
            if let Some(entry) = history::lookup(&raw, prompt_id) {
                if entry.is_error() {
                    let reason = entry
                        .error_detail()
                        .unwrap_or_else(|| "execution error".to_string());
                    return Ok(JobState::Failed(reason));
                }

                if let Some(path) = locator.locate(&entry.outputs) {
                    return Ok(JobState::Succeeded(path));
                }

                *settle_used += 1;
                if *settle_used > config.artifact_settle_attempts {
                    return Ok(JobState::ArtifactMissing);
                }
                return Ok(JobState::Finishing);
            }
        }
        Err(e) => {
            // Transient history failures are tolerated; the health
            // probe above decides when the connection is gone.
            tracing::warn!(prompt_id, error = %e, "History query failed");
            return Ok(JobState::Waiting);
        }
    }

    // Not finished: consult the live queues to distinguish progress
    // from a silent disappearance.
    match api.get_queue().await {
        Ok(queue) => {
            if queue.is_running(prompt_id) {
                *last_active = Instant::now();
                return Ok(JobState::Running);
            }
            if queue.is_pending(prompt_id) {
                *last_active = Instant::now();
                return Ok(JobState::Queued);
            }
        }
        Err(e) => {
            tracing::warn!(prompt_id, error = %e, "Queue query failed");
            return Ok(JobState::Waiting);
        }
    }

    if last_active.elapsed() > config.stuck_grace {
        // A job can finish and leave the queue before its history entry
        // lands; an artifact already on disk still counts as success.
        if let Some(path) = locator.locate(&serde_json::Map::new()) {
            return Ok(JobState::Succeeded(path));
        }
        return Ok(JobState::Stalled);
    }

    Ok(JobState::Waiting)
}
