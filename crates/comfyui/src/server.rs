//! ComfyUI server process lifecycle.
//!
//! [`ensure_running`] probes the health endpoint first and only spawns
//! a server process when nothing is listening, so it is idempotent and
//! never double-starts. The spawned child is returned inside an owned
//! [`ServerHandle`]; callers decide on every exit path whether to shut
//! the server down or detach it for reuse by the next job.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use i2v_core::error::JobError;

use crate::api::ComfyUIApi;

/// Launch and startup-poll parameters for the backing server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Python interpreter used to launch the server.
    pub python_bin: String,
    /// ComfyUI installation directory (working directory of the child).
    pub server_dir: PathBuf,
    /// Bind address passed to `--listen`.
    pub host: String,
    /// Port passed to `--port`.
    pub port: u16,
    /// Additional launch flags (performance tuning, etc.).
    pub extra_args: Vec<String>,
    /// Health poll attempts before giving up on startup.
    pub startup_attempts: u32,
    /// Delay between startup health polls.
    pub startup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            python_bin: "python".to_string(),
            server_dir: PathBuf::from("/ComfyUI"),
            host: "0.0.0.0".to_string(),
            port: 8188,
            extra_args: Vec::new(),
            startup_attempts: 30,
            startup_interval: Duration::from_secs(2),
        }
    }
}

/// Owned handle to the backing server process.
///
/// Holds the child process when this worker spawned it; a server that
/// was already running externally yields an empty handle and is never
/// killed. Dropping a handle that still owns a child kills the child,
/// so an early-exiting job cannot leak an untracked process; use
/// [`detach`](Self::detach) to intentionally leave the server running.
#[derive(Debug)]
pub struct ServerHandle {
    child: Option<Child>,
}

impl ServerHandle {
    /// Handle for a server this worker did not start.
    fn external() -> Self {
        Self { child: None }
    }

    fn spawned(child: Child) -> Self {
        Self { child: Some(child) }
    }

    /// Whether this handle owns the server process.
    pub fn is_owned(&self) -> bool {
        self.child.is_some()
    }

    /// Kill the owned server process and wait for it to exit.
    /// No-op for external servers.
    pub async fn shutdown(mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::info!("Stopping spawned server process");
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill server process");
            }
        }
    }

    /// Release ownership, leaving the server running for the next job.
    pub fn detach(mut self) {
        if self.child.take().is_some() {
            tracing::debug!("Leaving spawned server running for reuse");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Make sure a server is reachable, spawning one if necessary.
///
/// 1. Probe the health endpoint; if it answers, reuse the running
///    server.
/// 2. Otherwise launch `python main.py --listen <host> --port <port>`
///    in the server directory with stdout/stderr discarded.
/// 3. Poll the health endpoint on a fixed interval up to the retry
///    ceiling; fail with [`JobError::Startup`] if it never answers.
pub async fn ensure_running(
    api: &ComfyUIApi,
    config: &ServerConfig,
) -> Result<ServerHandle, JobError> {
    if api.system_stats().await.is_ok() {
        tracing::info!("Server already running at {}", api.api_url());
        return Ok(ServerHandle::external());
    }

    tracing::info!(
        dir = %config.server_dir.display(),
        port = config.port,
        "Server not detected, spawning",
    );

    let mut cmd = Command::new(&config.python_bin);
    cmd.arg("main.py")
        .arg("--listen")
        .arg(&config.host)
        .arg("--port")
        .arg(config.port.to_string())
        .args(&config.extra_args)
        .current_dir(&config.server_dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = cmd
        .spawn()
        .map_err(|e| JobError::Startup(format!("failed to spawn server process: {e}")))?;

    for attempt in 1..=config.startup_attempts {
        tokio::time::sleep(config.startup_interval).await;

        if api.system_stats().await.is_ok() {
            tracing::info!(attempt, "Server is ready");
            return Ok(ServerHandle::spawned(child));
        }

        tracing::debug!(
            attempt,
            max = config.startup_attempts,
            "Waiting for server startup",
        );
    }

    // Never healthy: reap the process we spawned before reporting.
    let _ = child.start_kill();
    Err(JobError::Startup(format!(
        "server not healthy after {} attempts",
        config.startup_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn startup_fails_when_nothing_listens_and_spawn_fails() {
        // Point at a dead port and a python binary that cannot exist,
        // so the spawn itself errors out.
        let api = ComfyUIApi::new("http://127.0.0.1:1".to_string());
        let config = ServerConfig {
            python_bin: "/nonexistent/python-binary".to_string(),
            server_dir: PathBuf::from("/"),
            startup_attempts: 1,
            startup_interval: Duration::from_millis(10),
            ..Default::default()
        };

        let err = ensure_running(&api, &config).await.unwrap_err();
        assert!(matches!(err, JobError::Startup(_)));
    }

    #[test]
    fn external_handle_owns_nothing() {
        let handle = ServerHandle::external();
        assert!(!handle.is_owned());
    }
}
