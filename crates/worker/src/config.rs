//! Worker configuration.
//!
//! Everything is environment-driven with defaults matching a standard
//! ComfyUI installation at `/ComfyUI`, so the worker runs unconfigured
//! inside the usual container image. Polling cadence, the stuck grace
//! period, and the job timeout are deliberately configuration rather
//! than constants.

use std::path::PathBuf;
use std::time::Duration;

use i2v_comfyui::builder;
use i2v_comfyui::poller::PollConfig;
use i2v_comfyui::server::ServerConfig;

/// Fully resolved worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base HTTP URL of the render server.
    pub api_url: String,
    /// Server launch parameters.
    pub server: ServerConfig,
    /// Directory the server loads input images from.
    pub input_dir: PathBuf,
    /// Directory the server writes artifacts to.
    pub output_dir: PathBuf,
    /// Model files that must exist before any server interaction.
    pub required_models: Vec<PathBuf>,
    /// Wall-clock budget for one job.
    pub job_timeout: Duration,
    /// Sleep between poll ticks.
    pub poll_interval: Duration,
    /// Idle duration after which a queue-absent job is stalled.
    pub stuck_grace: Duration,
    /// Kill a server this worker spawned once the job ends, instead of
    /// leaving it warm for the next invocation.
    pub stop_server_on_exit: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        let server_dir = server.server_dir.clone();
        Self {
            api_url: "http://127.0.0.1:8188".to_string(),
            input_dir: server_dir.join("input"),
            output_dir: server_dir.join("output"),
            required_models: default_model_paths(&server_dir),
            server,
            job_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(3),
            stuck_grace: Duration::from_secs(60),
            stop_server_on_exit: false,
        }
    }
}

/// The model files the standard workflow loads.
fn default_model_paths(server_dir: &std::path::Path) -> Vec<PathBuf> {
    vec![
        server_dir.join("models/checkpoints").join(builder::CHECKPOINT_FILE),
        server_dir.join("models/clip_vision").join(builder::CLIP_VISION_FILE),
        server_dir.join("models/vae").join(builder::VAE_FILE),
    ]
}

impl WorkerConfig {
    /// Read configuration from the environment, falling back to
    /// defaults field by field.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("COMFYUI_DIR") {
            let dir = PathBuf::from(dir);
            config.input_dir = dir.join("input");
            config.output_dir = dir.join("output");
            config.required_models = default_model_paths(&dir);
            config.server.server_dir = dir;
        }
        if let Ok(url) = std::env::var("COMFYUI_API_URL") {
            config.api_url = url;
        }
        if let Ok(python) = std::env::var("COMFYUI_PYTHON") {
            config.server.python_bin = python;
        }
        if let Ok(dir) = std::env::var("COMFYUI_INPUT_DIR") {
            config.input_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("COMFYUI_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(models) = std::env::var("REQUIRED_MODELS") {
            // Comma-separated; an explicitly empty value disables the check.
            config.required_models = models
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        config.job_timeout = env_secs("JOB_TIMEOUT_SECS", config.job_timeout);
        config.poll_interval = env_secs("POLL_INTERVAL_SECS", config.poll_interval);
        config.stuck_grace = env_secs("STUCK_GRACE_SECS", config.stuck_grace);
        config.server.startup_interval =
            env_secs("STARTUP_INTERVAL_SECS", config.server.startup_interval);

        if let Ok(attempts) = std::env::var("STARTUP_ATTEMPTS") {
            match attempts.parse() {
                Ok(n) => config.server.startup_attempts = n,
                Err(_) => tracing::warn!(value = %attempts, "Ignoring invalid STARTUP_ATTEMPTS"),
            }
        }
        if let Ok(flag) = std::env::var("STOP_SERVER_ON_EXIT") {
            config.stop_server_on_exit = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Poll parameters for the completion wait.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            max_wait: self.job_timeout,
            poll_interval: self.poll_interval,
            stuck_grace: self.stuck_grace,
            ..PollConfig::default()
        }
    }
}

/// Parse a whole-seconds duration from the environment.
fn env_secs(var: &str, default: Duration) -> Duration {
    match std::env::var(var) {
        Ok(value) => match value.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                tracing::warn!(var, value = %value, "Ignoring invalid duration");
                default
            }
        },
        Err(_) => default,
    }
}
