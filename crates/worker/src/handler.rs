//! Top-level job handler.
//!
//! Runs the whole lifecycle for one job: model check, server startup,
//! input staging, workflow construction or validation, submission,
//! completion polling, artifact encoding. Cleanup (clearing the remote
//! queue and asking the server to release memory) runs after every
//! job, success or failure, and its own failures are swallowed.

use std::path::PathBuf;
use std::time::Instant;

use i2v_comfyui::api::ComfyUIApi;
use i2v_comfyui::artifact::ArtifactLocator;
use i2v_comfyui::builder;
use i2v_comfyui::poller;
use i2v_comfyui::server;
use i2v_comfyui::staging::InputStaging;
use i2v_comfyui::submit;
use i2v_core::error::JobError;
use i2v_core::settings::GenerationSettings;
use i2v_core::workflow::WorkflowGraph;

use crate::config::WorkerConfig;
use crate::job::{JobRequest, JobResponse};

/// Run one job end to end, converting every failure into a structured
/// error payload.
pub async fn run_job(config: &WorkerConfig, request: JobRequest) -> JobResponse {
    let started = Instant::now();
    let api = ComfyUIApi::new(config.api_url.clone());

    if let Err(e) = check_models(&config.required_models) {
        tracing::error!(error = %e, "Job rejected before server startup");
        return JobResponse::failure(&e, started.elapsed());
    }

    let server = match server::ensure_running(&api, &config.server).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Server unavailable");
            return JobResponse::failure(&e, started.elapsed());
        }
    };

    let result = execute(config, &api, request).await;

    // Best-effort cleanup on every path: the next job should find an
    // empty queue and as much free memory as the server will give up.
    cleanup(&api).await;

    if config.stop_server_on_exit {
        server.shutdown().await;
    } else {
        server.detach();
    }

    match result {
        Ok(output) => {
            tracing::info!(
                filename = %output.filename,
                elapsed_secs = started.elapsed().as_secs(),
                "Job succeeded",
            );
            JobResponse::success(
                &output.video_bytes,
                output.filename,
                output.width,
                output.height,
                output.duration,
            )
        }
        Err(e) => {
            tracing::error!(error = %e, elapsed_secs = started.elapsed().as_secs(), "Job failed");
            JobResponse::failure(&e, started.elapsed())
        }
    }
}

/// Everything the success payload needs.
struct JobOutput {
    video_bytes: Vec<u8>,
    filename: String,
    width: u32,
    height: u32,
    duration: f64,
}

async fn execute(
    config: &WorkerConfig,
    api: &ComfyUIApi,
    request: JobRequest,
) -> Result<JobOutput, JobError> {
    let input = request.input;
    let settings = input.settings.unwrap_or_default();

    // Decode all image payloads up front so a bad one fails before any
    // filesystem mutation.
    let mut decoded: Vec<(String, Vec<u8>)> = Vec::with_capacity(input.images.len());
    for image in &input.images {
        decoded.push((image.name.clone(), image.decode()?));
    }

    let staging = InputStaging::new(&config.input_dir);
    let staged_names = if !decoded.is_empty() || input.clear_cache {
        staging.stage_all(&decoded).await?
    } else {
        Vec::new()
    };

    let (graph, prefix, width, height) = match input.workflow {
        Some(graph) => prepare_caller_graph(graph, &settings)?,
        None => {
            let (name, bytes) = decoded
                .first()
                .ok_or_else(|| JobError::InvalidImage("no input image provided".to_string()))?;
            let staged_name = staged_names.first().cloned().unwrap_or_else(|| name.clone());
            let built = builder::build(&staged_name, &settings, Some(bytes.as_slice()));
            (
                built.graph,
                Some(built.filename_prefix),
                built.width,
                built.height,
            )
        }
    };

    let prompt_id = submit::submit(api, &graph).await?;

    let locator = ArtifactLocator::new(&config.output_dir, prefix);
    let artifact = poller::await_result(api, &prompt_id, &locator, &config.poll_config()).await?;

    let video_bytes = tokio::fs::read(&artifact).await?;
    let filename = artifact
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("output.mp4")
        .to_string();

    Ok(JobOutput {
        video_bytes,
        filename,
        width,
        height,
        duration: settings.duration,
    })
}

/// Validate a caller-supplied graph and derive what the response needs
/// from the settings (the graph itself is trusted verbatim).
fn prepare_caller_graph(
    graph: WorkflowGraph,
    settings: &GenerationSettings,
) -> Result<(WorkflowGraph, Option<String>, u32, u32), JobError> {
    graph.validate()?;
    let (width, height) =
        i2v_core::resolution::resolve_dimensions(settings.resolution, None);
    Ok((graph, None, width, height))
}

/// Fail fast when a required model file is absent.
fn check_models(paths: &[PathBuf]) -> Result<(), JobError> {
    for path in paths {
        if !path.is_file() {
            return Err(JobError::MissingModel(path.clone()));
        }
    }
    Ok(())
}

/// Clear the remote queue and ask for memory back. Failures are logged
/// and swallowed; they never affect the reported job outcome.
async fn cleanup(api: &ComfyUIApi) {
    if let Err(e) = api.clear_queue().await {
        tracing::debug!(error = %e, "Queue clear failed (ignored)");
    }
    if let Err(e) = api.free_memory().await {
        tracing::debug!(error = %e, "Memory release failed (ignored)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_detected() {
        let missing = PathBuf::from("/definitely/not/here.safetensors");
        let err = check_models(std::slice::from_ref(&missing)).unwrap_err();
        assert!(matches!(err, JobError::MissingModel(p) if p == missing));
    }

    #[test]
    fn empty_model_list_passes() {
        assert!(check_models(&[]).is_ok());
    }
}
