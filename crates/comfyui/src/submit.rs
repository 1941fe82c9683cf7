//! Workflow submission.
//!
//! Validates the graph (caller-supplied graphs included), generates a
//! fresh correlation id per call, and exchanges the graph for the
//! server's opaque prompt id, the sole key used by all later polling.

use i2v_core::error::JobError;
use i2v_core::workflow::WorkflowGraph;

use crate::api::ComfyUIApi;

/// Submit a workflow and return the server-assigned prompt id.
pub async fn submit(api: &ComfyUIApi, graph: &WorkflowGraph) -> Result<String, JobError> {
    graph.validate()?;

    let client_id = uuid::Uuid::new_v4().to_string();
    let workflow_json = serde_json::to_value(graph)
        .map_err(|e| JobError::Submission(format!("unserializable workflow: {e}")))?;

    let response = api
        .submit_workflow(&workflow_json, &client_id)
        .await
        .map_err(|e| JobError::Submission(e.to_string()))?;

    tracing::info!(
        prompt_id = %response.prompt_id,
        client_id = %client_id,
        queue_position = response.number,
        "Workflow queued",
    );

    Ok(response.prompt_id)
}
