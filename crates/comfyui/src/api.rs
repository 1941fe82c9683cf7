//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the surface this worker consumes (health probe, workflow
//! submission, history retrieval, live queue inspection, queue clear,
//! memory release) using [`reqwest`].

use std::time::Duration;

use serde::Deserialize;

/// Timeout applied to health probes so a wedged server is detected
/// quickly instead of hanging a poll tick.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i32,
}

/// Snapshot of the server's live execution queue.
///
/// Queue entries are positional arrays; element 1 is the prompt id.
#[derive(Debug, Default, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_running: Vec<serde_json::Value>,
    #[serde(default)]
    pub queue_pending: Vec<serde_json::Value>,
}

impl QueueSnapshot {
    pub fn is_running(&self, prompt_id: &str) -> bool {
        self.queue_running
            .iter()
            .any(|e| entry_prompt_id(e) == Some(prompt_id))
    }

    pub fn is_pending(&self, prompt_id: &str) -> bool {
        self.queue_pending
            .iter()
            .any(|e| entry_prompt_id(e) == Some(prompt_id))
    }

    /// Whether the prompt appears in either queue.
    pub fn contains(&self, prompt_id: &str) -> bool {
        self.is_running(prompt_id) || self.is_pending(prompt_id)
    }
}

/// Extract the prompt id from a positional queue entry.
fn entry_prompt_id(entry: &serde_json::Value) -> Option<&str> {
    entry.get(1)?.as_str()
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Base HTTP API URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Health probe. `Ok(())` means the server answered `GET
    /// /system_stats` with a success status within the probe timeout.
    pub async fn system_stats(&self) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/system_stats", self.api_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// client ID. Returns the server-assigned `prompt_id` and queue
    /// position.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. The returned JSON is
    /// keyed by prompt id; an absent key means the job has not finished.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the live execution queue.
    pub async fn get_queue(&self) -> Result<QueueSnapshot, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/queue", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Clear the server's pending queue. Best-effort cleanup.
    pub async fn clear_queue(&self) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({ "clear": true });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Ask the server to unload models and release memory. Best-effort
    /// cleanup after a job.
    pub async fn free_memory(&self) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "unload_models": true,
            "free_memory": true,
        });

        let response = self
            .client
            .post(format!("{}/free", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queue_membership_over_positional_entries() {
        let snapshot: QueueSnapshot = serde_json::from_value(json!({
            "queue_running": [[0, "abc-123", {}]],
            "queue_pending": [[1, "def-456", {}]],
        }))
        .unwrap();

        assert!(snapshot.is_running("abc-123"));
        assert!(!snapshot.is_pending("abc-123"));
        assert!(snapshot.is_pending("def-456"));
        assert!(snapshot.contains("abc-123"));
        assert!(snapshot.contains("def-456"));
        assert!(!snapshot.contains("nope"));
    }

    #[test]
    fn queue_tolerates_missing_fields() {
        let snapshot: QueueSnapshot = serde_json::from_value(json!({})).unwrap();
        assert!(!snapshot.contains("anything"));
    }

    #[test]
    fn queue_tolerates_malformed_entries() {
        let snapshot: QueueSnapshot = serde_json::from_value(json!({
            "queue_running": [[], "not-an-array", [0]],
            "queue_pending": [],
        }))
        .unwrap();
        assert!(!snapshot.contains("abc"));
    }
}
