//! Job wire contracts.
//!
//! The invoking platform sends `{"input": {...}}` and receives either
//! a success payload with the base64 video or `{"error": ...}` with
//! optional debug context. Image payloads arrive base64-encoded,
//! optionally wrapped in a data-URI header that must be stripped
//! before decoding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;

use i2v_core::error::JobError;
use i2v_core::settings::GenerationSettings;
use i2v_core::workflow::WorkflowGraph;

/// Top-level job envelope.
#[derive(Debug, Default, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub input: JobInput,
}

/// Job payload.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JobInput {
    /// Reference images to stage into the server's input directory.
    pub images: Vec<ImagePayload>,
    /// Caller-supplied workflow graph. When present the builder is
    /// bypassed and this graph is submitted (after validation).
    pub workflow: Option<WorkflowGraph>,
    /// Generation settings for the built-in workflow.
    pub settings: Option<GenerationSettings>,
    /// Force a staging clear even when no images are attached.
    pub clear_cache: bool,
}

/// One base64-encoded input image.
#[derive(Debug, Clone, Deserialize)]
pub struct ImagePayload {
    pub name: String,
    /// Base64 data, optionally prefixed with `data:image/...;base64,`.
    pub image: String,
}

impl ImagePayload {
    /// Strip any data-URI header and decode the base64 body.
    pub fn decode(&self) -> Result<Vec<u8>, JobError> {
        let data = strip_data_uri(&self.image);
        BASE64
            .decode(data)
            .map_err(|e| JobError::InvalidImage(format!("{}: {e}", self.name)))
    }
}

/// Drop a `data:image/...;base64,` prefix if present.
fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:image") {
        payload.split_once(',').map_or(payload, |(_, rest)| rest)
    } else {
        payload
    }
}

/// Result returned to the invoking platform.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JobResponse {
    Success {
        success: bool,
        video_base64: String,
        filename: String,
        resolution: String,
        duration: f64,
    },
    Failure {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        debug: Option<serde_json::Value>,
    },
}

impl JobResponse {
    pub fn success(
        video_bytes: &[u8],
        filename: String,
        width: u32,
        height: u32,
        duration: f64,
    ) -> Self {
        Self::Success {
            success: true,
            video_base64: BASE64.encode(video_bytes),
            filename,
            resolution: format!("{width}x{height}"),
            duration,
        }
    }

    pub fn failure(error: &JobError, elapsed: std::time::Duration) -> Self {
        Self::Failure {
            error: error.to_string(),
            debug: Some(json!({
                "kind": error_kind(error),
                "elapsed_secs": elapsed.as_secs(),
            })),
        }
    }

}

/// Stable variant name for the debug payload.
fn error_kind(error: &JobError) -> &'static str {
    match error {
        JobError::Startup(_) => "startup",
        JobError::MissingModel(_) => "missing_model",
        JobError::Submission(_) => "submission",
        JobError::Execution(_) => "execution",
        JobError::ArtifactMissing(_) => "artifact_missing",
        JobError::Timeout(_) => "timeout",
        JobError::ConnectionLost => "connection_lost",
        JobError::Stalled(_) => "stalled",
        JobError::InvalidGraph(_) => "invalid_graph",
        JobError::InvalidImage(_) => "invalid_image",
        JobError::Io(_) => "io",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_base64_decodes() {
        let payload = ImagePayload {
            name: "a.png".to_string(),
            image: BASE64.encode(b"hello"),
        };
        assert_eq!(payload.decode().unwrap(), b"hello");
    }

    #[test]
    fn data_uri_header_is_stripped() {
        let payload = ImagePayload {
            name: "a.png".to_string(),
            image: format!("data:image/png;base64,{}", BASE64.encode(b"hello")),
        };
        assert_eq!(payload.decode().unwrap(), b"hello");
    }

    #[test]
    fn invalid_base64_rejected() {
        let payload = ImagePayload {
            name: "a.png".to_string(),
            image: "!!! not base64 !!!".to_string(),
        };
        assert!(matches!(
            payload.decode().unwrap_err(),
            JobError::InvalidImage(_)
        ));
    }

    #[test]
    fn request_parses_with_settings_only() {
        let request: JobRequest = serde_json::from_str(
            r#"{"input": {"settings": {"resolution": "auto", "seed": -1}, "images": []}}"#,
        )
        .unwrap();
        assert!(request.input.workflow.is_none());
        assert!(request.input.settings.is_some());
    }

    #[test]
    fn success_payload_shape() {
        let response = JobResponse::success(b"video", "out.mp4".to_string(), 640, 640, 5.0);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["filename"], "out.mp4");
        assert_eq!(value["resolution"], "640x640");
        assert_eq!(value["video_base64"], BASE64.encode(b"video"));
    }

    #[test]
    fn failure_payload_shape() {
        let err = JobError::Timeout(std::time::Duration::from_secs(600));
        let response = JobResponse::failure(&err, std::time::Duration::from_secs(601));
        let value = serde_json::to_value(&response).unwrap();
        assert!(value["error"].as_str().unwrap().contains("timed out"));
        assert_eq!(value["debug"]["kind"], "timeout");
        assert!(value.get("success").is_none());
    }
}
