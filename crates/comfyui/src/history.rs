//! Typed views over `/history/{prompt_id}` responses.
//!
//! ComfyUI history is loosely shaped JSON keyed by prompt id. This
//! module extracts the three things the poller cares about: whether
//! the entry exists, whether it carries an error status (and the
//! server's error detail), and any embedded video output references.

use serde::Deserialize;

/// One finished (or failed) prompt's history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: Option<HistoryStatus>,
    /// Node outputs keyed by node id.
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
}

/// Status block of a history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    /// Raw server messages, e.g. `["execution_error", {...}]`.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

/// A video artifact reference embedded in node outputs.
///
/// The video-combine node reports its files under `gifs` (historical
/// name) or `videos` depending on version; both carry a filename and
/// an optional subfolder relative to the output directory.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
}

/// Find the history record for `prompt_id` in a raw `/history/{id}`
/// response. `None` means the job has not finished yet.
pub fn lookup(raw: &serde_json::Value, prompt_id: &str) -> Option<HistoryEntry> {
    let entry = raw.get(prompt_id)?;
    match serde_json::from_value(entry.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(prompt_id, error = %e, "Unparseable history entry");
            None
        }
    }
}

impl HistoryEntry {
    /// Whether the server recorded this prompt as failed.
    pub fn is_error(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.status_str.as_deref())
            .is_some_and(|s| s == "error")
    }

    /// Server-reported error detail, if any.
    ///
    /// Prefers the `exception_message` of an `execution_error` status
    /// message; falls back to the bare status string.
    pub fn error_detail(&self) -> Option<String> {
        let status = self.status.as_ref()?;

        for message in &status.messages {
            let kind = message.get(0).and_then(|k| k.as_str());
            if kind == Some("execution_error") {
                if let Some(detail) = message
                    .get(1)
                    .and_then(|d| d.get("exception_message"))
                    .and_then(|m| m.as_str())
                {
                    return Some(detail.to_string());
                }
            }
        }

        if self.is_error() {
            return Some(
                status
                    .status_str
                    .clone()
                    .unwrap_or_else(|| "execution error".to_string()),
            );
        }

        None
    }

    /// All embedded video references across node outputs.
    pub fn video_references(&self) -> Vec<VideoRef> {
        video_references(&self.outputs)
    }
}

/// Scan a node-outputs map for video references.
pub fn video_references(outputs: &serde_json::Map<String, serde_json::Value>) -> Vec<VideoRef> {
    let mut refs = Vec::new();

    for output in outputs.values() {
        for key in ["videos", "gifs"] {
            let Some(entries) = output.get(key).and_then(|v| v.as_array()) else {
                continue;
            };
            for entry in entries {
                match serde_json::from_value::<VideoRef>(entry.clone()) {
                    Ok(video) => refs.push(video),
                    Err(e) => tracing::debug!(error = %e, "Skipping malformed video reference"),
                }
            }
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_prompt_id_is_none() {
        let raw = json!({});
        assert!(lookup(&raw, "abc").is_none());
    }

    #[test]
    fn present_entry_parses() {
        let raw = json!({
            "abc": {
                "status": {"status_str": "success", "completed": true, "messages": []},
                "outputs": {},
            }
        });
        let entry = lookup(&raw, "abc").unwrap();
        assert!(!entry.is_error());
        assert!(entry.error_detail().is_none());
    }

    #[test]
    fn error_status_detected() {
        let raw = json!({
            "abc": {
                "status": {"status_str": "error", "completed": false, "messages": []},
                "outputs": {},
            }
        });
        let entry = lookup(&raw, "abc").unwrap();
        assert!(entry.is_error());
        assert_eq!(entry.error_detail().unwrap(), "error");
    }

    #[test]
    fn error_detail_extracted_from_messages() {
        let raw = json!({
            "abc": {
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", {"prompt_id": "abc"}],
                        ["execution_error", {
                            "node_id": "9",
                            "exception_message": "CUDA out of memory",
                            "exception_type": "OutOfMemoryError",
                        }],
                    ],
                },
                "outputs": {},
            }
        });
        let entry = lookup(&raw, "abc").unwrap();
        assert_eq!(entry.error_detail().unwrap(), "CUDA out of memory");
    }

    #[test]
    fn video_references_from_both_keys() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "outputs": {
                "11": {"gifs": [{"filename": "a_I2V_00001.mp4", "subfolder": "video"}]},
                "12": {"videos": [{"filename": "b.mp4"}]},
                "13": {"images": [{"filename": "ignored.png"}]},
            }
        }))
        .unwrap();

        let refs = entry.video_references();
        assert_eq!(refs.len(), 2);
        let names: Vec<_> = refs.iter().map(|r| r.filename.as_str()).collect();
        assert!(names.contains(&"a_I2V_00001.mp4"));
        assert!(names.contains(&"b.mp4"));
    }

    #[test]
    fn entry_without_status_is_not_error() {
        let entry: HistoryEntry = serde_json::from_value(json!({"outputs": {}})).unwrap();
        assert!(!entry.is_error());
        assert!(entry.error_detail().is_none());
    }
}
