//! Artifact discovery.
//!
//! The server does not reliably echo where it wrote the video, so
//! discovery is a cascade of strategies, each tried only when the
//! previous finds nothing: the history's embedded file reference, then
//! a prefix match over the output directory (and its `video/`
//! subdirectory), then any file with a known video extension anywhere
//! under the output tree. Whenever more than one file qualifies, the
//! newest modification time wins; mtime is the only signal tying a
//! file to the job that just finished.

use std::path::{Path, PathBuf};

use crate::history;

/// Extensions recognized as video artifacts.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];

/// Locates the video produced by one job.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    output_dir: PathBuf,
    filename_prefix: Option<String>,
}

impl ArtifactLocator {
    /// * `filename_prefix` - the prefix given to the video-combine
    ///   node, when this worker built the workflow. Caller-supplied
    ///   graphs have no known prefix and skip that tier.
    pub fn new(output_dir: impl Into<PathBuf>, filename_prefix: Option<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            filename_prefix,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Run the strategy cascade. `None` means the job's artifact could
    /// not be found anywhere; callers treat that as terminal.
    pub fn locate(&self, outputs: &serde_json::Map<String, serde_json::Value>) -> Option<PathBuf> {
        let found = self
            .from_outputs(outputs)
            .or_else(|| self.by_prefix())
            .or_else(|| self.by_extension());

        match &found {
            Some(path) => tracing::info!(path = %path.display(), "Artifact located"),
            None => tracing::warn!(
                dir = %self.output_dir.display(),
                "No artifact found by any strategy",
            ),
        }
        found
    }

    /// Tier 1: embedded video references in the job's node outputs,
    /// verified to exist on disk.
    pub fn from_outputs(
        &self,
        outputs: &serde_json::Map<String, serde_json::Value>,
    ) -> Option<PathBuf> {
        let candidates: Vec<PathBuf> = history::video_references(outputs)
            .into_iter()
            .map(|video| {
                if video.subfolder.is_empty() {
                    self.output_dir.join(&video.filename)
                } else {
                    self.output_dir.join(&video.subfolder).join(&video.filename)
                }
            })
            .filter(|path| path.is_file())
            .collect();

        newest(candidates)
    }

    /// Tier 2: files matching the submission filename prefix in the
    /// output directory or its `video/` subdirectory.
    pub fn by_prefix(&self) -> Option<PathBuf> {
        let prefix = self.filename_prefix.as_deref()?;

        let mut candidates = Vec::new();
        for dir in [self.output_dir.join("video"), self.output_dir.clone()] {
            candidates.extend(files_in(&dir).into_iter().filter(|path| {
                has_video_extension(path)
                    && path
                        .file_name()
                        .and_then(|f| f.to_str())
                        .is_some_and(|f| f.starts_with(prefix))
            }));
        }

        newest(candidates)
    }

    /// Tier 3: any video file anywhere under the output directory.
    pub fn by_extension(&self) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        let mut pending = vec![self.output_dir.clone()];

        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if has_video_extension(&path) {
                    candidates.push(path);
                }
            }
        }

        newest(candidates)
    }
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VIDEO_EXTENSIONS.iter().any(|v| e.eq_ignore_ascii_case(v)))
}

/// Non-recursive directory listing, empty when unreadable.
fn files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect()
}

/// Pick the candidate with the latest modification time.
fn newest(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().max_by_key(|path| {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    })
}
