//! Input image staging.
//!
//! The server loads input images by bare filename from a single input
//! directory, and image-load nodes cache aggressively, so the
//! directory is cleared before each job's images are written. At most
//! one job's inputs are resident at a time; [`InputStaging`] makes
//! that clear-then-write sequence an explicit per-job handle instead
//! of scattered filesystem calls.

use std::path::{Path, PathBuf};

use i2v_core::error::JobError;

/// Per-job handle over the server's input directory.
#[derive(Debug, Clone)]
pub struct InputStaging {
    dir: PathBuf,
}

impl InputStaging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove everything staged by previous jobs and recreate the
    /// directory.
    pub async fn clear(&self) -> Result<(), JobError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        tracing::debug!(dir = %self.dir.display(), "Input directory cleared");
        Ok(())
    }

    /// Clear the directory, then write each image. Returns the staged
    /// filenames in order.
    pub async fn stage_all(&self, images: &[(String, Vec<u8>)]) -> Result<Vec<String>, JobError> {
        self.clear().await?;

        let mut staged = Vec::with_capacity(images.len());
        for (name, bytes) in images {
            staged.push(self.write(name, bytes).await?);
        }
        Ok(staged)
    }

    /// Write one image into the staging directory.
    ///
    /// The name is reduced to its final path component so a payload
    /// cannot escape the input directory.
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<String, JobError> {
        let filename = Path::new(name)
            .file_name()
            .and_then(|f| f.to_str())
            .filter(|f| !f.is_empty() && *f != "." && *f != "..")
            .ok_or_else(|| JobError::InvalidImage(format!("unusable image name: {name:?}")))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(
            path = %path.display(),
            bytes = bytes.len(),
            "Staged input image",
        );
        Ok(filename.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stage_all_clears_previous_residents() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = InputStaging::new(tmp.path().join("input"));

        staging
            .stage_all(&[("old.png".to_string(), vec![1, 2, 3])])
            .await
            .unwrap();
        assert!(staging.dir().join("old.png").exists());

        staging
            .stage_all(&[("new.png".to_string(), vec![4, 5])])
            .await
            .unwrap();
        assert!(!staging.dir().join("old.png").exists());
        assert!(staging.dir().join("new.png").exists());
    }

    #[tokio::test]
    async fn clear_with_no_images_leaves_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = InputStaging::new(tmp.path().join("input"));

        staging
            .stage_all(&[("a.png".to_string(), vec![0])])
            .await
            .unwrap();
        staging.stage_all(&[]).await.unwrap();

        assert!(staging.dir().exists());
        assert_eq!(std::fs::read_dir(staging.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn traversal_components_are_stripped() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = InputStaging::new(tmp.path().join("input"));

        let staged = staging
            .stage_all(&[("../../escape.png".to_string(), vec![0])])
            .await
            .unwrap();

        assert_eq!(staged, vec!["escape.png".to_string()]);
        assert!(staging.dir().join("escape.png").exists());
        assert!(!tmp.path().join("escape.png").exists());
    }

    #[tokio::test]
    async fn unusable_name_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = InputStaging::new(tmp.path().join("input"));

        let err = staging
            .stage_all(&[("..".to_string(), vec![0])])
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidImage(_)));
    }
}
