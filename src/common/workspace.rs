use crate::common::error::Result;
use chrono::Utc;
use image::DynamicImage;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

/// Scratch directory for a single request. Every request gets its own
/// directory so concurrent invocations can never overwrite each other's
/// temp images. Removed, with its contents, on drop.
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn create(root: &Path) -> Result<Self> {
        let suffix: u16 = rand::thread_rng().gen();
        let dir = root.join(format!(
            "facecheck-req-{}-{:04x}",
            Utc::now().timestamp_millis(),
            suffix
        ));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an image into the workspace under the given file name and
    /// return its path. Converts to RGB first since the engine reads
    /// JPEG files.
    pub fn persist(&self, image: &DynamicImage, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        DynamicImage::ImageRgb8(image.to_rgb8()).save(&path)?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            tracing::debug!("Failed to remove workspace {:?}: {}", self.dir, e);
        }
    }
}
