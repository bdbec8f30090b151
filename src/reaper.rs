//! Guaranteed removal of request-scoped uploads.

use crate::ingest::UploadedImage;
use std::io::ErrorKind;
use std::path::Path;

/// Owns an [`UploadedImage`] and deletes it when the request finishes.
///
/// Call [`UploadGuard::release`] on every nominal exit. If the guard is dropped unreleased
/// (panic, cancelled future, unexpected early return) the file is removed synchronously from
/// `Drop` instead. Either way removal happens at most once and failures are only logged.
#[derive(Debug)]
pub struct UploadGuard {
    image: Option<UploadedImage>,
}

impl UploadGuard {
    /// Take ownership of a stored upload.
    pub fn new(image: UploadedImage) -> Self {
        Self { image: Some(image) }
    }

    /// Borrow the guarded upload.
    pub fn image(&self) -> &UploadedImage {
        self.image
            .as_ref()
            .expect("upload guard holds its image until released")
    }

    /// Delete the upload and consume the guard.
    pub async fn release(mut self) {
        if let Some(image) = self.image.take() {
            match tokio::fs::remove_file(&image.path).await {
                Ok(()) => log_removed(&image.path),
                Err(error) => log_failure(&image.path, &error),
            }
        }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if let Some(image) = self.image.take() {
            tracing::debug!(path = %image.path.display(), "Removing upload from drop guard");
            match std::fs::remove_file(&image.path) {
                Ok(()) => log_removed(&image.path),
                Err(error) => log_failure(&image.path, &error),
            }
        }
    }
}

fn log_removed(path: &Path) {
    tracing::debug!(path = %path.display(), "Removed temporary upload");
}

fn log_failure(path: &Path, error: &std::io::Error) {
    if error.kind() == ErrorKind::NotFound {
        tracing::debug!(path = %path.display(), "Temporary upload already gone");
    } else {
        tracing::warn!(path = %path.display(), error = %error, "Failed to delete temporary upload");
    }
}
