//! Upload intake: pull the image part out of a multipart body and park it on disk.

use crate::reaper::UploadGuard;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Multipart field carrying the package photo.
pub const IMAGE_FIELD: &str = "medicineImage";

const FALLBACK_MIME: &str = "application/octet-stream";
const MAX_EXTENSION_LEN: usize = 8;

/// Errors raised while accepting an upload.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request carried no `medicineImage` file.
    #[error("No image file uploaded.")]
    MissingImage,
    /// More than one `medicineImage` file was supplied.
    #[error("Only one image file may be uploaded per request.")]
    MultipleImages,
    /// The image part had no content.
    #[error("The uploaded image is empty.")]
    EmptyImage,
    /// The request body exceeded the configured upload limit.
    #[error("The uploaded image is too large.")]
    TooLarge,
    /// The multipart body could not be read.
    #[error("Malformed upload: {0}")]
    Malformed(MultipartError),
    /// Writing the upload to the ephemeral directory failed.
    #[error("Failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

impl IngestError {
    /// Whether the error was caused by the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

impl From<MultipartError> for IngestError {
    fn from(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::TooLarge
        } else {
            Self::Malformed(error)
        }
    }
}

/// Image bytes received from the client, not yet persisted.
#[derive(Debug, Clone)]
pub struct IncomingImage {
    /// File name reported by the client, if any.
    pub file_name: Option<String>,
    /// Declared content type of the part, if any.
    pub content_type: Option<String>,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

/// An upload persisted to ephemeral storage, owned by a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    /// Location of the stored file.
    pub path: PathBuf,
    /// MIME type forwarded to downstream providers.
    pub mime_type: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// File name used when re-uploading to providers.
    pub file_name: String,
}

/// Read the multipart body and return the single image part.
///
/// Fields other than [`IMAGE_FIELD`] are drained and ignored.
pub async fn read_image_field(mut multipart: Multipart) -> Result<IncomingImage, IngestError> {
    let mut image: Option<IncomingImage> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        if image.is_some() {
            return Err(IngestError::MultipleImages);
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        image = Some(IncomingImage {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    let image = image.ok_or(IngestError::MissingImage)?;
    if image.bytes.is_empty() {
        return Err(IngestError::EmptyImage);
    }
    Ok(image)
}

/// Writes incoming images into a single ephemeral directory.
#[derive(Debug, Clone)]
pub struct IngestGate {
    upload_dir: PathBuf,
}

impl IngestGate {
    /// Create a gate storing files under `upload_dir`.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    /// Persist `image` under a collision-resistant name and describe the stored file.
    ///
    /// A write that fails partway leaves nothing behind in the upload directory.
    pub async fn persist(&self, image: IncomingImage) -> Result<UploadedImage, IngestError> {
        self.persist_with(image, |path, bytes| async move {
            tokio::fs::write(path, bytes).await
        })
        .await
    }

    async fn persist_with<W, Fut>(
        &self,
        image: IncomingImage,
        write: W,
    ) -> Result<UploadedImage, IngestError>
    where
        W: FnOnce(PathBuf, Vec<u8>) -> Fut,
        Fut: Future<Output = std::io::Result<()>>,
    {
        if image.bytes.is_empty() {
            return Err(IngestError::EmptyImage);
        }
        let extension = resolve_extension(image.file_name.as_deref(), image.content_type.as_deref());
        let mime_type = resolve_mime(image.content_type.as_deref(), extension.as_deref());
        let file_name = unique_file_name(extension.as_deref());
        let path = self.upload_dir.join(&file_name);

        let stored = UploadedImage {
            path: path.clone(),
            mime_type,
            size_bytes: image.bytes.len() as u64,
            file_name,
        };

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        if let Err(error) = write(path, image.bytes).await {
            tracing::warn!(path = %stored.path.display(), error = %error, "Failed to store upload");
            UploadGuard::new(stored).release().await;
            return Err(error.into());
        }

        tracing::debug!(
            path = %stored.path.display(),
            mime_type = %stored.mime_type,
            size_bytes = stored.size_bytes,
            "Stored upload"
        );
        Ok(stored)
    }
}

fn unique_file_name(extension: Option<&str>) -> String {
    let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    match extension {
        Some(ext) => format!("{millis}-{}.{ext}", &suffix[..8]),
        None => format!("{millis}-{}", &suffix[..8]),
    }
}

fn resolve_extension(file_name: Option<&str>, content_type: Option<&str>) -> Option<String> {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase);

    from_name.or_else(|| {
        let mime = content_type?.split(';').next()?.trim().to_ascii_lowercase();
        image_extension(&mime).map(str::to_string).or_else(|| {
            mime_guess::get_mime_extensions_str(&mime)
                .and_then(|extensions| extensions.first())
                .map(|ext| ext.to_string())
        })
    })
}

/// Conventional extensions for the image types OCR providers recognise.
fn image_extension(mime: &str) -> Option<&'static str> {
    let extension = match mime {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        _ => return None,
    };
    Some(extension)
}

fn resolve_mime(content_type: Option<&str>, extension: Option<&str>) -> String {
    content_type
        .map(str::trim)
        .filter(|mime| !mime.is_empty() && *mime != FALLBACK_MIME)
        .map(str::to_string)
        .or_else(|| {
            extension
                .and_then(|ext| mime_guess::from_ext(ext).first())
                .map(|mime| mime.essence_str().to_string())
        })
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming(name: Option<&str>, mime: Option<&str>, bytes: &[u8]) -> IncomingImage {
        IncomingImage {
            file_name: name.map(str::to_string),
            content_type: mime.map(str::to_string),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn persist_keeps_original_extension_and_mime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gate = IngestGate::new(dir.path());

        let stored = gate
            .persist(incoming(Some("box.JPG"), Some("image/jpeg"), b"jpeg-bytes"))
            .await
            .expect("stored");

        assert!(stored.path.starts_with(dir.path()));
        assert_eq!(stored.path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(stored.mime_type, "image/jpeg");
        assert_eq!(stored.size_bytes, 10);
        assert_eq!(std::fs::read(&stored.path).expect("read"), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn concurrent_uploads_never_share_a_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gate = IngestGate::new(dir.path());

        let first = gate
            .persist(incoming(Some("a.png"), None, b"one"))
            .await
            .expect("first");
        let second = gate
            .persist(incoming(Some("a.png"), None, b"two"))
            .await
            .expect("second");

        assert_ne!(first.path, second.path);
        assert_eq!(first.mime_type, "image/png");
    }

    #[tokio::test]
    async fn persist_rejects_empty_payload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gate = IngestGate::new(dir.path());
        let error = gate
            .persist(incoming(Some("a.png"), None, b""))
            .await
            .expect_err("empty");
        assert!(matches!(error, IngestError::EmptyImage));
        assert!(error.is_client_error());
    }

    #[test]
    fn suspicious_extensions_fall_back_to_mime() {
        assert_eq!(
            resolve_extension(Some("photo.p/ng"), Some("image/png")).as_deref(),
            Some("png")
        );
        assert_eq!(resolve_extension(Some("photo"), None), None);
        assert_eq!(resolve_mime(None, None), FALLBACK_MIME);
    }

    #[test]
    fn common_image_types_get_conventional_extensions() {
        assert_eq!(resolve_extension(None, Some("image/jpeg")).as_deref(), Some("jpg"));
        assert_eq!(
            resolve_extension(Some("blob"), Some("image/tiff; q=1")).as_deref(),
            Some("tiff")
        );
        assert_eq!(resolve_extension(None, Some("image/webp")).as_deref(), Some("webp"));
    }

    #[tokio::test]
    async fn failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gate = IngestGate::new(dir.path());

        let error = gate
            .persist_with(
                incoming(Some("box.png"), Some("image/png"), b"full image bytes"),
                |path, _bytes| async move {
                    tokio::fs::write(&path, b"full im").await?;
                    Err::<(), _>(std::io::Error::other("no space left on device"))
                },
            )
            .await
            .expect_err("write failed");

        assert!(matches!(error, IngestError::Storage(_)));
        assert!(!error.is_client_error());
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }
}
