//! Image hosting.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use shelf_kernel::settings::SignatureAlgorithm;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media configuration: {0}")]
    Config(String),

    #[error("image file I/O failed")]
    Io(#[from] std::io::Error),

    #[error("image host request failed")]
    Http(#[from] reqwest::Error),

    #[error("image host rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Where an uploaded image ended up
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostedImage {
    pub secure_url: String,
    pub public_id: String,
}

/// Upload received from a client, parked on local disk until it has been
/// handed to an [`ImageHost`]. The file is removed when this value drops.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    file_name: String,
    content_type: Option<String>,
}

impl StagedFile {
    /// Write `bytes` under `dir` with a generated name that keeps the
    /// client's extension.
    pub async fn write(
        dir: impl AsRef<Path>,
        original_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Self, MediaError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let extension = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase);
        let file_name = match extension {
            Some(ext) => format!("{}.{ext}", Uuid::now_v7()),
            None => Uuid::now_v7().to_string(),
        };

        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes).await?;

        Ok(Self {
            path,
            file_name,
            content_type: content_type.map(str::to_string),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove staged upload")
            }
        }
    }
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, file: &StagedFile) -> Result<HostedImage, MediaError>;
}

/// Cloudinary signed upload API
pub struct CloudinaryHost {
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
    api_secret: String,
    algorithm: SignatureAlgorithm,
}

impl CloudinaryHost {
    pub fn new(
        client: reqwest::Client,
        cloud_name: &str,
        api_key: &str,
        api_secret: &str,
        algorithm: SignatureAlgorithm,
    ) -> Self {
        Self {
            client,
            upload_url: format!("https://api.cloudinary.com/v1_1/{cloud_name}/auto/upload"),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            algorithm,
        }
    }

    /// Hex digest over the signed parameters followed by the secret.
    pub(crate) fn signature(&self, timestamp: i64) -> String {
        let payload = format!("timestamp={timestamp}{}", self.api_secret);
        match self.algorithm {
            SignatureAlgorithm::Sha1 => hex::encode(Sha1::digest(payload.as_bytes())),
            SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(payload.as_bytes())),
        }
    }
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, file: &StagedFile) -> Result<HostedImage, MediaError> {
        let bytes = tokio::fs::read(file.path()).await?;
        let mut part = reqwest::multipart::Part::bytes(bytes).file_name(file.file_name().to_string());
        if let Some(content_type) = file.content_type() {
            part = part.mime_str(content_type)?;
        }

        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature", self.signature(timestamp));
        if self.algorithm == SignatureAlgorithm::Sha256 {
            form = form.text("signature_algorithm", "sha256");
        }

        let response = self.client.post(&self.upload_url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let image: HostedImage = response.json().await?;
        tracing::debug!(public_id = %image.public_id, "image uploaded to cloudinary");
        Ok(image)
    }
}

/// Copies uploads into a directory this process serves statically.
pub struct LocalImageHost {
    dir: PathBuf,
    base_url: String,
}

impl LocalImageHost {
    pub fn new(dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageHost for LocalImageHost {
    async fn upload(&self, file: &StagedFile) -> Result<HostedImage, MediaError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::copy(file.path(), self.dir.join(file.file_name())).await?;

        Ok(HostedImage {
            secure_url: format!("{}/{}", self.base_url, file.file_name()),
            public_id: file.file_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedFile::write(dir.path(), Some("cover.PNG"), Some("image/png"), b"png")
            .await
            .unwrap();
        let path = staged.path().to_path_buf();

        assert!(path.exists());
        assert!(staged.file_name().ends_with(".png"));
        assert_eq!(staged.content_type(), Some("image/png"));

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn staged_file_drops_suspicious_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedFile::write(dir.path(), Some("../../x.p/ng"), None, b"x")
            .await
            .unwrap();
        assert!(!staged.file_name().contains('.'));
        assert_eq!(staged.path().parent(), Some(dir.path()));
    }

    #[tokio::test]
    async fn local_host_copies_and_builds_url() {
        let staging = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let host = LocalImageHost::new(uploads.path(), "http://localhost:8080/static/uploads/");

        let staged = StagedFile::write(staging.path(), Some("dune.jpg"), None, b"cover")
            .await
            .unwrap();
        let image = host.upload(&staged).await.unwrap();

        assert_eq!(
            image.secure_url,
            format!("http://localhost:8080/static/uploads/{}", staged.file_name())
        );
        let stored = std::fs::read(uploads.path().join(&image.public_id)).unwrap();
        assert_eq!(stored, b"cover");
    }

    fn cloudinary(algorithm: SignatureAlgorithm) -> CloudinaryHost {
        CloudinaryHost::new(reqwest::Client::new(), "demo", "key", "shh-secret", algorithm)
    }

    #[test]
    fn cloudinary_signs_with_sha1_by_default() {
        let host = cloudinary(SignatureAlgorithm::default());
        assert_eq!(
            host.signature(1_700_000_000),
            "ac66d3ea5c9f3b64e608ccbd70d710d2a25fffea"
        );
        assert_eq!(host.upload_url, "https://api.cloudinary.com/v1_1/demo/auto/upload");
    }

    #[test]
    fn cloudinary_signature_can_use_sha256() {
        let host = cloudinary(SignatureAlgorithm::Sha256);
        assert_eq!(
            host.signature(1_700_000_000),
            "1eed9af05bd26903d6a9373e0e98024cf8caa9d62d2c507c6569f52cb4662b8a"
        );
    }
}
