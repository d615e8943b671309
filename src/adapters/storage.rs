//! Local filesystem object storage.
//!
//! Good enough for a single-node deployment: media lands under a directory
//! the portal's web tier serves statically, and the returned URL is stable
//! for the life of the file.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::adapters::ObjectStorage;
use crate::envelope::{MediaPayload, MediaSource};
use crate::error::AdapterError;

/// Filesystem-backed `ObjectStorage`.
pub struct LocalObjectStorage {
    media_dir: PathBuf,
    base_url: String,
    client: reqwest::Client,
}

impl LocalObjectStorage {
    pub fn new(media_dir: PathBuf, base_url: impl Into<String>) -> Self {
        Self {
            media_dir,
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Resolve the payload to raw bytes, fetching channel-hosted media.
    async fn resolve_bytes(&self, media: &MediaPayload) -> Result<Vec<u8>, AdapterError> {
        match &media.source {
            MediaSource::Bytes(bytes) => Ok(bytes.clone()),
            MediaSource::Url(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| AdapterError::Upload(format!("fetch {url}: {e}")))?;
                if !response.status().is_success() {
                    return Err(AdapterError::Upload(format!(
                        "fetch {url}: HTTP {}",
                        response.status()
                    )));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| AdapterError::Upload(format!("read {url}: {e}")))?;
                Ok(bytes.to_vec())
            }
        }
    }
}

/// Pick a file extension from the filename, falling back to the MIME type.
fn extension_for(media: &MediaPayload) -> &str {
    if let Some(name) = &media.filename
        && let Some((_, ext)) = name.rsplit_once('.')
        && !ext.is_empty()
    {
        return ext;
    }
    match media.mime_type.as_str() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, owner_id: &str, media: &MediaPayload) -> Result<String, AdapterError> {
        let bytes = self.resolve_bytes(media).await?;

        let dir = self.media_dir.join(owner_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AdapterError::Upload(format!("create {}: {e}", dir.display())))?;

        let file_name = format!("{}.{}", Uuid::new_v4(), extension_for(media));
        let path = dir.join(&file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AdapterError::Upload(format!("write {}: {e}", path.display())))?;

        let url = format!(
            "{}/{owner_id}/{file_name}",
            self.base_url.trim_end_matches('/')
        );
        info!(owner = owner_id, bytes = bytes.len(), %url, "Media stored");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_payload(bytes: &[u8]) -> MediaPayload {
        MediaPayload {
            mime_type: "image/jpeg".into(),
            source: MediaSource::Bytes(bytes.to_vec()),
            filename: Some("proof.jpg".into()),
        }
    }

    #[tokio::test]
    async fn upload_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let storage =
            LocalObjectStorage::new(dir.path().to_path_buf(), "http://localhost:8080/media/");

        let url = storage
            .upload("u-1", &jpeg_payload(b"fake-jpeg-bytes"))
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:8080/media/u-1/"));
        assert!(url.ends_with(".jpg"));

        let file_name = url.rsplit('/').next().unwrap();
        let written = std::fs::read(dir.path().join("u-1").join(file_name)).unwrap();
        assert_eq!(written, b"fake-jpeg-bytes");
    }

    #[tokio::test]
    async fn uploads_for_same_owner_get_distinct_urls() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path().to_path_buf(), "http://m");
        let first = storage.upload("u-1", &jpeg_payload(b"a")).await.unwrap();
        let second = storage.upload("u-1", &jpeg_payload(b"b")).await.unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn extension_falls_back_to_mime() {
        let media = MediaPayload {
            mime_type: "application/pdf".into(),
            source: MediaSource::Bytes(vec![]),
            filename: None,
        };
        assert_eq!(extension_for(&media), "pdf");

        let media = MediaPayload {
            mime_type: "application/octet-stream".into(),
            source: MediaSource::Bytes(vec![]),
            filename: Some("license.PDF".into()),
        };
        assert_eq!(extension_for(&media), "PDF");
    }
}
