//! Uploaded media files: validation, naming and publication.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::json;

use crate::auth::random_hex;
use crate::content::MediaType;
use crate::error_codes::CodedError;
use crate::object_store::{ObjectStore, CACHE_IMMUTABLE};

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpeg", "jpg", "png", "gif", "webp", "mp4", "mov", "webm",
];
pub const PUBLIC_GCS_BASE: &str = "https://storage.googleapis.com";

const NAME_RANDOM_BYTES: usize = 8;

pub fn media_type_for(extension: &str) -> Option<MediaType> {
    match extension.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" | "png" | "gif" | "webp" => Some(MediaType::Image),
        "mp4" | "mov" | "webm" => Some(MediaType::Video),
        _ => None,
    }
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Lowercased extension of an upload's original name, if it is on the allow-list.
pub fn allowed_extension(original_name: &str) -> Result<String> {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(anyhow!(CodedError::unsupported_media(
            "UNSUPPORTED_MEDIA_TYPE",
            format!("'{original_name}' is not an allowed media file"),
        )
        .with_details(json!({
            "provided": extension,
            "allowed": ALLOWED_EXTENSIONS,
        }))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMedia {
    pub url: String,
    pub name: String,
    pub media_type: MediaType,
}

enum Publication {
    /// Objects are served from `url_prefix` by the site's static file server.
    Served { url_prefix: String },
    /// Objects are made public in a bucket under `prefix/`.
    Bucket { bucket: String, prefix: String },
}

pub struct MediaStore {
    store: Arc<dyn ObjectStore>,
    publication: Publication,
    max_bytes: u64,
}

impl MediaStore {
    pub fn served(
        store: Arc<dyn ObjectStore>,
        url_prefix: impl Into<String>,
        max_bytes: u64,
    ) -> Self {
        Self {
            store,
            publication: Publication::Served {
                url_prefix: url_prefix.into(),
            },
            max_bytes,
        }
    }

    pub fn bucket(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        max_bytes: u64,
    ) -> Self {
        Self {
            store,
            publication: Publication::Bucket {
                bucket: bucket.into(),
                prefix: prefix.into(),
            },
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Store an upload under a fresh random name and return its public URL.
    pub fn put(
        &self,
        original_name: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredMedia> {
        let extension = allowed_extension(original_name)?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(anyhow!(CodedError::payload_too_large(
                "FILE_TOO_LARGE",
                format!(
                    "upload is {} bytes, the limit is {} bytes",
                    bytes.len(),
                    self.max_bytes
                ),
            )));
        }

        let media_type = media_type_for(&extension)
            .ok_or_else(|| anyhow!("allowed extension '{extension}' has no media type"))?;
        let content_type = mime_type
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| content_type_for(&extension));
        let name = format!("{}.{extension}", random_hex(NAME_RANDOM_BYTES));

        let url = match &self.publication {
            Publication::Served { url_prefix } => {
                self.store
                    .put(&name, bytes, content_type, CACHE_IMMUTABLE)
                    .with_context(|| format!("failed to store upload '{original_name}'"))?;
                format!("{}/{name}", url_prefix.trim_end_matches('/'))
            }
            Publication::Bucket { bucket, prefix } => {
                let key = format!("{}/{name}", prefix.trim_matches('/'));
                self.store
                    .put(&key, bytes, content_type, CACHE_IMMUTABLE)
                    .with_context(|| format!("failed to upload '{original_name}'"))?;
                self.store
                    .make_public(&key)
                    .with_context(|| format!("failed to publish '{key}'"))?;
                format!("{PUBLIC_GCS_BASE}/{bucket}/{key}")
            }
        };

        tracing::info!(
            original_name,
            %url,
            bytes = bytes.len(),
            backend = self.store.kind(),
            "media uploaded"
        );
        Ok(StoredMedia {
            url,
            name,
            media_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_codes::find_coded_error;
    use crate::object_store::{LocalDirStore, MemoryStore};
    use tempfile::tempdir;

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        assert_eq!(allowed_extension("Holiday.JPG").unwrap(), "jpg");
        assert_eq!(allowed_extension("clip.webm").unwrap(), "webm");
        for bad in ["script.js", "noext", "archive.png.zip", ".png"] {
            let error = allowed_extension(bad).unwrap_err();
            assert_eq!(find_coded_error(&error).unwrap().kind.status(), 415, "{bad}");
        }
    }

    #[test]
    fn served_uploads_land_on_disk_with_random_names() {
        let dir = tempdir().unwrap();
        let media = MediaStore::served(Arc::new(LocalDirStore::new(dir.path())), "/uploads/", 1024);
        let stored = media.put("Cat.PNG", None, b"fake png").unwrap();

        assert_eq!(stored.media_type, MediaType::Image);
        assert_eq!(stored.name.len(), 16 + ".png".len());
        assert!(stored.name.ends_with(".png"));
        assert_eq!(stored.url, format!("/uploads/{}", stored.name));
        assert_eq!(std::fs::read(dir.path().join(&stored.name)).unwrap(), b"fake png");
    }

    #[test]
    fn bucket_uploads_are_public_and_cached() {
        let memory = Arc::new(MemoryStore::new());
        let media = MediaStore::bucket(memory.clone(), "zine-media", "uploads", 1024);
        let stored = media.put("loop.mov", Some("video/quicktime"), b"moov").unwrap();

        let key = format!("uploads/{}", stored.name);
        assert_eq!(
            stored.url,
            format!("https://storage.googleapis.com/zine-media/{key}")
        );
        let object = memory.object(&key).unwrap();
        assert!(object.public);
        assert_eq!(object.content_type, "video/quicktime");
        assert_eq!(object.cache_control, CACHE_IMMUTABLE);
        assert_eq!(stored.media_type, MediaType::Video);
    }

    #[test]
    fn oversized_uploads_are_rejected_before_storing() {
        let memory = Arc::new(MemoryStore::new());
        let media = MediaStore::served(memory.clone(), "/uploads", 4);
        let error = media.put("big.gif", None, b"12345").unwrap_err();
        let coded = find_coded_error(&error).unwrap();
        assert_eq!(coded.code, "FILE_TOO_LARGE");
        assert_eq!(coded.kind.status(), 413);
        assert!(memory.keys().is_empty());
    }

    #[test]
    fn blank_mime_falls_back_to_extension() {
        let memory = Arc::new(MemoryStore::new());
        let media = MediaStore::served(memory.clone(), "/uploads", 1024);
        let stored = media.put("a.webp", Some("  "), b"riff").unwrap();
        assert_eq!(memory.object(&stored.name).unwrap().content_type, "image/webp");
    }
}
