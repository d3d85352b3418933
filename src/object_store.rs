//! Key/value blob storage behind the content and media stores.
//!
//! Keys are relative, `/`-separated object names (`about.json`,
//! `uploads/3f9a….png`). Every backend rejects keys that could escape its
//! namespace.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};

pub const CACHE_NO_CACHE: &str = "no-cache";
pub const CACHE_IMMUTABLE: &str = "public,max-age=31536000";

pub trait ObjectStore: Send + Sync {
    /// Fetch an object. `Ok(None)` when it does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, bytes: &[u8], content_type: &str, cache_control: &str) -> Result<()>;

    /// Make an object world-readable. A no-op for backends without ACLs.
    fn make_public(&self, key: &str) -> Result<()>;

    /// Short backend name for logs.
    fn kind(&self) -> &'static str;
}

/// Validate an object key and return its path components.
pub fn validate_key(key: &str) -> Result<Vec<&str>> {
    if key.is_empty() {
        bail!("object key is empty");
    }
    if key.starts_with('/') || key.contains('\\') {
        bail!("object key '{key}' must be relative and '/'-separated");
    }
    let parts = key.split('/').collect::<Vec<_>>();
    if parts
        .iter()
        .any(|part| part.is_empty() || *part == "." || *part == "..")
    {
        bail!("object key '{key}' escapes the store root");
    }
    Ok(parts)
}

/// Objects stored as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto a path that is guaranteed to stay under the root.
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in validate_key(key)? {
            path.push(part);
        }
        if path
            .strip_prefix(&self.root)
            .map(|rel| rel.components().all(|c| matches!(c, Component::Normal(_))))
            .unwrap_or(false)
        {
            Ok(path)
        } else {
            Err(anyhow!("Path traversal violation: blocked access to {}", path.display()))
        }
    }
}

impl ObjectStore for LocalDirStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
        _cache_control: &str,
    ) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(key, bytes = bytes.len(), "object written to disk");
        Ok(())
    }

    fn make_public(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub cache_control: String,
    pub public: bool,
}

/// In-process store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(objects.get(key).map(|object| object.bytes.clone()))
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str, cache_control: &str) -> Result<()> {
        validate_key(key)?;
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        objects.insert(
            key.to_owned(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_owned(),
                cache_control: cache_control.to_owned(),
                public: false,
            },
        );
        Ok(())
    }

    fn make_public(&self, key: &str) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let object = objects
            .get_mut(key)
            .ok_or_else(|| anyhow!("object '{key}' does not exist"))?;
        object.public = true;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(feature = "cloud")]
pub use gcs::GcsStore;

#[cfg(feature = "cloud")]
mod gcs {
    use anyhow::{anyhow, Context, Result};
    use reqwest::{Client, StatusCode};
    use serde_json::json;

    use super::{validate_key, ObjectStore};

    const GCS_API_BASE: &str = "https://storage.googleapis.com/storage/v1";
    const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

    /// Google Cloud Storage over the JSON API, authenticated with an OAuth
    /// bearer token.
    pub struct GcsStore {
        http: Client,
        bucket: String,
        token: String,
        runtime: tokio::runtime::Runtime,
    }

    impl GcsStore {
        pub fn new(bucket: impl Into<String>, token: impl Into<String>) -> Result<Self> {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .context("failed to start storage runtime")?;
            Ok(Self {
                http: Client::new(),
                bucket: bucket.into(),
                token: token.into(),
                runtime,
            })
        }

        fn object_url(&self, key: &str) -> String {
            let name = url::form_urlencoded::byte_serialize(key.as_bytes()).collect::<String>();
            format!("{GCS_API_BASE}/b/{}/o/{name}", self.bucket)
        }
    }

    impl ObjectStore for GcsStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            validate_key(key)?;
            let url = format!("{}?alt=media", self.object_url(key));
            self.runtime.block_on(async {
                let response = self
                    .http
                    .get(&url)
                    .bearer_auth(&self.token)
                    .send()
                    .await
                    .with_context(|| format!("failed to download gs://{}/{key}", self.bucket))?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                let bytes = response
                    .error_for_status()
                    .with_context(|| format!("download of gs://{}/{key} failed", self.bucket))?
                    .bytes()
                    .await
                    .context("failed to read object body")?;
                Ok(Some(bytes.to_vec()))
            })
        }

        fn put(
            &self,
            key: &str,
            bytes: &[u8],
            content_type: &str,
            cache_control: &str,
        ) -> Result<()> {
            validate_key(key)?;
            let name = url::form_urlencoded::byte_serialize(key.as_bytes()).collect::<String>();
            let upload_url = format!(
                "{GCS_UPLOAD_BASE}/b/{}/o?uploadType=media&name={name}",
                self.bucket
            );
            let metadata_url = self.object_url(key);
            self.runtime.block_on(async {
                self.http
                    .post(&upload_url)
                    .bearer_auth(&self.token)
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(bytes.to_vec())
                    .send()
                    .await
                    .with_context(|| format!("failed to upload gs://{}/{key}", self.bucket))?
                    .error_for_status()
                    .with_context(|| format!("upload of gs://{}/{key} failed", self.bucket))?;
                self.http
                    .patch(&metadata_url)
                    .bearer_auth(&self.token)
                    .json(&json!({ "cacheControl": cache_control }))
                    .send()
                    .await
                    .context("failed to set object cache control")?
                    .error_for_status()
                    .map_err(|error| anyhow!("setting cache control failed: {error}"))?;
                Ok(())
            })
        }

        fn make_public(&self, key: &str) -> Result<()> {
            validate_key(key)?;
            let acl_url = format!("{}/acl", self.object_url(key));
            self.runtime.block_on(async {
                self.http
                    .post(&acl_url)
                    .bearer_auth(&self.token)
                    .json(&json!({ "entity": "allUsers", "role": "READER" }))
                    .send()
                    .await
                    .context("failed to update object acl")?
                    .error_for_status()
                    .context("making object public failed")?;
                Ok(())
            })
        }

        fn kind(&self) -> &'static str {
            "gcs"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_escaping_keys() {
        for key in ["", "/etc/passwd", "../secret", "a/../../b", "a//b", "a\\b", "./a"] {
            assert!(validate_key(key).is_err(), "{key:?} should be rejected");
        }
        assert_eq!(validate_key("uploads/x.png").unwrap(), vec!["uploads", "x.png"]);
    }

    #[test]
    fn local_store_round_trips_and_reports_missing() {
        let dir = tempdir().unwrap();
        let store = LocalDirStore::new(dir.path());
        assert_eq!(store.get("about.json").unwrap(), None);

        store
            .put("nested/about.json", b"{}", "application/json", CACHE_NO_CACHE)
            .unwrap();
        assert_eq!(store.get("nested/about.json").unwrap().as_deref(), Some(&b"{}"[..]));
        assert!(dir.path().join("nested/about.json").is_file());
    }

    #[test]
    fn local_store_refuses_traversal() {
        let dir = tempdir().unwrap();
        let store = LocalDirStore::new(dir.path().join("root"));
        assert!(store.put("../outside.json", b"x", "text/plain", "").is_err());
        assert!(!dir.path().join("outside.json").exists());
    }

    #[test]
    fn memory_store_tracks_metadata_and_acl() {
        let store = MemoryStore::new();
        store
            .put("media/a.png", b"png", "image/png", CACHE_IMMUTABLE)
            .unwrap();
        assert!(!store.object("media/a.png").unwrap().public);
        store.make_public("media/a.png").unwrap();

        let object = store.object("media/a.png").unwrap();
        assert!(object.public);
        assert_eq!(object.content_type, "image/png");
        assert_eq!(object.cache_control, CACHE_IMMUTABLE);
        assert!(store.make_public("media/missing.png").is_err());
    }
}
