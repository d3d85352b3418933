//! Transport-agnostic content API.
//!
//! Each handler takes the already-extracted pieces of a request and answers
//! with a status code and a JSON body, so any HTTP layer can sit in front.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthGate;
use crate::config::{DeploymentMode, SiteConfig};
use crate::content::{ContentStore, Section};
use crate::error_codes::{find_coded_error, CodedError};
use crate::media::MediaStore;
use crate::object_store::{LocalDirStore, ObjectStore};

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn from_error(error: &anyhow::Error) -> Self {
        match find_coded_error(error) {
            Some(coded) => Self {
                status: coded.kind.status(),
                body: serde_json::to_value(coded.envelope())
                    .unwrap_or_else(|_| json!({ "ok": false })),
            },
            None => {
                tracing::error!("content api request failed: {error:#}");
                Self {
                    status: 500,
                    body: json!({
                        "ok": false,
                        "error": { "code": "INTERNAL", "message": "internal error" }
                    }),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<Result<Value>> for ApiResponse {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(body) => Self::ok(body),
            Err(error) => Self::from_error(&error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    password: String,
}

pub struct ContentApi {
    content: ContentStore,
    media: MediaStore,
    auth: AuthGate,
    max_json_bytes: usize,
}

impl ContentApi {
    pub fn new(
        content: ContentStore,
        media: MediaStore,
        auth: AuthGate,
        max_json_bytes: usize,
    ) -> Self {
        Self {
            content,
            media,
            auth,
            max_json_bytes,
        }
    }

    /// Wire up stores for the configured deployment mode.
    pub fn from_site_config(site: &SiteConfig) -> Result<Self> {
        site.validate().context("invalid site config")?;
        let auth = AuthGate::new(
            site.admin_password.as_deref(),
            Duration::from_secs(site.token_ttl_seconds),
        );
        if !auth.login_enabled() {
            tracing::warn!("ADMIN_PASSWORD is not set, content writes are disabled");
        }

        let (content, media) = match site.mode {
            DeploymentMode::Local => {
                let content: Arc<dyn ObjectStore> = Arc::new(LocalDirStore::new(&site.content_dir));
                let uploads: Arc<dyn ObjectStore> = Arc::new(LocalDirStore::new(&site.uploads_dir));
                (
                    ContentStore::local(content),
                    MediaStore::served(
                        uploads,
                        site.uploads_url_prefix.clone(),
                        site.max_upload_bytes,
                    ),
                )
            }
            DeploymentMode::Cloud => {
                let bucket = site
                    .bucket
                    .clone()
                    .ok_or_else(|| anyhow!("cloud mode requires a bucket"))?;
                let store = cloud_store(&bucket)?;
                (
                    ContentStore::cloud(store.clone()),
                    MediaStore::bucket(
                        store,
                        bucket,
                        site.media_prefix.clone(),
                        site.max_upload_bytes,
                    ),
                )
            }
        };
        tracing::debug!(mode = ?site.mode, "content api ready");
        Ok(Self::new(content, media, auth, site.max_json_bytes))
    }

    pub fn login(&self, body: &[u8]) -> ApiResponse {
        self.try_login(body).into()
    }

    fn try_login(&self, body: &[u8]) -> Result<Value> {
        let request: LoginRequest = self.parse_json(body)?;
        let token = self.auth.login(&request.password)?;
        Ok(json!({ "token": token }))
    }

    pub fn logout(&self, authorization: &str) -> ApiResponse {
        let revoked = self.auth.revoke(authorization);
        ApiResponse::ok(json!({ "ok": true, "revoked": revoked }))
    }

    pub fn get_content(&self, section: &str) -> ApiResponse {
        section
            .parse::<Section>()
            .and_then(|section| self.content.get(section))
            .into()
    }

    pub fn put_content(&self, authorization: &str, section: &str, body: &[u8]) -> ApiResponse {
        self.try_put_content(authorization, section, body).into()
    }

    fn try_put_content(&self, authorization: &str, section: &str, body: &[u8]) -> Result<Value> {
        self.auth.check(authorization)?;
        let section = section.parse::<Section>()?;
        let document: Value = self.parse_json(body)?;
        if !document.is_object() {
            bail!(CodedError::usage(
                "INVALID_DOCUMENT",
                format!("content for '{section}' must be a JSON object"),
            ));
        }
        self.content.put(section, &document)?;
        Ok(json!({ "ok": true }))
    }

    pub fn upload(
        &self,
        authorization: &str,
        original_name: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
    ) -> ApiResponse {
        self.auth
            .check(authorization)
            .and_then(|()| self.media.put(original_name, mime_type, bytes))
            .and_then(|stored| {
                serde_json::to_value(stored).context("failed to encode upload result")
            })
            .into()
    }

    fn parse_json<T: serde::de::DeserializeOwned>(&self, body: &[u8]) -> Result<T> {
        if body.len() > self.max_json_bytes {
            bail!(CodedError::payload_too_large(
                "BODY_TOO_LARGE",
                format!(
                    "request body is {} bytes, the limit is {} bytes",
                    body.len(),
                    self.max_json_bytes
                ),
            ));
        }
        serde_json::from_slice(body).map_err(|error| {
            anyhow!(CodedError::usage(
                "INVALID_JSON",
                format!("request body is not valid JSON: {error}"),
            ))
        })
    }
}

#[cfg(feature = "cloud")]
fn cloud_store(bucket: &str) -> Result<Arc<dyn ObjectStore>> {
    let token = std::env::var("GCS_ACCESS_TOKEN")
        .context("GCS_ACCESS_TOKEN must be set for cloud mode")?;
    Ok(Arc::new(crate::object_store::GcsStore::new(bucket, token)?))
}

#[cfg(not(feature = "cloud"))]
fn cloud_store(bucket: &str) -> Result<Arc<dyn ObjectStore>> {
    bail!("cloud mode (bucket '{bucket}') requires building zine with the `cloud` feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryStore;

    fn api_with(max_json_bytes: usize, max_upload_bytes: u64) -> ContentApi {
        let store = Arc::new(MemoryStore::new());
        ContentApi::new(
            ContentStore::cloud(store.clone()),
            MediaStore::bucket(store, "bucket", "uploads", max_upload_bytes),
            AuthGate::new(Some("pw"), Duration::from_secs(60)),
            max_json_bytes,
        )
    }

    fn token(api: &ContentApi) -> String {
        let response = api.login(br#"{"password":"pw"}"#);
        assert_eq!(response.status, 200);
        response.body["token"].as_str().unwrap().to_owned()
    }

    #[test]
    fn login_rejects_wrong_password_with_envelope() {
        let api = api_with(1024, 1024);
        let response = api.login(br#"{"password":"nope"}"#);
        assert_eq!(response.status, 401);
        assert_eq!(response.body["ok"], json!(false));
        assert_eq!(response.body["error"]["message"], json!("Wrong password"));
    }

    #[test]
    fn writes_require_a_valid_token() {
        let api = api_with(1024, 1024);
        let response = api.put_content("Bearer bogus", "about", br#"{"title":"x"}"#);
        assert_eq!(response.status, 401);

        let header = format!("Bearer {}", token(&api));
        let response = api.put_content(&header, "about", br#"{"title":"Hi","content":"zine"}"#);
        assert!(response.is_success(), "{response:?}");
        assert_eq!(api.get_content("about").body["content"], json!("zine"));
    }

    #[test]
    fn unknown_section_is_404() {
        let api = api_with(1024, 1024);
        assert_eq!(api.get_content("admin").status, 404);
        let header = format!("Bearer {}", token(&api));
        assert_eq!(api.put_content(&header, "admin", b"{}").status, 404);
    }

    #[test]
    fn oversized_and_malformed_bodies_are_rejected() {
        let api = api_with(32, 1024);
        let header = format!("Bearer {}", token(&api));
        let big = format!(r#"{{"title":"{}"}}"#, "x".repeat(64));
        assert_eq!(api.put_content(&header, "about", big.as_bytes()).status, 413);
        assert_eq!(api.put_content(&header, "about", b"{oops").status, 400);
        assert_eq!(api.put_content(&header, "about", b"[1,2]").status, 400);
    }

    #[test]
    fn upload_returns_public_url() {
        let api = api_with(1024, 8);
        let header = format!("Bearer {}", token(&api));

        let response = api.upload(&header, "pic.png", Some("image/png"), b"png");
        assert_eq!(response.status, 200);
        let url = response.body["url"].as_str().unwrap();
        assert!(url.starts_with("https://storage.googleapis.com/bucket/uploads/"));
        assert_eq!(response.body["mediaType"], json!("image"));

        assert_eq!(api.upload(&header, "pic.exe", None, b"mz").status, 415);
        assert_eq!(api.upload(&header, "pic.png", None, b"123456789").status, 413);
        assert_eq!(api.upload("", "pic.png", None, b"png").status, 401);
    }

    #[test]
    fn logout_revokes_token() {
        let api = api_with(1024, 1024);
        let header = format!("Bearer {}", token(&api));
        assert_eq!(api.logout(&header).body["revoked"], json!(true));
        assert_eq!(api.put_content(&header, "ideas", br#"{"items":[]}"#).status, 401);
    }

    #[test]
    fn local_site_config_builds_file_backed_api() {
        let dir = tempfile::tempdir().unwrap();
        let site = SiteConfig {
            content_dir: dir.path().join("content"),
            uploads_dir: dir.path().join("uploads"),
            admin_password: Some("pw".to_owned()),
            ..SiteConfig::default()
        };
        let api = ContentApi::from_site_config(&site).unwrap();
        let header = format!("Bearer {}", token(&api));
        assert!(api.put_content(&header, "art", br#"{"items":[]}"#).is_success());
        assert!(dir.path().join("content/art.json").is_file());

        let response = api.upload(&header, "a.gif", None, b"GIF89a");
        let url = response.body["url"].as_str().unwrap();
        assert!(url.starts_with("/uploads/"), "{url}");
    }
}
