use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::dither::renderer::{Backend, DEFAULT_BOX_HEIGHT, DEFAULT_BOX_WIDTH};
use crate::dither::DitherParams;

pub const MAX_BOX_DIMENSION: u32 = 8192;
pub const MAX_FRAMES: u32 = 10_000;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_JSON_BYTES: usize = 1024 * 1024;
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 12 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    #[serde(default)]
    pub dither: DitherParams,
    #[serde(default = "default_box_width")]
    pub width: u32,
    #[serde(default = "default_box_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_frames")]
    pub frames: u32,
    /// `#rrggbb` or `#rrggbbaa`; transparent when unset.
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub label: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dither: DitherParams::default(),
            width: DEFAULT_BOX_WIDTH,
            height: DEFAULT_BOX_HEIGHT,
            fps: default_fps(),
            frames: default_frames(),
            background: None,
            backend: Backend::default(),
            label: String::new(),
        }
    }
}

fn default_box_width() -> u32 {
    DEFAULT_BOX_WIDTH
}

fn default_box_height() -> u32 {
    DEFAULT_BOX_HEIGHT
}

fn default_fps() -> u32 {
    30
}

fn default_frames() -> u32 {
    1
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!(
                "render box must be positive, got {}x{}",
                self.width,
                self.height
            );
        }
        if self.width > MAX_BOX_DIMENSION || self.height > MAX_BOX_DIMENSION {
            bail!(
                "render box {}x{} exceeds the {} px limit",
                self.width,
                self.height,
                MAX_BOX_DIMENSION
            );
        }
        if self.fps == 0 {
            bail!("fps must be > 0");
        }
        if self.frames == 0 || self.frames > MAX_FRAMES {
            bail!("frames must be within 1..={MAX_FRAMES}, got {}", self.frames);
        }
        let p = &self.dither;
        if !(p.threshold.is_finite() && p.contrast.is_finite() && p.grain.is_finite()) {
            bail!("dither parameters must be finite numbers");
        }
        self.background_rgba()?;
        Ok(())
    }

    pub fn background_rgba(&self) -> Result<[u8; 4]> {
        match self.background.as_deref() {
            None => Ok([0, 0, 0, 0]),
            Some(hex) => parse_hex_color(hex),
        }
    }
}

pub fn parse_hex_color(value: &str) -> Result<[u8; 4]> {
    let hex = value
        .strip_prefix('#')
        .ok_or_else(|| anyhow!("color '{value}' must start with '#'"))?;
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        bail!("color '{value}' must be #rrggbb or #rrggbbaa");
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| anyhow!("color '{value}' has invalid hex digits"))
    };
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok([channel(0)?, channel(2)?, channel(4)?, alpha])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    #[default]
    Local,
    Cloud,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    #[serde(default)]
    pub mode: DeploymentMode,
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_uploads_url_prefix")]
    pub uploads_url_prefix: String,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_media_prefix")]
    pub media_prefix: String,
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_max_json_bytes")]
    pub max_json_bytes: usize,
    /// Only ever read from the environment.
    #[serde(skip)]
    pub admin_password: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::default(),
            content_dir: default_content_dir(),
            uploads_dir: default_uploads_dir(),
            uploads_url_prefix: default_uploads_url_prefix(),
            bucket: None,
            media_prefix: default_media_prefix(),
            token_ttl_seconds: default_token_ttl_seconds(),
            max_upload_bytes: default_max_upload_bytes(),
            max_json_bytes: default_max_json_bytes(),
            admin_password: None,
        }
    }
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("public/uploads")
}

fn default_uploads_url_prefix() -> String {
    "/uploads".to_owned()
}

fn default_media_prefix() -> String {
    "uploads".to_owned()
}

fn default_token_ttl_seconds() -> u64 {
    DEFAULT_TOKEN_TTL_SECONDS
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_max_json_bytes() -> usize {
    DEFAULT_MAX_JSON_BYTES
}

impl SiteConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mode == DeploymentMode::Cloud
            && self.bucket.as_deref().map_or(true, |b| b.trim().is_empty())
        {
            bail!("cloud mode requires site.bucket (or BUCKET_NAME)");
        }
        if self.max_upload_bytes == 0 || self.max_upload_bytes > DEFAULT_MAX_UPLOAD_BYTES {
            bail!(
                "max_upload_bytes must be within 1..={}",
                DEFAULT_MAX_UPLOAD_BYTES
            );
        }
        if self.max_json_bytes == 0 {
            bail!("max_json_bytes must be > 0");
        }
        if self.token_ttl_seconds == 0 {
            bail!("token_ttl_seconds must be > 0");
        }
        if self.media_prefix.is_empty() || self.media_prefix.contains("..") {
            bail!("media_prefix '{}' is not a valid object prefix", self.media_prefix);
        }
        Ok(())
    }

    /// Apply deployment overrides from the environment.
    ///
    /// `ZINE_MODE` wins over the legacy `IS_LOCAL` flag; `BUCKET_NAME` and
    /// `ADMIN_PASSWORD` are taken verbatim.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("ZINE_MODE") {
            self.mode = match mode.trim().to_ascii_lowercase().as_str() {
                "local" => DeploymentMode::Local,
                "cloud" => DeploymentMode::Cloud,
                other => bail!("ZINE_MODE must be 'local' or 'cloud', got '{other}'"),
            };
        } else if let Some(is_local) = lookup("IS_LOCAL") {
            self.mode = match is_local.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => DeploymentMode::Local,
                _ => DeploymentMode::Cloud,
            };
        }
        if let Some(bucket) = lookup("BUCKET_NAME") {
            self.bucket = Some(bucket);
        }
        if let Some(password) = lookup("ADMIN_PASSWORD") {
            self.admin_password = Some(password);
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = parse_config(&contents).with_context(|| format!("in {}", path.display()))?;
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!("failed to parse yaml at {}: {}", location, error)
    })?;
    config.render.validate().context("invalid render config")?;
    config.site.validate().context("invalid site config")?;
    Ok(config)
}
