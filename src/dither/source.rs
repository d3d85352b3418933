//! One-shot asynchronous image loading for the dither renderer.
//!
//! Decoding runs on a short-lived worker thread and reports back over a
//! channel; the frame loop only ever polls, so a slow or broken source never
//! stalls a frame.

use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use image::{ImageReader, RgbaImage};
use url::Url;

/// Where a source bitmap comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageSource {
    File(PathBuf),
    Remote(Url),
}

impl ImageSource {
    /// Accepts plain paths, `file://` URLs and `http(s)://` URLs.
    pub fn parse(uri: &str) -> Result<Self> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            bail!("image source is empty");
        }

        match Url::parse(trimmed) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|_| anyhow!("invalid file url '{trimmed}'")),
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Remote(url)),
            // Windows drive letters parse as a one-letter scheme.
            Ok(url) if url.scheme().len() > 1 => {
                bail!("unsupported image source scheme '{}'", url.scheme())
            }
            _ => Ok(Self::File(PathBuf::from(trimmed))),
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// Load state of a source bitmap, observed once per frame.
#[derive(Debug, Clone)]
pub enum SourceState {
    Pending,
    Ready(Arc<RgbaImage>),
    Failed(String),
}

impl SourceState {
    pub fn image(&self) -> Option<&Arc<RgbaImage>> {
        match self {
            Self::Ready(image) => Some(image),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A single in-flight decode.
pub struct SourceLoader {
    receiver: Option<Receiver<Result<RgbaImage>>>,
    state: SourceState,
}

impl SourceLoader {
    pub fn spawn(source: ImageSource) -> Self {
        let (sender, receiver) = mpsc::channel();
        let label = source.to_string();

        let spawned = thread::Builder::new()
            .name("zine-image-decode".to_owned())
            .spawn(move || {
                // Receiver may be gone if the renderer was disposed mid-decode.
                let _ = sender.send(load_image(&source));
            });

        match spawned {
            Ok(_) => Self {
                receiver: Some(receiver),
                state: SourceState::Pending,
            },
            Err(error) => {
                tracing::warn!(source = %label, %error, "failed to spawn image decode thread");
                Self {
                    receiver: None,
                    state: SourceState::Failed(format!("failed to spawn decoder: {error}")),
                }
            }
        }
    }

    /// Non-blocking check for the decode result.
    pub fn poll(&mut self) -> &SourceState {
        if let Some(receiver) = &self.receiver {
            match receiver.try_recv() {
                Ok(Ok(image)) => {
                    tracing::debug!(
                        width = image.width(),
                        height = image.height(),
                        "image source decoded"
                    );
                    self.state = SourceState::Ready(Arc::new(image));
                    self.receiver = None;
                }
                Ok(Err(error)) => {
                    tracing::warn!("image source failed to load: {error:#}");
                    self.state = SourceState::Failed(format!("{error:#}"));
                    self.receiver = None;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.state =
                        SourceState::Failed("image decoder exited without a result".into());
                    self.receiver = None;
                }
            }
        }
        &self.state
    }

    /// Block until the decode settles. Intended for offline rendering and tests.
    pub fn wait(&mut self) -> &SourceState {
        if let Some(receiver) = self.receiver.take() {
            self.state = match receiver.recv() {
                Ok(Ok(image)) => SourceState::Ready(Arc::new(image)),
                Ok(Err(error)) => SourceState::Failed(format!("{error:#}")),
                Err(_) => SourceState::Failed("image decoder exited without a result".into()),
            };
        }
        &self.state
    }
}

/// Keeps at most one decoded bitmap, re-fetching only when the URI changes.
#[derive(Default)]
pub struct SourceCache {
    uri: Option<String>,
    loader: Option<SourceLoader>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the cache at `uri`. Returns true when a new fetch was started.
    pub fn request(&mut self, uri: &str) -> bool {
        if self.uri.as_deref() == Some(uri) {
            return false;
        }

        self.uri = Some(uri.to_owned());
        self.loader = Some(match ImageSource::parse(uri) {
            Ok(source) => {
                tracing::debug!(%source, "fetching image source");
                SourceLoader::spawn(source)
            }
            Err(error) => {
                tracing::warn!(uri, error = %error, "invalid image source");
                SourceLoader {
                    receiver: None,
                    state: SourceState::Failed(error.to_string()),
                }
            }
        });
        true
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn poll(&mut self) -> SourceState {
        self.loader
            .as_mut()
            .map_or(SourceState::Pending, |loader| loader.poll().clone())
    }

    pub fn wait(&mut self) -> SourceState {
        self.loader
            .as_mut()
            .map_or(SourceState::Pending, |loader| loader.wait().clone())
    }

    /// Drop the bitmap and any pending decode.
    pub fn clear(&mut self) {
        self.uri = None;
        self.loader = None;
    }
}

fn load_image(source: &ImageSource) -> Result<RgbaImage> {
    match source {
        ImageSource::File(path) => {
            let image = ImageReader::open(path)
                .with_context(|| format!("failed to open image {}", path.display()))?
                .with_guessed_format()
                .with_context(|| format!("failed to detect image format {}", path.display()))?
                .decode()
                .with_context(|| format!("failed to decode image {}", path.display()))?;
            Ok(image.to_rgba8())
        }
        ImageSource::Remote(url) => {
            let bytes = fetch_remote(url)?;
            decode_bytes(&bytes).with_context(|| format!("failed to decode image {url}"))
        }
    }
}

pub fn decode_bytes(bytes: &[u8]) -> Result<RgbaImage> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to detect image format")?
        .decode()
        .context("failed to decode image bytes")?;
    Ok(image.to_rgba8())
}

#[cfg(feature = "cloud")]
fn fetch_remote(url: &Url) -> Result<Vec<u8>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start fetch runtime")?;
    runtime.block_on(async {
        let response = reqwest::get(url.clone())
            .await
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;
        Ok(bytes.to_vec())
    })
}

#[cfg(not(feature = "cloud"))]
fn fetch_remote(url: &Url) -> Result<Vec<u8>> {
    bail!("remote image source {url} requires the `cloud` feature")
}
