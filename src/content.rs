//! Section content documents.
//!
//! Each page section is one JSON document stored as `<section>.json` in an
//! [`ObjectStore`]. A section that was never written reads back as its
//! default document.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error_codes::CodedError;
use crate::object_store::{ObjectStore, CACHE_NO_CACHE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    About,
    Videos,
    Art,
    Experiments,
    Ideas,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Self::About,
        Self::Videos,
        Self::Art,
        Self::Experiments,
        Self::Ideas,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::About => "about",
            Self::Videos => "videos",
            Self::Art => "art",
            Self::Experiments => "experiments",
            Self::Ideas => "ideas",
        }
    }

    pub fn object_key(self) -> String {
        format!("{}.json", self.as_str())
    }

    pub fn default_document(self) -> Value {
        match self {
            Self::About => json!({ "title": "About", "content": "" }),
            _ => json!({ "items": [] }),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == value.trim())
            .ok_or_else(|| {
                anyhow!(CodedError::not_found(
                    "UNKNOWN_SECTION",
                    format!("unknown section '{value}'"),
                )
                .with_details(json!({
                    "provided": value,
                    "allowed": Self::ALL.map(Section::as_str),
                })))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

/// One card in a list section (videos, art, experiments, ideas).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
}

/// Where section documents live and how forgiving reads are.
pub struct ContentStore {
    store: Arc<dyn ObjectStore>,
    lenient: bool,
}

impl ContentStore {
    /// Local deployments treat unreadable or corrupt files as "not written yet".
    pub fn local(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            lenient: true,
        }
    }

    /// Remote deployments only fall back on a missing object; other failures propagate.
    pub fn cloud(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            lenient: false,
        }
    }

    pub fn get(&self, section: Section) -> Result<Value> {
        let key = section.object_key();
        let bytes = match self.store.get(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(section.default_document()),
            Err(error) if self.lenient => {
                tracing::warn!(%section, "falling back to default content: {error:#}");
                return Ok(section.default_document());
            }
            Err(error) => return Err(error.context(format!("failed to read section '{section}'"))),
        };

        match serde_json::from_slice(&bytes) {
            Ok(document) => Ok(document),
            Err(error) if self.lenient => {
                tracing::warn!(%section, %error, "corrupt content file, using default");
                Ok(section.default_document())
            }
            Err(error) => {
                Err(error).with_context(|| format!("section '{section}' is not valid JSON"))
            }
        }
    }

    pub fn put(&self, section: Section, document: &Value) -> Result<()> {
        let mut bytes =
            serde_json::to_vec_pretty(document).context("failed to serialize section document")?;
        bytes.push(b'\n');
        self.store
            .put(&section.object_key(), &bytes, "application/json", CACHE_NO_CACHE)
            .with_context(|| format!("failed to write section '{section}'"))?;
        tracing::info!(
            %section,
            backend = self.store.kind(),
            bytes = bytes.len(),
            "content written"
        );
        Ok(())
    }
}
