use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::RecorderError;

/// Window titles of system overlays that are never worth recording
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "NVIDIA",
    "AsH",
    "AsHotplugCtrl",
    "AsHDRControl",
    "Build Full Apps",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Screen,
    Window,
}

/// A screen or window the OS offers for capture
///
/// Snapshot taken at enumeration time; `id` is opaque to everything except the
/// backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSource {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
}

impl CaptureSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}

/// OS-level enumeration of capture targets
#[async_trait::async_trait]
pub trait SourceEnumerator: Send + Sync {
    /// Raw sources in platform order; fails with `SourceEnumerationError`
    /// when capture permission is denied
    async fn enumerate(&self) -> Result<Vec<CaptureSource>, RecorderError>;

    fn name(&self) -> &str;
}

/// Filtered view over a `SourceEnumerator`
pub struct SourceRegistry {
    enumerator: Arc<dyn SourceEnumerator>,
    exclude_patterns: Vec<String>,
}

impl SourceRegistry {
    pub fn new(enumerator: Arc<dyn SourceEnumerator>, exclude_patterns: Vec<String>) -> Self {
        Self {
            enumerator,
            exclude_patterns,
        }
    }

    pub fn with_default_excludes(enumerator: Arc<dyn SourceEnumerator>) -> Self {
        let patterns = DEFAULT_EXCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect();
        Self::new(enumerator, patterns)
    }

    pub async fn list_sources(&self) -> Result<Vec<CaptureSource>, RecorderError> {
        let raw = self.enumerator.enumerate().await?;
        info!(
            "Found {} raw recording source(s) from {}",
            raw.len(),
            self.enumerator.name()
        );

        let sources = filter_sources(raw, &self.exclude_patterns);
        info!("Filtered to {} unique recording source(s)", sources.len());

        Ok(sources)
    }

    /// Look a source up by id in a fresh listing
    pub async fn find(&self, id: &str) -> Result<Option<CaptureSource>, RecorderError> {
        let sources = self.list_sources().await?;
        Ok(sources.into_iter().find(|s| s.id == id))
    }
}

/// Drop invalid entries, duplicate ids, duplicate names and excluded titles
///
/// Keeps the first occurrence and never reorders.
pub fn filter_sources(raw: Vec<CaptureSource>, exclude_patterns: &[String]) -> Vec<CaptureSource> {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut filtered = Vec::with_capacity(raw.len());

    for source in raw {
        if source.id.is_empty() || source.name.is_empty() {
            warn!("Skipping source with missing id or name: {:?}", source);
            continue;
        }

        if seen_ids.contains(&source.id) {
            debug!("Filtered duplicate source by id: {} ({})", source.name, source.id);
            continue;
        }

        if seen_names.contains(&source.name) {
            debug!("Filtered duplicate source by name: {} ({})", source.name, source.id);
            continue;
        }

        if exclude_patterns
            .iter()
            .any(|pattern| source.name.starts_with(pattern.as_str()))
        {
            debug!("Filtered excluded system window: {}", source.name);
            continue;
        }

        seen_ids.insert(source.id.clone());
        seen_names.insert(source.name.clone());
        filtered.push(source);
    }

    filtered
}
