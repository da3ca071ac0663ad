use anyhow::{Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::metadata::{render_metadata, SessionMetadata};
use crate::error::RecorderError;
use crate::media::{container_extension, StreamKind};

/// One stream's assembled recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBlob {
    pub data: Bytes,
    pub mime_type: String,
}

impl RecordedBlob {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Outcome of a save, in the shape the UI expects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub success: bool,
    pub files_saved: usize,
    pub directory: Option<String>,
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveReport {
    fn failure(error: impl Into<String>, directory: Option<String>, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            files_saved: 0,
            directory,
            files: Vec::new(),
            warnings,
            error: Some(error.into()),
        }
    }

    /// Per-file failures of an otherwise successful save
    pub fn partial_failure(&self) -> Option<RecorderError> {
        if self.success && !self.warnings.is_empty() {
            Some(RecorderError::PersistencePartialFailure(self.warnings.clone()))
        } else {
            None
        }
    }
}

/// Chooses where a session is written; `None` means the user canceled
#[async_trait::async_trait]
pub trait DirectoryPicker: Send + Sync {
    async fn pick_directory(&self, session_id: &str) -> Result<Option<PathBuf>>;
}

/// Always saves into one directory, creating it on demand
pub struct FixedDirectory {
    path: PathBuf,
}

impl FixedDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl DirectoryPicker for FixedDirectory {
    async fn pick_directory(&self, _session_id: &str) -> Result<Option<PathBuf>> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .with_context(|| format!("Failed to create output directory {:?}", self.path))?;

        Ok(Some(self.path.clone()))
    }
}

/// `{id}.{ext}` for video, `{id}_{kind}.{ext}` for the audio streams
pub fn recording_file_name(session_id: &str, kind: StreamKind, mime_type: &str) -> String {
    let extension = container_extension(mime_type);
    match kind {
        StreamKind::Video => format!("{}.{}", session_id, extension),
        other => format!("{}_{}.{}", session_id, other.slug(), extension),
    }
}

pub fn metadata_file_name(session_id: &str) -> String {
    format!("{}_info.txt", session_id)
}

/// Persists every blob independently and records what happened
pub struct PersistenceSink {
    picker: Arc<dyn DirectoryPicker>,
}

impl PersistenceSink {
    pub fn new(picker: Arc<dyn DirectoryPicker>) -> Self {
        Self { picker }
    }

    pub async fn save(
        &self,
        blobs: &BTreeMap<StreamKind, RecordedBlob>,
        metadata: &SessionMetadata,
    ) -> SaveReport {
        info!("Saving recordings for session: {}", metadata.session_id);

        if blobs.is_empty() {
            warn!("Nothing to save for session {}", metadata.session_id);
            return SaveReport::failure(
                "No files were saved. All recordings may have been empty or failed.",
                None,
                Vec::new(),
            );
        }

        let directory = match self.picker.pick_directory(&metadata.session_id).await {
            Ok(Some(directory)) => directory,
            Ok(None) => {
                info!("Directory selection canceled");
                return SaveReport::failure("Directory selection canceled by user", None, Vec::new());
            }
            Err(e) => {
                error!("Failed to choose save directory: {:#}", e);
                return SaveReport::failure(
                    format!("Failed to save recordings: {:#}", e),
                    None,
                    Vec::new(),
                );
            }
        };
        let directory_name = directory.display().to_string();

        let mut files = Vec::new();
        let mut warnings = Vec::new();

        for (kind, blob) in blobs {
            let file_name = recording_file_name(&metadata.session_id, *kind, &blob.mime_type);
            let path = directory.join(&file_name);

            match tokio::fs::write(&path, &blob.data).await {
                Ok(()) => {
                    info!("{} saved: {} ({} bytes)", kind, path.display(), blob.data.len());
                    files.push(file_name);
                }
                Err(e) => {
                    error!("Error saving {}: {}", kind, e);
                    warnings.push(format!("{}: {}", kind.label(), e));
                }
            }
        }

        let info_path = directory.join(metadata_file_name(&metadata.session_id));
        let record = render_metadata(metadata, blobs, &files, &warnings);
        match tokio::fs::write(&info_path, record).await {
            Ok(()) => info!("Metadata file saved: {}", info_path.display()),
            Err(e) => {
                error!("Error saving metadata file: {}", e);
                warnings.push(format!("Metadata: {}", e));
            }
        }

        if files.is_empty() {
            return SaveReport::failure(
                "No files were saved. All recordings may have been empty or failed.",
                Some(directory_name),
                warnings,
            );
        }

        SaveReport {
            success: true,
            files_saved: files.len(),
            directory: Some(directory_name),
            files,
            warnings,
            error: None,
        }
    }
}
