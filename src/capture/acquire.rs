use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::source::CaptureSource;
use crate::error::RecorderError;
use crate::media::{AudioConstraints, MediaStream, StreamKind};

/// Host operating system, as far as capture capabilities go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Other
        }
    }

    /// macOS cannot expose loopback audio to a capture API
    pub fn supports_system_audio(&self) -> bool {
        !matches!(self, Self::MacOs)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Other => "an unsupported platform",
        };
        f.write_str(name)
    }
}

/// Platform media devices
///
/// Each call may prompt the user for permission, so all of them are suspension
/// points and none may assume anything about the others.
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Screen/window video plus desktop audio when available
    async fn display_media(&self, source: &CaptureSource) -> Result<MediaStream, RecorderError>;

    /// Loopback audio only
    async fn system_audio(&self) -> Result<MediaStream, RecorderError>;

    async fn microphone(&self, constraints: AudioConstraints) -> Result<MediaStream, RecorderError>;
}

/// Resolves a capture selection into independent media streams
pub struct StreamAcquirer {
    devices: Arc<dyn MediaDevices>,
    platform: Platform,
    microphone: AudioConstraints,
}

impl StreamAcquirer {
    pub fn new(devices: Arc<dyn MediaDevices>, platform: Platform) -> Self {
        Self {
            devices,
            platform,
            microphone: AudioConstraints::default(),
        }
    }

    pub fn with_microphone_constraints(mut self, constraints: AudioConstraints) -> Self {
        self.microphone = constraints;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub async fn acquire_display_stream(
        &self,
        source: &CaptureSource,
    ) -> Result<MediaStream, RecorderError> {
        info!("Acquiring display stream for {} ({})", source.name, source.id);

        let stream = self.devices.display_media(source).await?;
        if stream.video_track().is_none() {
            return Err(RecorderError::SourceUnavailable(format!(
                "{} produced no video track",
                source.name
            )));
        }

        Ok(stream)
    }

    /// Fails immediately, without touching the devices, on platforms that
    /// cannot capture loopback audio
    pub async fn acquire_system_audio_stream(&self) -> Result<MediaStream, RecorderError> {
        if !self.platform.supports_system_audio() {
            info!("System audio not supported on {}, skipping", self.platform);
            return Err(RecorderError::UnsupportedPlatform(
                StreamKind::SystemAudio,
                self.platform,
            ));
        }

        info!("Acquiring system audio stream");
        self.devices.system_audio().await
    }

    pub async fn acquire_microphone_stream(&self) -> Result<MediaStream, RecorderError> {
        info!(
            "Acquiring microphone stream (echo cancellation: {}, noise suppression: {})",
            self.microphone.echo_cancellation, self.microphone.noise_suppression
        );
        self.devices.microphone(self.microphone).await
    }
}
