use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::FfmpegConfig;
use crate::capture::DEFAULT_EXCLUDE_PATTERNS;
use crate::media::AudioConstraints;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: String,
    pub chunk_interval_ms: u64,
    pub drain_timeout_ms: u64,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: "~/Videos/recordings".to_string(),
            chunk_interval_ms: 1000,
            drain_timeout_ms: 5000,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

impl RecordingConfig {
    /// Output directory with `~` expanded
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output_dir).into_owned())
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            chunk_interval: Duration::from_millis(self.chunk_interval_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
        }
    }

    pub fn microphone(&self) -> AudioConstraints {
        AudioConstraints {
            echo_cancellation: self.echo_cancellation,
            noise_suppression: self.noise_suppression,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub exclude_patterns: Vec<String>,
    pub display: String,
    pub system_audio_device: String,
    pub microphone_device: String,
    pub ffmpeg: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let ffmpeg = FfmpegConfig::default();
        Self {
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            display: ffmpeg.display,
            system_audio_device: ffmpeg.system_audio_device,
            microphone_device: ffmpeg.microphone_device,
            ffmpeg: ffmpeg.binary,
        }
    }
}

impl CaptureConfig {
    pub fn ffmpeg(&self) -> FfmpegConfig {
        FfmpegConfig {
            binary: self.ffmpeg.clone(),
            display: self.display.clone(),
            system_audio_device: self.system_audio_device.clone(),
            microphone_device: self.microphone_device.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorTransportKind {
    WebSocket,
    Nats,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enabled: bool,
    pub transport: MirrorTransportKind,
    pub url: String,
    pub connect_timeout_ms: u64,
    pub close_timeout_ms: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transport: MirrorTransportKind::WebSocket,
            url: "ws://127.0.0.1:8000/api/streaming/ws".to_string(),
            connect_timeout_ms: 3000,
            close_timeout_ms: 2000,
        }
    }
}

impl MirrorConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl Config {
    /// Load `path` (extension optional) with `SCREEN_RECORDER__SECTION__KEY`
    /// environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("SCREEN_RECORDER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
