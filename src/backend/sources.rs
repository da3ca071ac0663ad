use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::capture::{CaptureSource, SourceEnumerator, SourceKind};
use crate::error::RecorderError;

/// Where an X11 source id points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    /// Monitor region on the root window
    Screen {
        width: u32,
        height: u32,
        x: i32,
        y: i32,
    },
    /// Top-level window by X id
    Window { xid: String },
}

impl SourceTarget {
    /// Parse an id produced by `X11Sources`
    ///
    /// `screen:{index}:{w}x{h}+{x}+{y}` or `window:{xid}`
    pub fn parse(id: &str) -> Option<Self> {
        if let Some(xid) = id.strip_prefix("window:") {
            if xid.is_empty() {
                return None;
            }
            return Some(Self::Window {
                xid: xid.to_string(),
            });
        }

        let rest = id.strip_prefix("screen:")?;
        let (_, geometry) = rest.split_once(':')?;
        let (size, offset) = geometry.split_once('+')?;
        let (width, height) = size.split_once('x')?;
        let (x, y) = offset.split_once('+')?;

        Some(Self::Screen {
            width: width.parse().ok()?,
            height: height.parse().ok()?,
            x: x.parse().ok()?,
            y: y.parse().ok()?,
        })
    }
}

/// Parse `xrandr --listmonitors`
///
/// ```text
/// Monitors: 2
///  0: +*eDP-1 1920/344x1080/193+0+0  eDP-1
///  1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1
/// ```
pub fn parse_monitors(output: &str) -> Vec<CaptureSource> {
    output
        .lines()
        .filter_map(|line| {
            let (index, rest) = line.trim().split_once(':')?;
            let index: usize = index.trim().parse().ok()?;
            let geometry = rest.split_whitespace().nth(1)?;

            // 1920/344x1080/193+0+0
            let (size, offset) = geometry.split_once('+')?;
            let (width, height) = size.split_once('x')?;
            let width = width.split('/').next()?;
            let height = height.split('/').next()?;

            Some(CaptureSource::new(
                format!("screen:{}:{}x{}+{}", index, width, height, offset),
                format!("Screen {}", index + 1),
                SourceKind::Screen,
            ))
        })
        .collect()
}

/// Parse `wmctrl -l`: `0x03a00007  0 host Window title`
pub fn parse_windows(output: &str) -> Vec<CaptureSource> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let xid = fields.next()?;
            if !xid.starts_with("0x") {
                return None;
            }

            // Skip desktop and host
            let title = fields.skip(2).collect::<Vec<_>>().join(" ");

            Some(CaptureSource::new(
                format!("window:{}", xid),
                title,
                SourceKind::Window,
            ))
        })
        .collect()
}

/// Screens from `xrandr`, windows from `wmctrl`
pub struct X11Sources {
    display: String,
}

impl X11Sources {
    pub fn new(display: impl Into<String>) -> Self {
        Self {
            display: display.into(),
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<std::process::Output> {
        Command::new(program)
            .args(args)
            .env("DISPLAY", &self.display)
            .output()
            .await
    }
}

#[async_trait::async_trait]
impl SourceEnumerator for X11Sources {
    async fn enumerate(&self) -> Result<Vec<CaptureSource>, RecorderError> {
        debug!("Enumerating X11 sources on {}", self.display);

        let monitors = self
            .run("xrandr", &["--listmonitors"])
            .await
            .map_err(|e| RecorderError::SourceEnumerationError(format!("xrandr: {}", e)))?;
        if !monitors.status.success() {
            return Err(RecorderError::SourceEnumerationError(format!(
                "xrandr failed on display {}: {}",
                self.display,
                String::from_utf8_lossy(&monitors.stderr).trim()
            )));
        }

        let mut sources = parse_monitors(&String::from_utf8_lossy(&monitors.stdout));

        match self.run("wmctrl", &["-l"]).await {
            Ok(output) if output.status.success() => {
                sources.extend(parse_windows(&String::from_utf8_lossy(&output.stdout)));
            }
            Ok(output) => warn!(
                "wmctrl failed, listing screens only: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!("wmctrl unavailable, listing screens only: {}", e),
        }

        info!("Found {} X11 source(s)", sources.len());
        Ok(sources)
    }

    fn name(&self) -> &str {
        "x11"
    }
}
