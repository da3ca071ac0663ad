use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the independent recordings a session can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Screen capture (with desktop audio when the platform provides it)
    Video,
    /// Loopback of whatever the machine is playing
    SystemAudio,
    /// Microphone input
    Microphone,
}

impl StreamKind {
    /// All kinds, in the order a session starts them
    pub const ALL: [StreamKind; 3] = [Self::Video, Self::SystemAudio, Self::Microphone];

    /// Human label used in notices and the recording indicator
    pub fn label(&self) -> &'static str {
        match self {
            Self::Video => "Video",
            Self::SystemAudio => "System Audio",
            Self::Microphone => "Microphone",
        }
    }

    /// Slug used in mirror endpoints and file names
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::SystemAudio => "system-audio",
            Self::Microphone => "microphone",
        }
    }

    /// The primary stream is the only one whose failure aborts a session
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Video)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
