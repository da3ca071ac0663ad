use serde::{Deserialize, Serialize};

/// Pipeline lifecycle
///
/// `Idle -> Recording -> Stopping -> Stopped` on the happy path, `* -> Failed`
/// on a start or runtime error. An encoder error while `Stopping` still ends
/// `Stopped`. The stream is released on entering either terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Recording,
    Stopping,
    Stopped,
    Failed,
}

impl PipelineState {
    /// The encoder may still emit chunks
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Recording | Self::Stopping)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}
