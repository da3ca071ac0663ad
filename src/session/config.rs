use std::time::Duration;

/// Configuration shared by every session a coordinator runs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often each encoder emits a chunk
    /// Default: 1 second
    pub chunk_interval: Duration,

    /// How long a stopping pipeline may take to flush its final chunk
    /// Default: 5 seconds
    pub drain_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_interval: Duration::from_millis(1000),
            drain_timeout: Duration::from_secs(5),
        }
    }
}
