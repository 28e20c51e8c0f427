use serde::{Deserialize, Serialize};

/// Readiness gating for the compute channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Dispatch attempts per command before it is abandoned, counting the
    /// initial one.
    pub retry_limit: u32,

    /// Delay between attempts while the service is not ready, in seconds.
    pub retry_delay_s: f64,

    /// Diagnostic events kept before the oldest are evicted.
    pub event_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            retry_limit: 10,
            retry_delay_s: 0.3,
            event_capacity: 1024,
        }
    }
}
