//! Exponential backoff retry policy for idempotent JSON-RPC reads.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Methods that change chain state. These are submitted exactly once;
/// retrying them is the caller's decision.
pub const NON_IDEMPOTENT_METHODS: &[&str] = &["eth_sendRawTransaction", "eth_sendTransaction"];

/// Returns `true` if `method` may be transparently re-sent after a transient failure.
pub fn is_idempotent(method: &str) -> bool {
    !NON_IDEMPOTENT_METHODS.contains(&method)
}

/// Configuration for the retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff delay.
    #[serde(default = "default_initial_backoff", with = "millis")]
    pub initial_backoff: Duration,
    /// Maximum backoff delay (caps exponential growth).
    #[serde(default = "default_max_backoff", with = "millis")]
    pub max_backoff: Duration,
    /// Multiplier applied to backoff on each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

/// Stateless retry policy: computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        Some(Duration::from_millis(base_ms.min(cap_ms) as u64))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
