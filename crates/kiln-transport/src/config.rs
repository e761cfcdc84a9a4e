use std::time::Duration;

use serde::{Deserialize, Serialize};

use kiln_protocol::AuthMethod;

/// An authenticated account on a remote object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Base URL of the store, e.g. `https://objects.example.com`.
    pub server_url: String,
    pub auth: AuthMethod,
}

impl Account {
    pub fn new(server_url: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            server_url: server_url.into(),
            auth,
        }
    }
}

/// Write batching and retry policy for a remote transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Flush once buffered payloads reach this many bytes.
    pub max_batch_bytes: usize,
    /// Flush once this many objects are buffered.
    pub max_batch_objects: usize,
    /// Retries of a transiently failed flush before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single retry delay.
    pub max_backoff: Duration,
    /// Per-request timeout for the HTTP client.
    pub request_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: 1024 * 1024,
            max_batch_objects: 500,
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl BatchConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Everything a remote transport needs, passed in at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteContext {
    pub account: Account,
    /// Stream the objects belong to on the remote store.
    pub stream_id: String,
    #[serde(default)]
    pub batching: BatchConfig,
}

impl RemoteContext {
    pub fn new(account: Account, stream_id: impl Into<String>) -> Self {
        Self {
            account,
            stream_id: stream_id.into(),
            batching: BatchConfig::default(),
        }
    }

    pub fn with_batching(mut self, batching: BatchConfig) -> Self {
        self.batching = batching;
        self
    }
}
