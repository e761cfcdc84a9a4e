use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kiln_protocol::MAX_BATCH_BYTES;

use crate::auth::{AllowAllAuth, AuthProvider, StaticTokenAuth};
use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Accepted bearer tokens. Empty means no authentication.
    pub tokens: Vec<String>,
    /// Let unauthenticated callers read when tokens are configured.
    pub allow_anonymous_read: bool,
    /// Largest accepted upload batch, in summed payload bytes.
    pub max_batch_bytes: usize,
    /// Re-hash uploaded payloads and reject mismatched ids.
    pub verify_uploads: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 7411)),
            tokens: Vec::new(),
            allow_anonymous_read: false,
            max_batch_bytes: MAX_BATCH_BYTES,
            verify_uploads: true,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The auth provider this configuration calls for.
    pub fn auth_provider(&self) -> Arc<dyn AuthProvider> {
        if self.tokens.is_empty() {
            Arc::new(AllowAllAuth)
        } else {
            Arc::new(StaticTokenAuth::new(
                self.tokens.iter().cloned(),
                self.allow_anonymous_read,
            ))
        }
    }

    /// Limit on a whole request body. Payloads are JSON strings inside the
    /// batch, so escaping can roughly double their size on the wire.
    pub fn request_body_limit(&self) -> usize {
        self.max_batch_bytes.saturating_mul(2).saturating_add(64 * 1024)
    }
}
