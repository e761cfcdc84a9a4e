use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use kiln_transport::MemoryTransport;

use crate::auth::AuthProvider;
use crate::config::ServerConfig;

/// Shared state behind every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub auth: Arc<dyn AuthProvider>,
    streams: RwLock<HashMap<String, Arc<MemoryTransport>>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let auth = config.auth_provider();
        Self::with_auth(config, auth)
    }

    pub fn with_auth(config: ServerConfig, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            config,
            auth,
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Store for `stream`, if anything was ever uploaded to it.
    pub fn stream(&self, stream: &str) -> Option<Arc<MemoryTransport>> {
        self.streams.read().expect("lock poisoned").get(stream).cloned()
    }

    /// Store for `stream`, created on first use.
    pub fn stream_or_create(&self, stream: &str) -> Arc<MemoryTransport> {
        let mut streams = self.streams.write().expect("lock poisoned");
        Arc::clone(
            streams
                .entry(stream.to_string())
                .or_insert_with(|| Arc::new(MemoryTransport::named(stream))),
        )
    }

    /// Names of all streams, sorted.
    pub fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .streams
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
