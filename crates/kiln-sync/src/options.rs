use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use kiln_transport::Transport;

use crate::progress::ProgressEvent;

/// Default number of in-flight writes per transport.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Options for [`send_with`](crate::send_with).
#[derive(Clone, Debug)]
pub struct SendOptions {
    /// Maximum concurrent `put` calls per transport. Zero is treated as one.
    pub concurrency: usize,
    /// Receives a [`ProgressEvent`] after every completed write. A dropped
    /// receiver is ignored.
    pub progress: Option<UnboundedSender<ProgressEvent>>,
    pub cancel: CancellationToken,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl SendOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Options for [`receive_with`](crate::receive_with).
#[derive(Clone)]
pub struct ReceiveOptions {
    /// Recompute each payload's id and reject mismatches.
    pub verify_hashes: bool,
    /// Stop following references this many detachment hops below the root.
    /// Unfetched references stay as `Value::Ref` in the returned tree.
    pub max_depth: Option<u32>,
    /// Consulted before the source; everything fetched from the source is
    /// written here before the receive returns.
    pub cache: Option<Arc<dyn Transport>>,
    pub cancel: CancellationToken,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            verify_hashes: true,
            max_depth: None,
            cache: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl ReceiveOptions {
    pub fn with_verify_hashes(mut self, verify: bool) -> Self {
        self.verify_hashes = verify;
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Transport>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for ReceiveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveOptions")
            .field("verify_hashes", &self.verify_hashes)
            .field("max_depth", &self.max_depth)
            .field("cache", &self.cache.as_ref().map(|c| c.name().to_string()))
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
