use async_trait::async_trait;

use kiln_protocol::{ObjectEntry, UploadRequest};
use kiln_types::ObjectId;

/// Errors from a remote object store client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (connect failure, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The store answered with a non-success status.
    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Credentials were missing, invalid, or lack access to the stream.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The response body could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ApiError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Unauthorized(_) | Self::Protocol(_) => false,
        }
    }
}

/// Result alias for object store client calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Client for a remote content-addressed object store.
///
/// Every call is scoped to a stream; credentials belong to the client
/// instance, never to individual calls.
#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Upload a batch. Returns how many objects were newly stored.
    async fn upload(&self, stream: &str, batch: &UploadRequest) -> ApiResult<usize>;

    /// Fetch one payload; `None` if the store does not have it.
    async fn download(&self, stream: &str, id: &ObjectId) -> ApiResult<Option<String>>;

    /// Fetch several payloads. Absent ids are omitted from the result.
    async fn download_many(&self, stream: &str, ids: &[ObjectId]) -> ApiResult<Vec<ObjectEntry>>;

    /// The subset of `ids` the store holds.
    async fn exists(&self, stream: &str, ids: &[ObjectId]) -> ApiResult<Vec<ObjectId>>;
}
