use kiln_types::ObjectId;

use crate::api::ApiError;

/// Errors from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A write (or the flush carrying it) failed.
    #[error("transport `{transport}` failed to write {id}: {source}")]
    Write {
        transport: String,
        id: ObjectId,
        #[source]
        source: ApiError,
    },

    /// A read or existence check failed.
    #[error("transport `{transport}` failed to read {id}: {source}")]
    Read {
        transport: String,
        id: ObjectId,
        #[source]
        source: ApiError,
    },

    /// The transport could not be constructed.
    #[error("invalid transport configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// Name of the transport that failed, when known.
    pub fn transport(&self) -> Option<&str> {
        match self {
            Self::Write { transport, .. } | Self::Read { transport, .. } => Some(transport),
            Self::Config(_) => None,
        }
    }

    /// Id of the object involved, when known.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Write { id, .. } | Self::Read { id, .. } => Some(*id),
            Self::Config(_) => None,
        }
    }
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
