use thiserror::Error;

use kiln_codec::CodecError;
use kiln_graph::GraphError;
use kiln_transport::TransportError;
use kiln_types::ObjectId;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The graph could not be decomposed (cycle, unsupported value,
    /// reserved key).
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A transport read or write failed; names the transport and object.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A referenced object is not present on the transport.
    #[error("missing object {id}{}", referenced_by(.parent))]
    MissingObject {
        id: ObjectId,
        /// The chunk holding the reference; `None` for the requested root.
        parent: Option<ObjectId>,
    },

    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        expected: ObjectId,
        computed: ObjectId,
    },

    /// A payload could not be decoded or its references are inconsistent.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    #[error("send requires at least one transport")]
    NoTransports,

    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Map a codec failure on the payload stored under `id`.
    pub(crate) fn from_payload(id: ObjectId, err: CodecError) -> Self {
        match err {
            CodecError::HashMismatch { expected, computed } => Self::HashMismatch { expected, computed },
            other => Self::CorruptObject {
                id,
                reason: other.to_string(),
            },
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

fn referenced_by(parent: &Option<ObjectId>) -> String {
    match parent {
        Some(p) => format!(" referenced by {p}"),
        None => String::new(),
    }
}

/// Unwrap a finished task, re-raising panics and treating aborts as
/// cancellation.
pub(crate) fn joined<T>(result: Result<SyncResult<T>, tokio::task::JoinError>) -> SyncResult<T> {
    match result {
        Ok(inner) => inner,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(SyncError::Cancelled),
    }
}
