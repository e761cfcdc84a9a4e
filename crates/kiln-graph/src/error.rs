//! Error types for graph decomposition.

use kiln_codec::CodecError;

/// Errors that can occur while decomposing a node graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A node instance was reached again while still being walked.
    #[error("cyclic graph: node at `{path}` refers back to one of its ancestors")]
    CyclicGraph {
        /// Property path from the root to the revisiting reference.
        path: String,
    },

    /// A node could not be canonically encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;
