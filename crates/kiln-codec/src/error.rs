use kiln_types::ObjectId;

/// Errors from encoding, decoding and hashing chunks.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A leaf value has no canonical encoding.
    #[error("unsupported value under `{key}`: {reason}")]
    UnsupportedType { key: String, reason: String },

    /// A property key collides with the reserved wire vocabulary.
    #[error("reserved property key: `{0}`")]
    ReservedKey(String),

    /// A stored payload could not be parsed as a chunk.
    #[error("malformed chunk: {0}")]
    Malformed(String),

    /// A payload's recomputed id disagrees with the id it was stored under.
    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        expected: ObjectId,
        computed: ObjectId,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
