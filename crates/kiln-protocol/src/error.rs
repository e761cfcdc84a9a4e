use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid stream id: {0:?}")]
    InvalidStreamId(String),

    #[error("batch too large: {size} bytes (max {max})")]
    BatchTooLarge { size: usize, max: usize },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
