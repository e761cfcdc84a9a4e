use crate::error::{ProtocolError, ProtocolResult};

/// HTTP endpoint paths for the Kiln object protocol.
///
/// Route templates use axum's `:param` syntax; the `*_path` helpers render
/// concrete paths for clients.
pub mod endpoints {
    use super::*;

    pub const HEALTH: &str = "/v1/health";
    pub const UPLOAD: &str = "/v1/streams/:stream/objects";
    pub const OBJECT: &str = "/v1/streams/:stream/objects/:id";
    pub const DOWNLOAD: &str = "/v1/streams/:stream/download";
    pub const EXISTS: &str = "/v1/streams/:stream/exists";

    pub fn upload_path(stream: &str) -> ProtocolResult<String> {
        Ok(format!("/v1/streams/{}/objects", checked(stream)?))
    }

    pub fn object_path(stream: &str, id: &kiln_types::ObjectId) -> ProtocolResult<String> {
        Ok(format!("/v1/streams/{}/objects/{id}", checked(stream)?))
    }

    pub fn download_path(stream: &str) -> ProtocolResult<String> {
        Ok(format!("/v1/streams/{}/download", checked(stream)?))
    }

    pub fn exists_path(stream: &str) -> ProtocolResult<String> {
        Ok(format!("/v1/streams/{}/exists", checked(stream)?))
    }
}

/// Stream ids are path segments: non-empty ASCII alphanumerics, `-` or `_`.
pub fn validate_stream_id(stream: &str) -> ProtocolResult<()> {
    let valid = !stream.is_empty()
        && stream.len() <= 128
        && stream
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(ProtocolError::InvalidStreamId(stream.to_string()))
    }
}

fn checked(stream: &str) -> ProtocolResult<&str> {
    validate_stream_id(stream)?;
    Ok(stream)
}

/// Health check response.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub protocol_version: u32,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: crate::message::PROTOCOL_VERSION,
        }
    }
}
