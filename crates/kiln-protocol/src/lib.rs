//! Wire protocol for Kiln remote object stores.
//!
//! Defines the HTTP endpoints and JSON bodies exchanged between the remote
//! transport and an object store server. Uploads are batches of
//! `(id, payload)` pairs; downloads are single or multi-get by id. All
//! requests for a stream carry the same bearer credentials.

pub mod auth;
pub mod endpoint;
pub mod error;
pub mod message;

pub use auth::AuthMethod;
pub use endpoint::{endpoints, validate_stream_id, HealthResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    DownloadResponse, ErrorResponse, ExistsResponse, IdsRequest, ObjectEntry, UploadRequest,
    UploadResponse, MAX_BATCH_BYTES, PROTOCOL_VERSION,
};
