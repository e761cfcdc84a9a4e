//! Content-addressed chunk transports for Kiln.
//!
//! A transport is an append-only key/value store keyed by [`ObjectId`]. A
//! given id maps to one payload for the lifetime of the store, so writes are
//! idempotent and partially completed sends never need cleanup.
//!
//! # Backends
//!
//! All backends implement the [`Transport`] trait:
//!
//! - [`MemoryTransport`]: process-local map for caching and tests
//! - [`RemoteTransport`]: batched writes to a network store through an
//!   [`ObjectApi`] client ([`HttpObjectApi`] speaks the Kiln HTTP protocol)
//!
//! # Design Rules
//!
//! 1. Payloads are opaque; transports never parse or re-hash them.
//! 2. A second `put` of a known id is a no-op.
//! 3. Buffered writes are not durable until `flush` returns.
//! 4. All I/O errors are propagated with the transport name and object id.
//!
//! [`ObjectId`]: kiln_types::ObjectId

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod remote;
pub mod traits;

pub use api::{ApiError, ApiResult, ObjectApi};
pub use config::{Account, BatchConfig, RemoteContext};
pub use error::{TransportError, TransportResult};
pub use http::HttpObjectApi;
pub use memory::MemoryTransport;
pub use remote::RemoteTransport;
pub use traits::Transport;
