//! Reference object store server for Kiln.
//!
//! Serves the Kiln object protocol over HTTP: batched uploads, single and
//! multi-get downloads and existence queries, each scoped to a stream.
//! Streams are held in memory. Uploaded payloads are re-hashed and rejected
//! if their content does not match the id they were sent under.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{Action, AllowAllAuth, AuthProvider, Credentials, Identity, StaticTokenAuth};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::KilnServer;
pub use state::AppState;
