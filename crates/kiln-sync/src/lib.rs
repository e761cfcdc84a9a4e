//! Send and receive pipelines for Kiln.
//!
//! [`send`] decomposes a node graph once and writes every chunk to every
//! transport, children before parents. [`receive`] reads a graph back from a
//! single transport, verifying each payload against its id and sharing one
//! node instance per distinct chunk.
//!
//! Both pipelines are all-or-nothing: the first error aborts the call and
//! nothing partial is returned.

pub mod error;
pub mod options;
pub mod progress;
pub mod receive;
pub mod send;

pub use error::{SyncError, SyncResult};
pub use options::{ReceiveOptions, SendOptions};
pub use progress::ProgressEvent;
pub use receive::{receive, receive_with};
pub use send::{send, send_with};
