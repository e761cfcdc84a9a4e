//! Node graph decomposition for Kiln.
//!
//! [`decompose`] walks a [`Node`](kiln_types::Node) tree post-order, splits it
//! at every detached property into content-addressed chunks, and records the
//! closure table of each chunk. The resulting [`Decomposition`] lists every
//! distinct chunk once, children before parents, grouped into height levels
//! that a writer can flush in dependency order.

pub mod decomposer;
pub mod decomposition;
pub mod error;

pub use decomposer::{decompose, Decomposer};
pub use decomposition::{DecomposedChunk, Decomposition};
pub use error::{GraphError, GraphResult};
