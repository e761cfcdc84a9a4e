//! Foundation types for Kiln.
//!
//! Every other Kiln crate depends on `kiln-types`. It defines the in-memory
//! object graph handed to the decomposer and returned by a receive, plus the
//! identifiers and closure tables that describe stored chunks.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash)
//! - [`Node`]: Ordered property bag with instance identity
//! - [`Value`]: Closed union of everything a property may hold
//! - [`Closure`]: Minimum detachment depth of every transitively referenced id

pub mod closure;
pub mod error;
pub mod node;
pub mod object;
pub mod value;

pub use closure::Closure;
pub use error::TypeError;
pub use node::{Node, Property};
pub use object::ObjectId;
pub use value::Value;
