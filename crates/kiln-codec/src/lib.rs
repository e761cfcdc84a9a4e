//! Canonical encoding and content hashing for Kiln.
//!
//! A chunk's identity is the domain-separated BLAKE3 hash of its canonical
//! payload: a JSON object whose members follow the node's own property
//! order, with detached values replaced by `{"__ref": "<hex>"}` tokens and
//! detached keys written as `@name`. The stored form of a chunk wraps the
//! canonical members with its `id` and `__closure` table; neither feeds the
//! hash.
//!
//! Decoding preserves member order, so re-encoding a decoded chunk
//! reproduces its canonical bytes and the id can be re-verified.

pub mod canonical;
pub mod chunk;
pub mod error;
pub mod hasher;
pub mod wire;

pub use canonical::{encode, object_id};
pub use chunk::Chunk;
pub use error::{CodecError, CodecResult};
pub use hasher::ContentHasher;
pub use wire::{WireField, WireObject, WireValue};
