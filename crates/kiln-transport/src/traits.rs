use async_trait::async_trait;
use kiln_types::ObjectId;

use crate::error::TransportResult;

/// Content-addressed chunk store.
///
/// All implementations must satisfy these invariants:
/// - A stored id maps to exactly one payload for the store's lifetime.
/// - `put` of an id that is already stored (or pending) is a no-op.
/// - Concurrent calls are safe; payloads are immutable once written.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable name, used in errors and progress reports.
    fn name(&self) -> &str;

    /// Store `payload` under `id`.
    async fn put(&self, id: ObjectId, payload: String) -> TransportResult<()>;

    /// Fetch the payload stored under `id`.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    async fn get(&self, id: &ObjectId) -> TransportResult<Option<String>>;

    /// Check whether `id` is stored.
    async fn has(&self, id: &ObjectId) -> TransportResult<bool>;

    /// Fetch several payloads, one result per requested id in order.
    ///
    /// Default implementation calls `get()` for each id. Backends may
    /// override to save round-trips.
    async fn get_many(&self, ids: &[ObjectId]) -> TransportResult<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.get(id).await?);
        }
        Ok(out)
    }

    /// Existence check for several ids, one result per id in order.
    async fn has_many(&self, ids: &[ObjectId]) -> TransportResult<Vec<bool>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.has(id).await?);
        }
        Ok(out)
    }

    /// Make every accepted `put` durable. Unbuffered stores do nothing.
    async fn flush(&self) -> TransportResult<()> {
        Ok(())
    }
}
