use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use kiln_types::ObjectId;

use crate::error::TransportResult;
use crate::traits::Transport;

/// In-memory, HashMap-based transport.
///
/// Used as a receive-side cache and in tests. Payloads are held behind a
/// `RwLock`; reads clone them out.
pub struct MemoryTransport {
    name: String,
    objects: RwLock<HashMap<ObjectId, String>>,
    /// Number of puts that actually stored a new object.
    writes: AtomicU64,
}

impl MemoryTransport {
    /// Create a new empty transport named `memory`.
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create a new empty transport with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the transport holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total payload bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|p| p.len() as u64)
            .sum()
    }

    /// Number of puts that stored a previously absent object.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Stored payload for `id`, without going through the async API.
    pub fn payload(&self, id: &ObjectId) -> Option<String> {
        self.objects.read().expect("lock poisoned").get(id).cloned()
    }

    /// Sorted list of all stored ids.
    pub fn ids(&self) -> Vec<ObjectId> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every stored object.
    pub fn objects(&self) -> HashMap<ObjectId, String> {
        self.objects.read().expect("lock poisoned").clone()
    }

    /// Store synchronously. Returns `true` if the object was new.
    pub fn insert(&self, id: ObjectId, payload: String) -> bool {
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(&id) {
            return false;
        }
        map.insert(id, payload);
        self.writes.fetch_add(1, Ordering::Relaxed);
        true
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, id: ObjectId, payload: String) -> TransportResult<()> {
        // Content never changes for a fixed id, so a repeat put is dropped.
        self.insert(id, payload);
        Ok(())
    }

    async fn get(&self, id: &ObjectId) -> TransportResult<Option<String>> {
        Ok(self.payload(id))
    }

    async fn has(&self, id: &ObjectId) -> TransportResult<bool> {
        Ok(self.objects.read().expect("lock poisoned").contains_key(id))
    }

    async fn get_many(&self, ids: &[ObjectId]) -> TransportResult<Vec<Option<String>>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(ids.iter().map(|id| map.get(id).cloned()).collect())
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("name", &self.name)
            .field("object_count", &self.len())
            .finish()
    }
}
