use std::collections::HashMap;

use kiln_codec::Chunk;
use kiln_types::{Closure, ObjectId};

/// A chunk emitted by the decomposer, ready to be written.
#[derive(Clone, Debug)]
pub struct DecomposedChunk {
    pub chunk: Chunk,
    /// Stored payload text.
    pub payload: String,
    /// Direct references that were emitted in the same run.
    pub children: Vec<ObjectId>,
    /// 0 for chunks without emitted children, otherwise one more than the
    /// highest child.
    pub height: u32,
}

impl DecomposedChunk {
    pub fn id(&self) -> ObjectId {
        self.chunk.id
    }

    pub fn closure(&self) -> &Closure {
        &self.chunk.closure
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Output of one decomposition run.
///
/// Chunks are held in height order: every chunk appears after all chunks of
/// the run it references, and every distinct id appears exactly once.
#[derive(Clone, Debug)]
pub struct Decomposition {
    root: ObjectId,
    chunks: Vec<DecomposedChunk>,
    index: HashMap<ObjectId, usize>,
}

impl Decomposition {
    pub(crate) fn new(
        root: ObjectId,
        chunks: Vec<DecomposedChunk>,
        index: HashMap<ObjectId, usize>,
    ) -> Self {
        Self {
            root,
            chunks,
            index,
        }
    }

    /// Id of the root chunk.
    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// Number of distinct chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks in dependency order.
    pub fn chunks(&self) -> &[DecomposedChunk] {
        &self.chunks
    }

    pub fn get(&self, id: &ObjectId) -> Option<&DecomposedChunk> {
        self.index.get(id).map(|&i| &self.chunks[i])
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains_key(id)
    }

    /// Closure table of an emitted chunk.
    pub fn closure_of(&self, id: &ObjectId) -> Option<&Closure> {
        self.get(id).map(DecomposedChunk::closure)
    }

    /// Total payload bytes across all chunks.
    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(DecomposedChunk::size).sum()
    }

    /// Chunks grouped by height, lowest first.
    ///
    /// Writing each level completely before starting the next guarantees a
    /// reader never sees a chunk whose children are not yet stored. Chunks
    /// within one level never reference each other.
    pub fn levels(&self) -> Vec<Vec<&DecomposedChunk>> {
        let max = self.chunks.iter().map(|c| c.height).max().unwrap_or(0);
        let mut levels: Vec<Vec<&DecomposedChunk>> = vec![Vec::new(); max as usize + 1];
        for chunk in &self.chunks {
            levels[chunk.height as usize].push(chunk);
        }
        levels.retain(|level| !level.is_empty());
        levels
    }

    /// Consume into chunks (dependency order) and the root id.
    pub fn into_parts(self) -> (ObjectId, Vec<DecomposedChunk>) {
        (self.root, self.chunks)
    }
}
