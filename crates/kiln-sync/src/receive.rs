//! Reconstruction of a node graph from a transport.
//!
//! The root payload is fetched first, then its closure table is prefetched
//! in one batched read. References are followed breadth-first from the root,
//! so every id is first reached at its minimum detachment depth; whatever
//! the prefetch did not cover is read in batched waves. Only once every
//! reachable chunk is present and verified are nodes materialized, one
//! shared instance per id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use kiln_codec::{Chunk, WireObject, WireValue};
use kiln_transport::Transport;
use kiln_types::{Node, ObjectId, Value};

use crate::error::{SyncError, SyncResult};
use crate::options::ReceiveOptions;

/// Receive the graph rooted at `id` with default options.
pub async fn receive(id: ObjectId, transport: Arc<dyn Transport>) -> SyncResult<Node> {
    receive_with(id, transport, &ReceiveOptions::default()).await
}

/// Receive the graph rooted at `id`.
pub async fn receive_with(
    id: ObjectId,
    transport: Arc<dyn Transport>,
    options: &ReceiveOptions,
) -> SyncResult<Node> {
    let mut receiver = Receiver::new(transport.as_ref(), options);
    receiver.resolve(id).await?;
    let node = receiver.materialize(id)?;
    receiver.write_cache().await?;

    info!(
        root = %id.short_hex(),
        objects = receiver.chunks.len(),
        fetched = receiver.fetched.len(),
        transport = transport.name(),
        "receive complete"
    );
    Ok(node)
}

/// State of one receive call.
struct Receiver<'a> {
    source: &'a dyn Transport,
    options: &'a ReceiveOptions,
    /// Verified chunks by id.
    chunks: HashMap<ObjectId, Chunk>,
    /// Ids read from `source` (not the cache), with their payloads.
    fetched: Vec<(ObjectId, String)>,
    /// Ids a read reported absent.
    absent: HashSet<ObjectId>,
    /// Minimum detachment depth of each reachable id.
    depth: HashMap<ObjectId, u32>,
    memo: HashMap<ObjectId, Node>,
    building: HashSet<ObjectId>,
}

impl<'a> Receiver<'a> {
    fn new(source: &'a dyn Transport, options: &'a ReceiveOptions) -> Self {
        Self {
            source,
            options,
            chunks: HashMap::new(),
            fetched: Vec::new(),
            absent: HashSet::new(),
            depth: HashMap::new(),
            memo: HashMap::new(),
            building: HashSet::new(),
        }
    }

    // ---------------------------------------------------------------
    // Fetch
    // ---------------------------------------------------------------

    /// Fetch every chunk reachable from `root` within the depth limit.
    async fn resolve(&mut self, root: ObjectId) -> SyncResult<()> {
        self.fetch(&[root]).await?;
        let Some(root_chunk) = self.chunks.get(&root) else {
            return Err(SyncError::MissingObject {
                id: root,
                parent: None,
            });
        };

        let prefetch = root_chunk.closure.ids_by_depth(self.options.max_depth);
        if !prefetch.is_empty() {
            debug!(root = %root.short_hex(), ids = prefetch.len(), "prefetching closure");
            self.fetch(&prefetch).await?;
        }

        self.depth.insert(root, 0);
        let mut frontier = vec![root];
        while !frontier.is_empty() {
            let mut next: Vec<(ObjectId, ObjectId)> = Vec::new();
            for parent in &frontier {
                let depth = self.depth[parent];
                if !self.expands(depth) {
                    continue;
                }
                for child in detached_references(&self.chunks[parent].body) {
                    if !self.depth.contains_key(&child) {
                        self.depth.insert(child, depth + 1);
                        next.push((child, *parent));
                    }
                }
            }

            let wanted: Vec<ObjectId> = next.iter().map(|(id, _)| *id).collect();
            self.fetch(&wanted).await?;
            for (id, parent) in &next {
                if !self.chunks.contains_key(id) {
                    return Err(SyncError::MissingObject {
                        id: *id,
                        parent: Some(*parent),
                    });
                }
            }
            frontier = wanted;
        }
        Ok(())
    }

    /// Whether references held by a chunk at `depth` are followed.
    fn expands(&self, depth: u32) -> bool {
        self.options.max_depth.map_or(true, |max| depth < max)
    }

    /// Read every id not yet seen, cache first.
    async fn fetch(&mut self, ids: &[ObjectId]) -> SyncResult<()> {
        let mut seen = HashSet::new();
        let wanted: Vec<ObjectId> = ids
            .iter()
            .copied()
            .filter(|id| !self.chunks.contains_key(id) && !self.absent.contains(id))
            .filter(|id| seen.insert(*id))
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }

        let options = self.options;
        let mut misses = wanted.clone();
        if let Some(cache) = &options.cache {
            self.check_cancelled()?;
            let cached = cache.get_many(&wanted).await?;
            misses.clear();
            for (id, payload) in wanted.iter().zip(cached) {
                match payload {
                    Some(payload) => self.accept(*id, &payload)?,
                    None => misses.push(*id),
                }
            }
        }
        if misses.is_empty() {
            return Ok(());
        }

        self.check_cancelled()?;
        let payloads = self.source.get_many(&misses).await?;
        let mut found = 0;
        for (id, payload) in misses.iter().zip(payloads) {
            match payload {
                Some(payload) => {
                    self.accept(*id, &payload)?;
                    self.fetched.push((*id, payload));
                    found += 1;
                }
                None => {
                    self.absent.insert(*id);
                }
            }
        }
        debug!(
            transport = self.source.name(),
            requested = misses.len(),
            found,
            "fetched wave"
        );
        Ok(())
    }

    /// Decode and (optionally) verify the payload stored under `id`.
    fn accept(&mut self, id: ObjectId, payload: &str) -> SyncResult<()> {
        let chunk = Chunk::decode(payload).map_err(|e| SyncError::from_payload(id, e))?;
        if self.options.verify_hashes {
            chunk.verify(&id).map_err(|e| SyncError::from_payload(id, e))?;
        }
        self.chunks.insert(id, chunk);
        Ok(())
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.options.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    /// Store everything read from the source in the cache.
    async fn write_cache(&self) -> SyncResult<()> {
        let Some(cache) = &self.options.cache else {
            return Ok(());
        };
        for (id, payload) in &self.fetched {
            self.check_cancelled()?;
            cache.put(*id, payload.clone()).await?;
        }
        cache.flush().await?;
        debug!(cache = cache.name(), objects = self.fetched.len(), "populated cache");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Materialize
    // ---------------------------------------------------------------

    fn materialize(&mut self, id: ObjectId) -> SyncResult<Node> {
        if let Some(node) = self.memo.get(&id) {
            return Ok(node.clone());
        }
        if !self.building.insert(id) {
            return Err(SyncError::CorruptObject {
                id,
                reason: "chunk references itself".into(),
            });
        }
        let chunk = self
            .chunks
            .get(&id)
            .cloned()
            .ok_or(SyncError::MissingObject { id, parent: None })?;
        let expand = self.expands(self.depth.get(&id).copied().unwrap_or(0));
        let node = self.build(&chunk.body, expand)?;
        self.building.remove(&id);
        self.memo.insert(id, node.clone());
        Ok(node)
    }

    fn build(&mut self, body: &WireObject, expand: bool) -> SyncResult<Node> {
        let node = Node::new();
        for field in &body.fields {
            let value = self.value(&field.value, field.detached, expand)?;
            if field.detached {
                node.set_detached(field.key.clone(), value);
            } else {
                node.set(field.key.clone(), value);
            }
        }
        Ok(node)
    }

    /// References in detached positions become nodes; inline references and
    /// those beyond the depth limit stay as `Value::Ref`.
    fn value(&mut self, value: &WireValue, detached: bool, expand: bool) -> SyncResult<Value> {
        Ok(match value {
            WireValue::Null => Value::Null,
            WireValue::Bool(b) => Value::Bool(*b),
            WireValue::Number(n) => Value::Number(*n),
            WireValue::String(s) => Value::String(s.clone()),
            WireValue::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.value(item, detached, expand))
                    .collect::<SyncResult<Vec<_>>>()?,
            ),
            WireValue::Object(inner) => Value::Node(self.build(inner, expand)?),
            WireValue::Ref(id) if detached && expand => Value::Node(self.materialize(*id)?),
            WireValue::Ref(id) => Value::Ref(*id),
        })
    }
}

/// References a chunk holds in detached positions, in first-seen order.
fn detached_references(body: &WireObject) -> Vec<ObjectId> {
    fn visit(value: &WireValue, detached: bool, out: &mut Vec<ObjectId>) {
        match value {
            WireValue::Ref(id) if detached => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            WireValue::List(items) => items.iter().for_each(|v| visit(v, detached, out)),
            WireValue::Object(inner) => {
                for field in &inner.fields {
                    visit(&field.value, field.detached, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    for field in &body.fields {
        visit(&field.value, field.detached, &mut out);
    }
    out
}
