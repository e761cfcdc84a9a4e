use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

/// Transitive detachment closure of a chunk.
///
/// Maps every id reachable from a node through detachment to the minimum
/// number of detachment hops needed to reach it. A node's own id is never a
/// member of its own closure. When the same id is reached along several
/// paths the smallest depth wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Closure(BTreeMap<ObjectId, u32>);

impl Closure {
    /// An empty closure (a node with no detached children).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` at `depth`, keeping the smaller depth on collision.
    pub fn insert_min(&mut self, id: ObjectId, depth: u32) {
        self.0
            .entry(id)
            .and_modify(|d| *d = (*d).min(depth))
            .or_insert(depth);
    }

    /// Merge a directly detached child: the child sits at depth 1 and every
    /// entry of its closure one hop further away.
    pub fn merge_child(&mut self, child: ObjectId, child_closure: &Closure) {
        self.insert_min(child, 1);
        for (id, depth) in child_closure.iter() {
            self.insert_min(id, depth + 1);
        }
    }

    /// Depth at which `id` is reachable, if it is reachable at all.
    pub fn depth_of(&self, id: &ObjectId) -> Option<u32> {
        self.0.get(id).copied()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(id, depth)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, u32)> + '_ {
        self.0.iter().map(|(id, depth)| (*id, *depth))
    }

    /// Ids ordered by ascending depth (ties broken by id), optionally
    /// restricted to entries no deeper than `max_depth`.
    ///
    /// This is the order a receiver prefetches in.
    pub fn ids_by_depth(&self, max_depth: Option<u32>) -> Vec<ObjectId> {
        let mut entries: Vec<(u32, ObjectId)> = self
            .0
            .iter()
            .filter(|(_, depth)| max_depth.map_or(true, |max| **depth <= max))
            .map(|(id, depth)| (*depth, *id))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, id)| id).collect()
    }
}

impl FromIterator<(ObjectId, u32)> for Closure {
    fn from_iter<I: IntoIterator<Item = (ObjectId, u32)>>(iter: I) -> Self {
        let mut closure = Closure::new();
        for (id, depth) in iter {
            closure.insert_min(id, depth);
        }
        closure
    }
}

impl IntoIterator for Closure {
    type Item = (ObjectId, u32);
    type IntoIter = btree_map::IntoIter<ObjectId, u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
