//! The in-memory node model.
//!
//! A [`Node`] is an ordered property bag. Nodes are shared handles: cloning a
//! `Node` yields a second handle to the same instance, and two handles can be
//! compared for identity with [`Node::ptr_eq`]. Decomposition tells instances
//! apart by identity (for cycle detection and to avoid re-walking shared
//! subgraphs); a receive returns one shared instance per stored chunk.
//!
//! Equality (`==`) is structural. It recurses through nested nodes and will
//! not terminate on a cyclic graph; such graphs are rejected by decomposition
//! and never produced by a receive.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::value::Value;

/// A single named property of a node.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: Value,
    /// Whether the value is split out into its own chunk.
    pub detached: bool,
}

/// Ordered, shared property bag.
#[derive(Clone, Default)]
pub struct Node {
    inner: Arc<RwLock<Vec<Property>>>,
}

impl Node {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Node::set`].
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder form of [`Node::set_detached`].
    pub fn with_detached(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_detached(key, value);
        self
    }

    /// Set an inline property. Replacing an existing key keeps its position.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key.into(), value.into(), false);
    }

    /// Set a detachable property: its node values become separate chunks.
    pub fn set_detached(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key.into(), value.into(), true);
    }

    fn insert(&self, key: String, value: Value, detached: bool) {
        let mut props = self.inner.write().expect("lock poisoned");
        match props.iter_mut().find(|p| p.key == key) {
            Some(existing) => {
                existing.value = value;
                existing.detached = detached;
            }
            None => props.push(Property {
                key,
                value,
                detached,
            }),
        }
    }

    /// Remove a property, returning its value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut props = self.inner.write().expect("lock poisoned");
        let index = props.iter().position(|p| p.key == key)?;
        Some(props.remove(index).value)
    }

    /// Value under `key`. Node values come back as shared handles.
    pub fn get(&self, key: &str) -> Option<Value> {
        let props = self.inner.read().expect("lock poisoned");
        props.iter().find(|p| p.key == key).map(|p| p.value.clone())
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_node(&self, key: &str) -> Option<Node> {
        match self.get(key)? {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> Option<Vec<Value>> {
        match self.get(key)? {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether `key` exists and is marked detachable.
    pub fn is_detached(&self, key: &str) -> bool {
        let props = self.inner.read().expect("lock poisoned");
        props.iter().any(|p| p.key == key && p.detached)
    }

    /// Property keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        let props = self.inner.read().expect("lock poisoned");
        props.iter().map(|p| p.key.clone()).collect()
    }

    /// Snapshot of all properties in insertion order.
    pub fn properties(&self) -> Vec<Property> {
        self.inner.read().expect("lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").is_empty()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable key for this instance, valid while any handle is alive.
    pub fn instance_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let ours = self.properties();
        let theirs = other.properties();
        ours == theirs
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let props = self.properties();
        let mut map = f.debug_map();
        for p in &props {
            if p.detached {
                map.entry(&format_args!("@{}", p.key), &p.value);
            } else {
                map.entry(&p.key, &p.value);
            }
        }
        map.finish()
    }
}
