//! Post-order decomposition of a node graph into chunks.
//!
//! # Invariants
//!
//! - Every distinct id is emitted once per run.
//! - Once the walk finishes, a chunk sits after (and at a greater height than)
//!   every chunk of the same run it references, whether the reference came
//!   from a node or from an existing `Value::Ref`.
//! - A node instance reached twice (shared subgraph) is walked once.
//! - A node instance reached again while it is still on the walk path is a
//!   cycle and fails the run.
//! - A chunk's closure holds the minimum detachment depth of every id it
//!   reaches; its own id never appears in it.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use kiln_codec::{Chunk, WireObject, WireValue};
use kiln_types::{Closure, Node, ObjectId, Value};

use crate::decomposition::{DecomposedChunk, Decomposition};
use crate::error::{GraphError, GraphResult};

/// Decompose `root` into content-addressed chunks.
pub fn decompose(root: &Node) -> GraphResult<Decomposition> {
    Decomposer::new().run(root)
}

/// State of a single decomposition run.
///
/// Nothing here outlives the run: the visited and emitted sets are scoped to
/// one call so concurrent runs over different roots never interact.
#[derive(Default)]
pub struct Decomposer {
    /// Instances currently being walked.
    on_path: HashSet<usize>,
    /// Property path for error messages.
    path: Vec<String>,
    /// Boundary instances already walked, with their id and closure.
    walked: HashMap<usize, (ObjectId, Closure)>,
    chunks: Vec<DecomposedChunk>,
    index: HashMap<ObjectId, usize>,
}

impl Decomposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `root` and return every chunk it decomposes into.
    pub fn run(mut self, root: &Node) -> GraphResult<Decomposition> {
        self.path.push("root".to_string());
        let (root_id, _) = self.walk_boundary(root)?;
        self.link();
        debug!(
            root = %root_id.short_hex(),
            chunks = self.chunks.len(),
            "decomposed node graph"
        );
        Ok(Decomposition::new(root_id, self.chunks, self.index))
    }

    // ---------------------------------------------------------------
    // Walk
    // ---------------------------------------------------------------

    /// Walk a node that becomes its own chunk.
    fn walk_boundary(&mut self, node: &Node) -> GraphResult<(ObjectId, Closure)> {
        let key = node.instance_key();
        if let Some((id, closure)) = self.walked.get(&key) {
            return Ok((*id, closure.clone()));
        }

        self.enter(node)?;
        let mut closure = Closure::new();
        let body = self.encode_body(node, &mut closure)?;
        self.leave(node);

        let chunk = Chunk::new(body, closure.clone())?;
        let id = chunk.id;
        self.emit(chunk)?;
        self.walked.insert(key, (id, closure.clone()));
        Ok((id, closure))
    }

    /// Encode a node's properties, merging every detached descendant into
    /// `closure`. Inline nodes share the closure of the enclosing chunk.
    fn encode_body(&mut self, node: &Node, closure: &mut Closure) -> GraphResult<WireObject> {
        let mut body = WireObject::new();
        for prop in node.properties() {
            self.path.push(if prop.detached {
                format!("@{}", prop.key)
            } else {
                prop.key.clone()
            });
            let value = if prop.detached {
                self.detached_value(&prop.value, closure)?
            } else {
                self.inline_value(&prop.value, closure)?
            };
            self.path.pop();
            body.push(prop.key, prop.detached, value);
        }
        Ok(body)
    }

    fn detached_value(&mut self, value: &Value, closure: &mut Closure) -> GraphResult<WireValue> {
        match value {
            Value::Node(child) => {
                let (id, child_closure) = self.walk_boundary(child)?;
                closure.merge_child(id, &child_closure);
                Ok(WireValue::Ref(id))
            }
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    self.path.push(format!("[{i}]"));
                    out.push(self.detached_value(item, closure)?);
                    self.path.pop();
                }
                Ok(WireValue::List(out))
            }
            Value::Ref(id) => {
                closure.insert_min(*id, 1);
                Ok(WireValue::Ref(*id))
            }
            other => self.inline_value(other, closure),
        }
    }

    fn inline_value(&mut self, value: &Value, closure: &mut Closure) -> GraphResult<WireValue> {
        Ok(match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Number(n) => WireValue::Number(*n),
            Value::String(s) => WireValue::String(s.clone()),
            // Inline references are not detachment edges.
            Value::Ref(id) => WireValue::Ref(*id),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    self.path.push(format!("[{i}]"));
                    out.push(self.inline_value(item, closure)?);
                    self.path.pop();
                }
                WireValue::List(out)
            }
            Value::Node(child) => {
                self.enter(child)?;
                let body = self.encode_body(child, closure)?;
                self.leave(child);
                WireValue::Object(body)
            }
        })
    }

    fn enter(&mut self, node: &Node) -> GraphResult<()> {
        if !self.on_path.insert(node.instance_key()) {
            return Err(GraphError::CyclicGraph {
                path: self.path.join("."),
            });
        }
        Ok(())
    }

    fn leave(&mut self, node: &Node) {
        self.on_path.remove(&node.instance_key());
    }

    // ---------------------------------------------------------------
    // Emission
    // ---------------------------------------------------------------

    fn emit(&mut self, chunk: Chunk) -> GraphResult<()> {
        if self.index.contains_key(&chunk.id) {
            debug!(id = %chunk.id.short_hex(), "duplicate content, skipping emission");
            return Ok(());
        }

        let payload = chunk.to_payload()?;

        debug!(
            id = %chunk.id.short_hex(),
            bytes = payload.len(),
            closure = chunk.closure.len(),
            "emitted chunk"
        );
        self.index.insert(chunk.id, self.chunks.len());
        self.chunks.push(DecomposedChunk {
            chunk,
            payload,
            children: Vec::new(),
            height: 0,
        });
        Ok(())
    }

    /// Resolve children and heights against the finished index, then put the
    /// chunks in height order.
    ///
    /// A `Value::Ref` may name a chunk that is emitted later in the run, so
    /// neither can be settled at emission time.
    fn link(&mut self) {
        for chunk in &mut self.chunks {
            chunk.children = chunk
                .chunk
                .references()
                .into_iter()
                .filter(|id| self.index.contains_key(id))
                .collect();
        }

        let mut heights: Vec<Option<u32>> = vec![None; self.chunks.len()];
        for i in 0..self.chunks.len() {
            self.height_of(i, &mut heights);
        }
        for (chunk, height) in self.chunks.iter_mut().zip(heights) {
            chunk.height = height.unwrap_or(0);
        }

        // Stable, so ties keep walk order and the root stays last.
        self.chunks.sort_by_key(|c| c.height);
        self.index = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id(), i))
            .collect();
    }

    fn height_of(&self, i: usize, heights: &mut Vec<Option<u32>>) -> u32 {
        if let Some(h) = heights[i] {
            return h;
        }
        // Placeholder; content ids cannot reference each other in a cycle.
        heights[i] = Some(0);
        let mut height = 0;
        for child in &self.chunks[i].children {
            let child_height = self.height_of(self.index[child], heights);
            height = height.max(child_height + 1);
        }
        heights[i] = Some(height);
        height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_codec::{CodecError, ContentHasher};

    struct Scenario {
        d1: Node,
        d2: Node,
        d3: Node,
        d4: Node,
        d5: Node,
    }

    /// d5 <- d4 <- d3 <- d2 <- d1, with d5 also hanging off d2 (in a list)
    /// and d1 directly.
    fn scenario() -> Scenario {
        let d5 = Node::new().with("name", "depth five");
        let d4 = Node::new()
            .with("name", "depth four")
            .with_detached("detach", &d5);
        let d3 = Node::new()
            .with("name", "depth three")
            .with_detached("detach", &d4);
        let d2 = Node::new()
            .with("name", "depth two")
            .with_detached("detach", &d3)
            .with_detached("joker", vec![Value::from(&d5)]);
        let d1 = Node::new()
            .with("name", "depth one")
            .with_detached("detach", &d2)
            .with_detached("joker", &d5);
        Scenario { d1, d2, d3, d4, d5 }
    }

    fn id_of(node: &Node) -> ObjectId {
        decompose(node).unwrap().root()
    }

    // -----------------------------------------------------------------------
    // Closures
    // -----------------------------------------------------------------------

    #[test]
    fn closure_depths_take_minimum_over_paths() {
        let s = scenario();
        let result = decompose(&s.d1).unwrap();
        let (i1, i2, i3, i4, i5) = (
            id_of(&s.d1),
            id_of(&s.d2),
            id_of(&s.d3),
            id_of(&s.d4),
            id_of(&s.d5),
        );
        assert_eq!(result.root(), i1);

        let expect = |id: ObjectId, entries: &[(ObjectId, u32)]| {
            let closure = result.closure_of(&id).expect("chunk emitted");
            assert_eq!(closure, &Closure::from_iter(entries.iter().copied()));
        };
        expect(i5, &[]);
        expect(i4, &[(i5, 1)]);
        expect(i3, &[(i4, 1), (i5, 2)]);
        expect(i2, &[(i3, 1), (i4, 2), (i5, 1)]);
        expect(i1, &[(i2, 1), (i5, 1), (i3, 2), (i4, 3)]);
    }

    #[test]
    fn own_id_never_in_closure() {
        let s = scenario();
        let result = decompose(&s.d1).unwrap();
        for chunk in result.chunks() {
            assert!(!chunk.closure().contains(&chunk.id()));
        }
    }

    #[test]
    fn empty_detached_list_contributes_nothing() {
        let node = Node::new().with_detached("items", Vec::<Value>::new());
        let result = decompose(&node).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.closure_of(&result.root()).unwrap().is_empty());
    }

    #[test]
    fn inline_children_contribute_their_detached_descendants() {
        let leaf = Node::new().with("name", "leaf");
        let inline = Node::new().with_detached("leaf", &leaf);
        let root = Node::new().with("inline", &inline);
        let result = decompose(&root).unwrap();

        assert_eq!(result.len(), 2, "inline node gets no chunk of its own");
        let closure = result.closure_of(&result.root()).unwrap();
        assert_eq!(closure.depth_of(&id_of(&leaf)), Some(1));
    }

    #[test]
    fn existing_refs_are_depth_one() {
        let external = ObjectId::from_bytes(b"already stored");
        let root = Node::new().with_detached("part", external);
        let result = decompose(&root).unwrap();
        assert_eq!(result.len(), 1);
        let root_chunk = result.get(&result.root()).unwrap();
        assert_eq!(root_chunk.closure().depth_of(&external), Some(1));
        assert!(root_chunk.children.is_empty());
        assert_eq!(root_chunk.height, 0);
    }

    #[test]
    fn inline_refs_stay_out_of_the_closure() {
        let pinned = ObjectId::from_bytes(b"pinned elsewhere");
        let root = Node::new()
            .with("pinned", pinned)
            .with("history", vec![Value::from(pinned)]);
        let result = decompose(&root).unwrap();
        assert!(result.closure_of(&result.root()).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Content addressing
    // -----------------------------------------------------------------------

    #[test]
    fn decomposition_is_deterministic() {
        let first = decompose(&scenario().d1).unwrap();
        let second = decompose(&scenario().d1).unwrap();
        let ids = |d: &Decomposition| d.chunks().iter().map(|c| c.id()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.root(), second.root());
    }

    #[test]
    fn identical_subgraphs_are_emitted_once() {
        let make = || Node::new().with("kind", "beam").with_detached("profile", Node::new().with("w", 2));
        let root = Node::new()
            .with_detached("left", make())
            .with_detached("nested", Node::new().with_detached("right", make()));
        let result = decompose(&root).unwrap();
        // root, nested, beam, profile
        assert_eq!(result.len(), 4);

        let root_chunk = result.get(&result.root()).unwrap();
        let beam = id_of(&make());
        assert_eq!(root_chunk.closure().depth_of(&beam), Some(1));
    }

    #[test]
    fn empty_root_hashes_empty_payload() {
        let result = decompose(&Node::new()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.root(), ContentHasher::OBJECT.hash(b"{}"));
    }

    #[test]
    fn shared_instances_are_not_rewalked() {
        let shared = Node::new().with("x", 1);
        let items: Vec<Value> = (0..50).map(|_| Value::from(&shared)).collect();
        let root = Node::new().with_detached("items", items);
        let result = decompose(&root).unwrap();
        assert_eq!(result.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn children_precede_parents() {
        let result = decompose(&scenario().d1).unwrap();
        let position: HashMap<ObjectId, usize> = result
            .chunks()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id(), i))
            .collect();
        for chunk in result.chunks() {
            for child in &chunk.children {
                assert!(position[child] < position[&chunk.id()]);
            }
        }
        assert_eq!(result.chunks().last().map(|c| c.id()), Some(result.root()));
    }

    #[test]
    fn existing_ref_to_a_later_sibling_orders_after_it() {
        let x = Node::new().with("name", "x");
        let x_id = id_of(&x);
        let holder = Node::new().with_detached("r", x_id);
        let root = Node::new()
            .with_detached("a", &holder)
            .with_detached("b", &x);
        let result = decompose(&root).unwrap();
        assert_eq!(result.len(), 3);

        let holder = result.get(&id_of(&holder)).unwrap();
        let x = result.get(&x_id).unwrap();
        assert_eq!(holder.children, vec![x_id]);
        assert!(holder.height > x.height);

        let position = |id: ObjectId| result.chunks().iter().position(|c| c.id() == id);
        assert!(position(x_id) < position(holder.id()));
        assert_eq!(result.chunks().last().map(|c| c.id()), Some(result.root()));

        let levels = result.levels();
        let level_of = |id: ObjectId| levels.iter().position(|l| l.iter().any(|c| c.id() == id));
        assert!(level_of(x_id) < level_of(holder.id()));
    }

    #[test]
    fn levels_group_by_height() {
        let result = decompose(&scenario().d1).unwrap();
        let levels = result.levels();
        // d5, d4, d3, d2, d1
        assert_eq!(levels.len(), 5);
        for (height, level) in levels.iter().enumerate() {
            for chunk in level {
                assert_eq!(chunk.height as usize, height);
            }
        }
        assert_eq!(levels[4][0].id(), result.root());
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    #[test]
    fn detached_self_reference_is_a_cycle() {
        let node = Node::new().with("name", "loop");
        node.set_detached("me", &node);
        let err = decompose(&node).unwrap_err();
        assert!(matches!(err, GraphError::CyclicGraph { ref path } if path == "root.@me"));
    }

    #[test]
    fn longer_detached_cycle_is_detected() {
        let a = Node::new();
        let b = Node::new();
        let c = Node::new();
        a.set_detached("next", &b);
        b.set_detached("next", vec![Value::from(&c)]);
        c.set("back", &a);
        let err = decompose(&a).unwrap_err();
        assert!(matches!(err, GraphError::CyclicGraph { .. }));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let shared = Node::new().with("x", 1);
        let left = Node::new().with_detached("s", &shared);
        let right = Node::new().with_detached("s", &shared);
        let root = Node::new().with_detached("l", &left).with_detached("r", &right);
        assert!(decompose(&root).is_ok());
    }

    #[test]
    fn non_finite_number_is_unsupported() {
        let root = Node::new().with_detached("child", Node::new().with("bad", f64::NAN));
        let err = decompose(&root).unwrap_err();
        assert!(matches!(
            err,
            GraphError::Codec(CodecError::UnsupportedType { ref key, .. }) if key == "bad"
        ));
    }

    #[test]
    fn reserved_key_is_rejected() {
        let root = Node::new().with("id", "mine");
        assert!(matches!(
            decompose(&root),
            Err(GraphError::Codec(CodecError::ReservedKey(_)))
        ));
    }
}
