//! The functional tensor dataflow graph.
//!
//! A [`Graph`] is an ordered sequence of [`Node`]s encoding a straight-line dataflow. Nodes are
//! arena-allocated in a [`PrimaryMap`] indexed by [`NodeId`] and never deallocated individually;
//! a separate `layout` vector tracks which
//! node ids are currently *live* and in what program order, the same split cranelift's own
//! `Function` makes between its `DataFlowGraph` arena and its `Layout` linked list. Erasing a
//! node unlinks it from `layout` without freeing its arena slot.

mod entities;

pub use entities::NodeId;

use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;

use crate::fake_tensor::FakeResult;
use crate::fx::{FxHashMap, FxHashSet};
use crate::op::OpKind;

/// One positional or keyword argument to a `call_function` node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    /// A reference to another node's result.
    Node(NodeId),
    /// An integer literal (dimension index, offset, chunk count, ...).
    Int(i64),
    /// A small list of integers (a requested shape or stride).
    Ints(SmallVec<[i64; 4]>),
}

impl Arg {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Arg::Node(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<NodeId> for Arg {
    fn from(id: NodeId) -> Self {
        Arg::Node(id)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

/// The operator kind of a node. `call_function` is the only variant the pass rewrites;
/// `placeholder` and `output` are structural bookends.
#[derive(Clone, Debug)]
pub enum NodeOp {
    Placeholder,
    Call {
        target: OpKind,
        args: SmallVec<[Arg; 4]>,
        kwargs: FxHashMap<&'static str, Arg>,
    },
    Output {
        value: Arg,
    },
}

/// Per-node metadata attached once by `MetadataProp` and thereafter read-only except for the
/// alias-class merges the Rewriter performs on the *graph's* alias index, not on this struct.
#[derive(Clone, Debug, Default)]
pub struct NodeMeta {
    pub fake_result: Option<FakeResult>,
    pub node_idx: Option<u32>,
    pub view_of: Option<NodeId>,
}

pub struct Node {
    pub op: NodeOp,
    pub meta: NodeMeta,
    pub users: FxHashSet<NodeId>,
}

impl Node {
    fn new(op: NodeOp) -> Self {
        Node { op, meta: NodeMeta::default(), users: FxHashSet::default() }
    }

    pub fn target(&self) -> Option<OpKind> {
        match &self.op {
            NodeOp::Call { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.op, NodeOp::Call { .. })
    }
}

/// The dataflow graph. See the module docs for the arena/layout split.
#[derive(Default)]
pub struct Graph {
    nodes: PrimaryMap<NodeId, Node>,
    layout: Vec<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Graph { nodes: PrimaryMap::new(), layout: Vec::new() }
    }

    /// Appends a `placeholder` node (a graph input whose storage the pass must never mutate).
    pub fn placeholder(&mut self) -> NodeId {
        self.push(Node::new(NodeOp::Placeholder))
    }

    /// Appends a `call_function` node with no keyword arguments.
    pub fn call<A>(&mut self, target: OpKind, args: A) -> NodeId
    where
        A: IntoIterator<Item = Arg>,
    {
        self.call_kw(target, args, [])
    }

    /// Appends a `call_function` node with keyword arguments, e.g. `as_strided`'s
    /// `storage_offset`.
    pub fn call_kw<A, K>(&mut self, target: OpKind, args: A, kwargs: K) -> NodeId
    where
        A: IntoIterator<Item = Arg>,
        K: IntoIterator<Item = (&'static str, Arg)>,
    {
        let args: SmallVec<[Arg; 4]> = args.into_iter().collect();
        let kwargs: FxHashMap<&'static str, Arg> = kwargs.into_iter().collect();
        let id = self.push(Node::new(NodeOp::Call { target, args: args.clone(), kwargs: kwargs.clone() }));
        self.link_users(id, &args, &kwargs, target);
        id
    }

    /// Appends an `output` node returning `value`.
    pub fn output(&mut self, value: NodeId) -> NodeId {
        let id = self.push(Node::new(NodeOp::Output { value: Arg::Node(value) }));
        self.add_user(value, id);
        id
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = self.nodes.push(node);
        self.layout.push(id);
        id
    }

    fn add_user(&mut self, referenced: NodeId, user: NodeId) {
        self.nodes[referenced].users.insert(user);
    }

    /// Registers `id` as a user of each node-valued argument. `copy_`'s write-target first
    /// argument is not a read dependency, so it does not get `id` added as a user.
    fn link_users(&mut self, id: NodeId, args: &[Arg], kwargs: &FxHashMap<&'static str, Arg>, target: OpKind) {
        let skip_first = matches!(target, OpKind::CopyInPlace);
        for (i, a) in args.iter().enumerate() {
            if skip_first && i == 0 {
                continue;
            }
            if let Arg::Node(referenced) = a {
                self.add_user(*referenced, id);
            }
        }
        for a in kwargs.values() {
            if let Arg::Node(referenced) = a {
                self.add_user(*referenced, id);
            }
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Iterates live nodes in program order (the `layout`).
    pub fn nodes_in_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.layout.iter().copied()
    }

    /// Number of live nodes.
    pub fn live_len(&self) -> usize {
        self.layout.len()
    }

    /// Unlinks `id` from the live program order. The arena slot is retained (so existing
    /// `NodeId`s elsewhere remain valid to look up), matching how cranelift's DCE removes an
    /// instruction from its `Layout` without touching the `DataFlowGraph` entry.
    pub fn erase(&mut self, id: NodeId) {
        self.layout.retain(|&n| n != id);
    }

    /// Substitutes every occurrence of `old` with `new` in the args/kwargs of every *live* node
    /// whose `node_idx` is strictly greater than `after_idx`. Returns the set of nodes that were
    /// actually touched, so the caller can union storage classes only where a substitution
    /// landed.
    pub fn replace_uses_after(&mut self, old: NodeId, new: NodeId, after_idx: u32) -> Vec<NodeId> {
        let mut touched = Vec::new();
        let candidates: Vec<NodeId> = self.layout.clone();
        for m in candidates {
            if m == old || m == new {
                continue;
            }
            match self.nodes[m].meta.node_idx {
                Some(idx) if idx > after_idx => {}
                _ => continue,
            }
            let mut changed = false;
            if let NodeOp::Call { args, kwargs, .. } = &mut self.nodes[m].op {
                for a in args.iter_mut() {
                    if *a == Arg::Node(old) {
                        *a = Arg::Node(new);
                        changed = true;
                    }
                }
                for v in kwargs.values_mut() {
                    if *v == Arg::Node(old) {
                        *v = Arg::Node(new);
                        changed = true;
                    }
                }
            } else if let NodeOp::Output { value } = &mut self.nodes[m].op {
                if *value == Arg::Node(old) {
                    *value = Arg::Node(new);
                    changed = true;
                }
            }
            if changed {
                self.nodes[old].users.remove(&m);
                self.nodes[new].users.insert(m);
                touched.push(m);
            }
        }
        touched
    }
}
