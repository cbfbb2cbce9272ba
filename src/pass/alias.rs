//! The storage alias index: `storage_token → set<node>`.
//!
//! Built once after `MetadataProp` by descending into every node's `fake_result`. Storage tokens
//! are handed out once by the executor and never change, but the *classes* the Rewriter reasons
//! about do change as it in-places sites: two storage tokens that were disjoint become aliased
//! once a node is retargeted. That merge is implemented as a small union-find over [`StorageId`]s,
//! the same bookkeeping shape as cranelift's `alias_analysis` merging `LastStores` entries when
//! two memory regions are proven to overlap.

use crate::fake_tensor::{FakeResult, StorageId};
use crate::fx::{FxHashMap, FxHashSet};
use crate::ir::{Graph, NodeId, NodeOp};

#[derive(Default)]
pub struct AliasIndex {
    storage_to_nodes: FxHashMap<StorageId, FxHashSet<NodeId>>,
    parent: FxHashMap<StorageId, StorageId>,
    input_storages: FxHashSet<StorageId>,
}

impl AliasIndex {
    /// Builds the index from a graph that has already had `MetadataProp` run over it.
    pub fn build(graph: &Graph) -> Self {
        let mut index = AliasIndex::default();
        for id in graph.nodes_in_order() {
            let node = graph.node(id);
            if let Some(result) = &node.meta.fake_result {
                add_result(&mut index.storage_to_nodes, id, result);
            }
            if matches!(node.op, NodeOp::Placeholder) {
                if let Some(FakeResult::Tensor(t)) = &node.meta.fake_result {
                    index.input_storages.insert(t.storage);
                }
            }
        }
        index
    }

    fn find(&mut self, s: StorageId) -> StorageId {
        match self.parent.get(&s).copied() {
            None => s,
            Some(p) if p == s => s,
            Some(p) => {
                let root = self.find(p);
                self.parent.insert(s, root);
                root
            }
        }
    }

    /// Unions the alias classes containing `a` and `b`. Idempotent if they're already the same
    /// class.
    pub fn union(&mut self, a: StorageId, b: StorageId) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }

    /// Whether `a` and `b` currently belong to the same alias class.
    pub fn same_class(&mut self, a: StorageId, b: StorageId) -> bool {
        self.find(a) == self.find(b)
    }

    /// `token ∈ input_storages`, after resolving any merges (a placeholder's storage is never the
    /// `self` side of an in-placing, so in practice this never needs to cross a union, but the
    /// resolution keeps the check correct even so).
    pub fn is_input_storage(&mut self, storage: StorageId) -> bool {
        let root = self.find(storage);
        let inputs: Vec<StorageId> = self.input_storages.iter().copied().collect();
        inputs.into_iter().any(|s| self.find(s) == root)
    }

    /// All nodes whose storage is in the same alias class as `storage`.
    pub fn class(&mut self, storage: StorageId) -> FxHashSet<NodeId> {
        let root = self.find(storage);
        let keys: Vec<StorageId> = self.storage_to_nodes.keys().copied().collect();
        let mut out = FxHashSet::default();
        for k in keys {
            if self.find(k) == root {
                out.extend(self.storage_to_nodes[&k].iter().copied());
            }
        }
        out
    }
}

fn add_result(map: &mut FxHashMap<StorageId, FxHashSet<NodeId>>, id: NodeId, result: &FakeResult) {
    match result {
        FakeResult::Tensor(t) => {
            map.entry(t.storage).or_default().insert(id);
        }
        FakeResult::Tensors(ts) => {
            for t in ts {
                map.entry(t.storage).or_default().insert(id);
            }
        }
    }
}
