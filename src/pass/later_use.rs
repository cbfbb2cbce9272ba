//! Finds downstream consumers of an alias class past a given point in program order.

use crate::fx::FxHashSet;
use crate::ir::{Graph, NodeId};

/// Nodes `n` such that `n` is a user of some member of `alias_set`, `n.node_idx > pivot_idx`, and
/// `n` is not itself an intermediate view node within `alias_set`: chains of intermediate views do
/// not themselves count as observable uses — only their downstream non-view consumers do.
pub fn later_use(graph: &Graph, alias_set: &FxHashSet<NodeId>, pivot_idx: u32) -> Vec<NodeId> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    for &a in alias_set {
        for &n in &graph.node(a).users {
            let node_idx = match graph.node(n).meta.node_idx {
                Some(idx) => idx,
                None => continue,
            };
            if node_idx <= pivot_idx {
                continue;
            }
            if alias_set.contains(&n) && graph.node(n).is_call() {
                continue;
            }
            if seen.insert(n) {
                out.push(n);
            }
        }
    }
    out
}
