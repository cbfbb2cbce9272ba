//! Erases the scatter nodes the rewriter proved dead.
//!
//! The rewriter only *proves* a scatter node dead and accumulates it into the `dead_scatter` set;
//! nothing is erased until every candidate in the graph has been visited. This mirrors why
//! cranelift's own DCE runs as a separate pass after the rewrites that make instructions dead,
//! rather than erasing eagerly mid-walk: erasing while `Rewriter::run` is still iterating program
//! order would invalidate the `Vec<NodeId>` snapshot it sweeps over.

use crate::fx::FxHashSet;
use crate::ir::{Graph, NodeId};

/// Erases every node in `dead_scatter` from `graph`'s program order. Returns the number of nodes
/// erased.
///
/// Erasure order is by ascending `node_idx` purely for log readability; `Graph::erase` only
/// unlinks from the layout; it does not touch `args`/`kwargs` of other nodes; all references to
/// these nodes must already have been rewired by the rewriter before this runs.
pub fn sweep(graph: &mut Graph, dead_scatter: &FxHashSet<NodeId>) -> usize {
    let mut order: Vec<NodeId> = dead_scatter.iter().copied().collect();
    order.sort_by_key(|&n| graph.node(n).meta.node_idx.unwrap_or(u32::MAX));

    for n in &order {
        log::debug!(
            "erasing dead scatter node {n:?} ({})",
            graph.node(*n).target().map(|t| t.name()).unwrap_or("?"),
        );
        graph.erase(*n);
    }
    order.len()
}
