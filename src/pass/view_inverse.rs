//! Matches `{view}_scatter` nodes against the view chain an in-placing candidate would collapse.

use crate::fake_tensor::FakeTensorExecutor;
use crate::fx::FxHashSet;
use crate::ir::{Arg, Graph, NodeId, NodeOp};
use crate::pass::metadata::resolve_args;

/// Of the later uses `later` (already filtered to `node_idx > pivot`), returns the subset that
/// are scatter nodes provably equivalent to the candidate's own view chain — i.e. nodes that,
/// were the candidate in-placed, would become dead writes reproducing what the in-place already
/// did.
pub fn view_inverse_match(
    graph: &Graph,
    exec: &mut FakeTensorExecutor,
    later: &[NodeId],
    alias_set: &FxHashSet<NodeId>,
) -> FxHashSet<NodeId> {
    let mut scatters: Vec<NodeId> = later
        .iter()
        .copied()
        .filter(|&n| graph.node(n).target().is_some_and(|t| t.is_scatter()))
        .collect();
    scatters.sort_by_key(|&n| graph.node(n).meta.node_idx.unwrap_or(u32::MAX));

    let mut accepted = FxHashSet::default();
    for n in scatters {
        if is_inverse_of_some_alias(graph, exec, n, alias_set) {
            accepted.insert(n);
        }
    }
    accepted
}

fn is_inverse_of_some_alias(
    graph: &Graph,
    exec: &mut FakeTensorExecutor,
    n: NodeId,
    alias_set: &FxHashSet<NodeId>,
) -> bool {
    let (scatter_op, args, kwargs) = match &graph.node(n).op {
        NodeOp::Call { target, args, kwargs } => (*target, args.clone(), kwargs.clone()),
        _ => return false,
    };
    let forward_op = match scatter_op.view_inverse_of() {
        Some(op) => op,
        None => return false,
    };
    let base = match args.first().and_then(Arg::as_node) {
        Some(b) => b,
        None => return false,
    };
    let base_fr = match graph.node(base).meta.fake_result.as_ref() {
        Some(fr) => fr,
        None => return false,
    };

    for &self_alias in alias_set {
        let self_base = match graph.node(self_alias).meta.view_of {
            Some(b) => b,
            None => continue,
        };
        let self_base_fr = match graph.node(self_base).meta.fake_result.as_ref() {
            Some(fr) => fr,
            None => continue,
        };
        if !base_fr.as_tensor().matches_view_metadata(self_base_fr.as_tensor()) {
            continue;
        }

        let mut replay_args = vec![Arg::Node(self_base)];
        replay_args.extend(args.iter().skip(2).cloned());
        let resolved = resolve_args(graph, &replay_args, &kwargs);
        let replay = match exec.eval(forward_op, &resolved) {
            Ok(r) => r,
            Err(_) => continue,
        };

        let self_fr = match graph.node(self_alias).meta.fake_result.as_ref() {
            Some(fr) => fr,
            None => continue,
        };
        if replay.as_tensor().matches_view_metadata(self_fr.as_tensor()) {
            return true;
        }
    }
    false
}
