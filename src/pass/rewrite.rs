//! The rewriter: retargets candidate nodes to their in-place sibling and rewires their uses.
//!
//! Walks the graph in program order and, for each `call_function` node with an in-place sibling,
//! checks whether it is safe to retarget in place and — if so — does it, rewiring every downstream
//! consumer of the now-dead out-of-place result (and of any scatter nodes it proves dead) to read
//! the in-placed node's own first argument instead.

use crate::context::ReinplaceConfig;
use crate::fake_tensor::{FakeResult, FakeTensorExecutor, StorageId};
use crate::fx::FxHashSet;
use crate::ir::{Arg, Graph, NodeId, NodeOp};
use crate::op::OpKind;
use crate::pass::alias::AliasIndex;
use crate::pass::later_use::later_use;
use crate::pass::schema;
use crate::pass::view_inverse::view_inverse_match;

/// What one pass over the node list accomplished: the set of scatter nodes proven dead, to be
/// erased by the sweep that runs after this one, and a count of sites actually retargeted, folded
/// into [`ReinplaceStats`] (crate::context::ReinplaceStats).
#[derive(Default)]
pub struct RewriteOutcome {
    pub dead_scatter: FxHashSet<NodeId>,
    pub rewritten: usize,
}

/// Runs the Rewriter over `graph`, mutating it in place.
pub fn run(graph: &mut Graph, alias: &mut AliasIndex, exec: &mut FakeTensorExecutor, config: &ReinplaceConfig) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();
    let order: Vec<NodeId> = graph.nodes_in_order().collect();

    for n in order {
        try_rewrite_one(graph, alias, exec, config, n, &mut outcome);
    }

    outcome
}

/// Why a candidate `call_function` node was left untouched, reported via `trace!` when
/// [`ReinplaceConfig::trace_candidates`] is set.
enum SkipReason {
    NoInplaceSibling,
    NotTensorLike,
    SelfAliasesInput,
    RepeatedSelfArgument,
    UnsafeLaterUse,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoInplaceSibling => "no in-place sibling",
            SkipReason::NotTensorLike => "first argument is not tensor-like",
            SkipReason::SelfAliasesInput => "self aliases a placeholder",
            SkipReason::RepeatedSelfArgument => "self appears more than once in args",
            SkipReason::UnsafeLaterUse => "unsafe later use survives scatter elimination",
        }
    }
}

fn try_rewrite_one(
    graph: &mut Graph,
    alias: &mut AliasIndex,
    exec: &mut FakeTensorExecutor,
    config: &ReinplaceConfig,
    n: NodeId,
    outcome: &mut RewriteOutcome,
) {
    let trace_skip = |reason: SkipReason| {
        if config.trace_candidates {
            log::trace!("node {n:?}: skipped ({})", reason.as_str());
        }
    };

    let target = match graph.node(n).target() {
        Some(t) => t,
        None => return,
    };
    let inplace_op = match schema::inplace_of(target) {
        Some(op) => op,
        None => return trace_skip(SkipReason::NoInplaceSibling),
    };
    let self_id = match first_arg(graph, n) {
        Some(id) => id,
        None => return trace_skip(SkipReason::NoInplaceSibling),
    };
    // The first argument must itself be a tensor result, not a list (e.g. a raw `split` output).
    if !is_tensor_like(graph, self_id) {
        return trace_skip(SkipReason::NotTensorLike);
    }
    let self_storage = storage_of(graph, self_id);
    // Mutating a placeholder's storage would be visible to the caller.
    if alias.is_input_storage(self_storage) {
        return trace_skip(SkipReason::SelfAliasesInput);
    }
    // `mul(a, a)` can't be retargeted: the write would also clobber the read of the other operand.
    if args_contain_more_than_once(graph, n, self_id) {
        return trace_skip(SkipReason::RepeatedSelfArgument);
    }

    let node_idx = graph.node(n).meta.node_idx.expect("every call node has a node_idx after MetadataProp");
    let a = alias.class(self_storage);
    let l = later_use(graph, &a, node_idx);
    let s = view_inverse_match(graph, exec, &l, &a);

    // Safe only if every later use is one of the scatters this rewrite would itself prove dead.
    if l.iter().any(|x| !s.contains(x)) {
        return trace_skip(SkipReason::UnsafeLaterUse);
    }

    // Retarget to the in-place op, then merge self's and n's storage classes: they now alias.
    set_target(graph, n, inplace_op);
    let n_storage = storage_of(graph, n);
    alias.union(self_storage, n_storage);
    log::debug!("node {n:?}: {target} -> {inplace_op} (self storage {self_storage:?})");
    outcome.rewritten += 1;

    // Rewire downstream consumers of n and of every proven-dead scatter onto their own first
    // argument, since both now produce the same value their first argument already holds.
    let mut to_rewire: Vec<NodeId> = vec![n];
    to_rewire.extend(s.iter().copied());
    for o in to_rewire {
        let o_storage = storage_of(graph, o);
        let repl = match first_arg(graph, o) {
            Some(r) => r,
            None => continue,
        };
        let repl_storage = storage_of(graph, repl);
        let touched = graph.replace_uses_after(o, repl, node_idx);
        for m in touched {
            if let Some(m_storage) = try_storage_of(graph, m) {
                if alias.same_class(m_storage, o_storage) {
                    alias.union(m_storage, repl_storage);
                }
            }
        }
    }

    for &dead in &s {
        log::debug!("node {n:?}: proved {dead:?} ({}) a dead scatter", graph.node(dead).target().map(|t| t.name()).unwrap_or("?"));
    }
    outcome.dead_scatter.extend(s);
}

fn first_arg(graph: &Graph, n: NodeId) -> Option<NodeId> {
    match &graph.node(n).op {
        NodeOp::Call { args, .. } => args.first().and_then(Arg::as_node),
        _ => None,
    }
}

fn is_tensor_like(graph: &Graph, id: NodeId) -> bool {
    matches!(graph.node(id).meta.fake_result, Some(FakeResult::Tensor(_)))
}

fn storage_of(graph: &Graph, id: NodeId) -> StorageId {
    graph
        .node(id)
        .meta
        .fake_result
        .as_ref()
        .expect("node must have a fake_result after MetadataProp")
        .as_tensor()
        .storage
}

fn try_storage_of(graph: &Graph, id: NodeId) -> Option<StorageId> {
    graph.node(id).meta.fake_result.as_ref().map(|r| r.as_tensor().storage)
}

fn args_contain_more_than_once(graph: &Graph, n: NodeId, self_id: NodeId) -> bool {
    match &graph.node(n).op {
        NodeOp::Call { args, .. } => args.iter().filter(|a| a.as_node() == Some(self_id)).count() > 1,
        _ => false,
    }
}

fn set_target(graph: &mut Graph, n: NodeId, new_target: crate::op::OpKind) {
    if let NodeOp::Call { target, .. } = &mut graph.node_mut(n).op {
        *target = new_target;
    }
}
