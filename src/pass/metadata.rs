//! MetadataProp: the one-shot analysis that decorates every node with shape/stride facts.
//!
//! A one-shot forward walk over the graph in program order. Every node — `placeholder`,
//! `call_function`, and `output` alike — is assigned a `node_idx`; every `placeholder` and
//! `call_function` node is interpreted under the [`FakeTensorExecutor`] and gets a `fake_result`;
//! view-producing `call_function` nodes additionally get `view_of` pointing at their base.

use crate::fake_tensor::{FakeArg, FakeResult, FakeTensorExecutor, Shape};
use crate::fx::FxHashMap;
use crate::ir::{Arg, Graph, NodeId, NodeOp};
use crate::op::{OpKind, ViewKind};

/// Runs MetadataProp over `graph`. `sample_shapes` supplies one concrete shape per `placeholder`
/// node, consumed in program order, to drive the symbolic evaluation.
///
/// # Panics
///
/// Panics if a view-producing node's result storage does not match its base's storage (a broken
/// aliasing assumption upstream), or if `sample_shapes` runs out before every placeholder is
/// visited.
pub fn run(graph: &mut Graph, exec: &mut FakeTensorExecutor, sample_shapes: &[Shape]) {
    let mut next_idx: u32 = 0;
    let mut multi_output_base: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut shapes = sample_shapes.iter();

    for id in graph.nodes_in_order().collect::<Vec<_>>() {
        let idx = next_idx;
        next_idx += 1;

        match graph.node(id).op.clone() {
            NodeOp::Placeholder => {
                let shape = shapes.next().expect("fewer sample shapes than placeholder nodes");
                let tensor = exec.sample_tensor(shape);
                let node = graph.node_mut(id);
                node.meta.node_idx = Some(idx);
                node.meta.fake_result = Some(FakeResult::Tensor(tensor));
            }
            NodeOp::Output { .. } => {
                graph.node_mut(id).meta.node_idx = Some(idx);
            }
            NodeOp::Call { target, args, kwargs } => {
                let eval_args = resolve_args(graph, &args, &kwargs);
                let result = exec
                    .eval(target, &eval_args)
                    .unwrap_or_else(|e| panic!("MetadataProp evaluation failed for {target}: {e}"));

                let view_of = match target.view_type() {
                    ViewKind::SingleOutputView => args.first().and_then(Arg::as_node),
                    ViewKind::MultiOutputView => {
                        if let Some(base) = args.first().and_then(Arg::as_node) {
                            multi_output_base.insert(id, base);
                        }
                        None
                    }
                    ViewKind::NonView => {
                        if target == OpKind::GetItem {
                            args.first()
                                .and_then(Arg::as_node)
                                .and_then(|producer| multi_output_base.get(&producer).copied())
                        } else {
                            None
                        }
                    }
                };

                if let Some(base) = view_of {
                    let base_storage = storage_of(graph.node(base).meta.fake_result.as_ref().expect(
                        "view base must be visited (and assigned a fake_result) before its view, \
                         since program order is topological",
                    ));
                    let own_storage = storage_of(&result);
                    assert_eq!(
                        own_storage, base_storage,
                        "broken aliasing invariant: view node {id:?} ({target}) does not share storage with its base {base:?}"
                    );
                }

                let node = graph.node_mut(id);
                node.meta.node_idx = Some(idx);
                node.meta.fake_result = Some(result);
                node.meta.view_of = view_of;
            }
        }
    }
}

fn storage_of(result: &FakeResult) -> crate::fake_tensor::StorageId {
    result.as_tensor().storage
}

/// Resolves a node's `args`/`kwargs` into the flat [`FakeArg`] slice `FakeTensorExecutor::eval`
/// expects, substituting each [`Arg::Node`] with the referenced node's already-computed
/// `fake_result` (sound because program order is topological: every argument was visited earlier
/// in the walk). Keyword arguments (e.g. `as_strided`'s `storage_offset`) are appended after the
/// positional ones in key-sorted order, which matches how every catalog entry that takes a
/// keyword argument expects to find it trailing its positional arguments.
pub(crate) fn resolve_args(graph: &Graph, args: &[Arg], kwargs: &FxHashMap<&'static str, Arg>) -> Vec<FakeArg> {
    let mut out: Vec<FakeArg> = args.iter().map(|a| resolve_one(graph, a)).collect();
    let mut keys: Vec<&&str> = kwargs.keys().collect();
    keys.sort();
    out.extend(keys.into_iter().map(|k| resolve_one(graph, &kwargs[k])));
    out
}

fn resolve_one(graph: &Graph, arg: &Arg) -> FakeArg {
    match arg {
        Arg::Node(id) => {
            let result = graph
                .node(*id)
                .meta
                .fake_result
                .as_ref()
                .expect("argument node must be visited before its user in program order");
            match result {
                FakeResult::Tensor(t) => FakeArg::Tensor(t.clone()),
                FakeResult::Tensors(ts) => FakeArg::Tensors(ts.clone()),
            }
        }
        Arg::Int(v) => FakeArg::Int(*v),
        Arg::Ints(v) => FakeArg::Ints(v.clone()),
    }
}
