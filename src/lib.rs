//! The re-inplacing pass for functional tensor dataflow graphs.
//!
//! Converts pure, out-of-place tensor operations into their mutating counterparts whenever doing
//! so is provably semantics-preserving, and eliminates `{view}_scatter` nodes that become
//! redundant once the mutation they would otherwise perform is re-inlined onto a view.
//!
//! The pass runs in three phases, in this order, never revisited:
//!
//! 1. [`pass::metadata`] (MetadataProp) interprets the graph once under a shape/stride-only
//!    symbolic executor ([`fake_tensor`]), attaching to every node its result metadata, a
//!    sequential [`ir::NodeId`]-ordered index, and — for view-producing operations — a back-edge
//!    to the node whose storage it shares.
//! 2. The Rewriter ([`pass::rewrite`]) sweeps the node list in program order. For each
//!    `call_function` site it consults the operator catalog ([`op`]) for an in-place sibling, the
//!    alias index ([`pass::alias`]) for the candidate's storage class, the later-use finder
//!    ([`pass::later_use`]) for downstream consumers, and the view-inverse matcher
//!    ([`pass::view_inverse`]) for scatter nodes the in-placing would render dead. On success it
//!    retargets the node, rewires downstream argument references, and merges alias classes.
//! 3. The Dead-scatter sweep ([`pass::dead_scatter`]) erases every scatter node the Rewriter
//!    proved dead.
//!
//! [`context::reinplace`] (or [`context::PassContext::reinplace`] for repeated runs) is the single
//! public entry point tying the three phases together.
//!
//! The operator registry, the symbolic executor proper, and the graph IR's node-allocation
//! primitives are production concerns this crate does not own; [`op`], [`fake_tensor`], and
//! [`ir`] are minimal, closed stand-ins sufficient to exercise the pass end to end.

#![warn(missing_docs)]

mod context;
pub mod fake_tensor;
mod fx;
pub mod ir;
pub mod op;
mod pass;

pub use context::{reinplace, PassContext, ReinplaceConfig, ReinplaceStats};
pub use fake_tensor::{FakeArg, FakeResult, FakeTensor, FakeTensorExecutor, Shape, StorageId};
pub use ir::{Arg, Graph, Node, NodeId, NodeMeta, NodeOp};
pub use op::{OpKind, ViewKind};
