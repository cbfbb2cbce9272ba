//! Re-inplacing graph entity references.
//!
//! Nodes in the dataflow graph need to reference other nodes (as arguments) and to be referenced
//! back (as users). This can't be done with Rust references both because of ownership/mutability
//! rules and because we want a compact representation. Instead, references are structs wrapping a
//! `u32` index into the `Graph`'s node arena.

use core::fmt;
use cranelift_entity::{entity_impl, EntityRef};

/// An opaque reference to a node in a [`Graph`](super::Graph).
///
/// Ids are handed out in construction order and never reused. Since nodes are only ever appended
/// (never reordered) before `MetadataProp` runs, construction order coincides with program order,
/// so `NodeId` ordering agrees with the `node_idx` total order `MetadataProp` separately records
/// in each node's metadata.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
entity_impl!(NodeId, "node");

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "node{}", self.index())
    }
}
