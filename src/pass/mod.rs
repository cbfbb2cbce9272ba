//! The re-inplacing pass, broken into the components described in the crate-level docs: one
//! module per box in the system-overview table, in the same leaves-first order MetadataProp feeds
//! the Rewriter.

pub mod alias;
pub mod dead_scatter;
pub mod later_use;
pub mod metadata;
pub mod rewrite;
pub mod schema;
pub mod view_inverse;
