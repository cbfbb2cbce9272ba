//! Operator schema queries: view classification and in-place sibling lookup.
//!
//! A thin, asserting layer over [`OpKind`]'s own classification methods. The catalog is closed
//! and statically dispatched (see `op.rs`), so a sibling name collision can only happen if the
//! catalog itself is malformed; `inplace_of` still checks for it defensively, the same way
//! `OpKind::inplace_of` guards its own invariant with `debug_assert!`.

use crate::op::{OpKind, ViewKind};

/// `view_type(t)`.
pub fn view_type(op: OpKind) -> ViewKind {
    op.view_type()
}

/// `is_view(t)`.
pub fn is_view(op: OpKind) -> bool {
    op.is_view()
}

/// `inplace_of(t)`: the in-place sibling, or `None` if `t` is a view or has no sibling in the
/// catalog. Panics if the catalog ever grows two entries sharing the same in-place name, since
/// that would make the sibling lookup ambiguous.
pub fn inplace_of(op: OpKind) -> Option<OpKind> {
    let candidate = op.inplace_of();
    if let Some(sibling) = candidate {
        let rivals = ALL_OPS.iter().copied().filter(|&o| o != sibling && o.name() == sibling.name()).count();
        assert_eq!(rivals, 0, "catalog has more than one operator named {}", sibling.name());
    }
    candidate
}

/// Whether `op`'s schema declares its first argument a write target, i.e. `add_`, `mul_`, `sub_`,
/// `copy_`.
pub fn first_arg_is_write(op: OpKind) -> bool {
    op.first_arg_is_write()
}

/// Arity equality between `a` and a candidate in-place sibling `b`: same argument count, same
/// positions beyond the first (which is where the write annotation differs).
pub fn schemas_match(a: OpKind, b: OpKind) -> bool {
    a.arity() == b.arity()
}

const ALL_OPS: [OpKind; 20] = [
    OpKind::Clone,
    OpKind::Add,
    OpKind::AddInPlace,
    OpKind::Mul,
    OpKind::MulInPlace,
    OpKind::Sub,
    OpKind::SubInPlace,
    OpKind::View,
    OpKind::Diagonal,
    OpKind::DiagonalScatter,
    OpKind::Select,
    OpKind::SelectScatter,
    OpKind::Slice,
    OpKind::SliceScatter,
    OpKind::AsStrided,
    OpKind::AsStridedScatter,
    OpKind::Split,
    OpKind::GetItem,
    OpKind::CopyInPlace,
    OpKind::Custom,
];
