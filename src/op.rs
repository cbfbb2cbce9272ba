//! The operator catalog.
//!
//! The operator registry that a real tensor compiler consults for schema lookup is out of
//! scope for this crate (see the crate-level docs); what's needed instead is *some* concrete,
//! closed set of operator kinds to exercise the pass against. This module is that catalog: a
//! sum type carrying view/alias classification statically, rather than a dynamically extensible
//! registry walked by name at runtime.
//!
//! Extending the catalog is a code change here, not a registration call at runtime. That's a
//! deliberate consequence of replacing duck-typed schema probing with a closed sum type.

use core::fmt;

/// Classification of an operator's first argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ViewKind {
    /// First argument has no alias info, or is a write target: this operator does not expose a
    /// view of any argument's storage.
    NonView,
    /// First argument's alias info has `is_write = false` and no wildcard in `after_set`.
    SingleOutputView,
    /// First argument's alias info has `is_write = false` and a wildcard in `after_set`: the
    /// result is a list of tensors, each a view into the same base.
    MultiOutputView,
}

/// One entry in the closed operator catalog.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Clone,
    Add,
    AddInPlace,
    Mul,
    MulInPlace,
    Sub,
    SubInPlace,
    View,
    Diagonal,
    DiagonalScatter,
    Select,
    SelectScatter,
    Slice,
    SliceScatter,
    AsStrided,
    AsStridedScatter,
    Split,
    GetItem,
    CopyInPlace,
    /// An opaque third-party operator whose schema declares no aliasing at all: the pass must
    /// never in-place it or treat its output as aliasing its input.
    Custom,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl OpKind {
    /// The operator's name, as it would appear in `name(t)` / `name(t) ++ "_"` lookups.
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Clone => "clone",
            OpKind::Add => "add",
            OpKind::AddInPlace => "add_",
            OpKind::Mul => "mul",
            OpKind::MulInPlace => "mul_",
            OpKind::Sub => "sub",
            OpKind::SubInPlace => "sub_",
            OpKind::View => "view",
            OpKind::Diagonal => "diagonal",
            OpKind::DiagonalScatter => "diagonal_scatter",
            OpKind::Select => "select",
            OpKind::SelectScatter => "select_scatter",
            OpKind::Slice => "slice",
            OpKind::SliceScatter => "slice_scatter",
            OpKind::AsStrided => "as_strided",
            OpKind::AsStridedScatter => "as_strided_scatter",
            OpKind::Split => "split",
            OpKind::GetItem => "getitem",
            OpKind::CopyInPlace => "copy_",
            OpKind::Custom => "custom",
        }
    }

    /// Classifies this operator's first argument: does it produce a fresh tensor, a single view,
    /// or a list of views into the same base?
    pub fn view_type(self) -> ViewKind {
        match self {
            OpKind::View | OpKind::Diagonal | OpKind::Select | OpKind::Slice | OpKind::AsStrided => {
                ViewKind::SingleOutputView
            }
            OpKind::Split => ViewKind::MultiOutputView,
            _ => ViewKind::NonView,
        }
    }

    /// Whether this operator produces a view of one of its arguments rather than a fresh tensor.
    pub fn is_view(self) -> bool {
        self.view_type() != ViewKind::NonView
    }

    /// True for the `{view}_scatter` operators the view-inverse matcher recognizes.
    pub fn is_scatter(self) -> bool {
        matches!(
            self,
            OpKind::DiagonalScatter
                | OpKind::SelectScatter
                | OpKind::SliceScatter
                | OpKind::AsStridedScatter
        )
    }

    /// The forward view operator this scatter is the functional inverse of. `None` for non-scatter
    /// operators.
    pub fn view_inverse_of(self) -> Option<OpKind> {
        match self {
            OpKind::DiagonalScatter => Some(OpKind::Diagonal),
            OpKind::SelectScatter => Some(OpKind::Select),
            OpKind::SliceScatter => Some(OpKind::Slice),
            OpKind::AsStridedScatter => Some(OpKind::AsStrided),
            _ => None,
        }
    }

    /// The in-place sibling operator, if the catalog defines one.
    ///
    /// Returns `None` for view operators (views are never in-placed), for operators with no
    /// catalog sibling, and for `Custom` (an opaque operator with no declared aliasing at all).
    /// The catalog is closed and hand-matched, so a sibling name collision can only arise from a
    /// malformed catalog; `debug_assert!` guards against a future entry accidentally violating the
    /// one-sibling invariant.
    pub fn inplace_of(self) -> Option<OpKind> {
        if self.is_view() {
            return None;
        }
        let sibling = match self {
            OpKind::Add => Some(OpKind::AddInPlace),
            OpKind::Mul => Some(OpKind::MulInPlace),
            OpKind::Sub => Some(OpKind::SubInPlace),
            _ => None,
        };
        if let Some(op) = sibling {
            debug_assert!(
                op.name() == format!("{}_", self.name()),
                "catalog in-place sibling name mismatch for {self}",
            );
            debug_assert!(
                op.first_arg_is_write(),
                "catalog in-place sibling {op} must declare a write alias on arg 0",
            );
        }
        sibling
    }

    /// Whether this operator's first argument carries `is_write = true` alias info.
    pub fn first_arg_is_write(self) -> bool {
        matches!(
            self,
            OpKind::AddInPlace | OpKind::MulInPlace | OpKind::SubInPlace | OpKind::CopyInPlace
        )
    }

    /// Number of positional arguments this operator expects, counting all of them. MetadataProp's
    /// effective-argument rule (`copy_`'s write-target first argument isn't a read dependency) is
    /// about aliasing accounting, not arity, so `copy_` still reports two args here.
    pub fn arity(self) -> usize {
        match self {
            OpKind::Clone => 1,
            OpKind::Add | OpKind::AddInPlace => 2,
            OpKind::Mul | OpKind::MulInPlace => 2,
            OpKind::Sub | OpKind::SubInPlace => 2,
            OpKind::View => 2,
            OpKind::Diagonal => 4,
            OpKind::DiagonalScatter => 5,
            OpKind::Select => 3,
            OpKind::SelectScatter => 4,
            OpKind::Slice => 4,
            OpKind::SliceScatter => 5,
            OpKind::AsStrided => 3,
            OpKind::AsStridedScatter => 4,
            OpKind::Split => 2,
            OpKind::GetItem => 2,
            OpKind::CopyInPlace => 2,
            OpKind::Custom => 1,
        }
    }
}
