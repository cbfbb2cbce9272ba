//! The shape/stride-only symbolic executor.
//!
//! The real "fake tensor" runtime — an executor that runs a model's actual shape-inference
//! kernels over degenerate, storage-less tensors — is an out-of-scope collaborator (see the
//! crate-level docs). This module is the minimal stand-in the core needs to have *something* to
//! drive `MetadataProp` and the view-inverse matcher's replay step against: it tracks `size`,
//! `stride`, `storage_offset`, and a storage identity token per result, and computes those fields
//! for each operator in the catalog using ordinary view-stride arithmetic. It does not model
//! element types, devices, or actual numeric contents.

use core::fmt;
use cranelift_entity::{entity_impl, EntityRef};
use smallvec::SmallVec;

use crate::op::OpKind;

/// An opaque reference to a storage allocation.
///
/// A weak reference to storage: two [`FakeTensor`]s alias the same buffer iff they carry the
/// same `StorageId`, independent of shape/stride.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId(u32);
entity_impl!(StorageId, "storage");

impl fmt::Debug for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "storage{}", self.index())
    }
}

pub type Shape = SmallVec<[i64; 4]>;

/// A shape/stride/offset/storage surrogate for one tensor result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeTensor {
    pub size: Shape,
    pub stride: Shape,
    pub storage_offset: i64,
    pub storage: StorageId,
}

impl FakeTensor {
    /// Same size, stride, and storage offset. Storage identity is intentionally excluded — two
    /// tensors can have identical view metadata while denoting different underlying buffers.
    pub fn matches_view_metadata(&self, other: &FakeTensor) -> bool {
        self.size == other.size && self.stride == other.stride && self.storage_offset == other.storage_offset
    }
}

/// A node's full result: either a single tensor, or (for multi-output views such as `split`) an
/// ordered list of tensors. This is the full extent of "tree-shaped results" this catalog needs;
/// see [`ResultVisitor`] for the traversal contract.
#[derive(Clone, Debug)]
pub enum FakeResult {
    Tensor(FakeTensor),
    Tensors(Vec<FakeTensor>),
}

/// A visitor over the leaves of a [`FakeResult`], standing in for the out-of-scope generic
/// "container traversal" collaborator (tree_map over nested pytrees). Only two shapes are
/// recognized because the catalog never nests containers any deeper.
pub trait ResultVisitor {
    fn visit_tensor(&mut self, tensor: &FakeTensor);
}

impl FakeResult {
    pub fn visit(&self, visitor: &mut impl ResultVisitor) {
        match self {
            FakeResult::Tensor(t) => visitor.visit_tensor(t),
            FakeResult::Tensors(ts) => {
                for t in ts {
                    visitor.visit_tensor(t);
                }
            }
        }
    }

    /// Unwraps a single-tensor result; panics if this is a multi-output result that wasn't
    /// projected through `getitem` first. Used by nodes that can only ever consume a single
    /// tensor (everything but `getitem`'s first argument).
    pub fn as_tensor(&self) -> &FakeTensor {
        match self {
            FakeResult::Tensor(t) => t,
            FakeResult::Tensors(_) => {
                panic!("expected a single-tensor result, found a multi-output view result")
            }
        }
    }
}

/// A resolved argument to [`FakeTensorExecutor::eval`]: either a previously-computed result (for
/// node arguments) or a plain scalar/shape literal.
#[derive(Clone, Debug)]
pub enum FakeArg {
    Tensor(FakeTensor),
    Tensors(Vec<FakeTensor>),
    Int(i64),
    Ints(Shape),
}

impl FakeArg {
    fn tensor(&self) -> &FakeTensor {
        match self {
            FakeArg::Tensor(t) => t,
            _ => panic!("expected a tensor argument"),
        }
    }

    fn int(&self) -> i64 {
        match self {
            FakeArg::Int(i) => *i,
            _ => panic!("expected an integer argument"),
        }
    }

    fn ints(&self) -> &[i64] {
        match self {
            FakeArg::Ints(v) => v,
            _ => panic!("expected a shape/stride list argument"),
        }
    }
}

/// Why a symbolic re-evaluation in the view-inverse matcher failed. Any such failure is swallowed
/// by the caller and treated as "not an inverse" — this type exists so the failure is an ordinary
/// `Result`, not an exception-as-control-flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError(pub &'static str);

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "fake tensor evaluation failed: {}", self.0)
    }
}

fn contiguous_stride(size: &[i64]) -> Shape {
    let mut stride = Shape::from_elem(1, size.len());
    let mut acc = 1i64;
    for i in (0..size.len()).rev() {
        stride[i] = acc;
        acc = acc.saturating_mul(size[i].max(1));
    }
    stride
}

fn dim_index(size_len: usize, dim: i64) -> Result<usize, EvalError> {
    let len = size_len as i64;
    let d = if dim < 0 { dim + len } else { dim };
    if d < 0 || d >= len {
        return Err(EvalError("dimension out of range"));
    }
    Ok(d as usize)
}

fn remove_dims(v: &[i64], dims: &[usize]) -> Shape {
    v.iter()
        .enumerate()
        .filter(|(i, _)| !dims.contains(i))
        .map(|(_, x)| *x)
        .collect()
}

/// Evaluates the catalog's operators over shape/stride/offset surrogates only.
///
/// One executor instance owns the counter that mints fresh [`StorageId`]s; views never allocate
/// one of their own, instead reusing their base's.
#[derive(Default)]
pub struct FakeTensorExecutor {
    next_storage: u32,
}

impl FakeTensorExecutor {
    pub fn new() -> Self {
        Self { next_storage: 0 }
    }

    /// Allocates a fresh storage identity, e.g. for a `placeholder` or for any operator that
    /// produces a genuinely new buffer (`clone`, `add`, a scatter's functional output).
    pub fn fresh_storage(&mut self) -> StorageId {
        let id = StorageId::new(self.next_storage as usize);
        self.next_storage += 1;
        id
    }

    /// Builds a contiguous tensor surrogate of the given shape in a fresh storage, as one would
    /// for a `placeholder` node given a concrete sample input.
    pub fn sample_tensor(&mut self, size: &[i64]) -> FakeTensor {
        let size: Shape = size.iter().copied().collect();
        let stride = contiguous_stride(&size);
        FakeTensor {
            size,
            stride,
            storage_offset: 0,
            storage: self.fresh_storage(),
        }
    }

    /// Evaluates `op` given its resolved arguments, producing the result surrogate(s).
    ///
    /// This is used both by `MetadataProp`'s forward walk and by the view-inverse matcher's
    /// replay step, which calls it with the *forward view* operator rather than the scatter the
    /// candidate node actually names.
    pub fn eval(&mut self, op: OpKind, args: &[FakeArg]) -> Result<FakeResult, EvalError> {
        match op {
            OpKind::Clone => {
                let t = args[0].tensor();
                let size = t.size.clone();
                let stride = contiguous_stride(&size);
                Ok(FakeResult::Tensor(FakeTensor {
                    size,
                    stride,
                    storage_offset: 0,
                    storage: self.fresh_storage(),
                }))
            }
            OpKind::Add | OpKind::Mul | OpKind::Sub => {
                let t = args[0].tensor();
                let size = t.size.clone();
                let stride = contiguous_stride(&size);
                Ok(FakeResult::Tensor(FakeTensor {
                    size,
                    stride,
                    storage_offset: 0,
                    storage: self.fresh_storage(),
                }))
            }
            OpKind::AddInPlace | OpKind::MulInPlace | OpKind::SubInPlace | OpKind::CopyInPlace => {
                Ok(FakeResult::Tensor(args[0].tensor().clone()))
            }
            OpKind::View => {
                let t = args[0].tensor();
                let requested = args[1].ints();
                let numel: i64 = t.size.iter().product();
                let mut size: Shape = requested.iter().copied().collect();
                if let Some(pos) = size.iter().position(|&d| d == -1) {
                    let known: i64 = size.iter().filter(|&&d| d != -1).product();
                    let known = known.max(1);
                    if known == 0 || numel % known != 0 {
                        return Err(EvalError("view shape not divisible for inferred dimension"));
                    }
                    size[pos] = numel / known;
                }
                let stride = contiguous_stride(&size);
                Ok(FakeResult::Tensor(FakeTensor {
                    size,
                    stride,
                    storage_offset: t.storage_offset,
                    storage: t.storage,
                }))
            }
            OpKind::Diagonal => {
                let t = args[0].tensor();
                let offset = args[1].int();
                let dim1 = dim_index(t.size.len(), args[2].int())?;
                let dim2 = dim_index(t.size.len(), args[3].int())?;
                if dim1 == dim2 {
                    return Err(EvalError("diagonal requires two distinct dimensions"));
                }
                let diag_len = (t.size[dim1].min(t.size[dim2]) - offset.unsigned_abs() as i64).max(0);
                let (lo, hi) = if dim1 < dim2 { (dim1, dim2) } else { (dim2, dim1) };
                let mut size = remove_dims(&t.size, &[lo, hi]);
                let mut stride = remove_dims(&t.stride, &[lo, hi]);
                size.push(diag_len);
                stride.push(t.stride[dim1] + t.stride[dim2]);
                let storage_offset = t.storage_offset
                    + if offset >= 0 {
                        offset * t.stride[dim2]
                    } else {
                        -offset * t.stride[dim1]
                    };
                Ok(FakeResult::Tensor(FakeTensor { size, stride, storage_offset, storage: t.storage }))
            }
            OpKind::Select => {
                let t = args[0].tensor();
                let dim = dim_index(t.size.len(), args[1].int())?;
                let index = args[2].int();
                if index < 0 || index >= t.size[dim] {
                    return Err(EvalError("select index out of range"));
                }
                let size = remove_dims(&t.size, &[dim]);
                let stride = remove_dims(&t.stride, &[dim]);
                let storage_offset = t.storage_offset + index * t.stride[dim];
                Ok(FakeResult::Tensor(FakeTensor { size, stride, storage_offset, storage: t.storage }))
            }
            OpKind::Slice => {
                let t = args[0].tensor();
                let dim = dim_index(t.size.len(), args[1].int())?;
                let start = args[2].int().clamp(0, t.size[dim]);
                let end = args[3].int().clamp(start, t.size[dim]);
                let mut size = t.size.clone();
                size[dim] = end - start;
                let stride = t.stride.clone();
                let storage_offset = t.storage_offset + start * t.stride[dim];
                Ok(FakeResult::Tensor(FakeTensor { size, stride, storage_offset, storage: t.storage }))
            }
            OpKind::AsStrided => {
                let t = args[0].tensor();
                let size: Shape = args[1].ints().iter().copied().collect();
                let stride: Shape = args[2].ints().iter().copied().collect();
                let storage_offset = if args.len() > 3 { args[3].int() } else { t.storage_offset };
                Ok(FakeResult::Tensor(FakeTensor { size, stride, storage_offset, storage: t.storage }))
            }
            OpKind::DiagonalScatter | OpKind::SelectScatter | OpKind::SliceScatter | OpKind::AsStridedScatter => {
                let base = args[0].tensor();
                let size = base.size.clone();
                let stride = contiguous_stride(&size);
                Ok(FakeResult::Tensor(FakeTensor {
                    size,
                    stride,
                    storage_offset: 0,
                    storage: self.fresh_storage(),
                }))
            }
            OpKind::Split => {
                let t = args[0].tensor();
                let chunks = args[1].int().max(1);
                if t.size.is_empty() || t.size[0] % chunks != 0 {
                    return Err(EvalError("split size not divisible by chunk count"));
                }
                let rows = t.size[0] / chunks;
                let mut out = Vec::with_capacity(chunks as usize);
                for i in 0..chunks {
                    let mut size = t.size.clone();
                    size[0] = rows;
                    out.push(FakeTensor {
                        size,
                        stride: t.stride.clone(),
                        storage_offset: t.storage_offset + i * rows * t.stride[0],
                        storage: t.storage,
                    });
                }
                Ok(FakeResult::Tensors(out))
            }
            OpKind::GetItem => match &args[0] {
                FakeArg::Tensors(list) => {
                    let idx = args[1].int();
                    let t = list
                        .get(idx as usize)
                        .ok_or(EvalError("getitem index out of range"))?;
                    Ok(FakeResult::Tensor(t.clone()))
                }
                _ => Err(EvalError("getitem's first argument must be a multi-output view result")),
            },
            OpKind::Custom => {
                let t = args[0].tensor();
                let size = t.size.clone();
                let stride = contiguous_stride(&size);
                Ok(FakeResult::Tensor(FakeTensor {
                    size,
                    stride,
                    storage_offset: 0,
                    storage: self.fresh_storage(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_allocates_fresh_storage() {
        let _ = env_logger::try_init();
        let mut ex = FakeTensorExecutor::new();
        let x = ex.sample_tensor(&[2, 3]);
        let storage_before = x.storage;
        let cloned = ex.eval(OpKind::Clone, &[FakeArg::Tensor(x)]).unwrap();
        assert_ne!(cloned.as_tensor().storage, storage_before);
        assert_eq!(cloned.as_tensor().size.as_slice(), &[2, 3]);
    }

    #[test]
    fn view_shares_storage_with_base() {
        let _ = env_logger::try_init();
        let mut ex = FakeTensorExecutor::new();
        let x = ex.sample_tensor(&[2, 3]);
        let storage = x.storage;
        let viewed = ex
            .eval(OpKind::View, &[FakeArg::Tensor(x), FakeArg::Ints(Shape::from_slice(&[-1]))])
            .unwrap();
        assert_eq!(viewed.as_tensor().storage, storage);
        assert_eq!(viewed.as_tensor().size.as_slice(), &[6]);
    }

    #[test]
    fn select_offsets_into_base_storage() {
        let _ = env_logger::try_init();
        let mut ex = FakeTensorExecutor::new();
        let x = ex.sample_tensor(&[4, 4]);
        let storage = x.storage;
        let row1 = ex
            .eval(OpKind::Select, &[FakeArg::Tensor(x.clone()), FakeArg::Int(0), FakeArg::Int(1)])
            .unwrap();
        let row1 = row1.as_tensor();
        assert_eq!(row1.storage, storage);
        assert_eq!(row1.storage_offset, 4);
        assert_eq!(row1.size.as_slice(), &[4]);
    }

    #[test]
    fn as_strided_honors_explicit_storage_offset() {
        let _ = env_logger::try_init();
        let mut ex = FakeTensorExecutor::new();
        let x = ex.sample_tensor(&[4, 4]);
        let mirror = ex
            .eval(
                OpKind::AsStrided,
                &[
                    FakeArg::Tensor(x),
                    FakeArg::Ints(Shape::from_slice(&[4])),
                    FakeArg::Ints(Shape::from_slice(&[4])),
                    FakeArg::Int(1),
                ],
            )
            .unwrap();
        assert_eq!(mirror.as_tensor().storage_offset, 1);
    }

    #[test]
    fn split_then_getitem_recovers_a_chunk() {
        let _ = env_logger::try_init();
        let mut ex = FakeTensorExecutor::new();
        let x = ex.sample_tensor(&[4]);
        let storage = x.storage;
        let parts = ex.eval(OpKind::Split, &[FakeArg::Tensor(x), FakeArg::Int(2)]).unwrap();
        let parts = match parts {
            FakeResult::Tensors(ts) => ts,
            _ => panic!("expected multi-output result"),
        };
        let p1 = ex
            .eval(OpKind::GetItem, &[FakeArg::Tensors(parts), FakeArg::Int(1)])
            .unwrap();
        let p1 = p1.as_tensor();
        assert_eq!(p1.storage, storage);
        assert_eq!(p1.storage_offset, 2);
    }

    #[test]
    fn scatter_reproduces_bases_shape_in_a_fresh_storage() {
        let _ = env_logger::try_init();
        let mut ex = FakeTensorExecutor::new();
        let base = ex.sample_tensor(&[4]);
        let base_storage = base.storage;
        let patch = ex.sample_tensor(&[1]);
        let scattered = ex
            .eval(
                OpKind::SelectScatter,
                &[FakeArg::Tensor(base), FakeArg::Tensor(patch), FakeArg::Int(0), FakeArg::Int(1)],
            )
            .unwrap();
        let scattered = scattered.as_tensor();
        assert_ne!(scattered.storage, base_storage);
        assert_eq!(scattered.size.as_slice(), &[4]);
    }
}
