//! Lock-step strided iteration.
//!
//! [`OffsetWalk`] enumerates the linear buffer offsets a strided view
//! touches, in row-major logical order (or reversed). The apply entry
//! points run one walk per operand in lock-step: broadcast the input
//! shapes, resolve per-operand strides, select a kernel, vet the output
//! cast, and only then touch any buffer. Validation errors never leave a
//! partially written output.
//!
//! The core is synchronous and holds no shared mutable state; callers
//! wanting parallelism partition the outer dimension and invoke it per
//! chunk.

use smallvec::SmallVec;
use thiserror::Error;

use crate::broadcast::{broadcast_shapes, broadcast_strides, BroadcastError};
use crate::cast::{check_cast, promote, CastError, CastingMode};
use crate::dispatch::{DispatchError, DispatchTable, KernelFn};
use crate::scalar::Value;
use crate::view::{StridedView, ViewError};

/// Errors returned by the apply entry points.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The output shape does not equal the broadcast iteration shape.
    #[error("output shape {actual:?} does not match iteration shape {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
    #[error(transparent)]
    Cast(#[from] CastError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    View(#[from] ViewError),
}

/// Traversal direction over the iteration shape.
///
/// Reverse order exists for in-place operations over aliased buffers
/// where forward order would overwrite elements still to be read; the
/// choice is always the caller's, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterationOrder {
    #[default]
    Forward,
    Reverse,
}

/// Optional per-element transform between raw buffer access and the
/// kernel. `None` from `read` marks the element missing: the kernel is
/// skipped and `fill` is written to the output position.
#[derive(Clone, Copy)]
pub struct Accessor {
    pub read: fn(Value) -> Option<Value>,
    pub fill: Value,
}

/// Per-call options for the apply entry points.
#[derive(Clone, Copy)]
pub struct ApplyOptions {
    pub casting: CastingMode,
    pub order: IterationOrder,
    pub accessor: Option<Accessor>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            casting: CastingMode::Safe,
            order: IterationOrder::Forward,
            accessor: None,
        }
    }
}

/// Row-major enumeration of the linear offsets addressed by a
/// (shape, strides, offset) tuple.
pub struct OffsetWalk {
    shape: SmallVec<[usize; 4]>,
    strides: SmallVec<[isize; 4]>,
    indices: SmallVec<[usize; 4]>,
    current: isize,
    remaining: usize,
}

impl OffsetWalk {
    pub fn forward(shape: &[usize], strides: &[isize], offset: usize) -> Self {
        let remaining = shape.iter().product();
        Self {
            shape: shape.into(),
            strides: strides.into(),
            indices: smallvec::smallvec![0; shape.len()],
            current: offset as isize,
            remaining,
        }
    }

    /// The forward sequence visited back to front: a forward walk with
    /// negated strides starting at the last logical element.
    pub fn reverse(shape: &[usize], strides: &[isize], offset: usize) -> Self {
        let mut start = offset as isize;
        let negated: SmallVec<[isize; 4]> = shape
            .iter()
            .zip(strides.iter())
            .map(|(&extent, &stride)| {
                if extent > 0 {
                    start += (extent as isize - 1) * stride;
                }
                -stride
            })
            .collect();
        let mut walk = Self::forward(shape, &negated, 0);
        walk.current = start;
        walk
    }

    pub fn with_order(
        shape: &[usize],
        strides: &[isize],
        offset: usize,
        order: IterationOrder,
    ) -> Self {
        match order {
            IterationOrder::Forward => Self::forward(shape, strides, offset),
            IterationOrder::Reverse => Self::reverse(shape, strides, offset),
        }
    }
}

impl Iterator for OffsetWalk {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let emitted = self.current as usize;
        // Odometer increment, innermost dimension fastest.
        for d in (0..self.shape.len()).rev() {
            self.indices[d] += 1;
            self.current += self.strides[d];
            if self.indices[d] < self.shape[d] {
                break;
            }
            self.indices[d] = 0;
            self.current -= self.shape[d] as isize * self.strides[d];
        }
        Some(emitted)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

fn read_operand<B: AsRef<[u8]>>(
    view: &StridedView<B>,
    linear: usize,
    accessor: &Option<Accessor>,
) -> Option<Value> {
    let raw = view.read_at(linear);
    match accessor {
        Some(a) => (a.read)(raw),
        None => Some(raw),
    }
}

fn check_output_shape<B: AsRef<[u8]>>(
    iter_shape: &[usize],
    out: &StridedView<B>,
) -> Result<(), ApplyError> {
    if out.shape() != iter_shape {
        return Err(ApplyError::ShapeMismatch {
            expected: iter_shape.to_vec(),
            actual: out.shape().to_vec(),
        });
    }
    Ok(())
}

fn binary_kernel(table: &DispatchTable, inputs: &[crate::dtype::DataType]) -> Result<fn(Value, Value) -> Value, ApplyError> {
    match table.lookup(inputs)? {
        KernelFn::Binary(f) => Ok(*f),
        other => Err(DispatchError::ArityMismatch {
            expected: 2,
            actual: other.arity(),
        }
        .into()),
    }
}

/// Fill every output element from a nullary kernel.
pub fn fill_nullary<BO>(
    table: &DispatchTable,
    out: &mut StridedView<BO>,
    opts: &ApplyOptions,
) -> Result<(), ApplyError>
where
    BO: AsRef<[u8]> + AsMut<[u8]>,
{
    let kernel = match table.lookup(&[])? {
        KernelFn::Nullary(f) => *f,
        other => {
            return Err(DispatchError::ArityMismatch {
                expected: 0,
                actual: other.arity(),
            }
            .into())
        }
    };
    let offsets = OffsetWalk::with_order(out.shape(), out.strides(), out.offset(), opts.order)
        .collect::<Vec<_>>();
    for linear in offsets {
        out.write_at(linear, kernel());
    }
    Ok(())
}

/// Elementwise unary application: `out[i] = k(x[i])`.
pub fn apply_unary<BX, BO>(
    table: &DispatchTable,
    x: &StridedView<BX>,
    out: &mut StridedView<BO>,
    opts: &ApplyOptions,
) -> Result<(), ApplyError>
where
    BX: AsRef<[u8]>,
    BO: AsRef<[u8]> + AsMut<[u8]>,
{
    let iter_shape = broadcast_shapes(&[x.shape()])?;
    check_output_shape(&iter_shape, out)?;
    let xs = broadcast_strides(x.shape(), x.strides(), &iter_shape)?;
    let kernel = match table.lookup(&[x.dtype()])? {
        KernelFn::Unary(f) => *f,
        other => {
            return Err(DispatchError::ArityMismatch {
                expected: 1,
                actual: other.arity(),
            }
            .into())
        }
    };
    check_cast(x.dtype(), out.dtype(), opts.casting)?;

    let xw = OffsetWalk::with_order(&iter_shape, &xs, x.offset(), opts.order);
    let ow = OffsetWalk::with_order(out.shape(), out.strides(), out.offset(), opts.order);
    let pairs: Vec<(usize, usize)> = xw.zip(ow).collect();
    for (lx, lo) in pairs {
        match read_operand(x, lx, &opts.accessor) {
            Some(v) => out.write_at(lo, kernel(v)),
            None => out.write_at(lo, opts.accessor.as_ref().map(|a| a.fill).unwrap_or(Value::Float(f64::NAN))),
        }
    }
    Ok(())
}

/// Elementwise binary application with broadcasting:
/// `out[i] = k(x[i], y[i])`.
pub fn apply_binary<BX, BY, BO>(
    table: &DispatchTable,
    x: &StridedView<BX>,
    y: &StridedView<BY>,
    out: &mut StridedView<BO>,
    opts: &ApplyOptions,
) -> Result<(), ApplyError>
where
    BX: AsRef<[u8]>,
    BY: AsRef<[u8]>,
    BO: AsRef<[u8]> + AsMut<[u8]>,
{
    let iter_shape = broadcast_shapes(&[x.shape(), y.shape()])?;
    check_output_shape(&iter_shape, out)?;
    let xs = broadcast_strides(x.shape(), x.strides(), &iter_shape)?;
    let ys = broadcast_strides(y.shape(), y.strides(), &iter_shape)?;
    let kernel = binary_kernel(table, &[x.dtype(), y.dtype()])?;
    let result_dtype = promote(x.dtype(), y.dtype());
    check_cast(result_dtype, out.dtype(), opts.casting)?;

    let xw = OffsetWalk::with_order(&iter_shape, &xs, x.offset(), opts.order);
    let yw = OffsetWalk::with_order(&iter_shape, &ys, y.offset(), opts.order);
    let ow = OffsetWalk::with_order(out.shape(), out.strides(), out.offset(), opts.order);
    let triples: Vec<((usize, usize), usize)> = xw.zip(yw).zip(ow).collect();
    for ((lx, ly), lo) in triples {
        let vx = read_operand(x, lx, &opts.accessor);
        let vy = read_operand(y, ly, &opts.accessor);
        match (vx, vy) {
            (Some(a), Some(b)) => out.write_at(lo, kernel(a, b)),
            _ => {
                let fill = opts
                    .accessor
                    .as_ref()
                    .map(|a| a.fill)
                    .unwrap_or(Value::Float(f64::NAN));
                out.write_at(lo, fill);
            }
        }
    }
    Ok(())
}

/// Elementwise ternary application with broadcasting.
pub fn apply_ternary<BX, BY, BZ, BO>(
    table: &DispatchTable,
    x: &StridedView<BX>,
    y: &StridedView<BY>,
    z: &StridedView<BZ>,
    out: &mut StridedView<BO>,
    opts: &ApplyOptions,
) -> Result<(), ApplyError>
where
    BX: AsRef<[u8]>,
    BY: AsRef<[u8]>,
    BZ: AsRef<[u8]>,
    BO: AsRef<[u8]> + AsMut<[u8]>,
{
    let iter_shape = broadcast_shapes(&[x.shape(), y.shape(), z.shape()])?;
    check_output_shape(&iter_shape, out)?;
    let xs = broadcast_strides(x.shape(), x.strides(), &iter_shape)?;
    let ys = broadcast_strides(y.shape(), y.strides(), &iter_shape)?;
    let zs = broadcast_strides(z.shape(), z.strides(), &iter_shape)?;
    let kernel = match table.lookup(&[x.dtype(), y.dtype(), z.dtype()])? {
        KernelFn::Ternary(f) => *f,
        other => {
            return Err(DispatchError::ArityMismatch {
                expected: 3,
                actual: other.arity(),
            }
            .into())
        }
    };
    let result_dtype = promote(promote(x.dtype(), y.dtype()), z.dtype());
    check_cast(result_dtype, out.dtype(), opts.casting)?;

    let xw = OffsetWalk::with_order(&iter_shape, &xs, x.offset(), opts.order);
    let yw = OffsetWalk::with_order(&iter_shape, &ys, y.offset(), opts.order);
    let zw = OffsetWalk::with_order(&iter_shape, &zs, z.offset(), opts.order);
    let ow = OffsetWalk::with_order(out.shape(), out.strides(), out.offset(), opts.order);
    let quads: Vec<(((usize, usize), usize), usize)> = xw.zip(yw).zip(zw).zip(ow).collect();
    for (((lx, ly), lz), lo) in quads {
        let vx = read_operand(x, lx, &opts.accessor);
        let vy = read_operand(y, ly, &opts.accessor);
        let vz = read_operand(z, lz, &opts.accessor);
        match (vx, vy, vz) {
            (Some(a), Some(b), Some(c)) => out.write_at(lo, kernel(a, b, c)),
            _ => {
                let fill = opts
                    .accessor
                    .as_ref()
                    .map(|a| a.fill)
                    .unwrap_or(Value::Float(f64::NAN));
                out.write_at(lo, fill);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DataType;
    use crate::view::Order;
    use smallvec::smallvec;

    fn add(a: Value, b: Value) -> Value {
        Value::Float(a.as_f64() + b.as_f64())
    }

    fn neg(a: Value) -> Value {
        Value::Float(-a.as_f64())
    }

    fn fma(a: Value, b: Value, c: Value) -> Value {
        Value::Float(a.as_f64() * b.as_f64() + c.as_f64())
    }

    fn binary_table() -> DispatchTable {
        let mut table = DispatchTable::new(2);
        table
            .insert(&[DataType::Float64, DataType::Float64], KernelFn::Binary(add))
            .unwrap();
        table
    }

    fn f64s(shape: smallvec::SmallVec<[usize; 4]>, data: &[f64]) -> StridedView<bytes::BytesMut> {
        StridedView::from_f64s(DataType::Float64, shape, data, Order::RowMajor).unwrap()
    }

    fn out_f64(shape: smallvec::SmallVec<[usize; 4]>) -> StridedView<bytes::BytesMut> {
        StridedView::zeros(DataType::Float64, shape, Order::RowMajor).unwrap()
    }

    #[test]
    fn offset_walk_follows_row_major_order() {
        let offsets: Vec<usize> = OffsetWalk::forward(&[2, 3], &[3, 1], 0).collect();
        assert_eq!(offsets, [0, 1, 2, 3, 4, 5]);

        // Negative inner stride walks backwards within each row.
        let offsets: Vec<usize> = OffsetWalk::forward(&[2, 3], &[3, -1], 2).collect();
        assert_eq!(offsets, [2, 1, 0, 5, 4, 3]);

        // Rank 0 emits the base offset once.
        let offsets: Vec<usize> = OffsetWalk::forward(&[], &[], 7).collect();
        assert_eq!(offsets, [7]);

        // Empty shapes emit nothing.
        let offsets: Vec<usize> = OffsetWalk::forward(&[0, 3], &[3, 1], 0).collect();
        assert!(offsets.is_empty());
    }

    #[test]
    fn reverse_walk_is_forward_reversed() {
        let forward: Vec<usize> = OffsetWalk::forward(&[2, 3], &[5, -2], 4).collect();
        let mut expected = forward.clone();
        expected.reverse();
        let reverse: Vec<usize> = OffsetWalk::reverse(&[2, 3], &[5, -2], 4).collect();
        assert_eq!(reverse, expected);
    }

    #[test]
    fn broadcast_add_revisits_scalar_operand() {
        let x = f64s(smallvec![3], &[1.0, 2.0, 3.0]);
        let y = f64s(smallvec![1], &[10.0]);
        let mut out = out_f64(smallvec![3]);
        apply_binary(&binary_table(), &x, &y, &mut out, &ApplyOptions::default()).unwrap();
        let got: Vec<f64> = out.iter().map(|v| v.as_f64()).collect();
        assert_eq!(got, [11.0, 12.0, 13.0]);
    }

    #[test]
    fn broadcast_add_matrix_and_row() {
        let x = f64s(smallvec![2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = f64s(smallvec![3], &[10.0, 20.0, 30.0]);
        let mut out = out_f64(smallvec![2, 3]);
        apply_binary(&binary_table(), &x, &y, &mut out, &ApplyOptions::default()).unwrap();
        let got: Vec<f64> = out.iter().map(|v| v.as_f64()).collect();
        assert_eq!(got, [11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    }

    #[test]
    fn incompatible_shapes_fail_before_any_write() {
        let x = f64s(smallvec![2], &[1.0, 2.0]);
        let y = f64s(smallvec![3], &[1.0, 2.0, 3.0]);
        let mut out = out_f64(smallvec![3]);
        let err = match apply_binary(&binary_table(), &x, &y, &mut out, &ApplyOptions::default()) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, ApplyError::Broadcast(BroadcastError::Incompatible { .. })));
        assert!(out.iter().all(|v| v.as_f64() == 0.0));
    }

    #[test]
    fn casting_violation_leaves_output_untouched() {
        let x = f64s(smallvec![2], &[1.5, 2.5]);
        let y = f64s(smallvec![2], &[1.0, 1.0]);
        let mut out = StridedView::zeros(DataType::Int32, smallvec![2], Order::RowMajor).unwrap();
        let err = match apply_binary(&binary_table(), &x, &y, &mut out, &ApplyOptions::default()) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        match err {
            ApplyError::Cast(CastError::Disallowed { from, to, mode }) => {
                assert_eq!(from, DataType::Float64);
                assert_eq!(to, DataType::Int32);
                assert_eq!(mode, CastingMode::Safe);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(out.iter().all(|v| v.as_i64() == 0));
        // The same call succeeds under unsafe casting.
        let opts = ApplyOptions {
            casting: CastingMode::Unsafe,
            ..Default::default()
        };
        apply_binary(&binary_table(), &x, &y, &mut out, &opts).unwrap();
        let got: Vec<i64> = out.iter().map(|v| v.as_i64()).collect();
        assert_eq!(got, [2, 3]);
    }

    #[test]
    fn unsupported_signature_fails_before_any_write() {
        let x = f64s(smallvec![2], &[1.0, 2.0]);
        let y = StridedView::zeros(DataType::Int32, smallvec![2], Order::RowMajor).unwrap();
        let mut out = out_f64(smallvec![2]);
        let err = match apply_binary(&binary_table(), &x, &y, &mut out, &ApplyOptions::default()) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        match err {
            ApplyError::Dispatch(DispatchError::UnsupportedSignature { signature }) => {
                assert_eq!(signature, "di");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(out.iter().all(|v| v.as_f64() == 0.0));
    }

    #[test]
    fn accessor_skips_kernel_and_propagates_fill() {
        fn non_negative(v: Value) -> Option<Value> {
            if v.as_f64() < 0.0 {
                None
            } else {
                Some(v)
            }
        }
        let x = f64s(smallvec![4], &[1.0, -2.0, 3.0, -4.0]);
        let y = f64s(smallvec![1], &[10.0]);
        let mut out = out_f64(smallvec![4]);
        let opts = ApplyOptions {
            accessor: Some(Accessor {
                read: non_negative,
                fill: Value::Float(f64::NAN),
            }),
            ..Default::default()
        };
        apply_binary(&binary_table(), &x, &y, &mut out, &opts).unwrap();
        let got: Vec<f64> = out.iter().map(|v| v.as_f64()).collect();
        assert_eq!(got[0], 11.0);
        assert!(got[1].is_nan());
        assert_eq!(got[2], 13.0);
        assert!(got[3].is_nan());
    }

    #[test]
    fn unary_and_ternary_entry_points() {
        let mut unary = DispatchTable::new(1);
        unary
            .insert(&[DataType::Float64], KernelFn::Unary(neg))
            .unwrap();
        let x = f64s(smallvec![3], &[1.0, -2.0, 3.0]);
        let mut out = out_f64(smallvec![3]);
        apply_unary(&unary, &x, &mut out, &ApplyOptions::default()).unwrap();
        let got: Vec<f64> = out.iter().map(|v| v.as_f64()).collect();
        assert_eq!(got, [-1.0, 2.0, -3.0]);

        let mut ternary = DispatchTable::new(3);
        ternary
            .insert(
                &[DataType::Float64, DataType::Float64, DataType::Float64],
                KernelFn::Ternary(fma),
            )
            .unwrap();
        let a = f64s(smallvec![2], &[2.0, 3.0]);
        let b = f64s(smallvec![2], &[10.0, 10.0]);
        let c = f64s(smallvec![1], &[1.0]);
        let mut out = out_f64(smallvec![2]);
        apply_ternary(&ternary, &a, &b, &c, &mut out, &ApplyOptions::default()).unwrap();
        let got: Vec<f64> = out.iter().map(|v| v.as_f64()).collect();
        assert_eq!(got, [21.0, 31.0]);
    }

    #[test]
    fn nullary_fill_covers_every_position() {
        fn one() -> Value {
            Value::Float(1.0)
        }
        let mut table = DispatchTable::new(0);
        table.insert(&[], KernelFn::Nullary(one)).unwrap();
        let mut out = out_f64(smallvec![2, 2]);
        fill_nullary(&table, &mut out, &ApplyOptions::default()).unwrap();
        assert!(out.iter().all(|v| v.as_f64() == 1.0));
    }

    #[test]
    fn reverse_order_produces_identical_results() {
        let x = f64s(smallvec![2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = f64s(smallvec![3], &[1.0, 1.0, 1.0]);
        let mut fwd = out_f64(smallvec![2, 3]);
        let mut rev = out_f64(smallvec![2, 3]);
        apply_binary(&binary_table(), &x, &y, &mut fwd, &ApplyOptions::default()).unwrap();
        let opts = ApplyOptions {
            order: IterationOrder::Reverse,
            ..Default::default()
        };
        apply_binary(&binary_table(), &x, &y, &mut rev, &opts).unwrap();
        let a: Vec<f64> = fwd.iter().map(|v| v.as_f64()).collect();
        let b: Vec<f64> = rev.iter().map(|v| v.as_f64()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_iteration_shape_is_a_no_op() {
        let x = f64s(smallvec![0], &[]);
        let y = f64s(smallvec![1], &[5.0]);
        let mut out = out_f64(smallvec![0]);
        apply_binary(&binary_table(), &x, &y, &mut out, &ApplyOptions::default()).unwrap();
        assert!(out.is_empty());
    }
}
