//! Strided buffer views.
//!
//! [`StridedView`] maps a flat byte buffer to a logical multi-dimensional
//! array through the tuple `(dtype, buffer, shape, strides, offset,
//! order)`. That tuple fully describes every view; there is no hidden
//! state, and derived views (transpose, slice, flip, reinterpret) are new
//! tuples over the same bytes, never in-place mutations of a shared one.
//!
//! ## Buffer types
//! A view is generic over its backing buffer `B`:
//! - `bytes::Bytes` (the default) for shared immutable buffers; cloning a
//!   view bumps a refcount, so derived views are zero-copy.
//! - `bytes::BytesMut` for owned mutable buffers (see [`StridedView::zeros`]).
//! - `&[u8]` / `&mut [u8]` for borrowed buffers.
//!
//! Reading requires `B: AsRef<[u8]>`; writing requires `B: AsMut<[u8]>`.
//! Read-only-ness is a property of the buffer type, decided at compile
//! time.
//!
//! ## Order
//! [`Order`] is a construction-time convenience: it selects how strides
//! are computed when only a shape is given. Iteration and indexing use
//! the explicit strides exclusively.
//!
//! ## Aliasing
//! Two views over one buffer may address overlapping elements; this layer
//! does not prevent it. Callers running in-place operations over aliased
//! views select reverse iteration explicitly (see `iter`).

use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;
use thiserror::Error;

use crate::dtype::DataType;
use crate::index::{self, IndexError, ShapeError};
use crate::scalar::{self, ScalarError, Value};

/// Canonical stride nesting used when strides are computed from a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Order {
    RowMajor,
    ColumnMajor,
}

/// Errors returned by view construction and transformation.
#[derive(Debug, Error)]
pub enum ViewError {
    /// The dtype has no fixed byte width and cannot back a byte view.
    #[error("dtype {dtype} is not fixed-width")]
    NotFixedWidth { dtype: DataType },
    /// The buffer byte length is not a multiple of the element width.
    #[error("buffer of {len} bytes is not divisible by element width {width}")]
    IndivisibleBuffer { len: usize, width: usize },
    /// Shape and strides must have one entry per dimension.
    #[error("shape has {shape} dimensions but strides has {strides}")]
    RankMismatch { shape: usize, strides: usize },
    /// The number of provided elements doesn't match `product(shape)`.
    #[error("wrong element count: expected {expected}, got {actual}")]
    WrongElementCount { expected: usize, actual: usize },
    /// The view addresses an element past the end of the buffer.
    #[error("view reaches element {required} but buffer holds {len}")]
    OutOfBuffer { required: usize, len: usize },
    /// The view addresses an element before the start of the buffer.
    #[error("view reaches below the buffer start")]
    NegativeReach,
    /// The axis list is not a permutation of `0..ndims`.
    #[error("invalid axis permutation {axes:?} for rank {rank}")]
    BadPermutation { axes: Vec<usize>, rank: usize },
    /// An axis index past the view's rank.
    #[error("axis {axis} out of range for rank {rank}")]
    BadAxis { axis: usize, rank: usize },
    /// A slice step of zero never advances.
    #[error("slice step must be nonzero")]
    ZeroStep,
    /// Reinterpretation needs a unit innermost stride to rescale.
    #[error("reinterpret requires innermost stride 1, found {stride}")]
    InnerStrideNotUnit { stride: isize },
    /// The view offset does not fall on a target-element boundary.
    #[error("offset {offset} is not a multiple of the width ratio {ratio}")]
    ReinterpretUnevenOffset { offset: usize, ratio: usize },
    /// A stride does not fall on a target-element boundary.
    #[error("stride {stride} is not a multiple of the width ratio {ratio}")]
    ReinterpretUnevenStride { stride: isize, ratio: usize },
    /// The innermost extent does not group evenly into wider elements.
    #[error("innermost extent {extent} is not a multiple of the width ratio {ratio}")]
    ReinterpretUnevenExtent { extent: usize, ratio: usize },
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Scalar(#[from] ScalarError),
}

/// Per-dimension slice specification with Python-style normalization.
///
/// `start`/`end` default to the full extent for the sign of `step`;
/// negative bounds count from the end and out-of-range bounds clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<isize>,
    pub end: Option<isize>,
    pub step: isize,
}

impl Slice {
    /// The whole dimension.
    pub const fn all() -> Self {
        Slice {
            start: None,
            end: None,
            step: 1,
        }
    }

    pub const fn new(start: Option<isize>, end: Option<isize>, step: isize) -> Self {
        Slice { start, end, step }
    }
}

impl From<std::ops::Range<isize>> for Slice {
    fn from(r: std::ops::Range<isize>) -> Self {
        Slice::new(Some(r.start), Some(r.end), 1)
    }
}

impl From<std::ops::RangeFull> for Slice {
    fn from(_: std::ops::RangeFull) -> Self {
        Slice::all()
    }
}

/// A strided view over a flat byte buffer.
pub struct StridedView<B = Bytes> {
    dtype: DataType,
    data: B,
    shape: SmallVec<[usize; 4]>,
    strides: SmallVec<[isize; 4]>,
    offset: usize,
    order: Order,
}

impl<B: AsRef<[u8]>> StridedView<B> {
    /// Create a validated view.
    ///
    /// Checks that the dtype is fixed-width, the buffer byte length is a
    /// whole number of elements, shape and strides agree in rank, the
    /// element count does not overflow, and every addressable element
    /// (negative strides included) lands inside the buffer. Empty views
    /// skip the reachability check.
    pub fn try_new(
        dtype: DataType,
        data: B,
        shape: SmallVec<[usize; 4]>,
        strides: SmallVec<[isize; 4]>,
        offset: usize,
        order: Order,
    ) -> Result<Self, ViewError> {
        let width = dtype
            .byte_width()
            .ok_or(ViewError::NotFixedWidth { dtype })?;
        let byte_len = data.as_ref().len();
        if byte_len % width != 0 {
            return Err(ViewError::IndivisibleBuffer {
                len: byte_len,
                width,
            });
        }
        if shape.len() != strides.len() {
            return Err(ViewError::RankMismatch {
                shape: shape.len(),
                strides: strides.len(),
            });
        }
        let count = index::num_elements(&shape)?;
        if count > 0 {
            let buffer_elems = byte_len / width;
            let mut min = offset as isize;
            let mut max = offset as isize;
            for (&extent, &stride) in shape.iter().zip(strides.iter()) {
                let span = (extent as isize - 1) * stride;
                if span < 0 {
                    min += span;
                } else {
                    max += span;
                }
            }
            if min < 0 {
                return Err(ViewError::NegativeReach);
            }
            if max as usize >= buffer_elems {
                return Err(ViewError::OutOfBuffer {
                    required: max as usize,
                    len: buffer_elems,
                });
            }
        }
        Ok(Self {
            dtype,
            data,
            shape,
            strides,
            offset,
            order,
        })
    }

    /// Create a validated view.
    ///
    /// # Panics
    /// Panics when [`StridedView::try_new`] would return an error.
    pub fn new(
        dtype: DataType,
        data: B,
        shape: SmallVec<[usize; 4]>,
        strides: SmallVec<[isize; 4]>,
        offset: usize,
        order: Order,
    ) -> Self {
        match Self::try_new(dtype, data, shape, strides, offset, order) {
            Ok(view) => view,
            Err(e) => panic!("invalid view layout: {e}"),
        }
    }

    /// A contiguous view over the whole buffer, strides computed from
    /// `shape` per `order`.
    pub fn from_shape(
        dtype: DataType,
        data: B,
        shape: SmallVec<[usize; 4]>,
        order: Order,
    ) -> Result<Self, ViewError> {
        let strides = index::strides_for(&shape, order);
        Self::try_new(dtype, data, shape, strides, 0, order)
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn ndims(&self) -> usize {
        self.shape.len()
    }

    /// Logical element count.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the strides match the contiguous layout for this view's
    /// order with no leading offset.
    pub fn is_contiguous(&self) -> bool {
        self.offset == 0 && self.strides == index::strides_for(&self.shape, self.order)
    }

    /// The backing bytes.
    pub fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Element at an index tuple. Negative indices count from the end of
    /// their dimension; out-of-range indices are an error, never clamped.
    pub fn get(&self, indices: &[isize]) -> Result<Value, ViewError> {
        let linear = index::to_offset(&self.shape, &self.strides, self.offset, indices)?;
        Ok(self.read_at(linear))
    }

    /// Values in row-major logical order.
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        crate::iter::OffsetWalk::forward(&self.shape, &self.strides, self.offset)
            .map(move |linear| self.read_at(linear))
    }

    pub(crate) fn read_at(&self, linear: usize) -> Value {
        // Construction validated every reachable offset.
        match scalar::read_value(self.dtype, self.data.as_ref(), linear) {
            Ok(v) => v,
            Err(e) => panic!("validated view read failed: {e}"),
        }
    }

    /// Same layout over the same buffer with replaced shape/strides.
    /// Used for broadcast views; callers guarantee reachability does not
    /// grow (stride-0 dimensions only revisit validated elements).
    pub(crate) fn with_layout(
        &self,
        shape: SmallVec<[usize; 4]>,
        strides: SmallVec<[isize; 4]>,
    ) -> Self
    where
        B: Clone,
    {
        Self {
            dtype: self.dtype,
            data: self.data.clone(),
            shape,
            strides,
            offset: self.offset,
            order: self.order,
        }
    }
}

impl<B: AsRef<[u8]> + Clone> StridedView<B> {
    /// Reversed-axes view.
    pub fn transpose(&self) -> Self {
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        shape.reverse();
        strides.reverse();
        self.with_layout(shape, strides)
    }

    /// View with axes rearranged so that output axis `i` is input axis
    /// `axes[i]`. `axes` must name every axis exactly once.
    pub fn permute(&self, axes: &[usize]) -> Result<Self, ViewError> {
        let rank = self.ndims();
        let mut seen = vec![false; rank];
        if axes.len() != rank || axes.iter().any(|&a| a >= rank || std::mem::replace(&mut seen[a], true)) {
            return Err(ViewError::BadPermutation {
                axes: axes.to_vec(),
                rank,
            });
        }
        let shape = axes.iter().map(|&a| self.shape[a]).collect();
        let strides = axes.iter().map(|&a| self.strides[a]).collect();
        Ok(self.with_layout(shape, strides))
    }

    /// View with one axis reversed.
    pub fn flip(&self, axis: usize) -> Result<Self, ViewError> {
        let rank = self.ndims();
        if axis >= rank {
            return Err(ViewError::BadAxis { axis, rank });
        }
        let extent = self.shape[axis];
        let stride = self.strides[axis];
        let mut strides = self.strides.clone();
        strides[axis] = -stride;
        let offset = if extent == 0 {
            self.offset as isize
        } else {
            self.offset as isize + (extent as isize - 1) * stride
        };
        if offset < 0 {
            return Err(ViewError::NegativeReach);
        }
        let mut view = self.with_layout(self.shape.clone(), strides);
        view.offset = offset as usize;
        Ok(view)
    }

    /// Sub-range view, one [`Slice`] per dimension.
    pub fn slice(&self, args: &[Slice]) -> Result<Self, ViewError> {
        let rank = self.ndims();
        if args.len() != rank {
            return Err(ViewError::RankMismatch {
                shape: rank,
                strides: args.len(),
            });
        }
        let mut shape: SmallVec<[usize; 4]> = SmallVec::with_capacity(rank);
        let mut strides: SmallVec<[isize; 4]> = SmallVec::with_capacity(rank);
        let mut offset = self.offset as isize;
        for (dim, arg) in args.iter().enumerate() {
            if arg.step == 0 {
                return Err(ViewError::ZeroStep);
            }
            let n = self.shape[dim] as isize;
            let stride = self.strides[dim];
            let (first, count) = if arg.step > 0 {
                let mut start = arg.start.unwrap_or(0);
                if start < 0 {
                    start += n;
                }
                let start = start.clamp(0, n);
                let mut end = arg.end.unwrap_or(n);
                if end < 0 {
                    end += n;
                }
                let end = end.clamp(0, n);
                let count = if end > start {
                    (end - start + arg.step - 1) / arg.step
                } else {
                    0
                };
                (start, count)
            } else {
                let start = match arg.start {
                    Some(s) => {
                        let s = if s < 0 { s + n } else { s };
                        s.clamp(-1, n - 1)
                    }
                    None => n - 1,
                };
                let end = match arg.end {
                    Some(e) => {
                        let e = if e < 0 { e + n } else { e };
                        e.clamp(-1, n - 1)
                    }
                    None => -1,
                };
                let count = if start > end {
                    (start - end - arg.step - 1) / -arg.step
                } else {
                    0
                };
                (start, count)
            };
            if count > 0 {
                offset += first * stride;
            }
            shape.push(count as usize);
            strides.push(stride * arg.step);
        }
        if offset < 0 {
            return Err(ViewError::NegativeReach);
        }
        let mut view = self.with_layout(shape, strides);
        view.offset = offset as usize;
        Ok(view)
    }

    /// The same bytes under a different fixed-width dtype.
    ///
    /// Strides, offset, and the innermost extent are rescaled by the
    /// byte-width ratio; nothing is reference-copied. Fails when the
    /// buffer byte length is not divisible by the target width, when the
    /// innermost stride is not 1, or when offset/strides/extent do not
    /// fall on target-element boundaries.
    pub fn reinterpret(&self, target: DataType) -> Result<Self, ViewError> {
        let ow = self
            .dtype
            .byte_width()
            .ok_or(ViewError::NotFixedWidth { dtype: self.dtype })?;
        let nw = target
            .byte_width()
            .ok_or(ViewError::NotFixedWidth { dtype: target })?;
        let byte_len = self.data.as_ref().len();
        if byte_len % nw != 0 {
            return Err(ViewError::IndivisibleBuffer {
                len: byte_len,
                width: nw,
            });
        }
        if ow == nw {
            let mut view = self.with_layout(self.shape.clone(), self.strides.clone());
            view.dtype = target;
            return Ok(view);
        }
        let inner = match self.strides.last() {
            Some(&s) => s,
            None => 0,
        };
        if inner != 1 {
            return Err(ViewError::InnerStrideNotUnit { stride: inner });
        }
        let last = self.ndims() - 1;
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        let offset;
        if ow > nw {
            // Narrower elements: each old element splits into `ratio`.
            let ratio = ow / nw;
            for s in strides.iter_mut().take(last) {
                *s *= ratio as isize;
            }
            shape[last] *= ratio;
            offset = self.offset * ratio;
        } else {
            // Wider elements: `ratio` old elements fuse into one.
            let ratio = nw / ow;
            if shape[last] % ratio != 0 {
                return Err(ViewError::ReinterpretUnevenExtent {
                    extent: shape[last],
                    ratio,
                });
            }
            if self.offset % ratio != 0 {
                return Err(ViewError::ReinterpretUnevenOffset {
                    offset: self.offset,
                    ratio,
                });
            }
            for s in strides.iter_mut().take(last) {
                if *s % ratio as isize != 0 {
                    return Err(ViewError::ReinterpretUnevenStride {
                        stride: *s,
                        ratio,
                    });
                }
                *s /= ratio as isize;
            }
            shape[last] /= ratio;
            offset = self.offset / ratio;
        }
        let mut view = self.with_layout(shape, strides);
        view.dtype = target;
        view.offset = offset;
        Ok(view)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> StridedView<B> {
    /// Write an element at an index tuple, coercing to the view's dtype.
    pub fn set(&mut self, indices: &[isize], value: Value) -> Result<(), ViewError> {
        let linear = index::to_offset(&self.shape, &self.strides, self.offset, indices)?;
        self.write_at(linear, value);
        Ok(())
    }

    pub(crate) fn write_at(&mut self, linear: usize, value: Value) {
        let dtype = self.dtype;
        match scalar::write_value(dtype, self.data.as_mut(), linear, value) {
            Ok(()) => {}
            Err(e) => panic!("validated view write failed: {e}"),
        }
    }
}

impl StridedView<BytesMut> {
    /// Owned zero-filled array.
    pub fn zeros(
        dtype: DataType,
        shape: SmallVec<[usize; 4]>,
        order: Order,
    ) -> Result<Self, ViewError> {
        let width = dtype
            .byte_width()
            .ok_or(ViewError::NotFixedWidth { dtype })?;
        let count = index::num_elements(&shape)?;
        let byte_len = count
            .checked_mul(width)
            .ok_or(ShapeError::Overflow)?;
        let data = BytesMut::zeroed(byte_len);
        Self::from_shape(dtype, data, shape, order)
    }

    /// Owned array from runtime values in row-major element order,
    /// coerced to `dtype`.
    pub fn from_values(
        dtype: DataType,
        shape: SmallVec<[usize; 4]>,
        values: &[Value],
        order: Order,
    ) -> Result<Self, ViewError> {
        let count = index::num_elements(&shape)?;
        if values.len() != count {
            return Err(ViewError::WrongElementCount {
                expected: count,
                actual: values.len(),
            });
        }
        let mut view = Self::zeros(dtype, shape, order)?;
        // Storage position follows the view's own (possibly column-major)
        // strides; `values` is consumed in logical row-major order.
        let offsets: Vec<usize> =
            crate::iter::OffsetWalk::forward(&view.shape, &view.strides, view.offset).collect();
        for (linear, &v) in offsets.into_iter().zip(values.iter()) {
            view.write_at(linear, v);
        }
        Ok(view)
    }

    /// Owned array from `f64` elements in row-major order.
    pub fn from_f64s(
        dtype: DataType,
        shape: SmallVec<[usize; 4]>,
        data: &[f64],
        order: Order,
    ) -> Result<Self, ViewError> {
        let values: Vec<Value> = data.iter().map(|&v| Value::Float(v)).collect();
        Self::from_values(dtype, shape, &values, order)
    }

    /// Share the buffer as an immutable view.
    pub fn freeze(self) -> StridedView<Bytes> {
        StridedView {
            dtype: self.dtype,
            data: self.data.freeze(),
            shape: self.shape,
            strides: self.strides,
            offset: self.offset,
            order: self.order,
        }
    }
}
