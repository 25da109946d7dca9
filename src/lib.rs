//! Strided n-dimensional array core.
//!
//! This crate implements the metadata layer of an ndarray runtime: the
//! contract between flat typed buffers and the logical multi-dimensional
//! arrays layered on top of them. Everything revolves around one tuple
//! with no hidden state:
//!
//! ```text
//! (dtype, buffer, shape, strides, offset, order)
//! ```
//!
//! ## Components
//! - [`dtype`] — the data-type registry: byte widths, single-letter
//!   dispatch codes, kind classification, minimum-dtype queries.
//! - [`cast`] — casting modes and the promotion/compatibility tables.
//! - [`scalar`] — runtime element values and the native-endian codec.
//! - [`view`] — [`view::StridedView`]: validated buffer views and their
//!   zero-copy transforms (transpose, permute, slice, flip, reinterpret).
//! - [`index`] — index-tuple to linear-offset resolution and back.
//! - [`broadcast`] — shape broadcasting and stride resolution.
//! - [`dispatch`] — dtype-signature-keyed kernel tables.
//! - [`iter`] — the lock-step strided walk and the apply entry points.
//!
//! ## Example
//! ```rust,ignore
//! use lattice::{apply_binary, ApplyOptions, DataType, DispatchTable, KernelFn, Order, StridedView, Value};
//! use smallvec::smallvec;
//!
//! fn add(a: Value, b: Value) -> Value {
//!     Value::Float(a.as_f64() + b.as_f64())
//! }
//!
//! let mut table = DispatchTable::new(2);
//! table.insert(&[DataType::Float64, DataType::Float64], KernelFn::Binary(add))?;
//!
//! let x = StridedView::from_f64s(DataType::Float64, smallvec![3], &[1.0, 2.0, 3.0], Order::RowMajor)?;
//! let y = StridedView::from_f64s(DataType::Float64, smallvec![1], &[10.0], Order::RowMajor)?;
//! let mut out = StridedView::zeros(DataType::Float64, smallvec![3], Order::RowMajor)?;
//! apply_binary(&table, &x, &y, &mut out, &ApplyOptions::default())?;
//! ```
//!
//! ## Concurrency
//! Every call is synchronous and touches only the buffers handed to it;
//! the registries and tables are read-only after construction. Parallel
//! callers partition the outer dimension into disjoint chunks.

pub mod broadcast;
pub mod cast;
pub mod dispatch;
pub mod dtype;
pub mod index;
pub mod iter;
pub mod scalar;
pub mod view;

pub use broadcast::{broadcast_shapes, broadcast_strides, broadcast_to, resolve_stride, BroadcastError};
pub use cast::{can_cast, casting_table, check_cast, promote, CastError, CastingMode};
pub use dispatch::{DispatchError, DispatchTable, KernelFn};
pub use dtype::{min_dtype, signature, DataType, DataTypeKind, DtypeError};
pub use index::{from_offset, normalize_index, num_elements, strides_for, to_offset, IndexError, IndexMode, ShapeError};
pub use iter::{
    apply_binary, apply_ternary, apply_unary, fill_nullary, Accessor, ApplyError, ApplyOptions,
    IterationOrder, OffsetWalk,
};
pub use scalar::{read_value, write_value, ScalarError, Value};
pub use view::{Order, Slice, StridedView, ViewError};
