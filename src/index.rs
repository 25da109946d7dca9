//! Index and offset resolution.
//!
//! Converts n-dimensional index tuples to linear buffer offsets and back.
//! All arithmetic stays in the integer domain; strides are signed and may
//! be negative or zero, so the resolver never assumes a monotone layout.

use smallvec::SmallVec;
use thiserror::Error;

use crate::view::Order;

/// Errors from shape arithmetic.
#[derive(Debug, Error)]
pub enum ShapeError {
    /// `product(shape)` overflowed `usize`.
    #[error("shape element count overflow")]
    Overflow,
}

/// Errors from index resolution.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index tuple's rank does not match the shape's.
    #[error("expected {expected} indices, got {actual}")]
    WrongRank { expected: usize, actual: usize },
    /// An index fell outside `[-extent, extent - 1]` for its dimension.
    #[error("index {index} out of bounds for dimension {dim} of extent {extent}")]
    OutOfBounds {
        index: isize,
        dim: usize,
        extent: usize,
    },
    /// A linear offset is not reachable by any valid index tuple.
    #[error("offset {offset} not addressed by this view")]
    UnreachableOffset { offset: usize },
    /// The resulting linear offset left the buffer (negative or past the
    /// end); the view's stride/offset tuple is inconsistent.
    #[error("linear offset out of buffer range")]
    OffsetRange,
}

/// Policy for resolving a scalar index against a dimension extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Reject anything outside `[-extent, extent - 1]`.
    Error,
    /// Saturate to the valid range.
    Clamp,
    /// Euclidean remainder into the valid range.
    Wrap,
}

/// Overflow-checked element count of a shape.
pub fn num_elements(shape: &[usize]) -> Result<usize, ShapeError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(ShapeError::Overflow)
}

/// Contiguous strides for `shape` under `order`, in elements.
pub fn strides_for(shape: &[usize], order: Order) -> SmallVec<[isize; 4]> {
    let n = shape.len();
    let mut strides: SmallVec<[isize; 4]> = smallvec::smallvec![0; n];
    let mut step = 1isize;
    match order {
        Order::RowMajor => {
            for i in (0..n).rev() {
                strides[i] = step;
                step *= shape[i].max(1) as isize;
            }
        }
        Order::ColumnMajor => {
            for i in 0..n {
                strides[i] = step;
                step *= shape[i].max(1) as isize;
            }
        }
    }
    strides
}

/// Resolve a possibly negative scalar index against a dimension extent.
///
/// `IndexMode::Error` is the strict policy used by the offset resolver;
/// the clamping and wrapping policies exist for APIs documented to do so.
pub fn normalize_index(index: isize, extent: usize, mode: IndexMode) -> Result<usize, IndexError> {
    let n = extent as isize;
    match mode {
        IndexMode::Error => {
            let idx = if index < 0 { index + n } else { index };
            if idx < 0 || idx >= n {
                return Err(IndexError::OutOfBounds {
                    index,
                    dim: 0,
                    extent,
                });
            }
            Ok(idx as usize)
        }
        IndexMode::Clamp => {
            if extent == 0 {
                return Err(IndexError::OutOfBounds {
                    index,
                    dim: 0,
                    extent,
                });
            }
            let idx = if index < 0 { index + n } else { index };
            Ok(idx.clamp(0, n - 1) as usize)
        }
        IndexMode::Wrap => {
            if extent == 0 {
                return Err(IndexError::OutOfBounds {
                    index,
                    dim: 0,
                    extent,
                });
            }
            Ok(index.rem_euclid(n) as usize)
        }
    }
}

/// Linear buffer offset for an index tuple.
///
/// Negative indices count from the end of their dimension; anything
/// outside `[-extent, extent - 1]` is rejected, never clamped.
pub fn to_offset(
    shape: &[usize],
    strides: &[isize],
    offset: usize,
    indices: &[isize],
) -> Result<usize, IndexError> {
    if indices.len() != shape.len() {
        return Err(IndexError::WrongRank {
            expected: shape.len(),
            actual: indices.len(),
        });
    }
    let mut linear = offset as isize;
    for (dim, (&idx, (&extent, &stride))) in indices
        .iter()
        .zip(shape.iter().zip(strides.iter()))
        .enumerate()
    {
        let resolved = normalize_index(idx, extent, IndexMode::Error).map_err(|_| {
            IndexError::OutOfBounds {
                index: idx,
                dim,
                extent,
            }
        })?;
        linear += resolved as isize * stride;
    }
    if linear < 0 {
        return Err(IndexError::OffsetRange);
    }
    Ok(linear as usize)
}

/// Index tuple addressing `linear`, the inverse of [`to_offset`].
///
/// Arbitrary stride sets are not invertible by arithmetic alone (zero and
/// repeated strides alias), so the resolver enumerates the row-major index
/// space and returns the first tuple whose offset matches. This is exact
/// for every offset a strided walk produces.
pub fn from_offset(
    shape: &[usize],
    strides: &[isize],
    offset: usize,
    linear: usize,
) -> Result<SmallVec<[usize; 4]>, IndexError> {
    let count = num_elements(shape).map_err(|_| IndexError::UnreachableOffset { offset: linear })?;
    let n = shape.len();
    let mut indices: SmallVec<[usize; 4]> = smallvec::smallvec![0; n];
    for _ in 0..count {
        let mut candidate = offset as isize;
        for d in 0..n {
            candidate += indices[d] as isize * strides[d];
        }
        if candidate == linear as isize {
            return Ok(indices);
        }
        // Row-major odometer increment.
        let mut d = n;
        loop {
            if d == 0 {
                break;
            }
            d -= 1;
            indices[d] += 1;
            if indices[d] < shape[d] {
                break;
            }
            indices[d] = 0;
        }
    }
    Err(IndexError::UnreachableOffset { offset: linear })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_for_row_and_column_major() {
        assert_eq!(strides_for(&[2, 3, 4], Order::RowMajor).as_slice(), &[12, 4, 1]);
        assert_eq!(strides_for(&[2, 3, 4], Order::ColumnMajor).as_slice(), &[1, 2, 6]);
        assert_eq!(strides_for(&[], Order::RowMajor).as_slice(), &[] as &[isize]);
    }

    #[test]
    fn to_offset_resolves_negative_indices() {
        let shape = [2usize, 3];
        let strides = [3isize, 1];
        assert_eq!(to_offset(&shape, &strides, 0, &[0, 0]).unwrap(), 0);
        assert_eq!(to_offset(&shape, &strides, 0, &[1, 2]).unwrap(), 5);
        assert_eq!(to_offset(&shape, &strides, 0, &[-1, -1]).unwrap(), 5);
        assert_eq!(to_offset(&shape, &strides, 2, &[-2, 1]).unwrap(), 3);
    }

    #[test]
    fn to_offset_rejects_out_of_range() {
        let shape = [2usize, 3];
        let strides = [3isize, 1];
        let err = match to_offset(&shape, &strides, 0, &[0, 3]) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        match err {
            IndexError::OutOfBounds { index, dim, extent } => {
                assert_eq!(index, 3);
                assert_eq!(dim, 1);
                assert_eq!(extent, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(to_offset(&shape, &strides, 0, &[-3, 0]).is_err());
        assert!(to_offset(&shape, &strides, 0, &[0]).is_err());
    }

    #[test]
    fn offsets_roundtrip_for_every_index() {
        // Mixed positive/negative strides with a base offset.
        let shape = [2usize, 3, 2];
        let strides = [6isize, -2, 1];
        let offset = 4usize;
        for i in 0..2isize {
            for j in 0..3isize {
                for k in 0..2isize {
                    let lin = to_offset(&shape, &strides, offset, &[i, j, k]).unwrap();
                    let back = from_offset(&shape, &strides, offset, lin).unwrap();
                    assert_eq!(back.as_slice(), &[i as usize, j as usize, k as usize]);
                }
            }
        }
    }

    #[test]
    fn from_offset_rejects_unreachable() {
        let shape = [2usize, 2];
        let strides = [2isize, 1];
        let err = match from_offset(&shape, &strides, 0, 9) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, IndexError::UnreachableOffset { offset: 9 }));
    }

    #[test]
    fn normalize_index_modes() {
        assert_eq!(normalize_index(-1, 5, IndexMode::Error).unwrap(), 4);
        assert!(normalize_index(5, 5, IndexMode::Error).is_err());
        assert!(normalize_index(-6, 5, IndexMode::Error).is_err());

        assert_eq!(normalize_index(9, 5, IndexMode::Clamp).unwrap(), 4);
        assert_eq!(normalize_index(-9, 5, IndexMode::Clamp).unwrap(), 0);

        assert_eq!(normalize_index(7, 5, IndexMode::Wrap).unwrap(), 2);
        assert_eq!(normalize_index(-1, 5, IndexMode::Wrap).unwrap(), 4);
        assert_eq!(normalize_index(-7, 5, IndexMode::Wrap).unwrap(), 3);
    }

    #[test]
    fn num_elements_checks_overflow() {
        assert_eq!(num_elements(&[2, 3, 4]).unwrap(), 24);
        assert_eq!(num_elements(&[]).unwrap(), 1);
        assert_eq!(num_elements(&[5, 0, 2]).unwrap(), 0);
        assert!(matches!(
            num_elements(&[usize::MAX, 2]),
            Err(ShapeError::Overflow)
        ));
    }
}
