//! Shape broadcasting.
//!
//! Shapes align from the trailing dimension; a missing leading dimension
//! counts as extent 1. Two aligned extents are compatible when equal or
//! when either is 1, and the broadcast extent is their maximum. A zero
//! extent anywhere propagates an empty result rather than an error.
//! Incompatibility is signaled before any iteration begins.

use smallvec::SmallVec;
use thiserror::Error;

use crate::view::StridedView;

/// Errors returned by the broadcasting engine.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Two aligned extents are neither equal nor 1.
    #[error("cannot broadcast extent {left} against {right} in dimension {dim}")]
    Incompatible {
        dim: usize,
        left: usize,
        right: usize,
    },
    /// An operand has more dimensions than the target shape.
    #[error("operand of rank {operand} exceeds target rank {target}")]
    RankExceedsTarget { operand: usize, target: usize },
    /// An operand extent cannot be stretched to the target extent.
    #[error("cannot stretch extent {extent} to {target} in dimension {dim}")]
    CannotStretch {
        dim: usize,
        extent: usize,
        target: usize,
    },
}

/// Broadcast-compatible output shape for a set of operand shapes.
///
/// Commutative in its operands; an empty operand list yields the scalar
/// shape `[]`.
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Result<SmallVec<[usize; 4]>, BroadcastError> {
    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out: SmallVec<[usize; 4]> = smallvec::smallvec![1; rank];
    for shape in shapes {
        let pad = rank - shape.len();
        for (i, &extent) in shape.iter().enumerate() {
            let dim = pad + i;
            let current = out[dim];
            out[dim] = match (current, extent) {
                (c, e) if c == e => c,
                (1, e) => e,
                (c, 1) => c,
                // A zero extent wins over any non-1 extent it aligns with
                // only when the other side is 1 (handled above); zero vs
                // n>1 is incompatible, matching trailing-rule semantics.
                (c, e) => {
                    return Err(BroadcastError::Incompatible {
                        dim,
                        left: c,
                        right: e,
                    })
                }
            };
        }
    }
    Ok(out)
}

/// Effective iteration stride for one dimension of a broadcast operand.
///
/// An extent-1 dimension is revisited, so its stride collapses to 0; an
/// extent equal to the target keeps its own stride; anything else is an
/// error.
pub fn resolve_stride(extent: usize, target: usize, stride: isize) -> Result<isize, BroadcastError> {
    if extent == 1 {
        // A single element is revisited regardless of target extent.
        Ok(0)
    } else if extent == target {
        Ok(stride)
    } else {
        Err(BroadcastError::CannotStretch {
            dim: 0,
            extent,
            target,
        })
    }
}

/// Per-dimension iteration strides for an operand broadcast to `target`.
///
/// Missing leading dimensions get stride 0.
pub fn broadcast_strides(
    shape: &[usize],
    strides: &[isize],
    target: &[usize],
) -> Result<SmallVec<[isize; 4]>, BroadcastError> {
    if shape.len() > target.len() {
        return Err(BroadcastError::RankExceedsTarget {
            operand: shape.len(),
            target: target.len(),
        });
    }
    let pad = target.len() - shape.len();
    let mut out: SmallVec<[isize; 4]> = smallvec::smallvec![0; target.len()];
    for (i, (&extent, &stride)) in shape.iter().zip(strides.iter()).enumerate() {
        let dim = pad + i;
        out[dim] = resolve_stride(extent, target[dim], stride).map_err(|e| match e {
            BroadcastError::CannotStretch { extent, target, .. } => {
                BroadcastError::CannotStretch {
                    dim,
                    extent,
                    target,
                }
            }
            other => other,
        })?;
    }
    Ok(out)
}

/// A zero-copy view of `view` broadcast to `target`.
pub fn broadcast_to<B>(
    view: &StridedView<B>,
    target: &[usize],
) -> Result<StridedView<B>, BroadcastError>
where
    B: AsRef<[u8]> + Clone,
{
    let strides = broadcast_strides(view.shape(), view.strides(), target)?;
    Ok(view.with_layout(target.into(), strides))
}
