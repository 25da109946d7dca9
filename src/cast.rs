//! Casting modes and dtype promotion.
//!
//! The compatibility matrix is data, not inference: [`safe_targets`] is
//! the per-dtype table of lossless conversions, and the other modes are
//! defined relative to it. [`promote`] picks the natural result dtype for
//! a binary operation; [`check_cast`] is the gate consulted before any
//! output buffer is allocated or written.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::dtype::{DataType, DataTypeKind};

/// Policy governing implicit dtype conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CastingMode {
    /// No casting: dtypes must be identical.
    None,
    /// Equivalent representation only. With a single byte order registered
    /// this coincides with [`CastingMode::None`].
    Equiv,
    /// Lossless widening only.
    Safe,
    /// Safe, plus precision-lowering conversions that stay within
    /// floating point.
    MostlySafe,
    /// Safe, plus any conversion within the same [`DataTypeKind`].
    SameKind,
    /// Any conversion between registered dtypes.
    Unsafe,
}

/// Errors returned by the casting resolver.
#[derive(Debug, Error)]
pub enum CastError {
    /// The conversion is not permitted under the requested mode.
    #[error("cannot cast {from} to {to} under {mode:?} casting")]
    Disallowed {
        from: DataType,
        to: DataType,
        mode: CastingMode,
    },
}

/// Lossless conversion targets for `from`, including `from` itself.
///
/// Integer entries widen to integers that cover their full range and to
/// floating-point dtypes whose mantissa holds every value exactly.
/// Everything converts safely to `generic`.
pub const fn safe_targets(from: DataType) -> &'static [DataType] {
    use DataType::*;
    match from {
        Int8 => &[
            Int8, Int16, Int32, Int64, Float32, Float64, Complex64, Complex128, Generic,
        ],
        Int16 => &[
            Int16, Int32, Int64, Float32, Float64, Complex64, Complex128, Generic,
        ],
        Int32 => &[Int32, Int64, Float64, Complex128, Generic],
        Int64 => &[Int64, Generic],
        Uint8 => &[
            Uint8, Uint16, Uint32, Uint64, Int16, Int32, Int64, Float32, Float64, Complex64,
            Complex128, Generic,
        ],
        Uint16 => &[
            Uint16, Uint32, Uint64, Int32, Int64, Float32, Float64, Complex64, Complex128, Generic,
        ],
        Uint32 => &[Uint32, Uint64, Int64, Float64, Complex128, Generic],
        Uint64 => &[Uint64, Generic],
        Float32 => &[Float32, Float64, Complex64, Complex128, Generic],
        Float64 => &[Float64, Complex128, Generic],
        Complex64 => &[Complex64, Complex128, Generic],
        Complex128 => &[Complex128, Generic],
        Bool => &[
            Bool, Int8, Int16, Int32, Int64, Uint8, Uint16, Uint32, Uint64, Float32, Float64,
            Complex64, Complex128, Generic,
        ],
        Generic => &[Generic],
    }
}

/// Precision-lowering conversions admitted by [`CastingMode::MostlySafe`]
/// on top of the safe table.
const MOSTLY_SAFE_EXTRAS: [(DataType, DataType); 3] = [
    (DataType::Float64, DataType::Float32),
    (DataType::Complex128, DataType::Complex64),
    (DataType::Float64, DataType::Complex64),
];

fn is_safe(from: DataType, to: DataType) -> bool {
    safe_targets(from).contains(&to)
}

/// Whether converting `from` to `to` is permitted under `mode`.
pub fn can_cast(from: DataType, to: DataType, mode: CastingMode) -> bool {
    match mode {
        CastingMode::None | CastingMode::Equiv => from == to,
        CastingMode::Safe => is_safe(from, to),
        CastingMode::MostlySafe => {
            is_safe(from, to) || MOSTLY_SAFE_EXTRAS.contains(&(from, to))
        }
        CastingMode::SameKind => is_safe(from, to) || from.kind() == to.kind(),
        CastingMode::Unsafe => true,
    }
}

/// [`can_cast`] as a gate: the rejection names the offending pair.
pub fn check_cast(from: DataType, to: DataType, mode: CastingMode) -> Result<(), CastError> {
    if can_cast(from, to, mode) {
        Ok(())
    } else {
        Err(CastError::Disallowed { from, to, mode })
    }
}

/// Permitted target dtypes per source dtype under `mode`.
pub fn casting_table(mode: CastingMode) -> BTreeMap<DataType, Vec<DataType>> {
    DataType::ALL
        .iter()
        .map(|&from| {
            let targets = DataType::ALL
                .iter()
                .copied()
                .filter(|&to| can_cast(from, to, mode))
                .collect();
            (from, targets)
        })
        .collect()
}

// Floating-point precision class able to hold the dtype exactly.
fn float_precision(dt: DataType) -> u8 {
    use DataType::*;
    match dt {
        Int8 | Int16 | Uint8 | Uint16 | Float32 | Complex64 | Bool => 32,
        _ => 64,
    }
}

fn signed_of_width(width: usize) -> DataType {
    match width {
        1 => DataType::Int8,
        2 => DataType::Int16,
        4 => DataType::Int32,
        _ => DataType::Int64,
    }
}

fn max_width(a: DataType, b: DataType) -> usize {
    // Both operands are fixed-width by the time promotion mixes widths.
    let wa = a.byte_width().unwrap_or(0);
    let wb = b.byte_width().unwrap_or(0);
    wa.max(wb)
}

/// Natural result dtype for a binary operation over `a` and `b`.
///
/// Mixed signed/unsigned integers promote to the smallest signed integer
/// covering both ranges; when none exists (a `uint64` operand) the result
/// is `float64`. `bool` defers to the other operand; `generic` absorbs
/// everything.
pub fn promote(a: DataType, b: DataType) -> DataType {
    use DataTypeKind::*;
    if a == b {
        return a;
    }
    if a.kind() == Generic || b.kind() == Generic {
        return DataType::Generic;
    }
    if a.kind() == Bool {
        return b;
    }
    if b.kind() == Bool {
        return a;
    }
    if a.kind() == Complex || b.kind() == Complex {
        return if float_precision(a).max(float_precision(b)) <= 32 {
            DataType::Complex64
        } else {
            DataType::Complex128
        };
    }
    if a.kind() == Float || b.kind() == Float {
        return if float_precision(a).max(float_precision(b)) <= 32 {
            DataType::Float32
        } else {
            DataType::Float64
        };
    }
    match (a.kind(), b.kind()) {
        (SignedInt, SignedInt) => signed_of_width(max_width(a, b)),
        (UnsignedInt, UnsignedInt) => {
            let width = max_width(a, b);
            match width {
                1 => DataType::Uint8,
                2 => DataType::Uint16,
                4 => DataType::Uint32,
                _ => DataType::Uint64,
            }
        }
        _ => {
            // Mixed sign: the unsigned range forces the next signed width.
            let (signed, unsigned) = if a.kind() == SignedInt { (a, b) } else { (b, a) };
            let uw = unsigned.byte_width().unwrap_or(8);
            if uw >= 8 {
                return DataType::Float64;
            }
            let sw = signed.byte_width().unwrap_or(8);
            signed_of_width(sw.max(uw * 2))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_mode_accepts_only_identical_pairs() {
        for a in DataType::ALL {
            for b in DataType::ALL {
                assert_eq!(can_cast(a, b, CastingMode::None), a == b);
                assert_eq!(can_cast(a, b, CastingMode::Equiv), a == b);
            }
        }
    }

    #[test]
    fn unsafe_mode_accepts_all_pairs() {
        for a in DataType::ALL {
            for b in DataType::ALL {
                assert!(can_cast(a, b, CastingMode::Unsafe));
            }
        }
    }

    #[test]
    fn safe_is_reflexive_and_sorted_into_modes() {
        for dt in DataType::ALL {
            assert!(can_cast(dt, dt, CastingMode::Safe), "{dt} not safe to itself");
        }
        // Every mode admits at least what the mode below it admits.
        for a in DataType::ALL {
            for b in DataType::ALL {
                if can_cast(a, b, CastingMode::Safe) {
                    assert!(can_cast(a, b, CastingMode::MostlySafe));
                    assert!(can_cast(a, b, CastingMode::SameKind));
                }
                if can_cast(a, b, CastingMode::MostlySafe) {
                    assert!(can_cast(a, b, CastingMode::Unsafe));
                }
            }
        }
    }

    #[test]
    fn safe_widening_examples() {
        assert!(can_cast(DataType::Int8, DataType::Int64, CastingMode::Safe));
        assert!(can_cast(DataType::Uint8, DataType::Int16, CastingMode::Safe));
        assert!(can_cast(DataType::Int16, DataType::Float32, CastingMode::Safe));
        assert!(can_cast(DataType::Float32, DataType::Complex64, CastingMode::Safe));
        // int32 does not fit a float32 mantissa.
        assert!(!can_cast(DataType::Int32, DataType::Float32, CastingMode::Safe));
        // int64 has no exact float64 embedding.
        assert!(!can_cast(DataType::Int64, DataType::Float64, CastingMode::Safe));
        assert!(!can_cast(DataType::Float64, DataType::Float32, CastingMode::Safe));
    }

    #[test]
    fn mostly_safe_admits_float_downcasts_only() {
        assert!(can_cast(DataType::Float64, DataType::Float32, CastingMode::MostlySafe));
        assert!(can_cast(DataType::Complex128, DataType::Complex64, CastingMode::MostlySafe));
        assert!(!can_cast(DataType::Int64, DataType::Int32, CastingMode::MostlySafe));
        assert!(!can_cast(DataType::Float64, DataType::Int64, CastingMode::MostlySafe));
    }

    #[test]
    fn same_kind_admits_narrowing_within_kind() {
        assert!(can_cast(DataType::Int64, DataType::Int8, CastingMode::SameKind));
        assert!(can_cast(DataType::Uint64, DataType::Uint8, CastingMode::SameKind));
        assert!(can_cast(DataType::Float64, DataType::Float32, CastingMode::SameKind));
        // Crossing the signed/unsigned boundary is not same-kind.
        assert!(!can_cast(DataType::Int32, DataType::Uint32, CastingMode::SameKind));
    }

    #[test]
    fn check_cast_names_the_pair() {
        let err = match check_cast(DataType::Float64, DataType::Int32, CastingMode::Safe) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        match err {
            CastError::Disallowed { from, to, mode } => {
                assert_eq!(from, DataType::Float64);
                assert_eq!(to, DataType::Int32);
                assert_eq!(mode, CastingMode::Safe);
            }
        }
    }

    #[test]
    fn casting_table_matches_can_cast() {
        let table = casting_table(CastingMode::Safe);
        assert_eq!(table.len(), DataType::ALL.len());
        for (&from, targets) in &table {
            for to in DataType::ALL {
                assert_eq!(targets.contains(&to), can_cast(from, to, CastingMode::Safe));
            }
        }
        // "none" table: every dtype maps to itself alone.
        for (&from, targets) in &casting_table(CastingMode::None) {
            assert_eq!(targets.as_slice(), &[from]);
        }
    }

    #[test]
    fn promote_is_commutative() {
        for a in DataType::ALL {
            for b in DataType::ALL {
                assert_eq!(promote(a, b), promote(b, a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn promote_examples() {
        assert_eq!(promote(DataType::Float64, DataType::Float64), DataType::Float64);
        assert_eq!(promote(DataType::Int8, DataType::Int32), DataType::Int32);
        assert_eq!(promote(DataType::Uint8, DataType::Uint16), DataType::Uint16);
        assert_eq!(promote(DataType::Int32, DataType::Uint32), DataType::Int64);
        assert_eq!(promote(DataType::Int8, DataType::Uint8), DataType::Int16);
        assert_eq!(promote(DataType::Int64, DataType::Uint64), DataType::Float64);
        assert_eq!(promote(DataType::Int16, DataType::Float32), DataType::Float32);
        assert_eq!(promote(DataType::Int32, DataType::Float32), DataType::Float64);
        assert_eq!(promote(DataType::Float32, DataType::Complex64), DataType::Complex64);
        assert_eq!(promote(DataType::Float64, DataType::Complex64), DataType::Complex128);
        assert_eq!(promote(DataType::Bool, DataType::Int32), DataType::Int32);
        assert_eq!(promote(DataType::Generic, DataType::Float64), DataType::Generic);
    }

    #[test]
    fn promote_preserves_kind_and_width_within_a_kind() {
        for a in DataType::ALL {
            for b in DataType::ALL {
                if a.kind() != b.kind() || a.kind() == DataTypeKind::Bool {
                    continue;
                }
                let out = promote(a, b);
                assert_eq!(out.kind(), a.kind(), "{a} vs {b}");
                let w = a.byte_width().unwrap_or(0).max(b.byte_width().unwrap_or(0));
                assert_eq!(out.byte_width().unwrap_or(0), w, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn promote_with_complex_operand_stays_complex() {
        for other in DataType::ALL {
            if other == DataType::Generic {
                continue;
            }
            let out = promote(DataType::Complex64, other);
            assert_eq!(out.kind(), DataTypeKind::Complex, "complex64 vs {other}");
        }
    }
}
