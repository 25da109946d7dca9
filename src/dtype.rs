//! Data-type registry.
//!
//! [`DataType`] is the runtime tag attached to every buffer view at
//! construction time. It answers three questions: how wide is an element,
//! which single-letter code does it contribute to a dispatch signature,
//! and which [`DataTypeKind`] it belongs to. Classification happens once,
//! at construction, never by inspecting values on hot paths.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors returned by the dtype registry.
#[derive(Debug, Error)]
pub enum DtypeError {
    /// The identifier does not name a registered dtype.
    #[error("unknown dtype identifier {name:?}")]
    Unknown { name: String },
}

/// Broad element category, tagged at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DataTypeKind {
    SignedInt,
    UnsignedInt,
    Float,
    Complex,
    Bool,
    Generic,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Bool,
    Generic,
}

impl DataType {
    /// Every registered dtype, in registry order.
    pub const ALL: [DataType; 14] = [
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::Uint8,
        DataType::Uint16,
        DataType::Uint32,
        DataType::Uint64,
        DataType::Float32,
        DataType::Float64,
        DataType::Complex64,
        DataType::Complex128,
        DataType::Bool,
        DataType::Generic,
    ];

    /// Element width in bytes.
    ///
    /// `None` for [`DataType::Generic`]: boxed values have no fixed wire
    /// width, and byte-backed views reject them at construction.
    pub const fn byte_width(&self) -> Option<usize> {
        match self {
            DataType::Int8 | DataType::Uint8 | DataType::Bool => Some(1),
            DataType::Int16 | DataType::Uint16 => Some(2),
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => Some(4),
            DataType::Int64 | DataType::Uint64 | DataType::Float64 | DataType::Complex64 => Some(8),
            DataType::Complex128 => Some(16),
            DataType::Generic => None,
        }
    }

    /// Single-letter code contributed to dispatch signatures.
    pub const fn char_code(&self) -> char {
        match self {
            DataType::Int8 => 's',
            DataType::Int16 => 'h',
            DataType::Int32 => 'i',
            DataType::Int64 => 'l',
            DataType::Uint8 => 'b',
            DataType::Uint16 => 't',
            DataType::Uint32 => 'u',
            DataType::Uint64 => 'v',
            DataType::Float32 => 'f',
            DataType::Float64 => 'd',
            DataType::Complex64 => 'c',
            DataType::Complex128 => 'z',
            DataType::Bool => 'x',
            DataType::Generic => 'o',
        }
    }

    pub const fn kind(&self) -> DataTypeKind {
        match self {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                DataTypeKind::SignedInt
            }
            DataType::Uint8 | DataType::Uint16 | DataType::Uint32 | DataType::Uint64 => {
                DataTypeKind::UnsignedInt
            }
            DataType::Float32 | DataType::Float64 => DataTypeKind::Float,
            DataType::Complex64 | DataType::Complex128 => DataTypeKind::Complex,
            DataType::Bool => DataTypeKind::Bool,
            DataType::Generic => DataTypeKind::Generic,
        }
    }

    pub const fn is_numeric(&self) -> bool {
        !matches!(self, DataType::Bool | DataType::Generic)
    }

    /// Canonical lowercase identifier.
    pub const fn name(&self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Complex64 => "complex64",
            DataType::Complex128 => "complex128",
            DataType::Bool => "bool",
            DataType::Generic => "generic",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = DtypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .iter()
            .copied()
            .find(|dt| dt.name() == s)
            .ok_or_else(|| DtypeError::Unknown { name: s.to_owned() })
    }
}

/// Concatenated char codes for a dtype tuple, e.g. `[Float64, Float64]`
/// yields `"dd"`.
pub fn signature(dtypes: &[DataType]) -> String {
    dtypes.iter().map(DataType::char_code).collect()
}

/// Smallest dtype able to hold `value` without loss.
///
/// Integer-valued non-negative values walk the unsigned widths, negative
/// integer values the signed widths. Anything else falls to the smallest
/// floating-point dtype whose range covers the magnitude.
pub fn min_dtype(value: f64) -> DataType {
    if value.fract() == 0.0 && value.is_finite() {
        if value >= 0.0 {
            if value <= u8::MAX as f64 {
                return DataType::Uint8;
            }
            if value <= u16::MAX as f64 {
                return DataType::Uint16;
            }
            if value <= u32::MAX as f64 {
                return DataType::Uint32;
            }
            if value <= u64::MAX as f64 {
                return DataType::Uint64;
            }
        } else {
            if value >= i8::MIN as f64 {
                return DataType::Int8;
            }
            if value >= i16::MIN as f64 {
                return DataType::Int16;
            }
            if value >= i32::MIN as f64 {
                return DataType::Int32;
            }
            if value >= i64::MIN as f64 {
                return DataType::Int64;
            }
        }
    }
    if value.is_nan() || value.abs() <= f32::MAX as f64 {
        DataType::Float32
    } else {
        DataType::Float64
    }
}
