//! Runtime element values and the byte-level element codec.
//!
//! [`Value`] is the currency between buffers and kernels: buffers decode
//! elements into a `Value`, kernels compute on `Value`s, and results are
//! encoded back through the output view's dtype. Coercions follow `as`
//! semantics; the casting resolver has already vetted the conversion by
//! the time a value reaches a buffer boundary.
//!
//! All multi-byte encodings are native-endian, matching how the host
//! supplies typed buffers.

use num_complex::Complex64;
use thiserror::Error;

use crate::dtype::DataType;

/// Errors returned by the element codec.
#[derive(Debug, Error)]
pub enum ScalarError {
    /// The dtype has no fixed byte width, so no byte-level codec exists.
    #[error("dtype {dtype} is not fixed-width")]
    NotFixedWidth { dtype: DataType },
    /// Element index past the end of the buffer.
    #[error("element {index} out of bounds for buffer of {len} elements")]
    OutOfBounds { index: usize, len: usize },
}

/// A single array element, lifted to the widest member of its category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Complex(Complex64),
}

impl Value {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Bool(b) => b as u8 as f64,
            Value::Int(v) => v as f64,
            Value::Uint(v) => v as f64,
            Value::Float(v) => v,
            Value::Complex(v) => v.re,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            Value::Bool(b) => b as i64,
            Value::Int(v) => v,
            Value::Uint(v) => v as i64,
            Value::Float(v) => v as i64,
            Value::Complex(v) => v.re as i64,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match *self {
            Value::Bool(b) => b as u64,
            Value::Int(v) => v as u64,
            Value::Uint(v) => v,
            Value::Float(v) => v as u64,
            Value::Complex(v) => v.re as u64,
        }
    }

    pub fn as_bool(&self) -> bool {
        match *self {
            Value::Bool(b) => b,
            Value::Int(v) => v != 0,
            Value::Uint(v) => v != 0,
            Value::Float(v) => v != 0.0,
            Value::Complex(v) => v.re != 0.0 || v.im != 0.0,
        }
    }

    pub fn as_complex(&self) -> Complex64 {
        match *self {
            Value::Complex(v) => v,
            other => Complex64::new(other.as_f64(), 0.0),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Complex64> for Value {
    fn from(v: Complex64) -> Self {
        Value::Complex(v)
    }
}

fn element_span(
    dtype: DataType,
    bytes_len: usize,
    index: usize,
) -> Result<(usize, usize), ScalarError> {
    let width = dtype
        .byte_width()
        .ok_or(ScalarError::NotFixedWidth { dtype })?;
    let len = bytes_len / width;
    if index >= len {
        return Err(ScalarError::OutOfBounds { index, len });
    }
    let start = index * width;
    Ok((start, start + width))
}

/// Decode element `index` of a flat `dtype` buffer.
pub fn read_value(dtype: DataType, bytes: &[u8], index: usize) -> Result<Value, ScalarError> {
    let (start, end) = element_span(dtype, bytes.len(), index)?;
    let raw = &bytes[start..end];
    let value = match dtype {
        DataType::Int8 => Value::Int(raw[0] as i8 as i64),
        DataType::Int16 => Value::Int(i16::from_ne_bytes(raw.try_into().unwrap()) as i64),
        DataType::Int32 => Value::Int(i32::from_ne_bytes(raw.try_into().unwrap()) as i64),
        DataType::Int64 => Value::Int(i64::from_ne_bytes(raw.try_into().unwrap())),
        DataType::Uint8 => Value::Uint(raw[0] as u64),
        DataType::Uint16 => Value::Uint(u16::from_ne_bytes(raw.try_into().unwrap()) as u64),
        DataType::Uint32 => Value::Uint(u32::from_ne_bytes(raw.try_into().unwrap()) as u64),
        DataType::Uint64 => Value::Uint(u64::from_ne_bytes(raw.try_into().unwrap())),
        DataType::Float32 => Value::Float(f32::from_ne_bytes(raw.try_into().unwrap()) as f64),
        DataType::Float64 => Value::Float(f64::from_ne_bytes(raw.try_into().unwrap())),
        DataType::Complex64 => {
            let re = f32::from_ne_bytes(raw[..4].try_into().unwrap());
            let im = f32::from_ne_bytes(raw[4..].try_into().unwrap());
            Value::Complex(Complex64::new(re as f64, im as f64))
        }
        DataType::Complex128 => {
            let re = f64::from_ne_bytes(raw[..8].try_into().unwrap());
            let im = f64::from_ne_bytes(raw[8..].try_into().unwrap());
            Value::Complex(Complex64::new(re, im))
        }
        DataType::Bool => Value::Bool(raw[0] != 0),
        DataType::Generic => unreachable!("generic has no byte width"),
    };
    Ok(value)
}

/// Encode `value` into element `index` of a flat `dtype` buffer, coercing
/// to the buffer's dtype.
pub fn write_value(
    dtype: DataType,
    bytes: &mut [u8],
    index: usize,
    value: Value,
) -> Result<(), ScalarError> {
    let (start, end) = element_span(dtype, bytes.len(), index)?;
    let dst = &mut bytes[start..end];
    match dtype {
        DataType::Int8 => dst[0] = value.as_i64() as i8 as u8,
        DataType::Int16 => dst.copy_from_slice(&(value.as_i64() as i16).to_ne_bytes()),
        DataType::Int32 => dst.copy_from_slice(&(value.as_i64() as i32).to_ne_bytes()),
        DataType::Int64 => dst.copy_from_slice(&value.as_i64().to_ne_bytes()),
        DataType::Uint8 => dst[0] = value.as_u64() as u8,
        DataType::Uint16 => dst.copy_from_slice(&(value.as_u64() as u16).to_ne_bytes()),
        DataType::Uint32 => dst.copy_from_slice(&(value.as_u64() as u32).to_ne_bytes()),
        DataType::Uint64 => dst.copy_from_slice(&value.as_u64().to_ne_bytes()),
        DataType::Float32 => dst.copy_from_slice(&(value.as_f64() as f32).to_ne_bytes()),
        DataType::Float64 => dst.copy_from_slice(&value.as_f64().to_ne_bytes()),
        DataType::Complex64 => {
            let v = value.as_complex();
            dst[..4].copy_from_slice(&(v.re as f32).to_ne_bytes());
            dst[4..].copy_from_slice(&(v.im as f32).to_ne_bytes());
        }
        DataType::Complex128 => {
            let v = value.as_complex();
            dst[..8].copy_from_slice(&v.re.to_ne_bytes());
            dst[8..].copy_from_slice(&v.im.to_ne_bytes());
        }
        DataType::Bool => dst[0] = value.as_bool() as u8,
        DataType::Generic => unreachable!("generic has no byte width"),
    }
    Ok(())
}
