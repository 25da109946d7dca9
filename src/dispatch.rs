//! Kernel dispatch tables.
//!
//! A [`DispatchTable`] is an ordered list of `(signature, kernel)` entries
//! keyed by the concatenated single-letter codes of the input dtypes
//! (`"dd"` for float64 x float64). Lookup scans in registration order. A
//! miss fails fast unless a generic fallback was registered explicitly;
//! there is no silent boxing path.
//!
//! Tables are read-only once built, so sharing them across threads needs
//! no synchronization.

use thiserror::Error;

use crate::dtype::{signature, DataType};
use crate::scalar::Value;

/// Errors returned by kernel selection.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No entry (and no fallback) for the requested dtype combination.
    #[error("unsupported dtype combination {signature:?}")]
    UnsupportedSignature { signature: String },
    /// Kernel or lookup arity differs from the table's arity.
    #[error("expected arity {expected}, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
}

/// A per-element compute function.
#[derive(Debug, Clone, Copy)]
pub enum KernelFn {
    Nullary(fn() -> Value),
    Unary(fn(Value) -> Value),
    Binary(fn(Value, Value) -> Value),
    Ternary(fn(Value, Value, Value) -> Value),
}

impl KernelFn {
    pub const fn arity(&self) -> usize {
        match self {
            KernelFn::Nullary(_) => 0,
            KernelFn::Unary(_) => 1,
            KernelFn::Binary(_) => 2,
            KernelFn::Ternary(_) => 3,
        }
    }
}

/// Ordered dispatch table for one operation.
pub struct DispatchTable {
    arity: usize,
    entries: Vec<(String, KernelFn)>,
    fallback: Option<KernelFn>,
}

impl DispatchTable {
    /// An empty table for kernels taking `arity` inputs (0 to 3).
    pub fn new(arity: usize) -> Self {
        Self {
            arity,
            entries: Vec::new(),
            fallback: None,
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Register a kernel for an input dtype tuple. Later registrations of
    /// the same signature are shadowed by earlier ones; registration
    /// order is lookup order.
    pub fn insert(&mut self, inputs: &[DataType], kernel: KernelFn) -> Result<(), DispatchError> {
        if inputs.len() != self.arity || kernel.arity() != self.arity {
            return Err(DispatchError::ArityMismatch {
                expected: self.arity,
                actual: inputs.len().max(kernel.arity()),
            });
        }
        self.entries.push((signature(inputs), kernel));
        Ok(())
    }

    /// Register the explicit generic fallback used when no signature
    /// matches.
    pub fn set_fallback(&mut self, kernel: KernelFn) -> Result<(), DispatchError> {
        if kernel.arity() != self.arity {
            return Err(DispatchError::ArityMismatch {
                expected: self.arity,
                actual: kernel.arity(),
            });
        }
        self.fallback = Some(kernel);
        Ok(())
    }

    /// Select the kernel for an input dtype tuple.
    pub fn lookup(&self, inputs: &[DataType]) -> Result<&KernelFn, DispatchError> {
        if inputs.len() != self.arity {
            return Err(DispatchError::ArityMismatch {
                expected: self.arity,
                actual: inputs.len(),
            });
        }
        let sig = signature(inputs);
        for (entry_sig, kernel) in &self.entries {
            if *entry_sig == sig {
                log::debug!("dispatch {sig:?}: matched entry");
                return Ok(kernel);
            }
        }
        match &self.fallback {
            Some(kernel) => {
                log::trace!("dispatch {sig:?}: generic fallback");
                Ok(kernel)
            }
            None => Err(DispatchError::UnsupportedSignature { signature: sig }),
        }
    }
}
