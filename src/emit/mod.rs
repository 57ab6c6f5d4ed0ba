// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format emission.
//!
//! Provides the byte-level encoding layer: a fallible, growable byte sink
//! ([`Buffer`]), the [`Encode`] trait implemented by every wire type, and the
//! instruction-sequence builder ([`ExpressionBuilder`]).

mod encodable_impls;
mod expr;
mod leb128;

pub use expr::ExpressionBuilder;

use core::fmt;

use crate::Allocator;
use crate::core_compat::alloc::collections::TryReserveError;
use crate::core_compat::boxed::Box;
use crate::core_compat::vec::Vec;
use crate::types::{Limits, SectionId, ValType};

/// The exclusive upper bound of the s33 value space used for block-type
/// indices.
const S33_END: i64 = 1 << 32;

/// Represents errors that can arise while assembling or emitting a module.
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum Error {
    /// Failed memory allocation.
    AllocError,
    /// A branch target exceeds the current block nesting depth.
    BranchDepthExceeded { label: u32, depth: u32 },
    /// An export was registered with the same name as an earlier one (whose
    /// position in the export section is carried).
    DuplicateExportName { index: u32 },
    /// `else` was emitted without an open `if` as the innermost frame.
    ElseWithoutIf,
    /// `end` was emitted with no open block, loop, or if.
    EndWithoutOpener,
    /// An import was registered after a declaration of the same kind.
    ImportAfterDeclaration(SectionId),
    /// An index argument is not within the index space of the given section.
    IndexOutOfBounds {
        id: SectionId,
        index: u32,
        capacity: u32,
    },
    /// A constant initializer produces a different type than the declaration
    /// requires.
    InitTypeMismatch { expected: ValType, actual: ValType },
    /// Limits whose maximum does not admit their minimum.
    InvalidLimits(Limits),
    /// A vector length or section payload exceeds the u32 range the format
    /// can express.
    LengthOverflow(usize),
    /// An insertion was attempted after the module was emitted.
    ModuleFrozen,
    /// A block-type index outside the signed 33-bit value space.
    S33OutOfRange(i64),
    /// An expression was finalized with open frames remaining.
    UnbalancedExpression { open: u32 },
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocError => write!(f, "allocation failure"),
            Error::BranchDepthExceeded { label, depth } => {
                write!(f, "branch target {label} exceeds nesting depth {depth}")
            }
            Error::DuplicateExportName { index } => {
                write!(f, "duplicate export name (first at export {index})")
            }
            Error::ElseWithoutIf => write!(f, "'else' without an open 'if'"),
            Error::EndWithoutOpener => write!(f, "'end' without an open frame"),
            Error::ImportAfterDeclaration(id) => {
                write!(f, "import after a declaration of the same kind ({id:?})")
            }
            Error::IndexOutOfBounds {
                id,
                index,
                capacity,
            } => write!(
                f,
                "index {index} out of bounds for {id:?} (capacity {capacity})"
            ),
            Error::InitTypeMismatch { expected, actual } => write!(
                f,
                "initializer type mismatch: expected {expected:?}; got {actual:?}"
            ),
            Error::InvalidLimits(limits) => write!(f, "invalid limits: {limits:?}"),
            Error::LengthOverflow(len) => write!(f, "length {len:#x} exceeds the u32 range"),
            Error::ModuleFrozen => write!(f, "insertion into an already-emitted module"),
            Error::S33OutOfRange(value) => {
                write!(f, "value {value} outside the signed 33-bit range")
            }
            Error::UnbalancedExpression { open } => {
                write!(f, "expression finalized with {open} open frame(s)")
            }
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::AllocError
    }
}

/// A growable byte sink for the binary encoding. All appends are fallible
/// (allocation is reserved up front) and return the number of bytes written.
#[derive(Debug)]
pub(crate) struct Buffer<A: Allocator> {
    bytes: Vec<u8, A>,
}

impl<A: Allocator> Buffer<A> {
    pub(crate) fn new_in(alloc: A) -> Self {
        Self {
            bytes: Vec::new_in(alloc),
        }
    }

    pub(crate) fn allocator(&self) -> &A {
        self.bytes.allocator()
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn into_vec(self) -> Vec<u8, A> {
        self.bytes
    }

    pub(crate) fn into_boxed_slice(self) -> Box<[u8], A> {
        self.bytes.into_boxed_slice()
    }

    pub(crate) fn push(&mut self, byte: u8) -> Result<usize, Error> {
        self.bytes.try_reserve(1)?;
        self.bytes.push(byte);
        Ok(1)
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        self.bytes.try_reserve(bytes.len())?;
        self.bytes.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn write_leb128<T: leb128::Leb128>(&mut self, value: T) -> Result<usize, Error> {
        leb128::write(|byte| self.push(byte).map(|_| ()), value)
    }

    pub(crate) fn write_u32(&mut self, value: u32) -> Result<usize, Error> {
        self.write_leb128(value)
    }

    pub(crate) fn write_u64(&mut self, value: u64) -> Result<usize, Error> {
        self.write_leb128(value)
    }

    pub(crate) fn write_s32(&mut self, value: i32) -> Result<usize, Error> {
        self.write_leb128(value)
    }

    pub(crate) fn write_s64(&mut self, value: i64) -> Result<usize, Error> {
        self.write_leb128(value)
    }

    /// Writes a signed 33-bit value (used for block-type indices).
    pub(crate) fn write_s33(&mut self, value: i64) -> Result<usize, Error> {
        if !(-S33_END..S33_END).contains(&value) {
            return Err(Error::S33OutOfRange(value));
        }
        self.write_leb128(value)
    }

    pub(crate) fn write_f32(&mut self, value: f32) -> Result<usize, Error> {
        self.extend(&value.to_le_bytes())
    }

    pub(crate) fn write_f64(&mut self, value: f64) -> Result<usize, Error> {
        self.extend(&value.to_le_bytes())
    }

    /// Writes a length-prefixed UTF-8 name.
    pub(crate) fn write_name(&mut self, name: &str) -> Result<usize, Error> {
        let written = self.write_vec_len(name.len())?;
        Ok(written + self.extend(name.as_bytes())?)
    }

    /// Writes a vector length (or byte count), which the format caps at the
    /// u32 range.
    pub(crate) fn write_vec_len(&mut self, len: usize) -> Result<usize, Error> {
        let len = u32::try_from(len).map_err(|_| Error::LengthOverflow(len))?;
        self.write_u32(len)
    }
}

/// Types encodable into the binary format. Returns the number of bytes
/// written.
pub(crate) trait Encode {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error>;
}

/// Encodes a vector: an unsigned LEB128 count followed by the concatenation
/// of the encoded elements.
pub(crate) fn encode_vec<T: Encode, A: Allocator>(
    items: &[T],
    out: &mut Buffer<A>,
) -> Result<usize, Error> {
    let mut written = out.write_vec_len(items.len())?;
    for item in items {
        written += item.encode(out)?;
    }
    Ok(written)
}
