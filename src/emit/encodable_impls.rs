// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Encode trait implementations for WebAssembly types.

use num_enum::IntoPrimitive;

use crate::Allocator;
use crate::types::*;

use super::{Buffer, Encode, Error, encode_vec};

macro_rules! impl_encode_for_u8_enum {
    ($type:ty) => {
        impl Encode for $type {
            fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
                out.push(u8::from(*self))
            }
        }
    };
}

macro_rules! impl_encode_for_index {
    ($type:ty) => {
        impl Encode for $type {
            fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
                out.write_u32(**self)
            }
        }
    };
}

impl_encode_for_u8_enum!(GlobalTypeMutability);
impl_encode_for_u8_enum!(RefType);
impl_encode_for_u8_enum!(SectionId);
impl_encode_for_u8_enum!(ValType);

impl_encode_for_index!(DataIdx);
impl_encode_for_index!(ElemIdx);
impl_encode_for_index!(FuncIdx);
impl_encode_for_index!(GlobalIdx);
impl_encode_for_index!(LabelIdx);
impl_encode_for_index!(LocalIdx);
impl_encode_for_index!(MemIdx);
impl_encode_for_index!(TableIdx);
impl_encode_for_index!(TypeIdx);

impl<N: Allocator> Encode for Name<N> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        out.write_name(self.as_str())
    }
}

#[derive(Clone, Copy, IntoPrimitive)]
#[repr(u8)]
enum LimitsToken {
    WithoutMax = 0x00,
    WithMax = 0x01,
}

impl Encode for Limits {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        let mut written = match self.max {
            None => out.push(u8::from(LimitsToken::WithoutMax))?,
            Some(_) => out.push(u8::from(LimitsToken::WithMax))?,
        };
        written += out.write_u32(self.min)?;
        if let Some(max) = self.max {
            written += out.write_u32(max)?;
        }
        Ok(written)
    }
}

impl Encode for MemType {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        (**self).encode(out)
    }
}

impl Encode for TableType {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        Ok(self.reftype.encode(out)? + self.limits.encode(out)?)
    }
}

impl Encode for GlobalType {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        Ok(self.value.encode(out)? + self.mutability.encode(out)?)
    }
}

#[derive(Clone, Copy, IntoPrimitive)]
#[repr(u8)]
enum FunctionTypeToken {
    Value = 0x60,
}

impl<F: Allocator> Encode for FunctionType<F> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        let mut written = out.push(u8::from(FunctionTypeToken::Value))?;
        written += encode_vec(&self.parameters, out)?;
        written += encode_vec(&self.results, out)?;
        Ok(written)
    }
}

/// The single-byte block-type encoding of an empty result sequence.
const EMPTY_BLOCK_TYPE: u8 = 0x40;

impl Encode for BlockType {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        match self {
            BlockType::Empty => out.push(EMPTY_BLOCK_TYPE),
            BlockType::Result(ty) => ty.encode(out),
            BlockType::TypeIndex(idx) => out.write_s33(i64::from(**idx)),
        }
    }
}

#[derive(Clone, Copy, IntoPrimitive)]
#[repr(u8)]
enum ImportDescriptorToken {
    Function = 0x0,
    Table = 0x1,
    Memory = 0x2,
    Global = 0x3,
}

impl Encode for ImportDescriptor {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        type Token = ImportDescriptorToken;

        match self {
            ImportDescriptor::Function(ty) => {
                Ok(out.push(u8::from(Token::Function))? + ty.encode(out)?)
            }
            ImportDescriptor::Table(ty) => Ok(out.push(u8::from(Token::Table))? + ty.encode(out)?),
            ImportDescriptor::Memory(ty) => {
                Ok(out.push(u8::from(Token::Memory))? + ty.encode(out)?)
            }
            ImportDescriptor::Global(ty) => {
                Ok(out.push(u8::from(Token::Global))? + ty.encode(out)?)
            }
        }
    }
}

impl<I: Allocator> Encode for Import<I> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        Ok(self.module.encode(out)? + self.field.encode(out)? + self.descriptor.encode(out)?)
    }
}

#[derive(Clone, Copy, IntoPrimitive)]
#[repr(u8)]
enum ExportDescriptorToken {
    Function = 0x0,
    Table = 0x1,
    Memory = 0x2,
    Global = 0x3,
}

impl Encode for ExportDescriptor {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        type Token = ExportDescriptorToken;

        match self {
            ExportDescriptor::Function(idx) => {
                Ok(out.push(u8::from(Token::Function))? + idx.encode(out)?)
            }
            ExportDescriptor::Table(idx) => {
                Ok(out.push(u8::from(Token::Table))? + idx.encode(out)?)
            }
            ExportDescriptor::Memory(idx) => {
                Ok(out.push(u8::from(Token::Memory))? + idx.encode(out)?)
            }
            ExportDescriptor::Global(idx) => {
                Ok(out.push(u8::from(Token::Global))? + idx.encode(out)?)
            }
        }
    }
}

impl<E: Allocator> Encode for Export<E> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        Ok(self.field.encode(out)? + self.descriptor.encode(out)?)
    }
}

impl<E: Allocator> Encode for Expression<E> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        out.extend(self.as_bytes())
    }
}

impl<G: Allocator> Encode for Global<G> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        Ok(self.ty.encode(out)? + self.init.encode(out)?)
    }
}

// [wasm]: 5.5.12 Element Section
//
// The flag prefix of an element segment, selecting among
// {active-in-table-0 | passive | active-with-table-index | declarative} and
// {function indices | init expressions}.
#[derive(Clone, Copy, IntoPrimitive)]
#[repr(u32)]
enum ElementSegmentToken {
    ActiveElemIndices = 0,
    PassiveElemIndices = 1,
    ActiveTableIndexElemIndices = 2,
    DeclarativeElemIndices = 3,
    ActiveElemExprs = 4,
    PassiveElemExprs = 5,
    ActiveTableIndexElemExprs = 6,
    DeclarativeElemExprs = 7,
}

impl Encode for ElementSegmentToken {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        out.write_u32(u32::from(*self))
    }
}

// The element-kind byte carried by the index-form flags 1-3. Only funcref
// segments can be expressed with function indices.
#[derive(Clone, Copy, IntoPrimitive)]
#[repr(u8)]
enum ElementKind {
    FuncRef = 0x00,
}

impl<E: Allocator> Encode for ElementSegment<E> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        type Token = ElementSegmentToken;

        match (&self.mode, &self.init) {
            (ElementMode::Active(active), ElementInit::FunctionIndices(funcs))
                if *active.table == 0 && self.ty == RefType::Func =>
            {
                let mut written = Token::ActiveElemIndices.encode(out)?;
                written += active.offset.encode(out)?;
                written += encode_vec(funcs, out)?;
                Ok(written)
            }
            (ElementMode::Active(active), ElementInit::FunctionIndices(funcs)) => {
                let mut written = Token::ActiveTableIndexElemIndices.encode(out)?;
                written += active.table.encode(out)?;
                written += active.offset.encode(out)?;
                written += out.push(u8::from(ElementKind::FuncRef))?;
                written += encode_vec(funcs, out)?;
                Ok(written)
            }
            (ElementMode::Passive, ElementInit::FunctionIndices(funcs)) => {
                let mut written = Token::PassiveElemIndices.encode(out)?;
                written += out.push(u8::from(ElementKind::FuncRef))?;
                written += encode_vec(funcs, out)?;
                Ok(written)
            }
            (ElementMode::Declarative, ElementInit::FunctionIndices(funcs)) => {
                let mut written = Token::DeclarativeElemIndices.encode(out)?;
                written += out.push(u8::from(ElementKind::FuncRef))?;
                written += encode_vec(funcs, out)?;
                Ok(written)
            }
            (ElementMode::Active(active), ElementInit::Expressions(exprs))
                if *active.table == 0 && self.ty == RefType::Func =>
            {
                let mut written = Token::ActiveElemExprs.encode(out)?;
                written += active.offset.encode(out)?;
                written += encode_vec(exprs, out)?;
                Ok(written)
            }
            (ElementMode::Active(active), ElementInit::Expressions(exprs)) => {
                let mut written = Token::ActiveTableIndexElemExprs.encode(out)?;
                written += active.table.encode(out)?;
                written += active.offset.encode(out)?;
                written += self.ty.encode(out)?;
                written += encode_vec(exprs, out)?;
                Ok(written)
            }
            (ElementMode::Passive, ElementInit::Expressions(exprs)) => {
                let mut written = Token::PassiveElemExprs.encode(out)?;
                written += self.ty.encode(out)?;
                written += encode_vec(exprs, out)?;
                Ok(written)
            }
            (ElementMode::Declarative, ElementInit::Expressions(exprs)) => {
                let mut written = Token::DeclarativeElemExprs.encode(out)?;
                written += self.ty.encode(out)?;
                written += encode_vec(exprs, out)?;
                Ok(written)
            }
        }
    }
}

impl Encode for LocalGroup {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        Ok(out.write_u32(self.count)? + self.ty.encode(out)?)
    }
}

// The code-section entry for a function: the byte size of the entry, then the
// local variable groups, then the body expression. The function's type index
// is emitted separately in the function section.
impl<F: Allocator> Encode for Function<F> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        let mut entry = Buffer::new_in(out.allocator().clone());
        encode_vec(self.locals.as_slice(), &mut entry)?;
        self.body.encode(&mut entry)?;

        let written = out.write_vec_len(entry.len())?;
        Ok(written + out.extend(entry.as_slice())?)
    }
}

#[derive(Clone, Copy, IntoPrimitive)]
#[repr(u32)]
enum DataSegmentToken {
    ActiveNoMemIdx = 0,
    Passive = 1,
    ActiveWithMemIdx = 2,
}

impl Encode for DataSegmentToken {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        out.write_u32(u32::from(*self))
    }
}

impl<D: Allocator> Encode for DataSegment<D> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        type Token = DataSegmentToken;

        let mut written = match &self.mode {
            DataMode::Active(active) if *active.memory == 0 => {
                Token::ActiveNoMemIdx.encode(out)? + active.offset.encode(out)?
            }
            DataMode::Active(active) => {
                Token::ActiveWithMemIdx.encode(out)?
                    + active.memory.encode(out)?
                    + active.offset.encode(out)?
            }
            DataMode::Passive => Token::Passive.encode(out)?,
        };
        written += out.write_vec_len(self.init.len())?;
        written += out.extend(&self.init)?;
        Ok(written)
    }
}

impl<C: Allocator> Encode for CustomSection<C> {
    fn encode<A: Allocator>(&self, out: &mut Buffer<A>) -> Result<usize, Error> {
        Ok(self.name.encode(out)? + out.extend(&self.bytes)?)
    }
}
