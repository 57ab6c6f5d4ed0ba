// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Instruction sequence building.
//!
//! [`ExpressionBuilder`] accumulates the binary encoding of a WebAssembly
//! instruction sequence, one method per instruction, while tracking the open
//! structured-control frames so that structural misuse is caught as the
//! sequence is built rather than by a downstream validator.

use crate::Allocator;
use crate::core_compat::alloc::Global;
use crate::core_compat::vec::Vec;
use crate::types::{
    BlockType, BulkOpcode, DataIdx, ElemIdx, Expression, FuncIdx, GlobalIdx, LabelIdx, LocalIdx,
    MemArg, Opcode, RefType, TableIdx, TypeIdx, ValType,
};

use super::{Buffer, Encode, Error};

// The reserved zero byte carried by the single-memory instructions.
const RESERVED_MEM_BYTE: u8 = 0x00;

// An open structured-control frame. `If` becomes `Else` once the `else`
// branch opens; both are closed by `end`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Frame {
    Block,
    Loop,
    If,
    Else,
}

// Methods for instructions without immediates.
macro_rules! plain_instructions {
    ($($method:ident => $opcode:ident,)*) => {
        $(
            pub fn $method(&mut self) -> Result<(), Error> {
                self.op(Opcode::$opcode)
            }
        )*
    };
}

// Methods for memory access instructions, which carry alignment and offset
// immediates.
macro_rules! memarg_instructions {
    ($($method:ident => $opcode:ident,)*) => {
        $(
            pub fn $method(&mut self, memarg: MemArg) -> Result<(), Error> {
                self.op(Opcode::$opcode)?;
                self.buffer.write_u32(memarg.align)?;
                self.buffer.write_u32(memarg.offset)?;
                Ok(())
            }
        )*
    };
}

// Methods for the 0xfc-prefixed saturating truncation instructions.
macro_rules! saturating_instructions {
    ($($method:ident => $opcode:ident,)*) => {
        $(
            pub fn $method(&mut self) -> Result<(), Error> {
                self.bulk_op(BulkOpcode::$opcode)
            }
        )*
    };
}

/// Builds the binary encoding of an instruction sequence for a function body
/// or a constant initializer expression.
///
/// [`ExpressionBuilder::finalize`] appends the terminating `end` opcode and
/// yields the immutable [`Expression`]; consuming the builder is what makes
/// an expression final.
#[derive(Debug)]
pub struct ExpressionBuilder<A: Allocator> {
    buffer: Buffer<A>,
    frames: Vec<Frame, A>,
}

impl ExpressionBuilder<Global> {
    /// Creates an expression builder using the global allocator.
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl Default for ExpressionBuilder<Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> ExpressionBuilder<A> {
    /// Creates an expression builder using the given allocator.
    pub fn new_in(alloc: A) -> Self {
        Self {
            buffer: Buffer::new_in(alloc.clone()),
            frames: Vec::new_in(alloc),
        }
    }

    /// The number of explicitly opened, still-unclosed control frames.
    pub fn depth(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Appends the terminating `end` opcode and returns the finalized
    /// expression. Fails if any explicitly opened frame remains unclosed.
    pub fn finalize(mut self) -> Result<Expression<A>, Error> {
        if !self.frames.is_empty() {
            return Err(Error::UnbalancedExpression { open: self.depth() });
        }
        self.op(Opcode::End)?;
        Ok(Expression::new(self.buffer.into_boxed_slice()))
    }

    fn op(&mut self, op: Opcode) -> Result<(), Error> {
        self.buffer.push(u8::from(op))?;
        Ok(())
    }

    fn bulk_op(&mut self, op: BulkOpcode) -> Result<(), Error> {
        self.op(Opcode::BulkPrefix)?;
        self.buffer.write_u32(u32::from(op))?;
        Ok(())
    }

    // Branch targets are relative: `label == depth` refers to the implicit
    // frame of the whole function or expression.
    fn check_label(&self, label: LabelIdx) -> Result<(), Error> {
        if *label > self.depth() {
            return Err(Error::BranchDepthExceeded {
                label: *label,
                depth: self.depth(),
            });
        }
        Ok(())
    }

    fn begin_frame(&mut self, op: Opcode, ty: BlockType, frame: Frame) -> Result<(), Error> {
        self.frames.try_reserve(1)?;
        self.op(op)?;
        ty.encode(&mut self.buffer)?;
        self.frames.push(frame);
        Ok(())
    }

    // [wasm]: 5.4.1 Control Instructions

    plain_instructions! {
        unreachable => Unreachable,
        nop => Nop,
        return_ => Return,
    }

    pub fn block(&mut self, ty: BlockType) -> Result<(), Error> {
        self.begin_frame(Opcode::Block, ty, Frame::Block)
    }

    pub fn loop_(&mut self, ty: BlockType) -> Result<(), Error> {
        self.begin_frame(Opcode::Loop, ty, Frame::Loop)
    }

    pub fn if_(&mut self, ty: BlockType) -> Result<(), Error> {
        self.begin_frame(Opcode::If, ty, Frame::If)
    }

    pub fn else_(&mut self) -> Result<(), Error> {
        if self.frames.last() != Some(&Frame::If) {
            return Err(Error::ElseWithoutIf);
        }
        self.op(Opcode::Else)?;
        if let Some(frame) = self.frames.last_mut() {
            *frame = Frame::Else;
        }
        Ok(())
    }

    pub fn end(&mut self) -> Result<(), Error> {
        if self.frames.is_empty() {
            return Err(Error::EndWithoutOpener);
        }
        self.op(Opcode::End)?;
        self.frames.pop();
        Ok(())
    }

    pub fn br(&mut self, label: LabelIdx) -> Result<(), Error> {
        self.check_label(label)?;
        self.op(Opcode::Br)?;
        label.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn br_if(&mut self, label: LabelIdx) -> Result<(), Error> {
        self.check_label(label)?;
        self.op(Opcode::BrIf)?;
        label.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn br_table(&mut self, labels: &[LabelIdx], default: LabelIdx) -> Result<(), Error> {
        for label in labels {
            self.check_label(*label)?;
        }
        self.check_label(default)?;
        self.op(Opcode::BrTable)?;
        self.buffer.write_vec_len(labels.len())?;
        for label in labels {
            label.encode(&mut self.buffer)?;
        }
        default.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn call(&mut self, func: FuncIdx) -> Result<(), Error> {
        self.op(Opcode::Call)?;
        func.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn call_indirect(&mut self, ty: TypeIdx, table: TableIdx) -> Result<(), Error> {
        self.op(Opcode::CallIndirect)?;
        ty.encode(&mut self.buffer)?;
        table.encode(&mut self.buffer)?;
        Ok(())
    }

    // [wasm]: 5.4.2 Reference Instructions

    pub fn ref_null(&mut self, ty: RefType) -> Result<(), Error> {
        self.op(Opcode::RefNull)?;
        ty.encode(&mut self.buffer)?;
        Ok(())
    }

    plain_instructions! {
        ref_is_null => RefIsNull,
    }

    pub fn ref_func(&mut self, func: FuncIdx) -> Result<(), Error> {
        self.op(Opcode::RefFunc)?;
        func.encode(&mut self.buffer)?;
        Ok(())
    }

    // [wasm]: 5.4.3 Parametric Instructions

    plain_instructions! {
        drop_ => Drop,
        select => Select,
    }

    pub fn select_t(&mut self, types: &[ValType]) -> Result<(), Error> {
        self.op(Opcode::SelectT)?;
        self.buffer.write_vec_len(types.len())?;
        for ty in types {
            ty.encode(&mut self.buffer)?;
        }
        Ok(())
    }

    // [wasm]: 5.4.4 Variable Instructions

    pub fn local_get(&mut self, local: LocalIdx) -> Result<(), Error> {
        self.op(Opcode::LocalGet)?;
        local.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn local_set(&mut self, local: LocalIdx) -> Result<(), Error> {
        self.op(Opcode::LocalSet)?;
        local.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn local_tee(&mut self, local: LocalIdx) -> Result<(), Error> {
        self.op(Opcode::LocalTee)?;
        local.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn global_get(&mut self, global: GlobalIdx) -> Result<(), Error> {
        self.op(Opcode::GlobalGet)?;
        global.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn global_set(&mut self, global: GlobalIdx) -> Result<(), Error> {
        self.op(Opcode::GlobalSet)?;
        global.encode(&mut self.buffer)?;
        Ok(())
    }

    // [wasm]: 5.4.5 Table Instructions

    pub fn table_get(&mut self, table: TableIdx) -> Result<(), Error> {
        self.op(Opcode::TableGet)?;
        table.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn table_set(&mut self, table: TableIdx) -> Result<(), Error> {
        self.op(Opcode::TableSet)?;
        table.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn table_init(&mut self, table: TableIdx, elem: ElemIdx) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::TableInit)?;
        elem.encode(&mut self.buffer)?;
        table.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn elem_drop(&mut self, elem: ElemIdx) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::ElemDrop)?;
        elem.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn table_copy(&mut self, dst: TableIdx, src: TableIdx) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::TableCopy)?;
        dst.encode(&mut self.buffer)?;
        src.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn table_grow(&mut self, table: TableIdx) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::TableGrow)?;
        table.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn table_size(&mut self, table: TableIdx) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::TableSize)?;
        table.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn table_fill(&mut self, table: TableIdx) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::TableFill)?;
        table.encode(&mut self.buffer)?;
        Ok(())
    }

    // [wasm]: 5.4.6 Memory Instructions

    memarg_instructions! {
        i32_load => I32Load,
        i64_load => I64Load,
        f32_load => F32Load,
        f64_load => F64Load,
        i32_load8_s => I32Load8S,
        i32_load8_u => I32Load8U,
        i32_load16_s => I32Load16S,
        i32_load16_u => I32Load16U,
        i64_load8_s => I64Load8S,
        i64_load8_u => I64Load8U,
        i64_load16_s => I64Load16S,
        i64_load16_u => I64Load16U,
        i64_load32_s => I64Load32S,
        i64_load32_u => I64Load32U,
        i32_store => I32Store,
        i64_store => I64Store,
        f32_store => F32Store,
        f64_store => F64Store,
        i32_store8 => I32Store8,
        i32_store16 => I32Store16,
        i64_store8 => I64Store8,
        i64_store16 => I64Store16,
        i64_store32 => I64Store32,
    }

    pub fn memory_size(&mut self) -> Result<(), Error> {
        self.op(Opcode::MemorySize)?;
        self.buffer.push(RESERVED_MEM_BYTE)?;
        Ok(())
    }

    pub fn memory_grow(&mut self) -> Result<(), Error> {
        self.op(Opcode::MemoryGrow)?;
        self.buffer.push(RESERVED_MEM_BYTE)?;
        Ok(())
    }

    pub fn memory_init(&mut self, data: DataIdx) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::MemoryInit)?;
        data.encode(&mut self.buffer)?;
        self.buffer.push(RESERVED_MEM_BYTE)?;
        Ok(())
    }

    pub fn data_drop(&mut self, data: DataIdx) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::DataDrop)?;
        data.encode(&mut self.buffer)?;
        Ok(())
    }

    pub fn memory_copy(&mut self) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::MemoryCopy)?;
        self.buffer.push(RESERVED_MEM_BYTE)?;
        self.buffer.push(RESERVED_MEM_BYTE)?;
        Ok(())
    }

    pub fn memory_fill(&mut self) -> Result<(), Error> {
        self.bulk_op(BulkOpcode::MemoryFill)?;
        self.buffer.push(RESERVED_MEM_BYTE)?;
        Ok(())
    }

    // [wasm]: 5.4.7 Numeric Instructions

    pub fn i32_const(&mut self, value: i32) -> Result<(), Error> {
        self.op(Opcode::I32Const)?;
        self.buffer.write_s32(value)?;
        Ok(())
    }

    pub fn i64_const(&mut self, value: i64) -> Result<(), Error> {
        self.op(Opcode::I64Const)?;
        self.buffer.write_s64(value)?;
        Ok(())
    }

    pub fn f32_const(&mut self, value: f32) -> Result<(), Error> {
        self.op(Opcode::F32Const)?;
        self.buffer.write_f32(value)?;
        Ok(())
    }

    pub fn f64_const(&mut self, value: f64) -> Result<(), Error> {
        self.op(Opcode::F64Const)?;
        self.buffer.write_f64(value)?;
        Ok(())
    }

    plain_instructions! {
        i32_eqz => I32Eqz,
        i32_eq => I32Eq,
        i32_ne => I32Ne,
        i32_lt_s => I32LtS,
        i32_lt_u => I32LtU,
        i32_gt_s => I32GtS,
        i32_gt_u => I32GtU,
        i32_le_s => I32LeS,
        i32_le_u => I32LeU,
        i32_ge_s => I32GeS,
        i32_ge_u => I32GeU,
        i64_eqz => I64Eqz,
        i64_eq => I64Eq,
        i64_ne => I64Ne,
        i64_lt_s => I64LtS,
        i64_lt_u => I64LtU,
        i64_gt_s => I64GtS,
        i64_gt_u => I64GtU,
        i64_le_s => I64LeS,
        i64_le_u => I64LeU,
        i64_ge_s => I64GeS,
        i64_ge_u => I64GeU,
        f32_eq => F32Eq,
        f32_ne => F32Ne,
        f32_lt => F32Lt,
        f32_gt => F32Gt,
        f32_le => F32Le,
        f32_ge => F32Ge,
        f64_eq => F64Eq,
        f64_ne => F64Ne,
        f64_lt => F64Lt,
        f64_gt => F64Gt,
        f64_le => F64Le,
        f64_ge => F64Ge,
        i32_clz => I32Clz,
        i32_ctz => I32Ctz,
        i32_popcnt => I32Popcnt,
        i32_add => I32Add,
        i32_sub => I32Sub,
        i32_mul => I32Mul,
        i32_div_s => I32DivS,
        i32_div_u => I32DivU,
        i32_rem_s => I32RemS,
        i32_rem_u => I32RemU,
        i32_and => I32And,
        i32_or => I32Or,
        i32_xor => I32Xor,
        i32_shl => I32Shl,
        i32_shr_s => I32ShrS,
        i32_shr_u => I32ShrU,
        i32_rotl => I32Rotl,
        i32_rotr => I32Rotr,
        i64_clz => I64Clz,
        i64_ctz => I64Ctz,
        i64_popcnt => I64Popcnt,
        i64_add => I64Add,
        i64_sub => I64Sub,
        i64_mul => I64Mul,
        i64_div_s => I64DivS,
        i64_div_u => I64DivU,
        i64_rem_s => I64RemS,
        i64_rem_u => I64RemU,
        i64_and => I64And,
        i64_or => I64Or,
        i64_xor => I64Xor,
        i64_shl => I64Shl,
        i64_shr_s => I64ShrS,
        i64_shr_u => I64ShrU,
        i64_rotl => I64Rotl,
        i64_rotr => I64Rotr,
        f32_abs => F32Abs,
        f32_neg => F32Neg,
        f32_ceil => F32Ceil,
        f32_floor => F32Floor,
        f32_trunc => F32Trunc,
        f32_nearest => F32Nearest,
        f32_sqrt => F32Sqrt,
        f32_add => F32Add,
        f32_sub => F32Sub,
        f32_mul => F32Mul,
        f32_div => F32Div,
        f32_min => F32Min,
        f32_max => F32Max,
        f32_copysign => F32Copysign,
        f64_abs => F64Abs,
        f64_neg => F64Neg,
        f64_ceil => F64Ceil,
        f64_floor => F64Floor,
        f64_trunc => F64Trunc,
        f64_nearest => F64Nearest,
        f64_sqrt => F64Sqrt,
        f64_add => F64Add,
        f64_sub => F64Sub,
        f64_mul => F64Mul,
        f64_div => F64Div,
        f64_min => F64Min,
        f64_max => F64Max,
        f64_copysign => F64Copysign,
        i32_wrap_i64 => I32WrapI64,
        i32_trunc_f32_s => I32TruncF32S,
        i32_trunc_f32_u => I32TruncF32U,
        i32_trunc_f64_s => I32TruncF64S,
        i32_trunc_f64_u => I32TruncF64U,
        i64_extend_i32_s => I64ExtendI32S,
        i64_extend_i32_u => I64ExtendI32U,
        i64_trunc_f32_s => I64TruncF32S,
        i64_trunc_f32_u => I64TruncF32U,
        i64_trunc_f64_s => I64TruncF64S,
        i64_trunc_f64_u => I64TruncF64U,
        f32_convert_i32_s => F32ConvertI32S,
        f32_convert_i32_u => F32ConvertI32U,
        f32_convert_i64_s => F32ConvertI64S,
        f32_convert_i64_u => F32ConvertI64U,
        f32_demote_f64 => F32DemoteF64,
        f64_convert_i32_s => F64ConvertI32S,
        f64_convert_i32_u => F64ConvertI32U,
        f64_convert_i64_s => F64ConvertI64S,
        f64_convert_i64_u => F64ConvertI64U,
        f64_promote_f32 => F64PromoteF32,
        i32_reinterpret_f32 => I32ReinterpretF32,
        i64_reinterpret_f64 => I64ReinterpretF64,
        f32_reinterpret_i32 => F32ReinterpretI32,
        f64_reinterpret_i64 => F64ReinterpretI64,
        i32_extend8_s => I32Extend8S,
        i32_extend16_s => I32Extend16S,
        i64_extend8_s => I64Extend8S,
        i64_extend16_s => I64Extend16S,
        i64_extend32_s => I64Extend32S,
    }

    saturating_instructions! {
        i32_trunc_sat_f32_s => I32TruncSatF32S,
        i32_trunc_sat_f32_u => I32TruncSatF32U,
        i32_trunc_sat_f64_s => I32TruncSatF64S,
        i32_trunc_sat_f64_u => I32TruncSatF64U,
        i64_trunc_sat_f32_s => I64TruncSatF32S,
        i64_trunc_sat_f32_u => I64TruncSatF32U,
        i64_trunc_sat_f64_s => I64TruncSatF64S,
        i64_trunc_sat_f64_u => I64TruncSatF64U,
    }
}
