// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly type definitions.
//!
//! This module contains all the WebAssembly type definitions used for
//! assembling and emitting WASM modules, including value types, function
//! signatures, imports, exports, and segment descriptions.

mod instr;
pub use instr::*;

use num_enum::IntoPrimitive;

use crate::Allocator;
use crate::core_compat::alloc::collections::TryReserveError;
use crate::core_compat::boxed::Box;
use crate::core_compat::vec::Vec;

// Defines a public newtype without public mutable access to the underlying
// type, along with some convenience trait implementations like Deref and AsRef.
macro_rules! newtype {
    (
        $(#[$meta:meta])*
        pub struct $type:ident<A: Allocator>($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type<A: Allocator>($underlying);

        newtype!(@impl [A: Allocator], $type<A>, $underlying);
    };
    (
        $(#[$meta:meta])*
        pub struct $type:ident($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type($underlying);

        newtype!(@impl [], $type, $underlying);
    };
    (@impl [$($generic_params:tt)*], $qualified_type:ty, $underlying:ty) => {
        impl<$($generic_params)*> $qualified_type {
            pub fn new(value: $underlying) -> Self {
                Self(value)
            }
        }

        impl<$($generic_params)*> ::core::ops::Deref for $qualified_type {
            type Target = $underlying;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<$($generic_params)*> AsRef<$underlying> for $qualified_type {
            fn as_ref(&self) -> &$underlying {
                &self.0
            }
        }
    };
}
pub(crate) use newtype;

/// A name (of an imported or exported entity, or of a custom section).
#[derive(Debug, Eq, PartialEq)]
pub struct Name<A: Allocator>(Box<str, A>);

impl<A: Allocator> Name<A> {
    /// Copies `value` into a name owned by `alloc`.
    pub fn from_str_in(value: &str, alloc: A) -> Result<Self, TryReserveError> {
        let mut bytes = Vec::new_in(alloc.clone());
        bytes.try_reserve_exact(value.len())?;
        bytes.extend_from_slice(value.as_bytes());
        let bytes_ptr = Box::into_raw(bytes.into_boxed_slice());

        // Safety: The ABIs of [u8] and str are identical, and the bytes were
        // copied from a valid &str.
        let str = unsafe { Box::from_raw_in(bytes_ptr as *mut str, alloc) };
        Ok(Self(str))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The type of a reference to an object in the runtime store.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq)]
#[repr(u8)]
pub enum RefType {
    /// Function reference type.
    Func = 0x70,
    /// External reference type.
    Extern = 0x6f,
}

/// Value types classify the individual values that WebAssembly code can compute
/// with and the values that a variable accepts.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq)]
#[repr(u8)]
pub enum ValType {
    /// 32-bit signed integer.
    I32 = 0x7f,
    /// 64-bit signed integer.
    I64 = 0x7e,
    /// 32-bit floating point number.
    F32 = 0x7d,
    /// 64-bit floating point number.
    F64 = 0x7c,
    /// 128-bit SIMD vector. Reserved: the type is encodable but no vector
    /// instructions are provided.
    Vec = 0x7b,
    /// Function reference.
    FuncRef = RefType::Func as u8,
    /// External reference.
    ExternRef = RefType::Extern as u8,
}

impl From<RefType> for ValType {
    fn from(value: RefType) -> Self {
        match value {
            RefType::Func => Self::FuncRef,
            RefType::Extern => Self::ExternRef,
        }
    }
}

/// The signature of a function, mapping parameters to results.
///
/// Equality is structural: two signatures are equal when their parameter and
/// result sequences are equal, which is what the type-section deduplication
/// keys on.
#[derive(Debug)]
pub struct FunctionType<A: Allocator> {
    pub parameters: Vec<ValType, A>,
    pub results: Vec<ValType, A>,
}

impl<A: Allocator> PartialEq for FunctionType<A> {
    fn eq(&self, other: &Self) -> bool {
        self.parameters.as_slice() == other.parameters.as_slice()
            && self.results.as_slice() == other.results.as_slice()
    }
}

impl<A: Allocator> Eq for FunctionType<A> {}

/// The size range of the resizeable storage associated with memory (# of pages)
/// and table types (# of elements).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    /// Minimum size.
    pub min: u32,
    /// Maximum size, with None indicating that there is no upper limit.
    pub max: Option<u32>,
}

impl Limits {
    /// Whether the maximum, if present, admits the minimum.
    pub fn is_valid(&self) -> bool {
        self.max.is_none_or(|max| max >= self.min)
    }
}

newtype!(
    /// A linear memory type with its size limits.
    #[derive(Clone, Copy, Debug)]
    pub struct MemType(Limits);
);

/// WebAssembly table type.
#[derive(Clone, Copy, Debug)]
pub struct TableType {
    /// Type of references stored in table.
    pub reftype: RefType,
    /// Table size limits.
    pub limits: Limits,
}

/// The mutability of a global variable.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq)]
#[repr(u8)]
pub enum GlobalTypeMutability {
    /// Immutable.
    Const = 0x00,
    /// Mutable.
    Var = 0x01,
}

/// Represents a global variable.
#[derive(Clone, Copy, Debug)]
pub struct GlobalType {
    /// The type of the global.
    pub value: ValType,

    /// The mutability of the global.
    pub mutability: GlobalTypeMutability,
}

newtype!(
    /// An index into the type section.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TypeIdx(u32);
);

newtype!(
    /// An index into the function index space (imports first, then
    /// declarations).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct FuncIdx(u32);
);

newtype!(
    /// An index into the table index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TableIdx(u32);
);

newtype!(
    /// An index into the memory index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct MemIdx(u32);
);

newtype!(
    /// An index into the global index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct GlobalIdx(u32);
);

newtype!(
    /// An index into the element section.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ElemIdx(u32);
);

newtype!(
    /// An index into the data section.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct DataIdx(u32);
);

newtype!(
    /// An index into a function's local variables.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LocalIdx(u32);
);

newtype!(
    /// An index referencing structured control instructions inside an
    /// instruction sequence.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LabelIdx(u32);
);

/// A finalized WebAssembly bytecode expression: binary-format instruction
/// bytes terminated by the `end` opcode.
///
/// Instances are produced by `ExpressionBuilder::finalize` and are immutable
/// from then on.
#[derive(Debug)]
pub struct Expression<A: Allocator>(Box<[u8], A>);

impl<A: Allocator> Expression<A> {
    pub(crate) fn new(bytes: Box<[u8], A>) -> Self {
        Self(bytes)
    }

    /// The encoded instruction bytes, including the trailing `end` opcode.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The value type produced by a constant expression, when the leading
    /// instruction determines it. `global.get`-headed expressions (and empty
    /// ones) yield None.
    pub fn constant_type(&self) -> Option<ValType> {
        const I32_CONST: u8 = Opcode::I32Const as u8;
        const I64_CONST: u8 = Opcode::I64Const as u8;
        const F32_CONST: u8 = Opcode::F32Const as u8;
        const F64_CONST: u8 = Opcode::F64Const as u8;
        const REF_NULL: u8 = Opcode::RefNull as u8;
        const REF_FUNC: u8 = Opcode::RefFunc as u8;
        const FUNC: u8 = RefType::Func as u8;
        const EXTERN: u8 = RefType::Extern as u8;

        match *self.0.first()? {
            I32_CONST => Some(ValType::I32),
            I64_CONST => Some(ValType::I64),
            F32_CONST => Some(ValType::F32),
            F64_CONST => Some(ValType::F64),
            REF_FUNC => Some(ValType::FuncRef),
            REF_NULL => match *self.0.get(1)? {
                FUNC => Some(ValType::FuncRef),
                EXTERN => Some(ValType::ExternRef),
                _ => None,
            },
            _ => None,
        }
    }
}

impl<A: Allocator> PartialEq for Expression<A> {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl<A: Allocator> Eq for Expression<A> {}

/// Section identifier within a module.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq)]
#[repr(u8)]
pub enum SectionId {
    /// Custom section with arbitrary data.
    Custom = 0,
    /// Function type declarations.
    Type = 1,
    /// Import declarations.
    Import = 2,
    /// Function type indices for module functions.
    Function = 3,
    /// Table declarations.
    Table = 4,
    /// Memory declarations.
    Memory = 5,
    /// Global declarations.
    Global = 6,
    /// Export declarations.
    Export = 7,
    /// Start function index.
    Start = 8,
    /// Element segments for table initialization.
    Element = 9,
    /// Function bodies.
    Code = 10,
    /// Data segments for memory initialization.
    Data = 11,
    /// Data segment count (for bulk memory operations).
    DataCount = 12,
}

/// Custom section with arbitrary binary data.
pub struct CustomSection<A: Allocator> {
    /// Section name.
    pub name: Name<A>,
    /// Section content.
    pub bytes: Box<[u8], A>,
}

/// Import descriptor types.
#[derive(Clone, Copy, Debug)]
pub enum ImportDescriptor {
    /// Import a function with the given type index.
    Function(TypeIdx),
    /// Import a table with the given type.
    Table(TableType),
    /// Import a memory with the given type.
    Memory(MemType),
    /// Import a global with the given type.
    Global(GlobalType),
}

/// An import declaration.
#[derive(Debug)]
pub struct Import<A: Allocator> {
    /// Name of the module to import from.
    pub module: Name<A>,
    /// Name of the imported entity.
    pub field: Name<A>,
    /// Type of the imported entity.
    pub descriptor: ImportDescriptor,
}

/// Describes what kind of entity is being exported.
#[derive(Clone, Copy, Debug)]
pub enum ExportDescriptor {
    /// Export a function with the given index.
    Function(FuncIdx),
    /// Export a table with the given index.
    Table(TableIdx),
    /// Export a memory with the given index.
    Memory(MemIdx),
    /// Export a global with the given index.
    Global(GlobalIdx),
}

/// An export declaration.
#[derive(Debug)]
pub struct Export<A: Allocator> {
    /// Name of the exported entity.
    pub field: Name<A>,
    /// Type and index of the exported entity.
    pub descriptor: ExportDescriptor,
}

/// A global declaration.
#[derive(Debug)]
pub struct Global<A: Allocator> {
    /// Global type and mutability.
    pub ty: GlobalType,
    /// Initialization expression.
    pub init: Expression<A>,
}

// [wasm]: 5.5.12 Element Section

/// WebAssembly element segment.
#[derive(Debug)]
pub struct ElementSegment<A: Allocator> {
    /// The type of references this element segment contains.
    pub ty: RefType,
    /// The initial values for the element segment.
    pub init: ElementInit<A>,
    /// How this element segment should be placed (active, passive, or
    /// declarative).
    pub mode: ElementMode<A>,
}

/// The initialization data for an element segment.
#[derive(Debug)]
pub enum ElementInit<A: Allocator> {
    /// Element segment contains function indices.
    FunctionIndices(Vec<FuncIdx, A>),
    /// Element segment contains initialization expressions.
    Expressions(Vec<Expression<A>, A>),
}

/// Active element mode with table and offset.
#[derive(Debug)]
pub struct ElementModeActive<A: Allocator> {
    /// Index of the table to initialize.
    pub table: TableIdx,
    /// Expression computing the offset within the table.
    pub offset: Expression<A>,
}

/// Element segment mode.
#[derive(Debug)]
pub enum ElementMode<A: Allocator> {
    Passive,
    Active(ElementModeActive<A>),
    Declarative,
}

/// A run-length group of local variables sharing one type.
#[derive(Clone, Copy, Debug)]
pub struct LocalGroup {
    /// Number of consecutive locals in the group.
    pub count: u32,
    /// The type shared by the group.
    pub ty: ValType,
}

newtype!(
    /// The local variable declarations of a function, as run-length groups.
    #[derive(Debug)]
    pub struct Locals<A: Allocator>(Vec<LocalGroup, A>);
);

/// A function declaration: its signature, local variables, and body.
#[derive(Debug)]
pub struct Function<A: Allocator> {
    /// Index of the function's signature in the type section.
    pub ty: TypeIdx,
    /// Local variable declarations for this function.
    pub locals: Locals<A>,
    /// The function body.
    pub body: Expression<A>,
}

/// A data segment for initializing linear memory.
#[derive(Debug)]
pub struct DataSegment<A: Allocator> {
    /// The initial data bytes for this segment.
    pub init: Vec<u8, A>,
    /// How this data segment should be placed (active or passive).
    pub mode: DataMode<A>,
}

/// The placement mode for a data segment.
#[derive(Debug)]
pub enum DataMode<A: Allocator> {
    /// Passive data segment (must be explicitly copied via memory.init).
    Passive,
    /// Active data segment (automatically copied to memory during instantiation).
    Active(DataModeActive<A>),
}

/// Active placement information for a data segment.
#[derive(Debug)]
pub struct DataModeActive<A: Allocator> {
    /// Index of the memory to initialize.
    pub memory: MemIdx,
    /// Expression computing the offset within the memory.
    pub offset: Expression<A>,
}
