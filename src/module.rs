// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Module assembly and emission.
//!
//! [`Module`] holds the registered entities of a WebAssembly module and
//! validates every cross-reference eagerly, at insertion time. [`Module::emit`]
//! flattens the collections into the canonical binary encoding: the fixed
//! preamble followed by each non-empty section.
//!
//! Index spaces follow the WebAssembly convention: for functions, tables,
//! memories, and globals, imports come first (in insertion order) and
//! declarations after, and every index returned from an insertion method
//! already lives in that combined space.

use crate::Allocator;
use crate::core_compat::alloc;
use crate::core_compat::vec::Vec;
use crate::emit::{Buffer, Encode, Error, encode_vec};
use crate::types::*;

// The '\0asm' magic followed by version 1 of the binary format.
const PREAMBLE: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

/// An in-assembly WebAssembly module.
///
/// Entities are registered through the insertion methods, each of which
/// validates its cross-references and returns the assigned index. A failed
/// insertion leaves the module unchanged. After [`Module::emit`], the module
/// is frozen and further insertions fail with [`Error::ModuleFrozen`].
pub struct Module<A: Allocator> {
    alloc: A,
    types: Vec<FunctionType<A>, A>,
    function_imports: Vec<Import<A>, A>,
    table_imports: Vec<Import<A>, A>,
    memory_imports: Vec<Import<A>, A>,
    global_imports: Vec<Import<A>, A>,
    functions: Vec<Function<A>, A>,
    tables: Vec<TableType, A>,
    memories: Vec<MemType, A>,
    globals: Vec<Global<A>, A>,
    exports: Vec<Export<A>, A>,
    start: Option<FuncIdx>,
    elements: Vec<ElementSegment<A>, A>,
    datas: Vec<DataSegment<A>, A>,
    customs: Vec<CustomSection<A>, A>,
    frozen: bool,
}

impl Module<alloc::Global> {
    /// Creates an empty module using the global allocator.
    pub fn new() -> Self {
        Self::new_in(alloc::Global)
    }
}

impl Default for Module<alloc::Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> Module<A> {
    /// Creates an empty module using the given allocator.
    pub fn new_in(alloc: A) -> Self {
        Self {
            types: Vec::new_in(alloc.clone()),
            function_imports: Vec::new_in(alloc.clone()),
            table_imports: Vec::new_in(alloc.clone()),
            memory_imports: Vec::new_in(alloc.clone()),
            global_imports: Vec::new_in(alloc.clone()),
            functions: Vec::new_in(alloc.clone()),
            tables: Vec::new_in(alloc.clone()),
            memories: Vec::new_in(alloc.clone()),
            globals: Vec::new_in(alloc.clone()),
            exports: Vec::new_in(alloc.clone()),
            start: None,
            elements: Vec::new_in(alloc.clone()),
            datas: Vec::new_in(alloc.clone()),
            customs: Vec::new_in(alloc.clone()),
            alloc,
            frozen: false,
        }
    }

    // The combined (imports-first) sizes of the four shared index spaces.

    fn function_count(&self) -> usize {
        self.function_imports.len() + self.functions.len()
    }

    fn table_count(&self) -> usize {
        self.table_imports.len() + self.tables.len()
    }

    fn memory_count(&self) -> usize {
        self.memory_imports.len() + self.memories.len()
    }

    fn global_count(&self) -> usize {
        self.global_imports.len() + self.globals.len()
    }

    fn ensure_unfrozen(&self) -> Result<(), Error> {
        if self.frozen {
            return Err(Error::ModuleFrozen);
        }
        Ok(())
    }

    fn check_index(id: SectionId, index: u32, capacity: usize) -> Result<(), Error> {
        if (index as usize) < capacity {
            Ok(())
        } else {
            Err(Error::IndexOutOfBounds {
                id,
                index,
                capacity: capacity as u32,
            })
        }
    }

    fn check_limits(limits: Limits) -> Result<(), Error> {
        if limits.is_valid() {
            Ok(())
        } else {
            Err(Error::InvalidLimits(limits))
        }
    }

    // A constant initializer whose leading instruction determines its type
    // must match the declared one; `global.get`-headed initializers cannot be
    // resolved structurally and pass.
    fn check_init_type(expected: ValType, init: &Expression<A>) -> Result<(), Error> {
        match init.constant_type() {
            Some(actual) if actual != expected => Err(Error::InitTypeMismatch { expected, actual }),
            _ => Ok(()),
        }
    }

    fn check_offset(offset: &Expression<A>) -> Result<(), Error> {
        Self::check_init_type(ValType::I32, offset)
    }

    /// Registers a function type, returning its index in the type section.
    ///
    /// Structurally equal types are deduplicated: re-registering an existing
    /// signature returns the index it was first assigned.
    pub fn function_type(&mut self, ty: FunctionType<A>) -> Result<TypeIdx, Error> {
        self.ensure_unfrozen()?;
        if let Some(index) = self.types.iter().position(|existing| *existing == ty) {
            return Ok(TypeIdx::new(index as u32));
        }
        self.types.try_reserve(1)?;
        let index = self.types.len() as u32;
        self.types.push(ty);
        Ok(TypeIdx::new(index))
    }

    fn import(
        &mut self,
        module: &str,
        field: &str,
        descriptor: ImportDescriptor,
    ) -> Result<Import<A>, Error> {
        Ok(Import {
            module: Name::from_str_in(module, self.alloc.clone())?,
            field: Name::from_str_in(field, self.alloc.clone())?,
            descriptor,
        })
    }

    /// Imports a function of the given type, returning its index in the
    /// function index space.
    ///
    /// Function imports must be registered before any function declaration.
    pub fn import_function(
        &mut self,
        module: &str,
        field: &str,
        ty: TypeIdx,
    ) -> Result<FuncIdx, Error> {
        self.ensure_unfrozen()?;
        if !self.functions.is_empty() {
            return Err(Error::ImportAfterDeclaration(SectionId::Function));
        }
        Self::check_index(SectionId::Type, *ty, self.types.len())?;
        let import = self.import(module, field, ImportDescriptor::Function(ty))?;
        self.function_imports.try_reserve(1)?;
        let index = self.function_imports.len() as u32;
        self.function_imports.push(import);
        Ok(FuncIdx::new(index))
    }

    /// Imports a table, returning its index in the table index space.
    pub fn import_table(
        &mut self,
        module: &str,
        field: &str,
        ty: TableType,
    ) -> Result<TableIdx, Error> {
        self.ensure_unfrozen()?;
        if !self.tables.is_empty() {
            return Err(Error::ImportAfterDeclaration(SectionId::Table));
        }
        Self::check_limits(ty.limits)?;
        let import = self.import(module, field, ImportDescriptor::Table(ty))?;
        self.table_imports.try_reserve(1)?;
        let index = self.table_imports.len() as u32;
        self.table_imports.push(import);
        Ok(TableIdx::new(index))
    }

    /// Imports a linear memory, returning its index in the memory index
    /// space.
    pub fn import_memory(
        &mut self,
        module: &str,
        field: &str,
        ty: MemType,
    ) -> Result<MemIdx, Error> {
        self.ensure_unfrozen()?;
        if !self.memories.is_empty() {
            return Err(Error::ImportAfterDeclaration(SectionId::Memory));
        }
        Self::check_limits(*ty)?;
        let import = self.import(module, field, ImportDescriptor::Memory(ty))?;
        self.memory_imports.try_reserve(1)?;
        let index = self.memory_imports.len() as u32;
        self.memory_imports.push(import);
        Ok(MemIdx::new(index))
    }

    /// Imports a global, returning its index in the global index space.
    pub fn import_global(
        &mut self,
        module: &str,
        field: &str,
        ty: GlobalType,
    ) -> Result<GlobalIdx, Error> {
        self.ensure_unfrozen()?;
        if !self.globals.is_empty() {
            return Err(Error::ImportAfterDeclaration(SectionId::Global));
        }
        let import = self.import(module, field, ImportDescriptor::Global(ty))?;
        self.global_imports.try_reserve(1)?;
        let index = self.global_imports.len() as u32;
        self.global_imports.push(import);
        Ok(GlobalIdx::new(index))
    }

    /// Declares a function, returning its index in the function index space.
    pub fn function(&mut self, function: Function<A>) -> Result<FuncIdx, Error> {
        self.ensure_unfrozen()?;
        Self::check_index(SectionId::Type, *function.ty, self.types.len())?;
        self.functions.try_reserve(1)?;
        let index = self.function_count() as u32;
        self.functions.push(function);
        Ok(FuncIdx::new(index))
    }

    /// Declares a table, returning its index in the table index space.
    pub fn table(&mut self, ty: TableType) -> Result<TableIdx, Error> {
        self.ensure_unfrozen()?;
        Self::check_limits(ty.limits)?;
        self.tables.try_reserve(1)?;
        let index = self.table_count() as u32;
        self.tables.push(ty);
        Ok(TableIdx::new(index))
    }

    /// Declares a linear memory, returning its index in the memory index
    /// space.
    pub fn memory(&mut self, ty: MemType) -> Result<MemIdx, Error> {
        self.ensure_unfrozen()?;
        Self::check_limits(*ty)?;
        self.memories.try_reserve(1)?;
        let index = self.memory_count() as u32;
        self.memories.push(ty);
        Ok(MemIdx::new(index))
    }

    /// Declares a global with the given initializer, returning its index in
    /// the global index space.
    pub fn global(&mut self, ty: GlobalType, init: Expression<A>) -> Result<GlobalIdx, Error> {
        self.ensure_unfrozen()?;
        Self::check_init_type(ty.value, &init)?;
        self.globals.try_reserve(1)?;
        let index = self.global_count() as u32;
        self.globals.push(Global { ty, init });
        Ok(GlobalIdx::new(index))
    }

    fn export(&mut self, name: &str, descriptor: ExportDescriptor) -> Result<(), Error> {
        if let Some(index) = self
            .exports
            .iter()
            .position(|export| export.field.as_str() == name)
        {
            return Err(Error::DuplicateExportName {
                index: index as u32,
            });
        }
        let field = Name::from_str_in(name, self.alloc.clone())?;
        self.exports.try_reserve(1)?;
        self.exports.push(Export { field, descriptor });
        Ok(())
    }

    /// Exports the function with the given index under `name`.
    pub fn export_function(&mut self, name: &str, func: FuncIdx) -> Result<(), Error> {
        self.ensure_unfrozen()?;
        Self::check_index(SectionId::Function, *func, self.function_count())?;
        self.export(name, ExportDescriptor::Function(func))
    }

    /// Exports the table with the given index under `name`.
    pub fn export_table(&mut self, name: &str, table: TableIdx) -> Result<(), Error> {
        self.ensure_unfrozen()?;
        Self::check_index(SectionId::Table, *table, self.table_count())?;
        self.export(name, ExportDescriptor::Table(table))
    }

    /// Exports the memory with the given index under `name`.
    pub fn export_memory(&mut self, name: &str, memory: MemIdx) -> Result<(), Error> {
        self.ensure_unfrozen()?;
        Self::check_index(SectionId::Memory, *memory, self.memory_count())?;
        self.export(name, ExportDescriptor::Memory(memory))
    }

    /// Exports the global with the given index under `name`.
    pub fn export_global(&mut self, name: &str, global: GlobalIdx) -> Result<(), Error> {
        self.ensure_unfrozen()?;
        Self::check_index(SectionId::Global, *global, self.global_count())?;
        self.export(name, ExportDescriptor::Global(global))
    }

    /// Designates the module's start function, invoked at instantiation.
    pub fn start_function(&mut self, func: FuncIdx) -> Result<(), Error> {
        self.ensure_unfrozen()?;
        Self::check_index(SectionId::Function, *func, self.function_count())?;
        self.start = Some(func);
        Ok(())
    }

    /// Registers an element segment, returning its index in the element
    /// section (the operand of `table.init`/`elem.drop`).
    pub fn element(&mut self, segment: ElementSegment<A>) -> Result<ElemIdx, Error> {
        self.ensure_unfrozen()?;
        if let ElementMode::Active(active) = &segment.mode {
            Self::check_index(SectionId::Table, *active.table, self.table_count())?;
            Self::check_offset(&active.offset)?;
        }
        match &segment.init {
            ElementInit::FunctionIndices(funcs) => {
                // Only funcref segments are expressible with function
                // indices.
                if segment.ty != RefType::Func {
                    return Err(Error::InitTypeMismatch {
                        expected: ValType::from(segment.ty),
                        actual: ValType::FuncRef,
                    });
                }
                for func in funcs {
                    Self::check_index(SectionId::Function, **func, self.function_count())?;
                }
            }
            ElementInit::Expressions(exprs) => {
                for expr in exprs {
                    Self::check_init_type(ValType::from(segment.ty), expr)?;
                }
            }
        }
        self.elements.try_reserve(1)?;
        let index = self.elements.len() as u32;
        self.elements.push(segment);
        Ok(ElemIdx::new(index))
    }

    /// Registers a passive data segment, returning its index in the data
    /// section (the operand of `memory.init`/`data.drop`).
    pub fn passive_data(&mut self, bytes: Vec<u8, A>) -> Result<DataIdx, Error> {
        self.ensure_unfrozen()?;
        self.datas.try_reserve(1)?;
        let index = self.datas.len() as u32;
        self.datas.push(DataSegment {
            init: bytes,
            mode: DataMode::Passive,
        });
        Ok(DataIdx::new(index))
    }

    /// Registers an active data segment copied into `memory` at the offset
    /// computed by `offset` during instantiation.
    pub fn active_data(
        &mut self,
        memory: MemIdx,
        offset: Expression<A>,
        bytes: Vec<u8, A>,
    ) -> Result<DataIdx, Error> {
        self.ensure_unfrozen()?;
        Self::check_index(SectionId::Memory, *memory, self.memory_count())?;
        Self::check_offset(&offset)?;
        self.datas.try_reserve(1)?;
        let index = self.datas.len() as u32;
        self.datas.push(DataSegment {
            init: bytes,
            mode: DataMode::Active(DataModeActive { memory, offset }),
        });
        Ok(DataIdx::new(index))
    }

    /// Registers a custom section carrying the given bytes, emitted after the
    /// data section.
    pub fn custom_section(&mut self, name: &str, bytes: Vec<u8, A>) -> Result<(), Error> {
        self.ensure_unfrozen()?;
        let name = Name::from_str_in(name, self.alloc.clone())?;
        self.customs.try_reserve(1)?;
        self.customs.push(CustomSection {
            name,
            bytes: bytes.into_boxed_slice(),
        });
        Ok(())
    }

    /// Emits the module as its binary encoding and freezes the assembler.
    ///
    /// Sections are emitted in the canonical order, empty sections are
    /// omitted, and the data count section appears (before the code section)
    /// exactly when data segments exist.
    pub fn emit(&mut self) -> Result<Vec<u8, A>, Error> {
        let mut out = Buffer::new_in(self.alloc.clone());
        out.extend(&PREAMBLE)?;

        self.section(&mut out, SectionId::Type, &self.types)?;
        self.import_section(&mut out)?;
        self.function_section(&mut out)?;
        self.section(&mut out, SectionId::Table, &self.tables)?;
        self.section(&mut out, SectionId::Memory, &self.memories)?;
        self.section(&mut out, SectionId::Global, &self.globals)?;
        self.section(&mut out, SectionId::Export, &self.exports)?;
        self.start_section(&mut out)?;
        self.section(&mut out, SectionId::Element, &self.elements)?;
        self.data_count_section(&mut out)?;
        self.section(&mut out, SectionId::Code, &self.functions)?;
        self.section(&mut out, SectionId::Data, &self.datas)?;
        self.custom_sections(&mut out)?;

        self.frozen = true;
        Ok(out.into_vec())
    }

    // Emits a section as a vector of its encoded items, eliding it when
    // empty.
    fn section<T: Encode>(
        &self,
        out: &mut Buffer<A>,
        id: SectionId,
        items: &[T],
    ) -> Result<(), Error> {
        if items.is_empty() {
            return Ok(());
        }
        let mut payload = Buffer::new_in(self.alloc.clone());
        encode_vec(items, &mut payload)?;
        write_section(out, id, &payload)
    }

    // The import section is the concatenation of the four per-kind import
    // lists: functions, then tables, then memories, then globals.
    fn import_section(&self, out: &mut Buffer<A>) -> Result<(), Error> {
        let total = self.function_imports.len()
            + self.table_imports.len()
            + self.memory_imports.len()
            + self.global_imports.len();
        if total == 0 {
            return Ok(());
        }
        let mut payload = Buffer::new_in(self.alloc.clone());
        payload.write_vec_len(total)?;
        for import in self
            .function_imports
            .iter()
            .chain(&self.table_imports)
            .chain(&self.memory_imports)
            .chain(&self.global_imports)
        {
            import.encode(&mut payload)?;
        }
        write_section(out, SectionId::Import, &payload)
    }

    // One type index per declared function, in declaration order; the bodies
    // follow in the code section.
    fn function_section(&self, out: &mut Buffer<A>) -> Result<(), Error> {
        if self.functions.is_empty() {
            return Ok(());
        }
        let mut payload = Buffer::new_in(self.alloc.clone());
        payload.write_vec_len(self.functions.len())?;
        for function in &self.functions {
            function.ty.encode(&mut payload)?;
        }
        write_section(out, SectionId::Function, &payload)
    }

    fn start_section(&self, out: &mut Buffer<A>) -> Result<(), Error> {
        let Some(start) = self.start else {
            return Ok(());
        };
        let mut payload = Buffer::new_in(self.alloc.clone());
        start.encode(&mut payload)?;
        write_section(out, SectionId::Start, &payload)
    }

    // The data count section duplicates the number of data segments ahead of
    // the code section so that `memory.init`/`data.drop` can be validated in
    // a single pass.
    fn data_count_section(&self, out: &mut Buffer<A>) -> Result<(), Error> {
        if self.datas.is_empty() {
            return Ok(());
        }
        let mut payload = Buffer::new_in(self.alloc.clone());
        payload.write_vec_len(self.datas.len())?;
        write_section(out, SectionId::DataCount, &payload)
    }

    fn custom_sections(&self, out: &mut Buffer<A>) -> Result<(), Error> {
        for custom in &self.customs {
            let mut payload = Buffer::new_in(self.alloc.clone());
            custom.encode(&mut payload)?;
            write_section(out, SectionId::Custom, &payload)?;
        }
        Ok(())
    }
}

// Section framing: a one-byte id, the LEB128 byte length of the payload, the
// payload itself.
fn write_section<A: Allocator>(
    out: &mut Buffer<A>,
    id: SectionId,
    payload: &Buffer<A>,
) -> Result<(), Error> {
    id.encode(out)?;
    out.write_vec_len(payload.len())?;
    out.extend(payload.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::ExpressionBuilder;

    fn to_vec<T: Copy>(items: &[T]) -> Vec<T, alloc::Global> {
        let mut vec = Vec::new_in(alloc::Global);
        vec.extend_from_slice(items);
        vec
    }

    fn function_type(
        parameters: &[ValType],
        results: &[ValType],
    ) -> FunctionType<alloc::Global> {
        FunctionType {
            parameters: to_vec(parameters),
            results: to_vec(results),
        }
    }

    fn empty_body() -> Expression<alloc::Global> {
        ExpressionBuilder::new().finalize().unwrap()
    }

    fn no_locals() -> Locals<alloc::Global> {
        Locals::new(Vec::new_in(alloc::Global))
    }

    fn i32_const(value: i32) -> Expression<alloc::Global> {
        let mut builder = ExpressionBuilder::new();
        builder.i32_const(value).unwrap();
        builder.finalize().unwrap()
    }

    #[test]
    fn test_empty_module() {
        let bytes = Module::new().emit().unwrap();
        assert_eq!(bytes.as_slice(), PREAMBLE);
    }

    #[test]
    fn test_single_type_section() {
        let mut module = Module::new();
        module
            .function_type(function_type(
                &[ValType::I32, ValType::I32],
                &[ValType::I32],
            ))
            .unwrap();

        let mut expected = PREAMBLE.to_vec();
        expected.extend_from_slice(&[0x01, 0x07, 0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f]);
        assert_eq!(module.emit().unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_type_deduplication() {
        let mut module = Module::new();
        let first = module
            .function_type(function_type(&[ValType::I32], &[ValType::I32]))
            .unwrap();
        let second = module
            .function_type(function_type(&[ValType::I32], &[ValType::I32]))
            .unwrap();
        let third = module
            .function_type(function_type(&[ValType::I32], &[ValType::I32]))
            .unwrap();
        assert_eq!(first, TypeIdx::new(0));
        assert_eq!(second, first);
        assert_eq!(third, first);

        // Distinct types still get distinct slots.
        let other = module.function_type(function_type(&[], &[])).unwrap();
        assert_eq!(other, TypeIdx::new(1));

        let mut expected = PREAMBLE.to_vec();
        expected.extend_from_slice(&[
            0x01, 0x09, 0x02, 0x60, 0x01, 0x7f, 0x01, 0x7f, 0x60, 0x00, 0x00,
        ]);
        assert_eq!(module.emit().unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_combined_index_spaces() {
        let mut module = Module::new();
        let ty = module.function_type(function_type(&[], &[])).unwrap();

        // Imports take the leading indices of each space.
        assert_eq!(
            module.import_function("env", "f", ty).unwrap(),
            FuncIdx::new(0)
        );
        let declared = module
            .function(Function {
                ty,
                locals: no_locals(),
                body: empty_body(),
            })
            .unwrap();
        assert_eq!(declared, FuncIdx::new(1));

        let table_ty = TableType {
            reftype: RefType::Func,
            limits: Limits { min: 1, max: None },
        };
        assert_eq!(
            module.import_table("env", "t", table_ty).unwrap(),
            TableIdx::new(0)
        );
        assert_eq!(module.table(table_ty).unwrap(), TableIdx::new(1));

        // No memory imports, so declarations start at zero.
        assert_eq!(
            module
                .memory(MemType::new(Limits { min: 1, max: None }))
                .unwrap(),
            MemIdx::new(0)
        );

        let global_ty = GlobalType {
            value: ValType::I32,
            mutability: GlobalTypeMutability::Const,
        };
        assert_eq!(
            module.import_global("env", "g", global_ty).unwrap(),
            GlobalIdx::new(0)
        );
        assert_eq!(
            module.global(global_ty, i32_const(7)).unwrap(),
            GlobalIdx::new(1)
        );
    }

    #[test]
    fn test_import_after_declaration() {
        let mut module = Module::new();
        let ty = module.function_type(function_type(&[], &[])).unwrap();
        module
            .function(Function {
                ty,
                locals: no_locals(),
                body: empty_body(),
            })
            .unwrap();
        assert_eq!(
            module.import_function("env", "f", ty),
            Err(Error::ImportAfterDeclaration(SectionId::Function))
        );

        module
            .memory(MemType::new(Limits { min: 1, max: None }))
            .unwrap();
        assert_eq!(
            module.import_memory("env", "m", MemType::new(Limits { min: 1, max: None })),
            Err(Error::ImportAfterDeclaration(SectionId::Memory))
        );

        // The failed imports left no trace: no import section is emitted.
        let mut expected = PREAMBLE.to_vec();
        expected.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]); // type
        expected.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]); // function
        expected.extend_from_slice(&[0x05, 0x03, 0x01, 0x00, 0x01]); // memory
        expected.extend_from_slice(&[0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b]); // code
        assert_eq!(module.emit().unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_import_type_index_checked() {
        let mut module = Module::new();
        assert_eq!(
            module.import_function("env", "f", TypeIdx::new(0)),
            Err(Error::IndexOutOfBounds {
                id: SectionId::Type,
                index: 0,
                capacity: 0,
            })
        );
    }

    #[test]
    fn test_duplicate_export_rejected() {
        let mut module = Module::new();
        let memory = module
            .memory(MemType::new(Limits { min: 1, max: None }))
            .unwrap();
        module.export_memory("memory", memory).unwrap();
        assert_eq!(
            module.export_memory("memory", memory),
            Err(Error::DuplicateExportName { index: 0 })
        );
    }

    #[test]
    fn test_export_index_checked() {
        let mut module = Module::new();
        assert_eq!(
            module.export_function("f", FuncIdx::new(0)),
            Err(Error::IndexOutOfBounds {
                id: SectionId::Function,
                index: 0,
                capacity: 0,
            })
        );
    }

    #[test]
    fn test_frozen_after_emit() {
        let mut module = Module::new();
        module.emit().unwrap();
        assert_eq!(
            module.memory(MemType::new(Limits { min: 1, max: None })),
            Err(Error::ModuleFrozen)
        );
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let limits = Limits {
            min: 2,
            max: Some(1),
        };
        let mut module = Module::new();
        assert_eq!(
            module.memory(MemType::new(limits)),
            Err(Error::InvalidLimits(limits))
        );
        assert_eq!(
            module.table(TableType {
                reftype: RefType::Func,
                limits,
            }),
            Err(Error::InvalidLimits(limits))
        );
    }

    #[test]
    fn test_global_init_type_checked() {
        let mut module = Module::new();
        assert_eq!(
            module.global(
                GlobalType {
                    value: ValType::I64,
                    mutability: GlobalTypeMutability::Const,
                },
                i32_const(0),
            ),
            Err(Error::InitTypeMismatch {
                expected: ValType::I64,
                actual: ValType::I32,
            })
        );

        // An initializer reading an (imported) global cannot be resolved
        // structurally and is accepted.
        let mut builder = ExpressionBuilder::new();
        builder.global_get(GlobalIdx::new(0)).unwrap();
        module
            .global(
                GlobalType {
                    value: ValType::I64,
                    mutability: GlobalTypeMutability::Const,
                },
                builder.finalize().unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn test_data_count_precedes_code() {
        let mut module = Module::new();
        let ty = module.function_type(function_type(&[], &[])).unwrap();
        module
            .function(Function {
                ty,
                locals: no_locals(),
                body: empty_body(),
            })
            .unwrap();
        module.passive_data(to_vec(&[1, 2, 3])).unwrap();

        let mut expected = PREAMBLE.to_vec();
        expected.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]); // type
        expected.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]); // function
        expected.extend_from_slice(&[0x0c, 0x01, 0x01]); // data count
        expected.extend_from_slice(&[0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b]); // code
        expected.extend_from_slice(&[0x0b, 0x06, 0x01, 0x01, 0x03, 0x01, 0x02, 0x03]); // data
        assert_eq!(module.emit().unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_element_segment_flags() {
        let mut module = Module::new();
        let ty = module.function_type(function_type(&[], &[])).unwrap();
        let func = module.import_function("e", "f", ty).unwrap();
        let table = module
            .table(TableType {
                reftype: RefType::Func,
                limits: Limits { min: 1, max: None },
            })
            .unwrap();

        // Active in table 0 with function indices: flag 0.
        module
            .element(ElementSegment {
                ty: RefType::Func,
                init: ElementInit::FunctionIndices(to_vec(&[func])),
                mode: ElementMode::Active(ElementModeActive {
                    table,
                    offset: i32_const(0),
                }),
            })
            .unwrap();

        // Declarative with function indices: flag 3.
        module
            .element(ElementSegment {
                ty: RefType::Func,
                init: ElementInit::FunctionIndices(to_vec(&[func])),
                mode: ElementMode::Declarative,
            })
            .unwrap();

        // Passive with expressions of a non-funcref type: flag 5.
        let mut null = ExpressionBuilder::new();
        null.ref_null(RefType::Extern).unwrap();
        let mut exprs = Vec::new_in(alloc::Global);
        exprs.push(null.finalize().unwrap());
        module
            .element(ElementSegment {
                ty: RefType::Extern,
                init: ElementInit::Expressions(exprs),
                mode: ElementMode::Passive,
            })
            .unwrap();

        let mut expected = PREAMBLE.to_vec();
        expected.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]); // type
        expected.extend_from_slice(&[
            0x02, 0x07, 0x01, 0x01, 0x65, 0x01, 0x66, 0x00, 0x00, // import
        ]);
        expected.extend_from_slice(&[0x04, 0x04, 0x01, 0x70, 0x00, 0x01]); // table
        expected.extend_from_slice(&[
            0x09, 0x11, 0x03, // element section, three segments
            0x00, 0x41, 0x00, 0x0b, 0x01, 0x00, // flag 0
            0x03, 0x00, 0x01, 0x00, // flag 3
            0x05, 0x6f, 0x01, 0xd0, 0x6f, 0x0b, // flag 5
        ]);
        assert_eq!(module.emit().unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_element_type_checks() {
        let mut module = Module::new();

        // Function indices imply a funcref segment.
        assert_eq!(
            module.element(ElementSegment {
                ty: RefType::Extern,
                init: ElementInit::FunctionIndices(to_vec(&[])),
                mode: ElementMode::Passive,
            }),
            Err(Error::InitTypeMismatch {
                expected: ValType::ExternRef,
                actual: ValType::FuncRef,
            })
        );

        // Expression initializers must match the segment's reference type.
        let mut null = ExpressionBuilder::new();
        null.ref_null(RefType::Extern).unwrap();
        let mut exprs = Vec::new_in(alloc::Global);
        exprs.push(null.finalize().unwrap());
        assert_eq!(
            module.element(ElementSegment {
                ty: RefType::Func,
                init: ElementInit::Expressions(exprs),
                mode: ElementMode::Passive,
            }),
            Err(Error::InitTypeMismatch {
                expected: ValType::FuncRef,
                actual: ValType::ExternRef,
            })
        );

        // Active segments validate their table index.
        assert_eq!(
            module.element(ElementSegment {
                ty: RefType::Func,
                init: ElementInit::FunctionIndices(to_vec(&[])),
                mode: ElementMode::Active(ElementModeActive {
                    table: TableIdx::new(0),
                    offset: i32_const(0),
                }),
            }),
            Err(Error::IndexOutOfBounds {
                id: SectionId::Table,
                index: 0,
                capacity: 0,
            })
        );
    }

    #[test]
    fn test_active_data_with_explicit_memory_index() {
        let mut module = Module::new();
        module
            .memory(MemType::new(Limits { min: 1, max: None }))
            .unwrap();
        let second = module
            .memory(MemType::new(Limits { min: 1, max: None }))
            .unwrap();
        module
            .active_data(second, i32_const(0), to_vec(&[0xaa]))
            .unwrap();

        let mut expected = PREAMBLE.to_vec();
        expected.extend_from_slice(&[0x05, 0x05, 0x02, 0x00, 0x01, 0x00, 0x01]); // memory
        expected.extend_from_slice(&[0x0c, 0x01, 0x01]); // data count
        expected.extend_from_slice(&[
            0x0b, 0x08, 0x01, 0x02, 0x01, 0x41, 0x00, 0x0b, 0x01, 0xaa, // data, flag 2
        ]);
        assert_eq!(module.emit().unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_active_data_offset_type_checked() {
        let mut module = Module::new();
        let memory = module
            .memory(MemType::new(Limits { min: 1, max: None }))
            .unwrap();

        let mut offset = ExpressionBuilder::new();
        offset.i64_const(0).unwrap();
        assert_eq!(
            module.active_data(memory, offset.finalize().unwrap(), to_vec(&[])),
            Err(Error::InitTypeMismatch {
                expected: ValType::I32,
                actual: ValType::I64,
            })
        );
    }

    #[test]
    fn test_start_and_custom_sections() {
        let mut module = Module::new();
        let ty = module.function_type(function_type(&[], &[])).unwrap();
        let func = module
            .function(Function {
                ty,
                locals: no_locals(),
                body: empty_body(),
            })
            .unwrap();
        module.start_function(func).unwrap();
        module.custom_section("meta", to_vec(&[0x01, 0x02])).unwrap();

        let mut expected = PREAMBLE.to_vec();
        expected.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]); // type
        expected.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]); // function
        expected.extend_from_slice(&[0x08, 0x01, 0x00]); // start
        expected.extend_from_slice(&[0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b]); // code
        expected.extend_from_slice(&[
            0x00, 0x07, 0x04, 0x6d, 0x65, 0x74, 0x61, 0x01, 0x02, // custom "meta"
        ]);
        assert_eq!(module.emit().unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_locals_encoding() {
        let mut module = Module::new();
        let ty = module.function_type(function_type(&[], &[])).unwrap();
        let mut locals = Vec::new_in(alloc::Global);
        locals.push(LocalGroup {
            count: 2,
            ty: ValType::I32,
        });
        locals.push(LocalGroup {
            count: 1,
            ty: ValType::F64,
        });
        module
            .function(Function {
                ty,
                locals: Locals::new(locals),
                body: empty_body(),
            })
            .unwrap();

        let mut expected = PREAMBLE.to_vec();
        expected.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]); // type
        expected.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]); // function
        expected.extend_from_slice(&[
            0x0a, 0x08, 0x01, 0x06, 0x02, 0x02, 0x7f, 0x01, 0x7c, 0x0b, // code
        ]);
        assert_eq!(module.emit().unwrap().as_slice(), expected.as_slice());
    }
}
