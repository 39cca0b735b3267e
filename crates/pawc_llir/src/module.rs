//! Modules, functions, basic blocks, and the instruction builder.
//!
//! A [`Module`] is the unit of emission: one per Paw source module. The
//! builder API mirrors the usual IR-builder shape: create blocks with
//! [`Module::append_block`], select one with [`Module::position_at_end`],
//! then call `build_*` methods to append instructions. The insertion point
//! can be saved and restored, which monomorphization relies on when a call
//! site triggers emission of another function mid-body.

use std::collections::HashMap;

use crate::inst::{BinOp, CastOp, IcmpPred, Inst, InstKind};
use crate::types::{self, Ty};
use crate::value::{Value, ValueKind};

/// Identifies a named struct type within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(pub u32);

/// Identifies a function within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Identifies a basic block within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// Identifies an instruction within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub u32);

/// Identifies a module-level string constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

/// Symbol linkage for functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Participates in cross-module symbol resolution.
    External,
    /// Local to the emitting module.
    Internal,
    /// Duplicate definitions across modules are merged at link time; used
    /// for the per-module print wrappers.
    LinkOnceOdr,
}

#[derive(Debug, Clone)]
pub(crate) struct StructDef {
    pub(crate) name: String,
    /// `None` while the struct is opaque (recursive definition in progress).
    pub(crate) fields: Option<Vec<Ty>>,
}

#[derive(Debug, Clone)]
pub(crate) struct GlobalStr {
    pub(crate) data: String,
}

/// A basic block: a label and the instructions appended to it.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) label: String,
    pub(crate) insts: Vec<InstId>,
}

/// A function declaration or definition.
#[derive(Debug, Clone)]
pub struct Function {
    pub(crate) name: String,
    pub(crate) params: Vec<Ty>,
    pub(crate) ret: Ty,
    pub(crate) varargs: bool,
    pub(crate) linkage: Linkage,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) insts: Vec<Inst>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ret_ty(&self) -> &Ty {
        &self.ret
    }

    pub fn param_tys(&self) -> &[Ty] {
        &self.params
    }

    pub fn is_varargs(&self) -> bool {
        self.varargs
    }

    /// A function with no blocks is a declaration.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// One emission unit: named types, string constants, and functions.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    pub(crate) structs: Vec<StructDef>,
    pub(crate) globals: Vec<GlobalStr>,
    pub(crate) funcs: Vec<Function>,
    func_names: HashMap<String, FuncId>,
    insert: Option<(FuncId, BlockId)>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            structs: Vec::new(),
            globals: Vec::new(),
            funcs: Vec::new(),
            func_names: HashMap::new(),
            insert: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Named struct types
    // ========================================================================

    /// Creates an opaque named struct. Set its body with
    /// [`Module::set_struct_body`] once the field types are known.
    pub fn create_struct(&mut self, name: impl Into<String>) -> StructId {
        let id = StructId(self.structs.len() as u32);
        self.structs.push(StructDef { name: name.into(), fields: None });
        id
    }

    pub fn set_struct_body(&mut self, id: StructId, fields: Vec<Ty>) {
        self.structs[id.0 as usize].fields = Some(fields);
    }

    pub fn get_struct(&self, name: &str) -> Option<StructId> {
        self.structs
            .iter()
            .position(|s| s.name == name)
            .map(|i| StructId(i as u32))
    }

    pub fn struct_name(&self, id: StructId) -> &str {
        &self.structs[id.0 as usize].name
    }

    /// Field types of a named struct; empty while the struct is opaque.
    pub fn struct_fields(&self, id: StructId) -> Vec<Ty> {
        self.structs[id.0 as usize].fields.clone().unwrap_or_default()
    }

    /// Field type at `index` of a struct or record type.
    pub fn field_ty(&self, ty: &Ty, index: u32) -> Ty {
        match ty {
            Ty::Struct(id) => self.struct_fields(*id)[index as usize].clone(),
            Ty::Record(fields) => fields[index as usize].clone(),
            _ => Ty::Void,
        }
    }

    /// Allocation size in bytes, used to size heap allocations.
    pub fn alloc_size(&self, ty: &Ty) -> u64 {
        types::size_of(ty, |id| self.struct_fields(id))
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Declares (or returns the existing) function with this signature.
    pub fn declare_function(
        &mut self,
        name: &str,
        params: Vec<Ty>,
        ret: Ty,
        varargs: bool,
        linkage: Linkage,
    ) -> FuncId {
        if let Some(&id) = self.func_names.get(name) {
            return id;
        }
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(Function {
            name: name.to_string(),
            params,
            ret,
            varargs,
            linkage,
            blocks: Vec::new(),
            insts: Vec::new(),
        });
        self.func_names.insert(name.to_string(), id);
        id
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.func_names.get(name).copied()
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.0 as usize]
    }

    /// The n-th parameter of `func` as a value.
    pub fn param(&self, func: FuncId, index: u32) -> Value {
        let ty = self.funcs[func.0 as usize].params[index as usize].clone();
        Value { kind: ValueKind::Param(func, index), ty }
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.funcs
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    // ========================================================================
    // Blocks and insertion point
    // ========================================================================

    /// Appends a basic block to `func`. Labels are uniquified at print time.
    pub fn append_block(&mut self, func: FuncId, label: &str) -> BlockId {
        let f = &mut self.funcs[func.0 as usize];
        let id = BlockId(f.blocks.len() as u32);
        f.blocks.push(BasicBlock { label: label.to_string(), insts: Vec::new() });
        id
    }

    pub fn position_at_end(&mut self, func: FuncId, block: BlockId) {
        self.insert = Some((func, block));
    }

    /// The current insertion point, for save/restore around nested emission.
    pub fn insert_point(&self) -> Option<(FuncId, BlockId)> {
        self.insert
    }

    pub fn restore_insert_point(&mut self, point: Option<(FuncId, BlockId)>) {
        self.insert = point;
    }

    /// True if the current block already ends in a terminator. The lowerer
    /// checks this before appending fall-through branches.
    pub fn current_block_terminated(&self) -> bool {
        let Some((func, block)) = self.insert else {
            return false;
        };
        let f = &self.funcs[func.0 as usize];
        f.blocks[block.0 as usize]
            .insts
            .last()
            .is_some_and(|id| f.insts[id.0 as usize].kind.is_terminator())
    }

    /// The function currently being built into.
    pub fn current_function(&self) -> Option<FuncId> {
        self.insert.map(|(f, _)| f)
    }

    // ========================================================================
    // Constants
    // ========================================================================

    /// Interns a NUL-terminated string constant and returns a pointer to it.
    pub fn global_string(&mut self, data: &str) -> Value {
        if let Some(i) = self.globals.iter().position(|g| g.data == data) {
            return Value { kind: ValueKind::GlobalString(GlobalId(i as u32)), ty: Ty::Ptr };
        }
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalStr { data: data.to_string() });
        Value { kind: ValueKind::GlobalString(id), ty: Ty::Ptr }
    }

    // ========================================================================
    // Instruction building
    // ========================================================================

    fn push(&mut self, inst: Inst) -> Value {
        let (func, block) = self
            .insert
            .expect("instruction built without an insertion point");
        let ty = inst.ty.clone();
        let f = &mut self.funcs[func.0 as usize];
        let id = InstId(f.insts.len() as u32);
        f.insts.push(inst);
        f.blocks[block.0 as usize].insts.push(id);
        Value { kind: ValueKind::Inst(id), ty }
    }

    pub fn build_binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let ty = lhs.ty.clone();
        self.push(Inst { kind: InstKind::Binary { op, lhs, rhs }, ty })
    }

    pub fn build_icmp(&mut self, pred: IcmpPred, lhs: Value, rhs: Value) -> Value {
        self.push(Inst { kind: InstKind::Icmp { pred, lhs, rhs }, ty: Ty::I1 })
    }

    pub fn build_neg(&mut self, operand: Value) -> Value {
        let ty = operand.ty.clone();
        self.push(Inst { kind: InstKind::Neg { operand }, ty })
    }

    pub fn build_not(&mut self, operand: Value) -> Value {
        let ty = operand.ty.clone();
        self.push(Inst { kind: InstKind::Not { operand }, ty })
    }

    pub fn build_cast(&mut self, op: CastOp, operand: Value, to: Ty) -> Value {
        self.push(Inst { kind: InstKind::Cast { op, operand }, ty: to })
    }

    /// Sign-extends or truncates an integer to the target width; identity
    /// when the widths already match.
    pub fn build_sext_or_trunc(&mut self, operand: Value, to: Ty) -> Value {
        let from = operand.ty.int_width();
        let target = to.int_width();
        if from == target {
            operand
        } else if from < target {
            self.build_cast(CastOp::Sext, operand, to)
        } else {
            self.build_cast(CastOp::Trunc, operand, to)
        }
    }

    pub fn build_alloca(&mut self, ty: Ty) -> Value {
        self.push(Inst { kind: InstKind::Alloca { ty }, ty: Ty::Ptr })
    }

    /// Allocates a stack slot at the head of the current function's entry
    /// block, so the slot dominates every block that stores to it. Used for
    /// `match` result slots whose type is only known mid-lowering.
    pub fn build_entry_alloca(&mut self, ty: Ty) -> Value {
        let (func, _) = self
            .insert
            .expect("instruction built without an insertion point");
        let f = &mut self.funcs[func.0 as usize];
        let id = InstId(f.insts.len() as u32);
        f.insts.push(Inst { kind: InstKind::Alloca { ty }, ty: Ty::Ptr });
        f.blocks[0].insts.insert(0, id);
        Value { kind: ValueKind::Inst(id), ty: Ty::Ptr }
    }

    pub fn build_load(&mut self, ty: Ty, ptr: Value) -> Value {
        self.push(Inst { kind: InstKind::Load { ty: ty.clone(), ptr }, ty })
    }

    pub fn build_store(&mut self, value: Value, ptr: Value) {
        self.push(Inst { kind: InstKind::Store { value, ptr }, ty: Ty::Void });
    }

    /// Pointer to field `index` of the struct/record behind `ptr`.
    pub fn build_struct_gep(&mut self, struct_ty: Ty, ptr: Value, index: u32) -> Value {
        self.push(Inst {
            kind: InstKind::StructGep { struct_ty, ptr, index },
            ty: Ty::Ptr,
        })
    }

    /// Pointer to element `index` of the fixed array behind `ptr`.
    pub fn build_array_gep(&mut self, array_ty: Ty, ptr: Value, index: Value) -> Value {
        self.push(Inst {
            kind: InstKind::ArrayGep { array_ty, ptr, index },
            ty: Ty::Ptr,
        })
    }

    /// Raw element arithmetic: `ptr + index * sizeof(elem_ty)`.
    pub fn build_gep(&mut self, elem_ty: Ty, ptr: Value, index: Value) -> Value {
        self.push(Inst { kind: InstKind::Gep { elem_ty, ptr, index }, ty: Ty::Ptr })
    }

    pub fn build_call(&mut self, func: FuncId, args: Vec<Value>) -> Value {
        let ty = self.funcs[func.0 as usize].ret.clone();
        self.push(Inst { kind: InstKind::Call { func, args }, ty })
    }

    pub fn build_ret(&mut self, value: Value) {
        self.push(Inst { kind: InstKind::Ret { value: Some(value) }, ty: Ty::Void });
    }

    pub fn build_ret_void(&mut self) {
        self.push(Inst { kind: InstKind::Ret { value: None }, ty: Ty::Void });
    }

    pub fn build_br(&mut self, dest: BlockId) {
        self.push(Inst { kind: InstKind::Br { dest }, ty: Ty::Void });
    }

    pub fn build_cond_br(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) {
        self.push(Inst {
            kind: InstKind::CondBr { cond, then_dest, else_dest },
            ty: Ty::Void,
        });
    }

    pub fn build_switch(&mut self, value: Value, default: BlockId, cases: Vec<(i128, BlockId)>) {
        self.push(Inst {
            kind: InstKind::Switch { value, default, cases },
            ty: Ty::Void,
        });
    }

    pub fn build_phi(&mut self, ty: Ty, incomings: Vec<(Value, BlockId)>) -> Value {
        self.push(Inst { kind: InstKind::Phi { incomings }, ty })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_module() -> (Module, FuncId) {
        let mut module = Module::new("test");
        let main = module.declare_function("main", vec![], Ty::I32, false, Linkage::External);
        let entry = module.append_block(main, "entry");
        module.position_at_end(main, entry);
        (module, main)
    }

    #[test]
    fn declare_function_is_idempotent_by_name() {
        let mut module = Module::new("test");
        let a = module.declare_function("f", vec![Ty::I32], Ty::Void, false, Linkage::External);
        let b = module.declare_function("f", vec![Ty::I32], Ty::Void, false, Linkage::External);
        assert_eq!(a, b);
        assert_eq!(module.functions().count(), 1);
    }

    #[test]
    fn function_without_blocks_is_declaration() {
        let mut module = Module::new("test");
        let f = module.declare_function("printf", vec![Ty::Ptr], Ty::I32, true, Linkage::External);
        assert!(module.func(f).is_declaration());
        assert!(module.func(f).is_varargs());
    }

    #[test]
    fn build_binary_takes_operand_type() {
        let (mut module, _) = simple_module();
        let v = module.build_binary(
            BinOp::Add,
            Value::const_int(Ty::I32, 2),
            Value::const_int(Ty::I32, 3),
        );
        assert_eq!(v.ty, Ty::I32);
    }

    #[test]
    fn terminator_detection() {
        let (mut module, _) = simple_module();
        assert!(!module.current_block_terminated());
        module.build_ret(Value::const_int(Ty::I32, 0));
        assert!(module.current_block_terminated());
    }

    #[test]
    fn sext_or_trunc_is_identity_on_same_width() {
        let (mut module, _) = simple_module();
        let v = Value::const_int(Ty::I32, 7);
        let same = module.build_sext_or_trunc(v.clone(), Ty::I32);
        assert_eq!(same, v);

        let wide = module.build_sext_or_trunc(v, Ty::I64);
        assert_eq!(wide.ty, Ty::I64);
    }

    #[test]
    fn global_strings_are_interned() {
        let mut module = Module::new("test");
        let a = module.global_string("hi");
        let b = module.global_string("hi");
        let c = module.global_string("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn opaque_struct_body_can_be_set_later() {
        let mut module = Module::new("test");
        let id = module.create_struct("Node");
        assert!(module.struct_fields(id).is_empty());
        module.set_struct_body(id, vec![Ty::I32, Ty::Ptr]);
        assert_eq!(module.struct_fields(id).len(), 2);
        assert_eq!(module.get_struct("Node"), Some(id));
    }
}
