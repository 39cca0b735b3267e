//! Lowering from the Paw AST to LLIR.
//!
//! One [`Lowerer`] exists per source module and owns that module's LLIR
//! [`Module`]. Lowering runs in two passes over the top-level statements:
//!
//! 1. **Registration**: struct/enum/alias/extern declarations create their
//!    backend types and prototypes, generic declarations are recorded as
//!    AST, and everything lands in the shared [`SymbolTable`].
//! 2. **Emission**: concrete function and method bodies are lowered into
//!    basic blocks.
//!
//! The split means declaration order within a file never matters, while the
//! shared symbol table gives later modules access to everything public that
//! earlier modules registered.
//!
//! Submodules:
//!
//! - [`types`]: AST type → LLIR type resolution and canonical type names
//! - [`expr`]: expression lowering
//! - [`stmt`]: statement lowering
//! - [`pattern`]: `match` and `is` lowering
//! - [`generics`]: monomorphization of functions, structs, and enums

mod expr;
mod generics;
mod pattern;
mod stmt;
mod types;

pub(crate) use pattern::Scrutinee;

use std::collections::{HashMap, HashSet};

use pawc_base::{CompileError, Result, Span};
use pawc_llir::{BlockId, FuncId, Linkage, Module, StructId, Ty, Value};
use pawc_syntax::ast::{
    EnumDecl, FunctionDecl, Param, Program, Stmt, StmtKind, StructDecl, Type, TypeKind,
};

use crate::builtins::Builtins;
use crate::symbols::{AstHandle, SymbolTable};

/// Resolved layout and method set of a struct known to this module
/// (concrete declaration, imported type, or generic instance).
#[derive(Debug, Clone)]
pub(crate) struct StructInfo {
    pub(crate) id: StructId,
    /// Field names and resolved types, declaration order.
    pub(crate) fields: Vec<(String, Ty)>,
    /// Method name → emitted backend function name.
    pub(crate) methods: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub(crate) struct VariantInfo {
    pub(crate) name: String,
    /// Resolved type of the first associated value, if any.
    pub(crate) payload: Option<Ty>,
}

#[derive(Debug, Clone)]
pub(crate) struct EnumInfo {
    pub(crate) variants: Vec<VariantInfo>,
}

impl EnumInfo {
    /// Declaration-order ordinal of a variant.
    pub(crate) fn ordinal(&self, variant: &str) -> Option<(i128, &VariantInfo)> {
        self.variants
            .iter()
            .position(|v| v.name == variant)
            .map(|i| (i as i128, &self.variants[i]))
    }
}

/// Struct context while lowering methods.
#[derive(Debug, Clone)]
pub(crate) struct CurrentStruct {
    pub(crate) name: String,
    pub(crate) id: StructId,
}

/// Per-module lowerer: AST in, LLIR module out.
pub struct Lowerer<'a, 'sym> {
    pub(crate) module: Module,
    pub(crate) module_name: String,
    pub(crate) strict_match: bool,
    pub(crate) symbols: &'sym mut SymbolTable<'a>,
    pub(crate) builtins: Builtins,

    // ---- per-function state ----
    pub(crate) named_values: HashMap<String, Value>,
    pub(crate) variable_types: HashMap<String, Ty>,
    pub(crate) mutable_vars: HashSet<String>,
    /// Element types of array-typed parameters, recorded at instantiation
    /// so indexing inside the body works.
    pub(crate) array_element_types: HashMap<String, Ty>,
    /// `(continue_target, break_target)` per enclosing loop.
    pub(crate) loop_stack: Vec<(BlockId, BlockId)>,

    // ---- module-level registries ----
    pub(crate) functions: HashMap<String, FuncId>,
    pub(crate) function_decls: HashMap<String, &'a FunctionDecl>,
    pub(crate) struct_infos: HashMap<String, StructInfo>,
    pub(crate) enum_infos: HashMap<String, EnumInfo>,
    pub(crate) type_aliases: HashMap<String, Type>,
    pub(crate) generic_functions: HashMap<String, &'a FunctionDecl>,
    pub(crate) generic_structs: HashMap<String, &'a StructDecl>,
    pub(crate) generic_enums: HashMap<String, &'a EnumDecl>,

    /// Stack of type-parameter substitutions, one frame per active generic
    /// instantiation. Strictly push-on-entry / pop-on-exit.
    pub(crate) type_params: Vec<HashMap<String, Type>>,

    /// Record type of the most recently built `ok`/`err` value, for
    /// inference when the Optional flows straight into `let` or `?`.
    pub(crate) last_optional_record: Option<Ty>,

    // ---- current emission context ----
    pub(crate) current_function: Option<FuncId>,
    pub(crate) current_return_type: Option<Type>,
    pub(crate) current_struct: Option<CurrentStruct>,
    pub(crate) current_is_method: bool,
}

impl<'a, 'sym> Lowerer<'a, 'sym> {
    pub fn new(
        module_name: impl Into<String>,
        symbols: &'sym mut SymbolTable<'a>,
        strict_match: bool,
    ) -> Self {
        let module_name = module_name.into();
        let mut module = Module::new(module_name.clone());
        let builtins = Builtins::declare_all(&mut module);
        Self {
            module,
            module_name,
            strict_match,
            symbols,
            builtins,
            named_values: HashMap::new(),
            variable_types: HashMap::new(),
            mutable_vars: HashSet::new(),
            array_element_types: HashMap::new(),
            loop_stack: Vec::new(),
            functions: HashMap::new(),
            function_decls: HashMap::new(),
            struct_infos: HashMap::new(),
            enum_infos: HashMap::new(),
            type_aliases: HashMap::new(),
            generic_functions: HashMap::new(),
            generic_structs: HashMap::new(),
            generic_enums: HashMap::new(),
            type_params: Vec::new(),
            last_optional_record: None,
            current_function: None,
            current_return_type: None,
            current_struct: None,
            current_is_method: false,
        }
    }

    /// Lowers a whole parsed module. On success the LLIR module can be
    /// taken with [`Lowerer::finish`].
    pub fn lower_program(&mut self, program: &'a Program) -> Result<()> {
        for stmt in &program.statements {
            self.register_declaration(stmt)?;
        }
        for stmt in &program.statements {
            self.emit_declaration(stmt)?;
        }
        Ok(())
    }

    /// The finished LLIR module.
    pub fn finish(self) -> Module {
        self.module
    }

    pub(crate) fn err(&self, message: impl Into<String>, span: Span) -> CompileError {
        CompileError::new(message, span)
    }

    // ========================================================================
    // Pass 1: registration
    // ========================================================================

    fn register_declaration(&mut self, stmt: &'a Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Struct(decl) => self.register_struct(decl),
            StmtKind::Enum(decl) => self.register_enum(decl),
            StmtKind::TypeAlias { name, aliased, .. } => {
                self.type_aliases.insert(name.clone(), aliased.clone());
                Ok(())
            }
            StmtKind::Extern(decl) => self.register_extern(decl),
            StmtKind::Function(decl) => self.register_function(decl),
            StmtKind::Impl { target, methods } => self.register_impl(target, methods, stmt.span),
            StmtKind::Import { .. } => Ok(()),
            _ => Ok(()),
        }
    }

    fn register_struct(&mut self, decl: &'a StructDecl) -> Result<()> {
        if !decl.generic_params.is_empty() {
            self.generic_structs.insert(decl.name.clone(), decl);
            self.symbols.register_type(
                &self.module_name,
                &decl.name,
                decl.is_public,
                Some(AstHandle::Struct(decl)),
                decl.span,
            )?;
            return Ok(());
        }

        // Opaque first so fields may refer back to the struct by pointer.
        let id = self.module.create_struct(&decl.name);
        self.struct_infos.insert(
            decl.name.clone(),
            StructInfo { id, fields: Vec::new(), methods: HashMap::new() },
        );

        let mut storage = Vec::new();
        let mut fields = Vec::new();
        for field in &decl.fields {
            let logical = self.resolve_type(&field.ty)?;
            storage.push(self.storage_ty(&logical));
            fields.push((field.name.clone(), logical));
        }
        self.module.set_struct_body(id, storage);
        self.struct_infos.get_mut(&decl.name).unwrap().fields = fields;

        self.symbols.register_type(
            &self.module_name,
            &decl.name,
            decl.is_public,
            Some(AstHandle::Struct(decl)),
            decl.span,
        )?;

        // Method prototypes, so bodies can call them in any order.
        for method in &decl.methods {
            if !method.generic_params.is_empty() {
                continue;
            }
            self.declare_method(&decl.name, id, method)?;
        }
        Ok(())
    }

    fn register_enum(&mut self, decl: &'a EnumDecl) -> Result<()> {
        if !decl.generic_params.is_empty() {
            self.generic_enums.insert(decl.name.clone(), decl);
            self.symbols.register_type(
                &self.module_name,
                &decl.name,
                decl.is_public,
                Some(AstHandle::Enum(decl)),
                decl.span,
            )?;
            return Ok(());
        }

        let info = self.build_enum_info(decl)?;
        self.enum_infos.insert(decl.name.clone(), info);
        self.symbols.register_type(
            &self.module_name,
            &decl.name,
            decl.is_public,
            Some(AstHandle::Enum(decl)),
            decl.span,
        )?;
        Ok(())
    }

    pub(crate) fn build_enum_info(&mut self, decl: &'a EnumDecl) -> Result<EnumInfo> {
        let mut variants = Vec::new();
        for variant in &decl.variants {
            let payload = match variant.associated_types.first() {
                Some(ty) => Some(self.resolve_type(ty)?),
                None => None,
            };
            variants.push(VariantInfo { name: variant.name.clone(), payload });
        }
        Ok(EnumInfo { variants })
    }

    fn register_extern(&mut self, decl: &'a pawc_syntax::ast::ExternDecl) -> Result<()> {
        let mut params = Vec::new();
        for (_, ty) in &decl.params {
            params.push(self.resolve_param_ty(ty)?);
        }
        let ret = match &decl.return_type {
            Some(ty) => self.resolve_return_ty(ty)?,
            None => Ty::Void,
        };
        let func = self
            .module
            .declare_function(&decl.name, params, ret, false, Linkage::External);
        self.functions.insert(decl.name.clone(), func);
        Ok(())
    }

    fn register_function(&mut self, decl: &'a FunctionDecl) -> Result<()> {
        if !decl.generic_params.is_empty() {
            self.generic_functions.insert(decl.name.clone(), decl);
            self.symbols.register_generic_function(
                &self.module_name,
                &decl.name,
                decl.is_public,
                decl,
                decl.span,
            )?;
            return Ok(());
        }

        let func = self.declare_function_proto(decl, &decl.name)?;
        self.functions.insert(decl.name.clone(), func);
        self.function_decls.insert(decl.name.clone(), decl);
        self.symbols.register_function(
            &self.module_name,
            &decl.name,
            decl.is_public,
            Some(decl),
            decl.span,
        )?;
        Ok(())
    }

    fn register_impl(
        &mut self,
        target: &str,
        methods: &'a [FunctionDecl],
        span: Span,
    ) -> Result<()> {
        let id = match self.struct_infos.get(target) {
            Some(info) => info.id,
            None => {
                return Err(self.err(
                    format!("impl block for unknown struct '{target}'"),
                    span,
                ))
            }
        };
        for method in methods {
            self.declare_method(target, id, method)?;
        }
        Ok(())
    }

    /// Declares a method prototype and records it on the owning struct.
    fn declare_method(
        &mut self,
        struct_name: &str,
        struct_id: StructId,
        method: &'a FunctionDecl,
    ) -> Result<()> {
        let outer_struct = self.current_struct.replace(CurrentStruct {
            name: struct_name.to_string(),
            id: struct_id,
        });
        let outer_is_method = std::mem::replace(&mut self.current_is_method, method.is_method);
        let result = self.declare_function_proto(method, &method.name);
        self.current_is_method = outer_is_method;
        self.current_struct = outer_struct;

        let func = result?;
        self.functions.insert(method.name.clone(), func);
        self.function_decls.insert(method.name.clone(), method);
        self.struct_infos
            .get_mut(struct_name)
            .unwrap()
            .methods
            .insert(method.name.clone(), method.name.clone());
        Ok(())
    }

    // ========================================================================
    // Pass 2: emission
    // ========================================================================

    fn emit_declaration(&mut self, stmt: &'a Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Function(decl) if decl.generic_params.is_empty() => {
                let func = self.functions[&decl.name];
                self.emit_function_body(decl, func, None)
            }
            StmtKind::Struct(decl) if decl.generic_params.is_empty() => {
                let id = self.struct_infos[&decl.name].id;
                for method in &decl.methods {
                    if !method.generic_params.is_empty() {
                        continue;
                    }
                    let func = self.functions[&method.name];
                    self.emit_function_body(
                        method,
                        func,
                        Some(CurrentStruct { name: decl.name.clone(), id }),
                    )?;
                }
                Ok(())
            }
            StmtKind::Impl { target, methods } => {
                let id = self.struct_infos[target.as_str()].id;
                for method in methods {
                    let func = self.functions[&method.name];
                    self.emit_function_body(
                        method,
                        func,
                        Some(CurrentStruct { name: target.clone(), id }),
                    )?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Declares a function prototype under `name`, resolving parameter and
    /// return types in the current substitution context.
    pub(crate) fn declare_function_proto(&mut self, decl: &FunctionDecl, name: &str) -> Result<FuncId> {
        let mut params = Vec::new();
        for param in &decl.params {
            match param {
                Param::Receiver { .. } => params.push(Ty::Ptr),
                Param::Named { ty, .. } => params.push(self.resolve_param_ty(ty)?),
            }
        }
        let ret = match &decl.return_type {
            Some(ty) => self.resolve_return_ty(ty)?,
            None => Ty::Void,
        };
        Ok(self
            .module
            .declare_function(name, params, ret, false, Linkage::External))
    }

    /// Emits a function body into an already-declared prototype.
    pub(crate) fn emit_function_body(
        &mut self,
        decl: &'a FunctionDecl,
        func: FuncId,
        struct_ctx: Option<CurrentStruct>,
    ) -> Result<()> {
        let saved_point = self.module.insert_point();
        let outer_function = self.current_function.replace(func);
        let outer_return = self.current_return_type.take();
        self.current_return_type = decl.return_type.clone();
        let outer_struct = std::mem::replace(&mut self.current_struct, struct_ctx);
        let outer_is_method = std::mem::replace(&mut self.current_is_method, decl.is_method);

        let outer_values = std::mem::take(&mut self.named_values);
        let outer_types = std::mem::take(&mut self.variable_types);
        let outer_mutable = std::mem::take(&mut self.mutable_vars);
        let outer_elems = std::mem::take(&mut self.array_element_types);
        let outer_loops = std::mem::take(&mut self.loop_stack);

        let result = self.emit_body_inner(decl, func);

        self.named_values = outer_values;
        self.variable_types = outer_types;
        self.mutable_vars = outer_mutable;
        self.array_element_types = outer_elems;
        self.loop_stack = outer_loops;

        self.current_is_method = outer_is_method;
        self.current_struct = outer_struct;
        self.current_return_type = outer_return;
        self.current_function = outer_function;
        self.module.restore_insert_point(saved_point);

        result
    }

    fn emit_body_inner(&mut self, decl: &'a FunctionDecl, func: FuncId) -> Result<()> {
        let entry = self.module.append_block(func, "entry");
        self.module.position_at_end(func, entry);

        for (index, param) in decl.params.iter().enumerate() {
            let value = self.module.param(func, index as u32);
            match param {
                Param::Receiver { mutable, span } => {
                    let current = self.current_struct.clone().ok_or_else(|| {
                        self.err("'self' outside of a struct method", *span)
                    })?;
                    let slot = self.module.build_alloca(Ty::Ptr);
                    self.module.build_store(value, slot.clone());
                    self.named_values.insert("self".to_string(), slot);
                    self.variable_types
                        .insert("self".to_string(), Ty::Struct(current.id));
                    if *mutable {
                        self.mutable_vars.insert("self".to_string());
                    }
                }
                Param::Named { name, ty, .. } => {
                    let resolved = self.substitute_type(ty);
                    let slot = self.module.build_alloca(value.ty.clone());
                    self.module.build_store(value, slot.clone());
                    self.named_values.insert(name.clone(), slot);

                    match &resolved.kind {
                        TypeKind::Array { element, .. } => {
                            // Arrays arrive as pointer-to-element; remember
                            // the element type for indexing.
                            let element = element.clone();
                            let elem = self.resolve_type(&element)?;
                            let elem = self.storage_ty(&elem);
                            self.array_element_types.insert(name.clone(), elem);
                            self.variable_types.insert(name.clone(), Ty::Ptr);
                        }
                        _ => {
                            let logical = self.resolve_type(&resolved)?;
                            self.variable_types.insert(name.clone(), logical);
                        }
                    }
                }
            }
        }

        for stmt in &decl.body {
            if self.module.current_block_terminated() {
                // Unreachable code after an early return.
                break;
            }
            self.lower_stmt(stmt)?;
        }

        // Fall-through: void functions return, value functions produce a
        // zero so every block is terminated.
        if !self.module.current_block_terminated() {
            let ret_ty = self.module.func(func).ret_ty().clone();
            match ret_ty {
                Ty::Void => self.module.build_ret_void(),
                ty if ty.is_aggregate() => {
                    let slot = self.module.build_alloca(ty.clone());
                    let value = self.module.build_load(ty, slot);
                    self.module.build_ret(value);
                }
                ty => {
                    let zero = Value::zero(&ty);
                    self.module.build_ret(zero);
                }
            }
        }

        self.module
            .verify_function(func)
            .map_err(|verify| self.err(verify.to_string(), decl.span))
    }
}
