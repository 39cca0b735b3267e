//! Monomorphization of generic functions, structs, and enums.
//!
//! Generic declarations are single-instance in the AST and multi-instance
//! in the backend. Instantiation is pure substitution: a frame mapping
//! parameter names to *closed* concrete types is pushed for the duration of
//! the instantiation and popped on every exit path, so diagnostics keep
//! pointing at the generic's original source.
//!
//! Instances are cached by mangled name (`id<i32>` → `id_i32`), which is
//! what makes two identical call sites share one backend function. A
//! cross-module `M::f<Ts>` instantiates in the *calling* module's backend
//! so the result is type-consistent with the caller's types.

use std::collections::HashMap;

use pawc_base::{Result, Span};
use pawc_llir::{FuncId, StructId, Ty};
use pawc_syntax::ast::{EnumDecl, StructDecl, Type};

use super::types::enum_record;
use super::{CurrentStruct, Lowerer, StructInfo};
use crate::symbols::SymbolKind;

impl<'a, 'sym> Lowerer<'a, 'sym> {
    // ========================================================================
    // Generic declaration lookup (local first, then cross-module)
    // ========================================================================

    pub(crate) fn lookup_generic_struct(&mut self, name: &str) -> Option<&'a StructDecl> {
        if let Some(decl) = self.generic_structs.get(name) {
            return Some(decl);
        }
        let decl = self
            .symbols
            .lookup(name, &self.module_name)
            .filter(|symbol| symbol.kind == SymbolKind::Type)
            .and_then(|symbol| symbol.ast)
            .and_then(|handle| handle.as_struct())
            .filter(|decl| !decl.generic_params.is_empty())?;
        self.generic_structs.insert(name.to_string(), decl);
        Some(decl)
    }

    fn lookup_generic_enum(&mut self, name: &str) -> Option<&'a EnumDecl> {
        if let Some(decl) = self.generic_enums.get(name) {
            return Some(decl);
        }
        let decl = self
            .symbols
            .lookup(name, &self.module_name)
            .filter(|symbol| symbol.kind == SymbolKind::Type)
            .and_then(|symbol| symbol.ast)
            .and_then(|handle| handle.as_enum())
            .filter(|decl| !decl.generic_params.is_empty())?;
        self.generic_enums.insert(name.to_string(), decl);
        Some(decl)
    }

    /// `Named` type with arguments: a struct or enum instance.
    pub(crate) fn resolve_generic_instance(
        &mut self,
        name: &str,
        args: &[Type],
        span: Span,
    ) -> Result<Ty> {
        if self.lookup_generic_struct(name).is_some() {
            let (id, _) = self.instantiate_generic_struct(name, args, span)?;
            return Ok(Ty::Struct(id));
        }
        if self.lookup_generic_enum(name).is_some() {
            return self.instantiate_generic_enum(name, args, span);
        }
        Err(self.err(format!("unknown generic type '{name}'"), span))
    }

    // ========================================================================
    // Functions
    // ========================================================================

    pub(crate) fn instantiate_generic_function(
        &mut self,
        name: &str,
        type_args: &[Type],
        span: Span,
    ) -> Result<FuncId> {
        let decl = self
            .generic_functions
            .get(name)
            .copied()
            .ok_or_else(|| self.err(format!("unknown generic function '{name}'"), span))?;

        if decl.generic_params.len() != type_args.len() {
            return Err(self.err(
                format!(
                    "'{name}' expects {} type argument(s), got {}",
                    decl.generic_params.len(),
                    type_args.len()
                ),
                span,
            ));
        }

        // Close the arguments under the active substitution so nested
        // generic calls (`id<T>` inside another generic) resolve fully.
        let closed: Vec<Type> = type_args.iter().map(|t| self.substitute_type(t)).collect();
        let mangled = self.mangle(name, &closed)?;

        if let Some(func) = self.module.get_function(&mangled) {
            return Ok(func);
        }

        let frame: HashMap<String, Type> = decl
            .generic_params
            .iter()
            .zip(closed.iter())
            .map(|(param, ty)| (param.name.clone(), ty.clone()))
            .collect();
        self.type_params.push(frame);
        let result = (|| {
            let func = self.declare_function_proto(decl, &mangled)?;
            self.functions.insert(mangled.clone(), func);
            self.emit_function_body(decl, func, None)?;
            Ok(func)
        })();
        self.type_params.pop();
        let func = result?;

        // The instance is an ordinary function symbol, public iff the
        // generic was.
        self.symbols.register_function(
            &self.module_name,
            &mangled,
            decl.is_public,
            Some(decl),
            decl.span,
        )?;
        Ok(func)
    }

    // ========================================================================
    // Structs
    // ========================================================================

    /// Instantiates a generic struct (idempotently) and returns its backend
    /// type together with the mangled name.
    pub(crate) fn instantiate_generic_struct(
        &mut self,
        name: &str,
        type_args: &[Type],
        span: Span,
    ) -> Result<(StructId, String)> {
        let decl = self
            .lookup_generic_struct(name)
            .ok_or_else(|| self.err(format!("unknown generic struct '{name}'"), span))?;

        if decl.generic_params.len() != type_args.len() {
            return Err(self.err(
                format!(
                    "'{name}' expects {} type argument(s), got {}",
                    decl.generic_params.len(),
                    type_args.len()
                ),
                span,
            ));
        }

        let closed: Vec<Type> = type_args.iter().map(|t| self.substitute_type(t)).collect();
        let mangled = self.mangle(name, &closed)?;
        if let Some(info) = self.struct_infos.get(&mangled) {
            return Ok((info.id, mangled));
        }

        // Opaque type first so the fields may refer to the instance itself.
        let id = self.module.create_struct(&mangled);
        self.struct_infos.insert(
            mangled.clone(),
            StructInfo { id, fields: Vec::new(), methods: HashMap::new() },
        );

        let frame: HashMap<String, Type> = decl
            .generic_params
            .iter()
            .zip(closed.iter())
            .map(|(param, ty)| (param.name.clone(), ty.clone()))
            .collect();
        self.type_params.push(frame);
        let result = self.instantiate_struct_inner(decl, id, &mangled, name);
        self.type_params.pop();
        result?;

        self.symbols.register_generic_struct_instance(
            &self.module_name,
            &mangled,
            name,
            decl.is_public,
            decl,
            decl.span,
        )?;
        Ok((id, mangled))
    }

    fn instantiate_struct_inner(
        &mut self,
        decl: &'a StructDecl,
        id: StructId,
        mangled: &str,
        base_name: &str,
    ) -> Result<()> {
        let mut storage = Vec::new();
        let mut fields = Vec::new();
        for field in &decl.fields {
            let logical = self.resolve_type(&field.ty)?;
            storage.push(self.storage_ty(&logical));
            fields.push((field.name.clone(), logical));
        }
        self.module.set_struct_body(id, storage);
        self.struct_infos.get_mut(mangled).unwrap().fields = fields;

        // Methods are instantiated with the struct, under mangled names
        // (`new` of `Pair_i32_string` becomes `new_i32_string`).
        let suffix = mangled
            .strip_prefix(&format!("{base_name}_"))
            .unwrap_or(mangled)
            .to_string();
        for method in &decl.methods {
            let method_name = format!("{}_{}", method.name, suffix);

            let ctx = CurrentStruct { name: mangled.to_string(), id };
            let outer_struct = self.current_struct.replace(ctx.clone());
            let outer_is_method =
                std::mem::replace(&mut self.current_is_method, method.is_method);
            let proto = self.declare_function_proto(method, &method_name);
            self.current_is_method = outer_is_method;
            self.current_struct = outer_struct;

            let func = proto?;
            self.functions.insert(method_name.clone(), func);
            self.struct_infos
                .get_mut(mangled)
                .unwrap()
                .methods
                .insert(method.name.clone(), method_name.clone());

            self.emit_function_body(method, func, Some(ctx))?;
        }
        Ok(())
    }

    // ========================================================================
    // Enums
    // ========================================================================

    /// Registers a concrete enum instance. The layout is the shared
    /// `{ i32 tag, i64 payload }` record; ordinals are inherited from the
    /// generic declaration.
    pub(crate) fn instantiate_generic_enum(
        &mut self,
        name: &str,
        type_args: &[Type],
        span: Span,
    ) -> Result<Ty> {
        let decl = self
            .lookup_generic_enum(name)
            .ok_or_else(|| self.err(format!("unknown generic enum '{name}'"), span))?;

        if decl.generic_params.len() != type_args.len() {
            return Err(self.err(
                format!(
                    "'{name}' expects {} type argument(s), got {}",
                    decl.generic_params.len(),
                    type_args.len()
                ),
                span,
            ));
        }

        let closed: Vec<Type> = type_args.iter().map(|t| self.substitute_type(t)).collect();
        let mangled = self.mangle(name, &closed)?;
        if self.enum_infos.contains_key(&mangled) {
            return Ok(enum_record());
        }

        let frame: HashMap<String, Type> = decl
            .generic_params
            .iter()
            .zip(closed.iter())
            .map(|(param, ty)| (param.name.clone(), ty.clone()))
            .collect();
        self.type_params.push(frame);
        let info = self.build_enum_info(decl);
        self.type_params.pop();

        self.enum_infos.insert(mangled.clone(), info?);
        self.symbols.register_type(
            &self.module_name,
            &mangled,
            decl.is_public,
            Some(crate::symbols::AstHandle::Enum(decl)),
            decl.span,
        )?;
        Ok(enum_record())
    }
}
