//! AST type resolution and canonical type names.
//!
//! Resolution produces *logical* LLIR types: named structs stay
//! `Ty::Struct`, Optionals stay their three-field record, enums their
//! two-field record. The ABI conversions (structs and Optionals travel as
//! pointers, arrays as pointer-to-element parameters) are applied at the
//! edges by [`Lowerer::storage_ty`], [`Lowerer::resolve_param_ty`], and
//! [`Lowerer::resolve_return_ty`].
//!
//! A generic declaration is resolved under the innermost type-parameter
//! frame; substitution frames always hold *closed* types, so one frame
//! lookup suffices.

use pawc_base::Result;
use pawc_llir::Ty;
use pawc_syntax::ast::{PrimitiveTy, Type, TypeKind};

use super::Lowerer;
use crate::symbols::{AstHandle, SymbolKind};

/// The uniform enum record: `{ i32 tag, i64 payload }`.
pub(crate) fn enum_record() -> Ty {
    Ty::Record(vec![Ty::I32, Ty::I64])
}

/// True for the Optional record shape `{ i32 tag, T value, ptr error_msg }`.
pub(crate) fn is_optional_record(ty: &Ty) -> bool {
    match ty {
        Ty::Record(fields) => {
            fields.len() == 3 && fields[0] == Ty::I32 && fields[2] == Ty::Ptr
        }
        _ => false,
    }
}

/// True for the two-field enum record.
pub(crate) fn is_enum_record(ty: &Ty) -> bool {
    matches!(ty, Ty::Record(fields) if fields.len() == 2 && fields[0] == Ty::I32)
}

impl<'a, 'sym> Lowerer<'a, 'sym> {
    // ========================================================================
    // Substitution
    // ========================================================================

    /// Applies the active type-parameter frame, leaving unknown generics in
    /// place for [`resolve_type`](Self::resolve_type) to report.
    pub(crate) fn substitute_type(&self, ty: &Type) -> Type {
        match &ty.kind {
            TypeKind::Generic(name) => match self
                .type_params
                .last()
                .and_then(|frame| frame.get(name))
            {
                Some(concrete) => concrete.clone(),
                None => ty.clone(),
            },
            TypeKind::Named { name, generic_args } => Type::new(
                TypeKind::Named {
                    name: name.clone(),
                    generic_args: generic_args.iter().map(|t| self.substitute_type(t)).collect(),
                },
                ty.span,
            ),
            TypeKind::Array { element, size } => Type::new(
                TypeKind::Array {
                    element: Box::new(self.substitute_type(element)),
                    size: *size,
                },
                ty.span,
            ),
            TypeKind::Optional(inner) => Type::new(
                TypeKind::Optional(Box::new(self.substitute_type(inner))),
                ty.span,
            ),
            TypeKind::Primitive(_) | TypeKind::SelfType => ty.clone(),
        }
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// AST type → logical LLIR type.
    pub(crate) fn resolve_type(&mut self, ty: &Type) -> Result<Ty> {
        match &ty.kind {
            TypeKind::Primitive(prim) => Ok(resolve_primitive(*prim)),
            TypeKind::Generic(name) => {
                let substituted = self
                    .type_params
                    .last()
                    .and_then(|frame| frame.get(name))
                    .cloned();
                match substituted {
                    Some(concrete) => self.resolve_type(&concrete),
                    None => Err(self.err(
                        format!(
                            "type parameter '{name}' is not bound here; generic code must be \
                             instantiated with concrete type arguments before lowering"
                        ),
                        ty.span,
                    )),
                }
            }
            TypeKind::Array { element, size } => {
                let elem = self.resolve_type(element)?;
                match size {
                    Some(n) => Ok(Ty::Array(Box::new(self.storage_ty(&elem)), *n as u64)),
                    None => Err(self.err(
                        "array length cannot be inferred in this position; it is only \
                         inferred from a 'let' initializer",
                        ty.span,
                    )),
                }
            }
            TypeKind::Optional(inner) => {
                let inner = self.substitute_type(inner);
                self.optional_record(&inner)
            }
            TypeKind::SelfType => {
                let current = self.current_struct.clone().ok_or_else(|| {
                    self.err("'Self' is only legal inside a struct declaration", ty.span)
                })?;
                Ok(Ty::Struct(current.id))
            }
            TypeKind::Named { name, generic_args } if generic_args.is_empty() => {
                self.resolve_named_type(name, ty)
            }
            TypeKind::Named { name, generic_args } => {
                // A generic instance: monomorphize (or reuse) it now.
                let args: Vec<Type> =
                    generic_args.iter().map(|t| self.substitute_type(t)).collect();
                self.resolve_generic_instance(name, &args, ty.span)
            }
        }
    }

    fn resolve_named_type(&mut self, name: &str, ty: &Type) -> Result<Ty> {
        if let Some(aliased) = self.type_aliases.get(name).cloned() {
            return self.resolve_type(&aliased);
        }
        if let Some(info) = self.struct_infos.get(name) {
            return Ok(Ty::Struct(info.id));
        }
        if self.enum_infos.contains_key(name) {
            return Ok(enum_record());
        }
        if self.generic_structs.contains_key(name) || self.generic_enums.contains_key(name) {
            return Err(self.err(
                format!("generic type '{name}' requires type arguments"),
                ty.span,
            ));
        }

        // Cross-module fallback: re-create the type in this module from the
        // defining module's AST.
        let handle = self
            .symbols
            .lookup(name, &self.module_name)
            .filter(|symbol| symbol.kind == SymbolKind::Type)
            .and_then(|symbol| symbol.ast);
        match handle {
            Some(AstHandle::Struct(decl)) if decl.generic_params.is_empty() => {
                self.import_struct(decl)?;
                Ok(Ty::Struct(self.struct_infos[name].id))
            }
            Some(AstHandle::Struct(decl)) => {
                self.generic_structs.insert(decl.name.clone(), decl);
                Err(self.err(
                    format!("generic type '{name}' requires type arguments"),
                    ty.span,
                ))
            }
            Some(AstHandle::Enum(decl)) if decl.generic_params.is_empty() => {
                let info = self.build_enum_info(decl)?;
                self.enum_infos.insert(decl.name.clone(), info);
                Ok(enum_record())
            }
            Some(AstHandle::Enum(decl)) => {
                self.generic_enums.insert(decl.name.clone(), decl);
                Err(self.err(
                    format!("generic type '{name}' requires type arguments"),
                    ty.span,
                ))
            }
            _ => Err(self.err(format!("unknown type '{name}'"), ty.span)),
        }
    }

    /// Re-creates an imported concrete struct in the current module. Field
    /// types are resolved here, in this module's context, which is what
    /// keeps cross-module signatures type-consistent.
    pub(crate) fn import_struct(&mut self, decl: &'a pawc_syntax::ast::StructDecl) -> Result<()> {
        if self.struct_infos.contains_key(&decl.name) {
            return Ok(());
        }
        let id = self.module.create_struct(&decl.name);
        self.struct_infos.insert(
            decl.name.clone(),
            super::StructInfo { id, fields: Vec::new(), methods: Default::default() },
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
        Ok(())
    }

    /// The Optional record for a value type: `{ i32, T, ptr }`.
    pub(crate) fn optional_record(&mut self, inner: &Type) -> Result<Ty> {
        let logical = self.resolve_type(inner)?;
        Ok(Ty::Record(vec![Ty::I32, self.storage_ty(&logical), Ty::Ptr]))
    }

    // ========================================================================
    // ABI conversions
    // ========================================================================

    /// How a logical type is stored in memory (alloca slots, struct fields,
    /// Optional value fields): structs and Optionals as pointers, enums and
    /// fixed arrays by value.
    pub(crate) fn storage_ty(&self, logical: &Ty) -> Ty {
        match logical {
            Ty::Struct(_) => Ty::Ptr,
            ty if is_optional_record(ty) => Ty::Ptr,
            other => other.clone(),
        }
    }

    /// Parameter ABI: arrays decay to pointer-to-element, structs and
    /// Optionals travel as pointers, enums by value.
    pub(crate) fn resolve_param_ty(&mut self, ty: &Type) -> Result<Ty> {
        let ty = self.substitute_type(ty);
        if let TypeKind::Array { .. } = &ty.kind {
            return Ok(Ty::Ptr);
        }
        let logical = self.resolve_type(&ty)?;
        Ok(self.storage_ty(&logical))
    }

    /// Return ABI. `Self` returns a pointer from instance methods and the
    /// struct value from associated functions.
    pub(crate) fn resolve_return_ty(&mut self, ty: &Type) -> Result<Ty> {
        let ty = self.substitute_type(ty);
        match &ty.kind {
            TypeKind::SelfType => {
                let current = self.current_struct.clone().ok_or_else(|| {
                    self.err("'Self' is only legal inside a struct declaration", ty.span)
                })?;
                if self.current_is_method {
                    Ok(Ty::Ptr)
                } else {
                    Ok(Ty::Struct(current.id))
                }
            }
            TypeKind::Array { .. } => Ok(Ty::Ptr),
            _ => {
                let logical = self.resolve_type(&ty)?;
                Ok(self.storage_ty(&logical))
            }
        }
    }

    // ========================================================================
    // Canonical names and mangling
    // ========================================================================

    /// Canonical printable form of a type, used in mangled names:
    /// `i32`, `string`, `Pair_i32_string`, `opt_i32`, `arr4_i32`.
    pub(crate) fn canonical_type_name(&self, ty: &Type) -> Result<String> {
        match &ty.kind {
            TypeKind::Primitive(prim) => Ok(prim.name().to_string()),
            TypeKind::Generic(name) => {
                let substituted = self
                    .type_params
                    .last()
                    .and_then(|frame| frame.get(name))
                    .cloned();
                match substituted {
                    Some(concrete) => self.canonical_type_name(&concrete),
                    None => Err(self.err(
                        format!("type parameter '{name}' is not bound here"),
                        ty.span,
                    )),
                }
            }
            TypeKind::Named { name, generic_args } if generic_args.is_empty() => Ok(name.clone()),
            TypeKind::Named { name, generic_args } => self.mangle(name, generic_args),
            TypeKind::Optional(inner) => {
                Ok(format!("opt_{}", self.canonical_type_name(inner)?))
            }
            TypeKind::Array { element, size } => Ok(format!(
                "arr{}_{}",
                size.unwrap_or(0),
                self.canonical_type_name(element)?
            )),
            TypeKind::SelfType => {
                let current = self.current_struct.clone().ok_or_else(|| {
                    self.err("'Self' is only legal inside a struct declaration", ty.span)
                })?;
                Ok(current.name)
            }
        }
    }

    /// `N<T1,…,Tn>` → `N_t1_…_tn`. Stable and injective over the supported
    /// type universe.
    pub(crate) fn mangle(&self, base: &str, args: &[Type]) -> Result<String> {
        let mut name = base.to_string();
        for arg in args {
            name.push('_');
            name.push_str(&self.canonical_type_name(arg)?);
        }
        Ok(name)
    }
}

fn resolve_primitive(prim: PrimitiveTy) -> Ty {
    match prim {
        PrimitiveTy::I8 | PrimitiveTy::U8 => Ty::I8,
        PrimitiveTy::I16 | PrimitiveTy::U16 => Ty::I16,
        PrimitiveTy::I32 | PrimitiveTy::U32 => Ty::I32,
        PrimitiveTy::I64 | PrimitiveTy::U64 => Ty::I64,
        PrimitiveTy::I128 | PrimitiveTy::U128 => Ty::I128,
        PrimitiveTy::F32 => Ty::F32,
        PrimitiveTy::F64 => Ty::F64,
        PrimitiveTy::Bool => Ty::I1,
        PrimitiveTy::Char => Ty::I8,
        PrimitiveTy::Str => Ty::Ptr,
        PrimitiveTy::Void => Ty::Void,
    }
}
