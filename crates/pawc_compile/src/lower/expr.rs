//! Expression lowering.
//!
//! Every expression kind lowers to a [`Value`]. Struct values, Optional
//! records, and strings are pointers at this level; enums are two-field
//! records by value; everything else is a first-class scalar.

use pawc_base::{Result, Span};
use pawc_llir::{BinOp, CastOp, FuncId, IcmpPred, Ty, Value};
use pawc_syntax::ast::{BinaryOp, Expr, ExprKind, Type, TypeKind, UnaryOp};

use super::types::{enum_record, is_optional_record};
use super::Lowerer;
use crate::symbols::SymbolKind;

impl<'a, 'sym> Lowerer<'a, 'sym> {
    pub(crate) fn lower_expr(&mut self, expr: &'a Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Integer(value) => Ok(Value::const_int(Ty::I32, i128::from(*value))),
            ExprKind::Float(value) => Ok(Value::const_float(Ty::F64, *value)),
            ExprKind::Bool(value) => Ok(Value::const_int(Ty::I1, i128::from(*value))),
            ExprKind::Char(value) => Ok(Value::const_int(Ty::I8, *value as i128)),
            ExprKind::Str(value) => Ok(self.module.global_string(value)),
            ExprKind::Identifier(name) => self.lower_identifier(name, expr.span),
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            ExprKind::Call { callee, module_prefix, type_args, args } => {
                self.lower_call(callee, module_prefix.as_deref(), type_args, args, expr.span)
            }
            ExprKind::Assign { target, value } => self.lower_assign(target, value, expr.span),
            ExprKind::Member { object, field } => {
                Ok(self.lower_member(object, field, expr.span)?.0)
            }
            ExprKind::Index { .. } => self.lower_index_read(expr),
            ExprKind::ArrayLiteral(_) => Err(self.err(
                "array literals are only allowed as the initializer of a typed 'let'",
                expr.span,
            )),
            ExprKind::StructLiteral { name, fields } => {
                self.lower_struct_literal(name, fields, expr.span)
            }
            ExprKind::EnumVariant { enum_name, variant, args } => {
                self.lower_enum_variant(enum_name, variant, args, expr.span)
            }
            ExprKind::Match { value, arms } => self.lower_match(value, arms, expr.span),
            ExprKind::Is { value, pattern } => self.lower_is(value, pattern, expr.span),
            ExprKind::IfExpr { condition, then_expr, else_expr } => {
                self.lower_if_expr(condition, then_expr, else_expr, expr.span)
            }
            ExprKind::Cast { value, target } => self.lower_cast(value, target, expr.span),
            ExprKind::Try(inner) => self.lower_try(inner, expr.span),
            ExprKind::Ok(inner) => self.lower_ok(inner),
            ExprKind::Err(inner) => self.lower_err(inner, expr.span),
        }
    }

    // ========================================================================
    // Identifiers
    // ========================================================================

    fn lower_identifier(&mut self, name: &str, span: Span) -> Result<Value> {
        let slot = self
            .named_values
            .get(name)
            .cloned()
            .ok_or_else(|| self.err(format!("unknown variable '{name}'"), span))?;
        let logical = self
            .variable_types
            .get(name)
            .cloned()
            .unwrap_or(Ty::I32);

        match &logical {
            // Fixed arrays are used through their stack slot.
            Ty::Array(_, _) => Ok(slot),
            // Struct variables store a heap pointer; load it.
            Ty::Struct(_) => Ok(self.module.build_load(Ty::Ptr, slot)),
            // Optional variables also hold a pointer to their record.
            ty if is_optional_record(ty) => Ok(self.module.build_load(Ty::Ptr, slot)),
            // Everything else loads its storage type (enums by value,
            // strings as pointers, scalars directly).
            other => {
                let storage = self.storage_ty(other);
                Ok(self.module.build_load(storage, slot))
            }
        }
    }

    // ========================================================================
    // Unary and binary operators
    // ========================================================================

    fn lower_unary(&mut self, op: UnaryOp, operand: &'a Expr) -> Result<Value> {
        let value = self.lower_expr(operand)?;
        Ok(match op {
            UnaryOp::Neg => self.module.build_neg(value),
            UnaryOp::Not => self.module.build_not(value),
        })
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: &'a Expr, rhs: &'a Expr) -> Result<Value> {
        let mut left = self.lower_expr(lhs)?;
        let mut right = self.lower_expr(rhs)?;

        // `string + string` concatenates through the runtime.
        if op == BinaryOp::Add && left.ty.is_ptr() && right.ty.is_ptr() {
            return Ok(self.lower_string_concat(left, right));
        }

        // Mixed integer widths: sign-extend the narrower operand.
        if left.ty.is_int() && right.ty.is_int() && left.ty != right.ty {
            if left.ty.int_width() < right.ty.int_width() {
                left = self.module.build_cast(CastOp::Sext, left, right.ty.clone());
            } else {
                right = self.module.build_cast(CastOp::Sext, right, left.ty.clone());
            }
        }

        let value = match op {
            BinaryOp::Add => self.module.build_binary(BinOp::Add, left, right),
            BinaryOp::Sub => self.module.build_binary(BinOp::Sub, left, right),
            BinaryOp::Mul => self.module.build_binary(BinOp::Mul, left, right),
            BinaryOp::Div => self.module.build_binary(BinOp::SDiv, left, right),
            BinaryOp::Mod => self.module.build_binary(BinOp::SRem, left, right),
            BinaryOp::Eq => self.module.build_icmp(IcmpPred::Eq, left, right),
            BinaryOp::Ne => self.module.build_icmp(IcmpPred::Ne, left, right),
            BinaryOp::Lt => self.module.build_icmp(IcmpPred::Slt, left, right),
            BinaryOp::Le => self.module.build_icmp(IcmpPred::Sle, left, right),
            BinaryOp::Gt => self.module.build_icmp(IcmpPred::Sgt, left, right),
            BinaryOp::Ge => self.module.build_icmp(IcmpPred::Sge, left, right),
            BinaryOp::And => self.module.build_binary(BinOp::And, left, right),
            BinaryOp::Or => self.module.build_binary(BinOp::Or, left, right),
        };
        Ok(value)
    }

    /// `s1 + s2`: `malloc(strlen(s1) + strlen(s2) + 1)`, then
    /// `strcpy`/`strcat`. The allocation is never freed by the compiler.
    fn lower_string_concat(&mut self, left: Value, right: Value) -> Value {
        let strlen = self.libc("strlen");
        let malloc = self.libc("malloc");
        let strcpy = self.libc("strcpy");
        let strcat = self.libc("strcat");

        let len1 = self.module.build_call(strlen, vec![left.clone()]);
        let len2 = self.module.build_call(strlen, vec![right.clone()]);
        let total = self.module.build_binary(BinOp::Add, len1, len2);
        let size = self
            .module
            .build_binary(BinOp::Add, total, Value::const_int(Ty::I64, 1));

        let result = self.module.build_call(malloc, vec![size]);
        self.module.build_call(strcpy, vec![result.clone(), left]);
        self.module.build_call(strcat, vec![result.clone(), right]);
        result
    }

    pub(crate) fn libc(&self, name: &str) -> FuncId {
        self.module
            .get_function(name)
            .expect("libc extern declared at module creation")
    }

    /// Conditions must be boolean; integers are compared against zero.
    pub(crate) fn to_condition(&mut self, value: Value, span: Span) -> Result<Value> {
        match &value.ty {
            Ty::Int(1) => Ok(value),
            Ty::Int(_) => {
                let zero = Value::zero(&value.ty);
                Ok(self.module.build_icmp(IcmpPred::Ne, value, zero))
            }
            _ => Err(self.err("condition must be a boolean", span)),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn lower_call(
        &mut self,
        callee: &'a Expr,
        module_prefix: Option<&str>,
        type_args: &'a [Type],
        args: &'a [Expr],
        span: Span,
    ) -> Result<Value> {
        // Method call: `obj.name(args)`.
        if let ExprKind::Member { object, field } = &callee.kind {
            return self.lower_method_call(object, field, args, span);
        }

        let ExprKind::Identifier(name) = &callee.kind else {
            return Err(self.err("only named functions can be called", span));
        };

        if let Some(prefix) = module_prefix {
            return self.lower_qualified_call(prefix, name, type_args, args, span);
        }

        // Local generic call: requires explicit type arguments.
        if !type_args.is_empty() {
            let func = self.instantiate_generic_function(name, type_args, span)?;
            return self.emit_call(func, args, span);
        }

        if let Some(func) = self.functions.get(name).copied() {
            return self.emit_call(func, args, span);
        }

        if self.generic_functions.contains_key(name) {
            return Err(self
                .err(
                    format!("generic function '{name}' requires explicit type arguments"),
                    span,
                )
                .with_hint(format!("call it as '{name}<T>(…)'")));
        }

        if let Some(func) = self.builtins.get(name) {
            return self.emit_call(func, args, span);
        }

        Err(self.err(format!("unknown function '{name}'"), span))
    }

    /// `M::f(…)`, `Struct::assoc(…)`, and `Struct::assoc<Ts>(…)`.
    fn lower_qualified_call(
        &mut self,
        prefix: &str,
        name: &str,
        type_args: &'a [Type],
        args: &'a [Expr],
        span: Span,
    ) -> Result<Value> {
        // Associated function of a concrete local struct: `Point::origin()`.
        if type_args.is_empty() {
            if let Some(info) = self.struct_infos.get(prefix) {
                let fn_name = info.methods.get(name).cloned().ok_or_else(|| {
                    self.err(
                        format!("struct '{prefix}' has no associated function '{name}'"),
                        span,
                    )
                })?;
                let func = self.functions[&fn_name];
                return self.emit_call(func, args, span);
            }
        }

        // Generic-struct static: `Pair::new<i32, string>(…)`. Instantiating
        // the struct also instantiates its methods under mangled names.
        if !type_args.is_empty() && self.lookup_generic_struct(prefix).is_some() {
            let (_, mangled_struct) = self.instantiate_generic_struct(prefix, type_args, span)?;
            let suffix = mangled_struct
                .strip_prefix(&format!("{prefix}_"))
                .unwrap_or(&mangled_struct);
            let method_name = format!("{name}_{suffix}");
            let func = self.functions.get(&method_name).copied().ok_or_else(|| {
                self.err(
                    format!("struct '{prefix}' has no associated function '{name}'"),
                    span,
                )
            })?;
            return self.emit_call(func, args, span);
        }

        // Cross-module generic call: instantiate in *this* module so the
        // resulting function is type-consistent with our backend types.
        if !type_args.is_empty() {
            let symbol = self
                .symbols
                .lookup_in_module(prefix, name)
                .ok_or_else(|| {
                    self.err(format!("function '{name}' not found in module '{prefix}'"), span)
                })?;
            if symbol.kind != SymbolKind::GenericFunction {
                return Err(self.err(
                    format!("function '{prefix}::{name}' is not generic"),
                    span,
                ));
            }
            if !self.symbols.is_accessible(symbol, &self.module_name) {
                return Err(self.err(
                    format!("function '{prefix}::{name}' is private"),
                    span,
                ));
            }
            let decl = symbol
                .ast
                .and_then(|h| h.as_function())
                .ok_or_else(|| self.err(format!("missing definition for '{name}'"), span))?;
            self.generic_functions.insert(name.to_string(), decl);
            let func = self.instantiate_generic_function(name, type_args, span)?;
            return self.emit_call(func, args, span);
        }

        // Plain cross-module call: mirror the resolved signature as an
        // external declaration in this module, then call it.
        let symbol = self
            .symbols
            .lookup_in_module(prefix, name)
            .ok_or_else(|| {
                self.err(format!("function '{name}' not found in module '{prefix}'"), span)
            })?;
        if !self.symbols.is_accessible(symbol, &self.module_name) {
            return Err(self
                .err(
                    format!("function '{prefix}::{name}' is private"),
                    span,
                )
                .with_hint(format!(
                    "mark it 'pub' in module '{prefix}' to call it from other modules"
                )));
        }
        if symbol.kind == SymbolKind::GenericFunction {
            return Err(self.err(
                format!("generic function '{prefix}::{name}' requires explicit type arguments"),
                span,
            ));
        }
        let decl = symbol
            .ast
            .and_then(|h| h.as_function())
            .ok_or_else(|| self.err(format!("missing definition for '{name}'"), span))?;

        let func = match self.module.get_function(name) {
            Some(func) => func,
            None => self.declare_function_proto(decl, name)?,
        };
        self.emit_call(func, args, span)
    }

    fn lower_method_call(
        &mut self,
        object: &'a Expr,
        method: &str,
        args: &'a [Expr],
        span: Span,
    ) -> Result<Value> {
        let (self_ptr, logical) = self.object_pointer(object)?;

        // Prefer the object's known struct; fall back to searching every
        // struct for a uniquely-named method.
        let fn_name = match &logical {
            Some(Ty::Struct(id)) => self
                .struct_infos
                .values()
                .find(|info| info.id == *id)
                .and_then(|info| info.methods.get(method).cloned()),
            _ => None,
        };
        let fn_name = fn_name.or_else(|| {
            self.struct_infos
                .values()
                .find_map(|info| info.methods.get(method).cloned())
        });
        let fn_name = fn_name
            .ok_or_else(|| self.err(format!("unknown method '{method}'"), span))?;

        let func = self.functions[&fn_name];
        let mut call_args = vec![self_ptr];
        for arg in args {
            call_args.push(self.lower_argument(arg)?);
        }
        self.check_arity(func, call_args.len(), span)?;
        let call_args = self.adapt_call_args(func, call_args);
        Ok(self.module.build_call(func, call_args))
    }

    fn emit_call(&mut self, func: FuncId, args: &'a [Expr], span: Span) -> Result<Value> {
        let mut values = Vec::new();
        for arg in args {
            values.push(self.lower_argument(arg)?);
        }
        self.check_arity(func, values.len(), span)?;
        let values = self.adapt_call_args(func, values);
        Ok(self.module.build_call(func, values))
    }

    /// Widens/narrows integer arguments to the callee's parameter types;
    /// varargs tails pass through unchanged.
    fn adapt_call_args(&mut self, func: FuncId, values: Vec<Value>) -> Vec<Value> {
        let params = self.module.func(func).param_tys().to_vec();
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| match params.get(i) {
                Some(param_ty) => {
                    let param_ty = param_ty.clone();
                    self.adapt_int(value, &param_ty)
                }
                None => value,
            })
            .collect()
    }

    fn check_arity(&self, func: FuncId, got: usize, span: Span) -> Result<()> {
        let f = self.module.func(func);
        if !f.is_varargs() && f.param_tys().len() != got {
            return Err(self.err(
                format!(
                    "function '{}' expects {} argument(s), got {}",
                    f.name(),
                    f.param_tys().len(),
                    got
                ),
                span,
            ));
        }
        Ok(())
    }

    /// Arguments mostly lower normally; fixed-array variables pass their
    /// stack address instead of a loaded value.
    pub(crate) fn lower_argument(&mut self, arg: &'a Expr) -> Result<Value> {
        if let ExprKind::Identifier(name) = &arg.kind {
            if let (Some(slot), Some(Ty::Array(_, _))) =
                (self.named_values.get(name), self.variable_types.get(name))
            {
                return Ok(slot.clone());
            }
        }
        self.lower_expr(arg)
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    fn lower_assign(&mut self, target: &'a Expr, value: &'a Expr, span: Span) -> Result<Value> {
        let val = self.lower_expr(value)?;

        match &target.kind {
            ExprKind::Identifier(name) => {
                if !self.mutable_vars.contains(name) {
                    return Err(self
                        .err(format!("cannot assign to immutable variable '{name}'"), span)
                        .with_hint(format!("declare it as 'let mut {name}' to allow reassignment")));
                }
                let slot = self
                    .named_values
                    .get(name)
                    .cloned()
                    .ok_or_else(|| self.err(format!("unknown variable '{name}'"), span))?;
                let logical = self.variable_types.get(name).cloned().unwrap_or(Ty::I32);
                let storage = self.storage_ty(&logical);
                let val = self.adapt_int(val, &storage);
                self.module.build_store(val.clone(), slot);
                Ok(val)
            }
            ExprKind::Member { object, field } => {
                let (field_ptr, field_logical) = self.member_ptr(object, field, span)?;
                let storage = self.storage_ty(&field_logical);
                let val = self.adapt_int(val, &storage);
                self.module.build_store(val.clone(), field_ptr);
                Ok(val)
            }
            ExprKind::Index { array, index } => {
                let (elem_ptr, elem_ty) = self.index_ptr(array, index, span)?;
                let val = self.adapt_int(val, &elem_ty);
                self.module.build_store(val.clone(), elem_ptr);
                Ok(val)
            }
            _ => Err(self.err("invalid assignment target", span)),
        }
    }

    /// Sign-extends or truncates integers to match a slot's type; other
    /// types pass through.
    pub(crate) fn adapt_int(&mut self, value: Value, target: &Ty) -> Value {
        if value.ty.is_int() && target.is_int() && value.ty != *target {
            self.module.build_sext_or_trunc(value, target.clone())
        } else {
            value
        }
    }

    // ========================================================================
    // Member access
    // ========================================================================

    /// Resolves the pointer an object expression refers to, plus its
    /// logical type when known.
    pub(crate) fn object_pointer(&mut self, object: &'a Expr) -> Result<(Value, Option<Ty>)> {
        match &object.kind {
            ExprKind::Identifier(name) => {
                let slot = self.named_values.get(name).cloned().ok_or_else(|| {
                    self.err(format!("unknown variable '{name}'"), object.span)
                })?;
                let logical = self.variable_types.get(name).cloned();
                // Struct, Optional, and string slots hold a pointer that
                // must be loaded; enum and array slots are the storage.
                let loads_pointer = matches!(
                    &logical,
                    Some(Ty::Struct(_)) | Some(Ty::Ptr)
                ) || logical.as_ref().is_some_and(is_optional_record);
                if loads_pointer {
                    let ptr = self.module.build_load(Ty::Ptr, slot);
                    Ok((ptr, logical))
                } else {
                    Ok((slot, logical))
                }
            }
            ExprKind::Member { object: inner, field } => {
                let (value, logical) = self.lower_member(inner, field, object.span)?;
                Ok((value, Some(logical)))
            }
            _ => {
                let value = self.lower_expr(object)?;
                if !value.ty.is_ptr() {
                    // Spill non-pointer aggregates so they can be GEPed.
                    let slot = self.module.build_alloca(value.ty.clone());
                    self.module.build_store(value, slot.clone());
                    return Ok((slot, None));
                }
                Ok((value, None))
            }
        }
    }

    /// Pointer to `object.field` plus the field's logical type.
    fn member_ptr(&mut self, object: &'a Expr, field: &str, span: Span) -> Result<(Value, Ty)> {
        let (obj_ptr, logical) = self.object_pointer(object)?;

        let info = match &logical {
            Some(Ty::Struct(id)) => self.struct_infos.values().find(|info| info.id == *id),
            // Without type information, fall back to the unique struct that
            // has a field with this name.
            _ => self
                .struct_infos
                .values()
                .find(|info| info.fields.iter().any(|(name, _)| name == field)),
        };
        let info = info.ok_or_else(|| self.err(format!("unknown field '{field}'"), span))?;

        let index = info
            .fields
            .iter()
            .position(|(name, _)| name == field)
            .ok_or_else(|| self.err(format!("unknown field '{field}'"), span))?;
        let field_logical = info.fields[index].1.clone();
        let struct_ty = Ty::Struct(info.id);

        let field_ptr = self
            .module
            .build_struct_gep(struct_ty, obj_ptr, index as u32);
        Ok((field_ptr, field_logical))
    }

    /// Loads `object.field`, returning the value and its logical type.
    /// Struct-typed fields load their stored pointer, so chains like
    /// `a.b.c` keep working on pointers.
    pub(crate) fn lower_member(
        &mut self,
        object: &'a Expr,
        field: &str,
        span: Span,
    ) -> Result<(Value, Ty)> {
        let (field_ptr, field_logical) = self.member_ptr(object, field, span)?;
        let storage = self.storage_ty(&field_logical);
        let value = self.module.build_load(storage, field_ptr);
        Ok((value, field_logical))
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    fn lower_index_read(&mut self, expr: &'a Expr) -> Result<Value> {
        let ExprKind::Index { array, index } = &expr.kind else {
            unreachable!("lower_index_read called on non-index expression");
        };
        let (elem_ptr, elem_ty) = self.index_ptr(array, index, expr.span)?;
        Ok(self.module.build_load(elem_ty, elem_ptr))
    }

    /// Pointer to an indexed element, dispatching on the storage type:
    /// fixed arrays GEP through the stack slot, strings index bytes, and
    /// array parameters use their recorded element type.
    fn index_ptr(
        &mut self,
        array: &'a Expr,
        index: &'a Expr,
        span: Span,
    ) -> Result<(Value, Ty)> {
        match &array.kind {
            ExprKind::Identifier(name) => {
                let slot = self.named_values.get(name).cloned().ok_or_else(|| {
                    self.err(format!("unknown variable '{name}'"), span)
                })?;

                // Generic/array parameter: pointer-to-element with the
                // element type recorded at instantiation.
                if let Some(elem) = self.array_element_types.get(name).cloned() {
                    let base = self.module.build_load(Ty::Ptr, slot);
                    let idx = self.lower_expr(index)?;
                    let ptr = self.module.build_gep(elem.clone(), base, idx);
                    return Ok((ptr, elem));
                }

                match self.variable_types.get(name).cloned() {
                    Some(array_ty @ Ty::Array(_, _)) => {
                        let Ty::Array(elem, _) = &array_ty else { unreachable!() };
                        let elem = (**elem).clone();
                        let idx = self.lower_expr(index)?;
                        let ptr = self.module.build_array_gep(array_ty, slot, idx);
                        Ok((ptr, elem))
                    }
                    Some(Ty::Ptr) => {
                        // String: byte indexing.
                        let base = self.module.build_load(Ty::Ptr, slot);
                        let idx = self.lower_expr(index)?;
                        let ptr = self.module.build_gep(Ty::I8, base, idx);
                        Ok((ptr, Ty::I8))
                    }
                    _ => Err(self.err(
                        format!("'{name}' is not indexable"),
                        span,
                    )),
                }
            }
            // Nested indexing on multi-dimensional arrays.
            ExprKind::Index { array: inner_array, index: inner_index } => {
                let (outer_ptr, outer_ty) = self.index_ptr(inner_array, inner_index, span)?;
                let Ty::Array(elem, _) = &outer_ty else {
                    return Err(self.err("only arrays support nested indexing", span));
                };
                let elem = (**elem).clone();
                let idx = self.lower_expr(index)?;
                let ptr = self.module.build_array_gep(outer_ty.clone(), outer_ptr, idx);
                Ok((ptr, elem))
            }
            _ => Err(self.err("expression is not indexable", span)),
        }
    }

    // ========================================================================
    // Struct literals and enum variants
    // ========================================================================

    /// `S { f: e, … }`: heap-allocate, store each field, yield the pointer.
    fn lower_struct_literal(
        &mut self,
        name: &str,
        fields: &'a [(String, Expr)],
        span: Span,
    ) -> Result<Value> {
        // A literal of a generic struct names the base; it resolves to an
        // already-instantiated instance when that is unambiguous.
        let id = if let Some(id) = self.unique_struct_instance(name) {
            id
        } else {
            // Pulls cross-module structs into this module if needed.
            let named = Type::new(
                TypeKind::Named { name: name.to_string(), generic_args: Vec::new() },
                span,
            );
            match self.resolve_type(&named)? {
                Ty::Struct(id) => id,
                _ => return Err(self.err(format!("'{name}' is not a struct"), span)),
            }
        };

        let struct_ty = Ty::Struct(id);
        let size = self.module.alloc_size(&struct_ty);
        let malloc = self.libc("malloc");
        let heap = self
            .module
            .build_call(malloc, vec![Value::const_int(Ty::I64, i128::from(size))]);

        for (field_name, field_expr) in fields {
            let info = self
                .struct_infos
                .values()
                .find(|info| info.id == id)
                .expect("struct info registered");
            let index = info
                .fields
                .iter()
                .position(|(f, _)| f == field_name)
                .ok_or_else(|| {
                    self.err(
                        format!("struct '{name}' has no field '{field_name}'"),
                        field_expr.span,
                    )
                })?;
            let field_logical = info.fields[index].1.clone();

            let value = self.lower_expr(field_expr)?;
            let storage = self.storage_ty(&field_logical);
            let value = self.adapt_int(value, &storage);
            let field_ptr =
                self.module
                    .build_struct_gep(struct_ty.clone(), heap.clone(), index as u32);
            self.module.build_store(value, field_ptr);
        }

        Ok(heap)
    }

    /// `E::V(args)`: build the `{ tag, payload }` record, payload stored as
    /// a sign-extended/truncated i64 bit-bag.
    fn lower_enum_variant(
        &mut self,
        enum_name: &str,
        variant: &str,
        args: &'a [Expr],
        span: Span,
    ) -> Result<Value> {
        if !self.enum_infos.contains_key(enum_name) {
            // Cross-module enum: importing resolves it into enum_infos.
            let named = Type::new(
                TypeKind::Named { name: enum_name.to_string(), generic_args: Vec::new() },
                span,
            );
            self.resolve_type(&named)?;
        }
        let info = self
            .enum_infos
            .get(enum_name)
            .ok_or_else(|| self.err(format!("unknown enum '{enum_name}'"), span))?;
        let (tag, _) = info.ordinal(variant).ok_or_else(|| {
            self.err(format!("enum '{enum_name}' has no variant '{variant}'"), span)
        })?;

        let record = enum_record();
        let slot = self.module.build_alloca(record.clone());

        let tag_ptr = self.module.build_struct_gep(record.clone(), slot.clone(), 0);
        self.module
            .build_store(Value::const_int(Ty::I32, tag), tag_ptr);

        if let Some(arg) = args.first() {
            let value = self.lower_expr(arg)?;
            if !value.ty.is_int() {
                return Err(self.err(
                    "enum payloads are stored in an integer bit-bag; only integer \
                     associated values are supported",
                    arg.span,
                ));
            }
            let widened = self.module.build_sext_or_trunc(value, Ty::I64);
            let payload_ptr = self.module.build_struct_gep(record.clone(), slot.clone(), 1);
            self.module.build_store(widened, payload_ptr);
        }

        Ok(self.module.build_load(record, slot))
    }

    // ========================================================================
    // If-expressions and casts
    // ========================================================================

    /// `if cond { a } else { b }`: a diamond merging through a phi. Both
    /// branches must produce the same type.
    fn lower_if_expr(
        &mut self,
        condition: &'a Expr,
        then_expr: &'a Expr,
        else_expr: &'a Expr,
        span: Span,
    ) -> Result<Value> {
        let func = self
            .current_function
            .ok_or_else(|| self.err("expression outside of a function", span))?;

        let cond = self.lower_expr(condition)?;
        let cond = self.to_condition(cond, condition.span)?;

        let then_bb = self.module.append_block(func, "if_then");
        let else_bb = self.module.append_block(func, "if_else");
        let merge_bb = self.module.append_block(func, "if_merge");
        self.module.build_cond_br(cond, then_bb, else_bb);

        self.module.position_at_end(func, then_bb);
        let then_val = self.lower_expr(then_expr)?;
        let then_end = self.module.insert_point().expect("positioned").1;
        self.module.build_br(merge_bb);

        self.module.position_at_end(func, else_bb);
        let else_val = self.lower_expr(else_expr)?;
        let else_end = self.module.insert_point().expect("positioned").1;
        self.module.build_br(merge_bb);

        if then_val.ty != else_val.ty {
            return Err(self.err(
                "if expression branches must have the same type",
                span,
            ));
        }

        self.module.position_at_end(func, merge_bb);
        let ty = then_val.ty.clone();
        Ok(self
            .module
            .build_phi(ty, vec![(then_val, then_end), (else_val, else_end)]))
    }

    /// `e as T`: sext/trunc between integers, signed conversions between
    /// integers and floats, ext/trunc between floats, identity otherwise.
    fn lower_cast(&mut self, value: &'a Expr, target: &'a Type, span: Span) -> Result<Value> {
        let val = self.lower_expr(value)?;
        let target_logical = self.resolve_type(target)?;
        let target_ty = self.storage_ty(&target_logical);

        if val.ty == target_ty {
            return Ok(val);
        }

        let source = val.ty.clone();
        let result = match (source, target_ty.clone()) {
            (Ty::Int(from), Ty::Int(to)) => {
                if from < to {
                    self.module.build_cast(CastOp::Sext, val, target_ty)
                } else {
                    self.module.build_cast(CastOp::Trunc, val, target_ty)
                }
            }
            (Ty::Int(_), t) if t.is_float() => {
                self.module.build_cast(CastOp::SiToFp, val, target_ty)
            }
            (f, Ty::Int(_)) if f.is_float() => {
                self.module.build_cast(CastOp::FpToSi, val, target_ty)
            }
            (Ty::F32, Ty::F64) => self.module.build_cast(CastOp::FpExt, val, target_ty),
            (Ty::F64, Ty::F32) => self.module.build_cast(CastOp::FpTrunc, val, target_ty),
            _ => {
                return Err(self.err(
                    "unsupported cast; 'as' converts between integer and float types",
                    span,
                ))
            }
        };
        Ok(result)
    }

    // ========================================================================
    // Optionals: ok / err / ?
    // ========================================================================

    /// `ok(e)`: `{ tag: 0, value: e, error_msg: null }` on the heap.
    fn lower_ok(&mut self, inner: &'a Expr) -> Result<Value> {
        let value = self.lower_expr(inner)?;
        let record = Ty::Record(vec![Ty::I32, value.ty.clone(), Ty::Ptr]);
        self.ensure_optional_enum(&record);
        self.build_optional(record, 0, value, Value::null_ptr())
    }

    /// `err(m)`: `{ tag: 1, value: zero-of-T, error_msg: m }`; `T` comes
    /// from the enclosing function's `T?` return type.
    fn lower_err(&mut self, message: &'a Expr, span: Span) -> Result<Value> {
        let msg = self.lower_expr(message)?;

        let ret = self.current_return_type.clone().ok_or_else(|| {
            self.err("'err' is only valid in a function returning 'T?'", span)
        })?;
        let TypeKind::Optional(inner) = &ret.kind else {
            return Err(self.err("'err' is only valid in a function returning 'T?'", span));
        };
        let inner = self.substitute_type(inner);
        let inner_logical = self.resolve_type(&inner)?;
        let value_ty = self.storage_ty(&inner_logical);

        let record = Ty::Record(vec![Ty::I32, value_ty.clone(), Ty::Ptr]);
        self.ensure_optional_enum(&record);
        let zero = Value::zero(&value_ty);
        self.build_optional(record, 1, zero, msg)
    }

    /// Stack-builds an Optional record, then copies it to the heap and
    /// returns the heap pointer, the uniform representation of `T?`.
    fn build_optional(
        &mut self,
        record: Ty,
        tag: i128,
        value: Value,
        error_msg: Value,
    ) -> Result<Value> {
        self.last_optional_record = Some(record.clone());
        let slot = self.module.build_alloca(record.clone());

        let tag_ptr = self.module.build_struct_gep(record.clone(), slot.clone(), 0);
        self.module.build_store(Value::const_int(Ty::I32, tag), tag_ptr);
        let value_ptr = self.module.build_struct_gep(record.clone(), slot.clone(), 1);
        self.module.build_store(value, value_ptr);
        let error_ptr = self.module.build_struct_gep(record.clone(), slot.clone(), 2);
        self.module.build_store(error_msg, error_ptr);

        let size = self.module.alloc_size(&record);
        let malloc = self.libc("malloc");
        let memcpy = self.libc("memcpy");
        let heap = self
            .module
            .build_call(malloc, vec![Value::const_int(Ty::I64, i128::from(size))]);
        self.module.build_call(
            memcpy,
            vec![heap.clone(), slot, Value::const_int(Ty::I64, i128::from(size))],
        );
        Ok(heap)
    }

    /// `e?`: on `tag == Error` return the whole record to the caller; on
    /// `Value` continue with the extracted payload.
    fn lower_try(&mut self, inner: &'a Expr, span: Span) -> Result<Value> {
        let func = self
            .current_function
            .ok_or_else(|| self.err("expression outside of a function", span))?;

        let opt_ptr = self.lower_expr(inner)?;
        if !opt_ptr.ty.is_ptr() {
            return Err(self.err("'?' can only be applied to Optional values", span));
        }
        let record = self.optional_record_of(inner, span)?;

        // The enclosing function must itself return an Optional.
        let ret_is_optional = matches!(
            self.current_return_type.as_ref().map(|t| &t.kind),
            Some(TypeKind::Optional(_))
        );
        if !ret_is_optional {
            return Err(self
                .err(
                    "'?' requires the enclosing function to return 'T?'",
                    span,
                )
                .with_hint("change the return type to 'T?' or handle the error with 'is'"));
        }

        let error_bb = self.module.append_block(func, "try_error");
        let value_bb = self.module.append_block(func, "try_value");

        let tag_ptr = self
            .module
            .build_struct_gep(record.clone(), opt_ptr.clone(), 0);
        let tag = self.module.build_load(Ty::I32, tag_ptr);
        let is_error = self
            .module
            .build_icmp(IcmpPred::Eq, tag, Value::const_int(Ty::I32, 1));
        self.module.build_cond_br(is_error, error_bb, value_bb);

        // Error: propagate the identical record (pointer) to the caller.
        self.module.position_at_end(func, error_bb);
        self.module.build_ret(opt_ptr.clone());

        // Value: extract and continue.
        self.module.position_at_end(func, value_bb);
        let Ty::Record(fields) = &record else { unreachable!() };
        let value_ty = fields[1].clone();
        let value_ptr = self.module.build_struct_gep(record.clone(), opt_ptr, 1);
        Ok(self.module.build_load(value_ty, value_ptr))
    }

    /// The Optional record type behind an expression, needed to GEP into
    /// it. Identifiers carry it in `variable_types`; calls recover it from
    /// the callee's declared return type; otherwise the enclosing `T?`
    /// return supplies it.
    pub(crate) fn optional_record_of(&mut self, expr: &'a Expr, span: Span) -> Result<Ty> {
        if let ExprKind::Identifier(name) = &expr.kind {
            if let Some(ty) = self.variable_types.get(name) {
                if is_optional_record(ty) {
                    return Ok(ty.clone());
                }
            }
        }

        if let ExprKind::Call { callee, .. } = &expr.kind {
            if let ExprKind::Identifier(name) = &callee.kind {
                if let Some(decl) = self.function_decls.get(name) {
                    if let Some(Type { kind: TypeKind::Optional(inner), .. }) =
                        &decl.return_type
                    {
                        let inner = (**inner).clone();
                        return self.optional_record(&inner);
                    }
                }
            }
        }

        if matches!(expr.kind, ExprKind::Ok(_) | ExprKind::Err(_)) {
            if let Some(record) = self.last_optional_record.clone() {
                return Ok(record);
            }
        }

        if let Some(Type { kind: TypeKind::Optional(inner), .. }) =
            self.current_return_type.clone().as_ref()
        {
            return self.optional_record(inner);
        }

        Err(self.err("'?' can only be applied to Optional values", span))
    }

    /// A concrete struct by name, or the single instantiated instance of a
    /// generic struct with that base name.
    fn unique_struct_instance(&self, name: &str) -> Option<pawc_llir::StructId> {
        if let Some(info) = self.struct_infos.get(name) {
            return Some(info.id);
        }
        if !self.generic_structs.contains_key(name) {
            return None;
        }
        let prefix = format!("{name}_");
        let mut instances = self
            .struct_infos
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, info)| info.id);
        let first = instances.next()?;
        // Ambiguous with several instances; the caller reports the error.
        instances.next().is_none().then_some(first)
    }

    /// Registers the virtual `Optional { Value(T), Error(string) }` enum on
    /// first use, so `is` and `match` share the enum lowering path.
    pub(crate) fn ensure_optional_enum(&mut self, record: &Ty) {
        if self.enum_infos.contains_key("Optional") {
            return;
        }
        let payload = match record {
            Ty::Record(fields) => fields.get(1).cloned(),
            _ => None,
        };
        self.enum_infos.insert(
            "Optional".to_string(),
            super::EnumInfo {
                variants: vec![
                    super::VariantInfo { name: "Value".to_string(), payload },
                    super::VariantInfo { name: "Error".to_string(), payload: Some(Ty::Ptr) },
                ],
            },
        );
    }
}
