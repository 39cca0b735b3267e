//! Statement lowering: let bindings, control flow, and loops.
//!
//! Blocks stop lowering after a terminator (`return`, `break`,
//! `continue`), so unreachable trailing statements never produce IR in a
//! terminated basic block.

use pawc_base::{Result, Span};
use pawc_llir::{IcmpPred, Ty, Value};
use pawc_syntax::ast::{
    Expr, ExprKind, LoopKind, PatternKind, Stmt, StmtKind, Type, TypeKind,
};

use super::types::is_optional_record;
use super::{Lowerer, Scrutinee};

impl<'a, 'sym> Lowerer<'a, 'sym> {
    pub(crate) fn lower_stmt(&mut self, stmt: &'a Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Let { name, mutable, ty, init } => {
                self.lower_let(name, *mutable, ty.as_ref(), init.as_ref(), stmt.span)
            }
            StmtKind::Return(value) => self.lower_return(value.as_ref(), stmt.span),
            StmtKind::If { condition, then_branch, else_branch } => {
                self.lower_if(condition, then_branch, else_branch.as_deref(), stmt.span)
            }
            StmtKind::Loop { kind, body } => self.lower_loop(kind, body, stmt.span),
            StmtKind::Break => {
                let (_, break_target) = self.loop_stack.last().copied().ok_or_else(|| {
                    self.err("'break' outside of a loop", stmt.span)
                })?;
                self.module.build_br(break_target);
                Ok(())
            }
            StmtKind::Continue => {
                let (continue_target, _) = self.loop_stack.last().copied().ok_or_else(|| {
                    self.err("'continue' outside of a loop", stmt.span)
                })?;
                self.module.build_br(continue_target);
                Ok(())
            }
            StmtKind::Block(statements) => self.lower_block(statements),
            StmtKind::Expression(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            StmtKind::Import { .. } => Ok(()),
            StmtKind::Function(_)
            | StmtKind::Struct(_)
            | StmtKind::Enum(_)
            | StmtKind::TypeAlias { .. }
            | StmtKind::Extern(_)
            | StmtKind::Impl { .. } => Err(self.err(
                "declarations are only allowed at the top level of a module",
                stmt.span,
            )),
        }
    }

    pub(crate) fn lower_block(&mut self, statements: &'a [Stmt]) -> Result<()> {
        for stmt in statements {
            if self.module.current_block_terminated() {
                // Unreachable after return/break/continue.
                break;
            }
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    // ========================================================================
    // let
    // ========================================================================

    fn lower_let(
        &mut self,
        name: &str,
        mutable: bool,
        ty: Option<&'a Type>,
        init: Option<&'a Expr>,
        span: Span,
    ) -> Result<()> {
        match ty {
            Some(declared) => {
                let declared = self.substitute_type(declared);
                self.lower_typed_let(name, &declared, init, span)?;
            }
            None => self.lower_inferred_let(name, init, span)?,
        }
        if mutable {
            self.mutable_vars.insert(name.to_string());
        }
        Ok(())
    }

    fn lower_typed_let(
        &mut self,
        name: &str,
        declared: &Type,
        init: Option<&'a Expr>,
        span: Span,
    ) -> Result<()> {
        match &declared.kind {
            TypeKind::Array { element, size } => {
                // A missing length comes from the initializer.
                let length = match size {
                    Some(n) => *n,
                    None => match init.map(|e| &e.kind) {
                        Some(ExprKind::ArrayLiteral(elements)) => elements.len(),
                        _ => {
                            return Err(self.err(
                                "array length can only be inferred from an array-literal \
                                 initializer",
                                span,
                            ))
                        }
                    },
                };
                let elem_logical = self.resolve_type(element)?;
                let elem = self.storage_ty(&elem_logical);
                let array_ty = Ty::Array(Box::new(elem.clone()), length as u64);

                let slot = self.module.build_alloca(array_ty.clone());
                self.named_values.insert(name.to_string(), slot.clone());
                self.variable_types.insert(name.to_string(), array_ty.clone());

                match init.map(|e| (&e.kind, e)) {
                    Some((ExprKind::ArrayLiteral(elements), _)) => {
                        self.fill_array(&array_ty, &elem, slot, elements)
                    }
                    Some((_, expr)) => Err(self.err(
                        "array variables must be initialized with an array literal",
                        expr.span,
                    )),
                    None => Ok(()),
                }
            }
            TypeKind::Optional(_) => {
                let record = self.resolve_type(declared)?;
                let slot = self.module.build_alloca(Ty::Ptr);
                self.named_values.insert(name.to_string(), slot.clone());
                self.variable_types.insert(name.to_string(), record);
                if let Some(expr) = init {
                    let value = self.lower_expr(expr)?;
                    if !value.ty.is_ptr() {
                        return Err(self.err(
                            "Optional values are represented as pointers",
                            expr.span,
                        ));
                    }
                    self.module.build_store(value, slot);
                }
                Ok(())
            }
            _ => {
                let logical = self.resolve_type(declared)?;
                match &logical {
                    Ty::Struct(_) => {
                        // Struct slot holds a heap pointer.
                        let slot = self.module.build_alloca(Ty::Ptr);
                        self.named_values.insert(name.to_string(), slot.clone());
                        self.variable_types.insert(name.to_string(), logical.clone());
                        if let Some(expr) = init {
                            let value = self.lower_expr(expr)?;
                            let value = self.spill_struct_value(value);
                            self.module.build_store(value, slot);
                        }
                        Ok(())
                    }
                    other => {
                        let storage = self.storage_ty(other);
                        let slot = self.module.build_alloca(storage.clone());
                        self.named_values.insert(name.to_string(), slot.clone());
                        self.variable_types.insert(name.to_string(), logical.clone());
                        if let Some(expr) = init {
                            let value = self.lower_expr(expr)?;
                            let value = self.adapt_int(value, &storage);
                            self.module.build_store(value, slot);
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    fn lower_inferred_let(
        &mut self,
        name: &str,
        init: Option<&'a Expr>,
        span: Span,
    ) -> Result<()> {
        let Some(expr) = init else {
            // No type, no initializer: an i32 slot.
            let slot = self.module.build_alloca(Ty::I32);
            self.named_values.insert(name.to_string(), slot);
            self.variable_types.insert(name.to_string(), Ty::I32);
            return Ok(());
        };

        if let ExprKind::ArrayLiteral(_) = &expr.kind {
            return Err(self.err(
                "array literals need a declared element type, e.g. 'let xs: [i32] = …'",
                span,
            ));
        }

        let value = self.lower_expr(expr)?;
        let logical = self.infer_init_logical(expr, &value);

        match &logical {
            Ty::Struct(_) => {
                let value = self.spill_struct_value(value);
                let slot = self.module.build_alloca(Ty::Ptr);
                self.module.build_store(value, slot.clone());
                self.named_values.insert(name.to_string(), slot);
                self.variable_types.insert(name.to_string(), logical.clone());
            }
            ty if is_optional_record(ty) => {
                let slot = self.module.build_alloca(Ty::Ptr);
                self.module.build_store(value, slot.clone());
                self.named_values.insert(name.to_string(), slot);
                self.variable_types.insert(name.to_string(), logical.clone());
            }
            _ => {
                let slot = self.module.build_alloca(value.ty.clone());
                self.module.build_store(value.clone(), slot.clone());
                self.named_values.insert(name.to_string(), slot);
                self.variable_types.insert(name.to_string(), value.ty);
            }
        }
        Ok(())
    }

    /// Best-effort logical type of an untyped initializer: struct literals
    /// and struct-returning calls keep their struct identity, Optional
    /// producers keep their record, everything else is its value type.
    fn infer_init_logical(&mut self, expr: &'a Expr, value: &Value) -> Ty {
        match &expr.kind {
            ExprKind::StructLiteral { name, .. } => self
                .struct_infos
                .get(name)
                .map(|info| Ty::Struct(info.id))
                .unwrap_or(Ty::Ptr),
            ExprKind::Ok(_) | ExprKind::Err(_) => self
                .last_optional_record
                .clone()
                .unwrap_or_else(|| value.ty.clone()),
            ExprKind::Call { callee, .. } => {
                if let ExprKind::Identifier(fn_name) = &callee.kind {
                    // A struct's associated function or method result.
                    let owner = self.struct_infos.iter().find_map(|(_, info)| {
                        info.methods
                            .values()
                            .any(|m| m == fn_name)
                            .then_some(info.id)
                    });
                    if let Some(id) = owner {
                        if value.ty.is_ptr() || matches!(value.ty, Ty::Struct(_)) {
                            return Ty::Struct(id);
                        }
                    }
                    // A plain function with a declared struct/Optional return.
                    if let Some(decl) = self.function_decls.get(fn_name) {
                        if let Some(ret) = decl.return_type.clone() {
                            match &ret.kind {
                                TypeKind::Named { .. } | TypeKind::Optional(_) => {
                                    if let Ok(logical) = self.resolve_type(&ret) {
                                        return logical;
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
                value.ty.clone()
            }
            _ => value.ty.clone(),
        }
    }

    /// Associated functions return structs by value; spill such values so
    /// the variable slot can hold a pointer like every other struct.
    fn spill_struct_value(&mut self, value: Value) -> Value {
        if value.ty.is_ptr() {
            return value;
        }
        let slot = self.module.build_alloca(value.ty.clone());
        self.module.build_store(value, slot.clone());
        slot
    }

    fn fill_array(
        &mut self,
        array_ty: &Ty,
        elem: &Ty,
        slot: Value,
        elements: &'a [Expr],
    ) -> Result<()> {
        for (i, element) in elements.iter().enumerate() {
            let value = self.lower_expr(element)?;
            let value = self.adapt_int(value, elem);
            let index = Value::const_int(Ty::I64, i as i128);
            let elem_ptr = self
                .module
                .build_array_gep(array_ty.clone(), slot.clone(), index);
            self.module.build_store(value, elem_ptr);
        }
        Ok(())
    }

    // ========================================================================
    // return
    // ========================================================================

    fn lower_return(&mut self, value: Option<&'a Expr>, span: Span) -> Result<()> {
        let func = self
            .current_function
            .ok_or_else(|| self.err("'return' outside of a function", span))?;
        let ret_ty = self.module.func(func).ret_ty().clone();

        match value {
            None => {
                if ret_ty != Ty::Void {
                    return Err(self.err("this function must return a value", span));
                }
                self.module.build_ret_void();
            }
            Some(expr) => {
                if ret_ty == Ty::Void {
                    return Err(self.err("cannot return a value from a void function", span));
                }
                let mut val = self.lower_expr(expr)?;
                // Associated functions return the struct value itself:
                // dereference the heap pointer produced by literals.
                if ret_ty.is_aggregate() && val.ty.is_ptr() && !is_optional_record(&ret_ty) {
                    val = self.module.build_load(ret_ty.clone(), val);
                }
                let val = self.adapt_int(val, &ret_ty);
                self.module.build_ret(val);
            }
        }
        Ok(())
    }

    // ========================================================================
    // if
    // ========================================================================

    fn lower_if(
        &mut self,
        condition: &'a Expr,
        then_branch: &'a Stmt,
        else_branch: Option<&'a Stmt>,
        span: Span,
    ) -> Result<()> {
        let func = self
            .current_function
            .ok_or_else(|| self.err("'if' outside of a function", span))?;

        // `if (v is E::V(x))` introduces `x` in the then branch only. The
        // scrutinee pointer is computed once and reused for the binding.
        let mut binding_source = None;
        let cond = match &condition.kind {
            ExprKind::Is { value, pattern } => match &pattern.kind {
                PatternKind::EnumVariant { enum_name, variant, bindings }
                    if !bindings.is_empty() =>
                {
                    let scrutinee = self.lower_scrutinee(value, condition.span)?;
                    let Scrutinee::Record { ptr, record } = scrutinee else {
                        return Err(self.err(
                            "'is' requires an enum or Optional value",
                            condition.span,
                        ));
                    };
                    let cond = self.lower_is_test(
                        enum_name.as_deref(),
                        variant,
                        &ptr,
                        &record,
                        condition.span,
                    )?;
                    binding_source =
                        Some((enum_name.as_deref(), variant.as_str(), bindings, ptr, record));
                    cond
                }
                _ => {
                    let value = self.lower_expr(condition)?;
                    self.to_condition(value, condition.span)?
                }
            },
            _ => {
                let value = self.lower_expr(condition)?;
                self.to_condition(value, condition.span)?
            }
        };

        let then_bb = self.module.append_block(func, "then");
        let merge_bb = self.module.append_block(func, "ifcont");
        let else_bb = if else_branch.is_some() {
            let else_bb = self.module.append_block(func, "else");
            self.module.build_cond_br(cond, then_bb, else_bb);
            Some(else_bb)
        } else {
            self.module.build_cond_br(cond, then_bb, merge_bb);
            None
        };

        self.module.position_at_end(func, then_bb);
        let bound = match binding_source {
            Some((enum_name, variant, bindings, ptr, record)) => {
                self.bind_payload(enum_name, variant, bindings, ptr, record, condition.span)?
            }
            None => None,
        };
        self.lower_stmt(then_branch)?;
        if !self.module.current_block_terminated() {
            self.module.build_br(merge_bb);
        }
        // The else branch must not see the binding.
        if let Some(name) = bound {
            self.named_values.remove(&name);
            self.variable_types.remove(&name);
        }

        if let (Some(else_bb), Some(else_stmt)) = (else_bb, else_branch) {
            self.module.position_at_end(func, else_bb);
            self.lower_stmt(else_stmt)?;
            if !self.module.current_block_terminated() {
                self.module.build_br(merge_bb);
            }
        }

        self.module.position_at_end(func, merge_bb);
        Ok(())
    }

    // ========================================================================
    // loops
    // ========================================================================

    fn lower_loop(&mut self, kind: &'a LoopKind, body: &'a Stmt, span: Span) -> Result<()> {
        let func = self
            .current_function
            .ok_or_else(|| self.err("'loop' outside of a function", span))?;

        match kind {
            LoopKind::Infinite | LoopKind::Condition(_) => {
                let loop_bb = self.module.append_block(func, "loop");
                let after_bb = self.module.append_block(func, "afterloop");

                self.loop_stack.push((loop_bb, after_bb));
                self.module.build_br(loop_bb);
                self.module.position_at_end(func, loop_bb);

                if let LoopKind::Condition(cond_expr) = kind {
                    let cond = self.lower_expr(cond_expr)?;
                    let cond = self.to_condition(cond, cond_expr.span)?;
                    let body_bb = self.module.append_block(func, "loopbody");
                    self.module.build_cond_br(cond, body_bb, after_bb);
                    self.module.position_at_end(func, body_bb);
                }

                self.lower_stmt(body)?;
                if !self.module.current_block_terminated() {
                    self.module.build_br(loop_bb);
                }

                self.loop_stack.pop();
                self.module.position_at_end(func, after_bb);
                Ok(())
            }

            LoopKind::Range { var, start, end } => {
                let start_val = self.lower_expr(start)?;
                let start_val = self.adapt_int(start_val, &Ty::I32);
                let end_val = self.lower_expr(end)?;
                let end_val = self.adapt_int(end_val, &Ty::I32);

                let iter_slot = self.module.build_alloca(Ty::I32);
                self.module.build_store(start_val, iter_slot.clone());

                let header_bb = self.module.append_block(func, "rangeloop");
                let body_bb = self.module.append_block(func, "rangebody");
                let step_bb = self.module.append_block(func, "rangestep");
                let after_bb = self.module.append_block(func, "afterrange");

                let shadowed = self.shadow_variable(var, iter_slot.clone(), Ty::I32);
                // `continue` jumps to the increment, not the test, so the
                // iterator always advances.
                self.loop_stack.push((step_bb, after_bb));

                self.module.build_br(header_bb);
                self.module.position_at_end(func, header_bb);
                let iter = self.module.build_load(Ty::I32, iter_slot.clone());
                let cond = self.module.build_icmp(IcmpPred::Slt, iter, end_val);
                self.module.build_cond_br(cond, body_bb, after_bb);

                self.module.position_at_end(func, body_bb);
                self.lower_stmt(body)?;
                if !self.module.current_block_terminated() {
                    self.module.build_br(step_bb);
                }

                self.module.position_at_end(func, step_bb);
                let iter = self.module.build_load(Ty::I32, iter_slot.clone());
                let next = self.module.build_binary(
                    pawc_llir::BinOp::Add,
                    iter,
                    Value::const_int(Ty::I32, 1),
                );
                self.module.build_store(next, iter_slot);
                self.module.build_br(header_bb);

                self.loop_stack.pop();
                self.unshadow_variable(var, shadowed);
                self.module.position_at_end(func, after_bb);
                Ok(())
            }

            LoopKind::Iterator { var, iterable } => {
                let ExprKind::Identifier(array_name) = &iterable.kind else {
                    return Err(self.err(
                        "iterator loops require an array variable",
                        iterable.span,
                    ));
                };
                let array_slot = self
                    .named_values
                    .get(array_name)
                    .cloned()
                    .ok_or_else(|| {
                        self.err(format!("unknown variable '{array_name}'"), iterable.span)
                    })?;
                let Some(array_ty @ Ty::Array(_, _)) =
                    self.variable_types.get(array_name).cloned()
                else {
                    return Err(self.err(
                        format!("'{array_name}' is not a fixed-length array"),
                        iterable.span,
                    ));
                };
                let Ty::Array(elem, len) = &array_ty else { unreachable!() };
                let elem = (**elem).clone();
                let len = *len;

                let index_slot = self.module.build_alloca(Ty::I32);
                self.module
                    .build_store(Value::const_int(Ty::I32, 0), index_slot.clone());
                let elem_slot = self.module.build_alloca(elem.clone());

                let header_bb = self.module.append_block(func, "iterloop");
                let body_bb = self.module.append_block(func, "iterbody");
                let step_bb = self.module.append_block(func, "iterstep");
                let after_bb = self.module.append_block(func, "afteriter");

                let shadowed = self.shadow_variable(var, elem_slot.clone(), elem.clone());
                self.loop_stack.push((step_bb, after_bb));

                self.module.build_br(header_bb);
                self.module.position_at_end(func, header_bb);
                let index = self.module.build_load(Ty::I32, index_slot.clone());
                let cond = self.module.build_icmp(
                    IcmpPred::Slt,
                    index,
                    Value::const_int(Ty::I32, len as i128),
                );
                self.module.build_cond_br(cond, body_bb, after_bb);

                self.module.position_at_end(func, body_bb);
                let index = self.module.build_load(Ty::I32, index_slot.clone());
                let elem_ptr =
                    self.module
                        .build_array_gep(array_ty.clone(), array_slot.clone(), index);
                let element = self.module.build_load(elem.clone(), elem_ptr);
                self.module.build_store(element, elem_slot.clone());
                self.lower_stmt(body)?;
                if !self.module.current_block_terminated() {
                    self.module.build_br(step_bb);
                }

                self.module.position_at_end(func, step_bb);
                let index = self.module.build_load(Ty::I32, index_slot.clone());
                let next = self.module.build_binary(
                    pawc_llir::BinOp::Add,
                    index,
                    Value::const_int(Ty::I32, 1),
                );
                self.module.build_store(next, index_slot);
                self.module.build_br(header_bb);

                self.loop_stack.pop();
                self.unshadow_variable(var, shadowed);
                self.module.position_at_end(func, after_bb);
                Ok(())
            }
        }
    }

    /// Installs a loop variable, returning whatever it shadowed.
    fn shadow_variable(
        &mut self,
        name: &str,
        slot: Value,
        logical: Ty,
    ) -> (Option<Value>, Option<Ty>) {
        let old_value = self.named_values.insert(name.to_string(), slot);
        let old_ty = self.variable_types.insert(name.to_string(), logical);
        (old_value, old_ty)
    }

    fn unshadow_variable(&mut self, name: &str, shadowed: (Option<Value>, Option<Ty>)) {
        match shadowed.0 {
            Some(value) => {
                self.named_values.insert(name.to_string(), value);
            }
            None => {
                self.named_values.remove(name);
            }
        }
        match shadowed.1 {
            Some(ty) => {
                self.variable_types.insert(name.to_string(), ty);
            }
            None => {
                self.variable_types.remove(name);
            }
        }
    }
}
