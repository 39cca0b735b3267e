//! `match` and `is` lowering.
//!
//! Enum scrutinees are taken by pointer; the loaded tag drives a switch
//! (`match`) or an equality test (`is`). Integer scrutinees get a plain
//! switch over literal cases. Payload bindings load the `i64` bit-bag and
//! truncate to the bound variable's declared type; Optionals use their own
//! record fields instead, which is the one place the virtual `Optional`
//! enum earns its keep.

use pawc_base::{Result, Span};
use pawc_llir::{IcmpPred, Ty, Value};
use pawc_syntax::ast::{Expr, ExprKind, MatchArm, Pattern, PatternKind};

use super::types::{enum_record, is_enum_record, is_optional_record};
use super::Lowerer;

/// How a scrutinee lowers: an enum/Optional record behind a pointer, or a
/// bare integer.
pub(crate) enum Scrutinee {
    Record { ptr: Value, record: Ty },
    Int(Value),
}

impl<'a, 'sym> Lowerer<'a, 'sym> {
    /// Lowers a match/is scrutinee. Enum values are spilled to a stack slot
    /// when they are not already addressable.
    pub(crate) fn lower_scrutinee(&mut self, expr: &'a Expr, span: Span) -> Result<Scrutinee> {
        if let ExprKind::Identifier(name) = &expr.kind {
            if let (Some(slot), Some(logical)) = (
                self.named_values.get(name).cloned(),
                self.variable_types.get(name).cloned(),
            ) {
                if is_enum_record(&logical) {
                    // The alloca itself points at the record.
                    return Ok(Scrutinee::Record { ptr: slot, record: logical });
                }
                if is_optional_record(&logical) {
                    let ptr = self.module.build_load(Ty::Ptr, slot);
                    return Ok(Scrutinee::Record { ptr, record: logical });
                }
            }
        }

        let value = self.lower_expr(expr)?;
        match value.ty.clone() {
            Ty::Int(_) => Ok(Scrutinee::Int(value)),
            record @ Ty::Record(_) => {
                let slot = self.module.build_alloca(record.clone());
                self.module.build_store(value, slot.clone());
                Ok(Scrutinee::Record { ptr: slot, record })
            }
            Ty::Ptr => {
                // A pointer with no variable info: an Optional produced by a
                // call or by `ok`/`err`.
                let record = self.optional_record_of(expr, span)?;
                Ok(Scrutinee::Record { ptr: value, record })
            }
            _ => Err(self.err("match requires an enum, Optional, or integer value", span)),
        }
    }

    /// Resolves which enum a variant pattern refers to. An explicit enum
    /// name wins; otherwise Optional scrutinees use the virtual `Optional`
    /// enum, and as a last resort every known enum is searched for the
    /// variant name.
    fn enum_for_pattern(
        &mut self,
        enum_name: Option<&str>,
        variant: &str,
        record: &Ty,
        span: Span,
    ) -> Result<String> {
        if let Some(name) = enum_name {
            if self.enum_infos.contains_key(name) {
                return Ok(name.to_string());
            }
            // A generic enum is matched through its mangled instances.
            let prefix = format!("{name}_");
            if let Some(instance) = self
                .enum_infos
                .keys()
                .find(|key| key.starts_with(&prefix))
                .cloned()
            {
                return Ok(instance);
            }
            return Err(self.err(format!("unknown enum '{name}'"), span));
        }
        if is_optional_record(record) {
            self.ensure_optional_enum(record);
            return Ok("Optional".to_string());
        }
        self.enum_infos
            .iter()
            .find(|(_, info)| info.variants.iter().any(|v| v.name == variant))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| self.err(format!("no enum has a variant named '{variant}'"), span))
    }

    // ========================================================================
    // match
    // ========================================================================

    pub(crate) fn lower_match(
        &mut self,
        value: &'a Expr,
        arms: &'a [MatchArm],
        span: Span,
    ) -> Result<Value> {
        let func = self
            .current_function
            .ok_or_else(|| self.err("'match' outside of a function", span))?;
        if arms.is_empty() {
            return Err(self.err("'match' needs at least one arm", span));
        }

        let scrutinee = self.lower_scrutinee(value, span)?;

        // The switch operand and, for record scrutinees, the pointer used
        // for payload extraction inside the arms.
        let (switch_value, record_ptr, record) = match &scrutinee {
            Scrutinee::Record { ptr, record } => {
                let tag_ptr = self
                    .module
                    .build_struct_gep(record.clone(), ptr.clone(), 0);
                let tag = self.module.build_load(Ty::I32, tag_ptr);
                (tag, Some(ptr.clone()), Some(record.clone()))
            }
            Scrutinee::Int(value) => (value.clone(), None, None),
        };

        let merge_bb = self.module.append_block(func, "match_end");
        let mut cases: Vec<(i128, pawc_llir::BlockId)> = Vec::new();
        let mut arm_blocks = Vec::new();
        let mut default_arm: Option<usize> = None;
        let mut covered = 0usize;
        let mut total_variants: Option<usize> = None;

        for (i, arm) in arms.iter().enumerate() {
            let block = self.module.append_block(func, "match_arm");
            arm_blocks.push(block);
            match &arm.pattern.kind {
                PatternKind::EnumVariant { enum_name, variant, .. } => {
                    let record_ty = record.clone().unwrap_or_else(enum_record);
                    let enum_name = self.enum_for_pattern(
                        enum_name.as_deref(),
                        variant,
                        &record_ty,
                        arm.pattern.span,
                    )?;
                    let info = &self.enum_infos[&enum_name];
                    total_variants.get_or_insert(info.variants.len());
                    let (tag, _) = info.ordinal(variant).ok_or_else(|| {
                        self.err(
                            format!("enum '{enum_name}' has no variant '{variant}'"),
                            arm.pattern.span,
                        )
                    })?;
                    cases.push((tag, block));
                    covered += 1;
                }
                PatternKind::Literal(lit) => {
                    let constant = literal_int(lit).ok_or_else(|| {
                        self.err("only integer and boolean literal patterns are supported here", arm.pattern.span)
                    })?;
                    cases.push((constant, block));
                }
                PatternKind::Wildcard | PatternKind::Identifier(_) => {
                    default_arm = Some(i);
                }
                PatternKind::Struct { .. } => {
                    return Err(self.err(
                        "struct patterns are not supported in 'match'",
                        arm.pattern.span,
                    ))
                }
            }
        }

        // Unmatched cases produce a zero value unless strict matching turns
        // that into an error.
        if self.strict_match && default_arm.is_none() {
            let exhaustive = total_variants.is_some_and(|total| covered >= total);
            if !exhaustive {
                return Err(self
                    .err("non-exhaustive 'match'", span)
                    .with_hint("add a '_' arm or cover every variant"));
            }
        }

        let default_bb = match default_arm {
            Some(i) => arm_blocks[i],
            None => self.module.append_block(func, "match_default"),
        };
        self.module.build_switch(switch_value, default_bb, cases);

        // Arms. The result slot is created at the first arm, once its type
        // is known, as an entry-block alloca so it dominates every store.
        let mut result_slot: Option<(Value, Ty)> = None;
        for (arm, block) in arms.iter().zip(&arm_blocks) {
            self.module.position_at_end(func, *block);

            let binding = match (&arm.pattern.kind, &record_ptr, &record) {
                (
                    PatternKind::EnumVariant { enum_name, variant, bindings },
                    Some(ptr),
                    Some(record_ty),
                ) if !bindings.is_empty() => self.bind_payload(
                    enum_name.as_deref(),
                    variant,
                    bindings,
                    ptr.clone(),
                    record_ty.clone(),
                    arm.pattern.span,
                )?,
                _ => None,
            };

            let value = self.lower_expr(&arm.expr)?;
            let (slot, result_ty) = match &result_slot {
                Some((slot, ty)) => (slot.clone(), ty.clone()),
                None => {
                    let ty = if value.ty == Ty::Void { Ty::I32 } else { value.ty.clone() };
                    let slot = self.module.build_entry_alloca(ty.clone());
                    result_slot = Some((slot.clone(), ty.clone()));
                    (slot, ty)
                }
            };
            let value = if value.ty == Ty::Void {
                Value::zero(&result_ty)
            } else {
                self.adapt_int(value, &result_ty)
            };
            self.module.build_store(value, slot);
            if !self.module.current_block_terminated() {
                self.module.build_br(merge_bb);
            }

            if let Some(name) = binding {
                self.named_values.remove(&name);
                self.variable_types.remove(&name);
            }
        }

        let (slot, result_ty) = result_slot.expect("at least one arm lowered");

        // Default: zero value when no wildcard arm supplied one.
        if default_arm.is_none() {
            self.module.position_at_end(func, default_bb);
            self.module.build_store(Value::zero(&result_ty), slot.clone());
            self.module.build_br(merge_bb);
        }

        self.module.position_at_end(func, merge_bb);
        Ok(self.module.build_load(result_ty, slot))
    }

    // ========================================================================
    // is
    // ========================================================================

    /// `v is Pattern` as a boolean. Identifier sub-pattern bindings are the
    /// enclosing `if` statement's job.
    pub(crate) fn lower_is(
        &mut self,
        value: &'a Expr,
        pattern: &'a Pattern,
        span: Span,
    ) -> Result<Value> {
        match &pattern.kind {
            PatternKind::Wildcard | PatternKind::Identifier(_) => {
                Ok(Value::const_int(Ty::I1, 1))
            }
            PatternKind::Literal(lit) => {
                let scrutinee = self.lower_expr(value)?;
                let constant = literal_int(lit).ok_or_else(|| {
                    self.err("only integer and boolean literal patterns are supported here", pattern.span)
                })?;
                let expected = Value::const_int(scrutinee.ty.clone(), constant);
                Ok(self.module.build_icmp(IcmpPred::Eq, scrutinee, expected))
            }
            PatternKind::EnumVariant { enum_name, variant, .. } => {
                let scrutinee = self.lower_scrutinee(value, span)?;
                let Scrutinee::Record { ptr, record } = scrutinee else {
                    return Err(self.err("'is' requires an enum or Optional value", span));
                };
                self.lower_is_test(enum_name.as_deref(), variant, &ptr, &record, span)
            }
            PatternKind::Struct { .. } => {
                Err(self.err("struct patterns are not supported in 'is'", pattern.span))
            }
        }
    }

    /// The tag test: `tag-of(ptr) == ordinal(variant)`.
    pub(crate) fn lower_is_test(
        &mut self,
        enum_name: Option<&str>,
        variant: &str,
        ptr: &Value,
        record: &Ty,
        span: Span,
    ) -> Result<Value> {
        let enum_name = self.enum_for_pattern(enum_name, variant, record, span)?;
        let (tag_value, _) = self.enum_infos[&enum_name]
            .ordinal(variant)
            .ok_or_else(|| {
                self.err(format!("enum '{enum_name}' has no variant '{variant}'"), span)
            })?;

        let tag_ptr = self.module.build_struct_gep(record.clone(), ptr.clone(), 0);
        let tag = self.module.build_load(Ty::I32, tag_ptr);
        Ok(self
            .module
            .build_icmp(IcmpPred::Eq, tag, Value::const_int(Ty::I32, tag_value)))
    }

    /// Binds the first identifier sub-pattern of a variant pattern to the
    /// extracted payload. Returns the bound name so the caller can drop it
    /// when the scope ends.
    pub(crate) fn bind_payload(
        &mut self,
        enum_name: Option<&str>,
        variant: &str,
        bindings: &'a [Pattern],
        ptr: Value,
        record: Ty,
        span: Span,
    ) -> Result<Option<String>> {
        let Some(PatternKind::Identifier(bind_name)) =
            bindings.first().map(|p| &p.kind)
        else {
            return Ok(None);
        };

        let enum_name = self.enum_for_pattern(enum_name, variant, &record, span)?;
        let (value, logical) = if enum_name == "Optional" {
            // Optional payloads live in the record itself.
            match variant {
                "Value" => {
                    let Ty::Record(fields) = &record else {
                        return Err(self.err("malformed Optional record", span));
                    };
                    let value_ty = fields[1].clone();
                    let value_ptr = self.module.build_struct_gep(record.clone(), ptr, 1);
                    (self.module.build_load(value_ty.clone(), value_ptr), value_ty)
                }
                "Error" => {
                    let error_ptr = self.module.build_struct_gep(record.clone(), ptr, 2);
                    (self.module.build_load(Ty::Ptr, error_ptr), Ty::Ptr)
                }
                other => {
                    return Err(self.err(
                        format!("enum 'Optional' has no variant '{other}'"),
                        span,
                    ))
                }
            }
        } else {
            // Plain enum: the payload sits in the i64 bit-bag, truncated to
            // the variant's declared type.
            let payload_ty = self.enum_infos[&enum_name]
                .ordinal(variant)
                .and_then(|(_, info)| info.payload.clone())
                .unwrap_or(Ty::I32);
            if !payload_ty.is_int() {
                return Err(self.err(
                    "enum payloads are stored in an integer bit-bag; only integer \
                     associated values can be bound",
                    span,
                ));
            }
            let payload_ptr = self.module.build_struct_gep(record.clone(), ptr, 1);
            let raw = self.module.build_load(Ty::I64, payload_ptr);
            let value = self.module.build_sext_or_trunc(raw, payload_ty.clone());
            (value, payload_ty)
        };

        let slot = self.module.build_alloca(value.ty.clone());
        self.module.build_store(value, slot.clone());
        self.named_values.insert(bind_name.clone(), slot);
        self.variable_types.insert(bind_name.clone(), logical);
        Ok(Some(bind_name.clone()))
    }
}

/// Integer value of a literal pattern, if it has one.
fn literal_int(expr: &Expr) -> Option<i128> {
    match &expr.kind {
        ExprKind::Integer(v) => Some(i128::from(*v)),
        ExprKind::Bool(v) => Some(i128::from(*v)),
        ExprKind::Char(c) => Some(*c as i128),
        _ => None,
    }
}
