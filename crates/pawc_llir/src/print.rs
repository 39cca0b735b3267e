//! Textual serialization of modules.
//!
//! The printed form follows LLVM assembly conventions (opaque `ptr`, named
//! values, `c"..."` string constants) so the emitted `.ll` artifacts can be
//! handed straight to the external toolchain. Instruction results are named
//! `%tN` in emission order and parameters `%argN`; block labels are
//! uniquified per function.

use std::fmt::Write as _;

use crate::inst::{BinOp, Inst, InstKind};
use crate::module::{Function, GlobalId, Linkage, Module};
use crate::types::Ty;
use crate::value::{Value, ValueKind};

impl Module {
    /// Renders the whole module as textual IR.
    pub fn print_ir(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; ModuleID = '{}'", self.name());
        let _ = writeln!(out, "source_filename = \"{}\"", self.name());

        if !self.structs.is_empty() {
            out.push('\n');
            for def in &self.structs {
                match &def.fields {
                    Some(fields) => {
                        let body = fields
                            .iter()
                            .map(|f| self.ty_str(f))
                            .collect::<Vec<_>>()
                            .join(", ");
                        let _ = writeln!(out, "%{} = type {{ {} }}", def.name, body);
                    }
                    None => {
                        let _ = writeln!(out, "%{} = type opaque", def.name);
                    }
                }
            }
        }

        if !self.globals.is_empty() {
            out.push('\n');
            for (i, global) in self.globals.iter().enumerate() {
                let bytes = global.data.as_bytes();
                let _ = writeln!(
                    out,
                    "@.str.{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
                    i,
                    bytes.len() + 1,
                    escape_bytes(bytes)
                );
            }
        }

        for (_, func) in self.functions() {
            out.push('\n');
            if func.is_declaration() {
                let _ = writeln!(
                    out,
                    "declare {} @{}({})",
                    self.ty_str(&func.ret),
                    func.name(),
                    self.signature_params(func)
                );
            } else {
                self.print_function(func, &mut out);
            }
        }

        out
    }

    /// Writes the textual IR to `path`.
    pub fn write_ir(&self, path: &std::path::Path) -> std::io::Result<()> {
        std::fs::write(path, self.print_ir())
    }

    fn signature_params(&self, func: &Function) -> String {
        let mut parts: Vec<String> = func.param_tys().iter().map(|t| self.ty_str(t)).collect();
        if func.is_varargs() {
            parts.push("...".to_string());
        }
        parts.join(", ")
    }

    fn print_function(&self, func: &Function, out: &mut String) {
        let linkage = match func.linkage {
            Linkage::External => "",
            Linkage::Internal => "internal ",
            Linkage::LinkOnceOdr => "linkonce_odr ",
        };
        let params = func
            .param_tys()
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{} %arg{}", self.ty_str(t), i))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            out,
            "define {}{} @{}({}) {{",
            linkage,
            self.ty_str(&func.ret),
            func.name(),
            params
        );

        let labels = block_labels(func);
        let names = result_names(func);

        for (bi, block) in func.blocks.iter().enumerate() {
            if bi > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "{}:", labels[bi]);
            for inst_id in &block.insts {
                let inst = &func.insts[inst_id.0 as usize];
                let text = self.inst_str(func, inst, &labels, &names);
                match &names[inst_id.0 as usize] {
                    Some(name) => {
                        let _ = writeln!(out, "  %{} = {}", name, text);
                    }
                    None => {
                        let _ = writeln!(out, "  {}", text);
                    }
                }
            }
        }
        out.push_str("}\n");
    }

    /// Renders one instruction, without the result assignment.
    fn inst_str(
        &self,
        func: &Function,
        inst: &Inst,
        labels: &[String],
        names: &[Option<String>],
    ) -> String {
        let val = |v: &Value| self.operand_str(v, names);
        let tyv = |v: &Value| format!("{} {}", self.ty_str(&v.ty), self.operand_str(v, names));

        match &inst.kind {
            InstKind::Binary { op, lhs, rhs } => {
                let mnemonic = if lhs.ty.is_float() {
                    match op {
                        BinOp::Add => "fadd",
                        BinOp::Sub => "fsub",
                        BinOp::Mul => "fmul",
                        BinOp::SDiv => "fdiv",
                        BinOp::SRem => "frem",
                        _ => op.mnemonic(),
                    }
                } else {
                    op.mnemonic()
                };
                format!("{} {}, {}", mnemonic, tyv(lhs), val(rhs))
            }
            InstKind::Icmp { pred, lhs, rhs } => {
                if lhs.ty.is_float() {
                    // Float comparisons print as ordered fcmp.
                    let fpred = match pred.mnemonic() {
                        "eq" => "oeq",
                        "ne" => "one",
                        "slt" => "olt",
                        "sle" => "ole",
                        "sgt" => "ogt",
                        _ => "oge",
                    };
                    format!("fcmp {} {}, {}", fpred, tyv(lhs), val(rhs))
                } else {
                    format!("icmp {} {}, {}", pred.mnemonic(), tyv(lhs), val(rhs))
                }
            }
            InstKind::Neg { operand } => {
                if operand.ty.is_float() {
                    format!("fneg {}", tyv(operand))
                } else {
                    format!("sub {} 0, {}", self.ty_str(&operand.ty), val(operand))
                }
            }
            InstKind::Not { operand } => format!("xor {}, -1", tyv(operand)),
            InstKind::Cast { op, operand } => {
                format!("{} {} to {}", op.mnemonic(), tyv(operand), self.ty_str(&inst.ty))
            }
            InstKind::Alloca { ty } => format!("alloca {}", self.ty_str(ty)),
            InstKind::Load { ty, ptr } => format!("load {}, {}", self.ty_str(ty), tyv(ptr)),
            InstKind::Store { value, ptr } => format!("store {}, {}", tyv(value), tyv(ptr)),
            InstKind::StructGep { struct_ty, ptr, index } => format!(
                "getelementptr inbounds {}, {}, i32 0, i32 {}",
                self.ty_str(struct_ty),
                tyv(ptr),
                index
            ),
            InstKind::ArrayGep { array_ty, ptr, index } => format!(
                "getelementptr inbounds {}, {}, i64 0, {}",
                self.ty_str(array_ty),
                tyv(ptr),
                tyv(index)
            ),
            InstKind::Gep { elem_ty, ptr, index } => format!(
                "getelementptr inbounds {}, {}, {}",
                self.ty_str(elem_ty),
                tyv(ptr),
                tyv(index)
            ),
            InstKind::Call { func: callee, args } => {
                let callee = self.func(*callee);
                let rendered_args = args.iter().map(tyv).collect::<Vec<_>>().join(", ");
                let callee_ty = if callee.is_varargs() {
                    format!("{} ({})", self.ty_str(callee.ret_ty()), self.signature_params(callee))
                } else {
                    self.ty_str(callee.ret_ty())
                };
                format!("call {} @{}({})", callee_ty, callee.name(), rendered_args)
            }
            InstKind::Ret { value: Some(v) } => format!("ret {}", tyv(v)),
            InstKind::Ret { value: None } => "ret void".to_string(),
            InstKind::Br { dest } => format!("br label %{}", labels[dest.0 as usize]),
            InstKind::CondBr { cond, then_dest, else_dest } => format!(
                "br {}, label %{}, label %{}",
                tyv(cond),
                labels[then_dest.0 as usize],
                labels[else_dest.0 as usize]
            ),
            InstKind::Switch { value, default, cases } => {
                let mut s = format!(
                    "switch {}, label %{} [\n",
                    tyv(value),
                    labels[default.0 as usize]
                );
                for (case, dest) in cases {
                    let _ = writeln!(
                        s,
                        "    {} {}, label %{}",
                        self.ty_str(&value.ty),
                        case,
                        labels[dest.0 as usize]
                    );
                }
                s.push_str("  ]");
                s
            }
            InstKind::Phi { incomings } => {
                let entries = incomings
                    .iter()
                    .map(|(v, block)| format!("[ {}, %{} ]", val(v), labels[block.0 as usize]))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("phi {} {}", self.ty_str(&inst.ty), entries)
            }
        }
    }

    fn operand_str(&self, value: &Value, names: &[Option<String>]) -> String {
        match &value.kind {
            ValueKind::ConstInt(v) => v.to_string(),
            ValueKind::ConstFloat(v) => {
                // Keep a decimal point so the constant parses as a float.
                let s = format!("{v:?}");
                if s.contains('.') || s.contains('e') {
                    s
                } else {
                    format!("{s}.0")
                }
            }
            ValueKind::NullPtr => "null".to_string(),
            ValueKind::GlobalString(GlobalId(i)) => format!("@.str.{i}"),
            ValueKind::Param(_, i) => format!("%arg{i}"),
            ValueKind::Inst(id) => match &names[id.0 as usize] {
                Some(name) => format!("%{name}"),
                None => "%<void>".to_string(),
            },
        }
    }

    /// Renders a type in assembly syntax.
    pub fn ty_str(&self, ty: &Ty) -> String {
        match ty {
            Ty::Void => "void".to_string(),
            Ty::Int(w) => format!("i{w}"),
            Ty::F32 => "float".to_string(),
            Ty::F64 => "double".to_string(),
            Ty::Ptr => "ptr".to_string(),
            Ty::Array(elem, n) => format!("[{} x {}]", n, self.ty_str(elem)),
            Ty::Struct(id) => format!("%{}", self.struct_name(*id)),
            Ty::Record(fields) => {
                let body = fields
                    .iter()
                    .map(|f| self.ty_str(f))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{ {body} }}")
            }
        }
    }
}

/// Uniquified labels for each block of a function, in block order.
fn block_labels(func: &Function) -> Vec<String> {
    let mut seen = std::collections::HashMap::new();
    func.blocks
        .iter()
        .map(|block| {
            let count = seen.entry(block.label.clone()).or_insert(0u32);
            let label = if *count == 0 {
                block.label.clone()
            } else {
                format!("{}{}", block.label, count)
            };
            *count += 1;
            label
        })
        .collect()
}

/// `tN` names for value-producing instructions, `None` for the rest.
fn result_names(func: &Function) -> Vec<Option<String>> {
    let mut names = vec![None; func.insts.len()];
    let mut next = 0u32;
    for block in &func.blocks {
        for inst_id in &block.insts {
            if func.insts[inst_id.0 as usize].has_result() {
                names[inst_id.0 as usize] = Some(format!("t{next}"));
                next += 1;
            }
        }
    }
    names
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'"' | b'\\' => {
                let _ = write!(out, "\\{b:02X}");
            }
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{b:02X}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::IcmpPred;
    use crate::module::Linkage;

    #[test]
    fn prints_simple_function() {
        let mut module = Module::new("main.paw");
        let main = module.declare_function("main", vec![], Ty::I32, false, Linkage::External);
        let entry = module.append_block(main, "entry");
        module.position_at_end(main, entry);
        let sum = module.build_binary(
            BinOp::Add,
            Value::const_int(Ty::I32, 2),
            Value::const_int(Ty::I32, 12),
        );
        module.build_ret(sum);

        let ir = module.print_ir();
        assert!(ir.contains("define i32 @main()"));
        assert!(ir.contains("%t0 = add i32 2, 12"));
        assert!(ir.contains("ret i32 %t0"));
    }

    #[test]
    fn prints_declaration_with_varargs() {
        let mut module = Module::new("m");
        module.declare_function("printf", vec![Ty::Ptr], Ty::I32, true, Linkage::External);
        let ir = module.print_ir();
        assert!(ir.contains("declare i32 @printf(ptr, ...)"));
    }

    #[test]
    fn prints_global_string_with_escapes() {
        let mut module = Module::new("m");
        module.global_string("hi\n");
        let ir = module.print_ir();
        assert!(ir.contains("[4 x i8] c\"hi\\0A\\00\""));
    }

    #[test]
    fn prints_struct_types_and_geps() {
        let mut module = Module::new("m");
        let point = module.create_struct("Point");
        module.set_struct_body(point, vec![Ty::I32, Ty::I32]);

        let f = module.declare_function("get_x", vec![Ty::Ptr], Ty::I32, false, Linkage::External);
        let entry = module.append_block(f, "entry");
        module.position_at_end(f, entry);
        let field = module.build_struct_gep(Ty::Struct(point), module.param(f, 0), 0);
        let loaded = module.build_load(Ty::I32, field);
        module.build_ret(loaded);

        let ir = module.print_ir();
        assert!(ir.contains("%Point = type { i32, i32 }"));
        assert!(ir.contains("getelementptr inbounds %Point, ptr %arg0, i32 0, i32 0"));
    }

    #[test]
    fn duplicate_block_labels_are_uniquified() {
        let mut module = Module::new("m");
        let f = module.declare_function("f", vec![], Ty::Void, false, Linkage::External);
        let a = module.append_block(f, "loop");
        let b = module.append_block(f, "loop");
        module.position_at_end(f, a);
        module.build_br(b);
        module.position_at_end(f, b);
        module.build_ret_void();

        let ir = module.print_ir();
        assert!(ir.contains("loop:"));
        assert!(ir.contains("loop1:"));
        assert!(ir.contains("br label %loop1"));
    }

    #[test]
    fn identity_cast_emits_no_instruction() {
        let mut module = Module::new("m");
        let f = module.declare_function("f", vec![Ty::I32], Ty::I32, false, Linkage::External);
        let entry = module.append_block(f, "entry");
        module.position_at_end(f, entry);
        let arg = module.param(f, 0);
        let same = module.build_sext_or_trunc(arg.clone(), Ty::I32);
        module.build_ret(same);

        let ir = module.print_ir();
        assert!(!ir.contains("sext"));
        assert!(!ir.contains("trunc"));
        assert!(ir.contains("ret i32 %arg0"));
    }

    #[test]
    fn float_comparison_prints_as_ordered_fcmp() {
        let mut module = Module::new("m");
        let f = module.declare_function("f", vec![Ty::F64, Ty::F64], Ty::I1, false, Linkage::External);
        let entry = module.append_block(f, "entry");
        module.position_at_end(f, entry);
        let cmp = module.build_icmp(IcmpPred::Slt, module.param(f, 0), module.param(f, 1));
        module.build_ret(cmp);

        let ir = module.print_ir();
        assert!(ir.contains("fcmp olt double %arg0, %arg1"));
    }

    #[test]
    fn prints_switch_and_phi() {
        let mut module = Module::new("m");
        let f = module.declare_function("f", vec![Ty::I32], Ty::I32, false, Linkage::External);
        let entry = module.append_block(f, "entry");
        let case0 = module.append_block(f, "case");
        let done = module.append_block(f, "done");
        module.position_at_end(f, entry);
        module.build_switch(module.param(f, 0), done, vec![(0, case0)]);
        module.position_at_end(f, case0);
        module.build_br(done);
        module.position_at_end(f, done);
        let phi = module.build_phi(
            Ty::I32,
            vec![
                (Value::const_int(Ty::I32, 1), case0),
                (Value::const_int(Ty::I32, 2), entry),
            ],
        );
        module.build_ret(phi);

        let ir = module.print_ir();
        assert!(ir.contains("switch i32 %arg0, label %done ["));
        assert!(ir.contains("i32 0, label %case"));
        assert!(ir.contains("phi i32 [ 1, %case ], [ 2, %entry ]"));
    }
}
