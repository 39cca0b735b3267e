//! Structural well-formedness checks.
//!
//! Run after each function is fully emitted, before the module is printed.
//! The checks catch lowering bugs early: blocks that fall off the end,
//! instructions appended after a terminator, and phis that are not grouped
//! at the head of their block.

use std::fmt;

use crate::inst::InstKind;
use crate::module::{FuncId, Module};

/// A verification failure, naming the offending function.
#[derive(Debug, Clone)]
pub struct VerifyError {
    pub function: String,
    pub message: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid IR in '{}': {}", self.function, self.message)
    }
}

impl std::error::Error for VerifyError {}

impl Module {
    /// Checks that a function's body is structurally sound. Declarations
    /// trivially pass.
    pub fn verify_function(&self, id: FuncId) -> Result<(), VerifyError> {
        let func = self.func(id);
        let fail = |message: String| {
            Err(VerifyError { function: func.name().to_string(), message })
        };

        if func.is_declaration() {
            return Ok(());
        }

        for (bi, block) in func.blocks.iter().enumerate() {
            let Some(last) = block.insts.last() else {
                return fail(format!("block {} ('{}') is empty", bi, block.label));
            };

            if !func.insts[last.0 as usize].kind.is_terminator() {
                return fail(format!(
                    "block {} ('{}') does not end in a terminator",
                    bi, block.label
                ));
            }

            let mut seen_non_phi = false;
            for (pos, inst_id) in block.insts.iter().enumerate() {
                let inst = &func.insts[inst_id.0 as usize];
                if inst.kind.is_terminator() && pos + 1 != block.insts.len() {
                    return fail(format!(
                        "block {} ('{}') has instructions after its terminator",
                        bi, block.label
                    ));
                }
                match &inst.kind {
                    InstKind::Phi { incomings } => {
                        if seen_non_phi {
                            return fail(format!(
                                "phi not at head of block {} ('{}')",
                                bi, block.label
                            ));
                        }
                        if incomings.is_empty() {
                            return fail("phi with no incoming values".to_string());
                        }
                    }
                    _ => seen_non_phi = true,
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Linkage;
    use crate::types::Ty;
    use crate::value::Value;

    #[test]
    fn declaration_verifies() {
        let mut module = Module::new("m");
        let f = module.declare_function("malloc", vec![Ty::I64], Ty::Ptr, false, Linkage::External);
        assert!(module.verify_function(f).is_ok());
    }

    #[test]
    fn unterminated_block_fails() {
        let mut module = Module::new("m");
        let f = module.declare_function("f", vec![], Ty::I32, false, Linkage::External);
        let entry = module.append_block(f, "entry");
        module.position_at_end(f, entry);
        module.build_binary(
            crate::inst::BinOp::Add,
            Value::const_int(Ty::I32, 1),
            Value::const_int(Ty::I32, 2),
        );

        let err = module.verify_function(f).unwrap_err();
        assert!(err.message.contains("terminator"));
    }

    #[test]
    fn terminated_block_passes() {
        let mut module = Module::new("m");
        let f = module.declare_function("f", vec![], Ty::I32, false, Linkage::External);
        let entry = module.append_block(f, "entry");
        module.position_at_end(f, entry);
        module.build_ret(Value::const_int(Ty::I32, 0));
        assert!(module.verify_function(f).is_ok());
    }

    #[test]
    fn phi_after_other_instruction_fails() {
        let mut module = Module::new("m");
        let f = module.declare_function("f", vec![], Ty::I32, false, Linkage::External);
        let entry = module.append_block(f, "entry");
        module.position_at_end(f, entry);
        let slot = module.build_alloca(Ty::I32);
        let phi = module.build_phi(Ty::I32, vec![(Value::const_int(Ty::I32, 1), entry)]);
        let _ = (slot, phi);
        module.build_ret(Value::const_int(Ty::I32, 0));

        let err = module.verify_function(f).unwrap_err();
        assert!(err.message.contains("phi"));
    }
}
