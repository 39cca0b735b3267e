//! Instruction kinds and operators.

use crate::module::{BlockId, FuncId};
use crate::types::Ty;
use crate::value::Value;

/// Integer binary operators. Division and remainder are signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    And,
    Or,
    Xor,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
        }
    }
}

/// Signed integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl IcmpPred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            IcmpPred::Eq => "eq",
            IcmpPred::Ne => "ne",
            IcmpPred::Slt => "slt",
            IcmpPred::Sle => "sle",
            IcmpPred::Sgt => "sgt",
            IcmpPred::Sge => "sge",
        }
    }
}

/// Value conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    /// Sign-extend to a wider integer.
    Sext,
    /// Truncate to a narrower integer.
    Trunc,
    FpExt,
    FpTrunc,
    SiToFp,
    FpToSi,
    /// Pointer-preserving bit cast.
    Bitcast,
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::Sext => "sext",
            CastOp::Trunc => "trunc",
            CastOp::FpExt => "fpext",
            CastOp::FpTrunc => "fptrunc",
            CastOp::SiToFp => "sitofp",
            CastOp::FpToSi => "fptosi",
            CastOp::Bitcast => "bitcast",
        }
    }
}

/// An instruction together with its result type ([`Ty::Void`] when the
/// instruction produces no value).
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub kind: InstKind,
    pub ty: Ty,
}

impl Inst {
    pub fn has_result(&self) -> bool {
        self.ty != Ty::Void && !self.kind.is_terminator()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Binary { op: BinOp, lhs: Value, rhs: Value },
    Icmp { pred: IcmpPred, lhs: Value, rhs: Value },
    /// `sub 0, x` in printed form.
    Neg { operand: Value },
    /// `xor x, -1` in printed form.
    Not { operand: Value },
    Cast { op: CastOp, operand: Value },
    /// Stack slot of the given type; result is a pointer.
    Alloca { ty: Ty },
    Load { ty: Ty, ptr: Value },
    Store { value: Value, ptr: Value },
    /// `getelementptr` into a struct or record: fixed field index.
    StructGep { struct_ty: Ty, ptr: Value, index: u32 },
    /// `getelementptr` into a fixed array: leading zero index plus element index.
    ArrayGep { array_ty: Ty, ptr: Value, index: Value },
    /// Raw pointer arithmetic over elements of `elem_ty`.
    Gep { elem_ty: Ty, ptr: Value, index: Value },
    Call { func: FuncId, args: Vec<Value> },
    Ret { value: Option<Value> },
    Br { dest: BlockId },
    CondBr { cond: Value, then_dest: BlockId, else_dest: BlockId },
    Switch { value: Value, default: BlockId, cases: Vec<(i128, BlockId)> },
    Phi { incomings: Vec<(Value, BlockId)> },
}

impl InstKind {
    /// True for instructions that end a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Ret { .. }
                | InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Switch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminators_are_recognized() {
        assert!(InstKind::Ret { value: None }.is_terminator());
        assert!(InstKind::Br { dest: BlockId(0) }.is_terminator());
        assert!(!InstKind::Alloca { ty: Ty::I32 }.is_terminator());
    }

    #[test]
    fn store_has_no_result() {
        let inst = Inst {
            kind: InstKind::Store {
                value: Value::const_int(Ty::I32, 1),
                ptr: Value::null_ptr(),
            },
            ty: Ty::Void,
        };
        assert!(!inst.has_result());
    }
}
