//! Instructions, operands and terminators of the IR.

use std::fmt;

use strum::{Display, EnumString};

use crate::{
    instrument::Signature,
    ir::{BlockId, GlobalId, SlotId},
};

/// A virtual register.
///
/// `Var` registers belong to the program (parameters occupy the first indices). `Temp`
/// registers are scratch values; instrumentation only ever defines fresh temporaries, so it
/// never writes a register the program reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    /// A program variable.
    Var(u32),
    /// A temporary value.
    Temp(u32),
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Var(idx) => write!(f, "%v{idx}"),
            Reg::Temp(idx) => write!(f, "%t{idx}"),
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// An immediate value.
    Const(i64),
    /// The current value of a register.
    Reg(Reg),
}

impl From<Reg> for Operand {
    fn from(reg: Reg) -> Self {
        Operand::Reg(reg)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Const(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(value) => write!(f, "{value}"),
            Operand::Reg(reg) => write!(f, "{reg}"),
        }
    }
}

/// A memory location addressed by loads and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// A module global, shared by every activation of every function.
    Global(GlobalId),
    /// A slot in the current function's frame, zeroed on every activation.
    Frame(SlotId),
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Global(id) => write!(f, "{id}"),
            Storage::Frame(id) => write!(f, "{id}"),
        }
    }
}

/// Binary operators.
///
/// Comparisons produce `1` or `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Wrapping multiplication.
    Mul,
    /// Signed division.
    Div,
    /// Signed remainder.
    Rem,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Left shift (shift amount masked to 6 bits).
    Shl,
    /// Arithmetic right shift (shift amount masked to 6 bits).
    Shr,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Signed less-than.
    Lt,
    /// Signed less-or-equal.
    Le,
    /// Signed greater-than.
    Gt,
    /// Signed greater-or-equal.
    Ge,
}

impl BinaryOp {
    /// Evaluates the operator.
    ///
    /// Returns `None` for division or remainder by zero.
    #[must_use]
    pub fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        let value = match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::Div => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_div(rhs)
            }
            BinaryOp::Rem => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_rem(rhs)
            }
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
            BinaryOp::Xor => lhs ^ rhs,
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            BinaryOp::Shl => lhs.wrapping_shl((rhs & 63) as u32),
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            BinaryOp::Shr => lhs.wrapping_shr((rhs & 63) as u32),
            BinaryOp::Eq => i64::from(lhs == rhs),
            BinaryOp::Ne => i64::from(lhs != rhs),
            BinaryOp::Lt => i64::from(lhs < rhs),
            BinaryOp::Le => i64::from(lhs <= rhs),
            BinaryOp::Gt => i64::from(lhs > rhs),
            BinaryOp::Ge => i64::from(lhs >= rhs),
        };
        Some(value)
    }
}

/// A non-terminating instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `dst = src`
    Copy {
        /// Destination register.
        dst: Reg,
        /// Source operand.
        src: Operand,
    },
    /// `dst = lhs <op> rhs`
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Destination register.
        dst: Reg,
        /// Left operand.
        lhs: Operand,
        /// Right operand.
        rhs: Operand,
    },
    /// `dst = cond != 0 ? if_true : if_false`
    Select {
        /// Destination register.
        dst: Reg,
        /// Condition operand.
        cond: Operand,
        /// Value when the condition is non-zero.
        if_true: Operand,
        /// Value when the condition is zero.
        if_false: Operand,
    },
    /// `dst = load src`
    Load {
        /// Destination register.
        dst: Reg,
        /// Location to read.
        src: Storage,
    },
    /// `store value, dst`
    Store {
        /// Location to write.
        dst: Storage,
        /// Value to store.
        value: Operand,
    },
    /// `dst = call callee(args...)`
    Call {
        /// Destination register for the return value, if any.
        dst: Option<Reg>,
        /// Name of the called function.
        callee: String,
        /// Call arguments.
        args: Vec<Operand>,
    },
    /// Compare-and-trap: if `actual != expected`, control transfers to `handler`
    /// with `(actual, expected)` instead of continuing in this block.
    CheckSignature {
        /// The freshly computed running signature.
        actual: Operand,
        /// The statically known signature of the block.
        expected: Signature,
        /// Symbol of the fault handler.
        handler: String,
    },
}

impl Instruction {
    /// Returns the register defined by this instruction, if any.
    #[must_use]
    pub fn def(&self) -> Option<Reg> {
        match self {
            Instruction::Copy { dst, .. }
            | Instruction::Binary { dst, .. }
            | Instruction::Select { dst, .. }
            | Instruction::Load { dst, .. } => Some(*dst),
            Instruction::Call { dst, .. } => *dst,
            Instruction::Store { .. } | Instruction::CheckSignature { .. } => None,
        }
    }

    /// Returns the storage written by this instruction, if any.
    #[must_use]
    pub fn written_storage(&self) -> Option<Storage> {
        match self {
            Instruction::Store { dst, .. } => Some(*dst),
            _ => None,
        }
    }

    /// Returns the storage read by this instruction, if any.
    #[must_use]
    pub fn read_storage(&self) -> Option<Storage> {
        match self {
            Instruction::Load { src, .. } => Some(*src),
            _ => None,
        }
    }

    /// Returns the operands read by this instruction.
    #[must_use]
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Instruction::Copy { src, .. } => vec![*src],
            Instruction::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instruction::Select {
                cond,
                if_true,
                if_false,
                ..
            } => vec![*cond, *if_true, *if_false],
            Instruction::Load { .. } => Vec::new(),
            Instruction::Store { value, .. } => vec![*value],
            Instruction::Call { args, .. } => args.clone(),
            Instruction::CheckSignature { actual, .. } => vec![*actual],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Copy { dst, src } => write!(f, "{dst} = {src}"),
            Instruction::Binary { op, dst, lhs, rhs } => write!(f, "{dst} = {op} {lhs}, {rhs}"),
            Instruction::Select {
                dst,
                cond,
                if_true,
                if_false,
            } => write!(f, "{dst} = select {cond}, {if_true}, {if_false}"),
            Instruction::Load { dst, src } => write!(f, "{dst} = load {src}"),
            Instruction::Store { dst, value } => write!(f, "store {value}, {dst}"),
            Instruction::Call { dst, callee, args } => {
                if let Some(dst) = dst {
                    write!(f, "{dst} = ")?;
                }
                write!(f, "call {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Instruction::CheckSignature {
                actual,
                expected,
                handler,
            } => write!(f, "check {actual} == {expected} else {handler}"),
        }
    }
}

/// The instruction that ends a basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional jump.
    Jump(BlockId),
    /// Two-way branch on `cond != 0`.
    Branch {
        /// Condition operand.
        cond: Operand,
        /// Target when the condition is non-zero.
        then_block: BlockId,
        /// Target when the condition is zero.
        else_block: BlockId,
    },
    /// Multi-way branch on an integer value.
    Switch {
        /// The scrutinee.
        value: Operand,
        /// `(case value, target)` pairs; the first matching case wins.
        cases: Vec<(i64, BlockId)>,
        /// Target when no case matches.
        default: BlockId,
    },
    /// Return from the function.
    Return(Option<Operand>),
    /// Control never reaches the end of this block.
    Unreachable,
}

impl Terminator {
    /// Returns the distinct successor blocks in first-occurrence order.
    ///
    /// For a `Branch` the `then` target comes first; for a `Switch` the cases in order,
    /// followed by the default.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        let targets: Vec<BlockId> = match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => cases
                .iter()
                .map(|(_, target)| *target)
                .chain(std::iter::once(*default))
                .collect(),
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        };

        let mut unique = Vec::with_capacity(targets.len());
        for target in targets {
            if !unique.contains(&target) {
                unique.push(target);
            }
        }
        unique
    }

    /// Returns `true` if this terminator leaves the function.
    #[must_use]
    pub const fn is_return(&self) -> bool {
        matches!(self, Terminator::Return(_))
    }

    /// Returns the operands read by this terminator.
    #[must_use]
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Terminator::Branch { cond, .. } => vec![*cond],
            Terminator::Switch { value, .. } => vec![*value],
            Terminator::Return(Some(value)) => vec![*value],
            Terminator::Jump(_) | Terminator::Return(None) | Terminator::Unreachable => {
                Vec::new()
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Jump(target) => write!(f, "jmp {target}"),
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => write!(f, "br {cond}, {then_block}, {else_block}"),
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                write!(f, "switch {value} [")?;
                for (value, target) in cases {
                    write!(f, "{value}: {target}, ")?;
                }
                write!(f, "default: {default}]")
            }
            Terminator::Return(Some(value)) => write!(f, "ret {value}"),
            Terminator::Return(None) => write!(f, "ret"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_op_apply() {
        assert_eq!(BinaryOp::Xor.apply(0b1010, 0b0110), Some(0b1100));
        assert_eq!(BinaryOp::Gt.apply(3, 2), Some(1));
        assert_eq!(BinaryOp::Le.apply(3, 2), Some(0));
        assert_eq!(BinaryOp::Div.apply(7, 0), None);
        assert_eq!(BinaryOp::Rem.apply(7, 0), None);
        assert_eq!(BinaryOp::Add.apply(i64::MAX, 1), Some(i64::MIN));
    }

    #[test]
    fn test_binary_op_parse_and_display() {
        assert_eq!("xor".parse::<BinaryOp>().unwrap(), BinaryOp::Xor);
        assert_eq!(BinaryOp::Ge.to_string(), "ge");
        assert!("nand".parse::<BinaryOp>().is_err());
    }

    #[test]
    fn test_terminator_successors_dedup() {
        let term = Terminator::Switch {
            value: Operand::Reg(Reg::Var(0)),
            cases: vec![(0, BlockId::new(2)), (1, BlockId::new(3)), (2, BlockId::new(2))],
            default: BlockId::new(3),
        };
        assert_eq!(term.successors(), vec![BlockId::new(2), BlockId::new(3)]);

        let same = Terminator::Branch {
            cond: Operand::Const(1),
            then_block: BlockId::new(1),
            else_block: BlockId::new(1),
        };
        assert_eq!(same.successors(), vec![BlockId::new(1)]);
        assert!(Terminator::Return(None).successors().is_empty());
    }

    #[test]
    fn test_instruction_def_and_storage() {
        let load = Instruction::Load {
            dst: Reg::Temp(0),
            src: Storage::Global(GlobalId::new(1)),
        };
        assert_eq!(load.def(), Some(Reg::Temp(0)));
        assert_eq!(load.read_storage(), Some(Storage::Global(GlobalId::new(1))));
        assert_eq!(load.written_storage(), None);

        let store = Instruction::Store {
            dst: Storage::Frame(SlotId::new(0)),
            value: Operand::Const(4),
        };
        assert_eq!(store.def(), None);
        assert_eq!(store.written_storage(), Some(Storage::Frame(SlotId::new(0))));
    }

    #[test]
    fn test_instruction_display() {
        let check = Instruction::CheckSignature {
            actual: Operand::Reg(Reg::Temp(3)),
            expected: Signature::new(4).unwrap(),
            handler: "__ctt_error".to_string(),
        };
        assert_eq!(check.to_string(), "check %t3 == 4 else __ctt_error");

        let call = Instruction::Call {
            dst: Some(Reg::Var(2)),
            callee: "max".to_string(),
            args: vec![Operand::Reg(Reg::Var(0)), Operand::Const(20)],
        };
        assert_eq!(call.to_string(), "%v2 = call max(%v0, 20)");
    }
}
