//! Incremental construction of [`Function`]s.

use crate::{
    ir::{BinaryOp, Block, BlockId, Function, Instruction, Operand, Reg, Storage, Terminator},
    Result,
};

/// Builds a [`Function`] block by block.
///
/// Blocks are laid out in creation order, so the first block created is the entry.
/// [`FunctionBuilder::build`] validates the result.
///
/// # Examples
///
/// ```rust
/// use cfcss::ir::{BinaryOp, FunctionBuilder};
///
/// let mut b = FunctionBuilder::new("max", 2);
/// let entry = b.block("entry");
/// let left = b.block("left");
/// let right = b.block("right");
///
/// let (x, y) = (b.param(0), b.param(1));
/// let cond = b.binary(entry, BinaryOp::Gt, x, y);
/// b.branch(entry, cond, left, right);
/// b.ret(left, Some(x.into()));
/// b.ret(right, Some(y.into()));
///
/// let function = b.build()?;
/// assert_eq!(function.block_count(), 3);
/// # Ok::<(), cfcss::Error>(())
/// ```
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
}

impl FunctionBuilder {
    /// Starts a function with `params` parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, params: u32) -> Self {
        Self {
            function: Function::new(name, params),
        }
    }

    /// Returns the register bound to parameter `index`.
    #[must_use]
    pub fn param(&self, index: u32) -> Reg {
        Reg::Var(index)
    }

    /// Allocates a fresh program variable.
    pub fn var(&mut self) -> Reg {
        self.function.new_var()
    }

    /// Allocates a frame slot.
    pub fn slot(&mut self, name: &str) -> Storage {
        Storage::Frame(self.function.get_or_insert_frame_slot(name, 64))
    }

    /// Appends an empty block.
    pub fn block(&mut self, label: impl Into<String>) -> BlockId {
        self.function.add_block(Block::new(label))
    }

    /// Appends an instruction to `block`.
    ///
    /// Instructions pushed to an unknown block are dropped; [`FunctionBuilder::build`] does
    /// not see them.
    pub fn push(&mut self, block: BlockId, instruction: Instruction) {
        if let Some(block) = self.function.block_mut(block) {
            block.push(instruction);
        }
    }

    /// Emits `dst = src`.
    pub fn copy(&mut self, block: BlockId, dst: Reg, src: impl Into<Operand>) {
        self.push(
            block,
            Instruction::Copy {
                dst,
                src: src.into(),
            },
        );
    }

    /// Emits a binary operation into a fresh variable and returns it.
    pub fn binary(
        &mut self,
        block: BlockId,
        op: BinaryOp,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Reg {
        let dst = self.var();
        self.push(
            block,
            Instruction::Binary {
                op,
                dst,
                lhs: lhs.into(),
                rhs: rhs.into(),
            },
        );
        dst
    }

    /// Emits a load into a fresh variable and returns it.
    pub fn load(&mut self, block: BlockId, src: Storage) -> Reg {
        let dst = self.var();
        self.push(block, Instruction::Load { dst, src });
        dst
    }

    /// Emits a store.
    pub fn store(&mut self, block: BlockId, dst: Storage, value: impl Into<Operand>) {
        self.push(
            block,
            Instruction::Store {
                dst,
                value: value.into(),
            },
        );
    }

    /// Emits a call whose result lands in a fresh variable.
    pub fn call(&mut self, block: BlockId, callee: &str, args: Vec<Operand>) -> Reg {
        let dst = self.var();
        self.push(
            block,
            Instruction::Call {
                dst: Some(dst),
                callee: callee.to_string(),
                args,
            },
        );
        dst
    }

    /// Terminates `block`.
    pub fn terminate(&mut self, block: BlockId, terminator: Terminator) {
        if let Some(block) = self.function.block_mut(block) {
            block.set_terminator(terminator);
        }
    }

    /// Terminates `block` with an unconditional jump.
    pub fn jump(&mut self, block: BlockId, target: BlockId) {
        self.terminate(block, Terminator::Jump(target));
    }

    /// Terminates `block` with a two-way branch.
    pub fn branch(
        &mut self,
        block: BlockId,
        cond: impl Into<Operand>,
        then_block: BlockId,
        else_block: BlockId,
    ) {
        self.terminate(
            block,
            Terminator::Branch {
                cond: cond.into(),
                then_block,
                else_block,
            },
        );
    }

    /// Terminates `block` with a multi-way branch.
    pub fn switch(
        &mut self,
        block: BlockId,
        value: impl Into<Operand>,
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    ) {
        self.terminate(
            block,
            Terminator::Switch {
                value: value.into(),
                cases,
                default,
            },
        );
    }

    /// Terminates `block` with a return.
    pub fn ret(&mut self, block: BlockId, value: Option<Operand>) {
        self.terminate(block, Terminator::Return(value));
    }

    /// Validates and returns the function.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the function violates a structural invariant
    /// (see [`Function::validate`]).
    pub fn build(self) -> Result<Function> {
        self.function.validate()?;
        Ok(self.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_builder_diamond() {
        let mut b = FunctionBuilder::new("diamond", 1);
        let entry = b.block("entry");
        let left = b.block("left");
        let right = b.block("right");
        let join = b.block("join");

        let x = b.param(0);
        b.branch(entry, x, left, right);
        b.jump(left, join);
        b.jump(right, join);
        b.ret(join, Some(Operand::Const(0)));

        let function = b.build().unwrap();
        assert_eq!(function.block_count(), 4);
        assert_eq!(function.block(entry).unwrap().successors(), vec![left, right]);
    }

    #[test]
    fn test_builder_rejects_open_block() {
        let mut b = FunctionBuilder::new("open", 0);
        b.block("entry");
        assert!(matches!(b.build(), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_builder_allocates_vars_after_params() {
        let mut b = FunctionBuilder::new("vars", 2);
        assert_eq!(b.var(), Reg::Var(2));
        assert_eq!(b.var(), Reg::Var(3));
    }

    #[test]
    fn test_builder_declaration() {
        let function = FunctionBuilder::new("__ctt_error", 2).build().unwrap();
        assert!(function.is_declaration());
    }
}
