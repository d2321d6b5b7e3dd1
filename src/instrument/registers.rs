//! Runtime signature state and where it lives.

use crate::{
    instrument::{InstrumentationPlan, PlanOp, Signature, SignatureRegister},
    ir::{BlockId, Storage},
};

/// The runtime values of `G` and `D`.
///
/// This is the state the instrumented code maintains, made explicit so plans can be
/// executed without lowering them to IR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignatureRegisters {
    /// The running signature.
    pub g: u32,
    /// The adjusting signature.
    pub d: u32,
}

impl SignatureRegisters {
    /// Creates zeroed registers, the state at function invocation.
    #[must_use]
    pub const fn new() -> Self {
        Self { g: 0, d: 0 }
    }

    /// Zeroes both registers.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Reads a register.
    #[must_use]
    pub const fn read(&self, reg: SignatureRegister) -> u32 {
        match reg {
            SignatureRegister::Running => self.g,
            SignatureRegister::Adjusting => self.d,
        }
    }

    /// Writes a register.
    pub fn write(&mut self, reg: SignatureRegister, value: u32) {
        match reg {
            SignatureRegister::Running => self.g = value,
            SignatureRegister::Adjusting => self.d = value,
        }
    }

    /// Executes `ops` as the instrumentation of `block`.
    ///
    /// # Errors
    ///
    /// Returns the first failed check. Operations after it are not executed.
    pub fn execute(&mut self, block: BlockId, ops: &[PlanOp]) -> Result<(), CheckFailure> {
        let mut acc = 0u32;
        for op in ops {
            match *op {
                PlanOp::StoreConst { reg, value } => self.write(reg, value),
                PlanOp::Load(reg) => acc = self.read(reg),
                PlanOp::XorConst(value) => acc ^= value,
                PlanOp::XorReg(reg) => acc ^= self.read(reg),
                PlanOp::Store(reg) => self.write(reg, acc),
                PlanOp::Check(expected) => {
                    if acc != expected.get() {
                        return Err(CheckFailure {
                            block,
                            actual: acc,
                            expected,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// A failed signature check observed while simulating a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckFailure {
    /// The block whose check failed.
    pub block: BlockId,
    /// The running signature computed on entry.
    pub actual: u32,
    /// The signature of the block.
    pub expected: Signature,
}

/// Storage locations assigned to `G` and `D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLayout {
    /// Storage of the running signature.
    pub running: Storage,
    /// Storage of the adjusting signature.
    pub adjusting: Storage,
}

impl RegisterLayout {
    /// Returns the storage of `reg`.
    #[must_use]
    pub const fn storage(&self, reg: SignatureRegister) -> Storage {
        match reg {
            SignatureRegister::Running => self.running,
            SignatureRegister::Adjusting => self.adjusting,
        }
    }

    /// Returns `true` if `storage` is one of the two registers.
    #[must_use]
    pub fn contains(&self, storage: Storage) -> bool {
        storage == self.running || storage == self.adjusting
    }
}

/// Executes an [`InstrumentationPlan`] along a path of blocks.
///
/// The simulator performs exactly what the emitted code would do at runtime: entry
/// operations when a block is entered, the edge store before a block's terminator, exit
/// operations before a return.
///
/// ```rust
/// use cfcss::analysis::ControlFlowGraph;
/// use cfcss::instrument::{PlanSimulator, Planner, SignatureAssigner};
/// use cfcss::ir::{BlockId, FunctionBuilder};
///
/// let mut b = FunctionBuilder::new("chain", 0);
/// let (b0, b1, b2) = (b.block("b0"), b.block("b1"), b.block("b2"));
/// b.jump(b0, b1);
/// b.jump(b1, b2);
/// b.ret(b2, None);
/// let function = b.build()?;
///
/// let cfg = ControlFlowGraph::new(&function)?;
/// let table = SignatureAssigner::default().assign(&cfg)?;
/// let plan = Planner::default().plan(&cfg, &table)?;
///
/// let registers = PlanSimulator::new(&plan).run_path(&[b0, b1, b2]).unwrap();
/// assert_eq!(Some(registers.g), table.get(b2).map(|s| s.get()));
/// # Ok::<(), cfcss::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct PlanSimulator<'p> {
    plan: &'p InstrumentationPlan,
    registers: SignatureRegisters,
}

impl<'p> PlanSimulator<'p> {
    /// Creates a simulator with zeroed registers.
    #[must_use]
    pub fn new(plan: &'p InstrumentationPlan) -> Self {
        Self {
            plan,
            registers: SignatureRegisters::new(),
        }
    }

    /// Creates a simulator starting from the given register values.
    #[must_use]
    pub fn with_registers(plan: &'p InstrumentationPlan, registers: SignatureRegisters) -> Self {
        Self { plan, registers }
    }

    /// Returns the current register values.
    #[must_use]
    pub const fn registers(&self) -> SignatureRegisters {
        self.registers
    }

    /// Runs the entry operations of `block`.
    ///
    /// # Errors
    ///
    /// Returns the failed check, if any.
    pub fn enter(&mut self, block: BlockId) -> Result<(), CheckFailure> {
        match self.plan.block(block) {
            Some(plan) => self.registers.execute(block, &plan.entry),
            None => Ok(()),
        }
    }

    /// Performs the edge store `from` executes when it transfers control to `to`.
    ///
    /// A block that adjusts any of its edges stores on all of them, `0` on edges that need
    /// no adjustment.
    pub fn leave(&mut self, from: BlockId, to: BlockId) {
        if self.plan.has_adjustments(from) {
            self.registers.d = self.plan.adjustment(from, to).unwrap_or(0);
        }
    }

    /// Runs the exit operations of a returning block.
    ///
    /// # Errors
    ///
    /// Returns the failed check, if any.
    pub fn exit(&mut self, block: BlockId) -> Result<(), CheckFailure> {
        match self.plan.block(block) {
            Some(plan) => self.registers.execute(block, &plan.exit),
            None => Ok(()),
        }
    }

    /// Runs a complete path: entry of the first block, then for every consecutive pair the
    /// edge store and the entry of the next block. Returns the registers as seen by the
    /// check of the last block; its exit operations are left to [`PlanSimulator::exit`].
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn run_path(mut self, path: &[BlockId]) -> Result<SignatureRegisters, CheckFailure> {
        let mut previous: Option<BlockId> = None;
        for &block in path {
            if let Some(from) = previous {
                self.leave(from, block);
            }
            self.enter(block)?;
            previous = Some(block);
        }
        Ok(self.registers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::ControlFlowGraph,
        config::RegisterScope,
        instrument::{Planner, SignatureAssigner},
        ir::{Function, FunctionBuilder, GlobalId, SlotId},
    };

    fn diamond() -> Function {
        let mut b = FunctionBuilder::new("diamond", 1);
        let entry = b.block("entry");
        let left = b.block("left");
        let right = b.block("right");
        let join = b.block("join");
        b.branch(entry, b.param(0), left, right);
        b.jump(left, join);
        b.jump(right, join);
        b.ret(join, None);
        b.build().unwrap()
    }

    fn plan(function: &Function, scope: RegisterScope) -> InstrumentationPlan {
        let cfg = ControlFlowGraph::new(function).unwrap();
        let table = SignatureAssigner::default().assign(&cfg).unwrap();
        Planner::new(scope).plan(&cfg, &table).unwrap()
    }

    fn path(blocks: &[usize]) -> Vec<BlockId> {
        blocks.iter().copied().map(BlockId::new).collect()
    }

    #[test]
    fn test_registers_reset() {
        let mut registers = SignatureRegisters { g: 5, d: 9 };
        registers.reset();
        assert_eq!(registers, SignatureRegisters::new());
    }

    #[test]
    fn test_entry_sets_signature() {
        let function = diamond();
        let plan = plan(&function, RegisterScope::Global);
        let mut sim = PlanSimulator::with_registers(&plan, SignatureRegisters { g: 77, d: 3 });
        sim.enter(BlockId::new(0)).unwrap();
        assert_eq!(sim.registers(), SignatureRegisters { g: 1, d: 0 });
    }

    #[test]
    fn test_diamond_both_paths() {
        let function = diamond();
        let plan = plan(&function, RegisterScope::Global);

        let left = PlanSimulator::new(&plan).run_path(&path(&[0, 1, 3])).unwrap();
        let right = PlanSimulator::new(&plan).run_path(&path(&[0, 2, 3])).unwrap();
        assert_eq!(left, SignatureRegisters { g: 4, d: 0 });
        assert_eq!(right, SignatureRegisters { g: 4, d: 0 });
    }

    #[test]
    fn test_exit_clears_registers_in_global_scope() {
        let function = diamond();
        let global = plan(&function, RegisterScope::Global);
        let mut sim = PlanSimulator::new(&global);
        for (from, to) in [(0, 1), (1, 3)] {
            sim.enter(BlockId::new(from)).unwrap();
            sim.leave(BlockId::new(from), BlockId::new(to));
        }
        sim.enter(BlockId::new(3)).unwrap();
        assert_eq!(sim.registers().g, 4);
        sim.exit(BlockId::new(3)).unwrap();
        assert_eq!(sim.registers(), SignatureRegisters::new());

        let frame = plan(&function, RegisterScope::PerActivation);
        let mut sim = PlanSimulator::new(&frame);
        sim.enter(BlockId::new(0)).unwrap();
        sim.exit(BlockId::new(0)).unwrap();
        assert_eq!(sim.registers().g, 1);
    }

    #[test]
    fn test_skipped_adjustment_is_detected() {
        let function = diamond();
        let plan = plan(&function, RegisterScope::Global);

        let mut sim = PlanSimulator::new(&plan);
        sim.enter(BlockId::new(0)).unwrap();
        sim.leave(BlockId::new(0), BlockId::new(2));
        sim.enter(BlockId::new(2)).unwrap();
        // Jump to the merge block without the store of D on the edge 2 -> 3.
        let failure = sim.enter(BlockId::new(3)).unwrap_err();
        assert_eq!(failure.block, BlockId::new(3));
        assert_eq!(failure.expected.get(), 4);
        assert_ne!(failure.actual, 4);
    }

    #[test]
    fn test_illegal_edge_is_detected() {
        let function = diamond();
        let plan = plan(&function, RegisterScope::Global);
        // 1 -> 2 is not an edge of the diamond.
        let failure = PlanSimulator::new(&plan)
            .run_path(&path(&[0, 1, 2]))
            .unwrap_err();
        assert_eq!(failure.block, BlockId::new(2));
    }

    #[test]
    fn test_loop_iterations() {
        // 0 -> 1; 1 -> 1 | 2
        let mut b = FunctionBuilder::new("spin", 1);
        let entry = b.block("entry");
        let body = b.block("body");
        let exit = b.block("exit");
        b.jump(entry, body);
        b.branch(body, b.param(0), body, exit);
        b.ret(exit, None);
        let function = b.build().unwrap();
        let plan = plan(&function, RegisterScope::Global);

        let registers = PlanSimulator::new(&plan)
            .run_path(&path(&[0, 1, 1, 1, 2]))
            .unwrap();
        assert_eq!(registers.g, 3);
    }

    #[test]
    fn test_layout_storage() {
        let layout = RegisterLayout {
            running: Storage::Global(GlobalId::new(0)),
            adjusting: Storage::Frame(SlotId::new(1)),
        };
        assert_eq!(
            layout.storage(SignatureRegister::Adjusting),
            Storage::Frame(SlotId::new(1))
        );
        assert!(layout.contains(Storage::Global(GlobalId::new(0))));
        assert!(!layout.contains(Storage::Global(GlobalId::new(1))));
    }
}
