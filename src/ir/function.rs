//! Functions and basic blocks.

use std::{collections::HashMap, fmt};

use crate::{
    error::malformed_error,
    ir::{Instruction, Operand, Reg, Storage, Terminator},
    utils::graph::NodeId,
    Result,
};

/// Index of a basic block inside its function.
///
/// Block 0 is the function entry. The control flow graph uses the same index for its
/// [`NodeId`], so the two convert freely.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Creates a block ID from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the raw index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl From<BlockId> for NodeId {
    fn from(block: BlockId) -> Self {
        NodeId::new(block.0)
    }
}

impl From<NodeId> for BlockId {
    fn from(node: NodeId) -> Self {
        BlockId(node.index())
    }
}

/// Index of a frame slot inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    /// Creates a slot ID from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        SlotId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%s{}", self.0)
    }
}

/// A named per-activation storage location, zero-initialised on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlot {
    /// Slot name, used for printing and lookup.
    pub name: String,
    /// Width in bits.
    pub width: u32,
}

/// A basic block: straight-line instructions followed by a terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    label: String,
    instructions: Vec<Instruction>,
    terminator: Option<Terminator>,
}

impl Block {
    /// Creates an empty, unterminated block.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    /// Returns the block label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the instructions, excluding the terminator.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the terminator, or `None` if the block is still open.
    #[must_use]
    pub fn terminator(&self) -> Option<&Terminator> {
        self.terminator.as_ref()
    }

    /// Returns the number of instructions, counting the terminator.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len() + usize::from(self.terminator.is_some())
    }

    /// Returns `true` if the block holds neither instructions nor a terminator.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the first insertion point: instructions inserted there run before any
    /// instruction already in the block.
    #[must_use]
    pub const fn first_insertion_point(&self) -> usize {
        0
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Sets the terminator, replacing any previous one.
    pub fn set_terminator(&mut self, terminator: Terminator) {
        self.terminator = Some(terminator);
    }

    /// Inserts instructions before the instruction at `index`, preserving their order.
    ///
    /// An `index` past the end appends before the terminator.
    pub fn insert_at(&mut self, index: usize, instructions: Vec<Instruction>) {
        let at = index.min(self.instructions.len());
        self.instructions.splice(at..at, instructions);
    }

    /// Inserts instructions at the first insertion point, preserving their order.
    pub fn insert_front(&mut self, instructions: Vec<Instruction>) {
        self.insert_at(self.first_insertion_point(), instructions);
    }

    /// Inserts instructions after every existing instruction and before the terminator.
    pub fn insert_before_terminator(&mut self, instructions: Vec<Instruction>) {
        self.instructions.extend(instructions);
    }

    /// Returns the distinct successors named by the terminator.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator
            .as_ref()
            .map(Terminator::successors)
            .unwrap_or_default()
    }
}

/// A function: parameters, registers, frame slots and basic blocks.
///
/// Parameters are bound to `Var(0)..Var(params)` on entry. Every other variable, every
/// temporary and every frame slot starts at zero on each activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    name: String,
    params: u32,
    var_count: u32,
    temp_count: u32,
    frame_slots: Vec<FrameSlot>,
    blocks: Vec<Block>,
}

impl Function {
    /// Creates an empty function with `params` parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, params: u32) -> Self {
        Self {
            name: name.into(),
            params,
            var_count: params,
            temp_count: 0,
            frame_slots: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of parameters.
    #[must_use]
    pub const fn params(&self) -> u32 {
        self.params
    }

    /// Returns the number of program variables, parameters included.
    #[must_use]
    pub const fn var_count(&self) -> u32 {
        self.var_count
    }

    /// Returns the number of temporaries.
    #[must_use]
    pub const fn temp_count(&self) -> u32 {
        self.temp_count
    }

    /// Returns the entry block.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Returns the blocks in layout order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the function has no blocks (a declaration).
    #[must_use]
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns a block by ID.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0)
    }

    /// Returns a block by ID for modification.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.0)
    }

    /// Returns an iterator over all block IDs in layout order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Returns the frame slots.
    #[must_use]
    pub fn frame_slots(&self) -> &[FrameSlot] {
        &self.frame_slots
    }

    /// Looks up a frame slot by name.
    #[must_use]
    pub fn frame_slot(&self, name: &str) -> Option<SlotId> {
        self.frame_slots
            .iter()
            .position(|slot| slot.name == name)
            .map(SlotId)
    }

    /// Returns the total instruction count, terminators included.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(Block::len).sum()
    }

    /// Appends a block and returns its ID.
    pub fn add_block(&mut self, block: Block) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(block);
        id
    }

    /// Allocates a fresh program variable.
    pub fn new_var(&mut self) -> Reg {
        let reg = Reg::Var(self.var_count);
        self.var_count += 1;
        reg
    }

    /// Allocates a fresh temporary, distinct from every register in use.
    pub fn new_temp(&mut self) -> Reg {
        let reg = Reg::Temp(self.temp_count);
        self.temp_count += 1;
        reg
    }

    /// Adds a frame slot, or returns the existing slot with that name.
    pub fn get_or_insert_frame_slot(&mut self, name: &str, width: u32) -> SlotId {
        if let Some(id) = self.frame_slot(name) {
            return id;
        }
        self.frame_slots.push(FrameSlot {
            name: name.to_string(),
            width,
        });
        SlotId(self.frame_slots.len() - 1)
    }

    /// Checks the structural invariants of the function.
    ///
    /// Every block must be terminated, every branch target must exist, block labels must be
    /// unique, and every register and frame slot referenced must be allocated. Global
    /// storage is checked by [`Module::validate`](crate::ir::Module::validate).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let mut labels: HashMap<&str, BlockId> = HashMap::with_capacity(self.blocks.len());

        for (index, block) in self.blocks.iter().enumerate() {
            let id = BlockId(index);

            if let Some(previous) = labels.insert(block.label(), id) {
                return Err(malformed_error!(
                    "function '{}': label '{}' is used by both {} and {}",
                    self.name,
                    block.label(),
                    previous,
                    id
                ));
            }

            let Some(terminator) = block.terminator() else {
                return Err(malformed_error!(
                    "function '{}': block {} ('{}') has no terminator",
                    self.name,
                    id,
                    block.label()
                ));
            };

            for target in terminator.successors() {
                if target.0 >= self.blocks.len() {
                    return Err(malformed_error!(
                        "function '{}': block {} jumps to {} which does not exist",
                        self.name,
                        id,
                        target
                    ));
                }
            }

            for instruction in block.instructions() {
                self.validate_registers(id, instruction.operands().into_iter(), instruction.def())?;
                for storage in instruction
                    .read_storage()
                    .into_iter()
                    .chain(instruction.written_storage())
                {
                    if let Storage::Frame(slot) = storage {
                        if slot.0 >= self.frame_slots.len() {
                            return Err(malformed_error!(
                                "function '{}': block {} uses undefined frame slot {}",
                                self.name,
                                id,
                                slot
                            ));
                        }
                    }
                }
            }
            self.validate_registers(id, terminator.operands().into_iter(), None)?;
        }

        Ok(())
    }

    fn validate_registers(
        &self,
        block: BlockId,
        operands: impl Iterator<Item = Operand>,
        def: Option<Reg>,
    ) -> Result<()> {
        let regs = operands
            .filter_map(|operand| match operand {
                Operand::Reg(reg) => Some(reg),
                Operand::Const(_) => None,
            })
            .chain(def);

        for reg in regs {
            let in_range = match reg {
                Reg::Var(idx) => idx < self.var_count,
                Reg::Temp(idx) => idx < self.temp_count,
            };
            if !in_range {
                return Err(malformed_error!(
                    "function '{}': block {} uses unallocated register {}",
                    self.name,
                    block,
                    reg
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for param in 0..self.params {
            if param > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", Reg::Var(param))?;
        }
        write!(f, ")")?;
        if self.blocks.is_empty() {
            return writeln!(f, ";");
        }
        writeln!(f, " {{")?;
        for (index, slot) in self.frame_slots.iter().enumerate() {
            writeln!(f, "    {} = slot i{} \"{}\"", SlotId(index), slot.width, slot.name)?;
        }
        for (index, block) in self.blocks.iter().enumerate() {
            writeln!(f, "{} ({}):", BlockId(index), block.label())?;
            for instruction in block.instructions() {
                writeln!(f, "    {instruction}")?;
            }
            match block.terminator() {
                Some(terminator) => writeln!(f, "    {terminator}")?,
                None => writeln!(f, "    <no terminator>")?,
            }
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinaryOp;

    fn two_blocks() -> Function {
        let mut function = Function::new("f", 1);
        let mut entry = Block::new("entry");
        entry.push(Instruction::Binary {
            op: BinaryOp::Add,
            dst: Reg::Var(0),
            lhs: Operand::Reg(Reg::Var(0)),
            rhs: Operand::Const(1),
        });
        entry.set_terminator(Terminator::Jump(BlockId(1)));
        function.add_block(entry);

        let mut exit = Block::new("exit");
        exit.set_terminator(Terminator::Return(Some(Operand::Reg(Reg::Var(0)))));
        function.add_block(exit);
        function
    }

    #[test]
    fn test_function_validate_ok() {
        let function = two_blocks();
        assert!(function.validate().is_ok());
        assert_eq!(function.instruction_count(), 3);
    }

    #[test]
    fn test_function_missing_terminator() {
        let mut function = two_blocks();
        function.add_block(Block::new("open"));
        assert!(function.validate().is_err());
    }

    #[test]
    fn test_function_duplicate_label() {
        let mut function = two_blocks();
        let mut dup = Block::new("exit");
        dup.set_terminator(Terminator::Return(None));
        function.add_block(dup);
        assert!(function.validate().is_err());
    }

    #[test]
    fn test_function_dangling_target() {
        let mut function = two_blocks();
        if let Some(block) = function.block_mut(BlockId(1)) {
            block.set_terminator(Terminator::Jump(BlockId(9)));
        }
        assert!(function.validate().is_err());
    }

    #[test]
    fn test_function_unallocated_temp() {
        let mut function = two_blocks();
        if let Some(block) = function.block_mut(BlockId(0)) {
            block.push(Instruction::Copy {
                dst: Reg::Temp(4),
                src: Operand::Const(0),
            });
        }
        assert!(function.validate().is_err());
    }

    #[test]
    fn test_block_insert_front_runs_first() {
        let mut function = two_blocks();
        let temp = function.new_temp();
        let block = function.block_mut(BlockId(0)).unwrap();
        block.insert_front(vec![Instruction::Copy {
            dst: temp,
            src: Operand::Const(5),
        }]);
        assert_eq!(block.instructions()[0].def(), Some(Reg::Temp(0)));
        assert_eq!(block.instructions().len(), 2);
    }

    #[test]
    fn test_frame_slot_reuse() {
        let mut function = Function::new("g", 0);
        let first = function.get_or_insert_frame_slot("G", 32);
        let second = function.get_or_insert_frame_slot("G", 32);
        assert_eq!(first, second);
        assert_eq!(function.frame_slots().len(), 1);
    }
}
