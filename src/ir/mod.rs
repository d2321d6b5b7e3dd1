//! A small three-address IR that CFCSS instruments.
//!
//! A [`Module`] owns globals and [`Function`]s. A function is a list of [`Block`]s in layout
//! order; block 0 is the entry. Every block ends in exactly one [`Terminator`], and branch
//! targets are [`BlockId`]s, so the control flow graph can be rebuilt from the function at
//! any time (see [`crate::analysis::cfg::ControlFlowGraph`]).
//!
//! Registers are function-local and come in two flavours: program variables (`%vN`) and
//! temporaries (`%tN`). Storage is either a module global (`@gN`) or a frame slot (`%sN`)
//! private to one activation.
//!
//! Instrumentation only ever inserts instructions through [`Block::insert_front`] and
//! [`Block::insert_before_terminator`]; it never adds or removes blocks.

mod builder;
mod function;
mod instruction;
mod module;

pub use builder::FunctionBuilder;
pub use function::{Block, BlockId, FrameSlot, Function, SlotId};
pub use instruction::{BinaryOp, Instruction, Operand, Reg, Storage, Terminator};
pub use module::{Global, GlobalId, GlobalKind, Module};
