//! Lowering of instrumentation plans to IR.

use crate::{
    error::malformed_error,
    instrument::{InstrumentationPlan, PlanOp, RegisterLayout},
    ir::{BinaryOp, BlockId, Function, Instruction, Operand, Reg, Terminator},
    Result,
};

/// Inserts the instructions described by an [`InstrumentationPlan`] into a function.
///
/// Entry operations go before the first instruction of each block. The `D` store of a
/// block that precedes merge blocks goes right before its terminator; when the terminator
/// has several targets the stored value is selected from the terminator's own condition,
/// so only the edge actually taken carries its adjustment. Exit operations go before the
/// terminator of returning blocks.
///
/// Everything the emitter defines is a fresh temporary; the only storage it writes is `G`
/// and `D`.
#[derive(Debug, Clone)]
pub struct Emitter<'a> {
    layout: RegisterLayout,
    handler: &'a str,
}

impl<'a> Emitter<'a> {
    /// Creates an emitter writing to `layout` and trapping to `handler`.
    #[must_use]
    pub const fn new(layout: RegisterLayout, handler: &'a str) -> Self {
        Self { layout, handler }
    }

    /// Instruments `function` according to `plan` and returns the number of inserted
    /// instructions.
    ///
    /// The function is modified in place; callers that need all-or-nothing semantics run
    /// the emitter on a copy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the plan was made for a different function
    /// or is internally inconsistent.
    pub fn emit(&self, function: &mut Function, plan: &InstrumentationPlan) -> Result<usize> {
        if plan.function != function.name() || plan.blocks.len() != function.block_count() {
            return Err(malformed_error!(
                "plan for '{}' ({} blocks) does not fit '{}' ({} blocks)",
                plan.function,
                plan.blocks.len(),
                function.name(),
                function.block_count()
            ));
        }

        let before = function.instruction_count();

        if plan.guard_calls {
            for index in 0..function.block_count() {
                self.guard_calls(function, BlockId::new(index));
            }
        }

        for block_plan in &plan.blocks {
            let block = block_plan.block;

            if plan.has_adjustments(block) {
                let store = self.edge_store(function, plan, block)?;
                if let Some(target) = function.block_mut(block) {
                    target.insert_before_terminator(store);
                }
            }

            if !block_plan.exit.is_empty() {
                let exit = self.lower(function, &block_plan.exit)?;
                if let Some(target) = function.block_mut(block) {
                    target.insert_before_terminator(exit);
                }
            }

            let entry = self.lower(function, &block_plan.entry)?;
            if let Some(target) = function.block_mut(block) {
                target.insert_front(entry);
            }
        }

        Ok(function.instruction_count() - before)
    }

    /// Materialises plan operations, threading the accumulator through fresh temporaries.
    fn lower(&self, function: &mut Function, ops: &[PlanOp]) -> Result<Vec<Instruction>> {
        let mut out = Vec::with_capacity(ops.len() + 1);
        let mut acc: Option<Operand> = None;

        for op in ops {
            match *op {
                PlanOp::StoreConst { reg, value } => out.push(Instruction::Store {
                    dst: self.layout.storage(reg),
                    value: Operand::Const(i64::from(value)),
                }),
                PlanOp::Load(reg) => {
                    let dst = function.new_temp();
                    out.push(Instruction::Load {
                        dst,
                        src: self.layout.storage(reg),
                    });
                    acc = Some(Operand::Reg(dst));
                }
                PlanOp::XorConst(value) => {
                    let lhs = acc.ok_or_else(|| malformed_error!("xor before load in plan"))?;
                    let dst = function.new_temp();
                    out.push(Instruction::Binary {
                        op: BinaryOp::Xor,
                        dst,
                        lhs,
                        rhs: Operand::Const(i64::from(value)),
                    });
                    acc = Some(Operand::Reg(dst));
                }
                PlanOp::XorReg(reg) => {
                    let lhs = acc.ok_or_else(|| malformed_error!("xor before load in plan"))?;
                    let loaded = function.new_temp();
                    out.push(Instruction::Load {
                        dst: loaded,
                        src: self.layout.storage(reg),
                    });
                    let dst = function.new_temp();
                    out.push(Instruction::Binary {
                        op: BinaryOp::Xor,
                        dst,
                        lhs,
                        rhs: Operand::Reg(loaded),
                    });
                    acc = Some(Operand::Reg(dst));
                }
                PlanOp::Store(reg) => {
                    let value = acc.ok_or_else(|| malformed_error!("store before load in plan"))?;
                    out.push(Instruction::Store {
                        dst: self.layout.storage(reg),
                        value,
                    });
                }
                PlanOp::Check(expected) => {
                    let actual = acc.ok_or_else(|| malformed_error!("check before load in plan"))?;
                    out.push(Instruction::CheckSignature {
                        actual,
                        expected,
                        handler: self.handler.to_string(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Builds the `D` store that `block` performs on its way out.
    fn edge_store(
        &self,
        function: &mut Function,
        plan: &InstrumentationPlan,
        block: BlockId,
    ) -> Result<Vec<Instruction>> {
        let terminator = function
            .block(block)
            .and_then(|b| b.terminator())
            .cloned()
            .ok_or_else(|| malformed_error!("block {} has no terminator", block))?;
        let value = |to: BlockId| i64::from(plan.adjustment(block, to).unwrap_or(0));
        let dst = self.layout.adjusting;

        let mut out = Vec::new();
        let stored = match terminator {
            Terminator::Jump(target) => Operand::Const(value(target)),
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                let (if_true, if_false) = (value(then_block), value(else_block));
                if if_true == if_false {
                    Operand::Const(if_true)
                } else {
                    let selected = function.new_temp();
                    out.push(Instruction::Select {
                        dst: selected,
                        cond,
                        if_true: Operand::Const(if_true),
                        if_false: Operand::Const(if_false),
                    });
                    Operand::Reg(selected)
                }
            }
            Terminator::Switch {
                value: scrutinee,
                cases,
                default,
            } => {
                let fallback = value(default);
                if cases.iter().all(|(_, target)| value(*target) == fallback) {
                    Operand::Const(fallback)
                } else {
                    // Built innermost-first so the first matching case wins.
                    let mut acc = Operand::Const(fallback);
                    for (case, target) in cases.iter().rev() {
                        let matches = function.new_temp();
                        out.push(Instruction::Binary {
                            op: BinaryOp::Eq,
                            dst: matches,
                            lhs: scrutinee,
                            rhs: Operand::Const(*case),
                        });
                        let selected = function.new_temp();
                        out.push(Instruction::Select {
                            dst: selected,
                            cond: Operand::Reg(matches),
                            if_true: Operand::Const(value(*target)),
                            if_false: acc,
                        });
                        acc = Operand::Reg(selected);
                    }
                    acc
                }
            }
            Terminator::Return(_) | Terminator::Unreachable => {
                return Err(malformed_error!(
                    "block {} has edge adjustments but no successors",
                    block
                ));
            }
        };

        out.push(Instruction::Store { dst, value: stored });
        Ok(out)
    }

    /// Saves `G`, clears it for the callee and restores it afterwards, around every call.
    fn guard_calls(&self, function: &mut Function, block: BlockId) {
        let calls: Vec<usize> = function
            .block(block)
            .map(|b| {
                b.instructions()
                    .iter()
                    .enumerate()
                    .filter(|(_, instruction)| matches!(instruction, Instruction::Call { .. }))
                    .map(|(index, _)| index)
                    .collect()
            })
            .unwrap_or_default();

        for index in calls.into_iter().rev() {
            let saved: Reg = function.new_temp();
            if let Some(target) = function.block_mut(block) {
                target.insert_at(
                    index + 1,
                    vec![Instruction::Store {
                        dst: self.layout.running,
                        value: Operand::Reg(saved),
                    }],
                );
                target.insert_at(
                    index,
                    vec![
                        Instruction::Load {
                            dst: saved,
                            src: self.layout.running,
                        },
                        Instruction::Store {
                            dst: self.layout.running,
                            value: Operand::Const(0),
                        },
                    ],
                );
            }
        }
    }
}
