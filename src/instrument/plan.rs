//! Instrumentation planning.
//!
//! The planner turns a CFG and its [`SignatureTable`] into an [`InstrumentationPlan`]: for
//! every block a short program over the two signature registers, and for every edge into a
//! merge block the value of `D` the predecessor must leave behind. Plans are abstract; the
//! [`Emitter`](crate::instrument::Emitter) lowers them to IR and the
//! [`PlanSimulator`](crate::instrument::PlanSimulator) executes them directly.
//!
//! Per block `b` with signature `s(b)` the plan establishes `G == s(b)` on entry exactly
//! when control arrived over a legal edge:
//!
//! | predecessors            | entry update                               |
//! |-------------------------|--------------------------------------------|
//! | none, `b` is the entry  | `G := s(b)`, `D := 0`                      |
//! | none, `b` unreachable   | `G := G ^ s(b)`                            |
//! | one, `u`                | `G := G ^ (s(u) ^ s(b))`                   |
//! | several, reference `r`  | `G := G ^ D ^ (s(r) ^ s(b))`, then `D := 0` |
//!
//! Each non-reference predecessor `p` of a merge block stores `D := s(p) ^ s(r)` on its edge
//! into the block. Every update is followed by a check of `G` against `s(b)`.

use std::fmt;

use log::debug;

use crate::{
    analysis::ControlFlowGraph,
    config::RegisterScope,
    error::malformed_error,
    instrument::{Signature, SignatureTable},
    ir::{BlockId, Terminator},
    Result,
};

/// One of the two runtime signature registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureRegister {
    /// The running signature `G`.
    Running,
    /// The adjusting signature `D`.
    Adjusting,
}

impl fmt::Display for SignatureRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureRegister::Running => write!(f, "G"),
            SignatureRegister::Adjusting => write!(f, "D"),
        }
    }
}

/// An abstract instrumentation operation.
///
/// Operations act on the two signature registers and an accumulator holding the value
/// being computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOp {
    /// `reg := value`
    StoreConst {
        /// Destination register.
        reg: SignatureRegister,
        /// Constant to store.
        value: u32,
    },
    /// `acc := reg`
    Load(SignatureRegister),
    /// `acc := acc ^ value`
    XorConst(u32),
    /// `acc := acc ^ reg`
    XorReg(SignatureRegister),
    /// `reg := acc`
    Store(SignatureRegister),
    /// Fault unless `acc == expected`.
    Check(Signature),
}

impl fmt::Display for PlanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOp::StoreConst { reg, value } => write!(f, "{reg} := {value}"),
            PlanOp::Load(reg) => write!(f, "acc := {reg}"),
            PlanOp::XorConst(value) => write!(f, "acc ^= {value:#x}"),
            PlanOp::XorReg(reg) => write!(f, "acc ^= {reg}"),
            PlanOp::Store(reg) => write!(f, "{reg} := acc"),
            PlanOp::Check(expected) => write!(f, "check acc == {expected}"),
        }
    }
}

/// The predecessor that a merge block's entry update is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// The call into the function, with signature 0.
    Invocation,
    /// A real predecessor block.
    Block(BlockId),
}

/// How a block is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredecessorKind {
    /// The function entry, with no predecessors.
    Entry,
    /// A block other than the entry with no predecessors.
    Orphan,
    /// Exactly one predecessor.
    Single(BlockId),
    /// Several predecessors, or the entry with at least one back edge.
    Merge {
        /// The predecessor whose edge stores nothing.
        reference: Reference,
        /// The predecessors that store an adjustment, in ascending order.
        others: Vec<BlockId>,
    },
}

/// The instrumentation of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    /// The block.
    pub block: BlockId,
    /// Its signature.
    pub signature: Signature,
    /// How it is entered.
    pub kind: PredecessorKind,
    /// Operations inserted before the first instruction.
    pub entry: Vec<PlanOp>,
    /// Operations inserted before the terminator when the block returns.
    pub exit: Vec<PlanOp>,
}

/// The value of `D` that block `from` stores when it transfers control to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeAdjustment {
    /// Source block.
    pub from: BlockId,
    /// Target merge block.
    pub to: BlockId,
    /// `s(from) ^ s(reference)`, never 0.
    pub value: u32,
}

/// The complete instrumentation of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationPlan {
    /// Name of the planned function.
    pub function: String,
    /// One plan per block, in layout order.
    pub blocks: Vec<BlockPlan>,
    /// Edge adjustments, ordered by source then target.
    pub edges: Vec<EdgeAdjustment>,
    /// `G` is saved, zeroed and restored around every call.
    pub guard_calls: bool,
}

impl InstrumentationPlan {
    /// Returns the plan of `block`.
    #[must_use]
    pub fn block(&self, block: BlockId) -> Option<&BlockPlan> {
        self.blocks.get(block.index())
    }

    /// Returns the adjustment stored on the edge `from -> to`, if any.
    #[must_use]
    pub fn adjustment(&self, from: BlockId, to: BlockId) -> Option<u32> {
        self.edges
            .iter()
            .find(|edge| edge.from == from && edge.to == to)
            .map(|edge| edge.value)
    }

    /// Returns `true` if `from` stores `D` on at least one of its outgoing edges.
    #[must_use]
    pub fn has_adjustments(&self, from: BlockId) -> bool {
        self.edges.iter().any(|edge| edge.from == from)
    }

    /// Returns `true` if any block clears the registers before returning.
    #[must_use]
    pub fn resets_on_exit(&self) -> bool {
        self.blocks.iter().any(|block| !block.exit.is_empty())
    }

    /// Returns the number of merge blocks.
    #[must_use]
    pub fn merge_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| matches!(block.kind, PredecessorKind::Merge { .. }))
            .count()
    }
}

/// Builds [`InstrumentationPlan`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner {
    scope: RegisterScope,
}

impl Planner {
    /// Creates a planner for registers placed in `scope`.
    #[must_use]
    pub const fn new(scope: RegisterScope) -> Self {
        Self { scope }
    }

    /// Plans the instrumentation of the function behind `cfg`.
    ///
    /// Predecessors are taken in ascending block order; the first one is the reference of a
    /// merge block. An entry block with predecessors is a merge block whose reference is
    /// the invocation, so it expects `G == 0 && D == 0` on entry. In
    /// [`RegisterScope::Global`] every function clears both registers before each return,
    /// so any later invocation starts from zeroed registers, whoever the caller is.
    ///
    /// # Errors
    ///
    /// Returns an error if `table` does not fit the function.
    pub fn plan(
        &self,
        cfg: &ControlFlowGraph<'_>,
        table: &SignatureTable,
    ) -> Result<InstrumentationPlan> {
        let function = cfg.function();
        table.validate(function)?;

        let signature = |block: BlockId| {
            table.get(block).map(Signature::get).ok_or_else(|| {
                malformed_error!("block {} has no signature", block)
            })
        };

        let mut blocks = Vec::with_capacity(cfg.block_count());
        let mut edges = Vec::new();

        for node in cfg.node_ids() {
            let block = BlockId::from(node);
            let own = table.get(block).ok_or_else(|| {
                malformed_error!("block {} has no signature", block)
            })?;
            let preds: Vec<BlockId> = cfg.predecessors(node).map(BlockId::from).collect();

            let kind = match (node == cfg.entry(), preds.as_slice()) {
                (true, []) => PredecessorKind::Entry,
                (false, []) => PredecessorKind::Orphan,
                (false, [single]) => PredecessorKind::Single(*single),
                (true, _) => PredecessorKind::Merge {
                    reference: Reference::Invocation,
                    others: preds,
                },
                (false, [first, rest @ ..]) => PredecessorKind::Merge {
                    reference: Reference::Block(*first),
                    others: rest.to_vec(),
                },
            };

            let entry = match &kind {
                PredecessorKind::Entry => vec![
                    PlanOp::StoreConst {
                        reg: SignatureRegister::Running,
                        value: own.get(),
                    },
                    PlanOp::StoreConst {
                        reg: SignatureRegister::Adjusting,
                        value: 0,
                    },
                    PlanOp::Load(SignatureRegister::Running),
                    PlanOp::Check(own),
                ],
                PredecessorKind::Orphan => Self::transition(own.get(), own),
                PredecessorKind::Single(pred) => {
                    Self::transition(signature(*pred)? ^ own.get(), own)
                }
                PredecessorKind::Merge { reference, others } => {
                    let reference_signature = match reference {
                        Reference::Invocation => 0,
                        Reference::Block(reference) => signature(*reference)?,
                    };
                    for pred in others {
                        edges.push(EdgeAdjustment {
                            from: *pred,
                            to: block,
                            value: signature(*pred)? ^ reference_signature,
                        });
                    }
                    vec![
                        PlanOp::Load(SignatureRegister::Running),
                        PlanOp::XorReg(SignatureRegister::Adjusting),
                        PlanOp::XorConst(reference_signature ^ own.get()),
                        PlanOp::Store(SignatureRegister::Running),
                        PlanOp::Check(own),
                        PlanOp::StoreConst {
                            reg: SignatureRegister::Adjusting,
                            value: 0,
                        },
                    ]
                }
            };

            debug!(
                "{}: {} sig={} {:?} -> [{}]",
                function.name(),
                block,
                own,
                kind,
                entry
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            );

            blocks.push(BlockPlan {
                block,
                signature: own,
                kind,
                entry,
                exit: Vec::new(),
            });
        }

        if self.scope == RegisterScope::Global {
            for plan in &mut blocks {
                let returns = function
                    .block(plan.block)
                    .and_then(|block| block.terminator())
                    .is_some_and(Terminator::is_return);
                if returns {
                    plan.exit = Self::exit_reset();
                }
            }
        }

        edges.sort_by_key(|edge| (edge.from, edge.to));

        Ok(InstrumentationPlan {
            function: function.name().to_string(),
            blocks,
            edges,
            guard_calls: self.scope == RegisterScope::Global,
        })
    }

    /// `G := 0; D := 0` before a return.
    fn exit_reset() -> Vec<PlanOp> {
        vec![
            PlanOp::StoreConst {
                reg: SignatureRegister::Running,
                value: 0,
            },
            PlanOp::StoreConst {
                reg: SignatureRegister::Adjusting,
                value: 0,
            },
        ]
    }

    /// `G := G ^ delta`, then check.
    fn transition(delta: u32, own: Signature) -> Vec<PlanOp> {
        vec![
            PlanOp::Load(SignatureRegister::Running),
            PlanOp::XorConst(delta),
            PlanOp::Store(SignatureRegister::Running),
            PlanOp::Check(own),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instrument::SignatureAssigner,
        ir::{Function, FunctionBuilder},
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

    fn plan_for(function: &Function, scope: RegisterScope) -> InstrumentationPlan {
        let cfg = ControlFlowGraph::new(function).unwrap();
        let table = SignatureAssigner::default().assign(&cfg).unwrap();
        Planner::new(scope).plan(&cfg, &table).unwrap()
    }

    #[test]
    fn test_plan_diamond() {
        let function = diamond();
        let plan = plan_for(&function, RegisterScope::Global);

        assert_eq!(plan.blocks[0].kind, PredecessorKind::Entry);
        assert_eq!(plan.blocks[1].kind, PredecessorKind::Single(BlockId::new(0)));
        assert_eq!(
            plan.blocks[3].kind,
            PredecessorKind::Merge {
                reference: Reference::Block(BlockId::new(1)),
                others: vec![BlockId::new(2)],
            }
        );
        // s(right) ^ s(left) = 3 ^ 2
        assert_eq!(
            plan.edges,
            vec![EdgeAdjustment {
                from: BlockId::new(2),
                to: BlockId::new(3),
                value: 1,
            }]
        );
        assert_eq!(plan.blocks[1].entry[1], PlanOp::XorConst(1 ^ 2));
        assert_eq!(plan.blocks[3].entry[2], PlanOp::XorConst(2 ^ 4));
        assert!(plan.blocks[..3].iter().all(|block| block.exit.is_empty()));
        assert_eq!(plan.blocks[3].exit, Planner::exit_reset());
        assert_eq!(plan.merge_count(), 1);
    }

    #[test]
    fn test_every_update_is_checked() {
        let function = diamond();
        let plan = plan_for(&function, RegisterScope::Global);
        for block in &plan.blocks {
            let store = block
                .entry
                .iter()
                .position(|op| {
                    matches!(
                        op,
                        PlanOp::Store(SignatureRegister::Running)
                            | PlanOp::StoreConst {
                                reg: SignatureRegister::Running,
                                ..
                            }
                    )
                })
                .unwrap();
            assert!(block.entry[store..]
                .iter()
                .any(|op| *op == PlanOp::Check(block.signature)));
        }
    }

    #[test]
    fn test_entry_back_edge() {
        let mut b = FunctionBuilder::new("spin", 1);
        let entry = b.block("entry");
        let exit = b.block("exit");
        b.branch(entry, b.param(0), entry, exit);
        b.ret(exit, None);
        let function = b.build().unwrap();

        let global = plan_for(&function, RegisterScope::Global);
        assert_eq!(
            global.blocks[0].kind,
            PredecessorKind::Merge {
                reference: Reference::Invocation,
                others: vec![BlockId::new(0)],
            }
        );
        assert_eq!(global.adjustment(BlockId::new(0), BlockId::new(0)), Some(1));
        assert!(global.blocks[0].exit.is_empty());
        assert_eq!(global.blocks[1].exit, Planner::exit_reset());

        let frame = plan_for(&function, RegisterScope::PerActivation);
        assert!(!frame.resets_on_exit());
        assert!(!frame.guard_calls);
    }

    #[test]
    fn test_orphan_block() {
        let mut b = FunctionBuilder::new("orphan", 0);
        let entry = b.block("entry");
        let dead = b.block("dead");
        b.ret(entry, None);
        b.ret(dead, None);
        let function = b.build().unwrap();

        let plan = plan_for(&function, RegisterScope::Global);
        assert_eq!(plan.blocks[1].kind, PredecessorKind::Orphan);
        assert_eq!(plan.blocks[1].exit, Planner::exit_reset());
        assert_eq!(plan.blocks[1].entry[1], PlanOp::XorConst(2));
    }

    #[test]
    fn test_every_return_resets_in_global_scope() {
        let mut b = FunctionBuilder::new("early", 1);
        let entry = b.block("entry");
        let early = b.block("early");
        let late = b.block("late");
        b.branch(entry, b.param(0), early, late);
        b.ret(early, None);
        b.ret(late, None);
        let function = b.build().unwrap();

        let global = plan_for(&function, RegisterScope::Global);
        assert!(global.blocks[0].exit.is_empty());
        assert_eq!(global.blocks[1].exit, Planner::exit_reset());
        assert_eq!(global.blocks[2].exit, Planner::exit_reset());
        assert!(!plan_for(&function, RegisterScope::PerActivation).resets_on_exit());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let function = diamond();
        assert_eq!(
            plan_for(&function, RegisterScope::Global),
            plan_for(&function, RegisterScope::Global)
        );
    }

    #[test]
    fn test_plan_rejects_foreign_table() {
        let function = diamond();
        let cfg = ControlFlowGraph::new(&function).unwrap();
        let table = SignatureTable::from_assignments(&[1, 2, 3]).unwrap();
        assert!(Planner::default().plan(&cfg, &table).is_err());
    }
}
