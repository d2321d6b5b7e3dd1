//! Fault reporting and fault injection.

use std::fmt;

use crate::{instrument::Signature, ir::BlockId};

/// A failed signature check observed during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowViolation {
    /// Function containing the failed check.
    pub function: String,
    /// Block containing the failed check.
    pub block: BlockId,
    /// The running signature that was computed.
    pub actual: u32,
    /// The signature of the block.
    pub expected: Signature,
}

impl fmt::Display for ControlFlowViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "control-flow violation in {} at {}: G = {}, expected {}",
            self.function, self.block, self.actual, self.expected
        )
    }
}

/// What execution does after a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultAction {
    /// Stop and report the violation.
    #[default]
    Abort,
    /// Continue after the failed check.
    Resume,
}

/// Decides how a detected violation is handled.
///
/// Called exactly once per failed check. Closures taking a violation and returning a
/// [`FaultAction`] implement this trait.
pub trait FaultHandler {
    /// Handles a violation.
    fn on_violation(&mut self, violation: &ControlFlowViolation) -> FaultAction;
}

impl<F> FaultHandler for F
where
    F: FnMut(&ControlFlowViolation) -> FaultAction,
{
    fn on_violation(&mut self, violation: &ControlFlowViolation) -> FaultAction {
        self(violation)
    }
}

/// Aborts on the first violation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortHandler;

impl FaultHandler for AbortHandler {
    fn on_violation(&mut self, _violation: &ControlFlowViolation) -> FaultAction {
        FaultAction::Abort
    }
}

/// Collects every violation and answers with a fixed action.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    action: FaultAction,
    violations: Vec<ControlFlowViolation>,
}

impl RecordingHandler {
    /// Records violations and aborts on the first one.
    #[must_use]
    pub fn abort() -> Self {
        Self::default()
    }

    /// Records violations and keeps executing.
    #[must_use]
    pub fn resume() -> Self {
        Self {
            action: FaultAction::Resume,
            violations: Vec::new(),
        }
    }

    /// Returns the recorded violations in detection order.
    #[must_use]
    pub fn violations(&self) -> &[ControlFlowViolation] {
        &self.violations
    }
}

impl FaultHandler for RecordingHandler {
    fn on_violation(&mut self, violation: &ControlFlowViolation) -> FaultAction {
        self.violations.push(violation.clone());
        self.action
    }
}

/// A corrupted jump: the first time `from` in `function` finishes its instructions,
/// control goes to `to` instead of following the terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpFault {
    /// Function in which the fault fires.
    pub function: String,
    /// Block whose terminator is bypassed.
    pub from: BlockId,
    /// Block control lands in.
    pub to: BlockId,
}

impl JumpFault {
    /// Creates a fault.
    #[must_use]
    pub fn new(function: impl Into<String>, from: BlockId, to: BlockId) -> Self {
        Self {
            function: function.into(),
            from,
            to,
        }
    }
}

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The function returned normally.
    Returned(Option<i64>),
    /// A violation was detected and the handler aborted.
    Faulted(ControlFlowViolation),
}

impl ExecutionOutcome {
    /// Returns the return value of a normal return.
    #[must_use]
    pub fn return_value(&self) -> Option<i64> {
        match self {
            ExecutionOutcome::Returned(value) => *value,
            ExecutionOutcome::Faulted(_) => None,
        }
    }

    /// Returns the violation that stopped execution.
    #[must_use]
    pub fn violation(&self) -> Option<&ControlFlowViolation> {
        match self {
            ExecutionOutcome::Faulted(violation) => Some(violation),
            ExecutionOutcome::Returned(_) => None,
        }
    }

    /// Returns `true` if execution stopped on a violation.
    #[must_use]
    pub const fn is_faulted(&self) -> bool {
        matches!(self, ExecutionOutcome::Faulted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation() -> ControlFlowViolation {
        ControlFlowViolation {
            function: "f".to_string(),
            block: BlockId::new(3),
            actual: 7,
            expected: Signature::new(4).unwrap(),
        }
    }

    #[test]
    fn test_closure_handler() {
        let mut count = 0;
        let mut handler = |_: &ControlFlowViolation| {
            count += 1;
            FaultAction::Resume
        };
        assert_eq!(handler.on_violation(&violation()), FaultAction::Resume);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_recording_handler() {
        let mut handler = RecordingHandler::resume();
        handler.on_violation(&violation());
        handler.on_violation(&violation());
        assert_eq!(handler.violations().len(), 2);
        assert_eq!(RecordingHandler::abort().on_violation(&violation()), FaultAction::Abort);
    }

    #[test]
    fn test_violation_display() {
        assert_eq!(
            violation().to_string(),
            "control-flow violation in f at bb3: G = 7, expected 4"
        );
    }
}
