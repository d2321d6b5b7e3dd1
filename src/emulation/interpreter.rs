//! IR interpreter.

use log::{debug, warn};

use crate::{
    config::CfcssConfig,
    emulation::{
        AbortHandler, ControlFlowViolation, ExecutionOutcome, FaultAction, FaultHandler,
        JumpFault,
    },
    ir::{BlockId, Function, Instruction, Module, Operand, Reg, Storage, Terminator},
    Error, Result,
};

/// Default bound on nested calls.
const MAX_CALL_DEPTH: usize = 1024;

/// How one activation ended.
enum Flow {
    Returned(Option<i64>),
    Faulted(ControlFlowViolation),
}

/// Registers and frame slots of one activation.
struct Frame {
    vars: Vec<i64>,
    temps: Vec<i64>,
    slots: Vec<i64>,
}

impl Frame {
    fn new(function: &Function) -> Self {
        Self {
            vars: vec![0; function.var_count() as usize],
            temps: vec![0; function.temp_count() as usize],
            slots: vec![0; function.frame_slots().len()],
        }
    }

    fn reg(&self, reg: Reg) -> Result<i64> {
        let value = match reg {
            Reg::Var(idx) => self.vars.get(idx as usize),
            Reg::Temp(idx) => self.temps.get(idx as usize),
        };
        value
            .copied()
            .ok_or_else(|| Error::Execution(format!("unbound register {reg}")))
    }

    fn set(&mut self, reg: Reg, value: i64) -> Result<()> {
        let slot = match reg {
            Reg::Var(idx) => self.vars.get_mut(idx as usize),
            Reg::Temp(idx) => self.temps.get_mut(idx as usize),
        };
        let slot = slot.ok_or_else(|| Error::Execution(format!("unbound register {reg}")))?;
        *slot = value;
        Ok(())
    }

    fn operand(&self, operand: Operand) -> Result<i64> {
        match operand {
            Operand::Const(value) => Ok(value),
            Operand::Reg(reg) => self.reg(reg),
        }
    }
}

/// Truncates `value` to a storage location of `width` bits.
fn truncate(value: i64, width: u32) -> i64 {
    if width >= 64 {
        value
    } else {
        value & ((1_i64 << width) - 1)
    }
}

/// Executes functions of a [`Module`].
///
/// Globals live for the whole lifetime of the interpreter, so repeated [`Interpreter::run`]
/// calls observe each other's side effects, as a program calling a function several
/// times would. Every activation gets fresh zeroed registers and frame slots; parameters
/// are bound to the first variables.
///
/// A failed `check` first calls the module's own handler function, when the module
/// defines one, with `(actual, expected)`. The [`FaultHandler`] then decides whether
/// execution aborts with [`ExecutionOutcome::Faulted`] or resumes after the check.
///
/// # Examples
///
/// ```rust
/// use cfcss::emulation::{ExecutionOutcome, Interpreter};
/// use cfcss::ir::{BinaryOp, FunctionBuilder, Module};
///
/// let mut b = FunctionBuilder::new("double", 1);
/// let entry = b.block("entry");
/// let x = b.param(0);
/// let y = b.binary(entry, BinaryOp::Add, x, x);
/// b.ret(entry, Some(y.into()));
///
/// let mut module = Module::new("demo");
/// module.add_function(b.build()?)?;
///
/// let mut interpreter = Interpreter::new(&module);
/// assert_eq!(interpreter.run("double", &[21])?, ExecutionOutcome::Returned(Some(42)));
/// # Ok::<(), cfcss::Error>(())
/// ```
pub struct Interpreter<'m, H = AbortHandler> {
    module: &'m Module,
    handler: H,
    globals: Vec<i64>,
    fault: Option<JumpFault>,
    max_steps: u64,
    max_depth: usize,
    steps: u64,
}

impl<'m> Interpreter<'m, AbortHandler> {
    /// Creates an interpreter that aborts on the first violation.
    #[must_use]
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            handler: AbortHandler,
            globals: module
                .globals()
                .iter()
                .map(|global| truncate(global.init, global.width))
                .collect(),
            fault: None,
            max_steps: 1_000_000,
            max_depth: MAX_CALL_DEPTH,
            steps: 0,
        }
    }
}

impl<'m, H: FaultHandler> Interpreter<'m, H> {
    /// Replaces the fault handler.
    #[must_use]
    pub fn with_handler<H2: FaultHandler>(self, handler: H2) -> Interpreter<'m, H2> {
        Interpreter {
            module: self.module,
            handler,
            globals: self.globals,
            fault: self.fault,
            max_steps: self.max_steps,
            max_depth: self.max_depth,
            steps: self.steps,
        }
    }

    /// Sets the step budget shared by all subsequent runs.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Applies the emulation settings of `config`: the step budget.
    #[must_use]
    pub fn with_config(self, config: &CfcssConfig) -> Self {
        self.with_max_steps(config.max_steps)
    }

    /// Sets the maximum call depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Arms a corrupted jump. It fires at most once.
    #[must_use]
    pub fn with_fault(mut self, fault: JumpFault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Returns the fault handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consumes the interpreter and returns the fault handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Returns the number of executed instructions and terminators.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns `true` while an armed fault has not fired yet.
    #[must_use]
    pub fn fault_pending(&self) -> bool {
        self.fault.is_some()
    }

    /// Returns the current value of every global, indexed like [`Module::globals`].
    #[must_use]
    pub fn globals(&self) -> &[i64] {
        &self.globals
    }

    /// Returns the current value of the global called `name`.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<i64> {
        let id = self.module.global_by_name(name)?;
        self.globals.get(id.index()).copied()
    }

    /// Calls `function` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] for undefined functions, arity mismatches, unbound
    /// registers, out-of-range storage, division by zero, reaching `unreachable` and
    /// exceeding the call depth, and [`Error::StepLimit`] when the step budget runs out.
    pub fn run(&mut self, function: &str, args: &[i64]) -> Result<ExecutionOutcome> {
        debug!("running {function}({args:?})");
        match self.call(function, args, 0)? {
            Flow::Returned(value) => Ok(ExecutionOutcome::Returned(value)),
            Flow::Faulted(violation) => Ok(ExecutionOutcome::Faulted(violation)),
        }
    }

    fn step(&mut self) -> Result<()> {
        if self.steps >= self.max_steps {
            return Err(Error::StepLimit(self.max_steps));
        }
        self.steps += 1;
        Ok(())
    }

    fn call(&mut self, name: &str, args: &[i64], depth: usize) -> Result<Flow> {
        if depth >= self.max_depth {
            return Err(Error::Execution(format!(
                "call depth limit of {} exceeded calling '{name}'",
                self.max_depth
            )));
        }

        let module = self.module;
        let function = module
            .function(name)
            .ok_or_else(|| Error::Execution(format!("call to undefined function '{name}'")))?;
        if function.is_declaration() {
            return Err(Error::Execution(format!(
                "call to declaration '{name}' without a body"
            )));
        }
        if args.len() != function.params() as usize {
            return Err(Error::Execution(format!(
                "'{name}' takes {} arguments, {} given",
                function.params(),
                args.len()
            )));
        }

        let mut frame = Frame::new(function);
        frame.vars[..args.len()].copy_from_slice(args);

        let mut current = function.entry();
        loop {
            let block = function.block(current).ok_or_else(|| {
                Error::Execution(format!("'{name}' has no block {current}"))
            })?;

            for instruction in block.instructions() {
                self.step()?;
                if let Some(violation) =
                    self.execute(function, current, &mut frame, instruction, depth)?
                {
                    return Ok(Flow::Faulted(violation));
                }
            }

            if let Some(target) = self.take_fault(function, current) {
                warn!("injected jump in {name}: {current} -> {target}");
                current = target;
                continue;
            }

            self.step()?;
            let terminator = block.terminator().ok_or_else(|| {
                Error::Execution(format!("block {current} of '{name}' has no terminator"))
            })?;
            current = match terminator {
                Terminator::Jump(target) => *target,
                Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                } => {
                    if frame.operand(*cond)? != 0 {
                        *then_block
                    } else {
                        *else_block
                    }
                }
                Terminator::Switch {
                    value,
                    cases,
                    default,
                } => {
                    let value = frame.operand(*value)?;
                    cases
                        .iter()
                        .find(|(case, _)| *case == value)
                        .map_or(*default, |(_, target)| *target)
                }
                Terminator::Return(value) => {
                    let value = value.map(|v| frame.operand(v)).transpose()?;
                    return Ok(Flow::Returned(value));
                }
                Terminator::Unreachable => {
                    return Err(Error::Execution(format!(
                        "reached unreachable in block {current} of '{name}'"
                    )));
                }
            };
        }
    }

    fn take_fault(&mut self, function: &Function, block: BlockId) -> Option<BlockId> {
        let fires = self
            .fault
            .as_ref()
            .is_some_and(|fault| fault.function == function.name() && fault.from == block);
        if fires {
            self.fault.take().map(|fault| fault.to)
        } else {
            None
        }
    }

    /// Executes one instruction; returns a violation when a check aborts.
    fn execute(
        &mut self,
        function: &Function,
        block: BlockId,
        frame: &mut Frame,
        instruction: &Instruction,
        depth: usize,
    ) -> Result<Option<ControlFlowViolation>> {
        match instruction {
            Instruction::Copy { dst, src } => {
                let value = frame.operand(*src)?;
                frame.set(*dst, value)?;
            }
            Instruction::Binary { op, dst, lhs, rhs } => {
                let value = op
                    .apply(frame.operand(*lhs)?, frame.operand(*rhs)?)
                    .ok_or_else(|| {
                        Error::Execution(format!("division by zero in '{}'", function.name()))
                    })?;
                frame.set(*dst, value)?;
            }
            Instruction::Select {
                dst,
                cond,
                if_true,
                if_false,
            } => {
                let value = if frame.operand(*cond)? != 0 {
                    frame.operand(*if_true)?
                } else {
                    frame.operand(*if_false)?
                };
                frame.set(*dst, value)?;
            }
            Instruction::Load { dst, src } => {
                let value = self.load(function, frame, *src)?;
                frame.set(*dst, value)?;
            }
            Instruction::Store { dst, value } => {
                let value = frame.operand(*value)?;
                self.store(function, frame, *dst, value)?;
            }
            Instruction::Call { dst, callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| frame.operand(*arg))
                    .collect::<Result<Vec<_>>>()?;
                match self.call(callee, &args, depth + 1)? {
                    Flow::Returned(value) => {
                        if let Some(dst) = dst {
                            frame.set(*dst, value.unwrap_or(0))?;
                        }
                    }
                    Flow::Faulted(violation) => return Ok(Some(violation)),
                }
            }
            Instruction::CheckSignature {
                actual,
                expected,
                handler,
            } => {
                let actual = frame.operand(*actual)?;
                if actual == i64::from(expected.get()) {
                    return Ok(None);
                }

                let violation = ControlFlowViolation {
                    function: function.name().to_string(),
                    block,
                    actual: truncate(actual, 32) as u32,
                    expected: *expected,
                };
                warn!("{violation}");

                if self
                    .module
                    .function(handler)
                    .is_some_and(|f| !f.is_declaration())
                {
                    let args = [actual, i64::from(expected.get())];
                    if let Flow::Faulted(nested) = self.call(handler, &args, depth + 1)? {
                        return Ok(Some(nested));
                    }
                }

                if self.handler.on_violation(&violation) == FaultAction::Abort {
                    return Ok(Some(violation));
                }
            }
        }
        Ok(None)
    }

    fn load(&self, function: &Function, frame: &Frame, src: Storage) -> Result<i64> {
        match src {
            Storage::Global(id) => self.globals.get(id.index()).copied(),
            Storage::Frame(slot) => frame.slots.get(slot.index()).copied(),
        }
        .ok_or_else(|| {
            Error::Execution(format!("load from unknown {src} in '{}'", function.name()))
        })
    }

    fn store(
        &mut self,
        function: &Function,
        frame: &mut Frame,
        dst: Storage,
        value: i64,
    ) -> Result<()> {
        let unknown =
            || Error::Execution(format!("store to unknown {dst} in '{}'", function.name()));
        match dst {
            Storage::Global(id) => {
                let width = self.module.global(id).ok_or_else(unknown)?.width;
                let slot = self.globals.get_mut(id.index()).ok_or_else(unknown)?;
                *slot = truncate(value, width);
            }
            Storage::Frame(id) => {
                let width = function.frame_slots().get(id.index()).ok_or_else(unknown)?.width;
                let slot = frame.slots.get_mut(id.index()).ok_or_else(unknown)?;
                *slot = truncate(value, width);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::RecordingHandler,
        instrument::Signature,
        ir::{BinaryOp, FunctionBuilder, Global},
    };

    fn module_with(functions: Vec<Function>) -> Module {
        let mut module = Module::new("test");
        for function in functions {
            module.add_function(function).unwrap();
        }
        module
    }

    fn max() -> Function {
        let mut b = FunctionBuilder::new("max", 2);
        let entry = b.block("entry");
        let left = b.block("left");
        let right = b.block("right");
        let (x, y) = (b.param(0), b.param(1));
        let cond = b.binary(entry, BinaryOp::Gt, x, y);
        b.branch(entry, cond, left, right);
        b.ret(left, Some(x.into()));
        b.ret(right, Some(y.into()));
        b.build().unwrap()
    }

    #[test]
    fn test_run_branches() {
        let module = module_with(vec![max()]);
        let mut interpreter = Interpreter::new(&module);
        assert_eq!(interpreter.run("max", &[3, 9]).unwrap().return_value(), Some(9));
        assert_eq!(interpreter.run("max", &[12, 9]).unwrap().return_value(), Some(12));
        assert!(interpreter.steps() > 0);
    }

    #[test]
    fn test_switch_first_match_wins() {
        let mut b = FunctionBuilder::new("pick", 1);
        let entry = b.block("entry");
        let one = b.block("one");
        let two = b.block("two");
        let other = b.block("other");
        b.switch(entry, b.param(0), vec![(1, one), (1, two), (2, two)], other);
        b.ret(one, Some(Operand::Const(10)));
        b.ret(two, Some(Operand::Const(20)));
        b.ret(other, Some(Operand::Const(0)));
        let module = module_with(vec![b.build().unwrap()]);

        let mut interpreter = Interpreter::new(&module);
        assert_eq!(interpreter.run("pick", &[1]).unwrap().return_value(), Some(10));
        assert_eq!(interpreter.run("pick", &[2]).unwrap().return_value(), Some(20));
        assert_eq!(interpreter.run("pick", &[5]).unwrap().return_value(), Some(0));
    }

    #[test]
    fn test_globals_persist_and_truncate() {
        let mut module = Module::new("test");
        let counter = module.add_global(Global::program("counter", 0)).unwrap();
        let reg = module.get_or_insert_register("G").unwrap();

        let mut b = FunctionBuilder::new("bump", 0);
        let entry = b.block("entry");
        let old = b.load(entry, Storage::Global(counter));
        let new = b.binary(entry, BinaryOp::Add, old, 1);
        b.store(entry, Storage::Global(counter), new);
        b.store(entry, Storage::Global(reg), -1);
        b.ret(entry, None);
        module.add_function(b.build().unwrap()).unwrap();

        let mut interpreter = Interpreter::new(&module);
        interpreter.run("bump", &[]).unwrap();
        interpreter.run("bump", &[]).unwrap();
        assert_eq!(interpreter.global("counter"), Some(2));
        assert_eq!(interpreter.global("G"), Some(0xFFFF_FFFF));
    }

    #[test]
    fn test_frame_slots_are_per_activation() {
        let mut b = FunctionBuilder::new("fact", 1);
        let entry = b.block("entry");
        let base = b.block("base");
        let rec = b.block("rec");
        let n = b.param(0);
        let slot = b.slot("saved");
        b.store(entry, slot, n);
        let done = b.binary(entry, BinaryOp::Le, n, 1);
        b.branch(entry, done, base, rec);
        b.ret(base, Some(Operand::Const(1)));
        let m = b.binary(rec, BinaryOp::Sub, n, 1);
        let sub = b.call(rec, "fact", vec![m.into()]);
        let saved = b.load(rec, slot);
        let product = b.binary(rec, BinaryOp::Mul, saved, sub);
        b.ret(rec, Some(product.into()));
        let module = module_with(vec![b.build().unwrap()]);

        let mut interpreter = Interpreter::new(&module);
        assert_eq!(interpreter.run("fact", &[5]).unwrap().return_value(), Some(120));
    }

    #[test]
    fn test_check_failure_calls_handler_once() {
        let mut b = FunctionBuilder::new("f", 0);
        let entry = b.block("entry");
        b.push(
            entry,
            Instruction::CheckSignature {
                actual: Operand::Const(3),
                expected: Signature::new(5).unwrap(),
                handler: "__ctt_error".to_string(),
            },
        );
        b.ret(entry, Some(Operand::Const(1)));
        let module = module_with(vec![b.build().unwrap()]);

        let mut interpreter = Interpreter::new(&module).with_handler(RecordingHandler::resume());
        let outcome = interpreter.run("f", &[]).unwrap();
        assert_eq!(outcome, ExecutionOutcome::Returned(Some(1)));
        assert_eq!(interpreter.handler().violations().len(), 1);
        assert_eq!(interpreter.handler().violations()[0].actual, 3);

        let mut interpreter = Interpreter::new(&module);
        let outcome = interpreter.run("f", &[]).unwrap();
        assert!(outcome.is_faulted());
        assert_eq!(outcome.violation().unwrap().block, entry);
    }

    #[test]
    fn test_check_failure_calls_module_handler() {
        let mut module = Module::new("test");
        let seen = module.add_global(Global::program("seen", 0)).unwrap();

        let mut b = FunctionBuilder::new("__ctt_error", 2);
        let entry = b.block("entry");
        b.store(entry, Storage::Global(seen), b.param(1));
        b.ret(entry, None);
        module.add_function(b.build().unwrap()).unwrap();

        let mut b = FunctionBuilder::new("f", 0);
        let entry = b.block("entry");
        b.push(
            entry,
            Instruction::CheckSignature {
                actual: Operand::Const(3),
                expected: Signature::new(5).unwrap(),
                handler: "__ctt_error".to_string(),
            },
        );
        b.ret(entry, None);
        module.add_function(b.build().unwrap()).unwrap();

        let mut interpreter = Interpreter::new(&module);
        assert!(interpreter.run("f", &[]).unwrap().is_faulted());
        assert_eq!(interpreter.global("seen"), Some(5));
    }

    #[test]
    fn test_jump_fault_fires_once() {
        let mut b = FunctionBuilder::new("loop3", 0);
        let entry = b.block("entry");
        let head = b.block("head");
        let exit = b.block("exit");
        let i = b.var();
        b.copy(entry, i, 0);
        b.jump(entry, head);
        let next = b.binary(head, BinaryOp::Add, i, 1);
        b.copy(head, i, next);
        let more = b.binary(head, BinaryOp::Lt, i, 3);
        b.branch(head, more, head, exit);
        b.ret(exit, Some(i.into()));
        let module = module_with(vec![b.build().unwrap()]);

        let mut interpreter =
            Interpreter::new(&module).with_fault(JumpFault::new("loop3", head, exit));
        assert_eq!(interpreter.run("loop3", &[]).unwrap().return_value(), Some(1));
        assert!(!interpreter.fault_pending());
        assert_eq!(interpreter.run("loop3", &[]).unwrap().return_value(), Some(3));
    }

    #[test]
    fn test_step_limit() {
        let mut b = FunctionBuilder::new("spin", 0);
        let entry = b.block("entry");
        b.jump(entry, entry);
        let module = module_with(vec![b.build().unwrap()]);

        let mut interpreter = Interpreter::new(&module).with_max_steps(50);
        assert!(matches!(interpreter.run("spin", &[]), Err(Error::StepLimit(50))));

        let config = CfcssConfig::default().with_max_steps(20);
        let mut interpreter = Interpreter::new(&module).with_config(&config);
        assert!(matches!(interpreter.run("spin", &[]), Err(Error::StepLimit(20))));
    }

    #[test]
    fn test_execution_errors() {
        let mut b = FunctionBuilder::new("div", 1);
        let entry = b.block("entry");
        let q = b.binary(entry, BinaryOp::Div, 10, b.param(0));
        b.ret(entry, Some(q.into()));
        let mut b2 = FunctionBuilder::new("dead", 0);
        let entry2 = b2.block("entry");
        b2.terminate(entry2, Terminator::Unreachable);
        let module = module_with(vec![b.build().unwrap(), b2.build().unwrap()]);

        let mut interpreter = Interpreter::new(&module);
        assert!(matches!(interpreter.run("div", &[0]), Err(Error::Execution(_))));
        assert!(matches!(interpreter.run("div", &[]), Err(Error::Execution(_))));
        assert!(matches!(interpreter.run("dead", &[]), Err(Error::Execution(_))));
        assert!(matches!(interpreter.run("missing", &[]), Err(Error::Execution(_))));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut b = FunctionBuilder::new("forever", 0);
        let entry = b.block("entry");
        b.call(entry, "forever", Vec::new());
        b.ret(entry, None);
        let module = module_with(vec![b.build().unwrap()]);

        let mut interpreter = Interpreter::new(&module).with_max_depth(16);
        assert!(matches!(interpreter.run("forever", &[]), Err(Error::Execution(_))));
    }
}
