#![no_main]

use cfcss::{
    compiler::PassManager,
    config::{CfcssConfig, RegisterScope},
    emulation::Interpreter,
    instrument::CfcssPass,
    ir::{BinaryOp, Function, FunctionBuilder, Module},
    Error,
};
use libfuzzer_sys::fuzz_target;

/// Builds a function of `blocks` blocks whose terminators are drawn from `bytes`.
fn build(name: &str, blocks: usize, bytes: &mut impl Iterator<Item = u8>) -> Option<Function> {
    let mut b = FunctionBuilder::new(name, 1);
    let ids: Vec<_> = (0..blocks).map(|i| b.block(format!("b{i}"))).collect();
    let x = b.param(0);
    let mut next = || usize::from(bytes.next().unwrap_or(0));

    for (i, &id) in ids.iter().enumerate() {
        let target = |n: usize| ids[n % blocks];
        match next() % 4 {
            0 => b.ret(id, Some(x.into())),
            1 => b.jump(id, target(next())),
            2 => {
                let bit = b.binary(id, BinaryOp::Shr, x, (i % 8) as i64);
                let cond = b.binary(id, BinaryOp::And, bit, 1);
                b.branch(id, cond, target(next()), target(next()));
            }
            _ => {
                let cases = (0..3).map(|c| (c, target(next()))).collect();
                let value = b.binary(id, BinaryOp::Rem, x, 4);
                b.switch(id, value, cases, target(next()));
            }
        }
    }

    b.build().ok()
}

// Builds two arbitrary functions from the input, instruments them and runs them one
// after the other on the same interpreter. Executions along legal edges never report
// a violation, whatever ran before.
fuzz_target!(|data: &[u8]| {
    let [first, second, scope, arg, shape @ ..] = data else {
        return;
    };
    if shape.is_empty() {
        return;
    }

    let mut bytes = shape.iter().copied().cycle();
    let mut module = Module::new("fuzz");
    for (name, count) in [("f", first), ("g", second)] {
        let Some(function) = build(name, usize::from(count % 16) + 1, &mut bytes) else {
            return;
        };
        if module.add_function(function).is_err() {
            return;
        }
    }

    let scope = if scope % 2 == 0 {
        RegisterScope::Global
    } else {
        RegisterScope::PerActivation
    };
    let mut manager = PassManager::new()
        .with_pass(Box::new(CfcssPass::new(CfcssConfig::default().with_scope(scope))));
    let report = manager.run(&mut module).unwrap();
    assert!(!report.has_failures());

    let mut interpreter = Interpreter::new(&module).with_max_steps(20_000);
    for name in ["f", "g", "f"] {
        match interpreter.run(name, &[i64::from(*arg)]) {
            Ok(outcome) => assert!(!outcome.is_faulted(), "{name}: {outcome:?}"),
            // An interrupted run leaves the registers mid-function.
            Err(Error::StepLimit(_)) => return,
            Err(error) => panic!("{error}"),
        }
    }
});
