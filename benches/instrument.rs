//! Benchmarks for the CFCSS instrumentation.
//!
//! Measures the stages on synthetic functions of growing size:
//! - CFG construction and signature assignment
//! - Planning
//! - The full pass, sequential and through the parallel pass manager
//! - Interpreting instrumented code

extern crate cfcss;

use cfcss::{
    analysis::ControlFlowGraph,
    compiler::{FunctionPass, PassManager},
    config::{CfcssConfig, RegisterScope},
    emulation::Interpreter,
    instrument::{CfcssPass, Planner, SignatureAssigner},
    ir::{BinaryOp, Function, FunctionBuilder, Module},
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

/// A chain of `diamonds` if/else diamonds, each adding one of two constants.
fn diamonds(name: &str, diamonds: usize) -> Function {
    let mut b = FunctionBuilder::new(name, 1);
    let x = b.param(0);
    let acc = b.var();
    let mut current = b.block("entry");
    b.copy(current, acc, 0);

    for i in 0..diamonds {
        let left = b.block(format!("left{i}"));
        let right = b.block(format!("right{i}"));
        let join = b.block(format!("join{i}"));
        let bit = b.binary(current, BinaryOp::Shr, x, (i % 63) as i64);
        let cond = b.binary(current, BinaryOp::And, bit, 1);
        b.branch(current, cond, left, right);
        let l = b.binary(left, BinaryOp::Add, acc, 3);
        b.copy(left, acc, l);
        b.jump(left, join);
        let r = b.binary(right, BinaryOp::Add, acc, 5);
        b.copy(right, acc, r);
        b.jump(right, join);
        current = join;
    }

    b.ret(current, Some(acc.into()));
    b.build().unwrap()
}

fn module(functions: usize, size: usize) -> Module {
    let mut module = Module::new("bench");
    for i in 0..functions {
        module
            .add_function(diamonds(&format!("f{i}"), size))
            .unwrap();
    }
    module
}

/// Benchmark CFG construction plus signature assignment.
fn bench_assign(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign");
    for size in [10, 100, 1000] {
        let function = diamonds("f", size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &function, |b, function| {
            b.iter(|| {
                let cfg = ControlFlowGraph::new(black_box(function)).unwrap();
                black_box(SignatureAssigner::default().assign(&cfg).unwrap())
            });
        });
    }
    group.finish();
}

/// Benchmark planning on a prebuilt CFG and table.
fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    for size in [10, 100, 1000] {
        let function = diamonds("f", size);
        let cfg = ControlFlowGraph::new(&function).unwrap();
        let table = SignatureAssigner::default().assign(&cfg).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(Planner::default().plan(&cfg, &table).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark the complete pass on a single function.
fn bench_instrument_function(c: &mut Criterion) {
    let mut group = c.benchmark_group("instrument_function");
    let pass = CfcssPass::new(CfcssConfig::default().with_scope(RegisterScope::PerActivation));
    for size in [10, 100, 1000] {
        let function = diamonds("f", size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &function, |b, function| {
            b.iter(|| {
                let mut work = function.clone();
                pass.run_on_function(&mut work).unwrap();
                black_box(work)
            });
        });
    }
    group.finish();
}

/// Benchmark the pass manager over a module of many functions.
fn bench_pass_manager(c: &mut Criterion) {
    let original = module(64, 100);
    c.bench_function("pass_manager_64x100", |b| {
        b.iter(|| {
            let mut work = original.clone();
            let mut manager =
                PassManager::new().with_pass(Box::new(CfcssPass::new(CfcssConfig::default())));
            black_box(manager.run(&mut work).unwrap())
        });
    });
}

/// Benchmark the interpreter on plain and instrumented code.
fn bench_interpret(c: &mut Criterion) {
    let plain = module(1, 200);
    let mut instrumented = plain.clone();
    PassManager::new()
        .with_pass(Box::new(CfcssPass::new(CfcssConfig::default())))
        .run(&mut instrumented)
        .unwrap();

    let mut group = c.benchmark_group("interpret");
    for (name, module) in [("plain", &plain), ("instrumented", &instrumented)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut interpreter = Interpreter::new(module);
                black_box(interpreter.run("f0", &[black_box(0x5555)]).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_assign,
    bench_plan,
    bench_instrument_function,
    bench_pass_manager,
    bench_interpret
);
criterion_main!(benches);
