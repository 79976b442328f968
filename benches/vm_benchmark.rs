//! Interpreter benchmarks: call overhead, arithmetic loops and allocation
//! pressure with and without collection.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::io;
use std::time::Duration;

use stil::il::{BlockId, Context, Function, Instr, NumKind, Type};
use stil::{Runtime, RuntimeConfig};

fn emit_all(f: &mut Function, block: BlockId, instrs: &[Instr]) {
    for instr in instrs {
        f.emit(block, *instr).unwrap();
    }
}

/// `fib(n: i64) -> i64`, doubly recursive.
fn fib_context() -> Context {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let fib = ctx.function_ref(m, "main", "fib").unwrap();
    let mut f = Function::new("fib", Some(Type::i64()));
    f.add_param("n", Type::i64());
    let recurse = f.new_block();
    let base = f.new_block();
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::LoadArg(0),
            Instr::push_i64(1),
            Instr::Le(NumKind::I64),
            Instr::JumpIfFalse(recurse),
            Instr::Jump(base),
        ],
    );
    emit_all(
        &mut f,
        recurse,
        &[
            Instr::LoadArg(0),
            Instr::push_i64(1),
            Instr::Sub(NumKind::I64),
            Instr::Call(fib),
            Instr::LoadArg(0),
            Instr::push_i64(2),
            Instr::Sub(NumKind::I64),
            Instr::Call(fib),
            Instr::Add(NumKind::I64),
            Instr::Return,
        ],
    );
    emit_all(&mut f, base, &[Instr::LoadArg(0), Instr::Return]);
    ctx.add_function(m, f).unwrap();
    ctx
}

/// `sum(n: i64) -> i64`, the sum of `0..n`.
fn sum_context() -> Context {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let mut f = Function::new("sum", Some(Type::i64()));
    f.add_param("n", Type::i64());
    let total = f.declare_local(Type::i64());
    let i = f.declare_local(Type::i64());
    let cond = f.new_block();
    let body = f.new_block();
    let exit = f.new_block();
    emit_all(&mut f, BlockId::ENTRY, &[Instr::Jump(cond)]);
    emit_all(
        &mut f,
        cond,
        &[
            Instr::LoadLocal(i),
            Instr::LoadArg(0),
            Instr::Lt(NumKind::I64),
            Instr::JumpIfFalse(exit),
            Instr::Jump(body),
        ],
    );
    emit_all(
        &mut f,
        body,
        &[
            Instr::LoadLocal(total),
            Instr::LoadLocal(i),
            Instr::Add(NumKind::I64),
            Instr::StoreLocal(total),
            Instr::LoadLocal(i),
            Instr::push_i64(1),
            Instr::Add(NumKind::I64),
            Instr::StoreLocal(i),
            Instr::Jump(cond),
        ],
    );
    emit_all(&mut f, exit, &[Instr::LoadLocal(total), Instr::Return]);
    ctx.add_function(m, f).unwrap();
    ctx
}

/// `churn(n: i32)`: allocate and drop `n` arrays of 16 ints.
fn churn_context() -> Context {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let int = ctx.type_ref(m, &Type::i32()).unwrap();
    let ints = ctx.type_ref(m, &Type::dynamic_array(Type::i32())).unwrap();
    let mut f = Function::new("churn", None);
    f.add_param("n", Type::i32());
    let i = f.declare_local(Type::i32());
    let cond = f.new_block();
    let body = f.new_block();
    let exit = f.new_block();
    emit_all(&mut f, BlockId::ENTRY, &[Instr::Jump(cond)]);
    emit_all(
        &mut f,
        cond,
        &[
            Instr::LoadLocal(i),
            Instr::LoadArg(0),
            Instr::Lt(NumKind::I32),
            Instr::JumpIfFalse(exit),
            Instr::Jump(body),
        ],
    );
    emit_all(
        &mut f,
        body,
        &[
            Instr::push_i32(16),
            Instr::NewArray(int),
            Instr::Pop(ints),
            Instr::LoadLocal(i),
            Instr::push_i32(1),
            Instr::Add(NumKind::I32),
            Instr::StoreLocal(i),
            Instr::Jump(cond),
        ],
    );
    emit_all(&mut f, exit, &[Instr::Return]);
    ctx.add_function(m, f).unwrap();
    ctx
}

fn runtime(ctx: Context, config: &RuntimeConfig) -> Runtime {
    Runtime::with_output(ctx, config, Box::new(io::sink())).unwrap()
}

fn bench_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("fibonacci");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    let mut rt = runtime(fib_context(), &RuntimeConfig::default());
    for n in [15i64, 20, 25] {
        group.bench_with_input(BenchmarkId::new("interpreter", n), &n, |b, &n| {
            b.iter(|| {
                let mut inv = rt.begin_invoke("main", "fib").unwrap();
                rt.push_argument(&mut inv, black_box(n), 0).unwrap();
                rt.invoke::<i64>(inv).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_sum_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("sum_loop");
    group.sample_size(10);

    let mut rt = runtime(sum_context(), &RuntimeConfig::default());
    for n in [10_000i64, 100_000] {
        group.bench_with_input(BenchmarkId::new("interpreter", n), &n, |b, &n| {
            b.iter(|| {
                let mut inv = rt.begin_invoke("main", "sum").unwrap();
                rt.push_argument(&mut inv, black_box(n), 0).unwrap();
                rt.invoke::<i64>(inv).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    group.sample_size(10);

    for (name, gc_enabled) in [("gc", true), ("no_gc", false)] {
        let config = RuntimeConfig {
            heap_capacity: 64 * 1024,
            gc_enabled,
            ..RuntimeConfig::default()
        };
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut rt = runtime(churn_context(), &config);
                let mut inv = rt.begin_invoke("main", "churn").unwrap();
                rt.push_argument(&mut inv, black_box(10_000i32), 0).unwrap();
                rt.invoke_void(inv).unwrap();
                rt.gc_stats()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_calls, bench_sum_loop, bench_allocation);
criterion_main!(benches);
