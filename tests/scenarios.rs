//! End-to-end scenarios through the embedding API: build a module graph,
//! push it through the image format and run it.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use stil::il::{BlockId, Context, Function, Instr, ModuleId, NumKind, Type, bytecode};
use stil::{Runtime, RuntimeConfig, Slice, VmError};

#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn emit_all(f: &mut Function, block: BlockId, instrs: &[Instr]) {
    for instr in instrs {
        f.emit(block, *instr).unwrap();
    }
}

fn runtime(ctx: Context, config: &RuntimeConfig) -> Runtime {
    Runtime::with_output(ctx, config, Box::new(io::sink())).unwrap()
}

/// Serialize, decode and load, so every scenario also exercises the image.
fn reload(ctx: &Context, config: &RuntimeConfig, out: &Captured) -> Runtime {
    let bytes = bytecode::serialize(ctx).unwrap();
    let loaded = bytecode::deserialize(&bytes).unwrap();
    Runtime::with_output(loaded, config, Box::new(out.clone())).unwrap()
}

fn sub_function() -> Function {
    let mut f = Function::new("sub", Some(Type::i32()));
    f.add_param("a", Type::i32());
    f.add_param("b", Type::i32());
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::LoadArg(0),
            Instr::LoadArg(1),
            Instr::Sub(NumKind::I32),
            Instr::Return,
        ],
    );
    f
}

#[test]
fn test_round_trip_then_run() {
    let mut ctx = Context::new();
    let lib = ctx.add_module("lib").unwrap();
    let main = ctx.add_module("main").unwrap();
    ctx.add_function(lib, sub_function()).unwrap();

    let hello = ctx.module_mut(main).unwrap().intern_string("hello");
    let string = ctx.type_ref(main, &Type::String).unwrap();
    let call = ctx.function_ref(main, "lib", "sub").unwrap();
    let mut f = Function::new("main", Some(Type::i32()));
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::PushString(hello),
            Instr::Print(string),
            // Arguments go last-first.
            Instr::push_i32(3),
            Instr::push_i32(10),
            Instr::Call(call),
            Instr::Return,
        ],
    );
    ctx.add_function(main, f).unwrap();

    let out = Captured::default();
    let mut rt = reload(&ctx, &RuntimeConfig::default(), &out);
    let inv = rt.begin_invoke("main", "main").unwrap();
    assert_eq!(rt.invoke::<i32>(inv).unwrap(), -7);
    assert_eq!(out.text(), "hello\n");

    let mut inv = rt.begin_invoke("lib", "sub").unwrap();
    rt.push_argument(&mut inv, 10i32, 0).unwrap();
    rt.push_argument(&mut inv, 3i32, 1).unwrap();
    assert_eq!(rt.invoke::<i32>(inv).unwrap(), 7);
}

#[test]
fn test_missing_argument_fails_before_execution() {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    ctx.add_function(m, sub_function()).unwrap();
    let mut rt = runtime(ctx, &RuntimeConfig::default());

    let mut inv = rt.begin_invoke("main", "sub").unwrap();
    rt.push_argument(&mut inv, 3i32, 1).unwrap();
    let before = rt.heap_stats();
    assert!(matches!(
        rt.invoke::<i32>(inv),
        Err(VmError::ArgumentCount { expected: 2, actual: 1, .. })
    ));
    assert_eq!(rt.heap_stats(), before);
    assert_eq!(rt.vm().stack_depth(), 0);
}

#[test]
fn test_locals_leave_heap_untouched() {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let mut f = Function::new("main", Some(Type::i32()));
    f.add_param("x", Type::i32());
    let y = f.declare_local(Type::i32());
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::push_i32(100),
            Instr::StoreLocal(y),
            Instr::LoadLocal(y),
            Instr::LoadArg(0),
            Instr::Add(NumKind::I32),
            Instr::Return,
        ],
    );
    ctx.add_function(m, f).unwrap();

    let out = Captured::default();
    let mut rt = reload(&ctx, &RuntimeConfig::default(), &out);
    let before = rt.heap_stats();
    let mut inv = rt.begin_invoke("main", "main").unwrap();
    rt.push_argument(&mut inv, 10i32, 0).unwrap();
    assert_eq!(rt.invoke::<i32>(inv).unwrap(), 110);
    assert_eq!(rt.heap_stats(), before);
}

/// `churn(n)`: keep one array alive in a local while discarding `n` more.
fn churn_context() -> Context {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let int = ctx.type_ref(m, &Type::i32()).unwrap();
    let ints = ctx.type_ref(m, &Type::dynamic_array(Type::i32())).unwrap();

    let mut f = Function::new("churn", Some(Type::i32()));
    f.add_param("n", Type::i32());
    let keep = f.declare_local(Type::dynamic_array(Type::i32()));
    let i = f.declare_local(Type::i32());
    let cond = f.new_block();
    let body = f.new_block();
    let exit = f.new_block();
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::push_i32(4),
            Instr::NewArray(int),
            Instr::StoreLocal(keep),
            Instr::LoadLocal(keep),
            Instr::push_i32(0),
            Instr::push_i32(7),
            Instr::StoreElement(ints),
            Instr::push_i32(0),
            Instr::StoreLocal(i),
            Instr::Jump(cond),
        ],
    );
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
            Instr::push_i32(8),
            Instr::NewArray(int),
            Instr::Pop(ints),
            Instr::LoadLocal(i),
            Instr::push_i32(1),
            Instr::Add(NumKind::I32),
            Instr::StoreLocal(i),
            Instr::Jump(cond),
        ],
    );
    emit_all(
        &mut f,
        exit,
        &[
            Instr::LoadLocal(keep),
            Instr::push_i32(0),
            Instr::LoadElement(ints),
            Instr::Return,
        ],
    );
    ctx.add_function(m, f).unwrap();
    ctx
}

fn small_heap() -> RuntimeConfig {
    RuntimeConfig {
        heap_capacity: 256,
        stack_size: 256,
        ..RuntimeConfig::default()
    }
}

#[test]
fn test_collection_keeps_reachable_and_reuses_slots() {
    let mut rt = runtime(churn_context(), &small_heap());
    let mut inv = rt.begin_invoke("main", "churn").unwrap();
    rt.push_argument(&mut inv, 200i32, 0).unwrap();
    assert_eq!(rt.invoke::<i32>(inv).unwrap(), 7);

    let gc = rt.gc_stats();
    assert!(gc.cycles > 0);
    assert!(gc.freed_slots > 0);
    // Freed slots are reused, so the table stays far below 200 entries.
    assert!(rt.heap_stats().slots < 32, "{:?}", rt.heap_stats());
}

#[test]
fn test_pinned_host_objects_survive_invocations() {
    let mut rt = runtime(churn_context(), &small_heap());
    let kept = rt.alloc_array(&Type::i32(), 2).unwrap();
    let dropped = rt.alloc_array(&Type::i32(), 2).unwrap();
    rt.set_element(kept, 1, 99i32).unwrap();
    rt.pin(kept.handle).unwrap();

    let mut inv = rt.begin_invoke("main", "churn").unwrap();
    rt.push_argument(&mut inv, 100i32, 0).unwrap();
    rt.invoke::<i32>(inv).unwrap();
    rt.collect_garbage().unwrap();

    assert_eq!(rt.get_element::<i32>(kept, 1).unwrap(), 99);
    assert!(rt.get_element::<i32>(dropped, 0).is_err());

    rt.unpin(kept.handle).unwrap();
    rt.collect_garbage().unwrap();
    assert!(rt.get_element::<i32>(kept, 1).is_err());
}

#[test]
fn test_reference_argument_aliases_host_object() {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let point = ctx
        .define_struct(m, "Point", vec![("x".into(), Type::i32()), ("y".into(), Type::i32())])
        .unwrap();
    let point = Type::Struct(point);
    let point_ref = ctx.type_ref(m, &point).unwrap();

    // bump(p: &Point) { p.x = p.x + 1 }
    let mut f = Function::new("bump", None);
    f.add_param("p", Type::reference(point.clone()));
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::LoadArg(0),
            Instr::LoadArg(0),
            Instr::LoadField {
                ty: point_ref,
                field: 0,
            },
            Instr::push_i32(1),
            Instr::Add(NumKind::I32),
            Instr::StoreField {
                ty: point_ref,
                field: 0,
            },
            Instr::Return,
        ],
    );
    ctx.add_function(m, f).unwrap();

    let out = Captured::default();
    let mut rt = reload(&ctx, &RuntimeConfig::default(), &out);
    let point = rt.context().get_type(ModuleId(0), "Point").unwrap();
    let obj = rt.alloc_object(&point).unwrap();
    rt.set_field(obj, 0, 41i32).unwrap();
    rt.set_field(obj, 1, -5i32).unwrap();

    for _ in 0..2 {
        let mut inv = rt.begin_invoke("main", "bump").unwrap();
        rt.push_argument(&mut inv, obj, 0).unwrap();
        rt.invoke_void(inv).unwrap();
    }
    assert_eq!(rt.get_field::<i32>(obj, 0).unwrap(), 43);
    assert_eq!(rt.get_field::<i32>(obj, 1).unwrap(), -5);
}

#[test]
fn test_static_arrays_copy_and_dynamic_arrays_share() {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let int = ctx.type_ref(m, &Type::i32()).unwrap();
    let triple = Type::array(Type::i32(), 3);
    let triple_ref = ctx.type_ref(m, &triple).unwrap();
    let ints = Type::dynamic_array(Type::i32());
    let ints_ref = ctx.type_ref(m, &ints).unwrap();

    // clobber_static(a: i32[3]) -> i32 { a[0] = 99; a[0] }
    let mut f = Function::new("clobber_static", Some(Type::i32()));
    f.add_param("a", triple.clone());
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::ArgAddr(0),
            Instr::push_i32(0),
            Instr::push_i32(99),
            Instr::StoreElement(triple_ref),
            Instr::ArgAddr(0),
            Instr::push_i32(0),
            Instr::LoadElement(triple_ref),
            Instr::Return,
        ],
    );
    ctx.add_function(m, f).unwrap();

    // clobber_dynamic(a: i32[]) { a[0] = 99 }
    let mut f = Function::new("clobber_dynamic", None);
    f.add_param("a", ints.clone());
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::LoadArg(0),
            Instr::push_i32(0),
            Instr::push_i32(99),
            Instr::StoreElement(ints_ref),
            Instr::Return,
        ],
    );
    ctx.add_function(m, f).unwrap();

    // static_caller() -> i32 { s[0] = 1; clobber_static(s); s[0] }
    let clobber_static = ctx.function_ref(m, "main", "clobber_static").unwrap();
    let mut f = Function::new("static_caller", Some(Type::i32()));
    let s = f.declare_local(triple.clone());
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::LocalAddr(s),
            Instr::push_i32(0),
            Instr::push_i32(1),
            Instr::StoreElement(triple_ref),
            Instr::LoadLocal(s),
            Instr::Call(clobber_static),
            Instr::Pop(int),
            Instr::LocalAddr(s),
            Instr::push_i32(0),
            Instr::LoadElement(triple_ref),
            Instr::Return,
        ],
    );
    ctx.add_function(m, f).unwrap();

    let out = Captured::default();
    let mut rt = reload(&ctx, &RuntimeConfig::default(), &out);

    let inv = rt.begin_invoke("main", "static_caller").unwrap();
    assert_eq!(rt.invoke::<i32>(inv).unwrap(), 1);

    let array: Slice = rt.alloc_array(&Type::i32(), 3).unwrap();
    rt.set_element(array, 0, 5i32).unwrap();
    let mut inv = rt.begin_invoke("main", "clobber_dynamic").unwrap();
    rt.push_argument(&mut inv, array, 0).unwrap();
    rt.invoke_void(inv).unwrap();
    assert_eq!(rt.get_element::<i32>(array, 0).unwrap(), 99);
}

#[test]
fn test_new_array_filled_with_indices() {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let int = ctx.type_ref(m, &Type::i32()).unwrap();
    let ints = ctx.type_ref(m, &Type::dynamic_array(Type::i32())).unwrap();

    let mut f = Function::new("main", Some(Type::dynamic_array(Type::i32())));
    let a = f.declare_local(Type::dynamic_array(Type::i32()));
    let i = f.declare_local(Type::i32());
    let cond = f.new_block();
    let body = f.new_block();
    let exit = f.new_block();
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::push_i32(10),
            Instr::NewArray(int),
            Instr::StoreLocal(a),
            Instr::Jump(cond),
        ],
    );
    emit_all(
        &mut f,
        cond,
        &[
            Instr::LoadLocal(i),
            Instr::push_i32(10),
            Instr::Lt(NumKind::I32),
            Instr::JumpIfFalse(exit),
            Instr::Jump(body),
        ],
    );
    emit_all(
        &mut f,
        body,
        &[
            Instr::LoadLocal(a),
            Instr::LoadLocal(i),
            Instr::LoadLocal(i),
            Instr::StoreElement(ints),
            Instr::LoadLocal(i),
            Instr::push_i32(1),
            Instr::Add(NumKind::I32),
            Instr::StoreLocal(i),
            Instr::Jump(cond),
        ],
    );
    emit_all(&mut f, exit, &[Instr::LoadLocal(a), Instr::Return]);
    ctx.add_function(m, f).unwrap();

    let out = Captured::default();
    let mut rt = reload(&ctx, &RuntimeConfig::default(), &out);
    let inv = rt.begin_invoke("main", "main").unwrap();
    let array: Slice = rt.invoke(inv).unwrap();
    assert_eq!(array.len, 10);
    for index in 0..10 {
        assert_eq!(rt.get_element::<i32>(array, index).unwrap(), index as i32);
    }
}

#[test]
fn test_globals_are_per_module_and_persist() {
    let mut ctx = Context::new();
    let counter = ctx.add_module("counter").unwrap();
    let main = ctx.add_module("main").unwrap();
    ctx.add_global(counter, "count", Type::i64()).unwrap();

    let count = ctx.global_ref(counter, "counter", 0).unwrap();
    let mut next = Function::new("next", Some(Type::i64()));
    emit_all(
        &mut next,
        BlockId::ENTRY,
        &[
            Instr::LoadGlobal(count),
            Instr::push_i64(1),
            Instr::Add(NumKind::I64),
            Instr::StoreGlobal(count),
            Instr::LoadGlobal(count),
            Instr::Return,
        ],
    );
    ctx.add_function(counter, next).unwrap();

    let long = ctx.type_ref(main, &Type::i64()).unwrap();
    let call = ctx.function_ref(main, "counter", "next").unwrap();
    let mut twice = Function::new("twice", Some(Type::i64()));
    emit_all(
        &mut twice,
        BlockId::ENTRY,
        &[
            Instr::Call(call),
            Instr::Pop(long),
            Instr::Call(call),
            Instr::Return,
        ],
    );
    ctx.add_function(main, twice).unwrap();

    let out = Captured::default();
    let mut rt = reload(&ctx, &RuntimeConfig::default(), &out);
    let inv = rt.begin_invoke("main", "twice").unwrap();
    assert_eq!(rt.invoke::<i64>(inv).unwrap(), 2);
    let inv = rt.begin_invoke("counter", "next").unwrap();
    assert_eq!(rt.invoke::<i64>(inv).unwrap(), 3);
}

#[test]
fn test_runtime_error_leaves_runtime_usable() {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    ctx.add_function(m, sub_function()).unwrap();
    let mut f = Function::new("divide", Some(Type::i32()));
    f.add_param("a", Type::i32());
    f.add_param("b", Type::i32());
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::LoadArg(0),
            Instr::LoadArg(1),
            Instr::Div(NumKind::I32),
            Instr::Return,
        ],
    );
    ctx.add_function(m, f).unwrap();
    let mut rt = runtime(ctx, &RuntimeConfig::default());

    let mut inv = rt.begin_invoke("main", "divide").unwrap();
    rt.push_argument(&mut inv, 1i32, 0).unwrap();
    rt.push_argument(&mut inv, 0i32, 1).unwrap();
    assert!(matches!(rt.invoke::<i32>(inv), Err(VmError::DivisionByZero)));

    let mut inv = rt.begin_invoke("main", "sub").unwrap();
    rt.push_argument(&mut inv, 1i32, 0).unwrap();
    rt.push_argument(&mut inv, 2i32, 1).unwrap();
    assert_eq!(rt.invoke::<i32>(inv).unwrap(), -1);
}
