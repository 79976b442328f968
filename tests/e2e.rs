use std::path::{Path, PathBuf};
use std::process::Command;

use stil::il::{BlockId, Context, Function, Instr, NumKind, Type, bytecode};
use tempfile::TempDir;

fn run_stil(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_stil"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute stil");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn assert_success(args: &[&str]) -> String {
    let (stdout, stderr, success) = run_stil(args);
    assert!(success, "command should succeed, stderr:\n{}", stderr);
    stdout
}

fn assert_failure(args: &[&str]) -> String {
    let (_, stderr, success) = run_stil(args);
    assert!(!success, "command should fail");
    stderr
}

fn emit_all(f: &mut Function, block: BlockId, instrs: &[Instr]) {
    for instr in instrs {
        f.emit(block, *instr).unwrap();
    }
}

/// `main` greets and returns `scale(x) = x * 10`; `sub` and `shout` take
/// arguments of several kinds.
fn sample() -> Context {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let hello = ctx.module_mut(m).unwrap().intern_string("hello");
    let string = ctx.type_ref(m, &Type::String).unwrap();
    let scale = ctx.function_ref(m, "main", "scale").unwrap();

    let mut f = Function::new("scale", Some(Type::i64()));
    f.add_param("x", Type::i64());
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::LoadArg(0),
            Instr::push_i64(10),
            Instr::Mul(NumKind::I64),
            Instr::Return,
        ],
    );
    ctx.add_function(m, f).unwrap();

    let mut f = Function::new("main", Some(Type::i64()));
    emit_all(
        &mut f,
        BlockId::ENTRY,
        &[
            Instr::PushString(hello),
            Instr::Print(string),
            Instr::push_i64(4),
            Instr::Call(scale),
            Instr::Return,
        ],
    );
    ctx.add_function(m, f).unwrap();

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
    ctx.add_function(m, f).unwrap();

    let mut f = Function::new("echo", Some(Type::String));
    f.add_param("text", Type::String);
    emit_all(&mut f, BlockId::ENTRY, &[Instr::LoadArg(0), Instr::Return]);
    ctx.add_function(m, f).unwrap();
    ctx
}

fn write_image(dir: &TempDir, ctx: &Context) -> PathBuf {
    let path = dir.path().join("sample.stil");
    bytecode::save_to_file(ctx, &path).unwrap();
    path
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_run_main() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, &sample());
    let stdout = assert_success(&["run", path_str(&image)]);
    assert_eq!(stdout, "hello\n40\n");
}

#[test]
fn test_run_with_arguments() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, &sample());
    let stdout = assert_success(&[
        "run",
        path_str(&image),
        "--function",
        "sub",
        "--arg",
        "10",
        "--arg",
        "3",
    ]);
    assert_eq!(stdout, "7\n");

    let stdout = assert_success(&[
        "run",
        path_str(&image),
        "--function",
        "echo",
        "--arg",
        "round trip",
    ]);
    assert_eq!(stdout, "round trip\n");
}

#[test]
fn test_run_rejects_bad_arguments() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, &sample());
    let stderr = assert_failure(&["run", path_str(&image), "--function", "sub", "--arg", "1"]);
    assert!(stderr.contains("expects 2 arguments"), "{}", stderr);

    let stderr = assert_failure(&[
        "run",
        path_str(&image),
        "--function",
        "sub",
        "--arg",
        "1",
        "--arg",
        "x",
    ]);
    assert!(stderr.contains("cannot parse 'x'"), "{}", stderr);

    let stderr = assert_failure(&["run", path_str(&image), "--function", "missing"]);
    assert!(stderr.contains("not found"), "{}", stderr);
}

#[test]
fn test_gc_stats_and_config_file() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, &sample());
    let config = dir.path().join("stil.toml");
    std::fs::write(&config, "heap_capacity = 4096\ngc_stats = true\n").unwrap();

    let (stdout, stderr, success) =
        run_stil(&["run", path_str(&image), "--config", path_str(&config)]);
    assert!(success, "{}", stderr);
    assert_eq!(stdout, "hello\n40\n");
    assert!(stderr.contains("[GC] Collections: 0"), "{}", stderr);

    std::fs::write(&config, "jit = true\n").unwrap();
    let stderr = assert_failure(&["run", path_str(&image), "--config", path_str(&config)]);
    assert!(stderr.contains("failed to parse config"), "{}", stderr);
}

#[test]
fn test_dump() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, &sample());

    let text = assert_success(&["dump", path_str(&image)]);
    assert!(text.contains("== Module[0]: main =="), "{}", text);
    assert!(text.contains("mul i64"), "{}", text);

    let json = assert_success(&["dump", path_str(&image), "--json"]);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["modules"][0]["name"], "main");
    assert_eq!(value["modules"][0]["strings"][0], "hello");
}

#[test]
fn test_verify() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, &sample());
    let stdout = assert_success(&["verify", path_str(&image)]);
    assert!(stdout.contains("ok (1 modules, 4 functions)"), "{}", stdout);

    let garbage = dir.path().join("garbage.stil");
    std::fs::write(&garbage, b"definitely not an image").unwrap();
    let stderr = assert_failure(&["verify", path_str(&garbage)]);
    assert!(stderr.contains("invalid magic"), "{}", stderr);
}

#[test]
fn test_verify_and_run_with_dead_block() {
    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    let mut f = Function::new("main", Some(Type::i32()));
    let _dead = f.new_block();
    let live = f.new_block();
    emit_all(&mut f, BlockId::ENTRY, &[Instr::Jump(live)]);
    emit_all(&mut f, live, &[Instr::push_i32(5), Instr::Return]);
    ctx.add_function(m, f).unwrap();

    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, &ctx);
    let stdout = assert_success(&["verify", path_str(&image)]);
    assert!(stdout.contains("ok (1 modules, 1 functions)"), "{}", stdout);

    let stdout = assert_success(&["run", path_str(&image)]);
    assert_eq!(stdout, "5\n");
}
