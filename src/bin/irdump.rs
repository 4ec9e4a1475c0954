// This binary builds small sample host modules through the builder API, encodes them
// and dumps the resulting bytes, either as a hex listing on stdout or raw into a
// file. It exists for eyeballing the wire format and for quick encoder debugging
// with RUST_LOG=debug; it is not part of the library surface.

//! Dump the binary encoding of built-in sample modules.

use std::fs;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::info;

use aotir::encode;
use aotir::ir::{BinOp, Builder, CmpPredicate, IntPredicate, Module, Value};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sample {
    /// add(a, b) -> a + b
    Add,
    /// Conditional branch with a comparison and a constant
    Branchy,
    /// Alloca, store, load and a global
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "irdump", about = "Dump the AOT IR encoding of a sample module")]
struct Args {
    /// Which sample module to encode.
    #[arg(value_enum, default_value_t = Sample::Add)]
    sample: Sample,

    /// Write the raw bytes to this file instead of hex-dumping to stdout.
    #[arg(short, long)]
    output: Option<String>,
}

fn build_add() -> Module {
    let mut module = Module::new("add");
    let i64t = module.ctx.int_ty(64);
    let fty = module.ctx.func_ty(&[i64t, i64t], i64t, false);
    let f = module.add_function("add", fty);
    let mut b = Builder::new(&mut module, f);
    let entry = b.append_block();
    b.position_at_end(entry);
    let sum = b.build_binop(BinOp::Add, i64t, Value::Arg(0), Value::Arg(1));
    b.build_ret(Some(sum));
    module
}

fn build_branchy() -> Module {
    let mut module = Module::new("branchy");
    let i64t = module.ctx.int_ty(64);
    let zero = module.ctx.const_int(i64t, 0);
    let fty = module.ctx.func_ty(&[i64t], i64t, false);
    let f = module.add_function("clamp", fty);
    let mut b = Builder::new(&mut module, f);
    let entry = b.append_block();
    let negative = b.append_block();
    let done = b.append_block();
    b.position_at_end(entry);
    let is_neg = b.build_cmp(
        CmpPredicate::Int(IntPredicate::SignedLess),
        Value::Arg(0),
        Value::Const(zero),
    );
    b.build_cond_br(is_neg, negative, done);
    b.position_at_end(negative);
    b.build_ret(Some(Value::Const(zero)));
    b.position_at_end(done);
    b.build_ret(Some(Value::Arg(0)));
    module
}

fn build_memory() -> Module {
    let mut module = Module::new("memory");
    let i64t = module.ctx.int_ty(64);
    let void = module.ctx.void_ty();
    let counter = module.ctx.add_global("counter", false);
    let one = module.ctx.const_int(i64t, 1);
    let fty = module.ctx.func_ty(&[], void, false);
    let f = module.add_function("bump", fty);
    let mut b = Builder::new(&mut module, f);
    let entry = b.append_block();
    b.position_at_end(entry);
    let slot = b.build_alloca(i64t, Value::Const(one));
    let old = b.build_load(i64t, Value::Global(counter));
    b.build_store(old.clone(), slot.clone());
    let new = b.build_binop(BinOp::Add, i64t, old, Value::Const(one));
    b.build_store(new, Value::Global(counter));
    b.build_ret(None);
    module
}

fn hex_dump(bytes: &[u8]) {
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("{:08x}  {}", i * 16, hex.join(" "));
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut module = match args.sample {
        Sample::Add => build_add(),
        Sample::Branchy => build_branchy(),
        Sample::Memory => build_memory(),
    };

    let bytes = match encode::encode_module_to_vec(&mut module) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("irdump: encoding failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!("encoded `{}`: {} bytes", module.name, bytes.len());

    match args.output {
        Some(path) => {
            if let Err(err) = fs::write(&path, &bytes) {
                eprintln!("irdump: cannot write {path}: {err}");
                return ExitCode::FAILURE;
            }
        }
        None => hex_dump(&bytes),
    }
    ExitCode::SUCCESS
}
