//! aotir - AOT IR lowering and binary serialization for a tracing JIT.
//!
//! aotir walks a host SSA module (typed functions, basic blocks,
//! instructions) and emits a compact, self-describing binary encoding of it,
//! the ahead-of-time IR a tracing JIT's runtime later maps back into memory.
//! Acquiring the host program, embedding the bytes into an object file and
//! reading them back are all external collaborators; this crate owns the
//! encoder and its binary contract only.
//!
//! # Primary Usage
//!
//! ```
//! use aotir::ir::{BinOp, Builder, Module, Value};
//!
//! let mut module = Module::new("demo");
//! let i64t = module.ctx.int_ty(64);
//! let fty = module.ctx.func_ty(&[i64t, i64t], i64t, false);
//! let f = module.add_function("add", fty);
//! let mut b = Builder::new(&mut module, f);
//! let entry = b.append_block();
//! b.position_at_end(entry);
//! let sum = b.build_binop(BinOp::Add, i64t, Value::Arg(0), Value::Arg(1));
//! b.build_ret(Some(sum));
//!
//! let bytes = aotir::encode::encode_module_to_vec(&mut module).unwrap();
//! assert!(!bytes.is_empty());
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - the closed host-IR model, data layout and builder
//! - [`encode`] - interning tables, instruction lowering, the module driver
//! - [`core`] - shared infrastructure (errors, the output sink)

pub mod core;
pub mod encode;
pub mod ir;

// Re-export common types from organized modules
pub use crate::core::{EncodeError, EncodeResult, Sink, Streamer};
pub use encode::{
    encode_module, encode_module_to_vec, ModuleWriter, Opcode, OperandKind, TypeKind, MAGIC,
    SECTION_NAME, START_SYMBOL, STOP_SYMBOL, VERSION,
};
pub use ir::{
    BinOp, Block, BlockId, Builder, CmpPredicate, ConstId, ConstKind, Constant, Context,
    DataLayout, FloatPredicate, FuncId, Function, GlobalId, GlobalInit, GlobalVariable, Inst,
    InstId, InstKind, IntPredicate, Module, Type, TypeId, Value,
};
