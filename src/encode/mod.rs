// This module is the public face of the encoder: the wire-format constants (magic,
// version, section/marker names and the opcode, operand-kind and type-kind byte
// assignments) and the encode_module entry points that drive a whole serialization
// run. The heavy lifting lives in writer.rs; tables.rs holds the interning tables.
// The byte assignments are part of the binary contract with the runtime reader and
// must never be renumbered, only appended to.

//! Binary encoding of a host module.
//!
//! One [`encode_module`] call owns the whole run: it walks every function,
//! discovers types, constants and globals into the interning tables as a side
//! effect, then drains the tables in the fixed functions → constants →
//! globals → types order the reader relies on.

pub mod tables;
pub mod writer;

use crate::core::{EncodeResult, Sink};
use crate::ir::Module;

pub use writer::ModuleWriter;

/// First word of every encoded module.
pub const MAGIC: u32 = 0xedd5_f00d;
/// Format version emitted after the magic.
pub const VERSION: u32 = 0;

/// Object-file section the emitted bytes are expected to land in. Embedding
/// is an external collaborator's job; the name is published for it.
pub const SECTION_NAME: &str = ".aot_ir";
/// Start marker symbol bracketing the emitted bytes in the artifact.
pub const START_SYMBOL: &str = "aotir.start";
/// Stop marker symbol bracketing the emitted bytes in the artifact.
pub const STOP_SYMBOL: &str = "aotir.stop";

/// Target instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    Load,
    Store,
    Alloca,
    Call,
    Br,
    CondBr,
    ICmp,
    BinaryOperator,
    Ret,
    InsertValue,
    PtrAdd,
    Add,
    Sub,
    Mul,
    Or,
    And,
    Xor,
    Shl,
    AShr,
    FAdd,
    FDiv,
    FMul,
    FRem,
    FSub,
    LShr,
    SDiv,
    SRem,
    UDiv,
    URem,
    Unsupported = 255,
}

/// Operand kind tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperandKind {
    Constant = 0,
    LocalVariable,
    Type,
    Function,
    Block,
    Arg,
    Global,
    Predicate,
    Unsupported = 255,
}

/// Type kind tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeKind {
    Void = 0,
    Integer,
    Ptr,
    Function,
    Struct,
    Unsupported = 255,
}

/// Serialise `module` into `sink`.
///
/// On success the sink holds a complete, self-describing encoding and the
/// module has gained the two global-pointer-table declarations. On error the
/// sink's contents are not a valid encoding.
pub fn encode_module<S: Sink>(module: &mut Module, sink: &mut S) -> EncodeResult<()> {
    let Module {
        ref mut ctx,
        ref layout,
        ref functions,
        ..
    } = *module;
    ModuleWriter::new(ctx, layout, functions, sink).serialize()
}

/// Convenience wrapper serializing into a fresh `Vec<u8>`.
pub fn encode_module_to_vec(module: &mut Module) -> EncodeResult<Vec<u8>> {
    let mut buf = Vec::new();
    encode_module(module, &mut buf)?;
    Ok(buf)
}
