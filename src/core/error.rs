// This module defines error types for the aotir encoder using the thiserror crate for
// idiomatic Rust error handling. EncodeError is the main error enum covering the fatal
// whole-run abort conditions: local-variable operands with no recorded location,
// floating-point comparison predicates, pointer widths that differ from the native word,
// pointer-offset chains that do not collapse to a constant, alloca element counts that
// are not integer constants, and instruction-count mismatches after block emission. Each
// variant carries relevant context (function names, instruction indices, widths, counts)
// for debugging. The module also provides EncodeResult<T> as a convenience type alias.
// Degraded-but-total fallbacks (unsupported instructions, operands, types, constants)
// are not errors at all; they encode as explicit placeholders and the run completes.

//! Error types for the AOT IR encoder.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

use crate::ir::FloatPredicate;

/// Main error type for IR serialization.
///
/// Every variant is a whole-run abort: partial output is never valid. They
/// signal either a violated precondition of the host module or an encoder bug.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("operand %{inst} in function `{func}` has no recorded location")]
    MissingLocal { func: String, inst: u32 },

    #[error("unsupported comparison predicate: {pred:?}")]
    UnsupportedPredicate { pred: FloatPredicate },

    #[error("pointer width is {width} bits but the native word is {native} bits")]
    PointerWidth { width: u32, native: u32 },

    #[error("pointer-offset chain in function `{func}` does not collapse to a constant")]
    NonConstantOffset { func: String },

    #[error("alloca element count in function `{func}` is not an integer constant")]
    NonConstantAllocaSize { func: String },

    #[error("block {block} of `{func}` emitted {emitted} instructions, promised {promised}")]
    InstCountMismatch {
        func: String,
        block: usize,
        promised: usize,
        emitted: usize,
    },

    #[error("malformed host IR: {reason}")]
    MalformedIr { reason: String },
}

/// Result type alias for encoding operations.
pub type EncodeResult<T> = Result<T, EncodeError>;
