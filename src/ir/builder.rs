// This module provides a small positioned builder for constructing host modules
// programmatically, in the familiar create-block/position/build-instruction style.
// It exists for the tests and the irdump binary; a real frontend would ingest its
// own representation into the ir model directly. Each build_* method appends one
// instruction to the current block and hands back the Value that references its
// result, so definition-before-use falls out of construction order naturally.

//! Programmatic construction of host modules.
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
//! ```

use super::{
    BinOp, BlockId, CmpPredicate, FuncId, Inst, InstKind, Module, TypeId, Value,
};

/// Appends instructions to one function, one block at a time.
pub struct Builder<'m> {
    module: &'m mut Module,
    func: FuncId,
    block: Option<BlockId>,
}

impl<'m> Builder<'m> {
    pub fn new(module: &'m mut Module, func: FuncId) -> Self {
        Self {
            module,
            func,
            block: None,
        }
    }

    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    /// Append a new empty block to the function.
    pub fn append_block(&mut self) -> BlockId {
        self.module.func_mut(self.func).append_block()
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.block = Some(block);
    }

    /// Append `inst` at the current position, returning the value it defines.
    pub fn build(&mut self, inst: Inst) -> Value {
        let block = self.block.expect("builder is not positioned at a block");
        let id = self.module.func_mut(self.func).push_inst(block, inst);
        Value::Inst(id)
    }

    pub fn build_load(&mut self, ty: TypeId, ptr: Value) -> Value {
        self.build(Inst {
            ty,
            kind: InstKind::Load { ptr },
        })
    }

    pub fn build_store(&mut self, val: Value, ptr: Value) {
        let void = self.module.ctx.void_ty();
        self.build(Inst {
            ty: void,
            kind: InstKind::Store { val, ptr },
        });
    }

    /// Allocate `count` objects of type `allocated`; yields a pointer.
    pub fn build_alloca(&mut self, allocated: TypeId, count: Value) -> Value {
        let ptr = self.module.ctx.ptr_ty();
        self.build(Inst {
            ty: ptr,
            kind: InstKind::Alloca { allocated, count },
        })
    }

    pub fn build_call(&mut self, ret_ty: TypeId, callee: Value, args: Vec<Value>) -> Value {
        self.build(Inst {
            ty: ret_ty,
            kind: InstKind::Call { args, callee },
        })
    }

    pub fn build_br(&mut self, dest: BlockId) {
        let void = self.module.ctx.void_ty();
        self.build(Inst {
            ty: void,
            kind: InstKind::Br { dest },
        });
    }

    pub fn build_cond_br(&mut self, cond: Value, true_dest: BlockId, false_dest: BlockId) {
        let void = self.module.ctx.void_ty();
        self.build(Inst {
            ty: void,
            kind: InstKind::CondBr {
                cond,
                true_dest,
                false_dest,
            },
        });
    }

    /// Compare `lhs` and `rhs`; yields an i1.
    pub fn build_cmp(&mut self, pred: CmpPredicate, lhs: Value, rhs: Value) -> Value {
        let i1 = self.module.ctx.int_ty(1);
        self.build(Inst {
            ty: i1,
            kind: InstKind::Cmp { pred, lhs, rhs },
        })
    }

    pub fn build_binop(&mut self, op: BinOp, ty: TypeId, lhs: Value, rhs: Value) -> Value {
        self.build(Inst {
            ty,
            kind: InstKind::BinOp { op, lhs, rhs },
        })
    }

    pub fn build_ret(&mut self, value: Option<Value>) {
        let void = self.module.ctx.void_ty();
        self.build(Inst {
            ty: void,
            kind: InstKind::Ret { value },
        });
    }

    pub fn build_insert_value(&mut self, ty: TypeId, agg: Value, elem: Value) -> Value {
        self.build(Inst {
            ty,
            kind: InstKind::InsertValue { agg, elem },
        })
    }

    /// Offset `base` by a chain of indices striding over `source`; yields a
    /// pointer.
    pub fn build_gep(&mut self, base: Value, source: TypeId, indices: Vec<Value>) -> Value {
        let ptr = self.module.ctx.ptr_ty();
        self.build(Inst {
            ty: ptr,
            kind: InstKind::Gep {
                base,
                source,
                indices,
            },
        })
    }

    /// A non-semantic debug/pseudo instruction.
    pub fn build_debug(&mut self, text: impl Into<String>) {
        let void = self.module.ctx.void_ty();
        self.build(Inst {
            ty: void,
            kind: InstKind::Debug { text: text.into() },
        });
    }

    /// A host instruction the model has no variant for.
    pub fn build_unsupported(&mut self, ty: TypeId, text: impl Into<String>) -> Value {
        self.build(Inst {
            ty,
            kind: InstKind::Unsupported { text: text.into() },
        })
    }
}
