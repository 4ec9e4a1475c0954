// This module implements the serialization run: ModuleWriter walks every function of
// the host module, lowering each instruction into the target instruction model and
// encoding it on the fly, while interning every type, constant and global it touches
// into the append-only index tables. Lowering is total: instructions with a dedicated
// rule get it (alloca's synthetic type operand, call's callee-first reordering, the
// branch split, the pointer-offset collapse, the predicate operand of comparisons,
// per-operator binary opcodes), everything else either takes the generic
// operands-in-order rule or degrades to an explicit unsupported placeholder. The
// driver drains the tables in the fixed functions -> constants -> globals -> types
// order because each earlier stage can still grow the later tables, and finally
// appends the global-pointer-table declarations to the host module for the runtime
// loader. A run either completes with a valid byte stream or aborts as a whole.
//
// Invariants maintained while lowering (the reader depends on all of them):
//
//  - The block index increments once per serialized block, the instruction index
//    once per serialized (non-filtered) instruction.
//  - Every value-producing instruction records its (block, inst) location in the
//    per-function location map immediately after its encoding is emitted; local
//    operands of later instructions are resolved through that map, so the host
//    must be in definition-before-use order.
//  - Interned indices are append-only and stable for the whole run.

//! The serialization run: lowering, interning and the module driver.

use hashbrown::HashMap;
use log::{debug, trace};

use super::tables::IndexTable;
use super::{Opcode, OperandKind, TypeKind, MAGIC, VERSION};
use crate::core::{EncodeError, EncodeResult, Sink, Streamer};
use crate::ir::{
    BinOp, Block, CmpPredicate, ConstId, ConstKind, Constant, Context, DataLayout, Function,
    GlobalId, GlobalInit, Inst, InstId, InstKind, Type, TypeId, Value,
};

/// Name of the synthesized pointer-table global.
pub const GLOBAL_PTRS_NAME: &str = "__aot_globalvar_ptrs";
/// Name of the synthesized pointer-table length global.
pub const GLOBAL_LEN_NAME: &str = "__aot_globalvar_len";

/// A `(block, instruction)` coordinate identifying where a value was produced
/// within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrLoc {
    pub block: usize,
    pub inst: usize,
}

/// Per-function map from a value-producing instruction to its location.
/// Created empty for each function and discarded when the function is done.
type LocMap = HashMap<InstId, InstrLoc>;

/// Drives one serialization run over a host module.
///
/// The writer owns exclusive access to the interning tables, the per-function
/// location map and the sink for the duration of the run; nothing is shared
/// or resumable.
pub struct ModuleWriter<'m, S: Sink> {
    ctx: &'m mut Context,
    layout: &'m DataLayout,
    funcs: &'m [Function],
    stream: Streamer<'m, S>,
    types: IndexTable<TypeId>,
    consts: IndexTable<ConstId>,
    globals: IndexTable<GlobalId>,
}

impl<'m, S: Sink> ModuleWriter<'m, S> {
    pub fn new(
        ctx: &'m mut Context,
        layout: &'m DataLayout,
        funcs: &'m [Function],
        sink: &'m mut S,
    ) -> Self {
        Self {
            ctx,
            layout,
            funcs,
            stream: Streamer::new(sink),
            types: IndexTable::new(),
            consts: IndexTable::new(),
            globals: IndexTable::new(),
        }
    }

    // === Interning =========================================================

    /// Index of `ty`, interning it (and, on first sight, its immediate
    /// substructure) if necessary. The parent's index is assigned before the
    /// recursion, so every subtype index is strictly greater than its
    /// parent's. Reentrant: called from instruction lowering, constant
    /// draining and offset synthesis.
    fn type_index(&mut self, ty: TypeId) -> usize {
        let (idx, inserted) = self.types.intern(ty);
        if inserted {
            let subs: Vec<TypeId> = match self.ctx.ty(ty) {
                Type::Function { params, ret, .. } => {
                    params.iter().copied().chain([*ret]).collect()
                }
                Type::Struct { fields, .. } => fields.clone(),
                _ => Vec::new(),
            };
            for sub in subs {
                self.type_index(sub);
            }
        }
        idx
    }

    /// Index of an already-registered type. Draining the type table must not
    /// discover new types; the recursive registration guarantees it.
    fn type_ref(&mut self, ty: TypeId) -> usize {
        let (idx, inserted) = self.types.intern(ty);
        debug_assert!(!inserted, "type discovered while draining the type table");
        idx
    }

    fn constant_index(&mut self, c: ConstId) -> usize {
        self.consts.intern(c).0
    }

    fn global_index(&mut self, g: GlobalId) -> usize {
        self.globals.intern(g).0
    }

    // === Operands ==========================================================

    /// Encode one value reference as a tagged operand record.
    ///
    /// Total: anything without a structured encoding goes out as an
    /// unsupported placeholder instead of failing the run. Function, argument
    /// and block operands reuse the host's positional indices directly; the
    /// driver preserves that ordering on the target side.
    fn serialize_operand(&mut self, f: &Function, vlmap: &LocMap, v: &Value) -> EncodeResult<()> {
        match v {
            Value::Global(g) => {
                self.stream.emit_u8(OperandKind::Global as u8);
                let idx = self.global_index(*g);
                self.stream.emit_word(idx);
            }
            Value::Func(func) => {
                self.stream.emit_u8(OperandKind::Function as u8);
                self.stream.emit_word(func.0 as usize);
            }
            Value::Const(c) => {
                self.stream.emit_u8(OperandKind::Constant as u8);
                let idx = self.constant_index(*c);
                self.stream.emit_word(idx);
            }
            Value::Arg(no) => {
                self.stream.emit_u8(OperandKind::Arg as u8);
                self.stream.emit_word(*no as usize);
            }
            Value::Inst(inst) => {
                // Defined by an earlier instruction: a local variable.
                let loc = vlmap.get(inst).ok_or_else(|| EncodeError::MissingLocal {
                    func: f.name.clone(),
                    inst: inst.0,
                })?;
                self.stream.emit_u8(OperandKind::LocalVariable as u8);
                self.stream.emit_word(loc.block);
                self.stream.emit_word(loc.inst);
            }
            Value::Block(b) => {
                self.stream.emit_u8(OperandKind::Block as u8);
                self.stream.emit_word(b.0 as usize);
            }
            Value::Unsupported(text) => self.serialize_unsupported_operand(text),
        }
        Ok(())
    }

    fn serialize_unsupported_operand(&mut self, text: &str) {
        self.stream.emit_u8(OperandKind::Unsupported as u8);
        self.stream.emit_cstr(text);
    }

    // === Instructions ======================================================

    /// Lower one instruction. `inst_idx` is the block-local index of the
    /// instruction about to be emitted; it is incremented exactly once here.
    fn serialize_inst(
        &mut self,
        f: &Function,
        vlmap: &mut LocMap,
        id: InstId,
        inst: &Inst,
        bb_idx: usize,
        inst_idx: &mut usize,
    ) -> EncodeResult<()> {
        let record = match &inst.kind {
            InstKind::Load { ptr } => {
                self.serialize_inst_generic(f, vlmap, inst.ty, Opcode::Load, &[ptr])?;
                !self.is_void(inst.ty)
            }
            InstKind::Store { val, ptr } => {
                self.serialize_inst_generic(f, vlmap, inst.ty, Opcode::Store, &[val, ptr])?;
                !self.is_void(inst.ty)
            }
            InstKind::Ret { value } => {
                let operands: Vec<&Value> = value.iter().collect();
                self.serialize_inst_generic(f, vlmap, inst.ty, Opcode::Ret, &operands)?;
                !self.is_void(inst.ty)
            }
            InstKind::InsertValue { agg, elem } => {
                self.serialize_inst_generic(f, vlmap, inst.ty, Opcode::InsertValue, &[agg, elem])?;
                !self.is_void(inst.ty)
            }
            InstKind::Alloca { allocated, count } => {
                self.serialize_alloca(f, vlmap, inst.ty, *allocated, count)?;
                true
            }
            InstKind::Call { args, callee } => {
                self.serialize_call(f, vlmap, inst.ty, callee, args)?;
                !self.is_void(inst.ty)
            }
            InstKind::Br { .. } => {
                // Unconditional: no operands, the successor is resolved
                // structurally downstream.
                let ty_idx = self.type_index(inst.ty);
                self.stream.emit_word(ty_idx);
                self.stream.emit_u8(Opcode::Br as u8);
                self.stream.emit_u32(0);
                false
            }
            InstKind::CondBr {
                cond,
                true_dest,
                false_dest,
            } => {
                // Fixed operand order [condition, true-successor,
                // false-successor], taken from the successor fields - never
                // from any raw storage order.
                let ty_idx = self.type_index(inst.ty);
                self.stream.emit_word(ty_idx);
                self.stream.emit_u8(Opcode::CondBr as u8);
                self.stream.emit_u32(3);
                self.serialize_operand(f, vlmap, cond)?;
                self.serialize_operand(f, vlmap, &Value::Block(*true_dest))?;
                self.serialize_operand(f, vlmap, &Value::Block(*false_dest))?;
                false
            }
            InstKind::Cmp { pred, lhs, rhs } => {
                self.serialize_cmp(f, vlmap, inst.ty, *pred, lhs, rhs)?;
                true
            }
            InstKind::BinOp { op, lhs, rhs } => {
                let ty_idx = self.type_index(inst.ty);
                self.stream.emit_word(ty_idx);
                self.stream.emit_u8(binop_opcode(*op) as u8);
                self.stream.emit_u32(2);
                self.serialize_operand(f, vlmap, lhs)?;
                self.serialize_operand(f, vlmap, rhs)?;
                true
            }
            InstKind::Gep {
                base,
                source,
                indices,
            } => {
                self.serialize_gep(f, vlmap, inst.ty, base, *source, indices)?;
                true
            }
            InstKind::Unsupported { text } => {
                let ty_idx = self.type_index(inst.ty);
                self.stream.emit_word(ty_idx);
                self.stream.emit_u8(Opcode::Unsupported as u8);
                self.stream.emit_u32(1);
                self.serialize_unsupported_operand(text);
                !self.is_void(inst.ty)
            }
            InstKind::Debug { .. } => {
                unreachable!("debug instructions are filtered before lowering")
            }
        };

        if record {
            vlmap.insert(
                id,
                InstrLoc {
                    block: bb_idx,
                    inst: *inst_idx,
                },
            );
        }
        *inst_idx += 1;
        Ok(())
    }

    /// The generic rule: type, opcode, count, then the source operands in
    /// their original order.
    fn serialize_inst_generic(
        &mut self,
        f: &Function,
        vlmap: &LocMap,
        ty: TypeId,
        opcode: Opcode,
        operands: &[&Value],
    ) -> EncodeResult<()> {
        let ty_idx = self.type_index(ty);
        self.stream.emit_word(ty_idx);
        self.stream.emit_u8(opcode as u8);
        self.stream.emit_u32(operands.len() as u32);
        for o in operands {
            self.serialize_operand(f, vlmap, o)?;
        }
        Ok(())
    }

    /// Alloca carries exactly two operands: an explicit type operand for the
    /// allocated type (not part of the host operand list) and the element
    /// count, which must be an integer constant.
    fn serialize_alloca(
        &mut self,
        f: &Function,
        vlmap: &LocMap,
        ty: TypeId,
        allocated: TypeId,
        count: &Value,
    ) -> EncodeResult<()> {
        let constant_count = matches!(
            count,
            Value::Const(c) if matches!(self.ctx.constant(*c).kind, ConstKind::Int { .. })
        );
        if !constant_count {
            return Err(EncodeError::NonConstantAllocaSize {
                func: f.name.clone(),
            });
        }

        let ty_idx = self.type_index(ty);
        self.stream.emit_word(ty_idx);
        self.stream.emit_u8(Opcode::Alloca as u8);
        self.stream.emit_u32(2);
        // Operand 0: the allocated type.
        self.stream.emit_u8(OperandKind::Type as u8);
        let alloc_idx = self.type_index(allocated);
        self.stream.emit_word(alloc_idx);
        // Operand 1: the element count.
        self.serialize_operand(f, vlmap, count)
    }

    /// The host stores the callee after the arguments; the target wants it
    /// first. Emit the callee, then the arguments in their original order.
    fn serialize_call(
        &mut self,
        f: &Function,
        vlmap: &LocMap,
        ty: TypeId,
        callee: &Value,
        args: &[Value],
    ) -> EncodeResult<()> {
        let ty_idx = self.type_index(ty);
        self.stream.emit_word(ty_idx);
        self.stream.emit_u8(Opcode::Call as u8);
        self.stream.emit_u32(args.len() as u32 + 1);
        self.serialize_operand(f, vlmap, callee)?;
        for a in args {
            self.serialize_operand(f, vlmap, a)?;
        }
        Ok(())
    }

    /// Comparisons emit `[lhs, predicate, rhs]`. The predicate is not a value
    /// on the host side, so it cannot go through the operand encoder.
    fn serialize_cmp(
        &mut self,
        f: &Function,
        vlmap: &LocMap,
        ty: TypeId,
        pred: CmpPredicate,
        lhs: &Value,
        rhs: &Value,
    ) -> EncodeResult<()> {
        let code = match pred {
            CmpPredicate::Int(p) => p.code(),
            CmpPredicate::Float(p) => {
                return Err(EncodeError::UnsupportedPredicate { pred: p });
            }
        };
        let ty_idx = self.type_index(ty);
        self.stream.emit_word(ty_idx);
        self.stream.emit_u8(Opcode::ICmp as u8);
        self.stream.emit_u32(3);
        self.serialize_operand(f, vlmap, lhs)?;
        self.stream.emit_u8(OperandKind::Predicate as u8);
        self.stream.emit_u8(code);
        self.serialize_operand(f, vlmap, rhs)
    }

    /// Collapse a pointer-offset chain into `[base, byte-offset]`. The offset
    /// constant is synthesized through the module's constant interning, which
    /// may register the i64 type mid-drain.
    fn serialize_gep(
        &mut self,
        f: &Function,
        vlmap: &LocMap,
        ty: TypeId,
        base: &Value,
        source: TypeId,
        indices: &[Value],
    ) -> EncodeResult<()> {
        let offset = self.collapse_offset(f, source, indices)?;

        let ty_idx = self.type_index(ty);
        self.stream.emit_word(ty_idx);
        self.stream.emit_u8(Opcode::PtrAdd as u8);
        self.stream.emit_u32(2);
        self.serialize_operand(f, vlmap, base)?;
        let i64t = self.ctx.int_ty(64);
        let offset_const = self.ctx.const_int(i64t, offset as u64 as u128);
        self.serialize_operand(f, vlmap, &Value::Const(offset_const))
    }

    /// Accumulate the byte offset of an index chain in a 64-bit signed
    /// accumulator. Every index must be an integer constant: a non-constant
    /// per-element multiplier has no supported decomposition.
    fn collapse_offset(
        &mut self,
        f: &Function,
        source: TypeId,
        indices: &[Value],
    ) -> EncodeResult<i64> {
        let mut offset = 0i64;
        let mut cur = source;
        for (i, index) in indices.iter().enumerate() {
            let val = self
                .const_int_value(index)
                .ok_or_else(|| EncodeError::NonConstantOffset {
                    func: f.name.clone(),
                })?;
            if i == 0 {
                // The first index strides over the source element type.
                let stride = self.layout.byte_size(self.ctx, source).ok_or_else(|| {
                    EncodeError::MalformedIr {
                        reason: "pointer offset strides over an unsized type".into(),
                    }
                })?;
                offset = offset.wrapping_add(val.wrapping_mul(stride as i64));
            } else {
                match self.ctx.ty(cur) {
                    Type::Struct {
                        fields,
                        field_bit_offs,
                    } => {
                        let field = val as usize;
                        if field >= fields.len() {
                            return Err(EncodeError::MalformedIr {
                                reason: format!(
                                    "field index {field} out of range for struct with {} fields",
                                    fields.len()
                                ),
                            });
                        }
                        offset = offset.wrapping_add((field_bit_offs[field] / 8) as i64);
                        cur = fields[field];
                    }
                    _ => {
                        return Err(EncodeError::MalformedIr {
                            reason: "structural index into a non-struct type".into(),
                        });
                    }
                }
            }
        }
        Ok(offset)
    }

    /// The signed value of an integer-constant operand, or None.
    fn const_int_value(&self, v: &Value) -> Option<i64> {
        let Value::Const(c) = v else { return None };
        let Constant { ty, ref kind } = *self.ctx.constant(*c);
        let ConstKind::Int { value } = *kind else {
            return None;
        };
        let Type::Integer { bits } = *self.ctx.ty(ty) else {
            return None;
        };
        // Sign-extend from the type's width.
        let shift = 128 - bits.clamp(1, 128);
        Some((((value << shift) as i128) >> shift) as i64)
    }

    fn is_void(&self, ty: TypeId) -> bool {
        matches!(self.ctx.ty(ty), Type::Void)
    }

    // === Blocks and functions ==============================================

    fn serialize_block(
        &mut self,
        f: &'m Function,
        vlmap: &mut LocMap,
        block: &'m Block,
        bb_idx: usize,
    ) -> EncodeResult<()> {
        // Pre-pass: count the instructions that will actually be emitted.
        // Non-semantic debug/pseudo instructions are invisible to the reader.
        let promised = block
            .insts
            .iter()
            .filter(|id| !f.inst(**id).is_debug())
            .count();
        self.stream.emit_word(promised);

        let mut inst_idx = 0usize;
        for &iid in &block.insts {
            let inst = f.inst(iid);
            if inst.is_debug() {
                continue;
            }
            self.serialize_inst(f, vlmap, iid, inst, bb_idx, &mut inst_idx)?;
        }

        // Emit exactly the number of instructions promised, or abort.
        if inst_idx != promised {
            return Err(EncodeError::InstCountMismatch {
                func: f.name.clone(),
                block: bb_idx,
                promised,
                emitted: inst_idx,
            });
        }
        Ok(())
    }

    fn serialize_func(&mut self, f: &'m Function) -> EncodeResult<()> {
        debug!(
            "serializing function `{}` ({} blocks)",
            f.name,
            f.blocks.len()
        );
        self.stream.emit_cstr(&f.name);
        let ty_idx = self.type_index(f.ty);
        self.stream.emit_word(ty_idx);
        self.stream.emit_word(f.blocks.len());

        // The location map is scoped to this function; locations never leak
        // across functions.
        let mut vlmap = LocMap::new();
        for (bb_idx, block) in f.blocks.iter().enumerate() {
            self.serialize_block(f, &mut vlmap, block, bb_idx)?;
        }
        Ok(())
    }

    // === Table drains ======================================================

    fn serialize_constant(&mut self, cid: ConstId) -> EncodeResult<()> {
        let (ty, kind) = {
            let c = self.ctx.constant(cid);
            (c.ty, c.kind.clone())
        };
        match kind {
            ConstKind::Int { value } => {
                let Type::Integer { bits } = *self.ctx.ty(ty) else {
                    return Err(EncodeError::MalformedIr {
                        reason: "integer constant with a non-integer type".into(),
                    });
                };
                let ty_idx = self.type_index(ty);
                self.stream.emit_word(ty_idx);
                let len = (bits / 8) as usize;
                self.stream.emit_word(len);
                // Byte i holds bits [8i, 8i+8).
                for i in 0..len {
                    self.stream.emit_u8((value >> (8 * i)) as u8);
                }
            }
            ConstKind::Unsupported { .. } => {
                let ty_idx = self.type_index(ty);
                self.stream.emit_word(ty_idx);
                self.stream.emit_word(0);
            }
        }
        Ok(())
    }

    fn serialize_global(&mut self, gid: GlobalId) {
        let g = self.ctx.global(gid);
        self.stream.emit_u8(g.thread_local as u8);
        self.stream.emit_cstr(&g.name);
    }

    fn serialize_type(&mut self, ty: TypeId) -> EncodeResult<()> {
        match self.ctx.ty(ty).clone() {
            Type::Void => self.stream.emit_u8(TypeKind::Void as u8),
            Type::Integer { bits } => {
                self.stream.emit_u8(TypeKind::Integer as u8);
                self.stream.emit_u32(bits);
            }
            Type::Ptr => {
                // The runtime assumes pointers are native-word sized.
                let native = 8 * std::mem::size_of::<usize>() as u32;
                if self.layout.ptr_bits() != native {
                    return Err(EncodeError::PointerWidth {
                        width: self.layout.ptr_bits(),
                        native,
                    });
                }
                self.stream.emit_u8(TypeKind::Ptr as u8);
            }
            Type::Function {
                params,
                ret,
                is_vararg,
            } => {
                self.stream.emit_u8(TypeKind::Function as u8);
                self.stream.emit_word(params.len());
                for p in params {
                    let idx = self.type_ref(p);
                    self.stream.emit_word(idx);
                }
                let ret_idx = self.type_ref(ret);
                self.stream.emit_word(ret_idx);
                self.stream.emit_u8(is_vararg as u8);
            }
            Type::Struct {
                fields,
                field_bit_offs,
            } => {
                self.stream.emit_u8(TypeKind::Struct as u8);
                self.stream.emit_word(fields.len());
                for field in fields {
                    let idx = self.type_ref(field);
                    self.stream.emit_word(idx);
                }
                for off in field_bit_offs {
                    self.stream.emit_word(off as usize);
                }
            }
            Type::Unsupported { text } => {
                self.stream.emit_u8(TypeKind::Unsupported as u8);
                self.stream.emit_cstr(&text);
            }
        }
        Ok(())
    }

    /// Append the global-pointer-table declarations to the host module: an
    /// array of pointers to every interned global, positionally aligned with
    /// the global table, and its length. The runtime loader resolves a
    /// global's table index to an address through these.
    fn declare_globalvar_table(&mut self) {
        let ids = self.globals.entries().to_vec();
        let len = ids.len() as u64;
        debug!("declaring global pointer table with {len} entries");
        self.ctx
            .add_global_with_init(GLOBAL_PTRS_NAME, false, Some(GlobalInit::GlobalPtrs(ids)));
        self.ctx
            .add_global_with_init(GLOBAL_LEN_NAME, false, Some(GlobalInit::Word(len)));
    }

    // === Driver ============================================================

    /// Run the whole serialization.
    ///
    /// The emission order is load-bearing: lowering functions discovers
    /// constants, globals and types; draining constants can still discover
    /// types. So functions come first, then constants, then globals, and the
    /// type table drains last, once nothing can grow it any more.
    pub fn serialize(mut self) -> EncodeResult<()> {
        debug!("serializing module ({} functions)", self.funcs.len());
        self.stream.emit_u32(MAGIC);
        self.stream.emit_u32(VERSION);

        self.stream.emit_word(self.funcs.len());
        let funcs = self.funcs;
        for f in funcs {
            self.serialize_func(f)?;
        }

        trace!("draining {} constants", self.consts.len());
        self.stream.emit_word(self.consts.len());
        for i in 0..self.consts.len() {
            let cid = self.consts.entries()[i];
            self.serialize_constant(cid)?;
        }

        trace!("draining {} globals", self.globals.len());
        self.stream.emit_word(self.globals.len());
        for i in 0..self.globals.len() {
            let gid = self.globals.entries()[i];
            self.serialize_global(gid);
        }

        self.declare_globalvar_table();

        trace!("draining {} types", self.types.len());
        self.stream.emit_word(self.types.len());
        for i in 0..self.types.len() {
            let ty = self.types.entries()[i];
            self.serialize_type(ty)?;
        }
        Ok(())
    }
}

/// Dedicated target opcode for each binary operator.
fn binop_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Or => Opcode::Or,
        BinOp::And => Opcode::And,
        BinOp::Xor => Opcode::Xor,
        BinOp::Shl => Opcode::Shl,
        BinOp::AShr => Opcode::AShr,
        BinOp::LShr => Opcode::LShr,
        BinOp::FAdd => Opcode::FAdd,
        BinOp::FDiv => Opcode::FDiv,
        BinOp::FMul => Opcode::FMul,
        BinOp::FRem => Opcode::FRem,
        BinOp::FSub => Opcode::FSub,
        BinOp::SDiv => Opcode::SDiv,
        BinOp::SRem => Opcode::SRem,
        BinOp::UDiv => Opcode::UDiv,
        BinOp::URem => Opcode::URem,
    }
}
