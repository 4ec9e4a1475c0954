//! Per-opcode lowering behavior, asserted on the emitted bytes.
//!
//! Covers the specialized rules (conditional branch operand order, call
//! callee-first reordering, alloca's synthetic type operand, the
//! pointer-offset collapse, the comparison predicate operand) and the
//! generic rule's order preservation, debug-instruction filtering and the
//! unsupported-instruction fallback.

mod common;

use aotir::ir::{BinOp, Builder, CmpPredicate, IntPredicate, Module, Value};
use aotir::{encode_module_to_vec, Opcode};
use common::{Operand, Reader};

#[test]
fn conditional_branch_emits_condition_then_true_then_false() {
    let mut module = Module::new("m");
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

    let bytes = encode_module_to_vec(&mut module).unwrap();
    let mut r = Reader::new(&bytes);
    r.header();
    assert_eq!(r.word(), 1);
    r.cstr();
    r.word();
    assert_eq!(r.word(), 3, "three blocks");

    // Entry block: the comparison, then the conditional branch.
    assert_eq!(r.word(), 2);
    let (_, opcode, nops) = r.inst_header();
    assert_eq!(opcode, Opcode::ICmp as u8);
    assert_eq!(nops, 3);
    assert_eq!(r.operand(), Operand::Arg(0));
    assert_eq!(
        r.operand(),
        Operand::Predicate(IntPredicate::SignedLess.code())
    );
    assert_eq!(r.operand(), Operand::Constant(0));

    let (_, opcode, nops) = r.inst_header();
    assert_eq!(opcode, Opcode::CondBr as u8);
    assert_eq!(nops, 3);
    assert_eq!(r.operand(), Operand::Local(0, 0), "condition first");
    assert_eq!(r.operand(), Operand::Block(1), "then the true successor");
    assert_eq!(r.operand(), Operand::Block(2), "then the false successor");
}

#[test]
fn unconditional_branch_emits_no_operands() {
    let mut module = Module::new("m");
    let void = module.ctx.void_ty();
    let fty = module.ctx.func_ty(&[], void, false);
    let f = module.add_function("fallthrough", fty);
    let mut b = Builder::new(&mut module, f);
    let entry = b.append_block();
    let exit = b.append_block();
    b.position_at_end(entry);
    b.build_br(exit);
    b.position_at_end(exit);
    b.build_ret(None);

    let bytes = encode_module_to_vec(&mut module).unwrap();
    let mut r = Reader::new(&bytes);
    r.header();
    assert_eq!(r.word(), 1);
    r.cstr();
    r.word();
    assert_eq!(r.word(), 2);
    assert_eq!(r.word(), 1);
    let (_, opcode, nops) = r.inst_header();
    assert_eq!(opcode, Opcode::Br as u8);
    assert_eq!(nops, 0, "successor is resolved structurally, not encoded");
}

#[test]
fn call_emits_callee_before_arguments() {
    let mut module = Module::new("m");
    let i64t = module.ctx.int_ty(64);
    let forty_two = module.ctx.const_int(i64t, 42);
    let fty = module.ctx.func_ty(&[i64t, i64t], i64t, false);
    let callee = module.add_function("ext", fty);
    let caller = module.add_function("caller", fty);
    let mut b = Builder::new(&mut module, caller);
    let entry = b.append_block();
    b.position_at_end(entry);
    let ret = b.build_call(
        i64t,
        Value::Func(callee),
        vec![Value::Arg(0), Value::Const(forty_two)],
    );
    b.build_ret(Some(ret));

    let bytes = encode_module_to_vec(&mut module).unwrap();
    let mut r = Reader::new(&bytes);
    r.header();
    assert_eq!(r.word(), 2);
    // The callee is a declaration with zero blocks.
    assert_eq!(r.cstr(), "ext");
    r.word();
    assert_eq!(r.word(), 0);
    assert_eq!(r.cstr(), "caller");
    r.word();
    assert_eq!(r.word(), 1);
    assert_eq!(r.word(), 2);

    let (_, opcode, nops) = r.inst_header();
    assert_eq!(opcode, Opcode::Call as u8);
    assert_eq!(nops, 3);
    assert_eq!(r.operand(), Operand::Function(0), "callee comes first");
    assert_eq!(r.operand(), Operand::Arg(0));
    assert_eq!(r.operand(), Operand::Constant(0));

    // The call result is a usable local.
    let (_, opcode, _) = r.inst_header();
    assert_eq!(opcode, Opcode::Ret as u8);
    assert_eq!(r.operand(), Operand::Local(0, 0));
}

#[test]
fn alloca_emits_allocated_type_and_constant_count() {
    let mut module = Module::new("m");
    let i64t = module.ctx.int_ty(64);
    let one = module.ctx.const_int(i64t, 1);
    let ptr = module.ctx.ptr_ty();
    let fty = module.ctx.func_ty(&[], ptr, false);
    let f = module.add_function("frame", fty);
    let mut b = Builder::new(&mut module, f);
    let entry = b.append_block();
    b.position_at_end(entry);
    let slot = b.build_alloca(i64t, Value::Const(one));
    b.build_ret(Some(slot));

    let bytes = encode_module_to_vec(&mut module).unwrap();
    let mut r = Reader::new(&bytes);
    r.header();
    assert_eq!(r.word(), 1);
    r.cstr();
    r.word();
    assert_eq!(r.word(), 1);
    assert_eq!(r.word(), 2);

    let (_, opcode, nops) = r.inst_header();
    assert_eq!(opcode, Opcode::Alloca as u8);
    assert_eq!(nops, 2, "allocated type plus element count");
    let allocated = r.operand();
    let Operand::Type(allocated_idx) = allocated else {
        panic!("expected a type operand, got {allocated:?}");
    };
    assert_eq!(r.operand(), Operand::Constant(0));

    // Alloca always defines a value.
    let (_, opcode, _) = r.inst_header();
    assert_eq!(opcode, Opcode::Ret as u8);
    assert_eq!(r.operand(), Operand::Local(0, 0));

    // The constant table holds the count; its type ref points at i64.
    assert_eq!(r.word(), 1, "one constant");
    assert_eq!(r.word(), allocated_idx, "count constant is i64 too");
    assert_eq!(r.word(), 8);
    assert_eq!(r.bytes(8), 1u64.to_ne_bytes());
}

#[test]
fn pointer_offset_chain_collapses_to_one_constant() {
    let mut module = Module::new("m");
    let i32t = module.ctx.int_ty(32);
    let i64t = module.ctx.int_ty(64);
    // { i32 @ 0, i64 @ 64 }: 16 bytes, field 1 at byte 8.
    let st = module.ctx.struct_ty(vec![i32t, i64t], vec![0, 64]);
    let one = module.ctx.const_int(i64t, 1);
    let ptr = module.ctx.ptr_ty();
    let fty = module.ctx.func_ty(&[ptr], ptr, false);
    let f = module.add_function("field", fty);
    let mut b = Builder::new(&mut module, f);
    let entry = b.append_block();
    b.position_at_end(entry);
    // &base[1].1 = base + 16 + 8.
    let elem = b.build_gep(Value::Arg(0), st, vec![Value::Const(one), Value::Const(one)]);
    b.build_ret(Some(elem));

    let bytes = encode_module_to_vec(&mut module).unwrap();
    let mut r = Reader::new(&bytes);
    r.header();
    assert_eq!(r.word(), 1);
    r.cstr();
    r.word();
    assert_eq!(r.word(), 1);
    assert_eq!(r.word(), 2);

    let (_, opcode, nops) = r.inst_header();
    assert_eq!(opcode, Opcode::PtrAdd as u8);
    assert_eq!(nops, 2, "base pointer and collapsed offset");
    assert_eq!(r.operand(), Operand::Arg(0));
    let offset = r.operand();
    let Operand::Constant(offset_idx) = offset else {
        panic!("expected a constant operand, got {offset:?}");
    };

    let (_, opcode, _) = r.inst_header();
    assert_eq!(opcode, Opcode::Ret as u8);
    assert_eq!(r.operand(), Operand::Local(0, 0));

    // Only the synthesized offset reaches the constant table; the raw index
    // constants never do.
    assert_eq!(r.word(), 1, "one constant");
    assert_eq!(offset_idx, 0);
    r.word(); // its i64 type ref
    assert_eq!(r.word(), 8);
    assert_eq!(r.bytes(8), 24i64.to_ne_bytes());
}

#[test]
fn generic_rule_preserves_source_operand_order() {
    let mut module = Module::new("m");
    let i64t = module.ctx.int_ty(64);
    let ptr = module.ctx.ptr_ty();
    let fty = module.ctx.func_ty(&[i64t, ptr], i64t, false);
    let f = module.add_function("spill", fty);
    let mut b = Builder::new(&mut module, f);
    let entry = b.append_block();
    b.position_at_end(entry);
    b.build_store(Value::Arg(0), Value::Arg(1));
    let val = b.build_load(i64t, Value::Arg(1));
    b.build_ret(Some(val));

    let bytes = encode_module_to_vec(&mut module).unwrap();
    let mut r = Reader::new(&bytes);
    r.header();
    assert_eq!(r.word(), 1);
    r.cstr();
    r.word();
    assert_eq!(r.word(), 1);
    assert_eq!(r.word(), 3);

    let (_, opcode, nops) = r.inst_header();
    assert_eq!(opcode, Opcode::Store as u8);
    assert_eq!(nops, 2);
    assert_eq!(r.operand(), Operand::Arg(0), "value before pointer");
    assert_eq!(r.operand(), Operand::Arg(1));

    let (_, opcode, nops) = r.inst_header();
    assert_eq!(opcode, Opcode::Load as u8);
    assert_eq!(nops, 1);
    assert_eq!(r.operand(), Operand::Arg(1));

    // The store produced nothing but still occupies index 0, so the load's
    // result lands at (0, 1).
    let (_, opcode, _) = r.inst_header();
    assert_eq!(opcode, Opcode::Ret as u8);
    assert_eq!(r.operand(), Operand::Local(0, 1));
}

#[test]
fn debug_instructions_are_invisible_to_the_stream() {
    let mut module = Module::new("m");
    let i64t = module.ctx.int_ty(64);
    let fty = module.ctx.func_ty(&[i64t], i64t, false);
    let f = module.add_function("noisy", fty);
    let mut b = Builder::new(&mut module, f);
    let entry = b.append_block();
    b.position_at_end(entry);
    b.build_debug("dbg.value #0");
    let doubled = b.build_binop(BinOp::Add, i64t, Value::Arg(0), Value::Arg(0));
    b.build_debug("dbg.value #1");
    b.build_ret(Some(doubled));

    let bytes = encode_module_to_vec(&mut module).unwrap();
    let mut r = Reader::new(&bytes);
    r.header();
    assert_eq!(r.word(), 1);
    r.cstr();
    r.word();
    assert_eq!(r.word(), 1);
    assert_eq!(r.word(), 2, "only the real instructions are counted");

    let (_, opcode, _) = r.inst_header();
    assert_eq!(opcode, Opcode::Add as u8);
    r.operand();
    r.operand();

    // Location indices also skip the filtered instructions.
    let (_, opcode, _) = r.inst_header();
    assert_eq!(opcode, Opcode::Ret as u8);
    assert_eq!(r.operand(), Operand::Local(0, 0));
}

#[test]
fn unknown_instructions_lower_to_a_placeholder_and_the_run_completes() {
    let mut module = Module::new("m");
    let i64t = module.ctx.int_ty(64);
    let fty = module.ctx.func_ty(&[], i64t, false);
    let f = module.add_function("odd", fty);
    let mut b = Builder::new(&mut module, f);
    let entry = b.append_block();
    b.position_at_end(entry);
    let v = b.build_unsupported(i64t, "%v = frobnicate i64 7");
    b.build_ret(Some(v));

    let bytes = encode_module_to_vec(&mut module).unwrap();
    let mut r = Reader::new(&bytes);
    r.header();
    assert_eq!(r.word(), 1);
    r.cstr();
    r.word();
    assert_eq!(r.word(), 1);
    assert_eq!(r.word(), 2);

    let (_, opcode, nops) = r.inst_header();
    assert_eq!(opcode, Opcode::Unsupported as u8);
    assert_eq!(nops, 1, "a single placeholder operand");
    let placeholder = r.operand();
    let Operand::Unsupported(text) = placeholder else {
        panic!("expected an unsupported operand, got {placeholder:?}");
    };
    assert!(!text.is_empty());

    // The placeholder still defines a value.
    let (_, opcode, _) = r.inst_header();
    assert_eq!(opcode, Opcode::Ret as u8);
    assert_eq!(r.operand(), Operand::Local(0, 0));
}

#[test]
fn each_binary_operator_gets_its_own_opcode() {
    let cases = [
        (BinOp::Sub, Opcode::Sub),
        (BinOp::UDiv, Opcode::UDiv),
        (BinOp::SRem, Opcode::SRem),
        (BinOp::FMul, Opcode::FMul),
        (BinOp::LShr, Opcode::LShr),
    ];
    for (op, expected) in cases {
        let mut module = Module::new("m");
        let i64t = module.ctx.int_ty(64);
        let fty = module.ctx.func_ty(&[i64t, i64t], i64t, false);
        let f = module.add_function("op", fty);
        let mut b = Builder::new(&mut module, f);
        let entry = b.append_block();
        b.position_at_end(entry);
        let v = b.build_binop(op, i64t, Value::Arg(0), Value::Arg(1));
        b.build_ret(Some(v));

        let bytes = encode_module_to_vec(&mut module).unwrap();
        let mut r = Reader::new(&bytes);
        r.header();
        r.word();
        r.cstr();
        r.word();
        r.word();
        r.word();
        let (_, opcode, _) = r.inst_header();
        assert_eq!(opcode, expected as u8, "{op:?}");
    }
}
