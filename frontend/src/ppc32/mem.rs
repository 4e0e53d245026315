//! Memory access emitters.
//!
//! LBZ/LWZ/STB/STW, the measured-hot forms, inline a software-TLB
//! probe ahead of the generic slow call; everything else (update and
//! indexed forms, halfwords) goes straight to the C-ABI handler. An
//! exception can surface at any memory instruction, so each one is
//! marked as a branch target and terminates the cached register state.

use ppcjit_backend::x86_64::{self as x86, AluOp, Cond, ShiftOp, CPU_BASE_REG, RAX, RBX, RCX, RDI, RDX, RSI};
use ppcjit_core::cpu::{
    self, MtsFlags, MTS_ENTRY_SHIFT, MTS_HASH_MASK, MTS_HASH_SHIFT, PPC32_MIN_PAGE_IMASK,
    PPC32_MIN_PAGE_MASK, PPC_MEMOP_LBZ, PPC_MEMOP_LHA, PPC_MEMOP_LHZ, PPC_MEMOP_LWZ,
    PPC_MEMOP_STB, PPC_MEMOP_STH, PPC_MEMOP_STW,
};
use ppcjit_core::insn::{bits, sign_extend};
use ppcjit_core::op::OpKind;
use ppcjit_core::{JitBlock, JitContext};

use super::{alu_gpr, cur_ia, load_gpr, load_imm, set_ia, store_gpr};

/// Call the slow handler: `(cpu, vaddr in ESI, target in EDX)`.
/// A non-zero status leaves the block with it.
fn memop_call_tail(s: &mut Vec<u8>, op: usize, target: u32) {
    x86::mov_ri(s, RDX, target);
    x86::mov_rr64(s, RDI, CPU_BASE_REG);
    x86::call_mem(s, CPU_BASE_REG, cpu::memop_offset(op));
    x86::test_rr(s, RAX, RAX);
    let ok = x86::jcc8(s, Cond::Z);
    x86::ret(s);
    x86::patch_rel8(s, ok);
}

/// Generic D-form memory op through the slow handler.
fn emit_memop(
    ctx: &mut JitContext,
    b: &mut JitBlock,
    op: usize,
    base: u32,
    offset: u32,
    target: u32,
    update: bool,
) {
    let val = sign_extend(offset, 16);

    ctx.emit_basic(OpKind::BranchTarget);
    ctx.emit_eob();

    let mut iop = ctx.new_insn_output(5, "memop");
    let s = &mut iop.buf;

    // IA must be current if the handler raises an exception.
    set_ia(s, cur_ia(b));

    // ESI = effective address
    load_imm(s, RSI, val);
    if update || base != 0 {
        alu_gpr(s, AluOp::Add, RSI, base);
    }
    if update {
        // Stash the EA in a call-preserved register.
        x86::mov_rr(s, RBX, RSI);
    }

    memop_call_tail(s, op, target);

    if update {
        store_gpr(s, base, RBX);
    }
    ctx.push_insn_output(iop);
}

/// Generic X-form memory op through the slow handler.
fn emit_memop_idx(
    ctx: &mut JitContext,
    b: &mut JitBlock,
    op: usize,
    ra: u32,
    rb: u32,
    target: u32,
    update: bool,
) {
    ctx.emit_basic(OpKind::BranchTarget);
    ctx.emit_eob();

    let mut iop = ctx.new_insn_output(5, "memop_idx");
    let s = &mut iop.buf;

    set_ia(s, cur_ia(b));

    load_gpr(s, RSI, rb);
    if update || ra != 0 {
        alu_gpr(s, AluOp::Add, RSI, ra);
    }
    if update {
        x86::mov_rr(s, RBX, RSI);
    }

    memop_call_tail(s, op, target);

    if update {
        store_gpr(s, ra, RBX);
    }
    ctx.push_insn_output(iop);
}

type FastAccess = fn(&mut Vec<u8>, u32);

// In the fast handlers: RAX = host page address, RBX = offset in page.

fn fast_lbz(s: &mut Vec<u8>, target: u32) {
    load_imm(s, RCX, 0);
    x86::load8_sib(s, RCX, RAX, RBX);
    store_gpr(s, target, RCX);
}

fn fast_stb(s: &mut Vec<u8>, target: u32) {
    load_gpr(s, RDX, target);
    x86::store8_sib(s, RDX, RAX, RBX);
}

fn fast_lwz(s: &mut Vec<u8>, target: u32) {
    x86::load32_sib(s, RAX, RAX, RBX, 0);
    x86::bswap(s, RAX);
    store_gpr(s, target, RAX);
}

fn fast_stw(s: &mut Vec<u8>, target: u32) {
    load_gpr(s, RDX, target);
    x86::bswap(s, RDX);
    x86::store32_sib(s, RDX, RAX, RBX);
}

/// D-form memory op with the inline MTS probe ahead of the slow call.
fn emit_memop_fast(
    ctx: &mut JitContext,
    b: &mut JitBlock,
    write_op: bool,
    op: usize,
    base: u32,
    offset: u32,
    target: u32,
    handler: FastAccess,
) {
    let val = sign_extend(offset, 16);

    ctx.emit_basic(OpKind::BranchTarget);
    ctx.emit_eob();

    let mut iop = ctx.new_insn_output(5, "memop_fast");
    let s = &mut iop.buf;

    // RBX = effective address
    if val != 0 {
        load_imm(s, RBX, val);
        if base != 0 {
            alu_gpr(s, AluOp::Add, RBX, base);
        }
    } else if base != 0 {
        load_gpr(s, RBX, base);
    } else {
        load_imm(s, RBX, 0);
    }

    // EAX = cache index, RDX = entry address
    x86::mov_rr(s, RAX, RBX);
    x86::shift_ri(s, ShiftOp::Shr, RAX, MTS_HASH_SHIFT as u8);
    x86::alu_ri(s, AluOp::And, RAX, MTS_HASH_MASK as i32);
    x86::load64(s, RDX, CPU_BASE_REG, cpu::mts_dcache_offset());
    x86::shift_ri(s, ShiftOp::Shl, RAX, MTS_ENTRY_SHIFT as u8);
    x86::alu_rr64(s, AluOp::Add, RDX, RAX);

    // Virtual page match?
    x86::mov_rr(s, RSI, RBX);
    x86::alu_ri(s, AluOp::And, RSI, PPC32_MIN_PAGE_MASK as i32);
    x86::alu_r_mem(s, AluOp::Cmp, RSI, RDX, cpu::mts_gvpa_offset());
    let miss = x86::jcc8(s, Cond::Nz);

    // Copy-on-write or code-holding pages take the slow path so the
    // write side effects run.
    let mut flag_miss = None;
    if write_op {
        x86::test_mem_imm(
            s,
            RDX,
            cpu::mts_flags_offset(),
            (MtsFlags::COW | MtsFlags::EXEC).bits(),
        );
        flag_miss = Some(x86::jcc8(s, Cond::Nz));
    }

    // Hit: RBX = offset in page, RAX = host page address.
    x86::alu_ri(s, AluOp::And, RBX, PPC32_MIN_PAGE_IMASK as i32);
    x86::load64(s, RAX, RDX, cpu::mts_hpa_offset());
    handler(s, target);
    let done = x86::jmp8(s);

    // Slow path.
    x86::patch_rel8(s, miss);
    if let Some(at) = flag_miss {
        x86::patch_rel8(s, at);
    }
    set_ia(s, cur_ia(b));
    x86::mov_rr(s, RSI, RBX);
    memop_call_tail(s, op, target);

    x86::patch_rel8(s, done);
    ctx.push_insn_output(iop);
}

/// rs/ra/offset fields of the D-form.
fn dform(insn: u32) -> (u32, u32, u32) {
    (bits(insn, 21, 25), bits(insn, 16, 20), bits(insn, 0, 15))
}

/// rs/ra/rb fields of the X-form.
fn xform(insn: u32) -> (u32, u32, u32) {
    (bits(insn, 21, 25), bits(insn, 16, 20), bits(insn, 11, 15))
}

pub fn emit_lbz(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop_fast(ctx, b, false, PPC_MEMOP_LBZ, ra, offset, rs, fast_lbz);
}

pub fn emit_lbzu(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_LBZ, ra, offset, rs, true);
}

pub fn emit_lbzux(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_LBZ, ra, rb, rs, true);
}

pub fn emit_lbzx(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_LBZ, ra, rb, rs, false);
}

pub fn emit_lha(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_LHA, ra, offset, rs, false);
}

pub fn emit_lhau(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_LHA, ra, offset, rs, true);
}

pub fn emit_lhaux(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_LHA, ra, rb, rs, true);
}

pub fn emit_lhax(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_LHA, ra, rb, rs, false);
}

pub fn emit_lhz(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_LHZ, ra, offset, rs, false);
}

pub fn emit_lhzu(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_LHZ, ra, offset, rs, true);
}

pub fn emit_lhzux(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_LHZ, ra, rb, rs, true);
}

pub fn emit_lhzx(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_LHZ, ra, rb, rs, false);
}

pub fn emit_lwz(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop_fast(ctx, b, false, PPC_MEMOP_LWZ, ra, offset, rs, fast_lwz);
}

pub fn emit_lwzu(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_LWZ, ra, offset, rs, true);
}

pub fn emit_lwzux(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_LWZ, ra, rb, rs, true);
}

pub fn emit_lwzx(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_LWZ, ra, rb, rs, false);
}

pub fn emit_stb(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop_fast(ctx, b, true, PPC_MEMOP_STB, ra, offset, rs, fast_stb);
}

pub fn emit_stbu(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_STB, ra, offset, rs, true);
}

pub fn emit_stbux(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_STB, ra, rb, rs, true);
}

pub fn emit_stbx(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_STB, ra, rb, rs, false);
}

pub fn emit_sth(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_STH, ra, offset, rs, false);
}

pub fn emit_sthu(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_STH, ra, offset, rs, true);
}

pub fn emit_sthux(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_STH, ra, rb, rs, true);
}

pub fn emit_sthx(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_STH, ra, rb, rs, false);
}

pub fn emit_stw(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop_fast(ctx, b, true, PPC_MEMOP_STW, ra, offset, rs, fast_stw);
}

pub fn emit_stwu(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, offset) = dform(insn);
    emit_memop(ctx, b, PPC_MEMOP_STW, ra, offset, rs, true);
}

pub fn emit_stwux(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_STW, ra, rb, rs, true);
}

pub fn emit_stwx(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);
    emit_memop_idx(ctx, b, PPC_MEMOP_STW, ra, rb, rs, false);
}
