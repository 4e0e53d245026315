//! Rotate and shift emitters. PPC shift counts of 32..63 zero the
//! result, which x86 shifts do not; the variable forms test bit 5 of
//! the count explicitly.

use ppcjit_backend::x86_64::{self as x86, AluOp, Cond, ShiftOp, CPU_BASE_REG, RCX};
use ppcjit_core::cpu::xer_ca_offset;
use ppcjit_core::insn::{bits, rotate_mask};
use ppcjit_core::{JitBlock, JitContext};

fn rc(insn: u32) -> bool {
    insn & 1 != 0
}

pub fn emit_rlwimi(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rs = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let sh = bits(insn, 11, 15);
    let mb = bits(insn, 6, 10);
    let me = bits(insn, 1, 5);
    let mask = rotate_mask(mb, me);

    ctx.start_hreg_seq("rlwimi");
    let hreg_t0 = ctx.tmp_hreg();
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);

    ctx.emit_load_gpr(hreg_rs, rs);
    ctx.emit_load_gpr(hreg_ra, ra);

    let mut iop = ctx.new_insn_output(2, "rlwimi");
    let s = &mut iop.buf;

    if mask != 0 {
        x86::alu_ri(s, AluOp::And, hreg_ra, !mask as i32);
    }

    x86::mov_rr(s, hreg_t0, hreg_rs);
    if sh != 0 {
        x86::shift_ri(s, ShiftOp::Rol, hreg_t0, sh as u8);
    }
    if mask != 0xFFFF_FFFF {
        x86::alu_ri(s, AluOp::And, hreg_t0, mask as i32);
    }

    x86::alu_rr(s, AluOp::Or, hreg_ra, hreg_t0);
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(ra, hreg_ra);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_rlwinm(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rs = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let sh = bits(insn, 11, 15);
    let mb = bits(insn, 6, 10);
    let me = bits(insn, 1, 5);
    let mask = rotate_mask(mb, me);

    ctx.start_hreg_seq("rlwinm");
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);

    ctx.emit_load_gpr(hreg_rs, rs);

    let mut iop = ctx.new_insn_output(2, "rlwinm");
    let s = &mut iop.buf;

    if rs != ra {
        x86::mov_rr(s, hreg_ra, hreg_rs);
    }
    if sh != 0 {
        x86::shift_ri(s, ShiftOp::Rol, hreg_ra, sh as u8);
    }
    if mask != 0xFFFF_FFFF {
        x86::alu_ri(s, AluOp::And, hreg_ra, mask as i32);
    }
    if rc(insn) {
        x86::test_rr(s, hreg_ra, hreg_ra);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(ra, hreg_ra);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_rlwnm(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rs = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let rb = bits(insn, 11, 15);
    let mb = bits(insn, 6, 10);
    let me = bits(insn, 1, 5);
    let mask = rotate_mask(mb, me);

    // The rotate count lives in C.
    ctx.emit_alter_host_reg(RCX);

    ctx.start_hreg_seq("rlwnm");
    ctx.alloc_hreg_forced(RCX);
    let hreg_t0 = ctx.tmp_hreg();
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);

    ctx.emit_load_gpr(hreg_ra, ra);
    ctx.emit_load_gpr(hreg_rs, rs);
    ctx.emit_load_gpr(RCX, rb);

    let mut iop = ctx.new_insn_output(2, "rlwnm");
    let s = &mut iop.buf;

    x86::mov_rr(s, hreg_t0, hreg_rs);
    x86::shift_cl(s, ShiftOp::Rol, hreg_t0);
    if mask != 0xFFFF_FFFF {
        x86::alu_ri(s, AluOp::And, hreg_t0, mask as i32);
    }
    x86::mov_rr(s, hreg_ra, hreg_t0);
    if rc(insn) {
        x86::test_rr(s, hreg_ra, hreg_ra);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(ra, hreg_ra);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

/// SLW/SRW: variable shift with the count-ge-32 zeroing check.
fn shift_var_common(ctx: &mut JitContext, insn: u32, name: &'static str, op: ShiftOp) {
    let rs = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let rb = bits(insn, 11, 15);

    ctx.emit_alter_host_reg(RCX);

    ctx.start_hreg_seq(name);
    ctx.alloc_hreg_forced(RCX);
    let hreg_t0 = ctx.tmp_hreg();
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);

    ctx.emit_load_gpr(hreg_rs, rs);
    ctx.emit_load_gpr(RCX, rb);

    let mut iop = ctx.new_insn_output(3, name);
    let s = &mut iop.buf;

    x86::alu_rr(s, AluOp::Xor, hreg_t0, hreg_t0);
    x86::test_ri(s, RCX, 0x20);
    let skip = x86::jcc8(s, Cond::Nz);

    x86::mov_rr(s, hreg_t0, hreg_rs);
    x86::shift_cl(s, op, hreg_t0);

    x86::patch_rel8(s, skip);
    x86::mov_rr(s, hreg_ra, hreg_t0);
    if rc(insn) {
        x86::test_rr(s, hreg_ra, hreg_ra);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(ra, hreg_ra);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_slw(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    shift_var_common(ctx, insn, "slw", ShiftOp::Shl);
}

pub fn emit_srw(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    shift_var_common(ctx, insn, "srw", ShiftOp::Shr);
}

pub fn emit_srawi(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rs = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let sh = bits(insn, 11, 15);

    ctx.start_hreg_seq("srawi");
    let hreg_t0 = ctx.tmp_hreg();
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);

    ctx.emit_load_gpr(hreg_rs, rs);

    let mut iop = ctx.new_insn_output(3, "srawi");
    let s = &mut iop.buf;
    x86::mov_rr(s, hreg_t0, hreg_rs);
    if ra != rs {
        x86::mov_rr(s, hreg_ra, hreg_rs);
    }
    x86::shift_ri(s, ShiftOp::Sar, hreg_ra, sh as u8);

    // CA iff the source is negative and a non-zero bit was shifted out:
    // (rs & (low-bits | sign)) unsigned-above 0x80000000.
    let mask = !(0xFFFF_FFFFu32 << sh) | 0x8000_0000;
    x86::alu_ri(s, AluOp::And, hreg_t0, mask as i32);
    x86::alu_ri(s, AluOp::Cmp, hreg_t0, 0x8000_0000u32 as i32);
    x86::setcc(s, Cond::A, hreg_t0);
    x86::alu_ri(s, AluOp::And, hreg_t0, 0x1);
    x86::store32(s, hreg_t0, CPU_BASE_REG, xer_ca_offset());

    if rc(insn) {
        x86::test_rr(s, hreg_ra, hreg_ra);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(ra, hreg_ra);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}
