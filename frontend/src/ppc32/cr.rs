//! Condition-register logical ops and CR transport.

use ppcjit_backend::x86_64::{self as x86, AluOp, Cond, ShiftOp, CPU_BASE_REG, RDX};
use ppcjit_core::cpu::cr_field_offset;
use ppcjit_core::ctx::ALL_FLAGS;
use ppcjit_core::insn::{bits, cr_bit, cr_field};
use ppcjit_core::{JitBlock, JitContext};

/// Shared body of the eight CR-logical ops: extract the two source
/// bits with SETcc (the second with an optional inverted sense),
/// combine, optionally complement, and splice the result into the
/// destination bit.
fn cr_logical(
    ctx: &mut JitContext,
    insn: u32,
    name: &'static str,
    bb_sense: Cond,
    combine: AluOp,
    complement: bool,
) {
    let bd = bits(insn, 21, 25);
    let bb = bits(insn, 16, 20);
    let ba = bits(insn, 11, 15);

    ctx.emit_alter_host_reg(RDX);

    ctx.start_hreg_seq(name);
    let hreg_t0 = ctx.tmp_hreg();
    ctx.alloc_hreg_forced(RDX);

    ctx.emit_require_flags(cr_field(ba) as i32);
    ctx.emit_require_flags(cr_field(bb) as i32);
    ctx.emit_require_flags(cr_field(bd) as i32);

    let mut iop = ctx.new_insn_output(3, name);
    let s = &mut iop.buf;

    x86::test_mem_imm(
        s,
        CPU_BASE_REG,
        cr_field_offset(cr_field(ba)),
        1 << cr_bit(ba),
    );
    x86::setcc(s, Cond::Nz, RDX);

    x86::test_mem_imm(
        s,
        CPU_BASE_REG,
        cr_field_offset(cr_field(bb)),
        1 << cr_bit(bb),
    );
    x86::setcc(s, bb_sense, hreg_t0);

    x86::alu_rr(s, combine, hreg_t0, RDX);
    if complement {
        x86::not_r(s, hreg_t0);
    }
    x86::alu_ri(s, AluOp::And, hreg_t0, 0x01);

    x86::alu_mem_imm(
        s,
        AluOp::And,
        CPU_BASE_REG,
        cr_field_offset(cr_field(bd)),
        !(1i32 << cr_bit(bd)),
    );
    x86::shift_ri(s, ShiftOp::Shl, hreg_t0, cr_bit(bd) as u8);
    x86::alu_mem_r(s, AluOp::Or, CPU_BASE_REG, cr_field_offset(cr_field(bd)), hreg_t0);

    ctx.push_insn_output(iop);
    ctx.close_hreg_seq();
}

pub fn emit_crand(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cr_logical(ctx, insn, "crand", Cond::Nz, AluOp::And, false);
}

pub fn emit_crandc(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cr_logical(ctx, insn, "crandc", Cond::Z, AluOp::And, false);
}

pub fn emit_creqv(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cr_logical(ctx, insn, "creqv", Cond::Nz, AluOp::Xor, true);
}

pub fn emit_crnand(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cr_logical(ctx, insn, "crnand", Cond::Nz, AluOp::And, true);
}

pub fn emit_crnor(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cr_logical(ctx, insn, "crnor", Cond::Nz, AluOp::Or, true);
}

pub fn emit_cror(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cr_logical(ctx, insn, "cror", Cond::Nz, AluOp::Or, false);
}

pub fn emit_crorc(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cr_logical(ctx, insn, "crorc", Cond::Z, AluOp::Or, false);
}

pub fn emit_crxor(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cr_logical(ctx, insn, "crxor", Cond::Nz, AluOp::Xor, false);
}

pub fn emit_mcrf(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rd = bits(insn, 23, 25);
    let rs = bits(insn, 18, 20);

    ctx.start_hreg_seq("mcrf");
    let hreg_t0 = ctx.tmp_hreg();
    ctx.emit_require_flags(rs as i32);

    let mut iop = ctx.new_insn_output(1, "mcrf");
    let s = &mut iop.buf;
    x86::load32(s, hreg_t0, CPU_BASE_REG, cr_field_offset(rs));
    x86::store32(s, hreg_t0, CPU_BASE_REG, cr_field_offset(rd));
    ctx.push_insn_output(iop);

    ctx.close_hreg_seq();
}

pub fn emit_mfcr(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rd = bits(insn, 21, 25);

    ctx.start_hreg_seq("mfcr");
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_t0 = ctx.tmp_hreg();
    ctx.emit_require_flags(ALL_FLAGS);

    let mut iop = ctx.new_insn_output(3, "mfcr");
    let s = &mut iop.buf;
    x86::alu_rr(s, AluOp::Xor, hreg_rd, hreg_rd);
    for i in 0..8 {
        x86::load32(s, hreg_t0, CPU_BASE_REG, cr_field_offset(i));
        x86::shift_ri(s, ShiftOp::Shl, hreg_rd, 4);
        x86::alu_rr(s, AluOp::Or, hreg_rd, hreg_t0);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    ctx.close_hreg_seq();
}

pub fn emit_mtcrf(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rs = bits(insn, 21, 25);
    let crm = bits(insn, 12, 19);

    ctx.start_hreg_seq("mtcrf");
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_t0 = ctx.tmp_hreg();

    ctx.emit_load_gpr(hreg_rs, rs);

    let mut iop = ctx.new_insn_output(3, "mtcrf");
    let s = &mut iop.buf;
    for i in 0..8u32 {
        if crm & (1 << (7 - i)) != 0 {
            x86::mov_rr(s, hreg_t0, hreg_rs);
            if i != 7 {
                x86::shift_ri(s, ShiftOp::Shr, hreg_t0, (28 - (i << 2)) as u8);
            }
            x86::alu_ri(s, AluOp::And, hreg_t0, 0x0F);
            x86::store32(s, hreg_t0, CPU_BASE_REG, cr_field_offset(i));
        }
    }
    ctx.push_insn_output(iop);

    ctx.emit_trash_flags();
    ctx.close_hreg_seq();
}
