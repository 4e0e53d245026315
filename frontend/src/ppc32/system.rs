//! Special-register transport, time base, interpreter fallback and
//! virtual breakpoints.

use ppcjit_backend::x86_64::{self as x86, AluOp, Cond, CPU_BASE_REG, RAX, RDI, RSI};
use ppcjit_core::cpu::{
    self, ctr_offset, lr_offset, msr_offset, perf_counter_offset, sr_offset, tb_offset,
};
use ppcjit_core::insn::bits;
use ppcjit_core::{JitBlock, JitContext};

use super::{cur_ia, set_ia};

/// Time base ticks added per MFTBL execution. A coarse proxy, not
/// wall-clock synchronized.
const TB_INCREMENT: i32 = 50;

/// Shared `rd = spr` transport.
fn mfspr_common(ctx: &mut JitContext, insn: u32, name: &'static str, spr_offset: i32) {
    let rd = bits(insn, 21, 25);

    ctx.start_hreg_seq(name);
    let hreg_rd = ctx.alloc_hreg(rd as i32);

    let mut iop = ctx.new_insn_output(1, name);
    x86::load32(&mut iop.buf, hreg_rd, CPU_BASE_REG, spr_offset);
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    ctx.close_hreg_seq();
}

/// Shared `spr = rs` transport.
fn mtspr_common(ctx: &mut JitContext, insn: u32, name: &'static str, spr_offset: i32) {
    let rs = bits(insn, 21, 25);

    ctx.start_hreg_seq(name);
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    ctx.emit_load_gpr(hreg_rs, rs);

    let mut iop = ctx.new_insn_output(1, name);
    x86::store32(&mut iop.buf, hreg_rs, CPU_BASE_REG, spr_offset);
    ctx.push_insn_output(iop);

    ctx.close_hreg_seq();
}

pub fn emit_mflr(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    mfspr_common(ctx, insn, "mflr", lr_offset());
}

pub fn emit_mtlr(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    mtspr_common(ctx, insn, "mtlr", lr_offset());
}

pub fn emit_mfctr(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    mfspr_common(ctx, insn, "mfctr", ctr_offset());
}

pub fn emit_mtctr(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    mtspr_common(ctx, insn, "mtctr", ctr_offset());
}

pub fn emit_mfmsr(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    mfspr_common(ctx, insn, "mfmsr", msr_offset());
}

pub fn emit_mfsr(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let sr = bits(insn, 16, 19);
    mfspr_common(ctx, insn, "mfsr", sr_offset(sr));
}

/// MFTBU reads the high word without advancing the time base.
pub fn emit_mftbu(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    mfspr_common(ctx, insn, "mftbu", tb_offset() + 4);
}

/// MFTBL reads the low word and advances the 64-bit time base.
pub fn emit_mftbl(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rd = bits(insn, 21, 25);

    ctx.start_hreg_seq("mftbl");
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_t0 = ctx.tmp_hreg();

    let mut iop = ctx.new_insn_output(3, "mftbl");
    let s = &mut iop.buf;
    x86::load32(s, hreg_rd, CPU_BASE_REG, tb_offset());
    x86::load32(s, hreg_t0, CPU_BASE_REG, tb_offset() + 4);
    x86::alu_ri(s, AluOp::Add, hreg_rd, TB_INCREMENT);
    x86::alu_ri(s, AluOp::Adc, hreg_t0, 0);
    x86::store32(s, hreg_rd, CPU_BASE_REG, tb_offset());
    x86::store32(s, hreg_t0, CPU_BASE_REG, tb_offset() + 4);
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    ctx.close_hreg_seq();
}

/// SYNC orders nothing in a single-threaded core.
pub fn emit_sync(_ctx: &mut JitContext, _b: &mut JitBlock, _insn: u32) {}

/// Fallback for opcodes without a native emitter: hand the word to the
/// interpreter; a non-zero status exits the block with it.
pub fn emit_unknown(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let mut iop = ctx.new_insn_output(3, "unknown");
    let s = &mut iop.buf;

    set_ia(s, cur_ia(b));
    x86::mov_rr64(s, RDI, CPU_BASE_REG);
    x86::mov_ri(s, RSI, insn);
    x86::call_mem(s, CPU_BASE_REG, cpu::exec_single_insn_offset());
    x86::test_rr(s, RAX, RAX);
    let ok = x86::jcc8(s, Cond::Z);
    x86::ret(s);
    x86::patch_rel8(s, ok);
    ctx.push_insn_output(iop);

    ctx.emit_eob();
}

/// Virtual breakpoint hook call ahead of the instruction.
pub fn emit_breakpoint(ctx: &mut JitContext, b: &mut JitBlock) {
    let mut iop = ctx.new_insn_output(2, "breakpoint");
    let s = &mut iop.buf;

    set_ia(s, cur_ia(b));
    x86::mov_rr64(s, RDI, CPU_BASE_REG);
    x86::call_mem(s, CPU_BASE_REG, cpu::run_breakpoint_offset());
    ctx.push_insn_output(iop);

    ctx.emit_eob();
}

/// Executed-instruction counter bump.
pub fn emit_perf_count(ctx: &mut JitContext) {
    let mut iop = ctx.new_insn_output(1, "perf_cnt");
    x86::inc_mem32(&mut iop.buf, CPU_BASE_REG, perf_counter_offset());
    ctx.push_insn_output(iop);
}
