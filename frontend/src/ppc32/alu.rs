//! Integer arithmetic, logic, compare, multiply and divide emitters.

use ppcjit_backend::x86_64::{self as x86, AluOp, Cond, ShiftOp, CPU_BASE_REG, RAX, RDX};
use ppcjit_core::cpu::xer_ca_offset;
use ppcjit_core::insn::{bits, sign_extend};
use ppcjit_core::{JitBlock, JitContext};

use super::load_imm;

/// rd/ra/rb field split of the X-form.
fn xform(insn: u32) -> (u32, u32, u32) {
    (bits(insn, 21, 25), bits(insn, 16, 20), bits(insn, 11, 15))
}

fn rc(insn: u32) -> bool {
    insn & 1 != 0
}

/// Two-operand commutative ALU body: `dst = a op b` with the usual
/// aliasing shortcuts.
fn alu_body(s: &mut Vec<u8>, op: AluOp, hd: u8, ha: u8, hb: u8, d: u32, a: u32, b: u32) {
    if d == a {
        x86::alu_rr(s, op, hd, hb);
    } else if d == b {
        x86::alu_rr(s, op, hd, ha);
    } else {
        x86::mov_rr(s, hd, ha);
        x86::alu_rr(s, op, hd, hb);
    }
}

pub fn emit_add(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let (rd, ra, rb) = xform(insn);

    ctx.start_hreg_seq("add");
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rb = ctx.alloc_hreg(rb as i32);

    ctx.emit_load_gpr(hreg_ra, ra);
    ctx.emit_load_gpr(hreg_rb, rb);

    let mut iop = ctx.new_insn_output(2, "add");
    alu_body(&mut iop.buf, AluOp::Add, hreg_rd, hreg_ra, hreg_rb, rd, ra, rb);
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_addc(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let (rd, ra, rb) = xform(insn);

    ctx.start_hreg_seq("addc");
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rb = ctx.alloc_hreg(rb as i32);
    let hreg_t0 = ctx.tmp_hreg();

    ctx.emit_load_gpr(hreg_ra, ra);
    ctx.emit_load_gpr(hreg_rb, rb);

    let mut iop = ctx.new_insn_output(2, "addc");
    let s = &mut iop.buf;
    alu_body(s, AluOp::Add, hreg_rd, hreg_ra, hreg_rb, rd, ra, rb);

    x86::setcc(s, Cond::C, hreg_t0);
    x86::alu_ri(s, AluOp::And, hreg_t0, 0x1);
    x86::store32(s, hreg_t0, CPU_BASE_REG, xer_ca_offset());

    if rc(insn) {
        x86::test_rr(s, hreg_rd, hreg_rd);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_adde(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let (rd, ra, rb) = xform(insn);

    ctx.start_hreg_seq("adde");
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rb = ctx.alloc_hreg(rb as i32);
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_t0 = ctx.alloc_hreg(-1);
    let hreg_t1 = ctx.tmp_hreg();

    ctx.emit_alter_host_reg(hreg_t0);
    ctx.emit_load_gpr(hreg_ra, ra);
    ctx.emit_load_gpr(hreg_rb, rb);

    let mut iop = ctx.new_insn_output(3, "adde");
    let s = &mut iop.buf;

    // t0 = ra + carry-in, first partial carry out
    x86::alu_rr(s, AluOp::Xor, hreg_t1, hreg_t1);
    x86::mov_rr(s, hreg_t0, hreg_ra);
    x86::alu_r_mem(s, AluOp::Add, hreg_t0, CPU_BASE_REG, xer_ca_offset());
    x86::setcc(s, Cond::C, hreg_t1);
    x86::store32(s, hreg_t1, CPU_BASE_REG, xer_ca_offset());

    // t0 += rb, second partial carry OR-ed in
    x86::alu_rr(s, AluOp::Add, hreg_t0, hreg_rb);
    x86::setcc(s, Cond::C, hreg_t1);
    x86::alu_mem_r(s, AluOp::Or, CPU_BASE_REG, xer_ca_offset(), hreg_t1);

    if rc(insn) {
        x86::test_rr(s, hreg_t0, hreg_t0);
    }
    x86::mov_rr(s, hreg_rd, hreg_t0);
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_addi(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rd = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let tmp = sign_extend(bits(insn, 0, 15), 16);

    ctx.start_hreg_seq("addi");
    let hreg_rd = ctx.alloc_hreg(rd as i32);

    if ra != 0 {
        let hreg_ra = ctx.alloc_hreg(ra as i32);
        ctx.emit_load_gpr(hreg_ra, ra);

        let mut iop = ctx.new_insn_output(2, "addi");
        let s = &mut iop.buf;
        if rd != ra {
            x86::mov_rr(s, hreg_rd, hreg_ra);
        }
        x86::alu_ri(s, AluOp::Add, hreg_rd, tmp as i32);
        ctx.push_insn_output(iop);
    } else {
        let mut iop = ctx.new_insn_output(1, "addi");
        load_imm(&mut iop.buf, hreg_rd, tmp);
        ctx.push_insn_output(iop);
    }

    ctx.emit_store_gpr(rd, hreg_rd);
    ctx.close_hreg_seq();
}

fn addic_common(ctx: &mut JitContext, insn: u32, update_cr: bool) {
    let rd = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let tmp = sign_extend(bits(insn, 0, 15), 16);

    ctx.start_hreg_seq(if update_cr { "addic." } else { "addic" });
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);

    ctx.emit_load_gpr(hreg_ra, ra);

    let mut iop = ctx.new_insn_output(1, "addic");
    let s = &mut iop.buf;
    if rd != ra {
        x86::mov_rr(s, hreg_rd, hreg_ra);
    }
    x86::alu_ri(s, AluOp::Add, hreg_rd, tmp as i32);
    x86::setcc_mem(s, Cond::C, CPU_BASE_REG, xer_ca_offset());
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    if update_cr {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_addic(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    addic_common(ctx, insn, false);
}

pub fn emit_addic_dot(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    addic_common(ctx, insn, true);
}

pub fn emit_addis(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rd = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let tmp = bits(insn, 0, 15) << 16;

    ctx.start_hreg_seq("addis");
    let hreg_rd = ctx.alloc_hreg(rd as i32);

    if ra != 0 {
        let hreg_ra = ctx.alloc_hreg(ra as i32);
        ctx.emit_load_gpr(hreg_ra, ra);

        let mut iop = ctx.new_insn_output(1, "addis");
        let s = &mut iop.buf;
        if rd != ra {
            x86::mov_rr(s, hreg_rd, hreg_ra);
        }
        x86::alu_ri(s, AluOp::Add, hreg_rd, tmp as i32);
        ctx.push_insn_output(iop);
    } else {
        ctx.emit_set_host_reg_imm32(hreg_rd, tmp);
    }

    ctx.emit_store_gpr(rd, hreg_rd);
    ctx.close_hreg_seq();
}

pub fn emit_addze(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rd = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);

    ctx.start_hreg_seq("addze");
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_t0 = ctx.tmp_hreg();

    ctx.emit_load_gpr(hreg_ra, ra);

    let mut iop = ctx.new_insn_output(2, "addze");
    let s = &mut iop.buf;
    x86::alu_rr(s, AluOp::Xor, hreg_t0, hreg_t0);
    if rd != ra {
        x86::mov_rr(s, hreg_rd, hreg_ra);
    }
    x86::alu_r_mem(s, AluOp::Add, hreg_rd, CPU_BASE_REG, xer_ca_offset());
    x86::setcc(s, Cond::C, hreg_t0);
    x86::store32(s, hreg_t0, CPU_BASE_REG, xer_ca_offset());
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

/// Shared body of AND/OR/XOR/NAND/NOR/EQV: `ra = rs op rb`, with an
/// optional complement of the result.
fn logic_common(
    ctx: &mut JitContext,
    insn: u32,
    name: &'static str,
    op: AluOp,
    complement: bool,
    size_index: usize,
) {
    let (rs, ra, rb) = xform(insn);

    ctx.start_hreg_seq(name);
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rb = ctx.alloc_hreg(rb as i32);

    ctx.emit_load_gpr(hreg_rs, rs);
    ctx.emit_load_gpr(hreg_rb, rb);

    let mut iop = ctx.new_insn_output(size_index, name);
    let s = &mut iop.buf;
    alu_body(s, op, hreg_ra, hreg_rs, hreg_rb, ra, rs, rb);
    if complement {
        x86::not_r(s, hreg_ra);
        if rc(insn) {
            x86::test_rr(s, hreg_ra, hreg_ra);
        }
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(ra, hreg_ra);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_and(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    logic_common(ctx, insn, "and", AluOp::And, false, 1);
}

/// Shared body of ANDC/ORC: `ra = rs op ~rb` through the temp.
fn logic_compl_common(ctx: &mut JitContext, insn: u32, name: &'static str, op: AluOp) {
    let (rs, ra, rb) = xform(insn);

    ctx.start_hreg_seq(name);
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rb = ctx.alloc_hreg(rb as i32);

    ctx.emit_load_gpr(hreg_rs, rs);
    ctx.emit_load_gpr(hreg_rb, rb);

    let mut iop = ctx.new_insn_output(1, name);
    let s = &mut iop.buf;
    let hreg_t0 = ctx.tmp_hreg();
    x86::mov_rr(s, hreg_t0, hreg_rb);
    x86::not_r(s, hreg_t0);

    if ra == rs {
        x86::alu_rr(s, op, hreg_ra, hreg_t0);
    } else {
        x86::alu_rr(s, op, hreg_t0, hreg_rs);
        x86::mov_rr(s, hreg_ra, hreg_t0);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(ra, hreg_ra);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_andc(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    logic_compl_common(ctx, insn, "andc", AluOp::And);
}

/// Shared body of the logical immediates. `always_rc` models ANDI./
/// ANDIS., which update CR0 unconditionally.
fn logic_imm_common(
    ctx: &mut JitContext,
    insn: u32,
    name: &'static str,
    op: AluOp,
    imm: u32,
    always_rc: bool,
) {
    let rs = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);

    ctx.start_hreg_seq(name);
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);

    ctx.emit_load_gpr(hreg_rs, rs);

    let mut iop = ctx.new_insn_output(if always_rc { 2 } else { 1 }, name);
    let s = &mut iop.buf;
    if ra != rs {
        x86::mov_rr(s, hreg_ra, hreg_rs);
    }
    x86::alu_ri(s, op, hreg_ra, imm as i32);
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(ra, hreg_ra);
    if always_rc {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_andi(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let imm = bits(insn, 0, 15);
    logic_imm_common(ctx, insn, "andi", AluOp::And, imm, true);
}

pub fn emit_andis(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let imm = bits(insn, 0, 15) << 16;
    logic_imm_common(ctx, insn, "andis", AluOp::And, imm, true);
}

fn cmp_common(ctx: &mut JitContext, insn: u32, name: &'static str, signed: bool) {
    let field = bits(insn, 23, 25);
    let ra = bits(insn, 16, 20);
    let rb = bits(insn, 11, 15);

    ctx.start_hreg_seq(name);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rb = ctx.alloc_hreg(rb as i32);

    ctx.emit_load_gpr(hreg_ra, ra);
    ctx.emit_load_gpr(hreg_rb, rb);

    let mut iop = ctx.new_insn_output(1, name);
    x86::alu_rr(&mut iop.buf, AluOp::Cmp, hreg_ra, hreg_rb);
    ctx.push_insn_output(iop);

    ctx.emit_update_flags(field, signed);
    ctx.close_hreg_seq();
}

fn cmpi_common(ctx: &mut JitContext, insn: u32, name: &'static str, signed: bool, imm: u32) {
    let field = bits(insn, 23, 25);
    let ra = bits(insn, 16, 20);

    ctx.start_hreg_seq(name);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    ctx.emit_load_gpr(hreg_ra, ra);

    let mut iop = ctx.new_insn_output(1, name);
    x86::alu_ri(&mut iop.buf, AluOp::Cmp, hreg_ra, imm as i32);
    ctx.push_insn_output(iop);

    ctx.emit_update_flags(field, signed);
    ctx.close_hreg_seq();
}

pub fn emit_cmp(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cmp_common(ctx, insn, "cmp", true);
}

pub fn emit_cmpi(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let imm = sign_extend(bits(insn, 0, 15), 16);
    cmpi_common(ctx, insn, "cmpi", true, imm);
}

pub fn emit_cmpl(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    cmp_common(ctx, insn, "cmpl", false);
}

pub fn emit_cmpli(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let imm = bits(insn, 0, 15);
    cmpi_common(ctx, insn, "cmpli", false, imm);
}

pub fn emit_divwu(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let (rd, ra, rb) = xform(insn);

    ctx.start_hreg_seq("divwu");
    ctx.alloc_hreg_forced(RAX);
    ctx.alloc_hreg_forced(RDX);
    let hreg_rb = ctx.alloc_hreg(rb as i32);

    ctx.emit_load_gpr(RAX, ra);
    ctx.emit_load_gpr(hreg_rb, rb);

    let mut iop = ctx.new_insn_output(2, "divwu");
    let s = &mut iop.buf;
    load_imm(s, RDX, 0);
    x86::div_r(s, hreg_rb);
    if rc(insn) {
        x86::test_rr(s, RAX, RAX);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, RAX);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }

    // A:D are written directly by the divide.
    ctx.emit_alter_host_reg(RAX);
    ctx.emit_alter_host_reg(RDX);
    ctx.close_hreg_seq();
}

pub fn emit_eqv(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    logic_common(ctx, insn, "eqv", AluOp::Xor, true, 1);
}

fn exts_common(ctx: &mut JitContext, insn: u32, name: &'static str, shift: u8) {
    let rs = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);

    ctx.start_hreg_seq(name);
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);

    ctx.emit_load_gpr(hreg_rs, rs);

    let mut iop = ctx.new_insn_output(2, name);
    let s = &mut iop.buf;
    if rs != ra {
        x86::mov_rr(s, hreg_ra, hreg_rs);
    }
    x86::shift_ri(s, ShiftOp::Shl, hreg_ra, shift);
    x86::shift_ri(s, ShiftOp::Sar, hreg_ra, shift);
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

pub fn emit_extsb(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    exts_common(ctx, insn, "extsb", 24);
}

pub fn emit_extsh(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    exts_common(ctx, insn, "extsh", 16);
}

/// Shared body of the widening multiplies: result register picks the
/// half, `signed` picks MUL vs IMUL.
fn mul_common(ctx: &mut JitContext, insn: u32, name: &'static str, signed: bool, high: bool) {
    let (rd, ra, rb) = xform(insn);

    ctx.start_hreg_seq(name);
    ctx.alloc_hreg_forced(RAX);
    ctx.alloc_hreg_forced(RDX);
    let hreg_rb = ctx.alloc_hreg(rb as i32);

    ctx.emit_load_gpr(RAX, ra);
    ctx.emit_load_gpr(hreg_rb, rb);

    let result = if high { RDX } else { RAX };

    let mut iop = ctx.new_insn_output(2, name);
    let s = &mut iop.buf;
    if signed {
        x86::imul_r(s, hreg_rb);
    } else {
        x86::mul_r(s, hreg_rb);
    }
    if rc(insn) {
        x86::test_rr(s, result, result);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, result);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }

    ctx.emit_alter_host_reg(RAX);
    ctx.emit_alter_host_reg(RDX);
    ctx.close_hreg_seq();
}

pub fn emit_mulhw(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    mul_common(ctx, insn, "mulhw", true, true);
}

pub fn emit_mulhwu(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    mul_common(ctx, insn, "mulhwu", false, true);
}

pub fn emit_mullw(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    mul_common(ctx, insn, "mullw", true, false);
}

pub fn emit_mulli(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rd = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let imm = bits(insn, 0, 15);

    ctx.start_hreg_seq("mulli");
    ctx.alloc_hreg_forced(RAX);
    ctx.alloc_hreg_forced(RDX);
    let hreg_t0 = ctx.tmp_hreg();

    ctx.emit_load_gpr(RAX, ra);

    let mut iop = ctx.new_insn_output(2, "mulli");
    let s = &mut iop.buf;
    load_imm(s, hreg_t0, sign_extend(imm, 16));
    x86::imul_r(s, hreg_t0);
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, RAX);
    ctx.emit_alter_host_reg(RAX);
    ctx.emit_alter_host_reg(RDX);
    ctx.close_hreg_seq();
}

pub fn emit_nand(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    logic_common(ctx, insn, "nand", AluOp::And, true, 2);
}

pub fn emit_neg(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rd = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);

    ctx.start_hreg_seq("neg");
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rd = ctx.alloc_hreg(rd as i32);

    ctx.emit_load_gpr(hreg_ra, ra);

    let mut iop = ctx.new_insn_output(1, "neg");
    let s = &mut iop.buf;
    if rd != ra {
        x86::mov_rr(s, hreg_rd, hreg_ra);
    }
    x86::neg_r(s, hreg_rd);
    if rc(insn) {
        x86::test_rr(s, hreg_rd, hreg_rd);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_nor(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    logic_common(ctx, insn, "nor", AluOp::Or, true, 2);
}

pub fn emit_or(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let (rs, ra, rb) = xform(insn);

    ctx.start_hreg_seq("or");
    let hreg_rs = ctx.alloc_hreg(rs as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rb = ctx.alloc_hreg(rb as i32);

    // rs == rb is the canonical register move (mr).
    if rs == rb {
        ctx.emit_load_gpr(hreg_rs, rs);

        let mut iop = ctx.new_insn_output(2, "or");
        let s = &mut iop.buf;
        if ra != rs {
            x86::mov_rr(s, hreg_ra, hreg_rs);
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
        return;
    }

    ctx.emit_load_gpr(hreg_rs, rs);
    ctx.emit_load_gpr(hreg_rb, rb);

    let mut iop = ctx.new_insn_output(2, "or");
    alu_body(&mut iop.buf, AluOp::Or, hreg_ra, hreg_rs, hreg_rb, ra, rs, rb);
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(ra, hreg_ra);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_orc(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    logic_compl_common(ctx, insn, "orc", AluOp::Or);
}

pub fn emit_ori(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let imm = bits(insn, 0, 15);
    logic_imm_common(ctx, insn, "ori", AluOp::Or, imm, false);
}

pub fn emit_oris(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let imm = bits(insn, 0, 15) << 16;
    logic_imm_common(ctx, insn, "oris", AluOp::Or, imm, false);
}

pub fn emit_subf(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let (rd, ra, rb) = xform(insn);

    ctx.start_hreg_seq("subf");
    let hreg_t0 = ctx.tmp_hreg();
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rb = ctx.alloc_hreg(rb as i32);

    ctx.emit_load_gpr(hreg_ra, ra);
    ctx.emit_load_gpr(hreg_rb, rb);

    // rd = rb - ra
    let mut iop = ctx.new_insn_output(2, "subf");
    let s = &mut iop.buf;
    if rd == rb {
        x86::alu_rr(s, AluOp::Sub, hreg_rd, hreg_ra);
    } else if rd == ra {
        x86::mov_rr(s, hreg_t0, hreg_rb);
        x86::alu_rr(s, AluOp::Sub, hreg_t0, hreg_ra);
        x86::mov_rr(s, hreg_rd, hreg_t0);
    } else {
        x86::mov_rr(s, hreg_rd, hreg_rb);
        x86::alu_rr(s, AluOp::Sub, hreg_rd, hreg_ra);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

/// SUBFC/SUBFE share the `~ra + x + rb` expansion; `carry_in` selects
/// between the constant 1 and XER-CA.
fn subf_carry_common(ctx: &mut JitContext, insn: u32, name: &'static str, carry_in: bool) {
    let (rd, ra, rb) = xform(insn);

    ctx.start_hreg_seq(name);
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rb = ctx.alloc_hreg(rb as i32);
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_t0 = ctx.alloc_hreg(-1);
    let hreg_t1 = ctx.tmp_hreg();

    ctx.emit_alter_host_reg(hreg_t0);
    ctx.emit_load_gpr(hreg_ra, ra);
    ctx.emit_load_gpr(hreg_rb, rb);

    let mut iop = ctx.new_insn_output(3, name);
    let s = &mut iop.buf;

    x86::alu_rr(s, AluOp::Xor, hreg_t1, hreg_t1);

    // t0 = ~ra + carry, first partial carry out
    x86::mov_rr(s, hreg_t0, hreg_ra);
    x86::not_r(s, hreg_t0);
    if carry_in {
        x86::alu_r_mem(s, AluOp::Add, hreg_t0, CPU_BASE_REG, xer_ca_offset());
    } else {
        x86::alu_ri(s, AluOp::Add, hreg_t0, 1);
    }
    x86::setcc(s, Cond::C, hreg_t1);
    x86::store32(s, hreg_t1, CPU_BASE_REG, xer_ca_offset());

    // t0 += rb, second partial carry OR-ed in
    x86::alu_rr(s, AluOp::Add, hreg_t0, hreg_rb);
    x86::setcc(s, Cond::C, hreg_t1);
    x86::alu_mem_r(s, AluOp::Or, CPU_BASE_REG, xer_ca_offset(), hreg_t1);

    x86::mov_rr(s, hreg_rd, hreg_t0);
    if rc(insn) {
        x86::test_rr(s, hreg_rd, hreg_rd);
    }
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    if rc(insn) {
        ctx.emit_update_flags(0, true);
    }
    ctx.close_hreg_seq();
}

pub fn emit_subfc(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    subf_carry_common(ctx, insn, "subfc", false);
}

pub fn emit_subfe(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    subf_carry_common(ctx, insn, "subfe", true);
}

pub fn emit_subfic(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let rd = bits(insn, 21, 25);
    let ra = bits(insn, 16, 20);
    let tmp = sign_extend(bits(insn, 0, 15), 16);

    ctx.start_hreg_seq("subfic");
    let hreg_ra = ctx.alloc_hreg(ra as i32);
    let hreg_rd = ctx.alloc_hreg(rd as i32);
    let hreg_t0 = ctx.alloc_hreg(-1);
    let hreg_t1 = ctx.tmp_hreg();

    ctx.emit_alter_host_reg(hreg_t0);
    ctx.emit_load_gpr(hreg_ra, ra);

    // rd = ~ra + 1 + sign_extend(imm)
    let mut iop = ctx.new_insn_output(3, "subfic");
    let s = &mut iop.buf;

    x86::alu_rr(s, AluOp::Xor, hreg_t1, hreg_t1);

    x86::mov_rr(s, hreg_t0, hreg_ra);
    x86::not_r(s, hreg_t0);
    x86::alu_ri(s, AluOp::Add, hreg_t0, 1);
    x86::setcc(s, Cond::C, hreg_t1);
    x86::store32(s, hreg_t1, CPU_BASE_REG, xer_ca_offset());

    x86::alu_ri(s, AluOp::Add, hreg_t0, tmp as i32);
    x86::setcc(s, Cond::C, hreg_t1);
    x86::alu_mem_r(s, AluOp::Or, CPU_BASE_REG, xer_ca_offset(), hreg_t1);

    x86::mov_rr(s, hreg_rd, hreg_t0);
    ctx.push_insn_output(iop);

    ctx.emit_store_gpr(rd, hreg_rd);
    ctx.close_hreg_seq();
}

pub fn emit_xor(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    logic_common(ctx, insn, "xor", AluOp::Xor, false, 1);
}

pub fn emit_xori(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let imm = bits(insn, 0, 15);
    logic_imm_common(ctx, insn, "xori", AluOp::Xor, imm, false);
}

pub fn emit_xoris(ctx: &mut JitContext, _b: &mut JitBlock, insn: u32) {
    let imm = bits(insn, 0, 15) << 16;
    logic_imm_common(ctx, insn, "xoris", AluOp::Xor, imm, false);
}
