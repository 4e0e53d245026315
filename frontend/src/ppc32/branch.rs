//! Branch family: unconditional, conditional, and the
//! link/count-register indirect forms.

use ppcjit_backend::x86_64::{self as x86, AluOp, Cond, CPU_BASE_REG};
use ppcjit_core::cpu::{ctr_offset, cr_field_offset, ia_offset, lr_offset};
use ppcjit_core::insn::{bits, cr_bit, cr_field, sign_extend};
use ppcjit_core::op::OpPatch;
use ppcjit_core::{JitBlock, JitContext};

use super::{cur_ia, exit_ok, next_ia, set_jump, set_lr};

pub fn emit_blr(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    ctx.start_hreg_seq("blr");
    let hreg = ctx.alloc_hreg(-1);
    ctx.emit_alter_host_reg(hreg);

    let mut iop = ctx.new_insn_output(2, "blr");
    let s = &mut iop.buf;
    x86::load32(s, hreg, CPU_BASE_REG, lr_offset());
    x86::store32(s, hreg, CPU_BASE_REG, ia_offset());

    if insn & 1 != 0 {
        set_lr(s, next_ia(b));
    }
    exit_ok(s);
    ctx.push_insn_output(iop);

    ctx.emit_eob();
    ctx.emit_branch_target(b, next_ia(b));
    ctx.close_hreg_seq();
}

pub fn emit_bctr(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    ctx.start_hreg_seq("bctr");
    let hreg = ctx.alloc_hreg(-1);
    ctx.emit_alter_host_reg(hreg);

    let mut iop = ctx.new_insn_output(2, "bctr");
    let s = &mut iop.buf;
    x86::load32(s, hreg, CPU_BASE_REG, ctr_offset());
    x86::store32(s, hreg, CPU_BASE_REG, ia_offset());

    if insn & 1 != 0 {
        set_lr(s, next_ia(b));
    }
    exit_ok(s);
    ctx.push_insn_output(iop);

    ctx.emit_eob();
    ctx.emit_branch_target(b, next_ia(b));
    ctx.close_hreg_seq();
}

/// Destination of an I-form branch; `absolute` is the AA bit.
fn bform_target(b: &JitBlock, insn: u32, absolute: bool) -> u32 {
    let offset = sign_extend(bits(insn, 2, 25) << 2, 26);
    if absolute {
        offset
    } else {
        cur_ia(b).wrapping_add(offset)
    }
}

fn b_common(ctx: &mut JitContext, b: &mut JitBlock, insn: u32, name: &'static str, absolute: bool, link: bool) {
    let new_ia = bform_target(b, insn, absolute);

    let mut iop = ctx.new_insn_output(4, name);
    if link {
        set_lr(&mut iop.buf, next_ia(b));
    }
    set_jump(ctx, b, &mut iop, new_ia);
    ctx.push_insn_output(iop);

    ctx.emit_eob();
    ctx.emit_branch_target(b, new_ia);
    ctx.emit_branch_target(b, next_ia(b));
}

pub fn emit_b(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    b_common(ctx, b, insn, "b", false, false);
}

pub fn emit_ba(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    b_common(ctx, b, insn, "ba", true, false);
}

pub fn emit_bl(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    b_common(ctx, b, insn, "bl", false, true);
}

pub fn emit_bla(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    b_common(ctx, b, insn, "bla", true, true);
}

/// Destination of a B-form branch.
fn bcform_target(b: &JitBlock, insn: u32) -> u32 {
    let bd = bits(insn, 2, 15);
    let mut new_ia = sign_extend(bd << 2, 16);
    if insn & 0x02 == 0 {
        new_ia = new_ia.wrapping_add(cur_ia(b));
    }
    new_ia
}

/// BC with BO requesting only the condition test (no CTR decrement).
pub fn emit_bcc(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let bo = bits(insn, 21, 25);
    let bi = bits(insn, 16, 20);

    ctx.emit_branch_jump();

    let mut iop = ctx.new_insn_output(5, "bcc");

    // Wanted value of the condition bit.
    let cond = (bo >> 3) & 0x1 != 0;

    if insn & 1 != 0 {
        set_lr(&mut iop.buf, next_ia(b));
        ctx.emit_branch_target(b, next_ia(b));
    }

    let new_ia = bcform_target(b, insn);

    let field = cr_field(bi);
    let bit = cr_bit(bi);
    ctx.emit_require_flags(field as i32);

    x86::test_mem_imm(&mut iop.buf, CPU_BASE_REG, cr_field_offset(field), 1 << bit);

    if b.is_local_addr(new_ia) {
        let at = x86::jcc32(&mut iop.buf, if cond { Cond::Nz } else { Cond::Z });
        iop.patches.push(OpPatch {
            buf_off: at,
            target_ia: new_ia,
        });
    } else {
        let skip = x86::jcc32(&mut iop.buf, if cond { Cond::Z } else { Cond::Nz });
        set_jump(ctx, b, &mut iop, new_ia);
        x86::patch_rel32(&mut iop.buf, skip);
    }
    ctx.push_insn_output(iop);

    ctx.emit_branch_target(b, new_ia);
}

/// Full BC: AND-combines the optional CTR-decrement test with the
/// optional CR-bit test.
pub fn emit_bc(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let bo = bits(insn, 21, 25);
    let bi = bits(insn, 16, 20);

    ctx.emit_branch_jump();

    ctx.start_hreg_seq("bc");
    let hreg_t0 = ctx.alloc_hreg(-1);
    let hreg_t1 = ctx.tmp_hreg();
    ctx.emit_alter_host_reg(hreg_t0);

    let mut iop = ctx.new_insn_output(5, "bc");

    let cond = (bo >> 3) & 0x1 != 0;
    let ctr = (bo >> 1) & 0x1 != 0;

    if insn & 1 != 0 {
        set_lr(&mut iop.buf, next_ia(b));
        ctx.emit_branch_target(b, next_ia(b));
    }

    let new_ia = bcform_target(b, insn);

    x86::mov_ri(&mut iop.buf, hreg_t0, 1);

    if bo & 0x04 == 0 {
        x86::dec_mem32(&mut iop.buf, CPU_BASE_REG, ctr_offset());
        x86::setcc(&mut iop.buf, if ctr { Cond::Z } else { Cond::Nz }, hreg_t1);
        x86::alu_rr(&mut iop.buf, AluOp::And, hreg_t0, hreg_t1);
    }

    if bo & 0x10 == 0 {
        let field = cr_field(bi);
        let bit = cr_bit(bi);
        ctx.emit_require_flags(field as i32);

        x86::test_mem_imm(&mut iop.buf, CPU_BASE_REG, cr_field_offset(field), 1 << bit);
        x86::setcc(&mut iop.buf, if cond { Cond::Nz } else { Cond::Z }, hreg_t1);
        x86::alu_rr(&mut iop.buf, AluOp::And, hreg_t0, hreg_t1);
    }

    x86::alu_ri(&mut iop.buf, AluOp::And, hreg_t0, 0x01);

    if b.is_local_addr(new_ia) {
        let at = x86::jcc32(&mut iop.buf, Cond::Nz);
        iop.patches.push(OpPatch {
            buf_off: at,
            target_ia: new_ia,
        });
    } else {
        let skip = x86::jcc32(&mut iop.buf, Cond::Z);
        set_jump(ctx, b, &mut iop, new_ia);
        x86::patch_rel32(&mut iop.buf, skip);
    }
    ctx.push_insn_output(iop);

    ctx.emit_branch_target(b, new_ia);
    ctx.close_hreg_seq();
}

pub fn emit_bclr(ctx: &mut JitContext, b: &mut JitBlock, insn: u32) {
    let bo = bits(insn, 21, 25);
    let bi = bits(insn, 16, 20);

    ctx.start_hreg_seq("bclr");
    let hreg_t0 = ctx.alloc_hreg(-1);
    let hreg_t1 = ctx.tmp_hreg();
    ctx.emit_alter_host_reg(hreg_t0);

    let mut iop = ctx.new_insn_output(5, "bclr");

    let cond = (bo >> 3) & 0x1 != 0;
    let ctr = (bo >> 1) & 0x1 != 0;

    x86::mov_ri(&mut iop.buf, hreg_t0, 1);

    if bo & 0x04 == 0 {
        x86::dec_mem32(&mut iop.buf, CPU_BASE_REG, ctr_offset());
        x86::setcc(&mut iop.buf, if ctr { Cond::Z } else { Cond::Nz }, hreg_t1);
        x86::alu_rr(&mut iop.buf, AluOp::And, hreg_t0, hreg_t1);
    }

    if bo & 0x10 == 0 {
        let field = cr_field(bi);
        let bit = cr_bit(bi);
        ctx.emit_require_flags(field as i32);

        x86::test_mem_imm(&mut iop.buf, CPU_BASE_REG, cr_field_offset(field), 1 << bit);
        x86::setcc(&mut iop.buf, if cond { Cond::Nz } else { Cond::Z }, hreg_t1);
        x86::alu_rr(&mut iop.buf, AluOp::And, hreg_t0, hreg_t1);
    }

    // Stash LR before a link update overwrites it.
    x86::load32(&mut iop.buf, hreg_t1, CPU_BASE_REG, lr_offset());

    if insn & 1 != 0 {
        set_lr(&mut iop.buf, next_ia(b));
        ctx.emit_branch_target(b, next_ia(b));
    }

    x86::alu_ri(&mut iop.buf, AluOp::And, hreg_t0, 0x01);

    let skip = x86::jcc32(&mut iop.buf, Cond::Z);
    x86::alu_ri(&mut iop.buf, AluOp::And, hreg_t1, 0xFFFF_FFFCu32 as i32);
    x86::store32(&mut iop.buf, hreg_t1, CPU_BASE_REG, ia_offset());
    exit_ok(&mut iop.buf);
    x86::patch_rel32(&mut iop.buf, skip);
    ctx.push_insn_output(iop);

    ctx.emit_eob();
    ctx.close_hreg_seq();
}
