//! PPC32 instruction emitters and decode dispatch.
//!
//! Each emitter appends the IR records implementing one guest
//! instruction: register loads/stores as discrete records, the
//! instruction body as a pre-assembled host code buffer, and flag
//! bookkeeping for the CR capture machinery.

mod alu;
mod branch;
mod cr;
mod mem;
mod shift;
mod system;

pub use system::{emit_breakpoint, emit_perf_count, emit_unknown};

use ppcjit_backend::lower::load_host_imm;
use ppcjit_backend::x86_64::{self as x86, AluOp, CPU_BASE_REG, RAX};
use ppcjit_backend::CodeSink;
use ppcjit_core::block::{
    blk_insn_ptr_offset, blk_start_ia_offset, blk_target_bitmap_offset, target_bitmap_pos,
};
use ppcjit_core::cpu::{self, PPC32_MIN_PAGE_IMASK, PPC32_MIN_PAGE_MASK};
use ppcjit_core::hash;
use ppcjit_core::op::{Op, OpPatch};
use ppcjit_core::{JitBlock, JitContext};

pub type EmitFn = fn(&mut JitContext, &mut JitBlock, u32);

/// One row of the decode table: first `(insn & mask) == value` wins.
pub struct InsnTag {
    pub mask: u32,
    pub value: u32,
    pub emit: EmitFn,
}

const fn tag(mask: u32, value: u32, emit: EmitFn) -> InsnTag {
    InsnTag { mask, value, emit }
}

/// Ordered decode table. More specific masks come first; the final
/// wildcard row routes to the interpreter-fallback emitter.
pub static DECODE_TABLE: &[InsnTag] = &[
    tag(0xfffffffe, 0x4e800020, branch::emit_blr),
    tag(0xfffffffe, 0x4e800420, branch::emit_bctr),
    tag(0xfc1fffff, 0x7c0802a6, system::emit_mflr),
    tag(0xfc1fffff, 0x7c0803a6, system::emit_mtlr),
    tag(0xfc1fffff, 0x7c0902a6, system::emit_mfctr),
    tag(0xfc1fffff, 0x7c0903a6, system::emit_mtctr),
    tag(0xfc1ff7ff, 0x7c0c42e6, system::emit_mftbl),
    tag(0xfc1ff7ff, 0x7c0d42e6, system::emit_mftbu),
    tag(0xfc0007fe, 0x7c000214, alu::emit_add),
    tag(0xfc0007fe, 0x7c000014, alu::emit_addc),
    tag(0xfc0007fe, 0x7c000114, alu::emit_adde),
    tag(0xfc000000, 0x38000000, alu::emit_addi),
    tag(0xfc000000, 0x30000000, alu::emit_addic),
    tag(0xfc000000, 0x34000000, alu::emit_addic_dot),
    tag(0xfc000000, 0x3c000000, alu::emit_addis),
    tag(0xfc00fffe, 0x7c000194, alu::emit_addze),
    tag(0xfc0007fe, 0x7c000038, alu::emit_and),
    tag(0xfc0007fe, 0x7c000078, alu::emit_andc),
    tag(0xfc000000, 0x70000000, alu::emit_andi),
    tag(0xfc000000, 0x74000000, alu::emit_andis),
    tag(0xfc000003, 0x48000000, branch::emit_b),
    tag(0xfc000003, 0x48000002, branch::emit_ba),
    tag(0xfc000003, 0x48000001, branch::emit_bl),
    tag(0xfc000003, 0x48000003, branch::emit_bla),
    tag(0xfe800000, 0x40800000, branch::emit_bcc),
    tag(0xfc000000, 0x40000000, branch::emit_bc),
    tag(0xfc00fffe, 0x4c000020, branch::emit_bclr),
    tag(0xfc6007ff, 0x7c000000, alu::emit_cmp),
    tag(0xfc600000, 0x2c000000, alu::emit_cmpi),
    tag(0xfc6007ff, 0x7c000040, alu::emit_cmpl),
    tag(0xfc600000, 0x28000000, alu::emit_cmpli),
    tag(0xfc0007ff, 0x4c000202, cr::emit_crand),
    tag(0xfc0007ff, 0x4c000102, cr::emit_crandc),
    tag(0xfc0007ff, 0x4c000242, cr::emit_creqv),
    tag(0xfc0007ff, 0x4c0001c2, cr::emit_crnand),
    tag(0xfc0007ff, 0x4c000042, cr::emit_crnor),
    tag(0xfc0007ff, 0x4c000382, cr::emit_cror),
    tag(0xfc0007ff, 0x4c000342, cr::emit_crorc),
    tag(0xfc0007ff, 0x4c000182, cr::emit_crxor),
    tag(0xfc0007fe, 0x7c000396, alu::emit_divwu),
    tag(0xfc0007fe, 0x7c000238, alu::emit_eqv),
    tag(0xfc00fffe, 0x7c000774, alu::emit_extsb),
    tag(0xfc00fffe, 0x7c000734, alu::emit_extsh),
    tag(0xfc000000, 0x88000000, mem::emit_lbz),
    tag(0xfc000000, 0x8c000000, mem::emit_lbzu),
    tag(0xfc0007ff, 0x7c0000ee, mem::emit_lbzux),
    tag(0xfc0007ff, 0x7c0000ae, mem::emit_lbzx),
    tag(0xfc000000, 0xa8000000, mem::emit_lha),
    tag(0xfc000000, 0xac000000, mem::emit_lhau),
    tag(0xfc0007ff, 0x7c0002ee, mem::emit_lhaux),
    tag(0xfc0007ff, 0x7c0002ae, mem::emit_lhax),
    tag(0xfc000000, 0xa0000000, mem::emit_lhz),
    tag(0xfc000000, 0xa4000000, mem::emit_lhzu),
    tag(0xfc0007ff, 0x7c00026e, mem::emit_lhzux),
    tag(0xfc0007ff, 0x7c00022e, mem::emit_lhzx),
    tag(0xfc000000, 0x80000000, mem::emit_lwz),
    tag(0xfc000000, 0x84000000, mem::emit_lwzu),
    tag(0xfc0007ff, 0x7c00006e, mem::emit_lwzux),
    tag(0xfc0007ff, 0x7c00002e, mem::emit_lwzx),
    tag(0xfc63ffff, 0x4c000000, cr::emit_mcrf),
    tag(0xfc1fffff, 0x7c000026, cr::emit_mfcr),
    tag(0xfc1fffff, 0x7c0000a6, system::emit_mfmsr),
    tag(0xfc10ffff, 0x7c0004a6, system::emit_mfsr),
    tag(0xfc100fff, 0x7c000120, cr::emit_mtcrf),
    tag(0xfc0007fe, 0x7c000096, alu::emit_mulhw),
    tag(0xfc0007fe, 0x7c000016, alu::emit_mulhwu),
    tag(0xfc000000, 0x1c000000, alu::emit_mulli),
    tag(0xfc0007fe, 0x7c0001d6, alu::emit_mullw),
    tag(0xfc0007fe, 0x7c0003b8, alu::emit_nand),
    tag(0xfc00fffe, 0x7c0000d0, alu::emit_neg),
    tag(0xfc0007fe, 0x7c0000f8, alu::emit_nor),
    tag(0xfc0007fe, 0x7c000378, alu::emit_or),
    tag(0xfc0007fe, 0x7c000338, alu::emit_orc),
    tag(0xfc000000, 0x60000000, alu::emit_ori),
    tag(0xfc000000, 0x64000000, alu::emit_oris),
    tag(0xfc000000, 0x50000000, shift::emit_rlwimi),
    tag(0xfc000000, 0x54000000, shift::emit_rlwinm),
    tag(0xfc000000, 0x5c000000, shift::emit_rlwnm),
    tag(0xfc0007fe, 0x7c000030, shift::emit_slw),
    tag(0xfc0007fe, 0x7c000670, shift::emit_srawi),
    tag(0xfc0007fe, 0x7c000430, shift::emit_srw),
    tag(0xfc000000, 0x98000000, mem::emit_stb),
    tag(0xfc000000, 0x9c000000, mem::emit_stbu),
    tag(0xfc0007ff, 0x7c0001ee, mem::emit_stbux),
    tag(0xfc0007ff, 0x7c0001ae, mem::emit_stbx),
    tag(0xfc000000, 0xb0000000, mem::emit_sth),
    tag(0xfc000000, 0xb4000000, mem::emit_sthu),
    tag(0xfc0007ff, 0x7c00036e, mem::emit_sthux),
    tag(0xfc0007ff, 0x7c00032e, mem::emit_sthx),
    tag(0xfc000000, 0x90000000, mem::emit_stw),
    tag(0xfc000000, 0x94000000, mem::emit_stwu),
    tag(0xfc0007ff, 0x7c00016e, mem::emit_stwux),
    tag(0xfc0007ff, 0x7c00012e, mem::emit_stwx),
    tag(0xfc0007fe, 0x7c000050, alu::emit_subf),
    tag(0xfc0007fe, 0x7c000010, alu::emit_subfc),
    tag(0xfc0007fe, 0x7c000110, alu::emit_subfe),
    tag(0xfc000000, 0x20000000, alu::emit_subfic),
    tag(0xffffffff, 0x7c0004ac, system::emit_sync),
    tag(0xfc0007fe, 0x7c000278, alu::emit_xor),
    tag(0xfc000000, 0x68000000, alu::emit_xori),
    tag(0xfc000000, 0x6c000000, alu::emit_xoris),
    tag(0x00000000, 0x00000000, system::emit_unknown),
];

/// Find the emitter for an instruction word.
pub fn decode(insn: u32) -> &'static InsnTag {
    DECODE_TABLE
        .iter()
        .find(|t| insn & t.mask == t.value)
        .expect("decode table ends with a wildcard row")
}

// -- Shared emission helpers --

pub(crate) fn load_imm(s: &mut impl CodeSink, reg: u8, val: u32) {
    load_host_imm(s, reg, val);
}

/// `cpu.ia = new_ia`.
pub(crate) fn set_ia(s: &mut impl CodeSink, new_ia: u32) {
    x86::store_imm32(s, CPU_BASE_REG, cpu::ia_offset(), new_ia);
}

/// `cpu.lr = new_lr`.
pub(crate) fn set_lr(s: &mut impl CodeSink, new_lr: u32) {
    x86::store_imm32(s, CPU_BASE_REG, cpu::lr_offset(), new_lr);
}

pub(crate) fn load_gpr(s: &mut impl CodeSink, hreg: u8, ppc_reg: u32) {
    x86::load32(s, hreg, CPU_BASE_REG, cpu::gpr_offset(ppc_reg));
}

pub(crate) fn store_gpr(s: &mut impl CodeSink, ppc_reg: u32, hreg: u8) {
    x86::store32(s, hreg, CPU_BASE_REG, cpu::gpr_offset(ppc_reg));
}

/// `op hreg, cpu.gpr[ppc_reg]`.
pub(crate) fn alu_gpr(s: &mut impl CodeSink, op: AluOp, hreg: u8, ppc_reg: u32) {
    x86::alu_r_mem(s, op, hreg, CPU_BASE_REG, cpu::gpr_offset(ppc_reg));
}

/// Leave the block with a zero (normal) status.
pub(crate) fn exit_ok(s: &mut impl CodeSink) {
    x86::alu_rr(s, AluOp::Xor, RAX, RAX);
    x86::ret(s);
}

/// Guest address of the instruction being translated.
pub(crate) fn cur_ia(b: &JitBlock) -> u32 {
    b.ia_of_slot(b.trans_pos)
}

/// Guest address of the following instruction.
pub(crate) fn next_ia(b: &JitBlock) -> u32 {
    b.ia_of_slot(b.trans_pos + 1)
}

/// Emit the jump tail for a (possibly conditional) branch to `new_ia`:
/// an in-page destination becomes a direct jump resolved by the patch
/// pass; everything else goes through the block-lookup trampoline or
/// falls back to the executor.
pub(crate) fn set_jump(ctx: &mut JitContext, b: &mut JitBlock, iop: &mut Op, new_ia: u32) {
    if b.is_local_addr(new_ia) {
        let at = x86::jmp32(&mut iop.buf);
        iop.patches.push(OpPatch {
            buf_off: at,
            target_ia: new_ia,
        });
    } else if ctx.direct_jump {
        try_direct_far_jump(ctx, iop, new_ia);
    } else {
        set_ia(&mut iop.buf, new_ia);
        exit_ok(&mut iop.buf);
    }
}

/// Branch straight into another compiled block without returning to
/// the executor: hash the static destination, probe the virtual-page
/// map, verify `start_ia`, and jump through the slot's host pointer.
/// Any miss writes IA and returns.
pub(crate) fn try_direct_far_jump(ctx: &mut JitContext, iop: &mut Op, new_ia: u32) {
    use ppcjit_backend::x86_64::{Cond, RBX, RDX, RSI};

    // The probe scratches these.
    ctx.emit_alter_host_reg(RSI);
    ctx.emit_alter_host_reg(RDX);

    let new_page = new_ia & PPC32_MIN_PAGE_MASK;
    let ia_slot = ((new_ia & PPC32_MIN_PAGE_IMASK) >> 2) as i32;
    let ia_hash = hash::ia_hash(new_ia) as i32;

    let s = &mut iop.buf;

    // The destination block assumes IA is current at entry.
    set_ia(s, new_ia);

    x86::load64(s, RBX, CPU_BASE_REG, cpu::exec_blk_map_offset());
    x86::load64(s, RDX, RBX, ia_hash * 8);
    x86::test_rr64(s, RDX, RDX);
    let t1 = x86::jcc8(s, Cond::Z);

    x86::mov_ri(s, RSI, new_page);
    x86::alu_r_mem(s, AluOp::Cmp, RSI, RDX, blk_start_ia_offset());
    let t2 = x86::jcc8(s, Cond::Ne);

    // A mid-page entry is only valid where the block observed a
    // branch target; otherwise fall back so the executor can mark
    // the slot and recompile.
    let t_bm = if ia_slot != 0 {
        let (bm_idx, bm_pos) = target_bitmap_pos(new_ia);
        x86::test_mem_imm(
            s,
            RDX,
            blk_target_bitmap_offset() + (bm_idx as i32) * 4,
            1 << bm_pos,
        );
        Some(x86::jcc8(s, Cond::Z))
    } else {
        None
    };

    x86::load64(s, RSI, RDX, blk_insn_ptr_offset());
    x86::load64(s, RBX, RSI, ia_slot * 8);
    x86::test_rr64(s, RBX, RBX);
    let t3 = x86::jcc8(s, Cond::Z);
    x86::jmp_r(s, RBX);

    x86::patch_rel8(s, t1);
    x86::patch_rel8(s, t2);
    if let Some(at) = t_bm {
        x86::patch_rel8(s, at);
    }
    x86::patch_rel8(s, t3);
    exit_ok(s);
}

/// End-of-page epilog: continue into the next guest page.
pub fn page_jump_op(ctx: &mut JitContext, b: &mut JitBlock) -> Op {
    let mut iop = ctx.new_insn_output(4, "set_page_jump");
    let next = b.start_ia.wrapping_add(cpu::PPC32_MIN_PAGE_SIZE);
    set_jump(ctx, b, &mut iop, next);
    iop
}
