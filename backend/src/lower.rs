//! IR lowering: turn the per-slot op lists into host code in the
//! block's chunks.
//!
//! The pass tracks which guest GPR each host register holds so
//! redundant `LoadGpr` records are suppressed, elides dead CR captures,
//! copies pre-assembled instruction buffers to the output cursor, and
//! migrates branch fixups to the block patch table.

use ppcjit_core::block::JitBlock;
use ppcjit_core::cpu::{self, PPC32_INSN_PER_PAGE};
use ppcjit_core::hreg::HREG_NR;
use ppcjit_core::op::{Op, OpKind, OP_INV};
use ppcjit_core::JitContext;
use ppcjit_core::JIT_MAX_CHUNKS;

use crate::cr_tables::{EFLAGS_TO_CR_SIGNED, EFLAGS_TO_CR_UNSIGNED};
use crate::exec_page::{ExecPagePool, RawSink};
use crate::x86_64::{self as x86, AluOp, ShiftOp, CPU_BASE_REG, RAX, RDX};
use crate::{CodeSink, JitError};

/// Tail bytes kept free in every chunk for the chaining jump.
const CHUNK_TAIL_RESERVE: usize = 8;

/// Fixed per-slot emission overhead bound.
const EMIT_SLACK: usize = 96;

/// Host-register residency: which guest GPR each host register holds.
struct RegState {
    gpr: [i32; HREG_NR],
}

impl RegState {
    fn new() -> Self {
        Self {
            gpr: [OP_INV; HREG_NR],
        }
    }

    fn reset(&mut self) {
        self.gpr = [OP_INV; HREG_NR];
    }

    fn holds(&self, hreg: i32, ppc_reg: i32) -> bool {
        self.gpr[hreg as usize] == ppc_reg
    }

    fn set(&mut self, hreg: i32, ppc_reg: i32) {
        self.gpr[hreg as usize] = ppc_reg;
    }

    /// A new value of `ppc_reg` now lives in `hreg`; any other host
    /// register claiming the same guest register holds a stale copy.
    fn set_exclusive(&mut self, hreg: i32, ppc_reg: i32) {
        for slot in &mut self.gpr {
            if *slot == ppc_reg {
                *slot = OP_INV;
            }
        }
        self.gpr[hreg as usize] = ppc_reg;
    }

    fn clear(&mut self, hreg: i32) {
        self.gpr[hreg as usize] = OP_INV;
    }
}

/// Make sure at least `need` bytes can be written at the block cursor,
/// switching to a fresh chunk (and chaining with a direct jump) when
/// the current one runs short.
fn ensure_space(b: &mut JitBlock, pool: &mut ExecPagePool, need: usize) -> Result<(), JitError> {
    if !b.cursor.is_null() && b.chunk_remaining() >= need + CHUNK_TAIL_RESERVE {
        return Ok(());
    }
    if b.chunks.len() >= JIT_MAX_CHUNKS {
        log::warn!(
            "block {:#010x}: chunk limit reached, aborting translation",
            b.start_ia
        );
        return Err(JitError::TooManyChunks);
    }

    let chunk = pool.alloc_chunk()?;
    let old_cursor = b.push_chunk(chunk);
    if !old_cursor.is_null() {
        // Chain the old chunk to the new one. The tail reserve
        // guarantees these five bytes fit.
        let disp = (chunk.base as i64) - (old_cursor as i64 + 5);
        unsafe {
            old_cursor.write(0xE9);
            (old_cursor.add(1) as *mut u32).write_unaligned(disp as u32);
        }
    }
    Ok(())
}

/// Run `f` against a sink positioned at the block cursor.
fn with_sink(b: &mut JitBlock, f: impl FnOnce(&mut RawSink)) {
    // SAFETY: cursor..chunk_limit is unwritten chunk memory owned by
    // the block; ensure_space ran before this.
    let mut sink = unsafe { RawSink::new(b.cursor, b.chunk_remaining()) };
    f(&mut sink);
    b.cursor = sink.cur_ptr();
}

/// Emit the CR capture for `field` from the live host flags.
fn emit_cr_capture(b: &mut JitBlock, field: u32, is_signed: bool) {
    with_sink(b, |s| {
        if is_signed {
            x86::pushfq(s);
            x86::pop_r(s, RAX);
            x86::shift_ri(s, ShiftOp::Shr, RAX, 6);
            x86::alu_ri(s, AluOp::And, RAX, 0x3F);
            x86::mov_ri64(s, RDX, EFLAGS_TO_CR_SIGNED.as_ptr() as u64);
        } else {
            x86::mov_ri(s, RAX, 0);
            x86::lahf(s);
            x86::shift_ri(s, ShiftOp::Shr, RAX, 8);
            x86::mov_ri64(s, RDX, EFLAGS_TO_CR_UNSIGNED.as_ptr() as u64);
        }
        x86::load32_sib(s, RAX, RDX, RAX, 2);
        x86::store32(s, RAX, CPU_BASE_REG, cpu::cr_field_offset(field));
    });
}

/// Whether the CR capture at `ops[idx]` is provably dead: a later
/// capture of the same field supersedes it (or the fields are about to
/// be overwritten wholesale) before any consumer. Control-flow edges
/// keep it live so the architectural CR is current whenever execution
/// can leave the block or merge.
fn update_is_dead(ops: &[Op], idx: usize, lists: &[Vec<Op>], field: i32) -> bool {
    fn decide(op: &Op, field: i32) -> Option<bool> {
        match op.kind {
            OpKind::UpdateFlags if op.param[0] == field => Some(true),
            OpKind::RequireFlags if op.param[0] == field || op.param[0] == OP_INV => Some(false),
            OpKind::TrashFlags => Some(true),
            OpKind::BranchJump | OpKind::EndOfBlock | OpKind::BranchTarget => Some(false),
            _ => None,
        }
    }

    for op in &ops[idx + 1..] {
        if let Some(dead) = decide(op, field) {
            return dead;
        }
    }
    for list in lists {
        for op in list {
            if let Some(dead) = decide(op, field) {
                return dead;
            }
        }
    }
    false
}

/// Copy a pre-assembled instruction buffer to the cursor and migrate
/// its branch fixups to the block patch table.
fn copy_insn_output(b: &mut JitBlock, op: &mut Op) -> Result<(), JitError> {
    if op.overflowed() {
        log::error!(
            "insn output {:?} used {} bytes in a {} byte bucket",
            op.name,
            op.buf.len(),
            ppcjit_core::OP_BUF_SIZES[op.size_index]
        );
        return Err(JitError::OpBufferOverflow {
            name: op.name,
            used: op.buf.len(),
            cap: ppcjit_core::OP_BUF_SIZES[op.size_index],
        });
    }

    let dst = b.cursor;
    unsafe {
        core::ptr::copy_nonoverlapping(op.buf.as_ptr(), dst, op.buf.len());
        b.cursor = dst.add(op.buf.len());
    }
    op.final_host = dst;

    for p in &op.patches {
        b.record_patch(unsafe { dst.add(p.buf_off) }, p.target_ia);
    }
    Ok(())
}

fn lower_slot(
    b: &mut JitBlock,
    ops: &mut [Op],
    later_lists: &[Vec<Op>],
    state: &mut RegState,
) -> Result<(), JitError> {
    for idx in 0..ops.len() {
        let (kind, param) = (ops[idx].kind, ops[idx].param);
        match kind {
            OpKind::InsnOutput => copy_insn_output(b, &mut ops[idx])?,

            OpKind::LoadGpr => {
                if param[0] != OP_INV && !state.holds(param[0], param[1]) {
                    with_sink(b, |s| {
                        x86::load32(s, param[0] as u8, CPU_BASE_REG, cpu::gpr_offset(param[1] as u32));
                    });
                    state.set(param[0], param[1]);
                }
            }

            OpKind::StoreGpr => {
                if param[0] != OP_INV {
                    with_sink(b, |s| {
                        x86::store32(s, param[0] as u8, CPU_BASE_REG, cpu::gpr_offset(param[1] as u32));
                    });
                    state.set_exclusive(param[0], param[1]);
                }
            }

            OpKind::UpdateFlags => {
                if param[0] != OP_INV && !update_is_dead(ops, idx, later_lists, param[0]) {
                    emit_cr_capture(b, param[0] as u32, param[1] != 0);
                }
                state.clear(RAX as i32);
                state.clear(RDX as i32);
            }

            OpKind::AlterHostReg => {
                if param[0] == OP_INV {
                    state.reset();
                } else {
                    state.clear(param[0]);
                }
            }

            OpKind::MoveHostReg => {
                if param[0] != OP_INV && param[1] != OP_INV {
                    with_sink(b, |s| x86::mov_rr(s, param[0] as u8, param[1] as u8));
                    state.clear(param[0]);
                }
            }

            OpKind::SetHostRegImm32 => {
                if param[0] != OP_INV {
                    with_sink(b, |s| load_host_imm(s, param[0] as u8, param[1] as u32));
                    state.clear(param[0]);
                }
            }

            OpKind::BranchTarget => {
                let ia = b.ia_of_slot(b.trans_pos);
                b.set_target_bit(ia);
                state.reset();
            }

            OpKind::EndOfBlock => state.reset(),

            OpKind::BranchJump | OpKind::RequireFlags | OpKind::TrashFlags => {}

            OpKind::Invalid => unreachable!("invalid op reached lowering"),
        }
    }
    Ok(())
}

/// Load a 32-bit immediate, `xor`-clearing for zero. Clobbers flags in
/// the zero case, like the emitters that use it expect.
pub fn load_host_imm(s: &mut impl CodeSink, reg: u8, val: u32) {
    if val != 0 {
        x86::mov_ri(s, reg, val);
    } else {
        x86::alu_rr(s, AluOp::Xor, reg, reg);
    }
}

/// Upper bound of host bytes one op record can produce.
fn op_cost(op: &Op) -> usize {
    match op.kind {
        OpKind::UpdateFlags => 64,
        _ => op.buf.len() + 16,
    }
}

/// Lower every slot of the page in order.
pub fn lower_page(
    ctx: &mut JitContext,
    b: &mut JitBlock,
    pool: &mut ExecPagePool,
) -> Result<(), JitError> {
    let mut state = RegState::new();

    for slot in 0..PPC32_INSN_PER_PAGE {
        let mut ops = core::mem::take(&mut ctx.op_lists[slot]);
        b.trans_pos = slot;

        if b.get_target_bit(b.ia_of_slot(slot)) {
            state.reset();
        }

        let need: usize = EMIT_SLACK + ops.iter().map(op_cost).sum::<usize>();
        let result = ensure_space(b, pool, need).and_then(|()| {
            b.insn_ptrs[slot] = b.cursor;
            lower_slot(b, &mut ops, &ctx.op_lists[slot + 1..], &mut state)
        });

        ctx.pool.put_list(ops);
        result?;
    }
    Ok(())
}

/// Append a standalone instruction-output record at the cursor (used
/// for the end-of-page epilog). The record is consumed.
pub fn append_insn_output(
    ctx: &mut JitContext,
    b: &mut JitBlock,
    pool: &mut ExecPagePool,
    mut op: Op,
) -> Result<(), JitError> {
    ensure_space(b, pool, op.buf.len() + 32)?;
    let result = copy_insn_output(b, &mut op);
    ctx.pool.put(op);
    result
}
