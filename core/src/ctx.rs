//! Per-CPU translation context: op pool, per-slot op lists, register
//! map and compile-time configuration. One context exists per guest
//! CPU; it is reset at the start of every page compile.

use crate::block::JitBlock;
use crate::cpu::{PPC32_INSN_PER_PAGE, PPC32_MIN_PAGE_IMASK, PPC32_MIN_PAGE_MASK};
use crate::hreg::HregMap;
use crate::op::{Op, OpKind, OpPool, OP_INV};

pub struct JitContext {
    pub pool: OpPool,
    /// Op list per instruction slot of the page being compiled.
    pub op_lists: Vec<Vec<Op>>,
    pub hregs: HregMap,
    /// Slot currently being emitted.
    pub cur_slot: usize,
    /// Emit the block-lookup trampoline for cross-page jumps.
    pub direct_jump: bool,
    /// Emit a perf-counter increment per translated instruction.
    pub count_insns: bool,
    /// Host registers clobbered by the CR capture sequence.
    cr_clobbers: &'static [u8],
}

impl JitContext {
    pub fn new(avail_hregs: &[u8], tmp_hreg: u8, cr_clobbers: &'static [u8]) -> Self {
        Self {
            pool: OpPool::new(),
            op_lists: (0..PPC32_INSN_PER_PAGE).map(|_| Vec::new()).collect(),
            hregs: HregMap::new(avail_hregs, tmp_hreg),
            cur_slot: 0,
            direct_jump: true,
            count_insns: false,
            cr_clobbers,
        }
    }

    /// Recycle all op lists and drop register bindings.
    pub fn reset(&mut self) {
        for slot in 0..PPC32_INSN_PER_PAGE {
            let ops = core::mem::take(&mut self.op_lists[slot]);
            self.pool.put_list(ops);
        }
        self.hregs.reset();
        self.cur_slot = 0;
    }

    // -- Register allocation sequence (delegates to the map) --

    pub fn start_hreg_seq(&mut self, name: &'static str) {
        self.hregs.start_seq(name);
    }

    pub fn close_hreg_seq(&mut self) {
        self.hregs.close_seq();
    }

    pub fn alloc_hreg(&mut self, ppc_reg: i32) -> u8 {
        self.hregs.alloc(ppc_reg)
    }

    pub fn alloc_hreg_forced(&mut self, hreg: u8) {
        self.hregs.alloc_forced(hreg);
    }

    pub fn tmp_hreg(&self) -> u8 {
        self.hregs.tmp_hreg()
    }

    // -- Op emission into the current slot --

    fn push(&mut self, op: Op) {
        self.op_lists[self.cur_slot].push(op);
    }

    pub fn emit_basic(&mut self, kind: OpKind) {
        let op = self.pool.get(0, kind);
        self.push(op);
    }

    pub fn emit_alter_host_reg(&mut self, hreg: u8) {
        let mut op = self.pool.get(0, OpKind::AlterHostReg);
        op.param[0] = hreg as i32;
        self.push(op);
        self.hregs.invalidate(hreg);
    }

    /// Allocate an `InsnOutput` record; the caller assembles host code
    /// into its buffer and queues it with [`JitContext::push_insn_output`].
    pub fn new_insn_output(&mut self, size_index: usize, name: &'static str) -> Op {
        let mut op = self.pool.get(size_index, OpKind::InsnOutput);
        op.name = name;
        op
    }

    pub fn push_insn_output(&mut self, op: Op) {
        debug_assert_eq!(op.kind, OpKind::InsnOutput);
        self.push(op);
    }

    pub fn emit_load_gpr(&mut self, hreg: u8, ppc_reg: u32) {
        let mut op = self.pool.get(0, OpKind::LoadGpr);
        op.param = [hreg as i32, ppc_reg as i32, hreg as i32];
        self.push(op);
    }

    pub fn emit_store_gpr(&mut self, ppc_reg: u32, hreg: u8) {
        let mut op = self.pool.get(0, OpKind::StoreGpr);
        op.param = [hreg as i32, ppc_reg as i32, hreg as i32];
        self.push(op);
    }

    /// Queue a CR capture from host flags, and invalidate the host
    /// registers the capture sequence scratches.
    pub fn emit_update_flags(&mut self, field: u32, is_signed: bool) {
        let mut op = self.pool.get(0, OpKind::UpdateFlags);
        op.param[0] = field as i32;
        op.param[1] = is_signed as i32;
        self.push(op);

        for i in 0..self.cr_clobbers.len() {
            let hreg = self.cr_clobbers[i];
            self.emit_alter_host_reg(hreg);
        }
    }

    pub fn emit_require_flags(&mut self, field: i32) {
        let mut op = self.pool.get(0, OpKind::RequireFlags);
        op.param[0] = field;
        self.push(op);
    }

    pub fn emit_trash_flags(&mut self) {
        self.emit_basic(OpKind::TrashFlags);
    }

    pub fn emit_eob(&mut self) {
        self.emit_basic(OpKind::EndOfBlock);
    }

    pub fn emit_branch_jump(&mut self) {
        self.emit_basic(OpKind::BranchJump);
    }

    /// Tag `ia` as a branch destination if it falls inside the page
    /// being compiled. The record is inserted at the head of the target
    /// slot's list so it runs before the slot body.
    pub fn emit_branch_target(&mut self, b: &JitBlock, ia: u32) {
        if (ia & PPC32_MIN_PAGE_MASK) != b.start_ia {
            return;
        }
        let slot = ((ia & PPC32_MIN_PAGE_IMASK) >> 2) as usize;
        let op = self.pool.get(0, OpKind::BranchTarget);
        self.op_lists[slot].insert(0, op);
    }

    pub fn emit_set_host_reg_imm32(&mut self, hreg: u8, val: u32) {
        let mut op = self.pool.get(0, OpKind::SetHostRegImm32);
        op.param[0] = hreg as i32;
        op.param[1] = val as i32;
        self.push(op);
        self.hregs.invalidate(hreg);
    }

    pub fn emit_move_host_reg(&mut self, dst: u8, src: u8) {
        let mut op = self.pool.get(0, OpKind::MoveHostReg);
        op.param[0] = dst as i32;
        op.param[1] = src as i32;
        self.push(op);
        self.hregs.invalidate(dst);
    }
}

/// `RequireFlags` parameter requesting every CR field.
pub const ALL_FLAGS: i32 = OP_INV;
