//! IR op records and the per-CPU op pool.
//!
//! Emitters translate each guest instruction into a short list of op
//! records; most carry a pre-assembled host code snippet in an embedded
//! buffer. Buffers come in fixed size buckets and are recycled through
//! per-bucket free lists so steady-state translation does not allocate.

/// "No register" / "all registers" sentinel in op parameters.
pub const OP_INV: i32 = -1;

/// Number of size buckets.
pub const OP_POOL_NR: usize = 8;

/// Nominal buffer capacity of each bucket.
pub const OP_BUF_SIZES: [usize; OP_POOL_NR] = [0, 32, 64, 128, 256, 384, 512, 1024];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Invalid,
    /// Pre-assembled host code; copied verbatim to the output cursor.
    InsnOutput,
    /// The owning slot is a branch destination; resets cached register
    /// residency before the slot body.
    BranchTarget,
    /// The instruction performs a branch.
    BranchJump,
    /// End of block: all cached state must be considered dead.
    EndOfBlock,
    /// param: [host_reg, guest_gpr, host_reg].
    LoadGpr,
    /// param: [host_reg, guest_gpr, host_reg].
    StoreGpr,
    /// Capture host flags into a CR field. param: [field, is_signed].
    UpdateFlags,
    /// The given CR field is consumed. param: [field] (-1 = all).
    RequireFlags,
    /// CR fields are about to be overwritten directly.
    TrashFlags,
    /// Host register contents become undefined. param: [host_reg].
    AlterHostReg,
    /// param: [dst_host_reg, src_host_reg].
    MoveHostReg,
    /// param: [host_reg, imm32].
    SetHostRegImm32,
}

/// A forward-branch fixup recorded while assembling an `InsnOutput`
/// buffer: `buf_off` is the position of the rel32 displacement field
/// inside the buffer, `target_ia` the guest destination.
#[derive(Debug, Clone, Copy)]
pub struct OpPatch {
    pub buf_off: usize,
    pub target_ia: u32,
}

/// One IR record.
#[derive(Debug)]
pub struct Op {
    pub kind: OpKind,
    pub param: [i32; 3],
    /// Diagnostic name of the emitting instruction.
    pub name: &'static str,
    pub size_index: usize,
    /// Embedded host code (capacity = `OP_BUF_SIZES[size_index]`).
    pub buf: Vec<u8>,
    /// Final host address of the copied buffer, set during lowering.
    pub final_host: *const u8,
    /// Intra-page branch fixups owned by this record.
    pub patches: Vec<OpPatch>,
}

impl Op {
    /// Emission exceeded the bucket capacity. Checked at lowering time;
    /// the buffer itself grows, so this is a diagnostic, not a memory
    /// error.
    pub fn overflowed(&self) -> bool {
        self.buf.len() > OP_BUF_SIZES[self.size_index]
    }
}

/// Size-bucketed free lists of op records.
#[derive(Default)]
pub struct OpPool {
    free: [Vec<Op>; OP_POOL_NR],
}

impl OpPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record with all parameters reset. Pops from the bucket's
    /// free list when possible.
    pub fn get(&mut self, size_index: usize, kind: OpKind) -> Op {
        assert!(size_index < OP_POOL_NR);
        let mut op = self.free[size_index].pop().unwrap_or_else(|| Op {
            kind: OpKind::Invalid,
            param: [OP_INV; 3],
            name: "",
            size_index,
            buf: Vec::with_capacity(OP_BUF_SIZES[size_index]),
            final_host: core::ptr::null(),
            patches: Vec::new(),
        });

        debug_assert_eq!(op.size_index, size_index);
        op.kind = kind;
        op.param = [OP_INV; 3];
        op.name = "";
        op.buf.clear();
        op.final_host = core::ptr::null();
        op.patches.clear();
        op
    }

    /// Return a record to its bucket.
    pub fn put(&mut self, op: Op) {
        assert!(op.size_index < OP_POOL_NR);
        self.free[op.size_index].push(op);
    }

    /// Return a whole list of records.
    pub fn put_list(&mut self, ops: Vec<Op>) {
        for op in ops {
            self.put(op);
        }
    }

    /// Drop all pooled records (teardown).
    pub fn free_all(&mut self) {
        for bucket in &mut self.free {
            bucket.clear();
            bucket.shrink_to_fit();
        }
    }

    pub fn pooled(&self, size_index: usize) -> usize {
        self.free[size_index].len()
    }
}
