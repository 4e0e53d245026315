//! PPC32 CPU architectural state.
//!
//! The layout is `#[repr(C)]` because generated host code addresses the
//! fields at fixed byte offsets from the CPU base register. Offsets are
//! taken with `core::mem::offset_of!` so the emitters never hard-code
//! them.

use core::ffi::c_void;
use core::mem::offset_of;

use crate::block::JitBlock;

/// Number of general-purpose registers.
pub const PPC32_GPR_NR: usize = 32;

/// Number of 4-bit condition register fields (each stored in a u32 cell).
pub const PPC32_CR_NR: usize = 8;

/// Number of segment registers.
pub const PPC32_SR_NR: usize = 16;

/// Minimum guest page size handled by the translator.
pub const PPC32_MIN_PAGE_SHIFT: u32 = 12;
pub const PPC32_MIN_PAGE_SIZE: u32 = 1 << PPC32_MIN_PAGE_SHIFT;
pub const PPC32_MIN_PAGE_IMASK: u32 = PPC32_MIN_PAGE_SIZE - 1;
pub const PPC32_MIN_PAGE_MASK: u32 = !PPC32_MIN_PAGE_IMASK;

/// 4-byte instructions per guest page.
pub const PPC32_INSN_PER_PAGE: usize = (PPC32_MIN_PAGE_SIZE as usize) / 4;

/// Maximum number of virtual breakpoints.
pub const PPC32_MAX_BREAKPOINTS: usize = 8;

// Memory operation indices into `CpuPpc::mem_op_fn`.
pub const PPC_MEMOP_LBZ: usize = 0;
pub const PPC_MEMOP_LHZ: usize = 1;
pub const PPC_MEMOP_LHA: usize = 2;
pub const PPC_MEMOP_LWZ: usize = 3;
pub const PPC_MEMOP_STB: usize = 4;
pub const PPC_MEMOP_STH: usize = 5;
pub const PPC_MEMOP_STW: usize = 6;
pub const PPC_MEMOP_NR: usize = 8;

/// Memory access callback. Loads write the target GPR through the CPU
/// record; a non-zero return reports a raised guest exception.
pub type PpcMemOpFn = extern "C" fn(cpu: *mut CpuPpc, vaddr: u32, target: u32) -> i32;

/// Interpreter fallback: execute one instruction word. Non-zero return
/// reports an exception and exits the current block.
pub type PpcInsnFn = extern "C" fn(cpu: *mut CpuPpc, insn: u32) -> i32;

/// Breakpoint hook.
pub type PpcHookFn = extern "C" fn(cpu: *mut CpuPpc) -> i32;

bitflags::bitflags! {
    /// Per MTS-entry flags forcing the slow memory path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MtsFlags: u32 {
        /// Copy-on-write page: stores must go through the slow handler.
        const COW = 0x01;
        /// Device-backed page.
        const DEV = 0x02;
        /// Page holds translated code; stores must invalidate.
        const EXEC = 0x04;
    }
}

/// Number of entries in the MTS (memory translation cache) hash.
pub const MTS_HASH_BITS: u32 = 12;
pub const MTS_HASH_SIZE: usize = 1 << MTS_HASH_BITS;
pub const MTS_HASH_MASK: u32 = (MTS_HASH_SIZE as u32) - 1;
pub const MTS_HASH_SHIFT: u32 = PPC32_MIN_PAGE_SHIFT;

/// log2(size_of::<MtsEntry>()), used by the inline lookup to scale the
/// hash index.
pub const MTS_ENTRY_SHIFT: u32 = 4;

/// One line of the guest-virtual → host-pointer fast-path cache.
///
/// Established and maintained by the guest MMU; the JIT only reads it,
/// both from Rust and from emitted code.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MtsEntry {
    /// Guest virtual page address.
    pub gvpa: u32,
    /// `MtsFlags` bits.
    pub flags: u32,
    /// Host address of the backing page.
    pub hpa: *mut u8,
}

const _: () = assert!(core::mem::size_of::<MtsEntry>() == 1 << MTS_ENTRY_SHIFT);

impl MtsEntry {
    pub const fn invalid() -> Self {
        Self {
            gvpa: 0xFFFF_FFFF,
            flags: 0,
            hpa: core::ptr::null_mut(),
        }
    }

    /// Cache index for an effective address.
    pub fn hash_index(ea: u32) -> usize {
        ((ea >> MTS_HASH_SHIFT) & MTS_HASH_MASK) as usize
    }
}

/// PPC32 CPU state.
///
/// The architectural registers come first, followed by the wiring the
/// emitted code dereferences (memory callbacks, fast-path cache, block
/// map). Ownership of the pointed-to structures stays with the embedder
/// (MMU model) and the block cache respectively.
#[repr(C)]
pub struct CpuPpc {
    pub gpr: [u32; PPC32_GPR_NR],
    pub lr: u32,
    pub ctr: u32,
    /// Instruction address (program counter).
    pub ia: u32,
    /// Condition register fields, one 4-bit value per u32 cell.
    pub cr_fields: [u32; PPC32_CR_NR],
    /// XER carry. Only bit 0 is defined; writers keep the rest zero.
    pub xer_ca: u32,
    pub msr: u32,
    /// Time base, incremented by MFTBL emitted code.
    pub tb: u64,
    pub sr: [u32; PPC32_SR_NR],
    /// Pending-IRQ cell, polled between blocks.
    pub irq_check: u32,
    /// Set by the memory/interpreter callbacks when a guest exception
    /// was raised; inspected by the embedder on a non-zero block status.
    pub exception_pending: u32,
    /// Executed-instruction counter (optional, see `JitContext`).
    pub perf_counter: u32,

    /// C-ABI memory handlers, indexed by `PPC_MEMOP_*`.
    pub mem_op_fn: [PpcMemOpFn; PPC_MEMOP_NR],
    /// Interpreter single-step fallback.
    pub exec_single_insn: PpcInsnFn,
    /// Virtual breakpoint hook.
    pub run_breakpoint: PpcHookFn,
    /// D-side MTS cache, `MTS_HASH_SIZE` entries.
    pub mts_dcache: *mut MtsEntry,
    /// Virtual-page block index, `IA_HASH_SIZE` head pointers.
    pub exec_blk_map: *mut *mut JitBlock,
    /// Opaque embedder pointer for the callbacks.
    pub vm_data: *mut c_void,

    /// Virtual breakpoints (0 = unused slot).
    pub breakpoints: [u32; PPC32_MAX_BREAKPOINTS],
}

extern "C" fn default_memop(cpu: *mut CpuPpc, _vaddr: u32, _target: u32) -> i32 {
    unsafe { (*cpu).exception_pending = 1 };
    1
}

extern "C" fn default_insn(cpu: *mut CpuPpc, _insn: u32) -> i32 {
    unsafe { (*cpu).exception_pending = 1 };
    1
}

extern "C" fn default_hook(_cpu: *mut CpuPpc) -> i32 {
    0
}

impl CpuPpc {
    pub fn new() -> Self {
        Self {
            gpr: [0; PPC32_GPR_NR],
            lr: 0,
            ctr: 0,
            ia: 0,
            cr_fields: [0; PPC32_CR_NR],
            xer_ca: 0,
            msr: 0,
            tb: 0,
            sr: [0; PPC32_SR_NR],
            irq_check: 0,
            exception_pending: 0,
            perf_counter: 0,
            mem_op_fn: [default_memop; PPC_MEMOP_NR],
            exec_single_insn: default_insn,
            run_breakpoint: default_hook,
            mts_dcache: core::ptr::null_mut(),
            exec_blk_map: core::ptr::null_mut(),
            vm_data: core::ptr::null_mut(),
            breakpoints: [0; PPC32_MAX_BREAKPOINTS],
        }
    }
}

impl Default for CpuPpc {
    fn default() -> Self {
        Self::new()
    }
}

// -- Byte offsets used by the emitters --

pub fn gpr_offset(reg: u32) -> i32 {
    (offset_of!(CpuPpc, gpr) + reg as usize * 4) as i32
}

pub fn cr_field_offset(field: u32) -> i32 {
    (offset_of!(CpuPpc, cr_fields) + field as usize * 4) as i32
}

pub fn sr_offset(sr: u32) -> i32 {
    (offset_of!(CpuPpc, sr) + sr as usize * 4) as i32
}

pub fn memop_offset(op: usize) -> i32 {
    (offset_of!(CpuPpc, mem_op_fn) + op * core::mem::size_of::<PpcMemOpFn>()) as i32
}

pub fn ia_offset() -> i32 {
    offset_of!(CpuPpc, ia) as i32
}

pub fn lr_offset() -> i32 {
    offset_of!(CpuPpc, lr) as i32
}

pub fn ctr_offset() -> i32 {
    offset_of!(CpuPpc, ctr) as i32
}

pub fn xer_ca_offset() -> i32 {
    offset_of!(CpuPpc, xer_ca) as i32
}

pub fn msr_offset() -> i32 {
    offset_of!(CpuPpc, msr) as i32
}

pub fn tb_offset() -> i32 {
    offset_of!(CpuPpc, tb) as i32
}

pub fn perf_counter_offset() -> i32 {
    offset_of!(CpuPpc, perf_counter) as i32
}

pub fn exec_single_insn_offset() -> i32 {
    offset_of!(CpuPpc, exec_single_insn) as i32
}

pub fn run_breakpoint_offset() -> i32 {
    offset_of!(CpuPpc, run_breakpoint) as i32
}

pub fn mts_dcache_offset() -> i32 {
    offset_of!(CpuPpc, mts_dcache) as i32
}

pub fn exec_blk_map_offset() -> i32 {
    offset_of!(CpuPpc, exec_blk_map) as i32
}

pub fn mts_gvpa_offset() -> i32 {
    offset_of!(MtsEntry, gvpa) as i32
}

pub fn mts_flags_offset() -> i32 {
    offset_of!(MtsEntry, flags) as i32
}

pub fn mts_hpa_offset() -> i32 {
    offset_of!(MtsEntry, hpa) as i32
}
