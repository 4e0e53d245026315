//! Executable memory arena and chunk pool.
//!
//! One anonymous RWX mapping per guest CPU, carved into fixed 32 KiB
//! chunks handed to translated blocks. Chunks go back on the free list
//! when a block dies; the mapping itself is only released on teardown.
//! The first chunk holds the entry thunk through which the executor
//! calls translated code.

use std::io;
use std::ptr;

use ppcjit_core::block::JitChunk;
use ppcjit_core::cpu::CpuPpc;

use crate::x86_64::{self as x86, CALLEE_SAVED, CPU_BASE_REG, RDI, RSI, RSP, STACK_ADJUST};
use crate::{CodeSink, JitError};

/// Default executable area size.
pub const EXEC_AREA_DEFAULT_SIZE: usize = 64 << 20;

/// Constrained-host area size.
pub const EXEC_AREA_SMALL_SIZE: usize = 16 << 20;

/// Size of one code chunk.
pub const JIT_BUFSIZE: usize = 32 * 1024;

/// Entry point of translated code: `(cpu, block code ptr) -> status`.
/// Status 0 is a normal exit; non-zero reports a guest exception.
pub type EntryFn = unsafe extern "C" fn(*mut CpuPpc, *const u8) -> i32;

/// Code sink writing straight into arena memory.
pub struct RawSink {
    base: *mut u8,
    len: usize,
    cap: usize,
}

impl RawSink {
    /// # Safety
    /// `base..base+cap` must be writable and exclusively owned by the
    /// caller for the lifetime of the sink.
    pub unsafe fn new(base: *mut u8, cap: usize) -> Self {
        Self { base, len: 0, cap }
    }

    pub fn cur_ptr(&self) -> *mut u8 {
        unsafe { self.base.add(self.len) }
    }
}

impl CodeSink for RawSink {
    fn put_u8(&mut self, b: u8) {
        assert!(self.len < self.cap, "code chunk overflow");
        unsafe { self.base.add(self.len).write(b) };
        self.len += 1;
    }

    fn pos(&self) -> usize {
        self.len
    }

    fn patch8(&mut self, at: usize, b: u8) {
        assert!(at < self.len);
        unsafe { self.base.add(at).write(b) };
    }

    fn patch32(&mut self, at: usize, v: u32) {
        assert!(at + 4 <= self.len);
        unsafe { (self.base.add(at) as *mut u32).write_unaligned(v) };
    }
}

pub struct ExecPagePool {
    area: *mut u8,
    area_size: usize,
    free: Vec<JitChunk>,
    entry: EntryFn,
}

// SAFETY: the pool exclusively owns its mapping.
unsafe impl Send for ExecPagePool {}

impl ExecPagePool {
    pub fn new(area_size: usize) -> Result<Self, JitError> {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
        let area_size = (area_size.max(2 * JIT_BUFSIZE) + page_size - 1) & !(page_size - 1);

        // SAFETY: anonymous private mapping, no file backing.
        let area = unsafe {
            libc::mmap(
                ptr::null_mut(),
                area_size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if area == libc::MAP_FAILED {
            return Err(JitError::ExecAreaMap(io::Error::last_os_error()));
        }
        let area = area as *mut u8;

        let mut free = Vec::with_capacity(area_size / JIT_BUFSIZE);
        let mut off = JIT_BUFSIZE;
        while off + JIT_BUFSIZE <= area_size {
            free.push(JitChunk {
                base: unsafe { area.add(off) },
                size: JIT_BUFSIZE,
            });
            off += JIT_BUFSIZE;
        }
        // LIFO pop order: keep low addresses first.
        free.reverse();

        let entry = unsafe { Self::emit_entry_thunk(area) };

        Ok(Self {
            area,
            area_size,
            free,
            entry,
        })
    }

    pub fn with_default_size() -> Result<Self, JitError> {
        Self::new(EXEC_AREA_DEFAULT_SIZE)
    }

    /// Assemble the entry thunk at the start of the area:
    /// save callee-saved registers, load the CPU base register, align
    /// the stack and call into the block. Blocks return with `ret`, a
    /// status in EAX.
    unsafe fn emit_entry_thunk(base: *mut u8) -> EntryFn {
        let mut s = RawSink::new(base, JIT_BUFSIZE);

        for &reg in CALLEE_SAVED.iter() {
            x86::push_r(&mut s, reg);
        }
        x86::mov_rr64(&mut s, CPU_BASE_REG, RDI);
        x86::alu_ri64(&mut s, x86::AluOp::Sub, RSP, STACK_ADJUST);
        x86::call_r(&mut s, RSI);
        x86::alu_ri64(&mut s, x86::AluOp::Add, RSP, STACK_ADJUST);
        for &reg in CALLEE_SAVED.iter().rev() {
            x86::pop_r(&mut s, reg);
        }
        x86::ret(&mut s);

        core::mem::transmute::<*mut u8, EntryFn>(base)
    }

    pub fn entry_fn(&self) -> EntryFn {
        self.entry
    }

    pub fn alloc_chunk(&mut self) -> Result<JitChunk, JitError> {
        self.free.pop().ok_or(JitError::CodeBufferExhausted)
    }

    pub fn release_chunks(&mut self, chunks: impl IntoIterator<Item = JitChunk>) {
        self.free.extend(chunks);
    }

    pub fn free_chunks(&self) -> usize {
        self.free.len()
    }

    /// Whether a pointer falls inside the arena (all chunks are within
    /// rel32 range of each other).
    pub fn contains(&self, p: *const u8) -> bool {
        let a = self.area as usize;
        (a..a + self.area_size).contains(&(p as usize))
    }
}

impl Drop for ExecPagePool {
    fn drop(&mut self) {
        if !self.area.is_null() {
            unsafe {
                libc::munmap(self.area as *mut libc::c_void, self.area_size);
            }
        }
    }
}
