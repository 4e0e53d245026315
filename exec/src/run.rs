//! Executor: the compile-then-run outer loop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ppcjit_backend::x86_64::{AVAIL_HREGS, CR_UPDATE_CLOBBERS, TMP_HREG};
use ppcjit_backend::{ExecPagePool, JitError};
use ppcjit_core::block::JitBlock;
use ppcjit_core::cpu::{CpuPpc, PPC32_MIN_PAGE_MASK};
use ppcjit_core::JitContext;

use crate::block_cache::BlockCache;
use crate::compile::{compile_page, recompile_block, CompileError, GuestPageFetch};

/// Why a `step`/`run` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Block executed; more work may follow.
    Continue,
    /// Emitted code or the interpreter reported a guest exception;
    /// the embedder dispatches `cpu.exception_pending`.
    GuestException(i32),
    /// Cooperative stop flag observed.
    Stopped,
    /// No guest code could be fetched for the page holding this IA.
    NoCode(u32),
}

type IrqHook = Box<dyn FnMut(&mut CpuPpc)>;

/// Running counters for the translation machinery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JitStats {
    /// Pages translated (first compiles).
    pub translated: u64,
    /// In-place rebuilds (new branch targets, aborted tails).
    pub recompiled: u64,
    /// Blocks destroyed by flushes.
    pub flushed: u64,
    /// Blocks destroyed by physical-page writes.
    pub invalidated: u64,
    /// Instructions executed through the interpreter fallback.
    pub interp_steps: u64,
}

/// Per-CPU JIT: translation context, code arena, and block cache, plus
/// the outer execution loop.
pub struct PpcJit {
    pool: ExecPagePool,
    cache: BlockCache,
    ctx: JitContext,
    stop: Arc<AtomicBool>,
    /// Pages whose translation aborted; interpreted from then on.
    no_jit: HashSet<u32>,
    irq_hook: Option<IrqHook>,
    stats: JitStats,
}

impl PpcJit {
    pub fn new() -> Result<Self, JitError> {
        Self::with_area_size(ppcjit_backend::EXEC_AREA_DEFAULT_SIZE)
    }

    pub fn with_area_size(area_size: usize) -> Result<Self, JitError> {
        Ok(Self {
            pool: ExecPagePool::new(area_size)?,
            cache: BlockCache::new(),
            ctx: JitContext::new(&AVAIL_HREGS, TMP_HREG, &CR_UPDATE_CLOBBERS),
            stop: Arc::new(AtomicBool::new(false)),
            no_jit: HashSet::new(),
            irq_hook: None,
            stats: JitStats::default(),
        })
    }

    pub fn stats(&self) -> JitStats {
        self.stats
    }

    /// Wire the CPU record to this JIT's block map (needed by the
    /// far-jump trampoline).
    pub fn attach(&mut self, cpu: &mut CpuPpc) {
        cpu.exec_blk_map = self.cache.virt_map_ptr();
    }

    /// Cooperative stop flag, observed between blocks.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn set_direct_jump(&mut self, enable: bool) {
        self.ctx.direct_jump = enable;
    }

    pub fn set_count_insns(&mut self, enable: bool) {
        self.ctx.count_insns = enable;
    }

    pub fn set_irq_hook(&mut self, hook: IrqHook) {
        self.irq_hook = Some(hook);
    }

    /// A guest write hit `phys_page`: evict every block translated
    /// from it. Returns the number of blocks evicted.
    pub fn invalidate_phys_page(&mut self, phys_page: u32) -> usize {
        let n = self.cache.invalidate_phys_page(phys_page, &mut self.pool);
        self.stats.invalidated += n as u64;
        n
    }

    /// Destroy blocks executed fewer than `threshold` times (all of
    /// them when zero).
    pub fn flush(&mut self, threshold: u64) -> usize {
        if threshold == 0 {
            self.no_jit.clear();
        }
        let n = self.cache.flush(threshold, &mut self.pool);
        self.stats.flushed += n as u64;
        n
    }

    pub fn block_for(&self, vpage: u32) -> Option<*mut JitBlock> {
        self.cache.lookup(vpage)
    }

    /// Translate (if needed) and run one block at the current IA.
    pub fn step(&mut self, cpu: &mut CpuPpc, mem: &mut dyn GuestPageFetch) -> ExitReason {
        if self.stop.load(Ordering::Relaxed) {
            return ExitReason::Stopped;
        }
        if cpu.exec_blk_map.is_null() {
            self.attach(cpu);
        }

        let ia = cpu.ia;
        let vpage = ia & PPC32_MIN_PAGE_MASK;

        if self.no_jit.contains(&vpage) {
            return self.interp_step(cpu, mem);
        }

        let blk = match self.cache.lookup(vpage) {
            Some(b) => b,
            None => match self.translate(cpu, mem, ia) {
                Ok(b) => b,
                Err(reason) => return reason,
            },
        };

        // SAFETY: blk is live and owned by our cache; recompilation
        // below keeps it linked.
        unsafe {
            (*blk).acc_count += 1;

            let slot = JitBlock::slot_of(ia);

            // A mid-page entry at a slot the block was not compiled
            // for: record the new target and rebuild.
            let needs_recompile = (slot != 0 && !(*blk).get_target_bit(ia))
                || (*blk).insn_ptrs[slot].is_null();
            if needs_recompile {
                (*blk).set_target_bit(ia);
                self.stats.recompiled += 1;
                if recompile_block(&mut self.ctx, &mut self.pool, cpu, &mut *blk).is_err() {
                    self.no_jit.insert(vpage);
                    return self.interp_step(cpu, mem);
                }
            }

            let code = (*blk).insn_ptrs[slot];
            if code.is_null() {
                return self.interp_step(cpu, mem);
            }

            let status = (self.pool.entry_fn())(cpu as *mut CpuPpc, code);
            if status != 0 {
                return ExitReason::GuestException(status);
            }
        }

        if cpu.irq_check != 0 {
            if let Some(hook) = self.irq_hook.as_mut() {
                hook(cpu);
            }
        }
        ExitReason::Continue
    }

    /// Run blocks until something other than `Continue` happens, or
    /// `max_blocks` have executed.
    pub fn run(
        &mut self,
        cpu: &mut CpuPpc,
        mem: &mut dyn GuestPageFetch,
        max_blocks: usize,
    ) -> ExitReason {
        for _ in 0..max_blocks {
            match self.step(cpu, mem) {
                ExitReason::Continue => continue,
                other => return other,
            }
        }
        ExitReason::Continue
    }

    fn translate(
        &mut self,
        cpu: &mut CpuPpc,
        mem: &mut dyn GuestPageFetch,
        entry_ia: u32,
    ) -> Result<*mut JitBlock, ExitReason> {
        let vpage = entry_ia & PPC32_MIN_PAGE_MASK;
        match compile_page(&mut self.ctx, &mut self.pool, cpu, mem, entry_ia) {
            Ok(b) => {
                self.stats.translated += 1;
                Ok(self.cache.insert(b, &mut self.pool))
            }
            Err(CompileError::Fetch) => Err(ExitReason::NoCode(vpage)),
            Err(CompileError::Jit(JitError::CodeBufferExhausted)) => {
                // Arena pressure: drop everything and try once more.
                self.flush(0);
                match compile_page(&mut self.ctx, &mut self.pool, cpu, mem, entry_ia) {
                    Ok(b) => Ok(self.cache.insert(b, &mut self.pool)),
                    Err(_) => {
                        self.no_jit.insert(vpage);
                        Err(self.interp_step(cpu, mem))
                    }
                }
            }
            Err(CompileError::Jit(_)) => {
                self.no_jit.insert(vpage);
                Err(self.interp_step(cpu, mem))
            }
        }
    }

    /// Interpreter fallback for pages the JIT gave up on: execute the
    /// single instruction at IA through the external step function.
    fn interp_step(&mut self, cpu: &mut CpuPpc, mem: &mut dyn GuestPageFetch) -> ExitReason {
        let ia = cpu.ia;
        let vpage = ia & PPC32_MIN_PAGE_MASK;
        let Some(page) = mem.fetch_code_page(cpu, vpage) else {
            return ExitReason::NoCode(vpage);
        };
        self.stats.interp_steps += 1;
        let word = page.words[JitBlock::slot_of(ia)];
        let status = (cpu.exec_single_insn)(cpu as *mut CpuPpc, word);
        if status != 0 {
            return ExitReason::GuestException(status);
        }
        ExitReason::Continue
    }
}
