//! Page compilation driver: fetch guest code, run the emitters over
//! every slot, lower the op lists, append the end-of-page epilog and
//! resolve intra-page branch patches.

use ppcjit_backend::{append_insn_output, lower_page, ExecPagePool, JitError};
use ppcjit_core::block::JitBlock;
use ppcjit_core::cpu::{CpuPpc, PPC32_INSN_PER_PAGE};
use ppcjit_core::JitContext;
use ppcjit_frontend::ppc32;

/// One page of guest code as fetched by the embedder's MMU.
pub struct CodePage {
    pub phys_page: u32,
    /// `PPC32_INSN_PER_PAGE` instruction words in host byte order.
    pub words: Vec<u32>,
}

/// Source of guest code bytes for the compiler.
pub trait GuestPageFetch {
    fn fetch_code_page(&mut self, cpu: &mut CpuPpc, vpage: u32) -> Option<CodePage>;
}

#[derive(Debug)]
pub enum CompileError {
    /// The guest page is not mapped / not fetchable.
    Fetch,
    Jit(JitError),
}

impl From<JitError> for CompileError {
    fn from(e: JitError) -> Self {
        CompileError::Jit(e)
    }
}

/// Compile the whole guest page containing `entry_ia`. The entry slot
/// is marked as a branch target up front so its code starts from a
/// clean register-residency state.
pub fn compile_page(
    ctx: &mut JitContext,
    pool: &mut ExecPagePool,
    cpu: &mut CpuPpc,
    mem: &mut dyn GuestPageFetch,
    entry_ia: u32,
) -> Result<Box<JitBlock>, CompileError> {
    let vpage = entry_ia & ppcjit_core::cpu::PPC32_MIN_PAGE_MASK;
    let page = mem.fetch_code_page(cpu, vpage).ok_or(CompileError::Fetch)?;
    assert_eq!(page.words.len(), PPC32_INSN_PER_PAGE);

    let mut b = JitBlock::new(vpage, page.phys_page);
    b.ppc_code = page.words;
    if JitBlock::slot_of(entry_ia) != 0 {
        b.set_target_bit(entry_ia);
    }

    match translate_block(ctx, &mut b, pool, cpu) {
        Ok(()) => Ok(b),
        Err(e) => {
            log::warn!("translation of page {vpage:#010x} aborted: {e}");
            pool.release_chunks(b.reset_for_recompile());
            Err(e.into())
        }
    }
}

/// Re-translate a block in place, keeping its learned target bitmap so
/// previously discovered branch destinations get defined entry points.
pub fn recompile_block(
    ctx: &mut JitContext,
    pool: &mut ExecPagePool,
    cpu: &mut CpuPpc,
    b: &mut JitBlock,
) -> Result<(), CompileError> {
    let chunks = b.reset_for_recompile();
    pool.release_chunks(chunks);

    match translate_block(ctx, b, pool, cpu) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::warn!("recompile of page {:#010x} aborted: {e}", b.start_ia);
            pool.release_chunks(b.reset_for_recompile());
            Err(e.into())
        }
    }
}

fn translate_block(
    ctx: &mut JitContext,
    b: &mut JitBlock,
    pool: &mut ExecPagePool,
    cpu: &CpuPpc,
) -> Result<(), JitError> {
    ctx.reset();

    // Emission: op lists per slot.
    for pos in 0..PPC32_INSN_PER_PAGE {
        b.trans_pos = pos;
        ctx.cur_slot = pos;
        let ia = b.ia_of_slot(pos);

        if cpu.breakpoints.iter().any(|&bp| bp != 0 && bp == ia) {
            ppc32::emit_breakpoint(ctx, b);
        }
        if ctx.count_insns {
            ppc32::emit_perf_count(ctx);
        }

        let word = b.ppc_code[pos];
        let tag = ppcjit_frontend::decode(word);
        (tag.emit)(ctx, b, word);
    }

    if log::log_enabled!(log::Level::Trace) {
        log::trace!(
            "op lists for page {:#010x}:\n{}",
            b.start_ia,
            ppcjit_core::dump::dump_ops(ctx, b.start_ia)
        );
    }

    // Lowering: host code into the chunks.
    lower_page(ctx, b, pool)?;

    // Fall through into the next guest page.
    b.trans_pos = PPC32_INSN_PER_PAGE - 1;
    ctx.cur_slot = PPC32_INSN_PER_PAGE - 1;
    let epilog = ppc32::page_jump_op(ctx, b);
    append_insn_output(ctx, b, pool, epilog)?;

    resolve_patches(b);
    Ok(())
}

/// Resolve recorded intra-page branches against the now-known host
/// addresses. A patch whose target slot never produced code marks the
/// slot in the target bitmap and stays pending for a recompile.
fn resolve_patches(b: &mut JitBlock) {
    let mut undefined = 0;
    for i in 0..b.patches.len() {
        let patch = b.patches[i];
        let slot = JitBlock::slot_of(patch.target_ia);
        let target = b.insn_ptrs[slot];
        if target.is_null() {
            b.set_target_bit(patch.target_ia);
            undefined += 1;
            continue;
        }
        let disp = (target as i64) - (patch.host_site as i64 + 4);
        // SAFETY: host_site addresses a displacement field inside a
        // chunk owned by this block.
        unsafe {
            (patch.host_site as *mut u32).write_unaligned(disp as u32);
        }
    }
    b.target_undef_cnt = undefined;
    if undefined != 0 {
        log::debug!(
            "page {:#010x}: {undefined} branch targets pending recompile",
            b.start_ia
        );
    }
}
