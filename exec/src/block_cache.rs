//! Block cache: the two hash indices over translated blocks.
//!
//! The virtual-address index serves execution lookup (and is walked by
//! the emitted far-jump trampoline, which is why it is an array of raw
//! head pointers wired into the CPU record). The physical-page index
//! serves write invalidation. Blocks are heap-allocated and owned by
//! this cache; both chains use `next`/`pprev` pairs so unlinking is
//! constant time.

use ppcjit_backend::ExecPagePool;
use ppcjit_core::block::JitBlock;
use ppcjit_core::block::BLOCK_FLAG_NO_FLUSH;
use ppcjit_core::hash::{IA_HASH_SIZE, PHYS_HASH_SIZE};

pub struct BlockCache {
    virt: Box<[*mut JitBlock]>,
    phys: Box<[*mut JitBlock]>,
}

// SAFETY: single-threaded ownership of all linked blocks.
unsafe impl Send for BlockCache {}

impl BlockCache {
    pub fn new() -> Self {
        Self {
            virt: vec![core::ptr::null_mut(); IA_HASH_SIZE].into_boxed_slice(),
            phys: vec![core::ptr::null_mut(); PHYS_HASH_SIZE].into_boxed_slice(),
        }
    }

    /// Head-pointer array for `CpuPpc::exec_blk_map`.
    pub fn virt_map_ptr(&mut self) -> *mut *mut JitBlock {
        self.virt.as_mut_ptr()
    }

    /// Find the block compiled for a guest virtual page.
    pub fn lookup(&self, vpage: u32) -> Option<*mut JitBlock> {
        let hash = ppcjit_core::hash::ia_hash(vpage) as usize;
        let mut cur = self.virt[hash];
        while !cur.is_null() {
            // SAFETY: chain members are live cache-owned blocks.
            unsafe {
                if (*cur).start_ia == vpage {
                    return Some(cur);
                }
                cur = (*cur).hash_next;
            }
        }
        None
    }

    /// Take ownership of a freshly compiled block and link it into
    /// both indices. Any previous block for the same physical page is
    /// destroyed first.
    pub fn insert(&mut self, b: Box<JitBlock>, pool: &mut ExecPagePool) -> *mut JitBlock {
        self.invalidate_phys_page(b.phys_page, pool);

        let b = Box::into_raw(b);
        unsafe {
            self.link_virt(b);
            self.link_phys(b);
        }
        b
    }

    unsafe fn link_virt(&mut self, b: *mut JitBlock) {
        let head = &mut self.virt[(*b).ia_hash as usize] as *mut *mut JitBlock;
        (*b).hash_next = *head;
        (*b).hash_pprev = head;
        if !(*head).is_null() {
            (**head).hash_pprev = &mut (*b).hash_next;
        }
        *head = b;
    }

    unsafe fn link_phys(&mut self, b: *mut JitBlock) {
        let head = &mut self.phys[(*b).phys_hash as usize] as *mut *mut JitBlock;
        (*b).phys_next = *head;
        (*b).phys_pprev = head;
        if !(*head).is_null() {
            (**head).phys_pprev = &mut (*b).phys_next;
        }
        *head = b;
    }

    unsafe fn unlink(b: *mut JitBlock) {
        let next = (*b).hash_next;
        if !next.is_null() {
            (*next).hash_pprev = (*b).hash_pprev;
        }
        if !(*b).hash_pprev.is_null() {
            *(*b).hash_pprev = next;
        }

        let pnext = (*b).phys_next;
        if !pnext.is_null() {
            (*pnext).phys_pprev = (*b).phys_pprev;
        }
        if !(*b).phys_pprev.is_null() {
            *(*b).phys_pprev = pnext;
        }

        (*b).hash_next = core::ptr::null_mut();
        (*b).hash_pprev = core::ptr::null_mut();
        (*b).phys_next = core::ptr::null_mut();
        (*b).phys_pprev = core::ptr::null_mut();
    }

    /// Unlink and free one block, returning its chunks to the pool.
    ///
    /// # Safety
    /// `b` must be a live block owned by this cache.
    pub unsafe fn destroy(&mut self, b: *mut JitBlock, pool: &mut ExecPagePool) {
        Self::unlink(b);
        let boxed = Box::from_raw(b);
        pool.release_chunks(boxed.chunks.iter().copied());
    }

    /// Destroy every block whose source bytes live in `phys_page`.
    /// Returns the number of blocks evicted.
    pub fn invalidate_phys_page(&mut self, phys_page: u32, pool: &mut ExecPagePool) -> usize {
        let hash = ppcjit_core::hash::phys_hash(phys_page) as usize;
        let mut evicted = 0;

        let mut cur = self.phys[hash];
        while !cur.is_null() {
            // SAFETY: chain members are live; read next before a
            // possible destroy.
            unsafe {
                let next = (*cur).phys_next;
                if (*cur).phys_page == phys_page {
                    self.destroy(cur, pool);
                    evicted += 1;
                }
                cur = next;
            }
        }
        evicted
    }

    /// Destroy blocks executed fewer than `threshold` times
    /// (everything when `threshold` is zero). Returns the count.
    pub fn flush(&mut self, threshold: u64, pool: &mut ExecPagePool) -> usize {
        let mut flushed = 0;
        for i in 0..IA_HASH_SIZE {
            let mut cur = self.virt[i];
            while !cur.is_null() {
                unsafe {
                    let next = (*cur).hash_next;
                    let keep = threshold != 0
                        && ((*cur).acc_count >= threshold
                            || (*cur).flags & BLOCK_FLAG_NO_FLUSH != 0);
                    if !keep {
                        self.destroy(cur, pool);
                        flushed += 1;
                    }
                    cur = next;
                }
            }
        }
        log::debug!("block cache flush: {flushed} blocks released");
        flushed
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        for i in 0..IA_HASH_SIZE {
            let mut cur = self.virt[i];
            while !cur.is_null() {
                // SAFETY: sole owner at teardown; chunks die with the
                // pool.
                unsafe {
                    let next = (*cur).hash_next;
                    drop(Box::from_raw(cur));
                    cur = next;
                }
            }
            self.virt[i] = core::ptr::null_mut();
        }
    }
}
