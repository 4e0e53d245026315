//! Host register map.
//!
//! Tracks which guest GPR each allocatable host register currently
//! caches, with MRU ordering for eviction. Bindings live across
//! instructions within one page compile; an allocation sequence scopes
//! the registers one emitter may hold at once.
//!
//! Guest register memory is stored through on every instruction, so an
//! evicted binding never needs a write-back; eviction just drops the
//! mapping.

use crate::cpu::PPC32_GPR_NR;

/// Host register count addressable by the map.
pub const HREG_NR: usize = 16;

const FLAG_SEQ_LOCKED: u32 = 0x01;

pub struct HregMap {
    /// host reg -> guest GPR (-1 when unbound).
    vreg: [i32; HREG_NR],
    flags: [u32; HREG_NR],
    /// guest GPR -> host reg (-1 when not cached).
    ppc_map: [i32; PPC32_GPR_NR],
    /// Allocatable registers, most recently used first.
    mru: Vec<u8>,
    /// Dedicated temp register, never part of `mru`.
    tmp: u8,
    seq_name: &'static str,
    in_seq: bool,
}

impl HregMap {
    /// `avail` lists the allocatable host registers in initial MRU
    /// order; `tmp` is the fixed scratch register handed out by
    /// [`HregMap::tmp_hreg`].
    pub fn new(avail: &[u8], tmp: u8) -> Self {
        let mut map = Self {
            vreg: [-1; HREG_NR],
            flags: [0; HREG_NR],
            ppc_map: [-1; PPC32_GPR_NR],
            mru: avail.to_vec(),
            tmp,
            seq_name: "",
            in_seq: false,
        };
        debug_assert!(!map.mru.contains(&tmp));
        map.reset();
        map
    }

    /// Drop every binding (start of a page compile).
    pub fn reset(&mut self) {
        self.vreg = [-1; HREG_NR];
        self.flags = [0; HREG_NR];
        self.ppc_map = [-1; PPC32_GPR_NR];
        self.in_seq = false;
    }

    /// Open an allocation sequence. The name is kept for diagnostics.
    pub fn start_seq(&mut self, name: &'static str) {
        debug_assert!(!self.in_seq, "unterminated hreg sequence {:?}", self.seq_name);
        self.seq_name = name;
        self.in_seq = true;
    }

    /// Close the sequence. Bindings stay live for reuse by later
    /// instructions; only the per-sequence locks are released.
    pub fn close_seq(&mut self) {
        for f in &mut self.flags {
            *f &= !FLAG_SEQ_LOCKED;
        }
        self.in_seq = false;
    }

    fn touch(&mut self, hreg: u8) {
        if let Some(pos) = self.mru.iter().position(|&r| r == hreg) {
            self.mru.remove(pos);
            self.mru.insert(0, hreg);
        }
    }

    fn drop_binding(&mut self, hreg: u8) {
        let old = self.vreg[hreg as usize];
        if old >= 0 {
            self.ppc_map[old as usize] = -1;
        }
        self.vreg[hreg as usize] = -1;
    }

    /// Allocate a host register for `ppc_reg` (-1 requests an anonymous
    /// scratch register). An existing binding is reused and refreshed;
    /// otherwise the least recently used unlocked register is evicted.
    pub fn alloc(&mut self, ppc_reg: i32) -> u8 {
        if ppc_reg >= 0 {
            let cached = self.ppc_map[ppc_reg as usize];
            if cached >= 0 {
                let hreg = cached as u8;
                self.touch(hreg);
                self.flags[cached as usize] |= FLAG_SEQ_LOCKED;
                return hreg;
            }
        }

        let hreg = *self
            .mru
            .iter()
            .rev()
            .find(|&&r| self.flags[r as usize] & FLAG_SEQ_LOCKED == 0)
            .unwrap_or_else(|| panic!("hreg pool exhausted in sequence {:?}", self.seq_name));

        self.drop_binding(hreg);
        if ppc_reg >= 0 {
            self.vreg[hreg as usize] = ppc_reg;
            self.ppc_map[ppc_reg as usize] = hreg as i32;
        }
        self.touch(hreg);
        self.flags[hreg as usize] |= FLAG_SEQ_LOCKED;
        hreg
    }

    /// Reserve a specific host register (instructions with fixed
    /// operand registers, e.g. DIV/MUL on A:D or shift counts in C).
    /// Whatever it cached is evicted.
    pub fn alloc_forced(&mut self, hreg: u8) {
        self.drop_binding(hreg);
        self.touch(hreg);
        self.flags[hreg as usize] |= FLAG_SEQ_LOCKED;
    }

    /// The fixed temp register; contents are undefined across sequence
    /// boundaries.
    pub fn tmp_hreg(&self) -> u8 {
        self.tmp
    }

    /// Drop any guest binding cached in `hreg` (the emitted code is
    /// about to clobber it).
    pub fn invalidate(&mut self, hreg: u8) {
        self.drop_binding(hreg);
    }

    /// Guest GPR currently cached in `hreg`, if any.
    pub fn cached_gpr(&self, hreg: u8) -> Option<u32> {
        let v = self.vreg[hreg as usize];
        (v >= 0).then_some(v as u32)
    }

    /// Host register caching `ppc_reg`, if any.
    pub fn cached_hreg(&self, ppc_reg: u32) -> Option<u8> {
        let h = self.ppc_map[ppc_reg as usize];
        (h >= 0).then_some(h as u8)
    }

    /// Check that the two tables are mutual inverses on bound entries.
    pub fn check_consistency(&self) -> bool {
        for h in 0..HREG_NR {
            let v = self.vreg[h];
            if v >= 0 && self.ppc_map[v as usize] != h as i32 {
                return false;
            }
        }
        for (v, &h) in self.ppc_map.iter().enumerate() {
            if h >= 0 && self.vreg[h as usize] != v as i32 {
                return false;
            }
        }
        true
    }
}
