use ppcjit_core::hreg::HregMap;

const AVAIL: [u8; 4] = [6, 0, 1, 2];
const TMP: u8 = 3;

fn map() -> HregMap {
    HregMap::new(&AVAIL, TMP)
}

#[test]
fn alloc_reuses_existing_binding() {
    let mut m = map();
    m.start_seq("a");
    let h1 = m.alloc(5);
    m.close_seq();

    m.start_seq("b");
    let h2 = m.alloc(5);
    m.close_seq();

    assert_eq!(h1, h2);
    assert!(m.check_consistency());
}

#[test]
fn maps_stay_mutual_inverses() {
    let mut m = map();
    m.start_seq("seq");
    for r in [3, 7, 12, 30] {
        m.alloc(r);
        assert!(m.check_consistency());
    }
    m.close_seq();
}

#[test]
fn lru_binding_is_evicted_first() {
    let mut m = map();
    m.start_seq("fill");
    let h3 = m.alloc(3);
    m.alloc(4);
    m.alloc(5);
    m.alloc(6);
    m.close_seq();

    // All four host registers are bound; r3 is now least recent.
    m.start_seq("evict");
    let h7 = m.alloc(7);
    m.close_seq();

    assert_eq!(h7, h3);
    assert_eq!(m.cached_hreg(3), None);
    assert_eq!(m.cached_hreg(7), Some(h7));
    assert!(m.check_consistency());
}

#[test]
fn sequence_locks_protect_live_registers() {
    let mut m = map();
    m.start_seq("wide");
    let a = m.alloc(1);
    let b = m.alloc(2);
    let c = m.alloc(3);
    // The fourth allocation must not steal any of the three above.
    let d = m.alloc(4);
    assert!(![a, b, c].contains(&d));
    m.close_seq();
}

#[test]
fn forced_alloc_evicts_the_binding() {
    let mut m = map();
    m.start_seq("a");
    let h = m.alloc(9);
    m.close_seq();

    m.start_seq("forced");
    m.alloc_forced(h);
    assert_eq!(m.cached_gpr(h), None);
    assert_eq!(m.cached_hreg(9), None);
    m.close_seq();
    assert!(m.check_consistency());
}

#[test]
fn scratch_request_leaves_no_binding() {
    let mut m = map();
    m.start_seq("scratch");
    let h = m.alloc(-1);
    assert_eq!(m.cached_gpr(h), None);
    m.close_seq();
}

#[test]
fn tmp_is_outside_the_pool() {
    let mut m = map();
    assert_eq!(m.tmp_hreg(), TMP);
    m.start_seq("all");
    for r in 0..4 {
        assert_ne!(m.alloc(r), TMP);
    }
    m.close_seq();
}

#[test]
fn invalidate_drops_the_guest_binding() {
    let mut m = map();
    m.start_seq("a");
    let h = m.alloc(11);
    m.close_seq();
    m.invalidate(h);
    assert_eq!(m.cached_hreg(11), None);
    assert!(m.check_consistency());
}
