use ppcjit_core::hash::{ia_hash, phys_hash, IA_HASH_SIZE, PHYS_HASH_SIZE};

#[test]
fn ia_hash_stays_in_range() {
    for ia in [0u32, 0x1000, 0xFFF0_0000, 0xFFFF_FFFC, 0xDEAD_B000] {
        assert!((ia_hash(ia) as usize) < IA_HASH_SIZE);
    }
}

#[test]
fn phys_hash_stays_in_range() {
    for p in [0u32, 1, 0xF_FFFF, 0xFFFF_FFFF] {
        assert!((phys_hash(p) as usize) < PHYS_HASH_SIZE);
    }
}

#[test]
fn same_page_hashes_identically() {
    // Any address inside one page indexes the same bucket.
    assert_eq!(ia_hash(0x0040_1000), ia_hash(0x0040_1FFC));
    assert_eq!(ia_hash(0x0040_1000), ia_hash(0x0040_1234));
}

#[test]
fn neighbouring_pages_usually_differ() {
    let h0 = ia_hash(0x1000);
    let h1 = ia_hash(0x2000);
    let h2 = ia_hash(0x3000);
    assert!(h0 != h1 || h1 != h2);
}

#[test]
fn hashes_are_deterministic() {
    assert_eq!(ia_hash(0x1234_5000), ia_hash(0x1234_5000));
    assert_eq!(phys_hash(0x42), phys_hash(0x42));
}
