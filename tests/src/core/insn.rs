use ppcjit_core::insn::{bits, cr_bit, cr_field, rotate_mask, sign_extend};

#[test]
fn bits_extracts_inclusive_ranges() {
    let w = 0x7C65_2214; // add r3,r5,r4
    assert_eq!(bits(w, 21, 25), 3);
    assert_eq!(bits(w, 16, 20), 5);
    assert_eq!(bits(w, 11, 15), 4);
    assert_eq!(bits(w, 0, 0), 0);
    assert_eq!(bits(0xFFFF_FFFF, 0, 31), 0xFFFF_FFFF);
}

#[test]
fn sign_extend_matches_width() {
    assert_eq!(sign_extend(0x8000, 16), 0xFFFF_8000);
    assert_eq!(sign_extend(0x7FFF, 16), 0x0000_7FFF);
    assert_eq!(sign_extend(0x0002_0000, 18), 0xFFFE_0000);
    assert_eq!(sign_extend(5, 16), 5);
}

#[test]
fn rotate_mask_plain_ranges() {
    assert_eq!(rotate_mask(0, 31), 0xFFFF_FFFF);
    assert_eq!(rotate_mask(1, 31), 0x7FFF_FFFF);
    assert_eq!(rotate_mask(16, 31), 0x0000_FFFF);
    assert_eq!(rotate_mask(0, 0), 0x8000_0000);
    assert_eq!(rotate_mask(31, 31), 0x0000_0001);
}

#[test]
fn rotate_mask_wraparound() {
    // ME < MB selects everything except the inner gap.
    assert_eq!(rotate_mask(5, 3), !0x0800_0000);
    assert_eq!(rotate_mask(31, 0), 0x8000_0001);
}

#[test]
fn cr_bit_numbering_is_msb_first() {
    // CR bit 0 is the LT bit of field 0 (value 8).
    assert_eq!(cr_field(0), 0);
    assert_eq!(cr_bit(0), 3);
    assert_eq!(cr_bit(1), 2);
    assert_eq!(cr_bit(2), 1);
    assert_eq!(cr_bit(3), 0);
    // cr1.EQ
    assert_eq!(cr_field(6), 1);
    assert_eq!(cr_bit(6), 1);
}
