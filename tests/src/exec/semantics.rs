//! Per-opcode semantic checks against reference computations,
//! exercised through compiled pages. Pages are compiled once and
//! re-entered with fresh register state for each vector.

use super::*;
use ppcjit_exec::ExitReason;

/// Build a one-instruction page `insn ; blr` and return a closure that
/// runs it with the given entry state.
fn single_insn_bed(insn: u32) -> TestBed {
    let mut bed = TestBed::new();
    bed.write_insns(0x1000, &[insn, blr()]);
    bed.cpu.lr = 0x2000;
    bed
}

fn run_block(bed: &mut TestBed) {
    bed.cpu.ia = 0x1000;
    assert_eq!(bed.step(), ExitReason::Continue);
    assert_eq!(bed.cpu.ia, 0x2000);
}

const EDGE_VECTORS: &[(u32, u32)] = &[
    (0, 0),
    (0, 1),
    (1, 0xFFFF_FFFF),
    (0xFFFF_FFFF, 0xFFFF_FFFF),
    (0x8000_0000, 0x8000_0000),
    (0x7FFF_FFFF, 1),
    (0x1234_5678, 0x9ABC_DEF0),
];

#[test]
fn addc_carry_matrix() {
    let mut bed = single_insn_bed(addc(3, 4, 5));
    for &(a, b) in EDGE_VECTORS {
        bed.cpu.gpr[4] = a;
        bed.cpu.gpr[5] = b;
        run_block(&mut bed);

        let sum = a as u64 + b as u64;
        assert_eq!(bed.cpu.gpr[3], sum as u32, "addc {a:#x}+{b:#x}");
        assert_eq!(bed.cpu.xer_ca, (sum >> 32) as u32, "carry {a:#x}+{b:#x}");
    }
}

#[test]
fn adde_consumes_and_produces_carry() {
    let mut bed = single_insn_bed(adde(3, 4, 5));
    for &(a, b) in EDGE_VECTORS {
        for ca in [0u32, 1] {
            bed.cpu.gpr[4] = a;
            bed.cpu.gpr[5] = b;
            bed.cpu.xer_ca = ca;
            run_block(&mut bed);

            let sum = a as u64 + b as u64 + ca as u64;
            assert_eq!(bed.cpu.gpr[3], sum as u32, "adde {a:#x}+{b:#x}+{ca}");
            assert_eq!(bed.cpu.xer_ca, (sum >> 32) as u32);
        }
    }
}

#[test]
fn addze_adds_only_the_carry() {
    let mut bed = single_insn_bed(addze(3, 4));
    for &(a, ca) in &[(0u32, 0u32), (0, 1), (0xFFFF_FFFF, 1), (0xFFFF_FFFF, 0)] {
        bed.cpu.gpr[4] = a;
        bed.cpu.xer_ca = ca;
        run_block(&mut bed);

        let sum = a as u64 + ca as u64;
        assert_eq!(bed.cpu.gpr[3], sum as u32);
        assert_eq!(bed.cpu.xer_ca, (sum >> 32) as u32);
    }
}

#[test]
fn subfc_matches_the_complement_form() {
    let mut bed = single_insn_bed(subfc(3, 4, 5));
    for &(a, b) in EDGE_VECTORS {
        bed.cpu.gpr[4] = a;
        bed.cpu.gpr[5] = b;
        run_block(&mut bed);

        let total = (!a) as u64 + 1 + b as u64;
        assert_eq!(bed.cpu.gpr[3], total as u32, "subfc ~{a:#x}+1+{b:#x}");
        assert_eq!(bed.cpu.xer_ca, (total >> 32) as u32);
    }
}

#[test]
fn subfe_consumes_the_carry() {
    let mut bed = single_insn_bed(subfe(3, 4, 5));
    for &(a, b) in EDGE_VECTORS {
        for ca in [0u32, 1] {
            bed.cpu.gpr[4] = a;
            bed.cpu.gpr[5] = b;
            bed.cpu.xer_ca = ca;
            run_block(&mut bed);

            let total = (!a) as u64 + ca as u64 + b as u64;
            assert_eq!(bed.cpu.gpr[3], total as u32);
            assert_eq!(bed.cpu.xer_ca, (total >> 32) as u32);
        }
    }
}

#[test]
fn subfic_with_immediate() {
    let mut bed = single_insn_bed(subfic(3, 4, 100));
    for &a in &[0u32, 1, 100, 101, 0xFFFF_FFFF] {
        bed.cpu.gpr[4] = a;
        run_block(&mut bed);

        let total = (!a) as u64 + 1 + 100;
        assert_eq!(bed.cpu.gpr[3], total as u32);
        assert_eq!(bed.cpu.xer_ca, ((total >> 32) & 1) as u32);
    }
}

#[test]
fn srawi_sets_carry_for_lost_bits() {
    let mut bed = single_insn_bed(srawi(3, 4, 1));
    let cases: &[(u32, u32, u32)] = &[
        // (source, result, ca)
        (0x8000_0001, 0xC000_0000, 1),
        (0x8000_0000, 0xC000_0000, 0),
        (0x0000_0003, 0x0000_0001, 0),
        (0xFFFF_FFFF, 0xFFFF_FFFF, 1),
        (0x0000_0000, 0x0000_0000, 0),
    ];
    for &(src, result, ca) in cases {
        bed.cpu.gpr[4] = src;
        run_block(&mut bed);
        assert_eq!(bed.cpu.gpr[3], result, "srawi {src:#x}");
        assert_eq!(bed.cpu.xer_ca, ca, "srawi ca {src:#x}");
    }
}

#[test]
fn slw_zeroes_on_large_counts() {
    let mut bed = single_insn_bed(slw(3, 4, 5));
    let cases: &[(u32, u32, u32)] = &[
        (1, 0, 1),
        (1, 4, 16),
        (0x4000_0000, 1, 0x8000_0000),
        (0xFFFF_FFFF, 31, 0x8000_0000),
        (1, 32, 0),
        (1, 33, 0),
        (0xFFFF_FFFF, 63, 0),
    ];
    for &(val, count, expect) in cases {
        bed.cpu.gpr[4] = val;
        bed.cpu.gpr[5] = count;
        run_block(&mut bed);
        assert_eq!(bed.cpu.gpr[3], expect, "slw {val:#x} << {count}");
    }
}

#[test]
fn srw_zeroes_on_large_counts() {
    let mut bed = single_insn_bed(srw(3, 4, 5));
    let cases: &[(u32, u32, u32)] = &[
        (0x8000_0000, 31, 1),
        (0x8000_0000, 1, 0x4000_0000),
        (0xFFFF_FFFF, 32, 0),
        (1, 0, 1),
    ];
    for &(val, count, expect) in cases {
        bed.cpu.gpr[4] = val;
        bed.cpu.gpr[5] = count;
        run_block(&mut bed);
        assert_eq!(bed.cpu.gpr[3], expect, "srw {val:#x} >> {count}");
    }
}

#[test]
fn cmpi_signed_cr_bits() {
    let mut bed = single_insn_bed(cmpi(0, 3, 5));
    // (value, expected field: LT=8 GT=4 EQ=2)
    for &(v, field) in &[(5u32, 2u32), (6, 4), (4, 8), (0xFFFF_FFFF, 8), (0x7FFF_FFFF, 4)] {
        bed.cpu.gpr[3] = v;
        run_block(&mut bed);
        assert_eq!(bed.cpu.cr_fields[0], field, "cmpi {v:#x}");
    }
}

#[test]
fn cmpli_unsigned_cr_bits() {
    let mut bed = single_insn_bed(cmpli(2, 3, 5));
    for &(v, field) in &[(5u32, 2u32), (6, 4), (4, 8), (0xFFFF_FFFF, 4), (0, 8)] {
        bed.cpu.gpr[3] = v;
        run_block(&mut bed);
        assert_eq!(bed.cpu.cr_fields[2], field, "cmpli {v:#x}");
    }
}

#[test]
fn mulli_mullw_mulhwu_divwu() {
    let mut bed = single_insn_bed(mulli(3, 4, 0xFFFF)); // * -1
    bed.cpu.gpr[4] = 7;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], (-7i32) as u32);

    let mut bed = single_insn_bed(mullw(3, 4, 5));
    bed.cpu.gpr[4] = 0x1234_5678;
    bed.cpu.gpr[5] = 1000;
    run_block(&mut bed);
    assert_eq!(
        bed.cpu.gpr[3],
        0x1234_5678u32.wrapping_mul(1000)
    );

    let mut bed = single_insn_bed(mulhwu(3, 4, 5));
    bed.cpu.gpr[4] = 0x8000_0000;
    bed.cpu.gpr[5] = 4;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 2);

    let mut bed = single_insn_bed(divwu(3, 4, 5));
    bed.cpu.gpr[4] = 100;
    bed.cpu.gpr[5] = 7;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 14);
}

#[test]
fn rlwimi_inserts_under_mask() {
    let mut bed = single_insn_bed(rlwimi(3, 4, 0, 16, 31));
    bed.cpu.gpr[3] = 0xFFFF_0000;
    bed.cpu.gpr[4] = 0x0000_AAAA;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0xFFFF_AAAA);
}

#[test]
fn logic_and_rc_updates_cr0() {
    let mut bed = TestBed::new();
    // and. r3, r4, r5
    bed.write_insns(0x1000, &[and(3, 4, 5) | 1, blr()]);
    bed.cpu.lr = 0x2000;

    bed.cpu.gpr[4] = 0xF0F0;
    bed.cpu.gpr[5] = 0x0F0F;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0);
    assert_eq!(bed.cpu.cr_fields[0], 0x2, "zero result sets EQ");

    bed.cpu.gpr[4] = 0xFFFF_FFFF;
    bed.cpu.gpr[5] = 0x8000_0000;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0x8000_0000);
    assert_eq!(bed.cpu.cr_fields[0], 0x8, "negative result sets LT");
}

#[test]
fn ori_is_a_plain_or() {
    let mut bed = single_insn_bed(ori(3, 4, 0x00FF));
    bed.cpu.gpr[4] = 0xAB00;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0xABFF);
}

#[test]
fn cr_field_transport_round_trips() {
    let mut bed = TestBed::new();
    bed.write_insns(0x1000, &[mfcr(3), blr()]);
    bed.cpu.lr = 0x2000;
    bed.cpu.cr_fields = [0x8, 0x4, 0x2, 0x1, 0x8, 0x4, 0x2, 0x1];
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0x8421_8421);

    let mut bed = TestBed::new();
    bed.write_insns(0x1000, &[mtcrf(0xFF, 3), blr()]);
    bed.cpu.lr = 0x2000;
    bed.cpu.gpr[3] = 0x8421_8421;
    run_block(&mut bed);
    assert_eq!(bed.cpu.cr_fields, [0x8, 0x4, 0x2, 0x1, 0x8, 0x4, 0x2, 0x1]);
}

#[test]
fn cr_logical_and_xor() {
    // crand 4, 0, 1: cr1.LT = cr0.LT & cr0.GT
    let mut bed = single_insn_bed(crand(4, 0, 1));
    bed.cpu.cr_fields[0] = 0x8 | 0x4;
    bed.cpu.cr_fields[1] = 0;
    run_block(&mut bed);
    assert_eq!(bed.cpu.cr_fields[1] & 0x8, 0x8);

    bed.cpu.cr_fields[0] = 0x8; // GT clear
    run_block(&mut bed);
    assert_eq!(bed.cpu.cr_fields[1] & 0x8, 0);

    // crxor 5, 0, 1 into cr1.GT
    let mut bed = single_insn_bed(crxor(5, 0, 1));
    bed.cpu.cr_fields[0] = 0x8;
    bed.cpu.cr_fields[1] = 0;
    run_block(&mut bed);
    assert_eq!(bed.cpu.cr_fields[1] & 0x4, 0x4);

    bed.cpu.cr_fields[0] = 0x8 | 0x4;
    bed.cpu.cr_fields[1] = 0;
    run_block(&mut bed);
    assert_eq!(bed.cpu.cr_fields[1] & 0x4, 0);
}

#[test]
fn mftbl_ticks_the_time_base() {
    // The guest reads the post-increment low word.
    let mut bed = single_insn_bed(mftbl(3));
    bed.cpu.tb = 100;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 150);
    assert_eq!(bed.cpu.tb, 150);

    // Low-word wraparound carries into the high word.
    bed.cpu.tb = 0xFFFF_FFF0;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0x22);
    assert_eq!(bed.cpu.tb, 0x1_0000_0022);
}

#[test]
fn link_and_count_register_transport() {
    let mut bed = TestBed::new();
    // mtlr r3 ; mflr r4 ; blr
    bed.write_insns(0x1000, &[mtlr(3), mflr(4), blr()]);
    bed.cpu.ia = 0x1000;
    bed.cpu.gpr[3] = 0x2000;
    assert_eq!(bed.step(), ExitReason::Continue);
    assert_eq!(bed.cpu.gpr[4], 0x2000);
    assert_eq!(bed.cpu.ia, 0x2000);
}

#[test]
fn bctr_jumps_through_ctr() {
    let mut bed = TestBed::new();
    bed.write_insns(0x1000, &[mtctr(3), bctr()]);
    bed.cpu.ia = 0x1000;
    bed.cpu.gpr[3] = 0x3000;
    assert_eq!(bed.step(), ExitReason::Continue);
    assert_eq!(bed.cpu.ia, 0x3000);
}

#[test]
fn lbzu_updates_the_base_register() {
    let mut bed = TestBed::new();
    bed.write_insns(0x1000, &[lbzu(3, 4, 1), blr()]);
    bed.cpu.lr = 0x2000;
    bed.ram.bytes[0x4001] = 0xAB;

    bed.cpu.gpr[4] = 0x4000;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0xAB);
    assert_eq!(bed.cpu.gpr[4], 0x4001);
}

#[test]
fn lha_sign_extends() {
    let mut bed = TestBed::new();
    bed.write_insns(0x1000, &[lha(3, 4, 0), blr()]);
    bed.cpu.lr = 0x2000;
    bed.ram.bytes[0x4000] = 0x80;
    bed.ram.bytes[0x4001] = 0x01;

    bed.cpu.gpr[4] = 0x4000;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0xFFFF_8001);
}

#[test]
fn fast_path_store_honors_cow_flag() {
    let mut bed = TestBed::new();
    bed.write_insns(0x1000, &[stb(3, 4, 0), blr()]);
    bed.cpu.lr = 0x2000;
    // Map the page copy-on-write: the inline probe must divert to the
    // slow handler, which still performs the store.
    bed.map_dpage(0x4000, ppcjit_core::MtsFlags::COW.bits());

    bed.cpu.gpr[3] = 0x5A;
    bed.cpu.gpr[4] = 0x4000;
    run_block(&mut bed);
    assert_eq!(bed.ram.bytes[0x4000], 0x5A);
}

#[test]
fn fast_path_store_hits_writable_pages() {
    let mut bed = TestBed::new();
    bed.write_insns(0x1000, &[stw(3, 4, 4), blr()]);
    bed.cpu.lr = 0x2000;
    bed.map_dpage(0x4000, 0);

    bed.cpu.gpr[3] = 0x1122_3344;
    bed.cpu.gpr[4] = 0x4000;
    run_block(&mut bed);
    assert_eq!(bed.read_be32(0x4004), 0x1122_3344);
}

#[test]
fn extsb_sign_extends_bytes() {
    // extsb r3, r4 (Rc clear)
    let mut bed = single_insn_bed(0x7C00_0774 | 4 << 21 | 3 << 16);
    bed.cpu.gpr[4] = 0x0000_0080;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0xFFFF_FF80);

    bed.cpu.gpr[4] = 0x0000_007F;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0x7F);
}

#[test]
fn bdnz_loop_decrements_ctr() {
    let mut bed = TestBed::new();
    // li r3,0 ; mtctr r4 ; loop: addi r3,r3,1 ; bdnz loop ; blr
    bed.write_insns(
        0x1000,
        &[
            li(3, 0),
            mtctr(4),
            addi(3, 3, 1),
            bc(16, 0, 0xFFFC), // bdnz -4
            blr(),
        ],
    );
    bed.cpu.ia = 0x1000;
    bed.cpu.gpr[4] = 10;
    bed.cpu.lr = 0x2000;

    bed.run_until(0x2000, 4);
    assert_eq!(bed.cpu.gpr[3], 10);
    assert_eq!(bed.cpu.ctr, 0);
}

#[test]
fn bdnz_taken_and_exhausted_paths() {
    let mut bed = TestBed::new();
    bed.write_insns(
        0x1000,
        &[mtctr(4), bc(16, 0, 8), li(3, 1), li(3, 2), blr()],
    );
    bed.cpu.lr = 0x2000;

    // CTR = 1: decrement reaches zero, fall through both stores.
    bed.cpu.ia = 0x1000;
    bed.cpu.gpr[3] = 0;
    bed.cpu.gpr[4] = 1;
    bed.run_until(0x2000, 4);
    assert_eq!(bed.cpu.gpr[3], 2);
    assert_eq!(bed.cpu.ctr, 0);

    // CTR = 5: branch taken over the first store.
    bed.cpu.ia = 0x1000;
    bed.cpu.gpr[3] = 0;
    bed.cpu.gpr[4] = 5;
    bed.run_until(0x2000, 4);
    assert_eq!(bed.cpu.gpr[3], 2);
    assert_eq!(bed.cpu.ctr, 4);
}

#[test]
fn mcrf_copies_a_field() {
    let mut bed = single_insn_bed(mcrf(3, 1));
    bed.cpu.cr_fields[1] = 0xA;
    bed.cpu.cr_fields[3] = 0x5;
    run_block(&mut bed);
    assert_eq!(bed.cpu.cr_fields[3], 0xA);
    assert_eq!(bed.cpu.cr_fields[1], 0xA);
}

#[test]
fn msr_and_segment_registers_read_back() {
    let mut bed = TestBed::new();
    bed.write_insns(0x1000, &[mfmsr(3), mfsr(4, 5), blr()]);
    bed.cpu.lr = 0x2000;
    bed.cpu.msr = 0x0000_8000;
    bed.cpu.sr[5] = 0x1234_5678;
    run_block(&mut bed);
    assert_eq!(bed.cpu.gpr[3], 0x0000_8000);
    assert_eq!(bed.cpu.gpr[4], 0x1234_5678);
}
