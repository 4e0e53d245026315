use ppcjit_core::op::{OpKind, OpPool, OP_BUF_SIZES, OP_INV};

#[test]
fn pool_get_resets_parameters() {
    let mut pool = OpPool::new();
    let mut op = pool.get(2, OpKind::InsnOutput);
    op.param = [1, 2, 3];
    op.name = "scratch";
    op.buf.extend_from_slice(&[0x90; 16]);
    pool.put(op);

    let op = pool.get(2, OpKind::LoadGpr);
    assert_eq!(op.kind, OpKind::LoadGpr);
    assert_eq!(op.param, [OP_INV; 3]);
    assert!(op.buf.is_empty());
    assert_eq!(op.size_index, 2);
}

#[test]
fn pool_buckets_do_not_mix() {
    let mut pool = OpPool::new();
    let a = pool.get(1, OpKind::InsnOutput);
    let b = pool.get(3, OpKind::InsnOutput);
    pool.put(a);
    pool.put(b);
    assert_eq!(pool.pooled(1), 1);
    assert_eq!(pool.pooled(3), 1);
    assert_eq!(pool.pooled(2), 0);

    let again = pool.get(1, OpKind::InsnOutput);
    assert_eq!(again.size_index, 1);
    assert_eq!(pool.pooled(1), 0);
}

#[test]
fn bucket_capacity_matches_nominal_size() {
    let mut pool = OpPool::new();
    for (i, &size) in OP_BUF_SIZES.iter().enumerate() {
        let op = pool.get(i, OpKind::InsnOutput);
        assert!(op.buf.capacity() >= size);
        assert!(!op.overflowed());
        pool.put(op);
    }
}

#[test]
fn overflow_detected_past_bucket_size() {
    let mut pool = OpPool::new();
    let mut op = pool.get(1, OpKind::InsnOutput);
    op.buf.resize(OP_BUF_SIZES[1], 0x90);
    assert!(!op.overflowed());
    op.buf.push(0x90);
    assert!(op.overflowed());
}

#[test]
fn free_list_recycles_a_chain() {
    let mut pool = OpPool::new();
    let ops: Vec<_> = (0..4).map(|_| pool.get(0, OpKind::EndOfBlock)).collect();
    pool.put_list(ops);
    assert_eq!(pool.pooled(0), 4);
}
