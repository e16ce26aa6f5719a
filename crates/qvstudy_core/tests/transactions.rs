//! Isolation and concurrency tests.

use proptest::prelude::*;
use qvstudy_core::{Config, CoreError, Database};
use qvstudy_storage::InMemoryBackend;
use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn reader_snapshot_is_stable_across_commits() {
    let db = Database::open_in_memory().unwrap();
    db.update(|txn| {
        txn.create_bucket(b"b")?.put(b"k", b"v1")?;
        Ok::<_, CoreError>(())
    })
    .unwrap();

    let reader = db.begin_read();
    db.update(|txn| {
        let mut b = txn.bucket_mut(b"b").unwrap();
        b.put(b"k", b"v2")?;
        b.put(b"new", b"x")?;
        Ok::<_, CoreError>(())
    })
    .unwrap();

    let old = reader.bucket(b"b").unwrap();
    assert_eq!(old.get(b"k"), Some(&b"v1"[..]));
    assert_eq!(old.get(b"new"), None);
    assert_eq!(old.len(), 1);

    let fresh = db.begin_read();
    assert_eq!(fresh.bucket(b"b").unwrap().get(b"k"), Some(&b"v2"[..]));
    assert!(fresh.snapshot_seq() > reader.snapshot_seq());
}

#[test]
fn writer_sees_its_own_changes_before_commit() {
    let db = Database::open_in_memory().unwrap();
    let mut txn = db.begin_write();
    txn.create_bucket(b"b").unwrap().put(b"k", b"v").unwrap();
    assert_eq!(txn.bucket(b"b").unwrap().get(b"k"), Some(&b"v"[..]));
    assert!(db.begin_read().bucket(b"b").is_none());
    txn.commit().unwrap();
    assert!(db.begin_read().bucket(b"b").is_some());
}

#[test]
fn error_inside_update_discards_every_write() {
    let db = Database::open_in_memory().unwrap();
    db.update(|txn| {
        txn.create_bucket(b"b")?.put(b"a", b"1")?;
        Ok::<_, CoreError>(())
    })
    .unwrap();

    let result = db.update(|txn| {
        let mut b = txn.bucket_mut(b"b").unwrap();
        b.put(b"a", b"2")?;
        b.create_bucket(b"child")?;
        // Fails: "child" is a bucket.
        b.put(b"child", b"x")?;
        Ok::<_, CoreError>(())
    });
    assert!(matches!(result, Err(CoreError::IncompatibleValue { .. })));

    let txn = db.begin_read();
    let b = txn.bucket(b"b").unwrap();
    assert_eq!(b.get(b"a"), Some(&b"1"[..]));
    assert!(b.bucket(b"child").is_none());
}

#[test]
fn concurrent_increments_are_serialized() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 25;

    let db = Arc::new(Database::open_in_memory().unwrap());
    db.update(|txn| {
        txn.create_bucket(b"counter")?.put(b"n", &0u64.to_le_bytes())?;
        Ok::<_, CoreError>(())
    })
    .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ROUNDS {
                    db.update(|txn| {
                        let mut counter = txn.bucket_mut(b"counter").unwrap();
                        let current = u64::from_le_bytes(
                            counter.get(b"n").unwrap().try_into().unwrap(),
                        );
                        counter.put(b"n", &(current + 1).to_le_bytes())?;
                        Ok::<_, CoreError>(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let txn = db.begin_read();
    let n = u64::from_le_bytes(
        txn.bucket(b"counter")
            .unwrap()
            .get(b"n")
            .unwrap()
            .try_into()
            .unwrap(),
    );
    assert_eq!(n, (THREADS * ROUNDS) as u64);
    assert_eq!(db.committed_seq().as_u64(), (THREADS * ROUNDS + 1) as u64);
}

#[test]
fn readers_never_observe_partial_transactions() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.update(|txn| {
        let mut b = txn.create_bucket(b"pair")?;
        b.put(b"left", b"0")?;
        b.put(b"right", b"0")?;
        Ok::<_, CoreError>(())
    })
    .unwrap();

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for i in 1..200u32 {
                let value = i.to_string();
                db.update(|txn| {
                    let mut b = txn.bucket_mut(b"pair").unwrap();
                    b.put(b"left", value.as_bytes())?;
                    b.put(b"right", value.as_bytes())?;
                    Ok::<_, CoreError>(())
                })
                .unwrap();
            }
        })
    };

    for _ in 0..500 {
        let txn = db.begin_read();
        let pair = txn.bucket(b"pair").unwrap();
        assert_eq!(pair.get(b"left"), pair.get(b"right"));
    }
    writer.join().unwrap();
}

#[derive(Debug, Clone)]
enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = prop::collection::vec(0u8..4, 1..3);
    prop_oneof![
        (key.clone(), prop::collection::vec(any::<u8>(), 0..8)).prop_map(|(k, v)| Op::Put(k, v)),
        key.prop_map(Op::Delete),
    ]
}

proptest! {
    #[test]
    fn bucket_matches_model_and_survives_reopen(
        batches in prop::collection::vec(prop::collection::vec(op_strategy(), 1..6), 1..6)
    ) {
        let backend = InMemoryBackend::new();
        let mut model = BTreeMap::new();

        {
            let db = Database::open_with_backend(Config::default(), Box::new(backend.clone())).unwrap();
            for batch in &batches {
                db.update(|txn| {
                    let mut b = txn.create_bucket_if_not_exists(b"data")?;
                    for op in batch {
                        match op {
                            Op::Put(k, v) => b.put(k, v)?,
                            Op::Delete(k) => b.delete(k)?,
                        }
                    }
                    Ok::<_, CoreError>(())
                }).unwrap();
                for op in batch {
                    match op {
                        Op::Put(k, v) => { model.insert(k.clone(), v.clone()); }
                        Op::Delete(k) => { model.remove(k); }
                    }
                }
            }
        }

        let db = Database::open_with_backend(Config::default(), Box::new(backend)).unwrap();
        let txn = db.begin_read();
        let data = txn.bucket(b"data").unwrap();
        let stored: Vec<(Vec<u8>, Vec<u8>)> =
            data.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = model.into_iter().collect();
        prop_assert_eq!(stored, expected);
    }
}
