use rand::{prelude::random, Rng};

use std::collections::{BTreeMap, BTreeSet};

use super::*;
use crate::types::Empty;

fn collect<V: Clone>(t: &Tree<V>) -> Vec<(Vec<u8>, V)> {
    let txn = t.txn(false);
    let mut c = txn.cursor();
    let mut out = vec![];
    let mut ok = c.first();
    while ok {
        if let (Some(key), Some(value)) = (c.key(), c.value()) {
            out.push((key.to_vec(), value.clone()));
        }
        ok = c.next();
    }
    out
}

fn id_set(keys: &[u64]) -> Tree<Empty> {
    let mut txn = Tree::new().txn(true);
    for k in keys.iter() {
        txn.set(&k.to_be_bytes(), Empty);
    }
    txn.commit()
}

#[test]
fn test_tree_crud() {
    let seed: u128 = random();
    println!("test_tree_crud seed:{}", seed);
    let mut rng = crate::util::small_rng_from_seed(seed);

    let mut tree: Tree<u64> = Tree::new();
    let mut model: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

    for _batch in 0..20 {
        let mut txn = tree.txn(true);
        for _ in 0..1000 {
            let key = (rng.gen::<u16>() % 4096).to_be_bytes();
            if rng.gen::<u8>() % 4 == 0 {
                let a = txn.delete(&key);
                let b = model.remove(&key[..]);
                assert_eq!(a, b);
            } else {
                let value = rng.gen::<u64>();
                let a = txn.set(&key, value);
                let b = model.insert(key.to_vec(), value);
                assert_eq!(a, b);
            }
        }
        tree = txn.commit();
        tree.validate().unwrap();
        assert_eq!(tree.len(), model.len());
    }

    let want: Vec<(Vec<u8>, u64)> = model.iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(collect(&tree), want);

    // strictly ascending enumeration, no duplicates.
    let keys: Vec<Vec<u8>> = collect(&tree).into_iter().map(|(k, _)| k).collect();
    for w in keys.windows(2) {
        assert!(w[0] < w[1]);
    }
}

#[test]
fn test_tree_persistence() {
    let seed: u128 = random();
    println!("test_tree_persistence seed:{}", seed);
    let mut rng = crate::util::small_rng_from_seed(seed);

    let mut keys: Vec<u64> = (0..1000).collect();
    for i in (1..keys.len()).rev() {
        keys.swap(i, (rng.gen::<u64>() % (i as u64 + 1)) as usize);
    }

    let t1 = {
        let mut txn = Tree::new().txn(true);
        for k in keys.iter() {
            txn.set(&k.to_be_bytes(), *k);
        }
        txn.commit()
    };
    assert_eq!(t1.len(), 1000);

    let t2 = {
        let mut txn = t1.txn(true);
        for k in 0..500_u64 {
            txn.delete(&k.to_be_bytes());
        }
        txn.commit()
    };

    // the old snapshot still enumerates all thousand keys.
    t1.validate().unwrap();
    t2.validate().unwrap();
    assert_eq!(t1.len(), 1000);
    assert_eq!(t2.len(), 500);
    assert_eq!(collect(&t1).len(), 1000);

    let remaining: Vec<u64> = collect(&t2)
        .into_iter()
        .map(|(k, _)| {
            let mut buf = [0_u8; 8];
            buf.copy_from_slice(&k);
            u64::from_be_bytes(buf)
        })
        .collect();
    assert_eq!(remaining, (500..1000).collect::<Vec<u64>>());

    for k in 0..1000_u64 {
        assert_eq!(t1.get(&k.to_be_bytes()), Some(&k));
    }
}

#[test]
fn test_tree_intersect() {
    let seed: u128 = random();
    println!("test_tree_intersect seed:{}", seed);
    let mut rng = crate::util::small_rng_from_seed(seed);

    // empty operands
    let empty: Tree<Empty> = Tree::new();
    let some = id_set(&[1, 2, 3]);
    assert_eq!(empty.intersect(&some).len(), 0);
    assert_eq!(some.intersect(&empty).len(), 0);
    assert_eq!(some.intersect_galloping(&empty).len(), 0);

    // randomized, both algorithms against a reference model.
    for _ in 0..20 {
        let a: Vec<u64> = (0..rng.gen::<u64>() % 500).map(|_| rng.gen::<u64>() % 1000).collect();
        let b: Vec<u64> = (0..rng.gen::<u64>() % 500).map(|_| rng.gen::<u64>() % 1000).collect();

        let sa: BTreeSet<u64> = a.iter().cloned().collect();
        let sb: BTreeSet<u64> = b.iter().cloned().collect();
        let want: Vec<Vec<u8>> =
            sa.intersection(&sb).map(|k| k.to_be_bytes().to_vec()).collect();

        let (ta, tb) = (id_set(&a), id_set(&b));
        let simple: Vec<Vec<u8>> =
            collect(&ta.intersect(&tb)).into_iter().map(|(k, _)| k).collect();
        let gallop: Vec<Vec<u8>> =
            collect(&ta.intersect_galloping(&tb)).into_iter().map(|(k, _)| k).collect();

        assert_eq!(simple, want);
        assert_eq!(gallop, want);
    }
}

#[test]
fn test_tree_intersect_skewed() {
    let seed: u128 = random();
    println!("test_tree_intersect_skewed seed:{}", seed);
    let mut rng = crate::util::small_rng_from_seed(seed);

    // tiny set against a big one, the galloping sweet spot.
    let big: Vec<u64> = (0..10_000).collect();
    let small: Vec<u64> = (0..20).map(|_| rng.gen::<u64>() % 20_000).collect();

    let want: Vec<Vec<u8>> = {
        let s: BTreeSet<u64> = small.iter().cloned().filter(|k| *k < 10_000).collect();
        s.iter().map(|k| k.to_be_bytes().to_vec()).collect()
    };

    let (tb, ts) = (id_set(&big), id_set(&small));
    for t in [ts.intersect_galloping(&tb), tb.intersect_galloping(&ts)].iter() {
        let got: Vec<Vec<u8>> = collect(t).into_iter().map(|(k, _)| k).collect();
        assert_eq!(got, want);
    }
}

#[test]
fn test_tree_union() {
    let a = id_set(&[1, 2]);
    let b = id_set(&[2, 3]);
    let empty: Tree<Empty> = Tree::new();

    assert_eq!(collect(&empty.union(&empty)).len(), 0);
    assert_eq!(collect(&empty.union(&a)).len(), 2);
    assert_eq!(collect(&a.union(&empty)).len(), 2);

    let u = a.union(&b);
    u.validate().unwrap();
    let got: Vec<Vec<u8>> = collect(&u).into_iter().map(|(k, _)| k).collect();
    let want: Vec<Vec<u8>> = [1_u64, 2, 3].iter().map(|k| k.to_be_bytes().to_vec()).collect();
    assert_eq!(got, want);

    // on collision the right-hand entry wins.
    let a = {
        let mut txn = Tree::new().txn(true);
        txn.set(b"k", 1_u64);
        txn.commit()
    };
    let b = {
        let mut txn = Tree::new().txn(true);
        txn.set(b"k", 2_u64);
        txn.commit()
    };
    assert_eq!(a.union(&b).get(b"k"), Some(&2));
}

#[test]
fn test_tree_read_txn_ignores_writes() {
    let t = id_set(&[1, 2, 3]);
    let mut txn = t.txn(false);
    assert_eq!(txn.set(&9_u64.to_be_bytes(), Empty), None);
    assert_eq!(txn.delete(&1_u64.to_be_bytes()), None);
    assert_eq!(txn.commit().len(), 3);
}

#[test]
fn test_load_tree() {
    let seed: u128 = random();
    println!("test_load_tree seed:{}", seed);

    let tree = load_tree(seed, 10_000, 2000, 4096);
    tree.validate().unwrap();

    let keys: Vec<Vec<u8>> = collect(&tree).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys.len(), tree.len());
    for w in keys.windows(2) {
        assert!(w[0] < w[1]);
    }
}
