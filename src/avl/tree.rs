use std::{cmp::Ordering, sync::Arc};

use crate::avl::cursor::Cursor;
use crate::avl::node::{self, Node};
use crate::{err_at, Result};

/// Persistent ordered map from byte-string keys to values.
///
/// A tree value is an immutable snapshot. Mutations go through a
/// [TreeTxn] obtained from [Tree::txn]; committing the txn produces a
/// new tree that shares every untouched subtree with this one. Clones
/// are cheap and old snapshots stay valid for as long as somebody
/// holds them.
#[derive(Clone)]
pub struct Tree<V> {
    root: Option<Arc<Node<V>>>,
    n: usize,
}

impl<V> Default for Tree<V> {
    fn default() -> Tree<V> {
        Tree::new()
    }
}

impl<V> Tree<V> {
    /// Create an empty tree.
    pub fn new() -> Tree<V> {
        Tree { root: None, n: 0 }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Whether the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub(crate) fn first_node(&self) -> Option<Arc<Node<V>>> {
        node::min(self.root.as_ref())
    }

    pub(crate) fn last_node(&self) -> Option<Arc<Node<V>>> {
        node::max(self.root.as_ref())
    }

    pub(crate) fn next_node(&self, key: &[u8]) -> Option<Arc<Node<V>>> {
        node::successor(self.root.as_ref(), key)
    }

    pub(crate) fn prev_node(&self, key: &[u8]) -> Option<Arc<Node<V>>> {
        node::predecessor(self.root.as_ref(), key)
    }

    /// Lookup `key`.
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        node::get(self.root.as_deref(), key)
    }

    /// Verify the tree invariants: strict key ascent, height
    /// bookkeeping, per-node balance factor within {-1, 0, 1} and the
    /// maintained entry count.
    pub fn validate(&self) -> Result<()> {
        let (_, n) = node::validate(self.root.as_deref())?;
        if n != self.n {
            return err_at!(Fatal, msg: "entry count {} != maintained {}", n, self.n);
        }
        Ok(())
    }
}

impl<V: Clone> Tree<V> {
    /// Open a transaction over this tree's root. Mutations through a
    /// read txn (`write` false) are ignored.
    pub fn txn(&self, write: bool) -> TreeTxn<V> {
        TreeTxn {
            root: self.root.clone(),
            n: self.n,
            write,
        }
    }

    /// Intersection of two trees by dual-cursor merge; values come
    /// from `self`. Output keys are strictly ascending.
    pub fn intersect(&self, other: &Tree<V>) -> Tree<V> {
        if self.root.is_none() || other.root.is_none() {
            return Tree::new();
        }
        let (t1, t2) = (self.txn(false), other.txn(false));
        let mut dst = Tree::new().txn(true);
        let (mut c1, mut c2) = (t1.cursor(), t2.cursor());
        let (mut ok1, mut ok2) = (c1.first(), c2.first());
        while ok1 && ok2 {
            let cmp = match (c1.key(), c2.key()) {
                (Some(k1), Some(k2)) => k1.cmp(k2),
                _ => break,
            };
            match cmp {
                Ordering::Equal => {
                    if let (Some(key), Some(value)) = (c1.key(), c1.value()) {
                        dst.set(key, value.clone());
                    }
                    ok1 = c1.next();
                    ok2 = c2.next();
                }
                Ordering::Less => ok1 = c1.next(),
                Ordering::Greater => ok2 = c2.next(),
            }
        }
        dst.commit()
    }

    /// Same result as [Tree::intersect], but the lagging cursor seeks
    /// straight to the leading cursor's key instead of stepping. Pays
    /// off when one tree is much smaller than the other.
    pub fn intersect_galloping(&self, other: &Tree<V>) -> Tree<V> {
        if self.root.is_none() || other.root.is_none() {
            return Tree::new();
        }
        let (t1, t2) = (self.txn(false), other.txn(false));
        let mut dst = Tree::new().txn(true);
        let (mut c1, mut c2) = (t1.cursor(), t2.cursor());
        let (mut ok1, mut ok2) = (c1.first(), c2.first());
        while ok1 && ok2 {
            let cmp = match (c1.key(), c2.key()) {
                (Some(k1), Some(k2)) => k1.cmp(k2),
                _ => break,
            };
            match cmp {
                Ordering::Equal => {
                    if let (Some(key), Some(value)) = (c1.key(), c1.value()) {
                        dst.set(key, value.clone());
                    }
                    ok1 = c1.next();
                    ok2 = c2.next();
                }
                Ordering::Less => {
                    // seek may land on a predecessor; the cursor must
                    // never move backward.
                    let low = match c1.key() {
                        Some(key) => key.to_vec(),
                        None => break,
                    };
                    let target = match c2.key() {
                        Some(key) => key.to_vec(),
                        None => break,
                    };
                    ok1 = c1.seek(&target);
                    let behind = ok1 && c1.key().map_or(false, |key| key <= low.as_slice());
                    if behind {
                        ok1 = c1.next();
                    }
                }
                Ordering::Greater => {
                    let low = match c2.key() {
                        Some(key) => key.to_vec(),
                        None => break,
                    };
                    let target = match c1.key() {
                        Some(key) => key.to_vec(),
                        None => break,
                    };
                    ok2 = c2.seek(&target);
                    let behind = ok2 && c2.key().map_or(false, |key| key <= low.as_slice());
                    if behind {
                        ok2 = c2.next();
                    }
                }
            }
        }
        dst.commit()
    }

    /// Union of two trees; on key collision the entry from `other`
    /// wins.
    pub fn union(&self, other: &Tree<V>) -> Tree<V> {
        if self.root.is_none() {
            return other.clone();
        }
        if other.root.is_none() {
            return self.clone();
        }
        let mut dst = self.txn(true);
        let t2 = other.txn(false);
        let mut c = t2.cursor();
        let mut ok = c.first();
        while ok {
            if let (Some(key), Some(value)) = (c.key(), c.value()) {
                dst.set(key, value.clone());
            }
            ok = c.next();
        }
        dst.commit()
    }
}

/// Staged mutations over a tree root.
///
/// `set` and `delete` rewire the staged root by path-copy; `commit`
/// snapshots it into a fresh [Tree], leaving the tree this txn was
/// opened from untouched. Reads and cursors are legal on both read and
/// write transactions.
pub struct TreeTxn<V> {
    root: Option<Arc<Node<V>>>,
    n: usize,
    write: bool,
}

impl<V> TreeTxn<V> {
    /// Number of entries under the staged root.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Whether the staged root holds no entries.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Whether this txn accepts mutations.
    pub fn is_write(&self) -> bool {
        self.write
    }

    pub(crate) fn as_root(&self) -> Option<&Arc<Node<V>>> {
        self.root.as_ref()
    }

    pub(crate) fn first_node(&self) -> Option<Arc<Node<V>>> {
        node::min(self.root.as_ref())
    }

    pub(crate) fn last_node(&self) -> Option<Arc<Node<V>>> {
        node::max(self.root.as_ref())
    }

    pub(crate) fn next_node(&self, key: &[u8]) -> Option<Arc<Node<V>>> {
        node::successor(self.root.as_ref(), key)
    }

    pub(crate) fn prev_node(&self, key: &[u8]) -> Option<Arc<Node<V>>> {
        node::predecessor(self.root.as_ref(), key)
    }
}

impl<V: Clone> TreeTxn<V> {
    /// Lookup `key` under the staged root.
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        node::get(self.root.as_deref(), key)
    }

    /// Insert or overwrite `key`, returning the replaced value.
    /// Ignored on read transactions.
    pub fn set(&mut self, key: &[u8], value: V) -> Option<V> {
        if !self.write {
            return None;
        }
        let key: Arc<[u8]> = Arc::from(key);
        let (root, old) = node::set(self.root.as_deref(), &key, value);
        self.root = Some(root);
        if old.is_none() {
            self.n += 1;
        }
        old
    }

    /// Remove `key`, returning the removed value; absent keys are a
    /// silent no-op. Ignored on read transactions.
    pub fn delete(&mut self, key: &[u8]) -> Option<V> {
        if !self.write {
            return None;
        }
        let (root, old) = node::remove(self.root.as_deref(), key);
        self.root = root;
        if old.is_some() {
            self.n -= 1;
        }
        old
    }

    /// Materialize the staged root into a fresh tree.
    pub fn commit(&self) -> Tree<V> {
        Tree {
            root: self.root.clone(),
            n: self.n,
        }
    }

    /// Positional cursor over the staged root.
    pub fn cursor(&self) -> Cursor<'_, V> {
        Cursor::new(self)
    }
}

#[cfg(test)]
pub(crate) fn load_tree(seed: u128, n_sets: usize, n_dels: usize, key_max: u64) -> Tree<u64> {
    use rand::Rng;

    let mut rng = crate::util::small_rng_from_seed(seed);
    let mut txn = Tree::new().txn(true);
    for _ in 0..n_sets {
        let key = (rng.gen::<u64>() % key_max).to_be_bytes();
        txn.set(&key, rng.gen::<u64>());
    }
    for _ in 0..n_dels {
        let key = (rng.gen::<u64>() % key_max).to_be_bytes();
        txn.delete(&key);
    }
    txn.commit()
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
