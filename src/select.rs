//! Module `select` implement the query builder and executor.
//!
//! Execution runs in phases: indexed predicates each produce an id-set
//! (a tree of encoded primary keys) by walking their index tree, the
//! id-sets are intersected into one candidate set, an optional
//! ordering index drives enumeration order, and user predicates are
//! tested against each candidate record as it is read from the
//! primary tree. Everything downstream of planning is lazy: [Rows]
//! pulls one record at a time.

use std::sync::Arc;

use crate::{
    avl::TreeTxn,
    db::Txn,
    err_at,
    field::{CmpOp, Cond, Field, IndexCond},
    table::IdSet,
    Result,
};

/// Direction of result enumeration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Dir {
    Asc,
    Desc,
}

// switch to galloping intersection when one candidate set is this many
// times bigger than the other.
const GALLOP_RATIO: usize = 8;

/// Query builder over one table within a transaction.
///
/// Collect conditions with [Lister::filter], optionally pick an
/// ordering field and a direction, then execute through one of
/// [page][Lister::page], [all][Lister::all], [one][Lister::one],
/// [count][Lister::count] or [rows][Lister::rows].
pub struct Lister<'t, 'd, V> {
    txn: &'t Txn<'d>,
    uid: u32,
    conds: Vec<Cond<V>>,
    order: Option<usize>,
    dir: Dir,
}

impl<'t, 'd, V> Lister<'t, 'd, V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(txn: &'t Txn<'d>, uid: u32) -> Lister<'t, 'd, V> {
        Lister {
            txn,
            uid,
            conds: vec![],
            order: None,
            dir: Dir::Asc,
        }
    }

    /// Add a condition; every condition must hold for a record to
    /// qualify.
    pub fn filter(mut self, cond: Cond<V>) -> Self {
        self.conds.push(cond);
        self
    }

    /// Enumerate results in the order of `field`'s index. Records
    /// sharing an index key enumerate in primary-key byte order.
    pub fn order_by<F>(mut self, field: &F) -> Self
    where
        F: Field<V>,
    {
        self.order = Some(field.slot());
        self
    }

    /// Ascending enumeration, the default.
    pub fn asc(mut self) -> Self {
        self.dir = Dir::Asc;
        self
    }

    /// Descending enumeration. Ties on the ordering key still
    /// enumerate in ascending primary-key order.
    pub fn desc(mut self) -> Self {
        self.dir = Dir::Desc;
        self
    }

    /// Up to `limit` qualifying records after skipping the first
    /// `offset`; `limit` 0 means unbounded.
    pub fn page(self, limit: usize, offset: usize) -> Result<Vec<V>> {
        let rows = self.rows()?;
        let out = if limit == 0 {
            rows.skip(offset).collect()
        } else {
            rows.skip(offset).take(limit).collect()
        };
        Ok(out)
    }

    /// Every qualifying record.
    pub fn all(self) -> Result<Vec<V>> {
        self.page(0, 0)
    }

    /// The first qualifying record, or
    /// [Error::KeyNotFound][crate::Error::KeyNotFound].
    pub fn one(self) -> Result<V> {
        match self.rows()?.next() {
            Some(v) => Ok(v),
            None => err_at!(KeyNotFound, msg: "no matching record"),
        }
    }

    /// Number of qualifying records, without materializing them.
    pub fn count(self) -> Result<usize> {
        let sel = self.plan()?;
        if sel.preds.is_empty() {
            let n = match sel.ids.as_ref() {
                Some(ids) => ids.len(),
                None => sel.primary.len(),
            };
            return Ok(n);
        }
        Ok(Rows::new(sel).count())
    }

    /// Lazy iterator over qualifying records, in query order.
    pub fn rows(self) -> Result<Rows<'t, V>> {
        Ok(Rows::new(self.plan()?))
    }

    fn plan(self) -> Result<Selection<'t, V>> {
        let Lister {
            txn,
            uid,
            conds,
            order,
            dir,
        } = self;

        let mut ids: Option<IdSet> = None;
        let mut preds = vec![];
        for cond in conds {
            match cond {
                Cond::User(f) => preds.push(f),
                Cond::Index(cond) => {
                    let set = scan_index(txn, uid, &cond)?;
                    ids = Some(match ids {
                        None => set,
                        Some(have) => intersect_ids(&have, &set),
                    });
                }
            }
        }
        let primary = primary_tree::<V>(txn, uid)?;
        let order = match order {
            Some(slot) => Some(index_tree_ref(txn, uid, slot)?),
            None => None,
        };
        Ok(Selection {
            primary,
            ids,
            order,
            dir,
            preds,
        })
    }
}

fn primary_tree<'t, V>(txn: &'t Txn, uid: u32) -> Result<&'t TreeTxn<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let staged = txn.staged(uid, 0)?;
    match staged.as_any().downcast_ref::<TreeTxn<V>>() {
        Some(tree) => Ok(tree),
        None => err_at!(Fatal, msg: "primary slot holds foreign tree"),
    }
}

fn index_tree_ref<'t>(txn: &'t Txn, uid: u32, slot: usize) -> Result<&'t TreeTxn<IdSet>> {
    let staged = txn.staged(uid, slot)?;
    match staged.as_any().downcast_ref::<TreeTxn<IdSet>>() {
        Some(tree) => Ok(tree),
        None => err_at!(Fatal, msg: "index slot {} holds foreign tree", slot),
    }
}

// Candidate id-set serviced by one indexed predicate: the bucket at
// the probe key for equality, a union of buckets walked off the seek
// landing for ranges.
fn scan_index<V>(txn: &Txn, uid: u32, cond: &IndexCond<V>) -> Result<IdSet> {
    let itxn = index_tree_ref(txn, uid, cond.slot)?;
    let key = cond.key.as_slice();
    match cond.op {
        CmpOp::Eq => Ok(itxn.get(key).cloned().unwrap_or_else(IdSet::new)),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let forward = matches!(cond.op, CmpOp::Gt | CmpOp::Ge);
            let mut acc = IdSet::new();
            let mut c = itxn.cursor();
            let mut ok = c.seek(key);
            // seek may land on either side of the bound; step until
            // the landed key satisfies the predicate.
            while ok && !c.key().map_or(false, |k| cond.matches_key(k)) {
                ok = if forward { c.next() } else { c.prev() };
            }
            while ok {
                if let Some(sub) = c.value() {
                    acc = acc.union(sub);
                }
                ok = if forward { c.next() } else { c.prev() };
            }
            Ok(acc)
        }
    }
}

// Pick the intersection strategy from the size ratio; either strategy
// yields the same result.
fn intersect_ids(a: &IdSet, b: &IdSet) -> IdSet {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if small.len() * GALLOP_RATIO <= large.len() {
        small.intersect_galloping(large)
    } else {
        small.intersect(large)
    }
}

// The planned query: primary tree, optional candidate id-set, optional
// ordering index and the user predicates.
struct Selection<'t, V> {
    primary: &'t TreeTxn<V>,
    ids: Option<IdSet>,
    order: Option<&'t TreeTxn<IdSet>>,
    dir: Dir,
    preds: Vec<Arc<dyn Fn(&V) -> bool + Send + Sync>>,
}

/// Lazy iterator over query results.
///
/// Yields records satisfying every condition, in the query's order.
/// Pagination composes through `skip`/`take`; nothing is read from the
/// primary tree until pulled.
pub struct Rows<'t, V> {
    sel: Selection<'t, V>,
    // last key handed out by the outer walk: primary keys in the
    // unordered modes, index keys in the ordered modes.
    outer: Option<Vec<u8>>,
    // ordered modes: the current bucket's id-set and the last primary
    // key enumerated within it.
    bucket: Option<IdSet>,
    inner: Option<Vec<u8>>,
    done: bool,
}

impl<'t, V> Rows<'t, V>
where
    V: Clone,
{
    fn new(sel: Selection<'t, V>) -> Rows<'t, V> {
        Rows {
            sel,
            outer: None,
            bucket: None,
            inner: None,
            done: false,
        }
    }

    fn passes(&self, v: &V) -> bool {
        self.sel.preds.iter().all(|p| p(v))
    }

    // unordered, unfiltered: walk the primary tree in direction.
    fn next_primary(&mut self) -> Option<V> {
        loop {
            let node = match self.outer.as_deref() {
                None => match self.sel.dir {
                    Dir::Asc => self.sel.primary.first_node(),
                    Dir::Desc => self.sel.primary.last_node(),
                },
                Some(key) => match self.sel.dir {
                    Dir::Asc => self.sel.primary.next_node(key),
                    Dir::Desc => self.sel.primary.prev_node(key),
                },
            }?;
            self.outer = Some(node.as_key().to_vec());
            if self.passes(node.as_value()) {
                return Some(node.as_value().clone());
            }
        }
    }

    // unordered, filtered: walk the candidate id-set, fetch each
    // record from the primary tree.
    fn next_filtered(&mut self) -> Option<V> {
        loop {
            let node = {
                let ids = self.sel.ids.as_ref()?;
                match self.outer.as_deref() {
                    None => match self.sel.dir {
                        Dir::Asc => ids.first_node(),
                        Dir::Desc => ids.last_node(),
                    },
                    Some(key) => match self.sel.dir {
                        Dir::Asc => ids.next_node(key),
                        Dir::Desc => ids.prev_node(key),
                    },
                }
            }?;
            self.outer = Some(node.as_key().to_vec());
            if let Some(v) = self.sel.primary.get(node.as_key()) {
                if self.passes(v) {
                    return Some(v.clone());
                }
            }
        }
    }

    // ordered: walk the ordering index in direction, enumerate each
    // bucket's primary keys ascending, filter by candidate membership.
    fn next_ordered(&mut self, order: &'t TreeTxn<IdSet>) -> Option<V> {
        loop {
            if self.bucket.is_none() {
                let node = match self.outer.as_deref() {
                    None => match self.sel.dir {
                        Dir::Asc => order.first_node(),
                        Dir::Desc => order.last_node(),
                    },
                    Some(key) => match self.sel.dir {
                        Dir::Asc => order.next_node(key),
                        Dir::Desc => order.prev_node(key),
                    },
                }?;
                self.outer = Some(node.as_key().to_vec());
                self.bucket = Some(node.as_value().clone());
                self.inner = None;
            }
            let idnode = {
                let bucket = self.bucket.as_ref()?;
                match self.inner.as_deref() {
                    None => bucket.first_node(),
                    Some(key) => bucket.next_node(key),
                }
            };
            let idnode = match idnode {
                Some(idnode) => idnode,
                None => {
                    self.bucket = None;
                    continue;
                }
            };
            self.inner = Some(idnode.as_key().to_vec());
            if let Some(ids) = self.sel.ids.as_ref() {
                if ids.get(idnode.as_key()).is_none() {
                    continue;
                }
            }
            if let Some(v) = self.sel.primary.get(idnode.as_key()) {
                if self.passes(v) {
                    return Some(v.clone());
                }
            }
        }
    }
}

impl<'t, V> Iterator for Rows<'t, V>
where
    V: Clone,
{
    type Item = V;

    fn next(&mut self) -> Option<V> {
        if self.done {
            return None;
        }
        let out = match self.sel.order {
            Some(order) => self.next_ordered(order),
            None if self.sel.ids.is_some() => self.next_filtered(),
            None => self.next_primary(),
        };
        if out.is_none() {
            self.done = true;
        }
        out
    }
}

#[cfg(test)]
#[path = "select_test.rs"]
mod select_test;
