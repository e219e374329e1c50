//! Module `db` implement the snapshot registry and transaction
//! coordination.
//!
//! For every registered table the database holds one slot per tree:
//! slot 0 for the primary tree, slots 1..N for the secondary-index
//! trees. A slot stores the currently published, type-erased tree root
//! behind a spinlock, so opening a transaction is one cheap
//! `Arc` clone per slot. Writers are serialized by a database-wide
//! lock held from `begin_write` through the publish phase of commit.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    avl::{Tree, TreeTxn},
    err_at,
    util::Spinlock,
    Result,
};

pub(crate) type Root = Arc<dyn Any + Send + Sync>;

// Type-erased staged tree txn held per-slot inside a [Txn]. Tables
// re-type these through `as_any`/`as_any_mut`.
pub(crate) trait Staged: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn publish(&self) -> Root;
}

impl<V> Staged for TreeTxn<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn publish(&self) -> Root {
        Arc::new(self.commit())
    }
}

type StageFn = Box<dyn Fn(&Root, bool) -> Box<dyn Staged> + Send + Sync>;

// One published tree root plus the staging shim that re-types it. The
// shim is installed at registration time, where the value type is
// still known.
pub(crate) struct Slot {
    root: Spinlock<Root>,
    stage: StageFn,
}

impl Slot {
    pub(crate) fn new<V>(tree: Tree<V>) -> Slot
    where
        V: Clone + Send + Sync + 'static,
    {
        Slot {
            root: Spinlock::new(Arc::new(tree) as Root),
            stage: Box::new(|root: &Root, write: bool| {
                let tree = match root.downcast_ref::<Tree<V>>() {
                    Some(tree) => tree.clone(),
                    None => panic!("slot holds foreign tree type! call the programmer"),
                };
                Box::new(tree.txn(write))
            }),
        }
    }
}

pub(crate) struct TableCore {
    slots: Vec<Slot>,
}

/// Schema under construction, passed to [Register::register] during
/// [Db::init].
pub struct Registry {
    tables: Vec<TableCore>,
    index: HashMap<u32, usize>,
}

impl Registry {
    pub(crate) fn add_table(&mut self, uid: u32, slots: Vec<Slot>) -> Result<()> {
        if self.index.contains_key(&uid) {
            return err_at!(Schema, msg: "table {} already registered", uid);
        }
        self.index.insert(uid, self.tables.len());
        self.tables.push(TableCore { slots });
        Ok(())
    }
}

/// Implemented by [Table][crate::Table] so tables can be handed to
/// [Db::init].
pub trait Register {
    fn register(&self, db: &mut Registry) -> Result<()>;
}

/// Handle to the database. Cheap to clone; every clone shares the same
/// published snapshot and writer lock.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

struct DbInner {
    tables: Vec<TableCore>,
    index: HashMap<u32, usize>,
    write_mu: Mutex<()>,
}

impl Db {
    /// Register `tables` and return the database handle. Every slot
    /// starts out as an empty tree.
    ///
    /// Errors: no tables referenced, duplicate table registration or a
    /// table carrying more secondary indexes than the engine supports.
    pub fn init(tables: &[&dyn Register]) -> Result<Db> {
        if tables.is_empty() {
            return err_at!(Schema, msg: "no tables referenced");
        }
        let mut registry = Registry {
            tables: vec![],
            index: HashMap::new(),
        };
        for table in tables.iter() {
            table.register(&mut registry)?;
        }
        let inner = DbInner {
            tables: registry.tables,
            index: registry.index,
            write_mu: Mutex::new(()),
        };
        Ok(Db {
            inner: Arc::new(inner),
        })
    }

    /// Open a read transaction: an immutable view of every tree root
    /// as published at this moment. Readers never block.
    pub fn begin_read(&self) -> Txn<'_> {
        self.begin(false)
    }

    /// Open a write transaction. Blocks until the database-wide writer
    /// lock is available; the lock is held until the txn commits or is
    /// dropped, so at most one write transaction is in flight.
    pub fn begin_write(&self) -> Txn<'_> {
        self.begin(true)
    }

    fn begin(&self, write: bool) -> Txn<'_> {
        let guard = if write {
            let guard = match self.inner.write_mu.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Some(guard)
        } else {
            None
        };
        let tables = self
            .inner
            .tables
            .iter()
            .map(|table| {
                table
                    .slots
                    .iter()
                    .map(|slot| {
                        let root = Arc::clone(&*slot.root.read());
                        (slot.stage)(&root, write)
                    })
                    .collect()
            })
            .collect();
        Txn {
            db: &self.inner,
            write,
            tables,
            _guard: guard,
        }
    }
}

/// A transaction over the whole database.
///
/// The snapshot is captured once, at open time: one staged tree txn
/// per (table, slot). Read transactions are plain immutable views.
/// Write transactions stage mutations across the primary tree and
/// every index tree, then publish all of them on [Txn::commit];
/// dropping the txn instead discards the staged roots.
pub struct Txn<'a> {
    db: &'a DbInner,
    write: bool,
    tables: Vec<Vec<Box<dyn Staged>>>,
    _guard: Option<MutexGuard<'a, ()>>,
}

impl<'a> Txn<'a> {
    /// Whether this transaction accepts mutations.
    pub fn is_write(&self) -> bool {
        self.write
    }

    /// Publish every staged tree root into its snapshot slot. A no-op
    /// for read transactions. Each slot is swapped atomically; the
    /// writer lock is released once all slots are published.
    pub fn commit(self) {
        if !self.write {
            return;
        }
        for (t, staged) in self.tables.iter().enumerate() {
            for (j, tree) in staged.iter().enumerate() {
                *self.db.tables[t].slots[j].root.write() = tree.publish();
            }
        }
    }

    /// Discard the staged mutations; the published snapshot is
    /// untouched.
    pub fn abort(self) {}

    pub(crate) fn staged(&self, uid: u32, slot: usize) -> Result<&dyn Staged> {
        let t = match self.db.index.get(&uid) {
            Some(t) => *t,
            None => return err_at!(Txn, msg: "table {} not in this snapshot", uid),
        };
        match self.tables[t].get(slot) {
            Some(staged) => Ok(staged.as_ref()),
            None => err_at!(Txn, msg: "index slot {} not in this snapshot", slot),
        }
    }

    pub(crate) fn staged_mut(&mut self, uid: u32, slot: usize) -> Result<&mut dyn Staged> {
        let t = match self.db.index.get(&uid) {
            Some(t) => *t,
            None => return err_at!(Txn, msg: "table {} not in this snapshot", uid),
        };
        match self.tables[t].get_mut(slot) {
            Some(staged) => Ok(staged.as_mut()),
            None => err_at!(Txn, msg: "index slot {} not in this snapshot", slot),
        }
    }
}

#[cfg(test)]
#[path = "db_test.rs"]
mod db_test;
