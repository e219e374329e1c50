//! Module `table` implement typed tables over the snapshot registry,
//! including secondary-index maintenance.
//!
//! A table is defined by a primary-key extractor and any number of
//! typed index fields. Index registration installs maintenance hooks
//! into the table's callback lists; the hooks run inside the caller's
//! write transaction, against the staged index trees, so the primary
//! tree and every index tree commit or abort as one unit.

use std::sync::{
    atomic::{AtomicU32, Ordering::SeqCst},
    Arc,
};

use crate::{
    avl::{Tree, TreeTxn},
    db::{Register, Registry, Slot, Txn},
    err_at,
    field::{BinField, BoolField, FloatField, IntField, KeyFn, MultiField, StrField},
    key::Key,
    select::Lister,
    types::Empty,
    Result,
};

/// Ceiling on secondary indexes per table.
pub const MAX_INDEXES: usize = 255;

// id-set: the sub-tree stored per index key, mapping encoded primary
// keys to nothing.
pub(crate) type IdSet = Tree<Empty>;

static TABLE_IDS: AtomicU32 = AtomicU32::new(1);

pub(crate) type InsertHook<V> =
    Arc<dyn for<'t> Fn(&mut Txn<'t>, &V) -> Result<()> + Send + Sync>;
pub(crate) type UpdateHook<V> =
    Arc<dyn for<'t> Fn(&mut Txn<'t>, &V, &V) -> Result<()> + Send + Sync>;

/// Schema and handle for one record type.
///
/// Build the table with [Table::new], register indexes, then hand the
/// table to [Db::init][crate::Db::init]. The table value itself is
/// cheap to clone and is used afterwards to operate on transactions.
pub struct Table<V> {
    uid: u32,
    pkfn: KeyFn<V>,
    n_indexes: usize,
    insert_hooks: Vec<InsertHook<V>>,
    update_hooks: Vec<UpdateHook<V>>,
    delete_hooks: Vec<InsertHook<V>>,
}

impl<V> Clone for Table<V> {
    fn clone(&self) -> Table<V> {
        Table {
            uid: self.uid,
            pkfn: Arc::clone(&self.pkfn),
            n_indexes: self.n_indexes,
            insert_hooks: self.insert_hooks.clone(),
            update_hooks: self.update_hooks.clone(),
            delete_hooks: self.delete_hooks.clone(),
        }
    }
}

impl<V> Table<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Define a table whose records are keyed by `pkfn`.
    pub fn new<F>(pkfn: F) -> Table<V>
    where
        F: Fn(&V) -> Key + Send + Sync + 'static,
    {
        Table {
            uid: TABLE_IDS.fetch_add(1, SeqCst),
            pkfn: Arc::new(pkfn),
            n_indexes: 0,
            insert_hooks: vec![],
            update_hooks: vec![],
            delete_hooks: vec![],
        }
    }

    /// Register a string-typed secondary index.
    pub fn index_str<F>(&mut self, keyfn: F) -> StrField<V>
    where
        F: Fn(&V) -> String + Send + Sync + 'static,
    {
        let keyof: KeyFn<V> = Arc::new(move |v| Key::Str(keyfn(v)));
        let slot = self.register_index(Arc::clone(&keyof));
        StrField::new(slot, keyof)
    }

    /// Register an integer-typed secondary index.
    pub fn index_int<F>(&mut self, keyfn: F) -> IntField<V>
    where
        F: Fn(&V) -> i64 + Send + Sync + 'static,
    {
        let keyof: KeyFn<V> = Arc::new(move |v| Key::Int(keyfn(v)));
        let slot = self.register_index(Arc::clone(&keyof));
        IntField::new(slot, keyof)
    }

    /// Register a float-typed secondary index.
    pub fn index_float<F>(&mut self, keyfn: F) -> FloatField<V>
    where
        F: Fn(&V) -> f64 + Send + Sync + 'static,
    {
        let keyof: KeyFn<V> = Arc::new(move |v| Key::Float(keyfn(v)));
        let slot = self.register_index(Arc::clone(&keyof));
        FloatField::new(slot, keyof)
    }

    /// Register a boolean-typed secondary index.
    pub fn index_bool<F>(&mut self, keyfn: F) -> BoolField<V>
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        let keyof: KeyFn<V> = Arc::new(move |v| Key::Bool(keyfn(v)));
        let slot = self.register_index(Arc::clone(&keyof));
        BoolField::new(slot, keyof)
    }

    /// Register a byte-string secondary index.
    pub fn index_bin<F>(&mut self, keyfn: F) -> BinField<V>
    where
        F: Fn(&V) -> Vec<u8> + Send + Sync + 'static,
    {
        let keyof: KeyFn<V> = Arc::new(move |v| Key::Bin(keyfn(v)));
        let slot = self.register_index(Arc::clone(&keyof));
        BinField::new(slot, keyof)
    }

    /// Register a composite secondary index over several key elements.
    pub fn index_multi<F>(&mut self, keyfn: F) -> MultiField<V>
    where
        F: Fn(&V) -> Vec<Key> + Send + Sync + 'static,
    {
        let keyof: KeyFn<V> = Arc::new(move |v| Key::Multi(keyfn(v)));
        let slot = self.register_index(Arc::clone(&keyof));
        MultiField::new(slot, keyof)
    }

    // Install the three maintenance hooks for a new index and hand out
    // its slot id. Slot 0 belongs to the primary tree.
    fn register_index(&mut self, keyof: KeyFn<V>) -> usize {
        self.n_indexes += 1;
        let (uid, slot) = (self.uid, self.n_indexes);

        {
            let (keyof, pkfn) = (Arc::clone(&keyof), Arc::clone(&self.pkfn));
            self.insert_hooks.push(Arc::new(move |txn: &mut Txn, v: &V| {
                let ik = keyof(v).encode();
                let pk = pkfn(v).encode();
                let itxn = index_tree(txn, uid, slot)?;
                let sub = itxn.get(&ik).cloned().unwrap_or_else(IdSet::new);
                let mut stx = sub.txn(true);
                stx.set(&pk, Empty);
                itxn.set(&ik, stx.commit());
                Ok(())
            }));
        }
        {
            let (keyof, pkfn) = (Arc::clone(&keyof), Arc::clone(&self.pkfn));
            self.delete_hooks.push(Arc::new(move |txn: &mut Txn, v: &V| {
                let ik = keyof(v).encode();
                let pk = pkfn(v).encode();
                let itxn = index_tree(txn, uid, slot)?;
                let sub = match itxn.get(&ik).cloned() {
                    Some(sub) => sub,
                    None => return Ok(()),
                };
                let mut stx = sub.txn(true);
                stx.delete(&pk);
                if stx.is_empty() {
                    itxn.delete(&ik);
                } else {
                    itxn.set(&ik, stx.commit());
                }
                Ok(())
            }));
        }
        {
            let (keyof, pkfn) = (keyof, Arc::clone(&self.pkfn));
            self.update_hooks.push(Arc::new(move |txn: &mut Txn, v: &V, prev: &V| {
                let new_ik = keyof(v).encode();
                let prev_ik = keyof(prev).encode();
                if new_ik == prev_ik {
                    return Ok(());
                }
                let pk = pkfn(v).encode();
                let itxn = index_tree(txn, uid, slot)?;
                if let Some(sub) = itxn.get(&prev_ik).cloned() {
                    let mut stx = sub.txn(true);
                    stx.delete(&pk);
                    if stx.is_empty() {
                        itxn.delete(&prev_ik);
                    } else {
                        itxn.set(&prev_ik, stx.commit());
                    }
                }
                let sub = itxn.get(&new_ik).cloned().unwrap_or_else(IdSet::new);
                let mut stx = sub.txn(true);
                stx.set(&pk, Empty);
                itxn.set(&new_ik, stx.commit());
                Ok(())
            }));
        }

        slot
    }

    /// Register a hook invoked after a record is inserted, within the
    /// same write transaction. Hooks run in registration order.
    pub fn on_insert<F>(&mut self, hook: F)
    where
        F: for<'t> Fn(&mut Txn<'t>, &V) -> Result<()> + Send + Sync + 'static,
    {
        self.insert_hooks.push(Arc::new(hook));
    }

    /// Register a hook invoked after a record is overwritten; receives
    /// the new and the previous record.
    pub fn on_update<F>(&mut self, hook: F)
    where
        F: for<'t> Fn(&mut Txn<'t>, &V, &V) -> Result<()> + Send + Sync + 'static,
    {
        self.update_hooks.push(Arc::new(hook));
    }

    /// Register a hook invoked after a record is deleted.
    pub fn on_delete<F>(&mut self, hook: F)
    where
        F: for<'t> Fn(&mut Txn<'t>, &V) -> Result<()> + Send + Sync + 'static,
    {
        self.delete_hooks.push(Arc::new(hook));
    }

    fn data<'t>(&self, txn: &'t Txn) -> Result<&'t TreeTxn<V>> {
        let staged = txn.staged(self.uid, 0)?;
        match staged.as_any().downcast_ref::<TreeTxn<V>>() {
            Some(tree) => Ok(tree),
            None => err_at!(Fatal, msg: "primary slot holds foreign tree"),
        }
    }

    fn data_mut<'t>(&self, txn: &'t mut Txn) -> Result<&'t mut TreeTxn<V>> {
        let staged = txn.staged_mut(self.uid, 0)?;
        match staged.as_any_mut().downcast_mut::<TreeTxn<V>>() {
            Some(tree) => Ok(tree),
            None => err_at!(Fatal, msg: "primary slot holds foreign tree"),
        }
    }

    /// Fetch the record stored under primary key `pk`. Absence is
    /// reported as [Error::KeyNotFound][crate::Error::KeyNotFound].
    pub fn get(&self, txn: &Txn, pk: &Key) -> Result<V> {
        let data = self.data(txn)?;
        match data.get(&pk.encode()) {
            Some(v) => Ok(v.clone()),
            None => err_at!(KeyNotFound, msg: "missing primary key"),
        }
    }

    /// Insert or overwrite `v`, keyed by its primary key. Fires the
    /// insert hooks for fresh records, the update hooks otherwise.
    pub fn set(&self, txn: &mut Txn, v: V) -> Result<()> {
        if !txn.is_write() {
            return err_at!(Txn, msg: "set through a read-only txn");
        }
        let key = (self.pkfn)(&v).encode();
        let prev = self.data_mut(txn)?.set(&key, v.clone());
        match prev {
            Some(prev) => {
                for hook in self.update_hooks.iter() {
                    hook(txn, &v, &prev)?;
                }
            }
            None => {
                for hook in self.insert_hooks.iter() {
                    hook(txn, &v)?;
                }
            }
        }
        Ok(())
    }

    /// `set` every record, in input order.
    pub fn set_many<I>(&self, txn: &mut Txn, vs: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
    {
        for v in vs {
            self.set(txn, v)?;
        }
        Ok(())
    }

    /// Delete the record under `pk` and fire the delete hooks; absent
    /// keys are a silent success.
    pub fn delete(&self, txn: &mut Txn, pk: &Key) -> Result<()> {
        if !txn.is_write() {
            return err_at!(Txn, msg: "delete through a read-only txn");
        }
        let key = pk.encode();
        let prev = self.data_mut(txn)?.delete(&key);
        if let Some(prev) = prev {
            for hook in self.delete_hooks.iter() {
                hook(txn, &prev)?;
            }
        }
        Ok(())
    }

    /// `delete` every key; missing keys are silently skipped.
    pub fn delete_many<I>(&self, txn: &mut Txn, pks: I) -> Result<()>
    where
        I: IntoIterator<Item = Key>,
    {
        for pk in pks {
            self.delete(txn, &pk)?;
        }
        Ok(())
    }

    /// Start building a query against this table within `txn`.
    pub fn select<'t, 'd>(&self, txn: &'t Txn<'d>) -> Lister<'t, 'd, V> {
        Lister::new(txn, self.uid)
    }
}

impl<V> Register for Table<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn register(&self, db: &mut Registry) -> Result<()> {
        if self.n_indexes > MAX_INDEXES {
            return err_at!(
                Schema, msg: "{} indexes, table supports {}", self.n_indexes, MAX_INDEXES
            );
        }
        let mut slots = Vec::with_capacity(self.n_indexes + 1);
        slots.push(Slot::new(Tree::<V>::new()));
        for _ in 0..self.n_indexes {
            slots.push(Slot::new(Tree::<IdSet>::new()));
        }
        db.add_table(self.uid, slots)
    }
}

// Re-type the staged tree of a secondary-index slot.
fn index_tree<'t>(txn: &'t mut Txn, uid: u32, slot: usize) -> Result<&'t mut TreeTxn<IdSet>> {
    let staged = txn.staged_mut(uid, slot)?;
    match staged.as_any_mut().downcast_mut::<TreeTxn<IdSet>>() {
        Some(tree) => Ok(tree),
        None => err_at!(Fatal, msg: "index slot {} holds foreign tree", slot),
    }
}

#[cfg(test)]
#[path = "table_test.rs"]
mod table_test;
