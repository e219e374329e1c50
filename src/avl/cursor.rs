use std::sync::Arc;

use crate::avl::node::{self, Node};
use crate::avl::tree::TreeTxn;

/// Bidirectional, seekable position over a [TreeTxn].
///
/// A fresh cursor is unpositioned; `first`, `last` or `seek` place it,
/// `next`/`prev` step it and return false once exhausted. `seek(k)`
/// lands on the smallest key >= `k` when one exists, otherwise on the
/// greatest key < `k`, and returns false iff the tree is empty;
/// callers that need strict >= semantics compare the landed key
/// against `k`.
///
/// The cursor borrows its transaction, so staging further mutations
/// while a cursor is alive is rejected at compile time.
pub struct Cursor<'a, V> {
    txn: &'a TreeTxn<V>,
    node: Option<Arc<Node<V>>>,
}

impl<'a, V> Cursor<'a, V> {
    pub(crate) fn new(txn: &'a TreeTxn<V>) -> Cursor<'a, V> {
        Cursor { txn, node: None }
    }

    /// Position on the smallest key.
    pub fn first(&mut self) -> bool {
        self.node = node::min(self.txn.as_root());
        self.node.is_some()
    }

    /// Position on the greatest key.
    pub fn last(&mut self) -> bool {
        self.node = node::max(self.txn.as_root());
        self.node.is_some()
    }

    /// Position on the smallest key >= `key`, else the greatest key
    /// below it.
    pub fn seek(&mut self, key: &[u8]) -> bool {
        self.node = node::seek(self.txn.as_root(), key);
        self.node.is_some()
    }

    /// Step to the next key in ascending order; an unpositioned cursor
    /// steps to the first key.
    pub fn next(&mut self) -> bool {
        self.node = match self.node.take() {
            None => node::min(self.txn.as_root()),
            Some(node) => node::successor(self.txn.as_root(), node.as_key()),
        };
        self.node.is_some()
    }

    /// Step to the previous key; an unpositioned cursor steps to the
    /// last key.
    pub fn prev(&mut self) -> bool {
        self.node = match self.node.take() {
            None => node::max(self.txn.as_root()),
            Some(node) => node::predecessor(self.txn.as_root(), node.as_key()),
        };
        self.node.is_some()
    }

    /// Key bytes at the current position.
    pub fn key(&self) -> Option<&[u8]> {
        self.node.as_deref().map(Node::as_key)
    }

    /// Value at the current position.
    pub fn value(&self) -> Option<&V> {
        self.node.as_deref().map(Node::as_value)
    }
}

#[cfg(test)]
#[path = "cursor_test.rs"]
mod cursor_test;
