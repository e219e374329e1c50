//! Module `avl` implement a persistent, height-balanced ordered map
//! keyed by byte strings.
//!
//! Mutations are copy-on-write: the path from root to the touched node
//! is cloned, every other subtree is shared between the old and the
//! new root. Old roots remain valid, immutable snapshots for as long
//! as somebody holds them, which is what gives readers their isolation
//! for free.

mod cursor;
mod node;
mod tree;

pub use cursor::Cursor;
pub use tree::{Tree, TreeTxn};
