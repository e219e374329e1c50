use std::{cmp, cmp::Ordering, mem, sync::Arc};

use crate::{err_at, Result};

// Node is a single immutable entry in a tree. Mutation clones every
// node on the path from root to target, untouched siblings are shared
// between the old and the new root.
#[derive(Clone)]
pub struct Node<V> {
    pub(crate) key: Arc<[u8]>,
    pub(crate) value: V,
    pub(crate) height: i32,
    pub(crate) bf: i32, // height(right) - height(left)
    pub(crate) left: Option<Arc<Node<V>>>,
    pub(crate) right: Option<Arc<Node<V>>>,
}

impl<V> Node<V> {
    fn new(key: Arc<[u8]>, value: V) -> Node<V> {
        Node {
            key,
            value,
            height: 1,
            bf: 0,
            left: None,
            right: None,
        }
    }

    #[inline]
    pub(crate) fn as_key(&self) -> &[u8] {
        &self.key
    }

    #[inline]
    pub(crate) fn as_value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub(crate) fn as_left_ref(&self) -> Option<&Node<V>> {
        self.left.as_deref()
    }

    #[inline]
    pub(crate) fn as_right_ref(&self) -> Option<&Node<V>> {
        self.right.as_deref()
    }

    fn update_height(&mut self) {
        let (lh, rh) = (height(self.as_left_ref()), height(self.as_right_ref()));
        self.height = 1 + cmp::max(lh, rh);
        self.bf = rh - lh;
    }
}

#[inline]
fn height<V>(node: Option<&Node<V>>) -> i32 {
    node.map_or(0, |node| node.height)
}

#[inline]
fn bf<V>(node: Option<&Node<V>>) -> i32 {
    node.map_or(0, |node| node.bf)
}

// Insert or overwrite `key`; return the new subtree root and the
// replaced value, if any.
pub(crate) fn set<V: Clone>(
    node: Option<&Node<V>>,
    key: &Arc<[u8]>,
    value: V,
) -> (Arc<Node<V>>, Option<V>) {
    let mut node = match node {
        Some(node) => node.clone(),
        None => return (Arc::new(Node::new(Arc::clone(key), value)), None),
    };
    let old = match key.as_ref().cmp(node.as_key()) {
        Ordering::Equal => Some(mem::replace(&mut node.value, value)),
        Ordering::Less => {
            let (left, old) = set(node.as_left_ref(), key, value);
            node.left = Some(left);
            old
        }
        Ordering::Greater => {
            let (right, old) = set(node.as_right_ref(), key, value);
            node.right = Some(right);
            old
        }
    };
    node.update_height();
    (Arc::new(balance(node)), old)
}

// Standard BST delete with path-copy; when both children exist the
// in-order successor replaces the node and is spliced out of the right
// subtree.
pub(crate) fn remove<V: Clone>(
    node: Option<&Node<V>>,
    key: &[u8],
) -> (Option<Arc<Node<V>>>, Option<V>) {
    let mut node = match node {
        Some(node) => node.clone(),
        None => return (None, None),
    };
    let old = match key.cmp(node.as_key()) {
        Ordering::Less => {
            let (left, old) = remove(node.as_left_ref(), key);
            node.left = left;
            old
        }
        Ordering::Greater => {
            let (right, old) = remove(node.as_right_ref(), key);
            node.right = right;
            old
        }
        Ordering::Equal => match (node.left.take(), node.right.take()) {
            (None, right) => return (right, Some(node.value)),
            (left, None) => return (left, Some(node.value)),
            (Some(left), Some(right)) => {
                let succ = leftmost(&right);
                node.key = Arc::clone(&succ.key);
                let old = mem::replace(&mut node.value, succ.value.clone());
                node.left = Some(left);
                node.right = remove_min(&right);
                Some(old)
            }
        },
    };
    node.update_height();
    (Some(Arc::new(balance(node))), old)
}

fn leftmost<V>(node: &Node<V>) -> &Node<V> {
    match node.as_left_ref() {
        Some(left) => leftmost(left),
        None => node,
    }
}

// Remove the leftmost entry of this subtree.
fn remove_min<V: Clone>(node: &Node<V>) -> Option<Arc<Node<V>>> {
    match node.as_left_ref() {
        None => node.right.clone(),
        Some(left) => {
            let mut node = node.clone();
            node.left = remove_min(left);
            node.update_height();
            Some(Arc::new(balance(node)))
        }
    }
}

// Restore the AVL invariant after one insert/delete step; the rotation
// shape is picked by the sign of the taller child's balance factor.
fn balance<V: Clone>(mut node: Node<V>) -> Node<V> {
    if node.bf == -2 {
        if bf(node.as_left_ref()) <= 0 {
            node = rotate_right(node);
        } else {
            if let Some(left) = node.left.take() {
                node.left = Some(Arc::new(rotate_left(left.as_ref().clone())));
            }
            node = rotate_right(node);
        }
    } else if node.bf == 2 {
        if bf(node.as_right_ref()) >= 0 {
            node = rotate_left(node);
        } else {
            if let Some(right) = node.right.take() {
                node.right = Some(Arc::new(rotate_right(right.as_ref().clone())));
            }
            node = rotate_left(node);
        }
    }
    node
}

//              node                    right
//              /  \                    /  \
//           left  right      ==>    node  r-r
//                 /  \              /  \
//               r-l  r-r         left  r-l
//
fn rotate_left<V: Clone>(mut node: Node<V>) -> Node<V> {
    let mut right = match node.right.take() {
        Some(right) => right.as_ref().clone(),
        None => return node,
    };
    node.right = right.left.take();
    node.update_height();
    right.left = Some(Arc::new(node));
    right.update_height();
    right
}

//              node                    left
//              /  \                    /  \
//           left  right      ==>    l-l   node
//           /  \                          /  \
//        l-l   l-r                     l-r   right
//
fn rotate_right<V: Clone>(mut node: Node<V>) -> Node<V> {
    let mut left = match node.left.take() {
        Some(left) => left.as_ref().clone(),
        None => return node,
    };
    node.left = left.right.take();
    node.update_height();
    left.right = Some(Arc::new(node));
    left.update_height();
    left
}

pub(crate) fn get<'a, V>(node: Option<&'a Node<V>>, key: &[u8]) -> Option<&'a V> {
    let node = node?;
    match key.cmp(node.as_key()) {
        Ordering::Equal => Some(node.as_value()),
        Ordering::Less => get(node.as_left_ref(), key),
        Ordering::Greater => get(node.as_right_ref(), key),
    }
}

// Leftmost descendant.
pub(crate) fn min<V>(node: Option<&Arc<Node<V>>>) -> Option<Arc<Node<V>>> {
    let node = node?;
    match node.left.as_ref() {
        Some(left) => min(Some(left)),
        None => Some(Arc::clone(node)),
    }
}

// Rightmost descendant.
pub(crate) fn max<V>(node: Option<&Arc<Node<V>>>) -> Option<Arc<Node<V>>> {
    let node = node?;
    match node.right.as_ref() {
        Some(right) => max(Some(right)),
        None => Some(Arc::clone(node)),
    }
}

// Smallest key strictly greater than `key`, whether or not `key` is
// present.
pub(crate) fn successor<V>(node: Option<&Arc<Node<V>>>, key: &[u8]) -> Option<Arc<Node<V>>> {
    let node = node?;
    match key.cmp(node.as_key()) {
        Ordering::Equal => min(node.right.as_ref()),
        Ordering::Less => {
            successor(node.left.as_ref(), key).or_else(|| Some(Arc::clone(node)))
        }
        Ordering::Greater => successor(node.right.as_ref(), key),
    }
}

// Greatest key strictly less than `key`, whether or not `key` is
// present.
pub(crate) fn predecessor<V>(node: Option<&Arc<Node<V>>>, key: &[u8]) -> Option<Arc<Node<V>>> {
    let node = node?;
    match key.cmp(node.as_key()) {
        Ordering::Equal => max(node.left.as_ref()),
        Ordering::Less => predecessor(node.left.as_ref(), key),
        Ordering::Greater => {
            predecessor(node.right.as_ref(), key).or_else(|| Some(Arc::clone(node)))
        }
    }
}

// Smallest key >= `key` when one exists, else the greatest key < `key`.
pub(crate) fn seek<V>(root: Option<&Arc<Node<V>>>, key: &[u8]) -> Option<Arc<Node<V>>> {
    ceiling(root, key).or_else(|| predecessor(root, key))
}

fn ceiling<V>(node: Option<&Arc<Node<V>>>, key: &[u8]) -> Option<Arc<Node<V>>> {
    let node = node?;
    match key.cmp(node.as_key()) {
        Ordering::Equal => Some(Arc::clone(node)),
        Ordering::Less => ceiling(node.left.as_ref(), key).or_else(|| Some(Arc::clone(node))),
        Ordering::Greater => ceiling(node.right.as_ref(), key),
    }
}

// Verify sort order, height bookkeeping and the balance invariant;
// return (height, entry count) of the subtree.
pub(crate) fn validate<V>(node: Option<&Node<V>>) -> Result<(i32, usize)> {
    let node = match node {
        Some(node) => node,
        None => return Ok((0, 0)),
    };
    if let Some(left) = node.as_left_ref() {
        if left.as_key() >= node.as_key() {
            return err_at!(Fatal, msg: "left key {:?} >= parent", left.as_key());
        }
    }
    if let Some(right) = node.as_right_ref() {
        if right.as_key() <= node.as_key() {
            return err_at!(Fatal, msg: "right key {:?} <= parent", right.as_key());
        }
    }
    let (lh, ln) = validate(node.as_left_ref())?;
    let (rh, rn) = validate(node.as_right_ref())?;
    if node.height != 1 + cmp::max(lh, rh) {
        return err_at!(Fatal, msg: "stale height {}", node.height);
    }
    if node.bf != rh - lh {
        return err_at!(Fatal, msg: "stale balance factor {}", node.bf);
    }
    if node.bf < -1 || node.bf > 1 {
        return err_at!(Fatal, msg: "unbalanced node, bf {}", node.bf);
    }
    Ok((node.height, ln + rn + 1))
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
