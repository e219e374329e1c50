//! Module `field` implement typed index-field handles and the
//! condition model for queries.
//!
//! Registering a secondary index on a table hands back a typed field
//! handle. Handles build [Cond] values (`field.is(..)`,
//! `field.ge(..)`, ...) for the query builder and name the ordering
//! index for `order_by`.

use std::sync::Arc;

use crate::key::Key;

pub(crate) type KeyFn<V> = Arc<dyn Fn(&V) -> Key + Send + Sync>;

/// Handle on a secondary-index field of a table.
pub trait Field<V> {
    /// Index slot this field occupies within its table.
    fn slot(&self) -> usize;

    /// Extract this field's key from a record.
    fn key_of(&self, v: &V) -> Key;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum CmpOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A predicate over records.
///
/// Index conditions reference a field and compare against an encoded
/// key; the executor services them by walking that field's index
/// tree. User conditions are arbitrary and serviceable only by
/// testing candidate records one by one.
pub enum Cond<V> {
    Index(IndexCond<V>),
    User(Arc<dyn Fn(&V) -> bool + Send + Sync>),
}

impl<V> Clone for Cond<V> {
    fn clone(&self) -> Cond<V> {
        match self {
            Cond::Index(cond) => Cond::Index(cond.clone()),
            Cond::User(f) => Cond::User(Arc::clone(f)),
        }
    }
}

impl<V> Cond<V> {
    /// Arbitrary predicate over the record.
    pub fn when<F>(f: F) -> Cond<V>
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        Cond::User(Arc::new(f))
    }

    /// Whether `v` satisfies this condition.
    pub fn matches(&self, v: &V) -> bool {
        match self {
            Cond::Index(cond) => cond.matches(v),
            Cond::User(f) => f(v),
        }
    }
}

/// An index-serviceable comparison against a single field.
pub struct IndexCond<V> {
    pub(crate) slot: usize,
    pub(crate) op: CmpOp,
    pub(crate) key: Vec<u8>,
    keyof: KeyFn<V>,
}

impl<V> Clone for IndexCond<V> {
    fn clone(&self) -> IndexCond<V> {
        IndexCond {
            slot: self.slot,
            op: self.op,
            key: self.key.clone(),
            keyof: Arc::clone(&self.keyof),
        }
    }
}

impl<V> IndexCond<V> {
    // the executor re-checks border buckets with this.
    pub(crate) fn matches_key(&self, key: &[u8]) -> bool {
        match self.op {
            CmpOp::Eq => key == self.key.as_slice(),
            CmpOp::Lt => key < self.key.as_slice(),
            CmpOp::Le => key <= self.key.as_slice(),
            CmpOp::Gt => key > self.key.as_slice(),
            CmpOp::Ge => key >= self.key.as_slice(),
        }
    }

    /// Whether the field value extracted from `v` satisfies the
    /// comparison.
    pub fn matches(&self, v: &V) -> bool {
        self.matches_key(&(self.keyof)(v).encode())
    }
}

macro_rules! impl_field {
    ($t:ident) => {
        impl<V> $t<V> {
            pub(crate) fn new(slot: usize, keyof: KeyFn<V>) -> $t<V> {
                $t { slot, keyof }
            }

            fn cond(&self, op: CmpOp, key: Key) -> Cond<V> {
                Cond::Index(IndexCond {
                    slot: self.slot,
                    op,
                    key: key.encode(),
                    keyof: Arc::clone(&self.keyof),
                })
            }
        }

        impl<V> Clone for $t<V> {
            fn clone(&self) -> $t<V> {
                $t {
                    slot: self.slot,
                    keyof: Arc::clone(&self.keyof),
                }
            }
        }

        impl<V> Field<V> for $t<V> {
            fn slot(&self) -> usize {
                self.slot
            }

            fn key_of(&self, v: &V) -> Key {
                (self.keyof)(v)
            }
        }
    };
}

/// String-typed index field; equality and range comparisons.
pub struct StrField<V> {
    slot: usize,
    keyof: KeyFn<V>,
}

impl_field!(StrField);

impl<V> StrField<V> {
    pub fn is(&self, value: &str) -> Cond<V> {
        self.cond(CmpOp::Eq, Key::from(value))
    }

    pub fn lt(&self, value: &str) -> Cond<V> {
        self.cond(CmpOp::Lt, Key::from(value))
    }

    pub fn le(&self, value: &str) -> Cond<V> {
        self.cond(CmpOp::Le, Key::from(value))
    }

    pub fn gt(&self, value: &str) -> Cond<V> {
        self.cond(CmpOp::Gt, Key::from(value))
    }

    pub fn ge(&self, value: &str) -> Cond<V> {
        self.cond(CmpOp::Ge, Key::from(value))
    }
}

/// Integer-typed index field; equality and range comparisons.
pub struct IntField<V> {
    slot: usize,
    keyof: KeyFn<V>,
}

impl_field!(IntField);

impl<V> IntField<V> {
    pub fn is(&self, value: i64) -> Cond<V> {
        self.cond(CmpOp::Eq, Key::Int(value))
    }

    pub fn lt(&self, value: i64) -> Cond<V> {
        self.cond(CmpOp::Lt, Key::Int(value))
    }

    pub fn le(&self, value: i64) -> Cond<V> {
        self.cond(CmpOp::Le, Key::Int(value))
    }

    pub fn gt(&self, value: i64) -> Cond<V> {
        self.cond(CmpOp::Gt, Key::Int(value))
    }

    pub fn ge(&self, value: i64) -> Cond<V> {
        self.cond(CmpOp::Ge, Key::Int(value))
    }
}

/// Float-typed index field; equality and range comparisons.
pub struct FloatField<V> {
    slot: usize,
    keyof: KeyFn<V>,
}

impl_field!(FloatField);

impl<V> FloatField<V> {
    pub fn is(&self, value: f64) -> Cond<V> {
        self.cond(CmpOp::Eq, Key::Float(value))
    }

    pub fn lt(&self, value: f64) -> Cond<V> {
        self.cond(CmpOp::Lt, Key::Float(value))
    }

    pub fn le(&self, value: f64) -> Cond<V> {
        self.cond(CmpOp::Le, Key::Float(value))
    }

    pub fn gt(&self, value: f64) -> Cond<V> {
        self.cond(CmpOp::Gt, Key::Float(value))
    }

    pub fn ge(&self, value: f64) -> Cond<V> {
        self.cond(CmpOp::Ge, Key::Float(value))
    }
}

/// Boolean-typed index field; equality only.
pub struct BoolField<V> {
    slot: usize,
    keyof: KeyFn<V>,
}

impl_field!(BoolField);

impl<V> BoolField<V> {
    pub fn is_true(&self) -> Cond<V> {
        self.cond(CmpOp::Eq, Key::Bool(true))
    }

    pub fn is_false(&self) -> Cond<V> {
        self.cond(CmpOp::Eq, Key::Bool(false))
    }
}

/// Byte-string index field; equality and range comparisons.
pub struct BinField<V> {
    slot: usize,
    keyof: KeyFn<V>,
}

impl_field!(BinField);

impl<V> BinField<V> {
    pub fn is(&self, value: &[u8]) -> Cond<V> {
        self.cond(CmpOp::Eq, Key::from(value))
    }

    pub fn lt(&self, value: &[u8]) -> Cond<V> {
        self.cond(CmpOp::Lt, Key::from(value))
    }

    pub fn le(&self, value: &[u8]) -> Cond<V> {
        self.cond(CmpOp::Le, Key::from(value))
    }

    pub fn gt(&self, value: &[u8]) -> Cond<V> {
        self.cond(CmpOp::Gt, Key::from(value))
    }

    pub fn ge(&self, value: &[u8]) -> Cond<V> {
        self.cond(CmpOp::Ge, Key::from(value))
    }
}

/// Composite index field over multiple key elements; equality only.
pub struct MultiField<V> {
    slot: usize,
    keyof: KeyFn<V>,
}

impl_field!(MultiField);

impl<V> MultiField<V> {
    pub fn is(&self, elems: &[Key]) -> Cond<V> {
        self.cond(CmpOp::Eq, Key::Multi(elems.to_vec()))
    }
}

#[cfg(test)]
#[path = "field_test.rs"]
mod field_test;
