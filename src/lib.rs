//! Relix is an embedded, transactional, in-memory relational store.
//!
//! Records of a user-defined type live in a [Table], reachable by a
//! primary key and by any number of typed secondary indexes. Every
//! table-tree and index-tree is a persistent, copy-on-write balanced
//! map ([avl::Tree]); a transaction snapshots the published root of
//! every tree at open time, so readers observe a stable view for as
//! long as they hold the [Txn]. A single writer at a time stages
//! mutations across all affected trees and publishes them on commit.
//!
//! Queries are composed programmatically from typed field handles:
//! indexed range/equality predicates narrow candidates by id-set
//! intersection, an optional ordering index drives enumeration order,
//! and results are delivered paginated, one-shot, counted or as a lazy
//! row iterator.
//!
//! ```ignore
//! let mut users = Table::new(|u: &User| Key::from(u.id));
//! let name = users.index_str(|u: &User| u.name.clone());
//! let age = users.index_int(|u: &User| u.age);
//!
//! let db = Db::init(&[&users])?;
//!
//! let mut txn = db.begin_write();
//! users.set(&mut txn, User { id: 1, name: "ann".into(), age: 30 })?;
//! txn.commit();
//!
//! let txn = db.begin_read();
//! let adults = users
//!     .select(&txn)
//!     .filter(age.ge(18))
//!     .order_by(&name)
//!     .page(10, 0)?;
//! ```

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// err_at!(Schema, msg: "duplicate table")
/// ```
///
/// ```ignore
/// err_at!(Fatal, std::io::read(buf))
/// ```
///
/// ```ignore
/// err_at!(Fatal, std::fs::read(file_path), "reading {:?}", file_path)
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("at {}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("at {}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("at {}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the failing
/// call site, and a message.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Internal invariant broken, typically points to a bug.
    Fatal(String, String),
    /// Table/index registration failure.
    Schema(String, String),
    /// Transaction misuse, like writing through a read-only txn.
    Txn(String, String),
    /// Lookup missed, a normal outcome of `get` and `one`.
    KeyNotFound(String, String),
    /// Caller supplied an argument the API cannot accept.
    InvalidInput(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, m) => write!(f, "{} Fatal: {}", p, m),
            Schema(p, m) => write!(f, "{} Schema: {}", p, m),
            Txn(p, m) => write!(f, "{} Txn: {}", p, m),
            KeyNotFound(p, m) => write!(f, "{} KeyNotFound: {}", p, m),
            InvalidInput(p, m) => write!(f, "{} InvalidInput: {}", p, m),
        }
    }
}

impl error::Error for Error {}

impl Error {
    /// Whether this error is a value-level miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_, _))
    }
}

/// Type alias for Result returns from this package's API.
pub type Result<T> = result::Result<T, Error>;

pub mod avl;
mod db;
mod field;
mod key;
mod select;
mod table;
mod types;
mod util;

pub use crate::db::{Db, Register, Registry, Txn};
pub use crate::field::{
    BinField, BoolField, Cond, Field, FloatField, IndexCond, IntField, MultiField, StrField,
};
pub use crate::key::Key;
pub use crate::select::{Dir, Lister, Rows};
pub use crate::table::Table;
pub use crate::types::Empty;
