//! The namestore crate.
//!
//! This crate stores named rows in an sqlite DB.  There are 3 primary entities:
//!
//! - The store, which takes a file path and owns the sqlite side of things.
//! - The table descriptor, declared once through a builder as an ordered set of typed fields.
//! - The table binding, which exposes the row operations: `set`, `get`, `all`, `delete`, `delete_all`, `drop`, plus
//!   `count` for page math.
//!
//! Every row is addressable by a unique, human-readable `name` rather than its numeric id, which makes a table
//! behave like a directory of named records.  Structured (mapping/sequence) fields are serialized to JSON text on
//! the way in and parsed on the way out; the value codec round-trips every supported value.
//!
//! Everything is synchronous and single-threaded: each operation acquires a short-lived connection, runs one
//! statement set, and releases it.  There is no locking, so callers wanting concurrent writers on the same file must
//! serialize access themselves.
mod descriptor;
mod error;
pub mod logging;
mod row_value;
mod store;
mod table;

pub use descriptor::{FieldDescriptor, FieldType, TableBuilder, TableDescriptor};
pub use error::{Error, Result};
pub use row_value::{FieldValue, Row, RowPatch};
pub use store::Store;
pub use table::{Count, Table};
