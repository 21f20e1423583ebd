//! The store context.
//!
//! A store names the sqlite file backing a set of tables.  Opening it runs the pragma batch below once to verify the
//! file is usable; afterwards every table operation acquires its own short-lived connection through
//! [Store::connect] and releases it on every exit path, success or error.  Nothing is shared between operations,
//! which keeps the bindings free of connection state, but also means callers wanting concurrent writers must
//! serialize access themselves.
use std::path::{Path, PathBuf};

use log::*;

use crate::descriptor::TableDescriptor;
use crate::error::Result;
use crate::table::Table;

/// SQL that we run as part of opening a connection.
///
/// - Enables the busy timeout so another connection holding the file briefly produces a wait, not an immediate lock
///   error.
/// - Enables foreign key enforcement (we declare none, but a caller poking at the file might).
/// - Sets up WAL.
const INITIAL_SQL: &str = r#"
PRAGMA busy_timeout = 1000;
PRAGMA foreign_keys = 1;
pragma journal_mode = WAL;
"#;

/// A handle on one sqlite file.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open the store backed by the given file, creating the file if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Store> {
        let path = path.into();
        info!("Opening store at {}", path.display());
        let store = Store { path };
        // Surface unusable paths now rather than on the first table operation.
        store.connect()?;
        Ok(store)
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    /// Bind a declared table to this store.
    ///
    /// The backing table is created lazily by the binding's first operation.
    pub fn bind(&self, descriptor: TableDescriptor) -> Result<Table> {
        Table::new(self, descriptor)
    }

    /// Acquire a scoped connection.  Dropping it closes it, on every exit path.
    pub(crate) fn connect(&self) -> Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(&self.path)?;
        conn.execute_batch(INITIAL_SQL)?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens() {
        let tdir = tempfile::TempDir::new().unwrap();
        let path = tdir.path().join("store.sqlite");
        Store::open(&path).expect("Store should open");
        assert!(path.exists());
    }

    #[test]
    fn opens_twice() {
        let tdir = tempfile::TempDir::new().unwrap();
        let path = tdir.path().join("store.sqlite");
        Store::open(&path).expect("Store should open");
        Store::open(&path).expect("Store should reopen");
    }

    #[test]
    fn surfaces_unusable_paths() {
        let tdir = tempfile::TempDir::new().unwrap();
        let path = tdir.path().join("missing_dir").join("store.sqlite");
        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, crate::Error::Storage(_)));
    }
}
