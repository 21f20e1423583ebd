//! The table binding.
//!
//! A binding pairs one store with one table descriptor and exposes the named-row operations.  The backing table is
//! created lazily by the first operation; [Table::drop] removes it, and the next operation recreates it empty.
//!
//! Every operation acquires a scoped connection from the store, executes one statement set, and releases it.  Rows
//! come back in store-default order (no ORDER BY), which is not guaranteed stable across sqlite versions.
use std::cell::Cell;

use itertools::Itertools;
use log::*;

use crate::descriptor::TableDescriptor;
use crate::error::{Error, Result};
use crate::row_value::{encode, Row, RowPatch};
use crate::store::Store;

const CREATE_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS {{ table }} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE{% for c in column_defs %},
    {{ c }}{% endfor %}
)
"#;

const SELECT_TEMPLATE: &str = r#"
SELECT id, name{% for c in columns %}, {{ c }}{% endfor %} FROM {{ table }}
"#;

const INSERT_TEMPLATE: &str = r#"
INSERT INTO {{ table }}(name{% for c in columns %}, {{ c }}{% endfor %})
VALUES (?{% for c in columns %}, ?{% endfor %})
"#;

/// Build the quoted table identifier.
fn build_table_ident(table: &str) -> String {
    format!("`{}`", table)
}

/// Pagination info returned by [Table::count].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count {
    pub total: u64,
    pub pages: u64,
    pub per_page: u64,
}

/// The runtime object bound to one table declaration.
///
/// Get one from [Store::bind].  All operations address rows by their unique `name`.
pub struct Table {
    store: Store,
    descriptor: TableDescriptor,
    ident: String,
    create_sql: String,
    select_all_sql: String,
    select_one_sql: String,
    insert_sql: String,
    /// Whether we've issued the create statement yet.  Reset by [Table::drop].
    created: Cell<bool>,
}

impl Table {
    pub(crate) fn new(store: &Store, descriptor: TableDescriptor) -> Result<Table> {
        let ident = build_table_ident(descriptor.get_name());
        info!(
            "Binding table {} with fields: {}",
            ident,
            descriptor.iter_fields().map(|f| f.get_name()).join(", ")
        );

        let columns = descriptor
            .iter_fields()
            .map(|f| f.get_name())
            .collect::<Vec<_>>();
        let column_defs = descriptor
            .iter_fields()
            .map(|f| format!("{} {} NOT NULL", f.get_name(), f.get_field_type().sql_type()))
            .collect::<Vec<_>>();

        let mut context = tera::Context::new();
        context.insert("table", &ident);
        context.insert("columns", &columns);
        context.insert("column_defs", &column_defs);

        let create_sql = tera::Tera::one_off(CREATE_TEMPLATE, &context, false)?
            .trim()
            .to_string();
        let select_all_sql = tera::Tera::one_off(SELECT_TEMPLATE, &context, false)?
            .trim()
            .to_string();
        let insert_sql = tera::Tera::one_off(INSERT_TEMPLATE, &context, false)?
            .trim()
            .to_string();
        let select_one_sql = format!("{} WHERE name = ?", select_all_sql);
        debug!("Create statement for {}: {}", ident, create_sql);
        debug!("Select statement for {}: {}", ident, select_all_sql);
        debug!("Insert statement for {}: {}", ident, insert_sql);

        Ok(Table {
            store: store.clone(),
            descriptor,
            ident,
            create_sql,
            select_all_sql,
            select_one_sql,
            insert_sql,
            created: Cell::new(false),
        })
    }

    pub fn get_descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    fn ensure_ready(&self, conn: &rusqlite::Connection) -> Result<()> {
        if self.created.get() {
            return Ok(());
        }
        debug!("Creating table {} if missing", self.ident);
        conn.execute_batch(&self.create_sql)?;
        self.created.set(true);
        Ok(())
    }

    fn not_found(&self, name: &str) -> Error {
        Error::NotFound {
            table: self.descriptor.get_name().to_string(),
            name: name.to_string(),
        }
    }

    /// Check a patch against the declaration before anything hits sqlite.
    fn check_patch(&self, patch: &RowPatch) -> Result<()> {
        for (field, value) in patch.iter() {
            let fd = self.descriptor.get_field(field).ok_or_else(|| {
                Error::Validation(format!(
                    "table `{}` declares no field `{}` (id and name are implicit)",
                    self.descriptor.get_name(),
                    field
                ))
            })?;
            if value.field_type() != fd.get_field_type() {
                return Err(Error::Validation(format!(
                    "field `{}` is declared {:?} but the patch supplies {:?}",
                    field,
                    fd.get_field_type(),
                    value.field_type()
                )));
            }
        }
        Ok(())
    }

    /// Insert or update the row named `name`, returning the resulting row.
    ///
    /// Existing rows get a partial update: only the supplied fields change.  New rows take type defaults for
    /// whatever the patch leaves out.  A unique-constraint race with a writer outside this binding surfaces as
    /// [Error::Constraint]; we never retry.
    pub fn set(&self, name: &str, patch: &RowPatch) -> Result<Row> {
        if name.is_empty() {
            return Err(Error::Validation(
                "rows must be addressed by a non-empty name".to_string(),
            ));
        }
        self.check_patch(patch)?;

        let mut conn = self.store.connect()?;
        self.ensure_ready(&conn)?;
        let tx = conn.transaction()?;

        let existing = tx
            .prepare(&format!("SELECT 1 FROM {} WHERE name = ?", self.ident))?
            .exists(rusqlite::params![name])?;

        if existing {
            if !patch.is_empty() {
                // Field names were checked against the declaration above, and declarations only accept plain
                // identifiers, so interpolation is safe.
                let assignments = patch.iter().map(|(f, _)| format!("{} = ?", f)).join(", ");
                let sql = format!("UPDATE {} SET {} WHERE name = ?", self.ident, assignments);
                let mut values = Vec::with_capacity(patch.len() + 1);
                for (field, value) in patch.iter() {
                    values.push(encode(field, value)?);
                }
                values.push(rusqlite::types::Value::Text(name.to_string()));
                tx.execute(&sql, rusqlite::params_from_iter(values))?;
            }
        } else {
            let mut values = Vec::with_capacity(self.descriptor.field_count() + 1);
            values.push(rusqlite::types::Value::Text(name.to_string()));
            for fd in self.descriptor.iter_fields() {
                let value = match patch.get(fd.get_name()) {
                    Some(v) => v.clone(),
                    None => fd.get_field_type().default_value(),
                };
                values.push(encode(fd.get_name(), &value)?);
            }
            tx.execute(&self.insert_sql, rusqlite::params_from_iter(values))?;
        }

        let row = {
            let mut stmt = tx.prepare(&self.select_one_sql)?;
            let mut rows = stmt.query(rusqlite::params![name])?;
            match rows.next()? {
                Some(r) => Row::from_sql_row(&self.descriptor, r)?,
                None => return Err(self.not_found(name)),
            }
        };
        tx.commit()?;
        Ok(row)
    }

    /// Marshal any serializable struct into a patch and upsert it under `name`.
    pub fn set_serialized<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<Row> {
        let patch = RowPatch::from_serialized(&self.descriptor, value)?;
        self.set(name, &patch)
    }

    /// Fetch the row named `name`, or [Error::NotFound].
    pub fn get(&self, name: &str) -> Result<Row> {
        let conn = self.store.connect()?;
        self.ensure_ready(&conn)?;

        let mut stmt = conn.prepare(&self.select_one_sql)?;
        let mut rows = stmt.query(rusqlite::params![name])?;
        match rows.next()? {
            Some(r) => Row::from_sql_row(&self.descriptor, r),
            None => Err(self.not_found(name)),
        }
    }

    /// Fetch every row, in store-default order.
    pub fn all(&self) -> Result<Vec<Row>> {
        let conn = self.store.connect()?;
        self.ensure_ready(&conn)?;

        let mut ret = vec![];
        let mut stmt = conn.prepare(&self.select_all_sql)?;
        let mut rows = stmt.query([])?;
        while let Some(r) = rows.next()? {
            ret.push(Row::from_sql_row(&self.descriptor, r)?);
        }
        Ok(ret)
    }

    /// Remove the row named `name`.  Returns whether anything was removed; a miss is a normal result.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let conn = self.store.connect()?;
        self.ensure_ready(&conn)?;

        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE name = ?", self.ident),
            rusqlite::params![name],
        )?;
        Ok(removed > 0)
    }

    /// Remove every row in the table.  Returns the number removed.
    pub fn delete_all(&self) -> Result<u64> {
        let conn = self.store.connect()?;
        self.ensure_ready(&conn)?;

        let removed = conn.execute(&format!("DELETE FROM {}", self.ident), [])?;
        Ok(removed as u64)
    }

    /// Remove the table itself.  The next operation on this binding recreates it empty.
    pub fn drop(&self) -> Result<()> {
        let conn = self.store.connect()?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", self.ident))?;
        self.created.set(false);
        Ok(())
    }

    /// Count rows, with page math for the given page size.
    pub fn count(&self, per_page: u64) -> Result<Count> {
        if per_page == 0 {
            return Err(Error::Validation("per_page must be at least 1".to_string()));
        }

        let conn = self.store.connect()?;
        self.ensure_ready(&conn)?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.ident),
            [],
            |r| r.get(0),
        )?;
        let total = total as u64;
        let pages = (total + per_page - 1) / per_page;
        Ok(Count {
            total,
            pages,
            per_page,
        })
    }
}
