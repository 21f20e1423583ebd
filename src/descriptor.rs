//! Table descriptors.
//!
//! A table is declared once, as an ordered set of typed fields, and the declaration is immutable for the table's
//! lifetime.  Every table additionally carries two implicit columns: `id`, an auto-assigned integer primary key, and
//! `name`, the unique text selector all row operations address rows by.  Neither may be redeclared as a field.
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::row_value::FieldValue;

lazy_static! {
    /// Table and field names end up interpolated into SQL text, so we only accept names that can never terminate or
    /// extend a statement.
    static ref IDENTIFIER: Regex = Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Columns every table carries implicitly.
const IMPLICIT_COLUMNS: &[&str] = &["id", "name"];

/// Semantic types of a table's declared fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// A 64-bit signed integer.
    Integer,
    /// A string.
    Text,
    /// A 64-bit float.  Precision is whatever the engine's REAL column provides.
    Float,
    /// A boolean, stored as integer 0 or 1.
    Boolean,
    /// A structured mapping or sequence, stored as serialized JSON text.
    Json,
}

impl FieldType {
    /// The sqlite column type backing this semantic type.
    pub(crate) fn sql_type(self) -> &'static str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::Text => "TEXT",
            FieldType::Float => "REAL",
            FieldType::Boolean => "INTEGER",
            FieldType::Json => "TEXT",
        }
    }

    /// The value a field takes when an insert doesn't supply it.
    pub(crate) fn default_value(self) -> FieldValue {
        match self {
            FieldType::Integer => FieldValue::Integer(0),
            FieldType::Text => FieldValue::Text(String::new()),
            FieldType::Float => FieldValue::Float(0.0),
            FieldType::Boolean => FieldValue::Boolean(false),
            FieldType::Json => FieldValue::Json(serde_json::Value::Null),
        }
    }
}

/// A declared field of a table.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
}

impl FieldDescriptor {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_field_type(&self) -> FieldType {
        self.field_type
    }
}

/// Description of a table: its name plus the declared fields, in declaration order.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl TableDescriptor {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn iter_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// A helper to build table descriptors.
pub struct TableBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl TableBuilder {
    pub fn new(name: String) -> Self {
        Self {
            name,
            fields: vec![],
        }
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if !IDENTIFIER.is_match(name) {
            return Err(Error::Validation(format!(
                "`{}` is not a usable field name",
                name
            )));
        }
        if IMPLICIT_COLUMNS.contains(&name) {
            return Err(Error::Validation(format!(
                "`{}` is an implicit column and may not be declared",
                name
            )));
        }
        if self.fields.iter().any(|f| f.get_name() == name) {
            return Err(Error::Validation(format!("duplicate field `{}`", name)));
        }
        Ok(())
    }

    fn add_field(&mut self, name: String, field_type: FieldType) -> Result<()> {
        self.check_name(&name)?;
        self.fields.push(FieldDescriptor { name, field_type });
        Ok(())
    }

    pub fn add_integer_field(&mut self, name: String) -> Result<()> {
        self.add_field(name, FieldType::Integer)
    }

    pub fn add_text_field(&mut self, name: String) -> Result<()> {
        self.add_field(name, FieldType::Text)
    }

    pub fn add_float_field(&mut self, name: String) -> Result<()> {
        self.add_field(name, FieldType::Float)
    }

    pub fn add_boolean_field(&mut self, name: String) -> Result<()> {
        self.add_field(name, FieldType::Boolean)
    }

    pub fn add_json_field(&mut self, name: String) -> Result<()> {
        self.add_field(name, FieldType::Json)
    }

    pub fn build(self) -> Result<TableDescriptor> {
        if !IDENTIFIER.is_match(&self.name) {
            return Err(Error::Validation(format!(
                "`{}` is not a usable table name",
                self.name
            )));
        }

        Ok(TableDescriptor {
            name: self.name,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_declaration() {
        let mut builder = TableBuilder::new("components".into());
        builder.add_integer_field("project_id".into()).unwrap();
        builder.add_text_field("docs".into()).unwrap();
        builder.add_float_field("weight".into()).unwrap();
        builder.add_boolean_field("visible".into()).unwrap();
        builder.add_json_field("meta".into()).unwrap();

        let descriptor = builder.build().unwrap();
        assert_eq!(descriptor.get_name(), "components");
        assert_eq!(descriptor.field_count(), 5);
        assert_eq!(
            descriptor.get_field("weight").unwrap().get_field_type(),
            FieldType::Float
        );
        assert!(descriptor.get_field("id").is_none());
    }

    #[test]
    fn rejects_duplicate_fields() {
        let mut builder = TableBuilder::new("t".into());
        builder.add_integer_field("a".into()).unwrap();
        assert!(matches!(
            builder.add_text_field("a".into()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_implicit_columns() {
        let mut builder = TableBuilder::new("t".into());
        assert!(builder.add_integer_field("id".into()).is_err());
        assert!(builder.add_text_field("name".into()).is_err());
    }

    #[test]
    fn rejects_unusable_identifiers() {
        let mut builder = TableBuilder::new("t".into());
        assert!(builder.add_integer_field("".into()).is_err());
        assert!(builder.add_integer_field("1abc".into()).is_err());
        assert!(builder.add_integer_field("a; DROP TABLE t".into()).is_err());
    }

    #[test]
    fn rejects_unusable_table_names() {
        assert!(TableBuilder::new("bad name".into()).build().is_err());
        assert!(TableBuilder::new("".into()).build().is_err());
    }
}
