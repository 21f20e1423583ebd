//! Field values, rows, and the codec between them and sqlite column values.
//!
//! A field value has one of five semantic types: a 64-bit signed integer, a string, a 64-bit float, a boolean, or a
//! structured value which is serialized to JSON text for storage.  `decode(encode(v)) == v` holds for every valid
//! value of a declared type, with floats subject to whatever precision the REAL column provides.
//!
//! We anticipate tables staying narrow, so rows and patches keep their fields in a `SmallVec` map rather than a hash
//! map.
use smallvec::SmallVec;

use crate::descriptor::{FieldType, TableDescriptor};
use crate::error::{Error, Result};

/// The value of one declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    Float(f64),
    Boolean(bool),
    Json(serde_json::Value),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Json(_) => FieldType::Json,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FieldValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// The JSON rendering of this value, used when marshalling rows into structs.
    fn to_json(&self, what: &str) -> Result<serde_json::Value> {
        Ok(match self {
            FieldValue::Integer(i) => serde_json::Value::from(*i),
            FieldValue::Text(s) => serde_json::Value::from(s.as_str()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Error::Deserialization {
                    what: what.to_string(),
                    message: "non-finite float has no JSON rendering".to_string(),
                })?,
            FieldValue::Boolean(b) => serde_json::Value::from(*b),
            FieldValue::Json(v) => v.clone(),
        })
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        FieldValue::Json(v)
    }
}

/// Encode a field value into a storable column value.
pub(crate) fn encode(field: &str, value: &FieldValue) -> Result<rusqlite::types::Value> {
    use rusqlite::types::Value;

    Ok(match value {
        FieldValue::Integer(i) => Value::Integer(*i),
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Float(f) => Value::Real(*f),
        FieldValue::Boolean(b) => Value::Integer(*b as i64),
        FieldValue::Json(v) => Value::Text(serde_json::to_string(v).map_err(|e| {
            Error::Serialization {
                what: format!("field `{}`", field),
                source: e,
            }
        })?),
    })
}

/// Decode a stored column value back into a field value of the declared type.
///
/// Under normal operation this can only fail via external corruption of the backing file: the bindings never store
/// anything `decode` rejects.
pub(crate) fn decode(
    field: &str,
    field_type: FieldType,
    stored: rusqlite::types::ValueRef,
) -> Result<FieldValue> {
    use rusqlite::types::ValueRef;

    match (field_type, stored) {
        (FieldType::Integer, ValueRef::Integer(i)) => Ok(FieldValue::Integer(i)),
        (FieldType::Text, ValueRef::Text(bytes)) => {
            Ok(FieldValue::Text(text_from_bytes(field, bytes)?))
        }
        (FieldType::Float, ValueRef::Real(f)) => Ok(FieldValue::Float(f)),
        // REAL affinity normally hands floats back, but an integer-valued cell is still fine.
        (FieldType::Float, ValueRef::Integer(i)) => Ok(FieldValue::Float(i as f64)),
        (FieldType::Boolean, ValueRef::Integer(i)) => Ok(FieldValue::Boolean(i != 0)),
        (FieldType::Json, ValueRef::Text(bytes)) => {
            let text = text_from_bytes(field, bytes)?;
            let parsed =
                serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                    what: format!("field `{}`", field),
                    message: e.to_string(),
                })?;
            Ok(FieldValue::Json(parsed))
        }
        (expected, other) => Err(Error::Deserialization {
            what: format!("field `{}`", field),
            message: format!(
                "expected {:?}, found a {:?} column value",
                expected,
                other.data_type()
            ),
        }),
    }
}

fn text_from_bytes(field: &str, bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|e| Error::Deserialization {
            what: format!("field `{}`", field),
            message: e.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq)]
struct FieldEntry {
    name: String,
    value: FieldValue,
}

type FieldMap = SmallVec<[FieldEntry; 8]>;

/// One stored record, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    id: i64,
    name: String,
    fields: FieldMap,
}

impl Row {
    /// The auto-assigned integer id.  Unique, but not the operational selector.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The unique selector this row is addressed by.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|e| e.name == field)
            .map(|e| &e.value)
    }

    pub fn iter_fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|e| (e.name.as_str(), &e.value))
    }

    /// Decode this row into any deserializable struct whose field names match the declaration (plus `id` and
    /// `name`).
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let mut object = serde_json::Map::new();
        object.insert("id".to_string(), serde_json::Value::from(self.id));
        object.insert(
            "name".to_string(),
            serde_json::Value::from(self.name.as_str()),
        );
        for entry in self.fields.iter() {
            object.insert(
                entry.name.clone(),
                entry.value.to_json(&format!("field `{}`", entry.name))?,
            );
        }

        serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
            Error::Deserialization {
                what: format!("row `{}`", self.name),
                message: e.to_string(),
            }
        })
    }

    /// Decode a just-queried sqlite row.
    ///
    /// Column order is fixed by the binding's select statements: `id`, `name`, then the declared fields in
    /// declaration order.
    pub(crate) fn from_sql_row(descriptor: &TableDescriptor, row: &rusqlite::Row) -> Result<Row> {
        use rusqlite::types::ValueRef;

        let id = match row.get_ref(0)? {
            ValueRef::Integer(i) => i,
            other => {
                return Err(Error::Deserialization {
                    what: "column `id`".to_string(),
                    message: format!(
                        "expected an integer, found a {:?} column value",
                        other.data_type()
                    ),
                })
            }
        };
        let name = match row.get_ref(1)? {
            ValueRef::Text(bytes) => text_from_bytes("name", bytes)?,
            other => {
                return Err(Error::Deserialization {
                    what: "column `name`".to_string(),
                    message: format!(
                        "expected text, found a {:?} column value",
                        other.data_type()
                    ),
                })
            }
        };

        let mut fields: FieldMap = Default::default();
        for (index, fd) in descriptor.iter_fields().enumerate() {
            let stored = row.get_ref(2 + index)?;
            fields.push(FieldEntry {
                name: fd.get_name().to_string(),
                value: decode(fd.get_name(), fd.get_field_type(), stored)?,
            });
        }

        Ok(Row { id, name, fields })
    }
}

/// The fields supplied to a single `set` call.
///
/// Fields left out of a patch are untouched on update, and take their type default on insert.
#[derive(Debug, Clone, Default)]
pub struct RowPatch {
    entries: FieldMap,
}

impl RowPatch {
    pub fn new() -> Self {
        Default::default()
    }

    /// Supply one field, replacing any earlier value for the same field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            existing.value = value;
        } else {
            self.entries.push(FieldEntry { name, value });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|e| e.name == field)
            .map(|e| &e.value)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.value))
    }

    /// Build a patch from any serializable struct, typed against the table's declaration.
    ///
    /// `id` and `name` entries are dropped (the operation carries them, not the patch), and null entries are treated
    /// as unsupplied.
    pub fn from_serialized<T: serde::Serialize>(
        descriptor: &TableDescriptor,
        value: &T,
    ) -> Result<RowPatch> {
        // serde_json is a convenient way to get at the fields of an arbitrary serializable value without writing a
        // custom serializer.
        let json = serde_json::to_value(value).map_err(|e| Error::Serialization {
            what: "patch source".to_string(),
            source: e,
        })?;
        let object = match json {
            serde_json::Value::Object(o) => o,
            _ => {
                return Err(Error::Validation(
                    "patches must be built from a struct or mapping".to_string(),
                ))
            }
        };

        let mut patch = RowPatch::new();
        for (key, supplied) in object.into_iter() {
            if key == "id" || key == "name" {
                continue;
            }
            let fd = descriptor.get_field(&key).ok_or_else(|| {
                Error::Validation(format!(
                    "table `{}` declares no field `{}`",
                    descriptor.get_name(),
                    key
                ))
            })?;
            if supplied.is_null() {
                continue;
            }

            let value = match fd.get_field_type() {
                FieldType::Integer => FieldValue::Integer(
                    supplied
                        .as_i64()
                        .ok_or_else(|| type_mismatch(&key, FieldType::Integer))?,
                ),
                FieldType::Text => FieldValue::Text(
                    supplied
                        .as_str()
                        .ok_or_else(|| type_mismatch(&key, FieldType::Text))?
                        .to_string(),
                ),
                FieldType::Float => FieldValue::Float(
                    supplied
                        .as_f64()
                        .ok_or_else(|| type_mismatch(&key, FieldType::Float))?,
                ),
                FieldType::Boolean => FieldValue::Boolean(
                    supplied
                        .as_bool()
                        .ok_or_else(|| type_mismatch(&key, FieldType::Boolean))?,
                ),
                FieldType::Json => FieldValue::Json(supplied),
            };
            patch = patch.field(key, value);
        }

        Ok(patch)
    }
}

fn type_mismatch(field: &str, expected: FieldType) -> Error {
    Error::Validation(format!(
        "field `{}` is declared {:?} but the supplied value doesn't fit",
        field, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn roundtrip(value: FieldValue) -> FieldValue {
        let encoded = encode("f", &value).expect("Should encode");
        decode(
            "f",
            value.field_type(),
            rusqlite::types::ValueRef::from(&encoded),
        )
        .expect("Should decode")
    }

    #[test]
    fn roundtrips_each_type() {
        for value in [
            FieldValue::Integer(-42),
            FieldValue::Text("hello".into()),
            FieldValue::Float(1.5),
            FieldValue::Boolean(true),
            FieldValue::Boolean(false),
            FieldValue::Json(serde_json::json!({"author": "John"})),
            FieldValue::Json(serde_json::json!([1, 2, 3])),
            FieldValue::Json(serde_json::Value::Null),
        ] {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn malformed_stored_json_is_deserialization() {
        let err = decode(
            "meta",
            FieldType::Json,
            rusqlite::types::ValueRef::Text(b"{not json"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[test]
    fn column_type_mismatch_is_deserialization() {
        let err = decode(
            "project_id",
            FieldType::Integer,
            rusqlite::types::ValueRef::Text(b"surprise"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[test]
    fn patch_replaces_repeated_fields() {
        let patch = RowPatch::new().field("a", 1).field("a", 2);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("a"), Some(&FieldValue::Integer(2)));
    }

    fn test_descriptor() -> TableDescriptor {
        let mut builder = crate::descriptor::TableBuilder::new("t".into());
        builder.add_integer_field("count".into()).unwrap();
        builder.add_text_field("label".into()).unwrap();
        builder.add_float_field("weight".into()).unwrap();
        builder.add_boolean_field("visible".into()).unwrap();
        builder.add_json_field("meta".into()).unwrap();
        builder.build().unwrap()
    }

    #[derive(serde::Serialize)]
    struct PatchSource {
        count: i64,
        label: String,
        weight: f64,
        visible: bool,
        meta: serde_json::Value,
    }

    #[test]
    fn builds_patches_from_structs() {
        let descriptor = test_descriptor();
        let patch = RowPatch::from_serialized(
            &descriptor,
            &PatchSource {
                count: 3,
                label: "x".into(),
                weight: 0.5,
                visible: true,
                meta: serde_json::json!({"a": "b"}),
            },
        )
        .unwrap();

        assert_eq!(patch.len(), 5);
        assert_eq!(patch.get("count"), Some(&FieldValue::Integer(3)));
        assert_eq!(patch.get("visible"), Some(&FieldValue::Boolean(true)));
        assert_eq!(
            patch.get("meta"),
            Some(&FieldValue::Json(serde_json::json!({"a": "b"})))
        );
    }

    #[test]
    fn struct_patches_reject_undeclared_fields() {
        #[derive(serde::Serialize)]
        struct Unknown {
            mystery: i64,
        }

        let err = RowPatch::from_serialized(&test_descriptor(), &Unknown { mystery: 1 })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn struct_patches_skip_nulls_and_identity() {
        #[derive(serde::Serialize)]
        struct Partial {
            id: i64,
            name: String,
            count: Option<i64>,
            label: String,
        }

        let patch = RowPatch::from_serialized(
            &test_descriptor(),
            &Partial {
                id: 9,
                name: "ignored".into(),
                count: None,
                label: "kept".into(),
            },
        )
        .unwrap();

        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("label"), Some(&FieldValue::Text("kept".into())));
    }

    #[test]
    fn non_mapping_patch_sources_are_rejected() {
        let err = RowPatch::from_serialized(&test_descriptor(), &42i64).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    proptest! {
        #[test]
        fn integer_roundtrip_law(v in any::<i64>()) {
            prop_assert_eq!(roundtrip(FieldValue::Integer(v)), FieldValue::Integer(v));
        }

        #[test]
        fn text_roundtrip_law(v in ".*") {
            prop_assert_eq!(roundtrip(FieldValue::Text(v.clone())), FieldValue::Text(v));
        }

        // Finite floats only: NaN has no equality and doesn't survive a REAL column anyway.
        #[test]
        fn float_roundtrip_law(v in -1.0e12f64..1.0e12) {
            prop_assert_eq!(roundtrip(FieldValue::Float(v)), FieldValue::Float(v));
        }

        #[test]
        fn json_roundtrip_law(entries in proptest::collection::hash_map(".*", ".*", 0..8)) {
            let v = FieldValue::Json(serde_json::to_value(&entries).unwrap());
            prop_assert_eq!(roundtrip(v.clone()), v);
        }
    }
}
