// src/schema/types.rs

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Declared value kind of a field. Stored for consumers, never enforced.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldKind {
    Text,
    Number,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "TEXT",
            FieldKind::Number => "NUMBER",
        }
    }

    /// Exact, case-sensitive match on the export's `TYPE` token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "TEXT" => Some(FieldKind::Text),
            "NUMBER" => Some(FieldKind::Number),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `<FIELD>` as declared in the header, before a name has been resolved.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    pub allow_empty: bool,
    pub max_repeat: u32,
}

/// A single column of the decoded table.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct Field {
    pub original_name: String,
    pub sanitized_name: String,
    pub allow_empty: bool,
    pub max_repeat: u32,
    pub kind: FieldKind,
}

impl Field {
    pub fn from_definition(def: FieldDefinition, sanitized_name: String) -> Self {
        Self {
            original_name: def.name,
            sanitized_name,
            allow_empty: def.allow_empty,
            max_repeat: def.max_repeat,
            kind: def.kind,
        }
    }
}

/// `<PRODUCT>` element of the export.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Default)]
pub struct Product {
    pub name: Option<String>,
    pub version: Option<String>,
    pub build: Option<String>,
}

/// Everything known about the export once the header has been read.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq)]
pub struct Schema {
    /// `NAME` attribute of `<DATABASE>`, as declared.
    pub name: String,
    pub table_name: String,
    pub fields: Vec<Field>,
    pub declared_record_count: u64,
    /// `FOUND` attribute of `<RESULTSET>`; the number of records that follow.
    pub resultset_record_count: u64,
    pub header_attributes: BTreeMap<String, String>,
    pub product: Option<Product>,
    pub error_code: Option<i64>,
}

impl Schema {
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Column position of a sanitized name.
    pub fn position(&self, sanitized_name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.sanitized_name == sanitized_name)
    }

    /// `(original_name, sanitized_name)` pairs in column order.
    pub fn name_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|f| (f.original_name.as_str(), f.sanitized_name.as_str()))
    }

    /// True when the export only holds a filtered subset of the database.
    pub fn is_subset(&self) -> bool {
        self.declared_record_count != self.resultset_record_count
    }
}

/// One data row. Values line up 1:1 with `schema.fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    schema: Arc<Schema>,
    row: u64,
    values: Vec<Option<String>>,
}

impl Record {
    /// Callers guarantee `values.len() == schema.fields.len()`.
    pub(crate) fn new(schema: Arc<Schema>, row: u64, values: Vec<Option<String>>) -> Self {
        debug_assert_eq!(values.len(), schema.fields.len());
        Self {
            schema,
            row,
            values,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// 1-based row index within the result set.
    pub fn row(&self) -> u64 {
        self.row
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Option<String>> {
        self.values
    }

    pub fn get(&self, sanitized_name: &str) -> Option<&str> {
        self.schema
            .position(sanitized_name)
            .and_then(|i| self.values[i].as_deref())
    }

    /// `(sanitized_name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.schema
            .fields
            .iter()
            .zip(self.values.iter())
            .map(|(f, v)| (f.sanitized_name.as_str(), v.as_deref()))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<Schema> {
        let fields = vec![
            Field {
                original_name: "Titel".into(),
                sanitized_name: "titel".into(),
                allow_empty: true,
                max_repeat: 1,
                kind: FieldKind::Text,
            },
            Field {
                original_name: "Jaar".into(),
                sanitized_name: "jaar".into(),
                allow_empty: false,
                max_repeat: 1,
                kind: FieldKind::Number,
            },
        ];
        Arc::new(Schema {
            name: "ceneton.fp7".into(),
            table_name: "ceneton_fp7".into(),
            fields,
            declared_record_count: 2,
            resultset_record_count: 2,
            header_attributes: BTreeMap::new(),
            product: None,
            error_code: None,
        })
    }

    #[test]
    fn record_serializes_as_object_keyed_by_sanitized_name() {
        let record = Record::new(schema(), 1, vec![Some("Gysbreght".into()), None]);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"titel":"Gysbreght","jaar":null}"#);
    }

    #[test]
    fn record_lookup_by_name() {
        let record = Record::new(schema(), 3, vec![None, Some("1637".into())]);
        assert_eq!(record.get("jaar"), Some("1637"));
        assert_eq!(record.get("titel"), None);
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.row(), 3);
    }

    #[test]
    fn field_kind_tokens_are_exact() {
        assert_eq!(FieldKind::from_token("TEXT"), Some(FieldKind::Text));
        assert_eq!(FieldKind::from_token("NUMBER"), Some(FieldKind::Number));
        assert_eq!(FieldKind::from_token("number"), None);
        assert_eq!(FieldKind::from_token("DATE"), None);
    }
}
