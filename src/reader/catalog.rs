// src/reader/catalog.rs

use std::collections::BTreeMap;
use tracing::{debug, trace};

use super::error::{FmpError, FmpResult};
use crate::schema::{FieldDefinition, FieldKind, Product};

/// Attributes of one start tag, in document order, already unescaped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: String, value: String) {
        self.0.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn require<'a>(
    attrs: &'a Attributes,
    element: &'static str,
    attribute: &'static str,
) -> FmpResult<&'a str> {
    attrs
        .get(attribute)
        .ok_or(FmpError::MissingAttribute { element, attribute })
}

pub(crate) fn parse_count(
    value: &str,
    element: &'static str,
    attribute: &'static str,
) -> FmpResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| FmpError::InvalidAttribute {
            element,
            attribute,
            value: value.to_string(),
            expected: "a non-negative integer",
        })
}

/// Header metadata gathered before `<RESULTSET>`.
#[derive(Debug, Default)]
pub struct FieldCatalog {
    pub header_attributes: BTreeMap<String, String>,
    pub declared_record_count: Option<u64>,
    pub fields: Vec<FieldDefinition>,
    pub product: Option<Product>,
    pub error_code: Option<i64>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<DATABASE NAME=".." RECORDS=".." .../>`: keep every attribute, require RECORDS.
    pub fn add_database(&mut self, attrs: &Attributes) -> FmpResult<()> {
        for (k, v) in attrs.iter() {
            self.header_attributes.insert(k.to_string(), v.to_string());
        }
        let records = self
            .header_attributes
            .get("RECORDS")
            .ok_or(FmpError::MissingAttribute {
                element: "DATABASE",
                attribute: "RECORDS",
            })?;
        let count = parse_count(records, "DATABASE", "RECORDS")?;
        debug!(records = count, "read database header");
        self.declared_record_count = Some(count);
        Ok(())
    }

    /// `<FIELD EMPTYOK="YES" MAXREPEAT="1" NAME="Aantal bedr." TYPE="TEXT"/>`
    pub fn add_field(&mut self, attrs: &Attributes) -> FmpResult<()> {
        let name = require(attrs, "FIELD", "NAME")?;
        let type_token = require(attrs, "FIELD", "TYPE")?;
        let empty_ok = require(attrs, "FIELD", "EMPTYOK")?;
        let max_repeat = require(attrs, "FIELD", "MAXREPEAT")?;

        let kind = FieldKind::from_token(type_token).ok_or_else(|| FmpError::UnknownFieldType {
            field: name.to_string(),
            value: type_token.to_string(),
        })?;
        let max_repeat = max_repeat
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| FmpError::InvalidAttribute {
                element: "FIELD",
                attribute: "MAXREPEAT",
                value: max_repeat.to_string(),
                expected: "a positive integer",
            })?;

        let def = FieldDefinition {
            name: name.to_string(),
            kind,
            allow_empty: empty_ok == "YES",
            max_repeat,
        };
        trace!(name = %def.name, kind = %def.kind, "read field");
        self.fields.push(def);
        Ok(())
    }

    pub fn set_product(&mut self, attrs: &Attributes) {
        self.product = Some(Product {
            name: attrs.get("NAME").map(str::to_string),
            version: attrs.get("VERSION").map(str::to_string),
            build: attrs.get("BUILD").map(str::to_string),
        });
    }

    /// `<ERRORCODE>0</ERRORCODE>`; unparsable text is ignored.
    pub fn set_error_code(&mut self, text: &str) {
        match text.trim().parse::<i64>() {
            Ok(code) => self.error_code = Some(code),
            Err(_) => debug!(text, "ignoring unparsable ERRORCODE"),
        }
    }
}
