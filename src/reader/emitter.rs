// src/reader/emitter.rs

use std::{mem, sync::Arc};
use tracing::{debug, trace, warn};

use super::catalog::FieldCatalog;
use super::error::{DecodeWarning, FmpError, FmpResult};
use super::naming::{check_unique, sanitize_name, NameResolver};
use crate::schema::{Field, Record, Schema};

/// Coalesce the header into a `Schema` at the start of `<RESULTSET>`.
///
/// `found` is the result set's FOUND count and wins over the header's RECORDS.
pub fn finalize_schema(
    catalog: FieldCatalog,
    found: u64,
    resolver: &dyn NameResolver,
) -> FmpResult<(Schema, Option<DecodeWarning>)> {
    let declared = catalog
        .declared_record_count
        .ok_or(FmpError::MissingDatabase)?;
    let name = catalog
        .header_attributes
        .get("NAME")
        .cloned()
        .ok_or(FmpError::MissingAttribute {
            element: "DATABASE",
            attribute: "NAME",
        })?;

    let warning = if declared != found {
        let w = DecodeWarning::RecordCountMismatch { declared, found };
        warn!(declared, found, "{}", w);
        Some(w)
    } else {
        None
    };

    let names = resolver.resolve(&catalog.fields)?;
    if names.len() != catalog.fields.len() {
        return Err(FmpError::ResolverLength {
            expected: catalog.fields.len(),
            actual: names.len(),
        });
    }
    check_unique(&catalog.fields, &names)?;

    let fields: Vec<Field> = catalog
        .fields
        .into_iter()
        .zip(names)
        .map(|(def, name)| Field::from_definition(def, name))
        .collect();
    debug!(table = %name, fields = fields.len(), records = found, "schema ready");

    let schema = Schema {
        table_name: sanitize_name(&name),
        name,
        fields,
        declared_record_count: declared,
        resultset_record_count: found,
        header_attributes: catalog.header_attributes,
        product: catalog.product,
        error_code: catalog.error_code,
    };
    Ok((schema, warning))
}

/// Assembles one `Record` per `<ROW>` against a fixed schema.
#[derive(Debug)]
pub struct RecordEmitter {
    schema: Arc<Schema>,
    buffer: Vec<Option<String>>,
    rows: u64,
    in_row: bool,
    in_col: bool,
    col_values: u32,
}

impl RecordEmitter {
    pub fn new(schema: Arc<Schema>) -> Self {
        let width = schema.fields.len();
        Self {
            schema,
            buffer: Vec::with_capacity(width),
            rows: 0,
            in_row: false,
            in_col: false,
            col_values: 0,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Rows completed so far.
    pub fn rows_emitted(&self) -> u64 {
        self.rows
    }

    fn current_row(&self) -> u64 {
        self.rows + 1
    }

    pub fn open_row(&mut self) {
        self.buffer.clear();
        self.in_row = true;
        self.in_col = false;
    }

    pub fn open_col(&mut self) {
        if self.in_row {
            self.in_col = true;
            self.col_values = 0;
        }
    }

    /// Append one `<DATA>` value; `None` for an empty element.
    pub fn push_data(&mut self, value: Option<String>) -> FmpResult<()> {
        if !self.in_row {
            trace!("ignoring DATA outside ROW");
            return Ok(());
        }
        if self.in_col {
            self.col_values += 1;
            if self.col_values > 1 {
                return Err(FmpError::RepeatedValues {
                    row: self.current_row(),
                    column: self.buffer.len(),
                    count: self.col_values,
                });
            }
        }
        self.buffer.push(value);
        Ok(())
    }

    /// A `<COL>` without any `<DATA>` still occupies its position.
    pub fn close_col(&mut self) {
        if self.in_col && self.col_values == 0 {
            self.buffer.push(None);
        }
        self.in_col = false;
    }

    pub fn close_row(&mut self) -> FmpResult<Record> {
        let row = self.current_row();
        self.in_row = false;
        let declared = self.schema.resultset_record_count;
        if row > declared {
            self.buffer.clear();
            return Err(FmpError::RecordCount {
                declared,
                actual: row,
            });
        }
        let expected = self.schema.fields.len();
        if self.buffer.len() != expected {
            let actual = self.buffer.len();
            self.buffer.clear();
            return Err(FmpError::RowLength {
                row,
                expected,
                actual,
            });
        }
        self.rows = row;
        let values = mem::replace(&mut self.buffer, Vec::with_capacity(expected));
        Ok(Record::new(Arc::clone(&self.schema), row, values))
    }

    /// End-of-document check against the result set's FOUND count.
    pub fn finish(&self) -> FmpResult<()> {
        let declared = self.schema.resultset_record_count;
        if self.rows != declared {
            return Err(FmpError::RecordCount {
                declared,
                actual: self.rows,
            });
        }
        Ok(())
    }
}
