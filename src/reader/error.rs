//! Error and warning types surfaced by the streaming decoder.

use std::fmt;
use thiserror::Error;

/// Result type for decoder operations
pub type FmpResult<T> = Result<T, FmpError>;

/// Fatal decoder errors. Every variant ends the traversal.
#[derive(Debug, Error)]
pub enum FmpError {
    // ==================
    // Malformed input
    // ==================
    /// The tokenizer rejected the document
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    /// An attribute could not be tokenized or unescaped
    #[error("malformed attribute on <{element}> at byte {position}: {message}")]
    Attribute {
        element: String,
        position: u64,
        message: String,
    },

    /// A CDATA section holds bytes that are not UTF-8
    #[error("malformed XML at byte {position}: CDATA section is not valid UTF-8: {source}")]
    InvalidUtf8 {
        position: u64,
        #[source]
        source: std::str::Utf8Error,
    },

    /// Document ended with elements still open
    #[error("unexpected end of document with {open} unclosed element(s)")]
    Truncated { open: usize },

    /// No `<FMPXMLRESULT>` root element was found
    #[error("document is not an FMPXMLRESULT export")]
    NotFmpXml,

    /// Document ended before `<RESULTSET>` was seen
    #[error("document has no <RESULTSET> section")]
    MissingResultSet,

    // ==================
    // Schema errors
    // ==================
    /// `<RESULTSET>` arrived before any `<DATABASE>` element
    #[error("missing <DATABASE> element before <RESULTSET>")]
    MissingDatabase,

    /// A required header attribute is absent
    #[error("missing {attribute} attribute on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// A header attribute has a value that cannot be parsed
    #[error("invalid {attribute}=\"{value}\" on <{element}>: expected {expected}")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
        expected: &'static str,
    },

    /// `TYPE` is neither `TEXT` nor `NUMBER`
    #[error("field \"{field}\" has unknown TYPE \"{value}\"")]
    UnknownFieldType { field: String, value: String },

    /// Two or more fields resolved to the same name
    #[error("there are duplicate sanitized names in the field list: {}; supply a custom NameResolver to disambiguate them", describe_duplicates(.duplicates))]
    DuplicateNames { duplicates: Vec<DuplicateName> },

    /// The name resolver broke its contract
    #[error("name resolver returned {actual} names for {expected} fields")]
    ResolverLength { expected: usize, actual: usize },

    /// Returned by custom resolvers that reject a field list on their own terms
    #[error("name resolver failed: {0}")]
    Resolver(String),

    // ==================
    // Row errors
    // ==================
    /// A `<ROW>` did not carry one value per field
    #[error("row {row}: found {actual} values, expected {expected}")]
    RowLength {
        row: u64,
        expected: usize,
        actual: usize,
    },

    /// A `<COL>` carried more than one `<DATA>` value; `column` is 1-based
    #[error("row {row}, column {column}: {count} repeated values are not supported")]
    RepeatedValues { row: u64, column: usize, count: u32 },

    // ==================
    // Count errors
    // ==================
    /// Number of rows differs from the result set's FOUND count. Raised at the
    /// first row past FOUND, or at end of document when rows are missing.
    #[error("result set declared FOUND=\"{declared}\" but contained {actual} rows")]
    RecordCount { declared: u64, actual: u64 },
}

impl FmpError {
    /// Row index carried by row-level errors, for diagnostics.
    pub fn row(&self) -> Option<u64> {
        match self {
            FmpError::RowLength { row, .. } | FmpError::RepeatedValues { row, .. } => Some(*row),
            _ => None,
        }
    }

    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            FmpError::MissingDatabase
                | FmpError::MissingAttribute { .. }
                | FmpError::InvalidAttribute { .. }
                | FmpError::UnknownFieldType { .. }
                | FmpError::DuplicateNames { .. }
                | FmpError::ResolverLength { .. }
                | FmpError::Resolver(_)
        )
    }
}

/// One sanitized name claimed by several source fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateName {
    pub sanitized_name: String,
    pub original_names: Vec<String>,
}

fn describe_duplicates(duplicates: &[DuplicateName]) -> String {
    duplicates
        .iter()
        .map(|d| format!("\"{}\" <- {:?}", d.sanitized_name, d.original_names))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Recoverable conditions noticed while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeWarning {
    /// Header RECORDS differs from RESULTSET FOUND; the export is a filtered subset.
    RecordCountMismatch { declared: u64, found: u64 },
    /// `<ERRORCODE>` reported a non-zero status
    ExportErrorCode(i64),
    /// Root element declares a namespace other than the FileMaker result namespace
    UnexpectedNamespace(String),
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeWarning::RecordCountMismatch { declared, found } => write!(
                f,
                "number of records in header ({}) does not match number of records in result set ({}); this export is a subset of the database",
                declared, found
            ),
            DecodeWarning::ExportErrorCode(code) => {
                write!(f, "export reported ERRORCODE {}", code)
            }
            DecodeWarning::UnexpectedNamespace(ns) => {
                write!(f, "unexpected root namespace \"{}\"", ns)
            }
        }
    }
}
