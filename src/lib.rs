pub mod export;
pub mod fetch;
pub mod reader;
pub mod schema;
pub mod source;

pub use reader::{read_fmp_xml, FmpError, FmpItem, FmpReader, FmpResult, NameResolver};
pub use schema::{Field, FieldKind, Record, Schema};
