pub mod types;

pub use types::{Field, FieldDefinition, FieldKind, Product, Record, Schema};
