mod field;
mod schema;
mod tuple;

pub use field::{CompareOp, Field, FieldType, STRING_LEN};
pub use schema::{Column, Schema, SchemaBuilder};
pub use tuple::Tuple;
