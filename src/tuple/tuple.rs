use std::fmt;
use std::sync::Arc;

use crate::common::{DbError, RecordId, Result};

use super::{Field, Schema};

/// A single row: a vector of fields conforming to a schema, plus the
/// record identity of its slot when it was read from storage. Tuples
/// produced by operators above the storage layer carry no record id.
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a new tuple with the given schema and values.
    ///
    /// # Panics
    /// Panics if the number of values doesn't match the schema field count.
    pub fn new(schema: Arc<Schema>, fields: Vec<Field>) -> Self {
        assert_eq!(
            fields.len(),
            schema.num_fields(),
            "field count must match schema"
        );
        Self {
            schema,
            fields,
            record_id: None,
        }
    }

    /// Returns the schema of this tuple.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the field at the given index.
    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    /// Returns all fields in schema order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Replaces the field at the given index.
    pub fn set_field(&mut self, index: usize, field: Field) {
        self.fields[index] = field;
    }

    /// Returns the record identity, if this tuple was read from storage.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Serializes the tuple into its fixed-width on-disk form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.schema.byte_size());
        for field in &self.fields {
            field.serialize_into(&mut buf);
        }
        buf
    }

    /// Deserializes a tuple of the given schema from raw bytes.
    pub fn from_bytes(schema: Arc<Schema>, data: &[u8]) -> Result<Self> {
        if data.len() < schema.byte_size() {
            return Err(DbError::Db(format!(
                "truncated tuple: need {} bytes, have {}",
                schema.byte_size(),
                data.len()
            )));
        }
        let mut fields = Vec::with_capacity(schema.num_fields());
        let mut offset = 0;
        for column in schema.columns() {
            let field_type = column.field_type();
            fields.push(Field::deserialize(field_type, &data[offset..])?);
            offset += field_type.byte_size();
        }
        Ok(Self {
            schema,
            fields,
            record_id: None,
        })
    }

    /// Concatenates two tuples into one over the merged schema. The result
    /// carries no record identity.
    pub fn merge(left: &Tuple, right: &Tuple) -> Tuple {
        let schema = Arc::new(Schema::merge(left.schema(), right.schema()));
        let mut fields = left.fields.clone();
        fields.extend(right.fields.iter().cloned());
        Tuple::new(schema, fields)
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{field}")?;
        }
        Ok(())
    }
}
