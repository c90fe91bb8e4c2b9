use std::fmt;
use std::sync::Arc;

use super::FieldType;

/// A single column in a tuple schema.
#[derive(Debug, Clone)]
pub struct Column {
    field_type: FieldType,
    /// Column names are informational; anonymous columns are legal.
    name: Option<String>,
}

impl Column {
    pub fn new(field_type: FieldType, name: Option<String>) -> Self {
        Self { field_type, name }
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Describes the fields of a tuple: an ordered sequence of typed,
/// optionally named columns. All tuples of a table share one schema.
///
/// Equality compares type sequences only, so two tables with the same
/// column types but different names are schema-compatible.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a new schema from a list of columns.
    ///
    /// # Panics
    /// Panics if `columns` is empty; every tuple has at least one field.
    pub fn new(columns: Vec<Column>) -> Self {
        assert!(!columns.is_empty(), "a schema must have at least one field");
        Self { columns }
    }

    /// Creates a schema of unnamed columns from a type list.
    pub fn of(types: &[FieldType]) -> Self {
        Self::new(types.iter().map(|&t| Column::new(t, None)).collect())
    }

    /// Creates a schema builder for fluent construction.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Returns the number of fields in the schema.
    pub fn num_fields(&self) -> usize {
        self.columns.len()
    }

    /// Returns the column at the given index.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns the type of the field at the given index.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub fn field_type(&self, index: usize) -> FieldType {
        self.columns[index].field_type
    }

    /// Returns the name of the field at the given index, if any.
    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).and_then(|c| c.name())
    }

    /// Returns the index of the first field with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == Some(name))
    }

    /// Returns an iterator over all columns.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Returns the number of bytes a tuple of this schema occupies on disk,
    /// the sum of the fixed per-type widths.
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(|c| c.field_type.byte_size()).sum()
    }

    /// Concatenates two schemas into the schema of their joined tuples.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let mut columns = left.columns.clone();
        columns.extend(right.columns.iter().cloned());
        Schema::new(columns)
    }

    /// Returns a copy of this schema with every column renamed to
    /// `prefix.name` (anonymous columns become `prefix.null`).
    pub fn with_prefix(&self, prefix: &str) -> Schema {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let name = c.name().unwrap_or("null");
                Column::new(c.field_type, Some(format!("{prefix}.{name}")))
            })
            .collect();
        Schema::new(columns)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", c.name().unwrap_or("null"), c.field_type)?;
        }
        write!(f, ")")
    }
}

/// Builder for constructing schemas fluently.
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Adds a named column.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.columns.push(Column::new(field_type, Some(name.into())));
        self
    }

    /// Adds an anonymous column.
    pub fn anon(mut self, field_type: FieldType) -> Self {
        self.columns.push(Column::new(field_type, None));
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.columns)
    }

    /// Builds the schema wrapped in an Arc for shared ownership.
    pub fn build_arc(self) -> Arc<Schema> {
        Arc::new(self.build())
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
