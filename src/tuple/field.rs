use std::cmp::Ordering;
use std::fmt;

use crate::common::{DbError, Result};

/// Maximum payload length of a string field in bytes. Strings are stored
/// length-prefixed in a fixed-width slot, so longer values are truncated.
pub const STRING_LEN: usize = 128;

/// The type of a field in a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit signed integer
    Int,
    /// Fixed-width character string of at most STRING_LEN bytes
    Str,
}

impl FieldType {
    /// Returns the number of bytes a field of this type occupies on disk.
    pub fn byte_size(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Str => 4 + STRING_LEN,
        }
    }

    /// Parses a catalog type name (`int` / `string`, case-insensitive).
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "int" => Ok(FieldType::Int),
            "string" => Ok(FieldType::Str),
            other => Err(DbError::Db(format!("unknown field type '{other}'"))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Str => write!(f, "string"),
        }
    }
}

/// Comparison operators usable in predicates and selectivity estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    /// Returns the type of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Str(_) => FieldType::Str,
        }
    }

    /// Applies `op` between `self` and `other`.
    pub fn compare(&self, op: CompareOp, other: &Field) -> bool {
        let ord = self.cmp(other);
        match op {
            CompareOp::Equals => ord == Ordering::Equal,
            CompareOp::NotEquals => ord != Ordering::Equal,
            CompareOp::LessThan => ord == Ordering::Less,
            CompareOp::LessThanOrEq => ord != Ordering::Greater,
            CompareOp::GreaterThan => ord == Ordering::Greater,
            CompareOp::GreaterThanOrEq => ord != Ordering::Less,
        }
    }

    /// Serializes the value into its fixed-width on-disk form.
    ///
    /// INT is 4 bytes big-endian. STRING is a 4-byte big-endian length
    /// followed by STRING_LEN payload bytes, zero padded; overlong strings
    /// are truncated.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Field::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Field::Str(s) => {
                let bytes = s.as_bytes();
                let len = bytes.len().min(STRING_LEN);
                buf.extend_from_slice(&(len as u32).to_be_bytes());
                buf.extend_from_slice(&bytes[..len]);
                buf.extend(std::iter::repeat(0u8).take(STRING_LEN - len));
            }
        }
    }

    /// Deserializes a value of the given type from the start of `data`.
    pub fn deserialize(field_type: FieldType, data: &[u8]) -> Result<Field> {
        if data.len() < field_type.byte_size() {
            return Err(DbError::Db(format!(
                "truncated field: need {} bytes, have {}",
                field_type.byte_size(),
                data.len()
            )));
        }
        match field_type {
            FieldType::Int => {
                let bytes: [u8; 4] = data[..4].try_into().unwrap();
                Ok(Field::Int(i32::from_be_bytes(bytes)))
            }
            FieldType::Str => {
                let len_bytes: [u8; 4] = data[..4].try_into().unwrap();
                let len = (u32::from_be_bytes(len_bytes) as usize).min(STRING_LEN);
                let s = String::from_utf8_lossy(&data[4..4 + len]).into_owned();
                Ok(Field::Str(s))
            }
        }
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Field {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => a.cmp(b),
            (Field::Str(a), Field::Str(b)) => a.cmp(b),
            // Fields of different types never share a column; order them by
            // type tag so the impl stays total.
            (Field::Int(_), Field::Str(_)) => Ordering::Less,
            (Field::Str(_), Field::Int(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{v}"),
            Field::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Str(s.to_string())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::Str(s)
    }
}
