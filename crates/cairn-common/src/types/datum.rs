//! Column values and rows.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Int,
    /// UTF-8 text.
    Text,
    /// Opaque bytes.
    Bytes,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Bytes => write!(f, "BYTES"),
        }
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datum {
    /// SQL NULL.
    Null,
    /// Integer value.
    Int(i64),
    /// Text value.
    Text(String),
    /// Binary value.
    Bytes(Bytes),
}

impl Datum {
    /// Creates a text datum.
    pub fn text(s: impl Into<String>) -> Self {
        Datum::Text(s.into())
    }

    /// Returns true if this is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Returns the integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Converts this value so it can be stored in a column of type `ty`.
    ///
    /// Returns `None` when no lossless conversion exists. NULL converts to
    /// every type.
    pub fn coerce_to(&self, ty: ColumnType) -> Option<Datum> {
        match (self, ty) {
            (Datum::Null, _) => Some(Datum::Null),
            (Datum::Int(v), ColumnType::Int) => Some(Datum::Int(*v)),
            (Datum::Int(v), ColumnType::Text) => Some(Datum::Text(v.to_string())),
            (Datum::Text(s), ColumnType::Int) => s.trim().parse().ok().map(Datum::Int),
            (Datum::Text(s), ColumnType::Text) => Some(Datum::Text(s.clone())),
            (Datum::Text(s), ColumnType::Bytes) => {
                Some(Datum::Bytes(Bytes::copy_from_slice(s.as_bytes())))
            }
            (Datum::Bytes(b), ColumnType::Bytes) => Some(Datum::Bytes(b.clone())),
            (Datum::Bytes(b), ColumnType::Text) => std::str::from_utf8(b)
                .ok()
                .map(|s| Datum::Text(s.to_string())),
            (Datum::Int(_), ColumnType::Bytes) | (Datum::Bytes(_), ColumnType::Int) => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Int(v) => write!(f, "{v}"),
            Datum::Text(s) => write!(f, "{s}"),
            Datum::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::Text(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::Text(s)
    }
}

/// A single row of values, one per column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Datum>,
}

impl Row {
    /// Creates a new row with the given values.
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    /// Returns the number of columns in this row.
    pub fn num_columns(&self) -> usize {
        self.values.len()
    }

    /// Returns the value at the given index.
    pub fn get(&self, index: usize) -> Option<&Datum> {
        self.values.get(index)
    }

    /// Returns the values as a slice.
    pub fn values(&self) -> &[Datum] {
        &self.values
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Datum>> for Row {
    fn from(values: Vec<Datum>) -> Self {
        Self::new(values)
    }
}
