//! Index key encoding.
//!
//! Keys are encoded so that byte-wise comparison gives the same order as
//! comparing the column values part by part.
//!
//! # Encoding Format
//!
//! Each key part is encoded as:
//! - `0x00` for NULL (NULL sorts first)
//! - `0x01` followed by the payload otherwise
//!
//! Payloads:
//! - INT: 8 bytes, big-endian, sign bit flipped
//! - TEXT / BYTES: the bytes with `0x00` escaped as `0x00 0xFF`, terminated
//!   by `0x00 0x00`
//!
//! Because every part is self-delimiting, the encoding of the first `n`
//! parts of a key is a byte prefix of the full key.

use cairn_common::constants::MAX_KEY_SIZE;
use cairn_common::error::{CairnError, CairnResult};
use cairn_common::types::{Datum, Key, Row};

use crate::catalog::{IndexDef, TableDef};

const NULL_MARKER: u8 = 0x00;
const VALUE_MARKER: u8 = 0x01;
const ESCAPE: u8 = 0xFF;

/// Encodes index keys for one index of a table.
#[derive(Debug, Clone, Copy)]
pub struct KeyEncoder<'a> {
    def: &'a TableDef,
    index: &'a IndexDef,
}

impl<'a> KeyEncoder<'a> {
    /// Creates an encoder for index `keyno` of `def`.
    ///
    /// Returns `None` if the table has no such index.
    pub fn new(def: &'a TableDef, keyno: usize) -> Option<Self> {
        def.indexes.get(keyno).map(|index| Self { def, index })
    }

    /// Returns the number of key parts in the index.
    pub fn key_parts(&self) -> usize {
        self.index.key_parts()
    }

    /// Encodes the full index key of a stored row.
    pub fn encode_row(&self, row: &Row) -> Key {
        let mut buf = Vec::with_capacity(32);
        for &column in &self.index.columns {
            encode_datum(row.get(column).unwrap_or(&Datum::Null), &mut buf);
        }
        Key::from_vec(buf)
    }

    /// Encodes a lookup key from the leading key-part values.
    ///
    /// Fewer values than key parts produce a prefix key. Each value is
    /// converted to its key column's type first.
    pub fn encode_values(&self, values: &[Datum]) -> CairnResult<Key> {
        if values.len() > self.index.key_parts() {
            return Err(CairnError::TooManyKeyParts {
                max: self.index.key_parts(),
            });
        }
        if values.is_empty() {
            return Err(CairnError::WrongArguments {
                message: format!("key for '{}' needs at least one part", self.index.name),
            });
        }

        let mut buf = Vec::with_capacity(32);
        for (value, &column) in values.iter().zip(&self.index.columns) {
            let column = &self.def.columns[column];
            let stored = value.coerce_to(column.ty).ok_or_else(|| CairnError::WrongArguments {
                message: format!(
                    "value '{}' cannot be stored in column '{}' ({})",
                    value, column.name, column.ty
                ),
            })?;
            encode_datum(&stored, &mut buf);
        }

        if buf.len() > MAX_KEY_SIZE {
            return Err(CairnError::WrongArguments {
                message: format!("key is longer than {MAX_KEY_SIZE} bytes"),
            });
        }

        Ok(Key::from_vec(buf))
    }
}

fn encode_datum(value: &Datum, buf: &mut Vec<u8>) {
    match value {
        Datum::Null => buf.push(NULL_MARKER),
        Datum::Int(v) => {
            buf.push(VALUE_MARKER);
            // Flip sign bit for proper ordering
            let v = (*v as u64) ^ 0x8000_0000_0000_0000;
            buf.extend_from_slice(&v.to_be_bytes());
        }
        Datum::Text(s) => {
            buf.push(VALUE_MARKER);
            encode_escaped(s.as_bytes(), buf);
        }
        Datum::Bytes(b) => {
            buf.push(VALUE_MARKER);
            encode_escaped(b, buf);
        }
    }
}

fn encode_escaped(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        buf.push(b);
        if b == 0x00 {
            buf.push(ESCAPE);
        }
    }
    buf.extend_from_slice(&[0x00, 0x00]);
}
