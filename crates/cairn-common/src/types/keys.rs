//! Index key type for Cairn.
//!
//! Keys are the order-preserving byte encoding of one or more key-part
//! values. Comparing two keys byte-wise gives the same order as comparing
//! the values they encode.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

/// An encoded index key.
///
/// A key built from the first `n` parts of an index is a byte prefix of
/// every full key whose first `n` parts are equal, which is what partial
/// key lookups rely on.
///
/// # Example
///
/// ```rust
/// use cairn_common::types::Key;
///
/// let key = Key::from_bytes(b"user:1234");
/// assert_eq!(key.len(), 9);
/// assert!(key.starts_with(b"user:"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(Bytes);

impl Key {
    /// Creates an empty key.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Creates a key from a byte slice.
    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Creates a key from owned bytes.
    #[inline]
    #[must_use]
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Self(Bytes::from(vec))
    }

    /// Returns the length of the key in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the key as a byte slice.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Checks if this key starts with the given prefix.
    #[inline]
    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Returns a successor key (for range scans).
    ///
    /// The successor is the smallest key greater than every key that starts
    /// with this one. A key made only of `0xFF` bytes has no such successor;
    /// it gets a `0x00` appended, which is only greater than the key itself.
    /// Encoded keys begin with a `0x00` or `0x01` marker byte, so they never
    /// take that path.
    #[must_use]
    pub fn successor(&self) -> Self {
        let mut bytes = self.0.to_vec();

        // Find the rightmost byte that is not 0xFF
        for i in (0..bytes.len()).rev() {
            if bytes[i] < 0xFF {
                bytes[i] += 1;
                bytes.truncate(i + 1);
                return Self::from_vec(bytes);
            }
        }

        // All bytes are 0xFF, append 0x00
        bytes.push(0x00);
        Self::from_vec(bytes)
    }
}

impl Deref for Key {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Key {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Ord for Key {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Key {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(0x")?;
        for byte in &self.0[..self.0.len().min(32)] {
            write!(f, "{byte:02x}")?;
        }
        if self.0.len() > 32 {
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering() {
        let a = Key::from_bytes(b"a");
        let ab = Key::from_bytes(b"ab");
        let b = Key::from_bytes(b"b");
        assert!(a < ab);
        assert!(ab < b);
    }

    #[test]
    fn test_key_successor() {
        assert_eq!(Key::from_bytes(b"ab").successor(), Key::from_bytes(b"ac"));
        assert_eq!(
            Key::from_bytes(&[0x01, 0xFF]).successor(),
            Key::from_bytes(&[0x02])
        );
        assert_eq!(
            Key::from_bytes(&[0xFF, 0xFF]).successor(),
            Key::from_bytes(&[0xFF, 0xFF, 0x00])
        );
    }

    #[test]
    fn test_key_is_serializable() {
        fn assert_serde<T: Serialize + for<'de> Deserialize<'de>>() {}
        assert_serde::<Key>();
        assert_serde::<crate::types::Datum>();
        assert_serde::<crate::types::Row>();
    }

    #[test]
    fn test_key_debug_is_hex() {
        let key = Key::from_bytes(&[0x01, 0xab]);
        assert_eq!(format!("{key:?}"), "Key(0x01ab)");
    }
}
