use std::fmt;

use crate::ByteOrder;

/// A 16-byte identifier in canonical (RFC 4122) byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid([u8; 16]);

impl Guid {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Build a GUID from 16 stored bytes.
    ///
    /// Little-endian storage is the Windows layout: the first three groups
    /// (4, 2 and 2 bytes) are stored least significant byte first and the
    /// trailing 8 bytes are stored as-is.
    pub fn from_stored(bytes: [u8; 16], byte_order: ByteOrder) -> Self {
        if byte_order.is_big_endian() {
            return Self(bytes);
        }
        let mut out = bytes;
        out[0..4].reverse();
        out[4..6].reverse();
        out[6..8].reverse();
        Self(out)
    }

    /// Inverse of [`Guid::from_stored`].
    pub fn to_stored(&self, byte_order: ByteOrder) -> [u8; 16] {
        // The group swap is its own inverse.
        Self::from_stored(self.0, byte_order).0
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13],
            b[14], b[15]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
