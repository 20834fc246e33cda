//! Decoded header and trailer fields.

use bytes::Bytes;
use std::fmt;

/// Per-entry overhead counted by the dynamic table (RFC 9204 Section 3.2.1).
pub const ENTRY_OVERHEAD: u64 = 32;

/// A field line as stored in the dynamic table and returned in decoded
/// header lists.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldLine {
    pub name: Bytes,
    pub value: Bytes,
}

impl FieldLine {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Borrows a static table entry.
    pub fn from_static(name: &'static [u8], value: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(name), Bytes::from_static(value))
    }

    /// Size counted against the table capacity and the field section limit.
    pub fn size(&self) -> u64 {
        (self.name.len() + self.value.len()) as u64 + ENTRY_OVERHEAD
    }
}

impl fmt::Debug for FieldLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.name.escape_ascii(),
            self.value.escape_ascii()
        )
    }
}
