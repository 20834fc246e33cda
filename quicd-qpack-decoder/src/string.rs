//! String literals (RFC 9204 Section 4.1.2).
//!
//! A string literal is a Huffman flag, a length with an N-bit prefix, and the
//! string bytes. The flag is the bit immediately above the prefix.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::{huffman, integer};

/// Longest string literal, in bytes on the wire, that can decode to at most
/// `max_len` bytes. Huffman codes are at most 30 bits long.
pub fn max_wire_len(max_len: u64, huffman_coded: bool) -> u64 {
    if huffman_coded {
        max_len.saturating_mul(30).saturating_add(7) / 8
    } else {
        max_len
    }
}

/// Decodes a string literal at the start of `data`.
///
/// Returns the decoded string and the number of bytes consumed.
pub fn decode(prefix_bits: u8, data: &[u8]) -> Result<(Bytes, usize)> {
    decode_bounded(prefix_bits, data, u64::MAX)
}

/// Like [`decode`], but rejects a literal that cannot decode to `max_len`
/// bytes or fewer as soon as its length is known, before its bytes arrive.
pub fn decode_bounded(prefix_bits: u8, data: &[u8], max_len: u64) -> Result<(Bytes, usize)> {
    let first = *data.first().ok_or(Error::Incomplete(1))?;
    let huffman_coded = prefix_bits < 8 && first & (1 << prefix_bits) != 0;

    let (len, consumed) = integer::decode(prefix_bits, data)?;
    let limit = max_wire_len(max_len, huffman_coded);
    if len > limit {
        return Err(Error::StringTooLong { len, limit });
    }
    let available = (data.len() - consumed) as u64;
    if len > available {
        let missing = usize::try_from(len - available).unwrap_or(usize::MAX);
        return Err(Error::Incomplete(missing));
    }

    let end = consumed + len as usize;
    let raw = &data[consumed..end];
    let value = if huffman_coded {
        let mut decoded = Vec::new();
        huffman::decode(raw, &mut decoded)?;
        Bytes::from(decoded)
    } else {
        Bytes::copy_from_slice(raw)
    };

    Ok((value, end))
}

/// Appends `value` as a string literal without Huffman coding.
///
/// `flags` holds the bits above the Huffman flag.
pub fn encode(value: &[u8], prefix_bits: u8, flags: u8, buf: &mut BytesMut) {
    integer::encode(value.len() as u64, prefix_bits, flags, buf);
    buf.extend_from_slice(value);
}
