//! Prefix integer encoding and decoding.
//!
//! Implements the variable-length integer representation of RFC 7541
//! Section 5.1 used by every QPACK instruction. An integer occupies the low
//! N bits of a byte (1 ≤ N ≤ 8); if it does not fit, those bits are all set
//! and the remainder follows in 7-bit continuation bytes, least significant
//! group first.
//!
//! RFC 9204 requires support for integers up to 62 bits.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// Maximum integer value that can be represented (2^62 - 1).
pub const MAX_INTEGER: u64 = (1u64 << 62) - 1;

/// Longest encoding of [`MAX_INTEGER`]: the prefix byte plus nine
/// continuation bytes.
pub const MAX_ENCODED_LEN: usize = 10;

#[inline]
fn prefix_max(prefix_bits: u8) -> u64 {
    if prefix_bits == 8 {
        0xFF
    } else {
        (1u64 << prefix_bits) - 1
    }
}

/// Appends `value` with an N-bit prefix to `buf`.
///
/// `flags` holds the bits of the first byte above the prefix; they are
/// copied unchanged.
///
/// # Panics
///
/// Panics if `prefix_bits` is not in `1..=8` or `value` exceeds
/// [`MAX_INTEGER`].
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use quicd_qpack_decoder::integer::encode;
///
/// let mut buf = BytesMut::new();
/// encode(1337, 5, 0b1110_0000, &mut buf);
/// assert_eq!(&buf[..], &[0xFF, 0x9A, 0x0A]);
/// ```
pub fn encode(value: u64, prefix_bits: u8, flags: u8, buf: &mut BytesMut) {
    assert!((1..=8).contains(&prefix_bits), "prefix_bits must be 1-8");
    assert!(value <= MAX_INTEGER, "value exceeds maximum");

    let max_prefix = prefix_max(prefix_bits);
    if value < max_prefix {
        buf.put_u8(flags | value as u8);
        return;
    }

    buf.put_u8(flags | max_prefix as u8);
    let mut remaining = value - max_prefix;
    while remaining >= 0x80 {
        buf.put_u8((remaining & 0x7F) as u8 | 0x80);
        remaining >>= 7;
    }
    buf.put_u8(remaining as u8);
}

/// Decodes an integer with an N-bit prefix from the start of `data`.
///
/// Returns the value and the number of bytes consumed. Bits above the
/// prefix in the first byte are ignored.
///
/// # Example
///
/// ```
/// use quicd_qpack_decoder::integer::decode;
///
/// let (value, consumed) = decode(5, &[0b001_01010]).unwrap();
/// assert_eq!((value, consumed), (10, 1));
/// ```
pub fn decode(prefix_bits: u8, data: &[u8]) -> Result<(u64, usize)> {
    if !(1..=8).contains(&prefix_bits) {
        return Err(Error::IntegerError("prefix_bits must be 1-8".into()));
    }

    let first = *data.first().ok_or(Error::Incomplete(1))?;
    let max_prefix = prefix_max(prefix_bits);
    let mut value = u64::from(first) & max_prefix;
    if value < max_prefix {
        return Ok((value, 1));
    }

    let mut shift = 0u32;
    for (pos, &byte) in data.iter().enumerate().skip(1) {
        if pos >= MAX_ENCODED_LEN {
            return Err(Error::IntegerError("integer encoding too long".into()));
        }

        let group = u64::from(byte & 0x7F);
        value = group
            .checked_shl(shift)
            .filter(|shifted| shifted >> shift == group)
            .and_then(|shifted| value.checked_add(shifted))
            .filter(|v| *v <= MAX_INTEGER)
            .ok_or_else(|| Error::IntegerError("value exceeds maximum (2^62 - 1)".into()))?;

        if byte & 0x80 == 0 {
            return Ok((value, pos + 1));
        }
        shift += 7;
    }

    Err(Error::Incomplete(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: u64, prefix_bits: u8) -> (u64, usize, usize) {
        let mut buf = BytesMut::new();
        encode(value, prefix_bits, 0, &mut buf);
        let (decoded, consumed) = decode(prefix_bits, &buf).unwrap();
        (decoded, consumed, buf.len())
    }

    #[test]
    fn test_single_byte_values() {
        for prefix_bits in 1..=8u8 {
            for value in 0..prefix_max(prefix_bits) {
                assert_eq!(round_trip(value, prefix_bits), (value, 1, 1));
            }
        }
    }

    #[test]
    fn test_rfc7541_examples() {
        // C.1.1: 10 with a 5-bit prefix
        let mut buf = BytesMut::new();
        encode(10, 5, 0, &mut buf);
        assert_eq!(&buf[..], &[0x0A]);

        // C.1.2: 1337 with a 5-bit prefix
        let mut buf = BytesMut::new();
        encode(1337, 5, 0, &mut buf);
        assert_eq!(&buf[..], &[0x1F, 0x9A, 0x0A]);
        assert_eq!(decode(5, &buf).unwrap(), (1337, 3));

        // C.1.3: 42 starting at an octet boundary
        let mut buf = BytesMut::new();
        encode(42, 8, 0, &mut buf);
        assert_eq!(&buf[..], &[0x2A]);
    }

    #[test]
    fn test_flags_are_preserved_and_ignored() {
        let mut buf = BytesMut::new();
        encode(3, 6, 0xC0, &mut buf);
        assert_eq!(buf[0], 0xC3);
        assert_eq!(decode(6, &buf).unwrap(), (3, 1));
    }

    #[test]
    fn test_maximum_value() {
        let (decoded, consumed, len) = round_trip(MAX_INTEGER, 1);
        assert_eq!(decoded, MAX_INTEGER);
        assert_eq!(consumed, len);
    }

    #[test]
    fn test_incomplete_data() {
        assert_eq!(decode(5, &[]), Err(Error::Incomplete(1)));
        assert_eq!(decode(5, &[0x1F]), Err(Error::Incomplete(1)));
        assert_eq!(decode(5, &[0x1F, 0x9A]), Err(Error::Incomplete(1)));
    }

    #[test]
    fn test_overflow_detection() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert!(matches!(decode(8, &data), Err(Error::IntegerError(_))));
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(matches!(decode(0, &[0]), Err(Error::IntegerError(_))));
        assert!(matches!(decode(9, &[0]), Err(Error::IntegerError(_))));
    }

    #[test]
    fn test_round_trip_property() {
        use proptest::prelude::*;

        proptest!(|(value in 0u64..=MAX_INTEGER, prefix_bits in 1u8..=8)| {
            let (decoded, consumed, len) = round_trip(value, prefix_bits);
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, len);
        });
    }
}
