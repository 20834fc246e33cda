//! Required Insert Count encoding per RFC 9204 Section 4.5.1.1.
//!
//! A header block names the number of dynamic table insertions the decoder
//! must have processed before the block can be decoded. On the wire this is
//! folded into the range `[0, 2 * MaxEntries]`:
//!
//! ```text
//! EncodedInsertCount = 0                                  if ReqInsertCount == 0
//!                      ReqInsertCount mod (2 * MaxEntries) + 1   otherwise
//! ```
//!
//! Recovering the true count is only possible because the encoder is
//! constrained by the decoder's state: it cannot reference an entry that has
//! already been evicted, and it cannot evict an entry the decoder has not
//! received. Together these bound the true value to
//! `(TotalNumberOfInserts - MaxEntries, TotalNumberOfInserts + MaxEntries]`,
//! a window of exactly `2 * MaxEntries` values holding one member of every
//! residue class.

use thiserror::Error;

/// Rejection of an Encoded Required Insert Count.
///
/// There is a single kind: callers only need to know the value cannot be
/// accepted, and every rejection is fatal to the connection.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// No insertion count consistent with the table state encodes to the
    /// received value.
    #[error("invalid required insert count")]
    Invalid,
}

/// Returns `MaxEntries` for a dynamic table capacity in bytes.
///
/// Every entry costs at least 32 bytes, so this is the largest number of
/// entries the table can hold.
#[inline]
pub fn max_entries(capacity: u64) -> u64 {
    capacity / 32
}

/// Encodes a Required Insert Count for transmission.
///
/// `max_entries` must be nonzero whenever `required_insert_count` is:
/// a table that cannot hold entries cannot be referenced.
///
/// # Example
///
/// ```
/// use quicd_qpack_decoder::required_insert_count::encode;
///
/// assert_eq!(encode(0, 0), 0);
/// assert_eq!(encode(234, 100), 35);
/// ```
#[inline]
pub fn encode(required_insert_count: u64, max_entries: u64) -> u64 {
    if required_insert_count == 0 {
        return 0;
    }
    debug_assert!(max_entries > 0, "dynamic reference with zero capacity");

    required_insert_count % (2 * max_entries) + 1
}

/// Decodes an Encoded Required Insert Count against the current table state.
///
/// `total_inserts` is the number of entries the decoder has inserted so far
/// and `max_entries` is derived from the current table capacity.
///
/// # Example
///
/// ```
/// use quicd_qpack_decoder::required_insert_count::{decode, DecodeError};
///
/// // Wrapped once: 234 mod 200 + 1 == 35.
/// assert_eq!(decode(35, 100, 180), Ok(234));
/// // 17 would reference an entry that can no longer be in the table.
/// assert_eq!(decode(18, 10, 2), Err(DecodeError::Invalid));
/// ```
pub fn decode(encoded: u64, max_entries: u64, total_inserts: u64) -> Result<u64, DecodeError> {
    if encoded == 0 {
        return Ok(0);
    }

    if max_entries == 0 {
        return Err(DecodeError::Invalid);
    }

    let full_range = max_entries.checked_mul(2).ok_or(DecodeError::Invalid)?;
    if encoded > full_range {
        return Err(DecodeError::Invalid);
    }

    // Upper end of the window; the candidate is placed in the epoch that
    // contains it and moved one epoch back if it lands above.
    let max_value = total_inserts
        .checked_add(max_entries)
        .ok_or(DecodeError::Invalid)?;
    let max_wrapped = max_value / full_range * full_range;
    let mut candidate = max_wrapped
        .checked_add(encoded - 1)
        .ok_or(DecodeError::Invalid)?;

    if candidate > max_value {
        // No earlier epoch exists: the candidate would be zero or negative.
        if candidate <= full_range {
            return Err(DecodeError::Invalid);
        }
        candidate -= full_range;
    }

    if candidate == 0 {
        return Err(DecodeError::Invalid);
    }

    // Entry `total_inserts - 1 - max_entries` and earlier are evicted; entry
    // `candidate - 1` is referenced.
    if total_inserts >= candidate.saturating_add(max_entries) {
        return Err(DecodeError::Invalid);
    }
    // Entry `candidate - 1 - max_entries` and earlier would have to be evicted,
    // which requires every one of them to have been received.
    if candidate > max_value {
        return Err(DecodeError::Invalid);
    }

    Ok(candidate)
}
