//! QPACK encoder and decoder stream instructions per RFC 9204 Section 4.3
//! and 4.4.
//!
//! Encoder stream instructions (received by the decoder):
//! - Set Dynamic Table Capacity
//! - Insert With Name Reference
//! - Insert With Literal Name
//! - Duplicate
//!
//! Decoder stream instructions (sent by the decoder):
//! - Section Acknowledgment
//! - Insert Count Increment

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use crate::{integer, string};

/// Encoder stream instruction types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderInstruction {
    /// Set Dynamic Table Capacity.
    /// Pattern: 001xxxxx (capacity with 5-bit prefix)
    SetCapacity { capacity: u64 },

    /// Insert With Name Reference.
    /// Pattern: 1Txxxxxx (T=0 dynamic, T=1 static, name index with 6-bit prefix)
    InsertWithNameRef {
        is_static: bool,
        name_index: u64,
        value: Bytes,
    },

    /// Insert With Literal Name.
    /// Pattern: 01Hxxxxx (H=Huffman flag, name length with 5-bit prefix)
    InsertLiteral { name: Bytes, value: Bytes },

    /// Duplicate existing dynamic table entry.
    /// Pattern: 000xxxxx (relative index with 5-bit prefix)
    Duplicate { index: u64 },
}

impl EncoderInstruction {
    /// Appends the instruction to `buf`. String literals are not Huffman
    /// coded.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            EncoderInstruction::SetCapacity { capacity } => {
                integer::encode(*capacity, 5, 0x20, buf);
            }
            EncoderInstruction::InsertWithNameRef {
                is_static,
                name_index,
                value,
            } => {
                let flags = if *is_static { 0xC0 } else { 0x80 };
                integer::encode(*name_index, 6, flags, buf);
                string::encode(value, 7, 0x00, buf);
            }
            EncoderInstruction::InsertLiteral { name, value } => {
                string::encode(name, 5, 0x40, buf);
                string::encode(value, 7, 0x00, buf);
            }
            EncoderInstruction::Duplicate { index } => {
                integer::encode(*index, 5, 0x00, buf);
            }
        }
    }

    /// Decodes one instruction from the start of `data`.
    ///
    /// Returns the instruction and the number of bytes consumed, or
    /// [`Error::Incomplete`](crate::Error::Incomplete) if `data` ends inside
    /// the instruction. Names and values longer than `max_string_len` are
    /// rejected as soon as their length has been read.
    pub fn decode(data: &[u8], max_string_len: u64) -> Result<(Self, usize)> {
        let first = *data.first().ok_or(crate::Error::Incomplete(1))?;

        if first & 0x80 != 0 {
            let is_static = first & 0x40 != 0;
            let (name_index, pos) = integer::decode(6, data)?;
            let (value, consumed) = string::decode_bounded(7, &data[pos..], max_string_len)?;
            Ok((
                EncoderInstruction::InsertWithNameRef {
                    is_static,
                    name_index,
                    value,
                },
                pos + consumed,
            ))
        } else if first & 0x40 != 0 {
            let (name, pos) = string::decode_bounded(5, data, max_string_len)?;
            let (value, consumed) = string::decode_bounded(7, &data[pos..], max_string_len)?;
            Ok((EncoderInstruction::InsertLiteral { name, value }, pos + consumed))
        } else if first & 0x20 != 0 {
            let (capacity, pos) = integer::decode(5, data)?;
            Ok((EncoderInstruction::SetCapacity { capacity }, pos))
        } else {
            let (index, pos) = integer::decode(5, data)?;
            Ok((EncoderInstruction::Duplicate { index }, pos))
        }
    }
}

/// Decoder stream instruction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderInstruction {
    /// Section Acknowledgment.
    /// Pattern: 1xxxxxxx (stream ID with 7-bit prefix)
    SectionAck { stream_id: u64 },

    /// Insert Count Increment.
    /// Pattern: 00xxxxxx (increment with 6-bit prefix)
    InsertCountIncrement { increment: u64 },
}

impl DecoderInstruction {
    /// Appends the instruction to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match *self {
            DecoderInstruction::SectionAck { stream_id } => {
                integer::encode(stream_id, 7, 0x80, buf);
            }
            DecoderInstruction::InsertCountIncrement { increment } => {
                integer::encode(increment, 6, 0x00, buf);
            }
        }
    }
}
