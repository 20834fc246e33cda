//! Header block (encoded field section) parsing per RFC 9204 Section 4.5.
//!
//! A header block starts with a prefix:
//!
//! ```text
//!   0   1   2   3   4   5   6   7
//! +---+---+---+---+---+---+---+---+
//! |   Required Insert Count (8+)  |
//! +---+---------------------------+
//! | S |      Delta Base (7+)      |
//! +---+---------------------------+
//! ```
//!
//! followed by field line representations. Relative indices count back from
//! Base, post-base indices count forward from it. Header blocks arrive
//! complete, so running out of bytes anywhere is a malformed block rather
//! than a reason to wait.

use bytes::BytesMut;

use crate::dynamic_table::TableView;
use crate::error::{Error, Result};
use crate::field_line::FieldLine;
use crate::{integer, required_insert_count, static_table, string};

/// Decoded header block prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    /// Inserts that must be received before the block can be decoded.
    pub required_insert_count: u64,
    /// Reference point for relative and post-base indices.
    pub base: u64,
}

impl Prefix {
    /// Creates a prefix.
    pub fn new(required_insert_count: u64, base: u64) -> Self {
        Self {
            required_insert_count,
            base,
        }
    }
}

fn malformed(err: Error) -> Error {
    match err {
        Error::Incomplete(_) => Error::DecompressionFailed("truncated header block".into()),
        other => other,
    }
}

/// Decodes the header block prefix against the current table state.
///
/// Returns the prefix and the number of bytes it occupies.
pub fn decode_prefix(data: &[u8], max_entries: u64, total_inserts: u64) -> Result<(Prefix, usize)> {
    let (encoded, mut pos) = integer::decode(8, data).map_err(malformed)?;
    let required_insert_count =
        required_insert_count::decode(encoded, max_entries, total_inserts)?;

    let sign = data
        .get(pos)
        .map(|byte| byte & 0x80 != 0)
        .ok_or_else(|| malformed(Error::Incomplete(1)))?;
    let (delta_base, consumed) = integer::decode(7, &data[pos..]).map_err(malformed)?;
    pos += consumed;

    let base = if sign {
        // Base = ReqInsertCount - DeltaBase - 1
        delta_base
            .checked_add(1)
            .and_then(|delta| required_insert_count.checked_sub(delta))
    } else {
        required_insert_count.checked_add(delta_base)
    }
    .ok_or_else(|| Error::DecompressionFailed("invalid base".into()))?;

    Ok((Prefix::new(required_insert_count, base), pos))
}

/// Appends the header block prefix for `prefix` to `buf`.
pub fn encode_prefix(prefix: Prefix, max_entries: u64, buf: &mut BytesMut) {
    let encoded = required_insert_count::encode(prefix.required_insert_count, max_entries);
    integer::encode(encoded, 8, 0, buf);

    if prefix.base >= prefix.required_insert_count {
        integer::encode(prefix.base - prefix.required_insert_count, 7, 0x00, buf);
    } else {
        integer::encode(prefix.required_insert_count - prefix.base - 1, 7, 0x80, buf);
    }
}

/// Decodes the field line representations that follow the prefix.
pub fn decode_field_lines<T: TableView>(
    data: &[u8],
    prefix: Prefix,
    table: &T,
) -> Result<Vec<FieldLine>> {
    let mut fields = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let (field, consumed) =
            decode_field_line(&data[pos..], prefix, table).map_err(malformed)?;
        fields.push(field);
        pos += consumed;
    }

    Ok(fields)
}

fn decode_field_line<T: TableView>(
    data: &[u8],
    prefix: Prefix,
    table: &T,
) -> Result<(FieldLine, usize)> {
    let first = data[0];

    if first & 0x80 != 0 {
        // Indexed field line: 1T | Index (6+)
        let (index, consumed) = integer::decode(6, data)?;
        let field = if first & 0x40 != 0 {
            static_entry(index)?
        } else {
            dynamic_entry(table, prefix, relative(prefix, index)?)?.clone()
        };
        Ok((field, consumed))
    } else if first & 0x40 != 0 {
        // Literal field line with name reference: 01NT | Name Index (4+)
        let (index, mut pos) = integer::decode(4, data)?;
        let name = if first & 0x10 != 0 {
            static_entry(index)?.name
        } else {
            dynamic_entry(table, prefix, relative(prefix, index)?)?
                .name
                .clone()
        };
        let (value, consumed) = string::decode(7, &data[pos..])?;
        pos += consumed;
        Ok((FieldLine { name, value }, pos))
    } else if first & 0x20 != 0 {
        // Literal field line with literal name: 001N | H | Name Length (3+)
        let (name, mut pos) = string::decode(3, data)?;
        let (value, consumed) = string::decode(7, &data[pos..])?;
        pos += consumed;
        Ok((FieldLine { name, value }, pos))
    } else if first & 0x10 != 0 {
        // Indexed field line with post-base index: 0001 | Index (4+)
        let (index, consumed) = integer::decode(4, data)?;
        let field = dynamic_entry(table, prefix, post_base(prefix, index)?)?.clone();
        Ok((field, consumed))
    } else {
        // Literal field line with post-base name reference: 0000N | Index (3+)
        let (index, mut pos) = integer::decode(3, data)?;
        let name = dynamic_entry(table, prefix, post_base(prefix, index)?)?
            .name
            .clone();
        let (value, consumed) = string::decode(7, &data[pos..])?;
        pos += consumed;
        Ok((FieldLine { name, value }, pos))
    }
}

fn static_entry(index: u64) -> Result<FieldLine> {
    static_table::get(index)
        .map(|(name, value)| FieldLine::from_static(name, value))
        .ok_or_else(|| Error::DecompressionFailed(format!("invalid static index {}", index)))
}

fn relative(prefix: Prefix, index: u64) -> Result<u64> {
    prefix
        .base
        .checked_sub(index)
        .and_then(|v| v.checked_sub(1))
        .ok_or_else(|| Error::DecompressionFailed(format!("invalid relative index {}", index)))
}

fn post_base(prefix: Prefix, index: u64) -> Result<u64> {
    prefix
        .base
        .checked_add(index)
        .ok_or_else(|| Error::DecompressionFailed(format!("invalid post-base index {}", index)))
}

fn dynamic_entry<T: TableView>(table: &T, prefix: Prefix, absolute: u64) -> Result<&FieldLine> {
    if absolute >= prefix.required_insert_count {
        return Err(Error::DecompressionFailed(format!(
            "reference to entry {} exceeds required insert count {}",
            absolute, prefix.required_insert_count
        )));
    }

    table
        .lookup(absolute)
        .ok_or_else(|| Error::DecompressionFailed(format!("dynamic entry {} not available", absolute)))
}

/// Builder for header blocks, used by tests and tools that need to feed the
/// decoder well-formed input.
#[derive(Debug)]
pub struct HeaderBlockBuilder {
    buf: BytesMut,
}

impl HeaderBlockBuilder {
    /// Starts a block with the given prefix.
    pub fn new(prefix: Prefix, max_entries: u64) -> Self {
        let mut buf = BytesMut::new();
        encode_prefix(prefix, max_entries, &mut buf);
        Self { buf }
    }

    /// Indexed field line referencing the static table.
    pub fn indexed_static(mut self, index: u64) -> Self {
        integer::encode(index, 6, 0xC0, &mut self.buf);
        self
    }

    /// Indexed field line with a relative dynamic index.
    pub fn indexed_relative(mut self, index: u64) -> Self {
        integer::encode(index, 6, 0x80, &mut self.buf);
        self
    }

    /// Indexed field line with a post-base index.
    pub fn indexed_post_base(mut self, index: u64) -> Self {
        integer::encode(index, 4, 0x10, &mut self.buf);
        self
    }

    /// Literal value with a static name reference.
    pub fn literal_static_name(mut self, index: u64, value: &[u8]) -> Self {
        integer::encode(index, 4, 0x50, &mut self.buf);
        string::encode(value, 7, 0x00, &mut self.buf);
        self
    }

    /// Literal value with a relative dynamic name reference.
    pub fn literal_relative_name(mut self, index: u64, value: &[u8]) -> Self {
        integer::encode(index, 4, 0x40, &mut self.buf);
        string::encode(value, 7, 0x00, &mut self.buf);
        self
    }

    /// Literal value with a post-base name reference.
    pub fn literal_post_base_name(mut self, index: u64, value: &[u8]) -> Self {
        integer::encode(index, 3, 0x00, &mut self.buf);
        string::encode(value, 7, 0x00, &mut self.buf);
        self
    }

    /// Literal name and value.
    pub fn literal(mut self, name: &[u8], value: &[u8]) -> Self {
        string::encode(name, 3, 0x20, &mut self.buf);
        string::encode(value, 7, 0x00, &mut self.buf);
        self
    }

    #[cfg(test)]
    fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Returns the encoded block.
    pub fn build(self) -> bytes::Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic_table::DynamicTable;

    fn table_with(entries: &[(&'static str, &'static str)]) -> DynamicTable {
        let mut table = DynamicTable::new(4096, 4096);
        for &(name, value) in entries {
            table.insert(FieldLine::new(name, value)).unwrap();
        }
        table
    }

    fn decode_block(block: &[u8], table: &DynamicTable) -> Result<Vec<FieldLine>> {
        let (prefix, consumed) = decode_prefix(block, table.max_entries(), table.total_inserts())?;
        decode_field_lines(&block[consumed..], prefix, table)
    }

    #[test]
    fn test_static_only_prefix() {
        let (prefix, consumed) = decode_prefix(&[0x00, 0x00], 0, 0).unwrap();
        assert_eq!(prefix, Prefix::new(0, 0));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_rfc9204_example_b2_prefix() {
        // Appendix B.2: capacity 220, Required Insert Count 2, Base 0
        // (0x03 0x81).
        let (prefix, _) = decode_prefix(&[0x03, 0x81], 220 / 32, 2).unwrap();
        assert_eq!(prefix, Prefix::new(2, 0));
    }

    #[test]
    fn test_negative_base_below_zero() {
        // Required Insert Count 0 with a negative Delta Base.
        assert!(matches!(
            decode_prefix(&[0x00, 0x80], 100, 0),
            Err(Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_prefix_round_trip() {
        for &(ric, base) in &[(0, 0), (2, 0), (2, 2), (5, 9), (5, 1)] {
            let mut buf = BytesMut::new();
            encode_prefix(Prefix::new(ric, base), 100, &mut buf);
            let (prefix, consumed) = decode_prefix(&buf, 100, 10).unwrap();
            assert_eq!(prefix, Prefix::new(ric, base));
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn test_truncated_prefix() {
        assert!(matches!(
            decode_prefix(&[], 100, 0),
            Err(Error::DecompressionFailed(_))
        ));
        assert!(matches!(
            decode_prefix(&[0x00], 100, 0),
            Err(Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_invalid_required_insert_count() {
        assert!(matches!(
            decode_prefix(&[0x01, 0x00], 0, 0),
            Err(Error::InvalidRequiredInsertCount(_))
        ));
    }

    #[test]
    fn test_all_representations() {
        let table = table_with(&[(":authority", "www.example.com"), (":path", "/sample/path")]);
        let block = HeaderBlockBuilder::new(Prefix::new(2, 1), table.max_entries())
            .indexed_static(17)
            .indexed_relative(0)
            .indexed_post_base(0)
            .literal_static_name(1, b"/index.html")
            .literal_relative_name(0, b"example.org")
            .literal_post_base_name(0, b"/other")
            .literal(b"x-custom", b"yes")
            .build();

        let fields = decode_block(&block, &table).unwrap();
        let expected = vec![
            FieldLine::new(":method", "GET"),
            FieldLine::new(":authority", "www.example.com"),
            FieldLine::new(":path", "/sample/path"),
            FieldLine::new(":path", "/index.html"),
            FieldLine::new(":authority", "example.org"),
            FieldLine::new(":path", "/other"),
            FieldLine::new("x-custom", "yes"),
        ];
        assert_eq!(fields, expected);
    }

    #[test]
    fn test_rfc9204_example_b2_block() {
        let table = table_with(&[(":authority", "www.example.com"), (":path", "/sample/path")]);
        // Appendix B.2 header block on stream 4.
        let block = [0x03, 0x81, 0x10, 0x11];
        let fields = decode_block(&block, &table).unwrap();
        assert_eq!(
            fields,
            vec![
                FieldLine::new(":authority", "www.example.com"),
                FieldLine::new(":path", "/sample/path"),
            ]
        );
    }

    #[test]
    fn test_reference_beyond_required_insert_count() {
        let table = table_with(&[("a", "1"), ("b", "2")]);
        // Required Insert Count 1, Base 1, post-base index 0 is entry 1.
        let block = HeaderBlockBuilder::new(Prefix::new(1, 1), table.max_entries())
            .indexed_post_base(0)
            .build();
        assert!(matches!(
            decode_block(&block, &table),
            Err(Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_relative_index_before_zero() {
        let table = table_with(&[("a", "1")]);
        let block = HeaderBlockBuilder::new(Prefix::new(1, 1), table.max_entries())
            .indexed_relative(1)
            .build();
        assert!(matches!(
            decode_block(&block, &table),
            Err(Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_invalid_static_index() {
        let table = table_with(&[]);
        let block = HeaderBlockBuilder::new(Prefix::new(0, 0), table.max_entries())
            .indexed_static(99)
            .build();
        assert!(matches!(
            decode_block(&block, &table),
            Err(Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_truncated_literal_is_malformed() {
        let table = table_with(&[]);
        let block = HeaderBlockBuilder::new(Prefix::new(0, 0), table.max_entries())
            .raw(&[0x5f, 0x1d, 0x05, b'a'])
            .build();
        assert!(matches!(
            decode_block(&block, &table),
            Err(Error::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_huffman_literal_name_and_value() {
        let table = table_with(&[]);
        // 001 N=0 H=1 len=8 "custom-key", H=1 len=9 "custom-value"
        let block = HeaderBlockBuilder::new(Prefix::new(0, 0), table.max_entries())
            .raw(&[0x2f, 0x01, 0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f])
            .raw(&[0x89, 0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xb8, 0xe8, 0xb4, 0xbf])
            .build();
        let fields = decode_block(&block, &table).unwrap();
        assert_eq!(fields, vec![FieldLine::new("custom-key", "custom-value")]);
    }
}
