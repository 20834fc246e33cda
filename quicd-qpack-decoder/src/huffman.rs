//! Huffman decoding for QPACK string literals.
//!
//! QPACK reuses the static Huffman code of RFC 7541 Appendix B. That code is
//! canonical: codes are assigned in order of increasing length, and within a
//! length in order of symbol value. The table below therefore only records
//! each symbol's code length, and the decoder reconstructs the first code of
//! every length once, on first use.

use std::sync::OnceLock;

use crate::error::{Error, Result};

const EOS: u16 = 256;
const MAX_CODE_LEN: usize = 30;

/// Code length in bits of symbols 0-255 and EOS (256).
#[rustfmt::skip]
static CODE_LENGTHS: [u8; 257] = [
    13, 23, 28, 28, 28, 28, 28, 28, 28, 24, 30, 28, 28, 30, 28, 28,
    28, 28, 28, 28, 28, 28, 30, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    6, 10, 10, 12, 13, 6, 8, 11, 10, 10, 8, 11, 8, 6, 6, 6,
    5, 5, 5, 6, 6, 6, 6, 6, 6, 6, 7, 8, 15, 6, 12, 10,
    13, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 8, 7, 8, 13, 19, 13, 14, 6,
    15, 5, 6, 5, 6, 5, 6, 6, 6, 5, 7, 7, 6, 6, 6, 5,
    6, 7, 6, 5, 5, 6, 7, 7, 7, 7, 7, 15, 11, 14, 13, 28,
    20, 22, 20, 20, 22, 22, 22, 23, 22, 23, 23, 23, 23, 23, 24, 23,
    24, 24, 22, 23, 24, 23, 23, 23, 23, 21, 22, 23, 22, 23, 23, 24,
    22, 21, 20, 22, 22, 23, 23, 21, 23, 22, 22, 24, 21, 22, 23, 23,
    21, 21, 22, 21, 23, 22, 23, 23, 20, 22, 22, 22, 23, 22, 22, 23,
    26, 26, 20, 19, 22, 23, 22, 25, 26, 26, 26, 27, 27, 26, 24, 25,
    19, 21, 26, 27, 27, 26, 27, 24, 21, 21, 26, 26, 28, 27, 27, 27,
    20, 24, 20, 21, 22, 21, 21, 23, 22, 22, 25, 25, 24, 24, 26, 23,
    26, 27, 26, 26, 27, 27, 27, 27, 27, 28, 27, 27, 27, 27, 27, 26,
    30,
];

/// Canonical code layout derived from [`CODE_LENGTHS`].
struct Canonical {
    /// First code of each length.
    first_code: [u32; MAX_CODE_LEN + 1],
    /// Number of codes of each length.
    count: [u32; MAX_CODE_LEN + 1],
    /// Index into `symbols` of the first symbol of each length.
    offset: [u32; MAX_CODE_LEN + 1],
    /// Symbols ordered by (length, value).
    symbols: Vec<u16>,
}

static CANONICAL: OnceLock<Canonical> = OnceLock::new();

fn canonical() -> &'static Canonical {
    CANONICAL.get_or_init(|| {
        let mut count = [0u32; MAX_CODE_LEN + 1];
        for &len in CODE_LENGTHS.iter() {
            count[len as usize] += 1;
        }

        let mut first_code = [0u32; MAX_CODE_LEN + 1];
        let mut offset = [0u32; MAX_CODE_LEN + 1];
        let mut code = 0u32;
        let mut index = 0u32;
        for len in 1..=MAX_CODE_LEN {
            code = (code + count[len - 1]) << 1;
            first_code[len] = code;
            offset[len] = index;
            index += count[len];
        }

        let mut symbols: Vec<u16> = (0..=EOS).collect();
        symbols.sort_by_key(|&sym| (CODE_LENGTHS[sym as usize], sym));

        Canonical {
            first_code,
            count,
            offset,
            symbols,
        }
    })
}

/// Decodes Huffman-encoded `src`, appending the result to `dst`.
///
/// Fails if the data contains the EOS symbol, or if the trailing padding is
/// longer than 7 bits or is not a prefix of EOS (all ones).
///
/// # Example
///
/// ```
/// use quicd_qpack_decoder::huffman::decode;
///
/// let mut out = Vec::new();
/// decode(&[0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90, 0xf4, 0xff], &mut out).unwrap();
/// assert_eq!(out, b"www.example.com");
/// ```
pub fn decode(src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
    let table = canonical();
    dst.reserve(src.len() * 8 / 5);

    let mut code = 0u32;
    let mut len = 0usize;

    for &byte in src {
        for shift in (0..8).rev() {
            code = (code << 1) | u32::from((byte >> shift) & 1);
            len += 1;

            let index = code.wrapping_sub(table.first_code[len]);
            if code >= table.first_code[len] && index < table.count[len] {
                let symbol = table.symbols[(table.offset[len] + index) as usize];
                if symbol == EOS {
                    return Err(Error::HuffmanError("EOS symbol in string literal".into()));
                }
                dst.push(symbol as u8);
                code = 0;
                len = 0;
            } else if len == MAX_CODE_LEN {
                return Err(Error::HuffmanError("invalid code".into()));
            }
        }
    }

    if len > 7 {
        return Err(Error::HuffmanError("padding longer than 7 bits".into()));
    }
    if code != (1u32 << len) - 1 {
        return Err(Error::HuffmanError("padding is not a prefix of EOS".into()));
    }

    Ok(())
}
