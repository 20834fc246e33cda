//! Error types for QPACK decoding.
//!
//! Every error except [`Error::Incomplete`] is fatal to the connection: QPACK
//! state is shared between peers, so a malformed header block or encoder
//! stream instruction leaves the decoder unable to trust anything that
//! follows. Error kinds map to the HTTP/3 error codes of RFC 9204 Section 6.

use thiserror::Error;

use crate::required_insert_count::DecodeError;

/// Result type for QPACK decoder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding QPACK input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The Encoded Required Insert Count of a header block cannot be
    /// reconciled with the decoder's insertion and eviction state.
    ///
    /// Maps to `QPACK_DECOMPRESSION_FAILED` (0x0200).
    #[error("{0}")]
    InvalidRequiredInsertCount(#[from] DecodeError),

    /// Accepting another blocked stream would exceed
    /// `SETTINGS_QPACK_BLOCKED_STREAMS`.
    ///
    /// Maps to `QPACK_DECOMPRESSION_FAILED` (0x0200).
    #[error("maximum blocked streams exceeded: limit is {0}")]
    TooManyBlockedStreams(usize),

    /// Decoding of a field section failed.
    ///
    /// Maps to `QPACK_DECOMPRESSION_FAILED` (0x0200). This occurs when:
    /// - a static or dynamic index does not resolve
    /// - a dynamic reference is not covered by the Required Insert Count
    /// - a field line representation is malformed
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// The encoded or decoded field section exceeds the configured limit.
    #[error("field section exceeds {0} bytes")]
    FieldSectionTooLarge(u64),

    /// An encoder stream instruction could not be applied.
    ///
    /// Maps to `QPACK_ENCODER_STREAM_ERROR` (0x0201).
    #[error("encoder stream error: {0}")]
    EncoderStreamError(String),

    /// Dynamic table error.
    #[error("dynamic table error: {0}")]
    DynamicTableError(String),

    /// Prefix integer decoding error.
    #[error("integer decoding error: {0}")]
    IntegerError(String),

    /// A string literal is longer than any entry the table can hold.
    #[error("string literal of {len} bytes exceeds limit of {limit}")]
    StringTooLong { len: u64, limit: u64 },

    /// Huffman decoding error.
    #[error("huffman decoding error: {0}")]
    HuffmanError(String),

    /// Incomplete data - need more bytes.
    #[error("incomplete data: need {0} more bytes")]
    Incomplete(usize),

    /// Rejected decoder configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns the HTTP/3 error code for this error.
    pub fn error_code(&self) -> u64 {
        match self {
            Error::EncoderStreamError(_) | Error::DynamicTableError(_) => 0x0201,
            _ => 0x0200,
        }
    }

    /// Returns true if this error must close the connection.
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, Error::Incomplete(_))
    }
}
