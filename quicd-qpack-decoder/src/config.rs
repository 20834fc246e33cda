//! QPACK decoder configuration.
//!
//! The limits here are the ones a decoder advertises to its peer in HTTP/3
//! SETTINGS, plus the local field section size bound.

use crate::error::{Error, Result};
use crate::integer::MAX_INTEGER;

/// Configuration for a QPACK decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Maximum dynamic table capacity in bytes (default: 4 KB).
    ///
    /// RFC 9204 Section 3.2.3: Sent in SETTINGS_QPACK_MAX_TABLE_CAPACITY.
    /// The encoder starts at capacity zero and raises it with a Set Dynamic
    /// Table Capacity instruction.
    pub max_table_capacity: u64,

    /// Maximum number of streams that may be blocked at once (default: 100).
    ///
    /// RFC 9204 Section 2.1.2: Sent in SETTINGS_QPACK_BLOCKED_STREAMS.
    /// A header block that would block one stream more is a connection error.
    pub max_blocked_streams: usize,

    /// Maximum size of a field section in bytes (default: 64 KB).
    ///
    /// Bounds both the encoded block that may be buffered while blocked and
    /// the decoded header list (name + value + 32 per field).
    pub max_field_section_size: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_table_capacity: 4096,
            max_blocked_streams: 100,
            max_field_section_size: 64 * 1024, // 64 KB
        }
    }
}

impl DecoderConfig {
    /// Create a configuration that never references the dynamic table.
    ///
    /// Every header block must then carry a Required Insert Count of zero,
    /// and no stream can ever block.
    pub fn static_only() -> Self {
        Self {
            max_table_capacity: 0,
            max_blocked_streams: 0,
            ..Default::default()
        }
    }

    /// Validate configuration values are within protocol bounds.
    pub fn validate(&self) -> Result<()> {
        if self.max_table_capacity > MAX_INTEGER {
            return Err(Error::InvalidConfig(
                "max_table_capacity does not fit in a QUIC varint".into(),
            ));
        }
        if self.max_blocked_streams as u64 > MAX_INTEGER {
            return Err(Error::InvalidConfig(
                "max_blocked_streams does not fit in a QUIC varint".into(),
            ));
        }
        if self.max_field_section_size == 0 {
            return Err(Error::InvalidConfig(
                "max_field_section_size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DecoderConfig::default().validate().is_ok());
        assert!(DecoderConfig::static_only().validate().is_ok());
    }

    #[test]
    fn test_zero_field_section_size() {
        let config = DecoderConfig {
            max_field_section_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_capacity_beyond_varint() {
        let config = DecoderConfig {
            max_table_capacity: 1 << 62,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
