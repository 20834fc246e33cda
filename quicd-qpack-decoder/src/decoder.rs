//! Connection-level QPACK decoder.
//!
//! Owns the dynamic table and the blocked/ready bookkeeping, consumes the
//! peer's encoder stream, and produces the bytes for our decoder stream.
//! All mutation goes through `&mut self`, so insertion events and newly
//! arriving header blocks are always evaluated against a consistent table.

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::config::DecoderConfig;
use crate::dynamic_table::DynamicTable;
use crate::error::{Error, Result};
use crate::field_line::{FieldLine, ENTRY_OVERHEAD};
use crate::instructions::{DecoderInstruction, EncoderInstruction};
use crate::progressive::{BlockHandle, BlockState, DecodedBlock, ProgressiveDecoder};
use crate::{integer, static_table, string};

/// QPACK decoder for one HTTP/3 connection.
pub struct Decoder {
    config: DecoderConfig,
    table: DynamicTable,
    blocks: ProgressiveDecoder,
    /// Partial encoder stream instruction carried over between reads.
    encoder_stream: BytesMut,
    /// Pending decoder stream output.
    decoder_stream: BytesMut,
    /// Inserts the encoder knows we have received.
    known_received_count: u64,
}

impl Decoder {
    /// Creates a decoder. The dynamic table starts at capacity zero until
    /// the encoder sets one.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            table: DynamicTable::new(0, config.max_table_capacity),
            blocks: ProgressiveDecoder::new(&config),
            config,
            encoder_stream: BytesMut::new(),
            decoder_stream: BytesMut::new(),
            known_received_count: 0,
        })
    }

    /// Submits a complete header block received on `stream_id`.
    ///
    /// The returned handle identifies the block in [`Decoder::block_state`]
    /// and in the [`DecodedBlock`] eventually returned by
    /// [`Decoder::poll_ready_blocks`].
    pub fn submit_header_block(
        &mut self,
        stream_id: u64,
        block: impl Into<Bytes>,
    ) -> Result<BlockHandle> {
        self.blocks.submit(stream_id, block.into(), &self.table)
    }

    /// Inserts one entry into the dynamic table and resumes any blocks that
    /// no longer need to wait.
    pub fn on_dynamic_table_insertion(&mut self, field: FieldLine) -> Result<()> {
        self.blocks.check_failed()?;
        self.insert(field)?;
        self.blocks.on_insertion(&self.table)?;
        Ok(())
    }

    /// Applies a Set Dynamic Table Capacity.
    ///
    /// Only header blocks submitted afterwards are interpreted with the new
    /// `MaxEntries`; already decoded blocks are unaffected.
    pub fn on_capacity_change(&mut self, capacity: u64) -> Result<()> {
        self.blocks.check_failed()?;
        self.table
            .set_capacity(capacity)
            .map_err(|err| self.blocks.fail(None, err))?;
        debug!(
            "dynamic table capacity set to {} ({} entries)",
            capacity,
            crate::required_insert_count::max_entries(capacity)
        );
        Ok(())
    }

    /// Feeds bytes received on the peer's encoder stream.
    ///
    /// Every complete instruction is applied; a trailing partial instruction
    /// is kept until more bytes arrive. Blocked header blocks are
    /// re-evaluated once after the whole chunk. Returns the number of
    /// instructions applied.
    ///
    /// A name or value that could not fit in the table at its current
    /// capacity fails the decoder as soon as its length is read.
    pub fn process_encoder_stream(&mut self, data: &[u8]) -> Result<usize> {
        self.blocks.check_failed()?;
        self.encoder_stream.extend_from_slice(data);

        let inserts_before = self.table.insert_count();
        let mut applied = 0;
        loop {
            let decoded = EncoderInstruction::decode(&self.encoder_stream, self.max_string_len());
            let (instruction, consumed) = match decoded {
                Ok(decoded) => decoded,
                Err(Error::Incomplete(_)) => break,
                Err(err) => {
                    let err = Error::EncoderStreamError(err.to_string());
                    return Err(self.blocks.fail(None, err));
                }
            };
            self.encoder_stream.advance(consumed);
            self.apply(instruction)?;
            applied += 1;
        }

        if self.encoder_stream.len() as u64 > self.max_instruction_len() {
            let err = Error::EncoderStreamError(format!(
                "{} bytes buffered without a complete instruction",
                self.encoder_stream.len()
            ));
            return Err(self.blocks.fail(None, err));
        }

        if self.table.insert_count() > inserts_before {
            self.blocks.on_insertion(&self.table)?;
        }
        Ok(applied)
    }

    /// Longest name or value an insertion can carry at the current capacity.
    fn max_string_len(&self) -> u64 {
        self.table.capacity().saturating_sub(ENTRY_OVERHEAD)
    }

    /// Longest encoder stream instruction that can still be applied: two
    /// prefix integers and two string literals.
    fn max_instruction_len(&self) -> u64 {
        let literal = string::max_wire_len(self.max_string_len(), true);
        literal
            .saturating_add(integer::MAX_ENCODED_LEN as u64)
            .saturating_mul(2)
    }

    fn apply(&mut self, instruction: EncoderInstruction) -> Result<()> {
        trace!("encoder stream: {:?}", instruction);

        match instruction {
            EncoderInstruction::SetCapacity { capacity } => self.on_capacity_change(capacity),
            EncoderInstruction::InsertWithNameRef {
                is_static,
                name_index,
                value,
            } => {
                let name = if is_static {
                    static_table::get(name_index).map(|(name, _)| Bytes::from_static(name))
                } else {
                    self.table.get_relative(name_index).map(|e| e.name.clone())
                };
                let name = name.ok_or_else(|| {
                    self.blocks.fail(
                        None,
                        Error::EncoderStreamError(format!(
                            "invalid name reference {} (static: {})",
                            name_index, is_static
                        )),
                    )
                })?;
                self.insert(FieldLine { name, value })
            }
            EncoderInstruction::InsertLiteral { name, value } => {
                self.insert(FieldLine { name, value })
            }
            EncoderInstruction::Duplicate { index } => {
                let field = self.table.get_relative(index).cloned().ok_or_else(|| {
                    self.blocks.fail(
                        None,
                        Error::EncoderStreamError(format!("invalid duplicate index {}", index)),
                    )
                })?;
                self.insert(field)
            }
        }
    }

    fn insert(&mut self, field: FieldLine) -> Result<()> {
        match self.table.insert(field) {
            Ok(index) => {
                trace!("inserted dynamic entry {}", index);
                Ok(())
            }
            Err(err) => Err(self.blocks.fail(None, err)),
        }
    }

    /// Removes and returns decoded header lists in arrival order, up to the
    /// first block that is still blocked.
    ///
    /// A Section Acknowledgment is queued for every returned block that
    /// referenced the dynamic table.
    pub fn poll_ready_blocks(&mut self) -> Vec<DecodedBlock> {
        let ready = self.blocks.poll_ready_blocks();
        for block in &ready {
            if block.required_insert_count > 0 {
                DecoderInstruction::SectionAck {
                    stream_id: block.stream_id,
                }
                .encode(&mut self.decoder_stream);
                self.known_received_count =
                    self.known_received_count.max(block.required_insert_count);
            }
        }
        ready
    }

    /// Returns pending decoder stream bytes, if any.
    ///
    /// Inserts not covered by a Section Acknowledgment are announced with an
    /// Insert Count Increment.
    pub fn take_decoder_instructions(&mut self) -> Option<Bytes> {
        let insert_count = self.table.insert_count();
        if insert_count > self.known_received_count {
            DecoderInstruction::InsertCountIncrement {
                increment: insert_count - self.known_received_count,
            }
            .encode(&mut self.decoder_stream);
            self.known_received_count = insert_count;
        }

        if self.decoder_stream.is_empty() {
            None
        } else {
            Some(self.decoder_stream.split().freeze())
        }
    }

    /// Returns the state of an outstanding header block.
    pub fn block_state(&self, handle: BlockHandle) -> Option<BlockState> {
        self.blocks.block_state(handle)
    }

    /// Returns the number of streams currently blocked.
    pub fn blocked_streams(&self) -> usize {
        self.blocks.blocked_streams()
    }

    /// Returns the error that failed the decoder, if any.
    pub fn failure(&self) -> Option<&Error> {
        self.blocks.failure()
    }

    /// Returns the dynamic table.
    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header_block::{HeaderBlockBuilder, Prefix};

    fn encoder_stream(instructions: &[EncoderInstruction]) -> BytesMut {
        let mut buf = BytesMut::new();
        for instruction in instructions {
            instruction.encode(&mut buf);
        }
        buf
    }

    #[test]
    fn test_decoder_creation() {
        let decoder = Decoder::new(DecoderConfig::default()).unwrap();
        assert_eq!(decoder.table().capacity(), 0);
        assert_eq!(decoder.table().max_capacity(), 4096);
        assert_eq!(decoder.blocked_streams(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DecoderConfig {
            max_field_section_size: 0,
            ..Default::default()
        };
        assert!(matches!(Decoder::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rfc9204_example_b2() {
        let mut decoder = Decoder::new(DecoderConfig {
            max_table_capacity: 220,
            ..Default::default()
        })
        .unwrap();

        let capacity = encoder_stream(&[EncoderInstruction::SetCapacity { capacity: 220 }]);
        assert_eq!(decoder.process_encoder_stream(&capacity).unwrap(), 1);

        // Header block on stream 4 overtakes the inserts it references.
        let handle = decoder
            .submit_header_block(4, Bytes::from_static(&[0x03, 0x81, 0x10, 0x11]))
            .unwrap();
        assert!(matches!(
            decoder.block_state(handle),
            Some(BlockState::Blocked { .. })
        ));

        let instructions = encoder_stream(&[
            EncoderInstruction::InsertWithNameRef {
                is_static: true,
                name_index: 0,
                value: Bytes::from_static(b"www.example.com"),
            },
            EncoderInstruction::InsertWithNameRef {
                is_static: true,
                name_index: 1,
                value: Bytes::from_static(b"/sample/path"),
            },
        ]);
        assert_eq!(decoder.process_encoder_stream(&instructions).unwrap(), 2);

        let ready = decoder.poll_ready_blocks();
        assert_eq!(ready.len(), 1);
        assert_eq!(
            ready[0].fields,
            vec![
                FieldLine::new(":authority", "www.example.com"),
                FieldLine::new(":path", "/sample/path"),
            ]
        );

        // Section Acknowledgment covers both inserts.
        assert_eq!(
            decoder.take_decoder_instructions(),
            Some(Bytes::from_static(&[0x84]))
        );
        assert_eq!(decoder.take_decoder_instructions(), None);
    }

    #[test]
    fn test_partial_encoder_instruction_is_buffered() {
        let mut decoder = Decoder::new(DecoderConfig::default()).unwrap();
        let instructions = encoder_stream(&[
            EncoderInstruction::SetCapacity { capacity: 4096 },
            EncoderInstruction::InsertLiteral {
                name: Bytes::from_static(b"custom-key"),
                value: Bytes::from_static(b"custom-value"),
            },
        ]);

        let split = instructions.len() - 4;
        assert_eq!(decoder.process_encoder_stream(&instructions[..split]).unwrap(), 1);
        assert_eq!(decoder.table().insert_count(), 0);
        assert_eq!(decoder.process_encoder_stream(&instructions[split..]).unwrap(), 1);
        assert_eq!(decoder.table().insert_count(), 1);

        assert_eq!(
            decoder.take_decoder_instructions(),
            Some(Bytes::from_static(&[0x01]))
        );
    }

    #[test]
    fn test_oversized_literal_fails_before_it_is_buffered() {
        let mut decoder = Decoder::new(DecoderConfig::default()).unwrap();
        let mut instructions =
            encoder_stream(&[EncoderInstruction::SetCapacity { capacity: 4096 }]);
        // Insert With Literal Name announcing a 1 GiB name.
        integer::encode(1 << 30, 5, 0x40, &mut instructions);

        let err = decoder.process_encoder_stream(&instructions).unwrap_err();
        assert!(matches!(err, Error::EncoderStreamError(_)));
        assert_eq!(err.error_code(), 0x0201);

        // Later chunks are not buffered.
        let chunk = vec![b'a'; 1 << 20];
        assert_eq!(decoder.process_encoder_stream(&chunk), Err(err));
    }

    #[test]
    fn test_literal_bound_follows_capacity() {
        let mut decoder = Decoder::new(DecoderConfig::default()).unwrap();
        // 64 bytes of capacity leaves 32 for name and value.
        let instructions = encoder_stream(&[
            EncoderInstruction::SetCapacity { capacity: 64 },
            EncoderInstruction::InsertLiteral {
                name: Bytes::from_static(b"x"),
                value: Bytes::from(vec![b'v'; 33]),
            },
        ]);

        // The value length is rejected before the value bytes arrive.
        let err = decoder
            .process_encoder_stream(&instructions[..5])
            .unwrap_err();
        assert!(matches!(err, Error::EncoderStreamError(_)));
        assert_eq!(decoder.table().capacity(), 64);
    }

    #[test]
    fn test_partial_instruction_within_bound_is_kept() {
        let mut decoder = Decoder::new(DecoderConfig::default()).unwrap();
        let instructions = encoder_stream(&[
            EncoderInstruction::SetCapacity { capacity: 4096 },
            EncoderInstruction::InsertLiteral {
                name: Bytes::from_static(b"x-large"),
                value: Bytes::from(vec![b'v'; 4000]),
            },
        ]);

        let split = instructions.len() - 1;
        assert_eq!(decoder.process_encoder_stream(&instructions[..split]).unwrap(), 1);
        assert!(decoder.failure().is_none());
        assert_eq!(decoder.process_encoder_stream(&instructions[split..]).unwrap(), 1);
        assert_eq!(decoder.table().insert_count(), 1);
    }

    #[test]
    fn test_duplicate_and_dynamic_name_reference() {
        let mut decoder = Decoder::new(DecoderConfig::default()).unwrap();
        let instructions = encoder_stream(&[
            EncoderInstruction::SetCapacity { capacity: 4096 },
            EncoderInstruction::InsertLiteral {
                name: Bytes::from_static(b"custom-key"),
                value: Bytes::from_static(b"custom-value"),
            },
            EncoderInstruction::Duplicate { index: 0 },
            EncoderInstruction::InsertWithNameRef {
                is_static: false,
                name_index: 0,
                value: Bytes::from_static(b"other-value"),
            },
        ]);
        decoder.process_encoder_stream(&instructions).unwrap();

        let table = decoder.table();
        assert_eq!(table.insert_count(), 3);
        assert_eq!(table.get_absolute(1), table.get_absolute(0));
        assert_eq!(
            table.get_absolute(2),
            Some(&FieldLine::new("custom-key", "other-value"))
        );
    }

    #[test]
    fn test_invalid_duplicate_fails_decoder() {
        let mut decoder = Decoder::new(DecoderConfig::default()).unwrap();
        let instructions = encoder_stream(&[
            EncoderInstruction::SetCapacity { capacity: 4096 },
            EncoderInstruction::Duplicate { index: 0 },
        ]);

        let err = decoder.process_encoder_stream(&instructions).unwrap_err();
        assert_eq!(err.error_code(), 0x0201);
        assert_eq!(decoder.failure(), Some(&err));
        assert_eq!(decoder.submit_header_block(0, vec![0x00, 0x00]), Err(err));
    }

    #[test]
    fn test_capacity_above_maximum_fails_decoder() {
        let mut decoder = Decoder::new(DecoderConfig::default()).unwrap();
        let err = decoder.on_capacity_change(8192).unwrap_err();
        assert!(matches!(err, Error::DynamicTableError(_)));
        assert!(decoder.failure().is_some());
    }

    #[test]
    fn test_direct_insertion_unblocks() {
        let mut decoder = Decoder::new(DecoderConfig::default()).unwrap();
        decoder.on_capacity_change(4096).unwrap();
        let max_entries = 4096 / 32;

        let block = HeaderBlockBuilder::new(Prefix::new(1, 0), max_entries)
            .indexed_post_base(0)
            .build();
        let handle = decoder.submit_header_block(8, block).unwrap();
        assert_eq!(decoder.blocked_streams(), 1);

        decoder
            .on_dynamic_table_insertion(FieldLine::new("x-trace", "abc"))
            .unwrap();
        assert_eq!(decoder.block_state(handle), Some(BlockState::Ready));
        let ready = decoder.poll_ready_blocks();
        assert_eq!(ready[0].fields, vec![FieldLine::new("x-trace", "abc")]);
        assert_eq!(
            decoder.take_decoder_instructions(),
            Some(Bytes::from_static(&[0x88]))
        );
    }
}
