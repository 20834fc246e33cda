//! QPACK decoding for HTTP/3 (RFC 9204): Required Insert Count and blocked
//! streams.
//!
//! Every QPACK header block names the number of dynamic table insertions the
//! decoder must have seen before the block can be decoded. The value travels
//! modulo `2 * MaxEntries`, so the decoder reconstructs it from its own
//! insertion count ([`required_insert_count`]) and then either decodes the
//! block or parks it until the encoder stream delivers the missing entries
//! ([`progressive`]).
//!
//! # Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use quicd_qpack_decoder::{
//!     header_block::{HeaderBlockBuilder, Prefix},
//!     Decoder, DecoderConfig, EncoderInstruction,
//! };
//!
//! let mut decoder = Decoder::new(DecoderConfig::default()).unwrap();
//!
//! let mut encoder_stream = BytesMut::new();
//! EncoderInstruction::SetCapacity { capacity: 4096 }.encode(&mut encoder_stream);
//! decoder.process_encoder_stream(&encoder_stream).unwrap();
//!
//! // The block references an entry the decoder has not received yet.
//! let block = HeaderBlockBuilder::new(Prefix::new(1, 1), 4096 / 32)
//!     .indexed_relative(0)
//!     .build();
//! decoder.submit_header_block(0, block).unwrap();
//! assert!(decoder.poll_ready_blocks().is_empty());
//!
//! let mut encoder_stream = BytesMut::new();
//! EncoderInstruction::InsertLiteral {
//!     name: "x-request-id".into(),
//!     value: "42".into(),
//! }
//! .encode(&mut encoder_stream);
//! decoder.process_encoder_stream(&encoder_stream).unwrap();
//!
//! let ready = decoder.poll_ready_blocks();
//! assert_eq!(&ready[0].fields[0].value[..], b"42");
//! ```

pub mod config;
pub mod decoder;
pub mod dynamic_table;
pub mod error;
pub mod field_line;
pub mod header_block;
pub mod huffman;
pub mod instructions;
pub mod integer;
pub mod progressive;
pub mod required_insert_count;
pub mod static_table;
pub mod string;

// Re-export main types
pub use config::DecoderConfig;
pub use decoder::Decoder;
pub use dynamic_table::{DynamicTable, TableView};
pub use error::{Error, Result};
pub use field_line::FieldLine;
pub use instructions::{DecoderInstruction, EncoderInstruction};
pub use progressive::{BlockHandle, BlockState, DecodedBlock, ProgressiveDecoder};
pub use required_insert_count::DecodeError;
