//! Readiness and blocking of header blocks.
//!
//! A header block can only be decoded once the dynamic table has received
//! every insertion it depends on (its Required Insert Count). Blocks that
//! arrive early are kept as plain data, the remaining field line bytes plus
//! the decoded prefix, and re-examined each time the table grows. There is
//! no continuation state beyond that.
//!
//! Blocks are decoded as soon as their entries are present but delivered
//! strictly in arrival order: a decoded block is held until every block
//! submitted before it has been delivered, whatever the Required Insert
//! Counts involved and whichever streams they belong to.
//!
//! Any malformed input, and exceeding the blocked stream limit, fails the
//! decoder permanently: the error is returned again from every later call.

use std::collections::{HashMap, HashSet, VecDeque};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::config::DecoderConfig;
use crate::dynamic_table::TableView;
use crate::error::{Error, Result};
use crate::field_line::FieldLine;
use crate::header_block::{self, Prefix};

/// Identifies a submitted header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHandle(u64);

/// Decode state of a header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Submitted; the Required Insert Count has not been read yet.
    Pending,
    /// Decoded; delivered by the next poll once every earlier block is.
    Ready,
    /// Waiting for the dynamic table to reach `required_insert_count`
    /// inserts.
    Blocked { required_insert_count: u64 },
    /// Decoding failed; terminal.
    Errored,
}

/// A decoded header list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    pub handle: BlockHandle,
    pub stream_id: u64,
    pub required_insert_count: u64,
    pub fields: Vec<FieldLine>,
}

/// A block waiting for insertions.
struct BlockedBlock {
    handle: BlockHandle,
    stream_id: u64,
    prefix: Prefix,
    field_lines: Bytes,
}

/// Position in the delivery queue.
enum Slot {
    Blocked(BlockedBlock),
    Decoded(DecodedBlock),
}

/// Tracks header blocks from submission until they are delivered.
pub struct ProgressiveDecoder {
    max_blocked_streams: usize,
    max_field_section_size: u64,
    next_handle: u64,
    /// Undelivered blocks in arrival order.
    queue: VecDeque<Slot>,
    states: HashMap<BlockHandle, BlockState>,
    failure: Option<Error>,
}

impl ProgressiveDecoder {
    /// Creates a decoder with the limits from `config`.
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            max_blocked_streams: config.max_blocked_streams,
            max_field_section_size: config.max_field_section_size,
            next_handle: 0,
            queue: VecDeque::new(),
            states: HashMap::new(),
            failure: None,
        }
    }

    /// Submits a complete header block received on `stream_id`.
    ///
    /// The block is decoded immediately if the table already holds every
    /// entry it depends on; otherwise it is queued until it does.
    pub fn submit<T: TableView>(
        &mut self,
        stream_id: u64,
        block: Bytes,
        table: &T,
    ) -> Result<BlockHandle> {
        self.check_failed()?;

        let handle = BlockHandle(self.next_handle);
        self.next_handle += 1;
        self.states.insert(handle, BlockState::Pending);
        trace!(
            "stream {}: header block {} ({} bytes)",
            stream_id,
            handle.0,
            block.len()
        );

        match self.accept(handle, stream_id, block, table) {
            Ok(()) => Ok(handle),
            Err(err) => Err(self.fail(Some(handle), err)),
        }
    }

    fn accept<T: TableView>(
        &mut self,
        handle: BlockHandle,
        stream_id: u64,
        block: Bytes,
        table: &T,
    ) -> Result<()> {
        if block.len() as u64 > self.max_field_section_size {
            return Err(Error::FieldSectionTooLarge(self.max_field_section_size));
        }

        let total_inserts = table.total_inserts();
        let (prefix, consumed) =
            header_block::decode_prefix(&block, table.max_entries(), total_inserts)?;
        let field_lines = block.slice(consumed..);

        if prefix.required_insert_count <= total_inserts {
            let fields = self.decode_fields(&field_lines, prefix, table)?;
            self.states.insert(handle, BlockState::Ready);
            self.queue.push_back(Slot::Decoded(DecodedBlock {
                handle,
                stream_id,
                required_insert_count: prefix.required_insert_count,
                fields,
            }));
            return Ok(());
        }

        if !self.is_stream_blocked(stream_id) && self.blocked_streams() >= self.max_blocked_streams
        {
            return Err(Error::TooManyBlockedStreams(self.max_blocked_streams));
        }

        debug!(
            "stream {} blocked: requires {} inserts, have {}",
            stream_id, prefix.required_insert_count, total_inserts
        );
        self.states.insert(
            handle,
            BlockState::Blocked {
                required_insert_count: prefix.required_insert_count,
            },
        );
        self.queue.push_back(Slot::Blocked(BlockedBlock {
            handle,
            stream_id,
            prefix,
            field_lines,
        }));
        Ok(())
    }

    /// Re-evaluates blocked blocks after the table has grown.
    ///
    /// Returns the number of blocks that were decoded.
    pub fn on_insertion<T: TableView>(&mut self, table: &T) -> Result<usize> {
        self.check_failed()?;

        let total_inserts = table.total_inserts();
        let mut unblocked = 0;

        for index in 0..self.queue.len() {
            let (handle, stream_id, prefix, field_lines) = match &self.queue[index] {
                Slot::Blocked(block) if block.prefix.required_insert_count <= total_inserts => (
                    block.handle,
                    block.stream_id,
                    block.prefix,
                    block.field_lines.clone(),
                ),
                _ => continue,
            };

            let fields = match self.decode_fields(&field_lines, prefix, table) {
                Ok(fields) => fields,
                Err(err) => {
                    self.queue.remove(index);
                    return Err(self.fail(Some(handle), err));
                }
            };
            debug!(
                "stream {} unblocked at {} inserts",
                stream_id, total_inserts
            );
            self.states.insert(handle, BlockState::Ready);
            self.queue[index] = Slot::Decoded(DecodedBlock {
                handle,
                stream_id,
                required_insert_count: prefix.required_insert_count,
                fields,
            });
            unblocked += 1;
        }

        Ok(unblocked)
    }

    /// Removes and returns decoded header lists in arrival order.
    ///
    /// Stops at the first block that is still blocked; decoded blocks behind
    /// it are returned by a later poll.
    pub fn poll_ready_blocks(&mut self) -> Vec<DecodedBlock> {
        let mut ready = Vec::new();
        while matches!(self.queue.front(), Some(Slot::Decoded(_))) {
            if let Some(Slot::Decoded(block)) = self.queue.pop_front() {
                self.states.remove(&block.handle);
                ready.push(block);
            }
        }
        ready
    }

    /// Returns the state of an outstanding block.
    ///
    /// Blocks that have been polled are no longer tracked.
    pub fn block_state(&self, handle: BlockHandle) -> Option<BlockState> {
        self.states.get(&handle).copied()
    }

    /// Returns the number of distinct streams with a blocked block.
    pub fn blocked_streams(&self) -> usize {
        self.blocked()
            .map(|block| block.stream_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Returns the number of blocked blocks.
    pub fn blocked_blocks(&self) -> usize {
        self.blocked().count()
    }

    /// Returns the error that failed the decoder, if any.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    pub(crate) fn check_failed(&self) -> Result<()> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Marks the decoder as failed and returns `err` for propagation.
    pub(crate) fn fail(&mut self, handle: Option<BlockHandle>, err: Error) -> Error {
        warn!("qpack decoder failed: {}", err);
        if let Some(handle) = handle {
            self.states.insert(handle, BlockState::Errored);
        }
        self.failure = Some(err.clone());
        err
    }

    fn blocked(&self) -> impl Iterator<Item = &BlockedBlock> {
        self.queue.iter().filter_map(|slot| match slot {
            Slot::Blocked(block) => Some(block),
            Slot::Decoded(_) => None,
        })
    }

    fn is_stream_blocked(&self, stream_id: u64) -> bool {
        self.blocked().any(|block| block.stream_id == stream_id)
    }

    fn decode_fields<T: TableView>(
        &self,
        data: &[u8],
        prefix: Prefix,
        table: &T,
    ) -> Result<Vec<FieldLine>> {
        let fields = header_block::decode_field_lines(data, prefix, table)?;
        let size: u64 = fields.iter().map(|field| field.size()).sum();
        if size > self.max_field_section_size {
            return Err(Error::FieldSectionTooLarge(self.max_field_section_size));
        }
        Ok(fields)
    }
}
