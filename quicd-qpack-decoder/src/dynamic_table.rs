//! Decoder-side dynamic table.
//!
//! Entries are stored oldest first and evicted from the front when an
//! insertion or a capacity reduction needs room (RFC 9204 Section 3.2).
//! Absolute indices start at zero for the first entry ever inserted, so the
//! total number of insertions doubles as the next absolute index.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::field_line::FieldLine;
use crate::required_insert_count;

/// Read access to the dynamic table state that header block decoding
/// depends on.
pub trait TableView {
    /// Maximum number of entries the table can hold at its current capacity.
    fn max_entries(&self) -> u64;

    /// Number of entries inserted since the connection started.
    fn total_inserts(&self) -> u64;

    /// Returns the entry at `absolute_index`, unless it was evicted or has
    /// not been inserted yet.
    fn lookup(&self, absolute_index: u64) -> Option<&FieldLine>;
}

/// The dynamic table.
#[derive(Debug)]
pub struct DynamicTable {
    entries: VecDeque<FieldLine>,
    /// Number of entries evicted so far; absolute index of `entries[0]`.
    evicted: u64,
    size: u64,
    capacity: u64,
    max_capacity: u64,
}

impl DynamicTable {
    /// Creates a new dynamic table.
    ///
    /// `max_capacity` is the limit advertised in
    /// `SETTINGS_QPACK_MAX_TABLE_CAPACITY`; the encoder may never set a
    /// larger capacity.
    pub fn new(capacity: u64, max_capacity: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            evicted: 0,
            size: 0,
            capacity: capacity.min(max_capacity),
            max_capacity,
        }
    }

    /// Returns the current insert count.
    pub fn insert_count(&self) -> u64 {
        self.evicted + self.entries.len() as u64
    }

    /// Returns the current capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the maximum capacity in bytes.
    pub fn max_capacity(&self) -> u64 {
        self.max_capacity
    }

    /// Returns the summed size of all entries.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sets a new capacity, evicting entries if necessary.
    pub fn set_capacity(&mut self, capacity: u64) -> Result<()> {
        if capacity > self.max_capacity {
            return Err(Error::DynamicTableError(format!(
                "capacity {} exceeds maximum {}",
                capacity, self.max_capacity
            )));
        }

        self.capacity = capacity;
        self.evict_to(capacity);
        Ok(())
    }

    /// Inserts a field line, evicting older entries to make room.
    ///
    /// Returns the absolute index of the new entry.
    pub fn insert(&mut self, field: FieldLine) -> Result<u64> {
        let size = field.size();
        if size > self.capacity {
            return Err(Error::DynamicTableError(format!(
                "entry size {} exceeds table capacity {}",
                size, self.capacity
            )));
        }

        self.evict_to(self.capacity - size);

        let absolute_index = self.insert_count();
        self.entries.push_back(field);
        self.size += size;
        Ok(absolute_index)
    }

    /// Gets an entry by absolute index.
    pub fn get_absolute(&self, index: u64) -> Option<&FieldLine> {
        let offset = index.checked_sub(self.evicted)?;
        self.entries.get(usize::try_from(offset).ok()?)
    }

    /// Gets an entry by an encoder stream relative index, where 0 is the
    /// most recently inserted entry.
    pub fn get_relative(&self, index: u64) -> Option<&FieldLine> {
        let absolute_index = self.insert_count().checked_sub(index)?.checked_sub(1)?;
        self.get_absolute(absolute_index)
    }

    fn evict_to(&mut self, target: u64) {
        while self.size > target {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            self.size -= entry.size();
            self.evicted += 1;
        }
    }
}

impl TableView for DynamicTable {
    fn max_entries(&self) -> u64 {
        required_insert_count::max_entries(self.capacity)
    }

    fn total_inserts(&self) -> u64 {
        self.insert_count()
    }

    fn lookup(&self, absolute_index: u64) -> Option<&FieldLine> {
        self.get_absolute(absolute_index)
    }
}
