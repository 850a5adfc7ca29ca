//! Batch groups bit operations for a single round trip.
//!
//! A batch is an ordered list of reads and writes against shard keys. The
//! store answers with one result per operation in the same order, which is
//! how the filter maps results back to items.
//!
//! # Example
//!
//! ```
//! use redbloom::store::{Batch, MemoryStore, Store};
//!
//! # fn main() -> Result<(), redbloom::StoreError> {
//! let store = MemoryStore::new();
//! let mut batch = Batch::new();
//! batch.set_bit("demo.0", 7);
//! batch.get_bit("demo.0", 7);
//! batch.get_bit("demo.0", 6);
//!
//! assert_eq!(store.execute(&batch)?, vec![false, true, false]);
//! # Ok(())
//! # }
//! ```

/// One bit operation in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp<'a> {
    /// Read a bit.
    Get {
        /// Shard key
        key: &'a str,
        /// Bit offset within the value
        offset: u64,
    },
    /// Set a bit to 1.
    Set {
        /// Shard key
        key: &'a str,
        /// Bit offset within the value
        offset: u64,
    },
}

impl<'a> BitOp<'a> {
    /// Returns the key the operation addresses.
    pub fn key(&self) -> &'a str {
        match *self {
            BitOp::Get { key, .. } | BitOp::Set { key, .. } => key,
        }
    }

    /// Returns the bit offset the operation addresses.
    pub fn offset(&self) -> u64 {
        match *self {
            BitOp::Get { offset, .. } | BitOp::Set { offset, .. } => offset,
        }
    }
}

/// Operation as stored in the batch, with the key replaced by its slot.
#[derive(Debug, Clone, Copy)]
struct Entry {
    write: bool,
    key: usize,
    offset: u64,
}

/// Batch accumulates bit operations to be sent to the store together.
///
/// Each distinct key is stored once, so a batch covering many items of one
/// filter holds only as many key strings as the filter has shards.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    keys: Vec<String>,
    operations: Vec<Entry>,
}

impl Batch {
    /// Creates a new empty Batch.
    pub fn new() -> Self {
        Self { keys: Vec::new(), operations: Vec::new() }
    }

    /// Creates an empty Batch with room for `capacity` operations.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { keys: Vec::new(), operations: Vec::with_capacity(capacity) }
    }

    /// Adds a bit read to the batch.
    pub fn get_bit(&mut self, key: &str, offset: u64) {
        let key = self.slot(key);
        self.operations.push(Entry { write: false, key, offset });
    }

    /// Adds a bit write to the batch.
    pub fn set_bit(&mut self, key: &str, offset: u64) {
        let key = self.slot(key);
        self.operations.push(Entry { write: true, key, offset });
    }

    /// Clears all operations from the batch.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.operations.clear();
    }

    /// Returns the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns true if any operation writes.
    pub fn has_writes(&self) -> bool {
        self.operations.iter().any(|entry| entry.write)
    }

    /// Returns the distinct keys addressed, in order of first use.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns an iterator over the operations in the batch.
    pub fn iter(&self) -> impl Iterator<Item = BitOp<'_>> + '_ {
        self.operations.iter().map(move |entry| {
            let key = self.keys[entry.key].as_str();
            if entry.write {
                BitOp::Set { key, offset: entry.offset }
            } else {
                BitOp::Get { key, offset: entry.offset }
            }
        })
    }

    /// Returns the slot of `key`, adding it on first use.
    fn slot(&mut self, key: &str) -> usize {
        // Probes of one item usually land in the shard used last.
        if let Some(last) = self.keys.len().checked_sub(1) {
            if self.keys[last] == key {
                return last;
            }
        }
        match self.keys.iter().position(|k| k == key) {
            Some(slot) => slot,
            None => {
                self.keys.push(key.to_string());
                self.keys.len() - 1
            }
        }
    }
}
