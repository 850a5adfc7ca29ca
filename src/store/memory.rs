//! In-process store.
//!
//! Keeps byte-string values in memory with the same observable behaviour as
//! a remote server: numbered namespaces, big-endian bit numbering, lazily
//! created keys, a per-value size limit and `WRONGTYPE` errors for keys that
//! hold something other than a byte string. Useful for tests and for
//! single-process deployments.
//!
//! Values are kept as sparse fixed-size pages, so a lightly filled filter
//! sized for billions of bits only costs memory for the pages it touched.

use super::{Batch, BitOp, Store};
use crate::config::DEFAULT_MAX_VALUE_BYTES;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Bytes per page of a [`BitString`].
const PAGE_BYTES: u64 = 64;

#[derive(Debug, Clone)]
enum Value {
    Bytes(BitString),
    Hash(HashMap<String, Vec<u8>>),
}

/// A byte string stored as pages; pages never written read as zero.
#[derive(Debug, Clone, Default)]
struct BitString {
    /// Length in bytes, one past the highest byte ever written.
    len: u64,
    pages: HashMap<u64, [u8; PAGE_BYTES as usize]>,
}

impl BitString {
    fn bit(&self, offset: u64) -> bool {
        let byte = offset / 8;
        self.pages
            .get(&(byte / PAGE_BYTES))
            .is_some_and(|page| page[(byte % PAGE_BYTES) as usize] & mask(offset) != 0)
    }

    /// Sets a bit and returns its previous value.
    fn set(&mut self, offset: u64) -> bool {
        let byte = offset / 8;
        let page = self.pages.entry(byte / PAGE_BYTES).or_insert([0; PAGE_BYTES as usize]);
        let slot = &mut page[(byte % PAGE_BYTES) as usize];
        let previous = *slot & mask(offset) != 0;
        *slot |= mask(offset);
        self.len = self.len.max(byte + 1);
        previous
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn to_vec(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.len as usize];
        for (&index, page) in &self.pages {
            let start = (index * PAGE_BYTES) as usize;
            let end = (start + page.len()).min(bytes.len());
            bytes[start..end].copy_from_slice(&page[..end - start]);
        }
        bytes
    }
}

type Namespace = HashMap<String, Value>;

#[derive(Debug)]
struct Shared {
    namespaces: RwLock<HashMap<u32, Namespace>>,
    max_value_bytes: u64,
}

/// Shared in-memory store.
///
/// Cloning is cheap and every clone sees the same data. Use
/// [`MemoryStore::namespace`] for a handle onto a different namespace.
///
/// # Thread Safety
///
/// Each batch runs under one lock, so bit operations never tear.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    db: u32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store limiting values to 512MB.
    pub fn new() -> Self {
        Self::with_max_value_bytes(DEFAULT_MAX_VALUE_BYTES)
    }

    /// Creates an empty store limiting values to `max_value_bytes`.
    pub fn with_max_value_bytes(max_value_bytes: u64) -> Self {
        let shared = Shared { namespaces: RwLock::new(HashMap::new()), max_value_bytes };
        Self { shared: Arc::new(shared), db: 0 }
    }

    /// Returns a handle onto namespace `db` of the same data.
    pub fn namespace(&self, db: u32) -> Self {
        Self { shared: Arc::clone(&self.shared), db }
    }

    /// Returns the namespace this handle addresses.
    pub fn db(&self) -> u32 {
        self.db
    }

    /// Returns the largest value size, in bytes, the store accepts.
    pub fn max_value_bytes(&self) -> u64 {
        self.shared.max_value_bytes
    }

    /// Returns a copy of the byte string stored under `key`.
    pub fn get_bytes(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let namespaces = self.shared.namespaces.read();
        match namespaces.get(&self.db).and_then(|ns| ns.get(key)) {
            None => Ok(None),
            Some(Value::Bytes(bits)) => Ok(Some(bits.to_vec())),
            Some(Value::Hash(_)) => Err(StoreError::wrong_type(WRONGTYPE)),
        }
    }

    /// Returns the length in bytes of the value under `key`, 0 if missing.
    pub fn value_len(&self, key: &str) -> StoreResult<u64> {
        let namespaces = self.shared.namespaces.read();
        match namespaces.get(&self.db).and_then(|ns| ns.get(key)) {
            None => Ok(0),
            Some(Value::Bytes(bits)) => Ok(bits.len),
            Some(Value::Hash(_)) => Err(StoreError::wrong_type(WRONGTYPE)),
        }
    }

    /// Returns the number of bytes held for values of this namespace.
    ///
    /// Only touched pages count, so this stays far below the sum of value
    /// lengths for sparse values.
    pub fn resident_bytes(&self) -> u64 {
        let namespaces = self.shared.namespaces.read();
        let Some(ns) = namespaces.get(&self.db) else {
            return 0;
        };
        ns.values()
            .map(|value| match value {
                Value::Bytes(bits) => bits.page_count() as u64 * PAGE_BYTES,
                Value::Hash(_) => 0,
            })
            .sum()
    }

    /// Sets `field` of the hash stored under `key`, creating it if needed.
    ///
    /// Returns true if the field is new.
    pub fn hset(&self, key: &str, field: &str, value: &[u8]) -> StoreResult<bool> {
        let mut namespaces = self.shared.namespaces.write();
        let ns = namespaces.entry(self.db).or_default();
        let entry = ns.entry(key.to_string()).or_insert_with(|| Value::Hash(HashMap::new()));
        match entry {
            Value::Hash(fields) => Ok(fields.insert(field.to_string(), value.to_vec()).is_none()),
            Value::Bytes(_) => Err(StoreError::wrong_type(WRONGTYPE)),
        }
    }

    /// Returns the number of keys in this namespace.
    pub fn len(&self) -> usize {
        self.shared.namespaces.read().get(&self.db).map_or(0, |ns| ns.len())
    }

    /// Returns true if this namespace holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_offset(&self, offset: u64) -> StoreResult<()> {
        if offset / 8 >= self.shared.max_value_bytes {
            return Err(StoreError::unknown("ERR bit offset is not an integer or out of range"));
        }
        Ok(())
    }

    fn read_bit(&self, ns: Option<&Namespace>, key: &str, offset: u64) -> StoreResult<bool> {
        self.check_offset(offset)?;
        match ns.and_then(|ns| ns.get(key)) {
            None => Ok(false),
            Some(Value::Bytes(bits)) => Ok(bits.bit(offset)),
            Some(Value::Hash(_)) => Err(StoreError::wrong_type(WRONGTYPE)),
        }
    }

    fn write_bit(&self, ns: &mut Namespace, key: &str, offset: u64) -> StoreResult<bool> {
        self.check_offset(offset)?;
        let entry =
            ns.entry(key.to_string()).or_insert_with(|| Value::Bytes(BitString::default()));
        match entry {
            Value::Bytes(bits) => Ok(bits.set(offset)),
            Value::Hash(_) => Err(StoreError::wrong_type(WRONGTYPE)),
        }
    }
}

impl Store for MemoryStore {
    fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Runs every operation even when some fail, like a pipelined server
    /// would, and reports the first failure.
    fn execute(&self, batch: &Batch) -> StoreResult<Vec<bool>> {
        let mut results = Vec::with_capacity(batch.len());
        let mut first_error = None;

        if batch.has_writes() {
            let mut namespaces = self.shared.namespaces.write();
            let ns = namespaces.entry(self.db).or_default();
            for op in batch.iter() {
                let result = match op {
                    BitOp::Get { key, offset } => self.read_bit(Some(&*ns), key, offset),
                    BitOp::Set { key, offset } => self.write_bit(ns, key, offset),
                };
                record(result, &mut results, &mut first_error);
            }
        } else {
            let namespaces = self.shared.namespaces.read();
            let ns = namespaces.get(&self.db);
            for op in batch.iter() {
                let result = self.read_bit(ns, op.key(), op.offset());
                record(result, &mut results, &mut first_error);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }

    fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let mut namespaces = self.shared.namespaces.write();
        let Some(ns) = namespaces.get_mut(&self.db) else {
            return Ok(0);
        };
        Ok(keys.iter().filter(|key| ns.remove(key.as_str()).is_some()).count() as u64)
    }

    fn exists(&self, keys: &[String]) -> StoreResult<u64> {
        let namespaces = self.shared.namespaces.read();
        let Some(ns) = namespaces.get(&self.db) else {
            return Ok(0);
        };
        Ok(keys.iter().filter(|key| ns.contains_key(key.as_str())).count() as u64)
    }
}

fn record(result: StoreResult<bool>, results: &mut Vec<bool>, first_error: &mut Option<StoreError>) {
    match result {
        Ok(bit) => results.push(bit),
        Err(err) => {
            results.push(false);
            first_error.get_or_insert(err);
        }
    }
}

/// Mask of bit `offset` within its byte, numbered from the most significant bit.
fn mask(offset: u64) -> u8 {
    0x80 >> (offset % 8)
}
