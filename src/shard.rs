//! Mapping of the logical bit array onto store keys.
//!
//! A store caps the size of a single value, so a filter with more bits than
//! fit under one key is split into consecutive shards named
//! `<name>.0`, `<name>.1`, ... Shard `s` holds logical bits
//! `[s * max_shard_bits, (s + 1) * max_shard_bits)`.

use crate::error::{Error, Result};

/// Location of one logical bit inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitAddress {
    /// Index of the shard key holding the bit.
    pub shard: u64,
    /// Bit offset within that shard's value.
    pub offset: u64,
}

/// Splits a bit array of fixed length into shard keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLayout {
    name: String,
    bit_count: u64,
    max_shard_bits: u64,
    keys: Vec<String>,
}

impl ShardLayout {
    /// Creates the layout of a filter called `name` with `bit_count` bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if either size is zero.
    pub fn new(name: impl Into<String>, bit_count: u64, max_shard_bits: u64) -> Result<Self> {
        if bit_count == 0 {
            return Err(Error::invalid_parameter("bit_count must be > 0"));
        }
        if max_shard_bits == 0 {
            return Err(Error::invalid_parameter("max_shard_bits must be > 0"));
        }

        let name = name.into();
        let shard_count = bit_count.div_ceil(max_shard_bits);
        let keys = (0..shard_count).map(|shard| shard_key(&name, shard)).collect();

        Ok(Self { name, bit_count, max_shard_bits, keys })
    }

    /// Maps a logical bit index to its shard and offset.
    pub fn locate(&self, index: u64) -> BitAddress {
        debug_assert!(index < self.bit_count);
        locate(index, self.max_shard_bits)
    }

    /// Returns the key of the shard holding `address`.
    pub fn key(&self, address: BitAddress) -> &str {
        &self.keys[address.shard as usize]
    }

    /// Returns all shard keys in shard order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns the number of shards.
    pub fn shard_count(&self) -> u64 {
        self.keys.len() as u64
    }

    /// Returns the filter name used as key prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the total number of logical bits.
    pub fn bit_count(&self) -> u64 {
        self.bit_count
    }

    /// Returns the maximum number of bits per shard.
    pub fn max_shard_bits(&self) -> u64 {
        self.max_shard_bits
    }
}

/// Maps a logical bit index to its shard and offset.
pub fn locate(index: u64, max_shard_bits: u64) -> BitAddress {
    BitAddress { shard: index / max_shard_bits, offset: index % max_shard_bits }
}

/// Returns the key name of shard `shard` of filter `name`.
pub fn shard_key(name: &str, shard: u64) -> String {
    format!("{}.{}", name, shard)
}
