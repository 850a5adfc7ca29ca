//! # redbloom - A Bloom Filter Stored in a Remote Key-Value Store
//!
//! redbloom keeps the bit array of a Bloom filter in a key-value server
//! instead of local memory. Any number of processes can open the same filter
//! and see each other's inserts, and a filter can grow past the memory of a
//! single machine or the value size limit of a single key.
//!
//! ## Architecture
//!
//! - **Parameters** ([`params`]): bit and probe counts from capacity and
//!   target error rate
//! - **Hashing** ([`hash`]): the fixed set of bit positions owned by an item
//! - **Sharding** ([`shard`]): logical bit index to `(key, offset)`
//! - **Store** ([`store`]): batched bit reads and writes in one round trip
//! - **Filter** ([`BloomFilter`]): add, update, contains, intersection, delete
//!
//! Every filter operation costs exactly one round trip to the store, however
//! many items it covers.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use redbloom::{BloomFilter, Options};
//!
//! # fn main() -> Result<(), redbloom::Error> {
//! let options = Options::default().host("127.0.0.1").port(6379);
//! let filter = BloomFilter::open("visited", 1_000_000, 0.001, &options)?;
//!
//! filter.add("https://example.com/")?;
//! filter.update(["https://example.com/a", "https://example.com/b"])?;
//!
//! assert!(filter.contains("https://example.com/")?);
//! let seen = filter.intersection(["https://example.com/a", "https://example.com/z"])?;
//! println!("already visited: {:?}", seen);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod error;
pub mod hash;
pub mod params;
pub mod shard;
pub mod store;

// Re-exports
pub use config::Options;
pub use error::{Error, Result, StoreError, StoreErrorKind};
pub use params::FilterParams;
pub use shard::{BitAddress, ShardLayout};
pub use store::{Batch, MemoryStore, RemoteStore, Store};

/// A Bloom filter whose bits live in a [`Store`].
///
/// The filter itself only holds its name and sizing. Two filters created with
/// the same name, capacity and error rate against the same store address the
/// same bits.
///
/// # Thread Safety
///
/// All operations take `&self`. Concurrent inserts from any number of
/// filters converge, because setting a bit twice is harmless. A `delete`
/// racing with inserts is not ordered by the filter; callers must serialise
/// those themselves.
#[derive(Debug)]
pub struct BloomFilter<S = RemoteStore> {
    /// Requested capacity
    capacity: u64,

    /// Requested false positive rate
    error_rate: f64,

    /// Bit and probe counts
    params: FilterParams,

    /// Shard keys derived from the name
    layout: ShardLayout,

    /// Backing store handle
    store: S,
}

impl BloomFilter<RemoteStore> {
    /// Opens a filter on the remote store described by `options`.
    ///
    /// # Arguments
    ///
    /// * `name` - Key prefix of the filter's shards
    /// * `capacity` - Expected number of distinct items
    /// * `error_rate` - Target false positive rate, strictly between 0 and 1
    /// * `options` - Store address, namespace and layout settings
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for out-of-range settings and
    /// [`Error::Construction`] if the store cannot be reached.
    pub fn open(
        name: impl Into<String>,
        capacity: u64,
        error_rate: f64,
        options: &Options,
    ) -> Result<Self> {
        let name = name.into();
        options.validate()?;
        // Reject bad settings before touching the network.
        check_name(&name)?;
        FilterParams::compute(capacity, error_rate)?;

        let store = RemoteStore::connect(options).map_err(Error::Construction)?;
        Self::with_store(name, capacity, error_rate, options.max_shard_bits, store)
    }
}

impl<S: Store> BloomFilter<S> {
    /// Creates a filter on an existing store handle.
    ///
    /// Checks that the store answers before returning.
    ///
    /// # Example
    ///
    /// ```
    /// use redbloom::{BloomFilter, MemoryStore};
    /// use redbloom::config::DEFAULT_MAX_SHARD_BITS;
    ///
    /// # fn main() -> Result<(), redbloom::Error> {
    /// let filter =
    ///     BloomFilter::with_store("demo", 10_000, 0.1, DEFAULT_MAX_SHARD_BITS, MemoryStore::new())?;
    /// filter.add("hello")?;
    /// assert!(filter.contains("hello")?);
    /// assert_eq!(filter.keys(), ["demo.0"]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_store(
        name: impl Into<String>,
        capacity: u64,
        error_rate: f64,
        max_shard_bits: u64,
        store: S,
    ) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;

        let params = FilterParams::compute(capacity, error_rate)?;
        let layout = ShardLayout::new(name, params.bit_count, max_shard_bits)?;

        store.ping().map_err(Error::Construction)?;

        log::debug!(
            "Opened filter {:?}: {} bits, {} hashes, {} shard(s)",
            layout.name(),
            params.bit_count,
            params.hash_count,
            layout.shard_count()
        );

        Ok(Self { capacity, error_rate, params, layout, store })
    }

    /// Adds an item to the filter.
    pub fn add<T: AsRef<[u8]>>(&self, item: T) -> Result<()> {
        let mut batch = Batch::with_capacity(self.params.hash_count as usize);
        self.push_probes(&mut batch, item.as_ref(), true);
        self.run("add", 1, &batch)?;
        Ok(())
    }

    /// Adds many items in one round trip.
    ///
    /// Leaves the same bits set as calling [`add`](Self::add) on each item.
    pub fn update<I, T>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut batch = Batch::new();
        let mut count = 0;
        for item in items {
            self.push_probes(&mut batch, item.as_ref(), true);
            count += 1;
        }
        if count == 0 {
            return Ok(());
        }

        self.run("update", count, &batch)?;
        Ok(())
    }

    /// Tests whether an item may be in the filter.
    ///
    /// Never returns `false` for an added item. Returns `true` for an item
    /// that was not added with a probability close to the error rate.
    pub fn contains<T: AsRef<[u8]>>(&self, item: T) -> Result<bool> {
        let mut batch = Batch::with_capacity(self.params.hash_count as usize);
        self.push_probes(&mut batch, item.as_ref(), false);
        let bits = self.run("contains", 1, &batch)?;
        Ok(bits.iter().all(|&bit| bit))
    }

    /// Returns the items the filter affirms, in input order, using one round
    /// trip.
    pub fn intersection<I, T>(&self, items: I) -> Result<Vec<T>>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return Ok(items);
        }

        let k = self.params.hash_count as usize;
        let mut batch = Batch::with_capacity(items.len() * k);
        for item in &items {
            self.push_probes(&mut batch, item.as_ref(), false);
        }

        let bits = self.run("intersection", items.len(), &batch)?;
        Ok(items
            .into_iter()
            .zip(bits.chunks(k))
            .filter(|(_, probes)| probes.iter().all(|&bit| bit))
            .map(|(item, _)| item)
            .collect())
    }

    /// Removes every shard of the filter from the store.
    ///
    /// The filter stays usable and starts out empty again.
    pub fn delete(&self) -> Result<()> {
        let removed = self
            .store
            .delete(self.layout.keys())
            .map_err(|e| Error::operation("delete", 0, e))?;
        log::debug!("Deleted filter {:?} ({} shard key(s) removed)", self.name(), removed);
        Ok(())
    }

    /// Returns the shard keys, in shard order.
    pub fn keys(&self) -> &[String] {
        self.layout.keys()
    }

    /// Returns the number of bit positions probed per item.
    pub fn hash_count(&self) -> u32 {
        self.params.hash_count
    }

    /// Returns the total number of bits across all shards.
    pub fn bit_count(&self) -> u64 {
        self.params.bit_count
    }

    /// Returns the number of shard keys.
    pub fn shard_count(&self) -> u64 {
        self.layout.shard_count()
    }

    /// Returns the filter name.
    pub fn name(&self) -> &str {
        self.layout.name()
    }

    /// Returns the capacity the filter was sized for.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the target false positive rate.
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    /// Returns the computed sizing.
    pub fn params(&self) -> FilterParams {
        self.params
    }

    /// Returns the shard layout.
    pub fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    /// Returns the store handle.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Appends one operation per probe of `item` to `batch`.
    fn push_probes(&self, batch: &mut Batch, item: &[u8], write: bool) {
        for index in hash::indices(item, self.params.bit_count, self.params.hash_count) {
            let address = self.layout.locate(index);
            let key = self.layout.key(address);
            if write {
                batch.set_bit(key, address.offset);
            } else {
                batch.get_bit(key, address.offset);
            }
        }
    }

    /// Runs `batch` and checks that every operation was answered.
    fn run(&self, operation: &'static str, items: usize, batch: &Batch) -> Result<Vec<bool>> {
        let bits = self.store.execute(batch).map_err(|e| Error::operation(operation, items, e))?;
        if bits.len() != batch.len() {
            let detail =
                format!("store answered {} of {} bit operations", bits.len(), batch.len());
            return Err(Error::operation(operation, items, StoreError::unknown(detail)));
        }
        Ok(bits)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_parameter("name must not be empty"));
    }
    Ok(())
}
