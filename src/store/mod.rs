//! Backing store capability.
//!
//! The filter never touches bits itself. It builds a [`Batch`] of bit
//! operations and hands it to a [`Store`], which must run the whole batch in
//! one round trip and return one result per operation, in request order.
//!
//! Two implementations ship with the crate:
//!
//! - [`RemoteStore`]: a pipelining client for a RESP-speaking server.
//! - [`MemoryStore`]: an in-process store with the same semantics.

pub mod batch;
pub mod memory;
pub mod remote;
pub mod resp;

pub use batch::{Batch, BitOp};
pub use memory::MemoryStore;
pub use remote::RemoteStore;

use crate::error::{StoreError, StoreResult};

/// Bit-level access to a key-value store.
///
/// Values are byte strings addressed with big-endian bit numbering: offset
/// `o` is bit `7 - (o % 8)` of byte `o / 8`. Missing keys read as all zero
/// and are created on first write. Each individual bit operation must be
/// atomic; a batch as a whole need not be.
pub trait Store: Send + Sync {
    /// Checks that the store is reachable.
    fn ping(&self) -> StoreResult<()>;

    /// Runs all operations of `batch` in one round trip.
    ///
    /// Returns the bit read by each `Get` and the previous bit of each `Set`,
    /// in request order.
    fn execute(&self, batch: &Batch) -> StoreResult<Vec<bool>>;

    /// Deletes `keys`, returning how many existed.
    fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// Returns how many of `keys` exist.
    fn exists(&self, keys: &[String]) -> StoreResult<u64>;

    /// Reads a single bit.
    fn get_bit(&self, key: &str, offset: u64) -> StoreResult<bool> {
        let mut batch = Batch::new();
        batch.get_bit(key, offset);
        single_answer(self.execute(&batch)?)
    }

    /// Sets a single bit, returning its previous value.
    fn set_bit(&self, key: &str, offset: u64) -> StoreResult<bool> {
        let mut batch = Batch::new();
        batch.set_bit(key, offset);
        single_answer(self.execute(&batch)?)
    }
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn ping(&self) -> StoreResult<()> {
        (**self).ping()
    }

    fn execute(&self, batch: &Batch) -> StoreResult<Vec<bool>> {
        (**self).execute(batch)
    }

    fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        (**self).delete(keys)
    }

    fn exists(&self, keys: &[String]) -> StoreResult<u64> {
        (**self).exists(keys)
    }
}

fn single_answer(bits: Vec<bool>) -> StoreResult<bool> {
    match bits.as_slice() {
        [bit] => Ok(*bit),
        other => Err(StoreError::unknown(format!(
            "store answered {} of 1 bit operations",
            other.len()
        ))),
    }
}
