//! Bloom filter sizing.
//!
//! Turns an expected capacity and a target false positive rate into the
//! number of bits and hash probes the filter uses:
//!
//! - `m = ceil(-n * ln(p) / (ln 2)^2)`
//! - `k = max(1, round((m / n) * ln 2))`

use crate::error::{Error, Result};
use std::f64::consts::LN_2;

/// Sizing of a filter, derived once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    /// Total number of bits across all shards (m).
    pub bit_count: u64,
    /// Number of bit positions probed per item (k).
    pub hash_count: u32,
}

impl FilterParams {
    /// Computes optimal parameters for `capacity` items at `error_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `capacity` is zero or
    /// `error_rate` is not strictly between 0 and 1.
    ///
    /// # Example
    /// ```
    /// use redbloom::params::FilterParams;
    ///
    /// let params = FilterParams::compute(10_000, 0.1).unwrap();
    /// assert_eq!(params.bit_count, 47_926);
    /// assert_eq!(params.hash_count, 3);
    /// ```
    pub fn compute(capacity: u64, error_rate: f64) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_parameter("capacity must be > 0"));
        }
        // Written so that NaN fails the check too.
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(Error::invalid_parameter(format!(
                "error rate must be between 0 and 1, got {}",
                error_rate
            )));
        }

        let bit_count = Self::optimal_num_bits(capacity, error_rate);
        let hash_count = Self::optimal_num_hashes(bit_count, capacity);

        Ok(Self { bit_count, hash_count })
    }

    /// Calculate optimal number of bits: m = -n * ln(p) / (ln(2)^2)
    fn optimal_num_bits(capacity: u64, error_rate: f64) -> u64 {
        let n = capacity as f64;
        let bits = (-n * error_rate.ln() / (LN_2 * LN_2)).ceil() as u64;
        bits.max(1)
    }

    /// Calculate optimal number of hash functions: k = (m/n) * ln(2)
    fn optimal_num_hashes(bit_count: u64, capacity: u64) -> u32 {
        let k = ((bit_count as f64 / capacity as f64) * LN_2).round() as u32;
        k.max(1)
    }

    /// Estimates the false positive rate after `items` distinct insertions.
    ///
    /// p = (1 - e^(-kn/m))^k
    pub fn estimated_false_positive_rate(&self, items: u64) -> f64 {
        if items == 0 {
            return 0.0;
        }

        let k = self.hash_count as f64;
        let n = items as f64;
        let m = self.bit_count as f64;

        (1.0 - (-k * n / m).exp()).powf(k)
    }
}
