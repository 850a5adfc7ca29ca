//! Basic usage example for redbloom
//!
//! Opens a filter on a local server (127.0.0.1:6379) and compares batch and
//! serial inserts and lookups. Falls back to the in-process store when no
//! server is listening.
//!
//! Run with `RUST_LOG=debug` to see connection and layout details.

use redbloom::config::DEFAULT_MAX_SHARD_BITS;
use redbloom::{BloomFilter, MemoryStore, Options, Store, StoreErrorKind};
use std::time::Instant;

const COUNT: usize = 10_000;
const ERROR_RATE: f64 = 0.1;

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let included: Vec<String> = (0..COUNT).map(|i| format!("included-word-{:08}", i)).collect();
    let excluded: Vec<String> = (0..COUNT).map(|i| format!("excluded-word-{:08}", i)).collect();
    let capacity = (COUNT * 2) as u64;

    match BloomFilter::open("redbloomDemo", capacity, ERROR_RATE, &Options::default()) {
        Ok(bloom) => run(&bloom, &included, &excluded),
        Err(e) if e.store_kind() == Some(StoreErrorKind::ConnectionFailed) => {
            println!("No server on 127.0.0.1:6379 ({}), using the in-process store", e);
            let bloom = BloomFilter::with_store(
                "redbloomDemo",
                capacity,
                ERROR_RATE,
                DEFAULT_MAX_SHARD_BITS,
                MemoryStore::new(),
            )?;
            run(&bloom, &included, &excluded)
        }
        Err(e) => Err(e.into()),
    }
}

fn run<S: Store>(
    bloom: &BloomFilter<S>,
    included: &[String],
    excluded: &[String],
) -> anyhow::Result<()> {
    bloom.delete()?;
    println!(
        "Filter using {} hash functions and {} bits in {:?}",
        bloom.hash_count(),
        bloom.bit_count(),
        bloom.keys()
    );

    let rate = |start: Instant| included.len() as f64 / start.elapsed().as_secs_f64();

    let start = Instant::now();
    bloom.update(included)?;
    println!("Batch insert : {:>12.0} words / second", rate(start));

    bloom.delete()?;
    let start = Instant::now();
    for word in included {
        bloom.add(word)?;
    }
    println!("Serial insert: {:>12.0} words / second", rate(start));

    let start = Instant::now();
    let found = bloom.intersection(included)?;
    println!("Batch test   : {:>12.0} words / second", rate(start));
    assert_eq!(found.len(), included.len());

    let start = Instant::now();
    for word in included {
        bloom.contains(word)?;
    }
    println!("Serial test  : {:>12.0} words / second", rate(start));

    let false_positives = bloom.intersection(excluded)?;
    let false_rate = false_positives.len() as f64 / excluded.len() as f64;
    println!("False positive rate: {:.4} ({} expected)", false_rate, ERROR_RATE);

    bloom.delete()?;
    Ok(())
}
