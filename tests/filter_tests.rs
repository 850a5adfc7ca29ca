//! Integration tests for BloomFilter over the in-memory store

mod common;

use common::{memory_filter, sample_strings, CAPACITY, ERROR_RATE, KEY};
use redbloom::config::DEFAULT_MAX_SHARD_BITS;
use redbloom::store::Batch;
use redbloom::{BloomFilter, Error, MemoryStore, Store, StoreError, StoreErrorKind};

const WORDS: [&str; 5] = ["hello", "how", "are", "you", "today"];

#[test]
fn test_add_then_contains() {
    let store = MemoryStore::new();
    let bloom = memory_filter(&store);

    for word in WORDS {
        bloom.add(word).unwrap();
    }
    for word in WORDS {
        assert!(bloom.contains(word).unwrap(), "False negative for {}", word);
    }
}

#[test]
fn test_update_then_contains() {
    let store = MemoryStore::new();
    let bloom = memory_filter(&store);

    bloom.update(WORDS).unwrap();
    for word in WORDS {
        assert!(bloom.contains(word).unwrap(), "False negative for {}", word);
    }
}

#[test]
fn test_intersection_preserves_order() {
    let store = MemoryStore::new();
    let bloom = memory_filter(&store);

    bloom.update(WORDS).unwrap();
    assert_eq!(bloom.intersection(WORDS).unwrap(), WORDS.to_vec());

    let reversed: Vec<&str> = WORDS.iter().rev().copied().collect();
    assert_eq!(bloom.intersection(reversed.clone()).unwrap(), reversed);
}

#[test]
fn test_two_instances_share_bits() {
    let store = MemoryStore::new();
    let first = memory_filter(&store);
    let second = memory_filter(&store);

    first.update(WORDS).unwrap();
    assert_eq!(first.intersection(WORDS).unwrap(), WORDS.to_vec());
    assert_eq!(second.intersection(WORDS).unwrap(), WORDS.to_vec());

    second.add("tomorrow").unwrap();
    assert!(first.contains("tomorrow").unwrap());
}

#[test]
fn test_delete_empties_filter() {
    let store = MemoryStore::new();
    let bloom = memory_filter(&store);

    let samples = sample_strings(20, 5000);
    bloom.update(&samples).unwrap();
    assert_eq!(store.exists(&bloom.keys().to_vec()).unwrap(), 1);

    bloom.delete().unwrap();
    assert!(bloom.intersection(&samples).unwrap().is_empty(), "Failed to actually delete filter");
    assert_eq!(store.exists(&bloom.keys().to_vec()).unwrap(), 0);

    // Still usable afterwards.
    bloom.add("again").unwrap();
    assert!(bloom.contains("again").unwrap());
}

#[test]
fn test_delete_never_written() {
    let store = MemoryStore::new();
    let bloom = memory_filter(&store);

    bloom.delete().unwrap();
    bloom.delete().unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_select_namespace() {
    let store = MemoryStore::new();
    let bloom = memory_filter(&store);
    let other = memory_filter(&store.namespace(1));

    let samples = sample_strings(20, 100);
    bloom.update(&samples).unwrap();
    assert_eq!(other.intersection(&samples).unwrap().len(), 0);
    assert_eq!(bloom.intersection(&samples).unwrap().len(), samples.len());
}

#[test]
fn test_add_is_idempotent() {
    let store = MemoryStore::new();
    let bloom = memory_filter(&store);
    let shard = &bloom.keys()[0];

    bloom.add("hello").unwrap();
    let once = store.get_bytes(shard).unwrap();
    bloom.add("hello").unwrap();
    let twice = store.get_bytes(shard).unwrap();

    assert!(once.is_some());
    assert_eq!(once, twice);
}

#[test]
fn test_update_matches_serial_add() {
    let batch_store = MemoryStore::new();
    let serial_store = MemoryStore::new();
    let batch = memory_filter(&batch_store);
    let serial = memory_filter(&serial_store);

    let samples = sample_strings(12, 2000);
    batch.update(&samples).unwrap();
    for sample in &samples {
        serial.add(sample).unwrap();
    }

    let shard = &batch.keys()[0];
    assert_eq!(batch_store.get_bytes(shard).unwrap(), serial_store.get_bytes(shard).unwrap());

    // And reads agree with one-at-a-time membership tests.
    let probes = sample_strings(12, 2000);
    let expected: Vec<&String> = probes.iter().filter(|p| serial.contains(p).unwrap()).collect();
    assert_eq!(batch.intersection(&probes).unwrap(), expected);
}

#[test]
fn test_accuracy_random() {
    let store = MemoryStore::new();
    let bloom = memory_filter(&store);

    let included = sample_strings(20, 5000);
    let excluded = sample_strings(20, 5000);

    bloom.update(&included).unwrap();
    assert_eq!(bloom.intersection(&included).unwrap().len(), included.len());

    let false_positives = bloom.intersection(&excluded).unwrap();
    let false_rate = false_positives.len() as f64 / excluded.len() as f64;
    println!("False positive rate: {:.4} ({} expected)", false_rate, ERROR_RATE);
    assert!(false_rate <= ERROR_RATE, "False positive error rate exceeded!");
}

#[test]
fn test_accuracy_at_capacity() {
    let store = MemoryStore::new();
    let capacity = 5000;
    let target = 0.01;
    let bloom =
        BloomFilter::with_store("full", capacity, target, DEFAULT_MAX_SHARD_BITS, store).unwrap();

    let included: Vec<String> = (0..capacity).map(|i| format!("included_{:08}", i)).collect();
    let excluded: Vec<String> = (0..20_000).map(|i| format!("excluded_{:08}", i)).collect();

    bloom.update(&included).unwrap();
    assert_eq!(bloom.intersection(&included).unwrap().len(), included.len());

    let false_rate = bloom.intersection(&excluded).unwrap().len() as f64 / excluded.len() as f64;
    println!("Target FP rate: {:.4}, actual: {:.4}", target, false_rate);
    // Allow some margin (2x the target rate) due to randomness
    assert!(false_rate < target * 2.0, "False positive rate too high: {:.4}", false_rate);
}

#[test]
fn test_size_allocation_keys() {
    // More than one 512MB value; the store only keeps the pages touched.
    let store = MemoryStore::new();
    let error_rate = 0.00001;
    let bloom =
        BloomFilter::with_store(KEY, 200_000_000, error_rate, DEFAULT_MAX_SHARD_BITS, store.clone())
            .unwrap();

    assert_eq!(bloom.shard_count(), 2);
    assert_eq!(bloom.keys(), ["ibloomTesting.0", "ibloomTesting.1"]);
    assert!(bloom.bit_count() > DEFAULT_MAX_SHARD_BITS);

    let included = sample_strings(20, 5000);
    let excluded = sample_strings(20, 5000);
    bloom.update(&included).unwrap();

    assert_eq!(store.exists(&bloom.keys().to_vec()).unwrap(), 2);
    assert_eq!(bloom.intersection(&included).unwrap().len(), included.len());

    let false_rate = bloom.intersection(&excluded).unwrap().len() as f64 / excluded.len() as f64;
    assert!(false_rate <= error_rate, "False positive error rate exceeded!");

    // 5000 items x 17 probes touch at most 85000 pages of 64 bytes.
    assert!(store.resident_bytes() <= 85_000 * 64);

    bloom.delete().unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_many_small_shards() {
    // 4096-bit shards force a 47926-bit filter across 12 keys.
    let store = MemoryStore::with_max_value_bytes(512);
    let bloom = BloomFilter::with_store(KEY, CAPACITY, ERROR_RATE, 4096, store.clone()).unwrap();
    assert_eq!(bloom.shard_count(), 12);
    assert_eq!(bloom.keys()[11], "ibloomTesting.11");

    let included = sample_strings(20, 5000);
    let excluded = sample_strings(20, 5000);
    bloom.update(&included).unwrap();

    assert_eq!(store.exists(&bloom.keys().to_vec()).unwrap(), 12);
    assert_eq!(bloom.intersection(&included).unwrap().len(), included.len());

    let false_rate = bloom.intersection(&excluded).unwrap().len() as f64 / excluded.len() as f64;
    assert!(false_rate <= ERROR_RATE, "False positive error rate exceeded!");

    bloom.delete().unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_wrong_type_errors() {
    let store = MemoryStore::new();
    let bloom = memory_filter(&store);
    bloom.delete().unwrap();

    // One of the shard keys holds a hash instead of a string.
    store.hset("ibloomTesting.0", "hello", b"5").unwrap();

    let errors = [
        bloom.add("hello").unwrap_err(),
        bloom.update(["a", "b"]).unwrap_err(),
        bloom.contains("a").unwrap_err(),
        bloom.intersection(["a", "b"]).unwrap_err(),
    ];
    for err in &errors {
        assert_eq!(err.store_kind(), Some(StoreErrorKind::WrongKeyType), "{}", err);
    }

    store.delete(&["ibloomTesting.0".to_string()]).unwrap();
    bloom.add("hello").unwrap();
}

/// A store that is never reachable.
#[derive(Debug)]
struct DownStore;

impl Store for DownStore {
    fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::connection_failed("Connection refused"))
    }

    fn execute(&self, _batch: &Batch) -> Result<Vec<bool>, StoreError> {
        Err(StoreError::connection_failed("Connection refused"))
    }

    fn delete(&self, _keys: &[String]) -> Result<u64, StoreError> {
        Err(StoreError::connection_failed("Connection refused"))
    }

    fn exists(&self, _keys: &[String]) -> Result<u64, StoreError> {
        Err(StoreError::connection_failed("Connection refused"))
    }
}

/// A store that drops the last answer of every batch.
#[derive(Debug)]
struct ShortStore(MemoryStore);

impl Store for ShortStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.0.ping()
    }

    fn execute(&self, batch: &Batch) -> Result<Vec<bool>, StoreError> {
        let mut bits = self.0.execute(batch)?;
        bits.pop();
        Ok(bits)
    }

    fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.0.delete(keys)
    }

    fn exists(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.0.exists(keys)
    }
}

#[test]
fn test_unreachable_store_fails_construction() {
    let err = BloomFilter::with_store(KEY, 100, 0.01, DEFAULT_MAX_SHARD_BITS, DownStore).unwrap_err();
    assert!(matches!(err, Error::Construction(_)));
    assert_eq!(err.store_kind(), Some(StoreErrorKind::ConnectionFailed));
}

#[test]
fn test_short_answer_is_an_error() {
    let store = ShortStore(MemoryStore::new());
    let bloom = BloomFilter::with_store(KEY, 100, 0.01, DEFAULT_MAX_SHARD_BITS, store).unwrap();

    let err = bloom.intersection(["a", "b"]).unwrap_err();
    assert!(matches!(err, Error::Operation { operation: "intersection", items: 2, .. }));
    assert_eq!(err.store_kind(), Some(StoreErrorKind::Unknown));
}
