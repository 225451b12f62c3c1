//! Test utilities and mock implementations for testing the record supplier

pub mod mocks;

use std::time::Duration;

use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::{HashKeyRange, Record, SequenceNumberRange, Shard};

use crate::client::KinesisClientTrait;
use crate::record::OrderedRecord;
use crate::supplier::KinesisRecordSupplier;

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    /// Create a test record with given sequence number and data
    pub fn create_test_record(sequence_number: &str, data: &[u8]) -> Record {
        Record::builder()
            .sequence_number(sequence_number)
            .data(Blob::new(data.to_vec()))
            .partition_key("test-partition-key")
            .build()
            .expect("Failed to build test record")
    }

    /// Create records with the given sequence numbers, data derived from each
    pub fn create_test_records(sequence_numbers: &[&str]) -> Vec<Record> {
        sequence_numbers
            .iter()
            .map(|seq| Self::create_test_record(seq, format!("data-{seq}").as_bytes()))
            .collect()
    }

    /// Create a test shard with given ID
    pub fn create_test_shard(shard_id: &str) -> Shard {
        Shard::builder()
            .shard_id(shard_id)
            .hash_key_range(
                HashKeyRange::builder()
                    .starting_hash_key("0")
                    .ending_hash_key("340282366920938463463374607431768211455")
                    .build()
                    .expect("Failed to build hash key range"),
            )
            .sequence_number_range(
                SequenceNumberRange::builder()
                    .starting_sequence_number("0")
                    .build()
                    .expect("Failed to build sequence number range"),
            )
            .build()
            .expect("Failed to build test shard")
    }
}

/// Polls the supplier until `expected` records have been collected or
/// `timeout` elapses.
pub async fn poll_until_count<C>(
    supplier: &KinesisRecordSupplier<C>,
    expected: usize,
    timeout: Duration,
) -> anyhow::Result<Vec<OrderedRecord>>
where
    C: KinesisClientTrait + 'static,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut collected = Vec::new();
    while collected.len() < expected {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!(
                "Timed out waiting for {} records, got {}",
                expected,
                collected.len()
            );
        }
        collected.extend(supplier.poll(Duration::from_millis(100)).await?);
    }
    Ok(collected)
}

/// Waits until `check` returns true or `timeout` elapses.
pub async fn wait_for_condition<F>(mut check: F, timeout: Duration) -> anyhow::Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("Condition not met within timeout");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_record() {
        let record = TestUtils::create_test_record("seq-1", b"test-data");
        assert_eq!(record.sequence_number(), "seq-1");
        assert_eq!(record.data().as_ref(), b"test-data");
        assert_eq!(record.partition_key(), "test-partition-key");
    }

    #[test]
    fn test_create_test_records() {
        let records = TestUtils::create_test_records(&["1", "2", "3"]);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].sequence_number(), "1");
        assert_eq!(records[2].sequence_number(), "3");
        assert_eq!(records[1].data().as_ref(), b"data-2");
    }

    #[test]
    fn test_create_test_shard() {
        let shard = TestUtils::create_test_shard("shard-9");
        assert_eq!(shard.shard_id(), "shard-9");
    }
}
