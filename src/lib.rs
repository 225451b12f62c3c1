//! Buffered multi-shard record supplier for AWS Kinesis streams.
//!
//! This library feeds a downstream consumer (typically an indexing pipeline)
//! from a set of Kinesis shards through a single bounded, poll-based queue:
//!
//! - One background fetch worker per assigned shard, multiplexed over a
//!   fixed-size scheduler pool
//! - At-least-once delivery with per-shard ordering, including across
//!   buffer-full backpressure
//! - Seek to a sequence number, the trim horizon, or the stream head, with
//!   buffered records of untouched shards preserved
//! - End-of-shard markers for closed shards, and time-bounded probing of a
//!   shard's earliest/latest sequence number
//! - Optional pluggable payload deaggregation
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::collections::HashSet;
//! use std::time::Duration;
//!
//! use aws_sdk_kinesis::Client;
//! use kinesis_record_supplier::{
//!     KinesisRecordSupplier, StreamPartition, SupplierConfig, SupplierError,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SupplierError> {
//!     let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//!     let client = Client::new(&config);
//!
//!     let (supplier, _monitoring_rx) = KinesisRecordSupplier::new(
//!         client,
//!         SupplierConfig {
//!             records_per_fetch: 1000,
//!             buffer_size: 10_000,
//!             ..Default::default()
//!         },
//!         None,
//!     )?;
//!
//!     let partitions: HashSet<_> = supplier
//!         .get_partition_ids("my-stream")
//!         .await?
//!         .into_iter()
//!         .map(|shard_id| StreamPartition::new("my-stream", shard_id))
//!         .collect();
//!
//!     supplier.assign(partitions.clone())?;
//!     supplier.seek_to_earliest(&partitions).await?;
//!
//!     loop {
//!         for record in supplier.poll(Duration::from_millis(500)).await? {
//!             if record.is_end_of_shard() {
//!                 println!("{} reached end of shard", record.partition_id());
//!                 continue;
//!             }
//!             for payload in record.data() {
//!                 println!("{}: {} bytes", record.partition_id(), payload.len());
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! # Deaggregation
//!
//! Records written through the KPL may carry several aggregated payloads.
//! The deaggregation routine is injected rather than bundled (its usual
//! implementation has an incompatible license): enable `deaggregate` in the
//! config and pass a [`RecordDecoder`] to the constructor. Construction fails
//! if the option is set and no decoder is given.

pub mod client;
pub mod decode;
pub mod error;
pub mod monitoring;
pub mod record;
pub mod supplier;

mod buffer;
mod scheduler;

// Make mocks and helpers available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;
#[cfg(test)]
mod tests;

pub use client::{KinesisClientError, KinesisClientTrait};
pub use decode::{IdentityDecoder, RecordDecoder};
pub use error::{Result, SupplierError};
pub use monitoring::{FetchEvent, FetchEventType, MonitoringConfig};
pub use record::{OrderedRecord, StreamPartition, END_OF_SHARD_MARKER};
pub use supplier::{KinesisRecordSupplier, SupplierConfig};
