//! Buffered multi-partition record supplier.
//!
//! This module implements a local buffer for records fetched from a set of
//! assigned shards. Fetching runs on background workers: each assigned
//! partition owns a shard iterator and a one-shot fetch tick that re-arms
//! itself on the shared [`FetchScheduler`] after every batch. Fetched records
//! are decoded and pushed into one bounded [`RecordBuffer`] that the caller
//! drains through [`KinesisRecordSupplier::poll`].
//!
//! The hard parts live here:
//!
//! - the per-partition fetch state machine and its retry taxonomy,
//! - backpressure against the shared buffer without losing records (a worker
//!   that cannot place a record rewinds its cursor to that record before
//!   backing off),
//! - reseeking, which tears the scheduler down so the buffer can be filtered
//!   without racing in-flight ticks,
//! - best-effort earliest/latest sequence number probing on shards that may
//!   be empty, closed or throttled.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_kinesis::types::ShardIteratorType;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::buffer::RecordBuffer;
use crate::client::{KinesisClientError, KinesisClientTrait};
use crate::decode::{IdentityDecoder, RecordDecoder};
use crate::error::{Result, SupplierError};
use crate::monitoring::{FetchEvent, FetchEventType, MonitoringConfig};
use crate::record::{OrderedRecord, StreamPartition, END_OF_SHARD_MARKER};
use crate::scheduler::FetchScheduler;

/// Backoff applied when the stream service reports exceeded throughput.
const THROUGHPUT_EXCEEDED_BACKOFF: Duration = Duration::from_millis(3000);
/// Retry delay for transient failures, and the graceful-shutdown bound used
/// by `close` and the reseek fence.
const EXCEPTION_RETRY_DELAY: Duration = Duration::from_millis(10_000);
/// Probe batches use a large limit: on a shard that is continuously trimming
/// records past retention, a limit of 1 can chase the trim horizon forever
/// without ever landing on a live record.
const SEQUENCE_PROBE_LIMIT: i32 = 1000;

/// Configuration for the record supplier
#[derive(Debug, Clone)]
pub struct SupplierConfig {
    /// Maximum number of records to request per `get_records` call
    pub records_per_fetch: i32,
    /// Delay between successful fetch ticks of one partition
    pub fetch_delay: Duration,
    /// Number of concurrent fetch workers shared by all partitions
    pub fetch_threads: usize,
    /// Whether to route record payloads through the injected decoder
    pub deaggregate: bool,
    /// Capacity of the shared record buffer (must be > 0)
    pub buffer_size: usize,
    /// Maximum wait when enqueueing a single record
    pub offer_timeout: Duration,
    /// Rearm delay after an enqueue timed out on a full buffer
    pub buffer_full_wait: Duration,
    /// Wall-clock bound for earliest/latest sequence number probes
    pub probe_timeout: Duration,
    /// Cap on the number of records returned by one `poll`
    pub max_records_per_poll: usize,
    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            records_per_fetch: 4000,
            fetch_delay: Duration::ZERO,
            fetch_threads: std::thread::available_parallelism()
                .map(|n| n.get() * 2)
                .unwrap_or(2),
            deaggregate: false,
            buffer_size: 10_000,
            offer_timeout: Duration::from_secs(5),
            buffer_full_wait: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(20),
            max_records_per_poll: 100,
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl SupplierConfig {
    fn validate(&self) -> Result<()> {
        if self.records_per_fetch <= 0 {
            return Err(SupplierError::Config(
                "records_per_fetch must be greater than zero".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(SupplierError::Config(
                "buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.fetch_threads == 0 {
            return Err(SupplierError::Config(
                "fetch_threads must be greater than zero".to_string(),
            ));
        }
        if self.max_records_per_poll == 0 {
            return Err(SupplierError::Config(
                "max_records_per_poll must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-partition fetch state.
///
/// `cursor` points at the record the next tick will fetch. It becomes `None`
/// when the shard has been closed by a split or merge, at which point the
/// worker enqueues a single end-of-shard marker instead of fetching.
struct PartitionResource {
    partition: StreamPartition,
    cursor: Mutex<Option<String>>,
    started: AtomicBool,
    stop_requested: AtomicBool,
}

impl PartitionResource {
    fn new(partition: StreamPartition) -> Self {
        Self {
            partition,
            cursor: Mutex::new(None),
            started: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    fn stop_background_fetch(&self) {
        info!(
            stream = %self.partition.stream(),
            partition = %self.partition.partition_id(),
            "Stopping scheduled fetch worker"
        );
        self.stop_requested.store(true, Ordering::SeqCst);
    }
}

struct SupplierInner<C> {
    client: C,
    config: SupplierConfig,
    decoder: Arc<dyn RecordDecoder>,
    assignment: RwLock<HashMap<StreamPartition, Arc<PartitionResource>>>,
    buffer: RwLock<Arc<RecordBuffer>>,
    scheduler: RwLock<Arc<FetchScheduler>>,
    check_partitions_started: AtomicBool,
    closed: AtomicBool,
    monitoring_tx: Option<mpsc::Sender<FetchEvent>>,
}

enum OfferOutcome {
    Accepted,
    TimedOut,
    Interrupted,
}

impl<C> SupplierInner<C>
where
    C: KinesisClientTrait + 'static,
{
    fn send_monitoring_event(&self, partition_id: &str, event_type: FetchEventType) {
        if let Some(tx) = &self.monitoring_tx {
            if tx.try_send(FetchEvent::new(partition_id, event_type)).is_err() {
                trace!(partition = %partition_id, "Monitoring channel full, dropping event");
            }
        }
    }

    /// Offers `record` to the current buffer, waiting up to `offer_timeout`.
    /// A scheduler shutdown signal interrupts the wait so a reseek fence is
    /// never stuck behind a full buffer.
    async fn offer_record(
        &self,
        record: OrderedRecord,
        shutdown: &mut watch::Receiver<bool>,
    ) -> OfferOutcome {
        let buffer = self.buffer.read().clone();
        tokio::select! {
            accepted = buffer.offer(record, self.config.offer_timeout) => {
                if accepted {
                    OfferOutcome::Accepted
                } else {
                    OfferOutcome::TimedOut
                }
            }
            _ = shutdown.changed() => OfferOutcome::Interrupted,
        }
    }

    fn start_partition(self: &Arc<Self>, resource: &Arc<PartitionResource>) {
        if resource.started.load(Ordering::SeqCst) {
            return;
        }

        info!(
            stream = %resource.partition.stream(),
            partition = %resource.partition.partition_id(),
            "Starting scheduled fetch worker"
        );

        resource.stop_requested.store(false, Ordering::SeqCst);
        resource.started.store(true, Ordering::SeqCst);
        self.send_monitoring_event(
            resource.partition.partition_id(),
            FetchEventType::WorkerStarted,
        );

        self.reschedule(resource, self.config.fetch_delay);
    }

    fn start_partitions_if_needed(self: &Arc<Self>) {
        if self.check_partitions_started.swap(false, Ordering::SeqCst) {
            let resources: Vec<_> = self.assignment.read().values().cloned().collect();
            for resource in resources {
                self.start_partition(&resource);
            }
        }
    }

    /// Arms the next tick for `resource`. A no-op when the worker has been
    /// stopped, and benign when the scheduler rejects the submission (the
    /// expected outcome while a reseek replaces the scheduler).
    fn reschedule(self: &Arc<Self>, resource: &Arc<PartitionResource>, delay: Duration) {
        if resource.started.load(Ordering::SeqCst) && !resource.stop_requested.load(Ordering::SeqCst)
        {
            let scheduler = self.scheduler.read().clone();
            let shutdown = scheduler.shutdown_signal();
            let inner = self.clone();
            let tick_resource = resource.clone();
            if scheduler
                .schedule(delay, async move {
                    fetch_tick(inner, tick_resource, shutdown).await;
                })
                .is_err()
            {
                warn!(
                    partition = %resource.partition.partition_id(),
                    "Scheduler rejected fetch tick; this is expected behavior after calling \
                     seek(), seek_to_earliest() or seek_to_latest()"
                );
            }
        } else {
            info!(
                partition = %resource.partition.partition_id(),
                "Worker for partition has been stopped"
            );
        }
    }

    /// Classifies a service error observed mid-tick. Expired iterators are
    /// handled at the call sites because they need the batch context.
    fn handle_fetch_error(
        self: &Arc<Self>,
        resource: &Arc<PartitionResource>,
        err: KinesisClientError,
    ) {
        let partition_id = resource.partition.partition_id();
        match err {
            KinesisClientError::ThroughputExceeded => {
                warn!(
                    partition = %partition_id,
                    "Throughput exceeded while fetching records; the request rate for the stream \
                     is too high or the requested data is too large for the available throughput. \
                     Reduce the frequency or size of your requests."
                );
                self.send_monitoring_event(partition_id, FetchEventType::Throttled);
                let delay = THROUGHPUT_EXCEEDED_BACKOFF.max(self.config.fetch_delay);
                self.reschedule(resource, delay);
            }
            KinesisClientError::Recoverable(msg) => {
                warn!(
                    partition = %partition_id,
                    error = %msg,
                    retry_ms = EXCEPTION_RETRY_DELAY.as_millis() as u64,
                    "Recoverable error while fetching records, retrying"
                );
                self.reschedule(resource, EXCEPTION_RETRY_DELAY);
            }
            KinesisClientError::ResourceNotFound(_) | KinesisClientError::InvalidArgument(_) => {
                error!(
                    partition = %partition_id,
                    error = %err,
                    "Fatal service error while fetching records, will not retry"
                );
                self.fail_worker(resource, err.to_string());
            }
            err => {
                error!(
                    partition = %partition_id,
                    error = %err,
                    "Unrecoverable error while fetching records, will not retry"
                );
                self.fail_worker(resource, err.to_string());
            }
        }
    }

    /// The worker is not rescheduled and `started` stays set, so only a
    /// reseek can revive this partition.
    fn fail_worker(&self, resource: &Arc<PartitionResource>, error: String) {
        self.send_monitoring_event(
            resource.partition.partition_id(),
            FetchEventType::WorkerFailed { error },
        );
    }
}

/// One fetch tick of a partition worker.
///
/// Ticks never overlap for the same partition: a tick is only armed by
/// `start_partition` (guarded by `started`) or by its predecessor after it
/// finished.
async fn fetch_tick<C>(
    inner: Arc<SupplierInner<C>>,
    resource: Arc<PartitionResource>,
    mut shutdown: watch::Receiver<bool>,
) where
    C: KinesisClientTrait + 'static,
{
    let partition = resource.partition.clone();

    if resource.stop_requested.swap(false, Ordering::SeqCst) {
        resource.started.store(false, Ordering::SeqCst);
        info!(partition = %partition.partition_id(), "Worker for partition has been stopped");
        inner.send_monitoring_event(partition.partition_id(), FetchEventType::WorkerStopped);
        return;
    }

    let iterator = resource.cursor.lock().clone();

    let Some(iterator) = iterator else {
        // Closed shard: deliver a single end-of-shard marker so the caller
        // knows this partition has no more records, then stop rearming.
        info!(
            partition = %partition.partition_id(),
            "Shard iterator has been closed and has no more records"
        );
        let marker = OrderedRecord::end_of_shard(partition.clone());
        match inner.offer_record(marker, &mut shutdown).await {
            OfferOutcome::Accepted => {
                inner.send_monitoring_event(partition.partition_id(), FetchEventType::EndOfShard);
            }
            OfferOutcome::TimedOut => {
                warn!(
                    partition = %partition.partition_id(),
                    retry_ms = inner.config.buffer_full_wait.as_millis() as u64,
                    "Record buffer full, retrying end-of-shard marker"
                );
                inner.reschedule(&resource, inner.config.buffer_full_wait);
            }
            OfferOutcome::Interrupted => {
                warn!(
                    partition = %partition.partition_id(),
                    retry_ms = EXCEPTION_RETRY_DELAY.as_millis() as u64,
                    "Interrupted while waiting to buffer end-of-shard marker, retrying"
                );
                inner.reschedule(&resource, EXCEPTION_RETRY_DELAY);
            }
        }
        return;
    };

    let (records, next_iterator) = match inner
        .client
        .get_records(&iterator, inner.config.records_per_fetch)
        .await
    {
        Ok(result) => result,
        Err(KinesisClientError::ExpiredIterator { next_iterator }) => {
            match next_iterator {
                Some(next) => {
                    warn!(
                        partition = %partition.partition_id(),
                        "Shard iterator expired while fetching records, retrying with replacement"
                    );
                    inner.send_monitoring_event(
                        partition.partition_id(),
                        FetchEventType::IteratorRenewed,
                    );
                    *resource.cursor.lock() = Some(next);
                    inner.reschedule(&resource, inner.config.fetch_delay);
                }
                None => {
                    error!(
                        partition = %partition.partition_id(),
                        "Shard iterator expired with no replacement available, will not retry"
                    );
                    inner.fail_worker(&resource, "shard iterator expired with no replacement".to_string());
                }
            }
            return;
        }
        Err(err) => {
            inner.handle_fetch_error(&resource, err);
            return;
        }
    };

    // list comes back empty when the shard currently has no records
    for record in &records {
        let payloads = match inner.decoder.decode(record.data().as_ref()) {
            Ok(payloads) => payloads,
            Err(err) => {
                error!(
                    partition = %partition.partition_id(),
                    sequence = %record.sequence_number(),
                    error = %err,
                    "Failed to decode record, will not retry"
                );
                inner.fail_worker(&resource, format!("failed to decode record: {err}"));
                return;
            }
        };

        let ordered = OrderedRecord::new(partition.clone(), record.sequence_number(), payloads);

        trace!(
            stream = %partition.stream(),
            partition = %partition.partition_id(),
            sequence = %ordered.sequence_number(),
            buffer_remaining = inner.buffer.read().remaining_capacity(),
            "Buffering fetched record"
        );

        match inner.offer_record(ordered, &mut shutdown).await {
            OfferOutcome::Accepted => {}
            OfferOutcome::TimedOut => {
                // The buffer stayed full for the whole offer timeout. Pin a
                // fresh iterator at this exact record so nothing is skipped,
                // then back off to let the consumer drain.
                warn!(
                    partition = %partition.partition_id(),
                    sequence = %record.sequence_number(),
                    retry_ms = inner.config.buffer_full_wait.as_millis() as u64,
                    "Record buffer full, storing iterator and retrying"
                );
                inner.send_monitoring_event(
                    partition.partition_id(),
                    FetchEventType::BufferFull {
                        sequence_number: record.sequence_number().to_string(),
                    },
                );

                match inner
                    .client
                    .get_shard_iterator(
                        partition.stream(),
                        partition.partition_id(),
                        ShardIteratorType::AtSequenceNumber,
                        Some(record.sequence_number()),
                    )
                    .await
                {
                    Ok(fresh) => {
                        *resource.cursor.lock() = Some(fresh);
                        inner.reschedule(&resource, inner.config.buffer_full_wait);
                    }
                    Err(KinesisClientError::ExpiredIterator { next_iterator: replacement }) => {
                        // fall back to the batch's own successor; a None here
                        // means the shard closed underneath us
                        warn!(
                            partition = %partition.partition_id(),
                            "Shard iterator expired while rewinding cursor, using batch successor"
                        );
                        inner.send_monitoring_event(
                            partition.partition_id(),
                            FetchEventType::IteratorRenewed,
                        );
                        *resource.cursor.lock() = replacement.or_else(|| next_iterator.clone());
                        inner.reschedule(&resource, inner.config.fetch_delay);
                    }
                    Err(err) => inner.handle_fetch_error(&resource, err),
                }
                return;
            }
            OfferOutcome::Interrupted => {
                // cursor untouched: this batch is re-fetched by the next tick
                warn!(
                    partition = %partition.partition_id(),
                    retry_ms = EXCEPTION_RETRY_DELAY.as_millis() as u64,
                    "Interrupted while waiting to buffer record, retrying"
                );
                inner.reschedule(&resource, EXCEPTION_RETRY_DELAY);
                return;
            }
        }
    }

    let shard_closed = next_iterator.is_none();
    *resource.cursor.lock() = next_iterator;
    inner.send_monitoring_event(
        partition.partition_id(),
        FetchEventType::BatchFetched {
            count: records.len(),
            shard_closed,
        },
    );
    inner.reschedule(&resource, inner.config.fetch_delay);
}

/// Seekable, assignable supplier over a set of Kinesis shards.
///
/// Construction wires up the fetch scheduler and the shared buffer; workers
/// only start once partitions are assigned and seeked, on the next
/// [`start`](Self::start) or [`poll`](Self::poll).
pub struct KinesisRecordSupplier<C>
where
    C: KinesisClientTrait + 'static,
{
    inner: Arc<SupplierInner<C>>,
}

impl<C> KinesisRecordSupplier<C>
where
    C: KinesisClientTrait + 'static,
{
    /// Creates a new supplier.
    ///
    /// `decoder` must be provided when `config.deaggregate` is set; the
    /// deaggregation capability is injected rather than bundled because the
    /// usual deaggregation library cannot ship with this crate.
    ///
    /// Returns the supplier and, when monitoring is enabled, the receiving
    /// end of the event channel.
    pub fn new(
        client: C,
        config: SupplierConfig,
        decoder: Option<Arc<dyn RecordDecoder>>,
    ) -> Result<(Self, Option<mpsc::Receiver<FetchEvent>>)> {
        config.validate()?;

        let decoder: Arc<dyn RecordDecoder> = if config.deaggregate {
            decoder.ok_or_else(|| {
                SupplierError::Config(
                    "deaggregation is enabled but no record decoder was provided; inject a \
                     decoder or disable deaggregate"
                        .to_string(),
                )
            })?
        } else {
            Arc::new(IdentityDecoder)
        };

        let (monitoring_tx, monitoring_rx) = if config.monitoring.enabled {
            let (tx, rx) = mpsc::channel(config.monitoring.channel_size);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        info!(
            fetch_threads = config.fetch_threads,
            buffer_size = config.buffer_size,
            "Creating record supplier fetch pool"
        );

        let inner = Arc::new(SupplierInner {
            scheduler: RwLock::new(Arc::new(FetchScheduler::new(config.fetch_threads))),
            buffer: RwLock::new(Arc::new(RecordBuffer::new(config.buffer_size))),
            assignment: RwLock::new(HashMap::new()),
            check_partitions_started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            client,
            config,
            decoder,
            monitoring_tx,
        });

        Ok((Self { inner }, monitoring_rx))
    }

    /// Replaces the assignment. New partitions get an idle worker with no
    /// cursor; partitions no longer in `partitions` are stopped and their
    /// resources dropped. Idempotent. Workers are not started until a seek
    /// plus the next [`start`](Self::start) or [`poll`](Self::poll).
    pub fn assign(&self, partitions: HashSet<StreamPartition>) -> Result<()> {
        self.check_if_closed()?;

        let mut assignment = self.inner.assignment.write();
        for partition in &partitions {
            if !assignment.contains_key(partition) {
                assignment.insert(
                    partition.clone(),
                    Arc::new(PartitionResource::new(partition.clone())),
                );
            }
        }
        assignment.retain(|partition, resource| {
            if partitions.contains(partition) {
                true
            } else {
                resource.stop_background_fetch();
                false
            }
        });
        Ok(())
    }

    /// Arms idle workers if a previous seek or assign flagged them. Also runs
    /// implicitly at the start of every [`poll`](Self::poll).
    pub fn start(&self) -> Result<()> {
        self.check_if_closed()?;
        self.inner.start_partitions_if_needed();
        Ok(())
    }

    /// Reseeks `partition` to read from `sequence_number` (inclusive).
    pub async fn seek(&self, partition: &StreamPartition, sequence_number: &str) -> Result<()> {
        self.check_if_closed()?;
        let mut scoped = HashSet::new();
        scoped.insert(partition.clone());
        self.filter_buffer_and_reset_workers(&scoped).await;
        self.seek_internal(
            partition,
            Some(sequence_number),
            ShardIteratorType::AtSequenceNumber,
        )
        .await
    }

    /// Reseeks every partition in `partitions` to its oldest retained record.
    pub async fn seek_to_earliest(&self, partitions: &HashSet<StreamPartition>) -> Result<()> {
        self.check_if_closed()?;
        self.filter_buffer_and_reset_workers(partitions).await;
        for partition in partitions {
            self.seek_internal(partition, None, ShardIteratorType::TrimHorizon)
                .await?;
        }
        Ok(())
    }

    /// Reseeks every partition in `partitions` past the end of its shard.
    pub async fn seek_to_latest(&self, partitions: &HashSet<StreamPartition>) -> Result<()> {
        self.check_if_closed()?;
        self.filter_buffer_and_reset_workers(partitions).await;
        for partition in partitions {
            self.seek_internal(partition, None, ShardIteratorType::Latest)
                .await?;
        }
        Ok(())
    }

    /// The currently assigned partitions.
    pub fn get_assignment(&self) -> HashSet<StreamPartition> {
        self.inner.assignment.read().keys().cloned().collect()
    }

    /// Drains up to `max_records_per_poll` buffered records, waiting at most
    /// `timeout` for the first one. Records of partitions removed from the
    /// assignment since they were buffered are filtered out.
    pub async fn poll(&self, timeout: Duration) -> Result<Vec<OrderedRecord>> {
        self.check_if_closed()?;
        self.inner.start_partitions_if_needed();

        let buffer = self.inner.buffer.read().clone();
        let expected = buffer
            .len()
            .max(1)
            .min(self.inner.config.max_records_per_poll);

        let mut polled = Vec::with_capacity(expected);
        buffer.drain(&mut polled, expected, timeout).await;

        let assignment = self.inner.assignment.read();
        polled.retain(|record| assignment.contains_key(record.stream_partition()));
        Ok(polled)
    }

    /// Resolves the newest sequence number of `partition`, the end-of-shard
    /// marker for a closed shard, or `None` when nothing could be read within
    /// the probe timeout.
    pub async fn get_latest_sequence_number(
        &self,
        partition: &StreamPartition,
    ) -> Result<Option<String>> {
        self.check_if_closed()?;
        self.probe_sequence_number(partition, ShardIteratorType::Latest)
            .await
    }

    /// Resolves the oldest retained sequence number of `partition`, the
    /// end-of-shard marker for a closed shard, or `None` when nothing could
    /// be read within the probe timeout.
    pub async fn get_earliest_sequence_number(
        &self,
        partition: &StreamPartition,
    ) -> Result<Option<String>> {
        self.check_if_closed()?;
        self.probe_sequence_number(partition, ShardIteratorType::TrimHorizon)
            .await
    }

    /// Kinesis iterators are opaque; there is no current-position read.
    pub fn get_position(&self, _partition: &StreamPartition) -> Result<String> {
        Err(SupplierError::PositionNotSupported)
    }

    /// Lists the shard ids of `stream`.
    pub async fn get_partition_ids(&self, stream: &str) -> Result<HashSet<String>> {
        self.check_if_closed()?;
        let shards = self.inner.client.list_shards(stream).await?;
        Ok(shards
            .iter()
            .map(|shard| shard.shard_id().to_string())
            .collect())
    }

    /// Number of records currently buffered.
    pub fn buffer_len(&self) -> usize {
        self.inner.buffer.read().len()
    }

    /// Stops all workers, shuts the scheduler down (bounded wait, then
    /// forced) and marks the supplier closed. Idempotent; every other
    /// operation fails afterwards.
    pub async fn close(&self) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }

        // clearing the assignment stops every worker
        let _ = self.assign(HashSet::new());

        let scheduler = self.inner.scheduler.read().clone();
        scheduler.shutdown(EXCEPTION_RETRY_DELAY).await;

        self.inner.closed.store(true, Ordering::SeqCst);
    }

    fn check_if_closed(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SupplierError::AlreadyClosed);
        }
        Ok(())
    }

    /// The reseek fence. Shuts the scheduler down completely (no tick can be
    /// mid-flight afterwards), installs a fresh one, discards buffered
    /// records of the partitions being reseeked while preserving everything
    /// else, and defers rearming to the next `start`/`poll`.
    async fn filter_buffer_and_reset_workers(&self, partitions: &HashSet<StreamPartition>) {
        let old_scheduler = self.inner.scheduler.read().clone();
        old_scheduler.shutdown(EXCEPTION_RETRY_DELAY).await;
        *self.inner.scheduler.write() =
            Arc::new(FetchScheduler::new(self.inner.config.fetch_threads));

        let rebuilt = self.inner.buffer.read().rebuild_excluding(partitions);
        *self.inner.buffer.write() = Arc::new(rebuilt);

        for resource in self.inner.assignment.read().values() {
            resource.started.store(false, Ordering::SeqCst);
        }
        self.inner
            .check_partitions_started
            .store(true, Ordering::SeqCst);
    }

    async fn seek_internal(
        &self,
        partition: &StreamPartition,
        sequence_number: Option<&str>,
        iterator_type: ShardIteratorType,
    ) -> Result<()> {
        let resource = self
            .inner
            .assignment
            .read()
            .get(partition)
            .cloned()
            .ok_or_else(|| SupplierError::PartitionNotAssigned(partition.to_string()))?;

        debug!(
            partition = %partition.partition_id(),
            target = %sequence_number.unwrap_or_else(|| iterator_type.as_str()),
            "Seeking partition"
        );

        let iterator = self
            .inner
            .client
            .get_shard_iterator(
                partition.stream(),
                partition.partition_id(),
                iterator_type,
                sequence_number,
            )
            .await?;

        *resource.cursor.lock() = Some(iterator);
        self.inner
            .check_partitions_started
            .store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Time-bounded loop that turns a positional intent (trim horizon or
    /// latest) into a concrete sequence number by fetching batches until one
    /// comes back non-empty, the iterator chain ends, or the deadline hits.
    async fn probe_sequence_number(
        &self,
        partition: &StreamPartition,
        iterator_type: ShardIteratorType,
    ) -> Result<Option<String>> {
        let mut iterator = match self
            .inner
            .client
            .get_shard_iterator(
                partition.stream(),
                partition.partition_id(),
                iterator_type,
                None,
            )
            .await
        {
            Ok(iterator) => Some(iterator),
            Err(KinesisClientError::ResourceNotFound(msg)) => {
                warn!(
                    partition = %partition.partition_id(),
                    error = %msg,
                    "Partition not found while resolving shard iterator"
                );
                None
            }
            Err(err) => return Err(err.into()),
        };

        let deadline = tokio::time::Instant::now() + self.inner.config.probe_timeout;

        loop {
            let Some(current) = iterator.clone() else { break };
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            if self.inner.closed.load(Ordering::SeqCst) {
                info!("Record supplier closed while probing for a sequence number");
                return Ok(None);
            }

            match self
                .inner
                .client
                .get_records(&current, SEQUENCE_PROBE_LIMIT)
                .await
            {
                Ok((records, next_iterator)) => {
                    if let Some(first) = records.first() {
                        return Ok(Some(first.sequence_number().to_string()));
                    }
                    iterator = next_iterator;
                }
                Err(KinesisClientError::ThroughputExceeded) => {
                    warn!(
                        partition = %partition.partition_id(),
                        backoff_ms = THROUGHPUT_EXCEEDED_BACKOFF.as_millis() as u64,
                        "Throughput exceeded while probing for a sequence number, backing off"
                    );
                    tokio::time::sleep(THROUGHPUT_EXCEEDED_BACKOFF).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        if iterator.is_none() {
            info!(
                partition = %partition.partition_id(),
                "Partition returned a null shard iterator, is the shard closed?"
            );
            return Ok(Some(END_OF_SHARD_MARKER.to_string()));
        }

        // either the shard has no more records or none have been added yet
        warn!(
            partition = %partition.partition_id(),
            "Timed out while trying to fetch position for shard, likely no more records in shard"
        );
        Ok(None)
    }
}
