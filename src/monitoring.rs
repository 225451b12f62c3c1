//! Monitoring events emitted by the fetch workers.
//!
//! When enabled, the supplier publishes [`FetchEvent`]s on an mpsc channel
//! returned from the constructor. Delivery is best effort: a full or closed
//! channel never blocks or fails a fetch worker.

use std::time::SystemTime;

/// Configuration for the monitoring channel
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Whether monitoring is enabled
    pub enabled: bool,
    /// Size of the monitoring channel buffer
    pub channel_size: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_size: 1000,
        }
    }
}

/// One observation from a partition fetch worker.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// When the event occurred
    pub timestamp: SystemTime,
    /// ID of the partition this event relates to
    pub partition_id: String,
    /// The kind of event and its details
    pub event_type: FetchEventType,
}

/// The different kinds of events a fetch worker can report.
#[derive(Debug, Clone)]
pub enum FetchEventType {
    /// A background fetch worker was armed for its partition.
    WorkerStarted,
    /// The worker observed a stop request and wound down.
    WorkerStopped,
    /// The worker hit a fatal error and will not be rescheduled.
    WorkerFailed { error: String },
    /// One `get_records` batch was fetched and fully buffered.
    BatchFetched { count: usize, shard_closed: bool },
    /// The shared buffer was full; the worker rewound its cursor to
    /// `sequence_number` and backed off.
    BufferFull { sequence_number: String },
    /// The stream service throttled a fetch.
    Throttled,
    /// An expired iterator was replaced and fetching continues.
    IteratorRenewed,
    /// The end-of-shard marker was enqueued for a closed shard.
    EndOfShard,
}

impl FetchEvent {
    pub(crate) fn new(partition_id: &str, event_type: FetchEventType) -> Self {
        Self {
            timestamp: SystemTime::now(),
            partition_id: partition_id.to_string(),
            event_type,
        }
    }
}
