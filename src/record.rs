//! Core data model: stream partitions and the records the supplier hands out

/// Reserved sequence number marking the end of a closed shard.
///
/// A record carrying this sequence number has no payloads and signals that
/// the partition it belongs to will produce no further records.
pub const END_OF_SHARD_MARKER: &str = "EOS";

/// A `(stream, partition)` pair identifying one shard of one stream.
///
/// Both components are opaque strings supplied by the stream service. Values
/// are immutable and compare by content, so they can be used as map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamPartition {
    stream: String,
    partition_id: String,
}

impl StreamPartition {
    pub fn new(stream: impl Into<String>, partition_id: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            partition_id: partition_id.into(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }
}

impl std::fmt::Display for StreamPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.stream, self.partition_id)
    }
}

/// One record as delivered by [`poll`](crate::KinesisRecordSupplier::poll).
///
/// Sequence numbers are opaque, lexicographically comparable strings. After
/// decoding, `data` holds one or more payloads; the end-of-shard marker
/// carries none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedRecord {
    partition: StreamPartition,
    sequence_number: String,
    data: Vec<Vec<u8>>,
}

impl OrderedRecord {
    pub fn new(
        partition: StreamPartition,
        sequence_number: impl Into<String>,
        data: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            partition,
            sequence_number: sequence_number.into(),
            data,
        }
    }

    /// Builds the end-of-shard sentinel for `partition`.
    pub fn end_of_shard(partition: StreamPartition) -> Self {
        Self {
            partition,
            sequence_number: END_OF_SHARD_MARKER.to_string(),
            data: Vec::new(),
        }
    }

    pub fn stream_partition(&self) -> &StreamPartition {
        &self.partition
    }

    pub fn stream(&self) -> &str {
        self.partition.stream()
    }

    pub fn partition_id(&self) -> &str {
        self.partition.partition_id()
    }

    pub fn sequence_number(&self) -> &str {
        &self.sequence_number
    }

    pub fn data(&self) -> &[Vec<u8>] {
        &self.data
    }

    pub fn is_end_of_shard(&self) -> bool {
        self.sequence_number == END_OF_SHARD_MARKER
    }
}
