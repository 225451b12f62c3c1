//! Pluggable payload decoding.
//!
//! Kinesis producers may pack several logical payloads into one stream record
//! (KPL aggregation). The deaggregation library carries a license that keeps
//! it out of this crate's dependency tree, so the capability is injected: a
//! caller that wants deaggregation enables it in the config and hands the
//! supplier a [`RecordDecoder`] at construction time.

/// Turns the raw bytes of one stream record into one or more payloads.
pub trait RecordDecoder: Send + Sync {
    /// Decodes a single record's data. Must yield at least one payload on
    /// success; a failure stops the fetch worker for that partition.
    fn decode(&self, data: &[u8]) -> anyhow::Result<Vec<Vec<u8>>>;
}

/// Default decoder: each stream record is exactly one payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityDecoder;

impl RecordDecoder for IdentityDecoder {
    fn decode(&self, data: &[u8]) -> anyhow::Result<Vec<Vec<u8>>> {
        Ok(vec![data.to_vec()])
    }
}
