//! Thin port over the Kinesis API used by the supplier, plus the production
//! implementation backed by [`aws_sdk_kinesis::Client`].
//!
//! The supplier only ever talks to the stream service through
//! [`KinesisClientTrait`], so tests can script responses with a mock and the
//! error taxonomy stays independent of SDK error shapes.

use async_trait::async_trait;
use aws_sdk_kinesis::error::SdkError;
use aws_sdk_kinesis::operation::get_records::GetRecordsError;
use aws_sdk_kinesis::operation::get_shard_iterator::GetShardIteratorError;
use aws_sdk_kinesis::operation::list_shards::ListShardsError;
use aws_sdk_kinesis::types::{Record, Shard, ShardIteratorType};
use aws_sdk_kinesis::Client;
use thiserror::Error;

/// Classified failures of the stream service.
///
/// The supplier's fetch workers key their retry behavior off these variants,
/// so the mapping from SDK errors below is the single place where AWS error
/// shapes are interpreted.
#[derive(Debug, Clone, Error)]
pub enum KinesisClientError {
    /// The shard iterator aged out. `next_iterator` carries a replacement
    /// when the service supplied one alongside the failure.
    #[error("shard iterator has expired")]
    ExpiredIterator { next_iterator: Option<String> },

    /// Read throughput for the shard or stream was exceeded.
    #[error("provisioned throughput exceeded")]
    ThroughputExceeded,

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Network, IO or request-timeout failure; safe to retry.
    #[error("recoverable transport error: {0}")]
    Recoverable(String),

    #[error("unrecoverable client error: {0}")]
    Unrecoverable(String),
}

#[async_trait]
pub trait KinesisClientTrait: Send + Sync {
    async fn list_shards(&self, stream_name: &str) -> Result<Vec<Shard>, KinesisClientError>;

    /// Resolves an iterator for `shard_id`. `sequence_number` is required for
    /// the `AtSequenceNumber` and `AfterSequenceNumber` iterator types and
    /// ignored otherwise.
    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        iterator_type: ShardIteratorType,
        sequence_number: Option<&str>,
    ) -> Result<String, KinesisClientError>;

    /// Fetches up to `limit` records. The returned iterator is `None` iff the
    /// shard has been closed; an empty record list alone does not mean the
    /// shard is finished.
    async fn get_records(
        &self,
        iterator: &str,
        limit: i32,
    ) -> Result<(Vec<Record>, Option<String>), KinesisClientError>;
}

#[async_trait]
impl KinesisClientTrait for Client {
    async fn list_shards(&self, stream_name: &str) -> Result<Vec<Shard>, KinesisClientError> {
        let response = self
            .list_shards()
            .stream_name(stream_name)
            .send()
            .await
            .map_err(map_list_shards_error)?;
        Ok(response.shards.unwrap_or_default())
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        iterator_type: ShardIteratorType,
        sequence_number: Option<&str>,
    ) -> Result<String, KinesisClientError> {
        let mut req = self
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(iterator_type);

        if let Some(seq) = sequence_number {
            req = req.starting_sequence_number(seq);
        }

        let response = req.send().await.map_err(map_get_shard_iterator_error)?;
        Ok(response.shard_iterator.unwrap_or_default())
    }

    async fn get_records(
        &self,
        iterator: &str,
        limit: i32,
    ) -> Result<(Vec<Record>, Option<String>), KinesisClientError> {
        let response = self
            .get_records()
            .shard_iterator(iterator)
            .limit(limit)
            .send()
            .await
            .map_err(map_get_records_error)?;

        Ok((
            response.records().to_vec(),
            response.next_shard_iterator().map(String::from),
        ))
    }
}

fn map_get_records_error(err: SdkError<GetRecordsError>) -> KinesisClientError {
    match err {
        SdkError::ServiceError(ctx) => match ctx.into_err() {
            GetRecordsError::ExpiredIteratorException(_) => {
                KinesisClientError::ExpiredIterator { next_iterator: None }
            }
            GetRecordsError::ProvisionedThroughputExceededException(_) => {
                KinesisClientError::ThroughputExceeded
            }
            GetRecordsError::ResourceNotFoundException(e) => {
                KinesisClientError::ResourceNotFound(e.to_string())
            }
            GetRecordsError::InvalidArgumentException(e) => {
                KinesisClientError::InvalidArgument(e.to_string())
            }
            other => KinesisClientError::Unrecoverable(other.to_string()),
        },
        other => map_transport_error(other),
    }
}

fn map_get_shard_iterator_error(err: SdkError<GetShardIteratorError>) -> KinesisClientError {
    match err {
        SdkError::ServiceError(ctx) => match ctx.into_err() {
            GetShardIteratorError::ProvisionedThroughputExceededException(_) => {
                KinesisClientError::ThroughputExceeded
            }
            GetShardIteratorError::ResourceNotFoundException(e) => {
                KinesisClientError::ResourceNotFound(e.to_string())
            }
            GetShardIteratorError::InvalidArgumentException(e) => {
                KinesisClientError::InvalidArgument(e.to_string())
            }
            other => KinesisClientError::Unrecoverable(other.to_string()),
        },
        other => map_transport_error(other),
    }
}

fn map_list_shards_error(err: SdkError<ListShardsError>) -> KinesisClientError {
    match err {
        SdkError::ServiceError(ctx) => match ctx.into_err() {
            ListShardsError::LimitExceededException(_) => KinesisClientError::ThroughputExceeded,
            ListShardsError::ResourceNotFoundException(e) => {
                KinesisClientError::ResourceNotFound(e.to_string())
            }
            ListShardsError::InvalidArgumentException(e) => {
                KinesisClientError::InvalidArgument(e.to_string())
            }
            other => KinesisClientError::Unrecoverable(other.to_string()),
        },
        other => map_transport_error(other),
    }
}

fn map_transport_error<E>(err: SdkError<E>) -> KinesisClientError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            KinesisClientError::Recoverable(err.to_string())
        }
        _ => KinesisClientError::Unrecoverable(err.to_string()),
    }
}
