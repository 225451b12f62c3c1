//! Mock Kinesis client with scripted responses.
//!
//! Iterator strings are deterministic so tests can key `get_records`
//! responses off them: an unscripted `get_shard_iterator` call returns
//! [`MockKinesisClient::default_iterator`] for its arguments, and an
//! unscripted `get_records` call returns an empty batch that hands back the
//! same iterator (an idle, open shard).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_kinesis::types::{Record, Shard, ShardIteratorType};
use tokio::sync::Mutex;

use crate::client::{KinesisClientError, KinesisClientTrait};

/// One observed `get_shard_iterator` call.
#[derive(Debug, Clone)]
pub struct IteratorRequest {
    pub shard_id: String,
    pub iterator_type: ShardIteratorType,
    pub sequence_number: Option<String>,
}

type RecordsResponse = Result<(Vec<Record>, Option<String>), KinesisClientError>;

#[derive(Debug, Default, Clone)]
pub struct MockKinesisClient {
    list_shards_responses: Arc<Mutex<VecDeque<Result<Vec<Shard>, KinesisClientError>>>>,
    iterator_responses: Arc<Mutex<HashMap<String, VecDeque<Result<String, KinesisClientError>>>>>,
    records_responses: Arc<Mutex<HashMap<String, VecDeque<RecordsResponse>>>>,
    iterator_requests: Arc<Mutex<Vec<IteratorRequest>>>,
    iterator_request_count: Arc<AtomicUsize>,
    records_request_count: Arc<AtomicUsize>,
}

impl MockKinesisClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The iterator string an unscripted `get_shard_iterator` call returns.
    pub fn default_iterator(
        shard_id: &str,
        iterator_type: &ShardIteratorType,
        sequence_number: Option<&str>,
    ) -> String {
        match sequence_number {
            Some(seq) => format!("{shard_id}-{}-{seq}", iterator_type.as_str()),
            None => format!("{shard_id}-{}", iterator_type.as_str()),
        }
    }

    pub async fn mock_list_shards(&self, response: Result<Vec<Shard>, KinesisClientError>) {
        self.list_shards_responses.lock().await.push_back(response);
    }

    /// Queues a `get_shard_iterator` response for `shard_id`.
    pub async fn mock_get_iterator_for(
        &self,
        shard_id: &str,
        response: Result<String, KinesisClientError>,
    ) {
        self.iterator_responses
            .lock()
            .await
            .entry(shard_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queues a `get_records` response for the given iterator string.
    pub async fn mock_get_records_for(&self, iterator: &str, response: RecordsResponse) {
        self.records_responses
            .lock()
            .await
            .entry(iterator.to_string())
            .or_default()
            .push_back(response);
    }

    pub async fn iterator_requests(&self) -> Vec<IteratorRequest> {
        self.iterator_requests.lock().await.clone()
    }

    pub fn iterator_request_count(&self) -> usize {
        self.iterator_request_count.load(Ordering::SeqCst)
    }

    pub fn records_request_count(&self) -> usize {
        self.records_request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KinesisClientTrait for MockKinesisClient {
    async fn list_shards(&self, _stream_name: &str) -> Result<Vec<Shard>, KinesisClientError> {
        self.list_shards_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(vec![]))
    }

    async fn get_shard_iterator(
        &self,
        _stream_name: &str,
        shard_id: &str,
        iterator_type: ShardIteratorType,
        sequence_number: Option<&str>,
    ) -> Result<String, KinesisClientError> {
        self.iterator_request_count.fetch_add(1, Ordering::SeqCst);
        self.iterator_requests.lock().await.push(IteratorRequest {
            shard_id: shard_id.to_string(),
            iterator_type: iterator_type.clone(),
            sequence_number: sequence_number.map(String::from),
        });

        if let Some(queue) = self.iterator_responses.lock().await.get_mut(shard_id) {
            if let Some(response) = queue.pop_front() {
                return response;
            }
        }
        Ok(Self::default_iterator(
            shard_id,
            &iterator_type,
            sequence_number,
        ))
    }

    async fn get_records(
        &self,
        iterator: &str,
        _limit: i32,
    ) -> Result<(Vec<Record>, Option<String>), KinesisClientError> {
        self.records_request_count.fetch_add(1, Ordering::SeqCst);

        if let Some(queue) = self.records_responses.lock().await.get_mut(iterator) {
            if let Some(response) = queue.pop_front() {
                return response;
            }
        }
        // idle open shard: empty batch, same iterator
        Ok((vec![], Some(iterator.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestUtils;

    #[tokio::test]
    async fn test_mock_client_scripted_responses() {
        let client = MockKinesisClient::new();

        client
            .mock_list_shards(Ok(vec![TestUtils::create_test_shard("shard-1")]))
            .await;
        let shards = client.list_shards("test-stream").await.unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].shard_id(), "shard-1");

        client
            .mock_get_iterator_for("shard-1", Ok("scripted-iterator".to_string()))
            .await;
        let iterator = client
            .get_shard_iterator("test-stream", "shard-1", ShardIteratorType::TrimHorizon, None)
            .await
            .unwrap();
        assert_eq!(iterator, "scripted-iterator");

        client
            .mock_get_records_for(
                "scripted-iterator",
                Ok((
                    TestUtils::create_test_records(&["1"]),
                    Some("next-iterator".to_string()),
                )),
            )
            .await;
        let (records, next) = client.get_records("scripted-iterator", 100).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence_number(), "1");
        assert_eq!(next.as_deref(), Some("next-iterator"));
    }

    #[tokio::test]
    async fn test_mock_client_defaults() {
        let client = MockKinesisClient::new();

        assert!(client.list_shards("test-stream").await.unwrap().is_empty());

        let iterator = client
            .get_shard_iterator("test-stream", "shard-0", ShardIteratorType::TrimHorizon, None)
            .await
            .unwrap();
        assert_eq!(iterator, "shard-0-TRIM_HORIZON");

        let at_seq = client
            .get_shard_iterator(
                "test-stream",
                "shard-0",
                ShardIteratorType::AtSequenceNumber,
                Some("17"),
            )
            .await
            .unwrap();
        assert_eq!(at_seq, "shard-0-AT_SEQUENCE_NUMBER-17");

        // unscripted get_records behaves like an idle open shard
        let (records, next) = client.get_records(&iterator, 100).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(next.as_deref(), Some("shard-0-TRIM_HORIZON"));
        assert_eq!(client.records_request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_client_error_injection() {
        let client = MockKinesisClient::new();

        client
            .mock_get_records_for("it-1", Err(KinesisClientError::ThroughputExceeded))
            .await;
        let result = client.get_records("it-1", 100).await;
        assert!(matches!(
            result,
            Err(KinesisClientError::ThroughputExceeded)
        ));

        client
            .mock_get_iterator_for(
                "shard-0",
                Err(KinesisClientError::ResourceNotFound("gone".to_string())),
            )
            .await;
        let result = client
            .get_shard_iterator("test-stream", "shard-0", ShardIteratorType::Latest, None)
            .await;
        assert!(matches!(result, Err(KinesisClientError::ResourceNotFound(_))));

        let requests = client.iterator_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].shard_id, "shard-0");
    }
}
