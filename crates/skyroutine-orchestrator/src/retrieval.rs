//! Bulk retrieval loop.
//!
//! For `n = 0, 1, 2, ...` the loop asks the trace store to prepare batch `n`
//! (`dc=qrb`), then opens a fresh data connection and reads until the peer
//! closes. Everything read over one connection is one payload. An empty
//! payload ends the loop, and so does any connection or read error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use skyroutine_config::RetrievalConfig;
use skyroutine_utils::error::RetrievalError;

use crate::classify::{Classification, ClassificationAdapter};

/// Read buffer size for the data connection
const CHUNK_SIZE: usize = 8 * 1024;

/// Bytes pulled for one sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub index: u64,
    pub bytes: Vec<u8>,
}

/// Source of retrieved payloads.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    /// Pull the payload for `index`. An empty vector is the end-of-data sentinel.
    async fn fetch(&self, index: u64) -> Result<Vec<u8>, RetrievalError>;
}

/// Reads payloads from the trace store's raw byte endpoint.
///
/// One TCP connection per payload; the connection is dropped on every exit
/// path, including errors.
#[derive(Debug, Clone)]
pub struct TcpPayloadSource {
    endpoint: String,
    max_payload_bytes: usize,
    read_timeout: Option<Duration>,
}

impl TcpPayloadSource {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_payload_bytes: skyroutine_config::DEFAULT_MAX_PAYLOAD_BYTES,
            read_timeout: None,
        }
    }

    #[must_use]
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            endpoint: config.data_endpoint.clone(),
            max_payload_bytes: config.max_payload_bytes,
            read_timeout: config.read_timeout_secs.map(Duration::from_secs),
        }
    }

    #[must_use]
    pub fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    async fn connect(&self) -> Result<TcpStream, RetrievalError> {
        let connect = TcpStream::connect(&self.endpoint);
        let result = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                RetrievalError::ReadTimeout {
                    endpoint: self.endpoint.clone(),
                    timeout_secs: limit.as_secs(),
                }
            })?,
            None => connect.await,
        };
        result.map_err(|source| RetrievalError::Connect {
            endpoint: self.endpoint.clone(),
            source,
        })
    }

    async fn read_chunk(
        &self,
        stream: &mut TcpStream,
        chunk: &mut [u8],
    ) -> Result<usize, RetrievalError> {
        let read = stream.read(chunk);
        let result = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read).await.map_err(|_| {
                RetrievalError::ReadTimeout {
                    endpoint: self.endpoint.clone(),
                    timeout_secs: limit.as_secs(),
                }
            })?,
            None => read.await,
        };
        result.map_err(|source| RetrievalError::Read {
            endpoint: self.endpoint.clone(),
            source,
        })
    }
}

#[async_trait]
impl PayloadSource for TcpPayloadSource {
    async fn fetch(&self, index: u64) -> Result<Vec<u8>, RetrievalError> {
        let mut stream = self.connect().await?;
        let mut payload = Vec::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut reads = 0usize;

        loop {
            let n = self.read_chunk(&mut stream, &mut chunk).await?;
            if n == 0 {
                break;
            }
            reads += 1;
            if payload.len() + n > self.max_payload_bytes {
                return Err(RetrievalError::PayloadTooLarge {
                    limit_bytes: self.max_payload_bytes,
                });
            }
            payload.extend_from_slice(&chunk[..n]);
        }

        debug!(
            index,
            bytes = payload.len(),
            reads,
            endpoint = %self.endpoint,
            "Payload read"
        );
        Ok(payload)
    }
}

/// Whether the loop may read batch `n` after asking for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryVerdict {
    Proceed,
    /// Force stop observed before the query was issued
    Stopped,
    /// The query failed and the failure policy ends the mission
    Abort { reason: String },
}

/// Issues the `qrb` command for a batch and waits for it.
#[async_trait]
pub trait BatchQuery: Send {
    async fn query(&mut self, index: u64) -> QueryVerdict;
}

/// One payload as it appears in the routine report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedImage {
    pub index: u64,
    pub length: usize,
    /// blake3 digest, hex
    pub blake3: String,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_error: Option<String>,
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RetrievalEnd {
    /// Empty payload at `index`
    Exhausted { index: u64 },
    /// Connection or read failure at `index`, treated as the sentinel
    SourceError { index: u64, error: String },
    /// `max_payloads` reached
    PayloadCap { limit: u64 },
    Stopped { index: u64 },
    Aborted { index: u64, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalSummary {
    pub images: Vec<RetrievedImage>,
    pub end: RetrievalEnd,
    pub positives: usize,
    pub negatives: usize,
    pub unclassified: usize,
}

impl RetrievalSummary {
    fn new(images: Vec<RetrievedImage>, end: RetrievalEnd) -> Self {
        let count = |pred: fn(&Classification) -> bool| {
            images.iter().filter(|i| pred(&i.classification)).count()
        };
        let positives = count(|c| matches!(c, Classification::Positive));
        let negatives = count(|c| matches!(c, Classification::Negative));
        let unclassified = count(|c| matches!(c, Classification::Unclassified { .. }));
        Self {
            images,
            end,
            positives,
            negatives,
            unclassified,
        }
    }

    /// Payloads that reached the classifier with a decision.
    #[must_use]
    pub fn classified(&self) -> usize {
        self.positives + self.negatives
    }
}

/// The pull-until-empty loop over a [`PayloadSource`].
pub struct BulkRetrieval {
    source: Arc<dyn PayloadSource>,
    adapter: ClassificationAdapter,
    max_payloads: Option<u64>,
}

impl std::fmt::Debug for BulkRetrieval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkRetrieval")
            .field("adapter", &self.adapter)
            .field("max_payloads", &self.max_payloads)
            .finish_non_exhaustive()
    }
}

impl BulkRetrieval {
    #[must_use]
    pub fn new(source: Arc<dyn PayloadSource>, adapter: ClassificationAdapter) -> Self {
        Self {
            source,
            adapter,
            max_payloads: None,
        }
    }

    #[must_use]
    pub fn with_max_payloads(mut self, limit: Option<u64>) -> Self {
        self.max_payloads = limit;
        self
    }

    #[must_use]
    pub fn adapter(&self) -> &ClassificationAdapter {
        &self.adapter
    }

    /// Run until the sentinel, a source error, the cap, a stop, or an abort.
    pub async fn run<Q>(&self, queries: &mut Q) -> RetrievalSummary
    where
        Q: BatchQuery + ?Sized,
    {
        let mut images = Vec::new();
        let mut index: u64 = 0;

        let end = loop {
            if let Some(limit) = self.max_payloads
                && index >= limit
            {
                info!(limit, "Payload cap reached, ending retrieval");
                break RetrievalEnd::PayloadCap { limit };
            }

            match queries.query(index).await {
                QueryVerdict::Proceed => {}
                QueryVerdict::Stopped => break RetrievalEnd::Stopped { index },
                QueryVerdict::Abort { reason } => {
                    break RetrievalEnd::Aborted { index, message: reason };
                }
            }

            let bytes = match self.source.fetch(index).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(index, error = %e, "Retrieval failed, treating as end of data");
                    break RetrievalEnd::SourceError {
                        index,
                        error: e.to_string(),
                    };
                }
            };

            if bytes.is_empty() {
                info!(index, "Empty payload, retrieval complete");
                break RetrievalEnd::Exhausted { index };
            }

            let payload = ImagePayload { index, bytes };
            let digest = blake3::hash(&payload.bytes).to_hex().to_string();
            let classified = self.adapter.process(&payload).await;

            images.push(RetrievedImage {
                index,
                length: payload.bytes.len(),
                blake3: digest,
                classification: classified.classification,
                stored_at: classified.stored_at,
                sink_error: classified.sink_error,
            });
            index += 1;
        };

        let summary = RetrievalSummary::new(images, end);
        info!(
            positives = summary.positives,
            negatives = summary.negatives,
            unclassified = summary.unclassified,
            "Retrieval summary"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FixtureClassifier, MemoryPayloadSource};
    use crate::sinks::ImageSinks;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct CountingQueries {
        issued: Vec<u64>,
        stop_at: Option<u64>,
    }

    #[async_trait]
    impl BatchQuery for CountingQueries {
        async fn query(&mut self, index: u64) -> QueryVerdict {
            if self.stop_at == Some(index) {
                return QueryVerdict::Stopped;
            }
            self.issued.push(index);
            QueryVerdict::Proceed
        }
    }

    fn retrieval(temp: &TempDir, source: Arc<dyn PayloadSource>, classifier: Arc<FixtureClassifier>) -> BulkRetrieval {
        BulkRetrieval::new(
            source,
            ClassificationAdapter::new(classifier, ImageSinks::under(temp.path())),
        )
    }

    #[tokio::test]
    async fn test_terminates_on_empty_payload() {
        let temp = TempDir::new().unwrap();
        let classifier = Arc::new(FixtureClassifier::new());
        let source = Arc::new(MemoryPayloadSource::with_lengths(&[120, 340, 0]));
        let retrieval = retrieval(&temp, source.clone(), classifier.clone());
        let mut queries = CountingQueries::default();

        let summary = retrieval.run(&mut queries).await;

        assert_eq!(summary.images.len(), 2);
        assert_eq!(summary.images[0].length, 120);
        assert_eq!(summary.images[1].length, 340);
        assert_eq!(summary.end, RetrievalEnd::Exhausted { index: 2 });
        assert_eq!(classifier.calls(), 2);
        assert_eq!(queries.issued, vec![0, 1, 2]);
        assert_eq!(source.fetched(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_empty_first_payload_classifies_nothing() {
        let temp = TempDir::new().unwrap();
        let classifier = Arc::new(FixtureClassifier::new());
        let retrieval = retrieval(
            &temp,
            Arc::new(MemoryPayloadSource::with_lengths(&[0])),
            classifier.clone(),
        );

        let summary = retrieval.run(&mut CountingQueries::default()).await;

        assert!(summary.images.is_empty());
        assert_eq!(summary.end, RetrievalEnd::Exhausted { index: 0 });
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_source_error_ends_loop() {
        let temp = TempDir::new().unwrap();
        let classifier = Arc::new(FixtureClassifier::new());
        let source = MemoryPayloadSource::with_lengths(&[64, 64]).failing_at(1);
        let retrieval = retrieval(&temp, Arc::new(source), classifier);

        let summary = retrieval.run(&mut CountingQueries::default()).await;

        assert_eq!(summary.images.len(), 1);
        assert!(matches!(summary.end, RetrievalEnd::SourceError { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_payload_cap_and_stop() {
        let temp = TempDir::new().unwrap();
        let lengths = [10, 10, 10, 10];

        let capped = retrieval(
            &temp,
            Arc::new(MemoryPayloadSource::with_lengths(&lengths)),
            Arc::new(FixtureClassifier::new()),
        )
        .with_max_payloads(Some(2));
        let summary = capped.run(&mut CountingQueries::default()).await;
        assert_eq!(summary.end, RetrievalEnd::PayloadCap { limit: 2 });
        assert_eq!(summary.images.len(), 2);

        let stopped = retrieval(
            &temp,
            Arc::new(MemoryPayloadSource::with_lengths(&lengths)),
            Arc::new(FixtureClassifier::new()),
        );
        let mut queries = CountingQueries {
            stop_at: Some(1),
            ..CountingQueries::default()
        };
        let summary = stopped.run(&mut queries).await;
        assert_eq!(summary.end, RetrievalEnd::Stopped { index: 1 });
        assert_eq!(queries.issued, vec![0]);
    }

    #[test]
    fn test_aborted_end_serializes_reason_tag_and_message() {
        let end = RetrievalEnd::Aborted {
            index: 3,
            message: "no index".to_string(),
        };
        let value = serde_json::to_value(&end).unwrap();
        assert_eq!(value["reason"], "aborted");
        assert_eq!(value["message"], "no index");
        assert_eq!(value["index"], 3);

        let back: RetrievalEnd = serde_json::from_value(value).unwrap();
        assert_eq!(back, end);
    }

    /// Serves each payload on its own connection, written in small pieces.
    async fn serve_payloads(payloads: Vec<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for payload in payloads {
                let (mut socket, _) = listener.accept().await.unwrap();
                for piece in payload.chunks(7) {
                    socket.write_all(piece).await.unwrap();
                    socket.flush().await.unwrap();
                    tokio::task::yield_now().await;
                }
                socket.shutdown().await.ok();
            }
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn test_tcp_source_accumulates_partial_reads() {
        let first: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
        let endpoint = serve_payloads(vec![first.clone(), Vec::new()]).await;
        let source = TcpPayloadSource::new(endpoint).with_read_timeout(Duration::from_secs(5));

        assert_eq!(source.fetch(0).await.unwrap(), first);
        assert!(source.fetch(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tcp_source_enforces_size_limit() {
        let endpoint = serve_payloads(vec![vec![1u8; 100]]).await;
        let source = TcpPayloadSource::new(endpoint).with_max_payload_bytes(50);

        let err = source.fetch(0).await.unwrap_err();
        assert!(matches!(err, RetrievalError::PayloadTooLarge { limit_bytes: 50 }));
    }

    #[tokio::test]
    async fn test_tcp_source_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpPayloadSource::new(addr.to_string()).fetch(0).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Connect { .. }));
    }
}
