//! Test fixtures: a deterministic classifier and an in-memory payload source.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use skyroutine_utils::error::{ClassifyError, RetrievalError};

use crate::classify::{Classifier, StagedImage};
use crate::retrieval::PayloadSource;

const JPEG_SOI: &[u8] = b"\xff\xd8";
const FACE_MARKER: &[u8] = b"fixture:face";

/// Image bytes the fixture classifier reports as containing a face.
pub const FACE_PRESENT: &[u8] = b"\xff\xd8\xff\xe0skyroutine-fixture:face\xff\xd9";
/// Image bytes the fixture classifier reports as containing no face.
pub const NO_FACE: &[u8] = b"\xff\xd8\xff\xe0skyroutine-fixture:none\xff\xd9";

/// Classifier with fixed answers.
///
/// Bytes without a JPEG start marker fail to decode. Bytes containing the
/// face marker are positive; every other image is negative.
#[derive(Debug, Default)]
pub struct FixtureClassifier {
    calls: AtomicUsize,
}

impl FixtureClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `classify` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FixtureClassifier {
    async fn classify(&self, image: &StagedImage<'_>) -> Result<bool, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !image.bytes.starts_with(JPEG_SOI) {
            return Err(ClassifyError::Decode(format!(
                "payload {} has no JPEG start marker",
                image.index
            )));
        }
        Ok(image
            .bytes
            .windows(FACE_MARKER.len())
            .any(|window| window == FACE_MARKER))
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

/// Serves pre-built payloads by index; past the end it serves the empty sentinel.
#[derive(Debug, Default)]
pub struct MemoryPayloadSource {
    payloads: Vec<Vec<u8>>,
    fail_at: Option<u64>,
    fetched: Mutex<Vec<u64>>,
}

impl MemoryPayloadSource {
    #[must_use]
    pub fn new(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            payloads,
            ..Self::default()
        }
    }

    /// One no-face image per length; a length of 0 is the empty sentinel.
    #[must_use]
    pub fn with_lengths(lengths: &[usize]) -> Self {
        let payloads = lengths
            .iter()
            .map(|&len| {
                let mut bytes = JPEG_SOI.to_vec();
                bytes.resize(len.max(JPEG_SOI.len()), 0);
                bytes.truncate(len);
                bytes
            })
            .collect();
        Self::new(payloads)
    }

    /// Fail the fetch for `index` with a connection error.
    #[must_use]
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Indices fetched so far, in order.
    #[must_use]
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PayloadSource for MemoryPayloadSource {
    async fn fetch(&self, index: u64) -> Result<Vec<u8>, RetrievalError> {
        self.fetched
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(index);

        if self.fail_at == Some(index) {
            return Err(RetrievalError::Connect {
                endpoint: "memory".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        Ok(usize::try_from(index)
            .ok()
            .and_then(|i| self.payloads.get(i))
            .cloned()
            .unwrap_or_default())
    }
}
