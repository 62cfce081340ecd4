//! Classification adapter.
//!
//! Wraps an opaque face detector. Each retrieved payload is staged to the
//! working image, classified, and copied into the positive or negative set.
//! A classifier error never stops the retrieval loop: the payload is recorded
//! as `Unclassified` and written to neither set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use skyroutine_config::ClassifierConfig;
use skyroutine_utils::error::ClassifyError;

use crate::retrieval::ImagePayload;
use crate::sinks::ImageSinks;

/// Bytes of detector stderr kept in error reports
const STDERR_TAIL_BYTES: usize = 512;

/// A payload that has been written to the working image path.
#[derive(Debug, Clone, Copy)]
pub struct StagedImage<'a> {
    pub index: u64,
    pub path: &'a Path,
    pub bytes: &'a [u8],
}

/// Face detector seam.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// `Ok(true)` when a face is present.
    async fn classify(&self, image: &StagedImage<'_>) -> Result<bool, ClassifyError>;

    fn name(&self) -> &str;
}

/// Decision recorded for one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Classification {
    Positive,
    Negative,
    Unclassified { reason: String },
}

impl Classification {
    #[must_use]
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive)
    }
}

/// Result of pushing one payload through the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedImage {
    pub classification: Classification,
    /// Destination in the positive or negative set, when written
    pub stored_at: Option<PathBuf>,
    /// Set when the staged or final write failed
    pub sink_error: Option<String>,
}

/// Stages, classifies, and files retrieved payloads.
pub struct ClassificationAdapter {
    classifier: Arc<dyn Classifier>,
    sinks: ImageSinks,
}

impl std::fmt::Debug for ClassificationAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationAdapter")
            .field("classifier", &self.classifier.name())
            .field("sinks", &self.sinks)
            .finish()
    }
}

impl ClassificationAdapter {
    #[must_use]
    pub fn new(classifier: Arc<dyn Classifier>, sinks: ImageSinks) -> Self {
        Self { classifier, sinks }
    }

    #[must_use]
    pub fn sinks(&self) -> &ImageSinks {
        &self.sinks
    }

    /// Classify an image already on disk. Nothing is staged or filed.
    pub async fn classify_file(&self, path: &Path) -> Classification {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Classification::Unclassified {
                    reason: format!("cannot read {}: {e}", path.display()),
                };
            }
        };
        let image = StagedImage {
            index: 0,
            path,
            bytes: &bytes,
        };

        match self.classifier.classify(&image).await {
            Ok(true) => Classification::Positive,
            Ok(false) => Classification::Negative,
            Err(e) => Classification::Unclassified {
                reason: e.to_string(),
            },
        }
    }

    /// Classify one payload and write it to the matching set.
    pub async fn process(&self, payload: &ImagePayload) -> ClassifiedImage {
        let staged_path = match self.sinks.stage(&payload.bytes) {
            Ok(path) => path,
            Err(e) => {
                warn!(index = payload.index, error = %e, "Could not stage payload");
                return ClassifiedImage {
                    classification: Classification::Unclassified {
                        reason: e.to_string(),
                    },
                    stored_at: None,
                    sink_error: Some(e.to_string()),
                };
            }
        };

        let staged = StagedImage {
            index: payload.index,
            path: &staged_path,
            bytes: &payload.bytes,
        };

        let classification = match self.classifier.classify(&staged).await {
            Ok(true) => Classification::Positive,
            Ok(false) => Classification::Negative,
            Err(e) => {
                warn!(
                    index = payload.index,
                    classifier = self.classifier.name(),
                    error = %e,
                    "Payload left unclassified"
                );
                return ClassifiedImage {
                    classification: Classification::Unclassified {
                        reason: e.to_string(),
                    },
                    stored_at: None,
                    sink_error: None,
                };
            }
        };

        match self
            .sinks
            .store(payload.index, &payload.bytes, classification.is_positive())
        {
            Ok(path) => {
                info!(
                    index = payload.index,
                    face = classification.is_positive(),
                    path = %path.display(),
                    "Payload classified"
                );
                ClassifiedImage {
                    classification,
                    stored_at: Some(path),
                    sink_error: None,
                }
            }
            Err(e) => {
                warn!(index = payload.index, error = %e, "Could not store classified payload");
                ClassifiedImage {
                    classification,
                    stored_at: None,
                    sink_error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Runs an external detector on the staged image.
///
/// The program is spawned directly (no shell) with the configured arguments
/// and the staged image path appended. Exit status 0 means a face was found,
/// 1 means none; anything else is an error.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// `None` when `[classifier] program` is unset.
    #[must_use]
    pub fn from_config(config: &ClassifierConfig) -> Option<Self> {
        config.program.as_ref().map(|program| {
            Self::new(
                program.clone(),
                config.args.clone(),
                Duration::from_secs(config.timeout_secs),
            )
        })
    }

    fn stderr_tail(stderr: &[u8]) -> String {
        let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
        String::from_utf8_lossy(&stderr[start..]).trim().to_string()
    }
}

#[async_trait]
impl Classifier for CommandClassifier {
    async fn classify(&self, image: &StagedImage<'_>) -> Result<bool, ClassifyError> {
        debug!(
            program = %self.program,
            path = %image.path.display(),
            "Running detector"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(image.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClassifyError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let mut stderr_pipe = child.stderr.take();
        let run = async {
            let mut stderr = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                // A detector that closes stderr early is not an error
                let _ = pipe.read_to_end(&mut stderr).await;
            }
            let status = child.wait().await;
            (status, stderr)
        };

        let (status, stderr) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| ClassifyError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })?;

        let status = status.map_err(|e| ClassifyError::Spawn {
            program: self.program.clone(),
            reason: e.to_string(),
        })?;

        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => Err(ClassifyError::Detector {
                code,
                stderr_tail: Self::stderr_tail(&stderr),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Stand-in when no detector is configured: every payload is unclassified.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredClassifier;

#[async_trait]
impl Classifier for UnconfiguredClassifier {
    async fn classify(&self, _image: &StagedImage<'_>) -> Result<bool, ClassifyError> {
        Err(ClassifyError::NotConfigured)
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}
