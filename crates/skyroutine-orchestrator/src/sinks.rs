//! File layout for retrieved images.
//!
//! ```text
//! <working_image>                       transient, overwritten per payload
//! <positives_dir>/<prefix><n>.<ext>     face present
//! <negatives_dir>/<prefix><n>.<ext>     no face
//! ```

use std::path::{Path, PathBuf};

use skyroutine_config::RetrievalConfig;
use skyroutine_utils::atomic_write::write_bytes_atomic;
use skyroutine_utils::error::RetrievalError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSinks {
    pub working_image: PathBuf,
    pub positives_dir: PathBuf,
    pub negatives_dir: PathBuf,
    pub file_prefix: String,
    pub file_extension: String,
}

impl ImageSinks {
    /// Relative paths in `config` are taken relative to `base`.
    #[must_use]
    pub fn from_config(config: &RetrievalConfig, base: &Path) -> Self {
        Self {
            working_image: base.join(&config.working_image),
            positives_dir: base.join(&config.positives_dir),
            negatives_dir: base.join(&config.negatives_dir),
            file_prefix: config.file_prefix.clone(),
            file_extension: config.file_extension.clone(),
        }
    }

    /// Default layout rooted at `base`.
    #[must_use]
    pub fn under(base: &Path) -> Self {
        Self::from_config(&RetrievalConfig::default(), base)
    }

    fn file_name(&self, index: u64) -> String {
        if self.file_extension.is_empty() {
            format!("{}{index}", self.file_prefix)
        } else {
            format!("{}{index}.{}", self.file_prefix, self.file_extension)
        }
    }

    #[must_use]
    pub fn positive_path(&self, index: u64) -> PathBuf {
        self.positives_dir.join(self.file_name(index))
    }

    #[must_use]
    pub fn negative_path(&self, index: u64) -> PathBuf {
        self.negatives_dir.join(self.file_name(index))
    }

    /// Write `bytes` to the working image.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Sink` if the file cannot be written.
    pub fn stage(&self, bytes: &[u8]) -> Result<PathBuf, RetrievalError> {
        write(&self.working_image, bytes)?;
        Ok(self.working_image.clone())
    }

    /// Write `bytes` into the positive or negative set under `index`.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Sink` if the file cannot be written.
    pub fn store(&self, index: u64, bytes: &[u8], positive: bool) -> Result<PathBuf, RetrievalError> {
        let path = if positive {
            self.positive_path(index)
        } else {
            self.negative_path(index)
        };
        write(&path, bytes)?;
        Ok(path)
    }
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), RetrievalError> {
    write_bytes_atomic(path, bytes).map_err(|e| RetrievalError::Sink {
        path: path.display().to_string(),
        reason: format!("{e:#}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_are_index_suffixed() {
        let sinks = ImageSinks::under(Path::new("/data"));
        assert_eq!(
            sinks.positive_path(4),
            PathBuf::from("/data/positives/image_4.jpg")
        );
        assert_eq!(
            sinks.negative_path(12),
            PathBuf::from("/data/negatives/image_12.jpg")
        );
    }

    #[test]
    fn test_stage_overwrites_working_image() {
        let temp = TempDir::new().unwrap();
        let sinks = ImageSinks::under(temp.path());

        sinks.stage(b"first").unwrap();
        let path = sinks.stage(b"second").unwrap();

        assert_eq!(path, temp.path().join("tmp.jpg"));
        assert_eq!(std::fs::read(path).unwrap(), b"second");
    }

    #[test]
    fn test_store_creates_directories() {
        let temp = TempDir::new().unwrap();
        let sinks = ImageSinks::under(temp.path());

        let path = sinks.store(0, b"img", false).unwrap();

        assert!(path.starts_with(temp.path().join("negatives")));
        assert!(!temp.path().join("positives").exists());
    }

    #[test]
    fn test_sink_error_names_path() {
        let temp = TempDir::new().unwrap();
        // A regular file where the directory should be
        std::fs::write(temp.path().join("positives"), b"").unwrap();
        let sinks = ImageSinks::under(temp.path());

        let err = sinks.store(0, b"img", true).unwrap_err();
        assert!(matches!(err, RetrievalError::Sink { ref path, .. } if path.contains("positives")));
    }
}
