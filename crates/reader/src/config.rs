//! Reader configuration.

use restore_core::{RestoreError, RestoreResult};
use serde::{Deserialize, Serialize};

/// Smallest accepted read-ahead window
const MIN_READ_WINDOW_SIZE: usize = 64;

/// Configuration shared by the metadata, data and log readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Initial read-ahead window in bytes (default: 64KB).
    ///
    /// The window grows to fit larger records and never shrinks.
    pub read_window_size: usize,

    /// Largest accepted record or section length, in words (default: 16M words).
    ///
    /// Longer length words are treated as corruption rather than allocated.
    pub max_record_words: u32,

    /// Check each fragment footer's CRC32 against the records read (default: true).
    pub verify_fragment_checksums: bool,

    /// Skip log entries committed after the backup's stop GCP (default: true).
    pub skip_log_entries_beyond_stop_gcp: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            read_window_size: 64 * 1024,       // 64KB
            max_record_words: 16 * 1024 * 1024, // 64MB
            verify_fragment_checksums: true,
            skip_log_entries_beyond_stop_gcp: true,
        }
    }
}

impl ReaderConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set read-ahead window size (builder pattern).
    pub fn with_read_window_size(mut self, bytes: usize) -> Self {
        self.read_window_size = bytes;
        self
    }

    /// Set record length cap (builder pattern).
    pub fn with_max_record_words(mut self, words: u32) -> Self {
        self.max_record_words = words;
        self
    }

    /// Enable or disable fragment checksum verification (builder pattern).
    pub fn with_fragment_checksums(mut self, verify: bool) -> Self {
        self.verify_fragment_checksums = verify;
        self
    }

    /// Enable or disable skipping log entries past the stop GCP (builder pattern).
    pub fn with_skip_beyond_stop_gcp(mut self, skip: bool) -> Self {
        self.skip_log_entries_beyond_stop_gcp = skip;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> RestoreResult<()> {
        if self.read_window_size < MIN_READ_WINDOW_SIZE {
            return Err(RestoreError::Config(format!(
                "read window must be at least {} bytes, got {}",
                MIN_READ_WINDOW_SIZE, self.read_window_size
            )));
        }
        if self.max_record_words == 0 {
            return Err(RestoreError::Config(
                "record length cap must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a configuration for testing (tiny window to exercise refills).
    pub fn for_testing() -> Self {
        ReaderConfig {
            read_window_size: MIN_READ_WINDOW_SIZE,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restore_core::RestoreErrorKind;

    #[test]
    fn test_default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.read_window_size, 64 * 1024);
        assert_eq!(config.max_record_words, 16 * 1024 * 1024);
        assert!(config.verify_fragment_checksums);
        assert!(config.skip_log_entries_beyond_stop_gcp);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ReaderConfig::new()
            .with_read_window_size(1024)
            .with_max_record_words(4096)
            .with_fragment_checksums(false)
            .with_skip_beyond_stop_gcp(false);

        assert_eq!(config.read_window_size, 1024);
        assert_eq!(config.max_record_words, 4096);
        assert!(!config.verify_fragment_checksums);
        assert!(!config.skip_log_entries_beyond_stop_gcp);
    }

    #[test]
    fn test_validation_valid() {
        assert!(ReaderConfig::default().validate().is_ok());
        assert!(ReaderConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_validation_window_too_small() {
        let err = ReaderConfig::new()
            .with_read_window_size(16)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), RestoreErrorKind::Usage);
    }

    #[test]
    fn test_validation_zero_record_cap() {
        assert!(ReaderConfig::new()
            .with_max_record_words(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ReaderConfig =
            serde_json::from_str(r#"{ "read_window_size": 4096 }"#).unwrap();
        assert_eq!(config.read_window_size, 4096);
        assert!(config.verify_fragment_checksums);
        assert_eq!(config.max_record_words, ReaderConfig::default().max_record_words);
    }
}
