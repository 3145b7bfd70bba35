//! Logging and signature-store configuration

use serde::Deserialize;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log verbosity, lowest to highest severity floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,

    /// Structured log sink. Defaults to `<state_dir>/cc-glm.jsonl` when unset.
    pub file: Option<PathBuf>,
}

/// `[logging]` section as written in the config file.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileLogging {
    pub level: Option<LogLevel>,
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    pub(crate) fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        Self {
            level: file.level.unwrap_or_default(),
            file: file.file,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signature store
// ─────────────────────────────────────────────────────────────────────────────

const DEFAULT_SIGNATURE_STORE_SIZE: usize = 1000;
const MAX_SIGNATURE_STORE_SIZE: usize = 100_000;

/// Capacity of the thinking-signature LRU.
#[derive(Debug, Clone, Copy)]
pub struct SignatureStoreConfig {
    pub max_size: usize,
}

impl Default for SignatureStoreConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_SIGNATURE_STORE_SIZE,
        }
    }
}

/// `[signature_store]` section as written in the config file.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileSignatureStore {
    pub max_size: Option<i64>,
}

impl SignatureStoreConfig {
    /// Out-of-range, zero, or negative values fall back to the default
    /// rather than erroring; a misconfigured cache size should not stop
    /// the proxy.
    pub(crate) fn from_file(file: Option<FileSignatureStore>) -> Self {
        let requested = file.and_then(|f| f.max_size);
        let max_size = match requested {
            Some(n) if n >= 1 && n <= MAX_SIGNATURE_STORE_SIZE as i64 => n as usize,
            Some(_) => DEFAULT_SIGNATURE_STORE_SIZE,
            None => DEFAULT_SIGNATURE_STORE_SIZE,
        };
        Self { max_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_store_rejects_out_of_range_sizes() {
        for bad in [0i64, -5, 100_001, i64::MAX] {
            let c = SignatureStoreConfig::from_file(Some(FileSignatureStore {
                max_size: Some(bad),
            }));
            assert_eq!(c.max_size, 1000, "size {} should fall back", bad);
        }
    }

    #[test]
    fn signature_store_accepts_valid_sizes() {
        let c = SignatureStoreConfig::from_file(Some(FileSignatureStore { max_size: Some(50) }));
        assert_eq!(c.max_size, 50);
    }

    #[test]
    fn log_level_deserializes_lowercase() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            level: LogLevel,
        }
        let w: Wrapper = toml::from_str("level = \"warn\"").unwrap();
        assert_eq!(w.level, LogLevel::Warn);
    }
}
