//! Singleton lifecycle tunables
//!
//! These govern the detached server's start/stop protocol: how long a
//! starter waits for the port, how long the quiet window is before the
//! server is stopped, and where the PID file, lock directory, and log live.

use serde::Deserialize;
use std::path::PathBuf;

/// Inclusive bound on the shutdown grace window, seconds.
const MAX_STOP_GRACE_SECONDS: u64 = 300;

/// Inclusive bounds on the startup wait, seconds.
const MIN_START_WAIT_SECONDS: u64 = 1;
const MAX_START_WAIT_SECONDS: u64 = 60;

/// Lifecycle configuration, range-clamped at load.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Quiet window between client exit and server shutdown. Zero stops
    /// immediately.
    pub stop_grace_seconds: u64,

    /// Deadline for the port to come up after a start.
    pub start_wait_seconds: u64,

    /// Directory holding `proxy.pid`, `lock/`, `proxy.log`, and the
    /// structured log file.
    pub state_dir: PathBuf,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_grace_seconds: 8,
            start_wait_seconds: 8,
            state_dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".cc-glm"))
        .unwrap_or_else(|| PathBuf::from(".cc-glm"))
}

/// `[lifecycle]` section as written in the config file.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileLifecycle {
    pub stop_grace_seconds: Option<u64>,
    pub start_wait_seconds: Option<u64>,
    pub state_dir: Option<PathBuf>,
}

impl LifecycleConfig {
    pub(crate) fn from_file(file: Option<FileLifecycle>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let stop_grace_seconds = file
            .stop_grace_seconds
            .unwrap_or(defaults.stop_grace_seconds)
            .min(MAX_STOP_GRACE_SECONDS);

        let start_wait_seconds = file
            .start_wait_seconds
            .unwrap_or(defaults.start_wait_seconds)
            .clamp(MIN_START_WAIT_SECONDS, MAX_START_WAIT_SECONDS);

        let state_dir = file.state_dir.unwrap_or(defaults.state_dir);

        Self {
            stop_grace_seconds,
            start_wait_seconds,
            state_dir,
        }
    }
}
