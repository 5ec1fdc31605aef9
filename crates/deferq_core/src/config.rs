//! # Queue Configuration
//!
//! The queue has one tunable: the capacity of the shared arena, in KiB.
//! It is read once when the queue is constructed.
//!
//! Sources, in the order a host usually layers them:
//!
//! - [`QueueConfig::default`]: 4096 KiB
//! - a TOML document with a `[message_queue]` table
//! - the `DEFERQ_MAX_SIZE_KB` environment variable
//!
//! ```toml
//! [message_queue]
//! max_size_kb = 8192
//! ```

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};

/// Default arena capacity in KiB.
pub const DEFAULT_QUEUE_SIZE_KB: usize = 4096;

/// Sizes below this still work but are likely to overflow in a real frame.
pub const RECOMMENDED_MIN_SIZE_KB: usize = 1024;

/// Environment variable overriding [`QueueConfig::max_size_kb`].
pub const MAX_SIZE_ENV: &str = "DEFERQ_MAX_SIZE_KB";

/// Configuration for a [`DeferredQueue`](crate::DeferredQueue).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Shared arena capacity in KiB.
    pub max_size_kb: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_size_kb: DEFAULT_QUEUE_SIZE_KB }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    message_queue: QueueConfig,
}

impl QueueConfig {
    /// Creates a configuration with the given capacity in KiB.
    #[must_use]
    pub const fn with_size_kb(max_size_kb: usize) -> Self {
        Self { max_size_kb }
    }

    /// Arena capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity_bytes(&self) -> usize {
        self.max_size_kb.saturating_mul(1024)
    }

    /// Parses the `[message_queue]` table of a TOML document.
    ///
    /// A document without the table yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] on malformed TOML or a value
    /// that fails [`validate`](Self::validate).
    pub fn from_toml_str(content: &str) -> QueueResult<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| QueueError::InvalidConfig(e.to_string()))?;
        file.message_queue.validate()?;
        Ok(file.message_queue)
    }

    /// Loads the `[message_queue]` table from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if the file cannot be read or
    /// parsed.
    pub fn from_toml_file(path: &Path) -> QueueResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QueueError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Builds a configuration from the environment.
    ///
    /// Environment variables:
    /// - `DEFERQ_MAX_SIZE_KB`: arena capacity in KiB
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if the variable is set but is
    /// not a positive integer.
    pub fn from_env() -> QueueResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies environment overrides on top of `self`.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn with_env_overrides(mut self) -> QueueResult<Self> {
        if let Ok(raw) = env::var(MAX_SIZE_ENV) {
            self.max_size_kb = raw.trim().parse::<usize>().map_err(|e| {
                QueueError::InvalidConfig(format!("{MAX_SIZE_ENV}={raw:?}: {e}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] for a zero capacity.
    pub fn validate(&self) -> QueueResult<()> {
        if self.max_size_kb == 0 {
            return Err(QueueError::InvalidConfig("max_size_kb must be greater than zero".into()));
        }
        if self.max_size_kb < RECOMMENDED_MIN_SIZE_KB {
            tracing::warn!(
                max_size_kb = self.max_size_kb,
                recommended = RECOMMENDED_MIN_SIZE_KB,
                "message queue capacity below recommended minimum"
            );
        }
        Ok(())
    }
}
