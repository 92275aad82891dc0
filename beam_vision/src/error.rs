//! Error types for the configuration layer, the inter-camera link and frame capture.
//!
//! None of these ever escapes the per-frame core as a fatal condition: the
//! segmenter and tracker degrade to empty or unknown results, and a corrupt
//! packet is treated as "no peer data this cycle".

use std::path::PathBuf;

/// Errors raised while loading or validating a [`crate::BeamConfig`].
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Ways a telemetry packet from the peer camera can be malformed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("packet does not start with the header byte (got {found:#04x})")]
    BadHeader { found: u8 },
    #[error("blob count {count} exceeds the {max} slots of a packet")]
    BadCount { count: u8, max: usize },
    #[error("packet truncated: {len} of {expected} bytes")]
    Truncated { len: usize, expected: usize },
}

/// A frame that could not be acquired. The node loop skips the frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("frame capture failed: {reason}")]
pub struct CaptureError {
    pub reason: String,
}

impl CaptureError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
