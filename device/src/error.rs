//! Error taxonomy for the capture node.
//!
//! Each component owns its error type. The orchestrator turns these into
//! state transitions; only configuration errors and the consecutive-failure
//! escalation end in the fatal state.

use std::time::Duration;

/// Configuration problems. Fatal at boot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no WiFi credentials configured")]
    EmptyCredentialList,

    #[error("WiFi credential #{index} has an empty network name")]
    MalformedCredential { index: usize },

    #[error("upload target field `{0}` is empty")]
    IncompleteUploadTarget(&'static str),

    #[error("{field} must be within 0..=23, got {value}")]
    HourOutOfRange { field: &'static str, value: i32 },

    #[error("JPEG quality must be within 1..=63, got {0}")]
    QualityOutOfRange(i64),

    #[error("unknown frame size code {0}")]
    UnknownFrameSize(i64),

    #[error("combined UTC offset of {0} seconds is not a valid offset")]
    InvalidUtcOffset(i64),

    #[error("runtime tuning `{0}` must be greater than zero")]
    ZeroTuning(&'static str),

    #[error("environment variable {key} has unusable value {value:?}")]
    InvalidEnvValue { key: &'static str, value: String },
}

/// WiFi association failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("no credentials to try")]
    NoCredentials,

    #[error("all {attempted} WiFi credentials failed")]
    AllCredentialsExhausted { attempted: usize },
}

/// Reason a single association attempt was refused by the radio.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssociationError {
    #[error("network not found")]
    NotFound,

    #[error("association rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("time sync timed out after {0:?}")]
    SyncTimeout(Duration),

    #[error("clock has not been synchronized yet")]
    NotYetSynchronized,

    #[error("NTP protocol error: {0}")]
    Protocol(String),

    #[error("UTC offset of {0} seconds is out of range")]
    InvalidOffset(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("camera sensor busy")]
    SensorBusy,

    #[error("image encoding failed: {0}")]
    EncodeFailure(String),
}

/// Outcomes of a remote write that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("upload target incomplete: {0}")]
    InvalidTarget(String),

    #[error("authentication rejected by remote")]
    AuthRejected,

    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("revision conflict on remote file")]
    Conflict,

    #[error("transient network failure: {0}")]
    NetworkTransient(String),

    #[error("remote rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl UploadError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::RateLimited(_) | UploadError::Conflict | UploadError::NetworkTransient(_)
        )
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UploadError::Protocol(e.to_string())
        } else {
            UploadError::NetworkTransient(e.to_string())
        }
    }
}
