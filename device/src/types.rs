use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Sensor resolution tiers, numbered like the camera driver's frame size codes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "i64", into = "u8")]
pub enum FrameSize {
    R96x96,
    Qqvga,
    Qcif,
    Hqvga,
    R240x240,
    Qvga,
    Cif,
    Hvga,
    Vga,
    Svga,
    Xga,
    Hd,
    Sxga,
    Uxga,
}

impl FrameSize {
    const ALL: [FrameSize; 14] = [
        FrameSize::R96x96,
        FrameSize::Qqvga,
        FrameSize::Qcif,
        FrameSize::Hqvga,
        FrameSize::R240x240,
        FrameSize::Qvga,
        FrameSize::Cif,
        FrameSize::Hvga,
        FrameSize::Vga,
        FrameSize::Svga,
        FrameSize::Xga,
        FrameSize::Hd,
        FrameSize::Sxga,
        FrameSize::Uxga,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Width and height in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            FrameSize::R96x96 => (96, 96),
            FrameSize::Qqvga => (160, 120),
            FrameSize::Qcif => (176, 144),
            FrameSize::Hqvga => (240, 176),
            FrameSize::R240x240 => (240, 240),
            FrameSize::Qvga => (320, 240),
            FrameSize::Cif => (400, 296),
            FrameSize::Hvga => (480, 320),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Hd => (1280, 720),
            FrameSize::Sxga => (1280, 1024),
            FrameSize::Uxga => (1600, 1200),
        }
    }
}

impl TryFrom<i64> for FrameSize {
    type Error = ConfigError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        usize::try_from(code)
            .ok()
            .and_then(|i| FrameSize::ALL.get(i).copied())
            .ok_or(ConfigError::UnknownFrameSize(code))
    }
}

impl From<FrameSize> for u8 {
    fn from(size: FrameSize) -> u8 {
        size.code()
    }
}

/// JPEG quality on the sensor's 1..=63 scale, lower is better.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "i64", into = "u8")]
pub struct JpegQuality(u8);

impl JpegQuality {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for JpegQuality {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1..=63 => Ok(JpegQuality(value as u8)),
            _ => Err(ConfigError::QualityOutOfRange(value)),
        }
    }
}

impl Default for JpegQuality {
    fn default() -> Self {
        JpegQuality(10)
    }
}

impl From<JpegQuality> for u8 {
    fn from(q: JpegQuality) -> u8 {
        q.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "state", content = "credential_index", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting(usize),
    Connected(usize),
    /// Every credential failed in the latest round.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Pending,
    Uploaded,
    Failed(String),
}

/// One photo on its way to remote storage.
#[derive(Debug)]
pub struct CaptureRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub payload: Vec<u8>,
    pub upload_state: UploadState,
}

impl CaptureRecord {
    pub fn new(timestamp: DateTime<FixedOffset>, payload: Vec<u8>) -> Self {
        Self {
            timestamp,
            payload,
            upload_state: UploadState::Pending,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub path: String,
    pub content_sha: Option<String>,
    pub commit_sha: Option<String>,
    pub html_url: Option<String>,
    /// False when an existing file was overwritten.
    pub created: bool,
}

// Body of a contents API write.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PutContentRequest {
    pub message: String,
    pub content: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContentMetadata {
    pub path: Option<String>,
    pub sha: String,
    pub html_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitMetadata {
    pub sha: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PutContentResponse {
    pub content: Option<ContentMetadata>,
    pub commit: Option<CommitMetadata>,
}
