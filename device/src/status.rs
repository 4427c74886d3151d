use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::ConnectionState;

/// Snapshot for the admin UI: where the node is and what last went wrong.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub state: String,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub connection: ConnectionState,
    pub last_capture_at: Option<DateTime<FixedOffset>>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceStatus {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
