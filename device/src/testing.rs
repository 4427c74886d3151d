//! Shared fixtures for unit tests.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::clock::TimeSource;
use crate::config::{
    Config, DeviceIdentity, ImageConfig, RuntimeTuning, ScheduleConfig, TimeConfig, UploadTarget,
    WifiCredential,
};
use crate::error::{TimeError, UploadError};
use crate::types::{PutContentRequest, UploadReceipt};
use crate::uploader::ContentStore;

pub fn sample_config() -> Config {
    Config {
        wifi: vec![
            WifiCredential::new("SSID1", "PASSWORD1"),
            WifiCredential::new("SSID2", "PASSWORD2"),
        ],
        device: DeviceIdentity {
            admin_password: "admin".into(),
            hostname: "esp32-cam-security".into(),
        },
        upload: UploadTarget {
            auth_token: "ghp_secret".into(),
            owner: "someone".into(),
            repository: "security-camera-images".into(),
            branch: "main".into(),
            path_prefix: None,
            api_base_url: "https://api.github.com".into(),
        },
        time: TimeConfig {
            utc_offset_seconds: 19_800,
            dst_offset_seconds: 0,
            ntp_host: "pool.ntp.org".into(),
        },
        schedule: ScheduleConfig::default(),
        image: ImageConfig::default(),
        tuning: RuntimeTuning::default(),
    }
}

#[derive(Debug, Default)]
struct ClockState {
    utc: Option<DateTime<Utc>>,
    hanging: bool,
}

/// Time source that answers with whatever time the test sets.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<Mutex<ClockState>>);

impl ManualClock {
    pub fn at(utc: DateTime<Utc>) -> Self {
        let clock = Self::default();
        clock.set(utc);
        clock
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn set(&self, utc: DateTime<Utc>) {
        self.0.lock().unwrap().utc = Some(utc);
    }

    pub fn set_hanging(&self, hanging: bool) {
        self.0.lock().unwrap().hanging = hanging;
    }
}

impl TimeSource for ManualClock {
    async fn fetch_utc(&self, _host: &str) -> Result<DateTime<Utc>, TimeError> {
        let (utc, hanging) = {
            let state = self.0.lock().unwrap();
            (state.utc, state.hanging)
        };
        if hanging {
            std::future::pending::<()>().await;
        }
        utc.ok_or_else(|| TimeError::Protocol("host unreachable".into()))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    revisions: VecDeque<Result<Option<String>, UploadError>>,
    puts: VecDeque<Result<UploadReceipt, UploadError>>,
    revision_lookups: usize,
    put_log: Vec<(String, PutContentRequest)>,
}

/// Content store that replays queued responses, then succeeds.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStore(Arc<Mutex<StoreState>>);

impl ScriptedStore {
    pub fn receipt(path: &str, created: bool) -> UploadReceipt {
        UploadReceipt {
            path: path.to_string(),
            content_sha: Some("content-sha".into()),
            commit_sha: Some("commit-sha".into()),
            html_url: None,
            created,
        }
    }

    pub fn push_revision(&self, response: Result<Option<String>, UploadError>) {
        self.0.lock().unwrap().revisions.push_back(response);
    }

    pub fn push_put(&self, response: Result<UploadReceipt, UploadError>) {
        self.0.lock().unwrap().puts.push_back(response);
    }

    pub fn puts(&self) -> Vec<(String, PutContentRequest)> {
        self.0.lock().unwrap().put_log.clone()
    }

    pub fn revision_lookups(&self) -> usize {
        self.0.lock().unwrap().revision_lookups
    }
}

impl ContentStore for ScriptedStore {
    async fn fetch_revision(
        &self,
        _target: &UploadTarget,
        _path: &str,
    ) -> Result<Option<String>, UploadError> {
        let mut state = self.0.lock().unwrap();
        state.revision_lookups += 1;
        state.revisions.pop_front().unwrap_or(Ok(None))
    }

    async fn put_content(
        &self,
        _target: &UploadTarget,
        path: &str,
        request: &PutContentRequest,
    ) -> Result<UploadReceipt, UploadError> {
        let mut state = self.0.lock().unwrap();
        state.put_log.push((path.to_string(), request.clone()));
        state
            .puts
            .pop_front()
            .unwrap_or_else(|| Ok(Self::receipt(path, request.sha.is_none())))
    }
}
