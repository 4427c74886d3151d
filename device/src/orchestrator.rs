//! Boot-to-sleep state machine.
//!
//! One cycle runs `Connecting → TimeSyncing → AwaitingSchedule → Capturing →
//! Uploading → Sleeping`, bailing out to `Sleeping` early whenever a step has
//! nothing to do or hits a recoverable error. Only a bad configuration or too
//! many failed captures in a row end in `Error`.

use anyhow::{bail, Result};
use chrono::{DateTime, FixedOffset, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::camera::{CameraSensor, ImageCapture};
use crate::clock::{TimeService, TimeSource};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::ConfigError;
use crate::scheduler;
use crate::status::DeviceStatus;
use crate::storage::CaptureJournal;
use crate::types::{CaptureRecord, ConnectionState, UploadState};
use crate::uploader::{content_path, ContentStore, RemoteUploader};
use crate::wifi::{NetworkConnector, WifiRadio};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalReason {
    #[error("invalid configuration: {0}")]
    InvalidConfig(ConfigError),

    #[error("{0} consecutive capture cycles failed")]
    ConsecutiveFailures(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    Booting,
    Connecting,
    TimeSyncing,
    AwaitingSchedule,
    Capturing,
    Uploading,
    Sleeping(Duration),
    Error(FatalReason),
}

impl OrchestratorState {
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorState::Booting => "booting",
            OrchestratorState::Connecting => "connecting",
            OrchestratorState::TimeSyncing => "time_syncing",
            OrchestratorState::AwaitingSchedule => "awaiting_schedule",
            OrchestratorState::Capturing => "capturing",
            OrchestratorState::Uploading => "uploading",
            OrchestratorState::Sleeping(_) => "sleeping",
            OrchestratorState::Error(_) => "error",
        }
    }

    fn ends_cycle(&self) -> bool {
        matches!(self, OrchestratorState::Sleeping(_) | OrchestratorState::Error(_))
    }
}

pub struct Orchestrator<R, T, C, S> {
    config: Config,
    credentials: CredentialStore,
    connector: NetworkConnector<R>,
    clock: TimeService<T>,
    camera: ImageCapture<C>,
    uploader: RemoteUploader<S>,
    journal: CaptureJournal,
    state: OrchestratorState,
    // At most one capture is in flight, owned here until it resolves.
    pending: Option<CaptureRecord>,
    cycle_id: Uuid,
    last_capture: Option<DateTime<FixedOffset>>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl<R, T, C, S> Orchestrator<R, T, C, S>
where
    R: WifiRadio,
    T: TimeSource,
    C: CameraSensor,
    S: ContentStore,
{
    pub fn new(
        config: Config,
        radio: R,
        time_source: T,
        sensor: C,
        store: S,
        journal: CaptureJournal,
    ) -> Self {
        let credentials = CredentialStore::new(config.wifi.clone(), config.device.clone());
        let tuning = config.tuning;
        Self {
            credentials,
            connector: NetworkConnector::new(radio, tuning.connect_timeout()),
            clock: TimeService::new(time_source, tuning.ntp_timeout()),
            camera: ImageCapture::new(sensor),
            uploader: RemoteUploader::new(store),
            journal,
            config,
            state: OrchestratorState::Booting,
            pending: None,
            cycle_id: Uuid::nil(),
            last_capture: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn connection(&self) -> ConnectionState {
        self.connector.state()
    }

    pub fn journal(&self) -> &CaptureJournal {
        &self.journal
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            state: self.state.name().to_string(),
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
            connection: self.connector.state(),
            last_capture_at: self.last_capture,
            updated_at: Utc::now(),
        }
    }

    /// Advances one transition.
    pub async fn step(&mut self) -> &OrchestratorState {
        let next = match self.state.clone() {
            OrchestratorState::Booting => self.boot(),
            OrchestratorState::Connecting => self.connect().await,
            OrchestratorState::TimeSyncing => self.sync_time().await,
            OrchestratorState::AwaitingSchedule => self.check_schedule(),
            OrchestratorState::Capturing => self.capture().await,
            OrchestratorState::Uploading => self.upload().await,
            OrchestratorState::Sleeping(_) => OrchestratorState::Connecting,
            OrchestratorState::Error(reason) => OrchestratorState::Error(reason),
        };
        debug!(from = self.state.name(), to = next.name(), "State transition");
        self.state = next;
        &self.state
    }

    /// Steps until the node is asleep or halted. Returns every state visited,
    /// starting with the current one.
    pub async fn run_cycle(&mut self) -> Vec<OrchestratorState> {
        let mut visited = vec![self.state.clone()];
        loop {
            let state = self.step().await.clone();
            let done = state.ends_cycle();
            visited.push(state);
            if done {
                return visited;
            }
        }
    }

    /// Cycles forever, sleeping between cycles. Returns once the node halts.
    pub async fn run(&mut self, status_path: Option<PathBuf>) -> Result<()> {
        loop {
            self.run_cycle().await;

            if let Some(path) = &status_path {
                if let Err(e) = self.status().save(path) {
                    error!(error = %e, path = %path.display(), "Failed to write status file");
                }
            }

            match &self.state {
                OrchestratorState::Sleeping(duration) => {
                    info!(sleep_secs = duration.as_secs(), "Sleeping until next wake");
                    time::sleep(*duration).await;
                }
                OrchestratorState::Error(reason) => bail!("capture node halted: {reason}"),
                other => bail!("cycle ended in unexpected state {}", other.name()),
            }
        }
    }

    fn retry_later(&self) -> OrchestratorState {
        OrchestratorState::Sleeping(self.config.tuning.retry_delay())
    }

    fn boot(&mut self) -> OrchestratorState {
        if let Err(e) = self.credentials.validate().and_then(|_| self.config.validate()) {
            error!(error = %e, "Configuration rejected, halting");
            self.last_error = Some(e.to_string());
            return OrchestratorState::Error(FatalReason::InvalidConfig(e));
        }

        match self.journal.last_uploaded() {
            Ok(last) => {
                if let Some(at) = last {
                    info!(last_capture = %at, "Restored last capture from journal");
                }
                self.last_capture = last;
            }
            Err(e) => warn!(error = %e, "Could not read capture journal"),
        }

        info!(
            networks = self.credentials.ordered_credentials().len(),
            hostname = %self.credentials.device().hostname,
            "Configuration valid"
        );
        OrchestratorState::Connecting
    }

    async fn connect(&mut self) -> OrchestratorState {
        let credentials = self.credentials.ordered_credentials();
        let result = match self.connector.state() {
            ConnectionState::Disconnected => self.connector.connect(credentials).await,
            _ => self.connector.reconnect_if_dropped(credentials).await,
        };

        match result {
            Ok(_) => OrchestratorState::TimeSyncing,
            Err(e) => {
                warn!(error = %e, "No network, retrying later");
                self.last_error = Some(e.to_string());
                self.retry_later()
            }
        }
    }

    async fn sync_time(&mut self) -> OrchestratorState {
        match self.clock.synchronize(&self.config.time).await {
            Ok(()) => OrchestratorState::AwaitingSchedule,
            Err(e) if self.clock.is_synchronized() => {
                warn!(error = %e, "Time sync failed, continuing with cached time");
                self.last_error = Some(e.to_string());
                OrchestratorState::AwaitingSchedule
            }
            Err(e) => {
                warn!(error = %e, "Time sync failed and no cached time, retrying later");
                self.last_error = Some(e.to_string());
                self.retry_later()
            }
        }
    }

    fn check_schedule(&mut self) -> OrchestratorState {
        let now = match self.clock.now_local() {
            Ok(now) => now,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return self.retry_later();
            }
        };

        let schedule = &self.config.schedule;
        let last_hour = scheduler::recent_capture_hour(&now, self.last_capture.as_ref());
        if scheduler::is_capture_due(&now, schedule, last_hour) {
            info!(now = %now, "Capture due");
            return OrchestratorState::Capturing;
        }

        let delay = scheduler::next_wake_delay(&now, schedule, last_hour, self.config.tuning.max_sleep());
        debug!(now = %now, ?last_hour, sleep_secs = delay.as_secs(), "No capture due");
        OrchestratorState::Sleeping(delay)
    }

    async fn capture(&mut self) -> OrchestratorState {
        let timestamp = match self.clock.now_local() {
            Ok(now) => now,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return self.retry_later();
            }
        };
        self.cycle_id = Uuid::new_v4();

        match self.camera.capture(&self.config.image).await {
            Ok(payload) => {
                self.pending = Some(CaptureRecord::new(timestamp, payload));
                OrchestratorState::Uploading
            }
            Err(e) => {
                warn!(cycle_id = %self.cycle_id, error = %e, "Capture failed");
                let mut failed = CaptureRecord::new(timestamp, Vec::new());
                failed.upload_state = UploadState::Failed(e.to_string());
                self.journal_record(&failed, None);
                self.register_failure(e.to_string())
            }
        }
    }

    async fn upload(&mut self) -> OrchestratorState {
        let Some(mut record) = self.pending.take() else {
            warn!("Reached upload with no capture in hand");
            return self.retry_later();
        };
        let path = content_path(self.config.upload.path_prefix.as_deref(), &record.timestamp);

        let credentials = self.credentials.ordered_credentials();
        if let Err(e) = self.connector.reconnect_if_dropped(credentials).await {
            record.upload_state = UploadState::Failed(e.to_string());
            self.journal_record(&record, Some(&path));
            return self.register_failure(e.to_string());
        }

        match self
            .uploader
            .upload(&record.payload, &self.config.upload, &record.timestamp)
            .await
        {
            Ok(receipt) => {
                record.upload_state = UploadState::Uploaded;
                self.journal_record(&record, Some(&receipt.path));
                self.last_capture = Some(record.timestamp);
                self.consecutive_failures = 0;
                self.last_error = None;

                let now = self.clock.now_local().unwrap_or(record.timestamp);
                let last_hour = scheduler::recent_capture_hour(&now, self.last_capture.as_ref());
                OrchestratorState::Sleeping(scheduler::next_wake_delay(
                    &now,
                    &self.config.schedule,
                    last_hour,
                    self.config.tuning.max_sleep(),
                ))
            }
            Err(e) => {
                record.upload_state = UploadState::Failed(e.to_string());
                self.journal_record(&record, Some(&path));
                self.register_failure(e.to_string())
            }
        }
    }

    fn register_failure(&mut self, reason: String) -> OrchestratorState {
        self.consecutive_failures += 1;
        self.last_error = Some(reason);

        if self.consecutive_failures >= self.config.tuning.failure_cap {
            error!(failures = self.consecutive_failures, "Too many consecutive failures, halting");
            return OrchestratorState::Error(FatalReason::ConsecutiveFailures(self.consecutive_failures));
        }
        warn!(failures = self.consecutive_failures, "Cycle failed, retrying later");
        self.retry_later()
    }

    fn journal_record(&self, record: &CaptureRecord, path: Option<&str>) {
        if let Err(e) = self.journal.record(self.cycle_id, record, path) {
            error!(error = %e, "Failed to journal capture");
        }
    }
}
