//! Delivery of captures to the remote repository.
//!
//! Each attempt is a read (to learn the current revision marker, if any)
//! followed by a create-or-update write. Failures are retried per class:
//! rate limits once (unless the requested wait exceeds the cap), revision
//! conflicts twice, transient network failures with exponential backoff.
//! Everything else is surfaced immediately.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset};
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

use crate::config::UploadTarget;
use crate::error::UploadError;
use crate::types::{PutContentRequest, UploadReceipt};

/// Remote "contents" API: revision lookup and create/update.
pub trait ContentStore {
    /// Current revision marker of `path`, or `None` when the file does not exist.
    async fn fetch_revision(
        &self,
        target: &UploadTarget,
        path: &str,
    ) -> Result<Option<String>, UploadError>;

    async fn put_content(
        &self,
        target: &UploadTarget,
        path: &str,
        request: &PutContentRequest,
    ) -> Result<UploadReceipt, UploadError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub rate_limit_retries: u32,
    pub conflict_retries: u32,
    pub transient_attempts: u32,
    pub backoff_base: Duration,
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_retries: 1,
            conflict_retries: 2,
            transient_attempts: 3,
            backoff_base: Duration::from_secs(2),
            max_rate_limit_wait: Duration::from_secs(300),
        }
    }
}

/// `[prefix/]YYYY/MM/DD/HHMMSS.jpg`
pub fn content_path(prefix: Option<&str>, timestamp: &DateTime<FixedOffset>) -> String {
    let name = timestamp.format("%Y/%m/%d/%H%M%S.jpg").to_string();
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{name}"),
        None => name,
    }
}

pub fn commit_message(timestamp: &DateTime<FixedOffset>) -> String {
    format!("Security camera capture {}", timestamp.format("%Y-%m-%d %H:%M:%S"))
}

pub struct RemoteUploader<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S: ContentStore> RemoteUploader<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub async fn upload(
        &self,
        payload: &[u8],
        target: &UploadTarget,
        timestamp: &DateTime<FixedOffset>,
    ) -> Result<UploadReceipt, UploadError> {
        target
            .validate()
            .map_err(|e| UploadError::InvalidTarget(e.to_string()))?;

        let path = content_path(target.path_prefix.as_deref(), timestamp);
        let mut request = PutContentRequest {
            message: commit_message(timestamp),
            content: STANDARD.encode(payload),
            branch: target.branch.clone(),
            sha: None,
        };

        let mut rate_limit_retries = 0;
        let mut conflict_retries = 0;
        let mut transient_failures = 0;

        loop {
            let outcome = match self.store.fetch_revision(target, &path).await {
                Ok(sha) => {
                    request.sha = sha;
                    self.store.put_content(target, &path, &request).await
                }
                Err(e) => Err(e),
            };

            let e = match outcome {
                Ok(receipt) => {
                    info!(
                        path = %receipt.path,
                        bytes = payload.len(),
                        created = receipt.created,
                        "Capture uploaded"
                    );
                    return Ok(receipt);
                }
                Err(e) => e,
            };

            let retry_in = if !e.is_retryable() {
                None
            } else {
                match &e {
                    // Waits beyond the cap are surfaced, never shortened.
                    UploadError::RateLimited(after)
                        if rate_limit_retries < self.policy.rate_limit_retries
                            && *after <= self.policy.max_rate_limit_wait =>
                    {
                        rate_limit_retries += 1;
                        Some(*after)
                    }
                    UploadError::Conflict if conflict_retries < self.policy.conflict_retries => {
                        conflict_retries += 1;
                        Some(Duration::ZERO)
                    }
                    UploadError::NetworkTransient(_) => {
                        transient_failures += 1;
                        (transient_failures < self.policy.transient_attempts)
                            .then(|| self.policy.backoff_base * 2u32.pow(transient_failures - 1))
                    }
                    _ => None,
                }
            };

            match retry_in {
                Some(delay) => {
                    warn!(path = %path, error = %e, delay_ms = delay.as_millis() as u64, "Upload failed, retrying");
                    if !delay.is_zero() {
                        time::sleep(delay).await;
                    }
                }
                None => {
                    error!(path = %path, error = %e, "Upload failed");
                    return Err(e);
                }
            }
        }
    }
}
