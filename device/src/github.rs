use chrono::Utc;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

use crate::config::UploadTarget;
use crate::error::UploadError;
use crate::types::{ContentMetadata, PutContentRequest, PutContentResponse, UploadReceipt};
use crate::uploader::ContentStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const API_VERSION: &str = "2022-11-28";
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// GitHub repository contents API over HTTPS.
pub struct GithubClient {
    client: Client,
}

impl GithubClient {
    pub fn new(user_agent: &str) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    fn request(
        &self,
        method: reqwest::Method,
        target: &UploadTarget,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, UploadError> {
        Ok(self
            .client
            .request(method, contents_url(target, path)?)
            .header(AUTHORIZATION, format!("Bearer {}", target.auth_token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION))
    }
}

/// `{api}/repos/{owner}/{repo}/contents/{path}`, each segment percent-encoded.
pub fn contents_url(target: &UploadTarget, path: &str) -> Result<Url, UploadError> {
    let mut url = Url::parse(&target.api_base_url)
        .map_err(|e| UploadError::InvalidTarget(format!("api_base_url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| UploadError::InvalidTarget("api_base_url cannot carry a path".into()))?
        .pop_if_empty()
        .extend([
            "repos",
            target.owner.as_str(),
            target.repository.as_str(),
            "contents",
        ])
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url)
}

/// Maps a non-success response onto the upload failure taxonomy.
pub fn classify_error(status: StatusCode, headers: &HeaderMap, body: &str, now_unix: i64) -> UploadError {
    if let Some(wait) = rate_limit_wait(status, headers, now_unix) {
        return UploadError::RateLimited(wait);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UploadError::AuthRejected,
        StatusCode::CONFLICT => UploadError::Conflict,
        s if s.is_server_error() => UploadError::NetworkTransient(format!("server returned {s}")),
        s => UploadError::Rejected {
            status: s.as_u16(),
            message: error_message(body),
        },
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn rate_limit_wait(status: StatusCode, headers: &HeaderMap, now_unix: i64) -> Option<Duration> {
    let retry_after = header_i64(headers, "retry-after");
    let exhausted = header_i64(headers, "x-ratelimit-remaining") == Some(0);
    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && (retry_after.is_some() || exhausted));
    if !limited {
        return None;
    }

    let secs = retry_after.or_else(|| header_i64(headers, "x-ratelimit-reset").map(|reset| reset - now_unix));
    Some(match secs {
        Some(s) => Duration::from_secs(s.max(1) as u64),
        None => DEFAULT_RATE_LIMIT_WAIT,
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

async fn error_from_response(response: reqwest::Response) -> UploadError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    classify_error(status, &headers, &body, Utc::now().timestamp())
}

impl ContentStore for GithubClient {
    async fn fetch_revision(
        &self,
        target: &UploadTarget,
        path: &str,
    ) -> Result<Option<String>, UploadError> {
        let response = self
            .request(reqwest::Method::GET, target, path)?
            .query(&[("ref", target.branch.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let metadata: ContentMetadata = response.json().await?;
        Ok(Some(metadata.sha))
    }

    async fn put_content(
        &self,
        target: &UploadTarget,
        path: &str,
        request: &PutContentRequest,
    ) -> Result<UploadReceipt, UploadError> {
        let response = self
            .request(reqwest::Method::PUT, target, path)?
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let body: PutContentResponse = response.json().await?;
        let content = body.content;
        Ok(UploadReceipt {
            path: content
                .as_ref()
                .and_then(|c| c.path.clone())
                .unwrap_or_else(|| path.to_string()),
            content_sha: content.as_ref().map(|c| c.sha.clone()),
            commit_sha: body.commit.map(|c| c.sha),
            html_url: content.and_then(|c| c.html_url),
            created: status == StatusCode::CREATED,
        })
    }
}
