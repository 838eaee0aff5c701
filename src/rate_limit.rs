use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::{HeaderMap, StatusCode, Uri};
use octocrab::Octocrab;
use octocrab::service::middleware::retry::RetryConfig;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

use crate::constants;
use crate::errors::ReconcileError;

/// Retry and backoff limits for GitHub API requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, first try included.
    pub max_attempts: u32,
    /// Delay after the first transient failure; doubles per attempt.
    pub base_delay: Duration,
    /// Cap for a single backoff delay.
    pub max_delay: Duration,
    /// Pause used when a rate-limit response carries no reset hint.
    pub rate_limit_wait: Duration,
    /// Cap for any rate-limit pause.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::retry::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(constants::retry::BASE_DELAY_MS),
            max_delay: Duration::from_millis(constants::retry::MAX_DELAY_MS),
            rate_limit_wait: Duration::from_secs(constants::retry::RATE_LIMIT_WAIT_SECS),
            max_rate_limit_wait: Duration::from_secs(constants::retry::MAX_RATE_LIMIT_WAIT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given (1-based) failed attempt, plus up to
    /// 50% random jitter, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        let jitter_ms = (delay.as_millis() as u64) / 2;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        (delay + jitter).min(self.max_delay)
    }

    /// How long to pause after a rate-limit response.
    ///
    /// `retry-after` wins, then `x-ratelimit-reset` (epoch seconds) relative to
    /// `now_epoch_secs`, then the configured default. Always capped.
    pub fn rate_limit_wait(&self, headers: &HeaderMap, now_epoch_secs: u64) -> Duration {
        let wait = if let Some(secs) = header_u64(headers, constants::api::RETRY_AFTER_HEADER) {
            Duration::from_secs(secs)
        } else if let Some(reset) = header_u64(headers, constants::api::RATE_LIMIT_RESET_HEADER) {
            Duration::from_secs(reset.saturating_sub(now_epoch_secs))
        } else {
            self.rate_limit_wait
        };
        wait.min(self.max_rate_limit_wait)
    }
}

/// HTTP verbs used against the GitHub REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
    Delete,
}

/// A successful (2xx) response.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ReconcileError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Success,
    RateLimited,
    Transient,
    Rejected,
}

/// GitHub API client with retry, backoff and shared rate-limit pausing.
///
/// Clones share the same pause deadline, so a rate limit observed by one
/// worker holds back every other worker until the reset.
#[derive(Clone)]
pub struct RateLimitedClient {
    octocrab: Octocrab,
    policy: RetryPolicy,
    paused_until: Arc<Mutex<Option<Instant>>>,
}

impl RateLimitedClient {
    /// Create a client for `base_uri` (GitHub.com when `None`).
    pub fn new(token: String, base_uri: Option<&str>, policy: RetryPolicy) -> Result<Self, ReconcileError> {
        let octocrab = Octocrab::builder()
            .personal_token(token)
            .add_retry_config(RetryConfig::None)
            .base_uri(base_uri.unwrap_or(constants::api::DEFAULT_BASE_URI))?
            .build()?;
        Ok(Self::with_octocrab(octocrab, policy))
    }

    /// Wrap an existing Octocrab instance. Its own retry layer should be disabled.
    pub fn with_octocrab(octocrab: Octocrab, policy: RetryPolicy) -> Self {
        Self {
            octocrab,
            policy,
            paused_until: Arc::new(Mutex::new(None)),
        }
    }

    /// Lazily page through a list endpoint. No request is made until the first
    /// [`Pages::next_page`] call.
    pub fn get(&self, path: &str, params: &[(&str, &str)]) -> Pages<'_> {
        Pages {
            client: self,
            next: Some(first_page(path, params)),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ReconcileError> {
        self.send(Method::Get, path, None::<&()>).await?.json()
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<StatusCode, ReconcileError> {
        Ok(self.send(Method::Put, path, Some(body)).await?.status)
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<StatusCode, ReconcileError> {
        Ok(self.send(Method::Post, path, Some(body)).await?.status)
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<StatusCode, ReconcileError> {
        Ok(self.send(Method::Patch, path, Some(body)).await?.status)
    }

    pub async fn delete(&self, path: &str) -> Result<StatusCode, ReconcileError> {
        Ok(self.send(Method::Delete, path, None::<&()>).await?.status)
    }

    /// Issue one request, retrying retryable failures.
    ///
    /// 429, 5xx, rate-limited 403s and transport errors are retried up to
    /// `max_attempts` in total; any other non-2xx status fails immediately
    /// with `RequestRejected`, and a request that cannot be built fails
    /// immediately with `InvalidRequest`.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse, ReconcileError> {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            self.wait_for_pause().await;
            debug!(?method, path, attempt, "GitHub API request");

            let response = match self.dispatch(method, path, body).await {
                Ok(response) => response,
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    warn!(?method, path, attempt, error = %e, "GitHub API request failed");
                    last_error = e.to_string();
                    self.backoff(attempt).await;
                    continue;
                }
            };

            match classify(&response) {
                Disposition::Success => return Ok(response),
                Disposition::Rejected => {
                    return Err(ReconcileError::RequestRejected {
                        status: response.status.as_u16(),
                        body: response.body,
                    });
                }
                Disposition::RateLimited => {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or_default();
                    let wait = self.policy.rate_limit_wait(&response.headers, now);
                    warn!(path, attempt, wait_secs = wait.as_secs(), "rate limited by GitHub, pausing");
                    last_error = format!("rate limited (status {})", response.status.as_u16());
                    self.pause_for(wait);
                }
                Disposition::Transient => {
                    warn!(path, attempt, status = response.status.as_u16(), "transient GitHub API error");
                    last_error = format!("status {}: {}", response.status.as_u16(), response.body);
                    self.backoff(attempt).await;
                }
            }
        }

        Err(ReconcileError::ExhaustedRetries {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }

    async fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse, ReconcileError> {
        let response = match method {
            Method::Get => self.octocrab._get(path).await?,
            Method::Put => self.octocrab._put(path, body).await?,
            Method::Post => self.octocrab._post(path, body).await?,
            Method::Patch => self.octocrab._patch(path, body).await?,
            Method::Delete => self.octocrab._delete(path, body).await?,
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = self.octocrab.body_to_string(response).await?;
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    async fn backoff(&self, attempt: u32) {
        if attempt < self.policy.max_attempts {
            sleep(self.policy.backoff_delay(attempt)).await;
        }
    }

    fn pause_for(&self, wait: Duration) {
        let until = Instant::now() + wait;
        let mut paused = self.paused_until.lock().unwrap_or_else(|p| p.into_inner());
        if paused.is_none_or(|current| current < until) {
            *paused = Some(until);
        }
    }

    async fn wait_for_pause(&self) {
        let until = *self.paused_until.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(until) = until
            && until > Instant::now()
        {
            sleep_until(until).await;
        }
    }
}

fn classify(response: &ApiResponse) -> Disposition {
    let status = response.status;
    if status.is_success() {
        return Disposition::Success;
    }
    if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limited_forbidden(response) {
        return Disposition::RateLimited;
    }
    if status.is_server_error() {
        return Disposition::Transient;
    }
    Disposition::Rejected
}

fn is_rate_limited_forbidden(response: &ApiResponse) -> bool {
    if response.status != StatusCode::FORBIDDEN {
        return false;
    }
    let exhausted = response
        .headers
        .get(constants::api::RATE_LIMIT_REMAINING_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    exhausted
        || response.headers.contains_key(constants::api::RETRY_AFTER_HEADER)
        || response.body.to_ascii_lowercase().contains("rate limit")
}

fn first_page(path: &str, params: &[(&str, &str)]) -> String {
    let mut first = format!("{}?per_page={}", path, constants::api::PER_PAGE);
    for (key, value) in params {
        first.push_str(&format!("&{}={}", urlencoding::encode(key), urlencoding::encode(value)));
    }
    first
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Cursor over the pages of one list request.
pub struct Pages<'a> {
    client: &'a RateLimitedClient,
    next: Option<String>,
}

impl Pages<'_> {
    /// Fetch the next page, or `None` once the `Link` header has no `next`.
    pub async fn next_page(&mut self) -> Result<Option<Value>, ReconcileError> {
        let Some(path) = self.next.take() else {
            return Ok(None);
        };
        let response = self.client.send(Method::Get, &path, None::<&()>).await?;
        self.next = next_link(&response.headers);
        Ok(Some(response.json()?))
    }

    /// Drain every page, collecting the array under `key` (or the page itself
    /// when the endpoint returns a bare array).
    pub async fn collect_items(mut self, key: Option<&str>) -> Result<Vec<Value>, ReconcileError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            let array = match key {
                Some(key) => page.get(key).cloned(),
                None => Some(page),
            };
            match array {
                Some(Value::Array(values)) => items.extend(values),
                _ => {
                    return Err(ReconcileError::InvalidResponse(format!(
                        "expected a list{}",
                        key.map(|k| format!(" under '{}'", k)).unwrap_or_default()
                    )));
                }
            }
        }
        Ok(items)
    }
}

/// Extract the `rel="next"` target of a `Link` header as path and query.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(http::header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == r#"rel="next""#) {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        let uri: Uri = target.parse().ok()?;
        uri.path_and_query().map(|pq| pq.as_str().to_string())
    })
}
