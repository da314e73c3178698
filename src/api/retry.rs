use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::api::auth::TokenManager;
use crate::api::rate_limit::RateLimiter;
use crate::date_util::{millis_until, parse_http_date};
use crate::error::{Error, Result};

/// Retry budgets and backoff timings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts for anything other than 429 (default: 3).
    pub max_attempts: u32,
    /// 429 responses tolerated before giving up (default: 10).
    pub max_throttled: u32,
    /// Base wait for every backoff (default: 30s).
    pub base_wait: Duration,
    /// Extra random wait range in ms for 409/423 (default: 200..800).
    pub contention_jitter_ms: (u64, u64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_throttled: 10,
            base_wait: Duration::from_secs(30),
            contention_jitter_ms: (200, 800),
        }
    }
}

impl RetryPolicy {
    /// Same budgets with millisecond waits.
    pub fn for_testing() -> Self {
        Self {
            base_wait: Duration::from_millis(5),
            contention_jitter_ms: (0, 5),
            ..Default::default()
        }
    }

    pub fn with_base_wait(mut self, base_wait: Duration) -> Self {
        self.base_wait = base_wait;
        self
    }

    /// `base * 2^(attempt-1)` for 5xx and transport failures; `attempt` is 1-based.
    pub fn exponential_backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_wait.saturating_mul(1u32 << exp)
    }

    /// `base + random(jitter)` for lock contention (409/423).
    pub fn contention_backoff(&self) -> Duration {
        let (lo, hi) = self.contention_jitter_ms;
        let jitter = if hi > lo {
            rand::rng().random_range(lo..hi)
        } else {
            lo
        };
        self.base_wait + Duration::from_millis(jitter)
    }

    /// Wait for a 429, honouring `Retry-After` when it parses.
    pub fn throttle_backoff(&self, retry_after: Option<&str>) -> Duration {
        retry_after
            .and_then(|v| parse_retry_after(v, Utc::now(), self.base_wait))
            .unwrap_or(self.base_wait)
    }
}

/// Parse a `Retry-After` value: delta-seconds, or an HTTP-date. A date in
/// the past (or closer than `floor`) waits `floor`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>, floor: Duration) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let target = parse_http_date(value)?;
    let ms = millis_until(target, now).max(floor.as_millis() as i64);
    Some(Duration::from_millis(ms as u64))
}

/// What the retry loop does with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Success,
    Reauthorize,
    Contention,
    Throttled,
    ServerError,
    Fatal,
}

pub fn classify(status: StatusCode) -> StatusAction {
    match status.as_u16() {
        200..=299 => StatusAction::Success,
        401 => StatusAction::Reauthorize,
        409 | 423 => StatusAction::Contention,
        429 => StatusAction::Throttled,
        500..=599 => StatusAction::ServerError,
        _ => StatusAction::Fatal,
    }
}

/// HTTP client wrapper that applies the retry policy and the shared rate limit.
///
/// Each attempt takes a rate-limiter permit and rebuilds its request from a
/// closure, so a token refreshed after a 401 is picked up on the next try.
/// `max_attempts` bounds everything except 429; `max_throttled` bounds 429s.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryHandler {
    pub fn new(http: reqwest::Client, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            http,
            limiter,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Interrupt backoff sleeps when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send an unauthenticated request. A 401 is returned as-is.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        self.execute(None, |http, _| build(http)).await
    }

    /// Send a request carrying the current bearer token; a 401 refreshes the
    /// token and retries.
    pub async fn send_authorized<F>(&self, tokens: &TokenManager, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        self.execute(Some(tokens), |http, token| build(http, token.unwrap_or_default()))
            .await
    }

    async fn execute<F>(&self, tokens: Option<&TokenManager>, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client, Option<&str>) -> RequestBuilder,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;
        let mut throttled: u32 = 0;
        let mut last: Option<Response> = None;

        loop {
            self.limiter.acquire().await;

            let token = match tokens {
                Some(t) => Some(t.ensure_valid().await?),
                None => None,
            };

            let response = match build(&self.http, token.as_deref()).send().await {
                Ok(r) => r,
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        log::warn!("Transport error, giving up after {attempt} attempts: {e}");
                        return last.ok_or(Error::Http(e));
                    }
                    let wait = self.policy.exponential_backoff(attempt);
                    log::warn!(
                        "Transport error. Retry in {}ms ({attempt}/{max_attempts}): {e}",
                        wait.as_millis()
                    );
                    if !self.pause(wait).await {
                        return last.ok_or(Error::Cancelled);
                    }
                    continue;
                }
            };

            let status = response.status();
            let action = match (classify(status), tokens) {
                (StatusAction::Reauthorize, None) => StatusAction::Fatal,
                (action, _) => action,
            };

            match action {
                StatusAction::Success | StatusAction::Fatal => return Ok(response),
                StatusAction::Throttled => {
                    throttled += 1;
                    if throttled >= self.policy.max_throttled {
                        log::warn!("429 Too Many Requests persisted after {throttled} responses");
                        return Ok(response);
                    }
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok());
                    let wait = self.policy.throttle_backoff(retry_after);
                    log::warn!(
                        "429 Too Many Requests. Retry in {}ms ({throttled}/{})",
                        wait.as_millis(),
                        self.policy.max_throttled
                    );
                    if !self.pause(wait).await {
                        return Ok(response);
                    }
                    last = Some(response);
                    continue;
                }
                _ => {}
            }

            attempt += 1;
            if attempt >= max_attempts {
                log::warn!("HTTP {status} after {attempt} attempts, giving up");
                return Ok(response);
            }

            let wait = match action {
                StatusAction::Reauthorize => {
                    log::warn!("401 Unauthorized, refreshing tokens ({attempt}/{max_attempts})");
                    if let (Some(tokens), Some(rejected)) = (tokens, token.as_deref()) {
                        tokens.refresh_rejected(rejected).await?;
                    }
                    last = Some(response);
                    continue;
                }
                StatusAction::Contention => {
                    let wait = self.policy.contention_backoff();
                    log::warn!("HTTP {status} (contention). Retry in {}ms", wait.as_millis());
                    wait
                }
                _ => {
                    let wait = self.policy.exponential_backoff(attempt);
                    log::warn!(
                        "HTTP {status}. Retry in {}ms ({attempt}/{max_attempts})",
                        wait.as_millis()
                    );
                    wait
                }
            };

            if !self.pause(wait).await {
                return Ok(response);
            }
            last = Some(response);
        }
    }

    /// Sleep for `wait`; returns false if cancelled first.
    async fn pause(&self, wait: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                log::warn!("Backoff interrupted, abandoning retries");
                false
            }
            _ = tokio::time::sleep(wait) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handler(policy: RetryPolicy) -> RetryHandler {
        RetryHandler::new(
            reqwest::Client::new(),
            Arc::new(RateLimiter::new(1000.0)),
            policy,
        )
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap().len()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(StatusCode::OK), StatusAction::Success);
        assert_eq!(classify(StatusCode::NO_CONTENT), StatusAction::Success);
        assert_eq!(classify(StatusCode::UNAUTHORIZED), StatusAction::Reauthorize);
        assert_eq!(classify(StatusCode::CONFLICT), StatusAction::Contention);
        assert_eq!(classify(StatusCode::LOCKED), StatusAction::Contention);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), StatusAction::Throttled);
        assert_eq!(classify(StatusCode::INTERNAL_SERVER_ERROR), StatusAction::ServerError);
        assert_eq!(classify(StatusCode::GATEWAY_TIMEOUT), StatusAction::ServerError);
        assert_eq!(classify(StatusCode::NOT_FOUND), StatusAction::Fatal);
        assert_eq!(classify(StatusCode::FORBIDDEN), StatusAction::Fatal);
        assert_eq!(classify(StatusCode::BAD_REQUEST), StatusAction::Fatal);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::default().with_base_wait(Duration::from_millis(100));
        assert_eq!(policy.exponential_backoff(1), Duration::from_millis(100));
        assert_eq!(policy.exponential_backoff(2), Duration::from_millis(200));
        assert_eq!(policy.exponential_backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_contention_backoff_range() {
        let policy = RetryPolicy::default().with_base_wait(Duration::from_millis(1000));
        for _ in 0..100 {
            let wait = policy.contention_backoff();
            assert!(wait >= Duration::from_millis(1200), "wait {wait:?}");
            assert!(wait < Duration::from_millis(1800), "wait {wait:?}");
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let now = Utc::now();
        let floor = Duration::from_millis(500);
        assert_eq!(parse_retry_after("2", now, floor), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 0 ", now, floor), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("soon", now, floor), None);
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 50).unwrap();
        let floor = Duration::from_millis(500);
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now, floor),
            Some(Duration::from_secs(10))
        );
        // A date in the past falls back to the floor
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now, floor),
            Some(floor)
        );
    }

    #[test]
    fn test_throttle_backoff_defaults_to_base() {
        let policy = RetryPolicy::default().with_base_wait(Duration::from_millis(250));
        assert_eq!(policy.throttle_backoff(None), Duration::from_millis(250));
        assert_eq!(policy.throttle_backoff(Some("garbage")), Duration::from_millis(250));
        assert_eq!(policy.throttle_backoff(Some("1")), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_success_returns_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fine"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/ok", server.uri());
        let resp = handler(RetryPolicy::for_testing())
            .send(|http| http.get(&url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "fine");
    }

    #[tokio::test]
    async fn test_server_error_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let url = server.uri();
        let resp = handler(RetryPolicy::for_testing())
            .send(|http| http.get(&url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
    }

    #[tokio::test]
    async fn test_server_error_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = server.uri();
        let resp = handler(RetryPolicy::for_testing())
            .send(|http| http.get(&url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_server_error_backoff_grows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let policy = RetryPolicy::default().with_base_wait(Duration::from_millis(40));
        let url = server.uri();
        let start = Instant::now();
        let resp = handler(policy).send(|http| http.get(&url)).await.unwrap();
        // waits 40ms then 80ms between the three attempts
        assert_eq!(resp.status(), 502);
        assert!(start.elapsed() >= Duration::from_millis(115), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let url = server.uri();
        let resp = handler(RetryPolicy::for_testing())
            .send(|http| http.get(&url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_unauthorized_without_tokens_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let url = server.uri();
        let resp = handler(RetryPolicy::for_testing())
            .send(|http| http.post(&url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn test_contention_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(409))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(423))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = server.uri();
        let resp = handler(RetryPolicy::for_testing())
            .send(|http| http.put(&url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_persistent_throttling_returns_last_429() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(10)
            .mount(&server)
            .await;

        let url = server.uri();
        let resp = handler(RetryPolicy::for_testing())
            .send(|http| http.get(&url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 429);
    }

    #[tokio::test]
    async fn test_throttling_does_not_consume_attempt_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(4)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url = server.uri();
        let resp = handler(RetryPolicy::for_testing())
            .send(|http| http.get(&url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        // four 429s plus the full three-attempt budget for 5xx
        assert_eq!(request_count(&server).await, 7);
    }

    #[tokio::test]
    async fn test_throttling_honours_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = server.uri();
        let start = Instant::now();
        let resp = handler(RetryPolicy::for_testing())
            .send(|http| http.get(&url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(start.elapsed() >= Duration::from_millis(950));
    }

    #[tokio::test]
    async fn test_transport_failure_exhausts_attempts() {
        // Bind and drop a listener so the port refuses connections
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}/");
        let policy = RetryPolicy::default().with_base_wait(Duration::from_millis(20));
        let start = Instant::now();
        let result = handler(policy).send(|http| http.get(&url)).await;
        assert!(matches!(result, Err(Error::Http(_))));
        // 20ms + 40ms of backoff between three attempts
        assert!(start.elapsed() >= Duration::from_millis(55));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default().with_base_wait(Duration::from_secs(60));
        let h = handler(policy).with_cancellation(cancel.clone());
        cancel.cancel();

        let url = server.uri();
        let start = Instant::now();
        let resp = h.send(|http| http.get(&url)).await.unwrap();
        assert_eq!(resp.status(), 500);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_before_any_response() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let h = handler(RetryPolicy::default()).with_cancellation(cancel);
        let url = format!("http://{addr}/");
        let result = h.send(|http| http.get(&url)).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
