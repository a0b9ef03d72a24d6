use std::time::Duration;

use citegen_core::NetworkConfig;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, ScienceError};

/// What to do when a server answers "slow down" (503 or 429).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePolicy {
    /// Sleep for the server's `Retry-After` and ask again.
    Retry,
    /// Treat the response like any other HTTP error.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Requesting { attempt: u32 },
    Throttled { attempt: u32, wait: Duration },
}

// ─── PoliteClient ────────────────────────────────────────────────────────────

/// Sequential HTTP client that pauses after every request it completes.
pub struct PoliteClient {
    client: reqwest::Client,
    politeness_delay: Duration,
    default_retry_after: Duration,
    max_throttle_retries: Option<u32>,
}

impl PoliteClient {
    pub fn new(settings: &NetworkConfig) -> Result<Self> {
        Self::with_params(
            &settings.user_agent,
            settings.politeness_delay()?,
            Duration::from_secs(settings.default_retry_after_secs),
            settings.max_throttle_retries,
        )
    }

    pub fn with_params(
        user_agent: &str,
        politeness_delay: Duration,
        default_retry_after: Duration,
        max_throttle_retries: Option<u32>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            politeness_delay,
            default_retry_after,
            max_throttle_retries,
        })
    }

    /// GETs `url` and returns the body, then waits out the politeness delay
    /// whether the request succeeded or not.
    pub async fn get(&self, url: &str, policy: ThrottlePolicy) -> Result<String> {
        let result = self.get_with_retry(url, policy).await;
        if !self.politeness_delay.is_zero() {
            sleep(self.politeness_delay).await;
        }
        result
    }

    async fn get_with_retry(&self, url: &str, policy: ThrottlePolicy) -> Result<String> {
        let mut state = FetchState::Requesting { attempt: 0 };
        loop {
            state = match state {
                FetchState::Requesting { attempt } => {
                    debug!(url, attempt, "GET");
                    let resp = self.client.get(url).send().await?;
                    let status = resp.status();

                    if is_throttled(status) && policy == ThrottlePolicy::Retry {
                        if let Some(max) = self.max_throttle_retries
                            && attempt >= max
                        {
                            return Err(ScienceError::RateLimit(url.to_string(), attempt));
                        }
                        let wait = retry_after(resp.headers()).unwrap_or(self.default_retry_after);
                        FetchState::Throttled { attempt, wait }
                    } else if !status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(ScienceError::ApiError(
                            url.to_string(),
                            format!("HTTP {}: {}", status.as_u16(), body.trim()),
                        ));
                    } else {
                        return resp.text().await.map_err(ScienceError::Http);
                    }
                }
                FetchState::Throttled { attempt, wait } => {
                    warn!(url, seconds = wait.as_secs(), "throttled, sleeping before retry");
                    sleep(wait).await;
                    FetchState::Requesting {
                        attempt: attempt + 1,
                    }
                }
            };
        }
    }
}

fn is_throttled(status: StatusCode) -> bool {
    status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS
}

/// `Retry-After` in delta-seconds form. HTTP-date values are not honored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn client(max_retries: Option<u32>) -> PoliteClient {
        PoliteClient::with_params("citegen-test", Duration::ZERO, Duration::ZERO, max_retries)
            .unwrap()
    }

    #[tokio::test]
    async fn retries_after_throttle_until_success() {
        let mut server = Server::new_async().await;
        let throttled = server
            .mock("GET", "/oai2")
            .with_status(503)
            .with_header("Retry-After", "0")
            .expect(2)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/oai2")
            .with_status(200)
            .with_body("<ok/>")
            .expect(1)
            .create_async()
            .await;

        let body = client(None)
            .get(&format!("{}/oai2", server.url()), ThrottlePolicy::Retry)
            .await
            .unwrap();

        assert_eq!(body, "<ok/>");
        throttled.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn throttle_is_fatal_without_retry_policy() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works/x")
            .with_status(503)
            .with_header("Retry-After", "0")
            .create_async()
            .await;

        let err = client(None)
            .get(&format!("{}/works/x", server.url()), ThrottlePolicy::Fail)
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::ApiError(_, ref msg) if msg.starts_with("HTTP 503")));
    }

    #[tokio::test]
    async fn retry_cap_gives_rate_limit_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/oai2")
            .with_status(429)
            .create_async()
            .await;

        let err = client(Some(2))
            .get(&format!("{}/oai2", server.url()), ThrottlePolicy::Retry)
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::RateLimit(_, 2)));
    }

    #[tokio::test]
    async fn other_http_errors_are_fatal() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("Resource not found.")
            .create_async()
            .await;

        let err = client(None)
            .get(&format!("{}/missing", server.url()), ThrottlePolicy::Retry)
            .await
            .unwrap_err();
        match err {
            ScienceError::ApiError(_, msg) => assert_eq!(msg, "HTTP 404: Resource not found."),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn politeness_delay_follows_every_request() {
        const DELAY: Duration = Duration::from_millis(150);
        let mut server = Server::new_async().await;
        let _ok = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body("fine")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;
        let client =
            PoliteClient::with_params("citegen-test", DELAY, Duration::ZERO, None).unwrap();

        let start = std::time::Instant::now();
        let body = client
            .get(&format!("{}/ok", server.url()), ThrottlePolicy::Retry)
            .await
            .unwrap();
        assert_eq!(body, "fine");
        assert!(start.elapsed() >= DELAY, "success returned after {:?}", start.elapsed());

        let start = std::time::Instant::now();
        let err = client
            .get(&format!("{}/missing", server.url()), ThrottlePolicy::Retry)
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::ApiError(..)));
        assert!(start.elapsed() >= DELAY, "failure returned after {:?}", start.elapsed());
    }

    #[test]
    fn delay_comes_from_network_settings() {
        let mut settings = NetworkConfig::default();
        settings.politeness_delay_secs = 0.5;
        let client = PoliteClient::new(&settings).unwrap();
        assert_eq!(client.politeness_delay, Duration::from_millis(500));

        settings.politeness_delay_secs = 1e20;
        assert!(matches!(
            PoliteClient::new(&settings),
            Err(ScienceError::Config(_))
        ));
    }

    #[test]
    fn retry_after_parses_seconds_only() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }
}
