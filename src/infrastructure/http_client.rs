//! HTTP fetcher for static vendor pages with rate limiting and linear retry
//!
//! Network errors, 408, 429 and 5xx responses are retried; other non-2xx
//! statuses fail on the spot. `Retry-After` (seconds) stretches the wait.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::infrastructure::config::FetchConfig;
use crate::infrastructure::fetching::{FetchError, FetchRequest, FetchedPage, PageFetcher};
use crate::infrastructure::retry::{RetryDecision, RetryPolicy};

/// Why one attempt failed
#[derive(Debug)]
enum AttemptFailure {
    Status { status: u16, retry_after: Option<Duration> },
    Network(String),
    Cancelled,
}

impl AttemptFailure {
    fn decision(&self) -> RetryDecision {
        match self {
            Self::Status { status, retry_after } => {
                if is_retryable_status(*status) {
                    RetryDecision::Retry {
                        min_delay: *retry_after,
                    }
                } else {
                    RetryDecision::GiveUp
                }
            }
            Self::Network(_) => RetryDecision::Retry { min_delay: None },
            Self::Cancelled => RetryDecision::GiveUp,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Status { status, .. } => StatusCode::from_u16(*status)
                .map(|s| format!("HTTP {s}"))
                .unwrap_or_else(|_| format!("HTTP {status}")),
            Self::Network(message) => message.clone(),
            Self::Cancelled => "cancelled".to_string(),
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value).map_err(|e| FetchError::Client(format!("invalid {name} header: {e}")))
}

/// Rate-limited HTTP GET with retry
pub struct HttpFetcher {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    policy: RetryPolicy,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value("User-Agent", &config.user_agent)?);
        headers.insert(ACCEPT, header_value("Accept", &config.accept)?);
        headers.insert(ACCEPT_LANGUAGE, header_value("Accept-Language", &config.accept_language)?);

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| FetchError::Client(format!("failed to create HTTP client: {e}")))?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .ok_or_else(|| FetchError::Client("rate limit must be greater than 0".to_string()))?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            policy: RetryPolicy::new(config.max_retries.max(1), config.backoff_base()),
            config,
        })
    }

    /// Override the retry policy derived from the configuration
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn attempt(&self, url: &str, cancel: &CancellationToken) -> Result<FetchedPage, AttemptFailure> {
        tokio::select! {
            () = self.rate_limiter.until_ready() => {},
            () = cancel.cancelled() => return Err(AttemptFailure::Cancelled),
        }

        let response = tokio::select! {
            result = self.client.get(url).send() => {
                result.map_err(|e| AttemptFailure::Network(e.to_string()))?
            },
            () = cancel.cancelled() => {
                warn!("🛑 HTTP request cancelled for URL: {}", url);
                return Err(AttemptFailure::Cancelled);
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure::Status {
                status: status.as_u16(),
                retry_after: retry_after(response.headers()),
            });
        }
        let final_url = response.url().to_string();

        let html = tokio::select! {
            result = response.text() => {
                result.map_err(|e| AttemptFailure::Network(format!("failed to read body: {e}")))?
            },
            () = cancel.cancelled() => {
                warn!("🛑 Response reading cancelled for URL: {}", url);
                return Err(AttemptFailure::Cancelled);
            }
        };

        debug!("Fetched {} ({} bytes)", final_url, html.len());
        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            html,
            api_responses: Vec::new(),
            rendered_blocks: Vec::new(),
        })
    }

    /// GET `url`, retrying with linear backoff.
    pub async fn get_page(&self, url: &str, cancel: &CancellationToken) -> Result<FetchedPage, FetchError> {
        let mut last_status = None;

        for attempt in 1..=self.policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            info!("Fetching {} (attempt {}/{})", url, attempt, self.policy.max_attempts);

            let failure = match self.attempt(url, cancel).await {
                Ok(page) => return Ok(page),
                Err(AttemptFailure::Cancelled) => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
                Err(failure) => failure,
            };

            if let AttemptFailure::Status { status, .. } = &failure {
                last_status = Some(*status);
            }
            let last_error = failure.describe();
            warn!("Attempt {} for {} failed: {}", attempt, url, last_error);

            let min_delay = match failure.decision() {
                RetryDecision::Retry { min_delay } if self.policy.has_attempts_after(attempt) => min_delay,
                _ => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last_status,
                        last_error,
                    });
                }
            };

            if !self.policy.backoff(attempt, min_delay, cancel).await {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.policy.max_attempts,
            last_status,
            last_error: "no attempts configured".to_string(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedPage, FetchError> {
        self.get_page(&request.url, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `responses` in order (the last one repeats) and counts requests.
    async fn serve(responses: Vec<&'static str>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let response = responses[index.min(responses.len() - 1)];
                let mut buffer = [0u8; 4096];
                let _ = socket.read(&mut buffer).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{address}/harga-emas"), hits)
    }

    const OK: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 17\r\nConnection: close\r\n\r\n<table>ok</table>";
    const UNAVAILABLE: &str = "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    fn fetcher() -> HttpFetcher {
        let config = FetchConfig {
            max_requests_per_second: 100,
            ..FetchConfig::default()
        };
        HttpFetcher::new(config)
            .unwrap()
            .with_policy(RetryPolicy::new(3, Duration::from_millis(10)))
    }

    #[test]
    fn test_status_classification() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(403));
    }

    #[tokio::test]
    async fn test_http_fetcher_creation() {
        assert!(HttpFetcher::new(FetchConfig::default()).is_ok());
        let invalid = FetchConfig {
            max_requests_per_second: 0,
            ..FetchConfig::default()
        };
        assert!(matches!(HttpFetcher::new(invalid), Err(FetchError::Client(_))));
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let (url, hits) = serve(vec![UNAVAILABLE, UNAVAILABLE, OK]).await;
        let page = fetcher().get_page(&url, &CancellationToken::new()).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(page.status, 200);
        assert!(page.html.contains("<table>ok</table>"));
    }

    #[tokio::test]
    async fn test_exhausted_after_max_attempts() {
        let (url, hits) = serve(vec![UNAVAILABLE]).await;
        let error = fetcher().get_page(&url, &CancellationToken::new()).await.unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        match error {
            FetchError::Exhausted { attempts, last_status, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_status, Some(503));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (url, hits) = serve(vec![NOT_FOUND]).await;
        let error = fetcher().get_page(&url, &CancellationToken::new()).await.unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(matches!(error, FetchError::Exhausted { attempts: 1, last_status: Some(404), .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = fetcher()
            .get_page("http://127.0.0.1:9/never", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::Cancelled { .. }));
    }
}
