//! Headless browser fetch for JS-rendered vendor grids
//!
//! Each fetch owns one [`BrowserSession`]: launch, navigate, wait the settle
//! delay while recording XHR/fetch responses from the vendor's API origin,
//! capture the DOM and the in-page text blocks, then close. The session is
//! closed on every path out of [`BrowserFetcher::fetch`], including timeout
//! and cancellation.
//!
//! Requires the `browser` cargo feature; without it browser sources fail with
//! [`FetchError::BrowserUnavailable`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::infrastructure::config::BrowserConfig;
use crate::infrastructure::fetching::{FetchError, FetchRequest, FetchedPage, PageFetcher};
use crate::infrastructure::retry::RetryPolicy;

/// In-page query returning the text of outermost elements matching `selector`
/// that mention a price or a weight.
pub fn text_block_script(selector: &str) -> String {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"body\"".to_string());
    format!(
        r"(() => {{
    const sel = {quoted};
    return Array.from(document.querySelectorAll(sel))
        .filter(el => !(el.parentElement && el.parentElement.closest(sel)))
        .map(el => el.innerText || '')
        .filter(t => t.includes('Rp') || t.toLowerCase().includes('gram'));
}})()"
    )
}

/// Whether an intercepted response belongs to the vendor API
pub fn is_api_response(url: &str, api_origin: Option<&str>, is_xhr_or_fetch: bool) -> bool {
    if !is_xhr_or_fetch {
        return false;
    }
    match api_origin {
        Some(origin) => url.starts_with(origin),
        None => url.contains("api"),
    }
}

pub struct BrowserFetcher {
    config: BrowserConfig,
    policy: RetryPolicy,
}

impl BrowserFetcher {
    /// `policy` is the fetch retry policy shared with the HTTP fetcher
    pub const fn new(config: BrowserConfig, policy: RetryPolicy) -> Self {
        Self { config, policy }
    }

    pub const fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Run `attempt` until it succeeds or the policy runs out.
    ///
    /// Only `Exhausted` failures (navigation errors, timeouts) are retried;
    /// a browser that cannot be launched at all fails at once.
    async fn with_retries<F, Fut>(&self, url: &str, cancel: &CancellationToken, mut attempt: F) -> Result<FetchedPage, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<FetchedPage, FetchError>>,
    {
        let mut current = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            info!("Rendering {} (attempt {}/{})", url, current, self.policy.max_attempts);

            let (last_status, last_error) = match attempt().await {
                Ok(page) => return Ok(page),
                Err(FetchError::Exhausted { last_status, last_error, .. }) => (last_status, last_error),
                Err(e) => return Err(e),
            };
            warn!("Browser attempt {} for {} failed: {}", current, url, last_error);

            if !self.policy.has_attempts_after(current) {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: current,
                    last_status,
                    last_error,
                });
            }
            if !self.policy.backoff(current, None, cancel).await {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            current += 1;
        }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedPage, FetchError> {
        self.with_retries(&request.url, cancel, || async {
            tracing::error!("Browser rendering requested for {} but the browser feature is disabled", request.url);
            Err(FetchError::BrowserUnavailable(
                "built without the `browser` feature".to_string(),
            ))
        })
        .await
    }
}

#[cfg(feature = "browser")]
pub use session::BrowserSession;

#[cfg(feature = "browser")]
impl BrowserFetcher {
    fn timed_out(url: &str, what: &str, after: std::time::Duration) -> FetchError {
        FetchError::Exhausted {
            url: url.to_string(),
            attempts: 1,
            last_status: None,
            last_error: format!("{what} timed out after {after:?}"),
        }
    }

    /// One launch, capture and close. Launch and capture both race the
    /// cancellation token and their own timeout.
    async fn attempt(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedPage, FetchError> {
        let launch_budget = self.config.navigation_timeout();
        let session = tokio::select! {
            launched = tokio::time::timeout(launch_budget, BrowserSession::launch(&self.config)) => {
                launched.unwrap_or_else(|_| Err(Self::timed_out(&request.url, "browser launch", launch_budget)))?
            }
            () = cancel.cancelled() => return Err(FetchError::Cancelled { url: request.url.clone() }),
        };

        let budget = self.config.navigation_timeout() + self.config.settle_delay();
        let result = tokio::select! {
            outcome = tokio::time::timeout(budget, session.capture(request, &self.config)) => {
                outcome.unwrap_or_else(|_| Err(Self::timed_out(&request.url, "browser capture", budget)))
            }
            () = cancel.cancelled() => Err(FetchError::Cancelled { url: request.url.clone() }),
        };

        session.close().await;
        result
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedPage, FetchError> {
        self.with_retries(&request.url, cancel, || self.attempt(request, cancel)).await
    }
}

#[cfg(feature = "browser")]
mod session {
    use chromiumoxide::Page;
    use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
    use chromiumoxide::cdp::browser_protocol::network::{
        EnableParams, EventResponseReceived, GetResponseBodyParams, ResourceType,
    };
    use futures::StreamExt;
    use tokio::task::JoinHandle;
    use tracing::{debug, info, warn};

    use super::{is_api_response, text_block_script};
    use crate::infrastructure::config::BrowserConfig;
    use crate::infrastructure::fetching::{CapturedResponse, FetchError, FetchRequest, FetchedPage};

    fn unavailable(context: &str, error: impl std::fmt::Display) -> FetchError {
        FetchError::BrowserUnavailable(format!("{context}: {error}"))
    }

    /// One launched browser process plus its CDP event loop
    pub struct BrowserSession {
        browser: Browser,
        handler: JoinHandle<()>,
    }

    impl BrowserSession {
        pub async fn launch(config: &BrowserConfig) -> Result<Self, FetchError> {
            let mut builder = LaunchConfig::builder().request_timeout(config.navigation_timeout());
            if !config.headless {
                builder = builder.with_head();
            }
            if let Some(executable) = &config.executable {
                builder = builder.chrome_executable(executable);
            }
            let launch = builder.build().map_err(|e| unavailable("invalid browser config", e))?;

            let (browser, mut handler) = Browser::launch(launch)
                .await
                .map_err(|e| unavailable("failed to launch browser", e))?;
            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            info!("Browser session started");
            Ok(Self { browser, handler })
        }

        pub async fn capture(&self, request: &FetchRequest, config: &BrowserConfig) -> Result<FetchedPage, FetchError> {
            let page = self
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| unavailable("failed to open page", e))?;
            page.execute(EnableParams::default())
                .await
                .map_err(|e| unavailable("failed to enable network events", e))?;
            let mut events = page
                .event_listener::<EventResponseReceived>()
                .await
                .map_err(|e| unavailable("failed to listen for responses", e))?;

            info!("Navigating to {}", request.url);
            page.goto(request.url.as_str()).await.map_err(|e| FetchError::Exhausted {
                url: request.url.clone(),
                attempts: 1,
                last_status: None,
                last_error: format!("navigation failed: {e}"),
            })?;

            let mut intercepted = Vec::new();
            let settle = tokio::time::sleep(config.settle_delay());
            tokio::pin!(settle);
            loop {
                tokio::select! {
                    () = &mut settle => break,
                    event = events.next() => {
                        let Some(event) = event else { break };
                        let xhr = matches!(event.r#type, ResourceType::Xhr | ResourceType::Fetch);
                        if is_api_response(&event.response.url, request.api_origin.as_deref(), xhr) {
                            debug!("Intercepted {} ({})", event.response.url, event.response.status);
                            intercepted.push((
                                event.request_id.clone(),
                                event.response.url.clone(),
                                u16::try_from(event.response.status).unwrap_or(0),
                            ));
                        }
                    }
                }
            }

            let api_responses = Self::response_bodies(&page, intercepted).await;
            let html = page
                .content()
                .await
                .map_err(|e| unavailable("failed to read page content", e))?;
            let rendered_blocks = match page.evaluate(text_block_script(&request.text_block_query)).await {
                Ok(result) => result.into_value::<Vec<String>>().unwrap_or_default(),
                Err(e) => {
                    warn!("Text block query failed on {}: {}", request.url, e);
                    Vec::new()
                }
            };

            info!(
                "Captured {} bytes, {} API responses, {} text blocks from {}",
                html.len(),
                api_responses.len(),
                rendered_blocks.len(),
                request.url
            );
            if let Err(e) = page.close().await {
                warn!("Closing page for {} failed: {}", request.url, e);
            }

            Ok(FetchedPage {
                url: request.url.clone(),
                status: 200,
                html,
                api_responses,
                rendered_blocks,
            })
        }

        async fn response_bodies(
            page: &Page,
            intercepted: Vec<(chromiumoxide::cdp::browser_protocol::network::RequestId, String, u16)>,
        ) -> Vec<CapturedResponse> {
            let mut bodies = Vec::with_capacity(intercepted.len());
            for (request_id, url, status) in intercepted {
                match page.execute(GetResponseBodyParams::new(request_id)).await {
                    Ok(response) if !response.result.base64_encoded => bodies.push(CapturedResponse {
                        url,
                        status,
                        body: response.result.body.clone(),
                    }),
                    Ok(_) => debug!("Skipping binary response body from {}", url),
                    Err(e) => warn!("Could not read response body from {}: {}", url, e),
                }
            }
            bodies
        }

        /// Close the browser and stop the event loop; safe on any path.
        pub async fn close(mut self) {
            if let Err(e) = self.browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                warn!("Browser process wait failed: {}", e);
            }
            self.handler.abort();
            info!("Browser session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_text_block_script_quotes_selector() {
        let script = text_block_script("[class*='card'], [class*=\"price\"]");
        assert!(script.contains(r#"const sel = "[class*='card'], [class*=\"price\"]";"#));
        assert!(script.contains("closest(sel)"));
    }

    #[test]
    fn test_api_response_filter() {
        let origin = Some("https://api.galeri24.co.id");
        assert!(is_api_response("https://api.galeri24.co.id/v1/prices", origin, true));
        assert!(!is_api_response("https://api.galeri24.co.id/v1/prices", origin, false));
        assert!(!is_api_response("https://cdn.galeri24.co.id/app.js", origin, true));
        assert!(is_api_response("https://galeri24.co.id/api/harga", None, true));
    }

    const URL: &str = "https://galeri24.co.id/harga-emas";

    fn fetcher() -> BrowserFetcher {
        BrowserFetcher::new(BrowserConfig::default(), RetryPolicy::new(3, Duration::from_secs(2)))
    }

    fn navigation_failed() -> FetchError {
        FetchError::Exhausted {
            url: URL.to_string(),
            attempts: 1,
            last_status: None,
            last_error: "navigation failed: net::ERR_CONNECTION_RESET".to_string(),
        }
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_disabled_browser_is_unavailable() {
        let request = FetchRequest::static_page(URL);
        let error = fetcher().fetch(&request, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(error, FetchError::BrowserUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_navigation_is_retried_with_linear_backoff() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let page = fetcher()
            .with_retries(URL, &CancellationToken::new(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(navigation_failed())
                } else {
                    Ok(FetchedPage::from_html(URL, "<html></html>"))
                }
            })
            .await
            .unwrap();

        assert_eq!(page.url, URL);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let error = fetcher()
            .with_retries(URL, &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(navigation_failed())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match error {
            FetchError::Exhausted { attempts, last_error, .. } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("ERR_CONNECTION_RESET"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_launch_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let error = fetcher()
            .with_retries(URL, &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::BrowserUnavailable("failed to launch browser: no chrome".to_string()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(error, FetchError::BrowserUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let error = fetcher()
            .with_retries(URL, &cancel, || async { Err(navigation_failed()) })
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::Cancelled { .. }));
    }
}
