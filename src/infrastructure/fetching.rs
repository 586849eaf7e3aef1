//! Fetch abstraction shared by the HTTP client and the headless browser
//!
//! A fetch yields one [`FetchedPage`]: the final HTML plus, for browser
//! sources, the API response bodies intercepted while the page rendered and
//! the text blocks evaluated in the page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::{RenderMode, SourceConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("fetching {url} failed after {attempts} attempt(s){status}: {last_error}", status = status_suffix(.last_status))]
    Exhausted {
        url: String,
        attempts: u32,
        last_status: Option<u16>,
        last_error: String,
    },

    #[error("fetch of {url} was cancelled")]
    Cancelled { url: String },

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("headless browser unavailable: {0}")]
    BrowserUnavailable(String),
}

#[allow(clippy::ref_option)]
fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (last status {s})")).unwrap_or_default()
}

impl FetchError {
    /// Every fetch failure is fatal to a run; only exhaustion is worth another run attempt.
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub render: RenderMode,
    /// XHR/fetch responses from this origin are captured in browser mode
    pub api_origin: Option<String>,
    /// In-page query whose matching elements' texts are collected in browser mode
    pub text_block_query: String,
}

impl FetchRequest {
    pub fn for_source(source: &SourceConfig) -> Self {
        Self {
            url: source.url.clone(),
            render: source.render,
            api_origin: source.api_origin.clone(),
            text_block_query: source.selectors.text_block_query(),
        }
    }

    pub fn static_page(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            render: RenderMode::Static,
            api_origin: None,
            text_block_query: String::new(),
        }
    }
}

/// One intercepted API response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub html: String,
    pub api_responses: Vec<CapturedResponse>,
    pub rendered_blocks: Vec<String>,
}

impl FetchedPage {
    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            html: html.into(),
            api_responses: Vec::new(),
            rendered_blocks: Vec::new(),
        }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError>;
}

/// Routes each request to the HTTP client or the browser by render mode
pub struct RoutingFetcher<H, B> {
    http: H,
    browser: B,
}

impl<H, B> RoutingFetcher<H, B> {
    pub const fn new(http: H, browser: B) -> Self {
        Self { http, browser }
    }
}

#[async_trait]
impl<H, B> PageFetcher for RoutingFetcher<H, B>
where
    H: PageFetcher,
    B: PageFetcher,
{
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        match request.render {
            RenderMode::Static => self.http.fetch(request, cancel).await,
            RenderMode::Browser => self.browser.fetch(request, cancel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_includes_status() {
        let error = FetchError::Exhausted {
            url: "https://example.test/harga".to_string(),
            attempts: 3,
            last_status: Some(503),
            last_error: "Service Unavailable".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("3 attempt(s)"));
        assert!(message.contains("last status 503"));
        assert!(error.is_exhausted());
        assert!(!FetchError::Cancelled { url: String::new() }.is_exhausted());
    }
}
