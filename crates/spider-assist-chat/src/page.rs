//! Page-preview boundary: fetching a target page through the scraping
//! backend so its HTML can ground generation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ChatError;
use crate::prompt::HtmlContext;

/// Default scraping-backend API root.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8080/api/v1";

/// Result of fetching one page. Failures are values, not errors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePreview {
    pub url: String,
    pub status_code: u16,
    pub title: String,
    pub html_content: String,
    pub content_length: u64,
    pub encoding: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PagePreview {
    /// A failed preview for `url`.
    pub fn failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

impl TryFrom<&PagePreview> for HtmlContext {
    type Error = ChatError;

    fn try_from(preview: &PagePreview) -> Result<Self, Self::Error> {
        if !preview.success {
            return Err(ChatError::Validation(format!(
                "page {} could not be fetched: {}",
                preview.url,
                preview.error_message.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(HtmlContext::new(
            preview.url.clone(),
            preview.title.clone(),
            preview.html_content.clone(),
        ))
    }
}

/// Source of page previews. Implement and pass where grounding is needed.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> PagePreview;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<PageData>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    #[serde(default)]
    url: String,
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_content: String,
    #[serde(default)]
    content_length: u64,
    #[serde(default)]
    encoding: String,
}

/// Fetches pages through the backend's `GET /fetch-url?url=...` endpoint.
pub struct BackendPageFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl BackendPageFetcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build backend client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn fetch_url(&self) -> String {
        format!("{}/fetch-url", self.base_url.trim_end_matches('/'))
    }

    async fn try_fetch(&self, url: &str) -> Result<PagePreview, String> {
        let response = self
            .client
            .get(self.fetch_url())
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status")
            ));
        }
        let envelope: Envelope = response.json().await.map_err(|e| e.to_string())?;
        if !envelope.success {
            return Err(if envelope.message.is_empty() {
                "Failed to fetch page".to_string()
            } else {
                envelope.message
            });
        }
        let data = envelope
            .data
            .ok_or_else(|| "backend response has no data".to_string())?;
        Ok(PagePreview {
            url: data.url,
            status_code: data.status_code,
            title: data.title,
            html_content: data.html_content,
            content_length: data.content_length,
            encoding: data.encoding,
            success: true,
            error_message: None,
        })
    }
}

#[async_trait]
impl PageFetcher for BackendPageFetcher {
    async fn fetch(&self, url: &str) -> PagePreview {
        match self.try_fetch(url).await {
            Ok(preview) => {
                debug!(
                    event = "page.fetch_succeeded",
                    domain = "page",
                    status_code = preview.status_code,
                    content_length = preview.content_length
                );
                preview
            }
            Err(message) => {
                warn!(event = "page.fetch_failed", domain = "page", error = %message);
                PagePreview::failed(url, message)
            }
        }
    }
}
