//! Document fetching and fragment extraction.
//!
//! Not a browser: one GET per navigation, no retries. Non-2xx responses and
//! transport failures are returned as errors instead of being spliced in.

use crate::config::InterceptorConfig;
use crate::types::{parse_selector, NavError, NavResult};
use async_trait::async_trait;
use scraper::Html;
use std::time::Duration;
use url::Url;

/// A fetched HTML document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Requested URL.
    pub url: Url,
    /// URL after redirects.
    pub final_url: Url,
    pub body: String,
}

/// The network primitive the interceptor consumes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return its body. Implementations map non-2xx statuses to
    /// [`NavError::Status`].
    async fn fetch(&self, url: &Url) -> NavResult<FetchedDocument>;
}

/// Fetcher backed by `reqwest`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &InterceptorConfig) -> NavResult<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> NavResult<FetchedDocument> {
        let resp = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .header(reqwest::header::ACCEPT, "text/html")
            .send()
            .await?;

        let status = resp.status();
        let final_url = resp.url().clone();
        if !status.is_success() {
            return Err(NavError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            "fetched document"
        );

        Ok(FetchedDocument {
            url: url.clone(),
            final_url,
            body,
        })
    }
}

/// Inner HTML of the first element in `body` matching `selector`.
pub fn extract_fragment(body: &str, selector: &str, source_url: &str) -> NavResult<String> {
    let sel = parse_selector(selector)?;
    let document = Html::parse_document(body);
    document
        .select(&sel)
        .next()
        .map(|el| el.inner_html())
        .ok_or_else(|| NavError::ContainerNotFound {
            selector: selector.to_string(),
            source_url: source_url.to_string(),
        })
}
