use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use url::Url;

pub const MAX_PAGE_BYTES: usize = 8 * 1024 * 1024;
pub const MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

/// Network access used by the scrape pipeline.
///
/// Non-2xx responses are errors. Implementations must give up after
/// `timeout`.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_text(&self, url: &Url, timeout: Duration) -> anyhow::Result<String>;
    async fn fetch_bytes(&self, url: &Url, timeout: Duration) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build shelf http client")?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }

    async fn get(
        &self,
        url: &Url,
        accept: &'static str,
        timeout: Duration,
    ) -> anyhow::Result<reqwest::Response> {
        let resp = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} failed ({status})");
        }
        Ok(resp)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch_text(&self, url: &Url, timeout: Duration) -> anyhow::Result<String> {
        let resp = self
            .get(
                url,
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
                timeout,
            )
            .await?;
        let bytes = read_body_limited(resp, MAX_PAGE_BYTES)
            .await
            .with_context(|| format!("read page body: {url}"))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn fetch_bytes(&self, url: &Url, timeout: Duration) -> anyhow::Result<Vec<u8>> {
        let resp = self.get(url, "image/*,*/*;q=0.8", timeout).await?;
        read_body_limited(resp, MAX_IMAGE_BYTES)
            .await
            .with_context(|| format!("read image body: {url}"))
    }
}

async fn read_body_limited(mut resp: reqwest::Response, limit: usize) -> anyhow::Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = resp.chunk().await.context("read response chunk")? {
        if out.len() + chunk.len() > limit {
            anyhow::bail!("response body exceeds {limit} bytes");
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}
