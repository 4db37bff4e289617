//! HTTP page fetcher: renders a page to plain text and surfaces any channel
//! URLs found in the markup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use channelscout_common::{source_domain, ClientError, EngineConfig};

use crate::clients::{clean_html_text, random_user_agent};
use crate::limiter::RateLimiter;
use crate::traits::{PageContent, PageFetcher};

/// Pages are truncated to this many characters before extraction; beyond
/// that the oracle context is wasted on boilerplate.
const MAX_TEXT_CHARS: usize = 20_000;

pub struct HttpPageFetcher {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(limiter: Arc<RateLimiter>, config: &EngineConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            limiter,
            timeout: config.call_timeout,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent, ClientError> {
        let domain = source_domain(url);
        let _permit = self
            .limiter
            .acquire(&domain)
            .await
            .map_err(|_| ClientError::Unavailable("shutdown requested".to_string()))?;

        let response = tokio::time::timeout(
            self.timeout,
            self.http
                .get(url)
                .header("User-Agent", random_user_agent())
                .header("Accept", "text/html")
                .header("Accept-Language", "en-US,en;q=0.9")
                .send(),
        )
        .await
        .map_err(|_| ClientError::FetchError {
            url: url.to_string(),
            reason: "timeout".to_string(),
        })?
        .map_err(|e| ClientError::FetchError {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::FetchError {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("text/html") && !content_type.contains("text/plain") {
            return Err(ClientError::FetchError {
                url: url.to_string(),
                reason: format!("non-text content: {content_type}"),
            });
        }

        let html = response.text().await.map_err(|e| ClientError::FetchError {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let discovered_urls = discover_channel_urls(&html);
        let text = html_to_text(&html);

        info!(
            url,
            bytes = text.len(),
            channels = discovered_urls.len(),
            "Page fetched"
        );

        Ok(PageContent {
            url: url.to_string(),
            text,
            discovered_urls,
        })
    }
}

/// Channel URLs embedded anywhere in the markup, including hrefs that the
/// prose extraction would drop.
pub fn discover_channel_urls(html: &str) -> Vec<String> {
    let patterns = [
        r"https?://(?:www\.)?youtube\.com/@[\w\-.]+",
        r"https?://(?:www\.)?youtube\.com/channel/UC[\w\-]+",
        r"https?://(?:www\.)?youtube\.com/c/[\w\-.]+",
        r"https?://(?:www\.)?youtube\.com/user/[\w\-.]+",
    ];
    let mut urls = Vec::new();
    for pattern in patterns {
        let re = regex::Regex::new(pattern).expect("valid regex");
        for m in re.find_iter(html) {
            let url = m.as_str().to_string();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

fn html_to_text(html: &str) -> String {
    let mut stripped = html.to_string();
    for tag in [
        "script", "style", "nav", "header", "footer", "aside", "noscript", "svg", "iframe",
    ] {
        let re = regex::Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>"))
            .expect("valid regex");
        stripped = re.replace_all(&stripped, " ").into_owned();
    }
    clean_html_text(&stripped).chars().take(MAX_TEXT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_channel_urls_in_markup() {
        let html = r#"
            <a href="https://www.youtube.com/@pdxfilmcast">channel</a>
            <p>Also at https://youtube.com/channel/UCabc123_def</p>
            <a href="https://www.youtube.com/@pdxfilmcast">again</a>
        "#;
        let urls = discover_channel_urls(html);
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&"https://www.youtube.com/@pdxfilmcast".to_string()));
    }

    #[test]
    fn strips_script_and_markup() {
        let html = "<script>var x = 1;</script><p>Real &amp; useful content</p>";
        assert_eq!(html_to_text(html), "Real & useful content");
    }
}
