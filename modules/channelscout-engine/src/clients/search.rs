//! Brave HTML search with pagination, behind the process-wide rate limiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use channelscout_common::{source_domain, ClientError, EngineConfig, ScoutError};

use crate::clients::{clean_html_text, random_user_agent};
use crate::limiter::RateLimiter;
use crate::traits::{SearchHit, SearchProvider};

const SEARCH_HOST: &str = "search.brave.com";
const RESULTS_PER_PAGE: usize = 20;

/// Domains that are navigation noise in a result page, never results.
const SKIP_DOMAINS: &[&str] = &[
    "search.brave.com",
    "brave.com",
    "googleapis.com",
    "gstatic.com",
    "google.com",
    "bing.com",
    "microsoft.com",
];

pub struct BraveSearcher {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl BraveSearcher {
    pub fn new(limiter: Arc<RateLimiter>, config: &EngineConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            limiter,
            timeout: config.call_timeout,
        }
    }

    async fn request_page(&self, query: &str, page: u32) -> Result<String, ClientError> {
        let offset = page as usize * RESULTS_PER_PAGE;
        let url = format!(
            "https://{SEARCH_HOST}/search?q={}&offset={offset}",
            urlencode(query)
        );

        // One delayed retry on throttle: the cooldown set by
        // report_throttled makes the second acquire wait it out.
        for attempt in 0..2 {
            let permit = self.limiter.acquire(SEARCH_HOST).await.map_err(shutdown)?;

            let response = tokio::time::timeout(
                self.timeout,
                self.http
                    .get(&url)
                    .header("User-Agent", random_user_agent())
                    .header("Accept", "text/html")
                    .header("Accept-Language", "en-US,en;q=0.9")
                    .header("Referer", format!("https://{SEARCH_HOST}/"))
                    .send(),
            )
            .await
            .map_err(|_| ClientError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 429 {
                permit.report_throttled().await;
                if attempt == 0 {
                    warn!(query, page, "Search throttled, retrying after cooldown");
                    continue;
                }
                return Err(ClientError::RateLimited {
                    destination: SEARCH_HOST.to_string(),
                });
            }
            if !status.is_success() {
                return Err(ClientError::Unavailable(format!("HTTP {status}")));
            }

            return response
                .text()
                .await
                .map_err(|e| ClientError::Unavailable(e.to_string()));
        }
        unreachable!("retry loop always returns")
    }
}

#[async_trait]
impl SearchProvider for BraveSearcher {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchHit>, ClientError> {
        let html = self.request_page(query, page).await?;
        let hits = parse_results(&html, page as usize * RESULTS_PER_PAGE);
        info!(query, page, count = hits.len(), "Search page parsed");
        Ok(hits)
    }
}

fn shutdown(_: ScoutError) -> ClientError {
    ClientError::Unavailable("shutdown requested".to_string())
}

/// Extract result links from a search result page. Anchor-based: resilient
/// to markup churn at the cost of picking up some noise, which the skip
/// list and triage both absorb.
fn parse_results(html: &str, rank_offset: usize) -> Vec<SearchHit> {
    let anchor_re =
        regex::Regex::new(r#"(?s)<a[^>]*href="(https?://[^"]+)"[^>]*>(.*?)</a>"#)
            .expect("valid regex");
    let snippet_re = regex::Regex::new(
        r#"(?s)(?:class="[^"]*(?:description|snippet|body|text)[^"]*"[^>]*>|<p[^>]*>)(.*?)(?:</|<br)"#,
    )
    .expect("valid regex");

    let mut hits = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for caps in anchor_re.captures_iter(html) {
        let url = caps[1].to_string();
        let title = clean_html_text(&caps[2]);
        let domain = source_domain(&url);

        if SKIP_DOMAINS.iter().any(|d| domain.ends_with(d))
            || title.len() < 5
            || url.contains("/search?")
            || !seen.insert(url.clone())
        {
            continue;
        }

        let anchor_end = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let mut window_end = (anchor_end + 1000).min(html.len());
        while !html.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let surrounding = &html[anchor_end..window_end];
        let snippet = snippet_re
            .captures(surrounding)
            .map(|c| clean_html_text(&c[1]))
            .unwrap_or_default();

        let rank = rank_offset + hits.len();
        hits.push(SearchHit {
            url,
            title: title.chars().take(200).collect(),
            snippet: snippet.chars().take(500).collect(),
            rank,
        });
    }
    hits
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_anchors_and_skips_noise() {
        let html = r#"
            <a href="https://search.brave.com/settings">Settings</a>
            <a href="https://blog.example.com/post">Portland film critics roundup</a>
            <p>The best local reviewers in the metro area.</p>
            <a href="https://blog.example.com/post">Portland film critics roundup</a>
        "#;
        let hits = parse_results(html, 0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://blog.example.com/post");
        assert!(hits[0].snippet.contains("local reviewers"));
        assert_eq!(hits[0].rank, 0);
    }

    #[test]
    fn rank_offset_carries_across_pages() {
        let html = r#"<a href="https://a.example.com/x">A relevant title</a>"#;
        let hits = parse_results(html, 40);
        assert_eq!(hits[0].rank, 40);
    }

    #[test]
    fn urlencode_spaces_and_quotes() {
        assert_eq!(urlencode(r#""Portland" vlog"#), "%22Portland%22+vlog");
    }
}
