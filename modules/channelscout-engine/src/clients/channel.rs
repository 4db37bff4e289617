//! Channel metadata lookup: visits the channel page and its uploads tab and
//! extracts subscriber count and last-activity date from the embedded
//! metadata.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use channelscout_common::{ChannelStats, ClientError, EngineConfig};

use crate::clients::random_user_agent;
use crate::limiter::RateLimiter;
use crate::traits::ChannelChecker;

const CHANNEL_HOST: &str = "www.youtube.com";

pub struct YoutubeChecker {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl YoutubeChecker {
    pub fn new(limiter: Arc<RateLimiter>, config: &EngineConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            limiter,
            timeout: config.call_timeout,
        }
    }

    async fn get_page(&self, url: &str) -> Result<String, ClientError> {
        let _permit = self
            .limiter
            .acquire(CHANNEL_HOST)
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
        .map_err(|_| ClientError::Timeout {
            seconds: self.timeout.as_secs(),
        })?
        .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ClientError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ClientError::Unavailable(format!("HTTP {status}")));
        }
        response
            .text()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ChannelChecker for YoutubeChecker {
    async fn check(&self, handle: &str) -> Result<ChannelStats, ClientError> {
        let clean_url = handle.split('?').next().unwrap_or(handle).trim_end_matches('/');

        let html = self.get_page(clean_url).await?;
        if !channel_exists(&html) {
            return Err(ClientError::NotFound(clean_url.to_string()));
        }

        let title = extract_first(
            &html,
            &[
                r#"<meta property="og:title" content="([^"]+)""#,
                r#""title":\s*"([^"]{2,80})""#,
            ],
        )
        .unwrap_or_default();
        let description = extract_first(
            &html,
            &[r#"<meta property="og:description" content="([^"]*)""#],
        )
        .unwrap_or_default();
        let subscriber_count = extract_first(
            &html,
            &[
                r#""subscriberCountText":\s*\{[^}]*"simpleText":\s*"([^"]+)""#,
                r#""subscriberCountText":\s*"([^"]+)""#,
            ],
        )
        .map(|t| parse_subscriber_count(&t))
        .unwrap_or(0);

        // Uploads tab carries the most recent publish time.
        let last_activity = match self.get_page(&format!("{clean_url}/videos")).await {
            Ok(videos_html) => extract_first(
                &videos_html,
                &[
                    r#""publishedTimeText":\s*\{[^}]*"simpleText":\s*"([^"]+)""#,
                    r#""publishedTimeText":\s*"([^"]+)""#,
                ],
            )
            .and_then(|t| parse_relative_time(&t, Utc::now())),
            Err(_) => None,
        };

        info!(
            handle = clean_url,
            subscriber_count,
            active = last_activity.is_some(),
            "Channel checked"
        );

        Ok(ChannelStats {
            title,
            description: description.chars().take(300).collect(),
            subscriber_count,
            last_activity,
        })
    }
}

fn channel_exists(html: &str) -> bool {
    ["\"channelMetadataRenderer\"", "property=\"og:title\"", "\"channelId\""]
        .iter()
        .any(|marker| html.contains(marker))
}

fn extract_first(html: &str, patterns: &[&str]) -> Option<String> {
    for pattern in patterns {
        let re = regex::Regex::new(pattern).expect("valid regex");
        if let Some(caps) = re.captures(html) {
            return Some(caps[1].trim().to_string());
        }
    }
    None
}

/// Parse a subscriber count like "12.5K subscribers" or "1.2M".
pub fn parse_subscriber_count(text: &str) -> u64 {
    let cleaned = text
        .to_lowercase()
        .replace("subscribers", "")
        .replace("subscriber", "")
        .replace(',', "")
        .replace(' ', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return 0;
    }

    let (digits, multiplier) = match cleaned.strip_suffix('k') {
        Some(d) => (d, 1_000.0),
        None => match cleaned.strip_suffix('m') {
            Some(d) => (d, 1_000_000.0),
            None => (cleaned, 1.0),
        },
    };
    digits
        .parse::<f64>()
        .map(|n| (n * multiplier) as u64)
        .unwrap_or(0)
}

/// Convert a relative publish time ("2 weeks ago") into an absolute
/// timestamp, anchored at `now` so the activity policy can reason in days.
pub fn parse_relative_time(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_lowercase();
    let amount = regex::Regex::new(r"(\d+)")
        .expect("valid regex")
        .captures(&lower)
        .and_then(|c| c[1].parse::<i64>().ok())
        .unwrap_or(1);

    let days = if lower.contains("second") || lower.contains("minute") || lower.contains("hour") {
        0
    } else if lower.contains("day") {
        amount
    } else if lower.contains("week") {
        amount * 7
    } else if lower.contains("month") {
        amount * 30
    } else if lower.contains("year") {
        amount * 365
    } else {
        return None;
    };

    Some(now - chrono::Duration::days(days))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscriber_counts() {
        assert_eq!(parse_subscriber_count("12.5K subscribers"), 12_500);
        assert_eq!(parse_subscriber_count("1.2M"), 1_200_000);
        assert_eq!(parse_subscriber_count("987 subscribers"), 987);
        assert_eq!(parse_subscriber_count(""), 0);
        assert_eq!(parse_subscriber_count("unknown"), 0);
    }

    #[test]
    fn parses_relative_times() {
        let now = Utc::now();
        assert_eq!(parse_relative_time("3 hours ago", now), Some(now));
        assert_eq!(
            parse_relative_time("2 weeks ago", now),
            Some(now - chrono::Duration::days(14))
        );
        assert_eq!(
            parse_relative_time("1 month ago", now),
            Some(now - chrono::Duration::days(30))
        );
        assert_eq!(parse_relative_time("Streamed live", now), None);
    }

    #[test]
    fn detects_channel_markers() {
        assert!(channel_exists(r#"{"channelMetadataRenderer": {}}"#));
        assert!(!channel_exists("<html>not a channel</html>"));
    }
}
