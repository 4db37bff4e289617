pub mod channel;
pub mod fetch;
pub mod search;

pub use channel::YoutubeChecker;
pub use fetch::HttpPageFetcher;
pub use search::BraveSearcher;

/// Browser user agents rotated across outbound requests.
pub(crate) const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_3) AppleWebKit/605.1.15 Safari/605.1.15",
];

pub(crate) fn random_user_agent() -> &'static str {
    use rand::Rng;
    USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())]
}

/// Collapse whitespace and strip markup/entities from an HTML snippet.
pub(crate) fn clean_html_text(raw: &str) -> String {
    let no_tags = regex::Regex::new(r"<[^>]+>")
        .expect("valid regex")
        .replace_all(raw, " ");
    let decoded = no_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    regex::Regex::new(r"\s+")
        .expect("valid regex")
        .replace_all(&decoded, " ")
        .trim()
        .to_string()
}
