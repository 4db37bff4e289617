use std::env;
use std::time::Duration;

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the local inference backend (llama.cpp server,
    /// OpenAI-compatible chat completions).
    pub oracle_url: String,
    pub oracle_model: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            oracle_url: env::var("ORACLE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8081".to_string()),
            oracle_model: env::var("ORACLE_MODEL").unwrap_or_else(|_| "local".to_string()),
        }
    }
}

/// Tuning knobs for the orchestration engine. Defaults mirror the production
/// deployment; tests override freely.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum research waves per category slot.
    pub wave_cap: u32,
    /// Result pages fetched per search query.
    pub pages_per_query: u32,
    /// Queries allowed per wave after dedup and fallback top-up.
    pub max_queries_per_wave: usize,
    /// Minimum triage score (0-10) for a result to be fetched.
    pub triage_threshold: u8,
    /// Cap on pages fetched per wave, best triage scores first.
    pub max_pages_to_fetch: usize,
    /// Concurrent page fetches within one wave.
    pub fetch_concurrency: usize,
    /// Follow-up searches per wave for candidates missing a handle.
    pub max_followups: usize,

    /// Subscriber band a verified channel must sit in.
    pub subscriber_min: u64,
    pub subscriber_max: u64,
    /// A channel with no upload within this window is rejected as inactive.
    pub max_inactive_days: i64,

    /// Global spacing between any two outbound requests, jittered inside
    /// [min, max].
    pub global_spacing_min: Duration,
    pub global_spacing_max: Duration,
    /// Additional spacing between requests to the same destination.
    pub destination_spacing: Duration,
    /// Cooldown applied to a destination after a throttling response.
    pub throttle_cooldown: Duration,
    /// Per capability-call timeout.
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wave_cap: 3,
            pages_per_query: 4,
            max_queries_per_wave: 8,
            triage_threshold: 4,
            max_pages_to_fetch: 12,
            fetch_concurrency: 3,
            max_followups: 5,
            subscriber_min: 20_000,
            subscriber_max: 150_000,
            max_inactive_days: 30,
            global_spacing_min: Duration::from_secs(2),
            global_spacing_max: Duration::from_secs(4),
            destination_spacing: Duration::from_secs(5),
            throttle_cooldown: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Zero-delay limiter settings for tests that drive virtual time
    /// themselves.
    pub fn without_pacing() -> Self {
        Self {
            global_spacing_min: Duration::ZERO,
            global_spacing_max: Duration::ZERO,
            destination_spacing: Duration::ZERO,
            throttle_cooldown: Duration::ZERO,
            ..Self::default()
        }
    }
}
