use thiserror::Error;

/// Top-level errors. Only `Geography` and `Config` abort a run; everything
/// else is downgraded to a tagged wave failure long before it reaches here.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Malformed geography: {0}")]
    Geography(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown requested")]
    Shutdown,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Failure taxonomy for capability client calls. Transient throttling is
/// retried inside the client layer; what escapes here is what the wave
/// executor sees.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Destination throttled us and the retry budget is spent.
    #[error("Rate limited by {destination}")]
    RateLimited { destination: String },

    /// The service could not be reached or answered with a hard error.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Page fetch failed: timeout, non-text content, or blocked.
    #[error("Fetch error for {url}: {reason}")]
    FetchError { url: String, reason: String },

    /// Channel handle does not resolve to an existing channel.
    #[error("Channel not found: {0}")]
    NotFound(String),

    /// Oracle output did not parse into the expected schema. Always a stage
    /// failure, never fatal: schema drift is expected.
    #[error("Malformed oracle response for {kind}: {detail}")]
    MalformedResponse { kind: String, detail: String },

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl ClientError {
    /// True for errors caused by the network/transport layer rather than the
    /// content of a response. These map to the network-exhausted wave
    /// failure.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::RateLimited { .. }
                | ClientError::Unavailable(_)
                | ClientError::Timeout { .. }
        )
    }
}
