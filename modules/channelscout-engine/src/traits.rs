// Trait abstractions for the wave executor's dependencies.
//
// SearchProvider / PageFetcher / ChannelChecker — one external capability
// each, behind a uniform call/result contract.
// ResearchOracle — every reasoning-heavy step as a typed prompt kind.
//
// These enable deterministic testing with the mocks in testing.rs:
// no network, no inference backend. `cargo test` in seconds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use channelscout_common::{
    Candidate, ChannelStats, ClientError, Directive, Fragment, WaveOutcome,
};

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Position in the engine's ordering, across pages. Triage tie-break.
    pub rank: usize,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one page of a web search. `page` is zero-based.
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchHit>, ClientError>;
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PageContent {
    pub url: String,
    pub text: String,
    /// Channel URLs found in the page markup, separate from the prose.
    pub discovered_urls: Vec<String>,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageContent, ClientError>;
}

// ---------------------------------------------------------------------------
// Channel metadata
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChannelChecker: Send + Sync {
    /// Resolve a channel handle/URL to live metadata, or
    /// `ClientError::NotFound` when the channel does not exist.
    async fn check(&self, handle: &str) -> Result<ChannelStats, ClientError>;
}

// ---------------------------------------------------------------------------
// Oracle prompt kinds
// ---------------------------------------------------------------------------

/// A query the oracle proposes, with the angle it serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedQuery {
    pub query: String,
    pub angle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageScore {
    pub url: String,
    /// 0-10 relevance against locality + category.
    pub score: u8,
    pub reason: String,
}

/// Verdict from the adversarial and category-fit checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// 0.0-1.0; how well the candidate survives the challenge.
    pub score: f32,
    pub accepted: bool,
    pub reasoning: String,
}

/// Planner output before the engine applies its rotation guarantee.
#[derive(Debug, Clone)]
pub enum EscalationAdvice {
    Escalate(Directive),
    Exhausted { reason: String },
}

/// The language-model boundary. One method per prompt kind; every method is
/// schema-validated and fails with `ClientError::MalformedResponse` on
/// drift, which is a stage failure, never fatal.
#[async_trait]
pub trait ResearchOracle: Send + Sync {
    async fn generate_queries(
        &self,
        locality: &str,
        region: &str,
        category: &str,
        directive: &Directive,
        prior_queries: &[String],
    ) -> Result<Vec<ProposedQuery>, ClientError>;

    async fn triage(
        &self,
        hits: &[SearchHit],
        locality: &str,
        region: &str,
        category: &str,
    ) -> Result<Vec<TriageScore>, ClientError>;

    async fn extract_fragments(
        &self,
        page: &PageContent,
        locality: &str,
        region: &str,
        category: &str,
        query: &str,
        wave: u32,
    ) -> Result<Vec<Fragment>, ClientError>;

    async fn assemble(
        &self,
        fragments: &[Fragment],
        locality: &str,
        region: &str,
        category: &str,
    ) -> Result<Vec<Candidate>, ClientError>;

    async fn followup_queries(
        &self,
        candidate: &Candidate,
        locality: &str,
    ) -> Result<Vec<String>, ClientError>;

    async fn adversarial_verdict(
        &self,
        candidate: &Candidate,
        locality: &str,
        region: &str,
        category: &str,
    ) -> Result<Verdict, ClientError>;

    async fn category_verdict(
        &self,
        candidate: &Candidate,
        category: &str,
    ) -> Result<Verdict, ClientError>;

    async fn plan_escalation(
        &self,
        locality: &str,
        region: &str,
        category: &str,
        history: &[WaveOutcome],
    ) -> Result<EscalationAdvice, ClientError>;
}
