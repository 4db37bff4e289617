// Test mocks for the resolution pipeline.
//
// Four mocks matching the four trait boundaries:
// - MockSearcher (SearchProvider) — closure-based query→hits
// - MockFetcher (PageFetcher) — closure-based url→page
// - MockChecker (ChannelChecker) — closure-based handle→stats
// - MockOracle (ResearchOracle) — one closure per prompt kind
//
// Unstubbed methods return `ClientError::Unavailable`, so a test only
// scripts the stages it cares about and the wave fails predictably past
// them. Plus CollectingSink and helpers for fragments, stats, geographies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use channelscout_common::{
    Candidate, ChannelStats, ClientError, Directive, Fragment, Geography, ProgressEvent,
    ProgressSink, WaveOutcome,
};

use crate::traits::{
    ChannelChecker, EscalationAdvice, PageContent, PageFetcher, ProposedQuery, ResearchOracle,
    SearchHit, SearchProvider, TriageScore, Verdict,
};

fn not_stubbed(method: &str) -> ClientError {
    ClientError::Unavailable(format!("{method} not stubbed"))
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

type SearchFn = Box<dyn Fn(&str, u32) -> Result<Vec<SearchHit>, ClientError> + Send + Sync>;

pub struct MockSearcher {
    handler: Option<SearchFn>,
    calls: AtomicUsize,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self {
            handler: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on_search(
        mut self,
        f: impl Fn(&str, u32) -> Result<Vec<SearchHit>, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Box::new(f));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearcher {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchHit>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.handler {
            Some(f) => f(query, page),
            None => Err(not_stubbed("search")),
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

type FetchFn = Box<dyn Fn(&str) -> Result<PageContent, ClientError> + Send + Sync>;

pub struct MockFetcher {
    handler: Option<FetchFn>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self { handler: None }
    }

    pub fn on_fetch(
        mut self,
        f: impl Fn(&str) -> Result<PageContent, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Box::new(f));
        self
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent, ClientError> {
        match &self.handler {
            Some(f) => f(url),
            None => Err(not_stubbed("fetch")),
        }
    }
}

// ---------------------------------------------------------------------------
// MockChecker
// ---------------------------------------------------------------------------

type CheckFn = Box<dyn Fn(&str) -> Result<ChannelStats, ClientError> + Send + Sync>;

pub struct MockChecker {
    handler: Option<CheckFn>,
}

impl MockChecker {
    pub fn new() -> Self {
        Self { handler: None }
    }

    pub fn on_check(
        mut self,
        f: impl Fn(&str) -> Result<ChannelStats, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Box::new(f));
        self
    }
}

impl Default for MockChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelChecker for MockChecker {
    async fn check(&self, handle: &str) -> Result<ChannelStats, ClientError> {
        match &self.handler {
            Some(f) => f(handle),
            None => Err(not_stubbed("check")),
        }
    }
}

// ---------------------------------------------------------------------------
// MockOracle
// ---------------------------------------------------------------------------

type GenerateFn =
    Box<dyn Fn(&Directive, &[String]) -> Result<Vec<ProposedQuery>, ClientError> + Send + Sync>;
type TriageFn = Box<dyn Fn(&[SearchHit]) -> Result<Vec<TriageScore>, ClientError> + Send + Sync>;
type ExtractFn = Box<dyn Fn(&PageContent) -> Result<Vec<Fragment>, ClientError> + Send + Sync>;
type AssembleFn = Box<dyn Fn(&[Fragment]) -> Result<Vec<Candidate>, ClientError> + Send + Sync>;
type FollowupFn = Box<dyn Fn(&Candidate) -> Result<Vec<String>, ClientError> + Send + Sync>;
type VerdictFn = Box<dyn Fn(&Candidate) -> Result<Verdict, ClientError> + Send + Sync>;
type PlanFn = Box<dyn Fn(&[WaveOutcome]) -> Result<EscalationAdvice, ClientError> + Send + Sync>;

/// Scripted oracle. Each prompt kind gets its own closure; counters let
/// tests assert how often the planner or generator ran.
pub struct MockOracle {
    generate: Option<GenerateFn>,
    triage: Option<TriageFn>,
    extract: Option<ExtractFn>,
    assemble: Option<AssembleFn>,
    followup: Option<FollowupFn>,
    adversarial: Option<VerdictFn>,
    category: Option<VerdictFn>,
    plan: Option<PlanFn>,
    generate_calls: AtomicUsize,
    plan_calls: AtomicUsize,
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            generate: None,
            triage: None,
            extract: None,
            assemble: None,
            followup: None,
            adversarial: None,
            category: None,
            plan: None,
            generate_calls: AtomicUsize::new(0),
            plan_calls: AtomicUsize::new(0),
        }
    }

    pub fn on_generate_queries(
        mut self,
        f: impl Fn(&Directive, &[String]) -> Result<Vec<ProposedQuery>, ClientError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.generate = Some(Box::new(f));
        self
    }

    pub fn on_triage(
        mut self,
        f: impl Fn(&[SearchHit]) -> Result<Vec<TriageScore>, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.triage = Some(Box::new(f));
        self
    }

    pub fn on_extract(
        mut self,
        f: impl Fn(&PageContent) -> Result<Vec<Fragment>, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.extract = Some(Box::new(f));
        self
    }

    pub fn on_assemble(
        mut self,
        f: impl Fn(&[Fragment]) -> Result<Vec<Candidate>, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.assemble = Some(Box::new(f));
        self
    }

    pub fn on_followup_queries(
        mut self,
        f: impl Fn(&Candidate) -> Result<Vec<String>, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.followup = Some(Box::new(f));
        self
    }

    pub fn on_adversarial_verdict(
        mut self,
        f: impl Fn(&Candidate) -> Result<Verdict, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.adversarial = Some(Box::new(f));
        self
    }

    pub fn on_category_verdict(
        mut self,
        f: impl Fn(&Candidate) -> Result<Verdict, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.category = Some(Box::new(f));
        self
    }

    pub fn on_plan_escalation(
        mut self,
        f: impl Fn(&[WaveOutcome]) -> Result<EscalationAdvice, ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.plan = Some(Box::new(f));
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn plan_calls(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResearchOracle for MockOracle {
    async fn generate_queries(
        &self,
        _locality: &str,
        _region: &str,
        _category: &str,
        directive: &Directive,
        prior_queries: &[String],
    ) -> Result<Vec<ProposedQuery>, ClientError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        match &self.generate {
            Some(f) => f(directive, prior_queries),
            None => Err(not_stubbed("generate_queries")),
        }
    }

    async fn triage(
        &self,
        hits: &[SearchHit],
        _locality: &str,
        _region: &str,
        _category: &str,
    ) -> Result<Vec<TriageScore>, ClientError> {
        match &self.triage {
            Some(f) => f(hits),
            None => Err(not_stubbed("triage")),
        }
    }

    async fn extract_fragments(
        &self,
        page: &PageContent,
        _locality: &str,
        _region: &str,
        _category: &str,
        _query: &str,
        _wave: u32,
    ) -> Result<Vec<Fragment>, ClientError> {
        match &self.extract {
            Some(f) => f(page),
            None => Err(not_stubbed("extract_fragments")),
        }
    }

    async fn assemble(
        &self,
        fragments: &[Fragment],
        _locality: &str,
        _region: &str,
        _category: &str,
    ) -> Result<Vec<Candidate>, ClientError> {
        match &self.assemble {
            Some(f) => f(fragments),
            None => Err(not_stubbed("assemble")),
        }
    }

    async fn followup_queries(
        &self,
        candidate: &Candidate,
        _locality: &str,
    ) -> Result<Vec<String>, ClientError> {
        match &self.followup {
            Some(f) => f(candidate),
            None => Err(not_stubbed("followup_queries")),
        }
    }

    async fn adversarial_verdict(
        &self,
        candidate: &Candidate,
        _locality: &str,
        _region: &str,
        _category: &str,
    ) -> Result<Verdict, ClientError> {
        match &self.adversarial {
            Some(f) => f(candidate),
            None => Err(not_stubbed("adversarial_verdict")),
        }
    }

    async fn category_verdict(
        &self,
        candidate: &Candidate,
        _category: &str,
    ) -> Result<Verdict, ClientError> {
        match &self.category {
            Some(f) => f(candidate),
            None => Err(not_stubbed("category_verdict")),
        }
    }

    async fn plan_escalation(
        &self,
        _locality: &str,
        _region: &str,
        _category: &str,
        history: &[WaveOutcome],
    ) -> Result<EscalationAdvice, ClientError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        match &self.plan {
            Some(f) => f(history),
            None => Err(not_stubbed("plan_escalation")),
        }
    }
}

// ---------------------------------------------------------------------------
// CollectingSink
// ---------------------------------------------------------------------------

/// Buffers every event for post-run assertions.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for CollectingSink {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

pub fn test_hit(url: &str, rank: usize) -> SearchHit {
    SearchHit {
        url: url.to_string(),
        title: format!("Result {rank}"),
        snippet: "A local creator profile.".to_string(),
        rank,
    }
}

pub fn test_page(url: &str) -> PageContent {
    PageContent {
        url: url.to_string(),
        text: "Profile of a local creator and their channel.".to_string(),
        discovered_urls: Vec::new(),
    }
}

pub fn test_fragment(subject: &str, source_url: &str, wave: u32) -> Fragment {
    Fragment {
        id: Uuid::new_v4(),
        source_url: source_url.to_string(),
        subject: subject.to_string(),
        channel_url: None,
        span: format!("{subject} is a creator based here."),
        locality_relevant: true,
        category_relevant: true,
        confidence: 0.8,
        search_query: "test query".to_string(),
        wave,
        extracted_at: Utc::now(),
    }
}

/// Stats comfortably inside the default subscriber band, active yesterday.
pub fn healthy_stats(title: &str) -> ChannelStats {
    ChannelStats {
        title: title.to_string(),
        description: "Local videos every week.".to_string(),
        subscriber_count: 50_000,
        last_activity: Some(Utc::now() - Duration::days(1)),
    }
}

pub fn accepting_verdict() -> Verdict {
    Verdict {
        score: 0.9,
        accepted: true,
        reasoning: "holds up".to_string(),
    }
}

pub fn rejecting_verdict() -> Verdict {
    Verdict {
        score: 0.2,
        accepted: false,
        reasoning: "does not hold up".to_string(),
    }
}

/// One region, one locality, the given categories.
pub fn tiny_geography(region: &str, locality: &str, categories: &[&str]) -> Geography {
    let categories: Vec<String> = categories.iter().map(|c| c.to_string()).collect();
    Geography::new(
        vec![(region.to_string(), vec![locality.to_string()])],
        &categories,
    )
}
