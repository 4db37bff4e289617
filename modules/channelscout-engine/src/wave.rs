//! One research wave for a (locality, category) slot.
//!
//! Eight stages, each short-circuiting to a tagged failure: query
//! generation, search, triage, fetch + extract, assembly, follow-up,
//! channel verification, adversarial verification. Per-item failures are
//! tolerated with a warning; only a stage that produces nothing usable
//! fails the wave.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use channelscout_common::{
    Candidate, ClientError, Directive, EngineConfig, FailureReason, Fragment, ScoutError,
    VerificationStatus, WaveOutcome,
};

use crate::orchestrator::StopSignal;
use crate::queries::finalize_queries;
use crate::traits::{
    ChannelChecker, PageFetcher, ResearchOracle, SearchHit, SearchProvider, TriageScore,
};

/// Minimum distinct source domains for a candidate to survive assembly.
const MIN_INDEPENDENT_SOURCES: usize = 2;

pub struct WaveExecutor {
    searcher: std::sync::Arc<dyn SearchProvider>,
    fetcher: std::sync::Arc<dyn PageFetcher>,
    checker: std::sync::Arc<dyn ChannelChecker>,
    oracle: std::sync::Arc<dyn ResearchOracle>,
    config: EngineConfig,
    stop: StopSignal,
}

impl WaveExecutor {
    pub fn new(
        searcher: std::sync::Arc<dyn SearchProvider>,
        fetcher: std::sync::Arc<dyn PageFetcher>,
        checker: std::sync::Arc<dyn ChannelChecker>,
        oracle: std::sync::Arc<dyn ResearchOracle>,
        config: EngineConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            searcher,
            fetcher,
            checker,
            oracle,
            config,
            stop,
        }
    }

    /// Run one wave. Returns the outcome plus the query texts actually
    /// executed, so the caller can feed them into later waves as
    /// already-tried.
    pub async fn execute(
        &self,
        locality: &str,
        region: &str,
        category: &str,
        directive: &Directive,
        wave: u32,
        prior_queries: &[String],
    ) -> Result<(WaveOutcome, Vec<String>), ScoutError> {
        info!(locality, category, wave, angle = %directive.angle, "Wave starting");

        // Stage 1: query generation. Oracle failure here degrades to the
        // fallback templates rather than failing the wave.
        let proposed = match self
            .oracle
            .generate_queries(locality, region, category, directive, prior_queries)
            .await
        {
            Ok(q) => q,
            Err(e) => {
                warn!(locality, category, error = %e, "Query generation failed, using fallbacks");
                Vec::new()
            }
        };
        let queries = finalize_queries(
            proposed,
            locality,
            region,
            category,
            directive.angle,
            self.config.max_queries_per_wave,
        );
        let executed: Vec<String> = queries.iter().map(|q| q.query.clone()).collect();
        debug!(locality, category, count = queries.len(), "Queries finalized");

        // Stage 2: search.
        self.ensure_running()?;
        let mut hits: Vec<SearchHit> = Vec::new();
        let mut url_query: HashMap<String, String> = HashMap::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut any_search_succeeded = false;
        let mut transport_failures = 0usize;

        for query in &queries {
            for page in 0..self.config.pages_per_query {
                self.ensure_running()?;
                match self.searcher.search(&query.query, page).await {
                    Ok(page_hits) => {
                        any_search_succeeded = true;
                        if page_hits.is_empty() {
                            break;
                        }
                        for hit in page_hits {
                            if seen_urls.insert(hit.url.clone()) {
                                url_query.insert(hit.url.clone(), query.query.clone());
                                hits.push(hit);
                            }
                        }
                    }
                    Err(e) => {
                        if e.is_transport() {
                            transport_failures += 1;
                        }
                        warn!(query = query.query, page, error = %e, "Search page failed");
                        break;
                    }
                }
            }
        }

        if !any_search_succeeded && transport_failures > 0 {
            return Ok((
                self.failed(wave, directive, FailureReason::NetworkExhausted, Vec::new()),
                executed,
            ));
        }
        if hits.is_empty() {
            return Ok((
                self.failed(wave, directive, FailureReason::NoCandidates, Vec::new()),
                executed,
            ));
        }
        info!(locality, category, wave, hits = hits.len(), "Search complete");

        // Stage 3: triage.
        self.ensure_running()?;
        let scores = match self.oracle.triage(&hits, locality, region, category).await {
            Ok(s) => s,
            Err(e) => {
                warn!(locality, category, error = %e, "Triage failed");
                let reason = if e.is_transport() {
                    FailureReason::NetworkExhausted
                } else {
                    FailureReason::NoCandidates
                };
                return Ok((self.failed(wave, directive, reason, Vec::new()), executed));
            }
        };
        let threshold = directive
            .triage_threshold
            .unwrap_or(self.config.triage_threshold);
        let selected = select_for_fetch(scores, &hits, threshold, self.config.max_pages_to_fetch);
        if selected.is_empty() {
            return Ok((
                self.failed(wave, directive, FailureReason::NoCandidates, Vec::new()),
                executed,
            ));
        }
        debug!(locality, category, selected = selected.len(), threshold, "Triage complete");

        // Stage 4: fetch and extract, bounded concurrency.
        self.ensure_running()?;
        let results: Vec<Result<Vec<Fragment>, (String, ClientError)>> =
            stream::iter(selected.iter().map(|url| {
                let query = url_query.get(url).cloned().unwrap_or_default();
                async move {
                    self.fetch_and_extract(url, &query, locality, region, category, wave)
                        .await
                        .map_err(|e| (url.clone(), e))
                }
            }))
            .buffer_unordered(self.config.fetch_concurrency)
            .collect()
            .await;

        let mut fragments: Vec<Fragment> = Vec::new();
        for result in results {
            match result {
                Ok(page_fragments) => fragments.extend(page_fragments),
                Err((url, e)) => warn!(url, error = %e, "Page fetch/extract failed"),
            }
        }
        if fragments.is_empty() {
            return Ok((
                self.failed(wave, directive, FailureReason::NoCandidates, Vec::new()),
                executed,
            ));
        }
        info!(locality, category, wave, fragments = fragments.len(), "Extraction complete");

        // Stage 5: assembly. Corroboration is enforced here, not trusted
        // from the oracle: a candidate needs evidence from at least two
        // distinct domains.
        self.ensure_running()?;
        let assembled = match self
            .oracle
            .assemble(&fragments, locality, region, category)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(locality, category, error = %e, "Assembly failed");
                let reason = if e.is_transport() {
                    FailureReason::NetworkExhausted
                } else {
                    FailureReason::NoCandidates
                };
                return Ok((self.failed(wave, directive, reason, fragments), executed));
            }
        };
        let mut corroborated: Vec<Candidate> = Vec::new();
        let mut promoted_ids: HashSet<Uuid> = HashSet::new();
        for candidate in assembled {
            if candidate.independent_sources() >= MIN_INDEPENDENT_SOURCES {
                for f in &candidate.fragments {
                    promoted_ids.insert(f.id);
                }
                corroborated.push(candidate);
            } else {
                debug!(
                    name = candidate.name,
                    sources = candidate.independent_sources(),
                    "Candidate lacks corroboration"
                );
            }
        }
        let weak_signals: Vec<Fragment> = fragments
            .iter()
            .filter(|f| !promoted_ids.contains(&f.id))
            .cloned()
            .collect();
        if corroborated.is_empty() {
            return Ok((
                self.failed(wave, directive, FailureReason::NoCandidates, weak_signals),
                executed,
            ));
        }

        // Stage 6: follow-up searches for candidates without a handle.
        self.ensure_running()?;
        self.resolve_missing_handles(&mut corroborated, locality, wave)
            .await?;

        // Stage 7: channel verification.
        self.ensure_running()?;
        let mut checked: Vec<Candidate> = Vec::new();
        let mut had_verifiable = false;
        let mut check_transport_errors = false;
        for mut candidate in corroborated {
            let Some(handle) = candidate.handle.clone() else {
                debug!(name = candidate.name, "No handle resolved, dropping");
                continue;
            };
            had_verifiable = true;
            match self.checker.check(&handle).await {
                Ok(stats) => {
                    candidate.channel = Some(stats);
                    if candidate.passes_activity_policy(
                        self.config.subscriber_min,
                        self.config.subscriber_max,
                        self.config.max_inactive_days,
                        Utc::now(),
                    ) {
                        candidate.status = VerificationStatus::ChannelChecked;
                        checked.push(candidate);
                    } else {
                        info!(name = candidate.name, "Channel outside activity policy, rejected");
                    }
                }
                Err(ClientError::NotFound(_)) => {
                    info!(name = candidate.name, handle, "Channel not found, rejected");
                }
                Err(e) => {
                    if e.is_transport() {
                        check_transport_errors = true;
                    }
                    warn!(name = candidate.name, handle, error = %e, "Channel check failed");
                }
            }
        }
        if checked.is_empty() {
            let reason = if check_transport_errors {
                FailureReason::NetworkExhausted
            } else if had_verifiable {
                FailureReason::AllRejected
            } else {
                FailureReason::VerificationFailed
            };
            return Ok((self.failed(wave, directive, reason, weak_signals), executed));
        }

        // Stage 8: adversarial plus category-fit verdicts.
        self.ensure_running()?;
        let mut survivors: Vec<Candidate> = Vec::new();
        let mut verdict_errors = false;
        let mut verdict_transport_errors = false;
        for mut candidate in checked {
            let adversarial = match self
                .oracle
                .adversarial_verdict(&candidate, locality, region, category)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(name = candidate.name, error = %e, "Adversarial verdict failed");
                    verdict_errors = true;
                    verdict_transport_errors |= e.is_transport();
                    continue;
                }
            };
            candidate.locality_score = adversarial.score;
            if !adversarial.accepted {
                info!(name = candidate.name, reasoning = adversarial.reasoning, "Rejected adversarially");
                continue;
            }
            let category_fit = match self.oracle.category_verdict(&candidate, category).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(name = candidate.name, error = %e, "Category verdict failed");
                    verdict_errors = true;
                    verdict_transport_errors |= e.is_transport();
                    continue;
                }
            };
            candidate.category_score = category_fit.score;
            if !category_fit.accepted {
                info!(name = candidate.name, "Rejected on category fit");
                continue;
            }
            candidate.status = VerificationStatus::AdversariallyConfirmed;
            survivors.push(candidate);
        }

        if survivors.is_empty() {
            let reason = if verdict_transport_errors {
                FailureReason::NetworkExhausted
            } else if verdict_errors {
                FailureReason::VerificationFailed
            } else {
                FailureReason::AllRejected
            };
            return Ok((self.failed(wave, directive, reason, weak_signals), executed));
        }

        let now = Utc::now();
        let best = pick_best(
            survivors,
            self.config.subscriber_min,
            self.config.subscriber_max,
            self.config.max_inactive_days,
            now,
        );
        info!(
            locality,
            category,
            wave,
            name = best.name,
            score = best.composite_score(
                self.config.subscriber_min,
                self.config.subscriber_max,
                self.config.max_inactive_days,
                now,
            ),
            "Wave succeeded"
        );
        Ok((
            WaveOutcome {
                wave,
                directive: directive.clone(),
                candidate: Some(best),
                failure: None,
                weak_signals,
                completed_at: Utc::now(),
            },
            executed,
        ))
    }

    async fn fetch_and_extract(
        &self,
        url: &str,
        query: &str,
        locality: &str,
        region: &str,
        category: &str,
        wave: u32,
    ) -> Result<Vec<Fragment>, ClientError> {
        let page = self.fetcher.fetch(url).await?;
        self.oracle
            .extract_fragments(&page, locality, region, category, query, wave)
            .await
    }

    /// Targeted searches for candidates the assembly left without a channel
    /// URL. Shares one follow-up budget across the wave.
    async fn resolve_missing_handles(
        &self,
        candidates: &mut [Candidate],
        locality: &str,
        wave: u32,
    ) -> Result<(), ScoutError> {
        let mut budget = self.config.max_followups;
        for candidate in candidates.iter_mut() {
            if candidate.handle.is_some() || budget == 0 {
                continue;
            }
            let queries = match self.oracle.followup_queries(candidate, locality).await {
                Ok(q) if !q.is_empty() => q,
                Ok(_) | Err(_) => {
                    vec![format!(r#""{}" youtube channel"#, candidate.name)]
                }
            };
            'queries: for query in queries {
                if budget == 0 {
                    break;
                }
                self.ensure_running()?;
                budget -= 1;
                let hits = match self.searcher.search(&query, 0).await {
                    Ok(h) => h,
                    Err(e) => {
                        warn!(query, error = %e, "Follow-up search failed");
                        continue;
                    }
                };
                for hit in hits {
                    if let Some(channel_url) = channel_url_from(&hit.url) {
                        info!(name = candidate.name, channel_url, "Handle resolved via follow-up");
                        candidate.handle = Some(channel_url.clone());
                        candidate.add_fragment(Fragment {
                            id: Uuid::new_v4(),
                            source_url: hit.url.clone(),
                            subject: candidate.name.clone(),
                            channel_url: Some(channel_url),
                            span: hit.title.clone(),
                            locality_relevant: false,
                            category_relevant: false,
                            confidence: 0.5,
                            search_query: query.clone(),
                            wave,
                            extracted_at: Utc::now(),
                        });
                        break 'queries;
                    }
                }
            }
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), ScoutError> {
        if self.stop.is_stopped() {
            Err(ScoutError::Shutdown)
        } else {
            Ok(())
        }
    }

    fn failed(
        &self,
        wave: u32,
        directive: &Directive,
        reason: FailureReason,
        weak_signals: Vec<Fragment>,
    ) -> WaveOutcome {
        info!(wave, reason = %reason, "Wave failed");
        WaveOutcome {
            wave,
            directive: directive.clone(),
            candidate: None,
            failure: Some(reason),
            weak_signals,
            completed_at: Utc::now(),
        }
    }
}

/// Triage scores to a fetch list: threshold, descending score, ties broken
/// by the original search rank, capped.
fn select_for_fetch(
    scores: Vec<TriageScore>,
    hits: &[SearchHit],
    threshold: u8,
    cap: usize,
) -> Vec<String> {
    let ranks: HashMap<&str, usize> = hits.iter().map(|h| (h.url.as_str(), h.rank)).collect();
    let mut qualifying: Vec<(u8, usize, String)> = scores
        .into_iter()
        .filter(|s| s.score >= threshold)
        .filter_map(|s| ranks.get(s.url.as_str()).map(|&r| (s.score, r, s.url)))
        .collect();
    qualifying.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let mut seen = HashSet::new();
    qualifying
        .into_iter()
        .filter(|(_, _, url)| seen.insert(url.clone()))
        .take(cap)
        .map(|(_, _, url)| url)
        .collect()
}

/// Best survivor: composite score, then independent source count, then
/// assembly order.
fn pick_best(
    mut survivors: Vec<Candidate>,
    sub_min: u64,
    sub_max: u64,
    max_inactive_days: i64,
    now: chrono::DateTime<Utc>,
) -> Candidate {
    survivors.sort_by(|a, b| {
        let score_a = a.composite_score(sub_min, sub_max, max_inactive_days, now);
        let score_b = b.composite_score(sub_min, sub_max, max_inactive_days, now);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.independent_sources().cmp(&a.independent_sources()))
    });
    survivors.remove(0)
}

/// Recognize a channel URL in a search hit.
fn channel_url_from(url: &str) -> Option<String> {
    let pattern = Regex::new(
        r"^https?://(?:www\.)?youtube\.com/(?:@[A-Za-z0-9_.-]+|channel/UC[A-Za-z0-9_-]{22}|c/[A-Za-z0-9_.-]+|user/[A-Za-z0-9_.-]+)",
    )
    .expect("valid regex");
    pattern.find(url).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str, rank: usize) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: "t".to_string(),
            snippet: "s".to_string(),
            rank,
        }
    }

    fn score(url: &str, score: u8) -> TriageScore {
        TriageScore {
            url: url.to_string(),
            score,
            reason: String::new(),
        }
    }

    #[test]
    fn selection_orders_by_score_then_rank() {
        let hits = vec![hit("http://a", 0), hit("http://b", 1), hit("http://c", 2)];
        let scores = vec![score("http://a", 5), score("http://b", 8), score("http://c", 8)];

        let selected = select_for_fetch(scores, &hits, 4, 10);
        assert_eq!(selected, vec!["http://b", "http://c", "http://a"]);
    }

    #[test]
    fn selection_applies_threshold_and_cap() {
        let hits = vec![hit("http://a", 0), hit("http://b", 1), hit("http://c", 2)];
        let scores = vec![score("http://a", 9), score("http://b", 3), score("http://c", 7)];

        let selected = select_for_fetch(scores, &hits, 4, 1);
        assert_eq!(selected, vec!["http://a"]);
    }

    #[test]
    fn selection_ignores_urls_the_search_never_returned() {
        let hits = vec![hit("http://a", 0)];
        let scores = vec![score("http://a", 9), score("http://invented", 10)];

        let selected = select_for_fetch(scores, &hits, 4, 10);
        assert_eq!(selected, vec!["http://a"]);
    }

    #[test]
    fn recognizes_channel_urls() {
        assert_eq!(
            channel_url_from("https://www.youtube.com/@springfieldcinema?sub=1"),
            Some("https://www.youtube.com/@springfieldcinema".to_string())
        );
        assert!(channel_url_from("https://www.youtube.com/watch?v=abc").is_none());
        assert!(channel_url_from("https://example.com/@user").is_none());
    }

    #[test]
    fn best_candidate_prefers_more_sources() {
        let mut a = Candidate::new("A", Some("h".to_string()));
        a.confidence = 0.5;
        let mut b = Candidate::new("B", Some("h".to_string()));
        b.confidence = 0.5;
        for (i, c) in [&mut a, &mut b].into_iter().enumerate() {
            for d in 0..=i {
                c.add_fragment(Fragment {
                    id: Uuid::new_v4(),
                    source_url: format!("https://site{d}.example.com/p"),
                    subject: c.name.clone(),
                    channel_url: None,
                    span: String::new(),
                    locality_relevant: true,
                    category_relevant: true,
                    confidence: 0.5,
                    search_query: String::new(),
                    wave: 1,
                    extracted_at: Utc::now(),
                });
            }
        }

        let best = pick_best(vec![a, b], 20_000, 150_000, 30, Utc::now());
        assert_eq!(best.name, "B");
    }
}
