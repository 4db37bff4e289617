//! Oracle prompt kinds over the local inference backend.
//!
//! Each method is one schema-validated structured call. Wire structs are
//! deliberately separate from the domain types: the oracle's output shape
//! can drift without bending the data model, and drift surfaces as
//! `ClientError::MalformedResponse`, a stage failure, never fatal.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use channelscout_common::{
    Candidate, ClientError, Directive, Fragment, QueryAngle, WaveOutcome,
};
use oracle_client::util::truncate_to_char_boundary;
use oracle_client::{Oracle, OracleError};

use crate::limiter::RateLimiter;
use crate::regions::category_label;
use crate::traits::{
    EscalationAdvice, PageContent, ProposedQuery, ResearchOracle, SearchHit, TriageScore, Verdict,
};

/// Destination key for oracle pacing. The backend is local but still
/// serialized with everything else so a burst of extractions cannot starve
/// search traffic.
const ORACLE_DEST: &str = "oracle";

/// Snippets scored per triage call.
const TRIAGE_BATCH: usize = 30;

/// Page text budget per extraction call.
const PAGE_TEXT_BYTES: usize = 12_000;

// --- Prompts ---

const QUERY_GENERATION_SYSTEM: &str = "\
You research regional social-media creators. Generate 6-8 web search queries \
to find active channels based in the given locality and topic category. \
Follow the requested angle class strictly. Quote the locality name in most \
queries. Never repeat or lightly rephrase a previously tried query.";

const TRIAGE_SYSTEM: &str = "\
Score each search result 0-10 for how likely the page names a content \
creator based in the target locality working in the target category. \
10 = a local press profile or list naming local creators. \
0 = unrelated, national-scope, or a different locality. Score every result.";

const EXTRACTION_SYSTEM: &str = "\
Extract creators mentioned on this page who are plausibly based in the \
target locality and work in the target category. For each, give the name, \
any channel URL cited, and the verbatim quote tying them to the locality. \
Set page_relevant=false when the page names no local creators.";

const ASSEMBLY_SYSTEM: &str = "\
Cross-reference these evidence fragments into channel candidates. Merge \
fragments about the same creator (name variants, same channel URL). For \
each candidate list the supporting fragment indices and a 0-1 confidence \
that this is a real, locality-based creator in the category.";

const FOLLOWUP_SYSTEM: &str = "\
This candidate is missing a confirmed channel handle. Generate 1-3 narrow \
search queries to find their channel URL. Quote the creator's exact name.";

const ADVERSARIAL_SYSTEM: &str = "\
Play devil's advocate. Argue that this candidate is NOT a creator based in \
the target locality working in the target category: look for relocation, \
national scope, locality name collisions, or evidence about a different \
person. Then give a 0-1 score for how well the candidate survives your \
attack, and accept only survivors.";

const CATEGORY_SYSTEM: &str = "\
Judge whether this channel's actual content matches the target category. \
Score 0-1 and accept when the category fit is plausible.";

const ESCALATION_SYSTEM: &str = "\
A research wave failed for this locality and category. Read the wave \
history and pick the next strategy: a materially different query angle \
(direct, press, forums, listings, events, social, lists), optionally a \
different triage threshold, and a one-line focus note. Declare exhausted \
only when no untried angle could plausibly work.";

// --- Wire schemas ---

#[derive(Debug, Deserialize, JsonSchema)]
struct QueriesResponse {
    #[serde(default)]
    strategy_reasoning: Option<String>,
    queries: Vec<WireQuery>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WireQuery {
    query: String,
    #[serde(default)]
    angle: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TriageResponse {
    scored_results: Vec<WireScore>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WireScore {
    url: String,
    score: u8,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractionResponse {
    page_relevant: bool,
    #[serde(default)]
    creators: Vec<WireCreator>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WireCreator {
    name: String,
    #[serde(default)]
    channel_url: Option<String>,
    #[serde(default)]
    locality_quote: String,
    #[serde(default)]
    locality_relevant: bool,
    #[serde(default)]
    category_relevant: bool,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AssemblyResponse {
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WireCandidate {
    name: String,
    #[serde(default)]
    channel_url: Option<String>,
    /// Indices into the fragment list given in the prompt.
    fragment_indices: Vec<usize>,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FollowupResponse {
    queries: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WireVerdict {
    score: f32,
    accepted: bool,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EscalationResponse {
    exhausted: bool,
    #[serde(default)]
    failure_analysis: String,
    #[serde(default)]
    next_angle: String,
    #[serde(default)]
    triage_threshold: Option<u8>,
    #[serde(default)]
    focus: String,
}

// --- Adapter ---

pub struct LlamaOracle {
    oracle: Oracle,
    limiter: Arc<RateLimiter>,
}

impl LlamaOracle {
    pub fn new(oracle: Oracle, limiter: Arc<RateLimiter>) -> Self {
        Self { oracle, limiter }
    }

    async fn call<T: serde::de::DeserializeOwned + JsonSchema>(
        &self,
        kind: &str,
        system: &str,
        user: &str,
    ) -> Result<T, ClientError> {
        let _permit = self
            .limiter
            .acquire(ORACLE_DEST)
            .await
            .map_err(|_| ClientError::Unavailable("shutdown requested".to_string()))?;
        debug!(kind, "Oracle call");
        self.oracle
            .extract::<T>(system, user)
            .await
            .map_err(|e| map_oracle_error(kind, e))
    }
}

fn map_oracle_error(kind: &str, e: OracleError) -> ClientError {
    match e {
        OracleError::Malformed(detail) => ClientError::MalformedResponse {
            kind: kind.to_string(),
            detail,
        },
        OracleError::Http(detail) => ClientError::Unavailable(detail),
        OracleError::Api { status, body } => {
            ClientError::Unavailable(format!("oracle HTTP {status}: {body}"))
        }
    }
}

pub fn parse_angle(raw: &str) -> Option<QueryAngle> {
    match raw.trim().to_lowercase().as_str() {
        "direct" => Some(QueryAngle::Direct),
        "press" => Some(QueryAngle::Press),
        "forums" | "forum" => Some(QueryAngle::Forums),
        "listings" | "listing" => Some(QueryAngle::Listings),
        "events" | "event" => Some(QueryAngle::Events),
        "social" => Some(QueryAngle::Social),
        "lists" | "list" => Some(QueryAngle::Lists),
        _ => None,
    }
}

#[async_trait]
impl ResearchOracle for LlamaOracle {
    async fn generate_queries(
        &self,
        locality: &str,
        region: &str,
        category: &str,
        directive: &Directive,
        prior_queries: &[String],
    ) -> Result<Vec<ProposedQuery>, ClientError> {
        let prior = if prior_queries.is_empty() {
            String::new()
        } else {
            format!(
                "\nPreviously tried (use completely different angles): {}",
                serde_json::to_string(prior_queries).unwrap_or_default()
            )
        };
        let user = format!(
            "Locality: {locality}, {region}\nCategory: {}\nAngle class: {}\nFocus: {}{prior}",
            category_label(category),
            directive.angle,
            if directive.focus.is_empty() { "none" } else { &directive.focus },
        );

        let response: QueriesResponse = self
            .call("generate_queries", QUERY_GENERATION_SYSTEM, &user)
            .await?;
        if let Some(reasoning) = &response.strategy_reasoning {
            debug!(reasoning = truncate_to_char_boundary(reasoning, 120), "Query strategy");
        }
        Ok(response
            .queries
            .into_iter()
            .map(|q| ProposedQuery {
                query: q.query,
                angle: if q.angle.is_empty() {
                    directive.angle.to_string()
                } else {
                    q.angle
                },
            })
            .collect())
    }

    async fn triage(
        &self,
        hits: &[SearchHit],
        locality: &str,
        region: &str,
        category: &str,
    ) -> Result<Vec<TriageScore>, ClientError> {
        let mut scored = Vec::new();
        for batch in hits.chunks(TRIAGE_BATCH) {
            let results_text: String = batch
                .iter()
                .enumerate()
                .map(|(i, hit)| {
                    format!(
                        "[{}] URL: {}\n    Title: {}\n    Snippet: {}\n",
                        i + 1,
                        hit.url,
                        hit.title,
                        truncate_to_char_boundary(&hit.snippet, 200),
                    )
                })
                .collect();
            let user = format!(
                "Locality: {locality}, {region}\nCategory: {}\n{} results:\n{results_text}",
                category_label(category),
                batch.len(),
            );

            let response: TriageResponse = self.call("triage", TRIAGE_SYSTEM, &user).await?;
            for score in response.scored_results {
                scored.push(TriageScore {
                    url: score.url,
                    score: score.score.min(10),
                    reason: score.reason,
                });
            }
        }
        Ok(scored)
    }

    async fn extract_fragments(
        &self,
        page: &PageContent,
        locality: &str,
        region: &str,
        category: &str,
        query: &str,
        wave: u32,
    ) -> Result<Vec<Fragment>, ClientError> {
        let channel_urls = if page.discovered_urls.is_empty() {
            "None".to_string()
        } else {
            page.discovered_urls.join("\n")
        };
        let user = format!(
            "Locality: {locality}, {region}\nCategory: {}\nSource URL: {}\nChannel URLs on page:\n{channel_urls}\n\nPage text:\n{}",
            category_label(category),
            page.url,
            truncate_to_char_boundary(&page.text, PAGE_TEXT_BYTES),
        );

        let response: ExtractionResponse =
            self.call("extract_fragments", EXTRACTION_SYSTEM, &user).await?;
        if !response.page_relevant {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        Ok(response
            .creators
            .into_iter()
            .map(|c| Fragment {
                id: Uuid::new_v4(),
                source_url: page.url.clone(),
                subject: c.name,
                channel_url: c.channel_url,
                span: c.locality_quote,
                locality_relevant: c.locality_relevant,
                category_relevant: c.category_relevant,
                confidence: c.confidence.clamp(0.0, 1.0),
                search_query: query.to_string(),
                wave,
                extracted_at: now,
            })
            .collect())
    }

    async fn assemble(
        &self,
        fragments: &[Fragment],
        locality: &str,
        region: &str,
        category: &str,
    ) -> Result<Vec<Candidate>, ClientError> {
        let fragments_text: String = fragments
            .iter()
            .enumerate()
            .map(|(i, f)| {
                format!(
                    "--- Fragment {i} (from: {}) ---\nSubject: {}\nChannel URL: {}\nQuote: {}\n",
                    f.source_url,
                    f.subject,
                    f.channel_url.as_deref().unwrap_or("unknown"),
                    truncate_to_char_boundary(&f.span, 300),
                )
            })
            .collect();
        let user = format!(
            "Locality: {locality}, {region}\nCategory: {}\n\n{fragments_text}",
            category_label(category),
        );

        let response: AssemblyResponse = self.call("assemble", ASSEMBLY_SYSTEM, &user).await?;
        let mut candidates = Vec::new();
        for wire in response.candidates {
            let mut candidate = Candidate::new(wire.name, wire.channel_url);
            candidate.confidence = wire.confidence.clamp(0.0, 1.0);
            for idx in wire.fragment_indices {
                if let Some(fragment) = fragments.get(idx) {
                    candidate.add_fragment(fragment.clone());
                    if candidate.handle.is_none() {
                        candidate.handle = fragment.channel_url.clone();
                    }
                }
            }
            candidates.push(candidate);
        }
        Ok(candidates)
    }

    async fn followup_queries(
        &self,
        candidate: &Candidate,
        locality: &str,
    ) -> Result<Vec<String>, ClientError> {
        let user = format!(
            "Creator: {}\nLocality: {locality}\nKnown evidence: {} fragments from {} sources",
            candidate.name,
            candidate.fragments.len(),
            candidate.independent_sources(),
        );
        let response: FollowupResponse =
            self.call("followup_queries", FOLLOWUP_SYSTEM, &user).await?;
        Ok(response.queries)
    }

    async fn adversarial_verdict(
        &self,
        candidate: &Candidate,
        locality: &str,
        region: &str,
        category: &str,
    ) -> Result<Verdict, ClientError> {
        let evidence: String = candidate
            .fragments
            .iter()
            .map(|f| format!("- [{}] \"{}\"\n", f.source_url, truncate_to_char_boundary(&f.span, 200)))
            .collect();
        let channel = candidate
            .channel
            .as_ref()
            .map(|c| format!("{} ({} subscribers): {}", c.title, c.subscriber_count, c.description))
            .unwrap_or_else(|| "unchecked".to_string());
        let user = format!(
            "Candidate: {}\nHandle: {}\nTarget: {locality}, {region} / {}\nChannel: {channel}\nEvidence:\n{evidence}",
            candidate.name,
            candidate.handle.as_deref().unwrap_or("unknown"),
            category_label(category),
        );

        let wire: WireVerdict = self
            .call("adversarial_verdict", ADVERSARIAL_SYSTEM, &user)
            .await?;
        Ok(Verdict {
            score: wire.score.clamp(0.0, 1.0),
            accepted: wire.accepted,
            reasoning: wire.reasoning,
        })
    }

    async fn category_verdict(
        &self,
        candidate: &Candidate,
        category: &str,
    ) -> Result<Verdict, ClientError> {
        let channel = candidate
            .channel
            .as_ref()
            .map(|c| format!("{}: {}", c.title, c.description))
            .unwrap_or_else(|| candidate.name.clone());
        let user = format!(
            "Channel: {channel}\nTarget category: {}",
            category_label(category),
        );

        let wire: WireVerdict = self.call("category_verdict", CATEGORY_SYSTEM, &user).await?;
        Ok(Verdict {
            score: wire.score.clamp(0.0, 1.0),
            accepted: wire.accepted,
            reasoning: wire.reasoning,
        })
    }

    async fn plan_escalation(
        &self,
        locality: &str,
        region: &str,
        category: &str,
        history: &[WaveOutcome],
    ) -> Result<EscalationAdvice, ClientError> {
        let history_text: String = history
            .iter()
            .map(|w| {
                format!(
                    "Wave {} (angle {}): {}\n",
                    w.wave,
                    w.directive.angle,
                    w.failure
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| "succeeded".to_string()),
                )
            })
            .collect();
        let user = format!(
            "Locality: {locality}, {region}\nCategory: {}\nHistory:\n{history_text}",
            category_label(category),
        );

        let response: EscalationResponse = self
            .call("plan_escalation", ESCALATION_SYSTEM, &user)
            .await?;
        if response.exhausted {
            return Ok(EscalationAdvice::Exhausted {
                reason: if response.failure_analysis.is_empty() {
                    "oracle declared no remaining plausible angle".to_string()
                } else {
                    response.failure_analysis
                },
            });
        }
        let angle = parse_angle(&response.next_angle).ok_or_else(|| {
            ClientError::MalformedResponse {
                kind: "plan_escalation".to_string(),
                detail: format!("unknown angle: {}", response.next_angle),
            }
        })?;
        Ok(EscalationAdvice::Escalate(Directive {
            angle,
            triage_threshold: response.triage_threshold.map(|t| t.min(10)),
            focus: response.focus,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_angles_tolerantly() {
        assert_eq!(parse_angle("Press"), Some(QueryAngle::Press));
        assert_eq!(parse_angle(" forum "), Some(QueryAngle::Forums));
        assert_eq!(parse_angle("national tv"), None);
    }
}
