use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScoutError;

// --- Statuses ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Pending,
    InProgress,
    Resolved,
}

/// Terminal outcome of a category slot. `Unresolved` is the only
/// non-terminal state; an interrupted run leaves slots here so a later
/// run can resume them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlotOutcome {
    Unresolved,
    Succeeded,
    FailedExhausted,
}

impl SlotOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SlotOutcome::Unresolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoCandidates,
    AllRejected,
    VerificationFailed,
    NetworkExhausted,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NoCandidates => write!(f, "no-candidates"),
            FailureReason::AllRejected => write!(f, "all-rejected"),
            FailureReason::VerificationFailed => write!(f, "verification-failed"),
            FailureReason::NetworkExhausted => write!(f, "network-exhausted"),
        }
    }
}

// --- Strategy directives ---

/// Query angle class a wave searches under. Escalation rotates through
/// these; two consecutive waves never share an angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryAngle {
    Direct,
    Press,
    Forums,
    Listings,
    Events,
    Social,
    Lists,
}

impl QueryAngle {
    /// Rotation order used when the planner must pick a materially
    /// different angle deterministically.
    pub const ALL: [QueryAngle; 7] = [
        QueryAngle::Direct,
        QueryAngle::Press,
        QueryAngle::Forums,
        QueryAngle::Listings,
        QueryAngle::Events,
        QueryAngle::Social,
        QueryAngle::Lists,
    ];
}

impl std::fmt::Display for QueryAngle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryAngle::Direct => write!(f, "direct"),
            QueryAngle::Press => write!(f, "press"),
            QueryAngle::Forums => write!(f, "forums"),
            QueryAngle::Listings => write!(f, "listings"),
            QueryAngle::Events => write!(f, "events"),
            QueryAngle::Social => write!(f, "social"),
            QueryAngle::Lists => write!(f, "lists"),
        }
    }
}

/// Strategy parameters for one wave. Attached to a category slot and
/// replaced wholesale by the escalation planner between waves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Directive {
    pub angle: QueryAngle,
    /// Overrides the configured triage threshold when set (0-10).
    pub triage_threshold: Option<u8>,
    /// Free-text guidance fed to query generation.
    pub focus: String,
}

impl Default for Directive {
    fn default() -> Self {
        Self {
            angle: QueryAngle::Direct,
            triage_threshold: None,
            focus: String::new(),
        }
    }
}

// --- Evidence ---

/// One unit of extracted evidence tied to a source page. Immutable once
/// created.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Fragment {
    pub id: Uuid,
    pub source_url: String,
    /// Who the evidence is about: the creator or channel name as the page
    /// gives it.
    pub subject: String,
    /// Channel URL cited by the page, when one was given.
    pub channel_url: Option<String>,
    /// The text span supporting the claim, verbatim from the page.
    pub span: String,
    pub locality_relevant: bool,
    pub category_relevant: bool,
    pub confidence: f32,
    pub search_query: String,
    pub wave: u32,
    pub extracted_at: DateTime<Utc>,
}

impl Fragment {
    pub fn domain(&self) -> String {
        source_domain(&self.source_url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    ChannelChecked,
    AdversariallyConfirmed,
    Rejected,
}

/// Metadata observed on the channel itself during verification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChannelStats {
    pub title: String,
    pub description: String,
    pub subscriber_count: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// A prospective channel assembled from corroborating fragments.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Candidate {
    pub id: Uuid,
    pub name: String,
    /// Resolvable channel handle or URL, once known.
    pub handle: Option<String>,
    pub fragments: Vec<Fragment>,
    pub confidence: f32,
    pub status: VerificationStatus,
    pub channel: Option<ChannelStats>,
    pub locality_score: f32,
    pub category_score: f32,
}

impl Candidate {
    pub fn new(name: impl Into<String>, handle: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            handle,
            fragments: Vec::new(),
            confidence: 0.0,
            status: VerificationStatus::Unverified,
            channel: None,
            locality_score: 0.0,
            category_score: 0.0,
        }
    }

    pub fn add_fragment(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Number of distinct source domains backing this candidate.
    pub fn independent_sources(&self) -> usize {
        let mut domains: Vec<String> = self.fragments.iter().map(|f| f.domain()).collect();
        domains.sort();
        domains.dedup();
        domains.len()
    }

    /// Whether the subscriber count sits inside the configured band and the
    /// channel showed activity within the window.
    pub fn passes_activity_policy(
        &self,
        sub_min: u64,
        sub_max: u64,
        max_inactive_days: i64,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(stats) = &self.channel else {
            return false;
        };
        if stats.subscriber_count < sub_min || stats.subscriber_count > sub_max {
            return false;
        }
        match stats.last_activity {
            Some(at) => (now - at).num_days() <= max_inactive_days,
            None => false,
        }
    }

    /// Composite score. Weights: locality evidence 0.30, category fit 0.15,
    /// subscriber band 0.25, recent activity 0.20, independent sources 0.10.
    pub fn composite_score(
        &self,
        sub_min: u64,
        sub_max: u64,
        max_inactive_days: i64,
        now: DateTime<Utc>,
    ) -> f32 {
        let Some(stats) = &self.channel else {
            return 0.0;
        };
        let sub_ok = stats.subscriber_count >= sub_min && stats.subscriber_count <= sub_max;
        let active = stats
            .last_activity
            .map(|at| (now - at).num_days() <= max_inactive_days)
            .unwrap_or(false);
        let sources = (self.independent_sources() as f32 / 3.0).min(1.0);

        0.30 * self.locality_score
            + 0.15 * self.category_score
            + 0.25 * if sub_ok { 1.0 } else { 0.0 }
            + 0.20 * if active { 1.0 } else { 0.0 }
            + 0.10 * sources
    }
}

// --- Wave records ---

/// Immutable record of one wave's result for a category slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveOutcome {
    pub wave: u32,
    pub directive: Directive,
    pub candidate: Option<Candidate>,
    pub failure: Option<FailureReason>,
    /// Fragments that could not be corroborated into a candidate. Kept so
    /// later waves and the escalation planner can see what almost worked.
    pub weak_signals: Vec<Fragment>,
    pub completed_at: DateTime<Utc>,
}

impl WaveOutcome {
    pub fn succeeded(&self) -> bool {
        self.candidate.is_some() && self.failure.is_none()
    }
}

// --- Geography ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySlot {
    pub category: String,
    pub waves_attempted: u32,
    pub directive: Directive,
    pub outcome: SlotOutcome,
    pub failure: Option<FailureReason>,
    pub history: Vec<WaveOutcome>,
}

impl CategorySlot {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            waves_attempted: 0,
            directive: Directive::default(),
            outcome: SlotOutcome::Unresolved,
            failure: None,
            history: Vec::new(),
        }
    }

    pub fn best_candidate(&self) -> Option<&Candidate> {
        self.history.iter().rev().find_map(|w| w.candidate.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Locality {
    pub name: String,
    pub status: ResolutionStatus,
    pub slots: Vec<CategorySlot>,
}

impl Locality {
    pub fn new(name: impl Into<String>, categories: &[String]) -> Self {
        Self {
            name: name.into(),
            status: ResolutionStatus::Pending,
            slots: categories.iter().map(CategorySlot::new).collect(),
        }
    }

    /// A locality is resolved when every slot has reached a terminal state.
    pub fn all_slots_terminal(&self) -> bool {
        self.slots.iter().all(|s| s.outcome.is_terminal())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub status: ResolutionStatus,
    pub localities: Vec<Locality>,
}

impl Region {
    pub fn all_localities_resolved(&self) -> bool {
        self.localities
            .iter()
            .all(|l| l.status == ResolutionStatus::Resolved)
    }
}

/// The full region → locality → category tree a run must resolve. Owned by
/// the orchestrator; observers only ever see snapshots or the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geography {
    pub regions: Vec<Region>,
}

impl Geography {
    pub fn new(regions: Vec<(String, Vec<String>)>, categories: &[String]) -> Self {
        Self {
            regions: regions
                .into_iter()
                .map(|(name, localities)| Region {
                    name,
                    status: ResolutionStatus::Pending,
                    localities: localities
                        .into_iter()
                        .map(|l| Locality::new(l, categories))
                        .collect(),
                })
                .collect(),
        }
    }

    /// Reject malformed geographies before any network traffic. This is the
    /// one fatal validation in the system: everything downstream degrades to
    /// tagged failures instead.
    pub fn validate(&self) -> Result<(), ScoutError> {
        if self.regions.is_empty() {
            return Err(ScoutError::Geography("no regions defined".into()));
        }
        let mut region_names = std::collections::HashSet::new();
        for region in &self.regions {
            if region.name.trim().is_empty() {
                return Err(ScoutError::Geography("region with empty name".into()));
            }
            if !region_names.insert(region.name.as_str()) {
                return Err(ScoutError::Geography(format!(
                    "duplicate region: {}",
                    region.name
                )));
            }
            if region.localities.is_empty() {
                return Err(ScoutError::Geography(format!(
                    "region {} has no localities",
                    region.name
                )));
            }
            let mut locality_names = std::collections::HashSet::new();
            for locality in &region.localities {
                if !locality_names.insert(locality.name.as_str()) {
                    return Err(ScoutError::Geography(format!(
                        "duplicate locality {} in region {}",
                        locality.name, region.name
                    )));
                }
                if locality.slots.is_empty() {
                    return Err(ScoutError::Geography(format!(
                        "locality {} has no category slots",
                        locality.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        self.regions
            .iter()
            .flat_map(|r| &r.localities)
            .map(|l| l.slots.len())
            .sum()
    }
}

// --- Run report ---

/// Final account of one slot: exactly one status per (region, locality,
/// category), plus the supporting candidate when the slot succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotReport {
    pub status: SlotOutcome,
    pub waves_attempted: u32,
    pub candidate: Option<Candidate>,
    pub failure: Option<FailureReason>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// region → locality → category → report.
    pub slots: BTreeMap<String, BTreeMap<String, BTreeMap<String, SlotReport>>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn insert(&mut self, region: &str, locality: &str, category: &str, report: SlotReport) {
        self.slots
            .entry(region.to_string())
            .or_default()
            .entry(locality.to_string())
            .or_default()
            .insert(category.to_string(), report);
    }

    pub fn get(&self, region: &str, locality: &str, category: &str) -> Option<&SlotReport> {
        self.slots.get(region)?.get(locality)?.get(category)
    }

    /// True when a previous run already settled this slot; resume skips it.
    pub fn is_terminal(&self, region: &str, locality: &str, category: &str) -> bool {
        self.get(region, locality, category)
            .map(|s| s.status.is_terminal())
            .unwrap_or(false)
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for localities in self.slots.values() {
            for categories in localities.values() {
                for slot in categories.values() {
                    summary.total += 1;
                    match slot.status {
                        SlotOutcome::Succeeded => summary.succeeded += 1,
                        SlotOutcome::FailedExhausted => summary.exhausted += 1,
                        SlotOutcome::Unresolved => summary.unresolved += 1,
                    }
                }
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: u32,
    pub succeeded: u32,
    pub exhausted: u32,
    pub unresolved: u32,
}

impl std::fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded / {} exhausted / {} unresolved of {} slots",
            self.succeeded, self.exhausted, self.unresolved, self.total
        )
    }
}

/// Lowercased host of a URL, for independent-source counting and
/// per-destination rate limiting.
pub fn source_domain(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_else(|| raw.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(url: &str) -> Fragment {
        Fragment {
            id: Uuid::new_v4(),
            source_url: url.to_string(),
            subject: "Example".into(),
            channel_url: None,
            span: "quote".into(),
            locality_relevant: true,
            category_relevant: true,
            confidence: 0.8,
            search_query: "q".into(),
            wave: 1,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn independent_sources_counts_distinct_domains() {
        let mut candidate = Candidate::new("Example", None);
        candidate.add_fragment(fragment("https://a.example.com/one"));
        candidate.add_fragment(fragment("https://a.example.com/two"));
        candidate.add_fragment(fragment("https://b.example.org/post"));
        assert_eq!(candidate.independent_sources(), 2);
    }

    #[test]
    fn activity_policy_rejects_out_of_band_subscribers() {
        let mut candidate = Candidate::new("Example", Some("https://youtube.com/@x".into()));
        candidate.channel = Some(ChannelStats {
            title: "x".into(),
            description: String::new(),
            subscriber_count: 5_000,
            last_activity: Some(Utc::now()),
        });
        assert!(!candidate.passes_activity_policy(20_000, 150_000, 30, Utc::now()));

        candidate.channel.as_mut().unwrap().subscriber_count = 50_000;
        assert!(candidate.passes_activity_policy(20_000, 150_000, 30, Utc::now()));
    }

    #[test]
    fn activity_policy_rejects_stale_channels() {
        let mut candidate = Candidate::new("Example", Some("h".into()));
        candidate.channel = Some(ChannelStats {
            title: "x".into(),
            description: String::new(),
            subscriber_count: 50_000,
            last_activity: Some(Utc::now() - chrono::Duration::days(90)),
        });
        assert!(!candidate.passes_activity_policy(20_000, 150_000, 30, Utc::now()));
    }

    #[test]
    fn geography_validation_rejects_duplicates() {
        let categories = vec!["cinema".to_string()];
        let geography = Geography::new(
            vec![
                ("Oregon".into(), vec!["Portland".into(), "Portland".into()]),
            ],
            &categories,
        );
        assert!(geography.validate().is_err());
    }

    #[test]
    fn geography_validation_rejects_empty() {
        let geography = Geography { regions: vec![] };
        assert!(geography.validate().is_err());
    }

    #[test]
    fn report_summary_accounts_for_every_slot() {
        let mut report = RunReport::default();
        report.insert(
            "Oregon",
            "Portland",
            "cinema",
            SlotReport {
                status: SlotOutcome::Succeeded,
                waves_attempted: 1,
                candidate: None,
                failure: None,
            },
        );
        report.insert(
            "Oregon",
            "Portland",
            "gaming",
            SlotReport {
                status: SlotOutcome::FailedExhausted,
                waves_attempted: 3,
                candidate: None,
                failure: Some(FailureReason::NoCandidates),
            },
        );
        let summary = report.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.exhausted, 1);
        assert!(report.is_terminal("Oregon", "Portland", "cinema"));
        assert!(!report.is_terminal("Oregon", "Portland", "culture"));
    }
}
