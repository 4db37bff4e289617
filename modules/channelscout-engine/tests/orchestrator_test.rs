//! End-to-end orchestrator runs over fully mocked capabilities.
//!
//! Every scenario drives the real wave executor and escalation planner;
//! only the trait boundaries (search, fetch, channel check, oracle) are
//! scripted. No network, no inference backend.

use std::sync::Arc;

use channelscout_common::{
    Candidate, Directive, EngineConfig, FailureReason, ProgressEvent, QueryAngle, SlotOutcome,
    SlotReport,
};
use channelscout_engine::orchestrator::Orchestrator;
use channelscout_engine::testing::{
    accepting_verdict, healthy_stats, test_fragment, test_hit, test_page, tiny_geography,
    CollectingSink, MockChecker, MockFetcher, MockOracle, MockSearcher,
};
use channelscout_engine::traits::{EscalationAdvice, ProposedQuery, TriageScore};

const CHANNEL_URL: &str = "https://www.youtube.com/@jamierivers";

/// Searcher yielding two hits on distinct domains for page 0 of any query.
fn working_searcher() -> MockSearcher {
    MockSearcher::new().on_search(|_query, page| {
        if page == 0 {
            Ok(vec![
                test_hit("https://sitea.example.com/profile", 0),
                test_hit("https://siteb.example.com/story", 1),
            ])
        } else {
            Ok(Vec::new())
        }
    })
}

/// Oracle scripted for a wave that succeeds outright.
fn working_oracle() -> MockOracle {
    MockOracle::new()
        .on_generate_queries(|directive, _prior| {
            Ok(vec![
                ProposedQuery {
                    query: "springfield cinema youtuber".to_string(),
                    angle: directive.angle.to_string(),
                },
                ProposedQuery {
                    query: "local film channel springfield".to_string(),
                    angle: directive.angle.to_string(),
                },
                ProposedQuery {
                    query: "springfield movie reviewer interview".to_string(),
                    angle: directive.angle.to_string(),
                },
                ProposedQuery {
                    query: "illinois cinema creators list".to_string(),
                    angle: directive.angle.to_string(),
                },
            ])
        })
        .on_triage(|hits| {
            Ok(hits
                .iter()
                .map(|h| TriageScore {
                    url: h.url.clone(),
                    score: 9,
                    reason: "local profile".to_string(),
                })
                .collect())
        })
        .on_extract(|page| {
            let mut fragment = test_fragment("Jamie Rivers", &page.url, 1);
            if page.url.contains("sitea") {
                fragment.channel_url = Some(CHANNEL_URL.to_string());
            }
            Ok(vec![fragment])
        })
        .on_assemble(|fragments| {
            let mut candidate = Candidate::new("Jamie Rivers", Some(CHANNEL_URL.to_string()));
            candidate.confidence = 0.9;
            for f in fragments {
                candidate.add_fragment(f.clone());
            }
            Ok(vec![candidate])
        })
        .on_adversarial_verdict(|_| Ok(accepting_verdict()))
        .on_category_verdict(|_| Ok(accepting_verdict()))
}

fn orchestrator(
    searcher: Arc<MockSearcher>,
    oracle: Arc<MockOracle>,
    sink: Arc<CollectingSink>,
) -> Orchestrator {
    Orchestrator::new(
        searcher,
        Arc::new(MockFetcher::new().on_fetch(|url| Ok(test_page(url)))),
        Arc::new(MockChecker::new().on_check(|_| Ok(healthy_stats("Jamie Rivers")))),
        oracle,
        EngineConfig::default(),
        sink,
    )
}

#[tokio::test]
async fn every_slot_gets_exactly_one_report_entry() {
    let searcher = Arc::new(working_searcher());
    let oracle = Arc::new(working_oracle());
    let sink = Arc::new(CollectingSink::new());
    let orch = orchestrator(Arc::clone(&searcher), Arc::clone(&oracle), Arc::clone(&sink));

    let mut geography = tiny_geography("Illinois", "Springfield", &["cinema", "gaming"]);
    let report = orch.run(&mut geography, None).await.unwrap();

    assert_eq!(report.summary().total, 2);
    for category in ["cinema", "gaming"] {
        let slot = report.get("Illinois", "Springfield", category).unwrap();
        assert_eq!(slot.status, SlotOutcome::Succeeded);
        assert_eq!(slot.waves_attempted, 1);
        assert_eq!(slot.candidate.as_ref().unwrap().name, "Jamie Rivers");
    }
}

#[tokio::test]
async fn first_wave_success_never_consults_the_planner() {
    let searcher = Arc::new(working_searcher());
    let oracle = Arc::new(working_oracle());
    let sink = Arc::new(CollectingSink::new());
    let orch = orchestrator(Arc::clone(&searcher), Arc::clone(&oracle), Arc::clone(&sink));

    let mut geography = tiny_geography("Illinois", "Springfield", &["cinema"]);
    let report = orch.run(&mut geography, None).await.unwrap();

    assert_eq!(report.summary().succeeded, 1);
    assert_eq!(oracle.plan_calls(), 0);

    let events = sink.events();
    let wave_starts = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::WaveStarted { .. }))
        .count();
    assert_eq!(wave_starts, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::RegionResolved { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::RunCompleted { .. })));
}

#[tokio::test]
async fn cap_bounds_waves_and_exhausts_the_slot_once() {
    // Search finds nothing, planner always offers another angle.
    let searcher = Arc::new(MockSearcher::new().on_search(|_, _| Ok(Vec::new())));
    let oracle = Arc::new(MockOracle::new().on_plan_escalation(|history| {
        let angle = match history.len() {
            1 => QueryAngle::Press,
            _ => QueryAngle::Forums,
        };
        Ok(EscalationAdvice::Escalate(Directive {
            angle,
            triage_threshold: None,
            focus: String::new(),
        }))
    }));
    let sink = Arc::new(CollectingSink::new());
    let orch = orchestrator(Arc::clone(&searcher), Arc::clone(&oracle), Arc::clone(&sink));

    let mut geography = tiny_geography("Illinois", "Springfield", &["cinema"]);
    let report = orch.run(&mut geography, None).await.unwrap();

    let slot = report.get("Illinois", "Springfield", "cinema").unwrap();
    assert_eq!(slot.status, SlotOutcome::FailedExhausted);
    assert_eq!(slot.waves_attempted, 3);
    assert_eq!(slot.failure, Some(FailureReason::NoCandidates));

    // Planner runs after wave 1 and wave 2, never after the final wave.
    assert_eq!(oracle.plan_calls(), 2);

    let events = sink.events();
    let terminal_events = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::SlotTerminal { .. }))
        .count();
    assert_eq!(terminal_events, 1);
}

#[tokio::test]
async fn planner_exhaustion_ends_the_slot_after_two_waves() {
    use std::sync::atomic::{AtomicBool, Ordering};

    // Wave 1: empty search, no candidates. Wave 2: a candidate emerges but
    // its channel is far outside the subscriber band, and the planner then
    // declares the slot exhausted. Two waves, not three.
    let escalated = Arc::new(AtomicBool::new(false));
    let escalated_for_search = Arc::clone(&escalated);
    let searcher = Arc::new(MockSearcher::new().on_search(move |_query, page| {
        if !escalated_for_search.load(Ordering::SeqCst) || page > 0 {
            Ok(Vec::new())
        } else {
            Ok(vec![
                test_hit("https://sitea.example.com/profile", 0),
                test_hit("https://siteb.example.com/story", 1),
            ])
        }
    }));
    let escalated_for_plan = Arc::clone(&escalated);
    let oracle = Arc::new(working_oracle().on_plan_escalation(move |history| {
        if history.len() == 1 {
            escalated_for_plan.store(true, Ordering::SeqCst);
            Ok(EscalationAdvice::Escalate(Directive {
                angle: QueryAngle::Press,
                triage_threshold: None,
                focus: String::new(),
            }))
        } else {
            Ok(EscalationAdvice::Exhausted {
                reason: "no remaining plausible angle".to_string(),
            })
        }
    }));
    let sink = Arc::new(CollectingSink::new());
    let orch = Orchestrator::new(
        searcher,
        Arc::new(MockFetcher::new().on_fetch(|url| Ok(test_page(url)))),
        Arc::new(MockChecker::new().on_check(|_| {
            Ok(channelscout_common::ChannelStats {
                subscriber_count: 2_000_000,
                ..healthy_stats("Jamie Rivers")
            })
        })),
        oracle,
        EngineConfig::default(),
        sink.clone(),
    );

    let mut geography = tiny_geography("Illinois", "Springfield", &["cinema"]);
    let report = orch.run(&mut geography, None).await.unwrap();

    let slot = report.get("Illinois", "Springfield", "cinema").unwrap();
    assert_eq!(slot.status, SlotOutcome::FailedExhausted);
    assert_eq!(slot.waves_attempted, 2);
    assert_eq!(slot.failure, Some(FailureReason::AllRejected));

    // The locality and region still resolve: exhausted is terminal.
    let events = sink.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::LocalityResolved { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::RegionResolved { .. })));
}

#[tokio::test]
async fn consecutive_waves_never_share_an_angle() {
    let searcher = Arc::new(MockSearcher::new().on_search(|_, _| Ok(Vec::new())));
    // A planner that always parrots the angle that just failed.
    let oracle = Arc::new(MockOracle::new().on_plan_escalation(|history| {
        let last = history
            .last()
            .map(|w| w.directive.angle)
            .unwrap_or(QueryAngle::Direct);
        Ok(EscalationAdvice::Escalate(Directive {
            angle: last,
            triage_threshold: None,
            focus: String::new(),
        }))
    }));
    let sink = Arc::new(CollectingSink::new());
    let orch = orchestrator(Arc::clone(&searcher), Arc::clone(&oracle), Arc::clone(&sink));

    let mut geography = tiny_geography("Illinois", "Springfield", &["cinema"]);
    orch.run(&mut geography, None).await.unwrap();

    let angles: Vec<QueryAngle> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::WaveStarted { angle, .. } => Some(*angle),
            _ => None,
        })
        .collect();
    assert_eq!(angles.len(), 3);
    for pair in angles.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
}

#[tokio::test]
async fn resume_skips_slots_a_prior_run_settled() {
    let searcher = Arc::new(working_searcher());
    let oracle = Arc::new(working_oracle());
    let sink = Arc::new(CollectingSink::new());
    let orch = orchestrator(Arc::clone(&searcher), Arc::clone(&oracle), Arc::clone(&sink));

    let mut prior = channelscout_common::RunReport::default();
    prior.insert(
        "Illinois",
        "Springfield",
        "cinema",
        SlotReport {
            status: SlotOutcome::FailedExhausted,
            waves_attempted: 3,
            candidate: None,
            failure: Some(FailureReason::NoCandidates),
        },
    );

    let mut geography = tiny_geography("Illinois", "Springfield", &["cinema", "gaming"]);
    let report = orch.run(&mut geography, Some(&prior)).await.unwrap();

    // The settled slot carries over untouched; only gaming was researched.
    let cinema = report.get("Illinois", "Springfield", "cinema").unwrap();
    assert_eq!(cinema.status, SlotOutcome::FailedExhausted);
    assert_eq!(cinema.waves_attempted, 3);
    let gaming = report.get("Illinois", "Springfield", "gaming").unwrap();
    assert_eq!(gaming.status, SlotOutcome::Succeeded);
    assert_eq!(oracle.generate_calls(), 1);
}

#[tokio::test]
async fn stop_signal_leaves_in_flight_slots_unresolved() {
    let sink = Arc::new(CollectingSink::new());
    let oracle = Arc::new(working_oracle());

    // The searcher trips the stop signal on its first call; the wave then
    // aborts at the next stage boundary.
    let stop_holder: Arc<std::sync::Mutex<Option<channelscout_engine::orchestrator::StopSignal>>> =
        Arc::new(std::sync::Mutex::new(None));
    let stop_for_search = Arc::clone(&stop_holder);
    let searcher = Arc::new(MockSearcher::new().on_search(move |_, _| {
        if let Ok(guard) = stop_for_search.lock() {
            if let Some(stop) = guard.as_ref() {
                stop.stop();
            }
        }
        Ok(vec![test_hit("https://sitea.example.com/profile", 0)])
    }));
    let orch = orchestrator(searcher, oracle, Arc::clone(&sink));
    if let Ok(mut guard) = stop_holder.lock() {
        *guard = Some(orch.stop_signal());
    }

    let mut geography = tiny_geography("Illinois", "Springfield", &["cinema", "gaming"]);
    let report = orch.run(&mut geography, None).await.unwrap();

    let summary = report.summary();
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.exhausted, 0);
    assert!(!report.is_terminal("Illinois", "Springfield", "cinema"));
    assert!(!report.is_terminal("Illinois", "Springfield", "gaming"));
    assert!(!sink
        .events()
        .iter()
        .any(|e| matches!(e, ProgressEvent::LocalityResolved { .. })));
}

#[tokio::test]
async fn empty_geography_is_fatal() {
    let orch = orchestrator(
        Arc::new(MockSearcher::new()),
        Arc::new(MockOracle::new()),
        Arc::new(CollectingSink::new()),
    );
    let mut geography = channelscout_common::Geography { regions: Vec::new() };

    let result = orch.run(&mut geography, None).await;
    assert!(matches!(
        result,
        Err(channelscout_common::ScoutError::Geography(_))
    ));
}
