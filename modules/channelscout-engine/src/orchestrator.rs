//! Run coordination over the region → locality → category tree.
//!
//! Regions, localities, and slots advance strictly in order; concurrency
//! lives inside a wave, never across slots. The orchestrator owns all slot
//! state mutation, calls the wave executor and escalation planner, and
//! emits progress events. A stop signal checked between every unit of work
//! leaves in-flight slots unresolved, so a later run can resume them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use channelscout_common::{
    CategorySlot, EngineConfig, Geography, ProgressEvent, ProgressSink, ResolutionStatus,
    RunReport, ScoutError, SlotOutcome, SlotReport,
};

use crate::escalation::EscalationPlanner;
use crate::traits::{ChannelChecker, EscalationAdvice, PageFetcher, ResearchOracle, SearchProvider};
use crate::wave::WaveExecutor;

/// Cooperative cancellation handle. Cloneable; any holder can stop the run.
#[derive(Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator {
    executor: WaveExecutor,
    planner: EscalationPlanner,
    config: EngineConfig,
    sink: Arc<dyn ProgressSink>,
    stop: StopSignal,
}

impl Orchestrator {
    pub fn new(
        searcher: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        checker: Arc<dyn ChannelChecker>,
        oracle: Arc<dyn ResearchOracle>,
        config: EngineConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let stop = StopSignal::new();
        Self {
            executor: WaveExecutor::new(
                searcher,
                fetcher,
                checker,
                Arc::clone(&oracle),
                config.clone(),
                stop.clone(),
            ),
            planner: EscalationPlanner::new(oracle),
            config,
            sink,
            stop,
        }
    }

    /// Handle for stopping the run from another task.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Resolve every slot in the geography, in order. `prior` is a report
    /// from an earlier interrupted run; its terminal slots are carried over
    /// without re-research. Geography validation is the one fatal check.
    pub async fn run(
        &self,
        geography: &mut Geography,
        prior: Option<&RunReport>,
    ) -> Result<RunReport, ScoutError> {
        geography.validate()?;
        info!(
            regions = geography.regions.len(),
            slots = geography.slot_count(),
            "Run starting"
        );

        let mut report = RunReport {
            started_at: Some(Utc::now()),
            ..RunReport::default()
        };

        'regions: for region in &mut geography.regions {
            if self.stop.is_stopped() {
                break;
            }
            region.status = ResolutionStatus::InProgress;

            for locality in &mut region.localities {
                if self.stop.is_stopped() {
                    break 'regions;
                }
                locality.status = ResolutionStatus::InProgress;

                for slot in &mut locality.slots {
                    if self.stop.is_stopped() {
                        break 'regions;
                    }
                    if let Some(prior) = prior {
                        if let Some(settled) = prior
                            .get(&region.name, &locality.name, &slot.category)
                            .filter(|s| s.status.is_terminal())
                        {
                            info!(
                                region = region.name,
                                locality = locality.name,
                                category = slot.category,
                                status = ?settled.status,
                                "Slot already settled in prior run"
                            );
                            slot.outcome = settled.status;
                            slot.waves_attempted = settled.waves_attempted;
                            slot.failure = settled.failure;
                            report.insert(
                                &region.name,
                                &locality.name,
                                &slot.category,
                                settled.clone(),
                            );
                            continue;
                        }
                    }

                    self.run_slot(&region.name, &locality.name, slot).await?;
                    report.insert(
                        &region.name,
                        &locality.name,
                        &slot.category,
                        SlotReport {
                            status: slot.outcome,
                            waves_attempted: slot.waves_attempted,
                            candidate: slot.best_candidate().cloned(),
                            failure: slot.failure,
                        },
                    );
                    if slot.outcome.is_terminal() {
                        self.sink.report(ProgressEvent::SlotTerminal {
                            region: region.name.clone(),
                            locality: locality.name.clone(),
                            category: slot.category.clone(),
                            outcome: slot.outcome,
                            waves_attempted: slot.waves_attempted,
                        });
                    }
                }

                if locality.all_slots_terminal() {
                    locality.status = ResolutionStatus::Resolved;
                    let succeeded = locality
                        .slots
                        .iter()
                        .filter(|s| s.outcome == SlotOutcome::Succeeded)
                        .count() as u32;
                    let exhausted = locality
                        .slots
                        .iter()
                        .filter(|s| s.outcome == SlotOutcome::FailedExhausted)
                        .count() as u32;
                    self.sink.report(ProgressEvent::LocalityResolved {
                        region: region.name.clone(),
                        locality: locality.name.clone(),
                        succeeded_slots: succeeded,
                        exhausted_slots: exhausted,
                    });
                }
            }

            if region.all_localities_resolved() {
                region.status = ResolutionStatus::Resolved;
                self.sink.report(ProgressEvent::RegionResolved {
                    region: region.name.clone(),
                });
            }
        }

        report.finished_at = Some(Utc::now());
        let summary = report.summary();
        self.sink
            .report(ProgressEvent::RunCompleted { summary });
        info!(%summary, "Run finished");
        Ok(report)
    }

    /// Wave loop for one slot: execute, and on failure consult the planner
    /// unless the cap is already reached. A stop mid-slot leaves the slot
    /// unresolved rather than failed.
    async fn run_slot(
        &self,
        region: &str,
        locality: &str,
        slot: &mut CategorySlot,
    ) -> Result<(), ScoutError> {
        let mut prior_queries: Vec<String> = Vec::new();

        for wave in (slot.waves_attempted + 1)..=self.config.wave_cap {
            self.sink.report(ProgressEvent::WaveStarted {
                region: region.to_string(),
                locality: locality.to_string(),
                category: slot.category.clone(),
                wave,
                angle: slot.directive.angle,
            });

            let (outcome, queries) = match self
                .executor
                .execute(locality, region, &slot.category, &slot.directive, wave, &prior_queries)
                .await
            {
                Ok(result) => result,
                Err(ScoutError::Shutdown) => {
                    info!(region, locality, category = slot.category, "Slot interrupted");
                    return Ok(());
                }
                Err(e) => {
                    error!(region, locality, category = slot.category, error = %e, "Wave aborted");
                    return Err(e);
                }
            };
            prior_queries.extend(queries);
            slot.waves_attempted = wave;
            let succeeded = outcome.succeeded();
            self.sink.report(ProgressEvent::WaveCompleted {
                region: region.to_string(),
                locality: locality.to_string(),
                category: slot.category.clone(),
                wave,
                succeeded,
                failure: outcome.failure,
                candidate_name: outcome.candidate.as_ref().map(|c| c.name.clone()),
            });
            let failure = outcome.failure;
            slot.history.push(outcome);

            if succeeded {
                slot.outcome = SlotOutcome::Succeeded;
                slot.failure = None;
                return Ok(());
            }

            slot.failure = failure;
            if wave == self.config.wave_cap {
                slot.outcome = SlotOutcome::FailedExhausted;
                return Ok(());
            }

            match self
                .planner
                .plan(locality, region, &slot.category, &slot.history)
                .await
            {
                EscalationAdvice::Escalate(directive) => {
                    slot.directive = directive;
                }
                EscalationAdvice::Exhausted { reason } => {
                    info!(region, locality, category = slot.category, reason, "Slot exhausted");
                    slot.outcome = SlotOutcome::FailedExhausted;
                    return Ok(());
                }
            }
        }

        // Cap was already reached before this call (resumed slot).
        if slot.waves_attempted >= self.config.wave_cap && !slot.outcome.is_terminal() {
            slot.outcome = SlotOutcome::FailedExhausted;
        }
        Ok(())
    }
}
