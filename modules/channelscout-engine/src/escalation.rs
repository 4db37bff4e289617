//! Between-wave strategy planning.
//!
//! The oracle proposes the next directive; this layer enforces the rotation
//! guarantee on top of it. Two consecutive waves never run the same angle,
//! and a slot that has tried every angle is exhausted no matter what the
//! oracle says. Oracle failure here is absorbed: planning falls back to a
//! deterministic rotation rather than failing the slot.

use std::sync::Arc;

use tracing::{info, warn};

use channelscout_common::{Directive, QueryAngle, WaveOutcome};

use crate::traits::{EscalationAdvice, ResearchOracle};

pub struct EscalationPlanner {
    oracle: Arc<dyn ResearchOracle>,
}

impl EscalationPlanner {
    pub fn new(oracle: Arc<dyn ResearchOracle>) -> Self {
        Self { oracle }
    }

    /// Decide what the next wave should do after a failure. `history` holds
    /// every completed wave for this slot, most recent last.
    pub async fn plan(
        &self,
        locality: &str,
        region: &str,
        category: &str,
        history: &[WaveOutcome],
    ) -> EscalationAdvice {
        let tried: Vec<QueryAngle> = history.iter().map(|w| w.directive.angle).collect();
        let last_angle = tried.last().copied();
        let untried: Vec<QueryAngle> = QueryAngle::ALL
            .iter()
            .copied()
            .filter(|a| !tried.contains(a))
            .collect();

        if untried.is_empty() {
            info!(locality, category, "Every query angle tried, slot exhausted");
            return EscalationAdvice::Exhausted {
                reason: "all query angles attempted".to_string(),
            };
        }

        let advice = self
            .oracle
            .plan_escalation(locality, region, category, history)
            .await;

        match advice {
            Ok(EscalationAdvice::Exhausted { reason }) => {
                info!(locality, category, reason, "Planner declared slot exhausted");
                EscalationAdvice::Exhausted { reason }
            }
            Ok(EscalationAdvice::Escalate(mut directive)) => {
                if Some(directive.angle) == last_angle {
                    // Rotation guarantee: the oracle repeated the failed
                    // angle, so push it to the next untried one.
                    let replacement = untried[0];
                    warn!(
                        locality,
                        category,
                        repeated = %directive.angle,
                        rotated_to = %replacement,
                        "Planner repeated the last angle, rotating"
                    );
                    directive.angle = replacement;
                }
                info!(
                    locality,
                    category,
                    angle = %directive.angle,
                    focus = directive.focus,
                    "Escalating with new directive"
                );
                EscalationAdvice::Escalate(directive)
            }
            Err(e) => {
                let replacement = untried[0];
                warn!(
                    locality,
                    category,
                    error = %e,
                    fallback = %replacement,
                    "Planner call failed, falling back to angle rotation"
                );
                EscalationAdvice::Escalate(Directive {
                    angle: replacement,
                    triage_threshold: None,
                    focus: format!("previous {} wave found nothing usable", tried.len()),
                })
            }
        }
    }
}
