//! Progress events emitted by the orchestrator.
//!
//! One-way, best-effort: a sink that drops events never slows or alters the
//! run. Events carry summaries, not live references into orchestrator state.

use serde::{Deserialize, Serialize};

use crate::types::{FailureReason, QueryAngle, ReportSummary, SlotOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    WaveStarted {
        region: String,
        locality: String,
        category: String,
        wave: u32,
        angle: QueryAngle,
    },

    WaveCompleted {
        region: String,
        locality: String,
        category: String,
        wave: u32,
        succeeded: bool,
        failure: Option<FailureReason>,
        candidate_name: Option<String>,
    },

    LocalityResolved {
        region: String,
        locality: String,
        succeeded_slots: u32,
        exhausted_slots: u32,
    },

    RegionResolved {
        region: String,
    },

    RunCompleted {
        summary: ReportSummary,
    },

    SlotTerminal {
        region: String,
        locality: String,
        category: String,
        outcome: SlotOutcome,
        waves_attempted: u32,
    },
}

/// Observer boundary. Implementations must be non-blocking; delivery is
/// best-effort and failures are swallowed by the implementation.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Logs every event through `tracing`.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn report(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::WaveStarted {
                region,
                locality,
                category,
                wave,
                angle,
            } => tracing::info!(region, locality, category, wave, %angle, "Wave started"),
            ProgressEvent::WaveCompleted {
                region,
                locality,
                category,
                wave,
                succeeded,
                failure,
                ..
            } => tracing::info!(
                region,
                locality,
                category,
                wave,
                succeeded,
                failure = failure.map(|f| f.to_string()),
                "Wave completed"
            ),
            ProgressEvent::LocalityResolved {
                region,
                locality,
                succeeded_slots,
                exhausted_slots,
            } => tracing::info!(region, locality, succeeded_slots, exhausted_slots, "Locality resolved"),
            ProgressEvent::RegionResolved { region } => {
                tracing::info!(region, "Region resolved")
            }
            ProgressEvent::RunCompleted { summary } => {
                tracing::info!(%summary, "Run completed")
            }
            ProgressEvent::SlotTerminal {
                region,
                locality,
                category,
                outcome,
                waves_attempted,
            } => tracing::info!(
                region,
                locality,
                category,
                ?outcome,
                waves_attempted,
                "Slot terminal"
            ),
        }
    }
}

/// Forwards events over a channel; a closed receiver is ignored.
pub struct ChannelSink {
    tx: std::sync::mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: std::sync::mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_forwards_events_to_the_receiver() {
        let (tx, rx) = std::sync::mpsc::channel();
        let sink = ChannelSink::new(tx);

        sink.report(ProgressEvent::RegionResolved {
            region: "Oregon".to_string(),
        });

        match rx.try_recv() {
            Ok(ProgressEvent::RegionResolved { region }) => assert_eq!(region, "Oregon"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn channel_sink_ignores_a_dropped_receiver() {
        let (tx, rx) = std::sync::mpsc::channel();
        drop(rx);
        let sink = ChannelSink::new(tx);

        sink.report(ProgressEvent::RegionResolved {
            region: "Oregon".to_string(),
        });
    }
}
