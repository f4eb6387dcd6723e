//! Progress broadcasting for in-flight simulations
//!
//! One broadcaster per run. The producer publishes snapshots; subscribers
//! receive them over bounded per-subscriber channels. Delivery is lossy
//! by design: a slow subscriber misses intermediate snapshots, but the
//! latest snapshot is always available on attach and the terminal event
//! is always delivered. The producer never blocks on a subscriber.
//!
//! Wire shape of one event:
//!
//! ```json
//! {"type":"progress","data":{"simulationId":"…","status":"running","progress":45,…}}
//! ```

use crate::types::Account;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle of a simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not yet validated
    Draft,
    /// Validation passed, aggregation in progress
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error (including cancellation)
    Failed,
}

impl RunStatus {
    /// Whether this status ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Indicative tax figures published with monthly progress
///
/// These are UX hints, not authoritative liabilities; none of them
/// appear in the final results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxEstimates {
    /// Absolute VAT position at the month just processed
    pub tva: Decimal,
    /// Rough social-contribution estimate (45% of net revenue)
    pub urssaf: Decimal,
    /// Net revenue minus net expenses for the month
    pub net_cash_flow: Decimal,
}

/// One element of the progress stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Run this snapshot belongs to
    pub simulation_id: Uuid,
    /// Run lifecycle status
    pub status: RunStatus,
    /// Calendar month most recently processed
    pub current_month: u32,
    /// Progress in percent, non-decreasing over a run
    pub progress: u8,
    /// Month-local closing balances, present during monthly steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_balances: Option<BTreeMap<Account, Decimal>>,
    /// Indicative tax figures, present during monthly steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxes: Option<TaxEstimates>,
    /// Failure reason on terminal `failed` snapshots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Minimal snapshot with status and progress
    pub fn new(simulation_id: Uuid, status: RunStatus, current_month: u32, progress: u8) -> Self {
        Self {
            simulation_id,
            status,
            current_month,
            progress,
            partial_balances: None,
            taxes: None,
            message: None,
            timestamp: Utc::now(),
        }
    }
}

/// One event on the subscriber stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// Non-terminal snapshot
    Progress {
        /// Snapshot payload
        data: Snapshot,
    },
    /// Terminal snapshot of a successful run
    Completed {
        /// Snapshot payload
        data: Snapshot,
    },
    /// Terminal failure
    Error {
        /// Failure reason
        message: String,
    },
    /// Liveness signal, no payload
    Heartbeat,
}

impl ProgressEvent {
    /// Whether receiving this event ends the subscription
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Completed { .. } | ProgressEvent::Error { .. })
    }
}

struct BroadcasterState {
    latest: Option<Snapshot>,
    subscribers: Vec<mpsc::Sender<ProgressEvent>>,
    closed: bool,
}

/// Publishes snapshots of one simulation to any number of subscribers
pub struct ProgressBroadcaster {
    simulation_id: Uuid,
    buffer: usize,
    state: RwLock<BroadcasterState>,
}

impl ProgressBroadcaster {
    /// Create a broadcaster for `simulation_id`
    ///
    /// `buffer` bounds each subscriber's channel; overflow drops
    /// intermediate events for that subscriber only.
    pub fn new(simulation_id: Uuid, buffer: usize) -> Self {
        Self {
            simulation_id,
            buffer: buffer.max(1),
            state: RwLock::new(BroadcasterState {
                latest: None,
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Run this broadcaster reports on
    pub fn simulation_id(&self) -> Uuid {
        self.simulation_id
    }

    /// Latest published snapshot, for poll-style readers
    pub async fn latest(&self) -> Option<Snapshot> {
        self.state.read().await.latest.clone()
    }

    /// Attach a subscriber
    ///
    /// A late subscriber immediately receives the latest snapshot (or
    /// the terminal event if the run already ended), then follows the
    /// stream.
    pub async fn subscribe(&self) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut state = self.state.write().await;

        if let Some(latest) = &state.latest {
            let event = event_for(latest.clone());
            let _ = tx.try_send(event);
        }
        if !state.closed {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Publish a snapshot: store it as latest, fan out to subscribers
    ///
    /// Terminal snapshots detach every subscriber after delivery. A full
    /// subscriber channel drops non-terminal events for that subscriber;
    /// terminal delivery is retried off the producer's path so the
    /// terminal event is never lost to a slow consumer.
    pub async fn publish(&self, snapshot: Snapshot) {
        let event = event_for(snapshot.clone());
        let terminal = event.is_terminal();
        let mut state = self.state.write().await;

        if state.closed {
            warn!(simulation_id = %self.simulation_id, "publish after terminal event ignored");
            return;
        }
        state.latest = Some(snapshot);

        state.subscribers.retain(|tx| {
            match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(ev)) => {
                    if terminal {
                        // Deliver off the hot path; the producer never waits
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let _ = tx.send(ev).await;
                        });
                    } else {
                        debug!(simulation_id = %self.simulation_id, "slow subscriber, snapshot dropped");
                    }
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        if terminal {
            state.subscribers.clear();
            state.closed = true;
        }
    }

    /// Send a heartbeat to all subscribers without touching the latest
    /// snapshot
    pub async fn heartbeat(&self) {
        let state = self.state.read().await;
        if state.closed {
            return;
        }
        for tx in &state.subscribers {
            let _ = tx.try_send(ProgressEvent::Heartbeat);
        }
    }

    /// Spawn a heartbeat loop that runs until the broadcaster closes
    pub fn spawn_heartbeat(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if broadcaster.state.read().await.closed {
                    break;
                }
                broadcaster.heartbeat().await;
            }
        })
    }
}

fn event_for(snapshot: Snapshot) -> ProgressEvent {
    match snapshot.status {
        RunStatus::Completed => ProgressEvent::Completed { data: snapshot },
        RunStatus::Failed => ProgressEvent::Error {
            message: snapshot
                .message
                .unwrap_or_else(|| "simulation failed".to_string()),
        },
        _ => ProgressEvent::Progress { data: snapshot },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: RunStatus, progress: u8) -> Snapshot {
        Snapshot::new(Uuid::nil(), status, 1, progress)
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_snapshots() {
        let broadcaster = ProgressBroadcaster::new(Uuid::nil(), 8);
        let mut rx = broadcaster.subscribe().await;

        broadcaster.publish(snapshot(RunStatus::Running, 10)).await;
        broadcaster.publish(snapshot(RunStatus::Running, 20)).await;

        match rx.recv().await.unwrap() {
            ProgressEvent::Progress { data } => assert_eq!(data.progress, 10),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ProgressEvent::Progress { data } => assert_eq!(data.progress, 20),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_latest_on_attach() {
        let broadcaster = ProgressBroadcaster::new(Uuid::nil(), 8);
        broadcaster.publish(snapshot(RunStatus::Running, 45)).await;

        let mut rx = broadcaster.subscribe().await;
        match rx.recv().await.unwrap() {
            ProgressEvent::Progress { data } => assert_eq!(data.progress, 45),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_terminal_event_detaches_subscribers() {
        let broadcaster = ProgressBroadcaster::new(Uuid::nil(), 8);
        let mut rx = broadcaster.subscribe().await;

        broadcaster.publish(snapshot(RunStatus::Completed, 100)).await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::Completed { .. }
        ));
        // Channel closes after the terminal event
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_snapshot_becomes_error_event() {
        let broadcaster = ProgressBroadcaster::new(Uuid::nil(), 8);
        let mut rx = broadcaster.subscribe().await;

        let mut failed = snapshot(RunStatus::Failed, 45);
        failed.message = Some("invariant violation".to_string());
        broadcaster.publish(failed).await;

        match rx.recv().await.unwrap() {
            ProgressEvent::Error { message } => assert_eq!(message, "invariant violation"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_after_terminal_is_ignored() {
        let broadcaster = ProgressBroadcaster::new(Uuid::nil(), 8);
        broadcaster.publish(snapshot(RunStatus::Completed, 100)).await;
        broadcaster.publish(snapshot(RunStatus::Running, 50)).await;

        let latest = broadcaster.latest().await.unwrap();
        assert_eq!(latest.progress, 100);
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_intermediates_keeps_terminal() {
        let broadcaster = ProgressBroadcaster::new(Uuid::nil(), 2);
        let mut rx = broadcaster.subscribe().await;

        // Overfill the 2-slot channel without draining
        for p in [10u8, 20, 25, 30, 35] {
            broadcaster.publish(snapshot(RunStatus::Running, p)).await;
        }
        broadcaster.publish(snapshot(RunStatus::Completed, 100)).await;

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        // Intermediates were dropped, the terminal event survived
        assert!(events.len() < 7);
        assert!(events.iter().any(|e| e.is_terminal()));
    }

    #[tokio::test]
    async fn test_heartbeat_carries_no_data() {
        let broadcaster = ProgressBroadcaster::new(Uuid::nil(), 8);
        let mut rx = broadcaster.subscribe().await;
        broadcaster.heartbeat().await;

        assert_eq!(rx.recv().await.unwrap(), ProgressEvent::Heartbeat);
    }

    #[test]
    fn test_event_wire_shape() {
        let mut snap = snapshot(RunStatus::Running, 45);
        snap.taxes = Some(TaxEstimates {
            tva: rust_decimal_macros::dec!(120.50),
            urssaf: rust_decimal_macros::dec!(450),
            net_cash_flow: rust_decimal_macros::dec!(550),
        });
        let json = serde_json::to_value(ProgressEvent::Progress { data: snap }).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["data"]["progress"], 45);
        assert_eq!(json["data"]["status"], "running");
        assert_eq!(json["data"]["taxes"]["netCashFlow"], "550");

        let hb = serde_json::to_value(ProgressEvent::Heartbeat).unwrap();
        assert_eq!(hb["type"], "heartbeat");
        assert!(hb.get("data").is_none());
    }
}
