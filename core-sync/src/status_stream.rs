//! # Status Stream
//!
//! Long-lived forwarding of one sync's run updates into a caller-owned
//! channel, with a heartbeat that repeats the last known run while idle.

use crate::broadcaster::{StatusBroadcaster, SubscriptionId};
use crate::repository::SyncRunRepository;
use crate::{Result, SyncId, SyncRun};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Unsubscribes when the stream ends, however it ends.
struct SubscriptionGuard<'a> {
    broadcaster: &'a StatusBroadcaster,
    sync_id: SyncId,
    id: SubscriptionId,
}

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(&self.sync_id, self.id);
    }
}

/// Shortest heartbeat interval; smaller values are raised to it
pub const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Why a status stream stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The cancellation token fired
    Cancelled,
    /// The broadcaster dropped the subscription (shutdown)
    BroadcasterClosed,
    /// The receiving side of `sink` was dropped
    SinkClosed,
}

/// Streams run updates of `sync_id` into `sink` until cancelled.
///
/// Sends the most recently updated run (if any) first, then every
/// broadcast update. When nothing arrives for `heartbeat`, the last known
/// run is sent again. A `heartbeat` below [`MIN_HEARTBEAT`] is raised to it.
///
/// # Errors
///
/// Returns an error only if loading the initial run fails; the
/// subscription is released in that case too.
#[instrument(skip(broadcaster, runs, cancel, sink), fields(sync_id = %sync_id))]
pub async fn stream_status(
    broadcaster: &StatusBroadcaster,
    runs: &dyn SyncRunRepository,
    sync_id: SyncId,
    heartbeat: Duration,
    cancel: CancellationToken,
    sink: mpsc::Sender<SyncRun>,
) -> Result<StreamEnd> {
    // Subscribe before reading the store so no update falls in between
    let mut subscription = broadcaster.subscribe(sync_id);
    let _guard = SubscriptionGuard {
        broadcaster,
        sync_id,
        id: subscription.id,
    };
    info!("Client subscribed to sync status");

    let mut last_known = runs.latest_run(&sync_id).await?;
    if let Some(run) = last_known.clone() {
        if let Some(end) = send(&sink, &cancel, run).await {
            return Ok(end);
        }
    }

    let heartbeat = heartbeat.max(MIN_HEARTBEAT);
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            _ = sink.closed() => break StreamEnd::SinkClosed,
            update = subscription.receiver.recv() => {
                let Some(run) = update else {
                    break StreamEnd::BroadcasterClosed;
                };
                last_known = Some(run.clone());
                ticker.reset();
                if let Some(end) = send(&sink, &cancel, run).await {
                    break end;
                }
            }
            _ = ticker.tick() => {
                if let Some(run) = last_known.clone() {
                    debug!(run_id = %run.id, "Sending status heartbeat");
                    if let Some(end) = send(&sink, &cancel, run).await {
                        break end;
                    }
                }
            }
        }
    };

    info!(reason = ?end, "Sync status stream ended");
    Ok(end)
}

/// Returns why the stream must stop, if it must.
async fn send(
    sink: &mpsc::Sender<SyncRun>,
    cancel: &CancellationToken,
    run: SyncRun,
) -> Option<StreamEnd> {
    tokio::select! {
        _ = cancel.cancelled() => Some(StreamEnd::Cancelled),
        sent = sink.send(run) => sent.err().map(|_| StreamEnd::SinkClosed),
    }
}
