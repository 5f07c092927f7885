//! The single writer of [`ViewSnapshot`].
//!
//! The channel adapter and the poller never touch the snapshot. They send
//! [`Update`]s through an [`UpdateSink`]; the reconciler applies them one at a
//! time and publishes every new revision on a `watch` channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::snapshot::{LinkState, ViewSnapshot};
use crate::telemetry::types::{FftSpectrum, RawReading, RealtimeSeries, SensorHealth, TremorStatus};

/// One partial result for the view-state.
///
/// Polled payloads carry the tick that requested them.
#[derive(Debug, Clone)]
pub enum Update {
    Reading(RawReading),
    LinkOpened,
    LinkDegraded(String),
    LinkClosed,
    Status { tick: u64, payload: TremorStatus },
    Series { tick: u64, payload: RealtimeSeries },
    Spectrum { tick: u64, payload: FftSpectrum },
    Health { tick: u64, payload: SensorHealth },
}

/// Polled resource kinds, used to index per-resource tick tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolledResource {
    Status = 0,
    Series = 1,
    Spectrum = 2,
    Health = 3,
}

impl Update {
    pub fn kind(&self) -> &'static str {
        match self {
            Update::Reading(_) => "reading",
            Update::LinkOpened => "link opened",
            Update::LinkDegraded(_) => "link degraded",
            Update::LinkClosed => "link closed",
            Update::Status { .. } => "status",
            Update::Series { .. } => "series",
            Update::Spectrum { .. } => "spectrum",
            Update::Health { .. } => "health",
        }
    }

    fn polled(&self) -> Option<(PolledResource, u64)> {
        match self {
            Update::Status { tick, .. } => Some((PolledResource::Status, *tick)),
            Update::Series { tick, .. } => Some((PolledResource::Series, *tick)),
            Update::Spectrum { tick, .. } => Some((PolledResource::Spectrum, *tick)),
            Update::Health { tick, .. } => Some((PolledResource::Health, *tick)),
            _ => None,
        }
    }
}

/// Producer side of the update queue. Cheap to clone.
///
/// Sending after the reconciler has been torn down is a no-op.
#[derive(Debug, Clone)]
pub struct UpdateSink {
    tx: mpsc::UnboundedSender<Update>,
}

impl UpdateSink {
    /// Returns whether the update was queued.
    pub fn send(&self, update: Update) -> bool {
        match self.tx.send(update) {
            Ok(()) => true,
            Err(mpsc::error::SendError(update)) => {
                debug!("Dropping {} update: view-state already torn down", update.kind());
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create the queue between producers and the reconciler.
pub fn update_channel() -> (UpdateSink, mpsc::UnboundedReceiver<Update>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdateSink { tx }, rx)
}

/// Read side for the render layer.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    rx: watch::Receiver<Arc<ViewSnapshot>>,
}

impl SnapshotHandle {
    pub fn current(&self) -> Arc<ViewSnapshot> {
        self.rx.borrow().clone()
    }

    /// A receiver notified on every new revision.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewSnapshot>> {
        self.rx.clone()
    }

    /// Wait until the snapshot reaches at least `revision`. Returns `None`
    /// if the reconciler goes away first.
    pub async fn wait_for_revision(&mut self, revision: u64) -> Option<Arc<ViewSnapshot>> {
        self.rx
            .wait_for(|snapshot| snapshot.revision >= revision)
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}

pub struct Reconciler {
    current: Arc<ViewSnapshot>,
    publisher: watch::Sender<Arc<ViewSnapshot>>,
    discard_stale: bool,
    latest_tick: [Option<u64>; 4],
    discarded: u64,
}

impl Reconciler {
    /// With `discard_stale`, a polled payload from an older tick than the one
    /// already applied for the same resource is dropped. Without it, payloads
    /// apply in arrival order.
    pub fn new(discard_stale: bool) -> (Self, SnapshotHandle) {
        let current = Arc::new(ViewSnapshot::default());
        let (publisher, rx) = watch::channel(current.clone());
        let reconciler = Self {
            current,
            publisher,
            discard_stale,
            latest_tick: [None; 4],
            discarded: 0,
        };
        (reconciler, SnapshotHandle { rx })
    }

    pub fn snapshot(&self) -> Arc<ViewSnapshot> {
        self.current.clone()
    }

    /// Number of stale payloads dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Apply one update and publish the result.
    ///
    /// Returns the new revision, or `None` when the update was discarded as
    /// stale. Only the targeted field changes; every other field is shared
    /// with the previous snapshot.
    pub fn apply(&mut self, update: Update) -> Option<u64> {
        if let Some((resource, tick)) = update.polled() {
            let slot = &mut self.latest_tick[resource as usize];
            if self.discard_stale && slot.is_some_and(|latest| tick < latest) {
                self.discarded += 1;
                debug!("Discarding stale {} from tick {}", update.kind(), tick);
                return None;
            }
            *slot = Some(slot.map_or(tick, |latest| latest.max(tick)));
        }

        let mut next = ViewSnapshot::clone(&self.current);
        match update {
            Update::Reading(reading) => next.reading = Some(Arc::new(reading)),
            Update::LinkOpened => next.link = LinkState::Open,
            Update::LinkDegraded(reason) => next.link = LinkState::Degraded(reason),
            Update::LinkClosed => next.link = LinkState::Closed,
            Update::Status { payload, .. } => next.status = Some(Arc::new(payload)),
            Update::Series { payload, .. } => next.series = Some(Arc::new(payload)),
            Update::Spectrum { payload, .. } => next.spectrum = Some(Arc::new(payload)),
            Update::Health { payload, .. } => next.health = Some(Arc::new(payload)),
        }
        next.revision = self.current.revision + 1;

        let revision = next.revision;
        self.current = Arc::new(next);
        self.publisher.send_replace(self.current.clone());
        Some(revision)
    }

    /// Drain `updates` until cancelled or until every producer is gone.
    ///
    /// On cancellation the queue is closed, so late producers see their
    /// sends refused instead of mutating a torn-down view.
    pub async fn run(mut self, mut updates: mpsc::UnboundedReceiver<Update>, cancel: CancellationToken) -> Arc<ViewSnapshot> {
        loop {
            tokio::select! {
                update = updates.recv() => {
                    match update {
                        Some(update) => {
                            self.apply(update);
                        }
                        None => break,
                    }
                }
                _ = cancel.cancelled() => {
                    updates.close();
                    break;
                }
            }
        }
        info!(
            "Reconciler stopped at revision {} ({} stale payload(s) discarded)",
            self.current.revision, self.discarded
        );
        self.current
    }
}
