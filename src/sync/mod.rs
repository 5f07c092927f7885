//! Realtime view-state: one reconciler fed by the telemetry channel and the
//! analytics poller.

pub mod reconciler;
pub mod session;
pub mod snapshot;

pub use reconciler::{update_channel, Reconciler, SnapshotHandle, Update, UpdateSink};
pub use session::{DashboardSession, SessionSummary};
pub use snapshot::{GaugeView, LinkState, SensorPanelView, ViewSnapshot};
