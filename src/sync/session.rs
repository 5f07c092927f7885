//! Mount/teardown lifecycle of one live dashboard view.
//!
//! A session owns the reconciler, the telemetry channel and the analytics
//! poller as three tasks sharing one cancellation token. Dropping a session
//! without calling [`DashboardSession::teardown`] still cancels all three.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::reconciler::{update_channel, Reconciler, SnapshotHandle};
use super::snapshot::ViewSnapshot;
use crate::config::ClientConfig;
use crate::error::AuraError;
use crate::telemetry::api::{AnalyticsClient, RealtimeSource};
use crate::telemetry::channel::{self, ChannelEnd, ChannelStats};
use crate::telemetry::poller::{AnalyticsPoller, PollerSettings};

/// What a session did over its lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub final_revision: u64,
    pub ticks: u64,
    pub readings_delivered: u64,
    pub frames_dropped: u64,
    pub channel_end: String,
}

pub struct DashboardSession {
    snapshots: SnapshotHandle,
    cancel: CancellationToken,
    reconciler: Option<JoinHandle<Arc<ViewSnapshot>>>,
    channel: Option<JoinHandle<(ChannelEnd, ChannelStats)>>,
    poller: Option<JoinHandle<u64>>,
}

impl DashboardSession {
    /// Mount against the configured backend. Must be called inside a Tokio
    /// runtime.
    pub fn mount(config: &ClientConfig) -> Result<Self, AuraError> {
        config
            .validate()
            .map_err(|e| AuraError::Config(format!("{:#}", e)))?;
        let client = AnalyticsClient::new(&config.api)?;
        Ok(Self::mount_with(
            Arc::new(client),
            &config.channel.url,
            PollerSettings::from(&config.poller),
            config.poller.discard_stale_responses,
        ))
    }

    pub fn mount_with<S: RealtimeSource>(
        source: Arc<S>,
        channel_url: &str,
        poller: PollerSettings,
        discard_stale: bool,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (reconciler, snapshots) = Reconciler::new(discard_stale);
        let (sink, updates) = update_channel();

        let reconciler = tokio::spawn(reconciler.run(updates, cancel.clone()));

        let url = channel_url.to_string();
        let channel = tokio::spawn({
            let (sink, cancel) = (sink.clone(), cancel.clone());
            async move { channel::open_channel(&url, sink, cancel).await }
        });

        let poller = tokio::spawn(AnalyticsPoller::new(source, poller).run(sink, cancel.clone()));

        info!("Dashboard session mounted (channel {})", channel_url);
        Self {
            snapshots,
            cancel,
            reconciler: Some(reconciler),
            channel: Some(channel),
            poller: Some(poller),
        }
    }

    pub fn snapshots(&self) -> &SnapshotHandle {
        &self.snapshots
    }

    pub fn current(&self) -> Arc<ViewSnapshot> {
        self.snapshots.current()
    }

    /// Close the channel, stop the poll timer and retire the view-state.
    ///
    /// Fetches still in flight are not aborted; whatever they deliver later
    /// is refused.
    pub async fn teardown(mut self) -> Result<SessionSummary, AuraError> {
        self.cancel.cancel();

        let ticks = match self.poller.take() {
            Some(handle) => handle.await.map_err(|e| AuraError::Task(format!("poller: {}", e)))?,
            None => 0,
        };
        let (end, stats) = match self.channel.take() {
            Some(handle) => handle.await.map_err(|e| AuraError::Task(format!("channel: {}", e)))?,
            None => (ChannelEnd::Cancelled, ChannelStats::default()),
        };
        let last = match self.reconciler.take() {
            Some(handle) => handle
                .await
                .map_err(|e| AuraError::Task(format!("reconciler: {}", e)))?,
            None => self.snapshots.current(),
        };

        let summary = SessionSummary {
            final_revision: last.revision,
            ticks,
            readings_delivered: stats.delivered,
            frames_dropped: stats.dropped,
            channel_end: format!("{:?}", end),
        };
        info!(
            "Dashboard session torn down at revision {} after {} tick(s)",
            summary.final_revision, summary.ticks
        );
        Ok(summary)
    }
}

impl Drop for DashboardSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::sync::snapshot::LinkState;
    use crate::telemetry::types::{
        FftSpectrum, RealtimeSeries, SensorHealth, TremorSeverity, TremorStatus,
    };
    use std::time::Duration;

    struct StaticSource;

    impl RealtimeSource for StaticSource {
        async fn tremor_status(&self) -> Result<TremorStatus, ApiError> {
            Ok(TremorStatus {
                status: TremorSeverity::Severe,
                status_text: Some("Severo".into()),
                color: Some("red".into()),
                current_intensity: 8.5,
                avg_intensity_30s: 8.1,
                acc_magnitude: 2.0,
                gyro_magnitude: 80.0,
                freq_dominant: Some(5.2),
                timestamp: None,
                is_parkinsonian: true,
            })
        }

        async fn realtime_series(&self, _duration_secs: u32) -> Result<RealtimeSeries, ApiError> {
            Ok(RealtimeSeries::default())
        }

        async fn fft_spectrum(&self, window_size: u32) -> Result<FftSpectrum, ApiError> {
            Ok(FftSpectrum::InsufficientData { window_size })
        }

        async fn sensor_health(&self) -> Result<SensorHealth, ApiError> {
            Err(ApiError::Status { resource: "sensor health", status: 500 })
        }
    }

    fn unused_ws_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        format!("ws://127.0.0.1:{}/ws", port)
    }

    #[tokio::test]
    async fn test_session_merges_poll_and_link_state() {
        let settings = PollerSettings {
            interval: Duration::from_millis(20),
            series_duration_secs: 60,
            fft_window_size: 100,
        };
        let session = DashboardSession::mount_with(Arc::new(StaticSource), &unused_ws_url(), settings, false);

        let mut snapshots = session.snapshots().clone();
        let snapshot = snapshots.wait_for_revision(4).await.unwrap();
        assert!(snapshot.revision >= 4);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let current = session.current();
        assert_eq!(current.gauge().status_text, "Severo");
        assert!(current.spectrum.is_some());
        // health keeps failing, so its placeholder stays
        assert!(current.health.is_none());
        assert_eq!(current.sensor_panel().message, "Conectando...");
        assert!(matches!(current.link, LinkState::Degraded(_)));

        let summary = session.teardown().await.unwrap();
        assert!(summary.ticks >= 1);
        assert!(summary.final_revision >= 4);
        assert!(summary.channel_end.starts_with("Failed"));
    }

    #[tokio::test]
    async fn test_mount_rejects_invalid_config() {
        let mut config = ClientConfig::default();
        config.poller.interval_ms = 0;
        let result = DashboardSession::mount(&config);
        assert!(matches!(result, Err(AuraError::Config(ref reason)) if reason.contains("interval_ms")));
    }

    #[tokio::test]
    async fn test_no_updates_after_teardown() {
        let settings = PollerSettings {
            interval: Duration::from_millis(10),
            series_duration_secs: 60,
            fft_window_size: 100,
        };
        let session = DashboardSession::mount_with(Arc::new(StaticSource), &unused_ws_url(), settings, false);
        let snapshots = session.snapshots().clone();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let summary = session.teardown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(snapshots.current().revision, summary.final_revision);
    }
}
