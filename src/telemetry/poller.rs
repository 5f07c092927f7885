//! Analytics poller: four independent fetches per tick, on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::RealtimeSource;
use crate::config::PollerConfig;
use crate::error::ApiError;
use crate::sync::reconciler::{Update, UpdateSink};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub series_duration_secs: u32,
    pub fft_window_size: u32,
}

impl From<&PollerConfig> for PollerSettings {
    fn from(config: &PollerConfig) -> Self {
        Self {
            interval: config.interval(),
            series_duration_secs: config.series_duration_secs,
            fft_window_size: config.fft_window_size,
        }
    }
}

pub struct AnalyticsPoller<S: RealtimeSource> {
    source: Arc<S>,
    settings: PollerSettings,
}

/// Forward one fetch result, or log it and leave the previous value alone.
fn deliver<T>(resource: &str, tick: u64, result: Result<T, ApiError>, sink: &UpdateSink, wrap: impl FnOnce(T) -> Update) {
    match result {
        Ok(payload) => {
            if !sink.send(wrap(payload)) {
                debug!("Tick {} {} landed after teardown", tick, resource);
            }
        }
        Err(e) => warn!("Tick {}: {} fetch failed, keeping previous value: {}", tick, resource, e),
    }
}

impl<S: RealtimeSource> AnalyticsPoller<S> {
    pub fn new(source: Arc<S>, settings: PollerSettings) -> Self {
        Self { source, settings }
    }

    /// Issue the four fetches of one tick as independent tasks.
    ///
    /// The returned handles may be dropped; the tasks run to completion on
    /// their own and each applies its own result the moment it lands.
    pub fn tick_once(&self, tick: u64, sink: &UpdateSink) -> Vec<JoinHandle<()>> {
        let series_secs = self.settings.series_duration_secs;
        let window = self.settings.fft_window_size;

        let status = {
            let (source, sink) = (self.source.clone(), sink.clone());
            tokio::spawn(async move {
                let result = source.tremor_status().await;
                deliver("status", tick, result, &sink, |payload| Update::Status { tick, payload });
            })
        };
        let series = {
            let (source, sink) = (self.source.clone(), sink.clone());
            tokio::spawn(async move {
                let result = source.realtime_series(series_secs).await;
                deliver("series", tick, result, &sink, |payload| Update::Series { tick, payload });
            })
        };
        let spectrum = {
            let (source, sink) = (self.source.clone(), sink.clone());
            tokio::spawn(async move {
                let result = source.fft_spectrum(window).await;
                deliver("spectrum", tick, result, &sink, |payload| Update::Spectrum { tick, payload });
            })
        };
        let health = {
            let (source, sink) = (self.source.clone(), sink.clone());
            tokio::spawn(async move {
                let result = source.sensor_health().await;
                deliver("health", tick, result, &sink, |payload| Update::Health { tick, payload });
            })
        };

        vec![status, series, spectrum, health]
    }

    /// Tick until cancelled. The first tick fires immediately.
    ///
    /// A tick never waits for the previous tick's fetches. Fetches already in
    /// flight at cancellation are left to finish; their results are refused
    /// by the closed sink. Returns the number of ticks issued.
    pub async fn run(self, sink: UpdateSink, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Analytics poller started ({:?} interval)", self.settings.interval);

        let mut tick = 0u64;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick += 1;
                    drop(self.tick_once(tick, &sink));
                }
                _ = cancel.cancelled() => {
                    info!("Analytics poller stopped after {} tick(s)", tick);
                    break;
                }
            }
        }
        tick
    }
}
