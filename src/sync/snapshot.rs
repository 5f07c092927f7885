//! The immutable, versioned view-state handed to the render layer.

use std::sync::Arc;

use serde::Serialize;

use crate::telemetry::types::{
    FftSpectrum, LinkQuality, RawReading, RealtimeSeries, SensorHealth, TremorSeverity, TremorStatus,
};

/// Status text shown before the first status fetch lands.
pub const STATUS_PLACEHOLDER_TEXT: &str = "Carregando...";
/// Gauge color used before the first status fetch lands.
pub const STATUS_PLACEHOLDER_COLOR: &str = "gray";
/// Sensor message shown before the first health fetch lands.
pub const HEALTH_PLACEHOLDER_MESSAGE: &str = "Conectando...";

/// State of the push channel as last reported by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Connecting,
    Open,
    Degraded(String),
    Closed,
}

/// One version of the dashboard's live data.
///
/// Fields are shared behind `Arc` so that producing the next revision copies
/// only the field that changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewSnapshot {
    pub revision: u64,
    pub reading: Option<Arc<RawReading>>,
    pub status: Option<Arc<TremorStatus>>,
    pub series: Option<Arc<RealtimeSeries>>,
    pub spectrum: Option<Arc<FftSpectrum>>,
    pub health: Option<Arc<SensorHealth>>,
    pub link: LinkState,
}

/// Values behind the intensity gauge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeView {
    pub severity: TremorSeverity,
    pub intensity: f64,
    pub avg_intensity_30s: f64,
    pub status_text: String,
    pub color: String,
}

/// Values behind the sensor status panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorPanelView {
    pub link_quality: Option<LinkQuality>,
    pub message: String,
    pub readings_last_hour: Option<u64>,
    pub temperature: Option<f64>,
    pub acc_magnitude: f64,
    pub gyro_magnitude: f64,
    pub freq_dominant: Option<f64>,
    pub is_parkinsonian: bool,
}

impl ViewSnapshot {
    /// The gauge, with placeholders until the first status arrives.
    pub fn gauge(&self) -> GaugeView {
        match self.status.as_deref() {
            Some(status) => GaugeView {
                severity: status.status,
                intensity: status.current_intensity,
                avg_intensity_30s: status.avg_intensity_30s,
                status_text: status
                    .status_text
                    .clone()
                    .unwrap_or_else(|| STATUS_PLACEHOLDER_TEXT.to_string()),
                color: status
                    .color
                    .clone()
                    .unwrap_or_else(|| STATUS_PLACEHOLDER_COLOR.to_string()),
            },
            None => GaugeView {
                severity: TremorSeverity::NoData,
                intensity: 0.0,
                avg_intensity_30s: 0.0,
                status_text: STATUS_PLACEHOLDER_TEXT.to_string(),
                color: STATUS_PLACEHOLDER_COLOR.to_string(),
            },
        }
    }

    pub fn sensor_panel(&self) -> SensorPanelView {
        let status = self.status.as_deref();
        let health = self.health.as_deref();
        SensorPanelView {
            link_quality: health.map(|h| h.status),
            message: health
                .map(|h| h.message.clone())
                .unwrap_or_else(|| HEALTH_PLACEHOLDER_MESSAGE.to_string()),
            readings_last_hour: health.map(|h| h.readings_last_hour),
            temperature: health.and_then(|h| h.temperature),
            acc_magnitude: status.map_or(0.0, |s| s.acc_magnitude),
            gyro_magnitude: status.map_or(0.0, |s| s.gyro_magnitude),
            freq_dominant: status.and_then(|s| s.freq_dominant),
            is_parkinsonian: status.is_some_and(|s| s.is_parkinsonian),
        }
    }

    /// Whether every polled resource has landed at least once.
    pub fn is_fully_loaded(&self) -> bool {
        self.status.is_some() && self.series.is_some() && self.spectrum.is_some() && self.health.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health() -> SensorHealth {
        SensorHealth {
            status: LinkQuality::Delayed,
            message: "Atraso de 12s".to_string(),
            last_seen: None,
            age_seconds: Some(12),
            readings_last_hour: 340,
            temperature: Some(31.5),
        }
    }

    #[test]
    fn test_placeholders_before_first_fetch() {
        let snapshot = ViewSnapshot::default();
        let gauge = snapshot.gauge();
        assert_eq!(gauge.intensity, 0.0);
        assert_eq!(gauge.avg_intensity_30s, 0.0);
        assert_eq!(gauge.status_text, "Carregando...");
        assert_eq!(gauge.color, "gray");

        let panel = snapshot.sensor_panel();
        assert_eq!(panel.message, "Conectando...");
        assert!(!panel.is_parkinsonian);
        assert!(panel.readings_last_hour.is_none());
        assert_eq!(snapshot.link, LinkState::Connecting);
    }

    #[test]
    fn test_views_read_landed_fields() {
        let snapshot = ViewSnapshot {
            status: Some(Arc::new(TremorStatus {
                status: TremorSeverity::Moderate,
                status_text: Some("Moderado".into()),
                color: Some("orange".into()),
                current_intensity: 5.5,
                avg_intensity_30s: 5.1,
                acc_magnitude: 1.2,
                gyro_magnitude: 30.0,
                freq_dominant: Some(5.0),
                timestamp: None,
                is_parkinsonian: true,
            })),
            health: Some(Arc::new(health())),
            ..ViewSnapshot::default()
        };
        let gauge = snapshot.gauge();
        assert_eq!(gauge.severity, TremorSeverity::Moderate);
        assert_eq!(gauge.status_text, "Moderado");

        let panel = snapshot.sensor_panel();
        assert_eq!(panel.link_quality, Some(LinkQuality::Delayed));
        assert_eq!(panel.readings_last_hour, Some(340));
        assert_eq!(panel.freq_dominant, Some(5.0));
        assert!(panel.is_parkinsonian);
        assert!(!snapshot.is_fully_loaded());
    }

    #[test]
    fn test_link_state_serializes_with_reason() {
        let json = serde_json::to_value(LinkState::Degraded("reset".into())).unwrap();
        assert_eq!(json, serde_json::json!({"state": "degraded", "reason": "reset"}));
        let json = serde_json::to_value(LinkState::Open).unwrap();
        assert_eq!(json, serde_json::json!({"state": "open"}));
    }
}
