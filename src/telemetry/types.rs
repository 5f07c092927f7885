//! Wire and domain types for the tremor analytics backend and the push channel.
//!
//! Payloads that the backend emits loosely (nullable fields, status strings,
//! parallel arrays) are validated here, at the boundary, so the rest of the
//! client only ever sees well-formed values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lower bound of the clinically characteristic parkinsonian band, in Hz.
pub const PARKINSONIAN_BAND_MIN_HZ: f64 = 4.0;
/// Upper bound of the clinically characteristic parkinsonian band, in Hz.
pub const PARKINSONIAN_BAND_MAX_HZ: f64 = 6.0;
/// Trend threshold (percent change) used by the comparative stats endpoint.
pub const TREND_THRESHOLD_PERCENT: f64 = 5.0;

/// One instantaneous sample pushed by the sensor stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    #[serde(default)]
    pub temp: Option<f64>,
    /// Device-clock timestamp in milliseconds.
    #[serde(default)]
    pub ts_ms: Option<i64>,
    /// Server-side ISO timestamp, when the backend relays one.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl RawReading {
    pub fn acc_magnitude(&self) -> f64 {
        (self.acc_x * self.acc_x + self.acc_y * self.acc_y + self.acc_z * self.acc_z).sqrt()
    }

    pub fn gyro_magnitude(&self) -> f64 {
        (self.gyro_x * self.gyro_x + self.gyro_y * self.gyro_y + self.gyro_z * self.gyro_z).sqrt()
    }
}

/// Qualitative classification of the 30s rolling intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TremorSeverity {
    Normal,
    Mild,
    Moderate,
    Severe,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TremorStatus {
    pub status: TremorSeverity,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub current_intensity: f64,
    #[serde(default)]
    pub avg_intensity_30s: f64,
    #[serde(default)]
    pub acc_magnitude: f64,
    #[serde(default)]
    pub gyro_magnitude: f64,
    #[serde(default)]
    pub freq_dominant: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_parkinsonian: bool,
}

/// One derived point of the realtime window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeDataPoint {
    pub timestamp: String,
    pub intensity: f64,
    pub acc_magnitude: f64,
    pub gyro_magnitude: f64,
    #[serde(default)]
    pub freq_dominant: Option<f64>,
}

/// Bounded time window returned by the realtime series endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSeries {
    #[serde(rename = "data")]
    pub points: Vec<RealtimeDataPoint>,
}

impl RealtimeSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Highest intensity in the window, if any point exists.
    pub fn peak_intensity(&self) -> Option<f64> {
        self.points.iter().map(|p| p.intensity).reduce(f64::max)
    }
}

/// Frequency bins of a successful spectral analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumBins {
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
    pub dominant_frequency: Option<f64>,
    pub is_parkinsonian: bool,
}

/// One FFT result. Anything other than `ok` carries no bins by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FftSpectrumWire", into = "FftSpectrumWire")]
pub enum FftSpectrum {
    Ok { bins: SpectrumBins, window_size: u32 },
    InsufficientData { window_size: u32 },
}

impl FftSpectrum {
    pub fn is_ok(&self) -> bool {
        matches!(self, FftSpectrum::Ok { .. })
    }

    pub fn frequencies(&self) -> &[f64] {
        match self {
            FftSpectrum::Ok { bins, .. } => &bins.frequencies,
            FftSpectrum::InsufficientData { .. } => &[],
        }
    }

    pub fn magnitudes(&self) -> &[f64] {
        match self {
            FftSpectrum::Ok { bins, .. } => &bins.magnitudes,
            FftSpectrum::InsufficientData { .. } => &[],
        }
    }

    pub fn dominant_frequency(&self) -> Option<f64> {
        match self {
            FftSpectrum::Ok { bins, .. } => bins.dominant_frequency,
            FftSpectrum::InsufficientData { .. } => None,
        }
    }

    pub fn is_parkinsonian(&self) -> bool {
        match self {
            FftSpectrum::Ok { bins, .. } => bins.is_parkinsonian,
            FftSpectrum::InsufficientData { .. } => false,
        }
    }

    pub fn window_size(&self) -> u32 {
        match self {
            FftSpectrum::Ok { window_size, .. } | FftSpectrum::InsufficientData { window_size } => {
                *window_size
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FftSpectrumWire {
    status: String,
    #[serde(default)]
    frequencies: Vec<f64>,
    #[serde(default)]
    magnitudes: Vec<f64>,
    #[serde(default)]
    dominant_frequency: Option<f64>,
    #[serde(default)]
    is_parkinsonian: bool,
    #[serde(default)]
    window_size: u32,
}

impl TryFrom<FftSpectrumWire> for FftSpectrum {
    type Error = String;

    fn try_from(wire: FftSpectrumWire) -> Result<Self, Self::Error> {
        if wire.status != "ok" {
            // Bins from a non-ok analysis are dropped rather than trusted.
            return Ok(FftSpectrum::InsufficientData {
                window_size: wire.window_size,
            });
        }
        if wire.frequencies.len() != wire.magnitudes.len() {
            return Err(format!(
                "frequency/magnitude length mismatch: {} vs {}",
                wire.frequencies.len(),
                wire.magnitudes.len()
            ));
        }
        Ok(FftSpectrum::Ok {
            bins: SpectrumBins {
                frequencies: wire.frequencies,
                magnitudes: wire.magnitudes,
                dominant_frequency: wire.dominant_frequency,
                is_parkinsonian: wire.is_parkinsonian,
            },
            window_size: wire.window_size,
        })
    }
}

impl From<FftSpectrum> for FftSpectrumWire {
    fn from(spectrum: FftSpectrum) -> Self {
        match spectrum {
            FftSpectrum::Ok { bins, window_size } => FftSpectrumWire {
                status: "ok".to_string(),
                frequencies: bins.frequencies,
                magnitudes: bins.magnitudes,
                dominant_frequency: bins.dominant_frequency,
                is_parkinsonian: bins.is_parkinsonian,
                window_size,
            },
            FftSpectrum::InsufficientData { window_size } => FftSpectrumWire {
                status: "insufficient_data".to_string(),
                frequencies: Vec::new(),
                magnitudes: Vec::new(),
                dominant_frequency: None,
                is_parkinsonian: false,
                window_size,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkQuality {
    Online,
    Delayed,
    Offline,
}

/// Link-quality assessment of the sensor as seen by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorHealth {
    pub status: LinkQuality,
    pub message: String,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub age_seconds: Option<i64>,
    #[serde(default)]
    pub readings_last_hour: u64,
    #[serde(default)]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(default)]
    pub id: Option<i64>,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub duration_minutes: f64,
    #[serde(default)]
    pub max_intensity: f64,
    #[serde(default)]
    pub freq_dominant: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Aggregates shown above the episode list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub count: usize,
    pub total_duration_minutes: f64,
    pub max_intensity: f64,
}

impl EpisodeSummary {
    pub fn from_episodes(episodes: &[Episode]) -> Self {
        Self {
            count: episodes.len(),
            total_duration_minutes: episodes.iter().map(|e| e.duration_minutes).sum(),
            max_intensity: episodes
                .iter()
                .map(|e| e.max_intensity)
                .reduce(f64::max)
                .unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEpisodes {
    #[serde(default)]
    pub date: Option<String>,
    pub episodes: Vec<Episode>,
}

/// Response of the detection trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub detected: usize,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: String,
    #[serde(default)]
    pub avg_intensity: Option<f64>,
    #[serde(default)]
    pub max_intensity: Option<f64>,
    #[serde(default)]
    pub episodes_count: u32,
    #[serde(default)]
    pub samples: u64,
}

impl DailyStats {
    /// A day has data when at least one sample was aggregated, regardless of
    /// whether the average came back null.
    pub fn has_data(&self) -> bool {
        self.samples > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Good,
    Bad,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CalendarDayWire")]
pub struct CalendarDay {
    pub avg_intensity: Option<f64>,
    pub max_intensity: Option<f64>,
    pub status: DayStatus,
    pub samples: u64,
    pub episodes_count: u32,
}

impl CalendarDay {
    pub fn has_data(&self) -> bool {
        self.samples > 0
    }
}

#[derive(Debug, Deserialize)]
struct CalendarDayWire {
    #[serde(default)]
    avg_intensity: Option<f64>,
    #[serde(default)]
    max_intensity: Option<f64>,
    status: DayStatus,
    #[serde(default)]
    samples: u64,
    #[serde(default)]
    episodes_count: u32,
}

impl TryFrom<CalendarDayWire> for CalendarDay {
    type Error = String;

    fn try_from(wire: CalendarDayWire) -> Result<Self, Self::Error> {
        let no_data = wire.status == DayStatus::NoData;
        if no_data != (wire.samples == 0) {
            return Err(format!(
                "calendar day status {:?} inconsistent with {} samples",
                wire.status, wire.samples
            ));
        }
        Ok(CalendarDay {
            avg_intensity: wire.avg_intensity,
            max_intensity: wire.max_intensity,
            status: wire.status,
            samples: wire.samples,
            episodes_count: wire.episodes_count,
        })
    }
}

/// Calendar keyed by ISO date (`YYYY-MM-DD`), ordered chronologically.
pub type Calendar = BTreeMap<String, CalendarDay>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Worsening,
}

impl Trend {
    pub fn from_change_percent(change_percent: f64) -> Self {
        if change_percent < -TREND_THRESHOLD_PERCENT {
            Trend::Improving
        } else if change_percent > TREND_THRESHOLD_PERCENT {
            Trend::Worsening
        } else {
            Trend::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub start_date: String,
    pub end_date: String,
    pub avg_intensity: f64,
    pub days: u32,
    pub days_with_data: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativeStats {
    pub current_period: PeriodSummary,
    pub previous_period: PeriodSummary,
    pub change_percent: f64,
    #[serde(default)]
    pub trend: Option<Trend>,
}

impl ComparativeStats {
    pub fn trend(&self) -> Trend {
        self.trend
            .unwrap_or_else(|| Trend::from_change_percent(self.change_percent))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeTimelinePoint {
    pub timestamp: String,
    pub avg_intensity: f64,
    pub max_intensity: f64,
    pub avg_amplitude: f64,
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeTimeline {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub bucket_minutes: Option<u32>,
    pub timeline: Vec<AmplitudeTimelinePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    #[serde(default)]
    pub avg_intensity: Option<f64>,
    #[serde(default)]
    pub max_intensity: Option<f64>,
    #[serde(default)]
    pub samples: u64,
}

/// Intensity per hour of day, keyed `"0"` through `"23"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyHeatmap {
    pub date: String,
    pub heatmap: BTreeMap<String, HourBucket>,
}

/// 24x60 matrix of average intensity per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MinuteHeatmapWire")]
pub struct MinuteHeatmap {
    pub date: String,
    pub matrix: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct MinuteHeatmapWire {
    date: String,
    matrix: Vec<Vec<f64>>,
    #[serde(default)]
    shape: Option<[usize; 2]>,
}

impl TryFrom<MinuteHeatmapWire> for MinuteHeatmap {
    type Error = String;

    fn try_from(wire: MinuteHeatmapWire) -> Result<Self, Self::Error> {
        let [rows, cols] = wire.shape.unwrap_or([24, 60]);
        if wire.matrix.len() != rows || wire.matrix.iter().any(|row| row.len() != cols) {
            return Err(format!("minute heatmap does not match shape {}x{}", rows, cols));
        }
        Ok(MinuteHeatmap {
            date: wire.date,
            matrix: wire.matrix,
        })
    }
}

/// Whether a dominant frequency falls in the parkinsonian band.
pub fn in_parkinsonian_band(freq_hz: Option<f64>) -> bool {
    freq_hz.is_some_and(|f| (PARKINSONIAN_BAND_MIN_HZ..=PARKINSONIAN_BAND_MAX_HZ).contains(&f))
}
