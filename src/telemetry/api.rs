//! HTTP client for the tremor analytics backend.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use super::types::{
    AmplitudeTimeline, Calendar, ComparativeStats, DailyEpisodes, DailyStats, DetectionSummary,
    FftSpectrum, HourlyHeatmap, MinuteHeatmap, RealtimeSeries, SensorHealth, TremorStatus,
};
use crate::config::ApiConfig;
use crate::error::ApiError;

const USER_AGENT: &str = "Aura/1.0";

/// The four resources refreshed on every poll tick.
///
/// Implemented by [`AnalyticsClient`]; tests substitute in-memory fakes.
pub trait RealtimeSource: Send + Sync + 'static {
    fn tremor_status(&self) -> impl Future<Output = Result<TremorStatus, ApiError>> + Send;

    fn realtime_series(&self, duration_secs: u32) -> impl Future<Output = Result<RealtimeSeries, ApiError>> + Send;

    fn fft_spectrum(&self, window_size: u32) -> impl Future<Output = Result<FftSpectrum, ApiError>> + Send;

    fn sensor_health(&self) -> impl Future<Output = Result<SensorHealth, ApiError>> + Send;
}

/// Typed access to every analytics resource, relative to one base URL.
#[derive(Clone)]
pub struct AnalyticsClient {
    client: reqwest::Client,
    base_url: Url,
}

fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl AnalyticsClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Request {
                resource: "client",
                source: e,
            })?;
        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let mut base_url = Url::parse(base_url).map_err(|e| ApiError::Url {
            resource: "base",
            reason: e.to_string(),
        })?;
        // Url::join drops the last segment unless the path ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, resource: &'static str, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(path).map_err(|e| ApiError::Url {
            resource,
            reason: e.to_string(),
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: &'static str, url: Url) -> Result<T, ApiError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Request { resource, source: e })?;
        decode_response(resource, response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, resource: &'static str, url: Url) -> Result<T, ApiError> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| ApiError::Request { resource, source: e })?;
        decode_response(resource, response).await
    }

    /// Ask the backend to scan the last `lookback_minutes` for episodes.
    pub async fn detect_episodes(&self, lookback_minutes: u32) -> Result<DetectionSummary, ApiError> {
        let url = self.endpoint(
            "episode detection",
            "episodes/detect",
            &[("lookback_minutes", lookback_minutes.to_string())],
        )?;
        let summary: DetectionSummary = self.post_json("episode detection", url).await?;
        info!("Episode detection found {} episode(s)", summary.detected);
        Ok(summary)
    }

    pub async fn daily_episodes(&self, for_date: Option<NaiveDate>) -> Result<DailyEpisodes, ApiError> {
        let query: Vec<_> = for_date.map(|d| ("for_date", date_param(d))).into_iter().collect();
        let url = self.endpoint("daily episodes", "episodes/daily", &query)?;
        self.get_json("daily episodes", url).await
    }

    pub async fn daily_stats(&self, for_date: Option<NaiveDate>) -> Result<DailyStats, ApiError> {
        let query: Vec<_> = for_date.map(|d| ("for_date", date_param(d))).into_iter().collect();
        let url = self.endpoint("daily stats", "stats/daily", &query)?;
        self.get_json("daily stats", url).await
    }

    pub async fn weekly_stats(&self, days: u32) -> Result<Vec<DailyStats>, ApiError> {
        let url = self.endpoint("weekly stats", "stats/weekly", &[("days", days.to_string())])?;
        self.get_json("weekly stats", url).await
    }

    pub async fn calendar(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Calendar, ApiError> {
        let mut query = Vec::new();
        if let Some(start) = start {
            query.push(("start", date_param(start)));
        }
        if let Some(end) = end {
            query.push(("end", date_param(end)));
        }
        let url = self.endpoint("calendar", "stats/calendar", &query)?;
        self.get_json("calendar", url).await
    }

    pub async fn comparative_stats(&self, days: u32) -> Result<ComparativeStats, ApiError> {
        let url = self.endpoint("comparative stats", "stats/compare", &[("days", days.to_string())])?;
        self.get_json("comparative stats", url).await
    }

    pub async fn amplitude_timeline(
        &self,
        for_date: Option<NaiveDate>,
        bucket_minutes: u32,
    ) -> Result<AmplitudeTimeline, ApiError> {
        let mut query = vec![("bucket_minutes", bucket_minutes.to_string())];
        if let Some(date) = for_date {
            query.push(("for_date", date_param(date)));
        }
        let url = self.endpoint("amplitude timeline", "heatmap/timeline", &query)?;
        self.get_json("amplitude timeline", url).await
    }

    pub async fn hourly_heatmap(&self, for_date: Option<NaiveDate>) -> Result<HourlyHeatmap, ApiError> {
        let query: Vec<_> = for_date.map(|d| ("for_date", date_param(d))).into_iter().collect();
        let url = self.endpoint("hourly heatmap", "heatmap/hourly", &query)?;
        self.get_json("hourly heatmap", url).await
    }

    pub async fn minute_heatmap(&self, for_date: Option<NaiveDate>) -> Result<MinuteHeatmap, ApiError> {
        let query: Vec<_> = for_date.map(|d| ("for_date", date_param(d))).into_iter().collect();
        let url = self.endpoint("minute heatmap", "heatmap/minute", &query)?;
        self.get_json("minute heatmap", url).await
    }
}

impl RealtimeSource for AnalyticsClient {
    async fn tremor_status(&self) -> Result<TremorStatus, ApiError> {
        let url = self.endpoint("tremor status", "realtime/status", &[])?;
        self.get_json("tremor status", url).await
    }

    async fn realtime_series(&self, duration_secs: u32) -> Result<RealtimeSeries, ApiError> {
        let url = self.endpoint(
            "realtime series",
            "realtime/series",
            &[("duration_seconds", duration_secs.to_string())],
        )?;
        self.get_json("realtime series", url).await
    }

    async fn fft_spectrum(&self, window_size: u32) -> Result<FftSpectrum, ApiError> {
        let url = self.endpoint("fft spectrum", "realtime/fft", &[("window_size", window_size.to_string())])?;
        self.get_json("fft spectrum", url).await
    }

    async fn sensor_health(&self) -> Result<SensorHealth, ApiError> {
        let url = self.endpoint("sensor health", "realtime/sensor-health", &[])?;
        self.get_json("sensor health", url).await
    }
}

/// Check the status and decode the body of a backend response.
async fn decode_response<T: DeserializeOwned>(resource: &'static str, response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            resource,
            status: status.as_u16(),
        });
    }
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Request { resource, source: e })?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode { resource, source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client(base: &str) -> AnalyticsClient {
        AnalyticsClient::with_client(reqwest::Client::new(), base).unwrap()
    }

    /// Serve exactly one canned HTTP response and return the base URL plus
    /// the raw request line received.
    async fn serve_once(status_line: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf[..n]).lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = client("http://example.test/api");
        let url = api.endpoint("tremor status", "realtime/status", &[]).unwrap();
        assert_eq!(url.as_str(), "http://example.test/api/realtime/status");
    }

    #[test]
    fn test_endpoint_encodes_query() {
        let api = client("http://localhost:8000/");
        let url = api
            .endpoint("calendar", "stats/calendar", &[("start", "2024-01-01".into()), ("end", "2024-01-31".into())])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/stats/calendar?start=2024-01-01&end=2024-01-31");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = AnalyticsClient::with_client(reqwest::Client::new(), "not a url");
        assert!(matches!(result, Err(ApiError::Url { .. })));
    }

    #[tokio::test]
    async fn test_status_decoded() {
        let body = r#"{"status":"mild","status_text":"Leve","color":"yellow","current_intensity":3.2,
            "avg_intensity_30s":2.9,"freq_dominant":4.8,"is_parkinsonian":true}"#;
        let (base, request) = serve_once("200 OK", body).await;
        let status = client(&base).tremor_status().await.unwrap();
        assert_eq!(status.avg_intensity_30s, 2.9);
        assert!(status.is_parkinsonian);
        assert_eq!(request.await.unwrap(), "GET /realtime/status HTTP/1.1");
    }

    #[tokio::test]
    async fn test_series_sends_duration() {
        let (base, request) = serve_once("200 OK", r#"{"data":[]}"#).await;
        let series = client(&base).realtime_series(60).await.unwrap();
        assert!(series.is_empty());
        assert_eq!(request.await.unwrap(), "GET /realtime/series?duration_seconds=60 HTTP/1.1");
    }

    #[tokio::test]
    async fn test_http_error_maps_to_status() {
        let (base, _request) = serve_once("503 Service Unavailable", "{}").await;
        let err = client(&base).sensor_health().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { resource: "sensor health", status: 503 }));
    }

    #[tokio::test]
    async fn test_bad_payload_maps_to_decode() {
        let body = r#"{"status":"ok","frequencies":[1.0,2.0],"magnitudes":[1.0],"window_size":100}"#;
        let (base, _request) = serve_once("200 OK", body).await;
        let err = client(&base).fft_spectrum(100).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode { resource: "fft spectrum", .. }));
    }

    #[tokio::test]
    async fn test_detect_uses_post() {
        let (base, request) = serve_once("200 OK", r#"{"detected":0,"episodes":[]}"#).await;
        let summary = client(&base).detect_episodes(60).await.unwrap();
        assert_eq!(summary.detected, 0);
        assert_eq!(request.await.unwrap(), "POST /episodes/detect?lookback_minutes=60 HTTP/1.1");
    }
}
