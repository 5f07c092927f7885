//! Telemetry channel adapter: one push connection per session, no retries.
//!
//! Each inbound text frame is one JSON-encoded [`RawReading`]. Malformed
//! frames are logged and dropped; the connection survives them. A transport
//! failure ends the run and is reported to the reconciler as a degraded link.

use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::RawReading;
use crate::error::ChannelError;
use crate::sync::reconciler::{Update, UpdateSink};

pub type TelemetryStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a channel run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEnd {
    /// The session was torn down.
    Cancelled,
    /// The server closed the stream.
    Closed,
    /// The connection failed; carries the reason reported to the reconciler.
    Failed(String),
}

/// Counters for one channel run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Decode one push frame.
pub fn parse_frame(payload: &[u8]) -> Result<RawReading, ChannelError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Open the push connection.
pub async fn connect(url: &str) -> Result<TelemetryStream, ChannelError> {
    let (stream, response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ChannelError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    info!("Connected to telemetry channel {} (HTTP {})", url, response.status());
    Ok(stream)
}

/// Connect to `url` and forward readings until the stream ends or `cancel`
/// fires. A failed connect is reported as a degraded link.
pub async fn open_channel(url: &str, sink: UpdateSink, cancel: CancellationToken) -> (ChannelEnd, ChannelStats) {
    let stream = tokio::select! {
        result = connect(url) => result,
        _ = cancel.cancelled() => return (ChannelEnd::Cancelled, ChannelStats::default()),
    };
    match stream {
        Ok(stream) => run_channel(stream, sink, cancel).await,
        Err(e) => {
            warn!("{}", e);
            let reason = e.to_string();
            sink.send(Update::LinkDegraded(reason.clone()));
            (ChannelEnd::Failed(reason), ChannelStats::default())
        }
    }
}

/// Forward every reading of `stream` to the reconciler.
///
/// Frames are handled one at a time as they arrive; nothing is buffered here.
pub async fn run_channel<S, E>(mut stream: S, sink: UpdateSink, cancel: CancellationToken) -> (ChannelEnd, ChannelStats)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut stats = ChannelStats::default();
    sink.send(Update::LinkOpened);

    let end = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Telemetry channel cancelled");
                break ChannelEnd::Cancelled;
            }
            frame = stream.next() => {
                let payload = match frame {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Close(_))) | None => {
                        sink.send(Update::LinkClosed);
                        break ChannelEnd::Closed;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let reason = ChannelError::Transport(e.to_string()).to_string();
                        warn!("Telemetry channel failed: {}", reason);
                        sink.send(Update::LinkDegraded(reason.clone()));
                        break ChannelEnd::Failed(reason);
                    }
                };
                match parse_frame(&payload) {
                    Ok(reading) => {
                        stats.delivered += 1;
                        sink.send(Update::Reading(reading));
                    }
                    Err(e) => {
                        stats.dropped += 1;
                        warn!("Dropping telemetry frame: {}", e);
                    }
                }
            }
        }
    };

    info!(
        "Telemetry channel ended ({:?}): {} reading(s) delivered, {} dropped",
        end, stats.delivered, stats.dropped
    );
    (end, stats)
}
