use thiserror::Error;

/// Failures talking to the analytics backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request to {resource} failed: {source}")]
    Request {
        resource: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{resource} returned HTTP {status}")]
    Status { resource: &'static str, status: u16 },

    #[error("Failed to decode {resource}: {source}")]
    Decode {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid URL for {resource}: {reason}")]
    Url { resource: &'static str, reason: String },
}

/// Failures of the push channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Transport(String),
}

/// Failures of the snapshot export pipeline.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export root '{0}' not found in the view tree")]
    RootNotFound(String),

    #[error("An export is already in progress")]
    AlreadyRunning,

    #[error("Temporary style '{0}' is already present in the document")]
    StyleConflict(String),

    #[error("Rasterization failed: {0}")]
    RasterizationFailed(String),

    #[error("Failed to encode document: {0}")]
    Encode(String),

    #[error("Failed to save document: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AuraError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
