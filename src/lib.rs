pub mod config;
pub mod error;
pub mod export;
pub mod sync;
pub mod telemetry;

pub use config::ClientConfig;
pub use error::{ApiError, AuraError, ChannelError, ExportError};
pub use export::{ExportArtifact, ExportPipeline, ExportSettings};
pub use sync::{DashboardSession, SnapshotHandle, ViewSnapshot};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
