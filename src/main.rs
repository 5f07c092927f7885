//! Aura headless client.
//!
//! # Watch the live view-state
//! ```bash
//! aura watch --seconds 30
//! ```
//!
//! # Export a serialized view tree
//! ```bash
//! aura export dashboard.json --root dashboard-content
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use aura_dashboard::export::tree::ViewDocument;
use aura_dashboard::telemetry::types::EpisodeSummary;
use aura_dashboard::telemetry::{AnalyticsClient, RealtimeSource};
use aura_dashboard::{init_tracing, ClientConfig, DashboardSession, ExportPipeline, ExportSettings};

#[derive(Parser, Debug)]
#[command(name = "aura")]
#[command(author, version, about = "Headless client for the Aura tremor dashboard", long_about = None)]
struct Cli {
    /// Config file layered over the built-in defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mount a live session and log every new revision
    Watch {
        /// How long to stay mounted
        #[arg(short, long, default_value = "30")]
        seconds: u64,
    },

    /// Fetch one analytics resource and print it as JSON
    Fetch {
        #[command(subcommand)]
        resource: Resource,
    },

    /// Ask the backend to detect episodes
    Detect {
        #[arg(long, default_value = "60")]
        lookback_minutes: u32,
    },

    /// Export a serialized view tree to a dated PDF
    Export {
        /// JSON file holding the rendered view document
        tree: PathBuf,

        /// Id of the element to capture
        #[arg(long, default_value = "dashboard-content")]
        root: String,

        /// Override the configured output directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum Resource {
    Status,
    Series {
        #[arg(long, default_value = "60")]
        duration: u32,
    },
    Fft {
        #[arg(long, default_value = "100")]
        window: u32,
    },
    Health,
    Episodes {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Daily {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Weekly {
        #[arg(long, default_value = "7")]
        days: u32,
    },
    Calendar {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    Compare {
        #[arg(long, default_value = "7")]
        days: u32,
    },
    Timeline {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "10")]
        bucket_minutes: u32,
    },
    Hourly {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Minute {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn fetch(client: &AnalyticsClient, resource: Resource) -> Result<()> {
    match resource {
        Resource::Status => print_json(&client.tremor_status().await?),
        Resource::Series { duration } => {
            let series = client.realtime_series(duration).await?;
            print_json(&serde_json::json!({
                "peak_intensity": series.peak_intensity(),
                "series": series,
            }))
        }
        Resource::Fft { window } => print_json(&client.fft_spectrum(window).await?),
        Resource::Health => print_json(&client.sensor_health().await?),
        Resource::Episodes { date } => {
            let daily = client.daily_episodes(date).await?;
            print_json(&serde_json::json!({
                "summary": EpisodeSummary::from_episodes(&daily.episodes),
                "episodes": daily,
            }))
        }
        Resource::Daily { date } => print_json(&client.daily_stats(date).await?),
        Resource::Weekly { days } => print_json(&client.weekly_stats(days).await?),
        Resource::Calendar { start, end } => print_json(&client.calendar(start, end).await?),
        Resource::Compare { days } => {
            let stats = client.comparative_stats(days).await?;
            print_json(&serde_json::json!({ "trend": stats.trend(), "stats": stats }))
        }
        Resource::Timeline { date, bucket_minutes } => {
            print_json(&client.amplitude_timeline(date, bucket_minutes).await?)
        }
        Resource::Hourly { date } => print_json(&client.hourly_heatmap(date).await?),
        Resource::Minute { date } => print_json(&client.minute_heatmap(date).await?),
    }
}

async fn watch(config: &ClientConfig, seconds: u64) -> Result<()> {
    let session = DashboardSession::mount(config)?;
    let mut updates = session.snapshots().subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                let gauge = snapshot.gauge();
                let (acc, gyro) = snapshot
                    .reading
                    .as_deref()
                    .map_or((0.0, 0.0), |r| (r.acc_magnitude(), r.gyro_magnitude()));
                info!(
                    "rev {} | {} ({}) intensity {:.1} avg30s {:.1} | live acc {:.2} gyro {:.2} | link {:?}",
                    snapshot.revision,
                    gauge.status_text,
                    gauge.color,
                    gauge.intensity,
                    gauge.avg_intensity_30s,
                    acc,
                    gyro,
                    snapshot.link
                );
            }
            _ = &mut deadline => break,
        }
    }

    let summary = session.teardown().await?;
    print_json(&summary)
}

async fn export(config: &ClientConfig, tree: PathBuf, root: String, out_dir: Option<PathBuf>) -> Result<()> {
    let content = std::fs::read_to_string(&tree).with_context(|| format!("failed to read {:?}", tree))?;
    let mut document: ViewDocument =
        serde_json::from_str(&content).with_context(|| format!("invalid view document {:?}", tree))?;

    let mut settings = ExportSettings::from_config(&config.export)?;
    if let Some(dir) = out_dir {
        settings.output_dir = dir;
    }
    let pipeline = ExportPipeline::new(settings);
    let artifact = pipeline.export(&mut document, &root).await?;
    print_json(&artifact)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    match cli.command {
        Commands::Watch { seconds } => watch(&config, seconds).await,
        Commands::Fetch { resource } => {
            let client = AnalyticsClient::new(&config.api)?;
            fetch(&client, resource).await
        }
        Commands::Detect { lookback_minutes } => {
            let client = AnalyticsClient::new(&config.api)?;
            print_json(&client.detect_episodes(lookback_minutes).await?)
        }
        Commands::Export { tree, root, out_dir } => export(&config, tree, root, out_dir).await,
    }
}
