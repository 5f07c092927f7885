//! TOML configuration for the client runtime.
//!
//! Provides two loading methods:
//! - `ClientConfig::default()` - Embedded defaults compiled into the binary
//! - `ClientConfig::load(path)` - A user file layered over those defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::export::tree::Rgba;

/// Defaults embedded at compile time from `config/default.toml`.
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub channel: ChannelConfig,
    pub poller: PollerConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub interval_ms: u64,
    pub series_duration_secs: u32,
    pub fft_window_size: u32,
    #[serde(default)]
    pub discard_stale_responses: bool,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Where documents are saved. Falls back to the user's documents folder.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub margin_mm: f64,
    pub scale: f32,
    pub background: String,
    pub brand_color: String,
}

impl ExportConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.directory
            .clone()
            .or_else(dirs::document_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn background_rgba(&self) -> Result<Rgba> {
        Rgba::parse(&self.background)
            .with_context(|| format!("invalid export background '{}'", self.background))
    }

    pub fn brand_rgba(&self) -> Result<Rgba> {
        Rgba::parse(&self.brand_color)
            .with_context(|| format!("invalid export brand color '{}'", self.brand_color))
    }
}

impl Default for ClientConfig {
    /// # Panics
    /// Panics if the embedded TOML is invalid (this would be a compile-time bug).
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default.toml must be valid TOML")
    }
}

impl ClientConfig {
    /// Load a config file, filling any missing key from the embedded defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        let overrides: toml::Table = toml::from_str(content)?;
        merge_tables(&mut merged, overrides);

        let config: ClientConfig = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poller.interval_ms == 0 {
            bail!("poller.interval_ms must be greater than zero");
        }
        if self.export.scale < 1.0 {
            bail!("export.scale must be at least 1");
        }
        if self.export.page_width_mm <= 2.0 * self.export.margin_mm
            || self.export.page_height_mm <= 2.0 * self.export.margin_mm
        {
            bail!("export margins leave no printable page body");
        }
        url::Url::parse(&self.api.base_url)
            .with_context(|| format!("invalid api.base_url '{}'", self.api.base_url))?;
        url::Url::parse(&self.channel.url)
            .with_context(|| format!("invalid channel.url '{}'", self.channel.url))?;
        self.export.background_rgba()?;
        self.export.brand_rgba()?;
        Ok(())
    }
}

fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_child)), toml::Value::Table(child)) => {
                merge_tables(base_child, child);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
