//! Configuration management

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub binance: BinanceConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub backtest: BacktestSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    /// REST API endpoint
    pub rest_url: String,
    /// WebSocket endpoint
    pub ws_url: String,
    /// Public daily data dump endpoint
    pub archive_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory for parquet output (tilde-expanded)
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Seconds between buffer flushes to disk
    pub flush_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// Starting capital in quote currency
    pub initial_capital: f64,
    /// Bars per day for daily metric bucketing (1440 for minute bars)
    pub bars_per_day: usize,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://api.binance.com".to_string(),
            ws_url: "wss://stream.binance.com:9443/ws".to_string(),
            archive_url: "https://data.binance.vision".to_string(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: "~/.local/share/binquant".to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { flush_secs: 10 }
    }
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            bars_per_day: 1440,
        }
    }
}

impl Config {
    /// Load configuration, layering file (if present) and environment.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let expanded = shellexpand::tilde(
            path.as_ref()
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("non-utf8 config path"))?,
        )
        .into_owned();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&expanded).required(false))
            .add_source(config::Environment::with_prefix("BINQUANT").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Resolved data directory with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data.dir).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.stream.flush_secs, 10);
        assert_eq!(config.backtest.initial_capital, 100_000.0);
        assert_eq!(config.backtest.bars_per_day, 1440);
        assert!(config.binance.ws_url.starts_with("wss://"));
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [stream]
            flush_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.stream.flush_secs, 30);
        // Untouched sections fall back to defaults
        assert_eq!(config.binance.rest_url, "https://api.binance.com");
    }

    #[test]
    fn test_data_dir_expansion() {
        let config = Config {
            data: DataConfig {
                dir: "/tmp/binquant".to_string(),
            },
            ..Default::default()
        };
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/binquant"));
    }
}
