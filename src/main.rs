//! Binance market data pipeline CLI

use anyhow::Context;
use binquant::{
    aggregate,
    backtest::{self, BacktestConfig},
    client::{ArchiveClient, BinanceRest},
    config::Config,
    error::QuantError,
    storage,
    strategy::StrategyKind,
    stream::{TradeRecorder, TradeStream},
};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "binquant")]
#[command(about = "Binance market data capture, aggregation and strategy backtesting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current spot price
    Price {
        /// Trading pair symbol
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
    },
    /// Fetch historical klines
    Klines {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        /// Kline interval (1m, 1h, 1d, ...)
        #[arg(short, long, default_value = "1d")]
        interval: String,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// End date (YYYY-MM-DD), defaults to now
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Write the full history to a parquet file instead of just
        /// printing the head
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Capture the live trade stream to daily parquet files
    Stream {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        /// Seconds between buffer flushes (overrides config)
        #[arg(long)]
        flush_secs: Option<u64>,
    },
    /// Download daily aggTrades archives and aggregate them by second
    Import {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Compute Bollinger bands over an aggregated file
    Bands {
        /// Second-bar parquet file
        input: PathBuf,
        #[arg(long, default_value = "20")]
        window: usize,
        #[arg(long, default_value = "2.0")]
        num_std: f64,
    },
    /// Backtest all strategies over an aggregated file
    Backtest {
        /// Second-bar parquet file
        input: PathBuf,
        /// Starting capital (overrides config)
        #[arg(long)]
        capital: Option<f64>,
        /// Results parquet path (defaults to backtesting_results.parquet
        /// in the data dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Price { symbol } => show_price(config, &symbol).await,
        Commands::Klines {
            symbol,
            interval,
            start,
            end,
            out,
        } => fetch_klines(config, &symbol, &interval, start, end, out).await,
        Commands::Stream { symbol, flush_secs } => run_stream(config, &symbol, flush_secs).await,
        Commands::Import { symbol, start, end } => run_import(config, &symbol, start, end).await,
        Commands::Bands {
            input,
            window,
            num_std,
        } => run_bands(&input, window, num_std),
        Commands::Backtest {
            input,
            capital,
            out,
        } => run_backtest(config, &input, capital, out),
    }
}

async fn show_price(config: Config, symbol: &str) -> anyhow::Result<()> {
    let client = BinanceRest::new(&config.binance.rest_url)?;
    let price = client.spot_price(symbol).await?;
    println!("{}: ${:.2}", symbol.to_uppercase(), price);
    Ok(())
}

async fn fetch_klines(
    config: Config,
    symbol: &str,
    interval: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let client = BinanceRest::new(&config.binance.rest_url)?;
    let start = day_start(start);
    let end = end.map(day_start).unwrap_or_else(Utc::now);

    let klines = client
        .klines_range(symbol, interval, start, end)
        .await
        .context("fetching klines")?;

    if let Some(out) = out {
        storage::write_klines(&out, &klines).context("writing klines")?;
        println!(
            "Saved {} {} {} klines to {}",
            klines.len(),
            symbol.to_uppercase(),
            interval,
            out.display()
        );
        return Ok(());
    }

    println!(
        "\n{} {} klines, {} rows:\n",
        symbol.to_uppercase(),
        interval,
        klines.len()
    );
    println!(
        "{:<22} {:>12} {:>12} {:>12} {:>12} {:>14}",
        "open time", "open", "high", "low", "close", "volume"
    );
    for k in klines.iter().take(10) {
        println!(
            "{:<22} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>14.4}",
            k.open_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            k.open,
            k.high,
            k.low,
            k.close,
            k.volume
        );
    }
    if klines.len() > 10 {
        println!("... {} more rows", klines.len() - 10);
    }
    Ok(())
}

async fn run_stream(config: Config, symbol: &str, flush_secs: Option<u64>) -> anyhow::Result<()> {
    let flush = Duration::from_secs(flush_secs.unwrap_or(config.stream.flush_secs));
    let data_dir = config.data_dir();

    tracing::info!(symbol, dir = %data_dir.display(), "starting capture");

    let (tx, rx) = tokio::sync::mpsc::channel(4096);
    let stream = TradeStream::new(&config.binance.ws_url, symbol, tx);
    let recorder = Arc::new(TradeRecorder::new(&data_dir, symbol, flush));

    let stream_task = tokio::spawn(stream.start());
    let rec = Arc::clone(&recorder);
    let recorder_task = tokio::spawn(async move { rec.run(rx).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupted, shutting down");

    // Dropping the stream ends the channel; the recorder does its final
    // flush before exiting.
    stream_task.abort();
    recorder_task.await??;
    Ok(())
}

async fn run_import(
    config: Config,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<()> {
    anyhow::ensure!(start <= end, "start date after end date");
    let client = ArchiveClient::new(&config.binance.archive_url)?;

    let mut all_bars = Vec::new();
    let mut date = start;
    while date <= end {
        match client.daily_agg_trades(symbol, date).await {
            Ok(trades) => {
                let bars = aggregate::aggregate_by_second(&trades);
                tracing::info!(
                    %date,
                    raw_rows = trades.len(),
                    seconds = bars.len(),
                    "processed day"
                );
                all_bars.extend(bars);
            }
            Err(QuantError::ArchiveMissing { .. }) => {
                tracing::warn!(%date, "no archive for day, skipping");
            }
            Err(e) => return Err(e).context(format!("downloading {date}")),
        }
        date += TimeDelta::days(1);
    }

    if all_bars.is_empty() {
        println!("No data was processed");
        return Ok(());
    }
    all_bars.sort_by_key(|b| b.timestamp);

    let out = config
        .data_dir()
        .join(format!("{}_trades_by_second.parquet", symbol.to_lowercase()));
    storage::write_second_bars(&out, &all_bars)?;

    let total_trades: u64 = all_bars.iter().map(|b| b.trade_count).sum();
    println!("\nImport summary");
    println!("{}", "=".repeat(50));
    println!("Seconds: {}", all_bars.len());
    println!("Trades:  {total_trades}");
    println!(
        "Range:   {} to {}",
        all_bars.first().map(|b| b.timestamp.to_string()).unwrap_or_default(),
        all_bars.last().map(|b| b.timestamp.to_string()).unwrap_or_default()
    );
    println!("Output:  {}", out.display());
    Ok(())
}

fn run_bands(input: &PathBuf, window: usize, num_std: f64) -> anyhow::Result<()> {
    let bars = storage::read_second_bars(input).context("reading second bars")?;
    let prices: Vec<f64> = bars.iter().map(|b| b.avg_price).collect();
    let bands = binquant::indicators::bollinger(&prices, window, num_std);

    let mean = |v: &[f64]| {
        let valid: Vec<f64> = v.iter().copied().filter(|x| !x.is_nan()).collect();
        if valid.is_empty() {
            f64::NAN
        } else {
            valid.iter().sum::<f64>() / valid.len() as f64
        }
    };

    println!("\nBollinger bands over {} rows (window={window}, std={num_std})", bars.len());
    println!("Average middle band: {:.2}", mean(&bands.middle));
    println!("Average upper band:  {:.2}", mean(&bands.upper));
    println!("Average lower band:  {:.2}", mean(&bands.lower));

    println!("\n{:<22} {:>12} {:>12} {:>12} {:>12}", "time", "price", "middle", "upper", "lower");
    for (i, bar) in bars.iter().enumerate().skip(window.saturating_sub(1)).take(10) {
        println!(
            "{:<22} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
            bar.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            bar.avg_price,
            bands.middle[i],
            bands.upper[i],
            bands.lower[i]
        );
    }
    Ok(())
}

fn run_backtest(
    config: Config,
    input: &PathBuf,
    capital: Option<f64>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let bars = storage::read_second_bars(input).context("reading second bars")?;
    let minutes = aggregate::resample_minutes(&bars);
    let prices: Vec<f64> = minutes.iter().map(|m| m.avg_price).collect();
    tracing::info!(seconds = bars.len(), minutes = minutes.len(), "resampled input");

    let bt_config = BacktestConfig {
        initial_capital: capital.unwrap_or(config.backtest.initial_capital),
        bars_per_day: config.backtest.bars_per_day,
    };
    let reports = backtest::run_all(&prices, &bt_config);

    println!("\nStrategy Performance Summary");
    println!("{}", "=".repeat(80));
    println!(
        "{:<20} {:>10} {:>12} {:>12} {:>10}",
        "Strategy", "Return %", "Win Rate %", "Trades", "Max DD %"
    );
    println!("{}", "-".repeat(80));
    for kind in StrategyKind::ALL {
        let m = &reports[&kind].metrics;
        println!(
            "{:<20} {:>10.2} {:>12.2} {:>12} {:>10.2}",
            kind.to_string(),
            m.final_return_pct,
            m.win_rate_pct,
            m.total_trades,
            m.max_drawdown_pct
        );
    }

    let out = out.unwrap_or_else(|| config.data_dir().join("backtesting_results.parquet"));
    storage::write_reports(&out, &reports)?;
    println!("\nResults saved to {}", out.display());
    Ok(())
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}
