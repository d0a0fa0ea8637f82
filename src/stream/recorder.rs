//! Buffered persistence for the live trade stream
//!
//! Trades accumulate in a lock-guarded buffer and are flushed to a daily
//! parquet file on an interval. A failed flush keeps the rows buffered
//! for the next tick.

use crate::error::Result;
use crate::storage;
use crate::types::Trade;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct TradeRecorder {
    data_dir: PathBuf,
    symbol: String,
    flush_interval: Duration,
    buffer: Mutex<Vec<Trade>>,
    total_trades: Mutex<u64>,
}

impl TradeRecorder {
    pub fn new(data_dir: &Path, symbol: &str, flush_interval: Duration) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            symbol: symbol.to_uppercase(),
            flush_interval,
            buffer: Mutex::new(Vec::new()),
            total_trades: Mutex::new(0),
        }
    }

    /// Target file for a given day: `{SYMBOL}_{YYYYMMDD}.parquet`.
    pub fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.parquet", self.symbol, date.format("%Y%m%d")))
    }

    /// Consume trades until the channel closes, flushing on the
    /// configured interval and once more on shutdown.
    pub async fn run(&self, mut rx: mpsc::Receiver<Trade>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                trade = rx.recv() => {
                    match trade {
                        Some(trade) => {
                            let mut buffer = self.buffer.lock();
                            buffer.push(trade);
                            *self.total_trades.lock() += 1;
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.flush() {
                        warn!("flush failed, keeping buffer: {e}");
                    }
                }
            }
        }

        self.flush()?;
        info!(total = *self.total_trades.lock(), "stream stopped, final flush done");
        Ok(())
    }

    /// Write buffered trades to today's file. On failure the rows are
    /// put back in order.
    pub fn flush(&self) -> Result<usize> {
        let pending = std::mem::take(&mut *self.buffer.lock());
        if pending.is_empty() {
            return Ok(0);
        }

        let path = self.daily_path(Utc::now().date_naive());
        match storage::append_trades(&path, &pending) {
            Ok(file_rows) => {
                let last_price = pending.last().map(|t| t.price).unwrap_or(0.0);
                info!(
                    flushed = pending.len(),
                    file_rows,
                    last_price,
                    total = *self.total_trades.lock(),
                    path = %path.display(),
                    "flushed trades"
                );
                Ok(pending.len())
            }
            Err(e) => {
                let mut buffer = self.buffer.lock();
                let newer = std::mem::take(&mut *buffer);
                *buffer = pending;
                buffer.extend(newer);
                Err(e)
            }
        }
    }

    /// Trades seen since startup.
    pub fn total_trades(&self) -> u64 {
        *self.total_trades.lock()
    }
}
