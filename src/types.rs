//! Market data row types shared across the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Single trade from the `@trade` websocket stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub qty: f64,
}

/// One row of the daily aggTrades archive CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggTrade {
    pub agg_trade_id: u64,
    pub price: f64,
    pub qty: f64,
    pub first_trade_id: u64,
    pub last_trade_id: u64,
    pub timestamp: DateTime<Utc>,
    pub is_buyer_maker: bool,
}

/// OHLCV candle from `/api/v3/klines`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: DateTime<Utc>,
    pub quote_volume: f64,
    pub trades: u64,
}

/// Per-second aggregate of the raw trade tape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondBar {
    pub timestamp: DateTime<Utc>,
    pub trade_count: u64,
    pub volume: f64,
    pub avg_price: f64,
    pub buy_trades: u64,
    pub sell_trades: u64,
}

/// One-minute resample consumed by the backtester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteBar {
    pub timestamp: DateTime<Utc>,
    /// Last per-second average price seen inside the minute.
    pub avg_price: f64,
    pub volume: f64,
    pub trade_count: u64,
}
