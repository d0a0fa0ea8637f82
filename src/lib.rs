//! Binance market data pipeline
//!
//! Captures trade data (live websocket, REST klines, daily archive
//! dumps), aggregates it into per-second and per-minute bars, computes
//! technical indicators, and backtests single-indicator strategies.

pub mod aggregate;
pub mod backtest;
pub mod client;
pub mod config;
pub mod error;
pub mod indicators;
pub mod storage;
pub mod strategy;
pub mod stream;
pub mod types;
