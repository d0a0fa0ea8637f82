//! Vectorized single-indicator backtests
//!
//! Long-only, all-in simulation: a Buy signal converts all capital to
//! position at that bar's price, a Sell converts it back. One equity
//! point is recorded per bar; an open position at the end is marked to
//! the last price but not force-closed.

pub mod metrics;

use crate::strategy::{self, Signal, StrategyKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

pub use metrics::Metrics;

/// Backtest parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Starting capital in quote currency
    pub initial_capital: f64,
    /// Bars per day, used to bucket per-bar returns into daily returns
    pub bars_per_day: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            bars_per_day: 1440,
        }
    }
}

/// One executed simulation trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimTrade {
    pub signal: Signal,
    pub price: f64,
    /// Bar index the trade executed at
    pub bar: usize,
    /// Round-trip return pct, set on the closing Sell
    pub return_pct: Option<f64>,
}

/// Full result of one strategy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy: StrategyKind,
    pub metrics: Metrics,
    pub trades: Vec<SimTrade>,
    /// Equity per bar, seeded with one initial-capital point
    pub equity_curve: Vec<f64>,
}

/// Run one strategy over a price series.
pub fn run(kind: StrategyKind, prices: &[f64], config: &BacktestConfig) -> BacktestReport {
    let signals = strategy::signals(kind, prices);

    let mut capital = config.initial_capital;
    let mut position = 0.0_f64;
    let mut entry_price = 0.0_f64;
    let mut trades: Vec<SimTrade> = Vec::new();
    let mut equity_curve = Vec::with_capacity(prices.len() + 1);
    equity_curve.push(config.initial_capital);

    for (bar, (&price, &signal)) in prices.iter().zip(&signals).enumerate() {
        match signal {
            Signal::Buy if position == 0.0 => {
                position = capital / price;
                entry_price = price;
                capital = 0.0;
                trades.push(SimTrade {
                    signal: Signal::Buy,
                    price,
                    bar,
                    return_pct: None,
                });
            }
            Signal::Sell if position > 0.0 => {
                capital = position * price;
                trades.push(SimTrade {
                    signal: Signal::Sell,
                    price,
                    bar,
                    return_pct: Some((price - entry_price) / entry_price * 100.0),
                });
                position = 0.0;
            }
            _ => {}
        }
        equity_curve.push(capital + position * price);
    }

    let metrics = metrics::compute(config, &equity_curve, &trades);

    info!(
        strategy = %kind,
        return_pct = metrics.final_return_pct,
        trades = metrics.total_trades,
        "backtest complete"
    );

    BacktestReport {
        strategy: kind,
        metrics,
        trades,
        equity_curve,
    }
}

/// Run every strategy over the same price series.
pub fn run_all(prices: &[f64], config: &BacktestConfig) -> HashMap<StrategyKind, BacktestReport> {
    StrategyKind::ALL
        .into_iter()
        .map(|kind| (kind, run(kind, prices, config)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config() -> BacktestConfig {
        BacktestConfig {
            initial_capital: 100_000.0,
            bars_per_day: 1440,
        }
    }

    #[test]
    fn test_equity_curve_seeded_once() {
        let prices = vec![100.0; 30];
        let report = run(StrategyKind::MovingAverage, &prices, &config());
        assert_eq!(report.equity_curve.len(), prices.len() + 1);
        assert_relative_eq!(report.equity_curve[0], 100_000.0);
    }

    #[test]
    fn test_no_signals_flat_equity() {
        let prices = vec![100.0; 50];
        let report = run(StrategyKind::MovingAverage, &prices, &config());
        assert!(report.trades.is_empty());
        assert!(report
            .equity_curve
            .iter()
            .all(|&e| (e - 100_000.0).abs() < 1e-9));
        assert_relative_eq!(report.metrics.final_return_pct, 0.0);
    }

    #[test]
    fn test_round_trip_profit() {
        // Flat, pop above MA (buy at 110), ride to 130, collapse (sell at 80)
        let mut prices = vec![100.0; 25];
        prices.extend([110.0, 120.0, 130.0]);
        prices.extend([80.0; 5]);
        let report = run(StrategyKind::MovingAverage, &prices, &config());

        let buys: Vec<_> = report
            .trades
            .iter()
            .filter(|t| t.signal == Signal::Buy)
            .collect();
        let sells: Vec<_> = report
            .trades
            .iter()
            .filter(|t| t.signal == Signal::Sell)
            .collect();
        assert_eq!(buys.len(), 1);
        assert_eq!(sells.len(), 1);
        assert_relative_eq!(buys[0].price, 110.0);
        assert_relative_eq!(sells[0].price, 80.0);

        // Bought at 110, sold at 80: 100_000 * 80/110
        let expected = 100_000.0 * 80.0 / 110.0;
        assert_relative_eq!(*report.equity_curve.last().unwrap(), expected, epsilon = 1e-6);
        let rt = sells[0].return_pct.unwrap();
        assert_relative_eq!(rt, (80.0 - 110.0) / 110.0 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_open_position_marked_to_market() {
        // Buy fires but no sell before the series ends
        let mut prices = vec![100.0; 25];
        prices.extend([110.0, 115.0, 120.0]);
        let report = run(StrategyKind::MovingAverage, &prices, &config());
        assert_eq!(report.trades.len(), 1);
        let expected = 100_000.0 / 110.0 * 120.0;
        assert_relative_eq!(*report.equity_curve.last().unwrap(), expected, epsilon = 1e-6);
        // No completed round trip, so no win-rate denominator
        assert_eq!(report.metrics.total_trades, 0);
    }

    #[test]
    fn test_sell_without_position_ignored() {
        // Drop below MA with no position held: Sell signal is a no-op
        let mut prices = vec![100.0; 25];
        prices.extend([80.0; 5]);
        let report = run(StrategyKind::MovingAverage, &prices, &config());
        assert!(report.trades.is_empty());
    }

    #[test]
    fn test_run_all_covers_every_strategy() {
        let prices: Vec<f64> = (0..100)
            .map(|i| 100.0 + 10.0 * ((i as f64) / 7.0).sin())
            .collect();
        let reports = run_all(&prices, &config());
        assert_eq!(reports.len(), StrategyKind::ALL.len());
        for kind in StrategyKind::ALL {
            assert!(reports.contains_key(&kind));
        }
    }

    #[test]
    fn test_empty_prices() {
        let report = run(StrategyKind::Rsi, &[], &config());
        assert_eq!(report.equity_curve, vec![100_000.0]);
        assert!(report.trades.is_empty());
        assert_relative_eq!(report.metrics.final_return_pct, 0.0);
    }
}
