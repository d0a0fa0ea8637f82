//! Trade tape aggregation
//!
//! Collapses raw aggTrades into per-second bars and resamples those to
//! one-minute bars for backtesting.

use crate::types::{AggTrade, MinuteBar, SecondBar};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::collections::BTreeMap;

/// Aggregate raw trades by wall-clock second.
///
/// Per second: trade count, summed quantity, mean price, and the split
/// between buyer-maker ("buy") and taker ("sell") trades. Output is
/// sorted by timestamp.
pub fn aggregate_by_second(trades: &[AggTrade]) -> Vec<SecondBar> {
    struct Acc {
        count: u64,
        volume: f64,
        price_sum: f64,
        buy_trades: u64,
    }

    let mut buckets: BTreeMap<DateTime<Utc>, Acc> = BTreeMap::new();
    for trade in trades {
        let second = floor_to(trade.timestamp, TimeDelta::seconds(1));
        let acc = buckets.entry(second).or_insert(Acc {
            count: 0,
            volume: 0.0,
            price_sum: 0.0,
            buy_trades: 0,
        });
        acc.count += 1;
        acc.volume += trade.qty;
        acc.price_sum += trade.price;
        if trade.is_buyer_maker {
            acc.buy_trades += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(timestamp, acc)| SecondBar {
            timestamp,
            trade_count: acc.count,
            volume: acc.volume,
            avg_price: acc.price_sum / acc.count as f64,
            buy_trades: acc.buy_trades,
            sell_trades: acc.count - acc.buy_trades,
        })
        .collect()
}

/// Resample second bars to one-minute bars: last price, summed volume and
/// trade count. Minutes with no data are dropped, not zero-filled.
pub fn resample_minutes(bars: &[SecondBar]) -> Vec<MinuteBar> {
    let mut buckets: BTreeMap<DateTime<Utc>, MinuteBar> = BTreeMap::new();
    for bar in bars {
        let minute = floor_to(bar.timestamp, TimeDelta::minutes(1));
        buckets
            .entry(minute)
            .and_modify(|m| {
                m.avg_price = bar.avg_price;
                m.volume += bar.volume;
                m.trade_count += bar.trade_count;
            })
            .or_insert(MinuteBar {
                timestamp: minute,
                avg_price: bar.avg_price,
                volume: bar.volume,
                trade_count: bar.trade_count,
            });
    }
    buckets.into_values().collect()
}

fn floor_to(ts: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    // duration_trunc only fails on zero/overflowing deltas
    ts.duration_trunc(delta).unwrap_or(ts)
}
