//! Signal generation for single-indicator strategies
//!
//! Each strategy reduces the price series to a per-bar state in
//! {-1, 0, +1} (short/flat-ish bias, neutral, long bias) and emits a
//! signal whenever the state changes: an increase is Buy, a decrease is
//! Sell. Bars where the underlying indicator is still warming up compare
//! as neutral.

use crate::indicators;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five supported single-indicator strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    MovingAverage,
    Rsi,
    BollingerBands,
    Macd,
    Stochastic,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::MovingAverage,
        StrategyKind::Rsi,
        StrategyKind::BollingerBands,
        StrategyKind::Macd,
        StrategyKind::Stochastic,
    ];
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::MovingAverage => write!(f, "moving_average"),
            StrategyKind::Rsi => write!(f, "rsi"),
            StrategyKind::BollingerBands => write!(f, "bollinger_bands"),
            StrategyKind::Macd => write!(f, "macd"),
            StrategyKind::Stochastic => write!(f, "stochastic"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "moving_average" | "ma" => Ok(StrategyKind::MovingAverage),
            "rsi" => Ok(StrategyKind::Rsi),
            "bollinger_bands" | "bollinger" | "bb" => Ok(StrategyKind::BollingerBands),
            "macd" => Ok(StrategyKind::Macd),
            "stochastic" | "stoch" => Ok(StrategyKind::Stochastic),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Per-bar trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Compute the signal series for a strategy over a price series.
///
/// Output length equals input length; the first bar is always Hold.
pub fn signals(kind: StrategyKind, prices: &[f64]) -> Vec<Signal> {
    let states = states(kind, prices);
    let mut out = vec![Signal::Hold; prices.len()];
    for i in 1..states.len() {
        out[i] = match states[i].cmp(&states[i - 1]) {
            std::cmp::Ordering::Greater => Signal::Buy,
            std::cmp::Ordering::Less => Signal::Sell,
            std::cmp::Ordering::Equal => Signal::Hold,
        };
    }
    out
}

fn states(kind: StrategyKind, prices: &[f64]) -> Vec<i8> {
    match kind {
        StrategyKind::MovingAverage => {
            let ma = indicators::sma(prices, 20);
            prices
                .iter()
                .zip(&ma)
                .map(|(&p, &m)| i8::from(p > m))
                .collect()
        }
        StrategyKind::Rsi => {
            let rsi = indicators::rsi(prices, 14);
            rsi.iter()
                .map(|&r| i8::from(r < 30.0) - i8::from(r > 70.0))
                .collect()
        }
        StrategyKind::BollingerBands => {
            let bands = indicators::bollinger(prices, 20, 2.0);
            prices
                .iter()
                .zip(bands.lower.iter().zip(&bands.upper))
                .map(|(&p, (&lo, &hi))| i8::from(p < lo) - i8::from(p > hi))
                .collect()
        }
        StrategyKind::Macd => {
            let m = indicators::macd(prices, 12, 26, 9);
            m.macd
                .iter()
                .zip(&m.signal)
                .map(|(&line, &sig)| i8::from(line > sig))
                .collect()
        }
        StrategyKind::Stochastic => {
            let s = indicators::stochastic(prices, 14, 3);
            s.k.iter()
                .zip(&s.d)
                .map(|(&k, &d)| {
                    i8::from(k < 20.0 && d < 20.0) - i8::from(k > 80.0 && d > 80.0)
                })
                .collect()
        }
    }
}
