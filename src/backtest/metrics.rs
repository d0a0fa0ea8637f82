//! Performance metrics over an equity curve

use super::{BacktestConfig, SimTrade};
use serde::{Deserialize, Serialize};

/// Summary statistics for one strategy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub final_return_pct: f64,
    /// Completed round trips (a Buy closed by a Sell)
    pub total_trades: usize,
    pub winning_trades: usize,
    /// Wins over completed round trips, in percent
    pub win_rate_pct: f64,
    /// Worst peak-to-trough loss of the equity curve, in percent
    pub max_drawdown_pct: f64,
    /// Annualized from daily returns; None below two full days or with
    /// zero variance
    pub sharpe_ratio: Option<f64>,
    /// Gross positive daily returns over gross negative; None when no
    /// losing days
    pub profit_factor: Option<f64>,
    /// 5th percentile of daily returns
    pub var_5pct: Option<f64>,
    /// Mean daily return below the VaR cutoff
    pub expected_shortfall: Option<f64>,
    pub max_consecutive_loss_days: usize,
    pub avg_trade_duration_bars: Option<f64>,
}

pub fn compute(config: &BacktestConfig, equity_curve: &[f64], trades: &[SimTrade]) -> Metrics {
    let initial = config.initial_capital;
    let last = equity_curve.last().copied().unwrap_or(initial);
    let final_return_pct = (last - initial) / initial * 100.0;

    let completed: Vec<f64> = trades.iter().filter_map(|t| t.return_pct).collect();
    let total_trades = completed.len();
    let winning_trades = completed.iter().filter(|&&r| r > 0.0).count();
    let win_rate_pct = if total_trades > 0 {
        winning_trades as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    let max_drawdown_pct = max_drawdown(equity_curve);

    let daily = daily_returns(equity_curve, config.bars_per_day);
    let sharpe_ratio = sharpe(&daily);
    let profit_factor = profit_factor(&daily);
    let var_5pct = percentile(&daily, 5.0);
    let expected_shortfall = var_5pct.and_then(|var| {
        let tail: Vec<f64> = daily.iter().copied().filter(|&r| r < var).collect();
        (!tail.is_empty()).then(|| tail.iter().sum::<f64>() / tail.len() as f64)
    });
    let max_consecutive_loss_days = max_consecutive_losses(&daily);

    let bars = equity_curve.len().saturating_sub(1);
    let avg_trade_duration_bars =
        (total_trades > 0).then(|| bars as f64 / total_trades as f64);

    Metrics {
        final_return_pct,
        total_trades,
        winning_trades,
        win_rate_pct,
        max_drawdown_pct,
        sharpe_ratio,
        profit_factor,
        var_5pct,
        expected_shortfall,
        max_consecutive_loss_days,
        avg_trade_duration_bars,
    }
}

/// Worst peak-to-trough decline in percent.
fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &value in equity_curve {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let dd = (peak - value) / peak * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Per-bar simple returns summed into day buckets; trailing partial days
/// are dropped.
fn daily_returns(equity_curve: &[f64], bars_per_day: usize) -> Vec<f64> {
    if bars_per_day == 0 || equity_curve.len() < 2 {
        return Vec::new();
    }
    let per_bar: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect();

    per_bar
        .chunks_exact(bars_per_day)
        .map(|day| day.iter().sum())
        .collect()
}

fn sharpe(daily: &[f64]) -> Option<f64> {
    if daily.len() < 2 {
        return None;
    }
    let n = daily.len() as f64;
    let mean = daily.iter().sum::<f64>() / n;
    let var = daily.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / n;
    let std = var.sqrt();
    if std == 0.0 {
        return None;
    }
    Some(mean / std * 252.0_f64.sqrt())
}

fn profit_factor(daily: &[f64]) -> Option<f64> {
    let gross_profit: f64 = daily.iter().filter(|&&r| r > 0.0).sum();
    let gross_loss: f64 = -daily.iter().filter(|&&r| r < 0.0).sum::<f64>();
    (gross_loss > 0.0).then(|| gross_profit / gross_loss)
}

/// Linear-interpolation percentile of an unsorted sample.
fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn max_consecutive_losses(daily: &[f64]) -> usize {
    let mut best = 0;
    let mut run = 0;
    for &r in daily {
        if r < 0.0 {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_max_drawdown_simple() {
        // Peak 120, trough 90: 25% drawdown
        let curve = [100.0, 120.0, 90.0, 110.0];
        assert_relative_eq!(max_drawdown(&curve), 25.0);
    }

    #[test]
    fn test_max_drawdown_monotonic_up() {
        let curve = [100.0, 110.0, 120.0];
        assert_relative_eq!(max_drawdown(&curve), 0.0);
    }

    #[test]
    fn test_daily_returns_truncates_partial_day() {
        // 5 per-bar returns with 2 bars per day -> 2 full days, 1 dropped
        let curve = [100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        let daily = daily_returns(&curve, 2);
        assert_eq!(daily.len(), 2);
        assert_relative_eq!(daily[0], 0.01 + 1.0 / 101.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sharpe_needs_variance() {
        assert!(sharpe(&[0.01, 0.01, 0.01]).is_none());
        assert!(sharpe(&[0.01]).is_none());
        assert!(sharpe(&[0.01, -0.02, 0.03]).is_some());
    }

    #[test]
    fn test_profit_factor() {
        let daily = [0.02, -0.01, 0.03, -0.01];
        assert_relative_eq!(profit_factor(&daily).unwrap(), 2.5);
        // No losing days -> undefined, not infinity
        assert!(profit_factor(&[0.01, 0.02]).is_none());
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&values, 50.0).unwrap(), 3.0);
        assert_relative_eq!(percentile(&values, 25.0).unwrap(), 2.0);
        assert_relative_eq!(percentile(&values, 0.0).unwrap(), 1.0);
        assert!(percentile(&[], 5.0).is_none());
    }

    #[test]
    fn test_max_consecutive_losses() {
        let daily = [0.01, -0.01, -0.02, -0.03, 0.01, -0.01];
        assert_eq!(max_consecutive_losses(&daily), 3);
        assert_eq!(max_consecutive_losses(&[0.01, 0.02]), 0);
    }

    #[test]
    fn test_compute_empty_curve() {
        let config = BacktestConfig::default();
        let m = compute(&config, &[config.initial_capital], &[]);
        assert_relative_eq!(m.final_return_pct, 0.0);
        assert_eq!(m.total_trades, 0);
        assert!(m.sharpe_ratio.is_none());
        assert!(m.avg_trade_duration_bars.is_none());
    }
}
