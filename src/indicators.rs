//! Technical indicators over price series
//!
//! All functions return a vector aligned with the input: positions inside
//! the warmup window are `f64::NAN`, never a partial-window value.

/// Simple moving average. NaN inside the window propagates to the output.
pub fn sma(prices: &[f64], window: usize) -> Vec<f64> {
    rolling(prices, window, |w| {
        w.iter().sum::<f64>() / w.len() as f64
    })
}

/// Rolling sample standard deviation (ddof = 1).
pub fn rolling_std(prices: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; prices.len()];
    }
    rolling(prices, window, |w| {
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        let var = w.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    })
}

/// Rolling minimum.
pub fn rolling_min(prices: &[f64], window: usize) -> Vec<f64> {
    rolling(prices, window, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Rolling maximum.
pub fn rolling_max(prices: &[f64], window: usize) -> Vec<f64> {
    rolling(prices, window, |w| {
        w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with
/// the first value (recursive form, no warmup NaNs).
pub fn ema(prices: &[f64], span: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(prices.len());
    let mut prev = prices[0];
    out.push(prev);
    for &p in &prices[1..] {
        prev = alpha * p + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Relative Strength Index, Cutler's variant: rolling simple means of
/// one-step gains and losses. An all-gain window reads 100, an all-loss
/// window 0, a flat window NaN.
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let n = prices.len();
    let mut deltas = vec![f64::NAN; n];
    for i in 1..n {
        deltas[i] = prices[i] - prices[i - 1];
    }
    let gains: Vec<f64> = deltas
        .iter()
        .map(|&d| {
            if d.is_nan() {
                f64::NAN
            } else if d > 0.0 {
                d
            } else {
                0.0
            }
        })
        .collect();
    let losses: Vec<f64> = deltas
        .iter()
        .map(|&d| {
            if d.is_nan() {
                f64::NAN
            } else if d < 0.0 {
                -d
            } else {
                0.0
            }
        })
        .collect();

    let avg_gain = sma(&gains, period);
    let avg_loss = sma(&losses, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(&g, &l)| {
            let rs = g / l;
            100.0 - 100.0 / (1.0 + rs)
        })
        .collect()
}

/// Bollinger Bands.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub middle: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(prices: &[f64], window: usize, num_std: f64) -> BollingerBands {
    let middle = sma(prices, window);
    let std = rolling_std(prices, window);
    let upper: Vec<f64> = middle
        .iter()
        .zip(&std)
        .map(|(&m, &s)| m + num_std * s)
        .collect();
    let lower: Vec<f64> = middle
        .iter()
        .zip(&std)
        .map(|(&m, &s)| m - num_std * s)
        .collect();
    BollingerBands {
        middle,
        upper,
        lower,
    }
}

/// MACD line and its signal line.
#[derive(Debug, Clone)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

pub fn macd(prices: &[f64], fast: usize, slow: usize, signal_span: usize) -> Macd {
    let fast_ema = ema(prices, fast);
    let slow_ema = ema(prices, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(&f, &s)| f - s)
        .collect();
    let signal = ema(&line, signal_span);
    Macd { macd: line, signal }
}

/// Stochastic oscillator (%K from the rolling price range, %D its SMA).
#[derive(Debug, Clone)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic(prices: &[f64], period: usize, smooth: usize) -> Stochastic {
    let low = rolling_min(prices, period);
    let high = rolling_max(prices, period);
    let k: Vec<f64> = prices
        .iter()
        .zip(low.iter().zip(&high))
        .map(|(&p, (&lo, &hi))| (p - lo) / (hi - lo) * 100.0)
        .collect();
    let d = sma(&k, smooth);
    Stochastic { k, d }
}

/// Apply `f` to each full window; NaN until the window fills or whenever
/// the window contains a NaN.
fn rolling<F: Fn(&[f64]) -> f64>(prices: &[f64], window: usize, f: F) -> Vec<f64> {
    let n = prices.len();
    if window == 0 {
        return vec![f64::NAN; n];
    }
    let mut out = vec![f64::NAN; n];
    for i in (window - 1)..n {
        let w = &prices[i + 1 - window..=i];
        if w.iter().any(|x| x.is_nan()) {
            continue;
        }
        out[i] = f(w);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma_warmup_and_values() {
        let prices = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&prices, 3);
        assert_eq!(out.len(), 5);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_relative_eq!(out[2], 2.0);
        assert_relative_eq!(out[3], 3.0);
        assert_relative_eq!(out[4], 4.0);
    }

    #[test]
    fn test_sma_empty() {
        assert!(sma(&[], 3).is_empty());
    }

    #[test]
    fn test_rolling_std_sample() {
        // Sample std of [1,2,3] is 1.0 (ddof=1)
        let out = rolling_std(&[1.0, 2.0, 3.0], 3);
        assert_relative_eq!(out[2], 1.0);
    }

    #[test]
    fn test_rolling_std_degenerate_window() {
        let out = rolling_std(&[1.0, 2.0], 1);
        assert!(out.iter().all(|x| x.is_nan()));
    }

    #[test]
    fn test_ema_seeded_with_first() {
        let prices = [10.0, 10.0, 10.0];
        let out = ema(&prices, 5);
        // Constant input stays constant
        for &v in &out {
            assert_relative_eq!(v, 10.0);
        }
    }

    #[test]
    fn test_ema_moves_toward_price() {
        let out = ema(&[10.0, 20.0], 3);
        // alpha = 0.5: 0.5*20 + 0.5*10
        assert_relative_eq!(out[1], 15.0);
    }

    #[test]
    fn test_rsi_warmup() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&prices, 14);
        assert_eq!(out.len(), 20);
        // diff is NaN at 0, so the first full window ends at index 14
        for v in &out[..14] {
            assert!(v.is_nan());
        }
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&prices, 14);
        assert_relative_eq!(out[19], 100.0);
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&prices, 14);
        assert_relative_eq!(out[19], 0.0);
    }

    #[test]
    fn test_rsi_flat_is_nan() {
        let prices = vec![100.0; 20];
        let out = rsi(&prices, 14);
        assert!(out[19].is_nan());
    }

    #[test]
    fn test_bollinger_band_ordering() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let bands = bollinger(&prices, 20, 2.0);
        for i in 19..30 {
            assert!(bands.lower[i] < bands.middle[i]);
            assert!(bands.middle[i] < bands.upper[i]);
        }
    }

    #[test]
    fn test_macd_lengths() {
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64).sin()).collect();
        let m = macd(&prices, 12, 26, 9);
        assert_eq!(m.macd.len(), 50);
        assert_eq!(m.signal.len(), 50);
        // EMAs are seeded, so no NaNs anywhere
        assert!(m.macd.iter().all(|x| !x.is_nan()));
    }

    #[test]
    fn test_macd_uptrend_positive() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + 2.0 * i as f64).collect();
        let m = macd(&prices, 12, 26, 9);
        // Fast EMA tracks a rising series more closely than the slow one
        assert!(m.macd[59] > 0.0);
    }

    #[test]
    fn test_stochastic_bounds() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 7) % 13) as f64).collect();
        let s = stochastic(&prices, 14, 3);
        for i in 16..40 {
            assert!(s.k[i] >= 0.0 && s.k[i] <= 100.0);
            assert!(s.d[i] >= 0.0 && s.d[i] <= 100.0);
        }
    }

    #[test]
    fn test_stochastic_at_extremes() {
        let mut prices = vec![100.0, 99.0, 98.0, 97.0, 96.0];
        prices.extend((0..10).map(|i| 96.0 + i as f64));
        let s = stochastic(&prices, 5, 3);
        // Last price is the rolling max -> %K = 100
        assert_relative_eq!(s.k[14], 100.0);
    }

    #[test]
    fn test_stochastic_flat_window_nan() {
        let prices = vec![50.0; 20];
        let s = stochastic(&prices, 14, 3);
        assert!(s.k[19].is_nan());
    }
}
