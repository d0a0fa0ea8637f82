//! Binance spot REST client
//!
//! Covers the two public endpoints the pipeline needs: the ticker price
//! and historical klines, with pagination over the 1000-row page limit.

use crate::error::{QuantError, Result};
use crate::types::Kline;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Binance REST client
pub struct BinanceRest {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

impl BinanceRest {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Current spot price from `/api/v3/ticker/price`.
    pub async fn spot_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol.to_uppercase())])
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let ticker: TickerPrice = resp.json().await?;
        parse_f64(&ticker.price, "ticker price")
    }

    /// One page of klines from `/api/v3/klines` (at most 1000 rows).
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Kline>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol.to_uppercase()),
                ("interval", interval.to_string()),
                ("startTime", start.timestamp_millis().to_string()),
                ("endTime", end.timestamp_millis().to_string()),
                ("limit", limit.min(MAX_KLINES_PER_REQUEST).to_string()),
            ])
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let rows: Vec<Value> = resp.json().await?;
        rows.iter().map(parse_kline).collect()
    }

    /// All klines between `start` and `end`, paging past the per-request
    /// limit by advancing the start cursor to the last close time.
    pub async fn klines_range(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>> {
        let mut all = Vec::new();
        let mut cursor = start;

        while cursor < end {
            let page = self
                .klines(symbol, interval, cursor, end, MAX_KLINES_PER_REQUEST)
                .await?;
            let Some(last) = page.last() else { break };
            debug!(
                symbol,
                rows = page.len(),
                from = %cursor,
                "fetched kline page"
            );
            let next = last.close_time + chrono::TimeDelta::milliseconds(1);
            let full_page = page.len() == MAX_KLINES_PER_REQUEST;
            all.extend(page);
            if !full_page || next <= cursor {
                break;
            }
            cursor = next;
        }

        Ok(all)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(QuantError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Parse one 12-element kline row. Numeric fields arrive as JSON strings.
fn parse_kline(row: &Value) -> Result<Kline> {
    let arr = row.as_array().filter(|a| a.len() >= 9).ok_or_else(|| {
        QuantError::Malformed {
            what: "kline row",
            detail: row.to_string(),
        }
    })?;

    Ok(Kline {
        open_time: millis(&arr[0], "open_time")?,
        open: str_f64(&arr[1], "open")?,
        high: str_f64(&arr[2], "high")?,
        low: str_f64(&arr[3], "low")?,
        close: str_f64(&arr[4], "close")?,
        volume: str_f64(&arr[5], "volume")?,
        close_time: millis(&arr[6], "close_time")?,
        quote_volume: str_f64(&arr[7], "quote_volume")?,
        trades: arr[8].as_u64().ok_or(QuantError::Malformed {
            what: "kline row",
            detail: "trades is not an integer".to_string(),
        })?,
    })
}

fn millis(v: &Value, field: &str) -> Result<DateTime<Utc>> {
    let ms = v.as_i64().ok_or_else(|| QuantError::Malformed {
        what: "kline row",
        detail: format!("{field} is not a timestamp"),
    })?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| QuantError::Malformed {
        what: "kline row",
        detail: format!("{field} out of range: {ms}"),
    })
}

fn str_f64(v: &Value, field: &str) -> Result<f64> {
    let s = v.as_str().ok_or_else(|| QuantError::Malformed {
        what: "kline row",
        detail: format!("{field} is not a string"),
    })?;
    parse_f64(s, "kline field")
}

fn parse_f64(s: &str, what: &'static str) -> Result<f64> {
    s.parse().map_err(|_| QuantError::Malformed {
        what,
        detail: s.to_string(),
    })
}
