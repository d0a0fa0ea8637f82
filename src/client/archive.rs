//! Daily aggTrades archive client
//!
//! Binance publishes each day's aggregated trades as a ZIP on
//! `data.binance.vision`. The ZIP holds one headerless CSV with eight
//! columns: agg trade id, price, quantity, first trade id, last trade
//! id, timestamp (ms), is-buyer-maker, is-best-match.

use crate::error::{QuantError, Result};
use crate::types::AggTrade;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use std::io::{Cursor, Read};
use tracing::warn;
use zip::ZipArchive;

pub struct ArchiveClient {
    http: Client,
    base_url: String,
}

impl ArchiveClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Download and parse one day of aggTrades. A 404 means the archive
    /// was never published for that day (weekend gaps, listing date) and
    /// maps to [`QuantError::ArchiveMissing`].
    pub async fn daily_agg_trades(&self, symbol: &str, date: NaiveDate) -> Result<Vec<AggTrade>> {
        let symbol = symbol.to_uppercase();
        let file_name = format!("{}-aggTrades-{}.zip", symbol, date.format("%Y-%m-%d"));
        let url = format!(
            "{}/data/spot/daily/aggTrades/{}/{}",
            self.base_url, symbol, file_name
        );

        let resp = self.http.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(QuantError::ArchiveMissing { symbol, date });
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(QuantError::Api { status, body });
        }

        let bytes = resp.bytes().await?;
        let csv = extract_csv(&bytes, &file_name)?;
        Ok(parse_agg_trades(&csv))
    }
}

/// Pull the CSV out of the downloaded ZIP. The member is named like the
/// archive with the extension swapped.
fn extract_csv(bytes: &[u8], zip_name: &str) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let csv_name = zip_name.replace(".zip", ".csv");
    let mut file = archive.by_name(&csv_name)?;
    let mut csv = String::with_capacity(file.size() as usize);
    file.read_to_string(&mut csv)?;
    Ok(csv)
}

/// Parse the headerless CSV. Malformed rows are skipped with a warning
/// rather than failing a multi-gigabyte import.
pub fn parse_agg_trades(csv: &str) -> Vec<AggTrade> {
    let mut trades = Vec::new();
    let mut skipped = 0usize;
    for line in csv.lines() {
        if line.is_empty() {
            continue;
        }
        match parse_row(line) {
            Some(trade) => trades.push(trade),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "skipped malformed aggTrades rows");
    }
    trades
}

fn parse_row(line: &str) -> Option<AggTrade> {
    let mut fields = line.split(',');
    let agg_trade_id = fields.next()?.trim().parse().ok()?;
    let price = fields.next()?.trim().parse().ok()?;
    let qty = fields.next()?.trim().parse().ok()?;
    let first_trade_id = fields.next()?.trim().parse().ok()?;
    let last_trade_id = fields.next()?.trim().parse().ok()?;
    let ms: i64 = fields.next()?.trim().parse().ok()?;
    let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(ms)?;
    let is_buyer_maker = parse_bool(fields.next()?.trim())?;

    Some(AggTrade {
        agg_trade_id,
        price,
        qty,
        first_trade_id,
        last_trade_id,
        timestamp,
        is_buyer_maker,
    })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "True" | "1" => Some(true),
        "false" | "False" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
26129,4261.48,0.012,27781,27781,1704067200001,true,true
26130,4261.50,1.000,27782,27783,1704067200500,false,true
garbage line that should be skipped
26131,4262.00,0.500,27784,27784,1704067201002,True,True";

    #[test]
    fn test_parse_agg_trades() {
        let trades = parse_agg_trades(SAMPLE);
        assert_eq!(trades.len(), 3);
        assert_eq!(trades[0].agg_trade_id, 26129);
        assert_eq!(trades[0].price, 4261.48);
        assert!(trades[0].is_buyer_maker);
        assert!(!trades[1].is_buyer_maker);
        // Python-style capitalized booleans appear in some dumps
        assert!(trades[2].is_buyer_maker);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_agg_trades("").is_empty());
    }

    #[test]
    fn test_parse_row_timestamp() {
        let trades = parse_agg_trades(SAMPLE);
        assert_eq!(trades[0].timestamp.timestamp_millis(), 1704067200001);
    }

    #[test]
    fn test_extract_csv_round_trip() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            writer
                .start_file("BTCUSDT-aggTrades-2024-01-01.csv", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(SAMPLE.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        let bytes = buf.into_inner();
        let csv = extract_csv(&bytes, "BTCUSDT-aggTrades-2024-01-01.zip").unwrap();
        assert_eq!(parse_agg_trades(&csv).len(), 3);
    }
}
