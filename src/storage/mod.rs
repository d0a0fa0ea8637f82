//! Parquet persistence for trade tapes, aggregated bars and backtest
//! results
//!
//! All files are written zstd-compressed. Readers resolve columns by
//! name so column order in existing files does not matter.

use crate::backtest::BacktestReport;
use crate::error::{QuantError, Result};
use crate::strategy::StrategyKind;
use crate::types::{Kline, SecondBar, Trade};
use arrow::array::{
    Array, ArrayRef, Float64Array, Float64Builder, ListBuilder, RecordBatch, StringArray,
    TimestampMillisecondArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

fn writer_props() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build()
}

fn ts_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Millisecond, None),
        false,
    )
}

fn write_batch(path: &Path, batch: RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_props()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

fn column<'a, T: 'static>(
    batch: &'a RecordBatch,
    path: &Path,
    name: &'static str,
) -> Result<&'a T> {
    let idx = batch.schema().index_of(name).map_err(|_| QuantError::Schema {
        path: path.display().to_string(),
        column: name,
    })?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or(QuantError::Schema {
            path: path.display().to_string(),
            column: name,
        })
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Write a trade tape (`timestamp`, `price`, `volume`).
pub fn write_trades(path: &Path, trades: &[Trade]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ts_field("timestamp"),
        Field::new("price", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
    ]));

    let timestamps: Vec<i64> = trades.iter().map(|t| t.timestamp.timestamp_millis()).collect();
    let prices: Vec<f64> = trades.iter().map(|t| t.price).collect();
    let volumes: Vec<f64> = trades.iter().map(|t| t.qty).collect();

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(TimestampMillisecondArray::from(timestamps)) as ArrayRef,
            Arc::new(Float64Array::from(prices)),
            Arc::new(Float64Array::from(volumes)),
        ],
    )?;
    write_batch(path, batch)
}

/// Read a trade tape written by [`write_trades`].
pub fn read_trades(path: &Path) -> Result<Vec<Trade>> {
    let mut trades = Vec::new();
    for batch in read_batches(path)? {
        let timestamps: &TimestampMillisecondArray = column(&batch, path, "timestamp")?;
        let prices: &Float64Array = column(&batch, path, "price")?;
        let volumes: &Float64Array = column(&batch, path, "volume")?;
        for i in 0..batch.num_rows() {
            trades.push(Trade {
                timestamp: millis_to_utc(timestamps.value(i)),
                price: prices.value(i),
                qty: volumes.value(i),
            });
        }
    }
    Ok(trades)
}

/// Append trades to an existing tape, rewriting the file.
pub fn append_trades(path: &Path, new_trades: &[Trade]) -> Result<usize> {
    let mut all = if path.exists() {
        read_trades(path)?
    } else {
        Vec::new()
    };
    all.extend_from_slice(new_trades);
    write_trades(path, &all)?;
    Ok(all.len())
}

/// Write a kline history.
pub fn write_klines(path: &Path, klines: &[Kline]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ts_field("open_time"),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
        ts_field("close_time"),
        Field::new("quote_volume", DataType::Float64, false),
        Field::new("trades", DataType::UInt64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(TimestampMillisecondArray::from(
                klines
                    .iter()
                    .map(|k| k.open_time.timestamp_millis())
                    .collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(Float64Array::from(
                klines.iter().map(|k| k.open).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                klines.iter().map(|k| k.high).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                klines.iter().map(|k| k.low).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                klines.iter().map(|k| k.close).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                klines.iter().map(|k| k.volume).collect::<Vec<_>>(),
            )),
            Arc::new(TimestampMillisecondArray::from(
                klines
                    .iter()
                    .map(|k| k.close_time.timestamp_millis())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                klines.iter().map(|k| k.quote_volume).collect::<Vec<_>>(),
            )),
            Arc::new(UInt64Array::from(
                klines.iter().map(|k| k.trades).collect::<Vec<_>>(),
            )),
        ],
    )?;
    write_batch(path, batch)
}

/// Read a kline history written by [`write_klines`].
pub fn read_klines(path: &Path) -> Result<Vec<Kline>> {
    let mut klines = Vec::new();
    for batch in read_batches(path)? {
        let open_times: &TimestampMillisecondArray = column(&batch, path, "open_time")?;
        let opens: &Float64Array = column(&batch, path, "open")?;
        let highs: &Float64Array = column(&batch, path, "high")?;
        let lows: &Float64Array = column(&batch, path, "low")?;
        let closes: &Float64Array = column(&batch, path, "close")?;
        let volumes: &Float64Array = column(&batch, path, "volume")?;
        let close_times: &TimestampMillisecondArray = column(&batch, path, "close_time")?;
        let quote_volumes: &Float64Array = column(&batch, path, "quote_volume")?;
        let trades: &UInt64Array = column(&batch, path, "trades")?;
        for i in 0..batch.num_rows() {
            klines.push(Kline {
                open_time: millis_to_utc(open_times.value(i)),
                open: opens.value(i),
                high: highs.value(i),
                low: lows.value(i),
                close: closes.value(i),
                volume: volumes.value(i),
                close_time: millis_to_utc(close_times.value(i)),
                quote_volume: quote_volumes.value(i),
                trades: trades.value(i),
            });
        }
    }
    Ok(klines)
}

/// Write per-second aggregate bars.
pub fn write_second_bars(path: &Path, bars: &[SecondBar]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ts_field("timestamp"),
        Field::new("trade_count", DataType::UInt64, false),
        Field::new("volume", DataType::Float64, false),
        Field::new("avg_price", DataType::Float64, false),
        Field::new("buy_trades", DataType::UInt64, false),
        Field::new("sell_trades", DataType::UInt64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(TimestampMillisecondArray::from(
                bars.iter()
                    .map(|b| b.timestamp.timestamp_millis())
                    .collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(UInt64Array::from(
                bars.iter().map(|b| b.trade_count).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                bars.iter().map(|b| b.volume).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                bars.iter().map(|b| b.avg_price).collect::<Vec<_>>(),
            )),
            Arc::new(UInt64Array::from(
                bars.iter().map(|b| b.buy_trades).collect::<Vec<_>>(),
            )),
            Arc::new(UInt64Array::from(
                bars.iter().map(|b| b.sell_trades).collect::<Vec<_>>(),
            )),
        ],
    )?;
    write_batch(path, batch)
}

/// Read per-second aggregate bars.
pub fn read_second_bars(path: &Path) -> Result<Vec<SecondBar>> {
    let mut bars = Vec::new();
    for batch in read_batches(path)? {
        let timestamps: &TimestampMillisecondArray = column(&batch, path, "timestamp")?;
        let counts: &UInt64Array = column(&batch, path, "trade_count")?;
        let volumes: &Float64Array = column(&batch, path, "volume")?;
        let prices: &Float64Array = column(&batch, path, "avg_price")?;
        let buys: &UInt64Array = column(&batch, path, "buy_trades")?;
        let sells: &UInt64Array = column(&batch, path, "sell_trades")?;
        for i in 0..batch.num_rows() {
            bars.push(SecondBar {
                timestamp: millis_to_utc(timestamps.value(i)),
                trade_count: counts.value(i),
                volume: volumes.value(i),
                avg_price: prices.value(i),
                buy_trades: buys.value(i),
                sell_trades: sells.value(i),
            });
        }
    }
    Ok(bars)
}

/// Write one row per strategy: scalar metrics plus the equity curve as a
/// list column.
pub fn write_reports(
    path: &Path,
    reports: &HashMap<StrategyKind, BacktestReport>,
) -> Result<()> {
    let ordered: Vec<&BacktestReport> = StrategyKind::ALL
        .iter()
        .filter_map(|k| reports.get(k))
        .collect();

    let names = StringArray::from(
        ordered
            .iter()
            .map(|r| r.strategy.to_string())
            .collect::<Vec<_>>(),
    );
    let returns =
        Float64Array::from(ordered.iter().map(|r| r.metrics.final_return_pct).collect::<Vec<_>>());
    let win_rates =
        Float64Array::from(ordered.iter().map(|r| r.metrics.win_rate_pct).collect::<Vec<_>>());
    let total_trades = UInt64Array::from(
        ordered
            .iter()
            .map(|r| r.metrics.total_trades as u64)
            .collect::<Vec<_>>(),
    );
    let drawdowns = Float64Array::from(
        ordered
            .iter()
            .map(|r| r.metrics.max_drawdown_pct)
            .collect::<Vec<_>>(),
    );

    let mut sharpe = Float64Builder::new();
    let mut profit_factor = Float64Builder::new();
    let mut var_5pct = Float64Builder::new();
    let mut expected_shortfall = Float64Builder::new();
    let mut avg_duration = Float64Builder::new();
    let mut loss_streaks = Vec::with_capacity(ordered.len());
    let mut curves = ListBuilder::new(Float64Builder::new());
    for report in &ordered {
        sharpe.append_option(report.metrics.sharpe_ratio);
        profit_factor.append_option(report.metrics.profit_factor);
        var_5pct.append_option(report.metrics.var_5pct);
        expected_shortfall.append_option(report.metrics.expected_shortfall);
        avg_duration.append_option(report.metrics.avg_trade_duration_bars);
        loss_streaks.push(report.metrics.max_consecutive_loss_days as u64);
        for &e in &report.equity_curve {
            curves.values().append_value(e);
        }
        curves.append(true);
    }
    let curves = curves.finish();

    let schema = Arc::new(Schema::new(vec![
        Field::new("strategy", DataType::Utf8, false),
        Field::new("returns", DataType::Float64, false),
        Field::new("win_rate", DataType::Float64, false),
        Field::new("total_trades", DataType::UInt64, false),
        Field::new("max_drawdown", DataType::Float64, false),
        Field::new("sharpe_ratio", DataType::Float64, true),
        Field::new("profit_factor", DataType::Float64, true),
        Field::new("var", DataType::Float64, true),
        Field::new("expected_shortfall", DataType::Float64, true),
        Field::new("max_consecutive_losses", DataType::UInt64, false),
        Field::new("avg_trade_duration", DataType::Float64, true),
        Field::new("equity_curve", curves.data_type().clone(), true),
    ]));

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(names) as ArrayRef,
            Arc::new(returns),
            Arc::new(win_rates),
            Arc::new(total_trades),
            Arc::new(drawdowns),
            Arc::new(sharpe.finish()),
            Arc::new(profit_factor.finish()),
            Arc::new(var_5pct.finish()),
            Arc::new(expected_shortfall.finish()),
            Arc::new(UInt64Array::from(loss_streaks)),
            Arc::new(avg_duration.finish()),
            Arc::new(curves),
        ],
    )?;
    write_batch(path, batch)
}

/// Row count of a results file (used for sanity checks and status output).
pub fn report_rows(path: &Path) -> Result<usize> {
    let mut rows = 0;
    for batch in read_batches(path)? {
        rows += batch.num_rows();
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{self, BacktestConfig};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_trades() -> Vec<Trade> {
        (0..5)
            .map(|i| Trade {
                timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + i * 1000).unwrap(),
                price: 50_000.0 + i as f64,
                qty: 0.1 * (i + 1) as f64,
            })
            .collect()
    }

    #[test]
    fn test_trades_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trades.parquet");
        let trades = sample_trades();
        write_trades(&path, &trades).unwrap();
        let back = read_trades(&path).unwrap();
        assert_eq!(back, trades);
    }

    #[test]
    fn test_append_trades() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trades.parquet");
        let trades = sample_trades();
        // First append creates the file
        assert_eq!(append_trades(&path, &trades[..2]).unwrap(), 2);
        assert_eq!(append_trades(&path, &trades[2..]).unwrap(), 5);
        assert_eq!(read_trades(&path).unwrap(), trades);
    }

    #[test]
    fn test_klines_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("klines.parquet");
        let klines: Vec<Kline> = (0..3)
            .map(|i| Kline {
                open_time: Utc.timestamp_millis_opt(1_704_067_200_000 + i * 60_000).unwrap(),
                open: 42_000.0 + i as f64,
                high: 42_100.0 + i as f64,
                low: 41_900.0 + i as f64,
                close: 42_050.0 + i as f64,
                volume: 12.5 * (i + 1) as f64,
                close_time: Utc.timestamp_millis_opt(1_704_067_259_999 + i * 60_000).unwrap(),
                quote_volume: 525_000.0,
                trades: 100 + i as u64,
            })
            .collect();
        write_klines(&path, &klines).unwrap();
        assert_eq!(read_klines(&path).unwrap(), klines);
    }

    #[test]
    fn test_second_bars_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bars.parquet");
        let bars = vec![SecondBar {
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            trade_count: 12,
            volume: 3.5,
            avg_price: 50_123.25,
            buy_trades: 7,
            sell_trades: 5,
        }];
        write_second_bars(&path, &bars).unwrap();
        assert_eq!(read_second_bars(&path).unwrap(), bars);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trades.parquet");
        write_trades(&path, &sample_trades()).unwrap();
        // A trade tape is not a second-bar file
        let err = read_second_bars(&path).unwrap_err();
        assert!(matches!(err, QuantError::Schema { .. }));
    }

    #[test]
    fn test_write_reports_one_row_per_strategy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.parquet");
        let prices: Vec<f64> = (0..100)
            .map(|i| 100.0 + 5.0 * ((i as f64) / 9.0).sin())
            .collect();
        let reports = backtest::run_all(&prices, &BacktestConfig::default());
        write_reports(&path, &reports).unwrap();
        assert_eq!(report_rows(&path).unwrap(), StrategyKind::ALL.len());
    }
}
