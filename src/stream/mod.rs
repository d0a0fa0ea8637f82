//! Live trade capture from the Binance websocket
//!
//! [`TradeStream`] maintains the connection and forwards parsed trades
//! over a channel; [`TradeRecorder`] buffers them and flushes to daily
//! parquet files on a timer.

pub mod recorder;

pub use recorder::TradeRecorder;

use crate::error::{QuantError, Result};
use crate::types::Trade;
use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Payload of a `{symbol}@trade` event.
#[derive(Debug, Deserialize)]
struct TradeEvent {
    /// Event time in milliseconds
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    qty: String,
}

/// Websocket trade stream with automatic reconnection.
pub struct TradeStream {
    url: String,
    symbol: String,
    tx: mpsc::Sender<Trade>,
}

impl TradeStream {
    pub fn new(url: &str, symbol: &str, tx: mpsc::Sender<Trade>) -> Self {
        Self {
            url: url.to_string(),
            symbol: symbol.to_lowercase(),
            tx,
        }
    }

    fn subscribe_message(&self) -> String {
        serde_json::json!({
            "method": "SUBSCRIBE",
            "params": [format!("{}@trade", self.symbol)],
            "id": 1
        })
        .to_string()
    }

    /// Run until the receiving side of the channel is dropped.
    /// Reconnects with exponential backoff, reset after a successful
    /// session.
    pub async fn start(self) -> Result<()> {
        info!(symbol = %self.symbol, url = %self.url, "starting trade stream");
        let mut delay = INITIAL_RECONNECT_DELAY;

        loop {
            match self.connect_and_read().await {
                Ok(SessionEnd::ReceiverDropped) => {
                    info!("trade channel closed, stopping stream");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected) => {
                    // A server that closes right after accepting would
                    // otherwise spin in a tight reconnect loop
                    warn!("websocket disconnected, reconnecting...");
                    delay = INITIAL_RECONNECT_DELAY;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("websocket error: {e}, reconnecting in {delay:?}");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                }
            }
        }
    }

    async fn connect_and_read(&self) -> Result<SessionEnd> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| QuantError::WebSocket(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(self.subscribe_message().into()))
            .await
            .map_err(|e| QuantError::WebSocket(e.to_string()))?;
        info!(symbol = %self.symbol, "subscribed to trade stream");

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let Some(trade) = parse_trade(&text) else {
                        // Subscription acks and other control frames
                        debug!("ignoring non-trade message");
                        continue;
                    };
                    if self.tx.send(trade).await.is_err() {
                        return Ok(SessionEnd::ReceiverDropped);
                    }
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled by tungstenite
                    debug!("ping");
                }
                Ok(Message::Close(_)) => {
                    warn!("websocket closed by server");
                    break;
                }
                Err(e) => {
                    error!("websocket read error: {e}");
                    break;
                }
                _ => {}
            }
        }

        Ok(SessionEnd::Disconnected)
    }
}

enum SessionEnd {
    Disconnected,
    ReceiverDropped,
}

/// Parse a trade event, returning None for anything else on the socket.
fn parse_trade(text: &str) -> Option<Trade> {
    let event: TradeEvent = serde_json::from_str(text).ok()?;
    Some(Trade {
        timestamp: DateTime::from_timestamp_millis(event.event_time)?,
        price: event.price.parse().ok()?,
        qty: event.qty.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trade_event() {
        let msg = r#"{"e":"trade","E":1704067200123,"s":"BTCUSDT","t":1,"p":"42000.50","q":"0.015","T":1704067200120,"m":true,"M":true}"#;
        let trade = parse_trade(msg).unwrap();
        assert_eq!(trade.timestamp.timestamp_millis(), 1704067200123);
        assert_eq!(trade.price, 42000.50);
        assert_eq!(trade.qty, 0.015);
    }

    #[test]
    fn test_parse_ignores_subscription_ack() {
        assert!(parse_trade(r#"{"result":null,"id":1}"#).is_none());
    }

    #[test]
    fn test_subscribe_message_lowercases_symbol() {
        let (tx, _rx) = mpsc::channel(1);
        let stream = TradeStream::new("wss://example", "BTCUSDT", tx);
        let msg = stream.subscribe_message();
        assert!(msg.contains("btcusdt@trade"));
        assert!(msg.contains("SUBSCRIBE"));
    }
}
