use serde::{Deserialize, Serialize};

/// Last traded price of one pair on one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub exchange: String,
    pub pair: String,
    pub price: f64,
    /// Percent change over the venue's rolling 24h window, when the venue reports one.
    pub change_24h_pct: Option<f64>,
    pub ts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub qty: f64,
}

impl OrderBookLevel {
    pub fn notional(&self) -> f64 {
        self.price * self.qty
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub exchange: String,
    pub pair: String,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub ts: i64,
}

/// OHLC bar; only the fields the relay reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub close: f64,
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
