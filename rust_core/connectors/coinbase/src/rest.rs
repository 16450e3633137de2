use async_trait::async_trait;
use connectors_common::errors::ConnectorResult;
use connectors_common::http::{as_f64, build_client, get_json, DEFAULT_TIMEOUT};
use connectors_common::types::{now_ms, OrderBookLevel, OrderBookSnapshot, Quote};
use connectors_common::venue::{pct_change, PriceVenue};
use log::debug;
use reqwest::Client;
use std::time::Duration;
use serde_json::Value;

pub const COINBASE_REST_URL: &str = "https://api.exchange.coinbase.com";

pub struct CoinbaseClient {
    client: Client,
    base_url: String,
}

impl Default for CoinbaseClient {
    fn default() -> Self {
        Self::new(COINBASE_REST_URL)
    }
}

impl CoinbaseClient {
    pub fn new(base_url: &str) -> Self {
        CoinbaseClient { client: build_client(DEFAULT_TIMEOUT), base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// 24h stats for a product such as `BTC-USD`.
    pub async fn fetch_stats(&self, product: &str) -> ConnectorResult<Option<Quote>> {
        let url = format!("{}/products/{}/stats", self.base_url, product);
        let v = get_json(&self.client, &url, &[]).await?;
        let last = match v.get("last").and_then(as_f64) {
            Some(p) => p,
            None => return Ok(None),
        };
        let change = v.get("open").and_then(as_f64).and_then(|open| pct_change(open, last));
        Ok(Some(Quote {
            exchange: "coinbase".to_string(),
            pair: product.to_string(),
            price: last,
            change_24h_pct: change,
            ts: now_ms(),
        }))
    }

    /// Aggregated level-2 book, truncated to `depth` levels per side.
    pub async fn fetch_orderbook(&self, product: &str, depth: usize) -> ConnectorResult<OrderBookSnapshot> {
        let url = format!("{}/products/{}/book", self.base_url, product);
        let v = get_json(&self.client, &url, &[("level", "2".to_string())]).await?;
        Ok(OrderBookSnapshot {
            exchange: "coinbase".to_string(),
            pair: product.to_string(),
            bids: parse_side(v.get("bids"), depth),
            asks: parse_side(v.get("asks"), depth),
            ts: now_ms(),
        })
    }
}

fn parse_side(side: Option<&Value>, depth: usize) -> Vec<OrderBookLevel> {
    let mut out = vec![];
    if let Some(rows) = side.and_then(|v| v.as_array()) {
        for it in rows.iter().take(depth) {
            if let (Some(price), Some(qty)) = (it.get(0).and_then(as_f64), it.get(1).and_then(as_f64)) {
                out.push(OrderBookLevel { price, qty });
            }
        }
    }
    out
}

#[async_trait]
impl PriceVenue for CoinbaseClient {
    fn name(&self) -> &'static str {
        "coinbase"
    }

    async fn fetch_quote(&self, base: &str, quotes: &[String]) -> ConnectorResult<Option<Quote>> {
        for q in quotes {
            let product = format!("{}-{}", base.to_uppercase(), q.to_uppercase());
            match self.fetch_stats(&product).await {
                Ok(Some(quote)) => return Ok(Some(quote)),
                Ok(None) => {}
                Err(e) if e.is_not_listed() => debug!("coinbase does not list {}", product),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn fetch_book(&self, pair: &str, depth: usize) -> ConnectorResult<Option<OrderBookSnapshot>> {
        Ok(Some(self.fetch_orderbook(pair, depth).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quote_falls_through_unlisted_quotes() {
        let mut server = mockito::Server::new_async().await;
        let usd = server.mock("GET", "/products/SOL-USD/stats").with_status(404).with_body(r#"{"message":"NotFound"}"#).create_async().await;
        let _usdt = server
            .mock("GET", "/products/SOL-USDT/stats")
            .with_body(r#"{"open":"100","last":"105","high":"110","low":"95"}"#)
            .create_async()
            .await;

        let venue = CoinbaseClient::new(&server.url());
        let q = venue.fetch_quote("sol", &["USD".to_string(), "USDT".to_string()]).await.unwrap().unwrap();
        assert_eq!(q.pair, "SOL-USDT");
        assert_eq!(q.price, 105.0);
        assert_eq!(q.change_24h_pct, Some(5.0));
        usd.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_propagated() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/products/BTC-USD/stats").with_status(503).create_async().await;
        let venue = CoinbaseClient::new(&server.url());
        assert!(venue.fetch_quote("BTC", &["USD".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_orderbook_truncates_depth() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/products/BTC-USD/book")
            .match_query(mockito::Matcher::UrlEncoded("level".into(), "2".into()))
            .with_body(r#"{"bids":[["100","1",1],["99","2",1],["98","3",1]],"asks":[["101","1",1]]}"#)
            .create_async()
            .await;
        let venue = CoinbaseClient::new(&server.url());
        let book = venue.fetch_book("BTC-USD", 2).await.unwrap().unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.asks[0], OrderBookLevel { price: 101.0, qty: 1.0 });
    }
}
