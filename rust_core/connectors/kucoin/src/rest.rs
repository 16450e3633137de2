use async_trait::async_trait;
use connectors_common::errors::{ConnectorError, ConnectorResult};
use connectors_common::http::{as_f64, build_client, get_json, DEFAULT_TIMEOUT};
use connectors_common::types::{now_ms, Quote};
use connectors_common::venue::PriceVenue;
use log::debug;
use reqwest::Client;
use std::time::Duration;

pub const KUCOIN_REST_URL: &str = "https://api.kucoin.com";

pub struct KucoinClient {
    client: Client,
    base_url: String,
}

impl Default for KucoinClient {
    fn default() -> Self {
        Self::new(KUCOIN_REST_URL)
    }
}

impl KucoinClient {
    pub fn new(base_url: &str) -> Self {
        KucoinClient { client: build_client(DEFAULT_TIMEOUT), base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// `/api/v1/market/stats` for a symbol such as `BTC-USDT`. KuCoin answers unknown
    /// symbols with `code = 200000` and null fields.
    pub async fn fetch_stats(&self, symbol: &str) -> ConnectorResult<Option<Quote>> {
        let url = format!("{}/api/v1/market/stats", self.base_url);
        let v = get_json(&self.client, &url, &[("symbol", symbol.to_string())]).await?;
        let code = v.get("code").and_then(|c| c.as_str()).unwrap_or_default();
        if code != "200000" {
            let msg = v.get("msg").and_then(|m| m.as_str()).unwrap_or("unknown");
            return Err(ConnectorError::Api(format!("kucoin code {}: {}", code, msg)));
        }
        let data = &v["data"];
        let last = match data.get("last").and_then(as_f64) {
            Some(p) => p,
            None => return Ok(None),
        };
        Ok(Some(Quote {
            exchange: "kucoin".to_string(),
            pair: symbol.to_string(),
            price: last,
            change_24h_pct: data.get("changeRate").and_then(as_f64).map(|r| r * 100.0),
            ts: now_ms(),
        }))
    }
}

#[async_trait]
impl PriceVenue for KucoinClient {
    fn name(&self) -> &'static str {
        "kucoin"
    }

    async fn fetch_quote(&self, base: &str, quotes: &[String]) -> ConnectorResult<Option<Quote>> {
        for q in quotes {
            let symbol = format!("{}-{}", base.to_uppercase(), q.to_uppercase());
            match self.fetch_stats(&symbol).await {
                Ok(Some(quote)) => return Ok(Some(quote)),
                Ok(None) => debug!("kucoin does not list {}", symbol),
                Err(e) if e.is_not_listed() => debug!("kucoin does not list {}", symbol),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
