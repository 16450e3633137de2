use async_trait::async_trait;
use connectors_common::errors::ConnectorResult;
use connectors_common::http::{as_f64, build_client, get_json, DEFAULT_TIMEOUT};
use connectors_common::types::{now_ms, Quote};
use connectors_common::venue::{pct_change, PriceVenue};
use log::debug;
use reqwest::Client;
use std::time::Duration;

pub const BITSTAMP_REST_URL: &str = "https://www.bitstamp.net";

pub struct BitstampClient {
    client: Client,
    base_url: String,
}

impl Default for BitstampClient {
    fn default() -> Self {
        Self::new(BITSTAMP_REST_URL)
    }
}

impl BitstampClient {
    pub fn new(base_url: &str) -> Self {
        BitstampClient { client: build_client(DEFAULT_TIMEOUT), base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// `/api/v2/ticker/{pair}/`, pair lower-case without separator (`btcusd`).
    pub async fn fetch_ticker(&self, pair: &str) -> ConnectorResult<Option<Quote>> {
        let url = format!("{}/api/v2/ticker/{}/", self.base_url, pair);
        let v = get_json(&self.client, &url, &[]).await?;
        let last = match v.get("last").and_then(as_f64) {
            Some(p) => p,
            None => return Ok(None),
        };
        let change = v
            .get("percent_change_24")
            .and_then(as_f64)
            .or_else(|| v.get("open").and_then(as_f64).and_then(|open| pct_change(open, last)));
        Ok(Some(Quote { exchange: "bitstamp".to_string(), pair: pair.to_string(), price: last, change_24h_pct: change, ts: now_ms() }))
    }
}

#[async_trait]
impl PriceVenue for BitstampClient {
    fn name(&self) -> &'static str {
        "bitstamp"
    }

    async fn fetch_quote(&self, base: &str, quotes: &[String]) -> ConnectorResult<Option<Quote>> {
        for q in quotes {
            let pair = format!("{}{}", base, q).to_lowercase();
            match self.fetch_ticker(&pair).await {
                Ok(Some(quote)) => return Ok(Some(quote)),
                Ok(None) => {}
                Err(e) if e.is_not_listed() => debug!("bitstamp does not list {}", pair),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
