use async_trait::async_trait;
use connectors_common::errors::ConnectorResult;
use connectors_common::http::{as_f64, build_client, get_json, DEFAULT_TIMEOUT};
use connectors_common::types::{now_ms, Quote};
use connectors_common::venue::PriceVenue;
use log::debug;
use reqwest::Client;
use std::time::Duration;

pub const GATEIO_REST_URL: &str = "https://api.gateio.ws";

pub struct GateioClient {
    client: Client,
    base_url: String,
}

impl Default for GateioClient {
    fn default() -> Self {
        Self::new(GATEIO_REST_URL)
    }
}

impl GateioClient {
    pub fn new(base_url: &str) -> Self {
        GateioClient { client: build_client(DEFAULT_TIMEOUT), base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// `/api/v4/spot/tickers?currency_pair=BTC_USDT`; the venue returns a one-element array.
    pub async fn fetch_ticker(&self, currency_pair: &str) -> ConnectorResult<Option<Quote>> {
        let url = format!("{}/api/v4/spot/tickers", self.base_url);
        let v = get_json(&self.client, &url, &[("currency_pair", currency_pair.to_string())]).await?;
        let t = match v.as_array().and_then(|a| a.first()) {
            Some(t) => t,
            None => return Ok(None),
        };
        let last = match t.get("last").and_then(as_f64) {
            Some(p) => p,
            None => return Ok(None),
        };
        Ok(Some(Quote {
            exchange: "gateio".to_string(),
            pair: currency_pair.to_string(),
            price: last,
            change_24h_pct: t.get("change_percentage").and_then(as_f64),
            ts: now_ms(),
        }))
    }
}

#[async_trait]
impl PriceVenue for GateioClient {
    fn name(&self) -> &'static str {
        "gateio"
    }

    async fn fetch_quote(&self, base: &str, quotes: &[String]) -> ConnectorResult<Option<Quote>> {
        for q in quotes {
            let pair = format!("{}_{}", base.to_uppercase(), q.to_uppercase());
            match self.fetch_ticker(&pair).await {
                Ok(Some(quote)) => return Ok(Some(quote)),
                Ok(None) => {}
                Err(e) if e.is_not_listed() => debug!("gateio does not list {}", pair),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
